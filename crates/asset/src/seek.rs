//! Block seeker: forward scans over a [`Lexer`] to a keyword.

use std::{fmt::Display, io::BufRead, str::FromStr};

use meshcore::{ParseError, ParseResult};

use crate::lexer::{Lexer, Statement};

/// Whether a block parser scans for its opener or starts where it stands.
///
/// `InPlace` is for callers that already consumed the opener line, e.g. when
/// embedding a block parser in a larger one.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Seek {
    #[default]
    Scan,
    InPlace,
}

/// Consume statements up to and including the first one whose leading
/// token is `keyword`. Running out of input is a structural error.
pub fn seek_to<R: BufRead>(lexer: &mut Lexer<R>, keyword: &str) -> ParseResult<Statement> {
    while let Some(statement) = lexer.next_statement()? {
        if statement.keyword() == keyword {
            return Ok(statement);
        }
        log::trace!("line {}: skipped while seeking '{keyword}'", statement.line);
    }
    Err(ParseError::structural(keyword))
}

/// Take the next statement positionally; `expected` names it in the error.
pub fn next_line<R: BufRead>(lexer: &mut Lexer<R>, expected: &str) -> ParseResult<Statement> {
    lexer
        .next_statement()?
        .ok_or_else(|| ParseError::structural(expected))
}

/// Position the lexer just past a block's opener line.
pub fn open_block<R: BufRead>(lexer: &mut Lexer<R>, keyword: &str, seek: Seek) -> ParseResult<()> {
    if seek == Seek::Scan {
        seek_to(lexer, keyword)?;
    }
    Ok(())
}

/// Seek `keyword value` and parse the single value.
pub fn header_value<R, T>(lexer: &mut Lexer<R>, keyword: &str) -> ParseResult<T>
where
    R: BufRead,
    T: FromStr,
    T::Err: Display,
{
    let statement = seek_to(lexer, keyword)?;
    let mut fields = statement.fields();
    fields.literal(keyword)?;
    let value = fields.parse(keyword)?;
    fields.finish()?;
    Ok(value)
}
