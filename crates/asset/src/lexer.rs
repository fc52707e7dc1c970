//! Statement lexer shared by the MD5 and OBJ/MTL parsers.
//!
//! Turns a raw line source into trimmed, comment-free, non-empty statements.
//! End of input is `Ok(None)`, never an empty statement.

use std::io::BufRead;

use meshcore::{ParseError, ParseResult};

use crate::fields::Fields;

/// Comment and continuation rules of a text format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Syntax {
    /// `//` comments, no continuation.
    Md5,
    /// `#` comments, trailing `\` joins the next statement line.
    Obj,
}

impl Syntax {
    fn comment(self) -> &'static str {
        match self {
            Syntax::Md5 => "//",
            Syntax::Obj => "#",
        }
    }

    fn continuation(self) -> bool {
        matches!(self, Syntax::Obj)
    }
}

/// One logical statement and the (1-based) line it starts on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Statement {
    pub line: usize,
    pub text: String,
}

impl Statement {
    pub fn new(line: usize, text: impl Into<String>) -> Self {
        Self {
            line,
            text: text.into(),
        }
    }

    /// First whitespace-delimited token.
    pub fn keyword(&self) -> &str {
        self.text.split_whitespace().next().unwrap_or("")
    }

    /// Everything after the keyword, trimmed.
    pub fn args(&self) -> &str {
        let text = self.text.trim_start();
        match text.find(char::is_whitespace) {
            Some(idx) => text[idx..].trim(),
            None => "",
        }
    }

    pub fn fields(&self) -> Fields<'_> {
        Fields::new(self.line, &self.text)
    }

    pub fn malformed(&self, message: impl Into<String>) -> ParseError {
        ParseError::malformed(self.line, message)
    }
}

/// Forward-only statement cursor with one statement of lookahead.
pub struct Lexer<R> {
    reader: R,
    syntax: Syntax,
    line_no: usize,
    buf: String,
    peeked: Option<Statement>,
}

impl<R: BufRead> Lexer<R> {
    pub fn new(reader: R, syntax: Syntax) -> Self {
        Self {
            reader,
            syntax,
            line_no: 0,
            buf: String::new(),
            peeked: None,
        }
    }

    pub fn md5(reader: R) -> Self {
        Self::new(reader, Syntax::Md5)
    }

    pub fn obj(reader: R) -> Self {
        Self::new(reader, Syntax::Obj)
    }

    /// Number of raw lines consumed so far.
    pub fn line_no(&self) -> usize {
        self.line_no
    }

    /// Consume the next statement. `Ok(None)` marks end of input.
    pub fn next_statement(&mut self) -> ParseResult<Option<Statement>> {
        if let Some(statement) = self.peeked.take() {
            return Ok(Some(statement));
        }
        self.read_statement()
    }

    /// Look at the next statement without consuming it.
    pub fn peek(&mut self) -> ParseResult<Option<&Statement>> {
        if self.peeked.is_none() {
            self.peeked = self.read_statement()?;
        }
        Ok(self.peeked.as_ref())
    }

    fn read_statement(&mut self) -> ParseResult<Option<Statement>> {
        let Some((line, mut text)) = self.read_clean_line()? else {
            return Ok(None);
        };

        if self.syntax.continuation() {
            while let Some(head) = text.strip_suffix('\\') {
                let head = head.trim_end().to_owned();
                let Some((_, next)) = self.read_clean_line()? else {
                    return Err(ParseError::structural(format!(
                        "continuation of line {line}"
                    )));
                };
                text = if head.is_empty() {
                    next
                } else {
                    format!("{head} {next}")
                };
            }
        }

        Ok(Some(Statement { line, text }))
    }

    fn read_clean_line(&mut self) -> ParseResult<Option<(usize, String)>> {
        loop {
            self.buf.clear();
            if self.reader.read_line(&mut self.buf)? == 0 {
                return Ok(None);
            }
            self.line_no += 1;

            let raw = if self.line_no == 1 {
                self.buf.trim_start_matches('\u{feff}')
            } else {
                self.buf.as_str()
            };
            let text = match raw.find(self.syntax.comment()) {
                Some(idx) => &raw[..idx],
                None => raw,
            };
            let text = text.trim();
            if text.is_empty() {
                continue;
            }
            return Ok(Some((self.line_no, text.to_owned())));
        }
    }
}

impl<R: BufRead> Iterator for Lexer<R> {
    type Item = ParseResult<Statement>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_statement().transpose()
    }
}
