//! Token cursor over a single statement.
//!
//! Tokens are whitespace separated, except that `(` and `)` always stand on
//! their own so `(0 0 0)` and `( 0 0 0 )` read the same.

use std::{fmt::Display, str::FromStr};

use corelib::{Vec2, Vec3, vec2, vec3};
use meshcore::{ParseError, ParseResult};

#[derive(Clone, Copy, Debug)]
pub struct Fields<'a> {
    line: usize,
    rest: &'a str,
}

impl<'a> Fields<'a> {
    pub fn new(line: usize, text: &'a str) -> Self {
        Self { line, rest: text }
    }

    pub fn line(&self) -> usize {
        self.line
    }

    /// Unconsumed text, trimmed.
    pub fn remaining(&self) -> &'a str {
        self.rest.trim()
    }

    fn malformed(&self, message: impl Into<String>) -> ParseError {
        ParseError::malformed(self.line, message)
    }

    pub fn next_token(&mut self) -> Option<&'a str> {
        let rest = self.rest.trim_start();
        if rest.is_empty() {
            self.rest = rest;
            return None;
        }
        let len = if rest.starts_with(['(', ')']) {
            1
        } else {
            rest.find(|c: char| c.is_whitespace() || c == '(' || c == ')')
                .unwrap_or(rest.len())
        };
        let (token, tail) = rest.split_at(len);
        self.rest = tail;
        Some(token)
    }

    pub fn token(&mut self, what: &str) -> ParseResult<&'a str> {
        match self.next_token() {
            Some(token) => Ok(token),
            None => Err(self.malformed(format!("missing {what}"))),
        }
    }

    /// Consume a token that must equal `expected`.
    pub fn literal(&mut self, expected: &str) -> ParseResult<()> {
        let token = self.token(&format!("'{expected}'"))?;
        if token != expected {
            return Err(self.malformed(format!("expected '{expected}', found '{token}'")));
        }
        Ok(())
    }

    /// Consume `expected` if it is the next token.
    pub fn optional_literal(&mut self, expected: &str) -> bool {
        let mut lookahead = *self;
        if lookahead.next_token() == Some(expected) {
            *self = lookahead;
            return true;
        }
        false
    }

    pub fn parse<T>(&mut self, what: &str) -> ParseResult<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        let token = self.token(what)?;
        token
            .parse::<T>()
            .map_err(|e| self.malformed(format!("invalid {what} '{token}': {e}")))
    }

    pub fn f32(&mut self, what: &str) -> ParseResult<f32> {
        self.parse(what)
    }

    /// `( x y )`
    pub fn vec2(&mut self, what: &str) -> ParseResult<Vec2> {
        self.literal("(")?;
        let x = self.f32(what)?;
        let y = self.f32(what)?;
        self.literal(")")?;
        Ok(vec2(x, y))
    }

    /// `( x y z )`
    pub fn vec3(&mut self, what: &str) -> ParseResult<Vec3> {
        self.literal("(")?;
        let x = self.f32(what)?;
        let y = self.f32(what)?;
        let z = self.f32(what)?;
        self.literal(")")?;
        Ok(vec3(x, y, z))
    }

    /// A `"quoted name"` (may contain spaces) or, failing that, a bare token.
    pub fn name(&mut self, what: &str) -> ParseResult<String> {
        let rest = self.rest.trim_start();
        let Some(body) = rest.strip_prefix('"') else {
            return self.token(what).map(str::to_owned);
        };
        let Some(end) = body.find('"') else {
            return Err(self.malformed(format!("unterminated quote in {what}")));
        };
        self.rest = &body[end + 1..];
        Ok(body[..end].to_owned())
    }

    /// Fail if anything but whitespace is left.
    pub fn finish(mut self) -> ParseResult<()> {
        match self.next_token() {
            Some(extra) => Err(self.malformed(format!("unexpected trailing '{extra}'"))),
            None => Ok(()),
        }
    }
}
