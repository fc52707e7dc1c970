//! Nested statement sources for OBJ `call` includes.

use std::{
    fs::File,
    io::{self, BufRead, BufReader},
    path::PathBuf,
};

use meshcore::{ParseError, ParseResult};

use crate::lexer::{Lexer, Statement};

/// Deepest `call` nesting accepted before the load is aborted.
pub const MAX_INCLUDE_DEPTH: usize = 16;

/// Opens files named by `call` statements.
pub trait IncludeResolver {
    fn open(&mut self, name: &str) -> io::Result<Box<dyn BufRead>>;
}

/// Resolves include names relative to a base directory.
#[derive(Clone, Debug)]
pub struct FsResolver {
    base: PathBuf,
}

impl FsResolver {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }
}

impl IncludeResolver for FsResolver {
    fn open(&mut self, name: &str) -> io::Result<Box<dyn BufRead>> {
        let file = File::open(self.base.join(name))?;
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Refuses every include.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoIncludes;

impl IncludeResolver for NoIncludes {
    fn open(&mut self, name: &str) -> io::Result<Box<dyn BufRead>> {
        Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("includes are disabled, cannot open '{name}'"),
        ))
    }
}

struct Source<'a> {
    lexer: Lexer<Box<dyn BufRead + 'a>>,
    /// `$0..$N` values; `None` for the root file.
    args: Option<Vec<String>>,
}

/// Stack of lexers; statements come from the innermost open source.
pub(crate) struct SourceStack<'a> {
    sources: Vec<Source<'a>>,
}

impl<'a> SourceStack<'a> {
    pub fn new(root: impl BufRead + 'a) -> Self {
        let root: Box<dyn BufRead + 'a> = Box::new(root);
        Self {
            sources: vec![Source {
                lexer: Lexer::obj(root),
                args: None,
            }],
        }
    }

    pub fn depth(&self) -> usize {
        self.sources.len()
    }

    /// Make `reader` the active source. `args[0]` is the file name,
    /// `args[n]` replaces `$n`.
    pub fn push(&mut self, reader: Box<dyn BufRead + 'a>, args: Vec<String>) {
        self.sources.push(Source {
            lexer: Lexer::obj(reader),
            args: Some(args),
        });
    }

    pub fn next_statement(&mut self) -> ParseResult<Option<Statement>> {
        loop {
            let Some(top) = self.sources.last_mut() else {
                return Ok(None);
            };
            if let Some(statement) = top.lexer.next_statement()? {
                return match &top.args {
                    Some(args) => substitute(statement, args).map(Some),
                    None => Ok(Some(statement)),
                };
            }
            self.sources.pop();
        }
    }
}

/// Replace `$n` with `args[n]`. A `$` not followed by a digit is kept.
fn substitute(statement: Statement, args: &[String]) -> ParseResult<Statement> {
    if !statement.text.contains('$') {
        return Ok(statement);
    }

    let mut out = String::with_capacity(statement.text.len());
    let mut rest = statement.text.as_str();
    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        let digits = after
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(after.len());
        if digits == 0 {
            out.push('$');
            rest = after;
            continue;
        }

        let value = after[..digits]
            .parse::<usize>()
            .ok()
            .and_then(|n| args.get(n))
            .ok_or_else(|| {
                ParseError::malformed(
                    statement.line,
                    format!("no argument for ${}", &after[..digits]),
                )
            })?;
        out.push_str(value);
        rest = &after[digits..];
    }
    out.push_str(rest);

    Ok(Statement::new(statement.line, out))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn substitutes_numbered_arguments() {
        let st = Statement::new(4, "v $1 $2 $1");
        let out = substitute(st, &args(&["part.obj", "0.5", "2"])).unwrap();
        assert_eq!(out.text, "v 0.5 2 0.5");
        assert_eq!(out.line, 4);
    }

    #[test]
    fn keeps_bare_dollar_and_rejects_missing() {
        let st = Statement::new(1, "usemtl $cost $");
        assert_eq!(substitute(st, &args(&["f"])).unwrap().text, "usemtl $cost $");

        let err = substitute(Statement::new(2, "v $3 0 0"), &args(&["f", "1"])).unwrap_err();
        assert!(matches!(err, ParseError::Malformed { line: 2, .. }));
    }

    #[test]
    fn stack_drains_innermost_first() {
        let mut stack = SourceStack::new("v 1 0 0\nv 2 0 0\n".as_bytes());
        assert_eq!(stack.next_statement().unwrap().unwrap().text, "v 1 0 0");

        stack.push(Box::new("v $1 0 0\n".as_bytes()), args(&["inc.obj", "9"]));
        assert_eq!(stack.depth(), 2);
        assert_eq!(stack.next_statement().unwrap().unwrap().text, "v 9 0 0");
        assert_eq!(stack.next_statement().unwrap().unwrap().text, "v 2 0 0");
        assert_eq!(stack.depth(), 1);
        assert!(stack.next_statement().unwrap().is_none());
        assert_eq!(stack.depth(), 0);
    }

    #[test]
    fn root_file_is_not_substituted() {
        let mut stack = SourceStack::new("usemtl $1\n".as_bytes());
        assert_eq!(stack.next_statement().unwrap().unwrap().text, "usemtl $1");
    }

    #[test]
    fn no_includes_refuses() {
        assert!(NoIncludes.open("a.obj").is_err());
    }
}
