//! Core shared types and errors (format-agnostic).

use std::io;

use thiserror::Error;

/// Everything that can go wrong while turning a text asset into a model.
///
/// `Unsupported` and `Unknown` are per-statement and recoverable: the OBJ and
/// MTL loaders may log them and keep going. Every other variant aborts the
/// load and no partially-built model is returned.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Unsupported version: expected {expected}, found {found}")]
    VersionMismatch { expected: i32, found: i32 },

    #[error("Expected '{expected}' before end of input")]
    Structural { expected: String },

    #[error("Malformed statement on line {line}: {message}")]
    Malformed { line: usize, message: String },

    #[error("Frame {frame} has {found} animated components, header declares {expected}")]
    ComponentCountMismatch {
        frame: usize,
        expected: usize,
        found: usize,
    },

    #[error("Statement '{keyword}' on line {line} is not supported")]
    Unsupported { line: usize, keyword: String },

    #[error("Statement '{keyword}' on line {line} is unknown")]
    Unknown { line: usize, keyword: String },
}

impl ParseError {
    pub fn malformed(line: usize, message: impl Into<String>) -> Self {
        Self::Malformed {
            line,
            message: message.into(),
        }
    }

    pub fn structural(expected: impl Into<String>) -> Self {
        Self::Structural {
            expected: expected.into(),
        }
    }

    /// Returns `true` for statement-level errors a caller may skip.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Unsupported { .. } | Self::Unknown { .. })
    }
}

pub type ParseResult<T> = Result<T, ParseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_statement_errors_are_recoverable() {
        let unsupported = ParseError::Unsupported {
            line: 3,
            keyword: "cstype".into(),
        };
        let unknown = ParseError::Unknown {
            line: 4,
            keyword: "zz".into(),
        };
        assert!(unsupported.is_recoverable());
        assert!(unknown.is_recoverable());
        assert!(!ParseError::structural("joints").is_recoverable());
        assert!(!ParseError::malformed(1, "bad float").is_recoverable());
    }

    #[test]
    fn version_mismatch_reports_both_values() {
        let err = ParseError::VersionMismatch {
            expected: 10,
            found: 9,
        };
        let text = err.to_string();
        assert!(text.contains("10"));
        assert!(text.contains('9'));
    }
}
