// ABOUTME: Error types for every stage of the sprig pipeline

use crate::lexer::Location;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum ParseError {
    #[error("{location}: unexpected token '{token}'")]
    UnexpectedToken { token: String, location: Location },

    /// An open delimiter (or string quote) never saw its closing half.
    /// The location is that of the opening token, not end-of-input.
    #[error("{location}: unterminated {what} literal: '{text}'")]
    UnmatchedDelimiter {
        what: &'static str,
        text: String,
        location: Location,
    },

    #[error("{location}: illegal character '{text}'")]
    IllegalChar { text: String, location: Location },
}

impl ParseError {
    pub fn location(&self) -> &Location {
        match self {
            ParseError::UnexpectedToken { location, .. }
            | ParseError::UnmatchedDelimiter { location, .. }
            | ParseError::IllegalChar { location, .. } => location,
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum CompileError {
    #[error("{location}: {form}: expected {expected} argument{}, got {got}", if *.expected == "1" { "" } else { "s" })]
    ArityMismatch {
        form: String,
        expected: String, // "2", "at least 2", "an even number of"
        got: usize,
        location: Location,
    },

    #[error("{location}: expected {expected}, got {got}")]
    TypeMismatch {
        expected: String,
        got: String,
        location: Location,
    },

    #[error("{location}: unbound name '{name}'")]
    UnboundName { name: String, location: Location },

    #[error("{location}: expected an even number of binding forms")]
    OddMapLiteral { location: Location },

    #[error("{location}: macro expansion failed: {message}")]
    MacroExpansion { message: String, location: Location },
}

impl CompileError {
    /// Create an arity error for a special form at the given location
    pub fn arity(form: &str, expected: impl Into<String>, got: usize, location: Location) -> Self {
        CompileError::ArityMismatch {
            form: form.to_string(),
            expected: expected.into(),
            got,
            location,
        }
    }

    /// Create a type mismatch error for an AST position
    pub fn type_mismatch(expected: &str, got: &str, location: Location) -> Self {
        CompileError::TypeMismatch {
            expected: expected.to_string(),
            got: got.to_string(),
            location,
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum RuntimeError {
    #[error("{proc}: expected {expected} argument{}, got {got}", if *.expected == "1" { "" } else { "s" })]
    ArityMismatch {
        proc: String,
        expected: String,
        got: usize,
    },

    #[error("type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("unbound name '{name}'")]
    UnboundName { name: String },

    #[error("operand stack overflow")]
    StackOverflow,

    #[error("operand stack underflow")]
    StackUnderflow,

    #[error("call stack overflow")]
    FrameOverflow,

    #[error("too many locals in one frame")]
    TooManyLocals,

    #[error("io error: {0}")]
    Io(String),
}

impl RuntimeError {
    pub fn arity(proc: &str, expected: impl Into<String>, got: usize) -> Self {
        RuntimeError::ArityMismatch {
            proc: proc.to_string(),
            expected: expected.into(),
            got,
        }
    }

    pub fn type_mismatch(expected: &str, got: &str) -> Self {
        RuntimeError::TypeMismatch {
            expected: expected.to_string(),
            got: got.to_string(),
        }
    }
}

/// Top-level error for the driver: any stage of the pipeline
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    fn loc(row: usize, col: usize) -> Location {
        Location {
            filename: Rc::from("test.sprig"),
            row,
            col,
        }
    }

    #[test]
    fn test_parse_error_display() {
        let err = ParseError::UnmatchedDelimiter {
            what: "list",
            text: "(".to_string(),
            location: loc(1, 1),
        };
        assert_eq!(
            err.to_string(),
            "test.sprig:1:1: unterminated list literal: '('"
        );
    }

    #[test]
    fn test_compile_arity_plural() {
        let err = CompileError::arity("var", "2", 1, loc(3, 7));
        assert_eq!(
            err.to_string(),
            "test.sprig:3:7: var: expected 2 arguments, got 1"
        );

        let one = CompileError::arity("quote", "1", 2, loc(1, 1));
        assert!(one.to_string().ends_with("expected 1 argument, got 2"));
    }

    #[test]
    fn test_runtime_error_display() {
        let err = RuntimeError::type_mismatch("number", "string");
        assert_eq!(err.to_string(), "type mismatch: expected number, got string");
    }
}
