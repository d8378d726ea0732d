use std::fmt;

use crate::common::source::Span;

/// A static error: anything caught by the scanner, parser, or resolver
/// before a single instruction runs. Mirrors the teacher's `Syntax` type —
/// a message plus the span it occurred at — with the `[line N] Error ...`
/// rendering §6 specifies instead of the teacher's source-excerpt format.
#[derive(Debug, Clone, PartialEq)]
pub struct Syntax {
    pub message: String,
    pub span: Span,
    /// The lexeme at the point of error, if any (empty at EOF).
    pub at: Option<String>,
}

impl Syntax {
    pub fn new(message: impl Into<String>, span: Span, at: Option<String>) -> Syntax {
        Syntax { message: message.into(), span, at }
    }
}

impl fmt::Display for Syntax {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.at {
            Some(lexeme) if !lexeme.is_empty() => {
                write!(f, "[line {}] Error at '{}': {}", self.span.line(), lexeme, self.message)
            },
            Some(_) => write!(f, "[line {}] Error at end: {}", self.span.line(), self.message),
            None => write!(f, "[line {}] Error: {}", self.span.line(), self.message),
        }
    }
}

/// A runtime error: something that went wrong while executing an already
/// well-formed program. Both engines raise one of these and unwind to the
/// top level; neither engine attempts to recover and resume.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeError {
    pub message: String,
    pub line: usize,
}

impl RuntimeError {
    pub fn new(message: impl Into<String>, line: usize) -> RuntimeError {
        RuntimeError { message: message.into(), line }
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\n[line {}]", self.message, self.line)
    }
}
