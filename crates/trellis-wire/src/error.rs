//! Wire-format decoding errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("unknown statement opcode {0}")]
    UnknownStatementTag(u64),

    #[error("unknown expression opcode {0}")]
    UnknownExpressionTag(u64),

    #[error("statement opcode {tag} expects {expected} fields, got {actual}")]
    StatementArity {
        tag: u64,
        expected: usize,
        actual: usize,
    },

    #[error("expression opcode {tag} expects {expected} fields, got {actual}")]
    ExpressionArity {
        tag: u64,
        expected: usize,
        actual: usize,
    },

    #[error("expected {expected} in {context}")]
    Shape {
        expected: &'static str,
        context: &'static str,
    },

    #[error("malformed template JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub type WireResult<T> = Result<T, WireError>;

impl WireError {
    pub(crate) fn shape(expected: &'static str, context: &'static str) -> Self {
        WireError::Shape { expected, context }
    }
}
