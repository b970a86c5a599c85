//! Compile error taxonomy
//!
//! Wire-format and authoring errors surface as `CompileError` values;
//! internal consistency violations (patching a non-sentinel site, popping
//! an empty label stack, registry construction bugs) are programming
//! defects and panic instead. Nothing here is retried or downgraded:
//! compilation is all-or-nothing per template.

use thiserror::Error;
use trellis_program::ProgramError;
use trellis_wire::WireError;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("malformed template wire format: {0}")]
    Wire(#[from] WireError),

    #[error(transparent)]
    Program(#[from] ProgramError),

    #[error("label {name:?} referenced but never defined in its scope")]
    UndefinedLabel { name: String },

    #[error("block {name:?} not found")]
    BlockNotFound { name: String },

    #[error("component {tag:?} not found (referrer: {referrer})")]
    ComponentNotFound { tag: String, referrer: String },

    #[error("helper {name:?} not found (referrer: {referrer})")]
    HelperNotFound { name: String, referrer: String },

    #[error("modifier {name:?} not found (referrer: {referrer})")]
    ModifierNotFound { name: String, referrer: String },

    #[error("{name:?} invoked with both positional and named arguments")]
    AmbiguousArguments { name: String },

    #[error("{construct} requires {expected}")]
    InvalidSyntax {
        construct: String,
        expected: &'static str,
    },

    #[error("malformed instruction stream at address {address}: {message}")]
    Decode { address: u32, message: String },
}

pub type CompileResult<T> = Result<T, CompileError>;
