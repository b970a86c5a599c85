//! # Trellis Wire Format
//!
//! The serialized template AST consumed by the opcode compiler. Templates
//! arrive as JSON: ordered tuples whose first element is a numeric opcode
//! tag, followed by a fixed number of positional fields determined by the
//! tag. The numeric tag values are the compatibility contract with template
//! producers and must never be renumbered.
//!
//! The crate provides:
//! - Typed statement and expression nodes decoded from the tagged tuples
//! - Serialized block / template containers with symbol tables
//! - Strict decoding: unknown tags and wrong arity are hard errors

pub mod block;
pub mod error;
pub mod expression;
pub mod statement;
pub mod tags;

pub use block::{
    SerializedInlineBlock, SerializedTemplate, SerializedTemplateBlock, TemplateReferrer,
};
pub use error::{WireError, WireResult};
pub use expression::{Expression, Hash, Params};
pub use statement::{NamedBlocks, Statement};
