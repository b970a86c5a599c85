//! Numeric opcode tags for the tagged-tuple wire format
//!
//! These values are the wire contract shared with template producers.
//! Renumbering any of them is a breaking protocol change.

// Statements
pub const TEXT: u64 = 0;
pub const APPEND: u64 = 1;
pub const COMMENT: u64 = 2;
pub const MODIFIER: u64 = 3;
pub const BLOCK: u64 = 4;
pub const COMPONENT: u64 = 5;
pub const OPEN_ELEMENT: u64 = 6;
pub const FLUSH_ELEMENT: u64 = 7;
pub const CLOSE_ELEMENT: u64 = 8;
pub const STATIC_ATTR: u64 = 9;
pub const DYNAMIC_ATTR: u64 = 10;
pub const ATTR_SPLAT: u64 = 11;
pub const YIELD: u64 = 12;
pub const PARTIAL: u64 = 13;
pub const DYNAMIC_ARG: u64 = 14;
pub const TRUSTING_ATTR: u64 = 15;
pub const DEBUGGER: u64 = 16;

// Expressions
pub const UNKNOWN: u64 = 20;
pub const GET: u64 = 21;
pub const MAYBE_LOCAL: u64 = 22;
pub const HAS_BLOCK: u64 = 23;
pub const HAS_BLOCK_PARAMS: u64 = 24;
pub const UNDEFINED: u64 = 25;
pub const HELPER: u64 = 26;
pub const CONCAT: u64 = 27;
