//! # Trellis Program Representation
//!
//! The binary program produced by the opcode compiler:
//! - A constant pool interning strings, numbers, arrays, and opaque handles
//! - A heap of 16-bit instruction words with an allocation side table,
//!   deferred-word patching, and a compacting reclamation pass
//! - The opcode set with its header-word encoding
//! - The fixed standard-library entry-point table
//! - Serializable snapshots and their hydrated read-only counterparts

pub mod artifact;
pub mod constants;
pub mod error;
pub mod heap;
pub mod opcode;
pub mod stdlib;

pub use artifact::{Program, ProgramArtifact};
pub use constants::{Constants, ConstantsSnapshot, RuntimeConstants};
pub use error::{ProgramError, ProgramResult};
pub use heap::{AllocationRecord, Handle, Heap, HeapSnapshot, RegionState, RuntimeHeap};
pub use opcode::{pack_header, unpack_header, Op, PLACEHOLDER_WORD};
pub use stdlib::{StdLib, StdlibRef};
