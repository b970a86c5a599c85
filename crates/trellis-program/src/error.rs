//! Program construction and serialization errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProgramError {
    #[error("cannot intern an opaque in-memory value into a serializable constant pool")]
    OpaqueConstantInEagerPool,

    #[error("cannot serialize constant pool: {0} opaque in-memory entries present")]
    OpaqueConstantsPresent(usize),

    #[error("constant index {index} out of range for {table} table")]
    ConstantOutOfRange { table: &'static str, index: u32 },
}

pub type ProgramResult<T> = Result<T, ProgramError>;
