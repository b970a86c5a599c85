//! Diagnostic disassembler
//!
//! Decodes a byte range of a finalized heap back into instructions. Purely
//! diagnostic, never on the correctness path; a range that fails to decode
//! indicates a miscompiled or truncated program.

use crate::error::{CompileError, CompileResult};
use smallvec::SmallVec;
use tracing::debug;
use trellis_program::{unpack_header, Op, RuntimeHeap};

#[derive(Debug, Clone, PartialEq)]
pub struct DisassembledInstruction {
    pub address: u32,
    pub op: Op,
    pub operands: SmallVec<[i32; 3]>,
}

/// Decodes `[start, end)` of the heap into instruction rows, logging each
/// through `tracing`.
pub fn disassemble(
    heap: &RuntimeHeap,
    start: u32,
    end: u32,
) -> CompileResult<Vec<DisassembledInstruction>> {
    let mut rows = Vec::new();
    let mut address = start;

    while address < end {
        let header = heap.get(address);
        let Some((op, machine, arity)) = unpack_header(header) else {
            return Err(CompileError::Decode {
                address,
                message: format!("word {header:#x} is not a valid instruction header"),
            });
        };
        if machine != op.is_machine() || arity != op.arity() {
            return Err(CompileError::Decode {
                address,
                message: format!("header flags disagree with {} metadata", op.name()),
            });
        }
        if address + 1 + arity as u32 > end {
            return Err(CompileError::Decode {
                address,
                message: format!("{} operands truncated by range end", op.name()),
            });
        }

        let mut operands = SmallVec::new();
        for offset in 0..arity as u32 {
            operands.push(heap.get(address + 1 + offset));
        }

        debug!(address, op = op.name(), ?operands, "disassemble");
        rows.push(DisassembledInstruction {
            address,
            op,
            operands,
        });
        address += 1 + arity as u32;
    }

    Ok(rows)
}
