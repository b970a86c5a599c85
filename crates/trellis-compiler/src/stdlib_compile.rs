//! Standard library assembly
//!
//! Compiles the three shared bootstrap routines into the program heap:
//! the main entry point and the guarded-append routines. Guarded append
//! branches at runtime on the dynamic content's type tag against a fixed
//! dispatch table; the jump table is emitted for every case but the first,
//! which sits physically last and falls through to the region exit.

use crate::builder::{CompileContext, ContainingMetadata, Operand, OpcodeBuilder};
use crate::components;
use crate::error::CompileResult;
use trellis_program::{Handle, Op, StdLib};

pub const CONTENT_TYPE_STRING: i32 = 0;
pub const CONTENT_TYPE_COMPONENT: i32 = 1;
pub const CONTENT_TYPE_SAFE_STRING: i32 = 2;
pub const CONTENT_TYPE_FRAGMENT: i32 = 3;
pub const CONTENT_TYPE_NODE: i32 = 4;

pub fn compile_stdlib(ctx: &mut CompileContext<'_>) -> CompileResult<StdLib> {
    let main = compile_main(ctx)?;
    let trusting_guarded_append = compile_guarded_append(ctx, true)?;
    let cautious_guarded_append = compile_guarded_append(ctx, false)?;
    Ok(StdLib {
        main,
        trusting_guarded_append,
        cautious_guarded_append,
    })
}

fn compile_main(ctx: &mut CompileContext<'_>) -> CompileResult<Handle> {
    let mut b = OpcodeBuilder::new(ctx, ContainingMetadata::anonymous());
    b.op0(Op::Main)?;
    b.op0(Op::InvokeVirtual)?;
    Ok(b.commit(0))
}

fn compile_guarded_append(ctx: &mut CompileContext<'_>, trusting: bool) -> CompileResult<Handle> {
    const CLAUSE_LABELS: [&str; 5] = ["CLAUSE0", "CLAUSE1", "CLAUSE2", "CLAUSE3", "CLAUSE4"];
    const CONTENT_TYPES: [i32; 5] = [
        CONTENT_TYPE_STRING,
        CONTENT_TYPE_COMPONENT,
        CONTENT_TYPE_SAFE_STRING,
        CONTENT_TYPE_FRAGMENT,
        CONTENT_TYPE_NODE,
    ];

    let mut b = OpcodeBuilder::new(ctx, ContainingMetadata::anonymous());
    b.start_labels();
    b.op1(Op::Enter, Operand::Imm(2))?;
    b.op0(Op::AssertSame)?;
    b.op0(Op::ContentType)?;

    // The last clause needs no compare: it is the only one left once every
    // other type tag has failed to match.
    for index in 0..CONTENT_TYPES.len() - 1 {
        b.op2(
            Op::JumpEq,
            Operand::Label(CLAUSE_LABELS[index]),
            Operand::Imm(CONTENT_TYPES[index]),
        )?;
    }

    // Clause bodies in reverse order, so the first case lands physically
    // last and falls through to END without a trailing jump.
    for index in (0..CONTENT_TYPES.len()).rev() {
        b.label(CLAUSE_LABELS[index]);
        b.op1(Op::Pop, Operand::Imm(2))?;
        match CONTENT_TYPES[index] {
            CONTENT_TYPE_STRING => {
                if trusting {
                    b.op0(Op::AppendHTML)?;
                } else {
                    b.op0(Op::AppendText)?;
                }
            }
            CONTENT_TYPE_COMPONENT => components::invoke_bare_component(&mut b)?,
            CONTENT_TYPE_SAFE_STRING => b.op0(Op::AppendSafeHTML)?,
            CONTENT_TYPE_FRAGMENT => b.op0(Op::AppendDocumentFragment)?,
            CONTENT_TYPE_NODE => b.op0(Op::AppendNode)?,
            _ => unreachable!(),
        }
        if index != 0 {
            b.op1(Op::Jump, Operand::Label("END"))?;
        }
    }

    b.label("END");
    b.op0(Op::Exit)?;
    b.stop_labels()?;
    Ok(b.commit(0))
}
