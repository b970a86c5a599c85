//! Expression compilation
//!
//! Every expression emission leaves exactly one value on the VM stack.

use crate::builder::{Operand, OpcodeBuilder, PrimitiveOperand};
use crate::error::{CompileError, CompileResult};
use trellis_program::Op;
use trellis_wire::Expression;

/// A free variable: a helper invocation if the resolver knows the name,
/// otherwise a property lookup on the self slot (or a late-bound local
/// when compiling inside a partial).
pub(crate) fn unknown(expr: &Expression, b: &mut OpcodeBuilder<'_, '_>) -> CompileResult<()> {
    let Expression::Unknown(name) = expr else {
        unreachable!()
    };
    let referrer = b.meta.referrer.clone();
    if let Some(handle) = b.ctx.resolver.resolve_helper(name, &referrer) {
        return b.call_helper(handle, &Vec::new(), None);
    }
    if b.meta.inside_partial {
        return b.op1(Op::ResolveMaybeLocal, Operand::Str(name.clone()));
    }
    b.op1(Op::GetVariable, Operand::Imm(0))?;
    b.op1(Op::GetProperty, Operand::Str(name.clone()))
}

pub(crate) fn get(expr: &Expression, b: &mut OpcodeBuilder<'_, '_>) -> CompileResult<()> {
    let Expression::Get { symbol, path } = expr else {
        unreachable!()
    };
    b.op1(Op::GetVariable, Operand::Imm(*symbol as i32))?;
    for part in path {
        b.op1(Op::GetProperty, Operand::Str(part.clone()))?;
    }
    Ok(())
}

pub(crate) fn maybe_local(expr: &Expression, b: &mut OpcodeBuilder<'_, '_>) -> CompileResult<()> {
    let Expression::MaybeLocal(path) = expr else {
        unreachable!()
    };
    let Some((head, rest)) = path.split_first() else {
        return Err(CompileError::InvalidSyntax {
            construct: "maybe-local path".to_string(),
            expected: "at least one segment",
        });
    };
    b.op1(Op::ResolveMaybeLocal, Operand::Str(head.clone()))?;
    for part in rest {
        b.op1(Op::GetProperty, Operand::Str(part.clone()))?;
    }
    Ok(())
}

pub(crate) fn has_block(expr: &Expression, b: &mut OpcodeBuilder<'_, '_>) -> CompileResult<()> {
    let Expression::HasBlock(to) = expr else {
        unreachable!()
    };
    b.op1(Op::HasBlock, Operand::Imm(*to as i32))
}

pub(crate) fn has_block_params(
    expr: &Expression,
    b: &mut OpcodeBuilder<'_, '_>,
) -> CompileResult<()> {
    let Expression::HasBlockParams(to) = expr else {
        unreachable!()
    };
    b.op1(Op::HasBlockParams, Operand::Imm(*to as i32))
}

pub(crate) fn undefined(_expr: &Expression, b: &mut OpcodeBuilder<'_, '_>) -> CompileResult<()> {
    b.primitive(PrimitiveOperand::Undefined)?;
    b.op0(Op::PrimitiveReference)
}

pub(crate) fn helper(expr: &Expression, b: &mut OpcodeBuilder<'_, '_>) -> CompileResult<()> {
    let Expression::Helper { name, params, hash } = expr else {
        unreachable!()
    };
    let referrer = b.meta.referrer.clone();
    let Some(handle) = b.ctx.resolver.resolve_helper(name, &referrer) else {
        return Err(CompileError::HelperNotFound {
            name: name.clone(),
            referrer: referrer.module,
        });
    };
    b.call_helper(handle, params, hash.as_ref())
}

pub(crate) fn concat(expr: &Expression, b: &mut OpcodeBuilder<'_, '_>) -> CompileResult<()> {
    let Expression::Concat(parts) = expr else {
        unreachable!()
    };
    for part in parts {
        b.expr(part)?;
    }
    b.op1(Op::Concat, Operand::Imm(parts.len() as i32))
}
