//! Statement compilation

use crate::builder::{InvocationBlocks, Operand, OpcodeBuilder};
use crate::components;
use crate::error::{CompileError, CompileResult};
use serde_json::json;
use trellis_program::Op;
use trellis_wire::Statement;

pub(crate) fn text(stmt: &Statement, b: &mut OpcodeBuilder<'_, '_>) -> CompileResult<()> {
    let Statement::Text(text) = stmt else {
        unreachable!()
    };
    b.op1(Op::Text, Operand::Str(text.clone()))
}

pub(crate) fn append(stmt: &Statement, b: &mut OpcodeBuilder<'_, '_>) -> CompileResult<()> {
    let Statement::Append { value, trusting } = stmt else {
        unreachable!()
    };
    b.append(value, *trusting)
}

pub(crate) fn comment(stmt: &Statement, b: &mut OpcodeBuilder<'_, '_>) -> CompileResult<()> {
    let Statement::Comment(text) = stmt else {
        unreachable!()
    };
    b.op1(Op::Comment, Operand::Str(text.clone()))
}

pub(crate) fn modifier(stmt: &Statement, b: &mut OpcodeBuilder<'_, '_>) -> CompileResult<()> {
    let Statement::Modifier { name, params, hash } = stmt else {
        unreachable!()
    };
    let referrer = b.meta.referrer.clone();
    let Some(handle) = b.ctx.resolver.resolve_modifier(name, &referrer) else {
        return Err(CompileError::ModifierNotFound {
            name: name.clone(),
            referrer: referrer.module,
        });
    };
    b.op0(Op::PushFrame)?;
    b.compile_args(params, hash.as_ref(), InvocationBlocks::none(), true)?;
    b.op1(Op::Modifier, Operand::Imm(handle as i32))?;
    b.op0(Op::PopFrame)
}

pub(crate) fn block(stmt: &Statement, b: &mut OpcodeBuilder<'_, '_>) -> CompileResult<()> {
    let Statement::Block {
        name,
        params,
        hash,
        blocks,
    } = stmt
    else {
        unreachable!()
    };
    b.compile_block(name, params, hash.as_ref(), blocks)
}

pub(crate) fn component(stmt: &Statement, b: &mut OpcodeBuilder<'_, '_>) -> CompileResult<()> {
    let Statement::Component {
        tag,
        attrs,
        hash,
        blocks,
    } = stmt
    else {
        unreachable!()
    };
    components::compile_component_statement(b, tag, attrs, hash.as_ref(), blocks)
}

pub(crate) fn open_element(stmt: &Statement, b: &mut OpcodeBuilder<'_, '_>) -> CompileResult<()> {
    let Statement::OpenElement(tag) = stmt else {
        unreachable!()
    };
    b.op1(Op::OpenElement, Operand::Str(tag.clone()))
}

pub(crate) fn flush_element(_stmt: &Statement, b: &mut OpcodeBuilder<'_, '_>) -> CompileResult<()> {
    b.op0(Op::FlushElement)
}

pub(crate) fn close_element(_stmt: &Statement, b: &mut OpcodeBuilder<'_, '_>) -> CompileResult<()> {
    b.op0(Op::CloseElement)
}

fn namespace_operand(namespace: &Option<String>) -> Operand {
    match namespace {
        Some(ns) => Operand::Str(ns.clone()),
        None => Operand::Imm(0),
    }
}

pub(crate) fn static_attr(stmt: &Statement, b: &mut OpcodeBuilder<'_, '_>) -> CompileResult<()> {
    let Statement::StaticAttr {
        name,
        value,
        namespace,
    } = stmt
    else {
        unreachable!()
    };
    b.op3(
        Op::StaticAttr,
        Operand::Str(name.clone()),
        Operand::Str(value.clone()),
        namespace_operand(namespace),
    )
}

pub(crate) fn dynamic_attr(stmt: &Statement, b: &mut OpcodeBuilder<'_, '_>) -> CompileResult<()> {
    let Statement::DynamicAttr {
        name,
        value,
        namespace,
    } = stmt
    else {
        unreachable!()
    };
    b.expr(value)?;
    b.op3(
        Op::DynamicAttr,
        Operand::Str(name.clone()),
        Operand::Bool(false),
        namespace_operand(namespace),
    )
}

pub(crate) fn trusting_attr(stmt: &Statement, b: &mut OpcodeBuilder<'_, '_>) -> CompileResult<()> {
    let Statement::TrustingAttr {
        name,
        value,
        namespace,
    } = stmt
    else {
        unreachable!()
    };
    b.expr(value)?;
    b.op3(
        Op::DynamicAttr,
        Operand::Str(name.clone()),
        Operand::Bool(true),
        namespace_operand(namespace),
    )
}

pub(crate) fn attr_splat(stmt: &Statement, b: &mut OpcodeBuilder<'_, '_>) -> CompileResult<()> {
    let Statement::AttrSplat(to) = stmt else {
        unreachable!()
    };
    b.yield_block(*to, &Vec::new())
}

pub(crate) fn yield_(stmt: &Statement, b: &mut OpcodeBuilder<'_, '_>) -> CompileResult<()> {
    let Statement::Yield { to, params } = stmt else {
        unreachable!()
    };
    b.yield_block(*to, params)
}

/// Partials are compiled through a replayable region: the referenced
/// target may change between the initial and update passes.
pub(crate) fn partial(stmt: &Statement, b: &mut OpcodeBuilder<'_, '_>) -> CompileResult<()> {
    let Statement::Partial {
        target,
        eval_symbols,
    } = stmt
    else {
        unreachable!()
    };
    let referrer = b.meta.referrer.clone();
    let symbols = eval_symbols.clone();
    b.replayable(
        |b| {
            b.expr(target)?;
            b.op0(Op::Dup)?;
            Ok(2)
        },
        |b| {
            b.op1(Op::JumpUnless, Operand::Label("ELSE"))?;
            b.op0(Op::PushDynamicScope)?;
            b.op3(
                Op::InvokePartial,
                Operand::Handle(json!({
                    "module": referrer.module,
                    "locator": referrer.locator,
                })),
                Operand::StrArray(symbols),
                Operand::Array(Vec::new()),
            )?;
            b.op0(Op::PopScope)?;
            b.op0(Op::PopDynamicScope)?;
            b.label("ELSE");
            Ok(())
        },
    )
}

/// A dynamically-named argument re-binds a dynamic-scope slot; replayable
/// because its value changes between passes.
pub(crate) fn dynamic_arg(stmt: &Statement, b: &mut OpcodeBuilder<'_, '_>) -> CompileResult<()> {
    let Statement::DynamicArg { name, value } = stmt else {
        unreachable!()
    };
    let name = name.clone();
    b.replayable(
        |b| {
            b.expr(value)?;
            Ok(1)
        },
        |b| b.op1(Op::BindDynamicScope, Operand::StrArray(vec![name])),
    )
}

pub(crate) fn debugger(stmt: &Statement, b: &mut OpcodeBuilder<'_, '_>) -> CompileResult<()> {
    let Statement::Debugger { eval_symbols } = stmt else {
        unreachable!()
    };
    b.op2(
        Op::Debugger,
        Operand::StrArray(eval_symbols.clone()),
        Operand::Array(Vec::new()),
    )
}
