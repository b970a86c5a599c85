//! Component invocation paths
//!
//! A statically-resolved component whose layout is already compilable and
//! needs no argument preparation takes the fast path: argument slots are
//! bound directly by symbol index against the layout's symbol table. Every
//! other invocation defers argument binding to runtime through the
//! prepared-args dynamic path. Dynamic component references (the value may
//! change between render passes) additionally wrap the whole invocation in
//! a replayable region.

use crate::builder::{InvocationBlocks, Operand, OpcodeBuilder};
use crate::error::{CompileError, CompileResult};
use crate::resolver::Capabilities;
use crate::template::{CompilableBlock, CompilableTemplate};
use serde_json::json;
use std::rc::Rc;
use trellis_program::Op;
use trellis_wire::{Expression, Hash, SerializedInlineBlock, Statement};

pub(crate) fn compile_component_statement(
    b: &mut OpcodeBuilder<'_, '_>,
    tag: &str,
    attrs: &[Statement],
    hash: Option<&Hash>,
    blocks: &trellis_wire::NamedBlocks,
) -> CompileResult<()> {
    let referrer = b.meta.referrer.clone();
    let Some(definition) = b.ctx.resolver.lookup_component(tag, &referrer) else {
        return Err(CompileError::ComponentNotFound {
            tag: tag.to_string(),
            referrer: referrer.module,
        });
    };
    let capabilities = b.ctx.resolver.capabilities_of(definition);
    let layout = b.ctx.resolver.layout_of(definition);

    let mut invocation = b.invocation_blocks(blocks);
    if invocation.attrs.is_none() && !attrs.is_empty() {
        invocation.attrs = Some(CompilableBlock::new(
            SerializedInlineBlock {
                statements: attrs.to_vec(),
                parameters: Vec::new(),
            },
            b.meta.clone(),
        ));
    }

    match layout {
        Some(layout)
            if !capabilities.has(Capabilities::PREPARE_ARGS) && !layout.has_eval() =>
        {
            invoke_static_component(b, definition, &layout, hash, invocation)
        }
        _ => {
            b.op1(Op::PushComponentDefinition, Operand::Imm(definition as i32))?;
            invoke_component(b, hash, invocation)
        }
    }
}

/// Fast path: the layout is known at compile time, so named arguments and
/// blocks bind directly to their symbol slots.
fn invoke_static_component(
    b: &mut OpcodeBuilder<'_, '_>,
    definition: u32,
    layout: &Rc<CompilableTemplate>,
    hash: Option<&Hash>,
    blocks: InvocationBlocks,
) -> CompileResult<()> {
    b.op1(Op::PushComponentDefinition, Operand::Imm(definition as i32))?;
    b.op0(Op::PushFrame)?;
    b.op0(Op::BeginComponentTransaction)?;
    b.op0(Op::PushDynamicScope)?;
    b.op1(
        Op::CreateComponent,
        Operand::Imm(blocks.main.is_some() as i32),
    )?;
    b.op0(Op::RegisterComponentDestructor)?;
    b.op0(Op::PutComponentOperations)?;
    b.op0(Op::GetComponentSelf)?;
    b.op1(
        Op::RootScope,
        Operand::Imm(layout.symbols().len() as i32 + 1),
    )?;
    b.op1(Op::SetVariable, Operand::Imm(0))?;

    if let Some(hash) = hash {
        for (key, value) in hash.keys.iter().zip(&hash.values) {
            let name = format!("@{key}");
            if let Some(symbol) = symbol_slot(layout, &name) {
                b.expr(value)?;
                b.op1(Op::SetVariable, Operand::Imm(symbol))?;
            }
        }
    }

    bind_block(b, layout, "&default", blocks.main.as_ref())?;
    bind_block(b, layout, "&else", blocks.else_block.as_ref())?;
    bind_block(b, layout, "&attrs", blocks.attrs.as_ref())?;

    let unit = layout.compile(b.ctx)?;
    b.op_unit(Op::InvokeStatic, &unit);

    b.op0(Op::DidRenderLayout)?;
    b.op0(Op::PopFrame)?;
    b.op0(Op::PopScope)?;
    b.op0(Op::PopDynamicScope)?;
    b.op0(Op::CommitComponentTransaction)
}

fn symbol_slot(layout: &CompilableTemplate, name: &str) -> Option<i32> {
    layout
        .symbols()
        .iter()
        .position(|symbol| symbol == name)
        .map(|index| index as i32 + 1)
}

fn bind_block(
    b: &mut OpcodeBuilder<'_, '_>,
    layout: &CompilableTemplate,
    name: &str,
    block: Option<&CompilableBlock>,
) -> CompileResult<()> {
    let (Some(block), Some(symbol)) = (block, symbol_slot(layout, name)) else {
        return Ok(());
    };
    b.push_yieldable_block(Some(block))?;
    b.op1(Op::SetBlock, Operand::Imm(symbol))
}

/// Slow path: the component definition is on the stack; argument binding
/// and layout resolution happen at runtime.
pub(crate) fn invoke_component(
    b: &mut OpcodeBuilder<'_, '_>,
    hash: Option<&Hash>,
    blocks: InvocationBlocks,
) -> CompileResult<()> {
    let create_flags = blocks.main.is_some() as i32;
    b.op0(Op::PushFrame)?;
    b.compile_args(&Vec::new(), hash, blocks, false)?;
    b.op0(Op::PrepareArgs)?;
    b.op1(Op::CreateComponent, Operand::Imm(create_flags))?;
    b.op0(Op::BeginComponentTransaction)?;
    b.op0(Op::PushDynamicScope)?;
    b.op0(Op::RegisterComponentDestructor)?;
    b.op0(Op::PutComponentOperations)?;
    b.op0(Op::GetComponentSelf)?;
    b.op0(Op::GetComponentLayout)?;
    b.op0(Op::PopulateLayout)?;
    b.op0(Op::InvokeComponentLayout)?;
    b.op0(Op::DidRenderLayout)?;
    b.op0(Op::PopFrame)?;
    b.op0(Op::PopScope)?;
    b.op0(Op::PopDynamicScope)?;
    b.op0(Op::CommitComponentTransaction)
}

/// A component reference computed at runtime: resolve it inside a
/// replayable region so the invocation re-executes when the reference
/// changes.
pub(crate) fn invoke_dynamic_component(
    b: &mut OpcodeBuilder<'_, '_>,
    definition: &Expression,
    hash: Option<&Hash>,
    blocks: InvocationBlocks,
) -> CompileResult<()> {
    let referrer = b.meta.referrer.clone();
    let hash = hash.cloned();
    b.replayable(
        |b| {
            b.expr(definition)?;
            b.op0(Op::Dup)?;
            Ok(2)
        },
        move |b| {
            b.op1(Op::JumpUnless, Operand::Label("ELSE"))?;
            b.op1(
                Op::ResolveDynamicComponent,
                Operand::Handle(json!({
                    "module": referrer.module,
                    "locator": referrer.locator,
                })),
            )?;
            b.op0(Op::PushDynamicComponentInstance)?;
            invoke_component(b, hash.as_ref(), blocks)?;
            b.label("ELSE");
            Ok(())
        },
    )
}

/// Invokes the component sitting on the stack with no arguments at all.
/// Used by the guarded-append stdlib routine when dynamic content turns
/// out to be a component.
pub(crate) fn invoke_bare_component(b: &mut OpcodeBuilder<'_, '_>) -> CompileResult<()> {
    b.op0(Op::PushCurriedComponent)?;
    b.op0(Op::PushDynamicComponentInstance)?;
    invoke_component(b, None, InvocationBlocks::none())
}
