//! Block and inline macro registries
//!
//! Named-block compilers (conditionals, iteration, scoping constructs) and
//! inline-append compilers, each with an optional catch-all fallback. The
//! registries are plain constructed objects; independent compiler
//! configurations can carry different macro sets.

use crate::builder::{Operand, OpcodeBuilder, PrimitiveOperand};
use crate::components;
use crate::error::{CompileError, CompileResult};
use indexmap::IndexMap;
use trellis_program::Op;
use trellis_wire::{Hash, NamedBlocks, Params};

pub type BlockMacroFn = for<'a, 'c> fn(
    &str,
    &Params,
    Option<&Hash>,
    &NamedBlocks,
    &mut OpcodeBuilder<'a, 'c>,
) -> CompileResult<()>;

/// Inline macros return whether they produced the emission; unhandled
/// appends fall back to the generic guarded append.
pub type InlineMacroFn = for<'a, 'c> fn(
    &str,
    Option<&Params>,
    Option<&Hash>,
    &mut OpcodeBuilder<'a, 'c>,
) -> CompileResult<bool>;

pub struct Blocks {
    handlers: IndexMap<String, BlockMacroFn>,
    missing: Option<BlockMacroFn>,
}

impl Blocks {
    pub fn new() -> Self {
        Blocks {
            handlers: IndexMap::new(),
            missing: None,
        }
    }

    pub fn add(&mut self, name: &str, f: BlockMacroFn) {
        self.handlers.insert(name.to_string(), f);
    }

    /// The catch-all invoked for unregistered names; it must either emit or
    /// fail with "block not found".
    pub fn add_missing(&mut self, f: BlockMacroFn) {
        self.missing = Some(f);
    }

    pub fn get(&self, name: &str) -> Option<BlockMacroFn> {
        self.handlers.get(name).copied()
    }

    pub fn missing(&self) -> Option<BlockMacroFn> {
        self.missing
    }
}

impl Default for Blocks {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Inlines {
    handlers: IndexMap<String, InlineMacroFn>,
    missing: Option<InlineMacroFn>,
}

impl Inlines {
    pub fn new() -> Self {
        Inlines {
            handlers: IndexMap::new(),
            missing: None,
        }
    }

    pub fn add(&mut self, name: &str, f: InlineMacroFn) {
        self.handlers.insert(name.to_string(), f);
    }

    pub fn add_missing(&mut self, f: InlineMacroFn) {
        self.missing = Some(f);
    }

    pub fn get(&self, name: &str) -> Option<InlineMacroFn> {
        self.handlers.get(name).copied()
    }

    pub fn missing(&self) -> Option<InlineMacroFn> {
        self.missing
    }
}

impl Default for Inlines {
    fn default() -> Self {
        Self::new()
    }
}

pub fn standard_blocks() -> Blocks {
    let mut blocks = Blocks::new();
    blocks.add("if", block_if);
    blocks.add("unless", block_unless);
    blocks.add("with", block_with);
    blocks.add("each", block_each);
    blocks.add("let", block_let);
    blocks
}

pub fn standard_inlines() -> Inlines {
    let mut inlines = Inlines::new();
    inlines.add("component", inline_component);
    inlines
}

fn exclusive_args(name: &str, params: &Params, hash: Option<&Hash>) -> CompileResult<()> {
    if !params.is_empty() && hash.is_some() {
        return Err(CompileError::AmbiguousArguments {
            name: name.to_string(),
        });
    }
    Ok(())
}

fn single_param<'p>(name: &str, params: &'p Params) -> CompileResult<&'p trellis_wire::Expression> {
    if params.len() != 1 {
        return Err(CompileError::InvalidSyntax {
            construct: format!("#{name}"),
            expected: "exactly one positional argument",
        });
    }
    Ok(&params[0])
}

fn block_if(
    name: &str,
    params: &Params,
    hash: Option<&Hash>,
    blocks: &NamedBlocks,
    b: &mut OpcodeBuilder<'_, '_>,
) -> CompileResult<()> {
    exclusive_args(name, params, hash)?;
    let condition = single_param(name, params)?;
    let invocation = b.invocation_blocks(blocks);
    b.replayable_if(
        |b| {
            b.expr(condition)?;
            b.op0(Op::ToBoolean)?;
            Ok(1)
        },
        |b| match &invocation.main {
            Some(block) => b.invoke_static_block(block),
            None => Ok(()),
        },
        |b| match &invocation.else_block {
            Some(block) => b.invoke_static_block(block),
            None => Ok(()),
        },
    )
}

fn block_unless(
    name: &str,
    params: &Params,
    hash: Option<&Hash>,
    blocks: &NamedBlocks,
    b: &mut OpcodeBuilder<'_, '_>,
) -> CompileResult<()> {
    exclusive_args(name, params, hash)?;
    let condition = single_param(name, params)?;
    let invocation = b.invocation_blocks(blocks);
    b.replayable_if(
        |b| {
            b.expr(condition)?;
            b.op0(Op::ToBoolean)?;
            Ok(1)
        },
        |b| match &invocation.else_block {
            Some(block) => b.invoke_static_block(block),
            None => Ok(()),
        },
        |b| match &invocation.main {
            Some(block) => b.invoke_static_block(block),
            None => Ok(()),
        },
    )
}

fn block_with(
    name: &str,
    params: &Params,
    hash: Option<&Hash>,
    blocks: &NamedBlocks,
    b: &mut OpcodeBuilder<'_, '_>,
) -> CompileResult<()> {
    exclusive_args(name, params, hash)?;
    let value = single_param(name, params)?;
    let invocation = b.invocation_blocks(blocks);
    b.replayable_if(
        |b| {
            b.expr(value)?;
            b.op0(Op::Dup)?;
            b.op0(Op::ToBoolean)?;
            Ok(2)
        },
        |b| match &invocation.main {
            Some(block) => b.invoke_static_block(block),
            None => Ok(()),
        },
        |b| match &invocation.else_block {
            Some(block) => b.invoke_static_block(block),
            None => Ok(()),
        },
    )
}

fn block_each(
    name: &str,
    params: &Params,
    hash: Option<&Hash>,
    blocks: &NamedBlocks,
    b: &mut OpcodeBuilder<'_, '_>,
) -> CompileResult<()> {
    let list = single_param(name, params)?;
    let key = hash.and_then(|h| {
        h.keys
            .iter()
            .position(|k| k == "key")
            .map(|index| &h.values[index])
    });
    let invocation = b.invocation_blocks(blocks);
    b.replayable(
        |b| {
            match key {
                Some(key) => b.expr(key)?,
                None => {
                    b.primitive(PrimitiveOperand::Undefined)?;
                    b.op0(Op::PrimitiveReference)?;
                }
            }
            b.expr(list)?;
            Ok(2)
        },
        |b| {
            b.op0(Op::PutIterator)?;
            b.op1(Op::JumpUnless, Operand::Label("ELSE"))?;
            b.op0(Op::PushFrame)?;
            b.op1(Op::ReturnTo, Operand::Label("ITER"))?;
            b.op1(Op::EnterList, Operand::Label("BODY"))?;
            b.label("ITER");
            b.op1(Op::Iterate, Operand::Label("BREAK"))?;
            b.label("BODY");
            if let Some(block) = &invocation.main {
                b.invoke_static_block(block)?;
            }
            b.op1(Op::Pop, Operand::Imm(2))?;
            b.op0(Op::Return)?;
            b.label("BREAK");
            b.op0(Op::ExitList)?;
            b.op0(Op::PopFrame)?;
            b.op1(Op::Jump, Operand::Label("FINALLY"))?;
            b.label("ELSE");
            if let Some(block) = &invocation.else_block {
                b.invoke_static_block(block)?;
            }
            Ok(())
        },
    )
}

fn block_let(
    name: &str,
    params: &Params,
    hash: Option<&Hash>,
    blocks: &NamedBlocks,
    b: &mut OpcodeBuilder<'_, '_>,
) -> CompileResult<()> {
    exclusive_args(name, params, hash)?;
    for param in params {
        b.expr(param)?;
    }
    if let Some(block) = b.invocation_blocks(blocks).main {
        b.invoke_static_block(&block)?;
    }
    Ok(())
}

/// `{{component <definition> named=...}}`: resolves a dynamic component at
/// compile time into the replayable dynamic-invocation path.
fn inline_component(
    name: &str,
    params: Option<&Params>,
    hash: Option<&Hash>,
    b: &mut OpcodeBuilder<'_, '_>,
) -> CompileResult<bool> {
    let params = params.map(Vec::as_slice).unwrap_or_default();
    let Some(definition) = params.first() else {
        return Err(CompileError::InvalidSyntax {
            construct: format!("{{{{{name}}}}}"),
            expected: "a component definition as its first positional argument",
        });
    };
    if params.len() > 1 {
        return Err(CompileError::AmbiguousArguments {
            name: name.to_string(),
        });
    }
    components::invoke_dynamic_component(
        b,
        definition,
        hash,
        crate::builder::InvocationBlocks::none(),
    )?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_registries() {
        let blocks = standard_blocks();
        assert!(blocks.get("if").is_some());
        assert!(blocks.get("each").is_some());
        assert!(blocks.get("nonsense").is_none());
        assert!(blocks.missing().is_none());

        let inlines = standard_inlines();
        assert!(inlines.get("component").is_some());
        assert!(inlines.get("yield").is_none());
    }
}
