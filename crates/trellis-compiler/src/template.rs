//! Lazily-compiled template and block wrappers
//!
//! Each wrapper owns a serialized AST fragment and memoizes its compiled
//! heap handle. The state machine is Uncompiled -> Compiling -> Compiled,
//! transitioning exactly once. A `compile()` call that re-enters while the
//! unit is Compiling (a template invoking itself, directly or through a
//! mutually-recursive sibling) observes [`UnitHandle::Pending`]; such
//! references must be emitted through the heap's placeholder mechanism so
//! the real handle is substituted in the finalize pass. This is what makes
//! recursive invocation sound without a second AST pass.

use crate::builder::{CompileContext, ContainingMetadata, OpcodeBuilder};
use crate::error::CompileResult;
use std::cell::Cell;
use std::rc::Rc;
use trellis_program::Handle;
use trellis_wire::{SerializedInlineBlock, SerializedTemplate, Statement, TemplateReferrer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileState {
    Uncompiled,
    Compiling,
    Compiled(Handle),
}

/// The result of compiling a unit. `Pending` means the unit is currently
/// being compiled further up the stack; its handle arrives in the heap's
/// placeholder patch pass.
#[derive(Clone)]
pub enum UnitHandle {
    Resolved(Handle),
    Pending(Rc<Cell<CompileState>>),
}

pub struct CompilableTemplate {
    block_statements: Vec<Statement>,
    symbols: Vec<String>,
    has_eval: bool,
    referrer: TemplateReferrer,
    state: Rc<Cell<CompileState>>,
}

impl CompilableTemplate {
    pub fn new(template: SerializedTemplate) -> Rc<Self> {
        Rc::new(CompilableTemplate {
            block_statements: template.block.statements,
            symbols: template.block.symbols,
            has_eval: template.block.has_eval,
            referrer: template.referrer,
            state: Rc::new(Cell::new(CompileState::Uncompiled)),
        })
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn has_eval(&self) -> bool {
        self.has_eval
    }

    pub fn state(&self) -> CompileState {
        self.state.get()
    }

    /// Idempotent: once Compiled, returns the cached handle without
    /// re-emitting anything.
    pub fn compile(&self, ctx: &mut CompileContext<'_>) -> CompileResult<UnitHandle> {
        match self.state.get() {
            CompileState::Compiled(handle) => return Ok(UnitHandle::Resolved(handle)),
            CompileState::Compiling => return Ok(UnitHandle::Pending(self.state.clone())),
            CompileState::Uncompiled => {}
        }

        self.state.set(CompileState::Compiling);
        let meta = ContainingMetadata {
            referrer: self.referrer.clone(),
            size: self.symbols.len() as u32 + 1,
            eval_symbols: self.has_eval.then(|| self.symbols.clone()),
            inside_partial: false,
        };
        match compile_statements(&self.block_statements, meta, ctx) {
            Ok(handle) => {
                self.state.set(CompileState::Compiled(handle));
                Ok(UnitHandle::Resolved(handle))
            }
            Err(err) => {
                self.state.set(CompileState::Uncompiled);
                Err(err)
            }
        }
    }
}

/// A nested inline block, carrying the containing metadata captured when
/// the parent compiler first encountered it.
pub struct CompilableBlock {
    block: SerializedInlineBlock,
    meta: ContainingMetadata,
    state: Rc<Cell<CompileState>>,
}

impl CompilableBlock {
    pub fn new(block: SerializedInlineBlock, meta: ContainingMetadata) -> Self {
        CompilableBlock {
            block,
            meta,
            state: Rc::new(Cell::new(CompileState::Uncompiled)),
        }
    }

    pub fn parameters(&self) -> &[u32] {
        &self.block.parameters
    }

    pub fn compile(&self, ctx: &mut CompileContext<'_>) -> CompileResult<UnitHandle> {
        match self.state.get() {
            CompileState::Compiled(handle) => return Ok(UnitHandle::Resolved(handle)),
            CompileState::Compiling => return Ok(UnitHandle::Pending(self.state.clone())),
            CompileState::Uncompiled => {}
        }

        self.state.set(CompileState::Compiling);
        match compile_statements(&self.block.statements, self.meta.clone(), ctx) {
            Ok(handle) => {
                self.state.set(CompileState::Compiled(handle));
                Ok(UnitHandle::Resolved(handle))
            }
            Err(err) => {
                self.state.set(CompileState::Uncompiled);
                Err(err)
            }
        }
    }
}

fn compile_statements(
    statements: &[Statement],
    meta: ContainingMetadata,
    ctx: &mut CompileContext<'_>,
) -> CompileResult<Handle> {
    let scope_size = meta.size;
    let mut builder = OpcodeBuilder::new(ctx, meta);
    for statement in statements {
        builder.compile_statement(statement)?;
    }
    Ok(builder.commit(scope_size))
}
