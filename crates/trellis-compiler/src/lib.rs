//! # Trellis Opcode Compiler
//!
//! Transforms the wire-format template AST into the linear instruction
//! stream of a trellis program.
//!
//! ## Architecture
//!
//! The compilation pipeline:
//! 1. **Input**: a `SerializedTemplate` decoded by `trellis-wire`
//! 2. **Dispatch**: statement/expression registries map each wire tag to a
//!    compiling function
//! 3. **Emission**: the opcode builder buffers instruction words, resolving
//!    operands through the constant pool and branch targets through scoped
//!    labels
//! 4. **Commit**: each compile unit becomes one heap allocation; handles of
//!    units still being compiled are emitted as placeholders and patched in
//!    the heap's finalize pass
//! 5. **Output**: a `ProgramArtifact` plus the entry handle
//!
//! Nested blocks compile lazily through [`template::CompilableBlock`]
//! objects; self-referential and mutually-recursive component layouts are
//! handled by the placeholder-handle state machine, not a visited set.

pub mod builder;
pub mod components;
pub mod debug;
pub mod error;
pub mod expressions;
pub mod labels;
pub mod macros;
pub mod resolver;
pub mod statements;
pub mod stdlib_compile;
pub mod syntax;
pub mod template;

pub use builder::{CompileContext, ContainingMetadata, Operand, OpcodeBuilder};
pub use debug::{disassemble, DisassembledInstruction};
pub use error::{CompileError, CompileResult};
pub use macros::{Blocks, Inlines};
pub use resolver::{Capabilities, NoopResolver, Resolver};
pub use stdlib_compile::compile_stdlib;
pub use syntax::Syntax;
pub use template::{CompilableBlock, CompilableTemplate, CompileState, UnitHandle};

use serde::{Deserialize, Serialize};
use trellis_program::{Handle, Program, ProgramArtifact};
use trellis_wire::SerializedTemplate;

/// A fully compiled template: the program artifact plus the handle of the
/// template's entry block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledTemplateArtifact {
    pub entry: Handle,
    pub program: ProgramArtifact,
}

/// Compiles a single template into a self-contained artifact, assembling
/// the standard library into the same program.
pub fn compile(
    template: SerializedTemplate,
    resolver: &dyn Resolver,
    syntax: &Syntax,
) -> CompileResult<CompiledTemplateArtifact> {
    let mut program = Program::new(trellis_program::Constants::new());
    let stdlib = {
        let mut ctx = CompileContext::new(&mut program, resolver, syntax);
        compile_stdlib(&mut ctx)?
    };

    let compilable = CompilableTemplate::new(template);
    let entry = {
        let mut ctx = CompileContext::new(&mut program, resolver, syntax);
        match compilable.compile(&mut ctx)? {
            UnitHandle::Resolved(handle) => handle,
            UnitHandle::Pending(_) => unreachable!("top-level template cannot be re-entrant"),
        }
    };

    let artifact = program.into_artifact(stdlib)?;
    Ok(CompiledTemplateArtifact {
        entry,
        program: artifact,
    })
}
