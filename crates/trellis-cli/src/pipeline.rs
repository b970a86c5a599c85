//! Pipeline for compiling template files into program artifacts.
//!
//! Compilation is all-or-nothing: any wire-format, resolution, or
//! authoring error aborts with a nonzero exit and no partial output.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use trellis_compiler::{
    compile, disassemble, CompileError, CompiledTemplateArtifact, NoopResolver, Syntax,
};
use trellis_wire::SerializedTemplate;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug)]
pub enum PipelineError {
    Io(std::io::Error),
    Json(serde_json::Error),
    Compile(CompileError),
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::Io(e) => write!(f, "I/O error: {}", e),
            PipelineError::Json(e) => write!(f, "malformed artifact JSON: {}", e),
            PipelineError::Compile(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<std::io::Error> for PipelineError {
    fn from(error: std::io::Error) -> Self {
        PipelineError::Io(error)
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(error: serde_json::Error) -> Self {
        PipelineError::Json(error)
    }
}

impl From<CompileError> for PipelineError {
    fn from(error: CompileError) -> Self {
        PipelineError::Compile(error)
    }
}

pub fn compile_file(file: &Path, output: Option<PathBuf>) -> PipelineResult<()> {
    let source = fs::read_to_string(file)?;
    let template =
        SerializedTemplate::from_json(&source).map_err(|e| PipelineError::Compile(e.into()))?;

    let syntax = Syntax::standard();
    let artifact = compile(template, &NoopResolver, &syntax)?;

    let output = output.unwrap_or_else(|| file.with_extension("program.json"));
    fs::write(&output, serde_json::to_string_pretty(&artifact)?)?;
    info!(
        entry = artifact.entry.0,
        words = artifact.program.heap.buffer.len(),
        output = %output.display(),
        "compiled"
    );
    Ok(())
}

pub fn disasm_file(file: &Path) -> PipelineResult<()> {
    let source = fs::read_to_string(file)?;
    let artifact: CompiledTemplateArtifact = serde_json::from_str(&source)?;

    let (heap, _constants) = artifact.program.hydrate();
    let rows = disassemble(&heap, 0, heap.len())?;
    for row in rows {
        let operands: Vec<String> = row.operands.iter().map(i32::to_string).collect();
        println!("{:6}  {:<28} {}", row.address, row.op.name(), operands.join(", "));
    }
    Ok(())
}
