//! Opcode emission context
//!
//! One builder per compile unit. Instruction words are buffered locally so
//! nested units can commit their own heap regions while the parent is
//! mid-emission; `commit` appends a Return, copies the buffer into a fresh
//! heap allocation, and closes it with the unit's scope size.
//!
//! Operands are normalized here: raw numbers pass through, tagged operand
//! values resolve through the constant pool, labels become deferred
//! relative displacements, stdlib slots and pending unit handles become
//! heap placeholder sites.

use crate::error::{CompileError, CompileResult};
use crate::labels::LabelScope;
use crate::resolver::Resolver;
use crate::syntax::Syntax;
use crate::template::{CompilableBlock, CompileState, UnitHandle};
use smallvec::SmallVec;
use std::any::Any;
use trellis_program::{pack_header, Handle, Op, Program, StdlibRef, PLACEHOLDER_WORD};
use trellis_wire::{
    Expression, Hash, NamedBlocks, Params, SerializedInlineBlock, TemplateReferrer,
};

/// Register holding a call's return value, fetched after the frame pops.
pub const RETURN_REGISTER: i32 = 0;

/// Shared compilation environment threaded through every unit.
pub struct CompileContext<'c> {
    pub program: &'c mut Program,
    pub resolver: &'c dyn Resolver,
    pub syntax: &'c Syntax,
}

impl<'c> CompileContext<'c> {
    pub fn new(program: &'c mut Program, resolver: &'c dyn Resolver, syntax: &'c Syntax) -> Self {
        CompileContext {
            program,
            resolver,
            syntax,
        }
    }
}

/// Compile-time facts about the unit being emitted: where it came from and
/// what scope it executes in.
#[derive(Debug, Clone)]
pub struct ContainingMetadata {
    pub referrer: TemplateReferrer,
    /// Declared variable-scope size (symbol count plus the self slot).
    pub size: u32,
    /// Symbol names visible to eval, when the template uses it.
    pub eval_symbols: Option<Vec<String>>,
    pub inside_partial: bool,
}

impl ContainingMetadata {
    pub fn anonymous() -> Self {
        ContainingMetadata {
            referrer: TemplateReferrer::anonymous(),
            size: 0,
            eval_symbols: None,
            inside_partial: false,
        }
    }
}

/// A not-yet-encoded operand. Tagged values resolve through the constant
/// pool; `Label` and `Stdlib` defer to the label scope and the stdlib
/// patch pass respectively.
pub enum Operand {
    Imm(i32),
    Bool(bool),
    Str(String),
    Number(f64),
    Array(Vec<u32>),
    StrArray(Vec<String>),
    Serializable(serde_json::Value),
    Handle(serde_json::Value),
    Other(Box<dyn Any>),
    Label(&'static str),
    Stdlib(StdlibRef),
}

enum BufferedWord {
    Word(i32),
    Placeholder(Box<dyn FnOnce() -> i32>),
    StdlibSlot(StdlibRef),
}

/// Primitive values encoded as immediate operands: small integers inline,
/// everything else through the pool, with a 3-bit type flag.
pub enum PrimitiveOperand<'a> {
    Number(f64),
    Str(&'a str),
    Bool(bool),
    Null,
    Undefined,
}

const PRIMITIVE_IMMEDIATE: i32 = 0;
const PRIMITIVE_NUMBER: i32 = 1;
const PRIMITIVE_STRING: i32 = 2;
const PRIMITIVE_BOOLEAN: i32 = 3;
const PRIMITIVE_NULL: i32 = 4;
const PRIMITIVE_UNDEFINED: i32 = 5;

/// Blocks accompanying an invocation, already wrapped as compilables.
#[derive(Default)]
pub struct InvocationBlocks {
    pub main: Option<CompilableBlock>,
    pub else_block: Option<CompilableBlock>,
    pub attrs: Option<CompilableBlock>,
}

impl InvocationBlocks {
    pub fn none() -> Self {
        InvocationBlocks::default()
    }

    fn is_empty(&self) -> bool {
        self.main.is_none() && self.else_block.is_none() && self.attrs.is_none()
    }

    fn flags(&self) -> i32 {
        (self.main.is_some() as i32)
            | (self.else_block.is_some() as i32) << 1
            | (self.attrs.is_some() as i32) << 2
    }
}

pub struct OpcodeBuilder<'a, 'c> {
    pub ctx: &'a mut CompileContext<'c>,
    pub meta: ContainingMetadata,
    buffer: Vec<BufferedWord>,
    label_stack: Vec<LabelScope>,
}

impl<'a, 'c> OpcodeBuilder<'a, 'c> {
    pub fn new(ctx: &'a mut CompileContext<'c>, meta: ContainingMetadata) -> Self {
        OpcodeBuilder {
            ctx,
            meta,
            buffer: Vec::new(),
            label_stack: Vec::new(),
        }
    }

    /// Current emission position, in words.
    pub fn pos(&self) -> u32 {
        self.buffer.len() as u32
    }

    fn word(&mut self, word: i32) {
        self.buffer.push(BufferedWord::Word(word));
    }

    // ===== Encoding =====

    pub fn encode(&mut self, op: Op, operands: SmallVec<[Operand; 3]>) -> CompileResult<()> {
        assert_eq!(
            operands.len(),
            op.arity() as usize,
            "operand count mismatch encoding {}",
            op.name()
        );
        self.word(pack_header(op));
        for operand in operands {
            self.operand(operand)?;
        }
        Ok(())
    }

    pub fn op0(&mut self, op: Op) -> CompileResult<()> {
        self.encode(op, SmallVec::new())
    }

    pub fn op1(&mut self, op: Op, a: Operand) -> CompileResult<()> {
        self.encode(op, smallvec::smallvec![a])
    }

    pub fn op2(&mut self, op: Op, a: Operand, b: Operand) -> CompileResult<()> {
        self.encode(op, smallvec::smallvec![a, b])
    }

    pub fn op3(&mut self, op: Op, a: Operand, b: Operand, c: Operand) -> CompileResult<()> {
        self.encode(op, smallvec::smallvec![a, b, c])
    }

    fn operand(&mut self, operand: Operand) -> CompileResult<()> {
        match operand {
            Operand::Imm(word) => self.word(word),
            Operand::Bool(b) => self.word(b as i32),
            Operand::Str(s) => {
                let id = self.ctx.program.constants.string(&s);
                self.word(id as i32);
            }
            Operand::Number(n) => {
                let id = self.ctx.program.constants.number(n);
                self.word(id as i32);
            }
            Operand::Array(values) => {
                let id = self.ctx.program.constants.array(&values);
                self.word(id as i32);
            }
            Operand::StrArray(strings) => {
                let refs: Vec<&str> = strings.iter().map(String::as_str).collect();
                let id = self.ctx.program.constants.string_array(&refs);
                self.word(id as i32);
            }
            Operand::Serializable(value) => {
                let id = self.ctx.program.constants.serializable(&value);
                self.word(id as i32);
            }
            Operand::Handle(locator) => {
                let id = self.ctx.program.constants.handle(&locator);
                self.word(id as i32);
            }
            Operand::Other(value) => {
                let id = self.ctx.program.constants.other(value)?;
                self.word(id as i32);
            }
            Operand::Label(name) => {
                let at = self.pos();
                self.label_stack
                    .last_mut()
                    .expect("label operand emitted outside a label scope")
                    .target(at, name);
                self.word(PLACEHOLDER_WORD);
            }
            Operand::Stdlib(slot) => {
                self.buffer.push(BufferedWord::StdlibSlot(slot));
            }
        }
        Ok(())
    }

    /// Emits `op` with a sentinel operand, returning the operand's address
    /// for a later [`OpcodeBuilder::patch`].
    pub fn reserve(&mut self, op: Op) -> u32 {
        assert_eq!(op.arity(), 1, "reserve requires a single-operand opcode");
        self.word(pack_header(op));
        let at = self.pos();
        self.word(PLACEHOLDER_WORD);
        at
    }

    /// Overwrites a reserved operand. The site must still hold the
    /// sentinel; anything else is a double patch or a misaligned write.
    pub fn patch(&mut self, address: u32, value: i32) {
        match &mut self.buffer[address as usize] {
            BufferedWord::Word(word) => {
                assert_eq!(
                    *word, PLACEHOLDER_WORD,
                    "patch site {address} no longer holds the sentinel"
                );
                *word = value;
            }
            _ => panic!("patch site {address} is not a plain word"),
        }
    }

    /// Emits `op` with a compile-unit handle operand. Pending handles
    /// (units currently compiling further up the stack) become heap
    /// placeholders resolved in the finalize pass.
    pub fn op_unit(&mut self, op: Op, unit: &UnitHandle) {
        assert_eq!(op.arity(), 1, "unit operand requires a single-operand opcode");
        self.word(pack_header(op));
        match unit {
            UnitHandle::Resolved(handle) => self.word(handle.0 as i32),
            UnitHandle::Pending(cell) => {
                let cell = cell.clone();
                self.buffer
                    .push(BufferedWord::Placeholder(Box::new(move || {
                        match cell.get() {
                            CompileState::Compiled(handle) => handle.0 as i32,
                            _ => panic!("compile-unit handle was never resolved"),
                        }
                    })));
            }
        }
    }

    // ===== Labels =====

    pub fn start_labels(&mut self) {
        self.label_stack.push(LabelScope::new());
    }

    pub fn label(&mut self, name: &str) {
        let at = self.pos();
        self.label_stack
            .last_mut()
            .expect("label defined outside a label scope")
            .define(name, at);
    }

    pub fn stop_labels(&mut self) -> CompileResult<()> {
        let scope = self
            .label_stack
            .pop()
            .expect("popping an empty label-scope stack");
        for (at, displacement) in scope.resolve()? {
            self.patch(at, displacement);
        }
        Ok(())
    }

    // ===== Commit =====

    /// Appends the unit's trailing Return, copies the buffered words into a
    /// fresh heap region, and closes it. Consumes the builder.
    pub fn commit(mut self, scope_size: u32) -> Handle {
        assert!(
            self.label_stack.is_empty(),
            "unbalanced label scopes at commit"
        );
        self.word(pack_header(Op::Return));

        let heap = &mut self.ctx.program.heap;
        let handle = heap.malloc();
        for word in self.buffer {
            match word {
                BufferedWord::Word(w) => heap.push(w),
                BufferedWord::Placeholder(resolver) => heap.push_placeholder(resolver),
                BufferedWord::StdlibSlot(slot) => heap.push_stdlib(slot),
            }
        }
        heap.finish_malloc(handle, scope_size);
        handle
    }

    // ===== Dispatch =====

    pub fn compile_statement(&mut self, statement: &trellis_wire::Statement) -> CompileResult<()> {
        let handler = self.ctx.syntax.statements.get(statement.tag());
        handler(statement, self)
    }

    /// Compiles an expression position: bare literals become primitive
    /// references, tagged tuples dispatch through the expression registry.
    pub fn expr(&mut self, expression: &Expression) -> CompileResult<()> {
        match expression.tag() {
            None => self.push_literal_reference(expression),
            Some(tag) => {
                let handler = self.ctx.syntax.expressions.get(tag);
                handler(expression, self)
            }
        }
    }

    fn push_literal_reference(&mut self, expression: &Expression) -> CompileResult<()> {
        let primitive = match expression {
            Expression::StringLiteral(s) => PrimitiveOperand::Str(s),
            Expression::NumberLiteral(n) => PrimitiveOperand::Number(*n),
            Expression::BoolLiteral(b) => PrimitiveOperand::Bool(*b),
            Expression::Null => PrimitiveOperand::Null,
            _ => unreachable!("tagged expression in literal position"),
        };
        self.primitive(primitive)?;
        self.op0(Op::PrimitiveReference)
    }

    // ===== Primitives =====

    pub fn primitive(&mut self, value: PrimitiveOperand<'_>) -> CompileResult<()> {
        let (encoded, flag) = match value {
            PrimitiveOperand::Number(n) if is_small_int(n) => (n as i32, PRIMITIVE_IMMEDIATE),
            PrimitiveOperand::Number(n) => {
                (self.ctx.program.constants.number(n) as i32, PRIMITIVE_NUMBER)
            }
            PrimitiveOperand::Str(s) => {
                (self.ctx.program.constants.string(s) as i32, PRIMITIVE_STRING)
            }
            PrimitiveOperand::Bool(b) => (b as i32, PRIMITIVE_BOOLEAN),
            PrimitiveOperand::Null => (0, PRIMITIVE_NULL),
            PrimitiveOperand::Undefined => (0, PRIMITIVE_UNDEFINED),
        };
        self.op1(Op::Primitive, Operand::Imm((encoded << 3) | flag))
    }

    // ===== Blocks =====

    /// Wraps a serialized inline block with the current containing
    /// metadata, ready for lazy compilation.
    pub fn inline_block(&self, block: Option<&SerializedInlineBlock>) -> Option<CompilableBlock> {
        block.map(|b| CompilableBlock::new(b.clone(), self.meta.clone()))
    }

    pub fn invocation_blocks(&self, blocks: &NamedBlocks) -> InvocationBlocks {
        InvocationBlocks {
            main: self.inline_block(blocks.get("default")),
            else_block: self.inline_block(blocks.get("else")),
            attrs: self.inline_block(blocks.get("attrs")),
        }
    }

    /// PushFrame, invoke the block's compiled unit, PopFrame.
    pub fn invoke_static_block(&mut self, block: &CompilableBlock) -> CompileResult<()> {
        self.op0(Op::PushFrame)?;
        let unit = block.compile(self.ctx)?;
        self.op_unit(Op::InvokeStatic, &unit);
        self.op0(Op::PopFrame)
    }

    pub(crate) fn push_yieldable_block(
        &mut self,
        block: Option<&CompilableBlock>,
    ) -> CompileResult<()> {
        match block {
            None => {
                self.primitive(PrimitiveOperand::Null)?;
                self.op0(Op::PrimitiveReference)
            }
            Some(block) => {
                let table = serde_json::json!({ "parameters": block.parameters() });
                self.op1(Op::PushSymbolTable, Operand::Serializable(table))?;
                self.op0(Op::PushBlockScope)?;
                let unit = block.compile(self.ctx)?;
                self.op_unit(Op::Constant, &unit);
                Ok(())
            }
        }
    }

    // ===== Arguments =====

    /// Pushes blocks, positional values, and named values, then the
    /// argument header. The empty invocation collapses to PushEmptyArgs.
    pub fn compile_args(
        &mut self,
        params: &Params,
        hash: Option<&Hash>,
        blocks: InvocationBlocks,
        synthetic: bool,
    ) -> CompileResult<()> {
        if params.is_empty() && hash.is_none() && blocks.is_empty() {
            return self.op0(Op::PushEmptyArgs);
        }

        self.push_yieldable_block(blocks.main.as_ref())?;
        self.push_yieldable_block(blocks.else_block.as_ref())?;
        self.push_yieldable_block(blocks.attrs.as_ref())?;

        for param in params {
            self.expr(param)?;
        }

        let mut names = Vec::new();
        if let Some(hash) = hash {
            names = hash.keys.clone();
            for value in &hash.values {
                self.expr(value)?;
            }
        }

        let flags =
            ((params.len() as i32) << 4) | ((synthetic as i32) << 3) | blocks.flags();
        self.op2(Op::PushArgs, Operand::StrArray(names), Operand::Imm(flags))
    }

    /// Frame, args, Helper, frame pop, then fetch of the return value.
    pub fn call_helper(
        &mut self,
        handle: u32,
        params: &Params,
        hash: Option<&Hash>,
    ) -> CompileResult<()> {
        self.op0(Op::PushFrame)?;
        self.compile_args(params, hash, InvocationBlocks::none(), true)?;
        self.op1(Op::Helper, Operand::Imm(handle as i32))?;
        self.op0(Op::PopFrame)?;
        self.op1(Op::Fetch, Operand::Imm(RETURN_REGISTER))
    }

    // ===== Content =====

    /// The generic append path: evaluate the value, then invoke the
    /// guarded-append stdlib routine that branches on its content type.
    pub fn guarded_append(&mut self, value: &Expression, trusting: bool) -> CompileResult<()> {
        self.expr(value)?;
        self.op0(Op::PushFrame)?;
        let slot = if trusting {
            StdlibRef::TrustingGuardedAppend
        } else {
            StdlibRef::CautiousGuardedAppend
        };
        self.op1(Op::InvokeStatic, Operand::Stdlib(slot))?;
        self.op0(Op::PopFrame)
    }

    /// Offers an append to the inline macro registry; falls back to the
    /// guarded append when unhandled.
    pub fn append(&mut self, value: &Expression, trusting: bool) -> CompileResult<()> {
        if self.compile_inline(value)? {
            return Ok(());
        }
        self.guarded_append(value, trusting)
    }

    /// Tries the inline macro registry against an append value. Returns
    /// whether a macro produced the emission.
    fn compile_inline(&mut self, value: &Expression) -> CompileResult<bool> {
        let (name, params, hash) = match value {
            Expression::Unknown(name) => (name.as_str(), None, None),
            Expression::Helper { name, params, hash } => {
                (name.as_str(), Some(params), hash.as_ref())
            }
            _ => return Ok(false),
        };
        let handler = self
            .ctx
            .syntax
            .inlines
            .get(name)
            .or_else(|| self.ctx.syntax.inlines.missing());
        match handler {
            Some(handler) => handler(name, params, hash, self),
            None => Ok(false),
        }
    }

    /// Dispatches a named block invocation through the block macro
    /// registry; unregistered names fall to the catch-all, and failing
    /// that, are a fatal "block not found".
    pub fn compile_block(
        &mut self,
        name: &str,
        params: &Params,
        hash: Option<&Hash>,
        blocks: &NamedBlocks,
    ) -> CompileResult<()> {
        let handler = self
            .ctx
            .syntax
            .blocks
            .get(name)
            .or_else(|| self.ctx.syntax.blocks.missing());
        match handler {
            Some(handler) => handler(name, params, hash, blocks, self),
            None => Err(CompileError::BlockNotFound {
                name: name.to_string(),
            }),
        }
    }

    // ===== Yield =====

    pub fn yield_block(&mut self, to: u32, params: &Params) -> CompileResult<()> {
        self.op0(Op::PushFrame)?;
        self.compile_args(params, None, InvocationBlocks::none(), false)?;
        self.op1(Op::GetBlock, Operand::Imm(to as i32))?;
        self.op0(Op::InvokeYield)?;
        self.op0(Op::PopScope)?;
        self.op0(Op::PopFrame)
    }

    // ===== Replayable regions =====

    /// Emits a region that the runtime can re-enter when its captured
    /// arguments change, without re-walking the AST. `args` must push
    /// exactly the number of stack values it returns; the body's early
    /// exits must target FINALLY, never fall past it.
    pub fn replayable<A, B>(&mut self, args: A, body: B) -> CompileResult<()>
    where
        A: FnOnce(&mut Self) -> CompileResult<u32>,
        B: FnOnce(&mut Self) -> CompileResult<()>,
    {
        self.start_labels();
        self.op0(Op::PushFrame)?;
        self.op1(Op::ReturnTo, Operand::Label("ENDINITIAL"))?;
        let count = args(self)?;
        self.op1(Op::Enter, Operand::Imm(count as i32))?;
        body(self)?;
        self.label("FINALLY");
        self.op0(Op::Exit)?;
        self.op0(Op::Return)?;
        self.label("ENDINITIAL");
        self.op0(Op::PopFrame)?;
        self.stop_labels()
    }

    /// A replayable region whose body is a two-way branch: exactly one
    /// conditional branch to ELSE, one jump past it to FINALLY.
    pub fn replayable_if<A, T, F>(&mut self, args: A, if_true: T, if_false: F) -> CompileResult<()>
    where
        A: FnOnce(&mut Self) -> CompileResult<u32>,
        T: FnOnce(&mut Self) -> CompileResult<()>,
        F: FnOnce(&mut Self) -> CompileResult<()>,
    {
        self.replayable(args, |b| {
            b.op1(Op::JumpUnless, Operand::Label("ELSE"))?;
            if_true(b)?;
            b.op1(Op::Jump, Operand::Label("FINALLY"))?;
            b.label("ELSE");
            if_false(b)
        })
    }
}

fn is_small_int(n: f64) -> bool {
    n.fract() == 0.0 && n.abs() < (1 << 28) as f64
}
