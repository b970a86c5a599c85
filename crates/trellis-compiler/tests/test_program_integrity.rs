//! Program integrity tests
//!
//! End-to-end properties of compiled output:
//! - Full-heap disassembly round-trips without error
//! - compile() idempotence (same handle, single emission)
//! - Label fixups equal the relative displacement exactly
//! - Constant pool index stability
//! - Error taxonomy for unresolved and ambiguous constructs

use trellis_compiler::{
    compile, compile_stdlib, disassemble, macros::standard_inlines, Blocks, CompilableTemplate,
    CompileContext, CompileError, CompileResult, ContainingMetadata, NoopResolver, Operand,
    OpcodeBuilder, Syntax, UnitHandle,
};
use trellis_program::{Constants, Handle, Op, Program, RuntimeHeap, StdLib};
use trellis_wire::SerializedTemplate;

fn template(statements: serde_json::Value) -> SerializedTemplate {
    let source = serde_json::json!({
        "block": {
            "statements": statements,
            "symbols": [],
            "hasEval": false
        },
        "referrer": {"module": "test/template", "locator": null}
    });
    SerializedTemplate::from_json(&source.to_string()).unwrap()
}

fn dummy_stdlib() -> StdLib {
    StdLib {
        main: Handle(0),
        trusting_guarded_append: Handle(0),
        cautious_guarded_append: Handle(0),
    }
}

// ===== Round-trip decoding =====

#[test]
fn test_full_heap_disassembles() {
    let artifact = compile(
        template(serde_json::json!([
            [0, "hello "],
            [6, "p"],
            [9, "class", "intro", null],
            [7],
            [1, [21, 0, ["title"]], false],
            [8],
            [2, "done"]
        ])),
        &NoopResolver,
        &Syntax::standard(),
    )
    .unwrap();

    let (heap, _) = artifact.program.hydrate();
    let rows = disassemble(&heap, 0, heap.len()).unwrap();
    assert!(!rows.is_empty());

    // Every region ends in a Return, so the final decoded instruction of
    // the whole heap is one too.
    assert_eq!(rows.last().unwrap().op, Op::Return);
}

// ===== Idempotence =====

#[test]
fn test_compile_is_idempotent() {
    let mut program = Program::new(Constants::new());
    let syntax = Syntax::standard();
    let compilable = CompilableTemplate::new(template(serde_json::json!([[0, "once"]])));

    let mut ctx = CompileContext::new(&mut program, &NoopResolver, &syntax);
    let first = match compilable.compile(&mut ctx).unwrap() {
        UnitHandle::Resolved(handle) => handle,
        UnitHandle::Pending(_) => panic!("unexpected pending handle"),
    };
    let offset_after_first = ctx.program.heap.offset();

    let second = match compilable.compile(&mut ctx).unwrap() {
        UnitHandle::Resolved(handle) => handle,
        UnitHandle::Pending(_) => panic!("unexpected pending handle"),
    };

    assert_eq!(first, second);
    assert_eq!(
        ctx.program.heap.offset(),
        offset_after_first,
        "second compile must not emit"
    );
}

// ===== Label resolution =====

#[test]
fn test_label_operand_is_relative_displacement() {
    let mut program = Program::new(Constants::new());
    let syntax = Syntax::standard();
    let mut ctx = CompileContext::new(&mut program, &NoopResolver, &syntax);

    let mut b = OpcodeBuilder::new(&mut ctx, ContainingMetadata::anonymous());
    b.start_labels();
    b.op1(Op::Jump, Operand::Label("EXIT")).unwrap();
    b.op1(Op::Enter, Operand::Imm(0)).unwrap();
    b.label("EXIT");
    b.op0(Op::Exit).unwrap();
    b.stop_labels().unwrap();
    let handle = b.commit(0);

    let heap = RuntimeHeap::hydrate(program.heap.capture(&dummy_stdlib(), None));
    let base = heap.address_of(handle);

    // Layout: Jump header, operand, Enter header, operand, Exit header.
    // The Jump operand sits at base+1; EXIT resolves to base+4.
    assert_eq!(heap.get(base + 1), 3);
    let target = base + 1 + heap.get(base + 1) as u32;
    let rows = disassemble(&heap, base, base + heap.size_of(handle) as u32).unwrap();
    let exit = rows.iter().find(|r| r.op == Op::Exit).unwrap();
    assert_eq!(target, exit.address);
}

#[test]
fn test_undefined_label_is_fatal() {
    let mut program = Program::new(Constants::new());
    let syntax = Syntax::standard();
    let mut ctx = CompileContext::new(&mut program, &NoopResolver, &syntax);

    let mut b = OpcodeBuilder::new(&mut ctx, ContainingMetadata::anonymous());
    b.start_labels();
    b.op1(Op::Jump, Operand::Label("NOWHERE")).unwrap();
    let err = b.stop_labels().unwrap_err();
    assert!(matches!(err, CompileError::UndefinedLabel { name } if name == "NOWHERE"));
}

// ===== Constant pool stability =====

#[test]
fn test_constant_indices_are_stable() {
    let artifact = compile(
        template(serde_json::json!([[0, "greeting"], [0, "other"], [0, "greeting"]])),
        &NoopResolver,
        &Syntax::standard(),
    )
    .unwrap();

    let (heap, constants) = artifact.program.hydrate();
    let start = heap.address_of(artifact.entry);
    let end = start + heap.size_of(artifact.entry) as u32;
    let texts: Vec<i32> = disassemble(&heap, start, end)
        .unwrap()
        .into_iter()
        .filter(|r| r.op == Op::Text)
        .map(|r| r.operands[0])
        .collect();

    assert_eq!(texts.len(), 3);
    assert_eq!(texts[0], texts[2]);
    assert_eq!(constants.get_string(texts[0] as u32).unwrap(), "greeting");
    assert_eq!(constants.get_string(texts[1] as u32).unwrap(), "other");
}

// ===== Stdlib =====

#[test]
fn test_stdlib_routines_decode() {
    let mut program = Program::new(Constants::new());
    let syntax = Syntax::standard();
    let stdlib = {
        let mut ctx = CompileContext::new(&mut program, &NoopResolver, &syntax);
        compile_stdlib(&mut ctx).unwrap()
    };

    let heap = RuntimeHeap::hydrate(program.heap.capture(&stdlib, None));
    for handle in [
        stdlib.main,
        stdlib.trusting_guarded_append,
        stdlib.cautious_guarded_append,
    ] {
        let start = heap.address_of(handle);
        let end = start + heap.size_of(handle) as u32;
        let rows = disassemble(&heap, start, end).unwrap();
        assert_eq!(rows.last().unwrap().op, Op::Return);
    }

    // The guarded-append switch emits one compare per case except the
    // default, and the trusting variant appends raw HTML where the
    // cautious one escapes.
    let count_op = |handle: Handle, op: Op| {
        let start = heap.address_of(handle);
        let end = start + heap.size_of(handle) as u32;
        disassemble(&heap, start, end)
            .unwrap()
            .into_iter()
            .filter(|r| r.op == op)
            .count()
    };
    assert_eq!(count_op(stdlib.cautious_guarded_append, Op::JumpEq), 4);
    assert_eq!(count_op(stdlib.cautious_guarded_append, Op::AppendText), 1);
    assert_eq!(count_op(stdlib.trusting_guarded_append, Op::AppendHTML), 1);
}

// ===== Lazy constants =====

#[test]
fn test_opaque_operand_requires_lazy_pool() {
    let syntax = Syntax::standard();

    let mut eager = Program::new(Constants::new());
    let mut ctx = CompileContext::new(&mut eager, &NoopResolver, &syntax);
    let mut b = OpcodeBuilder::new(&mut ctx, ContainingMetadata::anonymous());
    let err = b
        .op1(Op::Constant, Operand::Other(Box::new(42u64)))
        .unwrap_err();
    assert!(matches!(err, CompileError::Program(_)));

    let mut lazy = Program::new(Constants::lazy());
    let mut ctx = CompileContext::new(&mut lazy, &NoopResolver, &syntax);
    let mut b = OpcodeBuilder::new(&mut ctx, ContainingMetadata::anonymous());
    b.op1(Op::Constant, Operand::Other(Box::new(42u64))).unwrap();
    b.commit(0);

    // In-memory entries are same-process only: serialization must refuse.
    assert!(lazy.into_artifact(dummy_stdlib()).is_err());
}

// ===== Error taxonomy =====

#[test]
fn test_unregistered_block_is_fatal() {
    let err = compile(
        template(serde_json::json!([[4, "carousel", [], null, null]])),
        &NoopResolver,
        &Syntax::standard(),
    )
    .unwrap_err();
    assert!(matches!(err, CompileError::BlockNotFound { name } if name == "carousel"));
}

fn catch_all_block(
    name: &str,
    _params: &trellis_wire::Params,
    _hash: Option<&trellis_wire::Hash>,
    _blocks: &trellis_wire::NamedBlocks,
    b: &mut OpcodeBuilder<'_, '_>,
) -> CompileResult<()> {
    b.op1(Op::Comment, Operand::Str(format!("unknown block {name}")))
}

#[test]
fn test_catch_all_block_handles_unregistered_names() {
    let mut blocks = Blocks::new();
    blocks.add_missing(catch_all_block);
    let syntax = Syntax::with_macros(blocks, standard_inlines());

    let artifact = compile(
        template(serde_json::json!([[4, "carousel", [], null, null]])),
        &NoopResolver,
        &syntax,
    )
    .unwrap();

    let (heap, constants) = artifact.program.hydrate();
    let start = heap.address_of(artifact.entry);
    let end = start + heap.size_of(artifact.entry) as u32;
    let comment = disassemble(&heap, start, end)
        .unwrap()
        .into_iter()
        .find(|r| r.op == Op::Comment)
        .unwrap();
    assert_eq!(
        constants.get_string(comment.operands[0] as u32).unwrap(),
        "unknown block carousel"
    );
}

#[test]
fn test_ambiguous_arguments_are_fatal() {
    let err = compile(
        template(serde_json::json!([[
            4,
            "with",
            [[21, 0, []]],
            [["as"], [[21, 0, []]]],
            null
        ]])),
        &NoopResolver,
        &Syntax::standard(),
    )
    .unwrap_err();
    assert!(matches!(err, CompileError::AmbiguousArguments { name } if name == "with"));
}

#[test]
fn test_unresolved_helper_is_fatal() {
    let err = compile(
        template(serde_json::json!([[1, [26, "vanish", [], null], false]])),
        &NoopResolver,
        &Syntax::standard(),
    )
    .unwrap_err();
    assert!(matches!(err, CompileError::HelperNotFound { name, .. } if name == "vanish"));
}

#[test]
fn test_unresolved_component_is_fatal() {
    let err = compile(
        template(serde_json::json!([[5, "x-missing", [], null, null]])),
        &NoopResolver,
        &Syntax::standard(),
    )
    .unwrap_err();
    assert!(matches!(err, CompileError::ComponentNotFound { tag, .. } if tag == "x-missing"));
}
