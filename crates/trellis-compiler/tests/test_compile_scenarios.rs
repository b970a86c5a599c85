//! Emission-shape tests
//!
//! Checks the exact instruction sequences the compiler commits for the
//! core statement forms:
//! - Helper append: frame, zero-arg preparation, Helper, frame pop, fetch
//! - Conditional block: one conditional branch, one jump past the else arm
//! - Recursive component invocation through the placeholder mechanism

use std::collections::HashMap;
use std::rc::Rc;
use trellis_compiler::{
    compile, disassemble, Capabilities, CompilableTemplate, NoopResolver, Resolver, Syntax,
};
use trellis_program::{Op, RuntimeHeap, PLACEHOLDER_WORD};
use trellis_wire::{SerializedTemplate, TemplateReferrer};

#[derive(Default)]
struct TestResolver {
    helpers: HashMap<String, u32>,
    component_names: HashMap<String, u32>,
    components: HashMap<u32, (Capabilities, Option<Rc<CompilableTemplate>>)>,
}

impl Resolver for TestResolver {
    fn lookup_component(&self, tag: &str, _referrer: &TemplateReferrer) -> Option<u32> {
        self.component_names.get(tag).copied()
    }

    fn capabilities_of(&self, handle: u32) -> Capabilities {
        self.components
            .get(&handle)
            .map(|(caps, _)| *caps)
            .unwrap_or_default()
    }

    fn layout_of(&self, handle: u32) -> Option<Rc<CompilableTemplate>> {
        self.components
            .get(&handle)
            .and_then(|(_, layout)| layout.clone())
    }

    fn resolve_helper(&self, name: &str, _referrer: &TemplateReferrer) -> Option<u32> {
        self.helpers.get(name).copied()
    }

    fn resolve_modifier(&self, _name: &str, _referrer: &TemplateReferrer) -> Option<u32> {
        None
    }
}

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

fn entry_ops(heap: &RuntimeHeap, entry: trellis_program::Handle) -> Vec<(Op, Vec<i32>)> {
    let start = heap.address_of(entry);
    let end = start + heap.size_of(entry) as u32;
    disassemble(heap, start, end)
        .unwrap()
        .into_iter()
        .map(|row| (row.op, row.operands.to_vec()))
        .collect()
}

#[test]
fn test_helper_append_emission_order() {
    let mut resolver = TestResolver::default();
    resolver.helpers.insert("foo".to_string(), 7);

    let artifact = compile(
        template(serde_json::json!([[1, [26, "foo", [], null], false]])),
        &resolver,
        &Syntax::standard(),
    )
    .unwrap();

    let (heap, _) = artifact.program.hydrate();
    let ops = entry_ops(&heap, artifact.entry);

    let expected = [
        Op::PushFrame,
        Op::PushEmptyArgs,
        Op::Helper,
        Op::PopFrame,
        Op::Fetch,
    ];
    let names: Vec<Op> = ops.iter().map(|(op, _)| *op).collect();
    let helper_at = names
        .iter()
        .position(|op| *op == Op::Helper)
        .expect("Helper instruction emitted");
    assert_eq!(&names[helper_at - 2..helper_at + 3], &expected);
    assert_eq!(ops[helper_at].1, vec![7]);

    // The guarded append invokes the cautious stdlib routine afterwards.
    let invoke_at = names[helper_at..]
        .iter()
        .position(|op| *op == Op::InvokeStatic)
        .expect("stdlib append invoked")
        + helper_at;
    assert_eq!(
        ops[invoke_at].1,
        vec![artifact.program.stdlib.cautious_guarded_append.0 as i32]
    );
}

#[test]
fn test_if_block_branch_shape() {
    let artifact = compile(
        template(serde_json::json!([[
            4,
            "if",
            [[21, 0, []]],
            null,
            {
                "default": {"statements": [[0, "yes"]], "parameters": []},
                "else": {"statements": [[0, "no"]], "parameters": []}
            }
        ]])),
        &NoopResolver,
        &Syntax::standard(),
    )
    .unwrap();

    let (heap, constants) = artifact.program.hydrate();
    let rows = {
        let start = heap.address_of(artifact.entry);
        let end = start + heap.size_of(artifact.entry) as u32;
        disassemble(&heap, start, end).unwrap()
    };

    let conditionals: Vec<_> = rows.iter().filter(|r| r.op == Op::JumpUnless).collect();
    let jumps: Vec<_> = rows.iter().filter(|r| r.op == Op::Jump).collect();
    assert_eq!(conditionals.len(), 1, "exactly one conditional branch");
    assert_eq!(jumps.len(), 1, "exactly one jump past the else branch");

    // The unconditional jump lands on the region exit (the FINALLY label).
    let jump = jumps[0];
    let target = (jump.address as i32 + 1 + jump.operands[0]) as u32;
    let exit = rows.iter().find(|r| r.op == Op::Exit).unwrap();
    assert_eq!(target, exit.address);

    // Both branch bodies are reachable through their InvokeStatic handles.
    let invoked: Vec<u32> = rows
        .iter()
        .filter(|r| r.op == Op::InvokeStatic)
        .map(|r| r.operands[0] as u32)
        .collect();
    assert_eq!(invoked.len(), 2);

    let mut texts = Vec::new();
    for handle in invoked {
        let handle = trellis_program::Handle(handle);
        let start = heap.address_of(handle);
        let end = start + heap.size_of(handle) as u32;
        for row in disassemble(&heap, start, end).unwrap() {
            if row.op == Op::Text {
                texts.push(constants.get_string(row.operands[0] as u32).unwrap().to_string());
            }
        }
    }
    texts.sort();
    assert_eq!(texts, vec!["no".to_string(), "yes".to_string()]);
}

#[test]
fn test_recursive_component_compiles_without_sentinel_leak() {
    // A component whose layout invokes itself. The second entry into
    // compile() observes the placeholder state and defers the handle to
    // the heap's finalize pass.
    let layout_template = template(serde_json::json!([
        [0, "node "],
        [5, "tree-node", [], null, null]
    ]));
    let layout = CompilableTemplate::new(layout_template);

    let mut resolver = TestResolver::default();
    resolver.component_names.insert("tree-node".to_string(), 3);
    resolver
        .components
        .insert(3, (Capabilities::empty(), Some(layout.clone())));

    let artifact = compile(
        template(serde_json::json!([[5, "tree-node", [], null, null]])),
        &resolver,
        &Syntax::standard(),
    )
    .unwrap();

    // The placeholder sentinel must never survive into the final heap.
    assert!(
        !artifact.program.heap.buffer.contains(&PLACEHOLDER_WORD),
        "placeholder sentinel leaked into the serialized heap"
    );

    // The layout's own region invokes the layout handle itself.
    let (heap, _) = artifact.program.hydrate();
    let layout_handle = match layout.state() {
        trellis_compiler::CompileState::Compiled(handle) => handle,
        other => panic!("layout left in state {:?}", other),
    };
    let ops = entry_ops(&heap, layout_handle);
    assert!(
        ops.iter()
            .any(|(op, operands)| *op == Op::InvokeStatic
                && operands[0] == layout_handle.0 as i32),
        "self-invocation resolved to the layout's own handle"
    );
}

#[test]
fn test_yield_statement_shape() {
    let artifact = compile(
        template(serde_json::json!([[12, 0, []]])),
        &NoopResolver,
        &Syntax::standard(),
    )
    .unwrap();

    let (heap, _) = artifact.program.hydrate();
    let names: Vec<Op> = entry_ops(&heap, artifact.entry)
        .into_iter()
        .map(|(op, _)| op)
        .collect();
    let expected = [
        Op::PushFrame,
        Op::PushEmptyArgs,
        Op::GetBlock,
        Op::InvokeYield,
        Op::PopScope,
        Op::PopFrame,
    ];
    assert_eq!(&names[..expected.len()], &expected);
}

#[test]
fn test_partial_is_replayable() {
    let artifact = compile(
        template(serde_json::json!([[13, [20, "partialName"], []]])),
        &NoopResolver,
        &Syntax::standard(),
    )
    .unwrap();

    let (heap, _) = artifact.program.hydrate();
    let names: Vec<Op> = entry_ops(&heap, artifact.entry)
        .into_iter()
        .map(|(op, _)| op)
        .collect();

    // Replayable frame: ReturnTo before the args, Enter after, and an
    // Exit/Return pair at the FINALLY boundary.
    assert_eq!(names[0], Op::PushFrame);
    assert_eq!(names[1], Op::ReturnTo);
    assert!(names.contains(&Op::Enter));
    assert!(names.contains(&Op::InvokePartial));
    let exit_at = names.iter().position(|op| *op == Op::Exit).unwrap();
    assert_eq!(names[exit_at + 1], Op::Return);
}
