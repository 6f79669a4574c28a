//! End-to-end tests for safe dereference-chain lowering: the null guard
//! must preserve a non-null receiver for the dereference that follows it,
//! and `initial()`/`issaved()` must reject call/index terminals.

use std::collections::HashMap;

use dreamcore::{
    ArgTuple, ChainOp, ChainOpKind, Code, CodeBuilder, CompileError, Consumer, Heap, Interpreter, Metaobject,
    NoopTracer, ObjectDefinition, ObjectTree, Opcode, Path, ShortCircuitMode, Span, Value, Variable, VariableFlags,
    VmConfig, lower_chain,
};

struct TestTree(HashMap<String, ObjectDefinition>);

impl TestTree {
    fn new() -> Self {
        Self(HashMap::new())
    }

    fn insert(&mut self, def: ObjectDefinition) {
        self.0.insert(def.type_path.as_str(), def);
    }
}

impl ObjectTree for TestTree {
    fn get_object(&self, path: &Path) -> Option<&ObjectDefinition> {
        self.0.get(&path.as_str())
    }
    fn metaobject(&self, _def: &ObjectDefinition) -> Option<&dyn Metaobject> {
        None
    }
}

fn mob_def() -> ObjectDefinition {
    let mut def = ObjectDefinition::new(Path::parse("/mob"), None);
    def.variables.insert("owner".into(), Variable::new("owner", Value::Null, VariableFlags::default()));
    def.variables.insert("name".into(), Variable::new("name", Value::string(""), VariableFlags::default()));
    def
}

fn build_owner_dot_name(tree: &dyn ObjectTree) -> Code {
    let mut b = CodeBuilder::new();
    let ops = vec![
        ChainOp { kind: ChainOpKind::Field, name: Some("owner".into()), static_path: None, emit_operand: None },
        ChainOp { kind: ChainOpKind::FieldSafe, name: Some("name".into()), static_path: None, emit_operand: None },
    ];
    lower_chain(
        &mut b,
        tree,
        |builder| builder.emit(Opcode::PushSrc),
        None,
        ops,
        Consumer::Read,
        ShortCircuitMode::KeepNull,
        Span::default(),
    )
    .unwrap();
    b.emit(Opcode::Return);
    b.build()
}

#[test]
fn safe_link_preserves_the_receiver_on_the_non_null_path() {
    let mut tree = TestTree::new();
    tree.insert(mob_def());
    let code = build_owner_dot_name(&tree);

    let mut heap = Heap::new();
    let owner_def = tree.get_object(&Path::parse("/mob")).unwrap();
    let owner_id = heap.allocate(owner_def, &tree);
    heap.get_instance_mut(owner_id).unwrap().fields.insert("name".into(), Value::string("Bob"));

    let root_def = tree.get_object(&Path::parse("/mob")).unwrap();
    let root_id = heap.allocate(root_def, &tree);
    heap.get_instance_mut(root_id).unwrap().fields.insert("owner".into(), Value::Object(owner_id));

    let mut tracer = NoopTracer;
    let mut interp =
        Interpreter::new(&mut heap, &tree, &mut tracer, VmConfig::default(), Some(root_id), None, None, ArgTuple::empty());
    match interp.run(&code).unwrap() {
        Value::String(s) => assert_eq!(&*s, "Bob"),
        other => panic!("expected the owner's name, got {other:?}"),
    }
}

#[test]
fn safe_link_short_circuits_to_null_without_touching_the_next_field() {
    let mut tree = TestTree::new();
    tree.insert(mob_def());
    let code = build_owner_dot_name(&tree);

    let mut heap = Heap::new();
    let root_def = tree.get_object(&Path::parse("/mob")).unwrap();
    let root_id = heap.allocate(root_def, &tree); // owner defaults to Null

    let mut tracer = NoopTracer;
    let mut interp =
        Interpreter::new(&mut heap, &tree, &mut tracer, VmConfig::default(), Some(root_id), None, None, ArgTuple::empty());
    assert!(matches!(interp.run(&code).unwrap(), Value::Null));
}

#[test]
fn initial_rejects_a_call_terminal() {
    let tree = TestTree::new();
    let mut b = CodeBuilder::new();
    let ops = vec![ChainOp {
        kind: ChainOpKind::Call,
        name: Some("Name".into()),
        static_path: None,
        emit_operand: Some(Box::new(|builder: &mut CodeBuilder| builder.emit_push_arguments(&[]))),
    }];
    let err = lower_chain(
        &mut b,
        &tree,
        |builder| builder.emit(Opcode::PushSrc),
        None,
        ops,
        Consumer::Initial,
        ShortCircuitMode::KeepNull,
        Span::default(),
    )
    .unwrap_err();
    assert!(matches!(err, CompileError::ShapeError { .. }));
}

#[test]
fn issaved_rejects_an_index_terminal() {
    let tree = TestTree::new();
    let mut b = CodeBuilder::new();
    let ops = vec![ChainOp {
        kind: ChainOpKind::Index,
        name: None,
        static_path: None,
        emit_operand: Some(Box::new(|builder: &mut CodeBuilder| builder.emit_int(Opcode::PushInt, 1))),
    }];
    let err = lower_chain(
        &mut b,
        &tree,
        |builder| builder.emit(Opcode::PushSrc),
        None,
        ops,
        Consumer::IsSaved,
        ShortCircuitMode::KeepNull,
        Span::default(),
    )
    .unwrap_err();
    assert!(matches!(err, CompileError::ShapeError { .. }));
}
