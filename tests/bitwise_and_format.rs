//! End-to-end tests for `~` 24-bit truncation and `FormatString` sentinel
//! substitution, including the `\ref` object-handle form.

use dreamcore::{
    ArgTuple, CodeBuilder, Heap, Interpreter, Metaobject, NoopTracer, ObjectDefinition, ObjectId, ObjectTree, Opcode,
    Path, Value, VmConfig,
};

struct EmptyTree;

impl ObjectTree for EmptyTree {
    fn get_object(&self, _path: &Path) -> Option<&ObjectDefinition> {
        None
    }
    fn metaobject(&self, _def: &ObjectDefinition) -> Option<&dyn Metaobject> {
        None
    }
}

fn run(b: CodeBuilder, tree: &dyn ObjectTree, src: Option<ObjectId>) -> Value {
    let code = b.build();
    let mut heap = Heap::new();
    let mut tracer = NoopTracer;
    let mut interp = Interpreter::new(&mut heap, tree, &mut tracer, VmConfig::default(), src, None, None, ArgTuple::empty());
    interp.run(&code).unwrap()
}

#[test]
fn bitwise_not_truncates_to_24_bits_at_both_extremes() {
    assert!(matches!(Value::Integer(0).bit_not().unwrap(), Value::Integer(16_777_215)));
    assert!(matches!(Value::Integer(-1).bit_not().unwrap(), Value::Integer(0)));
    assert!(matches!(Value::Integer(1).bit_not().unwrap(), Value::Integer(16_777_214)));
}

#[test]
fn bitwise_not_opcode_matches_the_value_method() {
    let mut b = CodeBuilder::new();
    b.emit_int(Opcode::PushInt, 0);
    b.emit(Opcode::BitNot);
    b.emit(Opcode::Return);
    assert!(matches!(run(b, &EmptyTree, None), Value::Integer(16_777_215)));
}

#[test]
fn format_string_stringifies_a_plain_sentinel_value() {
    let mut b = CodeBuilder::new();
    b.emit_int(Opcode::PushInt, 12);
    let mut template = b"hp: ".to_vec();
    template.push(0xFF);
    template.push(0); // FormatKind::Stringify
    template.extend_from_slice(b" left");
    b.emit_format_string(&template);
    b.emit(Opcode::Return);
    match run(b, &EmptyTree, None) {
        Value::String(s) => assert_eq!(&*s, "hp: 12 left"),
        other => panic!("expected string, got {other:?}"),
    }
}

#[test]
fn format_string_ref_sentinel_renders_an_object_handle() {
    let tree = EmptyTree;
    let def = ObjectDefinition::new(Path::parse("/obj"), None);
    let mut heap = Heap::new();
    let id = heap.allocate(&def, &tree);

    let mut b = CodeBuilder::new();
    b.emit(Opcode::PushSrc);
    let mut template = b"see ".to_vec();
    template.push(0xFF);
    template.push(1); // FormatKind::Ref
    b.emit_format_string(&template);
    b.emit(Opcode::Return);
    let code = b.build();

    let mut tracer = NoopTracer;
    let mut interp =
        Interpreter::new(&mut heap, &tree, &mut tracer, VmConfig::default(), Some(id), None, None, ArgTuple::empty());
    match interp.run(&code).unwrap() {
        Value::String(s) => assert_eq!(s.to_string(), format!("see [0x{:x}]", id.raw())),
        other => panic!("expected string, got {other:?}"),
    }
}
