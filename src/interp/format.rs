//! `FormatString`: DM's embedded text-macro substitution (spec §4.F/§6).
//!
//! The compiled template is a raw byte blob where each substitution site is
//! marked by a `0xFF` sentinel byte followed by one [`FormatKind`] tag byte.
//! Substitution values are pushed left-to-right in template order before the
//! opcode runs, so this pops them all at once and walks them back in order
//! rather than popping one per sentinel as they're encountered.

use crate::{bytecode::FormatKind, error::RuntimeError, object::ObjectId, value::Value};

const SENTINEL: u8 = 0xFF;

impl super::Interpreter<'_, '_, '_> {
    pub(super) fn exec_format_string(&mut self, template: &[u8]) -> Result<(), RuntimeError> {
        let sentinel_count = template.iter().filter(|&&b| b == SENTINEL).count();
        let mut values = Vec::with_capacity(sentinel_count);
        for _ in 0..sentinel_count {
            values.push(self.pop_value()?);
        }
        values.reverse();
        let mut values = values.into_iter();

        let mut out = String::with_capacity(template.len());
        let mut i = 0;
        while i < template.len() {
            if template[i] == SENTINEL {
                let tag = *template.get(i + 1).ok_or(RuntimeError::StringNotTerminated)?;
                let kind = FormatKind::try_from(tag)?;
                let value = values.next().expect("sentinel count matches pre-popped value count");
                match kind {
                    FormatKind::Stringify => out.push_str(&stringify(&value)),
                    FormatKind::Ref => out.push_str(&refstr(&value)),
                }
                i += 2;
            } else {
                out.push(template[i] as char);
                i += 1;
            }
        }
        self.push_value(Value::string(out))
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Integer(i) => i.to_string(),
        Value::Double(d) => d.to_string(),
        Value::String(s) => s.to_string(),
        Value::Path(p) => p.as_str(),
        Value::Object(id) => format!("object#{}", id.raw()),
        Value::Resource(id) => format!("resource#{}", id.0),
        Value::Proc(p) => p.0.as_str(),
    }
}

/// The `\ref` text macro: a stable handle a client-side link can carry back
/// to name this exact object later. Only objects get a distinct form; every
/// other value falls back to its plain stringification.
fn refstr(value: &Value) -> String {
    match value {
        Value::Object(id) => format!("[0x{:x}]", object_id_raw(*id)),
        other => stringify(other),
    }
}

fn object_id_raw(id: ObjectId) -> u32 {
    id.raw()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bytecode::{CodeBuilder, Opcode},
        object::{Heap, NullTree},
        proc::ArgTuple,
        tracer::NoopTracer,
    };

    use super::super::VmConfig;

    fn run(b: CodeBuilder) -> Result<Value, RuntimeError> {
        let code = b.build();
        let mut heap = Heap::new();
        let mut tracer = NoopTracer;
        let mut interp = super::super::Interpreter::new(
            &mut heap,
            &NullTree,
            &mut tracer,
            VmConfig::default(),
            None,
            None,
            None,
            ArgTuple::empty(),
        );
        interp.run(&code)
    }

    #[test]
    fn sentinel_substitution_stringifies_the_popped_value() {
        let mut b = CodeBuilder::new();
        b.emit_int(Opcode::PushInt, 7);
        let mut template = b"x=".to_vec();
        template.push(SENTINEL);
        template.push(FormatKind::Stringify as u8);
        template.extend_from_slice(b"y");
        b.emit_format_string(&template);
        b.emit(Opcode::Return);
        match run(b).unwrap() {
            Value::String(s) => assert_eq!(&*s, "x=7y"),
            other => panic!("expected string, got {other:?}"),
        }
    }

    #[test]
    fn template_with_no_sentinels_passes_through() {
        let mut b = CodeBuilder::new();
        b.emit_format_string(b"plain text");
        b.emit(Opcode::Return);
        match run(b).unwrap() {
            Value::String(s) => assert_eq!(&*s, "plain text"),
            other => panic!("expected string, got {other:?}"),
        }
    }

    #[test]
    fn multiple_sentinels_substitute_in_template_order() {
        let mut b = CodeBuilder::new();
        b.emit_string(Opcode::PushString, "a");
        b.emit_string(Opcode::PushString, "b");
        let mut template = Vec::new();
        template.push(SENTINEL);
        template.push(FormatKind::Stringify as u8);
        template.extend_from_slice(b"-");
        template.push(SENTINEL);
        template.push(FormatKind::Stringify as u8);
        b.emit_format_string(&template);
        b.emit(Opcode::Return);
        match run(b).unwrap() {
            Value::String(s) => assert_eq!(&*s, "a-b"),
            other => panic!("expected string, got {other:?}"),
        }
    }
}
