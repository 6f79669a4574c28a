//! List construction, indexing, membership and enumeration opcodes.
//!
//! A list is a heap-resident [`crate::list::List`] addressed through an
//! ordinary `Value::Object` handle (see the module doc on [`crate::object`]),
//! so every handler here starts by unwrapping that handle the same way a
//! field/global access would.

use super::{Enumerator, Interpreter};
use crate::{error::RuntimeError, object::ObjectId, scope::Ident, value::Value};

impl Interpreter<'_, '_, '_> {
    fn pop_list_id(&mut self) -> Result<ObjectId, RuntimeError> {
        match self.pop_value()? {
            Value::Object(id) if self.heap.get_list(id).is_some() => Ok(id),
            _ => Err(RuntimeError::TypeMismatch { expected: "list", found: "non-list operand" }),
        }
    }

    /// Like [`Self::pop_list_id`], but a non-list object falls back to its
    /// `contents` field (spec §4.F: `IsInList` "accepts `Atom`/`World` by
    /// reading their `contents`"), since those aren't list-backed handles
    /// themselves, just instances that happen to carry one.
    fn pop_list_or_contents_id(&mut self) -> Result<ObjectId, RuntimeError> {
        let err = || RuntimeError::TypeMismatch { expected: "list or contents-bearing receiver", found: "non-list operand" };
        match self.pop_value()? {
            Value::Object(id) if self.heap.get_list(id).is_some() => Ok(id),
            Value::Object(id) => {
                let contents = self.heap.get_instance(id).and_then(|i| i.fields.get("contents")).cloned();
                match contents {
                    Some(Value::Object(list_id)) if self.heap.get_list(list_id).is_some() => Ok(list_id),
                    _ => Err(err()),
                }
            }
            _ => Err(err()),
        }
    }

    /// `ListAppend`/`ListAppendAssociated`: the receiver and (for the
    /// associated form) a key were pushed before the value, so the value
    /// pops first, then the key (if any), then the receiver.
    pub(super) fn exec_list_append(&mut self, associated: bool) -> Result<(), RuntimeError> {
        let value = self.pop_value()?;
        let key = if associated { Some(self.pop_value()?) } else { None };
        let list_id = self.pop_list_id()?;
        let list = self.heap.get_list_mut(list_id).ok_or(RuntimeError::NullDeref)?;
        match key {
            Some(k) => list.set(&k, value)?,
            None => list.add(value),
        }
        Ok(())
    }

    /// `IndexList`: pops a key then a list receiver, producing an identifier
    /// subsequent `GetIdentifier`/`Assign` opcodes read or write through.
    pub(super) fn exec_index_list(&mut self) -> Result<(), RuntimeError> {
        let key = self.pop_value()?;
        let list_id = self.pop_list_id()?;
        self.push_ident(Ident::ListIndex(list_id, Box::new(key)));
        Ok(())
    }

    /// `IsInList`: pops a list (or atom/world) receiver then the candidate
    /// value, testing positional membership (associative-only keys never
    /// match `in`).
    pub(super) fn exec_is_in_list(&mut self) -> Result<(), RuntimeError> {
        let list_id = self.pop_list_or_contents_id()?;
        let needle = self.pop_value()?;
        let list = self.heap.get_list(list_id).ok_or(RuntimeError::NullDeref)?;
        let found = list.find(&needle, 1, 0) != 0;
        self.push_value(Value::from(found))
    }

    /// `PushArgumentList`: pops a list value and expands it via `arglist()`
    /// splatting into the `ArgTuple` a following `Call` consumes.
    pub(super) fn exec_push_argument_list(&mut self) -> Result<(), RuntimeError> {
        let list_id = self.pop_list_id()?;
        let list = self.heap.get_list(list_id).ok_or(RuntimeError::NullDeref)?;
        let args = crate::proc::splat_list(list);
        self.push_arg_tuple(args);
        Ok(())
    }

    /// `CreateListEnumerator`: snapshots the receiver's positional sequence
    /// at this instant (spec §5) so in-loop mutation of the list doesn't
    /// perturb an iteration already underway.
    pub(super) fn exec_create_enumerator(&mut self) -> Result<(), RuntimeError> {
        let list_id = self.pop_list_id()?;
        let list = self.heap.get_list(list_id).ok_or(RuntimeError::NullDeref)?;
        let items = list.positional_slice().to_vec();
        self.enumerators.push(Enumerator { items, cursor: 0 });
        Ok(())
    }

    /// `EnumerateList(name)`: binds the next snapshotted item to `name` and
    /// pushes whether one was available, for the lowered loop's
    /// `JumpIfFalse` exit test.
    pub(super) fn exec_enumerate(&mut self, name: &str) -> Result<(), RuntimeError> {
        let item = {
            let enumerator = self.enumerators.last_mut().ok_or(RuntimeError::EnumeratorUnderflow)?;
            if enumerator.cursor < enumerator.items.len() {
                let value = enumerator.items[enumerator.cursor].clone();
                enumerator.cursor += 1;
                Some(value)
            } else {
                None
            }
        };
        match item {
            Some(value) => {
                self.scopes.assign_local(self.scope, name, value);
                self.push_value(Value::from(true))
            }
            None => self.push_value(Value::from(false)),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        bytecode::{CodeBuilder, Opcode},
        object::{Heap, NullTree},
        proc::ArgTuple,
        tracer::NoopTracer,
        value::Value,
    };

    use super::super::{Interpreter, VmConfig};

    fn run(b: CodeBuilder) -> Result<Value, crate::error::RuntimeError> {
        let code = b.build();
        let mut heap = Heap::new();
        let mut tracer = NoopTracer;
        let mut interp =
            Interpreter::new(&mut heap, &NullTree, &mut tracer, VmConfig::default(), None, None, None, ArgTuple::empty());
        interp.run(&code)
    }

    #[test]
    fn append_then_index_round_trips_a_value() {
        let mut b = CodeBuilder::new();
        b.emit(Opcode::CreateList);
        b.emit_string(Opcode::DefineVariable, "l");
        b.emit_string(Opcode::GetIdentifier, "l");
        b.emit_int(Opcode::PushInt, 42);
        b.emit(Opcode::ListAppend);
        b.emit_string(Opcode::GetIdentifier, "l");
        b.emit_int(Opcode::PushInt, 1);
        b.emit(Opcode::IndexList);
        b.emit(Opcode::Return);
        assert!(matches!(run(b).unwrap(), Value::Integer(42)));
    }

    #[test]
    fn is_in_list_reports_positional_membership() {
        let mut b = CodeBuilder::new();
        b.emit(Opcode::CreateList);
        b.emit_string(Opcode::DefineVariable, "l");
        b.emit_string(Opcode::GetIdentifier, "l");
        b.emit_int(Opcode::PushInt, 9);
        b.emit(Opcode::ListAppend);
        b.emit_int(Opcode::PushInt, 9);
        b.emit_string(Opcode::GetIdentifier, "l");
        b.emit(Opcode::IsInList);
        b.emit(Opcode::Return);
        assert!(matches!(run(b).unwrap(), Value::Integer(1)));
    }

    #[test]
    fn enumeration_yields_each_item_then_reports_exhausted() {
        let mut b = CodeBuilder::new();
        b.emit(Opcode::CreateList);
        b.emit_string(Opcode::DefineVariable, "l");
        b.emit_string(Opcode::GetIdentifier, "l");
        b.emit_int(Opcode::PushInt, 1);
        b.emit(Opcode::ListAppend);
        b.emit_string(Opcode::GetIdentifier, "l");
        b.emit(Opcode::CreateListEnumerator);
        b.emit_string(Opcode::EnumerateList, "it");
        b.emit_string(Opcode::EnumerateList, "it");
        b.emit(Opcode::Add);
        b.emit(Opcode::Return);
        assert!(matches!(run(b).unwrap(), Value::Integer(1)));
    }
}
