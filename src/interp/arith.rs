//! Arithmetic, bitwise and compound-assignment opcode handlers.

use super::Interpreter;
use crate::{bytecode::Opcode, error::RuntimeError, value::Value};

impl Interpreter<'_, '_, '_> {
    /// Dispatches one of the unary (`Negate`, `BitNot`) or binary arithmetic
    /// opcodes. Binary operands were pushed lhs-then-rhs, so rhs pops first.
    pub(super) fn exec_arith(&mut self, opcode: Opcode) -> Result<(), RuntimeError> {
        let result = match opcode {
            Opcode::Negate => {
                let v = self.pop_value()?;
                v.neg()?
            }
            Opcode::BitNot => {
                let v = self.pop_value()?;
                v.bit_not()?
            }
            _ => {
                let rhs = self.pop_value()?;
                let lhs = self.pop_value()?;
                match opcode {
                    Opcode::Add => lhs.add(&rhs, self.tree, self.heap)?,
                    Opcode::Subtract => lhs.sub(&rhs, self.tree, self.heap)?,
                    Opcode::Multiply => lhs.mul(&rhs)?,
                    Opcode::Divide => lhs.div(&rhs)?,
                    Opcode::Modulus => lhs.rem(&rhs)?,
                    Opcode::BitAnd => lhs.bit_and(&rhs)?,
                    Opcode::BitOr => lhs.bit_or(&rhs)?,
                    Opcode::BitXor => lhs.bit_xor(&rhs)?,
                    Opcode::BitShiftLeft => lhs.shl(&rhs)?,
                    _ => unreachable!("exec_arith called with non-arithmetic opcode {opcode:?}"),
                }
            }
        };
        self.push_value(result)
    }

    /// `Append`/`Remove`/`Combine`/`Mask`: pop identifier then value (spec
    /// §4.D), read the identifier's current value, apply the compound
    /// operator (dispatching an object receiver's own hook where one
    /// exists), and write the result back.
    pub(super) fn exec_compound_assign(&mut self, opcode: Opcode) -> Result<(), RuntimeError> {
        let id = self.pop_ident()?;
        let rhs = self.pop_value()?;
        let current = self.read_ident(&id)?;
        let result = match opcode {
            Opcode::Append => current.append(&rhs, self.tree, self.heap)?,
            Opcode::Remove => current.remove(&rhs, self.tree, self.heap)?,
            Opcode::Combine => current.combine(&rhs, self.tree, self.heap)?,
            Opcode::Mask => current.bit_and(&rhs)?,
            _ => unreachable!("exec_compound_assign called with opcode {opcode:?}"),
        };
        self.assign_ident(&id, result)
    }

    /// The six comparison opcodes. Equality/inequality use the type-first
    /// `dm_eq`; ordering uses `less_than`/`greater_than`, which fail for
    /// operand pairs with no defined ordering.
    pub(super) fn exec_compare(&mut self, opcode: Opcode) -> Result<(), RuntimeError> {
        let rhs = self.pop_value()?;
        let lhs = self.pop_value()?;
        let result = match opcode {
            Opcode::CompareEquals => lhs.dm_eq(&rhs),
            Opcode::CompareNotEquals => !lhs.dm_eq(&rhs),
            Opcode::CompareLessThan => lhs.less_than(&rhs)?,
            Opcode::CompareGreaterThan => lhs.greater_than(&rhs)?,
            Opcode::CompareLessOrEqual => !lhs.greater_than(&rhs)?,
            Opcode::CompareGreaterOrEqual => !lhs.less_than(&rhs)?,
            _ => unreachable!("exec_compare called with non-comparison opcode {opcode:?}"),
        };
        self.push_value(Value::from(result))
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
    fn addition_of_two_ints_stays_integer() {
        let mut b = CodeBuilder::new();
        b.emit_int(Opcode::PushInt, 2);
        b.emit_int(Opcode::PushInt, 3);
        b.emit(Opcode::Add);
        b.emit(Opcode::Return);
        assert!(matches!(run(b).unwrap(), Value::Integer(5)));
    }

    #[test]
    fn string_and_number_concatenate() {
        let mut b = CodeBuilder::new();
        b.emit_string(Opcode::PushString, "x=");
        b.emit_int(Opcode::PushInt, 7);
        b.emit(Opcode::Add);
        b.emit(Opcode::Return);
        match run(b).unwrap() {
            Value::String(s) => assert_eq!(&*s, "x=7"),
            other => panic!("expected string, got {other:?}"),
        }
    }

    #[test]
    fn less_or_equal_is_strictly_ordered() {
        let mut b = CodeBuilder::new();
        b.emit_int(Opcode::PushInt, 3);
        b.emit_int(Opcode::PushInt, 3);
        b.emit(Opcode::CompareLessOrEqual);
        b.emit(Opcode::Return);
        assert!(matches!(run(b).unwrap(), Value::Integer(1)));
    }

    #[test]
    fn compound_append_on_a_local_reads_then_writes_back() {
        let mut b = CodeBuilder::new();
        b.emit_int(Opcode::PushInt, 10);
        b.emit_string(Opcode::DefineVariable, "x");
        b.emit_int(Opcode::PushInt, 5);
        b.emit_string(Opcode::GetIdentifier, "x");
        b.emit(Opcode::Append);
        b.emit_string(Opcode::GetIdentifier, "x");
        b.emit(Opcode::Return);
        assert!(matches!(run(b).unwrap(), Value::Integer(15)));
    }
}
