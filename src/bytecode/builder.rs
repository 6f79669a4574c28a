//! Builder for emitting bytecode (component F encode side).
//!
//! Operand encoding follows spec §6 exactly: strings are raw bytes plus a
//! `0x00` terminator, ints are 4-byte big-endian, doubles are 8-byte
//! IEEE-754. Jump targets are patched as absolute big-endian `u32` byte
//! offsets into the stream, written once the target location is known —
//! there is no relative-offset arithmetic to get wrong at read time.

use super::{code::Code, op::{Opcode, ParamTag}};

#[derive(Debug, Default)]
pub struct CodeBuilder {
    bytecode: Vec<u8>,
}

impl CodeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_offset(&self) -> u32 {
        self.bytecode.len() as u32
    }

    /// Emits a bare opcode with no operand.
    pub fn emit(&mut self, op: Opcode) {
        self.bytecode.push(op as u8);
    }

    pub fn emit_int(&mut self, op: Opcode, value: i32) {
        self.bytecode.push(op as u8);
        self.bytecode.extend_from_slice(&value.to_be_bytes());
    }

    pub fn emit_double(&mut self, op: Opcode, value: f64) {
        self.bytecode.push(op as u8);
        self.bytecode.extend_from_slice(&value.to_be_bytes());
    }

    /// Emits an opcode followed by a raw UTF-8 string plus its `0x00`
    /// terminator. Not used for `FormatString`'s template — see
    /// [`emit_format_string`](Self::emit_format_string).
    pub fn emit_string(&mut self, op: Opcode, text: &str) {
        self.bytecode.push(op as u8);
        self.bytecode.extend_from_slice(text.as_bytes());
        self.bytecode.push(0);
    }

    pub fn emit_u8(&mut self, op: Opcode, value: u8) {
        self.bytecode.push(op as u8);
        self.bytecode.push(value);
    }

    /// Emits a forward jump with a placeholder target, returning a label to
    /// [`patch_jump`](Self::patch_jump) once the real target is known.
    #[must_use]
    pub fn emit_jump(&mut self, op: Opcode) -> JumpLabel {
        self.bytecode.push(op as u8);
        let label = JumpLabel(self.bytecode.len());
        self.bytecode.extend_from_slice(&0u32.to_be_bytes());
        label
    }

    /// Patches a forward jump's placeholder with the current offset.
    pub fn patch_jump(&mut self, label: JumpLabel) {
        self.patch_jump_to(label, self.current_offset());
    }

    /// Patches a forward jump's placeholder with an explicit target offset.
    pub fn patch_jump_to(&mut self, label: JumpLabel, target: u32) {
        self.bytecode[label.0..label.0 + 4].copy_from_slice(&target.to_be_bytes());
    }

    /// Emits a jump to an already-known target (a backward loop edge).
    pub fn emit_jump_to(&mut self, op: Opcode, target: u32) {
        self.bytecode.push(op as u8);
        self.bytecode.extend_from_slice(&target.to_be_bytes());
    }

    /// Emits `PushArguments`: an `i32` count followed by one
    /// `{tag, optional name}` record per entry, in the order the
    /// corresponding values were already pushed (spec §6).
    pub fn emit_push_arguments(&mut self, params: &[Option<&str>]) {
        self.bytecode.push(Opcode::PushArguments as u8);
        self.bytecode.extend_from_slice(&(params.len() as i32).to_be_bytes());
        for param in params {
            match param {
                None => self.bytecode.push(ParamTag::Unnamed as u8),
                Some(name) => {
                    self.bytecode.push(ParamTag::Named as u8);
                    self.bytecode.extend_from_slice(name.as_bytes());
                    self.bytecode.push(0);
                }
            }
        }
    }

    /// Emits `FormatString`'s template as a length-prefixed raw byte blob
    /// rather than a NUL-terminated string: a format template legitimately
    /// embeds `0x00` as a sentinel's `FormatKind` tag byte (spec §4.F), so
    /// the usual NUL-terminator convention can't be used here.
    pub fn emit_format_string(&mut self, template: &[u8]) {
        self.bytecode.push(Opcode::FormatString as u8);
        self.bytecode.extend_from_slice(&(template.len() as i32).to_be_bytes());
        self.bytecode.extend_from_slice(template);
    }

    pub fn build(self) -> Code {
        Code::new(self.bytecode)
    }
}

/// A forward-jump placeholder location, valid only for the builder that
/// produced it.
#[derive(Debug, Clone, Copy)]
pub struct JumpLabel(usize);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_bare_and_int_operands() {
        let mut b = CodeBuilder::new();
        b.emit(Opcode::PushNull);
        b.emit_int(Opcode::PushInt, -7);
        let code = b.build();
        assert_eq!(code.bytecode()[0], Opcode::PushNull as u8);
        assert_eq!(code.bytecode()[1], Opcode::PushInt as u8);
        assert_eq!(i32::from_be_bytes(code.bytecode()[2..6].try_into().unwrap()), -7);
    }

    #[test]
    fn forward_jump_patches_to_the_post_emission_offset() {
        let mut b = CodeBuilder::new();
        let label = b.emit_jump(Opcode::Jump);
        b.emit(Opcode::PushNull);
        let target_before_patch = b.current_offset();
        b.patch_jump(label);
        let code = b.build();
        let written = u32::from_be_bytes(code.bytecode()[1..5].try_into().unwrap());
        assert_eq!(written, target_before_patch);
    }

    #[test]
    fn string_operand_is_nul_terminated() {
        let mut b = CodeBuilder::new();
        b.emit_string(Opcode::PushString, "hi");
        let code = b.build();
        assert_eq!(code.bytecode(), &[Opcode::PushString as u8, b'h', b'i', 0]);
    }
}
