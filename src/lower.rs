//! Compile-time lowering of dereference/index/call chains into bytecode
//! (component G).
//!
//! This module never parses or type-checks DM source: a caller (the AST
//! lowering pass, an external collaborator) already knows how to emit the
//! head expression and each link's operand (an index expression, or an
//! already-assembled argument tuple for a call) and drives this module by
//! composing those as closures. `lower_chain` only owns the emission
//! protocol — guard placement, end-label patching, terminal-consumer
//! dispatch and constant folding.

use crate::{
    bytecode::{CodeBuilder, Opcode},
    error::{CompileError, Span},
    object::ObjectTree,
    value::{Path, Value},
};

/// One non-terminal/terminal link in a dereference chain (spec §4.G).
///
/// `Search` variants only affect compile-time ancestor-search scoping for
/// static type resolution, an external concern; bytecode emission for a
/// `Search` variant is identical to its non-`Search` counterpart, since the
/// interpreter's own proc/field resolution already walks the ancestor chain
/// unconditionally (see `Interpreter::lookup_proc` in `interp/call.rs`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainOpKind {
    Field,
    FieldSearch,
    FieldSafe,
    FieldSafeSearch,
    Index,
    IndexSafe,
    Call,
    CallSearch,
    CallSafe,
    CallSafeSearch,
}

impl ChainOpKind {
    fn is_safe(self) -> bool {
        matches!(self, Self::FieldSafe | Self::FieldSafeSearch | Self::IndexSafe | Self::CallSafe | Self::CallSafeSearch)
    }

    fn is_field(self) -> bool {
        matches!(self, Self::Field | Self::FieldSearch | Self::FieldSafe | Self::FieldSafeSearch)
    }

    fn is_index(self) -> bool {
        matches!(self, Self::Index | Self::IndexSafe)
    }

    fn is_call(self) -> bool {
        matches!(self, Self::Call | Self::CallSearch | Self::CallSafe | Self::CallSafeSearch)
    }
}

/// How a short-circuited terminal should land (spec §4.G).
///
/// Kept as a real parameter for caller intent, but under this emission
/// protocol the two modes compile identically: the null-guard sequence
/// (`Dup`/`JumpIfTrue`/`Jump`, see [`lower_chain`]) always leaves exactly one
/// entry on the operand stack on the short-circuit branch, so there is never
/// intermediate stack state from *this* chain for `PopNull` to discard that
/// `KeepNull` wouldn't already leave in an equivalent state (a lone null).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortCircuitMode {
    KeepNull,
    PopNull,
}

/// What the chain's result is consumed as (spec §4.G).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consumer {
    Read,
    Reference,
    Initial,
    IsSaved,
}

/// One link of the chain plus whatever emits its operand: an index
/// expression for `Index*` kinds, or an already-materialized argument tuple
/// for `Call*` kinds. `Field*` kinds carry no operand emitter.
pub struct ChainOp<'a> {
    pub kind: ChainOpKind,
    /// Field/proc name for `Field*`/`Call*` kinds; unused for `Index*`.
    pub name: Option<String>,
    /// The statically known type this link's result has, if the caller's
    /// type checker determined one. Used only by constant folding (to look
    /// up a terminal field's declaration on the *previous* link's type).
    pub static_path: Option<Path>,
    pub emit_operand: Option<Box<dyn FnOnce(&mut CodeBuilder) + 'a>>,
}

/// What [`lower_chain`]/[`lower_scope_ref`] report back once emission is done.
#[derive(Debug, Clone, Default)]
pub struct ChainReport {
    /// Whether any link in the chain could short-circuit on null — callers
    /// use this to decide whether they actually needed a fused end-label.
    pub can_short_circuit: bool,
    /// The folded constant, when the whole chain collapsed to a single
    /// `Push*` instead of a real dereference sequence.
    pub folded: Option<Value>,
}

/// Lowers `emit_head` followed by `ops` for `consumer`, emitting bytecode
/// into `builder`. `head_static_path`, if known, is the head expression's
/// static type — needed only to fold a single-link chain (spec §4.G
/// "Constant folding").
pub fn lower_chain(
    builder: &mut CodeBuilder,
    tree: &dyn ObjectTree,
    emit_head: impl FnOnce(&mut CodeBuilder),
    head_static_path: Option<Path>,
    ops: Vec<ChainOp<'_>>,
    consumer: Consumer,
    mode: ShortCircuitMode,
    span: Span,
) -> Result<ChainReport, CompileError> {
    let can_short_circuit = ops.iter().any(|op| op.kind.is_safe());

    // Both short-circuit modes emit the same guard sequence — see the doc
    // comment on `ShortCircuitMode`.
    let _ = mode;

    if matches!(consumer, Consumer::Read) {
        if let Some(value) = try_fold(tree, &head_static_path, &ops) {
            push_constant(builder, &value);
            return Ok(ChainReport { can_short_circuit, folded: Some(value) });
        }
    }

    emit_head(builder);

    let last_index = ops.len().checked_sub(1);
    let mut guards = Vec::new();
    for (i, op) in ops.into_iter().enumerate() {
        let is_terminal = Some(i) == last_index;

        if op.kind.is_safe() {
            // Guard this op's own receiver: duplicate it, and if it's
            // truthy (non-null) fall through into the real dereference
            // below with the original copy intact; if it's null, jump
            // past the dereference to the shared end label, leaving the
            // null as the chain's short-circuited result.
            builder.emit(Opcode::Dup);
            let not_null = builder.emit_jump(Opcode::JumpIfTrue);
            guards.push(builder.emit_jump(Opcode::Jump));
            builder.patch_jump(not_null);
        }

        if is_terminal && matches!(consumer, Consumer::Reference) && op.kind.is_call() {
            return Err(CompileError::ShapeError { span, reason: "a call result is not an l-value" });
        }
        if is_terminal && matches!(consumer, Consumer::Initial | Consumer::IsSaved) && op.kind.is_call() {
            return Err(CompileError::ShapeError { span, reason: "initial()/issaved() cannot apply to a call result" });
        }
        if is_terminal && matches!(consumer, Consumer::Initial | Consumer::IsSaved) && op.kind.is_index() {
            return Err(CompileError::ShapeError {
                span,
                reason: "initial()/issaved() cannot apply to an indexed access",
            });
        }

        if is_terminal && matches!(consumer, Consumer::Initial | Consumer::IsSaved) && op.kind.is_field() {
            let name = op.name.ok_or(CompileError::ShapeError { span, reason: "field link missing a name" })?;
            let opcode = if matches!(consumer, Consumer::Initial) { Opcode::Initial } else { Opcode::IsSaved };
            builder.emit_string(opcode, &name);
            continue;
        }

        if op.kind.is_field() {
            let name = op.name.ok_or(CompileError::ShapeError { span, reason: "field link missing a name" })?;
            builder.emit_string(Opcode::Dereference, &name);
        } else if op.kind.is_index() {
            let emit_operand = op
                .emit_operand
                .ok_or(CompileError::ShapeError { span, reason: "index link missing its index expression" })?;
            emit_operand(builder);
            builder.emit(Opcode::IndexList);
        } else if op.kind.is_call() {
            let name = op.name.ok_or(CompileError::ShapeError { span, reason: "call link missing a proc name" })?;
            builder.emit_string(Opcode::Dereference, &name);
            let emit_operand =
                op.emit_operand.ok_or(CompileError::ShapeError { span, reason: "call link missing its arguments" })?;
            emit_operand(builder);
            builder.emit(Opcode::Call);
        }
    }

    if !guards.is_empty() {
        let end = builder.current_offset();
        for label in guards {
            builder.patch_jump_to(label, end);
        }
    }

    Ok(ChainReport { can_short_circuit, folded: None })
}

/// A chain is foldable iff its terminal link is a field access whose
/// receiver's static type is known and whose declared `Variable` is
/// `IsConst` or `CompiletimeReadonly` (spec §4.G "Constant folding").
fn try_fold(tree: &dyn ObjectTree, head_static_path: &Option<Path>, ops: &[ChainOp<'_>]) -> Option<Value> {
    let last = ops.last()?;
    if !last.kind.is_field() {
        return None;
    }
    let name = last.name.as_deref()?;
    let receiver_path = if ops.len() >= 2 { ops[ops.len() - 2].static_path.clone() } else { head_static_path.clone() }?;
    let def = tree.get_object(&receiver_path)?;
    let variable = tree.get_variable(def, name)?;
    (variable.flags.is_const || variable.flags.compiletime_readonly).then(|| variable.default.clone())
}

fn push_constant(builder: &mut CodeBuilder, value: &Value) {
    match value {
        Value::Null => builder.emit(Opcode::PushNull),
        Value::Integer(i) => builder.emit_int(Opcode::PushInt, *i),
        Value::Double(d) => builder.emit_double(Opcode::PushDouble, *d),
        Value::String(s) => builder.emit_string(Opcode::PushString, s),
        Value::Path(p) => builder.emit_string(Opcode::PushPath, &p.as_str()),
        Value::Resource(r) => builder.emit_int(Opcode::PushResource, r.0 as i32),
        // Neither is a legal `IsConst`/`CompiletimeReadonly` default in
        // practice; fall back to null rather than fabricate a handle.
        Value::Object(_) | Value::Proc(_) => builder.emit(Opcode::PushNull),
    }
}

/// Lowers a scope reference `E::name` (spec §4.G "Scope reference").
/// `head_type` is `E`'s statically known type, required for this form.
/// Resolves `name` as an instance variable first, else a global; an
/// instance variable reads the *declared default*, not the live field,
/// which is why it folds through `IsConst`/`CompiletimeReadonly` exactly
/// like a normal chain's terminal field would, and otherwise emits the
/// already-established `Initial` opcode rather than a live field read.
pub fn lower_scope_ref(
    builder: &mut CodeBuilder,
    tree: &dyn ObjectTree,
    emit_head: impl FnOnce(&mut CodeBuilder),
    head_type: &Path,
    name: &str,
    span: Span,
) -> Result<ChainReport, CompileError> {
    let def = tree
        .get_object(head_type)
        .ok_or_else(|| CompileError::UnresolvedName { span, type_path: head_type.as_str(), name: name.to_string() })?;

    if let Some(variable) = tree.get_variable(def, name) {
        if variable.flags.is_const || variable.flags.compiletime_readonly {
            push_constant(builder, &variable.default);
            return Ok(ChainReport { can_short_circuit: false, folded: Some(variable.default.clone()) });
        }
        emit_head(builder);
        builder.emit_string(Opcode::Initial, name);
        return Ok(ChainReport::default());
    }

    if tree.get_global_id(def, name).is_some() {
        // No constant-pool slot exists for a precomputed `GlobalId` (spec
        // §6's bytecode has none); DM global vars are not meaningfully
        // overridden per subtype, so resolving by name through the usual
        // identifier path is equivalent in practice.
        builder.emit_string(Opcode::GetIdentifier, name);
        return Ok(ChainReport::default());
    }

    Err(CompileError::UnresolvedName { span, type_path: head_type.as_str(), name: name.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bytecode::Opcode,
        object::{GlobalId, Metaobject, ObjectDefinition, Variable, VariableFlags},
    };

    struct OneType(ObjectDefinition);

    impl ObjectTree for OneType {
        fn get_object(&self, path: &Path) -> Option<&ObjectDefinition> {
            (path == &self.0.type_path).then_some(&self.0)
        }
        fn metaobject(&self, _def: &ObjectDefinition) -> Option<&dyn Metaobject> {
            None
        }
    }

    fn mob_with_const_hp() -> OneType {
        let mut def = ObjectDefinition::new(Path::parse("/mob"), None);
        let mut flags = VariableFlags::default();
        flags.is_const = true;
        def.variables.insert("hp".into(), Variable::new("hp", Value::Integer(100), flags));
        def.globals.insert("tick".into(), GlobalId(0));
        OneType(def)
    }

    #[test]
    fn read_of_a_const_field_folds_to_a_constant_push() {
        let tree = mob_with_const_hp();
        let mut b = CodeBuilder::new();
        let ops = vec![ChainOp {
            kind: ChainOpKind::Field,
            name: Some("hp".into()),
            static_path: None,
            emit_operand: None,
        }];
        let report = lower_chain(
            &mut b,
            &tree,
            |_| {},
            Some(Path::parse("/mob")),
            ops,
            Consumer::Read,
            ShortCircuitMode::KeepNull,
            Span::default(),
        )
        .unwrap();
        assert!(matches!(report.folded, Some(Value::Integer(100))));
        let code = b.build();
        assert_eq!(code.bytecode()[0], Opcode::PushInt as u8);
    }

    #[test]
    fn safe_field_chain_reports_short_circuit_and_patches_a_shared_end_label() {
        let tree = mob_with_const_hp();
        let mut b = CodeBuilder::new();
        let ops = vec![
            ChainOp { kind: ChainOpKind::FieldSafe, name: Some("owner".into()), static_path: None, emit_operand: None },
            ChainOp { kind: ChainOpKind::Field, name: Some("name".into()), static_path: None, emit_operand: None },
        ];
        let report = lower_chain(
            &mut b,
            &tree,
            |builder| builder.emit(Opcode::PushNull),
            None,
            ops,
            Consumer::Read,
            ShortCircuitMode::KeepNull,
            Span::default(),
        )
        .unwrap();
        assert!(report.can_short_circuit);
        assert!(report.folded.is_none());
    }

    #[test]
    fn reference_consumer_rejects_a_terminal_call() {
        let tree = mob_with_const_hp();
        let mut b = CodeBuilder::new();
        let ops = vec![ChainOp {
            kind: ChainOpKind::Call,
            name: Some("Move".into()),
            static_path: None,
            emit_operand: Some(Box::new(|builder: &mut CodeBuilder| builder.emit_push_arguments(&[]))),
        }];
        let err = lower_chain(
            &mut b,
            &tree,
            |_| {},
            None,
            ops,
            Consumer::Reference,
            ShortCircuitMode::KeepNull,
            Span::default(),
        )
        .unwrap_err();
        assert!(matches!(err, CompileError::ShapeError { .. }));
    }

    #[test]
    fn scope_ref_to_a_plain_variable_emits_push_head_then_initial() {
        let tree = mob_with_const_hp();
        let mut def = ObjectDefinition::new(Path::parse("/mob"), None);
        def.variables.insert("name".into(), Variable::new("name", Value::string("?"), VariableFlags::default()));
        let tree = OneType(def);
        let mut b = CodeBuilder::new();
        lower_scope_ref(&mut b, &tree, |builder| builder.emit(Opcode::PushSrc), &Path::parse("/mob"), "name", Span::default())
            .unwrap();
        let code = b.build();
        assert_eq!(code.bytecode()[0], Opcode::PushSrc as u8);
        assert_eq!(code.bytecode()[1], Opcode::Initial as u8);
    }
}
