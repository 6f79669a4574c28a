//! Proc invocation (component E): argument binding, splatting and the
//! special identifier names (`..`, `initial`, `issaved`).

use indexmap::IndexMap;

use crate::{
    bytecode::Code,
    error::RuntimeError,
    list::List,
    scope::Ident,
    value::{Path, Value},
};

/// A proc value: the dotted path to a compiled proc (e.g. `/mob/proc/Login`).
///
/// Per spec §3, [`crate::value::Path`] already carries a helper to split a
/// path at a marker element (`"proc"`), which is exactly how a `Value::Proc`
/// distinguishes its owning type from its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcRef(pub Path);

impl ProcRef {
    /// Splits `/type/path/proc/name` into (`/type/path`, `name`).
    pub fn split(&self) -> Option<(Path, &str)> {
        let owner = self.0.before("proc")?;
        let name = self.0.after("proc")?.first()?;
        Some((owner, name))
    }
}

/// A single formal parameter.
#[derive(Debug, Clone)]
pub struct ParamDef {
    pub name: String,
    pub default: Option<Value>,
}

/// A compiled, invocable proc.
#[derive(Debug, Clone)]
pub struct ProcDef {
    /// The type that declares this proc, e.g. `/mob` for `/mob/proc/Login`.
    pub owner: Path,
    pub name: String,
    pub params: Vec<ParamDef>,
    pub code: Code,
}

impl ProcDef {
    /// Rebuilds the `/owner/proc/name` reference used to resolve `..` and
    /// self-recursive calls during execution.
    pub fn proc_ref(&self) -> ProcRef {
        let mut elements: Vec<String> = self.owner.elements.iter().map(|e| e.to_string()).collect();
        elements.push("proc".to_string());
        elements.push(self.name.clone());
        ProcRef(Path::new(true, elements))
    }
}

/// One argument slot: either an already-resolved value or an identifier to
/// be resolved at materialization time (spec §4.E).
#[derive(Debug, Clone)]
pub enum ArgEntry {
    Value(Value),
    Ident(Ident),
}

#[derive(Debug, Clone, Default)]
pub struct PositionalArgs(pub Vec<ArgEntry>);

#[derive(Debug, Clone, Default)]
pub struct NamedArgs(pub IndexMap<String, ArgEntry>);

/// The pair of (positional, named) arguments the VM assembles before a call.
#[derive(Debug, Clone, Default)]
pub struct ArgTuple {
    pub positional: PositionalArgs,
    pub named: NamedArgs,
}

impl ArgTuple {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Resolves every `Ident` entry to its current value, producing the
    /// materialized tuple a proc activation actually binds against.
    pub fn materialize(
        self,
        mut resolve: impl FnMut(&Ident) -> Result<Value, RuntimeError>,
    ) -> Result<(Vec<Value>, IndexMap<String, Value>), RuntimeError> {
        let mut positional = Vec::with_capacity(self.positional.0.len());
        for entry in self.positional.0 {
            positional.push(match entry {
                ArgEntry::Value(v) => v,
                ArgEntry::Ident(ref id) => resolve(id)?,
            });
        }
        let mut named = IndexMap::with_capacity(self.named.0.len());
        for (name, entry) in self.named.0 {
            let value = match entry {
                ArgEntry::Value(v) => v,
                ArgEntry::Ident(ref id) => resolve(id)?,
            };
            named.insert(name, value);
        }
        Ok((positional, named))
    }
}

/// Expands `arglist(list)` into an [`ArgTuple`] (spec §4.E, scenario 6).
///
/// Walks the list's positional sequence; an element that is itself a
/// `String` key present in the associative map becomes a named argument
/// (keyed by that string), everything else stays positional, in order.
pub fn splat_list(list: &List) -> ArgTuple {
    let mut positional = Vec::new();
    let mut named = IndexMap::new();
    for value in list.positional_slice() {
        if let Value::String(s) = value {
            if let Some(assoc_value) = list.get_associative(value) {
                named.insert(s.to_string(), ArgEntry::Value(assoc_value.clone()));
                continue;
            }
        }
        positional.push(ArgEntry::Value(value.clone()));
    }
    ArgTuple { positional: PositionalArgs(positional), named: NamedArgs(named) }
}

/// Binds a materialized (positional, named) pair against a proc's formal
/// parameters, left-to-right by position then by name, falling back to each
/// parameter's default (or `Null` if none) for anything left unfilled.
pub fn bind_parameters(
    params: &[ParamDef],
    mut positional: Vec<Value>,
    mut named: IndexMap<String, Value>,
) -> Vec<Value> {
    let mut bound = vec![Value::Null; params.len()];
    positional.reverse();
    for (slot, param) in bound.iter_mut().zip(params) {
        if let Some(value) = named.shift_remove(&param.name) {
            *slot = value;
        } else if let Some(value) = positional.pop() {
            *slot = value;
        } else if let Some(default) = &param.default {
            *slot = default.clone();
        }
    }
    bound
}

/// Special identifier names with dedicated runtime meaning (spec §6).
///
/// `initial`/`issaved` are deliberately not named here: they only ever reach
/// this crate as a dereference chain's `Consumer::Initial`/`Consumer::IsSaved`
/// (lowered straight to the `Initial`/`IsSaved` opcodes, see `lower.rs`),
/// never as a bare `GetIdentifier` name, so there is no runtime string to
/// match against.
pub const SUPER: &str = "..";
pub const ARGS: &str = "args";
pub const USR: &str = "usr";
pub const SRC: &str = "src";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_parameters_prefers_named_then_positional_then_default() {
        let params = vec![
            ParamDef { name: "a".into(), default: None },
            ParamDef { name: "b".into(), default: Some(Value::Integer(9)) },
            ParamDef { name: "c".into(), default: None },
        ];
        let mut named = IndexMap::new();
        named.insert("c".into(), Value::Integer(3));
        let bound = bind_parameters(&params, vec![Value::Integer(1)], named);
        assert!(matches!(bound[0], Value::Integer(1)));
        assert!(matches!(bound[1], Value::Integer(9)));
        assert!(matches!(bound[2], Value::Integer(3)));
    }

    #[test]
    fn proc_ref_splits_on_proc_marker() {
        let p = ProcRef(Path::parse("/mob/proc/Login"));
        let (owner, name) = p.split().unwrap();
        assert_eq!(owner.as_str(), "/mob");
        assert_eq!(name, "Login");
    }
}
