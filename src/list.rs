//! Ordered + associative hybrid container (component C).
//!
//! A [`List`] is DM's single collection type: a 1-indexed positional
//! sequence plus a map from a restricted set of key types to values. Every
//! mutation that changes membership fires an [`OnAssigned`]/[`BeforeRemoved`]
//! hook, which metaobjects (`args`, `contents`) install at construction.

use std::{collections::HashMap, rc::Rc};

use crate::{
    error::RuntimeError,
    object::ObjectId,
    value::{Path, ResourceId, Value},
};

/// The restricted key space for the associative half of a [`List`]
/// (spec §3: "keys for the associative map must be string / path / object
/// / resource; integer keys address the ordered sequence").
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ListKey {
    String(Rc<str>),
    Path(Path),
    Object(ObjectId),
    Resource(ResourceId),
}

impl TryFrom<&Value> for ListKey {
    type Error = ();

    fn try_from(v: &Value) -> Result<Self, ()> {
        match v {
            Value::String(s) => Ok(Self::String(s.clone())),
            Value::Path(p) => Ok(Self::Path(p.clone())),
            Value::Object(o) => Ok(Self::Object(*o)),
            Value::Resource(r) => Ok(Self::Resource(*r)),
            _ => Err(()),
        }
    }
}

/// Callbacks a metaobject registers when it hands out a list-backed
/// collection (`args`, `contents`). See design note in spec §9: "do not
/// rely on observer-reentrancy order."
pub trait ListHooks {
    fn on_assigned(&mut self, key: &Value, value: &Value);
    fn before_removed(&mut self, key: &Value, value: &Value);
}

/// A DM list: an ordered positional sequence plus an associative map.
///
/// `Clone` (used by [`List::copy`]) intentionally does **not** carry hooks
/// forward — a copied list is a plain, unobserved value, matching how
/// `list.Copy()` in DM detaches from whatever `args`/`contents` wiring
/// produced the original.
pub struct List {
    positional: Vec<Value>,
    associative: HashMap<ListKey, Value>,
    hooks: Option<Box<dyn ListHooks>>,
}

impl std::fmt::Debug for List {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("List")
            .field("positional", &self.positional)
            .field("associative_len", &self.associative.len())
            .finish()
    }
}

impl Default for List {
    fn default() -> Self {
        Self::new()
    }
}

impl List {
    pub fn new() -> Self {
        Self { positional: Vec::new(), associative: HashMap::new(), hooks: None }
    }

    pub fn with_hooks(hooks: Box<dyn ListHooks>) -> Self {
        Self { positional: Vec::new(), associative: HashMap::new(), hooks: Some(hooks) }
    }

    pub fn len(&self) -> usize {
        self.positional.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty()
    }

    pub fn positional_slice(&self) -> &[Value] {
        &self.positional
    }

    /// Raw associative lookup, used by `arglist` splatting which must tell
    /// apart "no such key" from "key present with value Null".
    pub fn get_associative(&self, key: &Value) -> Option<&Value> {
        ListKey::try_from(key).ok().and_then(|k| self.associative.get(&k))
    }

    fn positional_index(&self, i: i32) -> Result<usize, RuntimeError> {
        if i >= 1 && (i as usize) <= self.positional.len() {
            Ok((i - 1) as usize)
        } else {
            Err(RuntimeError::TypeMismatch { expected: "1..=len index", found: "integer out of range" })
        }
    }

    /// `get(key)`: integer keys are 1-indexed positional lookups (out of
    /// range fails `TypeMismatch` per spec §8); every other legal key type
    /// is an associative lookup defaulting to `Null` when absent.
    pub fn get(&self, key: &Value) -> Result<Value, RuntimeError> {
        match key {
            Value::Integer(i) => Ok(self.positional[self.positional_index(*i)?].clone()),
            _ => match ListKey::try_from(key) {
                Ok(k) => Ok(self.associative.get(&k).cloned().unwrap_or(Value::Null)),
                Err(()) => Err(RuntimeError::TypeMismatch { expected: "list key", found: "unsupported key type" }),
            },
        }
    }

    /// `set(key, v)`. Integer keys mutate an existing positional slot.
    /// Associative keys insert into the positional sequence if the key
    /// wasn't already present there, then set the mapped value. Fires
    /// `OnAssigned` on success.
    pub fn set(&mut self, key: &Value, value: Value) -> Result<(), RuntimeError> {
        match key {
            Value::Integer(i) => {
                let idx = self.positional_index(*i)?;
                self.positional[idx] = value.clone();
                self.fire_assigned(key, &value);
                Ok(())
            }
            _ => {
                let k = ListKey::try_from(key)
                    .map_err(|()| RuntimeError::TypeMismatch { expected: "list key", found: "unsupported key type" })?;
                if !self.positional.iter().any(|v| keys_match(v, key)) {
                    self.positional.push(key.clone());
                }
                self.associative.insert(k, value.clone());
                self.fire_assigned(key, &value);
                Ok(())
            }
        }
    }

    /// `add(v)`: appends to the positional sequence, firing
    /// `OnAssigned(new_len, v)`.
    pub fn add(&mut self, value: Value) {
        self.positional.push(value.clone());
        let key = Value::Integer(self.positional.len() as i32);
        self.fire_assigned(&key, &value);
    }

    /// `remove(v)`: removes the first positional occurrence, firing
    /// `BeforeRemoved` before the removal takes effect.
    pub fn remove(&mut self, value: &Value) -> bool {
        let Some(idx) = self.positional.iter().position(|v| keys_match(v, value)) else {
            return false;
        };
        self.fire_removed(&Value::Integer((idx + 1) as i32), value);
        self.positional.remove(idx);
        if let Ok(k) = ListKey::try_from(value) {
            self.associative.remove(&k);
        }
        true
    }

    fn clamp_range(&self, start: i32, end: i32) -> (usize, usize) {
        let len = self.positional.len();
        let start = start.max(1) as usize;
        let end = if end == 0 { len } else { (end as usize).min(len) };
        (start.min(len + 1), end)
    }

    /// `cut(start, end)`: removes the positional range `[start, end]`
    /// (1-indexed, inclusive; `end == 0` means "to the end") in reverse
    /// order, firing `BeforeRemoved` for each element removed.
    pub fn cut(&mut self, start: i32, end: i32) {
        let (start, end) = self.clamp_range(start, end);
        if start > end {
            return;
        }
        for idx in (start..=end).rev() {
            if idx == 0 || idx > self.positional.len() {
                continue;
            }
            let value = self.positional[idx - 1].clone();
            self.fire_removed(&Value::Integer(idx as i32), &value);
            self.positional.remove(idx - 1);
            if let Ok(k) = ListKey::try_from(&value) {
                self.associative.remove(&k);
            }
        }
    }

    /// `copy(start, end)`: an independent clone of the positional slice
    /// `[start, end]` plus the full associative map. No hooks are carried
    /// to the copy.
    pub fn copy(&self, start: i32, end: i32) -> List {
        let (start, end) = self.clamp_range(start, end);
        let positional = if start > end || start == 0 { Vec::new() } else { self.positional[start - 1..end].to_vec() };
        List { positional, associative: self.associative.clone(), hooks: None }
    }

    /// `find(v, start, end)`: 1-indexed search over `[start, end]`
    /// (inclusive both ends, per the Open Question decision in SPEC_FULL
    /// §11 — `Cut`/`Join` are inclusive, so `Find` is made consistent with
    /// them rather than keeping the source's exclusive upper bound).
    /// Returns `0` when absent.
    pub fn find(&self, needle: &Value, start: i32, end: i32) -> i32 {
        let (start, end) = self.clamp_range(start, end);
        if start == 0 || start > end {
            return 0;
        }
        for idx in start..=end {
            if keys_match(&self.positional[idx - 1], needle) {
                return idx as i32;
            }
        }
        0
    }

    /// `join(glue, start, end)`: stringifies each element in `[start, end]`
    /// and concatenates with `glue` between entries.
    pub fn join(&self, glue: &str, start: i32, end: i32) -> String {
        let (start, end) = self.clamp_range(start, end);
        if start == 0 || start > end {
            return String::new();
        }
        self.positional[start - 1..end].iter().map(stringify).collect::<Vec<_>>().join(glue)
    }

    fn fire_assigned(&mut self, key: &Value, value: &Value) {
        if let Some(hooks) = &mut self.hooks {
            hooks.on_assigned(key, value);
        }
    }

    fn fire_removed(&mut self, key: &Value, value: &Value) {
        if let Some(hooks) = &mut self.hooks {
            hooks.before_removed(key, value);
        }
    }
}

fn keys_match(a: &Value, b: &Value) -> bool {
    a.dm_eq(b)
}

fn stringify(v: &Value) -> String {
    match v {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positional_get_is_1_indexed_and_rejects_out_of_range() {
        let mut l = List::new();
        l.add(Value::Integer(10));
        l.add(Value::Integer(20));
        assert!(matches!(l.get(&Value::Integer(1)).unwrap(), Value::Integer(10)));
        assert!(matches!(l.get(&Value::Integer(2)).unwrap(), Value::Integer(20)));
        assert!(l.get(&Value::Integer(0)).is_err());
        assert!(l.get(&Value::Integer(3)).is_err());
    }

    #[test]
    fn associative_set_inserts_key_into_positional_sequence() {
        let mut l = List::new();
        l.set(&Value::string("k"), Value::Integer(2)).unwrap();
        assert_eq!(l.len(), 1);
        assert!(matches!(l.get(&Value::string("k")).unwrap(), Value::Integer(2)));
    }

    #[test]
    fn missing_associative_key_returns_null() {
        let l = List::new();
        assert!(matches!(l.get(&Value::string("missing")).unwrap(), Value::Null));
    }

    #[test]
    fn add_then_remove_restores_original_state() {
        let mut l = List::new();
        l.add(Value::Integer(1));
        l.add(Value::Integer(2));
        let before = l.positional_slice().to_vec();
        l.add(Value::Integer(3));
        assert!(l.remove(&Value::Integer(3)));
        assert_eq!(l.positional_slice(), before.as_slice());
    }

    #[test]
    fn find_returns_zero_when_absent_and_1_indexed_when_present() {
        let mut l = List::new();
        l.add(Value::Integer(7));
        l.add(Value::Integer(8));
        assert_eq!(l.find(&Value::Integer(8), 1, 0), 2);
        assert_eq!(l.find(&Value::Integer(99), 1, 0), 0);
    }

    #[test]
    fn cut_with_end_zero_trims_to_length() {
        let mut l = List::new();
        for i in 1..=5 {
            l.add(Value::Integer(i));
        }
        l.cut(3, 0);
        assert_eq!(l.len(), 2);
    }

    #[test]
    fn copy_then_iterate_matches_direct_slice() {
        let mut l = List::new();
        for i in 1..=4 {
            l.add(Value::Integer(i));
        }
        let copy = l.copy(2, 3);
        assert_eq!(copy.positional_slice().len(), 2);
        assert!(matches!(copy.positional_slice()[0], Value::Integer(2)));
        assert!(matches!(copy.positional_slice()[1], Value::Integer(3)));
    }

    #[test]
    fn join_concatenates_with_glue() {
        let mut l = List::new();
        l.add(Value::Integer(1));
        l.add(Value::string("x"));
        assert_eq!(l.join(",", 1, 0), "1,x");
    }
}
