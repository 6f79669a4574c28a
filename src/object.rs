//! Object tree & definitions (component B) and live object heap.
//!
//! [`ObjectTree`] is the external collaborator interface: the type
//! hierarchy, variable tables and proc tables are loaded elsewhere (the
//! `ObjectTree` loader named in spec §1) and handed to this crate as a
//! trait object. This module owns only what the interpreter needs to read
//! from that tree plus the live-instance [`Heap`] it manages itself.
//!
//! Lists are not a distinct [`Value`] variant (spec §3 enumerates exactly
//! `Null`/`Integer`/`Double`/`String`/`Path`/`Object`/`Resource`/`Proc`): a
//! DM list is the builtin `/list` type, i.e. a heap slot like any other
//! object, just backed by [`List`] storage instead of a field map. Hence
//! [`HeapData`] below, mirroring the teacher's own `HeapData` split between
//! instance and container payloads.

use indexmap::IndexMap;

use crate::{error::RuntimeError, list::List, proc::ProcDef, value::{Path, Value}};

/// Handle into [`Heap`]. Despite the name, this may identify either a
/// field-map instance or a list-backed slot — see the module docs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId(u32);

impl ObjectId {
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

/// Handle identifying a module-level global slot (see `ObjectTree::get_global_id`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlobalId(pub u32);

/// Bit flags carried by a [`Variable`] declaration (spec §3).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VariableFlags {
    pub is_const: bool,
    pub is_global: bool,
    pub compiletime_readonly: bool,
    /// `var/tmp` — excluded from persistence. Defaults to `false`, so an
    /// ordinary declared variable is persistent unless the loader marks it
    /// `tmp`, matching DM's default-saved behavior. Drives `issaved()`
    /// (`interp/mod.rs`) alongside `is_global` (globals are never "saved"
    /// as an instance field).
    pub tmp: bool,
    /// Declared static type bitset (e.g. "this var only ever holds `/mob`
    /// instances"). Opaque to this crate beyond being carried for the
    /// object-tree loader's own use; stored as a bitset of loader-defined
    /// type tags.
    pub val_type: u32,
}

/// An instance variable, global, or proc-default declaration.
#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub default: Value,
    pub flags: VariableFlags,
}

impl Variable {
    pub fn new(name: impl Into<String>, default: Value, flags: VariableFlags) -> Self {
        Self { name: name.into(), default, flags }
    }
}

/// Immutable per-type record: the type hierarchy node spec §3 describes.
#[derive(Debug, Clone)]
pub struct ObjectDefinition {
    pub type_path: Path,
    pub parent: Option<Path>,
    pub variables: IndexMap<String, Variable>,
    pub procs: IndexMap<String, ProcDef>,
    pub globals: IndexMap<String, GlobalId>,
}

impl ObjectDefinition {
    pub fn new(type_path: Path, parent: Option<Path>) -> Self {
        Self { type_path, parent, variables: IndexMap::new(), procs: IndexMap::new(), globals: IndexMap::new() }
    }
}

/// The operator-override hooks a type's metaobject may provide (spec §3/§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaobjectOp {
    Add,
    Subtract,
    Append,
    Remove,
    Combine,
    Output,
}

/// Per-type operator override handler.
///
/// Modeled as a table indexed by type (see [`ObjectTree::metaobject`]) per
/// the design note in spec §9: dispatch happens through a lookup, not
/// virtual inheritance, keeping [`crate::value::Value`] free of hidden
/// polymorphism.
pub trait Metaobject {
    fn invoke(&self, op: MetaobjectOp, this: ObjectId, other: &Value, heap: &Heap) -> Result<Value, RuntimeError>;
}

/// The object-tree loader's interface, consumed by this crate (spec §6).
///
/// Implemented by the host; this crate never constructs an `ObjectTree`
/// itself beyond the trivial [`NullTree`] used in its own unit tests.
pub trait ObjectTree {
    fn get_object(&self, path: &Path) -> Option<&ObjectDefinition>;
    fn get_variable<'a>(&self, def: &'a ObjectDefinition, name: &str) -> Option<&'a Variable> {
        def.variables.get(name)
    }
    fn get_global_id(&self, def: &ObjectDefinition, name: &str) -> Option<GlobalId> {
        def.globals.get(name).copied()
    }
    fn metaobject(&self, def: &ObjectDefinition) -> Option<&dyn Metaobject>;

    /// Walks the inheritance chain starting at `def`, innermost first, for
    /// `Search`-variant field/proc lookups.
    fn ancestors<'a>(&'a self, def: &'a ObjectDefinition) -> Vec<&'a ObjectDefinition> {
        let mut chain = vec![def];
        let mut current = def;
        while let Some(parent_path) = &current.parent {
            match self.get_object(parent_path) {
                Some(parent) => {
                    chain.push(parent);
                    current = parent;
                }
                None => break,
            }
        }
        chain
    }
}

/// A no-op [`ObjectTree`] with no types registered, used by this crate's own
/// unit tests that only exercise scalar value operations.
pub(crate) struct NullTree;

impl ObjectTree for NullTree {
    fn get_object(&self, _path: &Path) -> Option<&ObjectDefinition> {
        None
    }
    fn metaobject(&self, _def: &ObjectDefinition) -> Option<&dyn Metaobject> {
        None
    }
}

/// A live object instance: the type it was constructed from plus its
/// mutable field map (spec §3 "Object instance").
#[derive(Debug, Clone)]
pub struct Object {
    pub type_path: Path,
    pub fields: IndexMap<String, Value>,
}

/// What a heap slot actually stores.
#[derive(Debug)]
pub enum HeapData {
    Instance(Object),
    List(List),
}

/// Owns every live object instance, every standalone list, and the
/// module-level global slots.
///
/// Instances are deleted explicitly (`DeleteObject`), never garbage
/// collected, matching spec §5 ("appearance registry... guarded by a single
/// writer" — this crate's heap follows the same single-writer-per-proc
/// discipline, with no concurrent access).
#[derive(Debug, Default)]
pub struct Heap {
    slots: Vec<Option<HeapData>>,
    globals: Vec<Value>,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, data: HeapData) -> ObjectId {
        for (idx, slot) in self.slots.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(data);
                return ObjectId::from_raw(idx as u32);
            }
        }
        self.slots.push(Some(data));
        ObjectId::from_raw((self.slots.len() - 1) as u32)
    }

    pub fn is_live(&self, id: ObjectId) -> bool {
        matches!(self.slots.get(id.raw() as usize), Some(Some(_)))
    }

    pub fn get_instance(&self, id: ObjectId) -> Option<&Object> {
        match self.slots.get(id.raw() as usize)?.as_ref()? {
            HeapData::Instance(obj) => Some(obj),
            HeapData::List(_) => None,
        }
    }

    pub fn get_instance_mut(&mut self, id: ObjectId) -> Option<&mut Object> {
        match self.slots.get_mut(id.raw() as usize)?.as_mut()? {
            HeapData::Instance(obj) => Some(obj),
            HeapData::List(_) => None,
        }
    }

    pub fn get_list(&self, id: ObjectId) -> Option<&List> {
        match self.slots.get(id.raw() as usize)?.as_ref()? {
            HeapData::List(list) => Some(list),
            HeapData::Instance(_) => None,
        }
    }

    pub fn get_list_mut(&mut self, id: ObjectId) -> Option<&mut List> {
        match self.slots.get_mut(id.raw() as usize)?.as_mut()? {
            HeapData::List(list) => Some(list),
            HeapData::Instance(_) => None,
        }
    }

    /// Allocates a new instance with the definition's default field values
    /// (spec §3 invariant: every live `Value::Object` points at an instance
    /// whose definition exists in the tree). Constructor procs (`New`) are
    /// invoked by the VM's `CreateObject` handler after allocation, not here.
    pub fn allocate(&mut self, def: &ObjectDefinition, tree: &dyn ObjectTree) -> ObjectId {
        let mut fields = IndexMap::new();
        for ancestor in tree.ancestors(def).into_iter().rev() {
            for variable in ancestor.variables.values() {
                fields.insert(variable.name.clone(), variable.default.clone());
            }
        }
        self.insert(HeapData::Instance(Object { type_path: def.type_path.clone(), fields }))
    }

    /// Allocates a new, empty list, e.g. for `new /list()` or an
    /// interpreter-constructed literal.
    pub fn allocate_list(&mut self, list: List) -> ObjectId {
        self.insert(HeapData::List(list))
    }

    /// Removes a heap slot (instance or list) from the tree. Per spec §3,
    /// the hosting metaobject `Output`/destructor hook (if any) is the
    /// caller's responsibility to invoke before calling this — this method
    /// is the bookkeeping half of `DeleteObject`.
    pub fn delete(&mut self, id: ObjectId) -> Result<(), RuntimeError> {
        match self.slots.get_mut(id.raw() as usize) {
            Some(slot @ Some(_)) => {
                *slot = None;
                Ok(())
            }
            _ => Err(RuntimeError::NullDeref),
        }
    }

    pub fn get_global(&self, id: GlobalId) -> Value {
        self.globals.get(id.0 as usize).cloned().unwrap_or(Value::Null)
    }

    pub fn set_global(&mut self, id: GlobalId, value: Value) {
        let idx = id.0 as usize;
        if idx >= self.globals.len() {
            self.globals.resize(idx + 1, Value::Null);
        }
        self.globals[idx] = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf_def() -> ObjectDefinition {
        let mut def = ObjectDefinition::new(Path::parse("/mob"), None);
        def.variables.insert("hp".into(), Variable::new("hp", Value::Integer(100), VariableFlags::default()));
        def
    }

    #[test]
    fn allocate_populates_defaults_and_delete_frees_the_slot() {
        let mut heap = Heap::new();
        let def = leaf_def();
        let id = heap.allocate(&def, &NullTree);
        assert!(heap.is_live(id));
        assert!(matches!(heap.get_instance(id).unwrap().fields.get("hp"), Some(Value::Integer(100))));
        heap.delete(id).unwrap();
        assert!(!heap.is_live(id));
    }

    #[test]
    fn delete_twice_fails() {
        let mut heap = Heap::new();
        let id = heap.allocate(&leaf_def(), &NullTree);
        heap.delete(id).unwrap();
        assert_eq!(heap.delete(id), Err(RuntimeError::NullDeref));
    }

    #[test]
    fn freed_slots_are_reused() {
        let mut heap = Heap::new();
        let def = leaf_def();
        let a = heap.allocate(&def, &NullTree);
        heap.delete(a).unwrap();
        let b = heap.allocate(&def, &NullTree);
        assert_eq!(a, b);
    }

    #[test]
    fn list_and_instance_slots_do_not_cross_resolve() {
        let mut heap = Heap::new();
        let list_id = heap.allocate_list(List::new());
        assert!(heap.get_list(list_id).is_some());
        assert!(heap.get_instance(list_id).is_none());
    }
}
