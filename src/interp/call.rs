//! Proc invocation, object construction and argument-tuple assembly.

use indexmap::IndexMap;

use super::Interpreter;
use crate::{
    bytecode::{ParamTag, Reader},
    error::RuntimeError,
    object::{ObjectDefinition, ObjectId},
    proc::{ArgEntry, ArgTuple, NamedArgs, PositionalArgs, ProcDef},
    scope::Ident,
    value::{Path, Value},
};

impl<'t> Interpreter<'_, 't, '_> {
    /// `PushArguments`: the values for `count` arguments were already pushed
    /// (in order); this opcode only carries each slot's shape (positional vs
    /// named-with-name). Pops them back off in reverse and re-assembles an
    /// `ArgTuple`, which it pushes as a single stack entry (spec §6).
    pub(super) fn exec_push_arguments(&mut self, reader: &mut Reader<'_>) -> Result<(), RuntimeError> {
        let count = reader.read_i32()?.max(0) as usize;
        let mut records = Vec::with_capacity(count);
        for _ in 0..count {
            let tag = ParamTag::try_from(reader.read_u8()?)?;
            let name = match tag {
                ParamTag::Named => Some(reader.read_string()?),
                ParamTag::Unnamed => None,
            };
            records.push(name);
        }
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            values.push(self.pop_value()?);
        }
        values.reverse();

        let mut positional = Vec::new();
        let mut named = IndexMap::new();
        for (name, value) in records.into_iter().zip(values) {
            match name {
                Some(n) => {
                    named.insert(n, ArgEntry::Value(value));
                }
                None => positional.push(ArgEntry::Value(value)),
            }
        }
        self.push_arg_tuple(ArgTuple { positional: PositionalArgs(positional), named: NamedArgs(named) });
        Ok(())
    }

    /// `Call`: pops an argument tuple then a callee identifier, resolves the
    /// target proc, and runs it to completion in a nested interpreter,
    /// pushing its return value.
    pub(super) fn exec_call(&mut self) -> Result<(), RuntimeError> {
        let value = self.invoke()?;
        self.push_value(value)
    }

    /// `CallStatement`: identical to `Call` but the result is discarded —
    /// used when a call appears in statement position.
    pub(super) fn exec_call_statement(&mut self) -> Result<(), RuntimeError> {
        self.invoke()?;
        Ok(())
    }

    fn invoke(&mut self) -> Result<Value, RuntimeError> {
        let mut args = self.pop_arg_tuple()?;
        let callee = self.pop_ident()?;

        let (call_src, proc_def) = match &callee {
            Ident::Super => {
                if args.positional.0.is_empty() && args.named.0.is_empty() {
                    args = self.call_args.clone();
                }
                let proc_def = self.lookup_super()?;
                (self.src(), proc_def)
            }
            Ident::SelfProc => {
                let current = self.current_proc.clone().ok_or(RuntimeError::ProcUnresolved { name: "self".into() })?;
                let (owner, name) = current.split().ok_or(RuntimeError::ProcUnresolved { name: "self".into() })?;
                let owner_def =
                    self.tree.get_object(&owner).ok_or(RuntimeError::ProcUnresolved { name: name.to_string() })?;
                let proc_def = self
                    .tree
                    .ancestors(owner_def)
                    .into_iter()
                    .find_map(|a| a.procs.get(name))
                    .cloned()
                    .ok_or(RuntimeError::ProcUnresolved { name: name.to_string() })?;
                (self.src(), proc_def)
            }
            Ident::Field(obj, name) => {
                let proc_def = self.lookup_proc(*obj, name)?;
                (Some(*obj), proc_def)
            }
            Ident::Local(..) | Ident::Global(..) | Ident::ListIndex(..) => {
                let value = self.read_ident(&callee)?;
                let Value::Proc(p) = value else {
                    return Err(RuntimeError::ProcUnresolved { name: "<non-proc identifier>".into() });
                };
                let (owner, name) = p.split().ok_or(RuntimeError::ProcUnresolved { name: "<malformed>".into() })?;
                let owner_def =
                    self.tree.get_object(&owner).ok_or(RuntimeError::ProcUnresolved { name: name.to_string() })?;
                let proc_def = self
                    .tree
                    .ancestors(owner_def)
                    .into_iter()
                    .find_map(|a| a.procs.get(name))
                    .cloned()
                    .ok_or(RuntimeError::ProcUnresolved { name: name.to_string() })?;
                (self.src(), proc_def)
            }
        };

        let (positional, named) = args.materialize(|id| self.read_ident(id))?;
        let bound = crate::proc::bind_parameters(&proc_def.params, positional, named.clone());
        let param_names: Vec<String> = proc_def.params.iter().map(|p| p.name.clone()).collect();
        let positional_args = bound.into_iter().map(ArgEntry::Value).collect();
        let named_args = named.into_iter().map(|(k, v)| (k, ArgEntry::Value(v))).collect();
        let call_args = ArgTuple {
            positional: PositionalArgs(positional_args),
            named: NamedArgs(named_args),
        };
        let proc_ref = proc_def.proc_ref();

        let mut nested = Interpreter::new(
            self.heap,
            self.tree,
            self.tracer,
            self.config,
            call_src,
            self.usr,
            Some(proc_ref),
            call_args,
        );
        // Bind positional-by-name locals so the callee sees ordinary named
        // parameters, not just a raw args list.
        for (name, value) in param_names.iter().zip(nested.call_args.positional.0.iter()) {
            if let ArgEntry::Value(v) = value {
                nested.scopes.define(nested.scope, name.clone(), v.clone());
            }
        }
        nested.run(&proc_def.code)
    }

    fn lookup_proc(&self, obj: ObjectId, name: &str) -> Result<ProcDef, RuntimeError> {
        let instance = self.heap.get_instance(obj).ok_or(RuntimeError::NullDeref)?;
        let def = self.tree.get_object(&instance.type_path).ok_or(RuntimeError::NullDeref)?;
        self.tree
            .ancestors(def)
            .into_iter()
            .find_map(|a| a.procs.get(name))
            .cloned()
            .ok_or(RuntimeError::ProcUnresolved { name: name.to_string() })
    }

    /// Resolves `..` against the *parent* of the currently executing proc's
    /// defining type, per spec §4.E.
    fn lookup_super(&self) -> Result<ProcDef, RuntimeError> {
        let current = self.current_proc.as_ref().ok_or(RuntimeError::ProcUnresolved { name: "..".into() })?;
        let (owner, name) = current.split().ok_or(RuntimeError::ProcUnresolved { name: "..".into() })?;
        let owner_def = self.tree.get_object(&owner).ok_or(RuntimeError::ProcUnresolved { name: name.to_string() })?;
        let parent_path = owner_def.parent.clone().ok_or(RuntimeError::ProcUnresolved { name: name.to_string() })?;
        let parent_def =
            self.tree.get_object(&parent_path).ok_or(RuntimeError::ProcUnresolved { name: name.to_string() })?;
        self.tree
            .ancestors(parent_def)
            .into_iter()
            .find_map(|a| a.procs.get(name))
            .cloned()
            .ok_or(RuntimeError::ProcUnresolved { name: name.to_string() })
    }

    /// `CreateObject`: pops an argument tuple and a type path, allocates a
    /// new instance with its declared defaults, then runs its `New` proc (if
    /// any) to completion before pushing the resulting object value.
    pub(super) fn exec_create_object(&mut self) -> Result<(), RuntimeError> {
        let args = self.pop_arg_tuple()?;
        let path_value = self.pop_value()?;
        let Value::Path(path) = path_value else {
            return Err(RuntimeError::TypeMismatch { expected: "type path", found: "non-path CreateObject operand" });
        };
        let def = self.resolve_create_path(&path).ok_or(RuntimeError::NullDeref)?;
        let id = self.heap.allocate(def, self.tree);

        if let Some(new_proc) = self.tree.ancestors(def).into_iter().find_map(|a| a.procs.get("New")) {
            let new_proc = new_proc.clone();
            let (positional, named) = args.materialize(|ident| self.read_ident(ident))?;
            let bound = crate::proc::bind_parameters(&new_proc.params, positional, named);
            let call_args = ArgTuple {
                positional: PositionalArgs(bound.into_iter().map(ArgEntry::Value).collect()),
                named: NamedArgs(IndexMap::new()),
            };
            let proc_ref = new_proc.proc_ref();
            let param_names: Vec<String> = new_proc.params.iter().map(|p| p.name.clone()).collect();
            let mut nested =
                Interpreter::new(self.heap, self.tree, self.tracer, self.config, Some(id), self.usr, Some(proc_ref), call_args);
            for (name, value) in param_names.iter().zip(nested.call_args.positional.0.iter()) {
                if let ArgEntry::Value(v) = value {
                    nested.scopes.define(nested.scope, name.clone(), v.clone());
                }
            }
            nested.run(&new_proc.code)?;
        }
        self.push_value(Value::Object(id))
    }

    /// `CreateObject`'s path resolution (spec §4.F): a single-element
    /// relative path (e.g. `new Foo(...)`, as opposed to `new /obj/Foo(...)`)
    /// is rebound against the current scope's `src` type before falling back
    /// to a literal lookup, so `Foo` means "the `Foo` nested under `src`'s
    /// own type" rather than a bare top-level `/Foo`.
    fn resolve_create_path(&self, path: &Path) -> Option<&'t ObjectDefinition> {
        if !path.absolute && path.elements.len() == 1 {
            if let Some(def) = self.src().and_then(|src| self.heap.get_instance(src)).and_then(|instance| {
                let mut elements: Vec<String> =
                    instance.type_path.elements.iter().map(|e| e.to_string()).collect();
                elements.extend(path.elements.iter().map(|e| e.to_string()));
                self.tree.get_object(&Path::new(true, elements))
            }) {
                return Some(def);
            }
        }
        self.tree.get_object(path)
    }
}
