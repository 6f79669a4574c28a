#![doc = include_str!("../README.md")]
#![expect(clippy::module_name_repetitions, reason = "handle/value naming mirrors DM terminology")]

//! Runtime core for a DM-language reimplementation: a stack-based bytecode
//! virtual machine (see [`interp`]) and the compile-time lowering of chained
//! dereference/index/call expressions into that bytecode (see [`lower`]).
//!
//! The parser/AST producer, the object-tree loader and the connection layer
//! are external collaborators: this crate only defines the trait seams
//! ([`object::ObjectTree`], [`object::Metaobject`]) it needs from them.

mod bytecode;
mod error;
mod interp;
mod list;
mod lower;
mod object;
mod proc;
mod scope;
mod tracer;
mod value;

pub use crate::{
    bytecode::{Code, CodeBuilder, Opcode},
    error::{CompileError, RuntimeError, Span},
    interp::{Interpreter, VmConfig},
    list::List,
    lower::{ChainOp, ChainOpKind, ChainReport, Consumer, ShortCircuitMode, lower_chain, lower_scope_ref},
    object::{
        GlobalId, Heap, Metaobject, MetaobjectOp, Object, ObjectDefinition, ObjectId, ObjectTree, Variable,
        VariableFlags,
    },
    proc::{ArgEntry, ArgTuple, NamedArgs, ParamDef, PositionalArgs, ProcDef, ProcRef},
    scope::{Ident, Scope, ScopeId, ScopeStack},
    tracer::{NoopTracer, StderrTracer, VmTracer},
    value::{Path, ResourceId, Value},
};
