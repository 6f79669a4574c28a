//! Error types for the compile-time lowering and run-time interpreter.
//!
//! Matches the teacher crate's style: hand-rolled enums implementing
//! [`std::fmt::Display`] and [`std::error::Error`], no `thiserror`/`anyhow`.
//! Errors are never swallowed — every opcode handler and lowering step
//! propagates with `?`.

use std::fmt;

use crate::value::Value;

/// A lightweight source-location span, analogous to the teacher's `CodeRange`.
///
/// Opaque byte offsets into whatever source buffer the (external) parser
/// produced; this crate never interprets them beyond carrying them through
/// to error reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub const fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Errors raised while lowering a dereference/call/index chain (component G).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// A consumer required an l-value (or a definite variable) but the chain
    /// terminates in a call result — e.g. `initial(x.f())` or using `x.f()`
    /// as an assignment target.
    ShapeError { span: Span, reason: &'static str },
    /// A scope reference (`E::name`) named something not on the static type.
    UnresolvedName { span: Span, type_path: String, name: String },
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ShapeError { span, reason } => write!(f, "{span}: invalid l-value: {reason}"),
            Self::UnresolvedName { span, type_path, name } => {
                write!(f, "{span}: '{name}' is not a variable or global on {type_path}")
            }
        }
    }
}

impl std::error::Error for CompileError {}

/// The operand kind an opcode dispatch site expected versus what it popped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackSlot {
    Value,
    Ident,
    ArgTuple,
}

impl fmt::Display for StackSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Value => "value",
            Self::Ident => "identifier",
            Self::ArgTuple => "argument tuple",
        };
        f.write_str(name)
    }
}

/// An operator/operand combination with no defined semantics (and no
/// metaobject override, where one could apply).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulus,
    Negate,
    BitAnd,
    BitOr,
    BitXor,
    BitNot,
    BitShiftLeft,
    Append,
    Remove,
    Combine,
    Mask,
    Output,
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Run-time errors raised by the bytecode interpreter (component F).
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeError {
    /// `op` has no defined meaning for this operand pair and no metaobject
    /// override applies.
    InvalidOperation { op: OpKind, lhs: DebugValue, rhs: Option<DebugValue> },
    /// An index or receiver was of the wrong type for the operation.
    TypeMismatch { expected: &'static str, found: &'static str },
    /// Field/index/call through a non-safe operator on a null receiver.
    NullDeref,
    DivideByZero,
    InvalidOpcode(u8),
    TruncatedBytecode,
    StringNotTerminated,
    ProcUnresolved { name: String },
    /// An I/O opcode's receiver is neither a mob nor a client.
    InvalidRecipient,
    EnumeratorUnderflow,
    ScopeUnderflow,
    /// The operand stack held the wrong polymorphic variant at a pop site.
    StackTypeError { expected: StackSlot, found: StackSlot },
    /// A `const` variable was the target of an assignment-producing identifier.
    ConstAssignment { name: String },
    /// The `Error` opcode, which always fails.
    ExplicitError,
}

/// A cheap, cloneable rendering of a [`Value`] for embedding in error
/// messages without having to thread a live heap/interner through error
/// construction sites.
#[derive(Debug, Clone, PartialEq)]
pub struct DebugValue(pub String);

impl From<&Value> for DebugValue {
    fn from(v: &Value) -> Self {
        Self(format!("{v:?}"))
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidOperation { op, lhs, rhs } => match rhs {
                Some(rhs) => write!(f, "invalid operation {op} between {} and {}", lhs.0, rhs.0),
                None => write!(f, "invalid operation {op} on {}", lhs.0),
            },
            Self::TypeMismatch { expected, found } => write!(f, "type mismatch: expected {expected}, found {found}"),
            Self::NullDeref => write!(f, "attempt to dereference null"),
            Self::DivideByZero => write!(f, "division by zero"),
            Self::InvalidOpcode(b) => write!(f, "invalid opcode byte 0x{b:02x}"),
            Self::TruncatedBytecode => write!(f, "bytecode stream ended mid-instruction"),
            Self::StringNotTerminated => write!(f, "string operand missing terminating NUL"),
            Self::ProcUnresolved { name } => write!(f, "proc '{name}' could not be resolved"),
            Self::InvalidRecipient => write!(f, "I/O receiver is neither mob nor client"),
            Self::EnumeratorUnderflow => write!(f, "list-enumerator stack underflow"),
            Self::ScopeUnderflow => write!(f, "scope stack underflow"),
            Self::StackTypeError { expected, found } => {
                write!(f, "operand stack type error: expected {expected}, found {found}")
            }
            Self::ConstAssignment { name } => write!(f, "cannot assign to const variable '{name}'"),
            Self::ExplicitError => write!(f, "explicit error opcode"),
        }
    }
}

impl std::error::Error for RuntimeError {}
