//! Primary value type representing DM runtime values (component A).
//!
//! [`Value`] is a small tagged union: immediate scalars (`Null`, `Integer`,
//! `Double`) live inline, while everything that needs identity (`Object`,
//! `Resource`, `Proc`) is a cheap handle into state owned elsewhere (the
//! [`crate::object::Heap`] for objects, the host for resources).

use std::{fmt, rc::Rc};

use crate::{
    error::{DebugValue, OpKind, RuntimeError},
    object::{Heap, MetaobjectOp, ObjectId, ObjectTree},
    proc::ProcRef,
};

/// Opaque handle to a host-managed resource (icon, sound, file — whatever
/// the resource manager external collaborator deals in). This crate never
/// interprets the id, only threads it through `Browse`/`BrowseResource`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceId(pub u32);

/// A dotted type/proc path such as `/mob/Player` or `/mob/proc/Login`.
///
/// Equality and hashing are structural (element sequence + absolute flag).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Path {
    pub absolute: bool,
    pub elements: Vec<Rc<str>>,
}

impl Path {
    pub fn new(absolute: bool, elements: impl IntoIterator<Item = impl Into<Rc<str>>>) -> Self {
        Self { absolute, elements: elements.into_iter().map(Into::into).collect() }
    }

    pub fn parse(text: &str) -> Self {
        let absolute = text.starts_with('/');
        let elements = text.split('/').filter(|s| !s.is_empty()).map(Rc::from).collect();
        Self { absolute, elements }
    }

    /// Locates `marker` in the element sequence and returns the elements
    /// that follow it, or `None` if `marker` does not occur.
    ///
    /// Used to distinguish a proc reference like `/mob/proc/Login`: the
    /// marker `"proc"` splits it into the owning type path (`/mob`) and the
    /// proc name (`Login`).
    pub fn after(&self, marker: &str) -> Option<&[Rc<str>]> {
        let idx = self.elements.iter().position(|e| &**e == marker)?;
        Some(&self.elements[idx + 1..])
    }

    /// The elements strictly before the first occurrence of `marker`, as a
    /// standalone path with the same `absolute` flag.
    pub fn before(&self, marker: &str) -> Option<Path> {
        let idx = self.elements.iter().position(|e| &**e == marker)?;
        Some(Path { absolute: self.absolute, elements: self.elements[..idx].to_vec() })
    }

    pub fn as_str(&self) -> String {
        let mut s = if self.absolute { String::from("/") } else { String::new() };
        s.push_str(&self.elements.join("/"));
        s
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str())
    }
}

/// A runtime value.
///
/// `Clone` is cheap for every variant (`String`/`Path` are `Rc`-backed,
/// everything else is `Copy`-sized), unlike the teacher's `Value`, which
/// forbids `Clone` to force explicit ref-count bookkeeping — this core has
/// no heap reference counting to protect (object lifetime is owned by
/// [`crate::object::Heap`], not by `Value` itself).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i32),
    Double(f64),
    String(Rc<str>),
    Path(Path),
    Object(ObjectId),
    Resource(ResourceId),
    Proc(ProcRef),
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Integer(i32::from(b))
    }
}

impl Value {
    pub fn string(s: impl Into<Rc<str>>) -> Self {
        Self::String(s.into())
    }

    /// DM truthiness: `Null` and integer `0` and the empty string are
    /// false; every other value, including `Double(0.0)`, is true.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Integer(0) => false,
            Self::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    fn numeric(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(f64::from(*i)),
            Self::Double(d) => Some(*d),
            _ => None,
        }
    }

    fn both_integer(&self, other: &Self) -> Option<(i32, i32)> {
        match (self, other) {
            (Self::Integer(a), Self::Integer(b)) => Some((*a, *b)),
            _ => None,
        }
    }

    /// Type-first equality per spec §3: numeric types coerce to each other,
    /// object/path compare by identity/structural path equality, `Null`
    /// equals only `Null`, and mixing an object with a number or string is
    /// always unequal.
    pub fn dm_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Null, _) | (_, Self::Null) => false,
            (Self::Object(a), Self::Object(b)) => a == b,
            (Self::Object(_), _) | (_, Self::Object(_)) => false,
            (Self::Path(a), Self::Path(b)) => a == b,
            (Self::Path(_), _) | (_, Self::Path(_)) => false,
            (Self::Resource(a), Self::Resource(b)) => a == b,
            (Self::Resource(_), _) | (_, Self::Resource(_)) => false,
            (Self::Proc(a), Self::Proc(b)) => a == b,
            (Self::Proc(_), _) | (_, Self::Proc(_)) => false,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::String(_), _) | (_, Self::String(_)) => false,
            _ => match (self.numeric(), other.numeric()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }

    fn ordinal_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        match (self.numeric(), other.numeric()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => match (self, other) {
                (Self::String(a), Self::String(b)) => Some(a.cmp(b)),
                _ => None,
            },
        }
    }

    pub fn less_than(&self, other: &Self) -> Result<bool, RuntimeError> {
        self.ordinal_cmp(other)
            .map(|o| o.is_lt())
            .ok_or_else(|| invalid_op(OpKind::Subtract, self, Some(other)))
    }

    pub fn greater_than(&self, other: &Self) -> Result<bool, RuntimeError> {
        self.ordinal_cmp(other)
            .map(|o| o.is_gt())
            .ok_or_else(|| invalid_op(OpKind::Subtract, self, Some(other)))
    }

    /// `+`. Numeric promotes to the wider type; string/string and
    /// string/number concatenate (stringifying the number); `Object` with a
    /// metaobject dispatches to its `Add` hook.
    pub fn add(&self, other: &Self, tree: &dyn ObjectTree, heap: &Heap) -> Result<Self, RuntimeError> {
        if let Self::Object(id) = self {
            if !matches!(other, Self::Null) {
                return dispatch_metaobject(*id, MetaobjectOp::Add, other, tree, heap);
            }
        }
        match (self, other) {
            (a, b) if a.numeric().is_some() && b.numeric().is_some() => numeric_binop(a, b, |x, y| x + y, |x, y| x.checked_add(y)),
            (Self::String(a), Self::String(b)) => Ok(Self::string(format!("{a}{b}"))),
            (Self::String(a), b) if b.numeric().is_some() => Ok(Self::string(format!("{a}{}", stringify_number(b)))),
            _ => Err(invalid_op(OpKind::Add, self, Some(other))),
        }
    }

    /// `-`. Numeric only, or `Object` metaobject `Subtract` hook.
    pub fn sub(&self, other: &Self, tree: &dyn ObjectTree, heap: &Heap) -> Result<Self, RuntimeError> {
        if let Self::Object(id) = self {
            if !matches!(other, Self::Null) {
                return dispatch_metaobject(*id, MetaobjectOp::Subtract, other, tree, heap);
            }
        }
        numeric_binop(self, other, |x, y| x - y, i32::checked_sub).map_err(|_| invalid_op(OpKind::Subtract, self, Some(other)))
    }

    pub fn mul(&self, other: &Self) -> Result<Self, RuntimeError> {
        numeric_binop(self, other, |x, y| x * y, i32::checked_mul).map_err(|_| invalid_op(OpKind::Multiply, self, Some(other)))
    }

    /// `/`. Per the collapsed Open Question decision (SPEC_FULL §11), every
    /// numeric combination — including integer/integer — produces a
    /// `Double`. Division by zero always fails.
    pub fn div(&self, other: &Self) -> Result<Self, RuntimeError> {
        let (a, b) = self
            .numeric()
            .zip(other.numeric())
            .ok_or_else(|| invalid_op(OpKind::Divide, self, Some(other)))?;
        if b == 0.0 {
            return Err(RuntimeError::DivideByZero);
        }
        Ok(Self::Double(a / b))
    }

    pub fn rem(&self, other: &Self) -> Result<Self, RuntimeError> {
        if let Some((a, b)) = self.both_integer(other) {
            if b == 0 {
                return Err(RuntimeError::DivideByZero);
            }
            return Ok(Self::Integer(a.wrapping_rem(b)));
        }
        let (a, b) = self
            .numeric()
            .zip(other.numeric())
            .ok_or_else(|| invalid_op(OpKind::Modulus, self, Some(other)))?;
        if b == 0.0 {
            return Err(RuntimeError::DivideByZero);
        }
        Ok(Self::Double(a % b))
    }

    pub fn neg(&self) -> Result<Self, RuntimeError> {
        match self {
            Self::Integer(i) => Ok(Self::Integer(i.wrapping_neg())),
            Self::Double(d) => Ok(Self::Double(-d)),
            _ => Err(invalid_op(OpKind::Negate, self, None)),
        }
    }

    fn as_integer(&self) -> Option<i32> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn bit_and(&self, other: &Self) -> Result<Self, RuntimeError> {
        int_binop(self, other, OpKind::BitAnd, |a, b| a & b)
    }

    pub fn bit_or(&self, other: &Self) -> Result<Self, RuntimeError> {
        int_binop(self, other, OpKind::BitOr, |a, b| a | b)
    }

    pub fn bit_xor(&self, other: &Self) -> Result<Self, RuntimeError> {
        int_binop(self, other, OpKind::BitXor, |a, b| a ^ b)
    }

    pub fn shl(&self, other: &Self) -> Result<Self, RuntimeError> {
        int_binop(self, other, OpKind::BitShiftLeft, |a, b| a.wrapping_shl(b as u32))
    }

    /// `~x`, truncated to 24 bits (`~x & 0xFFFFFF`) per spec §4.A.
    pub fn bit_not(&self) -> Result<Self, RuntimeError> {
        let i = self.as_integer().ok_or_else(|| invalid_op(OpKind::BitNot, self, None))?;
        Ok(Self::Integer(!i & 0x00FF_FFFF))
    }

    /// `+=`. An `Object` receiver dispatches its `Append` hook rather than
    /// `Add` — DM gives compound assignment its own operator-override slot,
    /// distinct from the binary operator.
    pub fn append(&self, other: &Self, tree: &dyn ObjectTree, heap: &Heap) -> Result<Self, RuntimeError> {
        if let Self::Object(id) = self {
            if !matches!(other, Self::Null) {
                return dispatch_metaobject(*id, MetaobjectOp::Append, other, tree, heap);
            }
        }
        self.add(other, tree, heap)
    }

    /// `-=`. See [`Value::append`]; dispatches `Remove` instead of `Subtract`.
    pub fn remove(&self, other: &Self, tree: &dyn ObjectTree, heap: &Heap) -> Result<Self, RuntimeError> {
        if let Self::Object(id) = self {
            if !matches!(other, Self::Null) {
                return dispatch_metaobject(*id, MetaobjectOp::Remove, other, tree, heap);
            }
        }
        self.sub(other, tree, heap)
    }

    /// `|=`. See [`Value::append`]; dispatches `Combine`.
    pub fn combine(&self, other: &Self, tree: &dyn ObjectTree, heap: &Heap) -> Result<Self, RuntimeError> {
        if let Self::Object(id) = self {
            if !matches!(other, Self::Null) {
                return dispatch_metaobject(*id, MetaobjectOp::Combine, other, tree, heap);
            }
        }
        self.bit_or(other)
    }
}

fn invalid_op(op: OpKind, lhs: &Value, rhs: Option<&Value>) -> RuntimeError {
    RuntimeError::InvalidOperation { op, lhs: DebugValue::from(lhs), rhs: rhs.map(DebugValue::from) }
}

fn numeric_binop(
    a: &Value,
    b: &Value,
    on_float: impl Fn(f64, f64) -> f64,
    on_int: impl Fn(i32, i32) -> Option<i32>,
) -> Result<Value, RuntimeError> {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => match on_int(*x, *y) {
            Some(v) => Ok(Value::Integer(v)),
            None => Ok(Value::Double(on_float(f64::from(*x), f64::from(*y)))),
        },
        _ => match (a.numeric(), b.numeric()) {
            (Some(x), Some(y)) => Ok(Value::Double(on_float(x, y))),
            _ => Err(RuntimeError::TypeMismatch { expected: "numeric", found: "non-numeric" }),
        },
    }
}

fn int_binop(a: &Value, b: &Value, op: OpKind, f: impl Fn(i32, i32) -> i32) -> Result<Value, RuntimeError> {
    match (a.as_integer(), b.as_integer()) {
        (Some(x), Some(y)) => Ok(Value::Integer(f(x, y))),
        _ => Err(invalid_op(op, a, Some(b))),
    }
}

fn stringify_number(v: &Value) -> String {
    match v {
        Value::Integer(i) => i.to_string(),
        Value::Double(d) => d.to_string(),
        _ => unreachable!("stringify_number called on non-numeric value"),
    }
}

fn dispatch_metaobject(
    id: ObjectId,
    op: MetaobjectOp,
    other: &Value,
    tree: &dyn ObjectTree,
    heap: &Heap,
) -> Result<Value, RuntimeError> {
    let obj = heap.get_instance(id).ok_or(RuntimeError::NullDeref)?;
    let def = tree.get_object(&obj.type_path).ok_or(RuntimeError::NullDeref)?;
    match tree.metaobject(def) {
        Some(meta) => meta.invoke(op, id, other, heap),
        None => Err(RuntimeError::InvalidOperation {
            op: match op {
                MetaobjectOp::Add => OpKind::Add,
                MetaobjectOp::Subtract => OpKind::Subtract,
                MetaobjectOp::Append => OpKind::Append,
                MetaobjectOp::Remove => OpKind::Remove,
                MetaobjectOp::Combine => OpKind::Combine,
                MetaobjectOp::Output => OpKind::Output,
            },
            lhs: DebugValue::from(&Value::Object(id)),
            rhs: Some(DebugValue::from(other)),
        }),
    }
}
