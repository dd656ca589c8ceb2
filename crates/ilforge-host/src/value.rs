//! Runtime values of the reference interpreter.
//!
//! The evaluation stack only knows a handful of shapes: 32-bit, 64-bit and
//! native integers, one float width, and references. Narrow primitive types
//! (`int8`, `char`, `bool`, ...) travel as `I32`, `float32` as `F64`.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use ilforge_core::TypeRef;

use crate::error::{ExecError, ExecResult};
use crate::runtime::HeapObject;

/// One interpreter value.
#[derive(Clone)]
pub enum Value {
    /// Result of a method returning nothing.
    Void,
    /// 32-bit integer (also every narrower integer, `bool` and `char`).
    I32(i32),
    /// 64-bit integer.
    I64(i64),
    /// Native-width integer.
    NInt(i64),
    /// Floating point (both widths).
    F64(f64),
    /// Null reference.
    Null,
    /// String reference.
    Str(Rc<str>),
    /// Object reference.
    Object(Rc<HeapObject>),
    /// Array reference.
    Array(Rc<ArrayData>),
    /// Boxed primitive.
    Boxed(Rc<BoxedValue>),
}

/// Storage of an array.
#[derive(Debug)]
pub struct ArrayData {
    /// Element type.
    pub elem: TypeRef,
    /// Elements.
    pub items: RefCell<Vec<Value>>,
}

impl ArrayData {
    /// Array of `len` default elements.
    pub fn new(elem: TypeRef, len: usize) -> Self {
        let items = vec![Value::default_for(&elem); len];
        Self { elem, items: RefCell::new(items) }
    }
}

/// A primitive moved to the heap by `box`.
#[derive(Debug)]
pub struct BoxedValue {
    /// Primitive type of the payload.
    pub ty: TypeRef,
    /// Payload.
    pub value: Value,
}

impl Value {
    /// Zero value of a slot of type `ty`.
    pub fn default_for(ty: &TypeRef) -> Value {
        match ty {
            TypeRef::Void => Value::Void,
            TypeRef::I64 | TypeRef::U64 => Value::I64(0),
            TypeRef::IntPtr | TypeRef::UIntPtr => Value::NInt(0),
            TypeRef::F32 | TypeRef::F64 => Value::F64(0.0),
            ty if ty.is_integral() => Value::I32(0),
            _ => Value::Null,
        }
    }

    /// Shape name used in diagnostics.
    pub fn type_name(&self) -> String {
        match self {
            Value::Void => "void".into(),
            Value::I32(_) => "int32".into(),
            Value::I64(_) => "int64".into(),
            Value::NInt(_) => "nint".into(),
            Value::F64(_) => "float".into(),
            Value::Null => "null".into(),
            Value::Str(_) => "string".into(),
            Value::Object(obj) => obj.runtime_type().name().to_owned(),
            Value::Array(arr) => format!("{}[]", arr.elem),
            Value::Boxed(b) => format!("boxed {}", b.ty),
        }
    }

    /// True for `Null` and every reference shape.
    pub const fn is_reference(&self) -> bool {
        matches!(self, Value::Null | Value::Str(_) | Value::Object(_) | Value::Array(_) | Value::Boxed(_))
    }

    /// Truth value as tested by `brtrue`/`brfalse`.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::I32(v) => *v != 0,
            Value::I64(v) | Value::NInt(v) => *v != 0,
            Value::F64(v) => *v != 0.0,
            Value::Void | Value::Null => false,
            Value::Str(_) | Value::Object(_) | Value::Array(_) | Value::Boxed(_) => true,
        }
    }

    /// Normalizes a stack value for storage into a slot of type `ty`
    /// (locals, arguments, fields, array elements).
    pub fn narrow_to(self, ty: &TypeRef) -> Value {
        match (ty, self) {
            (TypeRef::I8, Value::I32(v)) => Value::I32(i32::from(v as i8)),
            (TypeRef::U8 | TypeRef::Bool, Value::I32(v)) => Value::I32(i32::from(v as u8)),
            (TypeRef::I16, Value::I32(v)) => Value::I32(i32::from(v as i16)),
            (TypeRef::U16 | TypeRef::Char, Value::I32(v)) => Value::I32(i32::from(v as u16)),
            (TypeRef::F32, Value::F64(v)) => Value::F64(f64::from(v as f32)),
            (TypeRef::I64 | TypeRef::U64, Value::I32(v)) => Value::I64(i64::from(v)),
            (TypeRef::IntPtr | TypeRef::UIntPtr, Value::I32(v)) => Value::NInt(i64::from(v)),
            (_, v) => v,
        }
    }

    /// Converts an argument supplied by the embedder to the declared
    /// parameter type.
    pub fn coerce_to(self, ty: &TypeRef) -> ExecResult<Value> {
        let mismatch = |found: &Value| ExecError::Conversion { expected: ty.to_string(), found: found.type_name() };
        match ty {
            TypeRef::I64 | TypeRef::U64 => match self {
                Value::I64(_) => Ok(self),
                Value::I32(v) => Ok(Value::I64(i64::from(v))),
                other => Err(mismatch(&other)),
            },
            TypeRef::IntPtr | TypeRef::UIntPtr => match self {
                Value::NInt(_) => Ok(self),
                Value::I32(v) => Ok(Value::NInt(i64::from(v))),
                Value::I64(v) => Ok(Value::NInt(v)),
                other => Err(mismatch(&other)),
            },
            TypeRef::F32 | TypeRef::F64 => match self {
                Value::F64(_) => Ok(self.narrow_to(ty)),
                Value::I32(v) => Ok(Value::F64(f64::from(v))),
                other => Err(mismatch(&other)),
            },
            ty if ty.is_integral() => match self {
                Value::I32(_) => Ok(self.narrow_to(ty)),
                other => Err(mismatch(&other)),
            },
            TypeRef::String => match self {
                Value::Str(_) | Value::Null => Ok(self),
                other => Err(mismatch(&other)),
            },
            TypeRef::Object => Ok(match self {
                Value::I32(_) => boxed(TypeRef::I32, self),
                Value::I64(_) => boxed(TypeRef::I64, self),
                Value::NInt(_) => boxed(TypeRef::IntPtr, self),
                Value::F64(_) => boxed(TypeRef::F64, self),
                other => other,
            }),
            TypeRef::Array(_) => match self {
                Value::Array(_) | Value::Null => Ok(self),
                other => Err(mismatch(&other)),
            },
            TypeRef::Named(_) => match self {
                Value::Object(_) | Value::Null => Ok(self),
                other => Err(mismatch(&other)),
            },
            _ => Err(mismatch(&self)),
        }
    }

    /// Reference identity (strings compare by content, as if interned).
    pub fn same_reference(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Boxed(a), Value::Boxed(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

fn boxed(ty: TypeRef, value: Value) -> Value { Value::Boxed(Rc::new(BoxedValue { ty, value })) }

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Void, Value::Void) => true,
            (Value::I32(a), Value::I32(b)) => a == b,
            (Value::I64(a), Value::I64(b)) | (Value::NInt(a), Value::NInt(b)) => a == b,
            (Value::F64(a), Value::F64(b)) => a == b,
            (Value::Boxed(a), Value::Boxed(b)) => Rc::ptr_eq(a, b) || (a.ty == b.ty && a.value == b.value),
            (a, b) => a.same_reference(b),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Void => f.write_str("Void"),
            Value::I32(v) => write!(f, "I32({v})"),
            Value::I64(v) => write!(f, "I64({v})"),
            Value::NInt(v) => write!(f, "NInt({v})"),
            Value::F64(v) => write!(f, "F64({v})"),
            Value::Null => f.write_str("Null"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::Object(obj) => write!(f, "Object({})", obj.runtime_type().name()),
            Value::Array(arr) => write!(f, "Array({}; len={})", arr.elem, arr.items.borrow().len()),
            Value::Boxed(b) => write!(f, "Boxed({:?})", b.value),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Void => Ok(()),
            Value::I32(v) => write!(f, "{v}"),
            Value::I64(v) | Value::NInt(v) => write!(f, "{v}"),
            Value::F64(v) => write!(f, "{v}"),
            Value::Null => f.write_str("null"),
            Value::Str(s) => f.write_str(s),
            Value::Boxed(b) => write!(f, "{}", b.value),
            other => f.write_str(&other.type_name()),
        }
    }
}

/* Conversions */
impl From<()> for Value { fn from((): ()) -> Self { Value::Void } }
impl From<bool> for Value { fn from(v: bool) -> Self { Value::I32(i32::from(v)) } }
impl From<i8> for Value { fn from(v: i8) -> Self { Value::I32(i32::from(v)) } }
impl From<u8> for Value { fn from(v: u8) -> Self { Value::I32(i32::from(v)) } }
impl From<i16> for Value { fn from(v: i16) -> Self { Value::I32(i32::from(v)) } }
impl From<u16> for Value { fn from(v: u16) -> Self { Value::I32(i32::from(v)) } }
impl From<i32> for Value { fn from(v: i32) -> Self { Value::I32(v) } }
impl From<i64> for Value { fn from(v: i64) -> Self { Value::I64(v) } }
impl From<f32> for Value { fn from(v: f32) -> Self { Value::F64(f64::from(v)) } }
impl From<f64> for Value { fn from(v: f64) -> Self { Value::F64(v) } }
impl From<&str> for Value { fn from(v: &str) -> Self { Value::Str(Rc::from(v)) } }
impl From<String> for Value { fn from(v: String) -> Self { Value::Str(Rc::from(v)) } }

fn conversion(expected: &str, found: &Value) -> ExecError {
    ExecError::Conversion { expected: expected.to_owned(), found: found.type_name() }
}

impl TryFrom<Value> for i32 {
    type Error = ExecError;
    fn try_from(v: Value) -> Result<Self, Self::Error> {
        match v {
            Value::I32(i) => Ok(i),
            other => Err(conversion("int32", &other)),
        }
    }
}

impl TryFrom<Value> for i64 {
    type Error = ExecError;
    fn try_from(v: Value) -> Result<Self, Self::Error> {
        match v {
            Value::I64(i) | Value::NInt(i) => Ok(i),
            Value::I32(i) => Ok(i64::from(i)),
            other => Err(conversion("int64", &other)),
        }
    }
}

impl TryFrom<Value> for f64 {
    type Error = ExecError;
    fn try_from(v: Value) -> Result<Self, Self::Error> {
        match v {
            Value::F64(x) => Ok(x),
            other => Err(conversion("float64", &other)),
        }
    }
}

impl TryFrom<Value> for bool {
    type Error = ExecError;
    fn try_from(v: Value) -> Result<Self, Self::Error> {
        match v {
            Value::I32(i) => Ok(i != 0),
            other => Err(conversion("bool", &other)),
        }
    }
}

impl TryFrom<Value> for String {
    type Error = ExecError;
    fn try_from(v: Value) -> Result<Self, Self::Error> {
        match v {
            Value::Str(s) => Ok(s.to_string()),
            other => Err(conversion("string", &other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_stack_shapes() {
        assert_eq!(Value::default_for(&TypeRef::U8), Value::I32(0));
        assert_eq!(Value::default_for(&TypeRef::U64), Value::I64(0));
        assert_eq!(Value::default_for(&TypeRef::F32), Value::F64(0.0));
        assert_eq!(Value::default_for(&TypeRef::String), Value::Null);
    }

    #[test]
    fn narrowing_truncates_small_integers() {
        assert_eq!(Value::I32(300).narrow_to(&TypeRef::U8), Value::I32(44));
        assert_eq!(Value::I32(0xFF).narrow_to(&TypeRef::I8), Value::I32(-1));
        assert_eq!(Value::I32(7).narrow_to(&TypeRef::I64), Value::I64(7));
    }

    #[test]
    fn coercion_at_the_call_boundary() {
        assert_eq!(Value::I32(3).coerce_to(&TypeRef::I64).expect("widen"), Value::I64(3));
        assert!(Value::from("x").coerce_to(&TypeRef::I32).is_err());
        let boxed = Value::I32(5).coerce_to(&TypeRef::Object).expect("box");
        assert_eq!(boxed.type_name(), "boxed int32");
    }

    #[test]
    fn try_from_round_trip() {
        assert_eq!(i32::try_from(Value::from(42)).expect("i32"), 42);
        assert_eq!(String::try_from(Value::from("hi")).expect("string"), "hi");
        assert!(bool::try_from(Value::from(true)).expect("bool"));
        assert!(f64::try_from(Value::Null).is_err());
    }
}
