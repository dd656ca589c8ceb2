//! Metadata references carried as instruction operands.
//!
//! These are plain data: a [`TypeRef`] names a type, a [`FieldRef`] or a
//! [`MethodRef`] names a member on an owner type, a [`CallSite`] describes
//! the signature of an indirect call. Nothing here is resolved; the host
//! decides what a reference means when a body is materialized.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::Ident;

/* ─────────────────────────── Types ─────────────────────────── */

/// Reference to a type, by primitive keyword or by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TypeRef {
    /// No value (`void`).
    Void,
    /// `bool`.
    Bool,
    /// UTF-16 code unit (`char`).
    Char,
    /// `int8`.
    I8,
    /// `uint8`.
    U8,
    /// `int16`.
    I16,
    /// `uint16`.
    U16,
    /// `int32`.
    I32,
    /// `uint32`.
    U32,
    /// `int64`.
    I64,
    /// `uint64`.
    U64,
    /// `float32`.
    F32,
    /// `float64`.
    F64,
    /// `native int`.
    IntPtr,
    /// `native uint`.
    UIntPtr,
    /// `string`.
    String,
    /// `object`.
    Object,
    /// Zero-based one-dimensional array.
    Array(Box<TypeRef>),
    /// User type, by name.
    Named(Ident),
}

const KEYWORDS: &[(&str, TypeRef)] = &[
    ("void", TypeRef::Void),
    ("bool", TypeRef::Bool),
    ("char", TypeRef::Char),
    ("int8", TypeRef::I8),
    ("uint8", TypeRef::U8),
    ("int16", TypeRef::I16),
    ("uint16", TypeRef::U16),
    ("int32", TypeRef::I32),
    ("uint32", TypeRef::U32),
    ("int64", TypeRef::I64),
    ("uint64", TypeRef::U64),
    ("float32", TypeRef::F32),
    ("float64", TypeRef::F64),
    ("nint", TypeRef::IntPtr),
    ("nuint", TypeRef::UIntPtr),
    ("string", TypeRef::String),
    ("object", TypeRef::Object),
];

impl TypeRef {
    /// Named user type.
    pub fn named(name: impl Into<Ident>) -> Self { TypeRef::Named(name.into()) }

    /// Array whose elements are `elem`.
    pub fn array_of(elem: TypeRef) -> Self { TypeRef::Array(Box::new(elem)) }

    /// Element type when `self` is an array.
    pub fn element(&self) -> Option<&TypeRef> {
        match self {
            TypeRef::Array(elem) => Some(elem),
            _ => None,
        }
    }

    /// Storage size in bytes for primitive value types (`sizeof`).
    pub const fn size_of(&self) -> Option<u32> {
        match self {
            TypeRef::Bool | TypeRef::I8 | TypeRef::U8 => Some(1),
            TypeRef::Char | TypeRef::I16 | TypeRef::U16 => Some(2),
            TypeRef::I32 | TypeRef::U32 | TypeRef::F32 => Some(4),
            TypeRef::I64 | TypeRef::U64 | TypeRef::F64 => Some(8),
            TypeRef::IntPtr | TypeRef::UIntPtr => Some(usize::BITS / 8),
            _ => None,
        }
    }

    /// True for primitive value types (those [`size_of`](Self::size_of) knows).
    pub const fn is_primitive(&self) -> bool { self.size_of().is_some() }

    /// True for the integer primitives, `bool` and `char` included.
    pub const fn is_integral(&self) -> bool {
        matches!(
            self,
            TypeRef::Bool
                | TypeRef::Char
                | TypeRef::I8
                | TypeRef::U8
                | TypeRef::I16
                | TypeRef::U16
                | TypeRef::I32
                | TypeRef::U32
                | TypeRef::I64
                | TypeRef::U64
                | TypeRef::IntPtr
                | TypeRef::UIntPtr
        )
    }

    /// Keyword for primitive types (`"int32"`), `None` for arrays and named types.
    pub fn keyword(&self) -> Option<&'static str> {
        KEYWORDS.iter().find(|(_, ty)| ty == self).map(|(kw, _)| *kw)
    }

    /// Parses `int32`, `string[]`, `My.Type`, `object[][]`.
    ///
    /// Returns `None` for empty input or names containing whitespace or
    /// reserved punctuation.
    pub fn parse(text: &str) -> Option<TypeRef> {
        let text = text.trim();
        if let Some(inner) = text.strip_suffix("[]") {
            return TypeRef::parse(inner).map(TypeRef::array_of);
        }
        if text.is_empty() {
            return None;
        }
        if let Some((_, ty)) = KEYWORDS.iter().find(|(kw, _)| *kw == text) {
            return Some(ty.clone());
        }
        let valid = text
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | '`' | '+' | '<' | '>'));
        valid.then(|| TypeRef::named(text))
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Array(elem) => write!(f, "{elem}[]"),
            TypeRef::Named(name) => f.write_str(name),
            other => f.write_str(other.keyword().unwrap_or("?")),
        }
    }
}

/// Maps a Rust type onto the [`TypeRef`] it stands for in signatures.
///
/// Used by the compile-time typed builder variants (`box_of::<i32>()`) and
/// by the contract binder to derive method signatures from type parameters.
pub trait StaticType {
    /// The type reference.
    fn type_ref() -> TypeRef;
}

macro_rules! static_types {
    ($($rust:ty => $variant:ident),* $(,)?) => {
        $( impl StaticType for $rust { fn type_ref() -> TypeRef { TypeRef::$variant } } )*
    };
}

static_types! {
    () => Void,
    bool => Bool,
    char => Char,
    i8 => I8,
    u8 => U8,
    i16 => I16,
    u16 => U16,
    i32 => I32,
    u32 => U32,
    i64 => I64,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    isize => IntPtr,
    usize => UIntPtr,
    String => String,
}

impl StaticType for &str {
    fn type_ref() -> TypeRef { TypeRef::String }
}

impl<T: StaticType> StaticType for Vec<T> {
    fn type_ref() -> TypeRef { TypeRef::array_of(T::type_ref()) }
}

/// Marker standing for `object` in type parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Object;

impl StaticType for Object {
    fn type_ref() -> TypeRef { TypeRef::Object }
}

/* ─────────────────────────── Signatures ─────────────────────────── */

/// Return type plus ordered parameter types (the implicit `this` excluded).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Signature {
    /// Return type (`Void` for none).
    pub ret: TypeRef,
    /// Parameter types, in declaration order.
    pub params: Vec<TypeRef>,
}

impl Signature {
    /// Builds a signature.
    pub fn new(ret: TypeRef, params: impl Into<Vec<TypeRef>>) -> Self {
        Self { ret, params: params.into() }
    }

    /// `void` return, no parameter.
    pub fn action() -> Self { Self::new(TypeRef::Void, Vec::new()) }

    /// True when nothing is returned.
    pub fn returns_void(&self) -> bool { self.ret == TypeRef::Void }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.ret)?;
        write_list(f, &self.params)?;
        f.write_str(")")
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[TypeRef]) -> fmt::Result {
    for (i, ty) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{ty}")?;
    }
    Ok(())
}

/* ─────────────────────────── Members ─────────────────────────── */

/// Reference to a method on an owner type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MethodRef {
    /// Declaring type.
    pub owner: TypeRef,
    /// Method name (`.ctor` for constructors).
    pub name: Ident,
    /// Declared signature.
    pub sig: Signature,
    /// Instance method (receives `this` as argument 0).
    pub has_this: bool,
    /// Extra argument types supplied at a variadic call site.
    pub varargs: Vec<TypeRef>,
}

impl MethodRef {
    /// Instance method.
    pub fn instance(owner: TypeRef, name: impl Into<Ident>, ret: TypeRef, params: impl Into<Vec<TypeRef>>) -> Self {
        Self { owner, name: name.into(), sig: Signature::new(ret, params), has_this: true, varargs: Vec::new() }
    }

    /// Static method.
    pub fn new_static(owner: TypeRef, name: impl Into<Ident>, ret: TypeRef, params: impl Into<Vec<TypeRef>>) -> Self {
        Self { owner, name: name.into(), sig: Signature::new(ret, params), has_this: false, varargs: Vec::new() }
    }

    /// Instance constructor (`.ctor`).
    pub fn ctor(owner: TypeRef, params: impl Into<Vec<TypeRef>>) -> Self {
        Self::instance(owner, CTOR_NAME, TypeRef::Void, params)
    }

    /// True for `.ctor`.
    pub fn is_ctor(&self) -> bool { self.name == CTOR_NAME }

    /// Number of values popped by a call, `this` and varargs included.
    pub fn arg_count(&self) -> usize {
        self.sig.params.len() + self.varargs.len() + usize::from(self.has_this)
    }
}

/// Name given to instance constructors.
pub const CTOR_NAME: &str = ".ctor";

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.has_this && !self.is_ctor() {
            f.write_str("instance ")?;
        }
        write!(f, "{}::{}(", self.owner, self.name)?;
        write_list(f, &self.sig.params)?;
        if !self.varargs.is_empty() {
            f.write_str(", ..., ")?;
            write_list(f, &self.varargs)?;
        }
        f.write_str(")")?;
        if !self.sig.returns_void() {
            write!(f, " -> {}", self.sig.ret)?;
        }
        Ok(())
    }
}

/// Reference to a field on an owner type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FieldRef {
    /// Declaring type.
    pub owner: TypeRef,
    /// Field name.
    pub name: Ident,
    /// Field type.
    pub ty: TypeRef,
    /// Static (per type) rather than per instance.
    pub is_static: bool,
}

impl FieldRef {
    /// Instance field.
    pub fn instance(owner: TypeRef, name: impl Into<Ident>, ty: TypeRef) -> Self {
        Self { owner, name: name.into(), ty, is_static: false }
    }

    /// Static field.
    pub fn new_static(owner: TypeRef, name: impl Into<Ident>, ty: TypeRef) -> Self {
        Self { owner, name: name.into(), ty, is_static: true }
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_static {
            f.write_str("static ")?;
        }
        write!(f, "{}::{} : {}", self.owner, self.name, self.ty)
    }
}

/// Calling convention of an indirect call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CallConv {
    /// Managed default.
    #[default]
    Default,
    /// Managed, variadic.
    VarArg,
    /// Unmanaged cdecl.
    C,
    /// Unmanaged stdcall.
    StdCall,
    /// Unmanaged thiscall.
    ThisCall,
    /// Unmanaged fastcall.
    FastCall,
}

impl CallConv {
    /// Keyword used in listings.
    pub const fn keyword(self) -> &'static str {
        match self {
            CallConv::Default => "default",
            CallConv::VarArg => "vararg",
            CallConv::C => "cdecl",
            CallConv::StdCall => "stdcall",
            CallConv::ThisCall => "thiscall",
            CallConv::FastCall => "fastcall",
        }
    }

    /// Inverse of [`keyword`](Self::keyword).
    pub fn from_keyword(text: &str) -> Option<Self> {
        [Self::Default, Self::VarArg, Self::C, Self::StdCall, Self::ThisCall, Self::FastCall]
            .into_iter()
            .find(|conv| conv.keyword() == text)
    }
}

/// Stand-alone signature operand of `calli`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CallSite {
    /// Calling convention.
    pub conv: CallConv,
    /// Target signature.
    pub sig: Signature,
}

impl CallSite {
    /// Managed call site.
    pub fn managed(ret: TypeRef, params: impl Into<Vec<TypeRef>>) -> Self {
        Self { conv: CallConv::Default, sig: Signature::new(ret, params) }
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.conv != CallConv::Default {
            write!(f, "{} ", self.conv.keyword())?;
        }
        f.write_str("(")?;
        write_list(f, &self.sig.params)?;
        write!(f, ") -> {}", self.sig.ret)
    }
}

/// Operand of `ldtoken`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Token {
    /// Runtime type handle.
    Type(TypeRef),
    /// Runtime field handle.
    Field(FieldRef),
    /// Runtime method handle.
    Method(MethodRef),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Type(ty) => write!(f, "type {ty}"),
            Token::Field(field) => write!(f, "field {field}"),
            Token::Method(method) => write!(f, "method {method}"),
        }
    }
}
