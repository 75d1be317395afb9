//! Static types used to direct unmarshalling.

use std::fmt;
use std::sync::Arc;

/// The declared type of a parameter, field or collection element.
///
/// Only [`Type::Bool`], [`Type::Int`] and [`Type::Float`] reject a wire
/// `null`; every other type admits it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    /// Anything; the concrete type comes from the wire hint or shape
    Any,
    Bool,
    Int,
    Float,
    Str,
    Date,
    /// JSON passthrough
    Raw,
    Nullable(Box<Type>),
    Array(Box<Type>),
    List(Box<Type>),
    Map(Box<Type>),
    Enum(Arc<str>),
    /// A bean, opaque class or interface registered in the class catalog
    Class(Arc<str>),
}

impl Type {
    pub fn class(name: &str) -> Self {
        Type::Class(Arc::from(name))
    }

    pub fn enumeration(name: &str) -> Self {
        Type::Enum(Arc::from(name))
    }

    pub fn array(element: Type) -> Self {
        Type::Array(Box::new(element))
    }

    pub fn list(element: Type) -> Self {
        Type::List(Box::new(element))
    }

    pub fn map(value: Type) -> Self {
        Type::Map(Box::new(value))
    }

    pub fn nullable(inner: Type) -> Self {
        match inner {
            Type::Nullable(_) => inner,
            other => Type::Nullable(Box::new(other)),
        }
    }

    /// Non-nullable primitive: wire `null` cannot be assigned to it.
    pub fn is_primitive(&self) -> bool {
        matches!(self, Type::Bool | Type::Int | Type::Float)
    }

    /// Strips any `Nullable` wrapper.
    pub fn base(&self) -> &Type {
        match self {
            Type::Nullable(inner) => inner.base(),
            other => other,
        }
    }

    /// Converter cache key for this type, if it maps onto a single value shape.
    ///
    /// `Any` and `Class` have no key: a class may be a bean or an opaque
    /// object, which is only known once the catalog is consulted.
    pub fn key(&self) -> Option<TypeKey> {
        match self.base() {
            Type::Any | Type::Class(_) | Type::Nullable(_) => None,
            Type::Bool => Some(TypeKey::Bool),
            Type::Int => Some(TypeKey::Int),
            Type::Float => Some(TypeKey::Float),
            Type::Str => Some(TypeKey::Str),
            Type::Date => Some(TypeKey::Date),
            Type::Raw => Some(TypeKey::Raw),
            Type::Array(_) => Some(TypeKey::Array),
            Type::List(_) => Some(TypeKey::List),
            Type::Map(_) => Some(TypeKey::Map),
            Type::Enum(_) => Some(TypeKey::Enum),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Any => f.write_str("any"),
            Type::Bool => f.write_str("bool"),
            Type::Int => f.write_str("int"),
            Type::Float => f.write_str("float"),
            Type::Str => f.write_str("string"),
            Type::Date => f.write_str("date"),
            Type::Raw => f.write_str("json"),
            Type::Nullable(inner) => write!(f, "{}?", inner),
            Type::Array(inner) => write!(f, "{}[]", inner),
            Type::List(inner) => write!(f, "list<{}>", inner),
            Type::Map(inner) => write!(f, "map<{}>", inner),
            Type::Enum(name) | Type::Class(name) => f.write_str(name),
        }
    }
}

/// Runtime shape of a value, used to key the exact converter cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TypeKey {
    Null,
    Bool,
    Int,
    Float,
    Str,
    Date,
    Enum,
    Array,
    List,
    Map,
    Bean,
    Object,
    Raw,
}
