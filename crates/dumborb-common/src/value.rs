//! In-process value model
//!
//! [`Value`] is what registered members receive as arguments and return as
//! results. Scalars are plain data. Arrays, lists, maps, beans and opaque
//! objects are *identity-bearing*: they live behind an [`Arc`], so the same
//! instance can sit at several places in a graph, including inside itself.
//!
//! # Identity
//!
//! Identity is explicit. [`Value::identity`] returns an [`ObjectId`] derived
//! from the shared allocation, and [`Value::same`] compares two values by it.
//! An `ObjectId` is only meaningful while some clone of the value is alive;
//! traversal states keep the values they key on for the whole pass.
//!
//! # Equality
//!
//! `PartialEq` is structural and terminates on cyclic graphs: a pair of
//! containers already under comparison is assumed equal. Opaque objects are
//! only equal to themselves.
//!
//! # Example
//!
//! ```
//! use dumborb_common::Value;
//!
//! let node = Value::map([("name", Value::from("root"))]);
//! if let Value::Map(map) = &node {
//!     map.write().insert("self".into(), node.clone());
//! }
//! assert!(node.same(&node.clone()));
//! ```

use std::any::Any;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::protocol::error::{DumborbError, Result};
use crate::types::TypeKey;

/// Identity of a shared value, derived from its allocation address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(usize);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// A mutable container shared by reference.
pub struct Shared<T>(Arc<RwLock<T>>);

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Shared(Arc::clone(&self.0))
    }
}

impl<T> Shared<T> {
    pub fn new(inner: T) -> Self {
        Shared(Arc::new(RwLock::new(inner)))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.0.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.0.write()
    }

    pub fn id(&self) -> ObjectId {
        ObjectId(Arc::as_ptr(&self.0) as *const () as usize)
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<T: Clone> Shared<T> {
    /// Copies the contents out so no lock is held while they are walked.
    pub fn snapshot(&self) -> T {
        self.0.read().clone()
    }
}

pub type SharedList = Shared<Vec<Value>>;
pub type SharedMap = Shared<BTreeMap<String, Value>>;

/// A record of a catalog bean class: class name plus named fields.
#[derive(Clone)]
pub struct Bean {
    class: Arc<str>,
    fields: SharedMap,
}

impl Bean {
    pub fn new(class: &str, fields: BTreeMap<String, Value>) -> Self {
        Self {
            class: Arc::from(class),
            fields: Shared::new(fields),
        }
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn fields(&self) -> &SharedMap {
        &self.fields
    }

    pub fn get(&self, field: &str) -> Option<Value> {
        self.fields.read().get(field).cloned()
    }

    pub fn set(&self, field: &str, value: Value) {
        self.fields.write().insert(field.to_string(), value);
    }

    pub fn id(&self) -> ObjectId {
        self.fields.id()
    }
}

/// An opaque Rust object exposed under a catalog class name.
#[derive(Clone)]
pub struct Instance {
    class: Arc<str>,
    inner: Arc<dyn Any + Send + Sync>,
}

impl Instance {
    pub fn new<T: Any + Send + Sync>(class: &str, inner: T) -> Self {
        Self::from_arc(class, Arc::new(inner))
    }

    pub fn from_arc<T: Any + Send + Sync>(class: &str, inner: Arc<T>) -> Self {
        Self {
            class: Arc::from(class),
            inner,
        }
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.inner).downcast::<T>().ok()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    pub fn id(&self) -> ObjectId {
        ObjectId(Arc::as_ptr(&self.inner) as *const () as usize)
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumValue {
    pub type_name: Arc<str>,
    pub variant: String,
}

/// A dynamically typed in-process value.
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// Milliseconds since the Unix epoch
    Date(i64),
    Enum(EnumValue),
    /// Fixed sequence, a bare JSON array on the wire
    Array(SharedList),
    /// Growable sequence, `{"$type":"list","list":[...]}` on the wire
    List(SharedList),
    Map(SharedMap),
    Bean(Bean),
    Object(Instance),
    /// JSON passed through untouched
    Raw(serde_json::Value),
}

impl Value {
    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Shared::new(items))
    }

    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Shared::new(items))
    }

    pub fn map<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Value::Map(Shared::new(
            entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    pub fn bean<I, K>(class: &str, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Value::Bean(Bean::new(
            class,
            fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    pub fn object<T: Any + Send + Sync>(class: &str, inner: T) -> Self {
        Value::Object(Instance::new(class, inner))
    }

    pub fn enum_variant(type_name: &str, variant: &str) -> Self {
        Value::Enum(EnumValue {
            type_name: Arc::from(type_name),
            variant: variant.to_string(),
        })
    }

    pub fn date(millis: i64) -> Self {
        Value::Date(millis)
    }

    /// Identity of an identity-bearing value, `None` for scalars.
    pub fn identity(&self) -> Option<ObjectId> {
        match self {
            Value::Array(list) | Value::List(list) => Some(list.id()),
            Value::Map(map) => Some(map.id()),
            Value::Bean(bean) => Some(bean.id()),
            Value::Object(instance) => Some(instance.id()),
            _ => None,
        }
    }

    /// True when both values are the same shared instance.
    pub fn same(&self, other: &Value) -> bool {
        match (self.identity(), other.identity()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn key(&self) -> TypeKey {
        match self {
            Value::Null => TypeKey::Null,
            Value::Bool(_) => TypeKey::Bool,
            Value::Int(_) => TypeKey::Int,
            Value::Float(_) => TypeKey::Float,
            Value::Str(_) => TypeKey::Str,
            Value::Date(_) => TypeKey::Date,
            Value::Enum(_) => TypeKey::Enum,
            Value::Array(_) => TypeKey::Array,
            Value::List(_) => TypeKey::List,
            Value::Map(_) => TypeKey::Map,
            Value::Bean(_) => TypeKey::Bean,
            Value::Object(_) => TypeKey::Object,
            Value::Raw(_) => TypeKey::Raw,
        }
    }

    /// Short name of the value's shape, for error messages.
    pub fn kind_name(&self) -> &str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Date(_) => "date",
            Value::Enum(e) => &e.type_name,
            Value::Array(_) => "array",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Bean(bean) => bean.class(),
            Value::Object(instance) => instance.class(),
            Value::Raw(_) => "json",
        }
    }

    /// Catalog class of a bean or opaque object.
    pub fn class_name(&self) -> Option<&str> {
        match self {
            Value::Bean(bean) => Some(bean.class()),
            Value::Object(instance) => Some(instance.class()),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Elements of an array or list.
    pub fn as_seq(&self) -> Option<&SharedList> {
        match self {
            Value::Array(list) | Value::List(list) => Some(list),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&SharedMap> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_bean(&self) -> Option<&Bean> {
        match self {
            Value::Bean(bean) => Some(bean),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Instance> {
        match self {
            Value::Object(instance) => Some(instance),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        let mut visiting = HashSet::new();
        eq_in(self, other, &mut visiting)
    }
}

fn eq_in(a: &Value, b: &Value, visiting: &mut HashSet<(ObjectId, ObjectId)>) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Float(x), Value::Float(y)) => x == y,
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Date(x), Value::Date(y)) => x == y,
        (Value::Enum(x), Value::Enum(y)) => x == y,
        (Value::Raw(x), Value::Raw(y)) => x == y,
        (Value::Object(x), Value::Object(y)) => x.ptr_eq(y),
        (Value::Array(x), Value::Array(y)) | (Value::List(x), Value::List(y)) => {
            if x.ptr_eq(y) || !visiting.insert((x.id(), y.id())) {
                return true;
            }
            let (xs, ys) = (x.snapshot(), y.snapshot());
            xs.len() == ys.len() && xs.iter().zip(ys.iter()).all(|(p, q)| eq_in(p, q, visiting))
        }
        (Value::Map(x), Value::Map(y)) => maps_eq(x, y, visiting),
        (Value::Bean(x), Value::Bean(y)) => {
            x.class() == y.class() && maps_eq(x.fields(), y.fields(), visiting)
        }
        _ => false,
    }
}

fn maps_eq(x: &SharedMap, y: &SharedMap, visiting: &mut HashSet<(ObjectId, ObjectId)>) -> bool {
    if x.ptr_eq(y) || !visiting.insert((x.id(), y.id())) {
        return true;
    }
    let (xs, ys) = (x.snapshot(), y.snapshot());
    xs.len() == ys.len()
        && xs
            .iter()
            .zip(ys.iter())
            .all(|((kx, vx), (ky, vy))| kx == ky && eq_in(vx, vy, visiting))
}

// Containers print their identity and size only, so cyclic graphs are safe
// to debug-print.
impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => write!(f, "Bool({})", b),
            Value::Int(i) => write!(f, "Int({})", i),
            Value::Float(x) => write!(f, "Float({})", x),
            Value::Str(s) => write!(f, "Str({:?})", s),
            Value::Date(ms) => write!(f, "Date({})", ms),
            Value::Enum(e) => write!(f, "Enum({}::{})", e.type_name, e.variant),
            Value::Array(list) => write!(f, "Array@{}(len={})", list.id(), list.read().len()),
            Value::List(list) => write!(f, "List@{}(len={})", list.id(), list.read().len()),
            Value::Map(map) => write!(f, "Map@{}(len={})", map.id(), map.read().len()),
            Value::Bean(bean) => write!(
                f,
                "Bean@{}({}, fields={})",
                bean.id(),
                bean.class(),
                bean.fields().read().len()
            ),
            Value::Object(instance) => write!(f, "Object@{}({})", instance.id(), instance.class()),
            Value::Raw(json) => write!(f, "Raw({})", json),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(option: Option<T>) -> Self {
        option.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Extraction of a Rust value from a [`Value`], used by member invokers.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self>;
}

fn mismatch(expected: &str, found: &Value) -> DumborbError {
    DumborbError::Unmarshal(format!("expected {}, found {}", expected, found.kind_name()))
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self> {
        Ok(value.clone())
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_bool().ok_or_else(|| mismatch("bool", value))
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_int().ok_or_else(|| mismatch("int", value))
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> Result<Self> {
        let wide = value.as_int().ok_or_else(|| mismatch("int", value))?;
        i32::try_from(wide)
            .map_err(|_| DumborbError::Unmarshal(format!("{} does not fit in 32 bits", wide)))
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_float().ok_or_else(|| mismatch("float", value))
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self> {
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| mismatch("string", value))
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: &Value) -> Result<Self> {
        let seq = value.as_seq().ok_or_else(|| mismatch("sequence", value))?;
        seq.snapshot().iter().map(T::from_value).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalars_have_no_identity() {
        assert!(Value::Int(1).identity().is_none());
        assert!(Value::from("x").identity().is_none());
        assert!(!Value::Int(1).same(&Value::Int(1)));
    }

    #[test]
    fn test_clones_share_identity() {
        let list = Value::list(vec![Value::Int(1)]);
        let copy = list.clone();
        assert!(list.same(&copy));
        assert_eq!(list.identity(), copy.identity());

        let other = Value::list(vec![Value::Int(1)]);
        assert!(!list.same(&other));
        assert_eq!(list, other);
    }

    #[test]
    fn test_structural_equality_on_cycles() {
        let build = || {
            let node = Value::map([("name", Value::from("root"))]);
            if let Value::Map(map) = &node {
                map.write().insert("self".into(), node.clone());
            }
            node
        };
        let (a, b) = (build(), build());
        assert!(!a.same(&b));
        assert_eq!(a, b);
    }

    #[test]
    fn test_objects_compare_by_identity() {
        let a = Value::object("Counter", 5_i64);
        let b = Value::object("Counter", 5_i64);
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn test_instance_downcast() {
        let value = Value::object("Counter", String::from("hello"));
        let instance = value.as_object().unwrap();
        assert_eq!(instance.downcast_ref::<String>().unwrap(), "hello");
        assert!(instance.downcast::<i64>().is_none());
        assert_eq!(value.class_name(), Some("Counter"));
    }

    #[test]
    fn test_debug_does_not_recurse() {
        let list = Value::list(vec![]);
        if let Value::List(inner) = &list {
            inner.write().push(list.clone());
        }
        let text = format!("{:?}", list);
        assert!(text.starts_with("List@"));
        assert!(text.ends_with("(len=1)"));
    }

    #[test]
    fn test_from_value_conversions() {
        assert_eq!(i64::from_value(&Value::Int(4)).unwrap(), 4);
        assert_eq!(f64::from_value(&Value::Int(4)).unwrap(), 4.0);
        assert!(i32::from_value(&Value::Int(i64::MAX)).is_err());
        assert_eq!(Option::<String>::from_value(&Value::Null).unwrap(), None);
        let items = Vec::<i64>::from_value(&Value::array(vec![Value::Int(1), Value::Int(2)])).unwrap();
        assert_eq!(items, vec![1, 2]);
        assert!(bool::from_value(&Value::from("true")).is_err());
    }

    #[test]
    fn test_bean_fields() {
        let bean = Value::bean("Point", [("x", Value::Int(1))]);
        let inner = bean.as_bean().unwrap();
        inner.set("y", Value::Int(2));
        assert_eq!(inner.get("y"), Some(Value::Int(2)));
        assert_eq!(bean.key(), TypeKey::Bean);
    }
}
