//! Dynamic values validated and stored by model instances.
//!
//! `Value` is the currency of the whole engine: raw input arrives as a
//! [`ValueMap`], field coercion turns raw values into typed ones, and an
//! [`Instance`] keeps exactly one `ValueMap` as its state.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::instance::Instance;

/// Insertion-ordered mapping from string keys to values.
pub type ValueMap = IndexMap<String, Value>;

/// A user-defined value stored opaquely inside the value tree.
///
/// Implemented automatically for every `Clone + PartialEq + Debug` type, so
/// any such type can travel through `Value::Custom`. Fields accept these
/// values only when declared with an arbitrary type and the model config
/// sets `arbitrary_types_allowed`.
pub trait CustomValue: Any + fmt::Debug + Send + Sync {
    /// Fully qualified Rust type name, used for encoder lookup.
    fn custom_type_name(&self) -> &'static str;

    /// Materialize an independent copy of the payload.
    fn clone_custom(&self) -> Arc<dyn CustomValue>;

    /// Compare against another custom payload (false across types).
    fn eq_custom(&self, other: &dyn CustomValue) -> bool;

    /// Upcast for downcasting to the concrete type.
    fn as_any(&self) -> &dyn Any;
}

impl<T> CustomValue for T
where
    T: Any + fmt::Debug + Clone + PartialEq + Send + Sync,
{
    fn custom_type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn clone_custom(&self) -> Arc<dyn CustomValue> {
        Arc::new(self.clone())
    }

    fn eq_custom(&self, other: &dyn CustomValue) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| other == self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A dynamically typed value.
#[derive(Debug, Clone)]
pub enum Value {
    /// Absent / null value.
    Null,
    /// Boolean.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit float.
    Float(f64),
    /// UTF-8 string.
    Str(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// Ordered sequence.
    List(Vec<Value>),
    /// Fixed-position sequence.
    Tuple(Vec<Value>),
    /// Unordered collection of distinct values.
    Set(Vec<Value>),
    /// String-keyed mapping.
    Map(ValueMap),
    /// A validated model instance.
    Model(Instance),
    /// Arbitrary user type.
    Custom(Arc<dyn CustomValue>),
}

impl Value {
    /// Build a set, dropping duplicates while keeping first occurrences.
    pub fn set(items: impl IntoIterator<Item = Value>) -> Self {
        let mut out: Vec<Value> = Vec::new();
        for item in items {
            if !out.contains(&item) {
                out.push(item);
            }
        }
        Value::Set(out)
    }

    /// Wrap an arbitrary user value.
    pub fn custom<T: CustomValue>(value: T) -> Self {
        Value::Custom(Arc::new(value))
    }

    /// Short name of this value's kind, used in error messages.
    pub fn type_name(&self) -> &str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Set(_) => "set",
            Value::Map(_) => "dict",
            Value::Model(instance) => instance.model().name(),
            Value::Custom(custom) => custom.custom_type_name(),
        }
    }

    pub const fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view; integers widen to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&ValueMap> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Items of any sequence-like container (list, tuple or set).
    pub fn as_items(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) | Value::Tuple(items) | Value::Set(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_instance(&self) -> Option<&Instance> {
        match self {
            Value::Model(instance) => Some(instance),
            _ => None,
        }
    }

    /// Downcast a custom payload to its concrete type.
    pub fn downcast_custom<T: 'static>(&self) -> Option<&T> {
        match self {
            Value::Custom(custom) => custom.as_any().downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Recursively copy the value, including custom payloads and nested
    /// instances. A plain `clone` shares custom payloads.
    pub fn deep_clone(&self) -> Self {
        match self {
            Value::List(items) => Value::List(items.iter().map(Value::deep_clone).collect()),
            Value::Tuple(items) => Value::Tuple(items.iter().map(Value::deep_clone).collect()),
            Value::Set(items) => Value::Set(items.iter().map(Value::deep_clone).collect()),
            Value::Map(map) => Value::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.deep_clone()))
                    .collect(),
            ),
            Value::Model(instance) => Value::Model(instance.deep_clone()),
            Value::Custom(custom) => Value::Custom(custom.clone_custom()),
            other => other.clone(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::List(a), Value::List(b)) | (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::Set(a), Value::Set(b)) => {
                a.len() == b.len() && a.iter().all(|item| b.contains(item))
            }
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Model(a), Value::Model(b)) => a == b,
            (Value::Model(a), Value::Map(b)) | (Value::Map(b), Value::Model(a)) => a == b,
            (Value::Custom(a), Value::Custom(b)) => a.eq_custom(&**b),
            _ => false,
        }
    }
}

fn write_items(f: &mut fmt::Formatter<'_>, items: &[Value]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x:?}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Bytes(b) => write!(f, "b{:?}", String::from_utf8_lossy(b)),
            Value::List(items) => {
                f.write_str("[")?;
                write_items(f, items)?;
                f.write_str("]")
            }
            Value::Tuple(items) => {
                f.write_str("(")?;
                write_items(f, items)?;
                f.write_str(")")
            }
            Value::Set(items) => {
                f.write_str("{")?;
                write_items(f, items)?;
                f.write_str("}")
            }
            Value::Map(map) => {
                f.write_str("{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k:?}: {v}")?;
                }
                f.write_str("}")
            }
            Value::Model(instance) => write!(f, "{instance}"),
            Value::Custom(custom) => write!(f, "{custom:?}"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl From<ValueMap> for Value {
    fn from(v: ValueMap) -> Self {
        Value::Map(v)
    }
}

impl From<Instance> for Value {
    fn from(v: Instance) -> Self {
        Value::Model(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl<T: Into<Value>> FromIterator<T> for Value {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Value::List(iter.into_iter().map(Into::into).collect())
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

/// Build a [`ValueMap`] from `key => value` pairs.
///
/// ```
/// use basemodel_core::{Value, value_map};
///
/// let input = value_map! { "name" => "Ann", "age" => 3 };
/// assert_eq!(input["age"], Value::Int(3));
/// ```
#[macro_export]
macro_rules! value_map {
    () => {
        $crate::ValueMap::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut map = $crate::ValueMap::new();
        $(
            map.insert(::std::string::String::from($key), $crate::Value::from($value));
        )+
        map
    }};
}
