// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! The values stored in bistate nodes.
//!
//! A [`Value`] is a tagged union of three families:
//!
//! - **leaves**: `Null`, booleans, numbers, strings and [`Atomic`] payloads. They are stored
//!   as-is and never traversed.
//! - **plain containers**: [`Value::Object`] and [`Value::Array`]. These are untracked input;
//!   writing one into a tree adopts it into a freshly allocated [`Node`].
//! - **tracked nodes**: [`Value::Node`], a handle to a cell that is part of some tree.
use crate::node::{Map, Node};
use std::{any::Any, fmt, rc::Rc};

/// An opaque leaf that is never traversed or copied.
///
/// This is where functions, timestamps, compiled patterns and similar "do not look inside"
/// payloads go. Two atomics are equal only if they share the same allocation.
#[derive(Clone)]
pub struct Atomic(Rc<dyn Any>);

impl Atomic {
    pub fn new<T: Any>(value: T) -> Self {
        Self(Rc::new(value))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for Atomic {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Atomic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Atomic({:p})", Rc::as_ptr(&self.0))
    }
}

/// A value held by a node slot, or passed in to be written into one.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    U64(u64),
    I64(i64),
    Double(f64),
    String(String),
    Atomic(Atomic),
    /// An untracked object; adopted into a fresh node when written.
    Object(Map),
    /// An untracked array; adopted into a fresh node when written.
    Array(Vec<Value>),
    /// A tracked node.
    Node(Node),
}

impl Value {
    /// Builds a plain object from key/value pairs, keeping their order.
    pub fn object<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        Value::Object(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Builds a plain array.
    pub fn array<V: Into<Value>>(items: impl IntoIterator<Item = V>) -> Self {
        Value::Array(items.into_iter().map(Into::into).collect())
    }

    /// A short name describing the kind of this value, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::U64(_) | Value::I64(_) | Value::Double(_) => "number",
            Value::String(_) => "string",
            Value::Atomic(_) => "atomic",
            Value::Object(_) => "object",
            Value::Array(_) => "array",
            Value::Node(node) if node.is_array() => "tracked array",
            Value::Node(_) => "tracked object",
        }
    }

    /// Objects, arrays and tracked nodes; everything else is a leaf.
    pub fn is_container(&self) -> bool {
        matches!(self, Value::Object(_) | Value::Array(_) | Value::Node(_))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Value::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn into_node(self) -> Option<Node> {
        match self {
            Value::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I64(n) => Some(*n),
            Value::U64(n) => i64::try_from(*n).ok(),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::U64(n) => Some(*n),
            Value::I64(n) => u64::try_from(*n).ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(n) => Some(*n),
            Value::I64(n) => Some(*n as f64),
            Value::U64(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns a deep, untracked copy: tracked nodes are replaced by plain containers
    /// holding their current view.
    pub fn to_plain(&self) -> Value {
        match self {
            Value::Node(node) => node.to_plain(),
            Value::Object(map) => {
                Value::Object(map.iter().map(|(k, v)| (k.clone(), v.to_plain())).collect())
            }
            Value::Array(items) => Value::Array(items.iter().map(Value::to_plain).collect()),
            leaf => leaf.clone(),
        }
    }
}

/// Numbers compare by value across the integer variants; nodes compare by identity.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::U64(a), Value::U64(b)) => a == b,
            (Value::I64(a), Value::I64(b)) => a == b,
            (Value::U64(a), Value::I64(b)) | (Value::I64(b), Value::U64(a)) => {
                i64::try_from(*a).is_ok_and(|a| a == *b)
            }
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Atomic(a), Value::Atomic(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Node(a), Value::Node(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::U64(v) => write!(f, "{v}"),
            Value::I64(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v:?}"),
            Value::String(v) => write!(f, "{v:?}"),
            Value::Atomic(v) => fmt::Debug::fmt(v, f),
            Value::Object(map) => f.debug_map().entries(map.iter()).finish(),
            Value::Array(items) => f.debug_list().entries(items.iter()).finish(),
            Value::Node(node) => fmt::Debug::fmt(node, f),
        }
    }
}

macro_rules! impl_from {
(
    $(
        $source:ty => $target:ident $(with $conv:ident)?
    ),* $(,)?
    ) => {
        $(
            impl From<$source> for Value {
                fn from(value: $source) -> Self {
                    Self::$target(impl_from!(value$(, $conv)?))
                }
            }
        )*
    };

    ($value:ident, $conv:ident) => {
        $value.$conv()
    };

    ($value:ident) => {
        $value
    };
}

impl_from! {
    bool => Bool,
    u64 => U64,
    u32 => U64 with into,
    i64 => I64,
    i32 => I64 with into,
    f64 => Double,
    f32 => Double with into,
    String => String,
    &str => String with to_string,
    &String => String with clone,
    Atomic => Atomic,
    Map => Object,
    Node => Node,
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        // usize is at most 64 bits on every supported target
        Value::U64(value as u64)
    }
}

impl From<&Node> for Value {
    fn from(node: &Node) -> Self {
        Value::Node(node.clone())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::array(items)
    }
}

macro_rules! impl_partial_eq {
    ({$($t:ty),+}) => {
        $(impl_partial_eq!($t);)+
    };

    ($t:ty) => {
        impl PartialEq<$t> for Value {
            fn eq(&self, other: &$t) -> bool {
                *self == Value::from(other.clone())
            }
        }
    };
}
impl_partial_eq!({bool, u64, i64, f64, String, &str});
// i32 because it's the "default" inference integer type
impl_partial_eq!(i32);

impl PartialEq<Node> for Value {
    fn eq(&self, other: &Node) -> bool {
        matches!(self, Value::Node(node) if node == other)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::{SerializeMap, SerializeSeq};
        match self {
            // atomics have no data representation
            Value::Null | Value::Atomic(_) => serializer.serialize_unit(),
            Value::Bool(v) => serializer.serialize_bool(*v),
            Value::U64(v) => serializer.serialize_u64(*v),
            Value::I64(v) => serializer.serialize_i64(*v),
            Value::Double(v) => serializer.serialize_f64(*v),
            Value::String(v) => serializer.serialize_str(v),
            Value::Object(map) => {
                let mut ser = serializer.serialize_map(Some(map.len()))?;
                for (k, v) in map {
                    ser.serialize_entry(k, v)?;
                }
                ser.end()
            }
            Value::Array(items) => {
                let mut ser = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    ser.serialize_element(item)?;
                }
                ser.end()
            }
            Value::Node(node) => node.serialize(serializer),
        }
    }
}
