// (c) Copyright 2025 Helsing GmbH. All rights reserved.
use super::{Key, Node};
use crate::{BistateRandomState, Value, either::Either};
use indexmap::IndexMap;

/// Insertion-ordered string-keyed map used for object nodes and plain objects.
pub type Map = IndexMap<String, Value, BistateRandomState>;

/// The storage behind one node: either the committed base or the working scapegoat.
#[derive(Debug, Clone)]
pub(crate) enum Container {
    Object(Map),
    Array(Vec<Value>),
}

/// A [`Key`] resolved against a concrete container kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Slot {
    Field(String),
    Index(usize),
}

impl Container {
    pub(crate) fn is_array(&self) -> bool {
        matches!(self, Container::Array(_))
    }

    /// Resolves `key` for this container, or `None` if it can't address a slot here.
    ///
    /// Objects accept indices by their decimal spelling; arrays accept fields that parse as
    /// an index.
    pub(crate) fn slot(&self, key: &Key) -> Option<Slot> {
        match (self, key) {
            (Container::Object(_), Key::Field(field)) => Some(Slot::Field(field.clone())),
            (Container::Object(_), Key::Index(index)) => Some(Slot::Field(index.to_string())),
            (Container::Array(_), Key::Index(index)) => Some(Slot::Index(*index)),
            (Container::Array(_), Key::Field(field)) => field.parse().ok().map(Slot::Index),
        }
    }

    pub(crate) fn get(&self, key: &Key) -> Option<&Value> {
        match (self, self.slot(key)?) {
            (Container::Object(map), Slot::Field(field)) => map.get(&field),
            (Container::Array(items), Slot::Index(index)) => items.get(index),
            _ => None,
        }
    }

    pub(crate) fn len(&self) -> usize {
        match self {
            Container::Object(map) => map.len(),
            Container::Array(items) => items.len(),
        }
    }

    pub(crate) fn keys(&self) -> impl Iterator<Item = Key> + '_ {
        match self {
            Container::Object(map) => Either::Left(map.keys().cloned().map(Key::Field)),
            Container::Array(items) => Either::Right((0..items.len()).map(Key::Index)),
        }
    }

    pub(crate) fn values(&self) -> impl Iterator<Item = &Value> {
        match self {
            Container::Object(map) => Either::Left(map.values()),
            Container::Array(items) => Either::Right(items.iter()),
        }
    }

    pub(crate) fn entries(&self) -> impl Iterator<Item = (Key, &Value)> {
        match self {
            Container::Object(map) => {
                Either::Left(map.iter().map(|(k, v)| (Key::Field(k.clone()), v)))
            }
            Container::Array(items) => {
                Either::Right(items.iter().enumerate().map(|(i, v)| (Key::Index(i), v)))
            }
        }
    }

    /// Tracked children, in entry order.
    pub(crate) fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.values().filter_map(Value::as_node)
    }

    /// Finds the key under which `node` is stored, by identity.
    pub(crate) fn position(&self, node: &Node) -> Option<Key> {
        self.entries()
            .find(|(_, value)| value.as_node() == Some(node))
            .map(|(key, _)| key)
    }

    /// Stores `value` in `slot`, returning the value it replaced.
    ///
    /// Writing past the end of an array pads the gap with `Null`.
    pub(crate) fn set(&mut self, slot: Slot, value: Value) -> Option<Value> {
        match (self, slot) {
            (Container::Object(map), Slot::Field(field)) => map.insert(field, value),
            (Container::Array(items), Slot::Index(index)) => {
                if index >= items.len() {
                    items.resize(index, Value::Null);
                    items.push(value);
                    None
                } else {
                    Some(std::mem::replace(&mut items[index], value))
                }
            }
            _ => unreachable!("slots are resolved against the container they are used on"),
        }
    }

    /// Removes the entry in `slot`.
    ///
    /// Array slots keep their position and are reset to `Null`, so indices of later items
    /// don't shift. Use a splice for that.
    pub(crate) fn remove(&mut self, slot: Slot) -> Option<Value> {
        match (self, slot) {
            (Container::Object(map), Slot::Field(field)) => map.shift_remove(&field),
            (Container::Array(items), Slot::Index(index)) => items
                .get_mut(index)
                .map(|item| std::mem::replace(item, Value::Null)),
            _ => unreachable!("slots are resolved against the container they are used on"),
        }
    }

    pub(crate) fn as_array_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Container::Array(items) => Some(items),
            Container::Object(_) => None,
        }
    }
}
