// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! JSON representation
//!
//! Values and nodes convert to [`serde_json::Value`] through their current view, which makes
//! JSON the easiest way to look at a whole snapshot at once:
//!
//! ```json
//! {
//!   "todos": [
//!     { "text": "learn rust", "done": true },
//!     { "text": "write tests", "done": false }
//!   ],
//!   "filter": "all"
//! }
//! ```
//!
//! [`Atomic`](crate::Atomic) payloads are opaque and render as `null`. Non-finite doubles
//! also become `null`, as JSON can't represent them.
//!
//! Going the other way, JSON numbers become signed integers where they fit, then unsigned
//! integers, then doubles.
use crate::{
    Node, Value,
    node::{Container, Map},
};

/// Converts a [`serde_json::Value`] into a plain (untracked) [`Value`].
impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(v) => Value::Bool(v),
            serde_json::Value::Number(n) => {
                if let Some(v) = n.as_i64() {
                    Value::I64(v)
                } else if let Some(v) = n.as_u64() {
                    Value::U64(v)
                } else {
                    n.as_f64().map_or(Value::Null, Value::Double)
                }
            }
            serde_json::Value::String(v) => Value::String(v),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect::<Map>(),
            ),
        }
    }
}

/// Converts a [`Value`] to a `serde_json::Value`, reading tracked nodes through their current
/// view.
impl From<&Value> for serde_json::Value {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null | Value::Atomic(_) => serde_json::Value::Null,
            Value::Bool(v) => (*v).into(),
            Value::U64(v) => (*v).into(),
            Value::I64(v) => (*v).into(),
            Value::Double(v) => (*v).into(),
            Value::String(v) => v.clone().into(),
            Value::Object(map) => object_to_json(map),
            Value::Array(items) => array_to_json(items),
            Value::Node(node) => node.into(),
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        (&value).into()
    }
}

/// Converts the current view of a [`Node`] to a `serde_json::Value`.
impl From<&Node> for serde_json::Value {
    fn from(node: &Node) -> Self {
        node.0.view(|c| match c {
            Container::Object(map) => object_to_json(map),
            Container::Array(items) => array_to_json(items),
        })
    }
}

fn object_to_json(map: &Map) -> serde_json::Value {
    serde_json::Value::Object(map.iter().map(|(k, v)| (k.clone(), v.into())).collect())
}

fn array_to_json(items: &[Value]) -> serde_json::Value {
    serde_json::Value::Array(items.iter().map(Into::into).collect())
}

impl Node {
    /// Renders the current view of this node as JSON.
    pub fn to_json(&self) -> serde_json::Value {
        self.into()
    }
}

impl Value {
    /// Renders this value as JSON. Atomic payloads and non-finite doubles become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        self.into()
    }
}

#[cfg(test)]
mod tests {
    use crate::{Atomic, Value, create, transact};
    use insta::assert_snapshot;
    use serde_json::json;

    #[test]
    fn plain_values_from_json() {
        let value = Value::from(json!({
            "n": -1,
            "u": u64::MAX,
            "d": 1.5,
            "list": [true, null, "x"]
        }));
        let Value::Object(map) = &value else {
            panic!("expected an object, got {value:?}");
        };
        assert_eq!(map["n"], Value::I64(-1));
        assert_eq!(map["u"], Value::U64(u64::MAX));
        assert_eq!(map["d"], Value::Double(1.5));
        assert_eq!(
            map["list"],
            Value::array([Value::Bool(true), Value::Null, "x".into()])
        );
    }

    #[test]
    fn nodes_render_their_current_view() {
        let state = create(json!({ "a": { "v": 1 }, "b": [1, 2] })).unwrap();
        assert_snapshot!(state.to_json(), @r#"{"a":{"v":1},"b":[1,2]}"#);

        transact(|| {
            state.get("b").and_then(Value::into_node).unwrap().push(3)?;
            state.set("c", "new")?;
            assert_snapshot!(state.to_json(), @r#"{"a":{"v":1},"b":[1,2,3],"c":"new"}"#);
            Ok::<_, crate::Error>(())
        })
        .unwrap();

        // outside the transaction, the snapshot is unchanged
        assert_snapshot!(state.to_json(), @r#"{"a":{"v":1},"b":[1,2]}"#);
    }

    #[test]
    fn opaque_and_non_finite_values_render_as_null() {
        let value = Value::array([
            Value::Atomic(Atomic::new(String::from("hidden"))),
            Value::Double(f64::NAN),
            Value::Double(0.25),
        ]);
        assert_snapshot!(value.to_json(), @"[null,null,0.25]");
    }
}
