// (c) Copyright 2025 Helsing GmbH. All rights reserved.
/// Convenience macro for creating plain [`Value`](crate::Value)s with a JSON-like syntax.
///
/// Objects use `{ "key": value, .. }`, arrays `[value, ..]`, and `null` is `Value::Null`.
/// Anything else goes through `Value::from`. Nested values must be a single token tree, so
/// wrap negative numbers and other compound expressions in parentheses.
///
/// ```rust
/// # use bistate::{value, Value};
/// let n = 4;
/// let v = value!({
///     "name": "bistate",
///     "tags": ["cow", "snapshot"],
///     "nested": { "n": n, "neg": (-1), "sum": (n + 1), "nothing": null }
/// });
/// let Value::Object(map) = v else { unreachable!() };
/// assert_eq!(map["tags"], Value::array(["cow", "snapshot"]));
/// ```
#[macro_export]
macro_rules! value {
    (null) => {
        $crate::Value::Null
    };

    // Array
    ([ $($v:tt),* $(,)? ]) => {
        $crate::Value::Array(::std::vec![ $( $crate::value!($v) ),* ])
    };

    // Object
    ({ $($k:literal : $v:tt),* $(,)? }) => {
        {
            #[allow(unused_mut)]
            let mut map = $crate::Map::default();
            $( map.insert(::std::string::String::from($k), $crate::value!($v)); )*
            $crate::Value::Object(map)
        }
    };

    ($v:expr) => {
        $crate::Value::from($v)
    };
}
