//! Merge strategies and the per-key state schema.

use crate::error::StateError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Shape of a JSON value, used to declare what a key may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    /// Any value is accepted.
    #[default]
    Any,
    /// JSON `null`.
    Null,
    /// JSON boolean.
    Bool,
    /// JSON number.
    Number,
    /// JSON string.
    String,
    /// JSON array.
    Array,
    /// JSON object.
    Object,
}

impl ValueKind {
    /// Returns the kind of a value. Never returns [`ValueKind::Any`].
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Bool,
            Value::Number(_) => ValueKind::Number,
            Value::String(_) => ValueKind::String,
            Value::Array(_) => ValueKind::Array,
            Value::Object(_) => ValueKind::Object,
        }
    }

    /// Returns `true` if `value` has this kind.
    pub fn accepts(self, value: &Value) -> bool {
        self == ValueKind::Any || Self::of(value) == self
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Any => "any",
            ValueKind::Null => "null",
            ValueKind::Bool => "bool",
            ValueKind::Number => "number",
            ValueKind::String => "string",
            ValueKind::Array => "array",
            ValueKind::Object => "object",
        };
        f.write_str(name)
    }
}

/// Combine function of a custom merge strategy: `(old, new) -> merged`.
pub type CombineFn = dyn Fn(&Value, &Value) -> Value + Send + Sync;

/// Rule for combining an existing value with a new write.
///
/// # Examples
///
/// ```
/// use musubi_core::MergeStrategy;
/// use serde_json::json;
///
/// let append = MergeStrategy::Append;
/// let merged = append.merge(Some(json!(["a"])), json!("b"));
/// assert_eq!(merged, json!(["a", "b"]));
///
/// let max = MergeStrategy::custom("max", |old, new| {
///     if old.as_i64() >= new.as_i64() { old.clone() } else { new.clone() }
/// });
/// assert_eq!(max.merge(Some(json!(7)), json!(3)), json!(7));
/// ```
#[derive(Clone, Default)]
pub enum MergeStrategy {
    /// The new value overwrites the old one.
    #[default]
    Replace,
    /// The new value is appended to an ordered sequence.
    ///
    /// An array write contributes its elements; any other write is pushed as
    /// one element. The stored value is always an array.
    Append,
    /// A caller-supplied combine function.
    Custom {
        /// Name used in logs and debug output.
        name: String,
        /// The combine function.
        combine: Arc<CombineFn>,
    },
}

impl fmt::Debug for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeStrategy::Replace => write!(f, "Replace"),
            MergeStrategy::Append => write!(f, "Append"),
            MergeStrategy::Custom { name, .. } => write!(f, "Custom({})", name),
        }
    }
}

impl MergeStrategy {
    /// Creates a custom strategy from a combine function.
    pub fn custom<F>(name: impl Into<String>, combine: F) -> Self
    where
        F: Fn(&Value, &Value) -> Value + Send + Sync + 'static,
    {
        MergeStrategy::Custom {
            name: name.into(),
            combine: Arc::new(combine),
        }
    }

    /// Returns the strategy name.
    pub fn name(&self) -> &str {
        match self {
            MergeStrategy::Replace => "replace",
            MergeStrategy::Append => "append",
            MergeStrategy::Custom { name, .. } => name,
        }
    }

    /// Combines `old` (absent on first write) with `new`.
    pub fn merge(&self, old: Option<Value>, new: Value) -> Value {
        match self {
            MergeStrategy::Replace => new,
            MergeStrategy::Append => {
                let mut items = match old {
                    Some(Value::Array(items)) => items,
                    Some(Value::Null) | None => Vec::new(),
                    Some(other) => vec![other],
                };
                match new {
                    Value::Array(more) => items.extend(more),
                    other => items.push(other),
                }
                Value::Array(items)
            }
            MergeStrategy::Custom { combine, .. } => match old {
                Some(old) => combine(&old, &new),
                None => new,
            },
        }
    }
}

/// Declared shape and merge strategy of one state key.
#[derive(Debug, Clone, Default)]
pub struct KeySpec {
    /// Accepted value kind. For [`MergeStrategy::Append`] keys this is the element kind.
    pub kind: ValueKind,
    /// How writes are combined with the existing value.
    pub strategy: MergeStrategy,
}

impl KeySpec {
    /// A key whose writes overwrite.
    pub fn replace() -> Self {
        Self {
            kind: ValueKind::Any,
            strategy: MergeStrategy::Replace,
        }
    }

    /// A key whose writes accumulate in order.
    pub fn append() -> Self {
        Self {
            kind: ValueKind::Any,
            strategy: MergeStrategy::Append,
        }
    }

    /// A key combined with a custom function.
    pub fn custom<F>(name: impl Into<String>, combine: F) -> Self
    where
        F: Fn(&Value, &Value) -> Value + Send + Sync + 'static,
    {
        Self {
            kind: ValueKind::Any,
            strategy: MergeStrategy::custom(name, combine),
        }
    }

    /// Restricts the accepted value kind.
    pub fn with_kind(mut self, kind: ValueKind) -> Self {
        self.kind = kind;
        self
    }

    /// Checks a write against the declared kind.
    pub fn check(&self, key: &str, value: &Value) -> Result<(), StateError> {
        let mismatch = |found: &Value| StateError::KindMismatch {
            key: key.to_string(),
            expected: self.kind,
            found: ValueKind::of(found),
        };
        match (&self.strategy, value) {
            (MergeStrategy::Append, Value::Array(items)) => {
                match items.iter().find(|item| !self.kind.accepts(item)) {
                    Some(bad) => Err(mismatch(bad)),
                    None => Ok(()),
                }
            }
            _ if self.kind.accepts(value) => Ok(()),
            _ => Err(mismatch(value)),
        }
    }
}

/// What to do with keys the schema does not declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownKeyPolicy {
    /// Bind the key to [`MergeStrategy::Replace`] on first write.
    #[default]
    Replace,
    /// Reject the write with [`StateError::UnregisteredKey`].
    Reject,
}

/// Registry of declared state keys.
///
/// # Examples
///
/// ```
/// use musubi_core::{KeySpec, StateSchema, ValueKind};
///
/// let schema = StateSchema::new()
///     .key("query", KeySpec::replace().with_kind(ValueKind::String))
///     .key("results", KeySpec::append());
///
/// assert!(schema.get("results").is_some());
/// assert_eq!(schema.resolve("other").map(|s| s.strategy.name().to_string()), Ok("replace".to_string()));
/// ```
#[derive(Debug, Clone, Default)]
pub struct StateSchema {
    keys: BTreeMap<String, KeySpec>,
    unknown_keys: UnknownKeyPolicy,
}

impl StateSchema {
    /// Creates an empty schema that defaults unknown keys to Replace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty schema that rejects unknown keys.
    pub fn strict() -> Self {
        Self {
            keys: BTreeMap::new(),
            unknown_keys: UnknownKeyPolicy::Reject,
        }
    }

    /// Declares a key, replacing any earlier declaration.
    pub fn key(mut self, name: impl Into<String>, spec: KeySpec) -> Self {
        self.register(name, spec);
        self
    }

    /// Declares a key in place.
    pub fn register(&mut self, name: impl Into<String>, spec: KeySpec) {
        self.keys.insert(name.into(), spec);
    }

    /// Sets the policy for undeclared keys.
    pub fn with_unknown_keys(mut self, policy: UnknownKeyPolicy) -> Self {
        self.unknown_keys = policy;
        self
    }

    /// Returns the declaration of a key.
    pub fn get(&self, name: &str) -> Option<&KeySpec> {
        self.keys.get(name)
    }

    /// Returns the policy for undeclared keys.
    pub fn unknown_keys(&self) -> UnknownKeyPolicy {
        self.unknown_keys
    }

    /// Returns the declared key names in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }

    /// Returns the spec a key binds to on first write.
    pub fn resolve(&self, name: &str) -> Result<KeySpec, StateError> {
        match (self.keys.get(name), self.unknown_keys) {
            (Some(spec), _) => Ok(spec.clone()),
            (None, UnknownKeyPolicy::Replace) => Ok(KeySpec::replace()),
            (None, UnknownKeyPolicy::Reject) => Err(StateError::UnregisteredKey(name.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_replace_overwrites() {
        let merged = MergeStrategy::Replace.merge(Some(json!("old")), json!("new"));
        assert_eq!(merged, json!("new"));
    }

    #[test]
    fn test_append_flattens_arrays_and_pushes_scalars() {
        let append = MergeStrategy::Append;
        let first = append.merge(None, json!("a"));
        assert_eq!(first, json!(["a"]));

        let second = append.merge(Some(first), json!(["b", "c"]));
        assert_eq!(second, json!(["a", "b", "c"]));

        let third = append.merge(Some(second), json!({"d": 1}));
        assert_eq!(third, json!(["a", "b", "c", {"d": 1}]));
    }

    #[test]
    fn test_append_wraps_non_array_existing_value() {
        let merged = MergeStrategy::Append.merge(Some(json!(1)), json!(2));
        assert_eq!(merged, json!([1, 2]));
    }

    #[test]
    fn test_custom_first_write_stores_value() {
        let sum = MergeStrategy::custom("sum", |old, new| {
            json!(old.as_i64().unwrap_or(0) + new.as_i64().unwrap_or(0))
        });
        let first = sum.merge(None, json!(5));
        assert_eq!(first, json!(5));
        assert_eq!(sum.merge(Some(first), json!(3)), json!(8));
        assert_eq!(format!("{:?}", sum), "Custom(sum)");
    }

    #[test]
    fn test_kind_check() {
        let spec = KeySpec::replace().with_kind(ValueKind::String);
        assert!(spec.check("query", &json!("hello")).is_ok());
        assert_eq!(
            spec.check("query", &json!(3)),
            Err(StateError::KindMismatch {
                key: "query".to_string(),
                expected: ValueKind::String,
                found: ValueKind::Number,
            })
        );
    }

    #[test]
    fn test_append_kind_checks_elements() {
        let spec = KeySpec::append().with_kind(ValueKind::String);
        assert!(spec.check("results", &json!("one")).is_ok());
        assert!(spec.check("results", &json!(["one", "two"])).is_ok());
        assert!(spec.check("results", &json!(["one", 2])).is_err());
    }

    #[test]
    fn test_strict_schema_rejects_unknown_keys() {
        let schema = StateSchema::strict().key("query", KeySpec::replace());
        assert!(schema.resolve("query").is_ok());
        assert_eq!(
            schema.resolve("other").map(|_| ()),
            Err(StateError::UnregisteredKey("other".to_string()))
        );
    }
}
