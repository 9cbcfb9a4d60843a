//! Per-run state bag with schema-bound merge strategies.

use crate::error::StateError;
use crate::merge::{KeySpec, StateSchema};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Mutable key/value store for one run.
///
/// Each key is bound to a [`KeySpec`] on its first write: the schema's
/// declaration if there is one, otherwise whatever the schema's
/// [`UnknownKeyPolicy`](crate::UnknownKeyPolicy) allows.
///
/// # Examples
///
/// ```
/// use musubi_core::{KeySpec, StateBag, StateSchema};
/// use serde_json::json;
/// use std::sync::Arc;
///
/// let schema = Arc::new(StateSchema::new().key("results", KeySpec::append()));
/// let mut bag = StateBag::new(schema);
///
/// bag.merge([("results", json!("a")), ("status", json!("running"))])?;
/// bag.merge([("results", json!("b")), ("status", json!("done"))])?;
///
/// assert_eq!(bag.get("results"), Some(&json!(["a", "b"])));
/// assert_eq!(bag.get("status"), Some(&json!("done")));
/// # Ok::<(), musubi_core::StateError>(())
/// ```
pub struct StateBag {
    schema: Arc<StateSchema>,
    values: BTreeMap<String, Value>,
    bindings: BTreeMap<String, KeySpec>,
}

impl fmt::Debug for StateBag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateBag")
            .field("values", &self.values)
            .field("bindings", &self.bindings)
            .finish()
    }
}

impl Default for StateBag {
    fn default() -> Self {
        Self::new(Arc::new(StateSchema::default()))
    }
}

impl StateBag {
    /// Creates an empty bag bound to a schema.
    pub fn new(schema: Arc<StateSchema>) -> Self {
        Self {
            schema,
            values: BTreeMap::new(),
            bindings: BTreeMap::new(),
        }
    }

    /// Merges key writes, in order.
    ///
    /// Only key writes are accepted. Counter operations of a
    /// [`StateUpdate`](crate::StateUpdate) belong to the execution context, so
    /// split the update with
    /// [`StateUpdate::into_parts`](crate::StateUpdate::into_parts) first.
    /// Writes before a failing key stay applied.
    pub fn merge<I, K>(&mut self, writes: I) -> Result<(), StateError>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        for (key, value) in writes {
            self.write(key.into(), value)?;
        }
        Ok(())
    }

    /// Merges a single write through the key's bound strategy.
    pub fn write(&mut self, key: String, value: Value) -> Result<(), StateError> {
        let spec = match self.bindings.entry(key.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(self.schema.resolve(&key)?),
        };
        spec.check(&key, &value)?;
        let old = self.values.remove(&key);
        let merged = spec.strategy.merge(old, value);
        self.values.insert(key, merged);
        Ok(())
    }

    /// Returns the value for a key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Returns the spec a key is bound to, if it has been written.
    pub fn binding(&self, key: &str) -> Option<&KeySpec> {
        self.bindings.get(key)
    }

    /// Returns `true` if the bag holds a value for the key.
    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Returns the number of keys.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if the bag is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Takes an immutable snapshot, attaching the given counters.
    pub fn snapshot(&self, counters: &BTreeMap<String, u64>) -> StateSnapshot {
        StateSnapshot {
            values: Arc::new(self.values.clone()),
            counters: Arc::new(counters.clone()),
        }
    }

    /// Consumes the bag, returning its contents.
    pub fn into_values(self) -> BTreeMap<String, Value> {
        self.values
    }
}

/// Read-only view of the state handed to node and router actions.
///
/// Cloning is cheap. Counters are the run-scoped retry/loop counters of the
/// execution context; they never appear among the values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateSnapshot {
    values: Arc<BTreeMap<String, Value>>,
    counters: Arc<BTreeMap<String, u64>>,
}

impl StateSnapshot {
    /// Builds a snapshot directly, mostly useful for testing actions in isolation.
    pub fn from_parts(values: BTreeMap<String, Value>, counters: BTreeMap<String, u64>) -> Self {
        Self {
            values: Arc::new(values),
            counters: Arc::new(counters),
        }
    }

    /// Returns the value for a key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Returns a string value.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Returns a boolean value.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    /// Returns a signed integer value.
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Value::as_i64)
    }

    /// Returns an unsigned integer value.
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(Value::as_u64)
    }

    /// Returns a floating point value.
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(Value::as_f64)
    }

    /// Returns an array value.
    pub fn get_array(&self, key: &str) -> Option<&Vec<Value>> {
        self.get(key).and_then(Value::as_array)
    }

    /// Deserializes a value into `T`.
    ///
    /// Returns `Ok(None)` if the key is absent.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, serde_json::Error> {
        self.get(key)
            .map(|v| serde_json::from_value(v.clone()))
            .transpose()
    }

    /// Returns a counter, zero if it was never touched.
    pub fn counter(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    /// Returns `true` if the snapshot holds a value for the key.
    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Returns the keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Returns all values.
    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    /// Returns the number of keys.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if there are no values.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
