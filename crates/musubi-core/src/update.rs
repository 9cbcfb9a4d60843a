//! Partial state updates returned by node and router actions.

use crate::error::StateError;
use crate::merge::ValueKind;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};

/// Operation on a run-scoped counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterOp {
    /// Add to the counter.
    Increment(u64),
    /// Overwrite the counter.
    Set(u64),
    /// Set the counter back to zero.
    Reset,
}

impl CounterOp {
    /// Applies the operation to a current value.
    pub fn apply(self, current: u64) -> u64 {
        match self {
            CounterOp::Increment(n) => current.saturating_add(n),
            CounterOp::Set(n) => n,
            CounterOp::Reset => 0,
        }
    }
}

/// A partial update: key writes merged into the state bag, plus counter
/// operations applied to the execution context.
///
/// Writes are kept in the order they were added, so two writes to the same
/// append key land in that order.
///
/// # Examples
///
/// ```
/// use musubi_core::StateUpdate;
/// use serde_json::json;
///
/// let update = StateUpdate::new()
///     .set("answer", json!("42"))
///     .increment("retry_count");
///
/// assert_eq!(update.get("answer"), Some(&json!("42")));
/// assert_eq!(update.counters().count(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateUpdate {
    values: Vec<(String, Value)>,
    counters: Vec<(String, CounterOp)>,
}

impl StateUpdate {
    /// Creates an empty update.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an update from a JSON object.
    pub fn from_json(value: Value) -> Result<Self, StateError> {
        match value {
            Value::Object(map) => Ok(map.into()),
            other => Err(StateError::NotAnObject(ValueKind::of(&other))),
        }
    }

    /// Adds a key write.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Adds a key write in place.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.push((key.into(), value.into()));
    }

    /// Increments a counter by one.
    pub fn increment(self, counter: impl Into<String>) -> Self {
        self.increment_by(counter, 1)
    }

    /// Increments a counter by `n`.
    pub fn increment_by(mut self, counter: impl Into<String>, n: u64) -> Self {
        self.counters.push((counter.into(), CounterOp::Increment(n)));
        self
    }

    /// Overwrites a counter.
    pub fn set_counter(mut self, counter: impl Into<String>, n: u64) -> Self {
        self.counters.push((counter.into(), CounterOp::Set(n)));
        self
    }

    /// Resets a counter to zero.
    pub fn reset_counter(mut self, counter: impl Into<String>) -> Self {
        self.counters.push((counter.into(), CounterOp::Reset));
        self
    }

    /// Returns the last value written for a key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Returns the key writes in order.
    pub fn values(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns the counter operations in order.
    pub fn counters(&self) -> impl Iterator<Item = (&str, CounterOp)> {
        self.counters.iter().map(|(k, op)| (k.as_str(), *op))
    }

    /// Returns `true` if the update writes nothing.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.counters.is_empty()
    }

    /// Splits the update into key writes and counter operations.
    pub fn into_parts(self) -> (Vec<(String, Value)>, Vec<(String, CounterOp)>) {
        (self.values, self.counters)
    }
}

impl From<Map<String, Value>> for StateUpdate {
    fn from(map: Map<String, Value>) -> Self {
        map.into_iter().collect()
    }
}

impl From<BTreeMap<String, Value>> for StateUpdate {
    fn from(map: BTreeMap<String, Value>) -> Self {
        map.into_iter().collect()
    }
}

impl From<HashMap<String, Value>> for StateUpdate {
    fn from(map: HashMap<String, Value>) -> Self {
        // HashMap order is arbitrary; sort so seeding is reproducible.
        let ordered: BTreeMap<String, Value> = map.into_iter().collect();
        ordered.into()
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for StateUpdate {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            counters: Vec::new(),
        }
    }
}

/// A router decision: the label to follow and an optional state delta.
///
/// The delta is merged before the transition, so the node selected by the
/// label observes it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Route {
    /// The emitted label.
    pub label: String,
    /// Writes merged before the transition.
    pub update: StateUpdate,
}

impl Route {
    /// Routes to `label` without changing state.
    pub fn to(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            update: StateUpdate::new(),
        }
    }

    /// Attaches a state delta.
    pub fn with_update(mut self, update: StateUpdate) -> Self {
        self.update = update;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_update_preserves_write_order() {
        let update = StateUpdate::new()
            .set("log", json!("first"))
            .set("log", json!("second"));
        let writes: Vec<_> = update.values().map(|(_, v)| v.clone()).collect();
        assert_eq!(writes, vec![json!("first"), json!("second")]);
        assert_eq!(update.get("log"), Some(&json!("second")));
    }

    #[test]
    fn test_from_json_requires_object() {
        let update = StateUpdate::from_json(json!({"query": "hi"})).expect("object");
        assert_eq!(update.get("query"), Some(&json!("hi")));

        assert_eq!(
            StateUpdate::from_json(json!([1, 2])),
            Err(StateError::NotAnObject(ValueKind::Array))
        );
    }

    #[test]
    fn test_counter_ops() {
        assert_eq!(CounterOp::Increment(2).apply(3), 5);
        assert_eq!(CounterOp::Set(7).apply(3), 7);
        assert_eq!(CounterOp::Reset.apply(3), 0);
        assert_eq!(CounterOp::Increment(1).apply(u64::MAX), u64::MAX);
    }

    #[test]
    fn test_route_builder() {
        let route = Route::to("retry").with_update(StateUpdate::new().increment("retry_count"));
        assert_eq!(route.label, "retry");
        assert!(!route.update.is_empty());
        assert!(Route::to("pass").update.is_empty());
    }
}
