//! Node identifiers and reserved graph endpoints.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Reserved id for the virtual entry point. `add_edge(START, x)` marks `x` as the start node.
pub const START: &str = "__start__";

/// Reserved id of the terminal sentinel. Reaching it ends the run.
pub const END: &str = "__end__";

/// Type-safe node identifier.
///
/// # Examples
///
/// ```
/// use musubi_core::NodeId;
///
/// let id = NodeId::new("validate");
/// assert_eq!(id.as_str(), "validate");
/// assert!(!id.is_end());
/// assert!(NodeId::end().is_end());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Creates a new NodeId.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The terminal sentinel.
    pub fn end() -> Self {
        Self::new(END)
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` for the terminal sentinel.
    pub fn is_end(&self) -> bool {
        self.0 == END
    }

    /// Returns `true` for [`START`] and [`END`].
    pub fn is_reserved(&self) -> bool {
        self.0 == START || self.0 == END
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&NodeId> for NodeId {
    fn from(id: &NodeId) -> Self {
        id.clone()
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for NodeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for NodeId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for NodeId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id() {
        let id = NodeId::new("work");
        assert_eq!(id.as_str(), "work");

        let id: NodeId = "work".into();
        assert_eq!(id, "work");
        assert_eq!(id.to_string(), "work");
    }

    #[test]
    fn test_reserved_ids() {
        assert!(NodeId::end().is_end());
        assert!(NodeId::end().is_reserved());
        assert!(NodeId::new(START).is_reserved());
        assert!(!NodeId::new("start").is_reserved());
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let json = serde_json::to_string(&NodeId::new("fallback")).expect("serialize");
        assert_eq!(json, "\"fallback\"");
    }
}
