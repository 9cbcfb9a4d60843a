//! Error types for graph construction, state merging and execution.

use crate::merge::ValueKind;
use crate::node::NodeId;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failure raised by a node or router action.
///
/// # Examples
///
/// ```
/// use musubi_core::ActionError;
///
/// let err = ActionError::new("question must not be empty");
/// assert_eq!(err.to_string(), "question must not be empty");
/// ```
#[derive(Error, Debug)]
#[error("{message}")]
pub struct ActionError {
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl ActionError {
    /// Creates an error with a message and no underlying cause.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Wraps an underlying error, using its display text as the message.
    pub fn from_source(source: impl Into<BoxError>) -> Self {
        let source = source.into();
        Self {
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Wraps an underlying error with a custom message.
    pub fn with_source(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<serde_json::Error> for ActionError {
    fn from(e: serde_json::Error) -> Self {
        Self::from_source(e)
    }
}

impl From<StateError> for ActionError {
    fn from(e: StateError) -> Self {
        Self::from_source(e)
    }
}

/// Errors raised while writing to a state bag.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum StateError {
    /// The schema rejects keys it does not declare.
    #[error("Key '{0}' is not registered in the state schema")]
    UnregisteredKey(String),

    /// A write does not match the declared value kind.
    #[error("Key '{key}' expects {expected}, got {found}")]
    KindMismatch {
        /// The key being written.
        key: String,
        /// Kind declared in the schema.
        expected: ValueKind,
        /// Kind of the rejected value.
        found: ValueKind,
    },

    /// A JSON value used as a state mapping was not an object.
    #[error("Expected a JSON object, got {0}")]
    NotAnObject(ValueKind),
}

/// A single structural problem found by graph validation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum ValidationIssue {
    /// No start node was designated.
    MissingStart,
    /// The start node is not a declared node.
    UnknownStart(NodeId),
    /// An edge points at a node that was never declared.
    DanglingTarget {
        /// Source of the edge.
        from: NodeId,
        /// Undeclared target.
        to: NodeId,
    },
    /// A non-terminal node has neither a static nor a conditional edge.
    MissingEdge(NodeId),
    /// A node cannot be reached from the start node.
    Unreachable(NodeId),
    /// A router declares a label that its table does not map.
    UnmappedLabel {
        /// Node owning the conditional edge.
        from: NodeId,
        /// The label without a target.
        label: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::MissingStart => write!(f, "no start node designated"),
            ValidationIssue::UnknownStart(id) => write!(f, "start node '{}' is not declared", id),
            ValidationIssue::DanglingTarget { from, to } => {
                write!(f, "edge '{}' -> '{}' targets an undeclared node", from, to)
            }
            ValidationIssue::MissingEdge(id) => write!(f, "node '{}' has no outgoing edge", id),
            ValidationIssue::Unreachable(id) => {
                write!(f, "node '{}' is unreachable from the start node", id)
            }
            ValidationIssue::UnmappedLabel { from, label } => {
                write!(f, "router on '{}' can emit unmapped label '{}'", from, label)
            }
        }
    }
}

/// Errors raised while declaring or compiling a graph.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum GraphError {
    /// A node with this id was already added.
    #[error("Duplicate node: {0}")]
    DuplicateNode(NodeId),

    /// `__start__` and `__end__` cannot be used as node ids.
    #[error("Reserved node id: {0}")]
    ReservedNodeId(NodeId),

    /// An edge was added from a node that was never declared.
    #[error("Edge source is not a declared node: {0}")]
    UnknownSource(NodeId),

    /// The node already has a static or conditional edge.
    #[error("Node '{0}' already has an outgoing edge")]
    EdgeAlreadyDefined(NodeId),

    /// A conditional edge was added with no labels.
    #[error("Conditional edge from '{0}' has an empty label table")]
    EmptyLabelTable(NodeId),

    /// Structural validation failed.
    #[error("Graph validation failed: {}", join_issues(.0))]
    Validation(Vec<ValidationIssue>),
}

impl GraphError {
    /// Returns the validation issues, if this is a validation error.
    pub fn issues(&self) -> &[ValidationIssue] {
        match self {
            GraphError::Validation(issues) => issues,
            _ => &[],
        }
    }
}

fn join_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Which action of a step failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionPhase {
    /// The node action.
    Node,
    /// The router of the node's conditional edge.
    Router,
}

impl fmt::Display for ActionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionPhase::Node => write!(f, "node"),
            ActionPhase::Router => write!(f, "router"),
        }
    }
}

/// Errors that abort a graph run.
///
/// Every variant carries the node being executed and the step number, so a
/// failure can be located without any partial state.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ExecutionError {
    /// A node or router action returned an error.
    #[error("{phase} action failed in '{node_id}' at step {step}: {source}")]
    NodeActionFailure {
        /// The node whose action failed.
        node_id: NodeId,
        /// Step number of the failure.
        step: usize,
        /// Whether the node or its router failed.
        phase: ActionPhase,
        /// The underlying failure.
        #[source]
        source: ActionError,
    },

    /// A router emitted a label its table does not map.
    #[error("Unknown routing label '{label}' from '{node_id}' at step {step}")]
    UnknownRoutingLabel {
        /// The node owning the conditional edge.
        node_id: NodeId,
        /// The emitted label.
        label: String,
        /// Step number of the failure.
        step: usize,
    },

    /// The run reached its step bound without reaching the terminal sentinel.
    #[error("Step limit of {max_steps} exceeded before '{node_id}' (step {step})")]
    StepLimitExceeded {
        /// The node that would have run next.
        node_id: NodeId,
        /// Step number at which the limit tripped.
        step: usize,
        /// The configured bound.
        max_steps: usize,
    },

    /// An action exceeded the step timeout or the run deadline.
    #[error("Timeout after {limit:?} in '{node_id}' at step {step}")]
    Timeout {
        /// The node that timed out.
        node_id: NodeId,
        /// Step number of the timeout.
        step: usize,
        /// The limit that was enforced.
        limit: Duration,
    },

    /// The caller cancelled the run.
    #[error("Cancelled by caller in '{node_id}' at step {step}")]
    Cancelled {
        /// The node executing when cancellation was observed.
        node_id: NodeId,
        /// Step number of the cancellation.
        step: usize,
    },

    /// An update could not be merged into the state bag.
    #[error("State merge failed after '{node_id}' at step {step}: {source}")]
    StateMerge {
        /// The node whose output was rejected.
        node_id: NodeId,
        /// Step number of the failure.
        step: usize,
        /// The underlying state error.
        #[source]
        source: StateError,
    },
}

impl ExecutionError {
    /// The node being executed when the run aborted.
    pub fn node_id(&self) -> &NodeId {
        match self {
            ExecutionError::NodeActionFailure { node_id, .. }
            | ExecutionError::UnknownRoutingLabel { node_id, .. }
            | ExecutionError::StepLimitExceeded { node_id, .. }
            | ExecutionError::Timeout { node_id, .. }
            | ExecutionError::Cancelled { node_id, .. }
            | ExecutionError::StateMerge { node_id, .. } => node_id,
        }
    }

    /// The step number at which the run aborted.
    pub fn step(&self) -> usize {
        match self {
            ExecutionError::NodeActionFailure { step, .. }
            | ExecutionError::UnknownRoutingLabel { step, .. }
            | ExecutionError::StepLimitExceeded { step, .. }
            | ExecutionError::Timeout { step, .. }
            | ExecutionError::Cancelled { step, .. }
            | ExecutionError::StateMerge { step, .. } => *step,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_error_display() {
        let error = ActionError::new("model unavailable");
        assert_eq!(error.to_string(), "model unavailable");
        assert!(std::error::Error::source(&error).is_none());

        let io = std::io::Error::other("connection reset");
        let error = ActionError::with_source("search failed", io);
        assert_eq!(error.message(), "search failed");
        assert!(std::error::Error::source(&error).is_some());
    }

    #[test]
    fn test_validation_error_display() {
        let error = GraphError::Validation(vec![
            ValidationIssue::MissingStart,
            ValidationIssue::Unreachable(NodeId::new("orphan")),
        ]);
        assert_eq!(
            error.to_string(),
            "Graph validation failed: no start node designated; node 'orphan' is unreachable from the start node"
        );
        assert_eq!(error.issues().len(), 2);
    }

    #[test]
    fn test_execution_error_display() {
        let error = ExecutionError::NodeActionFailure {
            node_id: NodeId::new("analysis"),
            step: 3,
            phase: ActionPhase::Router,
            source: ActionError::new("boom"),
        };
        assert_eq!(
            error.to_string(),
            "router action failed in 'analysis' at step 3: boom"
        );
        assert_eq!(error.node_id(), "analysis");
        assert_eq!(error.step(), 3);

        let error = ExecutionError::UnknownRoutingLabel {
            node_id: NodeId::new("gate"),
            label: "maybe".to_string(),
            step: 1,
        };
        assert_eq!(
            error.to_string(),
            "Unknown routing label 'maybe' from 'gate' at step 1"
        );
    }

    #[test]
    fn test_state_error_display() {
        let error = StateError::KindMismatch {
            key: "items".to_string(),
            expected: ValueKind::Array,
            found: ValueKind::String,
        };
        assert_eq!(error.to_string(), "Key 'items' expects array, got string");
    }
}
