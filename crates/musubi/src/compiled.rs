//! The immutable, executable form of a graph.

use crate::config::ExecutionConfig;
use crate::executor::{self, ExecutionResult};
use musubi_core::{ExecutionError, NodeAction, NodeId, Router, StateSchema, StateUpdate};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// The outgoing edge of a node.
#[derive(Clone)]
pub enum Transition {
    /// Always continue with this node.
    Static(NodeId),
    /// Ask the router for a label and look it up in the table.
    Conditional {
        /// Chooses the label.
        router: Arc<dyn Router>,
        /// Label to successor.
        labels: BTreeMap<String, NodeId>,
    },
}

impl Transition {
    /// Every node this transition can lead to.
    pub fn targets(&self) -> impl Iterator<Item = &NodeId> {
        let (single, table) = match self {
            Transition::Static(to) => (Some(to), None),
            Transition::Conditional { labels, .. } => (None, Some(labels.values())),
        };
        single.into_iter().chain(table.into_iter().flatten())
    }

    /// Returns `true` for a router-driven transition.
    pub fn is_conditional(&self) -> bool {
        matches!(self, Transition::Conditional { .. })
    }
}

impl fmt::Debug for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transition::Static(to) => f.debug_tuple("Static").field(to).finish(),
            Transition::Conditional { labels, .. } => f
                .debug_struct("Conditional")
                .field("labels", labels)
                .finish_non_exhaustive(),
        }
    }
}

pub(crate) struct NodeEntry {
    pub(crate) action: Arc<dyn NodeAction>,
    pub(crate) transition: Transition,
}

/// A validated graph, ready to run.
///
/// Immutable after [`GraphSpec::compile`](crate::GraphSpec::compile). Wrap it
/// in an `Arc` to share it across concurrent runs; each run owns its own
/// state.
pub struct CompiledGraph {
    nodes: BTreeMap<NodeId, NodeEntry>,
    start: NodeId,
    schema: Arc<StateSchema>,
}

impl fmt::Debug for CompiledGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledGraph")
            .field("start", &self.start)
            .field(
                "transitions",
                &self
                    .nodes
                    .iter()
                    .map(|(id, entry)| (id, &entry.transition))
                    .collect::<BTreeMap<_, _>>(),
            )
            .finish()
    }
}

impl CompiledGraph {
    pub(crate) fn new(
        nodes: BTreeMap<NodeId, Arc<dyn NodeAction>>,
        mut edges: BTreeMap<NodeId, Transition>,
        start: NodeId,
        schema: Arc<StateSchema>,
    ) -> Self {
        let nodes = nodes
            .into_iter()
            .filter_map(|(id, action)| {
                let transition = edges.remove(&id)?;
                Some((id, NodeEntry { action, transition }))
            })
            .collect();
        Self {
            nodes,
            start,
            schema,
        }
    }

    /// Returns the start node.
    pub fn start(&self) -> &NodeId {
        &self.start
    }

    /// Returns every node id, in key order.
    pub fn node_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.keys()
    }

    /// Returns `true` if the node exists.
    pub fn has_node(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Returns the number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Returns the outgoing transition of a node.
    pub fn transition(&self, id: &str) -> Option<&Transition> {
        self.nodes.get(id).map(|entry| &entry.transition)
    }

    /// Returns the state schema.
    pub fn schema(&self) -> &StateSchema {
        &self.schema
    }

    pub(crate) fn shared_schema(&self) -> Arc<StateSchema> {
        Arc::clone(&self.schema)
    }

    pub(crate) fn entry(&self, id: &NodeId) -> Option<&NodeEntry> {
        self.nodes.get(id)
    }

    /// Runs the graph once. See [`execute`](crate::execute).
    pub async fn execute(
        &self,
        initial: impl Into<StateUpdate>,
        config: ExecutionConfig,
    ) -> Result<ExecutionResult, ExecutionError> {
        executor::execute(self, initial, config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GraphSpec;
    use musubi_core::{node_sync, router_fn, Route, END, START};

    fn sample() -> CompiledGraph {
        let mut graph = GraphSpec::new();
        graph
            .add_node("a", node_sync(|_| Ok(StateUpdate::new())))
            .and_then(|g| g.add_node("b", node_sync(|_| Ok(StateUpdate::new()))))
            .and_then(|g| g.add_edge(START, "a"))
            .and_then(|g| g.add_edge("a", "b"))
            .and_then(|g| {
                g.add_conditional_edges(
                    "b",
                    router_fn(|_| Ok(Route::to("done"))),
                    [("again", "a"), ("done", END)],
                )
            })
            .expect("valid graph");
        graph.compile().expect("compiles")
    }

    #[test]
    fn test_introspection() {
        let graph = sample();
        assert_eq!(graph.start(), "a");
        assert_eq!(graph.node_count(), 2);
        assert!(graph.has_node("b"));
        assert!(!graph.has_node(END));
        assert_eq!(
            graph.node_ids().map(NodeId::as_str).collect::<Vec<_>>(),
            vec!["a", "b"]
        );

        let static_edge = graph.transition("a").expect("edge for a");
        assert!(!static_edge.is_conditional());
        assert_eq!(
            static_edge.targets().map(NodeId::as_str).collect::<Vec<_>>(),
            vec!["b"]
        );

        let conditional = graph.transition("b").expect("edge for b");
        assert!(conditional.is_conditional());
        assert_eq!(
            conditional.targets().map(NodeId::as_str).collect::<Vec<_>>(),
            vec!["a", END]
        );
    }

    #[test]
    fn test_compiled_graph_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CompiledGraph>();
        assert_send_sync::<Arc<CompiledGraph>>();
    }
}
