//! Graph declaration and structural validation.

use crate::compiled::{CompiledGraph, Transition};
use musubi_core::{
    GraphError, KeySpec, NodeAction, NodeId, Outcome, OutcomeRouter, Router, StateSchema,
    ValidationIssue, START,
};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::sync::Arc;

/// Builder for a workflow graph.
///
/// Declare nodes, give every node exactly one outgoing edge (static or
/// conditional), pick a start node, then [`compile`](GraphSpec::compile).
///
/// ```
/// use musubi::prelude::*;
/// use serde_json::json;
///
/// let mut graph = GraphSpec::new();
/// graph
///     .add_node("greet", node_sync(|_| Ok(StateUpdate::new().set("greeting", json!("hello")))))?
///     .add_edge(START, "greet")?
///     .add_edge("greet", END)?;
///
/// let compiled = graph.compile()?;
/// assert_eq!(compiled.start(), "greet");
/// # Ok::<(), GraphError>(())
/// ```
#[derive(Default)]
pub struct GraphSpec {
    nodes: BTreeMap<NodeId, Arc<dyn NodeAction>>,
    edges: BTreeMap<NodeId, Transition>,
    start: Option<NodeId>,
    schema: StateSchema,
}

impl fmt::Debug for GraphSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphSpec")
            .field("nodes", &self.nodes.keys().collect::<Vec<_>>())
            .field("edges", &self.edges)
            .field("start", &self.start)
            .finish()
    }
}

impl GraphSpec {
    /// Creates an empty graph with a permissive schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the state schema.
    pub fn with_schema(mut self, schema: StateSchema) -> Self {
        self.schema = schema;
        self
    }

    /// Declares one state key.
    pub fn register_key(&mut self, key: impl Into<String>, spec: KeySpec) -> &mut Self {
        self.schema.register(key, spec);
        self
    }

    /// Declares a node.
    pub fn add_node<A>(&mut self, id: impl Into<NodeId>, action: A) -> Result<&mut Self, GraphError>
    where
        A: NodeAction + 'static,
    {
        self.add_shared_node(id, Arc::new(action))
    }

    /// Declares a node whose action is shared with other graphs.
    pub fn add_shared_node(
        &mut self,
        id: impl Into<NodeId>,
        action: Arc<dyn NodeAction>,
    ) -> Result<&mut Self, GraphError> {
        let id = id.into();
        if id.is_reserved() {
            return Err(GraphError::ReservedNodeId(id));
        }
        if self.nodes.contains_key(&id) {
            return Err(GraphError::DuplicateNode(id));
        }
        self.nodes.insert(id, action);
        Ok(self)
    }

    /// Designates the start node.
    pub fn start_with(&mut self, id: impl Into<NodeId>) -> &mut Self {
        self.start = Some(id.into());
        self
    }

    /// Adds a fixed transition. `add_edge(START, x)` designates `x` as the start node.
    ///
    /// The target may be declared later; it is checked by [`validate`](GraphSpec::validate).
    pub fn add_edge(
        &mut self,
        from: impl Into<NodeId>,
        to: impl Into<NodeId>,
    ) -> Result<&mut Self, GraphError> {
        let from = from.into();
        let to = to.into();
        if from == START {
            if self.start.is_some() {
                return Err(GraphError::EdgeAlreadyDefined(from));
            }
            self.start = Some(to);
            return Ok(self);
        }
        self.check_source(&from)?;
        self.edges.insert(from, Transition::Static(to));
        Ok(self)
    }

    /// Adds a router-driven transition with its label table.
    pub fn add_conditional_edges<R, I, L, T>(
        &mut self,
        from: impl Into<NodeId>,
        router: R,
        labels: I,
    ) -> Result<&mut Self, GraphError>
    where
        R: Router + 'static,
        I: IntoIterator<Item = (L, T)>,
        L: Into<String>,
        T: Into<NodeId>,
    {
        let from = from.into();
        self.check_source(&from)?;
        let labels: BTreeMap<String, NodeId> = labels
            .into_iter()
            .map(|(label, target)| (label.into(), target.into()))
            .collect();
        if labels.is_empty() {
            return Err(GraphError::EmptyLabelTable(from));
        }
        self.edges.insert(
            from,
            Transition::Conditional {
                router: Arc::new(router),
                labels,
            },
        );
        Ok(self)
    }

    /// Adds a transition over a closed [`Outcome`] set.
    ///
    /// `target` is usually an exhaustive `match`, so every outcome is mapped.
    pub fn add_outcome_edges<O, F, T, N>(
        &mut self,
        from: impl Into<NodeId>,
        router: OutcomeRouter<O, F>,
        target: T,
    ) -> Result<&mut Self, GraphError>
    where
        O: Outcome,
        OutcomeRouter<O, F>: Router + 'static,
        T: Fn(O) -> N,
        N: Into<NodeId>,
    {
        let labels: Vec<(&'static str, NodeId)> = O::ALL
            .iter()
            .map(|outcome| (outcome.label(), target(*outcome).into()))
            .collect();
        self.add_conditional_edges(from, router, labels)
    }

    /// Returns the start node, if designated.
    pub fn start(&self) -> Option<&NodeId> {
        self.start.as_ref()
    }

    /// Returns `true` if a node with this id was declared.
    pub fn has_node(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Returns the number of declared nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Checks the graph and reports every problem found.
    pub fn validate(&self) -> Result<(), GraphError> {
        let mut issues = Vec::new();

        let start = match &self.start {
            None => {
                issues.push(ValidationIssue::MissingStart);
                None
            }
            Some(start) if !self.nodes.contains_key(start) => {
                issues.push(ValidationIssue::UnknownStart(start.clone()));
                None
            }
            Some(start) => Some(start),
        };

        for (from, transition) in &self.edges {
            for to in transition.targets() {
                if !to.is_end() && !self.nodes.contains_key(to) {
                    issues.push(ValidationIssue::DanglingTarget {
                        from: from.clone(),
                        to: to.clone(),
                    });
                }
            }
            if let Transition::Conditional { router, labels } = transition {
                for label in router.labels().unwrap_or_default() {
                    if !labels.contains_key(&label) {
                        issues.push(ValidationIssue::UnmappedLabel {
                            from: from.clone(),
                            label,
                        });
                    }
                }
            }
        }

        for id in self.nodes.keys() {
            if !self.edges.contains_key(id) {
                issues.push(ValidationIssue::MissingEdge(id.clone()));
            }
        }

        if let Some(start) = start {
            let reachable = self.reachable_from(start);
            for id in self.nodes.keys() {
                if !reachable.contains(id) {
                    issues.push(ValidationIssue::Unreachable(id.clone()));
                }
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            issues.sort();
            issues.dedup();
            Err(GraphError::Validation(issues))
        }
    }

    /// Validates the graph and freezes it into an executable table.
    pub fn compile(self) -> Result<CompiledGraph, GraphError> {
        self.validate()?;
        let start = self
            .start
            .ok_or(GraphError::Validation(vec![ValidationIssue::MissingStart]))?;
        Ok(CompiledGraph::new(
            self.nodes,
            self.edges,
            start,
            Arc::new(self.schema),
        ))
    }

    fn check_source(&self, from: &NodeId) -> Result<(), GraphError> {
        if !self.nodes.contains_key(from) {
            return Err(GraphError::UnknownSource(from.clone()));
        }
        if self.edges.contains_key(from) {
            return Err(GraphError::EdgeAlreadyDefined(from.clone()));
        }
        Ok(())
    }

    fn reachable_from<'a>(&'a self, start: &'a NodeId) -> BTreeSet<&'a NodeId> {
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([start]);
        while let Some(id) = queue.pop_front() {
            if !seen.insert(id) {
                continue;
            }
            if let Some(transition) = self.edges.get(id) {
                queue.extend(
                    transition
                        .targets()
                        .filter(|to| self.nodes.contains_key(*to)),
                );
            }
        }
        seen
    }
}
