//! Run-scoped execution context and the per-step view handed to actions.

use crate::node::NodeId;
use crate::update::CounterOp;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// Bookkeeping for one run of a compiled graph.
///
/// Created fresh for every run and dropped when the run returns. Retry and
/// loop counters live here rather than in the state bag, so they always start
/// at zero and never collide with business keys.
#[derive(Debug)]
pub struct ExecutionContext {
    correlation_id: Arc<str>,
    step: usize,
    max_steps: usize,
    cancellation: CancellationToken,
    counters: BTreeMap<String, u64>,
}

impl ExecutionContext {
    /// Creates a context at step zero with no counters.
    pub fn new(
        correlation_id: impl Into<Arc<str>>,
        max_steps: usize,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            step: 0,
            max_steps,
            cancellation,
            counters: BTreeMap::new(),
        }
    }

    /// Returns the correlation id used for tracing.
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Returns the current step number.
    pub fn step(&self) -> usize {
        self.step
    }

    /// Returns the step bound.
    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    /// Returns `true` once the step counter has reached the bound.
    pub fn step_limit_reached(&self) -> bool {
        self.step >= self.max_steps
    }

    /// Moves to the next step.
    pub fn advance(&mut self) {
        self.step += 1;
    }

    /// Returns the caller's cancellation token.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Returns `true` if the caller cancelled the run.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Returns a counter, zero if it was never touched.
    pub fn counter(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    /// Returns all counters.
    pub fn counters(&self) -> &BTreeMap<String, u64> {
        &self.counters
    }

    /// Applies counter operations in order.
    pub fn apply_counters<I>(&mut self, ops: I)
    where
        I: IntoIterator<Item = (String, CounterOp)>,
    {
        for (name, op) in ops {
            let slot = self.counters.entry(name).or_insert(0);
            *slot = op.apply(*slot);
        }
    }

    /// Builds the view passed to the action of `node_id`.
    ///
    /// The step token is a child of the run token: cancelling the run cancels
    /// it, and the executor cancels it alone when the step times out.
    pub fn step_context(&self, node_id: &NodeId) -> StepContext {
        StepContext {
            correlation_id: Arc::clone(&self.correlation_id),
            step: self.step,
            node_id: node_id.clone(),
            cancellation: self.cancellation.child_token(),
        }
    }

    /// Consumes the context, returning its counters.
    pub fn into_counters(self) -> BTreeMap<String, u64> {
        self.counters
    }
}

/// What a node or router knows about the step it runs in.
#[derive(Debug, Clone)]
pub struct StepContext {
    correlation_id: Arc<str>,
    step: usize,
    node_id: NodeId,
    cancellation: CancellationToken,
}

impl StepContext {
    /// A context outside any run, for exercising actions directly.
    pub fn detached(node_id: impl Into<NodeId>) -> Self {
        Self {
            correlation_id: Arc::from("detached"),
            step: 0,
            node_id: node_id.into(),
            cancellation: CancellationToken::new(),
        }
    }

    /// Returns the run's correlation id.
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Returns the step number.
    pub fn step(&self) -> usize {
        self.step
    }

    /// Returns the node being executed.
    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// Returns `true` once the step has been cancelled or has timed out.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Completes when the step is cancelled or times out.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancellation.cancelled()
    }

    /// Returns the step's token, e.g. to hand to spawned sub-operations.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }
}
