//! The step loop.

use crate::compiled::{CompiledGraph, Transition};
use crate::config::{ExecutionConfig, ExecutionLimits};
use musubi_core::{
    ActionError, ActionPhase, ExecutionContext, ExecutionError, NodeId, Route, StateBag,
    StateUpdate, StepContext, START,
};
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument, Span};

/// One executed step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRecord {
    /// Step number, starting at zero.
    pub step: usize,
    /// The node that ran.
    pub node_id: NodeId,
    /// Label emitted by the router, for conditional edges.
    pub label: Option<String>,
    /// The node chosen next.
    pub next: NodeId,
    /// Time spent in the node and its router.
    pub elapsed: Duration,
}

/// The outcome of a successful run.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Correlation id of the run.
    pub correlation_id: String,
    /// Final state, in key order.
    pub state: BTreeMap<String, Value>,
    /// Final retry and loop counters.
    pub counters: BTreeMap<String, u64>,
    /// Nodes in the order they ran.
    pub visited: Vec<NodeId>,
    /// Per-step details.
    pub trace: Vec<StepRecord>,
    /// Number of steps taken.
    pub steps: usize,
    /// Wall-clock duration of the run.
    pub elapsed: Duration,
}

impl ExecutionResult {
    /// Returns a value of the final state.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.state.get(key)
    }

    /// Returns a final counter, zero if never touched.
    pub fn counter(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    /// Returns `true` if the node ran at least once.
    pub fn has_visited(&self, id: &str) -> bool {
        self.visited.iter().any(|node| node == id)
    }
}

/// Runs a compiled graph once.
///
/// The initial state's key writes go through the same merge path as node
/// writes. Its counter operations are dropped, so every run starts with all
/// counters at zero. Every failure aborts the run and no partial state is
/// returned.
///
/// ```
/// use musubi::prelude::*;
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let mut graph = GraphSpec::new();
/// graph
///     .add_node("double", node_sync(|state| {
///         let n = state.get_i64("n").unwrap_or(0);
///         Ok(StateUpdate::new().set("n", json!(n * 2)))
///     }))?
///     .add_edge(START, "double")?
///     .add_edge("double", END)?;
/// let graph = graph.compile()?;
///
/// let result = musubi::execute(&graph, StateUpdate::new().set("n", json!(21)), ExecutionConfig::new())
///     .await?;
/// assert_eq!(result.get("n"), Some(&json!(42)));
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// # }).unwrap();
/// ```
pub async fn execute(
    graph: &CompiledGraph,
    initial: impl Into<StateUpdate>,
    config: ExecutionConfig,
) -> Result<ExecutionResult, ExecutionError> {
    let correlation_id = config.resolve_correlation_id();
    let span = info_span!(
        "graph.execute",
        correlation_id = %correlation_id,
        start = %graph.start(),
        steps = tracing::field::Empty,
    );

    let run = Run::new(graph, correlation_id, config);
    async move {
        match run.drive(initial.into()).await {
            Ok(result) => {
                Span::current().record("steps", result.steps);
                info!(
                    steps = result.steps,
                    elapsed_ms = result.elapsed.as_millis() as u64,
                    "Graph execution completed"
                );
                Ok(result)
            }
            Err(e) => {
                warn!(node_id = %e.node_id(), step = e.step(), "Graph execution failed: {}", e);
                Err(e)
            }
        }
    }
    .instrument(span)
    .await
}

struct Run<'g> {
    graph: &'g CompiledGraph,
    state: StateBag,
    ctx: ExecutionContext,
    limits: ExecutionLimits,
    started: Instant,
    deadline: Option<Instant>,
}

impl<'g> Run<'g> {
    fn new(graph: &'g CompiledGraph, correlation_id: String, config: ExecutionConfig) -> Self {
        let started = Instant::now();
        let limits = config.limits;
        let ctx = ExecutionContext::new(
            correlation_id,
            limits.max_steps,
            config.cancellation.unwrap_or_default(),
        );
        Self {
            graph,
            state: StateBag::new(graph.shared_schema()),
            ctx,
            deadline: limits.run_timeout.map(|limit| started + limit),
            limits,
            started,
        }
    }

    async fn drive(mut self, initial: StateUpdate) -> Result<ExecutionResult, ExecutionError> {
        self.seed(initial)?;
        info!(
            max_steps = self.limits.max_steps,
            keys = self.state.len(),
            "Graph execution started"
        );

        let mut current = self.graph.start().clone();
        let mut trace = Vec::new();

        while !current.is_end() {
            let step = self.ctx.step();
            if self.ctx.step_limit_reached() {
                return Err(ExecutionError::StepLimitExceeded {
                    node_id: current,
                    step,
                    max_steps: self.ctx.max_steps(),
                });
            }
            if self.ctx.is_cancelled() {
                return Err(ExecutionError::Cancelled {
                    node_id: current,
                    step,
                });
            }
            if let (Some(deadline), Some(limit)) = (self.deadline, self.limits.run_timeout) {
                if Instant::now() >= deadline {
                    return Err(ExecutionError::Timeout {
                        node_id: current,
                        step,
                        limit,
                    });
                }
            }

            let step_started = Instant::now();
            let span = info_span!("graph.step", node_id = %current, step);
            let (next, label) = self
                .step(&current, step_started)
                .instrument(span)
                .await?;

            trace.push(StepRecord {
                step,
                node_id: current,
                label,
                next: next.clone(),
                elapsed: step_started.elapsed(),
            });
            self.ctx.advance();
            current = next;
        }

        let steps = self.ctx.step();
        let elapsed = self.started.elapsed();
        Ok(ExecutionResult {
            correlation_id: self.ctx.correlation_id().to_string(),
            visited: trace.iter().map(|record| record.node_id.clone()).collect(),
            trace,
            steps,
            elapsed,
            counters: self.ctx.into_counters(),
            state: self.state.into_values(),
        })
    }

    async fn step(
        &mut self,
        node_id: &NodeId,
        step_started: Instant,
    ) -> Result<(NodeId, Option<String>), ExecutionError> {
        let graph = self.graph;
        let deadline = self.step_deadline(step_started);
        let entry = graph
            .entry(node_id)
            .ok_or_else(|| ExecutionError::NodeActionFailure {
                node_id: node_id.clone(),
                step: self.ctx.step(),
                phase: ActionPhase::Node,
                source: ActionError::new("node is not part of the compiled graph"),
            })?;

        let step_ctx = self.ctx.step_context(node_id);
        let snapshot = self.state.snapshot(self.ctx.counters());
        let update = self
            .guarded(
                ActionPhase::Node,
                &step_ctx,
                deadline,
                entry.action.run(snapshot, step_ctx.clone()),
            )
            .await?;
        self.apply(node_id, update)?;

        match &entry.transition {
            Transition::Static(next) => {
                debug!(next = %next, "Node '{}' completed", node_id);
                Ok((next.clone(), None))
            }
            Transition::Conditional { router, labels } => {
                let snapshot = self.state.snapshot(self.ctx.counters());
                let Route { label, update } = self
                    .guarded(
                        ActionPhase::Router,
                        &step_ctx,
                        deadline,
                        router.route(snapshot, step_ctx.clone()),
                    )
                    .await?;
                self.apply(node_id, update)?;

                let next = labels
                    .get(&label)
                    .cloned()
                    .ok_or_else(|| ExecutionError::UnknownRoutingLabel {
                        node_id: node_id.clone(),
                        label: label.clone(),
                        step: self.ctx.step(),
                    })?;
                debug!(label = %label, next = %next, "Node '{}' completed", node_id);
                Ok((next, Some(label)))
            }
        }
    }

    /// Races an action against caller cancellation and the step deadline.
    async fn guarded<T, F>(
        &self,
        phase: ActionPhase,
        step_ctx: &StepContext,
        deadline: Option<(Instant, Duration)>,
        action: F,
    ) -> Result<T, ExecutionError>
    where
        F: Future<Output = Result<T, ActionError>>,
    {
        let node_id = step_ctx.node_id();
        let step = step_ctx.step();
        let expiry = async {
            match deadline {
                Some((at, _)) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.ctx.cancellation().cancelled() => {
                warn!("{} action in '{}' cancelled by caller", phase, node_id);
                Err(ExecutionError::Cancelled {
                    node_id: node_id.clone(),
                    step,
                })
            }
            result = action => result.map_err(|source| ExecutionError::NodeActionFailure {
                node_id: node_id.clone(),
                step,
                phase,
                source,
            }),
            _ = expiry => {
                step_ctx.cancellation_token().cancel();
                let limit = deadline.map(|(_, limit)| limit).unwrap_or_default();
                warn!("{} action in '{}' timed out after {:?}", phase, node_id, limit);
                Err(ExecutionError::Timeout {
                    node_id: node_id.clone(),
                    step,
                    limit,
                })
            }
        }
    }

    /// When the step started at `step_started` must finish, and which
    /// configured limit that instant comes from.
    ///
    /// The node, its merge and its router share this one deadline.
    fn step_deadline(&self, step_started: Instant) -> Option<(Instant, Duration)> {
        let per_step = self
            .limits
            .step_timeout
            .map(|limit| (step_started + limit, limit));
        let run = self.deadline.zip(self.limits.run_timeout);
        match (per_step, run) {
            (Some(step), Some(run)) => Some(if run.0 < step.0 { run } else { step }),
            (step, run) => step.or(run),
        }
    }

    /// Merges the caller's initial key writes.
    fn seed(&mut self, initial: StateUpdate) -> Result<(), ExecutionError> {
        let (values, counters) = initial.into_parts();
        if !counters.is_empty() {
            debug!(
                dropped = counters.len(),
                "Counter operations in the initial state are ignored"
            );
        }
        self.write_values(&NodeId::new(START), values)
    }

    fn apply(&mut self, node_id: &NodeId, update: StateUpdate) -> Result<(), ExecutionError> {
        let (values, counters) = update.into_parts();
        self.ctx.apply_counters(counters);
        self.write_values(node_id, values)
    }

    fn write_values(
        &mut self,
        node_id: &NodeId,
        values: Vec<(String, Value)>,
    ) -> Result<(), ExecutionError> {
        self.state
            .merge(values)
            .map_err(|source| ExecutionError::StateMerge {
                node_id: node_id.clone(),
                step: self.ctx.step(),
                source,
            })
    }
}
