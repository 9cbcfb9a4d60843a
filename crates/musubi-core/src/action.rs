//! Node and router contracts, and closure adapters for both.

use crate::context::StepContext;
use crate::error::ActionError;
use crate::state::StateSnapshot;
use crate::update::{Route, StateUpdate};
use async_trait::async_trait;
use std::future::Future;
use std::marker::PhantomData;

/// The work done by a node.
///
/// Receives an immutable snapshot and returns one partial update. The action
/// may fan out internally, but the engine awaits its single result before
/// merging. It should watch [`StepContext::cancelled`] during long waits.
///
/// # Examples
///
/// ```
/// use musubi_core::{ActionError, NodeAction, StateSnapshot, StateUpdate, StepContext};
/// use async_trait::async_trait;
/// use serde_json::json;
///
/// struct Validate {
///     min_len: usize,
/// }
///
/// #[async_trait]
/// impl NodeAction for Validate {
///     async fn run(&self, state: StateSnapshot, _ctx: StepContext) -> Result<StateUpdate, ActionError> {
///         let query = state.get_str("query").unwrap_or("").trim();
///         Ok(StateUpdate::new().set("valid", json!(query.len() >= self.min_len)))
///     }
/// }
/// ```
#[async_trait]
pub trait NodeAction: Send + Sync {
    /// Runs the node against a snapshot.
    async fn run(&self, state: StateSnapshot, ctx: StepContext) -> Result<StateUpdate, ActionError>;
}

/// Chooses the successor of a node with a conditional edge.
///
/// Must be deterministic: identical state yields an identical route. The
/// route's update is merged before the transition.
#[async_trait]
pub trait Router: Send + Sync {
    /// Picks a label for the given state.
    async fn route(&self, state: StateSnapshot, ctx: StepContext) -> Result<Route, ActionError>;

    /// Every label this router can emit, when that set is known up front.
    ///
    /// Graph validation checks each listed label against the edge's table.
    fn labels(&self) -> Option<Vec<String>> {
        None
    }
}

/// Node backed by an async closure. See [`node_fn`].
pub struct FnNode<F> {
    f: F,
}

/// Wraps an async closure as a [`NodeAction`].
///
/// ```
/// use musubi_core::{node_fn, StateUpdate};
/// use serde_json::json;
///
/// let node = node_fn(|state, _ctx| async move {
///     let n = state.get_i64("n").unwrap_or(0);
///     Ok(StateUpdate::new().set("n", json!(n + 1)))
/// });
/// # let _ = node;
/// ```
pub fn node_fn<F, Fut>(f: F) -> FnNode<F>
where
    F: Fn(StateSnapshot, StepContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<StateUpdate, ActionError>> + Send + 'static,
{
    FnNode { f }
}

#[async_trait]
impl<F, Fut> NodeAction for FnNode<F>
where
    F: Fn(StateSnapshot, StepContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<StateUpdate, ActionError>> + Send + 'static,
{
    async fn run(&self, state: StateSnapshot, ctx: StepContext) -> Result<StateUpdate, ActionError> {
        (self.f)(state, ctx).await
    }
}

/// Node backed by a synchronous closure. See [`node_sync`].
pub struct SyncNode<F> {
    f: F,
}

/// Wraps a synchronous closure over the snapshot as a [`NodeAction`].
pub fn node_sync<F>(f: F) -> SyncNode<F>
where
    F: Fn(&StateSnapshot) -> Result<StateUpdate, ActionError> + Send + Sync + 'static,
{
    SyncNode { f }
}

#[async_trait]
impl<F> NodeAction for SyncNode<F>
where
    F: Fn(&StateSnapshot) -> Result<StateUpdate, ActionError> + Send + Sync + 'static,
{
    async fn run(&self, state: StateSnapshot, _ctx: StepContext) -> Result<StateUpdate, ActionError> {
        (self.f)(&state)
    }
}

/// Router backed by a synchronous closure. See [`router_fn`].
pub struct FnRouter<F> {
    f: F,
    labels: Option<Vec<String>>,
}

/// Wraps a deterministic closure as a [`Router`].
///
/// ```
/// use musubi_core::{router_fn, Route, Router};
///
/// let router = router_fn(|state| {
///     let ok = state.get_bool("valid").unwrap_or(false);
///     Ok(Route::to(if ok { "valid" } else { "invalid" }))
/// })
/// .with_labels(["valid", "invalid"]);
///
/// assert_eq!(router.labels().map(|l| l.len()), Some(2));
/// ```
pub fn router_fn<F>(f: F) -> FnRouter<F>
where
    F: Fn(&StateSnapshot) -> Result<Route, ActionError> + Send + Sync + 'static,
{
    FnRouter { f, labels: None }
}

impl<F> FnRouter<F> {
    /// Declares the full set of labels the closure can return.
    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = Some(labels.into_iter().map(Into::into).collect());
        self
    }
}

#[async_trait]
impl<F> Router for FnRouter<F>
where
    F: Fn(&StateSnapshot) -> Result<Route, ActionError> + Send + Sync + 'static,
{
    async fn route(&self, state: StateSnapshot, _ctx: StepContext) -> Result<Route, ActionError> {
        (self.f)(&state)
    }

    fn labels(&self) -> Option<Vec<String>> {
        self.labels.clone()
    }
}

/// A closed set of routing outcomes.
///
/// Implement it on a fieldless enum; the graph builder then derives the
/// label table from an exhaustive `match`, so a missing outcome is a Rust
/// compile error instead of a runtime routing failure.
///
/// ```
/// use musubi_core::Outcome;
///
/// #[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// enum Gate {
///     Pass,
///     Retry,
/// }
///
/// impl Outcome for Gate {
///     const ALL: &'static [Self] = &[Gate::Pass, Gate::Retry];
///
///     fn label(self) -> &'static str {
///         match self {
///             Gate::Pass => "pass",
///             Gate::Retry => "retry",
///         }
///     }
/// }
///
/// assert_eq!(Gate::Retry.label(), "retry");
/// ```
pub trait Outcome: Copy + Send + Sync + 'static {
    /// Every variant.
    const ALL: &'static [Self];

    /// The label emitted for this outcome.
    fn label(self) -> &'static str;
}

/// A typed routing decision with an optional state delta.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision<O> {
    /// The chosen outcome.
    pub outcome: O,
    /// Writes merged before the transition.
    pub update: StateUpdate,
}

impl<O> Decision<O> {
    /// Chooses an outcome without changing state.
    pub fn new(outcome: O) -> Self {
        Self {
            outcome,
            update: StateUpdate::new(),
        }
    }

    /// Attaches a state delta.
    pub fn with_update(mut self, update: StateUpdate) -> Self {
        self.update = update;
        self
    }
}

impl<O> From<O> for Decision<O> {
    fn from(outcome: O) -> Self {
        Self::new(outcome)
    }
}

/// Router over an [`Outcome`] enum. See [`outcome_router`].
pub struct OutcomeRouter<O, F> {
    f: F,
    _outcome: PhantomData<fn() -> O>,
}

/// Wraps a closure returning a typed [`Decision`] as a [`Router`].
pub fn outcome_router<O, F>(f: F) -> OutcomeRouter<O, F>
where
    O: Outcome,
    F: Fn(&StateSnapshot) -> Result<Decision<O>, ActionError> + Send + Sync + 'static,
{
    OutcomeRouter {
        f,
        _outcome: PhantomData,
    }
}

#[async_trait]
impl<O, F> Router for OutcomeRouter<O, F>
where
    O: Outcome,
    F: Fn(&StateSnapshot) -> Result<Decision<O>, ActionError> + Send + Sync + 'static,
{
    async fn route(&self, state: StateSnapshot, _ctx: StepContext) -> Result<Route, ActionError> {
        let decision = (self.f)(&state)?;
        Ok(Route::to(decision.outcome.label()).with_update(decision.update))
    }

    fn labels(&self) -> Option<Vec<String>> {
        Some(O::ALL.iter().map(|o| o.label().to_string()).collect())
    }
}
