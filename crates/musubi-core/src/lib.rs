//! Core types for the musubi graph engine.
//!
//! This crate holds everything a node or router author needs without pulling
//! in the executor: the state model, the action contracts and the error
//! taxonomy.
//!
//! # Core Types
//!
//! - [`NodeAction`] / [`Router`] - contracts for node work and conditional routing
//! - [`StateBag`] / [`StateSnapshot`] - per-run state and its read-only view
//! - [`MergeStrategy`] / [`StateSchema`] - how writes to each key are combined
//! - [`StateUpdate`] / [`Route`] - what actions hand back to the engine
//! - [`ExecutionContext`] / [`StepContext`] - run-scoped counters and cancellation
//! - [`GraphError`] / [`ExecutionError`] - construction and run failures

mod action;
mod context;
mod error;
mod merge;
mod node;
mod state;
mod update;

pub use action::{
    node_fn, node_sync, outcome_router, router_fn, Decision, FnNode, FnRouter, NodeAction,
    Outcome, OutcomeRouter, Router, SyncNode,
};
pub use context::{ExecutionContext, StepContext};
pub use error::{
    ActionError, ActionPhase, ExecutionError, GraphError, StateError, ValidationIssue,
};
pub use merge::{CombineFn, KeySpec, MergeStrategy, StateSchema, UnknownKeyPolicy, ValueKind};
pub use node::{NodeId, END, START};
pub use state::{StateBag, StateSnapshot};
pub use update::{CounterOp, Route, StateUpdate};

pub use tokio_util::sync::CancellationToken;
