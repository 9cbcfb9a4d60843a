//! A graph-based workflow engine for Rust.
//!
//! Declare nodes and edges with [`GraphSpec`], compile once into an immutable
//! [`CompiledGraph`], then run it per request. Each run gets a fresh state bag
//! and counters; routers choose between labelled successors, and a global step
//! bound stops runaway cycles.
//!
//! # Example
//!
//! ```rust
//! use musubi::prelude::*;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut graph = GraphSpec::new();
//!     graph
//!         .add_node("validate", node_sync(|state| {
//!             let query = state.get_str("query").unwrap_or("").trim();
//!             Ok(StateUpdate::new().set("valid", json!(!query.is_empty())))
//!         }))?
//!         .add_node("answer", node_sync(|_| {
//!             Ok(StateUpdate::new().set("answer", json!("42")))
//!         }))?
//!         .add_node("fallback", node_sync(|_| {
//!             Ok(StateUpdate::new().set("error", json!("empty query")))
//!         }))?
//!         .add_edge(START, "validate")?
//!         .add_conditional_edges(
//!             "validate",
//!             router_fn(|state| {
//!                 let valid = state.get_bool("valid").unwrap_or(false);
//!                 Ok(Route::to(if valid { "valid" } else { "invalid" }))
//!             }),
//!             [("valid", "answer"), ("invalid", "fallback")],
//!         )?
//!         .add_edge("answer", END)?
//!         .add_edge("fallback", END)?;
//!
//!     let graph = graph.compile()?;
//!     let result = graph
//!         .execute(StateUpdate::new().set("query", json!("meaning?")), ExecutionConfig::new())
//!         .await?;
//!     assert_eq!(result.get("answer"), Some(&json!("42")));
//!     Ok(())
//! }
//! ```

mod compiled;
mod config;
mod executor;
mod graph;
mod render;

// Re-export core types
pub use musubi_core::*;

pub use compiled::{CompiledGraph, Transition};
pub use config::{ExecutionConfig, ExecutionLimits, DEFAULT_MAX_STEPS, DEFAULT_STEP_TIMEOUT};
pub use executor::{execute, ExecutionResult, StepRecord};
pub use graph::GraphSpec;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{
        node_fn, node_sync, outcome_router, router_fn, ActionError, CompiledGraph, Decision,
        ExecutionConfig, ExecutionError, ExecutionLimits, ExecutionResult, GraphError, GraphSpec,
        KeySpec, MergeStrategy, NodeAction, NodeId, Outcome, Route, Router, StateSchema,
        StateSnapshot, StateUpdate, StepContext, END, START,
    };
}
