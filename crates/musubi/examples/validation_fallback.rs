//! Query expansion guarded by a validation node.
//!
//! Invalid queries are routed to a fallback node instead of failing the run,
//! so recovery is expressed as graph shape.

use async_trait::async_trait;
use musubi::prelude::*;
use serde_json::json;
use tracing_subscriber::EnvFilter;

struct Validate {
    min_len: usize,
}

#[async_trait]
impl NodeAction for Validate {
    async fn run(&self, state: StateSnapshot, _ctx: StepContext) -> Result<StateUpdate, ActionError> {
        let query = state.get_str("query").unwrap_or("").trim();
        let ok = query.chars().count() >= self.min_len;
        let reason = if ok { "" } else { "query is empty or too short" };
        Ok(StateUpdate::new().set("validation", json!({ "ok": ok, "reason": reason })))
    }
}

struct Expander {
    variants: usize,
}

#[async_trait]
impl NodeAction for Expander {
    async fn run(&self, state: StateSnapshot, ctx: StepContext) -> Result<StateUpdate, ActionError> {
        let query = state.get_str("query").unwrap_or("");
        let mut expanded = Vec::with_capacity(self.variants);
        for i in 0..self.variants {
            if ctx.is_cancelled() {
                return Err(ActionError::new("expansion cancelled"));
            }
            expanded.push(format!("{query} (variant {})", i + 1));
        }
        Ok(StateUpdate::new().set("expander_content", json!(expanded)))
    }
}

fn fallback(state: &StateSnapshot) -> Result<StateUpdate, ActionError> {
    let query = state.get_str("query").unwrap_or("");
    let reason = state
        .get("validation")
        .and_then(|v| v.get("reason"))
        .and_then(|r| r.as_str())
        .unwrap_or("fallback");
    Ok(StateUpdate::new()
        .set("error", json!(reason))
        .set("expander_content", json!([query])))
}

fn build_graph() -> Result<CompiledGraph, GraphError> {
    let mut graph = GraphSpec::new();
    graph
        .add_node("validate", Validate { min_len: 3 })?
        .add_node("expander", Expander { variants: 3 })?
        .add_node("fallback", node_sync(fallback))?
        .add_edge(START, "validate")?
        .add_conditional_edges(
            "validate",
            router_fn(|state| {
                let ok = state
                    .get("validation")
                    .and_then(|v| v.get("ok"))
                    .and_then(|ok| ok.as_bool())
                    .unwrap_or(false);
                Ok(Route::to(if ok { "valid" } else { "invalid" }))
            })
            .with_labels(["valid", "invalid"]),
            [("valid", "expander"), ("invalid", "fallback")],
        )?
        .add_edge("expander", END)?
        .add_edge("fallback", END)?;
    graph.compile()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("musubi=info,warn")),
        )
        .init();

    let graph = build_graph()?;
    println!("{}", graph.to_plantuml("expander flow"));

    for query in ["graph engines in rust", "  "] {
        let result = graph
            .execute(StateUpdate::new().set("query", json!(query)), ExecutionConfig::new())
            .await?;
        println!("query {:?}", query);
        for (key, value) in &result.state {
            println!("  {key} = {value}");
        }
    }

    Ok(())
}
