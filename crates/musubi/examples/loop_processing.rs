//! Processes a list of items one per step, then collects the results.
//!
//! The loop index is a run-scoped counter, results accumulate through an
//! append-merged key, and the router decides between `continue` and `finish`.

use musubi::prelude::*;
use serde_json::json;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn analyse(item: &str) -> String {
    let words = item.split_whitespace().count();
    format!("{words} word(s), {} characters", item.chars().count())
}

fn build_graph() -> Result<CompiledGraph, GraphError> {
    let schema = StateSchema::new().key("processed_results", KeySpec::append());
    let mut graph = GraphSpec::new().with_schema(schema);
    graph
        .add_node(
            "loop_processor",
            node_fn(|state, ctx| async move {
                let items: Vec<String> = state.get_as("items")?.unwrap_or_default();
                let index = state.counter("loop_index") as usize;
                let Some(item) = items.get(index) else {
                    return Ok(StateUpdate::new().set("loop_completed", json!(true)));
                };

                tokio::select! {
                    _ = ctx.cancelled() => return Err(ActionError::new("processing cancelled")),
                    _ = tokio::time::sleep(Duration::from_millis(20)) => {}
                }

                Ok(StateUpdate::new()
                    .set(
                        "processed_results",
                        json!(format!("item {}: {} -> {}", index + 1, item, analyse(item))),
                    )
                    .set(
                        "current_processing",
                        json!(format!("processed {}/{}", index + 1, items.len())),
                    )
                    .set("loop_completed", json!(index + 1 >= items.len()))
                    .increment("loop_index"))
            }),
        )?
        .add_node(
            "result_collector",
            node_sync(|state| {
                let results = state.get_array("processed_results").cloned().unwrap_or_default();
                let total = state.get_array("items").map(Vec::len).unwrap_or(0);
                Ok(StateUpdate::new().set(
                    "loop_final_result",
                    json!({
                        "summary": format!("processed {} of {} items", results.len(), total),
                        "processed_count": results.len(),
                        "analysis_results": results,
                    }),
                ))
            }),
        )?
        .add_edge(START, "loop_processor")?
        .add_conditional_edges(
            "loop_processor",
            router_fn(|state| {
                let total = state.get_array("items").map(Vec::len).unwrap_or(0) as u64;
                let completed = state.get_bool("loop_completed").unwrap_or(false);
                if completed || state.counter("loop_index") >= total {
                    Ok(Route::to("finish"))
                } else {
                    Ok(Route::to("continue"))
                }
            })
            .with_labels(["continue", "finish"]),
            [("continue", "loop_processor"), ("finish", "result_collector")],
        )?
        .add_edge("result_collector", END)?;
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
    let items = json!([
        "graph engines",
        "conditional routing between nodes",
        "bounded retry cycles",
        "append merge strategy",
    ]);

    let config = ExecutionConfig::new()
        .with_correlation_id("loop-demo")
        .with_step_timeout(Duration::from_secs(2));
    let result = graph
        .execute(StateUpdate::new().set("items", items), config)
        .await?;

    println!("steps: {}, loop index: {}", result.steps, result.counter("loop_index"));
    if let Some(summary) = result.get("loop_final_result") {
        println!("{}", serde_json::to_string_pretty(summary)?);
    }

    Ok(())
}
