use musubi::prelude::*;
use serde_json::json;
use tokio_test::{assert_err, assert_ok};

const MAX_RETRIES: u64 = 2;

fn validation_graph() -> CompiledGraph {
    let mut graph = GraphSpec::new();
    graph
        .add_node(
            "validate",
            node_sync(|state| {
                let query = state.get_str("query").unwrap_or("").trim();
                let ok = !query.is_empty();
                let reason = if ok { "" } else { "query is empty or too short" };
                Ok(StateUpdate::new().set("validation", json!({ "ok": ok, "reason": reason })))
            }),
        )
        .and_then(|g| {
            g.add_node(
                "expander",
                node_sync(|state| {
                    let query = state.get_str("query").unwrap_or("");
                    Ok(StateUpdate::new()
                        .set("expander_content", json!([format!("{query} (expanded)")]))
                        .set("expanded_by", json!("expander")))
                }),
            )
        })
        .and_then(|g| {
            g.add_node(
                "fallback",
                node_sync(|state| {
                    let query = state.get_str("query").unwrap_or("").to_string();
                    let reason = state
                        .get("validation")
                        .and_then(|v| v.get("reason"))
                        .and_then(|r| r.as_str())
                        .unwrap_or("fallback")
                        .to_string();
                    Ok(StateUpdate::new()
                        .set("error", json!(reason))
                        .set("expander_content", json!([query])))
                }),
            )
        })
        .and_then(|g| g.add_edge(START, "validate"))
        .and_then(|g| {
            g.add_conditional_edges(
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
            )
        })
        .and_then(|g| g.add_edge("expander", END))
        .and_then(|g| g.add_edge("fallback", END))
        .expect("valid graph");
    graph.compile().expect("compiles")
}

#[tokio::test]
async fn test_invalid_input_takes_fallback_path() {
    let graph = validation_graph();
    let result = assert_ok!(
        graph
            .execute(StateUpdate::new().set("query", json!("   ")), ExecutionConfig::new())
            .await
    );

    assert_eq!(
        result.visited,
        vec![NodeId::new("validate"), NodeId::new("fallback")]
    );
    assert_eq!(result.get("error"), Some(&json!("query is empty or too short")));
    assert_eq!(result.get("expander_content"), Some(&json!(["   "])));
    assert!(!result.state.contains_key("expanded_by"));
}

#[tokio::test]
async fn test_valid_input_takes_work_path() {
    let graph = validation_graph();
    let result = assert_ok!(
        graph
            .execute(StateUpdate::new().set("query", json!("rust")), ExecutionConfig::new())
            .await
    );

    assert!(result.has_visited("expander"));
    assert!(!result.has_visited("fallback"));
    assert!(!result.state.contains_key("error"));
    assert_eq!(result.get("expander_content"), Some(&json!(["rust (expanded)"])));
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gate {
    Pass,
    Retry,
}

impl Outcome for Gate {
    const ALL: &'static [Self] = &[Gate::Pass, Gate::Retry];

    fn label(self) -> &'static str {
        match self {
            Gate::Pass => "pass",
            Gate::Retry => "retry",
        }
    }
}

fn quality_graph(gate: impl Router + 'static) -> CompiledGraph {
    let schema = StateSchema::new().key("answers", KeySpec::append());
    let mut graph = GraphSpec::new().with_schema(schema);
    graph
        .add_node(
            "generate",
            node_sync(|state| {
                let attempt = state.counter("retry_count") + 1;
                Ok(StateUpdate::new().set("answers", json!(format!("draft {attempt}"))))
            }),
        )
        .and_then(|g| {
            g.add_node(
                "assess",
                node_sync(|_| {
                    Ok(StateUpdate::new().set(
                        "quality_assessment",
                        json!({ "quality_passed": false, "overall_score": 4 }),
                    ))
                }),
            )
        })
        .and_then(|g| g.add_edge(START, "generate"))
        .and_then(|g| g.add_edge("generate", "assess"))
        .and_then(|g| {
            g.add_conditional_edges("assess", gate, [("retry", "generate"), ("pass", END)])
        })
        .expect("valid graph");
    graph.compile().expect("compiles")
}

#[tokio::test]
async fn test_quality_gate_forces_pass_after_max_retries() {
    let gate = outcome_router(|state| {
        if state.counter("retry_count") >= MAX_RETRIES {
            return Ok(Decision::new(Gate::Pass));
        }
        let passed = state
            .get("quality_assessment")
            .and_then(|q| q.get("quality_passed"))
            .and_then(|p| p.as_bool())
            .unwrap_or(false);
        if passed {
            Ok(Decision::new(Gate::Pass))
        } else {
            Ok(Decision::new(Gate::Retry).with_update(StateUpdate::new().increment("retry_count")))
        }
    });
    let graph = quality_graph(gate);

    let result = assert_ok!(graph.execute(StateUpdate::new(), ExecutionConfig::new()).await);
    assert_eq!(result.counter("retry_count"), MAX_RETRIES);
    assert_eq!(
        result.get("answers"),
        Some(&json!(["draft 1", "draft 2", "draft 3"]))
    );
    let labels: Vec<_> = result
        .trace
        .iter()
        .filter_map(|record| record.label.as_deref())
        .collect();
    assert_eq!(labels, vec!["retry", "retry", "pass"]);
    assert_eq!(result.steps, 6);
}

#[tokio::test]
async fn test_unbounded_retry_trips_step_limit() {
    let gate = outcome_router(|_| {
        Ok(Decision::new(Gate::Retry).with_update(StateUpdate::new().increment("retry_count")))
    });
    let graph = quality_graph(gate);

    let err = assert_err!(
        graph
            .execute(StateUpdate::new(), ExecutionConfig::new().with_max_steps(10))
            .await
    );
    assert!(matches!(
        &err,
        ExecutionError::StepLimitExceeded { node_id, step: 10, max_steps: 10 } if node_id == "generate"
    ));
}

fn loop_graph() -> CompiledGraph {
    let schema = StateSchema::new().key("processed_results", KeySpec::append());
    let mut graph = GraphSpec::new().with_schema(schema);
    graph
        .add_node(
            "loop_processor",
            node_sync(|state| {
                let items: Vec<String> = state.get_as("items")?.unwrap_or_default();
                let index = state.counter("loop_index") as usize;
                match items.get(index) {
                    Some(item) => Ok(StateUpdate::new()
                        .set(
                            "processed_results",
                            json!(format!("item {}: {} -> analysed", index + 1, item)),
                        )
                        .set("loop_completed", json!(index + 1 >= items.len()))
                        .increment("loop_index")),
                    None => Ok(StateUpdate::new().set("loop_completed", json!(true))),
                }
            }),
        )
        .and_then(|g| {
            g.add_node(
                "result_collector",
                node_sync(|state| {
                    let results = state.get_array("processed_results").cloned().unwrap_or_default();
                    Ok(StateUpdate::new()
                        .set("processed_count", json!(results.len()))
                        .set("analysis_results", json!(results)))
                }),
            )
        })
        .and_then(|g| g.add_edge(START, "loop_processor"))
        .and_then(|g| {
            g.add_conditional_edges(
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
            )
        })
        .and_then(|g| g.add_edge("result_collector", END))
        .expect("valid graph");
    graph.compile().expect("compiles")
}

#[tokio::test]
async fn test_loop_processes_every_item_in_order() {
    let graph = loop_graph();
    let items = json!(["alpha", "beta", "gamma", "delta"]);
    let result = assert_ok!(
        graph
            .execute(StateUpdate::new().set("items", items), ExecutionConfig::new())
            .await
    );

    assert_eq!(result.counter("loop_index"), 4);
    assert_eq!(result.get("loop_completed"), Some(&json!(true)));
    assert_eq!(result.get("processed_count"), Some(&json!(4)));
    assert_eq!(
        result.get("analysis_results"),
        Some(&json!([
            "item 1: alpha -> analysed",
            "item 2: beta -> analysed",
            "item 3: gamma -> analysed",
            "item 4: delta -> analysed",
        ]))
    );
    assert_eq!(result.steps, 5);
}

#[tokio::test]
async fn test_loop_over_empty_input_finishes_immediately() {
    let graph = loop_graph();
    let result = assert_ok!(
        graph
            .execute(StateUpdate::new().set("items", json!([])), ExecutionConfig::new())
            .await
    );

    assert_eq!(result.counter("loop_index"), 0);
    assert_eq!(result.get("processed_count"), Some(&json!(0)));
    assert_eq!(
        result.visited,
        vec![NodeId::new("loop_processor"), NodeId::new("result_collector")]
    );
}
