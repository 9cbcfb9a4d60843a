//! Customer service graph with intent routing and a bounded quality gate.
//!
//! Demonstrates:
//! - Closed outcome enums checked by the compiler (`add_outcome_edges`)
//! - Low-confidence fallback to a general path
//! - A retry cycle bounded by a run-scoped counter
//!
//! Text generation is a deterministic stub, so the demo runs offline.
//! Set `RUST_LOG=musubi=debug` to follow every step.

use async_trait::async_trait;
use musubi::prelude::*;
use serde_json::json;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const MAX_RETRIES: u64 = 2;
const MIN_CONFIDENCE: i64 = 60;
const PASSING_SCORE: i64 = 7;

/// Stand-in for a language model client.
#[derive(Debug, Default)]
struct StubGenerator;

impl StubGenerator {
    fn classify(&self, question: &str) -> (&'static str, i64) {
        let q = question.to_lowercase();
        if ["refund", "broken", "angry", "terrible"].iter().any(|w| q.contains(w)) {
            ("COMPLAINT", 85)
        } else if ["price", "how do i", "what is"].iter().any(|w| q.contains(w)) {
            ("FAQ", 80)
        } else {
            ("COMPLEX", 45)
        }
    }

    fn answer(&self, question: &str, context: &str, attempt: u64) -> String {
        let detail = if attempt > 1 { " Here is a step-by-step breakdown." } else { "" };
        format!("Regarding \"{question}\": {context}.{detail}")
    }

    fn score(&self, answer: &str) -> i64 {
        if answer.contains("step-by-step") {
            8
        } else {
            5
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Intent {
    Faq,
    Complex,
    Complaint,
}

impl Outcome for Intent {
    const ALL: &'static [Self] = &[Intent::Faq, Intent::Complex, Intent::Complaint];

    fn label(self) -> &'static str {
        match self {
            Intent::Faq => "faq",
            Intent::Complex => "complex",
            Intent::Complaint => "complaint",
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Quality {
    Pass,
    Retry,
}

impl Outcome for Quality {
    const ALL: &'static [Self] = &[Quality::Pass, Quality::Retry];

    fn label(self) -> &'static str {
        match self {
            Quality::Pass => "pass",
            Quality::Retry => "retry",
        }
    }
}

struct IntentRecognition {
    llm: Arc<StubGenerator>,
}

#[async_trait]
impl NodeAction for IntentRecognition {
    async fn run(&self, state: StateSnapshot, _ctx: StepContext) -> Result<StateUpdate, ActionError> {
        let question = state.get_str("question").unwrap_or("").trim();
        if question.is_empty() {
            return Err(ActionError::new("question must not be empty"));
        }
        let (intent, confidence) = self.llm.classify(question);
        tracing::info!(intent, confidence, "Intent recognised");
        Ok(StateUpdate::new().set(
            "intent_analysis",
            json!({ "intent_type": intent, "confidence": confidence }),
        ))
    }
}

fn intent_of(state: &StateSnapshot) -> Intent {
    let analysis = state.get("intent_analysis");
    let confidence = analysis
        .and_then(|a| a.get("confidence"))
        .and_then(|c| c.as_i64())
        .unwrap_or(50);
    if confidence < MIN_CONFIDENCE {
        return Intent::Complex;
    }
    match analysis
        .and_then(|a| a.get("intent_type"))
        .and_then(|t| t.as_str())
        .unwrap_or("COMPLEX")
    {
        "FAQ" => Intent::Faq,
        "COMPLAINT" => Intent::Complaint,
        _ => Intent::Complex,
    }
}

fn handler(source: &'static str, context: &'static str) -> impl NodeAction {
    node_sync(move |_| {
        Ok(StateUpdate::new().set("handling", json!({ "source": source, "context": context })))
    })
}

struct AnswerGeneration {
    llm: Arc<StubGenerator>,
}

#[async_trait]
impl NodeAction for AnswerGeneration {
    async fn run(&self, state: StateSnapshot, _ctx: StepContext) -> Result<StateUpdate, ActionError> {
        let question = state.get_str("question").unwrap_or("");
        let context = state
            .get("handling")
            .and_then(|h| h.get("context"))
            .and_then(|c| c.as_str())
            .unwrap_or("no additional context");
        let attempt = state.counter("retry_count") + 1;
        let answer = self.llm.answer(question, context, attempt);
        Ok(StateUpdate::new()
            .set("final_answer", json!(answer))
            .set("drafts", json!(answer)))
    }
}

struct QualityAssessment {
    llm: Arc<StubGenerator>,
}

#[async_trait]
impl NodeAction for QualityAssessment {
    async fn run(&self, state: StateSnapshot, _ctx: StepContext) -> Result<StateUpdate, ActionError> {
        let score = self.llm.score(state.get_str("final_answer").unwrap_or(""));
        Ok(StateUpdate::new().set(
            "quality_assessment",
            json!({ "overall_score": score, "quality_passed": score >= PASSING_SCORE }),
        ))
    }
}

fn quality_gate(state: &StateSnapshot) -> Result<Decision<Quality>, ActionError> {
    let retries = state.counter("retry_count");
    if retries >= MAX_RETRIES {
        tracing::info!(retries, "Maximum retries reached, forcing pass");
        return Ok(Decision::new(Quality::Pass));
    }
    let passed = state
        .get("quality_assessment")
        .and_then(|q| q.get("quality_passed"))
        .and_then(|p| p.as_bool())
        .unwrap_or(false);
    if passed {
        Ok(Decision::new(Quality::Pass))
    } else {
        Ok(Decision::new(Quality::Retry).with_update(StateUpdate::new().increment("retry_count")))
    }
}

fn build_graph(llm: Arc<StubGenerator>) -> Result<CompiledGraph, GraphError> {
    let schema = StateSchema::new().key("drafts", KeySpec::append());
    let mut graph = GraphSpec::new().with_schema(schema);
    graph
        .add_node("intent_recognition", IntentRecognition { llm: Arc::clone(&llm) })?
        .add_node("knowledge_search", handler("knowledge_base", "see the pricing page"))?
        .add_node("ai_analysis", handler("analysis", "this needs a careful look at your setup"))?
        .add_node("human_service", handler("human", "a support agent will follow up"))?
        .add_node("answer_generation", AnswerGeneration { llm: Arc::clone(&llm) })?
        .add_node("quality_assessment", QualityAssessment { llm })?
        .add_edge(START, "intent_recognition")?
        .add_outcome_edges(
            "intent_recognition",
            outcome_router(|state| Ok(Decision::new(intent_of(state)))),
            |intent| match intent {
                Intent::Faq => "knowledge_search",
                Intent::Complex => "ai_analysis",
                Intent::Complaint => "human_service",
            },
        )?
        .add_edge("knowledge_search", "answer_generation")?
        .add_edge("ai_analysis", "answer_generation")?
        .add_edge("human_service", "answer_generation")?
        .add_edge("answer_generation", "quality_assessment")?
        .add_outcome_edges(
            "quality_assessment",
            outcome_router(quality_gate),
            |quality| match quality {
                Quality::Pass => NodeId::end(),
                Quality::Retry => NodeId::new("answer_generation"),
            },
        )?;
    graph.compile()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("musubi=info,warn")),
        )
        .with_target(false)
        .init();

    let graph = build_graph(Arc::new(StubGenerator))?;

    println!("=== Customer Service Graph ===\n");
    println!("{}", graph.to_mermaid());

    let questions = [
        "What is the price of the pro plan?",
        "My order arrived broken and I want a refund",
        "Can your API stream results over websockets?",
    ];

    for question in questions {
        let config = ExecutionConfig::new().with_max_steps(20);
        let result = graph
            .execute(StateUpdate::new().set("question", json!(question)), config)
            .await?;

        let path: Vec<_> = result.visited.iter().map(NodeId::as_str).collect();
        println!("Q: {question}");
        println!("   path:    {}", path.join(" -> "));
        println!("   retries: {}", result.counter("retry_count"));
        if let Some(answer) = result.get("final_answer").and_then(|a| a.as_str()) {
            println!("   answer:  {answer}\n");
        }
    }

    Ok(())
}
