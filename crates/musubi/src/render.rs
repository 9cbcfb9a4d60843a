//! Text diagrams of a compiled graph.

use crate::compiled::{CompiledGraph, Transition};
use musubi_core::NodeId;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;

impl CompiledGraph {
    /// Renders the graph as a Mermaid flowchart.
    ///
    /// Nodes and labels are emitted in key order, so the output is stable.
    pub fn to_mermaid(&self) -> String {
        let ids = DiagramIds::new(self, "__end__");
        let mut out = String::from("flowchart TD\n");
        out.push_str("    __start__((start))\n");
        for id in self.node_ids() {
            let _ = writeln!(out, "    {}[\"{}\"]", ids.get(id), id);
        }
        out.push_str("    __end__((end))\n");

        let _ = writeln!(out, "    __start__ --> {}", ids.get(self.start()));
        for id in self.node_ids() {
            match self.transition(id.as_str()) {
                Some(Transition::Static(to)) => {
                    let _ = writeln!(out, "    {} --> {}", ids.get(id), ids.get(to));
                }
                Some(Transition::Conditional { labels, .. }) => {
                    for (label, to) in labels {
                        let _ = writeln!(
                            out,
                            "    {} -->|{}| {}",
                            ids.get(id),
                            label,
                            ids.get(to)
                        );
                    }
                }
                None => {}
            }
        }
        out
    }

    /// Renders the graph as a PlantUML state diagram.
    pub fn to_plantuml(&self, title: &str) -> String {
        let ids = DiagramIds::new(self, "[*]");
        let mut out = String::from("@startuml\n");
        if !title.is_empty() {
            let _ = writeln!(out, "title {}", title);
        }
        for id in self.node_ids() {
            let _ = writeln!(out, "state \"{}\" as {}", id, ids.get(id));
        }

        let _ = writeln!(out, "[*] --> {}", ids.get(self.start()));
        for id in self.node_ids() {
            match self.transition(id.as_str()) {
                Some(Transition::Static(to)) => {
                    let _ = writeln!(out, "{} --> {}", ids.get(id), ids.get(to));
                }
                Some(Transition::Conditional { labels, .. }) => {
                    for (label, to) in labels {
                        let _ = writeln!(
                            out,
                            "{} --> {} : {}",
                            ids.get(id),
                            ids.get(to),
                            label
                        );
                    }
                }
                None => {}
            }
        }
        out.push_str("@enduml\n");
        out
    }
}

/// Diagram identifiers, one per node and never shared.
///
/// Ids are the node id with every character outside `[A-Za-z0-9_]` replaced
/// by `_`. When that form is already taken, a numeric suffix is added.
struct DiagramIds<'g> {
    end: &'static str,
    ids: BTreeMap<&'g NodeId, String>,
}

impl<'g> DiagramIds<'g> {
    fn new(graph: &'g CompiledGraph, end: &'static str) -> Self {
        let mut taken: BTreeSet<String> = ["__start__", "__end__"]
            .into_iter()
            .map(String::from)
            .collect();
        let mut ids = BTreeMap::new();
        for id in graph.node_ids() {
            let base = sanitize(id);
            let mut candidate = base.clone();
            let mut n = 2;
            while taken.contains(&candidate) {
                candidate = format!("{base}_{n}");
                n += 1;
            }
            taken.insert(candidate.clone());
            ids.insert(id, candidate);
        }
        Self { end, ids }
    }

    fn get(&self, id: &NodeId) -> String {
        if id.is_end() {
            return self.end.to_string();
        }
        self.ids.get(id).cloned().unwrap_or_else(|| sanitize(id))
    }
}

fn sanitize(id: &NodeId) -> String {
    id.as_str()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use crate::GraphSpec;
    use musubi_core::{node_sync, router_fn, Route, StateUpdate, END, START};

    fn graph() -> crate::CompiledGraph {
        let mut graph = GraphSpec::new();
        graph
            .add_node("generate", node_sync(|_| Ok(StateUpdate::new())))
            .and_then(|g| g.add_node("quality gate", node_sync(|_| Ok(StateUpdate::new()))))
            .and_then(|g| g.add_edge(START, "generate"))
            .and_then(|g| g.add_edge("generate", "quality gate"))
            .and_then(|g| {
                g.add_conditional_edges(
                    "quality gate",
                    router_fn(|_| Ok(Route::to("pass"))),
                    [("retry", "generate"), ("pass", END)],
                )
            })
            .expect("valid graph");
        graph.compile().expect("compiles")
    }

    #[test]
    fn test_mermaid() {
        let expected = "\
flowchart TD
    __start__((start))
    generate[\"generate\"]
    quality_gate[\"quality gate\"]
    __end__((end))
    __start__ --> generate
    generate --> quality_gate
    quality_gate -->|pass| __end__
    quality_gate -->|retry| generate
";
        assert_eq!(graph().to_mermaid(), expected);
    }

    #[test]
    fn test_plantuml() {
        let expected = "\
@startuml
title expander flow
state \"generate\" as generate
state \"quality gate\" as quality_gate
[*] --> generate
generate --> quality_gate
quality_gate --> [*] : pass
quality_gate --> generate : retry
@enduml
";
        assert_eq!(graph().to_plantuml("expander flow"), expected);
    }

    #[test]
    fn test_colliding_ids_stay_distinct() {
        let mut graph = GraphSpec::new();
        graph
            .add_node("quality gate", node_sync(|_| Ok(StateUpdate::new())))
            .and_then(|g| g.add_node("quality_gate", node_sync(|_| Ok(StateUpdate::new()))))
            .and_then(|g| g.add_node("__end_-", node_sync(|_| Ok(StateUpdate::new()))))
            .and_then(|g| g.add_edge(START, "quality gate"))
            .and_then(|g| g.add_edge("quality gate", "quality_gate"))
            .and_then(|g| g.add_edge("quality_gate", "__end_-"))
            .and_then(|g| g.add_edge("__end_-", END))
            .expect("valid graph");
        let graph = graph.compile().expect("compiles");

        let expected = "\
flowchart TD
    __start__((start))
    __end___2[\"__end_-\"]
    quality_gate[\"quality gate\"]
    quality_gate_2[\"quality_gate\"]
    __end__((end))
    __start__ --> quality_gate
    __end___2 --> __end__
    quality_gate --> quality_gate_2
    quality_gate_2 --> __end___2
";
        assert_eq!(graph.to_mermaid(), expected);

        let plantuml = graph.to_plantuml("");
        assert!(plantuml.contains("state \"quality gate\" as quality_gate\n"));
        assert!(plantuml.contains("state \"quality_gate\" as quality_gate_2\n"));
        assert!(plantuml.contains("quality_gate --> quality_gate_2\n"));
        assert!(plantuml.contains("__end___2 --> [*]\n"));
    }
}
