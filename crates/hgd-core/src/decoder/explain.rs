use serde::Serialize;

use crate::vocab::Vocabulary;

use super::hypergraph::{ChartStats, Hypergraph};
use super::walker::Derivation;

/// Full diagnostic result for a single sentence.
#[derive(Debug, Serialize)]
pub struct ChartExplanation {
    pub sentence_id: usize,
    pub source: String,
    pub stats: ChartStats,
    pub nodes: usize,
    pub edges: usize,
    pub score: Option<f64>,
    /// The Viterbi derivation, rooted at the goal node.
    pub derivation: Option<ExplainStep>,
}

/// One edge of the derivation, with its children in slot order.
#[derive(Debug, Serialize)]
pub struct ExplainStep {
    pub label: String,
    pub start: usize,
    pub end: usize,
    /// Rule text; `None` on the goal edge.
    pub rule: Option<String>,
    pub local_score: f64,
    pub score: f64,
    pub children: Vec<ExplainStep>,
}

impl ChartExplanation {
    pub fn new(hg: &Hypergraph, vocab: &Vocabulary) -> Self {
        let derivation = hg
            .goal()
            .map(|g| step(hg, &Derivation::viterbi(hg, g), vocab));
        Self {
            sentence_id: hg.sentence().id(),
            source: hg.sentence().source().to_string(),
            stats: hg.stats(),
            nodes: hg.nodes().len(),
            edges: hg.edges().len(),
            score: hg.goal_score(),
            derivation,
        }
    }
}

fn step(hg: &Hypergraph, d: &Derivation, vocab: &Vocabulary) -> ExplainStep {
    let edge = hg.edge(d.edge);
    let label = match &edge.rule {
        Some(rule) => rule.lhs,
        None => hg.goal().map(|g| hg.node(g).label).unwrap_or_default(),
    };
    ExplainStep {
        label: vocab.word(label).map(|w| w.to_string()).unwrap_or_default(),
        start: edge.start,
        end: edge.end,
        rule: edge.rule.as_ref().map(|r| r.display(vocab)),
        local_score: edge.transition_score,
        score: edge.score,
        children: d.children.iter().map(|c| step(hg, c, vocab)).collect(),
    }
}
