use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, debug_span, warn};

use crate::ff::{CompositeState, FeatureError, FeatureRegistry, SpanContext, Weights};
use crate::grammar::{GrammarSet, Rule, TrieId};
use crate::sentence::Sentence;
use crate::settings::SearchSettings;
use crate::vocab::{Vocabulary, WordId};

use super::cell::{Candidate, Cell};
use super::cube::{Cube, Face};
use super::dot_chart::DotChart;
use super::hypergraph::{ChartStats, HyperEdge, Hypergraph, Node, NodeId};

/// Rules at one trie node, best weighted estimate first.
type RankedRules = Arc<[(Arc<Rule>, f64)]>;

const OOV_OWNER: &str = "oov";

/// Bottom-up CYK chart for one sentence.
///
/// Spans are completed in order of increasing width. Completing `[i, j)`
/// extends the dot charts into it, cube-prunes every matched rule into the
/// cell, applies unary rules, then starts new dot items from the finished cell.
pub struct Chart<'a> {
    sentence: &'a Sentence,
    grammars: &'a GrammarSet,
    registry: &'a FeatureRegistry,
    weights: &'a Weights,
    search: &'a SearchSettings,
    goal: WordId,
    len: usize,
    cells: Vec<Cell>,
    dots: Vec<DotChart>,
    hg: Hypergraph,
    stats: ChartStats,
    ranked: HashMap<(usize, TrieId), RankedRules>,
    oov: Vec<Option<Arc<Rule>>>,
}

impl<'a> Chart<'a> {
    pub fn new(
        sentence: &'a Sentence,
        grammars: &'a GrammarSet,
        registry: &'a FeatureRegistry,
        weights: &'a Weights,
        search: &'a SearchSettings,
        vocab: &Vocabulary,
    ) -> Self {
        let len = sentence.len();
        let default_nt = vocab.id(&search.default_nonterminal);
        let oov = sentence
            .words()
            .iter()
            .map(|&w| {
                if !search.oov_rules || grammars.covers_word(w) {
                    return None;
                }
                let output = if search.mark_oovs {
                    let word = vocab.word(w).map(|w| w.to_string()).unwrap_or_default();
                    vocab.id(&format!("{word}_OOV"))
                } else {
                    w
                };
                Some(Arc::new(Rule::oov(default_nt, w, output, OOV_OWNER)))
            })
            .collect();

        Self {
            sentence,
            grammars,
            registry,
            weights,
            search,
            goal: vocab.id(&search.goal_symbol),
            len,
            cells: (0..(len + 1) * (len + 1)).map(|_| Cell::default()).collect(),
            dots: grammars
                .grammars()
                .iter()
                .map(|g| DotChart::new(g.as_ref(), len))
                .collect(),
            hg: Hypergraph::new(sentence.clone()),
            stats: ChartStats::default(),
            ranked: HashMap::new(),
            oov,
        }
    }

    fn idx(&self, i: usize, j: usize) -> usize {
        i * (self.len + 1) + j
    }

    /// Fill the chart and connect the goal node.
    pub fn expand(mut self) -> Hypergraph {
        let _span =
            debug_span!("expand", sentence = self.sentence.id(), len = self.len).entered();
        for width in 1..=self.len {
            for i in 0..=self.len - width {
                self.complete(i, i + width);
            }
        }
        self.transit_to_goal();

        let stats = self.stats;
        debug!(
            added = stats.added,
            merged = stats.merged,
            pruned = stats.pruned,
            pops = stats.pops,
            failed = stats.failed,
            nodes = self.hg.nodes().len(),
            edges = self.hg.edges().len(),
        );
        if self.hg.goal().is_none() {
            warn!(sentence = self.sentence.id(), "no derivation covers the sentence");
        }
        self.hg.stats = stats;
        self.hg
    }

    fn complete(&mut self, i: usize, j: usize) {
        let sentence = self.sentence;
        let grammars = self.grammars;
        for (g, grammar) in grammars.grammars().iter().enumerate() {
            self.dots[g].expand(grammar.as_ref(), sentence.words(), &self.cells, i, j);
        }

        if j == i + 1 {
            if let Some(rule) = self.oov[i].clone() {
                let est = self.estimate(&rule);
                self.cube_prune(&rule, est, &[Face::new()], i, j);
            }
        }

        for g in 0..grammars.len() {
            if !self.dots[g].allows(j - i) {
                continue;
            }
            // Every split of one source pattern reaches the same trie node, so
            // grouping by node gives each rule one cube over the whole span.
            let mut groups: Vec<(TrieId, Vec<Face>)> = Vec::new();
            for item in self.dots[g].items(i, j) {
                let face: Face = item
                    .slots
                    .iter()
                    .map(|s| {
                        self.cells[self.idx(s.start, s.end)]
                            .bin(s.label)
                            .map(|b| b.nodes().to_vec())
                            .unwrap_or_default()
                    })
                    .collect();
                match groups.iter_mut().find(|(trie, _)| *trie == item.trie) {
                    Some((_, faces)) => faces.push(face),
                    None => groups.push((item.trie, vec![face])),
                }
            }
            for (trie, faces) in groups {
                let rules = self.ranked_rules(g, trie);
                for (rule, est) in rules.iter() {
                    if rule.is_unary() {
                        continue;
                    }
                    self.cube_prune(rule, *est, &faces, i, j);
                }
            }
        }

        self.apply_unary(i, j);

        let idx = self.idx(i, j);
        for (g, grammar) in grammars.grammars().iter().enumerate() {
            self.dots[g].start(grammar.as_ref(), &self.cells[idx], i, j);
        }
    }

    /// Unary rules run in producer-before-consumer order, so every bin a unary
    /// rule reads is final by the time it runs.
    fn apply_unary(&mut self, i: usize, j: usize) {
        let idx = self.idx(i, j);
        let grammars = self.grammars;
        for u in grammars.unary_rules() {
            if !self.dots[u.grammar].allows(j - i) {
                continue;
            }
            let Some(label) = u.rule.slot_label(0) else { continue };
            let Some(bin) = self.cells[idx].bin(label) else { continue };
            let faces = vec![vec![bin.nodes().to_vec()]];
            let est = self.estimate(&u.rule);
            self.cube_prune(&u.rule, est, &faces, i, j);
        }
    }

    fn estimate(&self, rule: &Rule) -> f64 {
        self.weights.dot(&self.registry.estimate(rule))
    }

    fn ranked_rules(&mut self, g: usize, trie: TrieId) -> RankedRules {
        if let Some(r) = self.ranked.get(&(g, trie)) {
            return Arc::clone(r);
        }
        let grammars = self.grammars;
        let grammar = &grammars.grammars()[g];
        let mut rules: Vec<(Arc<Rule>, f64)> = grammar
            .rules_matching(trie)
            .iter()
            .map(|r| (Arc::clone(r), self.estimate(r)))
            .collect();
        rules.sort_by(|a, b| b.1.total_cmp(&a.1));
        let rules: RankedRules = rules.into();
        self.ranked.insert((g, trie), Arc::clone(&rules));
        rules
    }

    /// Materialise at most `pop_limit` combinations of `rule` over all `faces`.
    fn cube_prune(
        &mut self,
        rule: &Arc<Rule>,
        estimate: f64,
        faces: &[Face],
        i: usize,
        j: usize,
    ) {
        let idx = self.idx(i, j);
        let mut cube = Cube::new(faces, estimate, &self.hg);
        for _ in 0..self.search.pop_limit {
            let Some(tails) = cube.pop(&self.hg) else { break };
            self.stats.pops += 1;
            match self.materialize(rule, tails, i, j) {
                Ok(cand) => {
                    let beam = self.search.beam_width;
                    self.cells[idx].insert(&mut self.hg, cand, beam, &mut self.stats);
                }
                Err(e) => {
                    self.stats.failed += 1;
                    debug!(i, j, error = %e, "transition failed");
                }
            }
        }
    }

    fn materialize(
        &self,
        rule: &Arc<Rule>,
        tails: Vec<NodeId>,
        i: usize,
        j: usize,
    ) -> Result<Candidate, FeatureError> {
        let states: Vec<&CompositeState> =
            tails.iter().map(|&t| &self.hg.node(t).state).collect();
        let ctx = SpanContext {
            start: i,
            end: j,
            sentence: self.sentence,
        };
        let (state, features) = self.registry.transition(rule, &states, &ctx)?;
        let transition_score = self.weights.dot(&features);
        let inside: f64 = tails.iter().map(|&t| self.hg.node(t).score).sum();
        Ok(Candidate {
            rule: Arc::clone(rule),
            tails,
            start: i,
            end: j,
            state,
            transition_score,
            score: inside + transition_score,
        })
    }

    /// Lift every full-span goal-labelled node to the single goal node
    /// through a rule-less edge scored by the modules' final transitions.
    fn transit_to_goal(&mut self) {
        if self.len == 0 {
            return;
        }
        let full = self.idx(0, self.len);
        let Some(bin) = self.cells[full].bin(self.goal) else {
            return;
        };
        for id in bin.nodes().to_vec() {
            let node = self.hg.node(id);
            let features = match self.registry.final_transition(&node.state, self.sentence) {
                Ok(f) => f,
                Err(e) => {
                    self.stats.failed += 1;
                    debug!(node = id, error = %e, "final transition failed");
                    continue;
                }
            };
            let local = self.weights.dot(&features);
            let score = node.score + local;
            let edge = self.hg.push_edge(HyperEdge {
                rule: None,
                tails: vec![id],
                start: 0,
                end: self.len,
                transition_score: local,
                score,
            });
            match self.hg.goal() {
                None => {
                    let goal = self.hg.push_node(Node {
                        label: self.goal,
                        start: 0,
                        end: self.len,
                        state: CompositeState::default(),
                        edges: vec![edge],
                        best_edge: edge,
                        score,
                    });
                    self.hg.set_goal(goal);
                }
                Some(goal) => {
                    let goal = self.hg.node_mut(goal);
                    goal.edges.push(edge);
                    if score > goal.score {
                        goal.score = score;
                        goal.best_edge = edge;
                    }
                }
            }
        }
    }
}
