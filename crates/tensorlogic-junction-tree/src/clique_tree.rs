//! Clique trees and their construction by variable elimination.
//!
//! A [`CliqueTree`] is an arena of cliques, one per minimal factor, joined
//! by separator-set edges into a forest. [`CliqueTreeBuilder`] derives the
//! edges by repeatedly eliminating a clique that holds a variable no other
//! remaining clique mentions and attaching it to a clique that contains
//! everything it keeps. No fill-in is ever introduced: if no clique can be
//! eliminated this way the graph is rejected.
//!
//! # Example
//!
//! ```text
//! φ₀(a,b)   φ₁(b,c)   φ₂(c,d)
//!
//! eliminate 0 (a only in 0) → edge 0–1 over {b}
//! eliminate 1 (b only in 1) → edge 1–2 over {c}
//! order: [0, 1, 2]
//! ```

use std::collections::{BTreeMap, BTreeSet};

use crate::config::{JunctionTreeConfig, MergeTieBreak};
use crate::error::{PgmError, Result};
use crate::factor::Factor;
use crate::graph::FactorGraph;

/// Variables shared by two adjacent cliques, viewed from `start` toward `end`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SeparatorSet {
    start: usize,
    end: usize,
    variables: Vec<String>,
}

impl SeparatorSet {
    pub fn new(start: usize, end: usize, mut variables: Vec<String>) -> Self {
        variables.sort();
        variables.dedup();
        Self {
            start,
            end,
            variables,
        }
    }

    /// Clique that sends across this separator.
    pub fn start(&self) -> usize {
        self.start
    }

    /// Clique that receives across this separator.
    pub fn end(&self) -> usize {
        self.end
    }

    /// Shared variables, sorted.
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// Undirected identity of the edge.
    pub fn edge_key(&self) -> (usize, usize) {
        (self.start.min(self.end), self.start.max(self.end))
    }

    /// The same edge viewed from the other side.
    pub fn reversed(&self) -> SeparatorSet {
        Self {
            start: self.end,
            end: self.start,
            variables: self.variables.clone(),
        }
    }
}

/// A clique in the tree: a minimal factor plus its running marginal.
#[derive(Debug, Clone)]
pub struct Clique {
    index: usize,
    factor: Factor,
    marginal: Factor,
    folded: BTreeSet<usize>,
}

impl Clique {
    fn new(index: usize, factor: Factor) -> Self {
        Self {
            index,
            marginal: factor.clone(),
            factor,
            folded: BTreeSet::new(),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// The factor the clique was seeded with.
    pub fn factor(&self) -> &Factor {
        &self.factor
    }

    /// The clique factor times every message folded in so far.
    pub fn marginal(&self) -> &Factor {
        &self.marginal
    }

    /// Neighbors whose messages are already part of the marginal.
    pub fn folded_neighbors(&self) -> &BTreeSet<usize> {
        &self.folded
    }
}

/// Lifecycle of a clique tree within one inference call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliqueTreeState {
    /// Constructed, no messages yet
    Built,
    /// Message passing has started
    MessagesInProgress,
    /// Marginals have been read out; the tree is frozen
    MarginalsExtracted,
}

/// Forest of cliques with per-edge separators and message storage.
#[derive(Debug, Clone)]
pub struct CliqueTree {
    cliques: Vec<Clique>,
    neighbors: Vec<BTreeSet<usize>>,
    /// separators[i][j]: separator viewed from i toward j
    separators: Vec<BTreeMap<usize, SeparatorSet>>,
    /// messages[i][j]: message sent from i to j
    messages: Vec<BTreeMap<usize, Factor>>,
    elimination_order: Vec<usize>,
    state: CliqueTreeState,
}

impl CliqueTree {
    fn new(factors: Vec<Factor>, edges: &[(usize, usize)], elimination_order: Vec<usize>) -> Self {
        let n = factors.len();
        let mut neighbors = vec![BTreeSet::new(); n];
        for &(a, b) in edges {
            neighbors[a].insert(b);
            neighbors[b].insert(a);
        }

        let separators = neighbors
            .iter()
            .enumerate()
            .map(|(i, adjacent)| {
                adjacent
                    .iter()
                    .map(|&j| {
                        let shared = factors[i]
                            .variables()
                            .iter()
                            .filter(|v| factors[j].variables().contains(v))
                            .cloned()
                            .collect();
                        (j, SeparatorSet::new(i, j, shared))
                    })
                    .collect()
            })
            .collect();

        let cliques = factors
            .into_iter()
            .enumerate()
            .map(|(i, f)| Clique::new(i, f))
            .collect();

        Self {
            cliques,
            neighbors,
            separators,
            messages: vec![BTreeMap::new(); n],
            elimination_order,
            state: CliqueTreeState::Built,
        }
    }

    pub fn num_cliques(&self) -> usize {
        self.cliques.len()
    }

    pub fn num_edges(&self) -> usize {
        self.neighbors.iter().map(BTreeSet::len).sum::<usize>() / 2
    }

    pub fn clique(&self, index: usize) -> &Clique {
        &self.cliques[index]
    }

    pub fn cliques(&self) -> &[Clique] {
        &self.cliques
    }

    pub fn neighbors(&self, index: usize) -> &BTreeSet<usize> {
        &self.neighbors[index]
    }

    /// Undirected edges as `(low, high)` pairs, sorted.
    pub fn edges(&self) -> Vec<(usize, usize)> {
        self.neighbors
            .iter()
            .enumerate()
            .flat_map(|(i, adjacent)| adjacent.iter().filter(move |&&j| i < j).map(move |&j| (i, j)))
            .collect()
    }

    /// Separator on the edge `start → end`, if the edge exists.
    pub fn separator(&self, start: usize, end: usize) -> Option<&SeparatorSet> {
        self.separators.get(start).and_then(|m| m.get(&end))
    }

    pub fn elimination_order(&self) -> &[usize] {
        &self.elimination_order
    }

    pub fn state(&self) -> CliqueTreeState {
        self.state
    }

    /// Message sent from `start` to `end`, if it has been computed.
    pub fn message(&self, start: usize, end: usize) -> Option<&Factor> {
        self.messages.get(start).and_then(|m| m.get(&end))
    }

    /// Every outbound separator of `clique` paired with the message already
    /// received from the other side of it.
    pub fn inbound_messages(&self, clique: usize) -> BTreeMap<SeparatorSet, Option<&Factor>> {
        self.separators[clique]
            .iter()
            .map(|(&neighbor, separator)| (separator.clone(), self.message(neighbor, clique)))
            .collect()
    }

    pub fn has_sent_any(&self, clique: usize) -> bool {
        !self.messages[clique].is_empty()
    }

    pub fn has_received_all(&self, clique: usize) -> bool {
        self.neighbors[clique]
            .iter()
            .all(|&neighbor| self.message(neighbor, clique).is_some())
    }

    pub(crate) fn begin_message_passing(&mut self) -> Result<()> {
        if self.state != CliqueTreeState::Built {
            return Err(PgmError::InvalidState(format!(
                "message passing requires a freshly built clique tree, found {:?}",
                self.state
            )));
        }
        self.state = CliqueTreeState::MessagesInProgress;
        Ok(())
    }

    pub(crate) fn mark_marginals_extracted(&mut self) -> Result<()> {
        self.ensure_in_progress()?;
        self.state = CliqueTreeState::MarginalsExtracted;
        Ok(())
    }

    fn ensure_in_progress(&self) -> Result<()> {
        if self.state != CliqueTreeState::MessagesInProgress {
            return Err(PgmError::InvalidState(format!(
                "clique tree cannot be modified in state {:?}",
                self.state
            )));
        }
        Ok(())
    }

    /// Store the message `start → end`. Each message is stored once.
    pub(crate) fn add_message(&mut self, start: usize, end: usize, message: Factor) -> Result<()> {
        self.ensure_in_progress()?;
        if !self.neighbors[start].contains(&end) {
            return Err(PgmError::InvalidGraph(format!(
                "no edge between cliques {} and {}",
                start, end
            )));
        }
        if self.messages[start].contains_key(&end) {
            return Err(PgmError::InvalidState(format!(
                "message {} -> {} has already been computed",
                start, end
            )));
        }
        self.messages[start].insert(end, message);
        Ok(())
    }

    /// Multiply every received, not yet folded message into the running
    /// marginal of `clique`.
    ///
    /// A missing message is an ordering error, except the one from
    /// `skip_if_missing`, which is left for later.
    pub(crate) fn fold_messages(&mut self, clique: usize, skip_if_missing: Option<usize>) -> Result<()> {
        self.ensure_in_progress()?;

        let mut pending = Vec::new();
        let mut newly_folded = Vec::new();
        for &neighbor in &self.neighbors[clique] {
            if self.cliques[clique].folded.contains(&neighbor) {
                continue;
            }
            match self.messages[neighbor].get(&clique) {
                Some(message) => {
                    pending.push(message);
                    newly_folded.push(neighbor);
                }
                None if skip_if_missing == Some(neighbor) => {}
                None => {
                    return Err(PgmError::InvalidMessageOrder {
                        from: neighbor,
                        to: clique,
                    })
                }
            }
        }
        if pending.is_empty() {
            return Ok(());
        }

        let marginal = self.cliques[clique].marginal.product_all(&pending)?;
        let record = &mut self.cliques[clique];
        record.marginal = marginal;
        record.folded.extend(newly_folded);
        Ok(())
    }
}

/// Builds clique trees from factor graphs by greedy variable elimination.
#[derive(Debug, Clone, Default)]
pub struct CliqueTreeBuilder {
    config: JunctionTreeConfig,
}

impl CliqueTreeBuilder {
    pub fn new(config: JunctionTreeConfig) -> Self {
        Self { config }
    }

    /// Build the clique tree for `graph`'s minimal factors.
    pub fn build(&self, graph: &FactorGraph) -> Result<CliqueTree> {
        let factors = graph.minimal_factors()?;
        let hint = if self.config.use_elimination_hint {
            graph.elimination_hint()
        } else {
            None
        };
        self.build_from_factors(factors, hint)
    }

    /// Build a clique tree with one clique per factor.
    ///
    /// `hint[i]`, when given, is the schedule position of factor `i` and
    /// replaces the elimination order as the message schedule.
    pub fn build_from_factors(&self, factors: Vec<Factor>, hint: Option<&[usize]>) -> Result<CliqueTree> {
        if factors.is_empty() {
            return Err(PgmError::InvalidGraph(
                "cannot build a clique tree without factors".to_string(),
            ));
        }

        let mut elimination = Elimination::new(&factors, self.config.clone());
        while elimination.remaining.len() > 1 {
            elimination.eliminate_next()?;
        }
        let Elimination {
            remaining,
            edges,
            order: mut elimination_order,
            ..
        } = elimination;
        elimination_order.extend(remaining);

        let order = match hint {
            Some(hint) => schedule_from_hint(hint, factors.len())?,
            None => elimination_order,
        };
        tracing::debug!(
            cliques = factors.len(),
            edges = edges.len(),
            order = ?order,
            "built clique tree"
        );
        Ok(CliqueTree::new(factors, &edges, order))
    }
}

/// Mutable state of one run of clique elimination.
struct Elimination<'a> {
    factors: &'a [Factor],
    config: JunctionTreeConfig,
    scopes: Vec<BTreeSet<String>>,
    /// variable → remaining cliques that mention it
    var_to_cliques: BTreeMap<String, BTreeSet<usize>>,
    /// occurrence count → variables with that many remaining cliques
    counts: BTreeMap<usize, BTreeSet<String>>,
    remaining: BTreeSet<usize>,
    edges: Vec<(usize, usize)>,
    order: Vec<usize>,
}

impl<'a> Elimination<'a> {
    fn new(factors: &'a [Factor], config: JunctionTreeConfig) -> Self {
        let scopes: Vec<BTreeSet<String>> = factors
            .iter()
            .map(|f| f.variables().iter().cloned().collect())
            .collect();

        let mut var_to_cliques: BTreeMap<String, BTreeSet<usize>> = BTreeMap::new();
        for (index, scope) in scopes.iter().enumerate() {
            for var in scope {
                var_to_cliques.entry(var.clone()).or_default().insert(index);
            }
        }
        let mut counts: BTreeMap<usize, BTreeSet<String>> = BTreeMap::new();
        for (var, cliques) in &var_to_cliques {
            counts.entry(cliques.len()).or_default().insert(var.clone());
        }

        Self {
            factors,
            config,
            remaining: (0..scopes.len()).collect(),
            scopes,
            var_to_cliques,
            counts,
            edges: Vec::new(),
            order: Vec::new(),
        }
    }

    /// Eliminate one clique, preferring cliques with no variables.
    fn eliminate_next(&mut self) -> Result<()> {
        if let Some(empty) = self
            .remaining
            .iter()
            .copied()
            .find(|&i| self.scopes[i].is_empty())
        {
            self.close(empty);
            return Ok(());
        }

        for candidate in self.single_occurrence_cliques() {
            if self.try_eliminate(candidate) {
                return Ok(());
            }
        }

        let remaining: Vec<String> = self
            .remaining
            .iter()
            .map(|&i| format!("{}: {:?}", i, self.scopes[i]))
            .collect();
        Err(PgmError::Construction(format!(
            "no clique can be eliminated without fill-in; remaining cliques [{}]",
            remaining.join(", ")
        )))
    }

    /// Cliques holding a variable no other remaining clique mentions, in
    /// variable order.
    fn single_occurrence_cliques(&self) -> Vec<usize> {
        let mut seen = BTreeSet::new();
        self.counts
            .get(&1)
            .into_iter()
            .flatten()
            .filter_map(|var| self.var_to_cliques.get(var).and_then(|c| c.first().copied()))
            .filter(|&clique| seen.insert(clique))
            .collect()
    }

    fn try_eliminate(&mut self, clique: usize) -> bool {
        let retained: Vec<&String> = self.scopes[clique]
            .iter()
            .filter(|var| self.var_to_cliques.get(*var).map_or(0, BTreeSet::len) > 1)
            .collect();

        if retained.is_empty() {
            self.close(clique);
            return true;
        }

        let targets = self
            .remaining
            .iter()
            .copied()
            .filter(|&other| other != clique)
            .filter(|&other| retained.iter().all(|var| self.scopes[other].contains(*var)));
        let Some(target) = self.choose(targets) else {
            tracing::trace!(clique, retained = ?retained, "retained variables split across cliques");
            return false;
        };

        tracing::debug!(clique, target, retained = ?retained, "eliminated clique");
        self.edges.push((clique, target));
        self.remove(clique);
        true
    }

    /// Eliminate a clique that shares nothing with the remaining cliques.
    ///
    /// When linking components, the lowest-index remaining clique is the
    /// target regardless of the tie-break rule.
    fn close(&mut self, clique: usize) {
        if self.config.link_components {
            let target = self.remaining.iter().copied().find(|&other| other != clique);
            if let Some(target) = target {
                tracing::debug!(clique, target, "linked component with empty separator");
                self.edges.push((clique, target));
            }
        } else {
            tracing::debug!(clique, "closed connected component");
        }
        self.remove(clique);
    }

    fn choose(&self, candidates: impl Iterator<Item = usize>) -> Option<usize> {
        match self.config.tie_break {
            MergeTieBreak::SmallestSize => candidates.min_by_key(|&i| (self.factors[i].size(), i)),
            MergeTieBreak::LowestIndex => candidates.min(),
        }
    }

    fn remove(&mut self, clique: usize) {
        for var in &self.scopes[clique] {
            let Some(cliques) = self.var_to_cliques.get_mut(var) else {
                continue;
            };
            let count = cliques.len();
            cliques.remove(&clique);
            if let Some(vars) = self.counts.get_mut(&count) {
                vars.remove(var);
                if vars.is_empty() {
                    self.counts.remove(&count);
                }
            }
            if count > 1 {
                self.counts.entry(count - 1).or_default().insert(var.clone());
            } else {
                self.var_to_cliques.remove(var);
            }
        }
        self.remaining.remove(&clique);
        self.order.push(clique);
    }
}

/// Invert `hint` (factor → position) into a schedule (position → factor).
fn schedule_from_hint(hint: &[usize], n: usize) -> Result<Vec<usize>> {
    if hint.len() != n {
        return Err(PgmError::InvalidGraph(format!(
            "elimination hint has {} entries for {} cliques",
            hint.len(),
            n
        )));
    }
    let mut schedule = vec![None; n];
    for (factor, &position) in hint.iter().enumerate() {
        let slot = schedule
            .get_mut(position)
            .filter(|slot| slot.is_none())
            .ok_or_else(|| {
                PgmError::InvalidGraph(format!(
                    "elimination hint {:?} is not a permutation of 0..{}",
                    hint, n
                ))
            })?;
        *slot = Some(factor);
    }
    Ok(schedule.into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn pairwise(a: &str, b: &str) -> Factor {
        Factor::ones(vars(&[a, b]), vec![2, 2]).unwrap()
    }

    fn build(factors: Vec<Factor>) -> Result<CliqueTree> {
        CliqueTreeBuilder::default().build_from_factors(factors, None)
    }

    #[test]
    fn test_chain_builds_path() {
        let tree = build(vec![pairwise("a", "b"), pairwise("b", "c"), pairwise("c", "d")]).unwrap();

        assert_eq!(tree.num_cliques(), 3);
        assert_eq!(tree.edges(), vec![(0, 1), (1, 2)]);
        assert_eq!(tree.elimination_order(), &[0, 1, 2]);
        assert_eq!(tree.separator(1, 2).unwrap().variables(), &vars(&["c"])[..]);
        assert_eq!(tree.separator(2, 1).unwrap().edge_key(), (1, 2));
        assert_eq!(tree.state(), CliqueTreeState::Built);
    }

    #[test]
    fn test_star_attaches_leaves_to_hub() {
        let hub = Factor::ones(vars(&["a", "b", "c"]), vec![2, 2, 2]).unwrap();
        let tree = build(vec![
            pairwise("a", "x"),
            hub,
            pairwise("b", "y"),
            pairwise("c", "z"),
        ])
        .unwrap();

        assert_eq!(tree.num_edges(), 3);
        assert_eq!(tree.neighbors(1).len(), 3);
        assert_eq!(tree.elimination_order(), &[0, 2, 1, 3]);
    }

    #[test]
    fn test_cycle_is_rejected() {
        let result = build(vec![pairwise("a", "b"), pairwise("b", "c"), pairwise("a", "c")]);
        assert!(matches!(result, Err(PgmError::Construction(_))));
    }

    #[test]
    fn test_disconnected_graph_is_a_forest() {
        let tree = build(vec![pairwise("a", "b"), pairwise("c", "d")]).unwrap();
        assert_eq!(tree.num_edges(), 0);
        assert_eq!(tree.elimination_order(), &[0, 1]);

        let linked = CliqueTreeBuilder::new(JunctionTreeConfig::new().with_link_components(true))
            .build_from_factors(vec![pairwise("a", "b"), pairwise("c", "d")], None)
            .unwrap();
        assert_eq!(linked.edges(), vec![(0, 1)]);
        assert!(linked.separator(0, 1).unwrap().variables().is_empty());
    }

    #[test]
    fn test_linked_components_attach_to_lowest_index() {
        // clique 2 is the smallest, but clique 0 links to clique 1
        let sparse = Factor::dense(vars(&["e"]), vec![2], vec![1.0, 0.0]).unwrap();
        let linked = CliqueTreeBuilder::new(JunctionTreeConfig::new().with_link_components(true))
            .build_from_factors(vec![pairwise("a", "b"), pairwise("c", "d"), sparse], None)
            .unwrap();
        assert_eq!(linked.edges(), vec![(0, 1), (1, 2)]);
        assert_eq!(linked.elimination_order(), &[0, 1, 2]);
    }

    #[test]
    fn test_tie_break_rules() {
        let dense_xa = Factor::dense(vars(&["x", "a"]), vec![2, 2], vec![1.0; 4]).unwrap();
        let sparse_ac =
            Factor::dense(vars(&["a", "c"]), vec![2, 2], vec![1.0, 0.0, 0.0, 0.0]).unwrap();
        let factors = vec![dense_xa, pairwise("a", "b"), sparse_ac];

        // "b" is the first single-occurrence variable; clique 1 retains {a}
        let smallest = build(factors.clone()).unwrap();
        assert!(smallest.neighbors(1).contains(&2));

        let lowest = CliqueTreeBuilder::new(JunctionTreeConfig::new().with_tie_break(MergeTieBreak::LowestIndex))
            .build_from_factors(factors, None)
            .unwrap();
        assert!(lowest.neighbors(1).contains(&0));
    }

    #[test]
    fn test_hint_sets_schedule() {
        let factors = vec![pairwise("a", "b"), pairwise("b", "c"), pairwise("c", "d")];
        let tree = CliqueTreeBuilder::default()
            .build_from_factors(factors.clone(), Some(&[2, 1, 0]))
            .unwrap();
        assert_eq!(tree.elimination_order(), &[2, 1, 0]);

        let bad = CliqueTreeBuilder::default().build_from_factors(factors.clone(), Some(&[0, 0, 1]));
        assert!(matches!(bad, Err(PgmError::InvalidGraph(_))));
        let short = CliqueTreeBuilder::default().build_from_factors(factors, Some(&[0, 1]));
        assert!(matches!(short, Err(PgmError::InvalidGraph(_))));
    }

    #[test]
    fn test_state_guards_mutation() {
        let mut tree = build(vec![pairwise("a", "b"), pairwise("b", "c")]).unwrap();
        let message = Factor::ones(vars(&["b"]), vec![2]).unwrap();
        assert!(matches!(
            tree.add_message(0, 1, message.clone()),
            Err(PgmError::InvalidState(_))
        ));

        tree.begin_message_passing().unwrap();
        assert!(tree.begin_message_passing().is_err());
        tree.add_message(0, 1, message.clone()).unwrap();
        assert!(tree.add_message(0, 1, message.clone()).is_err());
        assert!(tree.has_sent_any(0));
        assert!(tree.has_received_all(1));

        // clique 0 has not heard from 1 yet
        assert!(matches!(
            tree.fold_messages(0, None),
            Err(PgmError::InvalidMessageOrder { from: 1, to: 0 })
        ));
        tree.fold_messages(0, Some(1)).unwrap();
        tree.fold_messages(1, None).unwrap();
        assert!(tree.clique(1).folded_neighbors().contains(&0));

        tree.mark_marginals_extracted().unwrap();
        assert!(matches!(
            tree.add_message(1, 0, message),
            Err(PgmError::InvalidState(_))
        ));
    }

    #[test]
    fn test_inbound_messages_keyed_by_outbound_separator() {
        let mut tree = build(vec![pairwise("a", "b"), pairwise("b", "c")]).unwrap();
        tree.begin_message_passing().unwrap();
        tree.add_message(0, 1, Factor::ones(vars(&["b"]), vec![2]).unwrap())
            .unwrap();

        let inbound = tree.inbound_messages(1);
        let (separator, message) = inbound.iter().next().unwrap();
        assert_eq!((separator.start(), separator.end()), (1, 0));
        assert!(message.is_some());
        assert!(tree.inbound_messages(0).values().all(Option::is_none));
    }
}
