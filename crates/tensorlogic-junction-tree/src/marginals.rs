//! Marginal and max-marginal results.
//!
//! After message passing every clique still has to fold in the messages it
//! received after its last send. [`MarginalExtractor`] does that, computes
//! the log partition function from the roots and packages the per-clique
//! factors into a [`MarginalSet`] or [`MaxMarginalSet`].

use std::collections::{BTreeSet, VecDeque};

use crate::assignment::Assignment;
use crate::clique_tree::CliqueTree;
use crate::error::{PgmError, Result};
use crate::factor::Factor;

/// Unnormalized marginals over the cliques of a calibrated tree.
///
/// Every clique marginal sums to the partition function, including the
/// cliques of a disconnected graph's other components.
#[derive(Debug, Clone)]
pub struct MarginalSet {
    marginals: Vec<Factor>,
    /// ln of the weight of the other components, per clique
    log_offsets: Vec<f64>,
    conditioned: Assignment,
    log_partition_function: f64,
}

impl MarginalSet {
    /// Marginals whose totals already equal the partition function.
    pub fn new(marginals: Vec<Factor>, conditioned: Assignment, log_partition_function: f64) -> Self {
        let log_offsets = vec![0.0; marginals.len()];
        Self {
            marginals,
            log_offsets,
            conditioned,
            log_partition_function,
        }
    }

    /// Result for a graph with no free variables.
    pub fn from_conditioned(conditioned: Assignment, log_partition_function: f64) -> Self {
        Self::new(Vec::new(), conditioned, log_partition_function)
    }

    /// Per-clique marginals, indexed like the clique tree.
    pub fn marginals(&self) -> &[Factor] {
        &self.marginals
    }

    /// Free variables covered by the marginals, sorted.
    pub fn variables(&self) -> Vec<String> {
        self.marginals
            .iter()
            .flat_map(|m| m.variables().iter().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Free and conditioned variables together, sorted.
    pub fn all_variables(&self) -> Vec<String> {
        let mut all: BTreeSet<String> = self.variables().into_iter().collect();
        all.extend(self.conditioned.variable_names().cloned());
        all.into_iter().collect()
    }

    pub fn conditioned_values(&self) -> &Assignment {
        &self.conditioned
    }

    /// The same marginals, additionally conditioned on `values`.
    ///
    /// `values` may only name variables the marginals do not cover, and must
    /// agree with the existing conditioned values.
    pub fn with_conditioned_values(&self, values: &Assignment) -> Result<MarginalSet> {
        let covered = self.variables();
        if let Some(var) = values.variable_names().find(|v| covered.contains(*v)) {
            return Err(PgmError::InvalidAssignment(format!(
                "variable {} has a marginal and cannot be conditioned",
                var
            )));
        }
        Ok(MarginalSet {
            conditioned: self.conditioned.union(values)?,
            ..self.clone()
        })
    }

    pub fn conditioned_variables(&self) -> Vec<String> {
        self.conditioned.variable_names().cloned().collect()
    }

    pub fn partition_function(&self) -> f64 {
        self.log_partition_function.exp()
    }

    pub fn log_partition_function(&self) -> f64 {
        self.log_partition_function
    }

    /// Unnormalized marginal over `vars`.
    ///
    /// Taken from the smallest clique containing every requested variable,
    /// with the clique's other variables summed out. An empty request
    /// yields a scalar factor holding the partition function.
    pub fn marginal<S: AsRef<str>>(&self, vars: &[S]) -> Result<Factor> {
        if vars.is_empty() {
            return self.partition_factor();
        }
        let index = smallest_containing(&self.marginals, vars, &self.conditioned)?;
        let keep: Vec<String> = vars.iter().map(|v| v.as_ref().to_string()).collect();
        let marginal = self.marginals[index].marginalize_to(&keep);
        let offset = self.log_offsets[index];
        if offset == 0.0 {
            Ok(marginal)
        } else {
            marginal.scale_log(offset)
        }
    }

    /// Marginal over `vars` normalized to a distribution.
    pub fn normalized_marginal<S: AsRef<str>>(&self, vars: &[S]) -> Result<Factor> {
        self.marginal(vars)?.normalize()
    }

    fn partition_factor(&self) -> Result<Factor> {
        if self.marginals.first().is_some_and(Factor::is_log_space) {
            Factor::dense_log(Vec::new(), Vec::new(), vec![self.log_partition_function])
        } else {
            Factor::scalar(self.partition_function())
        }
    }
}

/// Unnormalized max-marginals over the cliques of a calibrated tree.
#[derive(Debug, Clone)]
pub struct MaxMarginalSet {
    marginals: Vec<Factor>,
    /// Cliques of each connected component, breadth first from its root
    components: Vec<Vec<usize>>,
    conditioned: Assignment,
}

impl MaxMarginalSet {
    pub fn new(marginals: Vec<Factor>, components: Vec<Vec<usize>>, conditioned: Assignment) -> Self {
        Self {
            marginals,
            components,
            conditioned,
        }
    }

    /// Result for a graph with no free variables.
    pub fn from_conditioned(conditioned: Assignment) -> Self {
        Self::new(Vec::new(), Vec::new(), conditioned)
    }

    /// Per-clique max-marginals, indexed like the clique tree.
    pub fn marginals(&self) -> &[Factor] {
        &self.marginals
    }

    pub fn conditioned_values(&self) -> &Assignment {
        &self.conditioned
    }

    /// Max-marginal over `vars` from the smallest containing clique.
    ///
    /// Values are consistent within a connected component of the graph. An
    /// empty request yields the weight of a most likely joint assignment,
    /// the product of every component's maximum.
    pub fn max_marginal<S: AsRef<str>>(&self, vars: &[S]) -> Result<Factor> {
        let keep: Vec<String> = vars.iter().map(|v| v.as_ref().to_string()).collect();
        if vars.is_empty() {
            let maxima: Vec<Factor> = self
                .components
                .iter()
                .filter_map(|component| component.first())
                .map(|&root| self.marginals[root].max_marginalize_to(&keep))
                .collect();
            let maxima: Vec<&Factor> = maxima.iter().collect();
            return Factor::scalar(1.0)?.product_all(&maxima);
        }
        let index = smallest_containing(&self.marginals, vars, &self.conditioned)?;
        Ok(self.marginals[index].max_marginalize_to(&keep))
    }

    /// A highest-weight joint assignment, including the conditioned values.
    ///
    /// Cliques are decoded root first, each one restricted to the values
    /// already chosen for the variables it shares with earlier cliques.
    pub fn most_likely_assignment(&self) -> Result<Assignment> {
        let mut assignment = self.conditioned.clone();
        for &index in self.components.iter().flatten() {
            let restricted = self.marginals[index].conditional(&assignment)?;
            if restricted.variables().is_empty() {
                continue;
            }
            let (best, _) = restricted
                .most_likely_assignments(1)
                .into_iter()
                .next()
                .ok_or(PgmError::ZeroProbability)?;
            assignment = assignment.union(&best)?;
        }
        Ok(assignment)
    }
}

/// Index of the clique with the fewest variables containing all of `vars`.
fn smallest_containing<S: AsRef<str>>(
    marginals: &[Factor],
    vars: &[S],
    conditioned: &Assignment,
) -> Result<usize> {
    for var in vars {
        let name = var.as_ref();
        if conditioned.contains(name) {
            return Err(PgmError::InvalidAssignment(format!(
                "variable {} is conditioned to {:?} and has no marginal",
                name,
                conditioned.get(name)
            )));
        }
        if !marginals.iter().any(|m| m.contains_all(&[name])) {
            return Err(PgmError::VariableNotFound(name.to_string()));
        }
    }

    marginals
        .iter()
        .enumerate()
        .filter(|(_, m)| m.contains_all(vars))
        .min_by_key(|(index, m)| (m.variables().len(), *index))
        .map(|(index, _)| index)
        .ok_or_else(|| {
            let names: Vec<&str> = vars.iter().map(|v| v.as_ref()).collect();
            PgmError::InvalidGraph(format!("no single clique contains {:?}", names))
        })
}

/// Reads marginals out of a clique tree after message passing.
pub struct MarginalExtractor;

impl MarginalExtractor {
    /// Sum-product marginals and the log partition function.
    ///
    /// The log partition function is the sum over roots of the log total of
    /// the root's marginal; `-inf` means the evidence is impossible.
    pub fn marginals(
        tree: &mut CliqueTree,
        roots: &BTreeSet<usize>,
        conditioned: &Assignment,
    ) -> Result<MarginalSet> {
        Self::fold_all(tree)?;

        let root_totals: Vec<(usize, f64)> = roots
            .iter()
            .map(|&root| {
                (
                    root,
                    tree.clique(root).marginal().total_unnormalized_log_probability(),
                )
            })
            .collect();
        let log_partition_function: f64 = root_totals.iter().map(|(_, total)| total).sum();
        tracing::debug!(
            roots = root_totals.len(),
            log_partition_function,
            "extracted marginals"
        );
        if log_partition_function == f64::NEG_INFINITY {
            return Err(PgmError::ZeroProbability);
        }

        let mut log_offsets = vec![0.0; tree.num_cliques()];
        for &(root, total) in &root_totals {
            for clique in component(tree, root) {
                log_offsets[clique] = log_partition_function - total;
            }
        }

        let marginals = tree
            .cliques()
            .iter()
            .map(|c| c.marginal().clone())
            .collect();
        Ok(MarginalSet {
            marginals,
            log_offsets,
            conditioned: conditioned.clone(),
            log_partition_function,
        })
    }

    /// Max-product max-marginals, unreduced.
    pub fn max_marginals(
        tree: &mut CliqueTree,
        roots: &BTreeSet<usize>,
        conditioned: &Assignment,
    ) -> Result<MaxMarginalSet> {
        Self::fold_all(tree)?;

        let components = roots.iter().map(|&root| component(tree, root)).collect();
        let marginals = tree
            .cliques()
            .iter()
            .map(|c| c.marginal().clone())
            .collect();
        Ok(MaxMarginalSet::new(
            marginals,
            components,
            conditioned.clone(),
        ))
    }

    fn fold_all(tree: &mut CliqueTree) -> Result<()> {
        for clique in 0..tree.num_cliques() {
            tree.fold_messages(clique, None)?;
        }
        tree.mark_marginals_extracted()
    }
}

/// Cliques reachable from `start`, breadth first.
fn component(tree: &CliqueTree, start: usize) -> Vec<usize> {
    let mut visited = BTreeSet::from([start]);
    let mut queue = VecDeque::from([start]);
    let mut order = Vec::new();
    while let Some(clique) = queue.pop_front() {
        order.push(clique);
        for &neighbor in tree.neighbors(clique) {
            if visited.insert(neighbor) {
                queue.push_back(neighbor);
            }
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clique_tree::CliqueTreeBuilder;
    use crate::message_passing::MessagePassingScheduler;
    use approx::assert_abs_diff_eq;

    fn vars(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn chain_factors() -> Vec<Factor> {
        vec![
            Factor::dense(vars(&["a", "b"]), vec![2, 2], vec![2.0, 1.0, 1.0, 2.0]).unwrap(),
            Factor::dense(vars(&["b", "c"]), vec![2, 2], vec![1.0, 1.0, 1.0, 3.0]).unwrap(),
        ]
    }

    fn calibrated(factors: Vec<Factor>) -> MarginalSet {
        let mut tree = CliqueTreeBuilder::default()
            .build_from_factors(factors, None)
            .unwrap();
        let roots = MessagePassingScheduler::sum_product().run(&mut tree).unwrap();
        MarginalExtractor::marginals(&mut tree, &roots, &Assignment::new()).unwrap()
    }

    #[test]
    fn test_chain_partition_function() {
        let marginals = calibrated(chain_factors());
        assert_abs_diff_eq!(marginals.log_partition_function(), 18f64.ln(), epsilon = 1e-12);
        assert_abs_diff_eq!(marginals.partition_function(), 18.0, epsilon = 1e-9);

        // Every clique total is Z after calibration
        for m in marginals.marginals() {
            assert_abs_diff_eq!(m.total_unnormalized_probability(), 18.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_marginal_queries() {
        let marginals = calibrated(chain_factors());

        // Brute force: p(c=1) ∝ Σ_a,b φ(a,b) φ(b,1) = 3·1 + 3·3 = 12
        let c = marginals.marginal(&["c"]).unwrap();
        let c1 = Assignment::from_pairs([("c", 1)]);
        assert_abs_diff_eq!(c.unnormalized_probability(&c1).unwrap(), 12.0, epsilon = 1e-9);

        let normalized = marginals.normalized_marginal(&["c"]).unwrap();
        assert_abs_diff_eq!(normalized.unnormalized_probability(&c1).unwrap(), 12.0 / 18.0, epsilon = 1e-9);

        let z = marginals.marginal::<&str>(&[]).unwrap();
        assert!(z.variables().is_empty());
        assert_abs_diff_eq!(z.total_unnormalized_probability(), 18.0, epsilon = 1e-9);

        assert_eq!(marginals.variables(), vars(&["a", "b", "c"]));
        assert!(matches!(
            marginals.marginal(&["nope"]),
            Err(PgmError::VariableNotFound(_))
        ));
        assert!(matches!(
            marginals.marginal(&["a", "c"]),
            Err(PgmError::InvalidGraph(_))
        ));
    }

    #[test]
    fn test_disconnected_marginals_sum_to_partition_function() {
        let factors = vec![
            Factor::dense(vars(&["a"]), vec![2], vec![1.0, 2.0]).unwrap(),
            Factor::dense(vars(&["b"]), vec![2], vec![3.0, 4.0]).unwrap(),
        ];
        let marginals = calibrated(factors);
        assert_abs_diff_eq!(marginals.partition_function(), 21.0, epsilon = 1e-9);

        let a = marginals.marginal(&["a"]).unwrap();
        assert_abs_diff_eq!(a.total_unnormalized_probability(), 21.0, epsilon = 1e-9);
        let a1 = Assignment::from_pairs([("a", 1)]);
        assert_abs_diff_eq!(a.unnormalized_probability(&a1).unwrap(), 14.0, epsilon = 1e-9);
    }

    #[test]
    fn test_disconnected_log_space_marginals_keep_large_weights() {
        let factors = vec![
            Factor::dense_log(vars(&["a"]), vec![2], vec![800.0; 2]).unwrap(),
            Factor::dense_log(vars(&["b", "c"]), vec![2, 2], vec![800.0; 4]).unwrap(),
        ];
        let marginals = calibrated(factors);
        let log_z = 1600.0 + 8f64.ln();
        assert_abs_diff_eq!(marginals.log_partition_function(), log_z, epsilon = 1e-9);

        let a = marginals.marginal(&["a"]).unwrap();
        assert_abs_diff_eq!(a.total_unnormalized_log_probability(), log_z, epsilon = 1e-9);
        let normalized = marginals.normalized_marginal(&["a"]).unwrap();
        let a0 = Assignment::from_pairs([("a", 0)]);
        assert_abs_diff_eq!(normalized.unnormalized_probability(&a0).unwrap(), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_with_conditioned_values() {
        let marginals = calibrated(chain_factors());
        let extended = marginals
            .with_conditioned_values(&Assignment::from_pairs([("y", 1)]))
            .unwrap();

        assert_eq!(extended.conditioned_values().get("y"), Some(1));
        assert_eq!(extended.variables(), vars(&["a", "b", "c"]));
        assert_eq!(extended.all_variables(), vars(&["a", "b", "c", "y"]));
        assert_eq!(extended.log_partition_function(), marginals.log_partition_function());

        // conflicting values and variables with marginals are rejected
        assert!(matches!(
            extended.with_conditioned_values(&Assignment::from_pairs([("y", 0)])),
            Err(PgmError::InvalidAssignment(_))
        ));
        assert!(matches!(
            marginals.with_conditioned_values(&Assignment::from_pairs([("a", 0)])),
            Err(PgmError::InvalidAssignment(_))
        ));
    }

    #[test]
    fn test_zero_probability() {
        let factors = vec![
            Factor::dense(vars(&["a", "b"]), vec![2, 2], vec![0.0; 4]).unwrap(),
            Factor::dense(vars(&["b", "c"]), vec![2, 2], vec![1.0; 4]).unwrap(),
        ];
        let mut tree = CliqueTreeBuilder::default()
            .build_from_factors(factors, None)
            .unwrap();
        let roots = MessagePassingScheduler::sum_product().run(&mut tree).unwrap();
        assert_eq!(
            MarginalExtractor::marginals(&mut tree, &roots, &Assignment::new()).unwrap_err(),
            PgmError::ZeroProbability
        );
    }

    #[test]
    fn test_missing_message_is_reported() {
        // schedule [1, 2, 0, 3] on the path 0-1-2-3: clique 2 sends toward
        // 1 on the way back but is never visited again to answer 3
        let factors = vec![
            Factor::ones(vars(&["a", "b"]), vec![2, 2]).unwrap(),
            Factor::ones(vars(&["b", "c"]), vec![2, 2]).unwrap(),
            Factor::ones(vars(&["c", "d"]), vec![2, 2]).unwrap(),
            Factor::ones(vars(&["d", "e"]), vec![2, 2]).unwrap(),
        ];
        let mut tree = CliqueTreeBuilder::default()
            .build_from_factors(factors, Some(&[2, 0, 1, 3]))
            .unwrap();
        let roots = MessagePassingScheduler::sum_product().run(&mut tree).unwrap();
        let result = MarginalExtractor::marginals(&mut tree, &roots, &Assignment::new());
        assert!(matches!(
            result,
            Err(PgmError::InvalidMessageOrder { from: 2, to: 3 })
        ));
    }

    #[test]
    fn test_max_marginals_and_decoding() {
        let mut tree = CliqueTreeBuilder::default()
            .build_from_factors(chain_factors(), None)
            .unwrap();
        let roots = MessagePassingScheduler::max_product().run(&mut tree).unwrap();
        let max = MarginalExtractor::max_marginals(&mut tree, &roots, &Assignment::new()).unwrap();

        // max over all assignments is 2 · 3 = 6, reached only at a=b=c=1
        for m in max.marginals() {
            let (_, best) = m.most_likely_assignments(1).remove(0);
            assert_abs_diff_eq!(best, 6.0, epsilon = 1e-9);
        }
        let b = max.max_marginal(&["b"]).unwrap();
        assert_abs_diff_eq!(
            b.unnormalized_probability(&Assignment::from_pairs([("b", 0)])).unwrap(),
            2.0,
            epsilon = 1e-9
        );
        assert_eq!(
            max.most_likely_assignment().unwrap(),
            Assignment::from_pairs([("a", 1), ("b", 1), ("c", 1)])
        );
    }

    #[test]
    fn test_empty_max_marginal_spans_components() {
        let factors = vec![
            Factor::dense(vars(&["a"]), vec![2], vec![1.0, 2.0]).unwrap(),
            Factor::dense(vars(&["b"]), vec![2], vec![5.0, 3.0]).unwrap(),
        ];
        let mut tree = CliqueTreeBuilder::default()
            .build_from_factors(factors, None)
            .unwrap();
        let roots = MessagePassingScheduler::max_product().run(&mut tree).unwrap();
        let max = MarginalExtractor::max_marginals(&mut tree, &roots, &Assignment::new()).unwrap();

        let best = max.max_marginal::<&str>(&[]).unwrap();
        assert!(best.variables().is_empty());
        assert_abs_diff_eq!(best.total_unnormalized_probability(), 10.0, epsilon = 1e-12);
        assert_eq!(
            max.most_likely_assignment().unwrap(),
            Assignment::from_pairs([("a", 1), ("b", 0)])
        );
    }
}
