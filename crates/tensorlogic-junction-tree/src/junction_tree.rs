//! Junction tree algorithm for exact inference in probabilistic graphical models.
//!
//! The junction tree algorithm (also known as the clique tree algorithm) is an exact inference
//! algorithm that works by:
//! 1. Reducing the factor graph to its minimal factors, one clique each
//! 2. Connecting the cliques into a forest by variable elimination
//! 3. Passing messages up and down every tree of the forest
//! 4. Reading marginals and the partition function off the calibrated cliques
//!
//! # Algorithm Overview
//!
//! ```text
//! Factor Graph → Minimal Factors → Eliminate → Two Sweeps → Extract
//!       ↓               ↓              ↓            ↓           ↓
//!    Evidence        Cliques      Clique Tree   Messages   Marginals, Z
//! ```
//!
//! Graphs that cannot be arranged into a tree without adding fill-in edges
//! are rejected with [`PgmError::Construction`](crate::PgmError::Construction).
//!
//! # Complexity
//!
//! - Time: O(n × d^w) where w is the largest clique
//! - Space: O(n × d^w)
//!
//! # References
//!
//! - Koller & Friedman, "Probabilistic Graphical Models", Chapter 10
//! - Lauritzen & Spiegelhalter, "Local Computations with Probabilities on
//!   Graphical Structures and their Application to Expert Systems" (1988)

use std::collections::BTreeSet;

use crate::assignment::Assignment;
use crate::clique_tree::{CliqueTree, CliqueTreeBuilder};
use crate::config::JunctionTreeConfig;
use crate::error::Result;
use crate::factor::Factor;
use crate::graph::FactorGraph;
use crate::instrumentation::{timers, InferenceLog, NullInferenceLog};
use crate::marginals::{MarginalExtractor, MarginalSet, MaxMarginalSet};
use crate::message_passing::{InferenceMode, MessagePassingScheduler};

/// Exact inference engines over factor graphs.
pub trait MarginalCalculator: Send + Sync {
    /// Sum-product marginals and partition function.
    fn compute_marginals(&self, graph: &FactorGraph) -> Result<MarginalSet>;

    /// Max-product max-marginals.
    fn compute_max_marginals(&self, graph: &FactorGraph) -> Result<MaxMarginalSet>;

    /// Get algorithm name.
    fn name(&self) -> &str;
}

/// Junction tree inference engine.
///
/// Holds only configuration; every call builds and discards its own
/// clique tree.
#[derive(Debug, Clone, Default)]
pub struct JunctionTree {
    config: JunctionTreeConfig,
}

/// What a graph needs before inference can run.
enum Preparation {
    /// Every variable is observed; holds the conditioned log-probability
    FullyConditioned(f64),
    /// The graph reduces to one factor, which is its own marginal
    SingleFactor(Factor),
    /// Minimal factors that need a clique tree
    Cliques(Vec<Factor>),
}

impl JunctionTree {
    /// Create an engine with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: JunctionTreeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &JunctionTreeConfig {
        &self.config
    }

    /// Marginals of `graph`, reporting phase timings to `log`.
    pub fn compute_marginals_with_log(
        &self,
        graph: &FactorGraph,
        log: &mut dyn InferenceLog,
    ) -> Result<MarginalSet> {
        let conditioned = graph.conditioned_values().clone();
        let factors = match self.prepare(graph)? {
            Preparation::FullyConditioned(log_probability) => {
                return Ok(MarginalSet::from_conditioned(conditioned, log_probability));
            }
            Preparation::SingleFactor(factor) => {
                let log_z = factor.total_unnormalized_log_probability();
                return Ok(MarginalSet::new(vec![factor], conditioned, log_z));
            }
            Preparation::Cliques(factors) => factors,
        };

        let (mut tree, roots) = self.calibrate(graph, factors, InferenceMode::SumProduct, log)?;

        log.start_timer(timers::BUILD_MARGINALS);
        let marginals = MarginalExtractor::marginals(&mut tree, &roots, &conditioned);
        log.stop_timer(timers::BUILD_MARGINALS);
        let marginals = marginals?;
        log.log_statistic("inference/log_partition_function", marginals.log_partition_function());
        Ok(marginals)
    }

    /// Max-marginals of `graph`, reporting phase timings to `log`.
    pub fn compute_max_marginals_with_log(
        &self,
        graph: &FactorGraph,
        log: &mut dyn InferenceLog,
    ) -> Result<MaxMarginalSet> {
        let conditioned = graph.conditioned_values().clone();
        let factors = match self.prepare(graph)? {
            Preparation::FullyConditioned(_) => {
                return Ok(MaxMarginalSet::from_conditioned(conditioned));
            }
            Preparation::SingleFactor(factor) => {
                return Ok(MaxMarginalSet::new(vec![factor], vec![vec![0]], conditioned));
            }
            Preparation::Cliques(factors) => factors,
        };

        let (mut tree, roots) = self.calibrate(graph, factors, InferenceMode::MaxProduct, log)?;

        log.start_timer(timers::BUILD_MAX_MARGINALS);
        let max_marginals = MarginalExtractor::max_marginals(&mut tree, &roots, &conditioned);
        log.stop_timer(timers::BUILD_MAX_MARGINALS);
        max_marginals
    }

    fn prepare(&self, graph: &FactorGraph) -> Result<Preparation> {
        if graph.free_variables().is_empty() {
            let log_probability = graph.unnormalized_log_probability(&Assignment::new())?;
            tracing::debug!(log_probability, "no free variables, skipping clique tree");
            return Ok(Preparation::FullyConditioned(log_probability));
        }

        let mut factors = graph.minimal_factors()?;
        if factors.len() == 1 {
            if let Some(factor) = factors.pop() {
                tracing::debug!(variables = ?factor.variables(), "single factor, skipping clique tree");
                return Ok(Preparation::SingleFactor(factor));
            }
        }
        Ok(Preparation::Cliques(factors))
    }

    fn calibrate(
        &self,
        graph: &FactorGraph,
        factors: Vec<Factor>,
        mode: InferenceMode,
        log: &mut dyn InferenceLog,
    ) -> Result<(CliqueTree, BTreeSet<usize>)> {
        let hint = if self.config.use_elimination_hint {
            graph.elimination_hint()
        } else {
            None
        };

        log.start_timer(timers::BUILD_CLIQUE_TREE);
        let tree = CliqueTreeBuilder::new(self.config.clone()).build_from_factors(factors, hint);
        log.stop_timer(timers::BUILD_CLIQUE_TREE);
        let mut tree = tree?;
        log.log_statistic("inference/cliques", tree.num_cliques() as f64);

        log.start_timer(timers::MESSAGE_PASSING);
        let roots = MessagePassingScheduler::new(mode).run(&mut tree);
        log.stop_timer(timers::MESSAGE_PASSING);
        let roots = roots?;
        log.log_statistic("inference/roots", roots.len() as f64);

        Ok((tree, roots))
    }
}

impl MarginalCalculator for JunctionTree {
    fn compute_marginals(&self, graph: &FactorGraph) -> Result<MarginalSet> {
        self.compute_marginals_with_log(graph, &mut NullInferenceLog)
    }

    fn compute_max_marginals(&self, graph: &FactorGraph) -> Result<MaxMarginalSet> {
        self.compute_max_marginals_with_log(graph, &mut NullInferenceLog)
    }

    fn name(&self) -> &str {
        "JunctionTree"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrumentation::TracingInferenceLog;
    use crate::PgmError;
    use approx::assert_abs_diff_eq;

    fn vars(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn chain_graph() -> FactorGraph {
        let mut graph = FactorGraph::new();
        for name in ["a", "b", "c"] {
            graph.add_variable(name.to_string(), "Binary".to_string());
        }
        graph
            .add_factor(Factor::dense(vars(&["a", "b"]), vec![2, 2], vec![2.0, 1.0, 1.0, 2.0]).unwrap())
            .unwrap();
        graph
            .add_factor(Factor::dense(vars(&["b", "c"]), vec![2, 2], vec![1.0, 1.0, 1.0, 3.0]).unwrap())
            .unwrap();
        graph
    }

    #[test]
    fn test_chain_partition_function() {
        let engine = JunctionTree::new();
        let marginals = engine.compute_marginals(&chain_graph()).unwrap();
        assert_abs_diff_eq!(marginals.log_partition_function(), 18f64.ln(), epsilon = 1e-12);
        assert_eq!(engine.name(), "JunctionTree");
    }

    #[test]
    fn test_timers_recorded() {
        let mut log = TracingInferenceLog::new();
        JunctionTree::new()
            .compute_marginals_with_log(&chain_graph(), &mut log)
            .unwrap();
        for timer in [
            timers::BUILD_CLIQUE_TREE,
            timers::MESSAGE_PASSING,
            timers::BUILD_MARGINALS,
        ] {
            assert_eq!(log.timer(timer).map(|t| t.invocations), Some(1));
        }
        assert_eq!(log.statistic("inference/cliques"), Some(2.0));
        assert!(log.timer(timers::BUILD_MAX_MARGINALS).is_none());
    }

    #[test]
    fn test_single_factor_fast_path() {
        let mut graph = FactorGraph::new();
        graph.add_variable_with_card("x".to_string(), "D".to_string(), 3);
        let factor = Factor::dense(vars(&["x"]), vec![3], vec![1.0, 2.0, 3.0]).unwrap();
        graph.add_factor(factor.clone()).unwrap();

        let mut log = TracingInferenceLog::new();
        let marginals = JunctionTree::new()
            .compute_marginals_with_log(&graph, &mut log)
            .unwrap();
        assert_eq!(marginals.marginals(), &[factor.clone()]);
        assert_abs_diff_eq!(marginals.partition_function(), 6.0, epsilon = 1e-12);
        assert!(log.timers().is_empty());

        let max = JunctionTree::new().compute_max_marginals(&graph).unwrap();
        assert_eq!(max.marginals(), &[factor]);
    }

    #[test]
    fn test_fully_conditioned_fast_path() {
        let graph = chain_graph()
            .condition(&Assignment::from_pairs([("a", 1), ("b", 1), ("c", 1)]))
            .unwrap();
        let marginals = JunctionTree::new().compute_marginals(&graph).unwrap();
        assert!(marginals.marginals().is_empty());
        assert_abs_diff_eq!(marginals.log_partition_function(), 6f64.ln(), epsilon = 1e-12);
        assert_eq!(marginals.conditioned_values().len(), 3);

        let max = JunctionTree::new().compute_max_marginals(&graph).unwrap();
        assert!(max.marginals().is_empty());
    }

    #[test]
    fn test_zero_probability_evidence() {
        let mut graph = chain_graph();
        graph.add_variable("d".to_string(), "Binary".to_string());
        graph
            .add_factor(Factor::dense(vars(&["c", "d"]), vec![2, 2], vec![1.0, 0.0, 1.0, 0.0]).unwrap())
            .unwrap();
        let conditioned = graph.condition(&Assignment::from_pairs([("d", 1)])).unwrap();

        let err = JunctionTree::new().compute_marginals(&conditioned).unwrap_err();
        assert_eq!(err, PgmError::ZeroProbability);
        assert!(!err.is_fatal());
    }
}
