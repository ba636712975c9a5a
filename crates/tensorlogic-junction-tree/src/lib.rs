//! Exact inference on discrete factor graphs with the junction tree algorithm.
//!
//! Factors are dense weight tables over named discrete variables. The engine
//! arranges a factor graph's minimal factors into a clique tree by variable
//! elimination, passes messages up and down it, and reads off marginals,
//! max-marginals and the partition function.
//!
//! # Core Concepts
//!
//! - **Factors**: linear-space ([`TableFactor`]) or log-space ([`LogTableFactor`]) tables
//! - **Factor Graphs**: variables, factors and observed evidence
//! - **Clique Trees**: forests of cliques joined by separator sets
//! - **Message Passing**: sum-product and max-product two-sweep schedules
//!
//! # Architecture
//!
//! ```text
//! FactorGraph → CliqueTreeBuilder → MessagePassingScheduler → MarginalExtractor
//!      ↓               ↓                      ↓                       ↓
//!   Evidence      CliqueTree             Messages, roots      MarginalSet / MaxMarginalSet
//! ```
//!
//! # Example
//!
//! ```
//! use tensorlogic_junction_tree::{Factor, FactorGraph, JunctionTree, MarginalCalculator};
//!
//! let mut graph = FactorGraph::new();
//! for name in ["a", "b", "c"] {
//!     graph.add_variable(name.to_string(), "Binary".to_string());
//! }
//! let ab = Factor::dense(vec!["a".into(), "b".into()], vec![2, 2], vec![2.0, 1.0, 1.0, 2.0])?;
//! let bc = Factor::dense(vec!["b".into(), "c".into()], vec![2, 2], vec![1.0, 1.0, 1.0, 3.0])?;
//! graph.add_factor(ab)?;
//! graph.add_factor(bc)?;
//!
//! let marginals = JunctionTree::new().compute_marginals(&graph)?;
//! assert!((marginals.partition_function() - 18.0).abs() < 1e-9);
//! # Ok::<(), tensorlogic_junction_tree::PgmError>(())
//! ```

mod assignment;
mod clique_tree;
mod config;
mod error;
mod factor;
mod graph;
pub mod instrumentation;
mod junction_tree;
mod log_factor;
mod marginals;
mod message_passing;
mod table_factor;

pub use assignment::Assignment;
pub use clique_tree::{Clique, CliqueTree, CliqueTreeBuilder, CliqueTreeState, SeparatorSet};
pub use config::{JunctionTreeConfig, MergeTieBreak};
pub use error::{PgmError, Result};
pub use factor::Factor;
pub use graph::{FactorGraph, VariableNode};
pub use instrumentation::{
    timers, InferenceLog, NullInferenceLog, TimerSummary, TracingInferenceLog,
};
pub use junction_tree::{JunctionTree, MarginalCalculator};
pub use log_factor::LogTableFactor;
pub use marginals::{MarginalExtractor, MarginalSet, MaxMarginalSet};
pub use message_passing::{InferenceMode, MessagePassingScheduler};
pub use table_factor::TableFactor;

/// Compute marginals with the default junction tree configuration.
pub fn compute_marginals(graph: &FactorGraph) -> Result<MarginalSet> {
    JunctionTree::new().compute_marginals(graph)
}

/// ln Z of a factor graph, conditioned on its evidence.
///
/// Graphs whose evidence has zero probability yield `-inf` rather than an
/// error.
pub fn log_partition_function(graph: &FactorGraph) -> Result<f64> {
    match compute_marginals(graph) {
        Ok(marginals) => Ok(marginals.log_partition_function()),
        Err(PgmError::ZeroProbability) => Ok(f64::NEG_INFINITY),
        Err(e) => Err(e),
    }
}
