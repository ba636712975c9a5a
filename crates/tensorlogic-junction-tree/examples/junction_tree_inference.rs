//! Junction tree exact inference example.
//!
//! Runs exact inference on the classic "Student Network" Bayesian network:
//!
//! ```text
//!     Difficulty
//!         |
//!         v
//!      Grade  <--- Intelligence
//!         |
//!         v
//!      Letter
//! ```
//!
//! This example shows:
//! 1. Building a factor graph from conditional probability tables
//! 2. Inspecting the clique tree the engine builds
//! 3. Querying marginals and the partition function
//! 4. Conditioning on evidence and decoding the most likely explanation
//! 5. Collecting phase timings
//!
//! Set `RUST_LOG=tensorlogic_junction_tree=debug` to see engine events.

use scirs2_core::ndarray::Array;
use tensorlogic_junction_tree::{
    Assignment, CliqueTreeBuilder, Factor, FactorGraph, JunctionTree, TableFactor,
    TracingInferenceLog,
};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("=== Junction Tree Exact Inference Example ===\n");

    let graph = build_student_network()?;

    println!("Factor Graph Statistics:");
    println!("  Variables: {}", graph.num_variables());
    println!("  Factors: {}", graph.num_factors());
    println!();

    // The engine builds its own tree; this one is only for display
    let tree = CliqueTreeBuilder::default().build(&graph)?;
    println!("Clique Tree Structure:");
    for clique in tree.cliques() {
        println!("  Clique {}: {:?}", clique.index(), clique.factor().variables());
    }
    for (a, b) in tree.edges() {
        if let Some(separator) = tree.separator(a, b) {
            println!("  Edge {} - {}: separator {:?}", a, b, separator.variables());
        }
    }
    println!("  Elimination order: {:?}", tree.elimination_order());
    println!();

    let engine = JunctionTree::new();
    let mut log = TracingInferenceLog::new();
    let marginals = engine.compute_marginals_with_log(&graph, &mut log)?;

    println!("=== Marginal Queries ===\n");
    println!("Partition function: {:.4}", marginals.partition_function());
    for (var, labels) in [
        ("Intelligence", &["Low", "High"][..]),
        ("Difficulty", &["Easy", "Hard"][..]),
        ("Grade", &["A", "B", "C"][..]),
        ("Letter", &["Weak", "Strong"][..]),
    ] {
        let p = marginals.normalized_marginal(&[var])?;
        println!("Query: P({})", var);
        for (value, label) in labels.iter().enumerate() {
            let a = Assignment::from_pairs([(var, value)]);
            println!("  P({} = {}) = {:.4}", var, label, p.unnormalized_probability(&a)?);
        }
        println!();
    }

    println!("=== Evidence ===\n");
    let evidence = Assignment::from_pairs([("Letter", 1)]);
    let conditioned = graph.condition(&evidence)?;
    let posterior = engine.compute_marginals_with_log(&conditioned, &mut log)?;
    println!("Evidence: {}", evidence);
    println!("  P(Letter = Strong) = {:.4}", posterior.partition_function());
    let p_intelligence = posterior.normalized_marginal(&["Intelligence"])?;
    for (value, label) in ["Low", "High"].iter().enumerate() {
        let a = Assignment::from_pairs([("Intelligence", value)]);
        println!(
            "  P(Intelligence = {} | Letter = Strong) = {:.4}",
            label,
            p_intelligence.unnormalized_probability(&a)?
        );
    }
    println!();

    println!("=== Most Likely Explanation ===\n");
    let max_marginals = engine.compute_max_marginals_with_log(&conditioned, &mut log)?;
    let map = max_marginals.most_likely_assignment()?;
    println!("  {}", map);
    println!(
        "  Joint probability: {:.4}",
        graph.unnormalized_log_probability(&map)?.exp()
    );
    println!();

    println!("=== Timings ===\n");
    for (name, summary) in log.timers() {
        println!(
            "  {}: {} call(s), {:?}",
            name, summary.invocations, summary.total
        );
    }
    log.report();

    Ok(())
}

/// Build the Student Network factor graph.
///
/// - **Intelligence**: prior over Low/High
/// - **Difficulty**: prior over Easy/Hard
/// - **Grade**: depends on Intelligence and Difficulty (A/B/C)
/// - **Letter**: depends on Grade (Weak/Strong)
fn build_student_network() -> anyhow::Result<FactorGraph> {
    let mut graph = FactorGraph::new();

    graph.add_variable_with_card("Intelligence".to_string(), "Binary".to_string(), 2);
    graph.add_variable_with_card("Difficulty".to_string(), "Binary".to_string(), 2);
    graph.add_variable_with_card("Grade".to_string(), "Ternary".to_string(), 3);
    graph.add_variable_with_card("Letter".to_string(), "Binary".to_string(), 2);

    graph.add_factor(Factor::dense(
        vec!["Intelligence".to_string()],
        vec![2],
        vec![0.7, 0.3],
    )?)?;
    graph.add_factor(Factor::dense(
        vec!["Difficulty".to_string()],
        vec![2],
        vec![0.6, 0.4],
    )?)?;

    #[rustfmt::skip]
    let grade_values = vec![
        // Intelligence=Low
        0.3, 0.4, 0.3,    // Difficulty=Easy  -> [A, B, C]
        0.05, 0.25, 0.7,  // Difficulty=Hard  -> [A, B, C]
        // Intelligence=High
        0.9, 0.08, 0.02,  // Difficulty=Easy  -> [A, B, C]
        0.5, 0.3, 0.2,    // Difficulty=Hard  -> [A, B, C]
    ];
    let p_grade = TableFactor::new(
        vec![
            "Intelligence".to_string(),
            "Difficulty".to_string(),
            "Grade".to_string(),
        ],
        Array::from_shape_vec(vec![2, 2, 3], grade_values)?.into_dyn(),
    )?;
    graph.add_factor(p_grade.into())?;

    let p_letter = TableFactor::new(
        vec!["Grade".to_string(), "Letter".to_string()],
        Array::from_shape_vec(
            vec![3, 2],
            vec![
                0.1, 0.9, // Grade=A -> [Weak, Strong]
                0.4, 0.6, // Grade=B -> [Weak, Strong]
                0.99, 0.01, // Grade=C -> [Weak, Strong]
            ],
        )?
        .into_dyn(),
    )?;
    graph.add_factor(p_letter.into())?;

    Ok(graph)
}
