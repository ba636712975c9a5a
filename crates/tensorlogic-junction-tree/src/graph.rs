//! Factor graph representation.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::assignment::Assignment;
use crate::error::{PgmError, Result};
use crate::factor::Factor;

/// Variable node in a factor graph.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VariableNode {
    /// Variable name
    pub name: String,
    /// Domain of the variable
    pub domain: String,
    /// Cardinality (number of possible values)
    pub cardinality: usize,
}

/// Factor graph over discrete variables, possibly with observed evidence.
///
/// Factors are kept in insertion order; that order determines clique
/// indices and therefore the tie-breaks of clique tree construction.
#[derive(Clone, Debug, Default)]
pub struct FactorGraph {
    /// Variable nodes
    variables: BTreeMap<String, VariableNode>,
    /// Factors over the free variables
    factors: Vec<Factor>,
    /// Adjacency: variable -> indices of the factors mentioning it
    var_to_factors: BTreeMap<String, Vec<usize>>,
    /// Observed values
    conditioned: Assignment,
    /// Optional clique schedule, one position per minimal factor
    elimination_hint: Option<Vec<usize>>,
}

impl FactorGraph {
    /// Create a new empty factor graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a binary variable to the graph.
    pub fn add_variable(&mut self, name: String, domain: String) {
        self.add_variable_with_card(name, domain, 2);
    }

    /// Add a variable with specific cardinality.
    pub fn add_variable_with_card(&mut self, name: String, domain: String, cardinality: usize) {
        let node = VariableNode {
            name: name.clone(),
            domain,
            cardinality,
        };
        self.variables.insert(name.clone(), node);
        self.var_to_factors.entry(name).or_default();
    }

    /// Add a factor to the graph, returning its index.
    ///
    /// Every variable must be declared with a matching cardinality. Factors
    /// over already-conditioned variables are reduced on insertion.
    pub fn add_factor(&mut self, factor: Factor) -> Result<usize> {
        for var in factor.variables() {
            let node = self
                .variables
                .get(var)
                .ok_or_else(|| PgmError::VariableNotFound(var.clone()))?;
            let card = factor.cardinality(var).unwrap_or(0);
            if card != node.cardinality {
                return Err(PgmError::DimensionMismatch {
                    expected: vec![node.cardinality],
                    got: vec![card],
                });
            }
        }

        let factor = if self.conditioned.is_empty() {
            factor
        } else {
            factor.conditional(&self.conditioned)?
        };

        let index = self.factors.len();
        for var in factor.variables() {
            self.var_to_factors
                .entry(var.clone())
                .or_default()
                .push(index);
        }
        self.factors.push(factor);
        Ok(index)
    }

    /// Use `hint` as the clique elimination schedule: `hint[i]` is the
    /// position of minimal factor `i`.
    pub fn with_elimination_hint(mut self, hint: Vec<usize>) -> Self {
        self.elimination_hint = Some(hint);
        self
    }

    pub fn elimination_hint(&self) -> Option<&[usize]> {
        self.elimination_hint.as_deref()
    }

    /// Get variable node.
    pub fn get_variable(&self, name: &str) -> Option<&VariableNode> {
        self.variables.get(name)
    }

    /// Indices of the factors connected to a variable.
    pub fn get_adjacent_factors(&self, var: &str) -> Option<&[usize]> {
        self.var_to_factors.get(var).map(Vec::as_slice)
    }

    /// Get number of variables.
    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    /// Get number of factors.
    pub fn num_factors(&self) -> usize {
        self.factors.len()
    }

    /// Check if graph is empty.
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty() && self.factors.is_empty()
    }

    /// Get all variable names.
    pub fn variable_names(&self) -> impl Iterator<Item = &String> {
        self.variables.keys()
    }

    /// Get all variables as an iterator.
    pub fn variables(&self) -> impl Iterator<Item = (&String, &VariableNode)> {
        self.variables.iter()
    }

    /// Factors in insertion order.
    pub fn factors(&self) -> &[Factor] {
        &self.factors
    }

    /// Variables that have not been observed.
    pub fn free_variables(&self) -> Vec<String> {
        self.variables
            .keys()
            .filter(|v| !self.conditioned.contains(v))
            .cloned()
            .collect()
    }

    pub fn conditioned_values(&self) -> &Assignment {
        &self.conditioned
    }

    pub fn conditioned_variables(&self) -> Vec<String> {
        self.conditioned.variable_names().cloned().collect()
    }

    /// Observe `evidence`, returning the reduced graph.
    ///
    /// Every factor is restricted to the observed values and the variables
    /// move to the conditioned set. Any elimination hint is dropped, since
    /// the minimal factors may change.
    pub fn condition(&self, evidence: &Assignment) -> Result<FactorGraph> {
        for (var, value) in evidence.iter() {
            let node = self
                .variables
                .get(var)
                .ok_or_else(|| PgmError::VariableNotFound(var.clone()))?;
            if value >= node.cardinality {
                return Err(PgmError::InvalidAssignment(format!(
                    "Value {} out of bounds for variable {} with cardinality {}",
                    value, var, node.cardinality
                )));
            }
        }
        let conditioned = self.conditioned.union(evidence)?;

        let mut reduced = FactorGraph {
            variables: self.variables.clone(),
            factors: Vec::with_capacity(self.factors.len()),
            var_to_factors: self
                .variables
                .keys()
                .map(|v| (v.clone(), Vec::new()))
                .collect(),
            conditioned,
            elimination_hint: None,
        };
        for factor in &self.factors {
            reduced.add_factor(factor.conditional(evidence)?)?;
        }
        tracing::debug!(
            evidence = %evidence,
            factors = reduced.factors.len(),
            "conditioned factor graph"
        );
        Ok(reduced)
    }

    /// Factors with no factor's scope strictly contained in another's.
    ///
    /// Every factor whose variables are a subset of another factor's is
    /// multiplied into the smallest such factor (lowest index on ties, and
    /// among equal scopes the first one absorbs the rest). Surviving factors
    /// keep their relative order. A unit factor is appended for every free
    /// variable that no factor mentions.
    pub fn minimal_factors(&self) -> Result<Vec<Factor>> {
        let scopes: Vec<BTreeSet<&String>> = self
            .factors
            .iter()
            .map(|f| f.variables().iter().collect())
            .collect();

        let absorbed_by = |i: usize, j: usize| {
            i != j
                && scopes[i].is_subset(&scopes[j])
                && (scopes[i].len() < scopes[j].len() || j < i)
        };

        let kept: Vec<usize> = (0..scopes.len())
            .filter(|&i| !(0..scopes.len()).any(|j| absorbed_by(i, j)))
            .collect();

        let mut absorbed: BTreeMap<usize, Vec<&Factor>> = BTreeMap::new();
        for i in 0..scopes.len() {
            if kept.contains(&i) {
                continue;
            }
            let target = kept
                .iter()
                .copied()
                .filter(|&j| absorbed_by(i, j))
                .min_by_key(|&j| (scopes[j].len(), j))
                .ok_or_else(|| {
                    PgmError::InvalidGraph(format!("factor {} has no containing factor", i))
                })?;
            absorbed.entry(target).or_default().push(&self.factors[i]);
        }

        let mut minimal = Vec::with_capacity(kept.len());
        for &index in &kept {
            let factor = match absorbed.get(&index) {
                Some(others) => self.factors[index].product_all(others)?,
                None => self.factors[index].clone(),
            };
            minimal.push(factor);
        }

        for var in self.free_variables() {
            let covered = self
                .var_to_factors
                .get(&var)
                .is_some_and(|adjacent| !adjacent.is_empty());
            if !covered {
                let card = self.variables[&var].cardinality;
                minimal.push(Factor::ones(vec![var], vec![card])?);
            }
        }
        Ok(minimal)
    }

    /// ln of the product of every factor at `assignment`.
    ///
    /// `assignment` must cover the free variables; conditioned values are
    /// merged in and must not conflict.
    pub fn unnormalized_log_probability(&self, assignment: &Assignment) -> Result<f64> {
        let full = self.conditioned.union(assignment)?;
        self.factors.iter().try_fold(0.0, |acc, factor| {
            let local = full.restrict(factor.variables());
            Ok(acc + factor.unnormalized_log_probability(&local)?)
        })
    }
}
