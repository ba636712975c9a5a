//! Factor representation and operations.
//!
//! [`Factor`] is the closed set of factor representations the inference
//! engine works with. The engine only ever calls the operations below and
//! never inspects which representation it holds.

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};

use crate::assignment::Assignment;
use crate::clique_tree::SeparatorSet;
use crate::error::{PgmError, Result};
use crate::log_factor::LogTableFactor;
use crate::table_factor::TableFactor;

/// A factor in a probabilistic graphical model.
///
/// Represents a function over a subset of variables: φ(X₁, X₂, ..., Xₖ) → ℝ⁺
#[derive(Clone, Debug, PartialEq)]
pub enum Factor {
    /// Weights stored directly
    Table(TableFactor),
    /// Weights stored as natural logarithms
    LogTable(LogTableFactor),
}

impl Factor {
    /// Create a linear-space factor from a row-major list of weights.
    pub fn dense(variables: Vec<String>, shape: Vec<usize>, values: Vec<f64>) -> Result<Self> {
        TableFactor::from_shape_vec(variables, shape, values).map(Factor::Table)
    }

    /// Create a log-space factor from a row-major list of log weights.
    pub fn dense_log(variables: Vec<String>, shape: Vec<usize>, log_values: Vec<f64>) -> Result<Self> {
        LogTableFactor::from_shape_vec(variables, shape, log_values).map(Factor::LogTable)
    }

    /// Factor with weight 1 everywhere.
    pub fn ones(variables: Vec<String>, shape: Vec<usize>) -> Result<Self> {
        TableFactor::ones(variables, shape).map(Factor::Table)
    }

    /// Factor over no variables.
    pub fn scalar(value: f64) -> Result<Self> {
        TableFactor::scalar(value).map(Factor::Table)
    }

    /// Variables this factor is defined over, in axis order.
    pub fn variables(&self) -> &[String] {
        match self {
            Factor::Table(f) => f.variables(),
            Factor::LogTable(f) => f.variables(),
        }
    }

    /// Cardinality of `var`, if the factor mentions it.
    pub fn cardinality(&self, var: &str) -> Option<usize> {
        match self {
            Factor::Table(f) => f.cardinality(var),
            Factor::LogTable(f) => f.cardinality(var),
        }
    }

    /// Whether every variable in `vars` is in scope.
    pub fn contains_all<S: AsRef<str>>(&self, vars: &[S]) -> bool {
        vars.iter()
            .all(|v| self.variables().iter().any(|own| own == v.as_ref()))
    }

    pub fn is_log_space(&self) -> bool {
        matches!(self, Factor::LogTable(_))
    }

    /// Number of assignments with non-zero weight.
    pub fn size(&self) -> usize {
        match self {
            Factor::Table(f) => f.size(),
            Factor::LogTable(f) => f.size(),
        }
    }

    fn as_log(&self) -> Cow<'_, LogTableFactor> {
        match self {
            Factor::Table(f) => Cow::Owned(LogTableFactor::from(f)),
            Factor::LogTable(f) => Cow::Borrowed(f),
        }
    }

    /// Compute the product of two factors.
    ///
    /// φ₁(X₁) * φ₂(X₂) = φ(X₁ ∪ X₂). If either side is in log space the
    /// result is too.
    pub fn product(&self, other: &Factor) -> Result<Factor> {
        match (self, other) {
            (Factor::Table(a), Factor::Table(b)) => a.product(b).map(Factor::Table),
            _ => self
                .as_log()
                .product(&other.as_log())
                .map(Factor::LogTable),
        }
    }

    /// Multiply `self` with every factor in `others`, smallest first.
    pub fn product_all(&self, others: &[&Factor]) -> Result<Factor> {
        let mut ordered: Vec<&Factor> = others.to_vec();
        ordered.sort_by_key(|f| f.size());
        ordered
            .into_iter()
            .try_fold(self.clone(), |acc, f| acc.product(f))
    }

    /// Multiply every weight by a non-negative constant.
    pub fn scale(&self, constant: f64) -> Result<Factor> {
        match self {
            Factor::Table(f) => f.scale(constant).map(Factor::Table),
            Factor::LogTable(f) => f.scale(constant).map(Factor::LogTable),
        }
    }

    /// Multiply every weight by `exp(log_constant)`.
    ///
    /// Log-space factors add the constant directly, so constants beyond the
    /// range of `f64` stay usable there.
    pub fn scale_log(&self, log_constant: f64) -> Result<Factor> {
        match self {
            Factor::Table(f) => f.scale(log_constant.exp()).map(Factor::Table),
            Factor::LogTable(f) => f.scale_log(log_constant).map(Factor::LogTable),
        }
    }

    /// Sum out `vars`. Variables the factor does not mention are ignored.
    pub fn marginalize(&self, vars: &[String]) -> Factor {
        match self {
            Factor::Table(f) => Factor::Table(f.marginalize(vars)),
            Factor::LogTable(f) => Factor::LogTable(f.marginalize(vars)),
        }
    }

    /// Max out `vars`. Variables the factor does not mention are ignored.
    pub fn max_marginalize(&self, vars: &[String]) -> Factor {
        match self {
            Factor::Table(f) => Factor::Table(f.max_marginalize(vars)),
            Factor::LogTable(f) => Factor::LogTable(f.max_marginalize(vars)),
        }
    }

    /// Sum out every variable except `keep`.
    pub fn marginalize_to(&self, keep: &[String]) -> Factor {
        self.marginalize(&self.variables_outside(keep))
    }

    /// Max out every variable except `keep`.
    pub fn max_marginalize_to(&self, keep: &[String]) -> Factor {
        self.max_marginalize(&self.variables_outside(keep))
    }

    fn variables_outside(&self, keep: &[String]) -> Vec<String> {
        self.variables()
            .iter()
            .filter(|v| !keep.contains(v))
            .cloned()
            .collect()
    }

    /// Elementwise inverse; zero weights stay zero.
    pub fn inverse(&self) -> Factor {
        match self {
            Factor::Table(f) => Factor::Table(f.inverse()),
            Factor::LogTable(f) => Factor::LogTable(f.inverse()),
        }
    }

    /// φ / ψ, computed as φ · ψ⁻¹.
    pub fn divide(&self, other: &Factor) -> Result<Factor> {
        self.product(&other.inverse())
    }

    /// Restrict to the assigned values of the variables in scope.
    pub fn conditional(&self, assignment: &Assignment) -> Result<Factor> {
        match self {
            Factor::Table(f) => f.conditional(assignment).map(Factor::Table),
            Factor::LogTable(f) => f.conditional(assignment).map(Factor::LogTable),
        }
    }

    /// Weight of `assignment`, which must cover every variable in scope.
    pub fn unnormalized_probability(&self, assignment: &Assignment) -> Result<f64> {
        match self {
            Factor::Table(f) => f.value(assignment),
            Factor::LogTable(f) => f.log_value(assignment).map(f64::exp),
        }
    }

    pub fn unnormalized_log_probability(&self, assignment: &Assignment) -> Result<f64> {
        match self {
            Factor::Table(f) => f.value(assignment).map(f64::ln),
            Factor::LogTable(f) => f.log_value(assignment),
        }
    }

    /// Sum of all weights.
    pub fn total_unnormalized_probability(&self) -> f64 {
        match self {
            Factor::Table(f) => f.total(),
            Factor::LogTable(f) => f.log_total().exp(),
        }
    }

    /// ln of the sum of all weights.
    pub fn total_unnormalized_log_probability(&self) -> f64 {
        match self {
            Factor::Table(f) => f.total().ln(),
            Factor::LogTable(f) => f.log_total(),
        }
    }

    /// The `k` highest-weight assignments with their (linear) weights.
    pub fn most_likely_assignments(&self, k: usize) -> Vec<(Assignment, f64)> {
        match self {
            Factor::Table(f) => f.most_likely_assignments(k),
            Factor::LogTable(f) => f
                .most_likely_assignments(k)
                .into_iter()
                .map(|(a, log_weight)| (a, log_weight.exp()))
                .collect(),
        }
    }

    /// Scale to sum to 1. Fails on an all-zero factor.
    pub fn normalize(&self) -> Result<Factor> {
        let log_total = self.total_unnormalized_log_probability();
        if !log_total.is_finite() {
            return Err(PgmError::InvalidDistribution(format!(
                "cannot normalize a factor with total weight {}",
                log_total.exp()
            )));
        }
        match self {
            Factor::Table(f) => f.scale(1.0 / f.total()).map(Factor::Table),
            Factor::LogTable(f) => f.scale_log(-log_total).map(Factor::LogTable),
        }
    }

    pub fn to_log_space(&self) -> Factor {
        Factor::LogTable(self.as_log().into_owned())
    }

    pub fn to_linear_space(&self) -> Factor {
        match self {
            Factor::Table(_) => self.clone(),
            Factor::LogTable(f) => Factor::Table(f.to_linear()),
        }
    }

    /// Separators this factor's clique can send a message across.
    ///
    /// `inbound` maps every separator of the clique to the message already
    /// received across it, if any. If exactly one message is missing, the
    /// clique can reply toward that neighbor; if none are missing it can
    /// send everywhere; otherwise it must keep waiting.
    pub fn computable_outbound_messages(
        &self,
        inbound: &BTreeMap<SeparatorSet, Option<&Factor>>,
    ) -> BTreeSet<SeparatorSet> {
        match self {
            Factor::Table(_) | Factor::LogTable(_) => discrete_outbound_messages(inbound),
        }
    }
}

fn discrete_outbound_messages(
    inbound: &BTreeMap<SeparatorSet, Option<&Factor>>,
) -> BTreeSet<SeparatorSet> {
    let missing: BTreeSet<SeparatorSet> = inbound
        .iter()
        .filter(|(_, message)| message.is_none())
        .map(|(separator, _)| separator.clone())
        .collect();

    match missing.len() {
        0 => inbound.keys().cloned().collect(),
        1 => missing,
        _ => BTreeSet::new(),
    }
}

impl From<TableFactor> for Factor {
    fn from(factor: TableFactor) -> Self {
        Factor::Table(factor)
    }
}

impl From<LogTableFactor> for Factor {
    fn from(factor: LogTableFactor) -> Self {
        Factor::LogTable(factor)
    }
}
