//! Log-space weight tables.
//!
//! Products of many small factors underflow quickly in linear space. A
//! [`LogTableFactor`] stores `ln φ` instead, so products become sums and
//! marginalization uses log-sum-exp.

use scirs2_core::ndarray::{ArrayD, IxDyn};

use crate::assignment::Assignment;
use crate::error::{PgmError, Result};
use crate::table_factor::{
    assignment_index, check_axes, combine, condition_axes, eliminate_axes, top_entries,
    TableFactor,
};

/// Dense factor stored as log weights. Zero weights are `-inf`.
#[derive(Clone, Debug, PartialEq)]
pub struct LogTableFactor {
    variables: Vec<String>,
    log_values: ArrayD<f64>,
}

impl LogTableFactor {
    /// Create a factor from log weights. `+inf` and NaN are rejected.
    pub fn new(variables: Vec<String>, log_values: ArrayD<f64>) -> Result<Self> {
        check_axes(&variables, log_values.shape())?;
        if let Some(bad) = log_values
            .iter()
            .find(|v| v.is_nan() || **v == f64::INFINITY)
        {
            return Err(PgmError::InvalidDistribution(format!(
                "log weights must be below +inf, found {}",
                bad
            )));
        }
        Ok(Self {
            variables,
            log_values,
        })
    }

    /// Create a factor from a row-major list of log weights.
    pub fn from_shape_vec(variables: Vec<String>, shape: Vec<usize>, data: Vec<f64>) -> Result<Self> {
        let log_values = ArrayD::from_shape_vec(IxDyn(&shape), data)
            .map_err(|e| PgmError::InvalidDistribution(format!("Array creation failed: {}", e)))?;
        Self::new(variables, log_values)
    }

    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// The log weight table.
    pub fn log_values(&self) -> &ArrayD<f64> {
        &self.log_values
    }

    pub fn cardinality(&self, var: &str) -> Option<usize> {
        self.variables
            .iter()
            .position(|v| v == var)
            .map(|idx| self.log_values.shape()[idx])
    }

    pub fn product(&self, other: &LogTableFactor) -> Result<LogTableFactor> {
        let (variables, log_values) = combine(
            &self.variables,
            &self.log_values,
            &other.variables,
            &other.log_values,
            |a, b| a + b,
        )?;
        Ok(Self {
            variables,
            log_values,
        })
    }

    pub fn scale(&self, constant: f64) -> Result<LogTableFactor> {
        if !(constant.is_finite() && constant >= 0.0) {
            return Err(PgmError::InvalidDistribution(format!(
                "cannot scale a factor by {}",
                constant
            )));
        }
        self.scale_log(constant.ln())
    }

    /// Add `log_constant` to every log weight.
    pub fn scale_log(&self, log_constant: f64) -> Result<LogTableFactor> {
        if log_constant.is_nan() || log_constant == f64::INFINITY {
            return Err(PgmError::InvalidDistribution(format!(
                "cannot scale a factor by exp({})",
                log_constant
            )));
        }
        Ok(Self {
            variables: self.variables.clone(),
            log_values: self.log_values.mapv(|x| x + log_constant),
        })
    }

    pub fn marginalize(&self, vars: &[String]) -> LogTableFactor {
        let (variables, log_values) = eliminate_axes(&self.variables, &self.log_values, vars, |lane| {
            log_sum_exp(lane.iter())
        });
        Self {
            variables,
            log_values,
        }
    }

    pub fn max_marginalize(&self, vars: &[String]) -> LogTableFactor {
        let (variables, log_values) = eliminate_axes(&self.variables, &self.log_values, vars, |lane| {
            lane.iter().fold(f64::NEG_INFINITY, |acc, &x| acc.max(x))
        });
        Self {
            variables,
            log_values,
        }
    }

    /// Negated log weights; `-inf` (zero weight) stays `-inf`.
    pub fn inverse(&self) -> LogTableFactor {
        Self {
            variables: self.variables.clone(),
            log_values: self
                .log_values
                .mapv(|x| if x == f64::NEG_INFINITY { x } else { -x }),
        }
    }

    pub fn conditional(&self, assignment: &Assignment) -> Result<LogTableFactor> {
        let (variables, log_values) =
            condition_axes(&self.variables, &self.log_values, assignment)?;
        Ok(Self {
            variables,
            log_values,
        })
    }

    /// Log weight of a full assignment to the factor's variables.
    pub fn log_value(&self, assignment: &Assignment) -> Result<f64> {
        let index = assignment_index(&self.variables, self.log_values.shape(), assignment)?;
        self.log_values
            .get(index.as_slice())
            .copied()
            .ok_or_else(|| PgmError::InvalidAssignment(assignment.to_string()))
    }

    /// ln of the sum of all weights.
    pub fn log_total(&self) -> f64 {
        log_sum_exp(self.log_values.iter())
    }

    pub fn size(&self) -> usize {
        self.log_values
            .iter()
            .filter(|&&v| v != f64::NEG_INFINITY)
            .count()
    }

    /// The `k` highest-weight assignments, best first, with their log weights.
    pub fn most_likely_assignments(&self, k: usize) -> Vec<(Assignment, f64)> {
        top_entries(&self.variables, &self.log_values, k, f64::NEG_INFINITY)
    }

    /// Exponentiate back into a linear-space table.
    pub fn to_linear(&self) -> TableFactor {
        TableFactor::from_parts(self.variables.clone(), self.log_values.mapv(f64::exp))
    }
}

impl From<&TableFactor> for LogTableFactor {
    fn from(factor: &TableFactor) -> Self {
        Self {
            variables: factor.variables().to_vec(),
            log_values: factor.values().mapv(f64::ln),
        }
    }
}

/// ln ∑ exp(xᵢ), stable for large magnitudes. Empty or all `-inf` input is `-inf`.
pub(crate) fn log_sum_exp<'a, I>(values: I) -> f64
where
    I: IntoIterator<Item = &'a f64>,
    I::IntoIter: Clone,
{
    let iter = values.into_iter();
    let max = iter.clone().fold(f64::NEG_INFINITY, |acc, &x| acc.max(x));
    if max == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    max + iter.map(|&x| (x - max).exp()).sum::<f64>().ln()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn vars(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_log_sum_exp_handles_large_values() {
        let values = [1000.0, 1000.0];
        assert_abs_diff_eq!(log_sum_exp(values.iter()), 1000.0 + 2f64.ln(), epsilon = 1e-9);
        let zeros = [f64::NEG_INFINITY, f64::NEG_INFINITY];
        assert_eq!(log_sum_exp(zeros.iter()), f64::NEG_INFINITY);
    }

    #[test]
    fn test_conversion_preserves_zeros() {
        let table = TableFactor::from_shape_vec(vars(&["x"]), vec![3], vec![2.0, 0.0, 1.0]).unwrap();
        let log = LogTableFactor::from(&table);
        assert_eq!(log.log_values()[[1]], f64::NEG_INFINITY);
        assert_eq!(log.size(), 2);

        let back = log.to_linear();
        assert_abs_diff_eq!(back.values()[[0]], 2.0, epsilon = 1e-12);
        assert_eq!(back.values()[[1]], 0.0);
    }

    #[test]
    fn test_product_and_marginalize_match_linear() {
        let a = TableFactor::from_shape_vec(vars(&["x", "y"]), vec![2, 2], vec![2.0, 1.0, 1.0, 2.0])
            .unwrap();
        let b = TableFactor::from_shape_vec(vars(&["y", "z"]), vec![2, 2], vec![1.0, 1.0, 1.0, 3.0])
            .unwrap();
        let linear = a.product(&b).unwrap().marginalize(&vars(&["y"]));
        let log = LogTableFactor::from(&a)
            .product(&LogTableFactor::from(&b))
            .unwrap()
            .marginalize(&vars(&["y"]));

        assert_eq!(linear.variables(), log.variables());
        for (l, g) in linear.values().iter().zip(log.log_values().iter()) {
            assert_abs_diff_eq!(l.ln(), *g, epsilon = 1e-12);
        }
        assert_abs_diff_eq!(log.log_total(), 18f64.ln(), epsilon = 1e-12);
    }

    #[test]
    fn test_inverse_keeps_neg_infinity() {
        let log = LogTableFactor::from_shape_vec(vars(&["x"]), vec![2], vec![f64::NEG_INFINITY, 0.5])
            .unwrap();
        let inv = log.inverse();
        assert_eq!(inv.log_values()[[0]], f64::NEG_INFINITY);
        assert_abs_diff_eq!(inv.log_values()[[1]], -0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_rejects_positive_infinity() {
        assert!(LogTableFactor::from_shape_vec(vars(&["x"]), vec![1], vec![f64::INFINITY]).is_err());
        assert!(LogTableFactor::from_shape_vec(vars(&["x"]), vec![1], vec![f64::NAN]).is_err());
    }
}
