//! Dense weight tables over named discrete variables.
//!
//! A [`TableFactor`] stores one non-negative weight per joint assignment of its
//! variables in an `ArrayD<f64>` whose axes follow the order of
//! [`TableFactor::variables`]. Binary operations align axes by variable name,
//! so two factors never need to agree on axis order.

use scirs2_core::ndarray::{ArrayD, ArrayView1, ArrayViewD, Axis, Dimension, IxDyn, Zip};
use std::collections::BTreeSet;

use crate::assignment::Assignment;
use crate::error::{PgmError, Result};

/// Dense factor φ(X₁, ..., Xₖ) → ℝ⁺ stored in linear space.
#[derive(Clone, Debug, PartialEq)]
pub struct TableFactor {
    variables: Vec<String>,
    values: ArrayD<f64>,
}

impl TableFactor {
    /// Create a new factor, validating shape and weights.
    pub fn new(variables: Vec<String>, values: ArrayD<f64>) -> Result<Self> {
        check_axes(&variables, values.shape())?;
        if let Some(bad) = values.iter().find(|v| !(v.is_finite() && **v >= 0.0)) {
            return Err(PgmError::InvalidDistribution(format!(
                "factor weights must be finite and non-negative, found {}",
                bad
            )));
        }
        Ok(Self { variables, values })
    }

    /// Create a factor from a row-major list of weights.
    pub fn from_shape_vec(variables: Vec<String>, shape: Vec<usize>, data: Vec<f64>) -> Result<Self> {
        let values = ArrayD::from_shape_vec(IxDyn(&shape), data)
            .map_err(|e| PgmError::InvalidDistribution(format!("Array creation failed: {}", e)))?;
        Self::new(variables, values)
    }

    /// Factor assigning weight 1 to every assignment.
    pub fn ones(variables: Vec<String>, shape: Vec<usize>) -> Result<Self> {
        check_axes(&variables, &shape)?;
        Ok(Self {
            variables,
            values: ArrayD::from_elem(IxDyn(&shape), 1.0),
        })
    }

    /// Factor over no variables holding a single weight.
    pub fn scalar(value: f64) -> Result<Self> {
        Self::new(Vec::new(), ArrayD::from_elem(IxDyn(&[]), value))
    }

    pub(crate) fn from_parts(variables: Vec<String>, values: ArrayD<f64>) -> Self {
        Self { variables, values }
    }

    /// Variables in axis order.
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// The weight table.
    pub fn values(&self) -> &ArrayD<f64> {
        &self.values
    }

    /// Cardinality of `var`, if the factor mentions it.
    pub fn cardinality(&self, var: &str) -> Option<usize> {
        self.variables
            .iter()
            .position(|v| v == var)
            .map(|idx| self.values.shape()[idx])
    }

    /// φ₁ · φ₂ over the union of both scopes.
    pub fn product(&self, other: &TableFactor) -> Result<TableFactor> {
        let (variables, values) = combine(
            &self.variables,
            &self.values,
            &other.variables,
            &other.values,
            |a, b| a * b,
        )?;
        Ok(Self { variables, values })
    }

    /// Multiply every weight by a non-negative constant.
    pub fn scale(&self, constant: f64) -> Result<TableFactor> {
        if !(constant.is_finite() && constant >= 0.0) {
            return Err(PgmError::InvalidDistribution(format!(
                "cannot scale a factor by {}",
                constant
            )));
        }
        Ok(Self {
            variables: self.variables.clone(),
            values: self.values.mapv(|x| x * constant),
        })
    }

    /// ∑ over `vars`. Variables outside the scope are ignored.
    pub fn marginalize(&self, vars: &[String]) -> TableFactor {
        let (variables, values) =
            eliminate_axes(&self.variables, &self.values, vars, |lane| lane.sum());
        Self { variables, values }
    }

    /// max over `vars`. Variables outside the scope are ignored.
    pub fn max_marginalize(&self, vars: &[String]) -> TableFactor {
        let (variables, values) = eliminate_axes(&self.variables, &self.values, vars, |lane| {
            lane.iter().fold(f64::NEG_INFINITY, |acc, &x| acc.max(x))
        });
        Self { variables, values }
    }

    /// Elementwise 1/φ, with 1/0 defined as 0.
    pub fn inverse(&self) -> TableFactor {
        Self {
            variables: self.variables.clone(),
            values: self
                .values
                .mapv(|x| if x == 0.0 { 0.0 } else { 1.0 / x }),
        }
    }

    /// Slice the table at the values `assignment` gives to variables in scope.
    pub fn conditional(&self, assignment: &Assignment) -> Result<TableFactor> {
        let (variables, values) = condition_axes(&self.variables, &self.values, assignment)?;
        Ok(Self { variables, values })
    }

    /// Weight of a full assignment to the factor's variables.
    pub fn value(&self, assignment: &Assignment) -> Result<f64> {
        let index = assignment_index(&self.variables, self.values.shape(), assignment)?;
        self.values
            .get(index.as_slice())
            .copied()
            .ok_or_else(|| PgmError::InvalidAssignment(assignment.to_string()))
    }

    /// Sum of all weights.
    pub fn total(&self) -> f64 {
        self.values.sum()
    }

    /// Number of assignments with non-zero weight.
    pub fn size(&self) -> usize {
        self.values.iter().filter(|&&v| v != 0.0).count()
    }

    /// The `k` highest-weight assignments with non-zero weight, best first.
    pub fn most_likely_assignments(&self, k: usize) -> Vec<(Assignment, f64)> {
        top_entries(&self.variables, &self.values, k, 0.0)
    }
}

/// Validate that `variables` names the axes of an array with `shape`.
pub(crate) fn check_axes(variables: &[String], shape: &[usize]) -> Result<()> {
    if variables.len() != shape.len() {
        return Err(PgmError::DimensionMismatch {
            expected: vec![variables.len()],
            got: vec![shape.len()],
        });
    }
    let distinct: BTreeSet<&String> = variables.iter().collect();
    if distinct.len() != variables.len() {
        return Err(PgmError::InvalidDistribution(format!(
            "duplicate variables in factor scope {:?}",
            variables
        )));
    }
    if let Some(axis) = shape.iter().position(|&card| card == 0) {
        return Err(PgmError::InvalidDistribution(format!(
            "variable {} has cardinality 0",
            variables[axis]
        )));
    }
    Ok(())
}

/// View of `values` with axes permuted into `target` order and a unit axis
/// inserted for every target variable outside `variables`.
fn aligned_view<'a>(
    variables: &[String],
    values: &'a ArrayD<f64>,
    target: &[String],
) -> Result<ArrayViewD<'a, f64>> {
    let order: Vec<usize> = target
        .iter()
        .filter_map(|var| variables.iter().position(|v| v == var))
        .collect();
    if order.len() != variables.len() {
        return Err(PgmError::InvalidGraph(format!(
            "{:?} does not cover {:?}",
            target, variables
        )));
    }

    let mut view = values.view().permuted_axes(IxDyn(&order));
    for (position, var) in target.iter().enumerate() {
        if !variables.contains(var) {
            view = view.insert_axis(Axis(position));
        }
    }
    Ok(view)
}

/// Apply `op` elementwise over the union scope of two tables.
///
/// The result keeps the left operand's axes first, followed by the right
/// operand's remaining axes.
pub(crate) fn combine<F>(
    lhs_vars: &[String],
    lhs: &ArrayD<f64>,
    rhs_vars: &[String],
    rhs: &ArrayD<f64>,
    op: F,
) -> Result<(Vec<String>, ArrayD<f64>)>
where
    F: Fn(f64, f64) -> f64,
{
    let mut variables = lhs_vars.to_vec();
    let mut shape = lhs.shape().to_vec();
    for (axis, var) in rhs_vars.iter().enumerate() {
        let card = rhs.shape()[axis];
        match lhs_vars.iter().position(|v| v == var) {
            Some(lhs_axis) if lhs.shape()[lhs_axis] != card => {
                return Err(PgmError::DimensionMismatch {
                    expected: vec![lhs.shape()[lhs_axis]],
                    got: vec![card],
                });
            }
            Some(_) => {}
            None => {
                variables.push(var.clone());
                shape.push(card);
            }
        }
    }

    let lhs_view = aligned_view(lhs_vars, lhs, &variables)?;
    let rhs_view = aligned_view(rhs_vars, rhs, &variables)?;
    let broadcast_error = || PgmError::DimensionMismatch {
        expected: shape.clone(),
        got: rhs.shape().to_vec(),
    };
    let lhs_full = lhs_view
        .broadcast(IxDyn(&shape))
        .ok_or_else(broadcast_error)?;
    let rhs_full = rhs_view
        .broadcast(IxDyn(&shape))
        .ok_or_else(broadcast_error)?;

    let values = Zip::from(&lhs_full)
        .and(&rhs_full)
        .map_collect(|&a, &b| op(a, b));
    Ok((variables, values))
}

/// Reduce every axis named in `eliminate` with `reduce`.
pub(crate) fn eliminate_axes<F>(
    variables: &[String],
    values: &ArrayD<f64>,
    eliminate: &[String],
    reduce: F,
) -> (Vec<String>, ArrayD<f64>)
where
    F: Fn(ArrayView1<'_, f64>) -> f64,
{
    let mut axes: Vec<usize> = eliminate
        .iter()
        .filter_map(|var| variables.iter().position(|v| v == var))
        .collect();
    axes.sort_unstable();
    axes.dedup();

    let mut result = values.clone();
    for &axis in axes.iter().rev() {
        result = result.map_axis(Axis(axis), |lane| reduce(lane));
    }

    let remaining = variables
        .iter()
        .enumerate()
        .filter(|(axis, _)| axes.binary_search(axis).is_err())
        .map(|(_, var)| var.clone())
        .collect();
    (remaining, result)
}

/// Fix the axes of every assigned variable at its value.
pub(crate) fn condition_axes(
    variables: &[String],
    values: &ArrayD<f64>,
    assignment: &Assignment,
) -> Result<(Vec<String>, ArrayD<f64>)> {
    let mut fixed = Vec::new();
    for (axis, var) in variables.iter().enumerate() {
        if let Some(value) = assignment.get(var) {
            let card = values.shape()[axis];
            if value >= card {
                return Err(PgmError::InvalidAssignment(format!(
                    "Value {} out of bounds for variable {} with cardinality {}",
                    value, var, card
                )));
            }
            fixed.push((axis, value));
        }
    }

    let mut result = values.clone();
    for &(axis, value) in fixed.iter().rev() {
        result = result.index_axis(Axis(axis), value).to_owned();
    }

    let remaining = variables
        .iter()
        .filter(|var| !assignment.contains(var))
        .cloned()
        .collect();
    Ok((remaining, result))
}

/// Array index of a full assignment to `variables`.
pub(crate) fn assignment_index(
    variables: &[String],
    shape: &[usize],
    assignment: &Assignment,
) -> Result<Vec<usize>> {
    variables
        .iter()
        .zip(shape)
        .map(|(var, &card)| {
            let value = assignment
                .get(var)
                .ok_or_else(|| PgmError::VariableNotFound(var.clone()))?;
            if value >= card {
                return Err(PgmError::InvalidAssignment(format!(
                    "Value {} out of bounds for variable {} with cardinality {}",
                    value, var, card
                )));
            }
            Ok(value)
        })
        .collect()
}

/// Highest entries strictly above `floor`, best first; ties keep row-major order.
pub(crate) fn top_entries(
    variables: &[String],
    values: &ArrayD<f64>,
    k: usize,
    floor: f64,
) -> Vec<(Assignment, f64)> {
    let mut entries: Vec<(Vec<usize>, f64)> = values
        .indexed_iter()
        .filter(|(_, &v)| v > floor)
        .map(|(idx, &v)| (idx.slice().to_vec(), v))
        .collect();
    entries.sort_by(|a, b| b.1.total_cmp(&a.1));
    entries.truncate(k);

    entries
        .into_iter()
        .map(|(index, v)| {
            let assignment = variables.iter().cloned().zip(index).collect();
            (assignment, v)
        })
        .collect()
}
