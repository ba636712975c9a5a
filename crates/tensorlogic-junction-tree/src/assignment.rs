//! Assignments of values to discrete variables.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{PgmError, Result};

/// A (partial) assignment of values to named discrete variables.
///
/// Backed by an ordered map so that iteration, display and equality are
/// independent of insertion order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Assignment {
    values: BTreeMap<String, usize>,
}

impl Assignment {
    /// The empty assignment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an assignment from `(variable, value)` pairs.
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, usize)>,
        S: Into<String>,
    {
        pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
    }

    /// Value assigned to `var`, if any.
    pub fn get(&self, var: &str) -> Option<usize> {
        self.values.get(var).copied()
    }

    /// Assign `value` to `var`, returning the previous value.
    pub fn insert(&mut self, var: impl Into<String>, value: usize) -> Option<usize> {
        self.values.insert(var.into(), value)
    }

    /// Whether `var` is assigned.
    pub fn contains(&self, var: &str) -> bool {
        self.values.contains_key(var)
    }

    /// Whether every variable in `vars` is assigned.
    pub fn contains_all<S: AsRef<str>>(&self, vars: &[S]) -> bool {
        vars.iter().all(|v| self.contains(v.as_ref()))
    }

    /// Number of assigned variables.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no variable is assigned.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over `(variable, value)` pairs in variable order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, usize)> {
        self.values.iter().map(|(k, v)| (k, *v))
    }

    /// Assigned variable names in order.
    pub fn variable_names(&self) -> impl Iterator<Item = &String> {
        self.values.keys()
    }

    /// Combine two assignments.
    ///
    /// Fails if both assign the same variable to different values.
    pub fn union(&self, other: &Assignment) -> Result<Assignment> {
        let mut merged = self.clone();
        for (var, value) in other.iter() {
            match merged.values.get(var) {
                Some(&existing) if existing != value => {
                    return Err(PgmError::InvalidAssignment(format!(
                        "conflicting values for {}: {} and {}",
                        var, existing, value
                    )));
                }
                _ => {
                    merged.values.insert(var.clone(), value);
                }
            }
        }
        Ok(merged)
    }

    /// The sub-assignment over the variables in `vars`.
    pub fn restrict<S: AsRef<str>>(&self, vars: &[S]) -> Assignment {
        vars.iter()
            .filter_map(|v| {
                let name = v.as_ref();
                self.get(name).map(|value| (name.to_string(), value))
            })
            .collect()
    }
}

impl FromIterator<(String, usize)> for Assignment {
    fn from_iter<T: IntoIterator<Item = (String, usize)>>(iter: T) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for Assignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (var, value)) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", var, value)?;
        }
        write!(f, "}}")
    }
}
