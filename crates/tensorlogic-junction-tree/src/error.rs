//! Error types for junction tree inference.

use thiserror::Error;

/// Errors that can occur while building factor graphs or running inference.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PgmError {
    /// Variable not found in factor graph or factor
    #[error("Variable not found: {0}")]
    VariableNotFound(String),

    /// Dimension mismatch in tensor operations
    #[error("Dimension mismatch: expected {expected:?}, got {got:?}")]
    DimensionMismatch { expected: Vec<usize>, got: Vec<usize> },

    /// Invalid weight table (negative, NaN, duplicated axes, ...)
    #[error("Invalid distribution: {0}")]
    InvalidDistribution(String),

    /// Assignment that is out of range or conflicts with another assignment
    #[error("Invalid assignment: {0}")]
    InvalidAssignment(String),

    /// Invalid factor graph structure or elimination hint
    #[error("Invalid graph: {0}")]
    InvalidGraph(String),

    /// The factor graph cannot be reduced to a clique tree without fill-in.
    #[error("Could not convert factor graph into a clique tree: {0}")]
    Construction(String),

    /// A message was read before the schedule produced it.
    #[error("Invalid message passing order: message {from} -> {to} has not been computed")]
    InvalidMessageOrder { from: usize, to: usize },

    /// The conditioned evidence has zero probability under the model.
    #[error("Conditioned evidence has zero probability")]
    ZeroProbability,

    /// Operation not permitted in the clique tree's current lifecycle state
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl PgmError {
    /// Whether the error indicates a modelling or programming failure.
    ///
    /// `ZeroProbability` is a legitimate outcome of inference (a training loop
    /// may simply skip the example); everything else is fatal for the call.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, PgmError::ZeroProbability)
    }
}

/// Result type for PGM operations.
pub type Result<T> = std::result::Result<T, PgmError>;
