//! Error type shared by every fallible operation in the crate.

/// Errors raised by the matrix backend, the autograd graph and the trainer.
#[derive(thiserror::Error, Debug)]
pub enum GradError {
    /// Two operands have incompatible shapes for `op`.
    #[error("shape mismatch in {op}: {lhs:?} vs {rhs:?}")]
    ShapeMismatch {
        op: &'static str,
        lhs: (usize, usize),
        rhs: (usize, usize),
    },

    /// `backward` was called on something other than a single number.
    #[error("backward requires a scalar output, got shape {0:?}")]
    NotScalar((usize, usize)),

    /// `backward` was called on a node that has no recorded operation.
    #[error("no graph recorded for node {0}")]
    NoGraph(usize),

    /// A `Var` handle that does not belong to this graph.
    #[error("unknown graph node {0}")]
    UnknownNode(usize),

    /// A `ParamId` that does not belong to this parameter store.
    #[error("unknown parameter {0}")]
    UnknownParameter(usize),

    /// A target class index is outside the width of the prediction rows.
    #[error("class index {index} at row {row} is out of range for {classes} classes")]
    ClassOutOfRange {
        row: usize,
        index: usize,
        classes: usize,
    },

    /// Predictions and targets disagree on the number of examples.
    #[error("batch size mismatch: {predictions} predictions vs {targets} targets")]
    BatchMismatch { predictions: usize, targets: usize },

    /// Malformed samples or labels handed to a data source.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Rejected hyperparameters or model description.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Result type for crate operations.
pub type Result<T> = std::result::Result<T, GradError>;
