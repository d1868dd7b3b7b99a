use crate::DataType;

/// Errors reported when an operator's shape preconditions are not met.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum ShapeError {
    /// Too many or too few inputs were provided.
    #[error("expected {expected} inputs, got {actual}")]
    IncorrectInputCount { expected: String, actual: usize },

    /// An input's rank does not match that expected by the operator.
    #[error("input {index} has rank {actual}, expected {expected}")]
    IncorrectRank {
        index: usize,
        expected: String,
        actual: usize,
    },

    /// Inputs have different element types.
    #[error("element type mismatch: {0} vs {1}")]
    TypeMismatch(DataType, DataType),

    /// An element type is not supported by the operator.
    #[error("unsupported element type {0}")]
    UnsupportedType(DataType),

    /// The input shapes are incompatible with each other or with attributes.
    #[error("incompatible shapes: {0}")]
    IncompatibleShapes(String),

    /// An input is required to have a standard (packed, row-major) layout.
    #[error("input {0} is not standard")]
    NotStandard(usize),

    /// An input is required to not be broadcast.
    #[error("input {0} is broadcast")]
    Broadcasted(usize),

    /// The operator does not support this combination of dynamic inputs.
    #[error("unsupported dynamic shape: {0}")]
    UnsupportedDynamic(String),

    /// An attribute has a value which is invalid for the given inputs.
    #[error("invalid attribute `{attribute}`: {reason}")]
    InvalidAttribute {
        attribute: &'static str,
        reason: String,
    },

    /// The operator requires a different number of submodules.
    #[error("expected {expected} submodules, got {actual}")]
    IncorrectSubmoduleCount { expected: usize, actual: usize },
}

/// An axis attribute is outside the range allowed by its normalization rule.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("axis {value} out of range [{min}, {max}] for rank {rank}")]
pub struct AxisError {
    pub value: i64,
    pub rank: usize,
    pub min: i64,
    pub max: i64,
}
