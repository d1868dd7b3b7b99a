//! The [`Operator`] trait for defining operations in a [`Module`].
use std::any::Any;
use std::fmt::Debug;
use std::sync::Arc;

use smallvec::SmallVec;
use tgraph_shape::{normalize_axes, AxisRule, Shape, ShapeError};

use crate::error::ConfigError;
use crate::module::Module;

/// Shared handle to an operator. Instructions and copies of instructions
/// share the same operator value.
pub type SharedOperator = Arc<dyn Operator + Send + Sync>;

/// Attribute values of an operator which index into the dimensions of its
/// first input.
pub type AxisValues = SmallVec<[i64; 4]>;

/// Static properties of an operator which are used when it is inserted into a
/// module.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OpAttributes {
    /// Axis attributes which are normalized against the rank of the first
    /// input, and the range each one is allowed to take.
    pub normalize_axes: Vec<(&'static str, AxisRule)>,
}

/// An operation in a computation graph.
///
/// Operators describe what an instruction computes. They do not execute
/// anything; the compiler only needs to know how the output shape of an
/// instruction is derived from its inputs, and a few properties used by
/// optimization passes.
pub trait Operator: Any + Debug {
    /// Return the name of the operator, used for pattern matching and
    /// printing.
    fn name(&self) -> &str;

    /// Compute the output shape for the given input shapes.
    ///
    /// `submodules` contains the modules attached to the instruction, for
    /// higher-order operators such as `pointwise`.
    fn compute_shape(&self, inputs: &[Shape], submodules: &[&Module]) -> Result<Shape, ShapeError>;

    /// Return properties used when the operator is added to a module.
    fn attributes(&self) -> OpAttributes {
        OpAttributes::default()
    }

    /// Return the current values of an axis attribute listed in
    /// [`OpAttributes::normalize_axes`].
    fn axis_attribute(&self, #[allow(unused)] name: &str) -> Option<AxisValues> {
        None
    }

    /// Return a copy of this operator with an axis attribute replaced.
    fn with_axis_attribute(
        &self,
        #[allow(unused)] name: &str,
        #[allow(unused)] values: &[i64],
    ) -> Option<SharedOperator> {
        None
    }

    /// Return true if this operator is applied independently to each element
    /// of its (broadcast) inputs.
    fn is_pointwise(&self) -> bool {
        false
    }

    /// Return true if the inputs of this operator can be swapped without
    /// changing the result.
    fn is_commutative(&self) -> bool {
        false
    }

    /// Return the index of the input whose buffer the output is a view of,
    /// if any.
    fn output_alias(&self) -> Option<usize> {
        None
    }
}

impl dyn Operator + Send + Sync {
    /// Downcast this operator to a concrete type.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        (self as &dyn Any).downcast_ref()
    }

    /// Return true if this operator has the concrete type `T`.
    pub fn is<T: Any>(&self) -> bool {
        (self as &dyn Any).is::<T>()
    }
}

/// Resolve negative or otherwise denormalized axis attributes of `op` against
/// the rank of its first input.
///
/// Returns `None` if the operator is already normalized.
pub(crate) fn normalize_operator(
    op: &(dyn Operator + Send + Sync),
    inputs: &[Shape],
) -> Result<Option<SharedOperator>, ConfigError> {
    let attrs = op.attributes();
    if attrs.normalize_axes.is_empty() {
        return Ok(None);
    }
    let rank = inputs.first().map(|s| s.ndim()).unwrap_or(0);

    let mut normalized: Option<SharedOperator> = None;
    for (attribute, rule) in attrs.normalize_axes {
        let current = normalized.as_deref().unwrap_or(op);
        let Some(values) = current.axis_attribute(attribute) else {
            continue;
        };
        let resolved: AxisValues = normalize_axes(&values, rank, rule)
            .map_err(|source| ConfigError::InvalidAxis {
                op: op.name().to_string(),
                attribute,
                source,
            })?
            .into_iter()
            .map(|axis| axis as i64)
            .collect();
        if resolved == values {
            continue;
        }
        let updated = current.with_axis_attribute(attribute, &resolved);
        if updated.is_some() {
            normalized = updated;
        }
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tgraph_shape::{AxisError, DataType, Shape};

    use super::{normalize_operator, Operator, SharedOperator};
    use crate::error::ConfigError;
    use crate::ops::{Add, Flatten, ReduceSum, Relu};

    #[test]
    fn test_downcast_operator() {
        let add: SharedOperator = Arc::new(Add {});
        let relu: SharedOperator = Arc::new(Relu {});

        assert!(add.downcast_ref::<Add>().is_some());
        assert!(add.downcast_ref::<Relu>().is_none());
        assert!(relu.is::<Relu>());
    }

    #[test]
    fn test_normalize_operator() {
        let input = [Shape::new(DataType::Float, &[2, 3, 4])];

        let flatten = Flatten { axis: -1 };
        let normalized = normalize_operator(&flatten, &input).unwrap().unwrap();
        assert_eq!(normalized.downcast_ref::<Flatten>().map(|f| f.axis), Some(2));

        // Already normalized operators are returned as-is.
        let flatten = Flatten { axis: 3 };
        assert!(normalize_operator(&flatten, &input).unwrap().is_none());

        // Operators without axis attributes are never rewritten.
        assert!(normalize_operator(&Relu {}, &input).unwrap().is_none());

        let reduce = ReduceSum::new(&[-1, 0]);
        let normalized = normalize_operator(&reduce, &input).unwrap().unwrap();
        assert_eq!(
            normalized
                .downcast_ref::<ReduceSum>()
                .map(|r| r.axes.to_vec()),
            Some(vec![2, 0])
        );
    }

    #[test]
    fn test_normalize_operator_out_of_range() {
        let input = [Shape::new(DataType::Float, &[2, 3, 4])];

        // Flatten allows an axis equal to the rank, reductions do not.
        let err = normalize_operator(&Flatten { axis: 4 }, &input).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidAxis {
                op: "flatten".into(),
                attribute: "axis",
                source: AxisError {
                    value: 4,
                    rank: 3,
                    min: 0,
                    max: 3
                }
            }
        );
        let err = normalize_operator(&ReduceSum::new(&[3]), &input).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidAxis { .. }));
        assert_eq!(Flatten { axis: 0 }.name(), "flatten");
    }
}
