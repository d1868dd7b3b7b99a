use std::sync::Arc;

use smallvec::SmallVec;
use tgraph_shape::{normalize_axes, AxisRule, CheckShapes, DynamicDimension, Shape, ShapeError};

use crate::module::Module;
use crate::operator::{AxisValues, OpAttributes, Operator, SharedOperator};

/// Sum over `axes`, keeping each reduced dimension with size 1.
///
/// An empty `axes` list reduces over every dimension.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReduceSum {
    pub axes: AxisValues,
}

impl ReduceSum {
    pub fn new(axes: &[i64]) -> ReduceSum {
        ReduceSum {
            axes: axes.iter().copied().collect(),
        }
    }
}

impl Operator for ReduceSum {
    fn name(&self) -> &str {
        "reduce_sum"
    }

    fn compute_shape(&self, inputs: &[Shape], _: &[&Module]) -> Result<Shape, ShapeError> {
        CheckShapes::new(inputs).has(1)?.no_tuples()?;
        let input = &inputs[0];
        let mut axes = normalize_axes(&self.axes, input.ndim(), AxisRule::DIMENSION).map_err(
            |err| ShapeError::InvalidAttribute {
                attribute: "axes",
                reason: err.to_string(),
            },
        )?;
        if axes.is_empty() {
            axes = (0..input.ndim()).collect();
        }

        let reduced = |dim: usize| axes.contains(&dim);
        if input.is_dynamic() {
            let dims: SmallVec<[DynamicDimension; 4]> = input
                .dyn_dims()
                .iter()
                .enumerate()
                .map(|(i, &d)| if reduced(i) { DynamicDimension::fixed(1) } else { d })
                .collect();
            return Ok(Shape::dynamic(input.dtype(), &dims));
        }

        let lens: SmallVec<[usize; 4]> = input
            .lens()
            .iter()
            .enumerate()
            .map(|(i, &len)| if reduced(i) { 1 } else { len })
            .collect();
        Ok(Shape::new(input.dtype(), &lens))
    }

    fn attributes(&self) -> OpAttributes {
        OpAttributes {
            normalize_axes: vec![("axes", AxisRule::DIMENSION)],
        }
    }

    fn axis_attribute(&self, name: &str) -> Option<AxisValues> {
        (name == "axes").then(|| self.axes.clone())
    }

    fn with_axis_attribute(&self, name: &str, values: &[i64]) -> Option<SharedOperator> {
        (name == "axes").then(|| -> SharedOperator { Arc::new(ReduceSum::new(values)) })
    }
}
