//! Higher-order operators whose computation is described by a submodule.

use tgraph_shape::{broadcast_shapes, CheckShapes, Shape, ShapeError};

use crate::module::Module;
use crate::operator::{Operator, SharedOperator};

fn single_submodule<'a>(submodules: &[&'a Module]) -> Result<&'a Module, ShapeError> {
    match submodules {
        [module] => Ok(module),
        _ => Err(ShapeError::IncorrectSubmoduleCount {
            expected: 1,
            actual: submodules.len(),
        }),
    }
}

fn single_output(module: &Module) -> Result<Shape, ShapeError> {
    match module.output_shapes().as_slice() {
        [shape] => Ok(shape.clone()),
        outputs => Err(ShapeError::IncompatibleShapes(format!(
            "submodule `{}` must return one value, returns {}",
            module.name(),
            outputs.len()
        ))),
    }
}

/// Apply the scalar computation described by a submodule to each element of
/// the broadcast inputs.
///
/// The submodule has one parameter per input, in parameter-name order. The
/// output has the broadcast shape of the inputs and the element type
/// returned by the submodule.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Pointwise {}

impl Operator for Pointwise {
    fn name(&self) -> &str {
        "pointwise"
    }

    fn compute_shape(&self, inputs: &[Shape], submodules: &[&Module]) -> Result<Shape, ShapeError> {
        let body = single_submodule(submodules)?;
        CheckShapes::new(inputs).has_at_least(1)?.no_tuples()?;
        let params = body.parameter_names();
        if params.len() != inputs.len() {
            return Err(ShapeError::IncorrectInputCount {
                expected: params.len().to_string(),
                actual: inputs.len(),
            });
        }
        let output_type = single_output(body)?.dtype();

        let mut shape = inputs[0].clone();
        for input in &inputs[1..] {
            shape = broadcast_shapes(&shape, input)?;
        }
        Ok(shape.as_standard().with_type(output_type))
    }

    fn is_pointwise(&self) -> bool {
        true
    }
}

/// An anchor operator fused with the pointwise operations that consume it,
/// to be code-generated as a single kernel.
///
/// The computation is described by a bypass submodule. Inputs are passed to
/// the submodule's parameters in parameter-name order, and each parameter
/// shape must equal the shape of the corresponding input.
#[derive(Clone, Debug)]
pub struct FusedKernel {
    anchor: SharedOperator,
}

impl FusedKernel {
    pub fn new(anchor: SharedOperator) -> FusedKernel {
        FusedKernel { anchor }
    }

    /// Return the operator which the kernel was formed around.
    pub fn anchor(&self) -> &SharedOperator {
        &self.anchor
    }
}

impl Operator for FusedKernel {
    fn name(&self) -> &str {
        "fused_kernel"
    }

    fn compute_shape(&self, inputs: &[Shape], submodules: &[&Module]) -> Result<Shape, ShapeError> {
        let body = single_submodule(submodules)?;
        CheckShapes::new(inputs).has_at_least(2)?;
        if !body.is_bypass() {
            return Err(ShapeError::InvalidAttribute {
                attribute: "submodule",
                reason: format!("`{}` is not a bypass module", body.name()),
            });
        }

        let params = body.parameter_shapes();
        if params.len() != inputs.len() {
            return Err(ShapeError::IncorrectInputCount {
                expected: params.len().to_string(),
                actual: inputs.len(),
            });
        }
        for (index, (param, input)) in params.iter().zip(inputs).enumerate() {
            if param != input {
                return Err(ShapeError::IncompatibleShapes(format!(
                    "input {} has shape [{}] but parameter expects [{}]",
                    index, input, param
                )));
            }
        }
        single_output(body)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tgraph_shape::{DataType, Shape, ShapeError};

    use super::{FusedKernel, Pointwise};
    use crate::module::Module;
    use crate::operator::Operator;
    use crate::ops::{Add, Dot, Relu};

    fn add_body() -> Module {
        let mut body = Module::new("pointwise0");
        let x0 = body.add_parameter("x0", Shape::scalar(DataType::Float)).unwrap();
        let x1 = body.add_parameter("x1", Shape::scalar(DataType::Float)).unwrap();
        let sum = body.add_instruction(Add {}, &[x0, x1]).unwrap();
        body.add_return(&[sum]).unwrap();
        body
    }

    #[test]
    fn test_pointwise_shape() {
        let body = add_body();
        let op = Pointwise {};

        let shape = op
            .compute_shape(
                &[
                    Shape::with_strides(DataType::Float, &[2, 3], &[1, 2]),
                    Shape::new(DataType::Float, &[3]),
                ],
                &[&body],
            )
            .unwrap();
        assert_eq!(shape, Shape::new(DataType::Float, &[2, 3]));

        let err = op
            .compute_shape(&[Shape::new(DataType::Float, &[3])], &[&body])
            .unwrap_err();
        assert!(matches!(err, ShapeError::IncorrectInputCount { .. }));

        let err = op
            .compute_shape(&[Shape::new(DataType::Float, &[3])], &[])
            .unwrap_err();
        assert_eq!(
            err,
            ShapeError::IncorrectSubmoduleCount {
                expected: 1,
                actual: 0
            }
        );
    }

    #[test]
    fn test_fused_kernel_shape() {
        let a = Shape::new(DataType::Float, &[2, 3]);
        let b = Shape::new(DataType::Float, &[3, 4]);

        let mut body = Module::new("mlir_pointwise0");
        let x0 = body.add_parameter("x0", a.clone()).unwrap();
        let x1 = body.add_parameter("x1", b.clone()).unwrap();
        let product = body.add_instruction(Dot {}, &[x0, x1]).unwrap();
        let out = body.add_instruction(Relu {}, &[product]).unwrap();
        body.add_return(&[out]).unwrap();

        let op = FusedKernel::new(Arc::new(Dot {}));
        assert_eq!(op.anchor().name(), "dot");

        // The body must be marked as describing a kernel.
        let err = op
            .compute_shape(&[a.clone(), b.clone()], &[&body])
            .unwrap_err();
        assert!(matches!(err, ShapeError::InvalidAttribute { .. }));

        body.set_bypass(true);
        let shape = op.compute_shape(&[a.clone(), b.clone()], &[&body]).unwrap();
        assert_eq!(shape, Shape::new(DataType::Float, &[2, 4]));

        let err = op.compute_shape(&[b.clone(), a.clone()], &[&body]).unwrap_err();
        assert!(matches!(err, ShapeError::IncompatibleShapes(_)));
    }
}
