use tgraph_shape::{broadcast_shapes, CheckShapes, Shape, ShapeError};

use crate::module::Module;
use crate::operator::Operator;

/// Compute the output shape of a binary operator that broadcasts its inputs.
///
/// The output has standard strides and the element type shared by both
/// inputs.
pub(crate) fn binary_op_shape(inputs: &[Shape]) -> Result<Shape, ShapeError> {
    CheckShapes::new(inputs).has(2)?.same_type()?.no_tuples()?;
    broadcast_shapes(&inputs[0], &inputs[1])
}

fn unary_op_shape(inputs: &[Shape]) -> Result<Shape, ShapeError> {
    CheckShapes::new(inputs).has(1)?.no_tuples()?;
    Ok(inputs[0].as_standard())
}

macro_rules! binary_op {
    ($op:ident, $name:literal, commutative: $commutative:literal) => {
        #[derive(Clone, Debug, Default, PartialEq)]
        pub struct $op {}

        impl Operator for $op {
            fn name(&self) -> &str {
                $name
            }

            fn compute_shape(
                &self,
                inputs: &[Shape],
                _: &[&Module],
            ) -> Result<Shape, ShapeError> {
                binary_op_shape(inputs)
            }

            fn is_pointwise(&self) -> bool {
                true
            }

            fn is_commutative(&self) -> bool {
                $commutative
            }
        }
    };
}

binary_op!(Add, "add", commutative: true);
binary_op!(Sub, "sub", commutative: false);
binary_op!(Mul, "mul", commutative: true);
binary_op!(Div, "div", commutative: false);

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Relu {}

impl Operator for Relu {
    fn name(&self) -> &str {
        "relu"
    }

    fn compute_shape(&self, inputs: &[Shape], _: &[&Module]) -> Result<Shape, ShapeError> {
        unary_op_shape(inputs)
    }

    fn is_pointwise(&self) -> bool {
        true
    }
}

/// Rectified linear unit with a slope of `alpha` for negative inputs.
#[derive(Clone, Debug, PartialEq)]
pub struct LeakyRelu {
    pub alpha: f32,
}

impl Default for LeakyRelu {
    fn default() -> LeakyRelu {
        LeakyRelu { alpha: 0.01 }
    }
}

impl Operator for LeakyRelu {
    fn name(&self) -> &str {
        "leaky_relu"
    }

    fn compute_shape(&self, inputs: &[Shape], _: &[&Module]) -> Result<Shape, ShapeError> {
        unary_op_shape(inputs)
    }

    fn is_pointwise(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use tgraph_shape::{DataType, DynamicDimension, Shape, ShapeError};
    use tgraph_testing::TestCases;

    use super::{Add, Div, LeakyRelu, Relu, Sub};
    use crate::operator::Operator;

    #[test]
    fn test_binary_op_shape() {
        #[derive(Debug)]
        struct Case {
            lhs: Shape,
            rhs: Shape,
            expected: Result<Shape, ShapeError>,
        }

        let f32_shape = |lens: &[usize]| Shape::new(DataType::Float, lens);
        let dyn_dim = DynamicDimension::with_optimal(1, 8, 4);

        let cases = [
            Case {
                lhs: f32_shape(&[2, 3]),
                rhs: f32_shape(&[2, 3]),
                expected: Ok(f32_shape(&[2, 3])),
            },
            Case {
                lhs: f32_shape(&[4, 1, 3]),
                rhs: f32_shape(&[5, 1]),
                expected: Ok(f32_shape(&[4, 5, 3])),
            },
            // Scalar literals broadcast against anything.
            Case {
                lhs: f32_shape(&[2, 3]),
                rhs: Shape::scalar(DataType::Float),
                expected: Ok(f32_shape(&[2, 3])),
            },
            Case {
                lhs: Shape::dynamic(DataType::Float, &[dyn_dim, DynamicDimension::fixed(3)]),
                rhs: f32_shape(&[3]),
                expected: Ok(Shape::dynamic(
                    DataType::Float,
                    &[dyn_dim, DynamicDimension::fixed(3)],
                )),
            },
            Case {
                lhs: f32_shape(&[2, 3]),
                rhs: Shape::new(DataType::Half, &[2, 3]),
                expected: Err(ShapeError::TypeMismatch(DataType::Float, DataType::Half)),
            },
            Case {
                lhs: f32_shape(&[2, 3]),
                rhs: f32_shape(&[2, 4]),
                expected: Err(ShapeError::IncompatibleShapes(
                    "cannot broadcast [2, 3] with [2, 4]".into(),
                )),
            },
        ];

        cases.test_each(|case| {
            let inputs = [case.lhs.clone(), case.rhs.clone()];
            assert_eq!(Add {}.compute_shape(&inputs, &[]), case.expected);
            assert_eq!(Div {}.compute_shape(&inputs, &[]), case.expected);
        });
    }

    #[test]
    fn test_unary_op_shape() {
        let transposed = Shape::with_strides(DataType::Float, &[3, 2], &[1, 3]);
        assert_eq!(
            Relu {}.compute_shape(&[transposed.clone()], &[]),
            Ok(Shape::new(DataType::Float, &[3, 2]))
        );
        assert!(LeakyRelu::default()
            .compute_shape(&[transposed.clone(), transposed], &[])
            .is_err());
    }

    #[test]
    fn test_op_properties() {
        assert!(Add {}.is_commutative());
        assert!(!Sub {}.is_commutative());
        assert!(Sub {}.is_pointwise());
        assert!(Relu {}.is_pointwise());
        assert_eq!(LeakyRelu::default().name(), "leaky_relu");
    }
}
