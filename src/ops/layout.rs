//! Operators which change the shape or memory layout of a tensor without
//! changing its values.

use smallvec::SmallVec;
use tgraph_shape::{
    broadcast_lens, broadcast_shapes, normalize_axes, normalize_axis, AxisError, AxisRule,
    CheckShapes, Dims, DynamicDimension, Shape, ShapeError,
};

use crate::module::Module;
use crate::operator::{AxisValues, OpAttributes, Operator, SharedOperator};

fn axis_error(attribute: &'static str, err: AxisError) -> ShapeError {
    ShapeError::InvalidAttribute {
        attribute,
        reason: err.to_string(),
    }
}

/// Flatten a tensor into a matrix.
///
/// Dimensions before `axis` are multiplied together to form the first output
/// dimension, and dimensions from `axis` onwards form the second. `axis` may
/// range from `-rank` to `rank` inclusive.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Flatten {
    pub axis: i64,
}

impl Operator for Flatten {
    fn name(&self) -> &str {
        "flatten"
    }

    fn compute_shape(&self, inputs: &[Shape], _: &[&Module]) -> Result<Shape, ShapeError> {
        CheckShapes::new(inputs).has(1)?.no_tuples()?;
        let input = &inputs[0];
        let axis = normalize_axis(self.axis, input.ndim(), AxisRule::SPLIT_POINT)
            .map_err(|err| axis_error("axis", err))?;

        if input.is_dynamic() {
            let dims = input.dyn_dims();
            let outer = DynamicDimension::product(&dims[..axis]);
            let inner = DynamicDimension::product(&dims[axis..]);
            return Ok(Shape::dynamic(input.dtype(), &[outer, inner]));
        }

        CheckShapes::new(inputs).standard()?;
        let lens = input.lens();
        Ok(Shape::new(
            input.dtype(),
            &[lens[..axis].iter().product(), lens[axis..].iter().product()],
        ))
    }

    fn attributes(&self) -> OpAttributes {
        OpAttributes {
            normalize_axes: vec![("axis", AxisRule::SPLIT_POINT)],
        }
    }

    fn axis_attribute(&self, name: &str) -> Option<AxisValues> {
        (name == "axis").then(|| [self.axis].into_iter().collect())
    }

    fn with_axis_attribute(&self, name: &str, values: &[i64]) -> Option<SharedOperator> {
        match (name, values) {
            ("axis", &[axis]) => Some(std::sync::Arc::new(Flatten { axis })),
            _ => None,
        }
    }

    fn output_alias(&self) -> Option<usize> {
        Some(0)
    }
}

/// Change the dimensions of a tensor with a standard layout.
///
/// A value of 0 in `dims` copies the size of the corresponding input
/// dimension, and at most one value may be -1, which is inferred from the
/// number of elements.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Reshape {
    pub dims: Vec<i64>,
}

impl Operator for Reshape {
    fn name(&self) -> &str {
        "reshape"
    }

    fn compute_shape(&self, inputs: &[Shape], _: &[&Module]) -> Result<Shape, ShapeError> {
        CheckShapes::new(inputs)
            .has(1)?
            .no_tuples()?
            .static_only()?
            .standard()?;
        let input = &inputs[0];
        let in_lens = input.lens();
        let elements: usize = in_lens.iter().product();
        let invalid = |reason: String| ShapeError::InvalidAttribute {
            attribute: "dims",
            reason,
        };

        let mut lens = Dims::new();
        let mut inferred = None;
        for (i, &dim) in self.dims.iter().enumerate() {
            match dim {
                -1 if inferred.is_some() => {
                    return Err(invalid("only one dimension can be inferred".into()));
                }
                -1 => {
                    inferred = Some(i);
                    lens.push(1);
                }
                0 => match in_lens.get(i) {
                    Some(&len) => lens.push(len),
                    None => return Err(invalid(format!("no input dimension to copy at {}", i))),
                },
                dim if dim > 0 => lens.push(dim as usize),
                dim => return Err(invalid(format!("invalid dimension size {}", dim))),
            }
        }

        if let Some(i) = inferred {
            let known: usize = lens.iter().product();
            if known == 0 || elements % known != 0 {
                return Err(invalid(format!(
                    "cannot infer dimension {} for {} elements",
                    i, elements
                )));
            }
            lens[i] = elements / known;
        }

        if lens.iter().product::<usize>() != elements {
            return Err(ShapeError::IncompatibleShapes(format!(
                "cannot reshape [{}] to {:?}",
                input, lens
            )));
        }
        Ok(Shape::new(input.dtype(), &lens))
    }

    fn output_alias(&self) -> Option<usize> {
        Some(0)
    }
}

/// Permute the dimensions of a tensor by permuting its strides.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Transpose {
    pub permutation: Vec<i64>,
}

impl Operator for Transpose {
    fn name(&self) -> &str {
        "transpose"
    }

    fn compute_shape(&self, inputs: &[Shape], _: &[&Module]) -> Result<Shape, ShapeError> {
        CheckShapes::new(inputs).has(1)?.no_tuples()?;
        let input = &inputs[0];

        let mut sorted = self.permutation.clone();
        sorted.sort_unstable();
        if !sorted.iter().copied().eq(0..input.ndim() as i64) {
            return Err(ShapeError::InvalidAttribute {
                attribute: "permutation",
                reason: format!(
                    "{:?} is not a permutation of {} dimensions",
                    self.permutation,
                    input.ndim()
                ),
            });
        }
        let perm = self.permutation.iter().map(|&p| p as usize);

        if input.is_dynamic() {
            let dims = input.dyn_dims();
            let permuted: SmallVec<[DynamicDimension; 4]> = perm.map(|p| dims[p]).collect();
            return Ok(Shape::dynamic(input.dtype(), &permuted));
        }

        let (lens, strides): (Dims, Dims) = perm
            .map(|p| (input.lens()[p], input.strides()[p]))
            .unzip();
        Ok(Shape::with_strides(input.dtype(), &lens, &strides))
    }

    fn output_alias(&self) -> Option<usize> {
        Some(0)
    }
}

/// Take a view of a sub-range of some dimensions.
///
/// Negative `starts` and `ends` count back from the end of the dimension, and
/// both are clamped to its size.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Slice {
    pub axes: Vec<i64>,
    pub starts: Vec<i64>,
    pub ends: Vec<i64>,
}

impl Operator for Slice {
    fn name(&self) -> &str {
        "slice"
    }

    fn compute_shape(&self, inputs: &[Shape], _: &[&Module]) -> Result<Shape, ShapeError> {
        CheckShapes::new(inputs).has(1)?.no_tuples()?.static_only()?;
        let input = &inputs[0];
        if self.starts.len() != self.axes.len() || self.ends.len() != self.axes.len() {
            return Err(ShapeError::InvalidAttribute {
                attribute: "axes",
                reason: "axes, starts and ends must have the same length".into(),
            });
        }
        let axes = normalize_axes(&self.axes, input.ndim(), AxisRule::DIMENSION)
            .map_err(|err| axis_error("axes", err))?;

        let mut lens: Dims = input.lens().into();
        for ((&axis, &start), &end) in axes.iter().zip(&self.starts).zip(&self.ends) {
            let size = input.lens()[axis] as i64;
            let clamp = |index: i64| {
                let index = if index < 0 { index + size } else { index };
                index.clamp(0, size)
            };
            lens[axis] = (clamp(end) - clamp(start)).max(0) as usize;
        }
        Ok(Shape::with_strides(input.dtype(), &lens, input.strides()))
    }

    fn attributes(&self) -> OpAttributes {
        OpAttributes {
            normalize_axes: vec![("axes", AxisRule::DIMENSION)],
        }
    }

    fn axis_attribute(&self, name: &str) -> Option<AxisValues> {
        (name == "axes").then(|| self.axes.iter().copied().collect())
    }

    fn with_axis_attribute(&self, name: &str, values: &[i64]) -> Option<SharedOperator> {
        (name == "axes").then(|| -> SharedOperator {
            std::sync::Arc::new(Slice {
                axes: values.to_vec(),
                ..self.clone()
            })
        })
    }

    fn output_alias(&self) -> Option<usize> {
        Some(0)
    }
}

/// Copy a tensor into a standard layout.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Contiguous {}

impl Operator for Contiguous {
    fn name(&self) -> &str {
        "contiguous"
    }

    fn compute_shape(&self, inputs: &[Shape], _: &[&Module]) -> Result<Shape, ShapeError> {
        CheckShapes::new(inputs).has(1)?.no_tuples()?;
        Ok(inputs[0].as_standard())
    }
}

/// Broadcast a tensor to a larger shape using zero strides.
///
/// The target dimensions are either given by `out_lens`, or taken from the
/// shape of a second input.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MultiBroadcast {
    pub out_lens: Option<Vec<usize>>,
}

impl MultiBroadcast {
    /// Broadcast the first input against the shape of the second.
    pub fn to_input() -> MultiBroadcast {
        MultiBroadcast { out_lens: None }
    }
}

/// Return a view of `input` broadcast to `out_lens`.
fn broadcast_to(input: &Shape, out_lens: &[usize]) -> Result<Shape, ShapeError> {
    let incompatible = || {
        ShapeError::IncompatibleShapes(format!(
            "cannot broadcast [{}] to {:?}",
            input, out_lens
        ))
    };
    if out_lens.len() < input.ndim() {
        return Err(incompatible());
    }
    let offset = out_lens.len() - input.ndim();
    let mut strides = Dims::new();
    for (i, &out_len) in out_lens.iter().enumerate() {
        let stride = match i.checked_sub(offset) {
            None => 0,
            Some(j) if input.lens()[j] == out_len => input.strides()[j],
            Some(j) if input.lens()[j] == 1 => 0,
            Some(_) => return Err(incompatible()),
        };
        strides.push(stride);
    }
    Ok(Shape::with_strides(input.dtype(), out_lens, &strides))
}

impl Operator for MultiBroadcast {
    fn name(&self) -> &str {
        "multibroadcast"
    }

    fn compute_shape(&self, inputs: &[Shape], _: &[&Module]) -> Result<Shape, ShapeError> {
        match &self.out_lens {
            Some(out_lens) => {
                CheckShapes::new(inputs).has(1)?.no_tuples()?.static_only()?;
                broadcast_to(&inputs[0], out_lens)
            }
            None => {
                CheckShapes::new(inputs).has(2)?.no_tuples()?;
                let (input, target) = (&inputs[0], &inputs[1]);
                if input.is_dynamic() || target.is_dynamic() {
                    broadcast_shapes(input, target)
                } else {
                    let out_lens = broadcast_lens(input.lens(), target.lens())?;
                    broadcast_to(input, &out_lens)
                }
            }
        }
    }

    fn output_alias(&self) -> Option<usize> {
        Some(0)
    }
}

#[cfg(test)]
mod tests {
    use tgraph_shape::{DataType, DynamicDimension, Shape, ShapeError};
    use tgraph_testing::TestCases;

    use super::{Contiguous, Flatten, MultiBroadcast, Reshape, Slice, Transpose};
    use crate::operator::Operator;

    fn f32_shape(lens: &[usize]) -> Shape {
        Shape::new(DataType::Float, lens)
    }

    #[test]
    fn test_flatten_shape() {
        #[derive(Debug)]
        struct Case {
            input: Vec<usize>,
            axis: i64,
            expected: Option<[usize; 2]>,
        }

        let cases = [
            Case {
                input: vec![2, 3, 4, 5],
                axis: 2,
                expected: Some([6, 20]),
            },
            Case {
                input: vec![2, 3, 4, 5],
                axis: 0,
                expected: Some([1, 120]),
            },
            Case {
                input: vec![2, 3, 4, 5],
                axis: 4,
                expected: Some([120, 1]),
            },
            Case {
                input: vec![2, 3, 4, 5],
                axis: -1,
                expected: Some([24, 5]),
            },
            Case {
                input: vec![2, 3, 4, 5],
                axis: 5,
                expected: None,
            },
            Case {
                input: vec![2, 3, 4, 5],
                axis: -5,
                expected: None,
            },
        ];

        cases.test_each(|case| {
            let op = Flatten { axis: case.axis };
            let result = op.compute_shape(&[f32_shape(&case.input)], &[]);
            assert_eq!(result.ok(), case.expected.map(|lens| f32_shape(&lens)));
        });
    }

    #[test]
    fn test_flatten_dynamic() {
        let input = Shape::dynamic(
            DataType::Float,
            &[
                DynamicDimension::with_optimal(1, 4, 2),
                DynamicDimension::fixed(3),
                DynamicDimension::with_optimal(2, 8, 4),
                DynamicDimension::fixed(5),
            ],
        );
        let shape = Flatten { axis: 2 }.compute_shape(&[input.clone()], &[]);
        assert_eq!(
            shape,
            Ok(Shape::dynamic(
                DataType::Float,
                &[
                    DynamicDimension::with_optimal(3, 12, 6),
                    DynamicDimension::with_optimal(10, 40, 20),
                ]
            ))
        );

        // The optimal value is dropped if any member lacks one.
        let input = Shape::dynamic(
            DataType::Float,
            &[DynamicDimension::new(1, 4), DynamicDimension::fixed(3)],
        );
        let shape = Flatten { axis: 2 }.compute_shape(&[input], &[]);
        assert_eq!(
            shape,
            Ok(Shape::dynamic(
                DataType::Float,
                &[DynamicDimension::new(3, 12), DynamicDimension::fixed(1)]
            ))
        );

        // An unbounded dimension keeps the group unbounded.
        let input = Shape::dynamic(
            DataType::Float,
            &[
                DynamicDimension::new(1, usize::MAX),
                DynamicDimension::fixed(3),
            ],
        );
        let shape = Flatten { axis: 0 }.compute_shape(&[input], &[]);
        assert_eq!(
            shape,
            Ok(Shape::dynamic(
                DataType::Float,
                &[
                    DynamicDimension::fixed(1),
                    DynamicDimension::new(3, usize::MAX)
                ]
            ))
        );
    }

    #[test]
    fn test_flatten_requires_standard() {
        let transposed = Shape::with_strides(DataType::Float, &[3, 2], &[1, 3]);
        let err = Flatten { axis: 1 }.compute_shape(&[transposed], &[]);
        assert_eq!(err, Err(ShapeError::NotStandard(0)));
    }

    #[test]
    fn test_reshape_shape() {
        #[derive(Debug)]
        struct Case {
            dims: Vec<i64>,
            expected: Option<Vec<usize>>,
        }

        let cases = [
            Case {
                dims: vec![6, 4],
                expected: Some(vec![6, 4]),
            },
            Case {
                dims: vec![0, -1],
                expected: Some(vec![2, 12]),
            },
            Case {
                dims: vec![-1],
                expected: Some(vec![24]),
            },
            Case {
                dims: vec![-1, -1],
                expected: None,
            },
            Case {
                dims: vec![5, -1],
                expected: None,
            },
            Case {
                dims: vec![2, 3, 5],
                expected: None,
            },
            Case {
                dims: vec![-2, 12],
                expected: None,
            },
        ];

        cases.test_each(|case| {
            let op = Reshape {
                dims: case.dims.clone(),
            };
            let result = op.compute_shape(&[f32_shape(&[2, 3, 4])], &[]);
            assert_eq!(result.ok(), case.expected.as_deref().map(f32_shape));
        });
    }

    #[test]
    fn test_transpose_shape() {
        let op = Transpose {
            permutation: vec![1, 0],
        };
        let shape = op.compute_shape(&[f32_shape(&[2, 3])], &[]).unwrap();
        assert_eq!(shape, Shape::with_strides(DataType::Float, &[3, 2], &[1, 3]));
        assert!(shape.is_transposed());

        let op = Transpose {
            permutation: vec![0, 0],
        };
        assert!(op.compute_shape(&[f32_shape(&[2, 3])], &[]).is_err());
    }

    #[test]
    fn test_slice_shape() {
        let op = Slice {
            axes: vec![1, -1],
            starts: vec![1, -3],
            ends: vec![3, 100],
        };
        let shape = op.compute_shape(&[f32_shape(&[2, 4, 6])], &[]).unwrap();
        assert_eq!(shape, Shape::with_strides(DataType::Float, &[2, 2, 3], &[24, 6, 1]));
        assert!(!shape.is_standard());

        let op = Slice {
            axes: vec![3],
            starts: vec![0],
            ends: vec![1],
        };
        assert!(op.compute_shape(&[f32_shape(&[2, 4, 6])], &[]).is_err());
    }

    #[test]
    fn test_contiguous_shape() {
        let transposed = Shape::with_strides(DataType::Float, &[3, 2], &[1, 3]);
        assert_eq!(
            Contiguous {}.compute_shape(&[transposed], &[]),
            Ok(f32_shape(&[3, 2]))
        );
    }

    #[test]
    fn test_multibroadcast_shape() {
        let op = MultiBroadcast {
            out_lens: Some(vec![2, 3]),
        };
        let shape = op.compute_shape(&[Shape::scalar(DataType::Float)], &[]).unwrap();
        assert_eq!(shape, Shape::with_strides(DataType::Float, &[2, 3], &[0, 0]));
        assert!(shape.is_broadcasted());

        let shape = MultiBroadcast::to_input()
            .compute_shape(&[f32_shape(&[3]), f32_shape(&[4, 3])], &[])
            .unwrap();
        assert_eq!(shape, Shape::with_strides(DataType::Float, &[4, 3], &[0, 1]));

        let err = MultiBroadcast::to_input().compute_shape(&[f32_shape(&[2]), f32_shape(&[4, 3])], &[]);
        assert!(err.is_err());
    }
}
