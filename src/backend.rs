//! Descriptors passed to kernel libraries when lowering operators.
//!
//! These only translate shapes and attributes into the form a backend
//! expects. Nothing here executes a kernel.

use tgraph_shape::{CheckShapes, DataType, Dims, Shape, ShapeError};

use crate::operator::Operator;
use crate::ops::{ConvParams, Convolution, Deconvolution};

/// Memory layout of a tensor with a static shape.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TensorDescriptor {
    pub dtype: DataType,
    pub dims: Dims,
    pub strides: Dims,
}

impl TensorDescriptor {
    pub fn from_shape(shape: &Shape) -> Result<TensorDescriptor, ShapeError> {
        CheckShapes::new(std::slice::from_ref(shape))
            .no_tuples()?
            .static_only()?;
        Ok(TensorDescriptor {
            dtype: shape.dtype(),
            dims: shape.lens().into(),
            strides: shape.strides().into(),
        })
    }

    /// Exchange the size and stride of two dimensions.
    pub fn swap_axes(&mut self, a: usize, b: usize) {
        self.dims.swap(a, b);
        self.strides.swap(a, b);
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConvolutionKind {
    Forward,
    Transposed,
}

/// Arguments for a convolution or transposed convolution kernel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConvolutionDescriptor {
    pub kind: ConvolutionKind,
    pub input: TensorDescriptor,
    pub weights: TensorDescriptor,
    pub output: TensorDescriptor,
    pub stride: Vec<usize>,
    pub padding: Vec<usize>,

    /// Dilation as the number of elements skipped between kernel taps, so
    /// that an undilated kernel has a dilation of zero.
    pub dilation: Vec<usize>,
    pub group: usize,
}

impl ConvolutionDescriptor {
    fn new(
        kind: ConvolutionKind,
        params: &ConvParams,
        input: &Shape,
        weights: &Shape,
        output: &Shape,
    ) -> Result<ConvolutionDescriptor, ShapeError> {
        Ok(ConvolutionDescriptor {
            kind,
            input: TensorDescriptor::from_shape(input)?,
            weights: TensorDescriptor::from_shape(weights)?,
            output: TensorDescriptor::from_shape(output)?,
            stride: params.stride.clone(),
            padding: params.padding.clone(),
            dilation: params.dilation.iter().map(|&d| d.saturating_sub(1)).collect(),
            group: params.group,
        })
    }

    pub fn for_convolution(
        op: &Convolution,
        input: &Shape,
        weights: &Shape,
    ) -> Result<ConvolutionDescriptor, ShapeError> {
        let output = op.compute_shape(&[input.clone(), weights.clone()], &[])?;
        Self::new(ConvolutionKind::Forward, &op.params, input, weights, &output)
    }

    /// Describe a transposed convolution.
    ///
    /// The weights of a `deconvolution` have layout `[C_in, C_out, ...]`,
    /// while kernel libraries expect `[C_out, C_in, ...]`, so the first two
    /// axes of the weight descriptor are swapped.
    pub fn for_deconvolution(
        op: &Deconvolution,
        input: &Shape,
        weights: &Shape,
    ) -> Result<ConvolutionDescriptor, ShapeError> {
        let output = op.compute_shape(&[input.clone(), weights.clone()], &[])?;
        let mut desc = Self::new(ConvolutionKind::Transposed, &op.params, input, weights, &output)?;
        desc.weights.swap_axes(0, 1);
        Ok(desc)
    }
}

#[cfg(test)]
mod tests {
    use tgraph_shape::{DataType, DynamicDimension, Shape, ShapeError};

    use super::{ConvolutionDescriptor, ConvolutionKind, TensorDescriptor};
    use crate::ops::{ConvParams, Convolution, Deconvolution};

    #[test]
    fn test_tensor_descriptor() {
        let shape = Shape::with_strides(DataType::Half, &[2, 3], &[1, 2]);
        let desc = TensorDescriptor::from_shape(&shape).unwrap();
        assert_eq!(desc.dtype, DataType::Half);
        assert_eq!(desc.dims.as_slice(), &[2, 3]);
        assert_eq!(desc.strides.as_slice(), &[1, 2]);

        let dynamic = Shape::dynamic(
            DataType::Float,
            &[DynamicDimension::new(1, 4), DynamicDimension::fixed(3)],
        );
        assert!(matches!(
            TensorDescriptor::from_shape(&dynamic),
            Err(ShapeError::UnsupportedDynamic(_))
        ));
    }

    #[test]
    fn test_convolution_descriptor() {
        let op = Convolution {
            params: ConvParams {
                padding: vec![1, 1],
                stride: vec![2, 2],
                dilation: vec![1, 2],
                group: 1,
            },
        };
        let input = Shape::new(DataType::Float, &[1, 3, 8, 8]);
        let weights = Shape::new(DataType::Float, &[4, 3, 3, 3]);

        let desc = ConvolutionDescriptor::for_convolution(&op, &input, &weights).unwrap();

        assert_eq!(desc.kind, ConvolutionKind::Forward);
        assert_eq!(desc.dilation, [0, 1]);
        assert_eq!(desc.stride, [2, 2]);
        assert_eq!(desc.padding, [1, 1]);
        assert_eq!(desc.weights.dims.as_slice(), &[4, 3, 3, 3]);
        assert_eq!(desc.output.dims.as_slice(), &[1, 4, 4, 3]);
    }

    #[test]
    fn test_deconvolution_descriptor() {
        let op = Deconvolution {
            params: ConvParams::default(),
        };
        let input = Shape::new(DataType::Float, &[1, 3, 4, 4]);
        let weights = Shape::new(DataType::Float, &[3, 5, 3, 3]);

        let desc = ConvolutionDescriptor::for_deconvolution(&op, &input, &weights).unwrap();

        assert_eq!(desc.kind, ConvolutionKind::Transposed);
        assert_eq!(desc.dilation, [0, 0]);
        assert_eq!(desc.weights.dims.as_slice(), &[5, 3, 3, 3]);
        assert_eq!(desc.weights.strides.as_slice(), &[9, 45, 3, 1]);
        assert_eq!(desc.output.dims.as_slice(), &[1, 5, 6, 6]);
    }
}
