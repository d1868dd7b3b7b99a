//! Matrix multiplication and convolution operators.

use smallvec::SmallVec;
use tgraph_shape::{CheckShapes, DynamicDimension, Shape, ShapeError};

use crate::module::Module;
use crate::operator::Operator;

/// Batched matrix multiplication.
///
/// Both inputs have the same rank (at least 2) and identical batch
/// dimensions. The product of `[..., M, K]` and `[..., K, N]` has shape
/// `[..., M, N]`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Dot {}

impl Operator for Dot {
    fn name(&self) -> &str {
        "dot"
    }

    fn compute_shape(&self, inputs: &[Shape], _: &[&Module]) -> Result<Shape, ShapeError> {
        CheckShapes::new(inputs)
            .has(2)?
            .same_type()?
            .no_tuples()?
            .min_ndims(2)?
            .same_ndims()?;

        let (a, b) = (&inputs[0], &inputs[1]);
        let ndim = a.ndim();
        let (a_dims, b_dims) = (a.dyn_dims(), b.dyn_dims());
        let batch = &a_dims[..ndim - 2];

        if batch != &b_dims[..ndim - 2] {
            return Err(ShapeError::IncompatibleShapes(format!(
                "batch dimensions of [{}] and [{}] differ",
                a, b
            )));
        }
        if a_dims[ndim - 1] != b_dims[ndim - 2] {
            return Err(ShapeError::IncompatibleShapes(format!(
                "inner dimensions of [{}] and [{}] differ",
                a, b
            )));
        }

        let mut out_dims: SmallVec<[DynamicDimension; 4]> = batch.iter().copied().collect();
        out_dims.push(a_dims[ndim - 2]);
        out_dims.push(b_dims[ndim - 1]);

        if a.is_dynamic() || b.is_dynamic() {
            Ok(Shape::dynamic(a.dtype(), &out_dims))
        } else {
            let lens: SmallVec<[usize; 4]> = out_dims.iter().map(|d| d.min).collect();
            Ok(Shape::new(a.dtype(), &lens))
        }
    }
}

/// Spatial attributes shared by convolution and deconvolution.
#[derive(Clone, Debug, PartialEq)]
pub struct ConvParams {
    pub padding: Vec<usize>,
    pub stride: Vec<usize>,
    pub dilation: Vec<usize>,
    pub group: usize,
}

impl ConvParams {
    /// Default parameters for a convolution with `spatial` spatial
    /// dimensions: no padding, unit stride and dilation, one group.
    pub fn new(spatial: usize) -> ConvParams {
        ConvParams {
            padding: vec![0; spatial],
            stride: vec![1; spatial],
            dilation: vec![1; spatial],
            group: 1,
        }
    }

    fn check(&self, spatial: usize) -> Result<(), ShapeError> {
        let attrs: [(&'static str, &[usize]); 3] = [
            ("padding", &self.padding),
            ("stride", &self.stride),
            ("dilation", &self.dilation),
        ];
        for (attribute, values) in attrs {
            if values.len() != spatial {
                return Err(ShapeError::InvalidAttribute {
                    attribute,
                    reason: format!("expected {} values, got {}", spatial, values.len()),
                });
            }
        }
        for (attribute, values) in [("stride", &self.stride), ("dilation", &self.dilation)] {
            if values.contains(&0) {
                return Err(ShapeError::InvalidAttribute {
                    attribute,
                    reason: "values must be positive".into(),
                });
            }
        }
        if self.group == 0 {
            return Err(ShapeError::InvalidAttribute {
                attribute: "group",
                reason: "must be positive".into(),
            });
        }
        Ok(())
    }
}

impl Default for ConvParams {
    fn default() -> ConvParams {
        ConvParams::new(2)
    }
}

/// Check the common preconditions of convolution-like operators and return
/// the static weight lengths.
fn check_conv_inputs<'a>(inputs: &'a [Shape], params: &ConvParams) -> Result<&'a [usize], ShapeError> {
    CheckShapes::new(inputs)
        .has(2)?
        .same_type()?
        .no_tuples()?
        .min_ndims(3)?
        .same_ndims()?;
    if inputs[1].is_dynamic() {
        return Err(ShapeError::UnsupportedDynamic(
            "convolution weights must be static".into(),
        ));
    }
    params.check(inputs[0].ndim() - 2)?;
    let weights = inputs[1].lens();
    if weights[2..].contains(&0) {
        return Err(ShapeError::IncompatibleShapes(format!(
            "kernel of weights [{}] has a zero-sized dimension",
            inputs[1]
        )));
    }
    Ok(weights)
}

/// Apply `f` to each of the bounds of a dimension.
fn map_dim(
    dim: DynamicDimension,
    f: impl Fn(usize) -> Result<usize, ShapeError>,
) -> Result<DynamicDimension, ShapeError> {
    Ok(DynamicDimension {
        min: f(dim.min)?,
        max: f(dim.max)?,
        optimal: dim.optimal.map(&f).transpose()?,
    })
}

fn conv_output_shape(
    input: &Shape,
    channels: usize,
    spatial_size: impl Fn(usize, usize) -> Result<usize, ShapeError>,
) -> Result<Shape, ShapeError> {
    let in_dims = input.dyn_dims();
    let mut out_dims: SmallVec<[DynamicDimension; 4]> = SmallVec::new();
    out_dims.push(in_dims[0]);
    out_dims.push(DynamicDimension::fixed(channels));
    for (i, &dim) in in_dims[2..].iter().enumerate() {
        out_dims.push(map_dim(dim, |size| spatial_size(i, size))?);
    }

    if input.is_dynamic() {
        Ok(Shape::dynamic(input.dtype(), &out_dims))
    } else {
        let lens: SmallVec<[usize; 4]> = out_dims.iter().map(|d| d.min).collect();
        Ok(Shape::new(input.dtype(), &lens))
    }
}

/// N-dimensional convolution.
///
/// The input has layout `[N, C, ...spatial]` and the weights have layout
/// `[M, C / group, ...kernel]`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Convolution {
    pub params: ConvParams,
}

impl Operator for Convolution {
    fn name(&self) -> &str {
        "convolution"
    }

    fn compute_shape(&self, inputs: &[Shape], _: &[&Module]) -> Result<Shape, ShapeError> {
        let weights = check_conv_inputs(inputs, &self.params)?;
        let ConvParams {
            padding,
            stride,
            dilation,
            group,
        } = &self.params;

        let in_channels = inputs[0].dyn_dims()[1];
        if !in_channels.is_fixed() || in_channels.min != weights[1] * group {
            return Err(ShapeError::IncompatibleShapes(format!(
                "input channels {} do not match weights [{}] with {} groups",
                in_channels, inputs[1], group
            )));
        }
        if weights[0] % group != 0 {
            return Err(ShapeError::InvalidAttribute {
                attribute: "group",
                reason: format!("{} output channels not divisible by {}", weights[0], group),
            });
        }

        conv_output_shape(&inputs[0], weights[0], |i, size| {
            let kernel_extent = dilation[i] * (weights[i + 2] - 1) + 1;
            let padded = size + 2 * padding[i];
            if padded < kernel_extent {
                return Err(ShapeError::IncompatibleShapes(format!(
                    "padded input size {} is smaller than kernel extent {}",
                    padded, kernel_extent
                )));
            }
            Ok((padded - kernel_extent) / stride[i] + 1)
        })
    }
}

/// Transposed convolution.
///
/// The input has layout `[N, C, ...spatial]` and the weights have layout
/// `[C, M / group, ...kernel]`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Deconvolution {
    pub params: ConvParams,
}

impl Operator for Deconvolution {
    fn name(&self) -> &str {
        "deconvolution"
    }

    fn compute_shape(&self, inputs: &[Shape], _: &[&Module]) -> Result<Shape, ShapeError> {
        let weights = check_conv_inputs(inputs, &self.params)?;
        let ConvParams {
            padding,
            stride,
            dilation,
            group,
        } = &self.params;

        let in_channels = inputs[0].dyn_dims()[1];
        if !in_channels.is_fixed() || in_channels.min != weights[0] {
            return Err(ShapeError::IncompatibleShapes(format!(
                "input channels {} do not match weights [{}]",
                in_channels, inputs[1]
            )));
        }

        conv_output_shape(&inputs[0], weights[1] * group, |i, size| {
            let full = stride[i] * size.saturating_sub(1) + dilation[i] * (weights[i + 2] - 1) + 1;
            if full <= 2 * padding[i] {
                return Err(ShapeError::IncompatibleShapes(format!(
                    "padding {} removes the whole output of size {}",
                    padding[i], full
                )));
            }
            Ok(full - 2 * padding[i])
        })
    }
}
