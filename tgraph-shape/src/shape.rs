use std::fmt;
use std::iter::repeat_n;

use smallvec::SmallVec;

use crate::{DataType, ShapeError};

/// Dimension sizes or strides of a static shape.
pub type Dims = SmallVec<[usize; 4]>;

/// A dimension whose size is only known to lie within a range.
///
/// `optimal` is the size which a backend should prefer when specializing
/// the dimension, if one is known.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub struct DynamicDimension {
    pub min: usize,
    pub max: usize,
    pub optimal: Option<usize>,
}

impl DynamicDimension {
    pub fn new(min: usize, max: usize) -> DynamicDimension {
        DynamicDimension {
            min,
            max,
            optimal: None,
        }
    }

    pub fn with_optimal(min: usize, max: usize, optimal: usize) -> DynamicDimension {
        DynamicDimension {
            min,
            max,
            optimal: Some(optimal),
        }
    }

    /// Create a dimension whose size is known to be exactly `size`.
    pub fn fixed(size: usize) -> DynamicDimension {
        DynamicDimension::with_optimal(size, size, size)
    }

    pub fn is_fixed(&self) -> bool {
        self.min == self.max
    }

    /// Return the range-product of a group of dimensions.
    ///
    /// `min` and `max` are multiplied independently. The optimal value is the
    /// product of the members' optimal values, or `None` if any member lacks
    /// one. The product of an empty group is the fixed dimension 1.
    ///
    /// Products saturate at `usize::MAX`, so an unbounded `max` stays
    /// unbounded.
    pub fn product<'a, I: IntoIterator<Item = &'a DynamicDimension>>(dims: I) -> DynamicDimension {
        dims.into_iter()
            .fold(DynamicDimension::fixed(1), |acc, dim| DynamicDimension {
                min: acc.min.saturating_mul(dim.min),
                max: acc.max.saturating_mul(dim.max),
                optimal: acc
                    .optimal
                    .zip(dim.optimal)
                    .map(|(a, b)| a.saturating_mul(b)),
            })
    }
}

impl fmt::Display for DynamicDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.optimal {
            Some(opt) => write!(f, "{{{}, {}, {}}}", self.min, self.max, opt),
            None => write!(f, "{{{}, {}}}", self.min, self.max),
        }
    }
}

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
enum Layout {
    Static { lens: Dims, strides: Dims },
    Dynamic { dims: SmallVec<[DynamicDimension; 4]> },
    Tuple(Vec<Shape>),
}

/// Element type and dimensions of a value in a graph.
///
/// Static shapes have fixed dimension sizes and strides describing their
/// memory layout. Dynamic shapes have a size range per dimension and no
/// strides. Tuple shapes group several other shapes.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Shape {
    dtype: DataType,
    layout: Layout,
}

/// Return the row-major strides for a tensor with dimension sizes `lens`.
pub fn standard_strides(lens: &[usize]) -> Dims {
    let mut strides: Dims = repeat_n(0, lens.len()).collect();
    let mut stride = 1;
    for (i, &len) in lens.iter().enumerate().rev() {
        strides[i] = stride;
        stride *= len.max(1);
    }
    strides
}

impl Shape {
    /// Create a static shape with standard (row-major, contiguous) strides.
    pub fn new(dtype: DataType, lens: &[usize]) -> Shape {
        Shape::with_strides(dtype, lens, &standard_strides(lens))
    }

    /// Create a static shape with explicit strides.
    ///
    /// Panics if `lens` and `strides` have different lengths.
    pub fn with_strides(dtype: DataType, lens: &[usize], strides: &[usize]) -> Shape {
        assert_eq!(
            lens.len(),
            strides.len(),
            "lens and strides must have the same length"
        );
        Shape {
            dtype,
            layout: Layout::Static {
                lens: lens.into(),
                strides: strides.into(),
            },
        }
    }

    /// Create a shape for a single element which may be broadcast to any
    /// other shape.
    pub fn scalar(dtype: DataType) -> Shape {
        Shape::with_strides(dtype, &[1], &[0])
    }

    /// Create a dynamic shape.
    pub fn dynamic(dtype: DataType, dims: &[DynamicDimension]) -> Shape {
        Shape {
            dtype,
            layout: Layout::Dynamic { dims: dims.into() },
        }
    }

    /// Create a shape which groups several other shapes.
    pub fn tuple(shapes: Vec<Shape>) -> Shape {
        Shape {
            dtype: DataType::Tuple,
            layout: Layout::Tuple(shapes),
        }
    }

    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    /// Return a copy of this shape with a different element type.
    pub fn with_type(&self, dtype: DataType) -> Shape {
        Shape {
            dtype,
            layout: self.layout.clone(),
        }
    }

    /// Return the number of dimensions. Tuples have no dimensions.
    pub fn ndim(&self) -> usize {
        match &self.layout {
            Layout::Static { lens, .. } => lens.len(),
            Layout::Dynamic { dims } => dims.len(),
            Layout::Tuple(_) => 0,
        }
    }

    pub fn is_dynamic(&self) -> bool {
        match &self.layout {
            Layout::Dynamic { .. } => true,
            Layout::Tuple(shapes) => shapes.iter().any(|s| s.is_dynamic()),
            Layout::Static { .. } => false,
        }
    }

    pub fn is_tuple(&self) -> bool {
        matches!(self.layout, Layout::Tuple(_))
    }

    /// Return the shapes grouped by a tuple shape, or an empty slice.
    pub fn sub_shapes(&self) -> &[Shape] {
        match &self.layout {
            Layout::Tuple(shapes) => shapes,
            _ => &[],
        }
    }

    /// Return the dimension sizes of a static shape.
    ///
    /// Dynamic and tuple shapes return an empty slice. Use
    /// [`dyn_dims`](Shape::dyn_dims) for shapes which may be dynamic.
    pub fn lens(&self) -> &[usize] {
        match &self.layout {
            Layout::Static { lens, .. } => lens,
            _ => &[],
        }
    }

    /// Return the strides of a static shape, or an empty slice.
    pub fn strides(&self) -> &[usize] {
        match &self.layout {
            Layout::Static { strides, .. } => strides,
            _ => &[],
        }
    }

    /// Return the dimensions as size ranges. Static dimensions are returned as
    /// fixed ranges.
    pub fn dyn_dims(&self) -> SmallVec<[DynamicDimension; 4]> {
        match &self.layout {
            Layout::Static { lens, .. } => {
                lens.iter().map(|&len| DynamicDimension::fixed(len)).collect()
            }
            Layout::Dynamic { dims } => dims.clone(),
            Layout::Tuple(_) => SmallVec::new(),
        }
    }

    pub fn min_lens(&self) -> Dims {
        self.dyn_dims().iter().map(|d| d.min).collect()
    }

    pub fn max_lens(&self) -> Dims {
        self.dyn_dims().iter().map(|d| d.max).collect()
    }

    /// Return the optimal size of each dimension, if every dimension has one.
    pub fn opt_lens(&self) -> Option<Dims> {
        self.dyn_dims().iter().map(|d| d.optimal).collect()
    }

    /// Convert a static shape into an equivalent dynamic shape with fixed
    /// dimensions.
    pub fn to_dynamic(&self) -> Shape {
        match &self.layout {
            Layout::Static { .. } => Shape::dynamic(self.dtype, &self.dyn_dims()),
            Layout::Dynamic { .. } => self.clone(),
            Layout::Tuple(shapes) => Shape::tuple(shapes.iter().map(|s| s.to_dynamic()).collect()),
        }
    }

    /// Return the number of elements in a static shape.
    pub fn elements(&self) -> Option<usize> {
        match &self.layout {
            Layout::Static { lens, .. } => Some(lens.iter().product()),
            _ => None,
        }
    }

    /// Return the number of elements spanned by the layout of a static shape,
    /// including elements skipped by strides.
    fn element_space(&self) -> usize {
        let (lens, strides) = (self.lens(), self.strides());
        if lens.iter().any(|&len| len == 0) {
            return 0;
        }
        lens.iter()
            .zip(strides)
            .map(|(&len, &stride)| (len - 1) * stride)
            .sum::<usize>()
            + 1
    }

    /// Return true if a static shape's elements are stored without gaps or
    /// repetition.
    pub fn is_packed(&self) -> bool {
        match self.elements() {
            Some(elements) => !self.is_broadcasted() && elements == self.element_space(),
            None => false,
        }
    }

    /// Return true if any dimension of a static shape is repeated with a zero
    /// stride.
    pub fn is_broadcasted(&self) -> bool {
        self.lens()
            .iter()
            .zip(self.strides())
            .any(|(&len, &stride)| len > 1 && stride == 0)
    }

    /// Return true if a static shape is packed but its dimensions are not
    /// stored in row-major order.
    pub fn is_transposed(&self) -> bool {
        self.is_packed() && !self.is_standard()
    }

    /// Return true if a static shape is packed and row-major.
    ///
    /// The strides of dimensions with size 1 are ignored.
    pub fn is_standard(&self) -> bool {
        if self.is_dynamic() || self.is_tuple() {
            return false;
        }
        let expected = standard_strides(self.lens());
        self.lens()
            .iter()
            .zip(self.strides().iter().zip(expected.iter()))
            .all(|(&len, (&stride, &expected))| len <= 1 || stride == expected)
    }

    /// Return true if a static shape holds exactly one element.
    pub fn is_scalar(&self) -> bool {
        !self.is_tuple() && !self.is_dynamic() && self.lens().iter().all(|&len| len == 1)
    }

    /// Return a shape with the same element type and sizes as this one, but
    /// standard strides. Dynamic shapes are returned unchanged.
    pub fn as_standard(&self) -> Shape {
        match &self.layout {
            Layout::Static { lens, .. } => Shape::new(self.dtype, lens),
            _ => self.clone(),
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |items: &[String]| items.join(", ");
        match &self.layout {
            Layout::Static { lens, strides } => {
                let lens: Vec<_> = lens.iter().map(|l| l.to_string()).collect();
                let strides: Vec<_> = strides.iter().map(|s| s.to_string()).collect();
                write!(f, "{}, {{{}}}, {{{}}}", self.dtype, join(&lens), join(&strides))
            }
            Layout::Dynamic { dims } => {
                let dims: Vec<_> = dims.iter().map(|d| d.to_string()).collect();
                write!(f, "{}, {{{}}}", self.dtype, join(&dims))
            }
            Layout::Tuple(shapes) => {
                let shapes: Vec<_> = shapes.iter().map(|s| format!("[{}]", s)).collect();
                write!(f, "{}, {{{}}}", self.dtype, join(&shapes))
            }
        }
    }
}

/// Broadcast two sets of static dimension sizes together following numpy
/// broadcasting rules.
pub fn broadcast_lens(a: &[usize], b: &[usize]) -> Result<Dims, ShapeError> {
    let a_pad = b.len().saturating_sub(a.len());
    let b_pad = a.len().saturating_sub(b.len());
    let a_iter = repeat_n(&1, a_pad).chain(a);
    let b_iter = repeat_n(&1, b_pad).chain(b);

    a_iter
        .zip(b_iter)
        .map(|(&a_len, &b_len)| match (a_len, b_len) {
            (a_len, b_len) if a_len == b_len => Ok(a_len),
            (1, b_len) => Ok(b_len),
            (a_len, 1) => Ok(a_len),
            _ => Err(ShapeError::IncompatibleShapes(format!(
                "cannot broadcast {:?} with {:?}",
                a, b
            ))),
        })
        .collect()
}

fn broadcast_dyn_dims(
    a: &[DynamicDimension],
    b: &[DynamicDimension],
) -> Result<SmallVec<[DynamicDimension; 4]>, ShapeError> {
    let one = DynamicDimension::fixed(1);
    let a_pad = b.len().saturating_sub(a.len());
    let b_pad = a.len().saturating_sub(b.len());
    let a_iter = repeat_n(&one, a_pad).chain(a);
    let b_iter = repeat_n(&one, b_pad).chain(b);

    a_iter
        .zip(b_iter)
        .map(|(a_dim, b_dim)| {
            if a_dim == b_dim || *b_dim == one {
                Ok(*a_dim)
            } else if *a_dim == one {
                Ok(*b_dim)
            } else {
                Err(ShapeError::IncompatibleShapes(format!(
                    "cannot broadcast dynamic dimensions {} and {}",
                    a_dim, b_dim
                )))
            }
        })
        .collect()
}

/// Broadcast two shapes together.
///
/// The result has the element type of `a` and standard strides. If either
/// shape is dynamic, the result is dynamic, and dimensions only broadcast if
/// they are equal or one of them is fixed at size 1.
pub fn broadcast_shapes(a: &Shape, b: &Shape) -> Result<Shape, ShapeError> {
    if a.is_tuple() || b.is_tuple() {
        return Err(ShapeError::UnsupportedType(DataType::Tuple));
    }
    if a.is_dynamic() || b.is_dynamic() {
        let dims = broadcast_dyn_dims(&a.dyn_dims(), &b.dyn_dims())?;
        Ok(Shape::dynamic(a.dtype(), &dims))
    } else {
        let lens = broadcast_lens(a.lens(), b.lens())?;
        Ok(Shape::new(a.dtype(), &lens))
    }
}
