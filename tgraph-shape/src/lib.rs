//! Shape model for tgraph computation graphs.
//!
//! A [`Shape`] pairs an element type ([`DataType`]) with a description of each
//! dimension. Dimensions are either static, with a fixed size and a stride
//! describing the memory layout, or dynamic, with a size range described by
//! [`DynamicDimension`]. Tuple shapes group the shapes of several values.
//!
//! Operators use [`CheckShapes`] to verify their preconditions during shape
//! inference and report violations as [`ShapeError`]s. Axis attributes are
//! resolved against input ranks using [`normalize_axis`] and an [`AxisRule`].

mod axis;
mod check;
mod dtype;
mod error;
mod shape;

pub use axis::{normalize_axes, normalize_axis, AxisRule};
pub use check::CheckShapes;
pub use dtype::DataType;
pub use error::{AxisError, ShapeError};
pub use shape::{
    broadcast_lens, broadcast_shapes, standard_strides, Dims, DynamicDimension, Shape,
};
