//! The operator set understood by the compiler.
//!
//! Operators are grouped by kind:
//!
//! - Module boundary: [`Parameter`], [`Literal`], [`Return`]
//! - Pointwise: [`Add`], [`Sub`], [`Mul`], [`Div`], [`Relu`], [`LeakyRelu`]
//! - Anchors for kernel fusion: [`Dot`], [`Convolution`]
//! - Other linear algebra: [`Deconvolution`]
//! - Reductions: [`ReduceSum`]
//! - Layout: [`Flatten`], [`Reshape`], [`Transpose`], [`Slice`],
//!   [`Contiguous`], [`MultiBroadcast`]
//! - Higher-order: [`Pointwise`], [`FusedKernel`]

mod builtin;
mod elementwise;
mod layout;
mod linalg;
mod pointwise;
mod reduce;

pub use builtin::{Literal, LiteralData, Parameter, Return};
pub use elementwise::{Add, Div, LeakyRelu, Mul, Relu, Sub};
pub use layout::{Contiguous, Flatten, MultiBroadcast, Reshape, Slice, Transpose};
pub use linalg::{ConvParams, Convolution, Deconvolution, Dot};
pub use pointwise::{FusedKernel, Pointwise};
pub use reduce::ReduceSum;
