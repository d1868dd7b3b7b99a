//! tgraph is the core of an optimizing compiler for computation graphs.
//!
//! A model is represented as a [`Module`]: an ordered list of instructions,
//! each applying an [`Operator`] to the outputs of earlier instructions. The
//! output shape of every instruction is inferred when it is added and kept up
//! to date as the module is rewritten.
//!
//! # Compiling a module
//!
//! Compilation rewrites a module in place by running a [`Pipeline`] of
//! [passes](passes). The pipeline is built by a [`Target`] from a
//! [`PipelineConfig`]:
//!
//! ```
//! use tgraph::ops::{Add, Dot, Relu};
//! use tgraph::{compile, DataType, Module, PipelineConfig, ReferenceTarget, Shape};
//!
//! let mut module = Module::new("main");
//! let a = module.add_parameter("a", Shape::new(DataType::Float, &[2, 3])).unwrap();
//! let b = module.add_parameter("b", Shape::new(DataType::Float, &[3, 4])).unwrap();
//! let bias = module.add_parameter("bias", Shape::new(DataType::Float, &[2, 4])).unwrap();
//! let product = module.add_instruction(Dot {}, &[a, b]).unwrap();
//! let sum = module.add_instruction(Add {}, &[product, bias]).unwrap();
//! let out = module.add_instruction(Relu {}, &[sum]).unwrap();
//! module.add_return(&[out]).unwrap();
//!
//! compile(&mut module, &ReferenceTarget::default(), &PipelineConfig::default()).unwrap();
//! assert_eq!(module.get(out).unwrap().name(), "fused_kernel");
//! ```
//!
//! # Rewriting modules
//!
//! Passes find the subgraphs they rewrite using the combinators in
//! [`matcher`], and splice replacements in using the mutation methods of
//! [`Module`], which keep the index of instruction uses consistent.
//!
//! # Logging
//!
//! Passes emit events through [`tracing`]. No subscriber is installed by this
//! crate.

pub mod backend;
mod diagnostics;
mod env;
mod error;
pub mod matcher;
mod module;
mod operator;
pub mod ops;
pub mod passes;
pub mod pipeline;

pub use diagnostics::{Diagnostic, DiagnosticLevel, Diagnostics};
pub use env::{env_flag, str_as_bool};
pub use error::{CompileError, ConfigError, StructuralError};
pub use module::{
    compare_param_names, InstrId, InstrInputs, InstrSubmodules, Instruction, Module, ModuleRef,
};
pub use operator::{AxisValues, OpAttributes, Operator, SharedOperator};
pub use pipeline::{compile, Capabilities, Pipeline, PipelineConfig, ReferenceTarget, Target};

pub use tgraph_shape::{AxisError, AxisRule, DataType, DynamicDimension, Shape, ShapeError};
