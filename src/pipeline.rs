//! Construction and execution of pass pipelines.
//!
//! A [`Target`] turns a [`PipelineConfig`] into a [`Pipeline`], a fixed list
//! of passes. Configuration is only consulted while the pipeline is built:
//! disabled passes are replaced by an [`IdentityPass`], so the list of passes
//! is known before any of them runs.

use serde::{Deserialize, Serialize};

use crate::env::env_flag;
use crate::error::{CompileError, ConfigError};
use crate::module::Module;
use crate::passes::{
    enable_pass, AutoContiguous, DeadCodeElimination, EliminateContiguous, FuseKernels,
    FusePointwise, IdentityPass, Pass,
};

/// Switches which select the optional passes of a pipeline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub pointwise_fusion: bool,
    pub kernel_fusion: bool,
    pub auto_contiguous: bool,
    pub eliminate_contiguous: bool,

    /// Check the structure of the module after every pass.
    pub validate_after_each_pass: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            pointwise_fusion: true,
            kernel_fusion: true,
            auto_contiguous: true,
            eliminate_contiguous: true,
            validate_after_each_pass: false,
        }
    }
}

impl PipelineConfig {
    /// Create the default configuration, adjusted by environment variables.
    ///
    /// - `TGRAPH_DISABLE_POINTWISE_FUSION` disables pointwise fusion, and
    ///   kernel fusion which depends on it
    /// - `TGRAPH_DISABLE_KERNEL_FUSION` disables kernel fusion
    /// - `TGRAPH_DISABLE_AUTO_CONTIGUOUS` disables insertion of `contiguous`
    /// - `TGRAPH_VALIDATE` enables validation after every pass
    pub fn from_env() -> PipelineConfig {
        let pointwise_fusion = !env_flag("TGRAPH_DISABLE_POINTWISE_FUSION", false);
        PipelineConfig {
            pointwise_fusion,
            kernel_fusion: pointwise_fusion && !env_flag("TGRAPH_DISABLE_KERNEL_FUSION", false),
            auto_contiguous: !env_flag("TGRAPH_DISABLE_AUTO_CONTIGUOUS", false),
            eliminate_contiguous: true,
            validate_after_each_pass: env_flag("TGRAPH_VALIDATE", false),
        }
    }

    /// Check that the enabled passes can work together.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.kernel_fusion && !self.pointwise_fusion {
            return Err(ConfigError::InvalidPipeline(
                "kernel fusion requires pointwise fusion".to_string(),
            ));
        }
        Ok(())
    }
}

/// Optional code generation backends available to a target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Capabilities {
    /// Kernels can be generated for `fused_kernel` instructions.
    pub kernel_codegen: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Capabilities {
            kernel_codegen: true,
        }
    }
}

/// A hardware target, which decides the passes a module is compiled with.
pub trait Target {
    fn name(&self) -> &str;

    fn capabilities(&self) -> Capabilities;

    /// Build the pipeline for a configuration.
    fn passes(&self, config: &PipelineConfig) -> Pipeline;
}

/// A sequence of passes which is applied to a module.
#[derive(Default)]
pub struct Pipeline {
    passes: Vec<Box<dyn Pass>>,
    degraded: Vec<String>,
    validate: bool,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the module after each pass.
    pub fn with_validation(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    pub fn add<P: Pass + 'static>(&mut self, pass: P) {
        self.passes.push(Box::new(pass));
    }

    pub fn add_boxed(&mut self, pass: Box<dyn Pass>) {
        self.passes.push(pass);
    }

    /// Add an identity pass in place of `pass`, which can't run because the
    /// target lacks a capability.
    pub fn add_degraded<P: Pass>(&mut self, pass: P, reason: &str) {
        tracing::warn!(pass = pass.name(), reason, "pass disabled");
        self.degraded.push(pass.name().to_string());
        self.passes.push(Box::new(IdentityPass::new(pass.name())));
    }

    /// Return the names of passes replaced because of a missing capability.
    pub fn degraded(&self) -> &[String] {
        &self.degraded
    }

    pub fn pass_names(&self) -> Vec<&str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// Apply each pass to `module` in turn, stopping at the first error.
    pub fn run(&self, module: &mut Module) -> Result<(), CompileError> {
        for pass in &self.passes {
            let span = tracing::debug_span!("pass", pass = pass.name());
            let _guard = span.enter();

            let before = module.len();
            pass.apply(module)?;
            tracing::debug!(before, after = module.len(), "pass finished");

            if self.validate {
                module.validate()?;
            }
        }
        Ok(())
    }
}

/// A target which runs every pass it is configured with.
///
/// Kernel fusion is degraded to an identity pass if the target has no kernel
/// code generator.
#[derive(Clone, Debug, Default)]
pub struct ReferenceTarget {
    capabilities: Capabilities,
}

impl ReferenceTarget {
    pub fn new(capabilities: Capabilities) -> Self {
        ReferenceTarget { capabilities }
    }
}

impl Target for ReferenceTarget {
    fn name(&self) -> &str {
        "reference"
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn passes(&self, config: &PipelineConfig) -> Pipeline {
        let mut pipeline = Pipeline::new().with_validation(config.validate_after_each_pass);
        pipeline.add(DeadCodeElimination::new());
        pipeline.add_boxed(enable_pass(config.auto_contiguous, AutoContiguous::new()));
        pipeline.add(DeadCodeElimination::new());
        pipeline.add_boxed(enable_pass(config.pointwise_fusion, FusePointwise::new()));
        pipeline.add(DeadCodeElimination::new());
        if !config.kernel_fusion {
            pipeline.add_boxed(enable_pass(false, FuseKernels::new()));
        } else if self.capabilities.kernel_codegen {
            pipeline.add(FuseKernels::new());
        } else {
            pipeline.add_degraded(FuseKernels::new(), "target has no kernel code generator");
        }
        pipeline.add(DeadCodeElimination::new());
        pipeline.add_boxed(enable_pass(
            config.eliminate_contiguous,
            EliminateContiguous::new(),
        ));
        pipeline.add(DeadCodeElimination::new());
        pipeline
    }
}

/// Compile `module` in place for `target`.
pub fn compile(
    module: &mut Module,
    target: &dyn Target,
    config: &PipelineConfig,
) -> Result<(), CompileError> {
    config.validate()?;
    let pipeline = target.passes(config);
    tracing::info!(
        target_name = target.name(),
        module = module.name(),
        passes = pipeline.len(),
        "compiling module"
    );
    pipeline.run(module)
}
