//! Transformation passes which rewrite a [`Module`] in place.
//!
//! Passes are run in sequence by a [`Pipeline`](crate::pipeline::Pipeline).
//! Rewrites usually leave unused instructions behind, so the pipeline follows
//! most passes with [`DeadCodeElimination`].

use crate::error::CompileError;
use crate::module::Module;

mod auto_contiguous;
mod dead_code_elimination;
mod eliminate_contiguous;
mod fuse_kernels;
mod fuse_pointwise;

pub use auto_contiguous::AutoContiguous;
pub use dead_code_elimination::DeadCodeElimination;
pub use eliminate_contiguous::EliminateContiguous;
pub use fuse_kernels::FuseKernels;
pub use fuse_pointwise::FusePointwise;

/// A transformation applied to a whole module.
pub trait Pass {
    fn name(&self) -> &str;

    /// Rewrite `module` in place.
    ///
    /// An error leaves the module in an unspecified but structurally valid
    /// state, and aborts the pipeline.
    fn apply(&self, module: &mut Module) -> Result<(), CompileError>;
}

/// A pass which leaves the module unchanged.
///
/// This stands in for a pass which has been disabled, so that the list of
/// passes in a pipeline is the same whatever the configuration.
#[derive(Clone, Debug)]
pub struct IdentityPass {
    label: String,
    replaces: String,
}

impl IdentityPass {
    /// Create an identity pass standing in for the pass named `replaces`.
    pub fn new(replaces: &str) -> IdentityPass {
        IdentityPass {
            label: format!("identity({})", replaces),
            replaces: replaces.to_string(),
        }
    }

    /// Return the name of the pass this one replaces.
    pub fn replaces(&self) -> &str {
        &self.replaces
    }
}

impl Pass for IdentityPass {
    fn name(&self) -> &str {
        &self.label
    }

    fn apply(&self, _: &mut Module) -> Result<(), CompileError> {
        Ok(())
    }
}

/// Return `pass` if `enabled` is true, or an [`IdentityPass`] in its place.
pub fn enable_pass<P: Pass + 'static>(enabled: bool, pass: P) -> Box<dyn Pass> {
    if enabled {
        Box::new(pass)
    } else {
        Box::new(IdentityPass::new(pass.name()))
    }
}
