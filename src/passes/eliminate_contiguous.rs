use crate::error::CompileError;
use crate::module::{InstrId, Module};
use crate::ops::Contiguous;
use crate::passes::Pass;

/// Bypass `contiguous` instructions whose input already has a standard
/// layout.
///
/// The bypassed copies are left without uses, to be removed by dead code
/// elimination.
#[derive(Clone, Debug, Default)]
pub struct EliminateContiguous {}

impl EliminateContiguous {
    pub fn new() -> Self {
        EliminateContiguous {}
    }

    /// Returns the number of copies bypassed.
    pub fn bypass_copies(&self, module: &mut Module) -> Result<usize, CompileError> {
        let redundant: Vec<(InstrId, InstrId)> = module
            .iter()
            .filter(|(_, instr)| instr.operator().is::<Contiguous>())
            .filter_map(|(id, instr)| match instr.inputs() {
                [input] if module.shape(*input).is_some_and(|s| s.is_standard()) => {
                    Some((id, *input))
                }
                _ => None,
            })
            .collect();

        for &(copy, input) in &redundant {
            module.replace_uses(copy, input)?;
        }
        Ok(redundant.len())
    }
}

impl Pass for EliminateContiguous {
    fn name(&self) -> &str {
        "eliminate_contiguous"
    }

    fn apply(&self, module: &mut Module) -> Result<(), CompileError> {
        let bypassed = self.bypass_copies(module)?;
        tracing::debug!(module = module.name(), bypassed, "bypassed redundant copies");
        Ok(())
    }
}
