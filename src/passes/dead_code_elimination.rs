use crate::error::CompileError;
use crate::module::{Module, ModuleRef};
use crate::ops::{Parameter, Return};
use crate::passes::Pass;

/// Remove instructions whose outputs are never used, and submodules which no
/// instruction refers to.
///
/// Parameters and the return instruction are always kept, so the interface
/// of the module does not change.
#[derive(Clone, Debug, Default)]
pub struct DeadCodeElimination {}

impl DeadCodeElimination {
    pub fn new() -> Self {
        DeadCodeElimination {}
    }

    /// Remove dead instructions from `module` and its submodules. Returns the
    /// number of instructions removed.
    pub fn eliminate(&self, module: &mut Module) -> Result<usize, CompileError> {
        let mut removed = 0;

        // Visiting in reverse order removes whole dead chains in one sweep,
        // since consumers are removed before their producers are visited.
        loop {
            let mut removed_in_sweep = 0;
            for id in module.instruction_ids().into_iter().rev() {
                let Some(instr) = module.get(id) else {
                    continue;
                };
                let op = instr.operator();
                if op.is::<Parameter>() || op.is::<Return>() || module.use_count(id) > 0 {
                    continue;
                }
                module.remove_instruction(id)?;
                removed_in_sweep += 1;
            }
            if removed_in_sweep == 0 {
                break;
            }
            removed += removed_in_sweep;
        }

        let unused: Vec<ModuleRef> = module
            .submodules()
            .map(|(module_ref, _)| module_ref)
            .filter(|&module_ref| !module.is_submodule_used(module_ref))
            .collect();
        for module_ref in unused {
            module.remove_submodule(module_ref)?;
        }

        let live: Vec<ModuleRef> = module.submodules().map(|(module_ref, _)| module_ref).collect();
        for module_ref in live {
            if let Some(submodule) = module.submodule_mut(module_ref) {
                removed += self.eliminate(submodule)?;
            }
        }

        Ok(removed)
    }
}

impl Pass for DeadCodeElimination {
    fn name(&self) -> &str {
        "dead_code_elimination"
    }

    fn apply(&self, module: &mut Module) -> Result<(), CompileError> {
        let removed = self.eliminate(module)?;
        tracing::debug!(module = module.name(), removed, "removed dead instructions");
        Ok(())
    }
}
