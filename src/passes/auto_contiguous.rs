use std::sync::Arc;

use crate::error::CompileError;
use crate::module::Module;
use crate::ops::{Contiguous, Literal, Parameter, Return};
use crate::passes::Pass;

/// Insert a `contiguous` copy after each instruction whose output is a
/// transposed or sliced view, so that consumers see a standard layout.
///
/// Broadcast views are left alone since pointwise consumers read them
/// directly. Parameters and literals are never copied.
#[derive(Clone, Debug, Default)]
pub struct AutoContiguous {}

impl AutoContiguous {
    pub fn new() -> Self {
        AutoContiguous {}
    }

    /// Returns the number of `contiguous` instructions inserted.
    pub fn insert_copies(&self, module: &mut Module) -> Result<usize, CompileError> {
        let mut inserted = 0;
        let ids = module.instruction_ids();

        for (pos, &id) in ids.iter().enumerate() {
            let Some(instr) = module.get(id) else {
                continue;
            };
            let op = instr.operator();
            if op.is::<Parameter>() || op.is::<Literal>() || op.is::<Return>() || op.is::<Contiguous>()
            {
                continue;
            }
            let shape = instr.shape();
            if shape.is_dynamic()
                || shape.is_tuple()
                || shape.is_standard()
                || shape.is_broadcasted()
                || shape.elements() == Some(0)
            {
                continue;
            }
            if module.use_count(id) == 0 {
                continue;
            }

            // The instruction is not the return, so a successor exists.
            let Some(&next) = ids.get(pos + 1) else {
                continue;
            };
            let copy = module.insert_instruction(next, Arc::new(Contiguous {}), &[id], &[])?;
            module.replace_uses(id, copy)?;
            inserted += 1;
        }
        Ok(inserted)
    }
}

impl Pass for AutoContiguous {
    fn name(&self) -> &str {
        "auto_contiguous"
    }

    fn apply(&self, module: &mut Module) -> Result<(), CompileError> {
        let inserted = self.insert_copies(module)?;
        tracing::debug!(module = module.name(), inserted, "inserted contiguous copies");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tgraph_shape::{DataType, Shape};

    use super::AutoContiguous;
    use crate::module::Module;
    use crate::ops::{MultiBroadcast, Relu, Transpose};

    #[test]
    fn test_inserts_copy_after_transpose() {
        let mut module = Module::new("main");
        let x = module
            .add_parameter("x", Shape::new(DataType::Float, &[2, 3]))
            .unwrap();
        let t = module
            .add_instruction(
                Transpose {
                    permutation: vec![1, 0],
                },
                &[x],
            )
            .unwrap();
        let r = module.add_instruction(Relu {}, &[t]).unwrap();
        module.add_return(&[r, t]).unwrap();

        let inserted = AutoContiguous::new().insert_copies(&mut module).unwrap();
        assert_eq!(inserted, 1);

        let copy = module.uses(t)[0];
        assert_eq!(module.get(copy).unwrap().name(), "contiguous");
        assert_eq!(module.uses(t), &[copy]);
        assert_eq!(module.get(r).unwrap().inputs(), &[copy]);
        assert_eq!(module.outputs()[1], copy);
        assert!(module.shape(copy).unwrap().is_standard());
        module.validate().unwrap();

        // A second run finds nothing more to do.
        assert_eq!(AutoContiguous::new().insert_copies(&mut module).unwrap(), 0);
    }

    #[test]
    fn test_skips_parameters_and_broadcasts() {
        let mut module = Module::new("main");
        let x = module
            .add_parameter(
                "x",
                Shape::with_strides(DataType::Float, &[2, 3], &[1, 2]),
            )
            .unwrap();
        let b = module
            .add_instruction(
                MultiBroadcast {
                    out_lens: Some(vec![4, 2, 3]),
                },
                &[x],
            )
            .unwrap();
        let r = module.add_instruction(Relu {}, &[b]).unwrap();
        module.add_return(&[r]).unwrap();

        let inserted = AutoContiguous::new().insert_copies(&mut module).unwrap();
        assert_eq!(inserted, 0);
    }
}
