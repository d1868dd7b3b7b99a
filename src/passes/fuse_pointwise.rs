use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use tgraph_shape::Shape;

use crate::error::{CompileError, StructuralError};
use crate::module::{InstrId, Module, ModuleRef};
use crate::operator::Operator;
use crate::ops::{Literal, Pointwise};
use crate::passes::Pass;

/// Group pointwise operators into `pointwise` instructions.
///
/// Each pointwise operator is first wrapped in a `pointwise` instruction
/// whose body applies the operator to scalar parameters. Scalar literal
/// inputs are moved into the body. Then each `pointwise` instruction whose
/// only consumer is another `pointwise` instruction is merged into that
/// consumer, until no more merges apply.
#[derive(Clone, Debug, Default)]
pub struct FusePointwise {}

/// Inputs and body of a `pointwise` instruction.
struct PointwiseParts {
    inputs: Vec<InstrId>,
    body: Module,
}

impl PointwiseParts {
    fn get(module: &Module, id: InstrId) -> Option<PointwiseParts> {
        let instr = module.get(id)?;
        if !instr.operator().is::<Pointwise>() {
            return None;
        }
        let [body] = instr.submodules() else {
            return None;
        };
        Some(PointwiseParts {
            inputs: instr.inputs().to_vec(),
            body: module.submodule(*body)?.clone(),
        })
    }

    /// Map the parameters of the body, in parameter-name order, to `args`.
    fn bind_params(
        &self,
        args: impl Iterator<Item = InstrId>,
    ) -> Result<FxHashMap<InstrId, InstrId>, StructuralError> {
        let params = self.body.parameters();
        let map: FxHashMap<InstrId, InstrId> = params.iter().copied().zip(args).collect();
        if map.len() != params.len() {
            return Err(StructuralError::TooFewInputs {
                expected: params.len(),
                actual: map.len(),
            });
        }
        Ok(map)
    }
}

fn next_body_name(module: &Module) -> String {
    module.unique_submodule_name(&format!("pointwise{}", module.submodules().count()))
}

fn pointwise_shape(module: &Module, inputs: &[InstrId], body: &Module) -> Result<Shape, CompileError> {
    let shapes = inputs
        .iter()
        .map(|&id| {
            module
                .shape(id)
                .cloned()
                .ok_or(StructuralError::InvalidInstruction(id))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Pointwise {}
        .compute_shape(&shapes, &[body])
        .map_err(|err| CompileError::shape("pointwise", err))
}

impl FusePointwise {
    pub fn new() -> Self {
        FusePointwise {}
    }

    /// Wrap each pointwise operator in a `pointwise` instruction. Returns the
    /// number of operators wrapped.
    pub fn wrap_operators(&self, module: &mut Module) -> Result<usize, CompileError> {
        let mut wrapped = 0;

        for id in module.instruction_ids() {
            let Some(instr) = module.get(id) else {
                continue;
            };
            let op = instr.operator();
            if !op.is_pointwise() || op.is::<Pointwise>() || !instr.submodules().is_empty() {
                continue;
            }

            let mut body = Module::new(next_body_name(module));
            let mut inputs: Vec<InstrId> = Vec::new();
            let mut args: Vec<InstrId> = Vec::new();
            let mut arg_for_input: FxHashMap<InstrId, InstrId> = FxHashMap::default();

            for &input in instr.inputs() {
                if let Some(&arg) = arg_for_input.get(&input) {
                    args.push(arg);
                    continue;
                }
                let input_instr = module
                    .get(input)
                    .ok_or(StructuralError::InvalidInstruction(input))?;
                let arg = match input_instr.operator().downcast_ref::<Literal>() {
                    Some(literal) if literal.shape().is_scalar() => body.add_literal(literal.clone())?,
                    _ => {
                        let name = format!("x{}", inputs.len());
                        inputs.push(input);
                        body.add_parameter(&name, Shape::scalar(input_instr.shape().dtype()))?
                    }
                };
                arg_for_input.insert(input, arg);
                args.push(arg);
            }

            // Operators applied only to literals are left for constant folding.
            if inputs.is_empty() {
                continue;
            }

            let output = body.add_shared_instruction(instr.clone_operator(), &args, &[])?;
            body.add_return(&[output])?;

            let shape = pointwise_shape(module, &inputs, &body)?;
            if shape != *instr.shape() {
                tracing::debug!(
                    instr = %id,
                    op = instr.name(),
                    "not wrapping operator whose output shape would change"
                );
                continue;
            }

            let body_ref = module.add_submodule(body);
            module.replace_instruction(id, Arc::new(Pointwise {}), &inputs, &[body_ref])?;
            wrapped += 1;
        }
        Ok(wrapped)
    }

    /// Find a `pointwise` instruction which consumes the output of another
    /// `pointwise` instruction with no other uses.
    fn find_merge(
        &self,
        module: &Module,
        rejected: &FxHashSet<(InstrId, InstrId)>,
    ) -> Option<(InstrId, InstrId)> {
        module
            .iter()
            .filter(|(_, instr)| instr.operator().is::<Pointwise>())
            .find_map(|(consumer, instr)| {
                instr.inputs().iter().find_map(|&producer| {
                    let is_candidate = module.use_count(producer) == 1
                        && !rejected.contains(&(consumer, producer))
                        && module
                            .get(producer)
                            .is_some_and(|p| p.operator().is::<Pointwise>());
                    is_candidate.then_some((consumer, producer))
                })
            })
    }

    /// Merge the body of `producer` into the body of `consumer`.
    ///
    /// Returns false if the merged instruction would have a different shape.
    fn merge(
        &self,
        module: &mut Module,
        consumer: InstrId,
        producer: InstrId,
    ) -> Result<bool, CompileError> {
        let (Some(outer), Some(inner)) = (
            PointwiseParts::get(module, consumer),
            PointwiseParts::get(module, producer),
        ) else {
            return Ok(false);
        };

        let mut inputs: Vec<InstrId> = Vec::new();
        for &input in &outer.inputs {
            let expanded: &[InstrId] = if input == producer {
                &inner.inputs
            } else {
                std::slice::from_ref(&input)
            };
            for &id in expanded {
                if !inputs.contains(&id) {
                    inputs.push(id);
                }
            }
        }

        let mut body = Module::new(next_body_name(module));
        let mut param_for_input: FxHashMap<InstrId, InstrId> = FxHashMap::default();
        for (i, &input) in inputs.iter().enumerate() {
            let dtype = module
                .shape(input)
                .ok_or(StructuralError::InvalidInstruction(input))?
                .dtype();
            let param = body.add_parameter(&format!("x{}", i), Shape::scalar(dtype))?;
            param_for_input.insert(input, param);
        }

        let mut inner_map =
            inner.bind_params(inner.inputs.iter().map(|input| param_for_input[input]))?;
        let inner_outputs = body.insert_instructions(&inner.body, &mut inner_map)?;
        let &[inner_output] = inner_outputs.as_slice() else {
            return Ok(false);
        };

        let mut outer_map = outer.bind_params(outer.inputs.iter().map(|input| {
            if *input == producer {
                inner_output
            } else {
                param_for_input[input]
            }
        }))?;
        let outputs = body.insert_instructions(&outer.body, &mut outer_map)?;
        body.add_return(&outputs)?;

        let shape = pointwise_shape(module, &inputs, &body)?;
        if module.shape(consumer) != Some(&shape) {
            return Ok(false);
        }

        let body_ref: ModuleRef = module.add_submodule(body);
        module.replace_instruction(consumer, Arc::new(Pointwise {}), &inputs, &[body_ref])?;
        Ok(true)
    }

    /// Merge chains of `pointwise` instructions. Returns the number of merges
    /// performed.
    pub fn merge_instructions(&self, module: &mut Module) -> Result<usize, CompileError> {
        let mut merged = 0;
        let mut rejected = FxHashSet::default();
        while let Some((consumer, producer)) = self.find_merge(module, &rejected) {
            if self.merge(module, consumer, producer)? {
                merged += 1;
            } else {
                rejected.insert((consumer, producer));
            }
        }
        Ok(merged)
    }
}

impl Pass for FusePointwise {
    fn name(&self) -> &str {
        "fuse_pointwise"
    }

    fn apply(&self, module: &mut Module) -> Result<(), CompileError> {
        let wrapped = self.wrap_operators(module)?;
        let merged = self.merge_instructions(module)?;
        tracing::debug!(module = module.name(), wrapped, merged, "fused pointwise operators");
        Ok(())
    }
}
