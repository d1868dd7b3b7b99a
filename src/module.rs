//! Instruction graphs.
//!
//! A [`Module`] is an ordered list of [`Instruction`]s, each of which applies
//! an operator to the outputs of earlier instructions. Modules may own
//! submodules, which higher-order instructions such as `pointwise` refer to
//! via a [`ModuleRef`].
//!
//! The module keeps an index of the consumers of each instruction, which is
//! updated by every mutation, and caches the output shape of every
//! instruction. Shapes are recomputed whenever an instruction's inputs
//! change.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use tgraph_shape::Shape;

mod instr_id;
mod instruction;

#[cfg(test)]
mod tests;

pub use instr_id::{InstrId, ModuleRef};
pub use instruction::{InstrInputs, InstrSubmodules, Instruction};

use crate::error::{CompileError, StructuralError};
use crate::operator::{normalize_operator, Operator, SharedOperator};
use crate::ops::{Literal, Parameter, Return};

/// Compare parameter names, ordering a trailing number numerically so that
/// `x2` sorts before `x10`.
pub fn compare_param_names(a: &str, b: &str) -> Ordering {
    fn split(name: &str) -> (&str, Option<u64>) {
        let prefix_len = name.trim_end_matches(|c: char| c.is_ascii_digit()).len();
        let (prefix, digits) = name.split_at(prefix_len);
        (prefix, digits.parse().ok())
    }
    let (a_prefix, a_num) = split(a);
    let (b_prefix, b_num) = split(b);
    a_prefix
        .cmp(b_prefix)
        .then(a_num.cmp(&b_num))
        .then_with(|| a.cmp(b))
}

/// An ordered graph of instructions.
#[derive(Clone, Debug)]
pub struct Module {
    name: String,

    /// Set for modules which describe the computation of a fused kernel.
    bypass: bool,

    /// Instruction storage, indexed by [`InstrId`]. Removed instructions
    /// leave a `None` entry so that IDs are never reused.
    instructions: Vec<Option<Instruction>>,

    /// Evaluation order of the live instructions.
    order: Vec<InstrId>,

    parameters: FxHashMap<String, InstrId>,
    return_id: Option<InstrId>,

    /// Map of instruction ID to the IDs of instructions which consume it.
    uses: FxHashMap<InstrId, Vec<InstrId>>,

    submodules: Vec<Option<Module>>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Module {
        Module {
            name: name.into(),
            bypass: false,
            instructions: Vec::new(),
            order: Vec::new(),
            parameters: FxHashMap::default(),
            return_id: None,
            uses: FxHashMap::default(),
            submodules: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return true if this module describes the computation of a fused
    /// kernel rather than a standalone function.
    pub fn is_bypass(&self) -> bool {
        self.bypass
    }

    pub fn set_bypass(&mut self, bypass: bool) {
        self.bypass = bypass;
    }

    /// Return the number of instructions in the module.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn get(&self, id: InstrId) -> Option<&Instruction> {
        self.instructions.get(id.as_usize()).and_then(|i| i.as_ref())
    }

    fn instr(&self, id: InstrId) -> Result<&Instruction, StructuralError> {
        self.get(id).ok_or(StructuralError::InvalidInstruction(id))
    }

    fn instr_mut(&mut self, id: InstrId) -> Result<&mut Instruction, StructuralError> {
        self.instructions
            .get_mut(id.as_usize())
            .and_then(|i| i.as_mut())
            .ok_or(StructuralError::InvalidInstruction(id))
    }

    /// Return the cached output shape of an instruction.
    pub fn shape(&self, id: InstrId) -> Option<&Shape> {
        self.get(id).map(|i| i.shape())
    }

    /// Iterate over instructions in evaluation order.
    pub fn iter(&self) -> impl Iterator<Item = (InstrId, &Instruction)> + '_ {
        self.order
            .iter()
            .filter_map(|&id| self.get(id).map(|instr| (id, instr)))
    }

    /// Return a snapshot of the instruction IDs in evaluation order.
    ///
    /// This is useful for passes which mutate the module while visiting
    /// each instruction.
    pub fn instruction_ids(&self) -> Vec<InstrId> {
        self.order.clone()
    }

    /// Return the position of an instruction in evaluation order.
    pub fn position(&self, id: InstrId) -> Option<usize> {
        self.order.iter().position(|&other| other == id)
    }

    /// Return the instructions which consume the output of `id`, in the
    /// order the uses were created. Each consumer appears once.
    pub fn uses(&self, id: InstrId) -> &[InstrId] {
        self.uses.get(&id).map(|u| u.as_slice()).unwrap_or(&[])
    }

    pub fn use_count(&self, id: InstrId) -> usize {
        self.uses(id).len()
    }

    fn add_use(&mut self, producer: InstrId, consumer: InstrId) {
        let users = self.uses.entry(producer).or_default();
        if !users.contains(&consumer) {
            users.push(consumer);
        }
    }

    fn remove_use(&mut self, producer: InstrId, consumer: InstrId) {
        if let Some(users) = self.uses.get_mut(&producer) {
            users.retain(|&user| user != consumer);
        }
    }

    /// Normalize `op` and compute its output shape for the given inputs.
    fn infer_shape(
        &self,
        op: &SharedOperator,
        inputs: &[InstrId],
        submodules: &[ModuleRef],
    ) -> Result<(SharedOperator, Shape), CompileError> {
        self.infer_shape_with(op, inputs, submodules, &FxHashMap::default())
    }

    /// Variant of [`infer_shape`](Module::infer_shape) which reads the shape
    /// of an input from `pending` if it has an entry there.
    fn infer_shape_with(
        &self,
        op: &SharedOperator,
        inputs: &[InstrId],
        submodules: &[ModuleRef],
        pending: &FxHashMap<InstrId, Shape>,
    ) -> Result<(SharedOperator, Shape), CompileError> {
        let input_shapes = inputs
            .iter()
            .map(|&id| match pending.get(&id) {
                Some(shape) => Ok(shape.clone()),
                None => self.instr(id).map(|instr| instr.shape().clone()),
            })
            .collect::<Result<Vec<_>, _>>()?;
        let modules = submodules
            .iter()
            .map(|&r| self.submodule(r).ok_or(StructuralError::InvalidSubmodule(r)))
            .collect::<Result<Vec<_>, _>>()?;

        let op = normalize_operator(op.as_ref(), &input_shapes)?.unwrap_or_else(|| op.clone());
        let shape = op
            .compute_shape(&input_shapes, &modules)
            .map_err(|err| CompileError::shape(op.name(), err))?;
        Ok((op, shape))
    }

    /// Check that each of `inputs` exists and is evaluated before `position`.
    fn check_inputs_precede(
        &self,
        consumer: InstrId,
        inputs: &[InstrId],
        position: usize,
    ) -> Result<(), StructuralError> {
        for &input in inputs {
            match self.position(input) {
                Some(pos) if pos < position => {}
                Some(_) => return Err(StructuralError::OrderViolation { consumer, input }),
                None => return Err(StructuralError::InvalidInstruction(input)),
            }
        }
        Ok(())
    }

    fn next_id(&self) -> InstrId {
        InstrId::from_u32(self.instructions.len() as u32)
    }

    fn insert_at(
        &mut self,
        position: usize,
        op: SharedOperator,
        inputs: &[InstrId],
        submodules: &[ModuleRef],
    ) -> Result<InstrId, CompileError> {
        let id = self.next_id();
        self.check_inputs_precede(id, inputs, position)?;
        let (op, shape) = self.infer_shape(&op, inputs, submodules)?;

        self.instructions.push(Some(Instruction::new(
            op,
            inputs.into(),
            submodules.into(),
            shape,
        )));
        self.order.insert(position, id);
        for &input in inputs {
            self.add_use(input, id);
        }
        Ok(id)
    }

    /// Position at which new instructions are appended. This keeps the
    /// return instruction last.
    fn append_position(&self) -> usize {
        self.return_id
            .and_then(|id| self.position(id))
            .unwrap_or(self.order.len())
    }

    /// Add a named parameter.
    pub fn add_parameter(&mut self, name: &str, shape: Shape) -> Result<InstrId, CompileError> {
        if self.parameters.contains_key(name) {
            return Err(StructuralError::DuplicateParameter(name.to_string()).into());
        }
        let op = Arc::new(Parameter {
            name: name.to_string(),
            shape,
        });
        let id = self.insert_at(self.append_position(), op, &[], &[])?;
        self.parameters.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn add_literal(&mut self, literal: Literal) -> Result<InstrId, CompileError> {
        self.insert_at(self.append_position(), Arc::new(literal), &[], &[])
    }

    /// Append an instruction, before the return instruction if there is one.
    pub fn add_instruction<Op: Operator + Send + Sync>(
        &mut self,
        op: Op,
        inputs: &[InstrId],
    ) -> Result<InstrId, CompileError> {
        self.add_shared_instruction(Arc::new(op), inputs, &[])
    }

    /// Append an instruction which refers to submodules of this module.
    pub fn add_instruction_with_modules<Op: Operator + Send + Sync>(
        &mut self,
        op: Op,
        inputs: &[InstrId],
        submodules: &[ModuleRef],
    ) -> Result<InstrId, CompileError> {
        self.add_shared_instruction(Arc::new(op), inputs, submodules)
    }

    /// Variant of [`add_instruction_with_modules`](Module::add_instruction_with_modules)
    /// which takes a shared operator.
    ///
    /// Parameter and return operators are routed to
    /// [`add_parameter`](Module::add_parameter) and
    /// [`add_return`](Module::add_return).
    pub fn add_shared_instruction(
        &mut self,
        op: SharedOperator,
        inputs: &[InstrId],
        submodules: &[ModuleRef],
    ) -> Result<InstrId, CompileError> {
        if let Some(param) = op.downcast_ref::<Parameter>() {
            return self.add_parameter(&param.name, param.shape.clone());
        }
        if op.is::<Return>() {
            return self.add_return(inputs);
        }
        self.insert_at(self.append_position(), op, inputs, submodules)
    }

    /// Insert an instruction immediately before `before`.
    pub fn insert_instruction(
        &mut self,
        before: InstrId,
        op: SharedOperator,
        inputs: &[InstrId],
        submodules: &[ModuleRef],
    ) -> Result<InstrId, CompileError> {
        if op.is::<Parameter>() || op.is::<Return>() {
            return Err(StructuralError::MisplacedBuiltin(op.name().to_string()).into());
        }
        let position = self
            .position(before)
            .ok_or(StructuralError::InvalidInstruction(before))?;
        self.insert_at(position, op, inputs, submodules)
    }

    /// Add the return instruction, whose inputs are the module's outputs.
    pub fn add_return(&mut self, inputs: &[InstrId]) -> Result<InstrId, CompileError> {
        if self.return_id.is_some() {
            return Err(StructuralError::DuplicateReturn(self.name.clone()).into());
        }
        let id = self.insert_at(self.order.len(), Arc::new(Return {}), inputs, &[])?;
        self.return_id = Some(id);
        Ok(id)
    }

    pub fn return_id(&self) -> Option<InstrId> {
        self.return_id
    }

    /// Return the instructions whose values the module returns.
    pub fn outputs(&self) -> &[InstrId] {
        self.return_id
            .and_then(|id| self.get(id))
            .map(|ret| ret.inputs())
            .unwrap_or(&[])
    }

    pub fn output_shapes(&self) -> Vec<Shape> {
        self.outputs()
            .iter()
            .filter_map(|&id| self.shape(id).cloned())
            .collect()
    }

    pub fn get_parameter(&self, name: &str) -> Option<InstrId> {
        self.parameters.get(name).copied()
    }

    /// Return parameter names, ordered by [`compare_param_names`].
    ///
    /// This is the order in which the inputs of a higher-order instruction
    /// are bound to the parameters of its submodule.
    pub fn parameter_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.parameters.keys().map(|k| k.as_str()).collect();
        names.sort_by(|a, b| compare_param_names(a, b));
        names
    }

    /// Return parameter IDs in the order of [`parameter_names`](Module::parameter_names).
    pub fn parameters(&self) -> Vec<InstrId> {
        self.parameter_names()
            .into_iter()
            .filter_map(|name| self.get_parameter(name))
            .collect()
    }

    /// Return parameter shapes in the order of [`parameter_names`](Module::parameter_names).
    pub fn parameter_shapes(&self) -> Vec<Shape> {
        self.parameters()
            .into_iter()
            .filter_map(|id| self.shape(id).cloned())
            .collect()
    }

    /// Replace the operator, inputs and submodules of an instruction in
    /// place, keeping its ID and its consumers.
    ///
    /// If the output shape changes, the shapes of all dependent instructions
    /// are recomputed. If any of them fails shape inference, the module is
    /// left unchanged.
    pub fn replace_instruction(
        &mut self,
        id: InstrId,
        op: SharedOperator,
        inputs: &[InstrId],
        submodules: &[ModuleRef],
    ) -> Result<(), CompileError> {
        let old = self.instr(id)?;
        let is_builtin = |op: &(dyn Operator + Send + Sync)| op.is::<Parameter>() || op.is::<Return>();
        if is_builtin(old.operator()) || is_builtin(op.as_ref()) {
            return Err(StructuralError::NotReplaceable(id).into());
        }
        let old_inputs: InstrInputs = old.inputs().into();
        let old_shape = old.shape().clone();

        let position = self
            .position(id)
            .ok_or(StructuralError::InvalidInstruction(id))?;
        self.check_inputs_precede(id, inputs, position)?;
        let (op, shape) = self.infer_shape(&op, inputs, submodules)?;

        let mut changed = FxHashMap::default();
        if shape != old_shape {
            changed.insert(id, shape.clone());
        }
        let changed = self.propagated_shapes(changed, &[])?;

        for &input in &old_inputs {
            self.remove_use(input, id);
        }
        for &input in inputs {
            self.add_use(input, id);
        }
        self.instr_mut(id)?
            .update(op, inputs.into(), submodules.into(), shape);
        self.commit_shapes(changed)
    }

    /// Compute the shapes which change when the instructions in `changed`
    /// take their new shapes and each instruction in `stale` is re-inferred.
    ///
    /// Returns `changed` extended with every dependent instruction whose
    /// shape differs from its cached one. The module is not modified.
    fn propagated_shapes(
        &self,
        mut changed: FxHashMap<InstrId, Shape>,
        stale: &[InstrId],
    ) -> Result<FxHashMap<InstrId, Shape>, CompileError> {
        let Some(start) = changed
            .keys()
            .chain(stale)
            .filter_map(|&id| self.position(id))
            .min()
        else {
            return Ok(changed);
        };

        for &id in &self.order[start..] {
            if changed.contains_key(&id) {
                continue;
            }
            let instr = self.instr(id)?;
            let needs_update = stale.contains(&id)
                || instr.inputs().iter().any(|input| changed.contains_key(input));
            if !needs_update {
                continue;
            }
            let (_, shape) = self.infer_shape_with(
                &instr.clone_operator(),
                instr.inputs(),
                instr.submodules(),
                &changed,
            )?;
            if *instr.shape() != shape {
                changed.insert(id, shape);
            }
        }
        Ok(changed)
    }

    fn commit_shapes(&mut self, shapes: FxHashMap<InstrId, Shape>) -> Result<(), CompileError> {
        for (id, shape) in shapes {
            self.instr_mut(id)?.set_shape(shape);
        }
        Ok(())
    }

    /// Move `id` so that it is evaluated immediately before `before`.
    fn move_before(&mut self, id: InstrId, before: InstrId) -> Result<(), StructuralError> {
        let target = self
            .position(before)
            .ok_or(StructuralError::InvalidInstruction(before))?;
        let inputs: InstrInputs = self.instr(id)?.inputs().into();
        self.check_inputs_precede(before, &inputs, target)
            .map_err(|_| StructuralError::OrderViolation {
                consumer: before,
                input: id,
            })?;

        self.order.retain(|&other| other != id);
        let target = self
            .position(before)
            .ok_or(StructuralError::InvalidInstruction(before))?;
        self.order.insert(target, id);
        Ok(())
    }

    /// Make every consumer of `old` consume `new` instead, including the
    /// return instruction.
    ///
    /// If `new` is evaluated after the first consumer of `old`, it is moved
    /// before it, provided its own inputs allow this. If a consumer fails
    /// shape inference with its new input, the uses are left as they were.
    pub fn replace_uses(&mut self, old: InstrId, new: InstrId) -> Result<(), CompileError> {
        if old == new {
            return Ok(());
        }
        self.instr(old)?;
        let new_pos = self
            .position(new)
            .ok_or(StructuralError::InvalidInstruction(new))?;

        let consumers: Vec<InstrId> = self
            .uses(old)
            .iter()
            .copied()
            .filter(|&user| user != new)
            .collect();
        let first_consumer = consumers
            .iter()
            .filter_map(|&user| self.position(user).map(|pos| (pos, user)))
            .min();
        let Some((first_pos, first_user)) = first_consumer else {
            return Ok(());
        };
        if new_pos > first_pos {
            self.move_before(new, first_user)?;
        }

        let mut saved_inputs = Vec::with_capacity(consumers.len());
        for &user in &consumers {
            let instr = self.instr_mut(user)?;
            saved_inputs.push(InstrInputs::from(instr.inputs()));
            instr.replace_input(old, new);
            self.remove_use(old, user);
            self.add_use(new, user);
        }

        match self.propagated_shapes(FxHashMap::default(), &consumers) {
            Ok(shapes) => self.commit_shapes(shapes),
            Err(err) => {
                for (&user, inputs) in consumers.iter().zip(saved_inputs) {
                    if !inputs.contains(&new) {
                        self.remove_use(new, user);
                    }
                    self.add_use(old, user);
                    self.instr_mut(user)?.set_inputs(inputs);
                }
                Err(err)
            }
        }
    }

    /// Remove an instruction which has no remaining uses.
    pub fn remove_instruction(&mut self, id: InstrId) -> Result<(), CompileError> {
        let uses = self.use_count(id);
        if uses > 0 {
            return Err(StructuralError::InstructionInUse { id, uses }.into());
        }
        let instr = self
            .instructions
            .get_mut(id.as_usize())
            .and_then(Option::take)
            .ok_or(StructuralError::InvalidInstruction(id))?;

        for &input in instr.inputs() {
            self.remove_use(input, id);
        }
        self.order.retain(|&other| other != id);
        self.uses.remove(&id);
        if let Some(param) = instr.operator().downcast_ref::<Parameter>() {
            self.parameters.remove(&param.name);
        }
        if self.return_id == Some(id) {
            self.return_id = None;
        }
        Ok(())
    }

    /// Add a submodule and return a reference to it.
    pub fn add_submodule(&mut self, module: Module) -> ModuleRef {
        let module_ref = ModuleRef(self.submodules.len() as u32);
        self.submodules.push(Some(module));
        module_ref
    }

    /// Create an empty submodule with the given name.
    pub fn create_submodule(&mut self, name: &str) -> ModuleRef {
        self.add_submodule(Module::new(name))
    }

    pub fn submodule(&self, module_ref: ModuleRef) -> Option<&Module> {
        self.submodules
            .get(module_ref.as_usize())
            .and_then(|m| m.as_ref())
    }

    /// Return a mutable reference to a submodule.
    ///
    /// Callers are responsible for keeping the submodule consistent with the
    /// instructions that refer to it.
    pub fn submodule_mut(&mut self, module_ref: ModuleRef) -> Option<&mut Module> {
        self.submodules
            .get_mut(module_ref.as_usize())
            .and_then(|m| m.as_mut())
    }

    /// Iterate over the live submodules of this module.
    pub fn submodules(&self) -> impl Iterator<Item = (ModuleRef, &Module)> + '_ {
        self.submodules
            .iter()
            .enumerate()
            .filter_map(|(i, m)| m.as_ref().map(|m| (ModuleRef(i as u32), m)))
    }

    /// Return true if any instruction refers to `module_ref`.
    pub fn is_submodule_used(&self, module_ref: ModuleRef) -> bool {
        self.iter()
            .any(|(_, instr)| instr.submodules().contains(&module_ref))
    }

    /// Remove a submodule which no instruction refers to.
    pub fn remove_submodule(&mut self, module_ref: ModuleRef) -> Result<Module, StructuralError> {
        if self.is_submodule_used(module_ref) {
            return Err(StructuralError::SubmoduleInUse(module_ref));
        }
        self.submodules
            .get_mut(module_ref.as_usize())
            .and_then(Option::take)
            .ok_or(StructuralError::InvalidSubmodule(module_ref))
    }

    /// Return `base` if no submodule has that name, or `base` with the
    /// smallest numeric suffix that makes it unique.
    pub fn unique_submodule_name(&self, base: &str) -> String {
        let taken: FxHashSet<&str> = self.submodules().map(|(_, m)| m.name()).collect();
        if !taken.contains(base) {
            return base.to_string();
        }
        (1..)
            .map(|i| format!("{}_{}", base, i))
            .find(|name| !taken.contains(name.as_str()))
            .unwrap_or_else(|| base.to_string())
    }

    /// Copy the instructions of `src` into this module, appending them.
    ///
    /// `map` must map every parameter of `src` to an instruction in this
    /// module. It is updated with the ID of each copied instruction, and
    /// instructions which are already mapped are not copied. Returns the
    /// IDs which correspond to the outputs of `src`.
    pub fn insert_instructions(
        &mut self,
        src: &Module,
        map: &mut FxHashMap<InstrId, InstrId>,
    ) -> Result<Vec<InstrId>, CompileError> {
        let lookup = |map: &FxHashMap<InstrId, InstrId>, id: InstrId| {
            map.get(&id)
                .copied()
                .ok_or(StructuralError::InvalidInstruction(id))
        };

        for (id, instr) in src.iter() {
            if map.contains_key(&id) {
                continue;
            }
            if let Some(param) = instr.operator().downcast_ref::<Parameter>() {
                return Err(StructuralError::UnmappedParameter(param.name.clone()).into());
            }
            if instr.operator().is::<Return>() {
                let outputs = instr
                    .inputs()
                    .iter()
                    .map(|&input| lookup(map, input))
                    .collect::<Result<Vec<_>, _>>()?;
                return Ok(outputs);
            }
            if !instr.submodules().is_empty() {
                return Err(StructuralError::NestedSubmodules.into());
            }
            let inputs = instr
                .inputs()
                .iter()
                .map(|&input| lookup(map, input))
                .collect::<Result<InstrInputs, _>>()?;
            let new_id = self.add_shared_instruction(instr.clone_operator(), &inputs, &[])?;
            map.insert(id, new_id);
        }
        Err(StructuralError::MissingReturn(src.name.clone()).into())
    }

    /// Check the structural invariants of this module and its submodules.
    ///
    /// - Every input of an instruction is evaluated before it
    /// - The use index matches the inputs of each instruction
    /// - Cached shapes match the result of shape inference
    /// - The module ends with its return instruction
    pub fn validate(&self) -> Result<(), CompileError> {
        let mut seen = FxHashSet::default();
        let mut expected_uses: FxHashMap<InstrId, Vec<InstrId>> = FxHashMap::default();

        for (pos, &id) in self.order.iter().enumerate() {
            let instr = self.instr(id)?;
            for &input in instr.inputs() {
                if !seen.contains(&input) {
                    self.instr(input)?;
                    return Err(StructuralError::OrderViolation {
                        consumer: id,
                        input,
                    }
                    .into());
                }
                let users = expected_uses.entry(input).or_default();
                if !users.contains(&id) {
                    users.push(id);
                }
            }

            let (_, shape) =
                self.infer_shape(&instr.clone_operator(), instr.inputs(), instr.submodules())?;
            if shape != *instr.shape() {
                return Err(StructuralError::StaleShape(id).into());
            }
            if instr.operator().is::<Return>() && pos + 1 != self.order.len() {
                return Err(StructuralError::ReturnNotLast(self.name.clone()).into());
            }
            seen.insert(id);
        }

        if self.return_id.is_none() {
            return Err(StructuralError::MissingReturn(self.name.clone()).into());
        }

        let live = self.instructions.iter().filter(|i| i.is_some()).count();
        for (&id, users) in &self.uses {
            if !seen.contains(&id) && !users.is_empty() {
                return Err(StructuralError::InconsistentUses(id).into());
            }
        }
        for &id in &self.order {
            let mut actual = self.uses(id).to_vec();
            let mut expected = expected_uses.remove(&id).unwrap_or_default();
            actual.sort();
            expected.sort();
            if actual != expected {
                return Err(StructuralError::InconsistentUses(id).into());
            }
        }
        if live != self.order.len() {
            if let Some(id) = (0..self.instructions.len() as u32)
                .map(InstrId::from_u32)
                .find(|id| self.get(*id).is_some() && !seen.contains(id))
            {
                return Err(StructuralError::InvalidInstruction(id).into());
            }
        }

        for (_, submodule) in self.submodules() {
            submodule.validate()?;
        }
        Ok(())
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "module: \"{}\"", self.name)?;

        let labels: FxHashMap<InstrId, usize> = self
            .order
            .iter()
            .enumerate()
            .map(|(pos, &id)| (id, pos))
            .collect();
        let label = |id: &InstrId| match labels.get(id) {
            Some(pos) => format!("@{}", pos),
            None => format!("@?{}", id),
        };

        for (pos, (_, instr)) in self.iter().enumerate() {
            write!(f, "@{} = {}", pos, instr.name())?;
            if let Some(param) = instr.operator().downcast_ref::<Parameter>() {
                write!(f, ":{}", param.name)?;
            }
            if !instr.submodules().is_empty() {
                let names: Vec<&str> = instr
                    .submodules()
                    .iter()
                    .map(|&r| self.submodule(r).map(|m| m.name()).unwrap_or("?"))
                    .collect();
                write!(f, "[{}]", names.join(", "))?;
            }
            if !instr.inputs().is_empty() {
                let inputs: Vec<String> = instr.inputs().iter().map(label).collect();
                write!(f, "({})", inputs.join(", "))?;
            }
            if instr.operator().is::<Return>() {
                writeln!(f)?;
            } else {
                writeln!(f, " -> {}", instr.shape())?;
            }
        }

        for (_, submodule) in self.submodules() {
            writeln!(f)?;
            write!(f, "{}", submodule)?;
        }
        Ok(())
    }
}
