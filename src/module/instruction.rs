use smallvec::SmallVec;
use tgraph_shape::Shape;

use super::{InstrId, ModuleRef};
use crate::operator::{Operator, SharedOperator};

/// Input IDs of an instruction.
pub type InstrInputs = SmallVec<[InstrId; 4]>;

/// Submodules attached to an instruction.
pub type InstrSubmodules = SmallVec<[ModuleRef; 1]>;

/// An operation in a [`Module`](crate::Module), together with its inputs and
/// cached output shape.
#[derive(Clone, Debug)]
pub struct Instruction {
    op: SharedOperator,
    inputs: InstrInputs,
    submodules: InstrSubmodules,
    shape: Shape,
}

impl Instruction {
    pub(crate) fn new(
        op: SharedOperator,
        inputs: InstrInputs,
        submodules: InstrSubmodules,
        shape: Shape,
    ) -> Instruction {
        Instruction {
            op,
            inputs,
            submodules,
            shape,
        }
    }

    /// Return the name of the operator.
    pub fn name(&self) -> &str {
        self.op.name()
    }

    pub fn operator(&self) -> &(dyn Operator + Send + Sync) {
        self.op.as_ref()
    }

    /// Return a new handle to the operator.
    pub fn clone_operator(&self) -> SharedOperator {
        self.op.clone()
    }

    pub fn inputs(&self) -> &[InstrId] {
        &self.inputs
    }

    pub fn submodules(&self) -> &[ModuleRef] {
        &self.submodules
    }

    /// Return the output shape, as computed when the instruction was last
    /// added or updated.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub(crate) fn set_shape(&mut self, shape: Shape) {
        self.shape = shape;
    }

    pub(crate) fn update(
        &mut self,
        op: SharedOperator,
        inputs: InstrInputs,
        submodules: InstrSubmodules,
        shape: Shape,
    ) {
        self.op = op;
        self.inputs = inputs;
        self.submodules = submodules;
        self.shape = shape;
    }

    pub(crate) fn set_inputs(&mut self, inputs: InstrInputs) {
        self.inputs = inputs;
    }

    /// Replace every occurrence of `old` in the inputs with `new`.
    pub(crate) fn replace_input(&mut self, old: InstrId, new: InstrId) {
        for input in self.inputs.iter_mut() {
            if *input == old {
                *input = new;
            }
        }
    }
}
