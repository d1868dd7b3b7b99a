use tgraph_shape::{AxisError, ShapeError};

use crate::module::{InstrId, ModuleRef};

/// Errors that abort compilation of a module.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum CompileError {
    /// Shape inference for an operator failed.
    #[error("shape inference failed for `{op}`: {source}")]
    Shape {
        op: String,
        #[source]
        source: ShapeError,
    },

    /// A graph mutation would break the structure of a module.
    #[error(transparent)]
    Structural(#[from] StructuralError),

    /// An operator attribute or pipeline setting is malformed.
    #[error(transparent)]
    Configuration(#[from] ConfigError),
}

impl CompileError {
    pub(crate) fn shape(op: &str, source: ShapeError) -> CompileError {
        CompileError::Shape {
            op: op.to_string(),
            source,
        }
    }
}

/// Violations of the structural invariants of a [`Module`](crate::Module).
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum StructuralError {
    #[error("instruction {0} does not exist in this module")]
    InvalidInstruction(InstrId),

    #[error("submodule {0} does not exist in this module")]
    InvalidSubmodule(ModuleRef),

    #[error("cannot remove instruction {id} which still has {uses} uses")]
    InstructionInUse { id: InstrId, uses: usize },

    #[error("cannot remove submodule {0} which is still referenced")]
    SubmoduleInUse(ModuleRef),

    #[error("parameter `{0}` is already defined")]
    DuplicateParameter(String),

    #[error("parameter `{0}` has no mapping")]
    UnmappedParameter(String),

    #[error("module `{0}` already has a return instruction")]
    DuplicateReturn(String),

    #[error("module `{0}` has no return instruction")]
    MissingReturn(String),

    #[error("instruction {0} cannot be replaced")]
    NotReplaceable(InstrId),

    #[error("`{0}` instructions cannot be inserted at an arbitrary position")]
    MisplacedBuiltin(String),

    #[error("return instruction of module `{0}` is not the last instruction")]
    ReturnNotLast(String),

    #[error("input {input} of instruction {consumer} does not precede it")]
    OrderViolation { consumer: InstrId, input: InstrId },

    #[error("expected {expected} submodules, found {actual}")]
    SubmoduleCount { expected: usize, actual: usize },

    #[error("expected at least {expected} inputs, found {actual}")]
    TooFewInputs { expected: usize, actual: usize },

    #[error("instructions with submodules cannot be copied between modules")]
    NestedSubmodules,

    #[error("use index of instruction {0} is inconsistent")]
    InconsistentUses(InstrId),

    #[error("cached shape of instruction {0} is stale")]
    StaleShape(InstrId),

    #[error("replacement changes the output shape from [{before}] to [{after}]")]
    ShapeChanged { before: String, after: String },
}

/// Malformed operator attributes or pipeline settings.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("attribute `{attribute}` of `{op}` is out of range: {source}")]
    InvalidAxis {
        op: String,
        attribute: &'static str,
        #[source]
        source: AxisError,
    },

    #[error("attribute `{attribute}` of `{op}` has the wrong number of values")]
    InvalidAttributeLength { op: String, attribute: &'static str },

    #[error("invalid pipeline configuration: {0}")]
    InvalidPipeline(String),
}
