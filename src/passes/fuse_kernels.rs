//! Fusion of gemm-like anchor operators with the pointwise computation that
//! consumes them.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use tgraph_shape::DataType;

use crate::diagnostics::{DiagnosticLevel, Diagnostics};
use crate::error::{CompileError, StructuralError};
use crate::matcher::{name, predicate, skip, Match, Matcher};
use crate::module::{compare_param_names, InstrId, Module};
use crate::operator::{Operator, SharedOperator};
use crate::ops::{Convolution, FusedKernel, Literal, MultiBroadcast};
use crate::passes::Pass;


/// Operators which may appear in the body of a fused kernel.
const CONV_OPS: &[&str] = &["@literal", "@param", "@return", "convolution", "add", "relu", "mul"];
const DOT_OPS: &[&str] = &["@literal", "@param", "@return", "dot", "add", "relu", "mul"];
const DOT_REDUCE_OPS: &[&str] = &[
    "@literal",
    "@param",
    "@return",
    "dot",
    "add",
    "relu",
    "mul",
    "reduce_sum",
];

/// View operators which are moved into a fused kernel together with the
/// anchor that consumes them.
const VIEW_OPS: &[&str] = &["slice", "transpose", "contiguous", "reshape"];

/// Reasons for not fusing a match.
#[derive(Debug, thiserror::Error)]
enum Rejection {
    #[error("operator `{0}` is not supported in fused kernels")]
    UnsupportedOperator(String),

    #[error("element type {0} is not supported in fused kernels")]
    UnsupportedType(DataType),

    #[error("output of instruction {0} is used outside the fused region")]
    UsedOutsideRegion(InstrId),

    #[error("cannot build fused kernel: {0}")]
    Build(#[from] CompileError),
}

impl From<StructuralError> for Rejection {
    fn from(err: StructuralError) -> Self {
        Rejection::Build(err.into())
    }
}

#[derive(Debug)]
struct FusionRule {
    name: &'static str,
    matcher: Matcher,
    allowed_ops: &'static [&'static str],

    /// True if the root of the match is a reduction applied to the
    /// pointwise instruction, rather than the pointwise instruction itself.
    reduce: bool,
}

/// Match `anchor`, possibly reached through `contiguous` copies, binding the
/// input consumed by the pointwise instruction to "x".
fn anchor_input(anchor: Matcher) -> Matcher {
    skip(&["contiguous"], anchor.bind("anchor")).bind("x")
}

fn pointwise_consumer(anchor: Matcher) -> Matcher {
    name("pointwise").with_any_input(anchor_input(anchor))
}

fn single_group_conv() -> Matcher {
    name("convolution").and(predicate("single_group_conv_2d", |_, _, instr| {
        instr.shape().ndim() == 4
            && instr
                .operator()
                .downcast_ref::<Convolution>()
                .is_some_and(|conv| conv.params.group == 1)
    }))
}

fn default_rules() -> Vec<FusionRule> {
    vec![
        FusionRule {
            name: "conv_pointwise",
            matcher: pointwise_consumer(single_group_conv()),
            allowed_ops: CONV_OPS,
            reduce: false,
        },
        FusionRule {
            name: "gemm_pointwise_reduce_sum",
            matcher: name("reduce_sum")
                .with_input(0, pointwise_consumer(name("dot")).bind("pointwise")),
            allowed_ops: DOT_REDUCE_OPS,
            reduce: true,
        },
        FusionRule {
            name: "gemm_pointwise",
            matcher: pointwise_consumer(name("dot")),
            allowed_ops: DOT_OPS,
            reduce: false,
        },
    ]
}

/// Instructions bound by a successful match.
struct Region {
    /// The instruction which the fused kernel replaces.
    result: InstrId,
    pointwise: InstrId,
    anchor: InstrId,

    /// Input of `pointwise` through which it consumes the anchor.
    x: InstrId,
}

impl Region {
    fn from_match(m: &Match, reduce: bool) -> Option<Region> {
        let result = m.result();
        Some(Region {
            result,
            pointwise: if reduce { m.get("pointwise")? } else { result },
            anchor: m.get("anchor")?,
            x: m.get("x")?,
        })
    }

    /// Return the instructions which are replaced by the fused kernel, from
    /// the anchor to the result.
    fn members(&self, module: &Module) -> Vec<InstrId> {
        let mut members = vec![self.x];
        let mut current = self.x;
        while current != self.anchor {
            match module.get(current).and_then(|instr| instr.inputs().first()) {
                Some(&input) => {
                    members.push(input);
                    current = input;
                }
                None => break,
            }
        }
        members.reverse();
        members.push(self.pointwise);
        if self.result != self.pointwise {
            members.push(self.result);
        }
        members
    }
}

/// The parts of a fused kernel, built before the module is changed.
struct Kernel {
    body: Module,
    inputs: Vec<InstrId>,
    anchor: SharedOperator,
}

/// Follow `id` through view operators and return the underlying instruction,
/// together with the view operators in the order they are applied.
fn strip_views(module: &Module, mut id: InstrId) -> (InstrId, Vec<SharedOperator>) {
    let mut views = Vec::new();
    while let Some(instr) = module.get(id) {
        match instr.inputs() {
            [input] if VIEW_OPS.iter().any(|&op| op == instr.name()) => {
                views.push(instr.clone_operator());
                id = *input;
            }
            _ => break,
        }
    }
    views.reverse();
    (id, views)
}

/// Fuse convolutions and matrix multiplications with the pointwise
/// operations which consume them, so they can be generated as one kernel.
///
/// Three rules are tried in order over the whole module:
///
/// 1. `convolution -> pointwise`
/// 2. `dot -> pointwise -> reduce_sum`
/// 3. `dot -> pointwise`
///
/// Each match is replaced by a `fused_kernel` instruction whose bypass
/// submodule holds the anchor, the body of the pointwise instruction and,
/// for rule 2, the reduction. Matches are skipped if the pointwise body uses
/// operators the kernel generator doesn't support, if any tensor at the
/// boundary is not a float or half, or if an intermediate value is used
/// outside the matched region. Skipped matches are reported through
/// [`diagnostics`](FuseKernels::diagnostics).
#[derive(Debug)]
pub struct FuseKernels {
    rules: Vec<FusionRule>,
    diagnostics: Diagnostics,
}

impl Default for FuseKernels {
    fn default() -> Self {
        Self::new()
    }
}

impl FuseKernels {
    pub fn new() -> Self {
        FuseKernels {
            rules: default_rules(),
            diagnostics: Diagnostics::new("fuse_kernels"),
        }
    }

    pub fn with_diagnostic_level(mut self, level: DiagnosticLevel) -> Self {
        self.diagnostics.set_level(level);
        self
    }

    /// Return the diagnostics reported by the most recent run.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Apply every rule to `module`. Returns the number of kernels formed.
    pub fn fuse(&self, module: &mut Module) -> Result<usize, CompileError> {
        let mut fused = 0;
        for rule in &self.rules {
            for id in module.instruction_ids() {
                // Instructions left dead by an earlier fusion are skipped.
                if module.get(id).is_none() || module.use_count(id) == 0 {
                    continue;
                }
                let Some(region) = rule
                    .matcher
                    .test(module, id)
                    .and_then(|m| Region::from_match(&m, rule.reduce))
                else {
                    continue;
                };

                let kernel = match self.build_kernel(module, rule, &region) {
                    Ok(kernel) => kernel,
                    Err(rejection) => {
                        self.diagnostics.warn(
                            module,
                            region.result,
                            format_args!("{}: {}", rule.name, rejection),
                        );
                        continue;
                    }
                };

                let body_name = kernel.body.name().to_string();
                let body_ref = module.add_submodule(kernel.body);
                module.replace_instruction(
                    region.result,
                    Arc::new(FusedKernel::new(kernel.anchor)),
                    &kernel.inputs,
                    &[body_ref],
                )?;
                self.diagnostics.info(
                    module,
                    region.result,
                    format_args!("{}: formed kernel `{}`", rule.name, body_name),
                );
                fused += 1;
            }
        }
        Ok(fused)
    }

    /// Check whether a match can be fused and build the body of the kernel.
    fn build_kernel(
        &self,
        module: &Module,
        rule: &FusionRule,
        region: &Region,
    ) -> Result<Kernel, Rejection> {
        let instr = |id: InstrId| {
            module
                .get(id)
                .ok_or(StructuralError::InvalidInstruction(id))
        };
        let pointwise = instr(region.pointwise)?;
        let anchor = instr(region.anchor)?;
        let result = instr(region.result)?;

        let &[body_ref] = pointwise.submodules() else {
            return Err(StructuralError::SubmoduleCount {
                expected: 1,
                actual: pointwise.submodules().len(),
            }
            .into());
        };
        let body = module
            .submodule(body_ref)
            .ok_or(StructuralError::InvalidSubmodule(body_ref))?;

        if let Some((_, unsupported)) = body
            .iter()
            .find(|(_, instr)| !rule.allowed_ops.iter().any(|&op| op == instr.name()))
        {
            return Err(Rejection::UnsupportedOperator(unsupported.name().to_string()));
        }

        let boundary = pointwise
            .inputs()
            .iter()
            .filter(|&&input| input != region.x)
            .chain(anchor.inputs())
            .chain(std::iter::once(&region.result));
        for &id in boundary {
            let dtype = instr(id)?.shape().dtype();
            if !matches!(dtype, DataType::Float | DataType::Half) {
                return Err(Rejection::UnsupportedType(dtype));
            }
        }

        let members = region.members(module);
        for &member in &members {
            if member == region.result {
                continue;
            }
            if let Some(&user) = module.uses(member).iter().find(|&&u| !members.contains(&u)) {
                tracing::trace!(instr = %member, user = %user, "intermediate value escapes region");
                return Err(Rejection::UsedOutsideRegion(member));
            }
        }
        if let Some(&input) = pointwise
            .inputs()
            .iter()
            .find(|&&input| input != region.x && members.contains(&input))
        {
            return Err(Rejection::UsedOutsideRegion(input));
        }

        let body_params: Vec<String> = body.parameter_names().into_iter().map(String::from).collect();
        if body_params.len() != pointwise.inputs().len() {
            return Err(StructuralError::TooFewInputs {
                expected: body_params.len(),
                actual: pointwise.inputs().len(),
            }
            .into());
        }

        let mut kernel = Module::new(module.unique_submodule_name(&format!("mlir_{}", body.name())));
        kernel.set_bypass(true);
        let mut params: Vec<(String, InstrId)> = Vec::new();

        // Anchor inputs are passed without their view operators, which are
        // replayed inside the kernel.
        let mut anchor_args = Vec::with_capacity(anchor.inputs().len());
        for (i, &input) in anchor.inputs().iter().enumerate() {
            let (source, views) = strip_views(module, input);
            let param_name = format!("x{}", body_params.len() + i);
            let mut arg = kernel.add_parameter(&param_name, instr(source)?.shape().clone())?;
            for view in views {
                arg = kernel.add_shared_instruction(view, &[arg], &[])?;
            }
            anchor_args.push(arg);
            params.push((param_name, source));
        }
        let anchor_out = kernel.add_shared_instruction(anchor.clone_operator(), &anchor_args, &[])?;

        let mut map: FxHashMap<InstrId, InstrId> = FxHashMap::default();
        for (id, body_instr) in body.iter() {
            if body_instr.operator().is::<Literal>() {
                let literal = kernel.add_shared_instruction(body_instr.clone_operator(), &[], &[])?;
                let broadcast =
                    kernel.add_instruction(MultiBroadcast::to_input(), &[literal, anchor_out])?;
                map.insert(id, broadcast);
            }
        }

        for (param_name, &input) in body_params.iter().zip(pointwise.inputs()) {
            let param = body
                .get_parameter(param_name)
                .ok_or_else(|| StructuralError::UnmappedParameter(param_name.clone()))?;
            let arg = if input == region.x {
                anchor_out
            } else {
                params.push((param_name.clone(), input));
                kernel.add_parameter(param_name, instr(input)?.shape().clone())?
            };
            map.insert(param, arg);
        }

        let outputs = kernel.insert_instructions(body, &mut map)?;
        let &[body_output] = outputs.as_slice() else {
            return Err(StructuralError::SubmoduleCount {
                expected: 1,
                actual: outputs.len(),
            }
            .into());
        };
        let mut output = body_output;
        if rule.reduce {
            output = kernel.add_shared_instruction(result.clone_operator(), &[output], &[])?;
        }
        kernel.add_return(&[output])?;

        params.sort_by(|(a, _), (b, _)| compare_param_names(a, b));
        let inputs: Vec<InstrId> = params.into_iter().map(|(_, id)| id).collect();

        let fused_op = FusedKernel::new(anchor.clone_operator());
        let input_shapes = inputs
            .iter()
            .map(|&id| instr(id).map(|i| i.shape().clone()))
            .collect::<Result<Vec<_>, _>>()?;
        let shape = fused_op
            .compute_shape(&input_shapes, &[&kernel])
            .map_err(|err| CompileError::shape(fused_op.name(), err))?;
        if shape != *result.shape() {
            return Err(StructuralError::ShapeChanged {
                before: result.shape().to_string(),
                after: shape.to_string(),
            }
            .into());
        }

        Ok(Kernel {
            body: kernel,
            inputs,
            anchor: anchor.clone_operator(),
        })
    }
}

impl Pass for FuseKernels {
    fn name(&self) -> &str {
        "fuse_kernels"
    }

    fn apply(&self, module: &mut Module) -> Result<(), CompileError> {
        self.diagnostics.reset();
        let fused = self.fuse(module)?;
        tracing::debug!(module = module.name(), fused, "formed fused kernels");
        Ok(())
    }
}
