use std::cmp::Ordering;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tgraph_shape::{DataType, Shape};
use tgraph_testing::TestCases;

use super::{compare_param_names, Module};
use crate::error::{CompileError, StructuralError};
use crate::ops::{Add, Dot, Literal, Parameter, Pointwise, Relu, Transpose};

fn float(lens: &[usize]) -> Shape {
    Shape::new(DataType::Float, lens)
}

fn names(module: &Module) -> Vec<&str> {
    module.iter().map(|(_, instr)| instr.name()).collect()
}

fn add_body(module: &mut Module) -> super::ModuleRef {
    let body_ref = module.create_submodule("pointwise0");
    let body = module.submodule_mut(body_ref).unwrap();
    let x0 = body.add_parameter("x0", Shape::scalar(DataType::Float)).unwrap();
    let x1 = body.add_parameter("x1", Shape::scalar(DataType::Float)).unwrap();
    let sum = body.add_instruction(Add {}, &[x0, x1]).unwrap();
    body.add_return(&[sum]).unwrap();
    body_ref
}

#[test]
fn test_compare_param_names() {
    #[derive(Debug)]
    struct Case {
        a: &'static str,
        b: &'static str,
        expected: Ordering,
    }

    let cases = [
        Case {
            a: "x2",
            b: "x10",
            expected: Ordering::Less,
        },
        Case {
            a: "x10",
            b: "x9",
            expected: Ordering::Greater,
        },
        Case {
            a: "x1",
            b: "x1",
            expected: Ordering::Equal,
        },
        Case {
            a: "x",
            b: "x0",
            expected: Ordering::Less,
        },
        Case {
            a: "bias",
            b: "x0",
            expected: Ordering::Less,
        },
        Case {
            a: "x01",
            b: "x1",
            expected: Ordering::Less,
        },
    ];

    cases.test_each(|case| {
        assert_eq!(compare_param_names(case.a, case.b), case.expected);
    })
}

#[test]
fn test_add_instructions() {
    let mut module = Module::new("main");
    let x = module.add_parameter("x", float(&[2, 3])).unwrap();
    let y = module.add_parameter("y", float(&[3])).unwrap();
    let sum = module.add_instruction(Add {}, &[x, y]).unwrap();
    let ret = module.add_return(&[sum]).unwrap();

    assert_eq!(module.len(), 4);
    assert_eq!(module.shape(sum), Some(&float(&[2, 3])));
    assert_eq!(module.uses(x), &[sum]);
    assert_eq!(module.uses(sum), &[ret]);
    assert_eq!(module.outputs(), &[sum]);
    assert_eq!(module.output_shapes(), vec![float(&[2, 3])]);
    assert_eq!(module.get_parameter("y"), Some(y));
    assert_eq!(module.parameter_names(), ["x", "y"]);

    // Instructions added after the return are placed before it.
    let out = module.add_instruction(Relu {}, &[sum]).unwrap();
    assert_eq!(names(&module), ["@param", "@param", "add", "relu", "@return"]);
    assert_eq!(module.position(out), Some(3));
    module.validate().unwrap();
}

#[test]
fn test_uses_are_deduplicated() {
    let mut module = Module::new("main");
    let x = module.add_parameter("x", float(&[4])).unwrap();
    let double = module.add_instruction(Add {}, &[x, x]).unwrap();

    assert_eq!(module.uses(x), &[double]);
    assert_eq!(module.use_count(x), 1);
}

#[test]
fn test_add_errors() {
    let mut module = Module::new("main");
    let x = module.add_parameter("x", float(&[2, 3])).unwrap();
    let y = module.add_parameter("y", float(&[4])).unwrap();

    let err = module.add_parameter("x", float(&[1])).unwrap_err();
    assert_eq!(
        err,
        CompileError::Structural(StructuralError::DuplicateParameter("x".into()))
    );

    let err = module.add_instruction(Add {}, &[x, y]).unwrap_err();
    assert!(matches!(err, CompileError::Shape { ref op, .. } if op == "add"));

    module.add_return(&[x]).unwrap();
    let err = module.add_return(&[y]).unwrap_err();
    assert_eq!(
        err,
        CompileError::Structural(StructuralError::DuplicateReturn("main".into()))
    );

    // Failed additions leave the module unchanged.
    assert_eq!(module.len(), 3);
    module.validate().unwrap();
}

#[test]
fn test_add_shared_instruction_routes_builtins() {
    let mut module = Module::new("main");
    let param = Arc::new(Parameter {
        name: "x".into(),
        shape: float(&[4]),
    });
    let x = module.add_shared_instruction(param, &[], &[]).unwrap();
    assert_eq!(module.get_parameter("x"), Some(x));

    let err = module
        .insert_instruction(
            x,
            Arc::new(Parameter {
                name: "y".into(),
                shape: float(&[4]),
            }),
            &[],
            &[],
        )
        .unwrap_err();
    assert_eq!(
        err,
        CompileError::Structural(StructuralError::MisplacedBuiltin("@param".into()))
    );
}

#[test]
fn test_insert_instruction() {
    let mut module = Module::new("main");
    let x = module.add_parameter("x", float(&[4])).unwrap();
    let out = module.add_instruction(Relu {}, &[x]).unwrap();
    module.add_return(&[out]).unwrap();

    let first = module
        .insert_instruction(out, Arc::new(Relu {}), &[x], &[])
        .unwrap();
    assert_eq!(module.position(first), Some(1));
    assert_eq!(module.position(out), Some(2));

    // Inputs must be evaluated before the insertion point.
    let err = module
        .insert_instruction(first, Arc::new(Relu {}), &[out], &[])
        .unwrap_err();
    assert!(matches!(
        err,
        CompileError::Structural(StructuralError::OrderViolation { .. })
    ));
}

#[test]
fn test_replace_instruction_propagates_shapes() {
    let mut module = Module::new("main");
    let x = module.add_parameter("x", float(&[2, 3])).unwrap();
    let first = module.add_instruction(Relu {}, &[x]).unwrap();
    let second = module.add_instruction(Relu {}, &[first]).unwrap();
    module.add_return(&[second]).unwrap();

    module
        .replace_instruction(
            first,
            Arc::new(Transpose {
                permutation: vec![1, 0],
            }),
            &[x],
            &[],
        )
        .unwrap();

    assert_eq!(module.get(first).unwrap().name(), "transpose");
    assert_eq!(module.shape(first).unwrap().lens(), &[3, 2]);
    assert_eq!(module.shape(second), Some(&float(&[3, 2])));
    assert_eq!(module.output_shapes(), vec![float(&[3, 2])]);
    module.validate().unwrap();
}

#[test]
fn test_failed_replace_leaves_module_unchanged() {
    let mut module = Module::new("main");
    let x = module.add_parameter("x", float(&[2, 3])).unwrap();
    let y = module.add_parameter("y", float(&[3, 4])).unwrap();
    let act = module.add_instruction(Relu {}, &[x]).unwrap();
    let product = module.add_instruction(Dot {}, &[act, y]).unwrap();
    module.add_return(&[product]).unwrap();
    let before = module.to_string();

    // Transposing the activation makes the downstream `dot` invalid.
    let transpose = Arc::new(Transpose {
        permutation: vec![1, 0],
    });
    let err = module
        .replace_instruction(act, transpose, &[x], &[])
        .unwrap_err();
    assert!(matches!(err, CompileError::Shape { ref op, .. } if op == "dot"));
    assert_eq!(module.to_string(), before);
    assert_eq!(module.uses(x), &[act]);
    module.validate().unwrap();

    let transposed = module
        .add_instruction(
            Transpose {
                permutation: vec![1, 0],
            },
            &[x],
        )
        .unwrap();
    let err = module.replace_uses(act, transposed).unwrap_err();
    assert!(matches!(err, CompileError::Shape { ref op, .. } if op == "dot"));
    assert_eq!(module.uses(act), &[product]);
    assert!(module.uses(transposed).is_empty());
    assert_eq!(module.get(product).unwrap().inputs(), &[act, y]);
    assert_eq!(module.shape(product), Some(&float(&[2, 4])));
    module.validate().unwrap();
}

#[test]
fn test_replace_instruction_rejects_builtins() {
    let mut module = Module::new("main");
    let x = module.add_parameter("x", float(&[4])).unwrap();
    let ret = module.add_return(&[x]).unwrap();

    for id in [x, ret] {
        let err = module
            .replace_instruction(id, Arc::new(Relu {}), &[], &[])
            .unwrap_err();
        assert_eq!(
            err,
            CompileError::Structural(StructuralError::NotReplaceable(id))
        );
    }
}

#[test]
fn test_replace_uses() {
    let mut module = Module::new("main");
    let x = module.add_parameter("x", float(&[4])).unwrap();
    let a = module.add_instruction(Relu {}, &[x]).unwrap();
    let b = module.add_instruction(Relu {}, &[a]).unwrap();
    let ret = module.add_return(&[a, b]).unwrap();
    let c = module.add_instruction(Relu {}, &[x]).unwrap();

    module.replace_uses(a, c).unwrap();

    assert!(module.uses(a).is_empty());
    assert_eq!(module.uses(c), &[b, ret]);
    assert_eq!(module.outputs(), &[c, b]);
    assert!(module.position(c) < module.position(b));
    module.validate().unwrap();
}

#[test]
fn test_replace_uses_order_violation() {
    let mut module = Module::new("main");
    let x = module.add_parameter("x", float(&[4])).unwrap();
    let a = module.add_instruction(Relu {}, &[x]).unwrap();
    let b = module.add_instruction(Relu {}, &[a]).unwrap();
    let c = module.add_instruction(Relu {}, &[b]).unwrap();

    let err = module.replace_uses(a, c).unwrap_err();
    assert_eq!(
        err,
        CompileError::Structural(StructuralError::OrderViolation {
            consumer: b,
            input: c
        })
    );
}

#[test]
fn test_remove_instruction() {
    let mut module = Module::new("main");
    let x = module.add_parameter("x", float(&[4])).unwrap();
    let unused = module.add_parameter("unused", float(&[4])).unwrap();
    let out = module.add_instruction(Relu {}, &[x]).unwrap();
    let dead = module.add_instruction(Relu {}, &[out]).unwrap();
    module.add_return(&[out]).unwrap();

    let err = module.remove_instruction(out).unwrap_err();
    assert_eq!(
        err,
        CompileError::Structural(StructuralError::InstructionInUse { id: out, uses: 2 })
    );

    module.remove_instruction(dead).unwrap();
    assert_eq!(module.uses(out).len(), 1);
    assert!(module.get(dead).is_none());

    module.remove_instruction(unused).unwrap();
    assert_eq!(module.get_parameter("unused"), None);
    assert_eq!(module.parameter_names(), ["x"]);

    let err = module.remove_instruction(dead).unwrap_err();
    assert_eq!(
        err,
        CompileError::Structural(StructuralError::InvalidInstruction(dead))
    );
    module.validate().unwrap();
}

#[test]
fn test_submodules() {
    let mut module = Module::new("main");
    let x = module.add_parameter("x", float(&[4])).unwrap();
    let body = add_body(&mut module);
    let pw = module
        .add_instruction_with_modules(Pointwise {}, &[x, x], &[body])
        .unwrap();
    module.add_return(&[pw]).unwrap();

    assert!(module.is_submodule_used(body));
    assert_eq!(module.unique_submodule_name("pointwise0"), "pointwise0_1");
    assert_eq!(module.unique_submodule_name("pointwise1"), "pointwise1");

    let err = module.remove_submodule(body).unwrap_err();
    assert_eq!(err, StructuralError::SubmoduleInUse(body));

    let unused = module.create_submodule("scratch");
    let removed = module.remove_submodule(unused).unwrap();
    assert_eq!(removed.name(), "scratch");
    assert_eq!(module.submodules().count(), 1);
    module.validate().unwrap();
}

#[test]
fn test_insert_instructions() {
    let mut module = Module::new("main");
    let a = module.add_parameter("a", float(&[4])).unwrap();
    let b = module.add_parameter("b", float(&[4])).unwrap();

    let mut body = Module::new("body");
    let x0 = body.add_parameter("x0", float(&[4])).unwrap();
    let x1 = body.add_parameter("x1", float(&[4])).unwrap();
    let sum = body.add_instruction(Add {}, &[x0, x1]).unwrap();
    let out = body.add_instruction(Relu {}, &[sum]).unwrap();
    body.add_return(&[out]).unwrap();

    let mut map = FxHashMap::default();
    map.insert(x0, a);
    let err = module.insert_instructions(&body, &mut map).unwrap_err();
    assert_eq!(
        err,
        CompileError::Structural(StructuralError::UnmappedParameter("x1".into()))
    );

    map.insert(x1, b);
    let outputs = module.insert_instructions(&body, &mut map).unwrap();
    assert_eq!(outputs.len(), 1);
    assert_eq!(module.get(outputs[0]).unwrap().name(), "relu");
    assert_eq!(map[&out], outputs[0]);
    assert_eq!(names(&module), ["@param", "@param", "add", "relu"]);

    module.add_return(&outputs).unwrap();
    module.validate().unwrap();
}

#[test]
fn test_validate() {
    let mut module = Module::new("main");
    let x = module.add_parameter("x", float(&[4])).unwrap();
    module.add_instruction(Relu {}, &[x]).unwrap();

    let err = module.validate().unwrap_err();
    assert_eq!(
        err,
        CompileError::Structural(StructuralError::MissingReturn("main".into()))
    );

    module.add_return(&[x]).unwrap();
    module.validate().unwrap();

    // Errors in submodules are reported too.
    module.create_submodule("empty");
    let err = module.validate().unwrap_err();
    assert_eq!(
        err,
        CompileError::Structural(StructuralError::MissingReturn("empty".into()))
    );
}

#[test]
fn test_display() {
    let mut module = Module::new("main");
    let x = module.add_parameter("x", float(&[4])).unwrap();
    let one = module
        .add_literal(Literal::scalar(DataType::Float, 1.))
        .unwrap();
    let sum = module.add_instruction(Add {}, &[x, one]).unwrap();
    module.add_return(&[sum]).unwrap();

    let expected = [
        "module: \"main\"",
        "@0 = @param:x -> float_type, {4}, {1}",
        "@1 = @literal -> float_type, {1}, {0}",
        "@2 = add(@0, @1) -> float_type, {4}, {1}",
        "@3 = @return(@2)",
        "",
    ];
    assert_eq!(module.to_string(), expected.join("\n"));
}
