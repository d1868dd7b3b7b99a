//! Operators which define the boundary of a module: parameters, literals and
//! the return instruction.

use tgraph_shape::{CheckShapes, DataType, Shape, ShapeError};

use crate::module::Module;
use crate::operator::Operator;

/// A named input of a module.
#[derive(Clone, Debug, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub shape: Shape,
}

impl Operator for Parameter {
    fn name(&self) -> &str {
        "@param"
    }

    fn compute_shape(&self, inputs: &[Shape], _: &[&Module]) -> Result<Shape, ShapeError> {
        CheckShapes::new(inputs).has(0)?;
        Ok(self.shape.clone())
    }
}

/// Element values of a [`Literal`].
#[derive(Clone, Debug, PartialEq)]
pub enum LiteralData {
    Float(Vec<f64>),
    Int(Vec<i64>),
    Bool(Vec<bool>),
}

impl LiteralData {
    fn len(&self) -> usize {
        match self {
            LiteralData::Float(values) => values.len(),
            LiteralData::Int(values) => values.len(),
            LiteralData::Bool(values) => values.len(),
        }
    }

    fn accepts(&self, dtype: DataType) -> bool {
        match self {
            LiteralData::Float(_) => dtype.is_floating_point(),
            LiteralData::Int(_) => dtype.is_integer(),
            LiteralData::Bool(_) => dtype == DataType::Bool,
        }
    }
}

/// A constant value embedded in a module.
#[derive(Clone, Debug, PartialEq)]
pub struct Literal {
    shape: Shape,
    data: LiteralData,
}

impl Literal {
    /// Create a literal with a static shape.
    ///
    /// The number of values must match the number of elements in `shape`,
    /// and the kind of values must match its element type.
    pub fn new(shape: Shape, data: LiteralData) -> Result<Literal, ShapeError> {
        CheckShapes::new(std::slice::from_ref(&shape))
            .static_only()?
            .no_tuples()?;
        if !data.accepts(shape.dtype()) {
            return Err(ShapeError::UnsupportedType(shape.dtype()));
        }
        if shape.elements() != Some(data.len()) {
            return Err(ShapeError::IncompatibleShapes(format!(
                "literal has {} values but shape [{}] holds {:?}",
                data.len(),
                shape,
                shape.elements()
            )));
        }
        Ok(Literal { shape, data })
    }

    /// Create a single-element floating point literal.
    pub fn scalar(dtype: DataType, value: f64) -> Literal {
        Literal {
            shape: Shape::scalar(dtype),
            data: LiteralData::Float(vec![value]),
        }
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn data(&self) -> &LiteralData {
        &self.data
    }
}

impl Operator for Literal {
    fn name(&self) -> &str {
        "@literal"
    }

    fn compute_shape(&self, inputs: &[Shape], _: &[&Module]) -> Result<Shape, ShapeError> {
        CheckShapes::new(inputs).has(0)?;
        Ok(self.shape.clone())
    }
}

/// Terminal instruction of a module, whose inputs are the module's outputs.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Return {}

impl Operator for Return {
    fn name(&self) -> &str {
        "@return"
    }

    fn compute_shape(&self, inputs: &[Shape], _: &[&Module]) -> Result<Shape, ShapeError> {
        match inputs {
            [single] => Ok(single.clone()),
            _ => Ok(Shape::tuple(inputs.to_vec())),
        }
    }
}

#[cfg(test)]
mod tests {
    use tgraph_shape::{DataType, DynamicDimension, Shape, ShapeError};

    use super::{Literal, LiteralData, Parameter, Return};
    use crate::operator::Operator;

    #[test]
    fn test_literal_new() {
        let shape = Shape::new(DataType::Float, &[2, 2]);
        let lit = Literal::new(shape.clone(), LiteralData::Float(vec![1., 2., 3., 4.])).unwrap();
        assert_eq!(lit.compute_shape(&[], &[]), Ok(shape.clone()));

        let err = Literal::new(shape.clone(), LiteralData::Float(vec![1.])).unwrap_err();
        assert!(matches!(err, ShapeError::IncompatibleShapes(_)));

        let err = Literal::new(shape, LiteralData::Int(vec![1, 2, 3, 4])).unwrap_err();
        assert_eq!(err, ShapeError::UnsupportedType(DataType::Float));

        let dyn_shape = Shape::dynamic(DataType::Float, &[DynamicDimension::new(1, 4)]);
        let err = Literal::new(dyn_shape, LiteralData::Float(vec![])).unwrap_err();
        assert!(matches!(err, ShapeError::UnsupportedDynamic(_)));
    }

    #[test]
    fn test_boundary_shapes() {
        let shape = Shape::new(DataType::Half, &[3]);
        let param = Parameter {
            name: "x".into(),
            shape: shape.clone(),
        };
        assert_eq!(param.compute_shape(&[], &[]), Ok(shape.clone()));
        assert!(param.compute_shape(&[shape.clone()], &[]).is_err());

        let ret = Return {};
        assert_eq!(ret.compute_shape(&[shape.clone()], &[]), Ok(shape.clone()));
        let pair = ret.compute_shape(&[shape.clone(), shape.clone()], &[]).unwrap();
        assert!(pair.is_tuple());
        assert_eq!(pair.sub_shapes().len(), 2);
    }
}
