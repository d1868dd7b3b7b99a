//! Precondition checks shared by operator shape functions.

use crate::{Shape, ShapeError};

/// Chainable checks over the input shapes of an operator.
///
/// ```
/// use tgraph_shape::{CheckShapes, DataType, Shape};
///
/// let a = Shape::new(DataType::Float, &[2, 3]);
/// let b = Shape::new(DataType::Float, &[3, 4]);
/// CheckShapes::new(&[a, b]).has(2)?.same_type()?.min_ndims(2)?;
/// # Ok::<(), tgraph_shape::ShapeError>(())
/// ```
pub struct CheckShapes<'a> {
    shapes: &'a [Shape],
}

impl<'a> CheckShapes<'a> {
    pub fn new(shapes: &'a [Shape]) -> CheckShapes<'a> {
        CheckShapes { shapes }
    }

    pub fn has(self, count: usize) -> Result<Self, ShapeError> {
        if self.shapes.len() != count {
            return Err(ShapeError::IncorrectInputCount {
                expected: count.to_string(),
                actual: self.shapes.len(),
            });
        }
        Ok(self)
    }

    pub fn has_at_least(self, count: usize) -> Result<Self, ShapeError> {
        if self.shapes.len() < count {
            return Err(ShapeError::IncorrectInputCount {
                expected: format!("at least {}", count),
                actual: self.shapes.len(),
            });
        }
        Ok(self)
    }

    pub fn same_type(self) -> Result<Self, ShapeError> {
        if let Some(first) = self.shapes.first() {
            if let Some(other) = self.shapes.iter().find(|s| s.dtype() != first.dtype()) {
                return Err(ShapeError::TypeMismatch(first.dtype(), other.dtype()));
            }
        }
        Ok(self)
    }

    pub fn same_ndims(self) -> Result<Self, ShapeError> {
        if let Some(first) = self.shapes.first() {
            for (index, shape) in self.shapes.iter().enumerate() {
                if shape.ndim() != first.ndim() {
                    return Err(ShapeError::IncorrectRank {
                        index,
                        expected: first.ndim().to_string(),
                        actual: shape.ndim(),
                    });
                }
            }
        }
        Ok(self)
    }

    pub fn only_dims(self, ndim: usize) -> Result<Self, ShapeError> {
        for (index, shape) in self.shapes.iter().enumerate() {
            if shape.ndim() != ndim {
                return Err(ShapeError::IncorrectRank {
                    index,
                    expected: ndim.to_string(),
                    actual: shape.ndim(),
                });
            }
        }
        Ok(self)
    }

    pub fn min_ndims(self, ndim: usize) -> Result<Self, ShapeError> {
        for (index, shape) in self.shapes.iter().enumerate() {
            if shape.ndim() < ndim {
                return Err(ShapeError::IncorrectRank {
                    index,
                    expected: format!("at least {}", ndim),
                    actual: shape.ndim(),
                });
            }
        }
        Ok(self)
    }

    /// Require static inputs to be standard. Dynamic inputs are not checked.
    pub fn standard(self) -> Result<Self, ShapeError> {
        for (index, shape) in self.shapes.iter().enumerate() {
            if !shape.is_dynamic() && !shape.is_standard() {
                return Err(ShapeError::NotStandard(index));
            }
        }
        Ok(self)
    }

    /// Require static inputs to be either packed or broadcast.
    pub fn packed_or_broadcasted(self) -> Result<Self, ShapeError> {
        for (index, shape) in self.shapes.iter().enumerate() {
            if !shape.is_dynamic() && !shape.is_packed() && !shape.is_broadcasted() {
                return Err(ShapeError::NotStandard(index));
            }
        }
        Ok(self)
    }

    pub fn not_broadcasted(self) -> Result<Self, ShapeError> {
        for (index, shape) in self.shapes.iter().enumerate() {
            if shape.is_broadcasted() {
                return Err(ShapeError::Broadcasted(index));
            }
        }
        Ok(self)
    }

    pub fn static_only(self) -> Result<Self, ShapeError> {
        if self.shapes.iter().any(|s| s.is_dynamic()) {
            return Err(ShapeError::UnsupportedDynamic(
                "operator requires static inputs".to_string(),
            ));
        }
        Ok(self)
    }

    pub fn no_tuples(self) -> Result<Self, ShapeError> {
        if self.shapes.iter().any(|s| s.is_tuple()) {
            return Err(ShapeError::UnsupportedType(crate::DataType::Tuple));
        }
        Ok(self)
    }
}
