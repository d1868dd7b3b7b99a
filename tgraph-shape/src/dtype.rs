use std::fmt;

/// Element type of a tensor.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub enum DataType {
    Bool,
    Half,
    BFloat16,
    Float,
    Double,
    UInt8,
    Int8,
    UInt16,
    Int16,
    Int32,
    Int64,
    UInt32,
    UInt64,
    /// Element type of a shape which groups several other shapes.
    Tuple,
}

impl DataType {
    /// All element types, in declaration order.
    pub const ALL: [DataType; 14] = [
        DataType::Bool,
        DataType::Half,
        DataType::BFloat16,
        DataType::Float,
        DataType::Double,
        DataType::UInt8,
        DataType::Int8,
        DataType::UInt16,
        DataType::Int16,
        DataType::Int32,
        DataType::Int64,
        DataType::UInt32,
        DataType::UInt64,
        DataType::Tuple,
    ];

    /// Return the size of elements of this type in bytes.
    ///
    /// Tuples have no element size and return 0.
    pub fn size(self) -> usize {
        match self {
            DataType::Bool | DataType::UInt8 | DataType::Int8 => 1,
            DataType::Half | DataType::BFloat16 | DataType::UInt16 | DataType::Int16 => 2,
            DataType::Float | DataType::Int32 | DataType::UInt32 => 4,
            DataType::Double | DataType::Int64 | DataType::UInt64 => 8,
            DataType::Tuple => 0,
        }
    }

    pub fn is_floating_point(self) -> bool {
        matches!(
            self,
            DataType::Half | DataType::BFloat16 | DataType::Float | DataType::Double
        )
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            DataType::UInt8
                | DataType::Int8
                | DataType::UInt16
                | DataType::Int16
                | DataType::Int32
                | DataType::Int64
                | DataType::UInt32
                | DataType::UInt64
        )
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Bool => "bool_type",
            DataType::Half => "half_type",
            DataType::BFloat16 => "bf16_type",
            DataType::Float => "float_type",
            DataType::Double => "double_type",
            DataType::UInt8 => "uint8_type",
            DataType::Int8 => "int8_type",
            DataType::UInt16 => "uint16_type",
            DataType::Int16 => "int16_type",
            DataType::Int32 => "int32_type",
            DataType::Int64 => "int64_type",
            DataType::UInt32 => "uint32_type",
            DataType::UInt64 => "uint64_type",
            DataType::Tuple => "tuple_type",
        };
        f.write_str(name)
    }
}
