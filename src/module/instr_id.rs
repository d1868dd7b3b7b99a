use std::num::NonZero;

/// ID of an instruction within a [`Module`](crate::Module).
///
/// IDs are local to the module that created them and are never reused after
/// an instruction is removed. Instruction IDs are u32 values < `u32::MAX`.
#[derive(Copy, Clone, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct InstrId(NonZero<u32>);

impl InstrId {
    /// Return the underlying u32 value of the ID.
    pub fn as_u32(self) -> u32 {
        self.0.get() - 1
    }

    /// Return the underlying ID value as a usize, for slice indexing.
    pub fn as_usize(self) -> usize {
        self.as_u32() as usize
    }

    /// Construct an instruction ID from a u32 value.
    ///
    /// Panics if the value is `u32::MAX`.
    pub fn from_u32(value: u32) -> InstrId {
        // Stored as `value + 1` so that `Option<InstrId>` is the same size as
        // `InstrId`.
        assert!(value < u32::MAX);
        InstrId(NonZero::<u32>::MIN.saturating_add(value))
    }
}

impl std::fmt::Display for InstrId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.as_u32().fmt(f)
    }
}

impl std::fmt::Debug for InstrId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "InstrId({})", self.as_u32())
    }
}

/// Reference to a submodule owned by a [`Module`](crate::Module).
#[derive(Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ModuleRef(pub(crate) u32);

impl ModuleRef {
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for ModuleRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::InstrId;

    #[test]
    fn test_instr_id() {
        let id = InstrId::from_u32(0);
        assert_eq!(id.as_u32(), 0);
        assert_eq!(id.as_usize(), 0);
        assert_eq!(format!("{} {:?}", id, id), "0 InstrId(0)");
        assert_eq!(InstrId::from_u32(41).as_u32(), 41);
        assert_eq!(
            std::mem::size_of::<Option<InstrId>>(),
            std::mem::size_of::<InstrId>()
        );
    }
}
