/// Canonical identity of a sum type within one compilation run.
///
/// Ids are dense indices handed out by [`crate::types::TypeEnv`] in declaration
/// order, so they double as the layout cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeId {
    id: u32,
}

impl TypeId {
    pub(crate) fn from_index(index: usize) -> TypeId {
        TypeId { id: index as u32 }
    }

    /// Get the actual numeric id.
    pub fn get(&self) -> usize {
        self.id as usize
    }
}
