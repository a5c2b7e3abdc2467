//! Resolved type definitions supplied by the upstream resolver.

mod ast;

use std::collections::HashMap;

pub use ast::{FieldType, Primitive, SumType, Variant};

use crate::{
    common::{Ident, TypeId},
    error::LayoutError,
};

impl SumType {
    /// Build a sum type, rejecting repeated variant names.
    pub fn new(name: Ident, variants: Vec<Variant>) -> Result<SumType, LayoutError> {
        let mut seen: HashMap<&str, &Ident> = HashMap::new();
        for variant in &variants {
            if let Some(first) = seen.insert(variant.name.as_str(), &variant.name) {
                return Err(LayoutError::DuplicateVariant {
                    ty: name.data.clone(),
                    variant: variant.name.data.clone(),
                    pos: variant.name.pos.clone(),
                    first: first.pos.clone(),
                });
            }
        }
        Ok(SumType { name, variants })
    }
}

/// All sum types of one compilation run, keyed by canonical [`TypeId`].
#[derive(Debug, Default)]
pub struct TypeEnv {
    types: Vec<SumType>,
    ids: HashMap<String, TypeId>,
}

impl TypeEnv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sum type and hand out its id.
    pub fn insert(&mut self, ty: SumType) -> Result<TypeId, LayoutError> {
        if let Some(existing) = self.ids.get(ty.name.as_str()) {
            return Err(LayoutError::DuplicateType {
                ty: ty.name.data.clone(),
                pos: ty.name.pos.clone(),
                first: self.get(*existing).name.pos.clone(),
            });
        }
        let id = TypeId::from_index(self.types.len());
        self.ids.insert(ty.name.data.clone(), id);
        self.types.push(ty);
        Ok(id)
    }

    pub fn get(&self, id: TypeId) -> &SumType {
        &self.types[id.get()]
    }

    pub fn lookup(&self, name: &str) -> Option<TypeId> {
        self.ids.get(name).copied()
    }

    /// All ids in declaration order.
    pub fn ids(&self) -> impl ExactSizeIterator<Item = TypeId> + '_ {
        (0..self.types.len()).map(TypeId::from_index)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
