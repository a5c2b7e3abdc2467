use std::fmt::Display;

use serde::Deserialize;

use crate::{common::Ident, target::TargetInfo};

/// Builtin scalar types fields can be made of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Primitive {
    U8,
    U16,
    U32,
    U64,
    Usize,
    I8,
    I16,
    I32,
    I64,
    Isize,
    Bool,
    F32,
    F64,
    Str,
}

impl Primitive {
    /// Size and alignment in bytes on `target`.
    pub fn size_align(self, target: &TargetInfo) -> (u32, u32) {
        let ptr = target.pointer_width;
        match self {
            Primitive::U8 | Primitive::I8 | Primitive::Bool => (1, 1),
            Primitive::U16 | Primitive::I16 => (2, 2),
            Primitive::U32 | Primitive::I32 | Primitive::F32 => (4, 4),
            Primitive::U64 | Primitive::I64 | Primitive::F64 => (8, 8),
            Primitive::Usize | Primitive::Isize => (ptr, ptr),
            // pointer, length, capacity
            Primitive::Str => (3 * ptr, ptr),
        }
    }
}

impl Display for Primitive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Primitive::U8 => "u8",
            Primitive::U16 => "u16",
            Primitive::U32 => "u32",
            Primitive::U64 => "u64",
            Primitive::Usize => "usize",
            Primitive::I8 => "i8",
            Primitive::I16 => "i16",
            Primitive::I32 => "i32",
            Primitive::I64 => "i64",
            Primitive::Isize => "isize",
            Primitive::Bool => "bool",
            Primitive::F32 => "f32",
            Primitive::F64 => "f64",
            Primitive::Str => "str",
        };
        f.write_str(s)
    }
}

/// Type of a single payload field, as handed over by the type resolver.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Prim(Primitive),
    /// Indirection; always pointer sized regardless of the pointee.
    Ptr(Box<FieldType>),
    Array { elem: Box<FieldType>, len: u32 },
    Tuple(Vec<FieldType>),
    /// Another sum type, stored by value.
    Named(String),
    /// A type variable the resolver has not solved yet.
    Var(String),
}

impl FieldType {
    /// Names of sum types this field stores by value.
    ///
    /// Anything behind a [`FieldType::Ptr`] is excluded: it does not
    /// contribute to the size of the field.
    pub fn by_value_names(&self) -> Vec<&str> {
        match self {
            FieldType::Named(name) => vec![name.as_str()],
            FieldType::Array { elem, .. } => elem.by_value_names(),
            FieldType::Tuple(items) => items.iter().flat_map(|t| t.by_value_names()).collect(),
            FieldType::Prim(_) | FieldType::Ptr(_) | FieldType::Var(_) => vec![],
        }
    }
}

impl Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldType::Prim(p) => write!(f, "{p}"),
            FieldType::Ptr(inner) => write!(f, "*{inner}"),
            FieldType::Array { elem, len } => write!(f, "[{elem}; {len}]"),
            FieldType::Tuple(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str(")")
            }
            FieldType::Named(name) => f.write_str(name),
            FieldType::Var(name) => write!(f, "'{name}"),
        }
    }
}

/// One alternative of a sum type.
#[derive(Debug, Clone)]
pub struct Variant {
    pub name: Ident,
    pub fields: Vec<FieldType>,
}

impl Variant {
    pub fn new(name: Ident, fields: Vec<FieldType>) -> Self {
        Self { name, fields }
    }
}

/// A named tagged union. Variant order fixes the discriminant values.
#[derive(Debug, Clone)]
pub struct SumType {
    pub name: Ident,
    pub variants: Vec<Variant>,
}
