//! A module for common syntax/utilities.
use std::fmt::Display;

pub mod sources;

mod position;
mod type_id;

pub use position::{Position, PositionGenerator};
pub use type_id::TypeId;

/// A name together with where it was declared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident {
    pub data: String,
    pub pos: Position,
}

impl Ident {
    pub fn new(data: impl Into<String>, pos: Position) -> Self {
        Ident {
            data: data.into(),
            pos,
        }
    }

    /// An identifier without a source location, for programmatic construction.
    pub fn synthetic(data: impl Into<String>) -> Self {
        Ident::new(data, Position::nowhere())
    }

    pub fn as_str(&self) -> &str {
        &self.data
    }
}

impl Display for Ident {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.data)
    }
}

/// Round `value` up to the next multiple of `align`, or `None` when the
/// result does not fit in a `u32`.
///
/// `align` must be a power of two.
pub fn ceil_to(value: u32, align: u32) -> Option<u32> {
    assert!(align.is_power_of_two(), "alignment {align} is not a power of two");
    Some(value.checked_add(align - 1)? & !(align - 1))
}
