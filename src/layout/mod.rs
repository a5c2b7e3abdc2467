//! Binary layout of sum types.
//!
//! A layout is computed in three steps:
//! - [`variants`] resolves every variant's payload to a [`PayloadShape`]
//! - [`calc`] measures the union of those payloads and its trailing slack
//! - [`discriminant`] decides where the tag lives and how wide it is
//!
//! Results are memoized per type in a [`LayoutCache`].

mod cache;
mod calc;
mod discriminant;
mod type_sort;
mod variants;

use std::{fmt::Display, ops::Range};

pub use cache::{LayoutCache, LayoutResult};
pub use calc::{UnionMetrics, measure};
pub use discriminant::{Placement, place};
pub use type_sort::{dependency_graph, recursive_types, topo_sort};
pub use variants::{ShapeResolver, VariantDescriptor, describe_variants, struct_shape};

use crate::{
    common::{TypeId, ceil_to},
    error::LayoutError,
    types::SumType,
};

/// Size and alignment of a payload, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PayloadShape {
    pub size: u32,
    pub align: u32,
}

impl PayloadShape {
    pub const UNIT: PayloadShape = PayloadShape { size: 0, align: 1 };

    pub fn new(size: u32, align: u32) -> Self {
        assert!(
            align.is_power_of_two(),
            "payload alignment must be a non-zero power of two, got {align}"
        );
        Self { size, align }
    }

    /// Size rounded up to the alignment.
    pub fn padded_size(&self) -> Option<u32> {
        ceil_to(self.size, self.align)
    }
}

/// Encoded width of a discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TagWidth {
    W1,
    W2,
    W4,
    W8,
}

impl TagWidth {
    /// Smallest width that holds `ceil(log2(count))` bits, or `None` when
    /// `count` variants need no discriminant at all.
    pub fn for_variant_count(count: usize) -> Option<TagWidth> {
        if count <= 1 {
            return None;
        }
        let bits = usize::BITS - (count - 1).leading_zeros();
        Some(match bits {
            0..=8 => TagWidth::W1,
            9..=16 => TagWidth::W2,
            17..=32 => TagWidth::W4,
            _ => TagWidth::W8,
        })
    }

    pub fn bytes(self) -> u32 {
        match self {
            TagWidth::W1 => 1,
            TagWidth::W2 => 2,
            TagWidth::W4 => 4,
            TagWidth::W8 => 8,
        }
    }

    /// Tags are naturally aligned integers.
    pub fn align(self) -> u32 {
        self.bytes()
    }
}

/// Where the tag of a union lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discriminant {
    /// Zero or one variant: the value is its payload.
    None,
    /// Stored in padding that follows the largest payload; costs no space.
    Hidden { offset: u32, width: TagWidth },
    /// Appended after the padded payload region; grows the union.
    Appended { offset: u32, width: TagWidth },
}

impl Discriminant {
    pub fn offset_width(&self) -> Option<(u32, TagWidth)> {
        match *self {
            Discriminant::None => None,
            Discriminant::Hidden { offset, width } | Discriminant::Appended { offset, width } => {
                Some((offset, width))
            }
        }
    }
}

/// Position of a variant in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VariantId(pub u32);

impl VariantId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantLayout {
    pub id: VariantId,
    pub name: String,
    /// Discriminant value; equal to the declaration index.
    pub tag: u64,
    pub shape: PayloadShape,
    /// Always 0: payloads of all variants overlap.
    pub payload_offset: u32,
}

impl VariantLayout {
    pub fn payload_range(&self) -> Range<u32> {
        self.payload_offset..self.payload_offset + self.shape.size
    }
}

/// Immutable layout of one sum type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutDescriptor {
    pub id: TypeId,
    pub name: String,
    pub size: u32,
    pub align: u32,
    pub discriminant: Discriminant,
    pub variants: Vec<VariantLayout>,
    /// Variants whose payload has both the maximal size and alignment.
    pub largest: Vec<VariantId>,
    pub max_payload_size: u32,
    pub max_payload_align: u32,
    pub trailing_slack: u32,
}

impl LayoutDescriptor {
    pub fn shape(&self) -> PayloadShape {
        PayloadShape::new(self.size, self.align)
    }

    pub fn variant(&self, id: VariantId) -> &VariantLayout {
        &self.variants[id.index()]
    }

    pub fn variant_by_name(&self, name: &str) -> Option<&VariantLayout> {
        self.variants.iter().find(|v| v.name == name)
    }

    pub fn tag_range(&self) -> Option<Range<u32>> {
        self.discriminant
            .offset_width()
            .map(|(offset, width)| offset..offset + width.bytes())
    }

    /// The variant whose discriminant value is `tag`.
    pub fn variant_for_tag(&self, tag: u64) -> Option<&VariantLayout> {
        self.variants.get(usize::try_from(tag).ok()?)
    }
}

impl Display for LayoutDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: size {}, align {}", self.name, self.size, self.align)?;
        match self.discriminant {
            Discriminant::None => writeln!(f, ", no discriminant")?,
            Discriminant::Hidden { offset, width } => {
                writeln!(f, ", tag u{} @ {offset} (in padding)", width.bytes() * 8)?
            }
            Discriminant::Appended { offset, width } => {
                writeln!(f, ", tag u{} @ {offset} (appended)", width.bytes() * 8)?
            }
        }
        for v in &self.variants {
            writeln!(
                f,
                "  {:>3} {:<16} size {:>4}, align {}",
                v.tag, v.name, v.shape.size, v.shape.align
            )?;
        }
        Ok(())
    }
}

/// Compute the layout of `ty`, resolving named fields through `resolver`.
pub fn compute_layout(
    id: TypeId,
    ty: &SumType,
    resolver: &dyn ShapeResolver,
) -> Result<LayoutDescriptor, LayoutError> {
    let too_large = || LayoutError::LayoutTooLarge {
        ty: ty.name.data.clone(),
        pos: ty.name.pos.clone(),
    };
    let descriptors = describe_variants(ty, resolver)?;
    let metrics = measure(&descriptors).ok_or_else(too_large)?;
    let placement = place(&metrics, descriptors.len()).ok_or_else(too_large)?;

    let variants = descriptors
        .into_iter()
        .map(|d| VariantLayout {
            id: d.id,
            tag: d.id.0 as u64,
            name: d.name.data,
            shape: d.shape,
            payload_offset: 0,
        })
        .collect();

    Ok(LayoutDescriptor {
        id,
        name: ty.name.data.clone(),
        size: placement.size,
        align: placement.align,
        discriminant: placement.discriminant,
        variants,
        largest: metrics.largest,
        max_payload_size: metrics.max_size,
        max_payload_align: metrics.max_align,
        trailing_slack: metrics.trailing_slack,
    })
}
