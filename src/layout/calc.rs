use crate::{
    common::ceil_to,
    layout::{VariantId, variants::VariantDescriptor},
};

/// Measurements of the overlapped payload region of a union.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnionMetrics {
    pub max_size: u32,
    pub max_align: u32,
    /// `max_size` rounded up to `max_align`.
    pub padded_size: u32,
    /// Padding bytes after the largest payload, free for a discriminant.
    pub trailing_slack: u32,
    /// Variants with both the maximal size and the maximal alignment.
    pub largest: Vec<VariantId>,
}

/// `None` when padding the largest payload overflows.
pub fn measure(variants: &[VariantDescriptor]) -> Option<UnionMetrics> {
    let max_size = variants.iter().map(|v| v.shape.size).max().unwrap_or(0);
    let max_align = variants.iter().map(|v| v.shape.align).max().unwrap_or(1);
    let largest = variants
        .iter()
        .filter(|v| v.shape.size == max_size && v.shape.align == max_align)
        .map(|v| v.id)
        .collect();
    let padded_size = ceil_to(max_size, max_align)?;

    Some(UnionMetrics {
        max_size,
        max_align,
        padded_size,
        trailing_slack: padded_size - max_size,
        largest,
    })
}
