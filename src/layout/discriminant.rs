use tracing::trace;

use crate::{
    common::ceil_to,
    layout::{Discriminant, TagWidth, calc::UnionMetrics},
};

/// Outcome of the discriminant placement policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub discriminant: Discriminant,
    pub size: u32,
    pub align: u32,
}

/// Decide where the discriminant of a union of `variant_count` payloads goes.
///
/// The tag always follows the whole payload region. It reuses the trailing
/// padding when that padding is wide enough and is appended after the padded
/// region otherwise, growing the union. `None` when the grown union no longer
/// fits in a `u32`.
pub fn place(metrics: &UnionMetrics, variant_count: usize) -> Option<Placement> {
    let Some(width) = TagWidth::for_variant_count(variant_count) else {
        return Some(Placement {
            discriminant: Discriminant::None,
            size: metrics.padded_size,
            align: metrics.max_align,
        });
    };
    let tag_bytes = width.bytes();

    let placement = if metrics.trailing_slack >= tag_bytes {
        Placement {
            discriminant: Discriminant::Hidden {
                offset: metrics.max_size,
                width,
            },
            size: metrics.padded_size,
            align: metrics.max_align,
        }
    } else {
        let offset = metrics.padded_size;
        let align = metrics.max_align.max(width.align());
        Placement {
            discriminant: Discriminant::Appended { offset, width },
            size: ceil_to(offset.checked_add(tag_bytes)?, align)?,
            align,
        }
    };
    trace!(
        variant_count,
        slack = metrics.trailing_slack,
        tag_bytes,
        ?placement,
        "placed discriminant"
    );
    Some(placement)
}
