use crate::{
    common::{Ident, Position, ceil_to},
    error::LayoutError,
    layout::{PayloadShape, VariantId},
    target::TargetInfo,
    types::{FieldType, SumType},
};

/// Supplies shapes the variant builder cannot compute on its own.
pub trait ShapeResolver {
    fn target(&self) -> &TargetInfo;

    /// Shape of the sum type called `name` when stored by value.
    fn named_shape(&self, name: &str, pos: &Position) -> Result<PayloadShape, LayoutError>;
}

/// A variant reduced to what the layout passes need.
#[derive(Debug, Clone)]
pub struct VariantDescriptor {
    pub id: VariantId,
    pub name: Ident,
    pub shape: PayloadShape,
}

/// Resolve the payload shape of every variant of `ty`, in declaration order.
pub fn describe_variants(
    ty: &SumType,
    resolver: &dyn ShapeResolver,
) -> Result<Vec<VariantDescriptor>, LayoutError> {
    ty.variants
        .iter()
        .enumerate()
        .map(|(index, variant)| {
            let fields = variant
                .fields
                .iter()
                .enumerate()
                .map(|(field, field_ty)| {
                    field_shape(field_ty, resolver, ty, &variant.name.pos)?.ok_or_else(|| {
                        LayoutError::UnresolvedFieldType {
                            ty: ty.name.data.clone(),
                            variant: variant.name.data.clone(),
                            field,
                            field_ty: field_ty.to_string(),
                            pos: variant.name.pos.clone(),
                        }
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(VariantDescriptor {
                id: VariantId(index as u32),
                name: variant.name.clone(),
                shape: struct_shape(&fields).ok_or_else(|| too_large(ty, &variant.name.pos))?,
            })
        })
        .collect()
}

/// Lay out `fields` in order, each at its own alignment, and pad the end to
/// the strictest alignment. No fields give [`PayloadShape::UNIT`].
///
/// `None` when the size does not fit in a `u32`.
pub fn struct_shape(fields: &[PayloadShape]) -> Option<PayloadShape> {
    let mut offset: u32 = 0;
    let mut align = 1;
    for field in fields {
        offset = ceil_to(offset, field.align)?.checked_add(field.size)?;
        align = align.max(field.align);
    }
    Some(PayloadShape::new(ceil_to(offset, align)?, align))
}

fn too_large(ty: &SumType, pos: &Position) -> LayoutError {
    LayoutError::LayoutTooLarge {
        ty: ty.name.data.clone(),
        pos: pos.clone(),
    }
}

/// `Ok(None)` means the type contains an unsolved variable.
fn field_shape(
    field: &FieldType,
    resolver: &dyn ShapeResolver,
    ty: &SumType,
    pos: &Position,
) -> Result<Option<PayloadShape>, LayoutError> {
    let target = resolver.target();
    Ok(Some(match field {
        FieldType::Prim(p) => {
            let (size, align) = p.size_align(target);
            PayloadShape::new(size, align)
        }
        FieldType::Ptr(_) => PayloadShape::new(target.pointer_width, target.pointer_width),
        FieldType::Array { elem, len } => {
            let Some(elem) = field_shape(elem, resolver, ty, pos)? else {
                return Ok(None);
            };
            let size = elem
                .padded_size()
                .and_then(|padded| padded.checked_mul(*len))
                .ok_or_else(|| too_large(ty, pos))?;
            PayloadShape::new(size, elem.align)
        }
        FieldType::Tuple(items) => {
            let mut shapes = Vec::with_capacity(items.len());
            for item in items {
                let Some(shape) = field_shape(item, resolver, ty, pos)? else {
                    return Ok(None);
                };
                shapes.push(shape);
            }
            struct_shape(&shapes).ok_or_else(|| too_large(ty, pos))?
        }
        FieldType::Named(name) => resolver.named_shape(name, pos)?,
        FieldType::Var(_) => return Ok(None),
    }))
}
