//! Glue generation: constructors, readers and matchers over a layout.

use std::sync::Arc;

use tracing::trace;

use crate::{
    error::InternalError,
    layout::{Discriminant, LayoutDescriptor, VariantId, VariantLayout},
    target::Endianness,
};

mod ast;
pub mod interp;

pub use ast::{GlueFn, GlueKind, GlueOp};
pub use interp::{GlueFault, ReadOutcome, Trace};

/// All glue functions of one sum type.
#[derive(Debug, Clone)]
pub struct GlueSet {
    pub layout: Arc<LayoutDescriptor>,
    /// Indexed by variant id.
    pub constructors: Vec<GlueFn>,
    /// Indexed by variant id.
    pub readers: Vec<GlueFn>,
    /// Present only when the layout has a discriminant.
    pub matcher: Option<GlueFn>,
}

impl GlueSet {
    pub fn functions(&self) -> impl Iterator<Item = &GlueFn> {
        self.constructors
            .iter()
            .chain(self.readers.iter())
            .chain(self.matcher.iter())
    }

    pub fn constructor(&self, variant: VariantId) -> &GlueFn {
        &self.constructors[variant.index()]
    }

    pub fn reader(&self, variant: VariantId) -> &GlueFn {
        &self.readers[variant.index()]
    }

    /// Build a zero-initialized value holding `variant` with `payload`.
    pub fn encode(&self, variant: VariantId, payload: &[u8]) -> Result<Vec<u8>, GlueFault> {
        let f = self
            .constructors
            .get(variant.index())
            .ok_or_else(|| GlueFault::Uninhabited {
                ty: self.layout.name.clone(),
            })?;
        let mut value = vec![0u8; self.layout.size as usize];
        interp::construct(f, payload, &mut value)?;
        Ok(value)
    }

    /// Dispatch on the discriminant of `value` and extract its payload.
    pub fn decode(&self, value: &[u8]) -> Result<(VariantId, Vec<u8>), GlueFault> {
        let variant = match &self.matcher {
            Some(matcher) => {
                let (tag, _) = interp::discriminant(matcher, value)?;
                self.layout
                    .variant_for_tag(tag)
                    .ok_or_else(|| GlueFault::UnknownTag {
                        ty: self.layout.name.clone(),
                        tag,
                    })?
                    .id
            }
            None if self.readers.len() == 1 => VariantId(0),
            None => {
                return Err(GlueFault::Uninhabited {
                    ty: self.layout.name.clone(),
                });
            }
        };

        match interp::read(self.reader(variant), value)? {
            (ReadOutcome::Matched(payload), _) => Ok((variant, payload)),
            (ReadOutcome::Mismatch { found }, _) => Err(GlueFault::UnknownTag {
                ty: self.layout.name.clone(),
                tag: found,
            }),
        }
    }
}

/// Generate and check the glue of `layout`.
pub fn generate(
    layout: Arc<LayoutDescriptor>,
    endianness: Endianness,
) -> Result<GlueSet, InternalError> {
    let generator = Generator {
        layout: &layout,
        endianness,
    };
    let constructors = layout
        .variants
        .iter()
        .map(|v| generator.constructor(v))
        .collect::<Vec<_>>();
    let readers = layout
        .variants
        .iter()
        .map(|v| generator.reader(v))
        .collect::<Vec<_>>();
    let matcher = generator.matcher();

    for f in constructors.iter().chain(&readers).chain(&matcher) {
        check(f, &layout).map_err(|reason| InternalError::MalformedGlue {
            name: f.name.clone(),
            reason,
        })?;
        trace!(name = %f.name, ops = f.ops.len(), "generated glue");
    }

    Ok(GlueSet {
        layout,
        constructors,
        readers,
        matcher,
    })
}

struct Generator<'a> {
    layout: &'a LayoutDescriptor,
    endianness: Endianness,
}

impl Generator<'_> {
    fn function(&self, name: String, kind: GlueKind, payload_size: u32, ops: Vec<GlueOp>) -> GlueFn {
        GlueFn {
            name,
            kind,
            endianness: self.endianness,
            value_size: self.layout.size,
            payload_size,
            ops,
        }
    }

    fn constructor(&self, v: &VariantLayout) -> GlueFn {
        let mut ops = vec![];
        if v.shape.size > 0 {
            ops.push(GlueOp::WritePayload {
                offset: v.payload_offset,
                len: v.shape.size,
            });
        }
        if let Some((offset, width)) = self.layout.discriminant.offset_width() {
            ops.push(GlueOp::WriteTag {
                offset,
                width,
                value: v.tag,
            });
        }
        self.function(
            format!("{}_{}_new", self.layout.name, v.name),
            GlueKind::Construct(v.id),
            v.shape.size,
            ops,
        )
    }

    fn reader(&self, v: &VariantLayout) -> GlueFn {
        let mut ops = vec![];
        if let Some((offset, width)) = self.layout.discriminant.offset_width() {
            ops.push(GlueOp::ReadTag { offset, width });
            ops.push(GlueOp::ExpectTag { expected: v.tag });
        }
        if v.shape.size > 0 {
            ops.push(GlueOp::ReadPayload {
                offset: v.payload_offset,
                len: v.shape.size,
            });
        }
        self.function(
            format!("{}_{}_read", self.layout.name, v.name),
            GlueKind::Read(v.id),
            v.shape.size,
            ops,
        )
    }

    fn matcher(&self) -> Option<GlueFn> {
        let (offset, width) = self.layout.discriminant.offset_width()?;
        Some(self.function(
            format!("{}_tag", self.layout.name),
            GlueKind::Match,
            0,
            vec![GlueOp::ReadTag { offset, width }],
        ))
    }
}

/// Structural check of one generated function against its layout.
fn check(f: &GlueFn, layout: &LayoutDescriptor) -> Result<(), String> {
    let tag_range = layout.tag_range();
    let payload_end = layout.max_payload_size;
    let discriminated = !matches!(layout.discriminant, Discriminant::None);

    if f.value_size != layout.size {
        return Err(format!(
            "operates on {} bytes, layout has {}",
            f.value_size, layout.size
        ));
    }

    let in_bounds = |offset: u32, len: u32| {
        offset
            .checked_add(len)
            .is_some_and(|end| end <= layout.size)
    };

    let mut tag_read = false;
    let mut dispatched = false;
    for op in &f.ops {
        match *op {
            GlueOp::WritePayload { offset, len } | GlueOp::ReadPayload { offset, len } => {
                if !in_bounds(offset, len) {
                    return Err(format!("{len} payload bytes at {offset} out of bounds"));
                }
                if len != f.payload_size {
                    return Err(format!(
                        "copies {len} payload bytes, variant has {}",
                        f.payload_size
                    ));
                }
                if let Some(tag) = &tag_range
                    && offset < tag.end
                    && tag.start < offset + len
                {
                    return Err(format!("payload bytes overlap the tag at {tag:?}"));
                }
                if matches!(op, GlueOp::ReadPayload { .. }) && discriminated && !dispatched {
                    return Err("reads payload before dispatching on the tag".to_string());
                }
            }
            GlueOp::WriteTag { offset, width, .. } | GlueOp::ReadTag { offset, width } => {
                if tag_range != offset.checked_add(width.bytes()).map(|end| offset..end) {
                    return Err(format!("tag access at {offset} does not match the layout"));
                }
                if offset < payload_end {
                    return Err(format!("tag at {offset} overlaps payload bytes"));
                }
                tag_read |= matches!(op, GlueOp::ReadTag { .. });
            }
            GlueOp::ExpectTag { .. } => {
                if !tag_read {
                    return Err("compares a tag it never read".to_string());
                }
                dispatched = true;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        layout::{LayoutCache, TagWidth},
        target::TargetInfo,
        types::{
            FieldType, Primitive, SumType, TypeEnv,
            tests::{prim, sum, value_type},
        },
    };

    fn glue_for(ty: SumType, endianness: Endianness) -> GlueSet {
        let mut env = TypeEnv::new();
        let id = env.insert(ty).unwrap();
        let cache = LayoutCache::new(&env, TargetInfo::new(8, endianness));
        generate(cache.layout_of(id).unwrap(), endianness).unwrap()
    }

    fn id_of(glue: &GlueSet, name: &str) -> VariantId {
        glue.layout.variant_by_name(name).unwrap().id
    }

    #[test]
    fn names_follow_type_and_variant() {
        let glue = glue_for(value_type(), Endianness::Little);
        let names: Vec<_> = glue.functions().map(|f| f.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "Value_Foo_new",
                "Value_Bar_new",
                "Value_Blah_new",
                "Value_Baz_new",
                "Value_Foo_read",
                "Value_Bar_read",
                "Value_Blah_read",
                "Value_Baz_read",
                "Value_tag",
            ]
        );
    }

    #[test]
    fn unit_constructor_writes_only_the_tag() {
        let glue = glue_for(value_type(), Endianness::Little);
        let baz = glue.constructor(id_of(&glue, "Baz"));
        assert_eq!(
            baz.ops,
            vec![GlueOp::WriteTag {
                offset: 24,
                width: TagWidth::W1,
                value: 3
            }]
        );
    }

    #[test]
    fn reader_dispatches_before_payload() {
        let glue = glue_for(value_type(), Endianness::Little);
        let bar = glue.reader(id_of(&glue, "Bar"));
        assert_eq!(
            bar.ops,
            vec![
                GlueOp::ReadTag {
                    offset: 24,
                    width: TagWidth::W1
                },
                GlueOp::ExpectTag { expected: 1 },
                GlueOp::ReadPayload { offset: 0, len: 8 },
            ]
        );
    }

    #[test]
    fn single_variant_passes_through() {
        let glue = glue_for(
            sum("Wrap", vec![("Only", vec![prim(Primitive::U64)])]),
            Endianness::Little,
        );
        assert!(glue.matcher.is_none());
        for f in glue.functions() {
            assert!(f.ops.iter().all(|op| !matches!(
                op,
                GlueOp::ReadTag { .. } | GlueOp::WriteTag { .. } | GlueOp::ExpectTag { .. }
            )));
        }
        let bytes = 0xdead_beef_u64.to_le_bytes();
        let value = glue.encode(VariantId(0), &bytes).unwrap();
        assert_eq!(value, bytes);
        assert_eq!(glue.decode(&value).unwrap(), (VariantId(0), bytes.to_vec()));
    }

    #[test]
    fn empty_type_has_no_glue() {
        let glue = glue_for(sum("Never", vec![]), Endianness::Little);
        assert_eq!(glue.functions().count(), 0);
        assert!(matches!(
            glue.decode(&[]),
            Err(GlueFault::Uninhabited { .. })
        ));
        assert!(matches!(
            glue.encode(VariantId(0), &[]),
            Err(GlueFault::Uninhabited { .. })
        ));
    }

    #[test]
    fn round_trip_every_variant() {
        for endianness in [Endianness::Little, Endianness::Big] {
            let glue = glue_for(value_type(), endianness);
            for v in &glue.layout.variants {
                let payload: Vec<u8> = (0..v.shape.size).map(|i| (i as u8).wrapping_mul(37) ^ 0x5a).collect();
                let value = glue.encode(v.id, &payload).unwrap();
                assert_eq!(value.len(), 32);
                assert_eq!(glue.decode(&value).unwrap(), (v.id, payload));
            }
        }
    }

    #[test]
    fn wide_tags_round_trip_big_endian() {
        let variants: Vec<(String, Vec<FieldType>)> = (0..300)
            .map(|i| (format!("V{i}"), vec![prim(Primitive::U8)]))
            .collect();
        let ty = sum(
            "Many",
            variants.iter().map(|(n, f)| (n.as_str(), f.clone())).collect(),
        );
        let glue = glue_for(ty, Endianness::Big);
        let v = id_of(&glue, "V299");
        let value = glue.encode(v, &[7]).unwrap();
        // u8 payload, u16 tag appended at offset 1
        assert_eq!(value, vec![7, 0x01, 0x2b, 0]);
        assert_eq!(glue.decode(&value).unwrap(), (v, vec![7]));
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let glue = glue_for(value_type(), Endianness::Little);
        let mut value = vec![0u8; 32];
        value[24] = 9;
        assert_eq!(
            glue.decode(&value),
            Err(GlueFault::UnknownTag {
                ty: "Value".into(),
                tag: 9
            })
        );
    }

    #[test]
    fn wrong_payload_length_is_rejected() {
        let glue = glue_for(value_type(), Endianness::Little);
        let err = glue.encode(id_of(&glue, "Bar"), &[1, 2, 3]).unwrap_err();
        assert!(matches!(err, GlueFault::LengthMismatch { expected: 8, got: 3, .. }));
    }

    #[test]
    fn no_payload_read_before_dispatch() {
        let glue = glue_for(value_type(), Endianness::Little);
        let blah = id_of(&glue, "Blah");
        let mut value = vec![0xaa_u8; 32];
        let trace =
            interp::construct(glue.constructor(blah), &[1, 2, 3, 4], &mut value).unwrap();
        assert_eq!(trace.writes, vec![0..4, 24..25]);
        assert!(trace.reads.is_empty());

        // bytes no variant but Foo uses keep their poison
        assert!(value[8..24].iter().all(|b| *b == 0xaa));

        for v in &glue.layout.variants {
            let (outcome, trace) = interp::read(glue.reader(v.id), &value).unwrap();
            if v.id == blah {
                assert_eq!(outcome, ReadOutcome::Matched(vec![1, 2, 3, 4]));
                assert_eq!(trace.reads, vec![24..25, 0..4]);
            } else {
                assert_eq!(outcome, ReadOutcome::Mismatch { found: 2 });
                assert_eq!(trace.reads, vec![24..25]);
                assert!(!trace.read_overlaps(&(0..24)));
            }
        }

        let (tag, trace) = interp::discriminant(glue.matcher.as_ref().unwrap(), &value).unwrap();
        assert_eq!(tag, 2);
        assert_eq!(trace.reads, vec![24..25]);
    }

    #[test]
    fn hidden_tag_lands_after_payload() {
        let glue = glue_for(
            sum(
                "T",
                vec![
                    (
                        "A",
                        vec![FieldType::Array {
                            elem: Box::new(prim(Primitive::U8)),
                            len: 5,
                        }],
                    ),
                    ("B", vec![prim(Primitive::U32)]),
                ],
            ),
            Endianness::Little,
        );
        assert_eq!(glue.layout.size, 8);
        let a = id_of(&glue, "A");
        let value = glue.encode(a, &[1, 2, 3, 4, 5]).unwrap();
        assert_eq!(value, vec![1, 2, 3, 4, 5, 0, 0, 0]);
        let b = id_of(&glue, "B");
        let value = glue.encode(b, &[9, 9, 9, 9]).unwrap();
        assert_eq!(value, vec![9, 9, 9, 9, 0, 1, 0, 0]);
    }

    #[test]
    fn check_rejects_early_payload_reads() {
        let glue = glue_for(value_type(), Endianness::Little);
        let mut bad = glue.reader(VariantId(1)).clone();
        bad.ops.swap(1, 2);
        assert!(check(&bad, &glue.layout).unwrap_err().contains("before dispatching"));
    }

    #[test]
    fn check_rejects_tag_overlapping_payload() {
        let glue = glue_for(value_type(), Endianness::Little);
        let mut bad = glue.constructor(VariantId(0)).clone();
        bad.ops.push(GlueOp::WritePayload { offset: 20, len: 24 });
        assert!(check(&bad, &glue.layout).is_err());

        let mut bad = glue.matcher.clone().unwrap();
        bad.ops = vec![GlueOp::ReadTag {
            offset: 16,
            width: TagWidth::W1,
        }];
        assert!(check(&bad, &glue.layout).is_err());
    }

    #[test]
    fn check_rejects_offsets_near_u32_max() {
        let glue = glue_for(value_type(), Endianness::Little);
        let mut bad = glue.constructor(VariantId(1)).clone();
        bad.ops = vec![GlueOp::WritePayload {
            offset: u32::MAX,
            len: 8,
        }];
        let err = check(&bad, &glue.layout).unwrap_err();
        assert!(err.contains("out of bounds"), "{err}");

        let mut bad = glue.matcher.clone().unwrap();
        bad.ops = vec![GlueOp::ReadTag {
            offset: u32::MAX,
            width: TagWidth::W8,
        }];
        assert!(check(&bad, &glue.layout).is_err());
    }
}
