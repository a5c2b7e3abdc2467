//! Marshaling of sum values across the host calling convention.
//!
//! A [`BoundaryPlan`] decides, per parameter and result of an entry point,
//! whether a sum value travels in integer chunks or behind a pointer. The
//! host-side [`BoundaryMarshaler::encode`] and [`BoundaryMarshaler::decode`]
//! produce and consume exactly what the emitted thunks pass across.

use std::{fmt::Display, sync::Arc};

use serde::Deserialize;
use tracing::debug;

use crate::{
    common::{Ident, TypeId},
    error::{BoundaryIssue, LayoutError},
    glue::{GlueFault, GlueSet},
    layout::{LayoutCache, LayoutDescriptor, VariantId},
    target::TargetInfo,
    types::Primitive,
};

/// Size of one by-value chunk in bytes.
pub const CHUNK_BYTES: u32 = 8;

/// Limits of the host calling convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostConvention {
    pub target: TargetInfo,
    /// Sum values larger than this are passed through a pointer.
    pub max_by_value_size: u32,
    pub max_discriminant_width: u32,
    pub max_alignment: u32,
    /// Reject discriminants whose offset is not a multiple of their width.
    pub require_aligned_discriminant: bool,
}

impl Default for HostConvention {
    fn default() -> Self {
        Self {
            target: TargetInfo::default(),
            max_by_value_size: 16,
            max_discriminant_width: 4,
            max_alignment: 16,
            require_aligned_discriminant: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Implemented by the compiled program, called by the host.
    Export,
    /// Implemented by the host, called by the compiled program.
    Import,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryType {
    Scalar(Primitive),
    Sum(String),
}

impl Display for BoundaryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BoundaryType::Scalar(p) => write!(f, "{p}"),
            BoundaryType::Sum(name) => write!(f, "{name}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoint {
    pub name: Ident,
    pub direction: Direction,
    pub params: Vec<BoundaryType>,
    pub ret: Option<BoundaryType>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassMode {
    /// The value travels as `chunks` 64-bit integers.
    Direct { chunks: u32 },
    /// The value travels behind a pointer. A returned value is written
    /// through a leading out-pointer parameter.
    Indirect,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SumCrossing {
    pub ty: TypeId,
    pub layout: Arc<LayoutDescriptor>,
    pub mode: PassMode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Crossing {
    Scalar(Primitive),
    Sum(SumCrossing),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundaryPlan {
    pub name: String,
    pub direction: Direction,
    pub params: Vec<Crossing>,
    pub ret: Option<Crossing>,
}

impl BoundaryPlan {
    pub fn returns_indirect(&self) -> bool {
        matches!(
            self.ret,
            Some(Crossing::Sum(SumCrossing {
                mode: PassMode::Indirect,
                ..
            }))
        )
    }
}

/// A sum value in the form the host passes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostValue {
    Direct(Vec<u64>),
    Indirect(Vec<u8>),
}

pub struct BoundaryMarshaler<'c, 'env> {
    convention: HostConvention,
    cache: &'c LayoutCache<'env>,
}

impl<'c, 'env> BoundaryMarshaler<'c, 'env> {
    pub fn new(convention: HostConvention, cache: &'c LayoutCache<'env>) -> Self {
        Self { convention, cache }
    }

    /// Decide how every parameter and the result of `entry` cross over.
    pub fn plan(&self, entry: &EntryPoint) -> Result<BoundaryPlan, LayoutError> {
        let params = entry
            .params
            .iter()
            .map(|ty| self.crossing(entry, ty))
            .collect::<Result<Vec<_>, _>>()?;
        let ret = entry
            .ret
            .as_ref()
            .map(|ty| self.crossing(entry, ty))
            .transpose()?;

        let plan = BoundaryPlan {
            name: entry.name.data.clone(),
            direction: entry.direction,
            params,
            ret,
        };
        debug!(
            entry = %plan.name,
            direction = ?plan.direction,
            indirect_ret = plan.returns_indirect(),
            "planned boundary"
        );
        Ok(plan)
    }

    pub fn pass_mode(&self, layout: &LayoutDescriptor) -> PassMode {
        if layout.size <= self.convention.max_by_value_size {
            PassMode::Direct {
                chunks: layout.size.div_ceil(CHUNK_BYTES),
            }
        } else {
            PassMode::Indirect
        }
    }

    /// Construct `variant` and put it in host form.
    pub fn encode(
        &self,
        glue: &GlueSet,
        variant: VariantId,
        payload: &[u8],
    ) -> Result<HostValue, GlueFault> {
        let bytes = glue.encode(variant, payload)?;
        Ok(match self.pass_mode(&glue.layout) {
            PassMode::Indirect => HostValue::Indirect(bytes),
            PassMode::Direct { .. } => HostValue::Direct(
                bytes
                    .chunks(CHUNK_BYTES as usize)
                    .map(|c| {
                        // a short last chunk starts at the chunk's lowest address
                        let mut chunk = [0u8; CHUNK_BYTES as usize];
                        chunk[..c.len()].copy_from_slice(c);
                        self.convention.target.endianness.decode(&chunk)
                    })
                    .collect(),
            ),
        })
    }

    /// Read a host value back into its variant and payload.
    pub fn decode(
        &self,
        glue: &GlueSet,
        value: &HostValue,
    ) -> Result<(VariantId, Vec<u8>), GlueFault> {
        let size = glue.layout.size as usize;
        let name = || glue.layout.name.clone();
        let bytes = match (self.pass_mode(&glue.layout), value) {
            (PassMode::Direct { chunks }, HostValue::Direct(values)) => {
                if values.len() != chunks as usize {
                    return Err(GlueFault::LengthMismatch {
                        name: name(),
                        expected: chunks,
                        got: values.len(),
                    });
                }
                let mut bytes: Vec<u8> = values
                    .iter()
                    .flat_map(|c| {
                        self.convention
                            .target
                            .endianness
                            .encode(*c, CHUNK_BYTES as usize)
                    })
                    .collect();
                bytes.truncate(size);
                bytes
            }
            (PassMode::Indirect, HostValue::Indirect(bytes)) => bytes.clone(),
            (_, HostValue::Direct(_)) => {
                return Err(GlueFault::WrongKind {
                    name: name(),
                    expected: "by-pointer",
                });
            }
            (_, HostValue::Indirect(_)) => {
                return Err(GlueFault::WrongKind {
                    name: name(),
                    expected: "by-value",
                });
            }
        };
        glue.decode(&bytes)
    }

    fn crossing(&self, entry: &EntryPoint, ty: &BoundaryType) -> Result<Crossing, LayoutError> {
        let unsupported = |issue: BoundaryIssue| LayoutError::UnsupportedBoundaryType {
            ty: ty.to_string(),
            entry: entry.name.data.clone(),
            issue,
            pos: entry.name.pos.clone(),
        };

        let name = match ty {
            BoundaryType::Scalar(Primitive::Str) => {
                return Err(unsupported(BoundaryIssue::UnsupportedScalar(
                    Primitive::Str.to_string(),
                )));
            }
            BoundaryType::Scalar(p) => return Ok(Crossing::Scalar(*p)),
            BoundaryType::Sum(name) => name,
        };

        let layout = self.cache.layout_by_name(name, &entry.name.pos)?;
        if let Some((offset, width)) = layout.discriminant.offset_width() {
            let width = width.bytes();
            if width > self.convention.max_discriminant_width {
                return Err(unsupported(BoundaryIssue::DiscriminantTooWide {
                    width,
                    max: self.convention.max_discriminant_width,
                }));
            }
            if self.convention.require_aligned_discriminant && offset % width != 0 {
                return Err(unsupported(BoundaryIssue::UnalignedDiscriminant { offset, width }));
            }
        }
        if layout.align > self.convention.max_alignment {
            return Err(unsupported(BoundaryIssue::OverAligned {
                align: layout.align,
                max: self.convention.max_alignment,
            }));
        }

        Ok(Crossing::Sum(SumCrossing {
            ty: layout.id,
            mode: self.pass_mode(&layout),
            layout,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        common::Position,
        glue,
        target::Endianness,
        types::{
            FieldType, SumType, TypeEnv,
            tests::{prim, sum, value_type},
        },
    };

    fn env(types: Vec<SumType>) -> TypeEnv {
        let mut env = TypeEnv::new();
        for ty in types {
            env.insert(ty).unwrap();
        }
        env
    }

    fn entry(params: Vec<BoundaryType>, ret: Option<BoundaryType>) -> EntryPoint {
        EntryPoint {
            name: Ident::synthetic("f"),
            direction: Direction::Export,
            params,
            ret,
        }
    }

    fn small() -> SumType {
        sum(
            "Small",
            vec![("A", vec![prim(Primitive::U32)]), ("B", vec![])],
        )
    }

    fn sum_ty(name: &str) -> BoundaryType {
        BoundaryType::Sum(name.into())
    }

    fn mode(c: &Crossing) -> PassMode {
        match c {
            Crossing::Sum(s) => s.mode,
            Crossing::Scalar(_) => panic!("expected a sum crossing"),
        }
    }

    #[test]
    fn size_threshold_picks_pass_mode() {
        let env = env(vec![value_type(), small()]);
        let cache = LayoutCache::new(&env, TargetInfo::default());
        let m = BoundaryMarshaler::new(HostConvention::default(), &cache);

        let plan = m
            .plan(&entry(
                vec![sum_ty("Small"), BoundaryType::Scalar(Primitive::I32)],
                Some(sum_ty("Value")),
            ))
            .unwrap();
        assert_eq!(mode(&plan.params[0]), PassMode::Direct { chunks: 1 });
        assert_eq!(plan.params[1], Crossing::Scalar(Primitive::I32));
        assert_eq!(mode(plan.ret.as_ref().unwrap()), PassMode::Indirect);
        assert!(plan.returns_indirect());

        let wide = BoundaryMarshaler::new(
            HostConvention {
                max_by_value_size: 32,
                ..HostConvention::default()
            },
            &cache,
        );
        let plan = wide.plan(&entry(vec![sum_ty("Value")], None)).unwrap();
        assert_eq!(mode(&plan.params[0]), PassMode::Direct { chunks: 4 });
    }

    #[test]
    fn wide_discriminant_rejected() {
        let names: Vec<String> = (0..300).map(|i| format!("V{i}")).collect();
        let many = sum(
            "Many",
            names
                .iter()
                .map(|n| (n.as_str(), vec![prim(Primitive::U64)]))
                .collect(),
        );
        let env = env(vec![many]);
        let cache = LayoutCache::new(&env, TargetInfo::default());
        let m = BoundaryMarshaler::new(
            HostConvention {
                max_discriminant_width: 1,
                ..HostConvention::default()
            },
            &cache,
        );
        let err = m.plan(&entry(vec![sum_ty("Many")], None)).unwrap_err();
        assert!(matches!(
            err,
            LayoutError::UnsupportedBoundaryType {
                issue: BoundaryIssue::DiscriminantTooWide { width: 2, max: 1 },
                ..
            }
        ));
    }

    #[test]
    fn unaligned_discriminant_rejected_unless_allowed() {
        let names: Vec<String> = (0..300).map(|i| format!("V{i}")).collect();
        let many = sum(
            "Bytes",
            names
                .iter()
                .map(|n| (n.as_str(), vec![prim(Primitive::U8)]))
                .collect(),
        );
        let env = env(vec![many]);
        let cache = LayoutCache::new(&env, TargetInfo::default());

        let strict = BoundaryMarshaler::new(HostConvention::default(), &cache);
        let err = strict.plan(&entry(vec![], Some(sum_ty("Bytes")))).unwrap_err();
        assert!(matches!(
            err,
            LayoutError::UnsupportedBoundaryType {
                issue: BoundaryIssue::UnalignedDiscriminant { offset: 1, width: 2 },
                ..
            }
        ));

        let lax = BoundaryMarshaler::new(
            HostConvention {
                require_aligned_discriminant: false,
                ..HostConvention::default()
            },
            &cache,
        );
        assert!(lax.plan(&entry(vec![], Some(sum_ty("Bytes")))).is_ok());
    }

    #[test]
    fn over_aligned_rejected() {
        let env = env(vec![value_type()]);
        let cache = LayoutCache::new(&env, TargetInfo::default());
        let m = BoundaryMarshaler::new(
            HostConvention {
                max_alignment: 4,
                ..HostConvention::default()
            },
            &cache,
        );
        let err = m.plan(&entry(vec![sum_ty("Value")], None)).unwrap_err();
        assert!(matches!(
            err,
            LayoutError::UnsupportedBoundaryType {
                issue: BoundaryIssue::OverAligned { align: 8, max: 4 },
                ..
            }
        ));
    }

    #[test]
    fn strings_and_unknown_types_rejected() {
        let env = env(vec![]);
        let cache = LayoutCache::new(&env, TargetInfo::default());
        let m = BoundaryMarshaler::new(HostConvention::default(), &cache);

        let err = m
            .plan(&entry(vec![BoundaryType::Scalar(Primitive::Str)], None))
            .unwrap_err();
        assert!(matches!(
            err,
            LayoutError::UnsupportedBoundaryType {
                issue: BoundaryIssue::UnsupportedScalar(_),
                ..
            }
        ));

        let err = m.plan(&entry(vec![sum_ty("Nope")], None)).unwrap_err();
        assert!(matches!(err, LayoutError::UnknownType { ref name, .. } if name == "Nope"));
    }

    #[test]
    fn layout_errors_propagate() {
        let open = sum("Open", vec![("A", vec![FieldType::Var("t".into())]), ("B", vec![])]);
        let env = env(vec![open]);
        let cache = LayoutCache::new(&env, TargetInfo::default());
        let m = BoundaryMarshaler::new(HostConvention::default(), &cache);
        let err = m.plan(&entry(vec![sum_ty("Open")], None)).unwrap_err();
        assert!(matches!(err, LayoutError::UnresolvedFieldType { .. }));
    }

    #[test]
    fn direct_values_round_trip_in_chunks() {
        for endianness in [Endianness::Little, Endianness::Big] {
            let target = TargetInfo::new(8, endianness);
            let env = env(vec![small()]);
            let cache = LayoutCache::new(&env, target);
            let m = BoundaryMarshaler::new(
                HostConvention {
                    target,
                    ..HostConvention::default()
                },
                &cache,
            );
            let layout = cache.layout_by_name("Small", &Position::nowhere()).unwrap();
            let glue = glue::generate(layout, endianness).unwrap();

            let host = m.encode(&glue, VariantId(0), &[1, 2, 3, 4]).unwrap();
            let expected = match endianness {
                Endianness::Little => 0x0000_0000_0403_0201,
                Endianness::Big => 0x0102_0304_0000_0000,
            };
            assert_eq!(host, HostValue::Direct(vec![expected]));
            assert_eq!(
                m.decode(&glue, &host).unwrap(),
                (VariantId(0), vec![1, 2, 3, 4])
            );

            let host = m.encode(&glue, VariantId(1), &[]).unwrap();
            assert_eq!(m.decode(&glue, &host).unwrap(), (VariantId(1), vec![]));
        }
    }

    #[test]
    fn partial_last_chunk_keeps_memory_order() {
        let half_ty = sum(
            "Half",
            vec![("A", vec![prim(Primitive::U16)]), ("B", vec![])],
        );
        let wide_ty = sum(
            "Wide",
            vec![
                ("A", vec![prim(Primitive::U32), prim(Primitive::U32)]),
                ("B", vec![]),
            ],
        );
        for endianness in [Endianness::Little, Endianness::Big] {
            let target = TargetInfo::new(8, endianness);
            let env = env(vec![half_ty.clone(), wide_ty.clone()]);
            let cache = LayoutCache::new(&env, target);
            let m = BoundaryMarshaler::new(
                HostConvention {
                    target,
                    ..HostConvention::default()
                },
                &cache,
            );
            let glue_of = |name: &str| {
                let layout = cache.layout_by_name(name, &Position::nowhere()).unwrap();
                glue::generate(layout, endianness).unwrap()
            };

            // size 4: payload at 0..2, tag at 2
            let half = glue_of("Half");
            assert_eq!(half.layout.size, 4);
            let host = m.encode(&half, VariantId(0), &[1, 2]).unwrap();
            let expected = match endianness {
                Endianness::Little => 0x0201,
                Endianness::Big => 0x0102_0000_0000_0000,
            };
            assert_eq!(host, HostValue::Direct(vec![expected]));
            assert_eq!(m.decode(&half, &host).unwrap(), (VariantId(0), vec![1, 2]));

            let host = m.encode(&half, VariantId(1), &[]).unwrap();
            let expected = match endianness {
                Endianness::Little => 0x0001_0000,
                Endianness::Big => 0x0000_0100_0000_0000,
            };
            assert_eq!(host, HostValue::Direct(vec![expected]));
            assert_eq!(m.decode(&half, &host).unwrap(), (VariantId(1), vec![]));

            // size 12: the tag lives alone in the second chunk
            let wide = glue_of("Wide");
            assert_eq!(wide.layout.size, 12);
            let payload = [1, 2, 3, 4, 5, 6, 7, 8];
            let host = m.encode(&wide, VariantId(0), &payload).unwrap();
            assert_eq!(
                m.decode(&wide, &host).unwrap(),
                (VariantId(0), payload.to_vec())
            );
            let host = m.encode(&wide, VariantId(1), &[]).unwrap();
            let expected = match endianness {
                Endianness::Little => vec![0, 1],
                Endianness::Big => vec![0, 0x0100_0000_0000_0000],
            };
            assert_eq!(host, HostValue::Direct(expected));
            assert_eq!(m.decode(&wide, &host).unwrap(), (VariantId(1), vec![]));
        }
    }

    #[test]
    fn indirect_values_carry_raw_bytes() {
        let env = env(vec![value_type()]);
        let cache = LayoutCache::new(&env, TargetInfo::default());
        let m = BoundaryMarshaler::new(HostConvention::default(), &cache);
        let layout = cache.layout_by_name("Value", &Position::nowhere()).unwrap();
        let glue = glue::generate(layout, Endianness::Little).unwrap();

        let host = m.encode(&glue, VariantId(1), &42u64.to_le_bytes()).unwrap();
        let HostValue::Indirect(bytes) = &host else {
            panic!("expected an indirect value");
        };
        assert_eq!(bytes.len(), 32);
        assert_eq!(bytes[24], 1);
        assert_eq!(
            m.decode(&glue, &host).unwrap(),
            (VariantId(1), 42u64.to_le_bytes().to_vec())
        );

        let wrong = HostValue::Direct(vec![0; 4]);
        assert!(matches!(m.decode(&glue, &wrong), Err(GlueFault::WrongKind { .. })));
    }
}
