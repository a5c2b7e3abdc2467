//! Reference evaluator for glue functions.
//!
//! Runs glue over plain byte buffers. Host-side encoding and decoding go
//! through here, and every access to the union value is recorded so callers
//! can check which bytes a function looked at.

use std::ops::Range;

use crate::{
    glue::ast::{GlueFn, GlueKind, GlueOp},
    target::Endianness,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GlueFault {
    #[error("`{name}` accesses bytes {start}..{end} of a {size}-byte buffer")]
    OutOfBounds {
        name: String,
        start: u32,
        end: u32,
        size: usize,
    },

    #[error("`{name}` expects {expected} bytes, got {got}")]
    LengthMismatch {
        name: String,
        expected: u32,
        got: usize,
    },

    #[error("`{name}` reads payload bytes before dispatching on the discriminant")]
    ReadBeforeDispatch { name: String },

    #[error("`{name}` compares a discriminant it never read")]
    MissingTag { name: String },

    #[error("`{name}` cannot be used as a {expected} function")]
    WrongKind { name: String, expected: &'static str },

    #[error("discriminant {tag} does not name a variant of `{ty}`")]
    UnknownTag { ty: String, tag: u64 },

    #[error("`{ty}` has no variants")]
    Uninhabited { ty: String },
}

/// Byte ranges of the union value touched by one call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trace {
    pub reads: Vec<Range<u32>>,
    pub writes: Vec<Range<u32>>,
}

impl Trace {
    /// True if any recorded read overlaps `range`.
    pub fn read_overlaps(&self, range: &Range<u32>) -> bool {
        self.reads
            .iter()
            .any(|r| r.start < range.end && range.start < r.end)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    Matched(Vec<u8>),
    Mismatch { found: u64 },
}

/// Write `payload` into `value` as the variant `f` constructs.
pub fn construct(f: &GlueFn, payload: &[u8], value: &mut [u8]) -> Result<Trace, GlueFault> {
    if !matches!(f.kind, GlueKind::Construct(_)) {
        return Err(wrong_kind(f, "constructor"));
    }
    check_len(f, f.payload_size, payload.len())?;
    check_len(f, f.value_size, value.len())?;

    let mut trace = Trace::default();
    for op in &f.ops {
        match *op {
            GlueOp::WritePayload { offset, len } => {
                let dst = range(f, offset, len, value.len())?;
                let src = range(f, 0, len, payload.len())?;
                value[usize_range(&dst)].copy_from_slice(&payload[usize_range(&src)]);
                trace.writes.push(dst);
            }
            GlueOp::WriteTag {
                offset,
                width,
                value: tag,
            } => {
                let dst = range(f, offset, width.bytes(), value.len())?;
                value[usize_range(&dst)]
                    .copy_from_slice(&f.endianness.encode(tag, width.bytes() as usize));
                trace.writes.push(dst);
            }
            GlueOp::ReadTag { .. } | GlueOp::ExpectTag { .. } | GlueOp::ReadPayload { .. } => {
                return Err(wrong_kind(f, "constructor"));
            }
        }
    }
    Ok(trace)
}

/// Extract the payload of the variant `f` reads, if `value` holds it.
pub fn read(f: &GlueFn, value: &[u8]) -> Result<(ReadOutcome, Trace), GlueFault> {
    if !matches!(f.kind, GlueKind::Read(_)) {
        return Err(wrong_kind(f, "reader"));
    }
    check_len(f, f.value_size, value.len())?;

    let discriminated = f.ops.iter().any(|op| matches!(op, GlueOp::ReadTag { .. }));
    let mut trace = Trace::default();
    let mut tag = None;
    let mut dispatched = false;
    let mut payload = vec![0u8; f.payload_size as usize];

    for op in &f.ops {
        match *op {
            GlueOp::ReadTag { offset, width } => {
                tag = Some(read_tag(f, f.endianness, value, offset, width.bytes(), &mut trace)?);
            }
            GlueOp::ExpectTag { expected } => {
                let found = tag.ok_or_else(|| GlueFault::MissingTag {
                    name: f.name.clone(),
                })?;
                if found != expected {
                    return Ok((ReadOutcome::Mismatch { found }, trace));
                }
                dispatched = true;
            }
            GlueOp::ReadPayload { offset, len } => {
                if discriminated && !dispatched {
                    return Err(GlueFault::ReadBeforeDispatch {
                        name: f.name.clone(),
                    });
                }
                let src = range(f, offset, len, value.len())?;
                let dst = range(f, 0, len, payload.len())?;
                payload[usize_range(&dst)].copy_from_slice(&value[usize_range(&src)]);
                trace.reads.push(src);
            }
            GlueOp::WritePayload { .. } | GlueOp::WriteTag { .. } => {
                return Err(wrong_kind(f, "reader"));
            }
        }
    }
    Ok((ReadOutcome::Matched(payload), trace))
}

/// Read the discriminant of `value` with a matcher.
pub fn discriminant(f: &GlueFn, value: &[u8]) -> Result<(u64, Trace), GlueFault> {
    if f.kind != GlueKind::Match {
        return Err(wrong_kind(f, "matcher"));
    }
    check_len(f, f.value_size, value.len())?;

    let mut trace = Trace::default();
    let mut tag = None;
    for op in &f.ops {
        match *op {
            GlueOp::ReadTag { offset, width } => {
                tag = Some(read_tag(f, f.endianness, value, offset, width.bytes(), &mut trace)?);
            }
            _ => return Err(wrong_kind(f, "matcher")),
        }
    }
    let tag = tag.ok_or_else(|| GlueFault::MissingTag {
        name: f.name.clone(),
    })?;
    Ok((tag, trace))
}

fn read_tag(
    f: &GlueFn,
    endianness: Endianness,
    value: &[u8],
    offset: u32,
    width: u32,
    trace: &mut Trace,
) -> Result<u64, GlueFault> {
    let src = range(f, offset, width, value.len())?;
    let tag = endianness.decode(&value[usize_range(&src)]);
    trace.reads.push(src);
    Ok(tag)
}

fn range(f: &GlueFn, offset: u32, len: u32, size: usize) -> Result<Range<u32>, GlueFault> {
    let end = offset.checked_add(len);
    match end {
        Some(end) if end as usize <= size => Ok(offset..end),
        _ => Err(GlueFault::OutOfBounds {
            name: f.name.clone(),
            start: offset,
            end: end.unwrap_or(u32::MAX),
            size,
        }),
    }
}

fn usize_range(r: &Range<u32>) -> Range<usize> {
    r.start as usize..r.end as usize
}

fn check_len(f: &GlueFn, expected: u32, got: usize) -> Result<(), GlueFault> {
    if expected as usize != got {
        return Err(GlueFault::LengthMismatch {
            name: f.name.clone(),
            expected,
            got,
        });
    }
    Ok(())
}

fn wrong_kind(f: &GlueFn, expected: &'static str) -> GlueFault {
    GlueFault::WrongKind {
        name: f.name.clone(),
        expected,
    }
}
