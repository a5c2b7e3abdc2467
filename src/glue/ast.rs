use std::fmt::Display;

use crate::{
    layout::{TagWidth, VariantId},
    target::Endianness,
};

/// One step of a glue function.
///
/// Glue functions move bytes between a union value and the payload of one
/// variant. The payload buffer is always laid out with the variant's own
/// shape starting at offset 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlueOp {
    /// Copy `len` payload bytes into the value at `offset`.
    WritePayload { offset: u32, len: u32 },
    WriteTag {
        offset: u32,
        width: TagWidth,
        value: u64,
    },
    ReadTag { offset: u32, width: TagWidth },
    /// Stop unless the most recently read tag equals `expected`.
    ExpectTag { expected: u64 },
    /// Copy `len` bytes at `offset` out of the value into the payload.
    ReadPayload { offset: u32, len: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlueKind {
    Construct(VariantId),
    Read(VariantId),
    /// Returns the discriminant; the caller dispatches on it.
    Match,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlueFn {
    pub name: String,
    pub kind: GlueKind,
    pub endianness: Endianness,
    /// Size of the union value the function operates on.
    pub value_size: u32,
    /// Size of the payload buffer; 0 for matchers.
    pub payload_size: u32,
    pub ops: Vec<GlueOp>,
}

impl Display for GlueFn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{} ({:?}):", self.name, self.kind)?;
        for op in &self.ops {
            match op {
                GlueOp::WritePayload { offset, len } => writeln!(f, "  write_payload {offset}, {len}")?,
                GlueOp::WriteTag { offset, width, value } => {
                    writeln!(f, "  write_tag u{} @ {offset} = {value}", width.bytes() * 8)?
                }
                GlueOp::ReadTag { offset, width } => {
                    writeln!(f, "  read_tag u{} @ {offset}", width.bytes() * 8)?
                }
                GlueOp::ExpectTag { expected } => writeln!(f, "  expect_tag {expected}")?,
                GlueOp::ReadPayload { offset, len } => writeln!(f, "  read_payload {offset}, {len}")?,
            }
        }
        Ok(())
    }
}
