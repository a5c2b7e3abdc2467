//! Target facts the layout and glue passes depend on.

use serde::Deserialize;

/// Byte order used to encode discriminants and boundary chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endianness {
    #[default]
    Little,
    Big,
}

impl Endianness {
    /// Encode the low `width` bytes of `value`.
    pub fn encode(self, value: u64, width: usize) -> Vec<u8> {
        match self {
            Endianness::Little => value.to_le_bytes()[..width].to_vec(),
            Endianness::Big => value.to_be_bytes()[8 - width..].to_vec(),
        }
    }

    /// Decode up to eight bytes into an unsigned integer.
    pub fn decode(self, bytes: &[u8]) -> u64 {
        assert!(bytes.len() <= 8, "cannot decode {} bytes", bytes.len());
        let mut buf = [0u8; 8];
        match self {
            Endianness::Little => {
                buf[..bytes.len()].copy_from_slice(bytes);
                u64::from_le_bytes(buf)
            }
            Endianness::Big => {
                buf[8 - bytes.len()..].copy_from_slice(bytes);
                u64::from_be_bytes(buf)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetInfo {
    /// Pointer width in bytes, 4 or 8.
    pub pointer_width: u32,
    pub endianness: Endianness,
}

impl TargetInfo {
    pub fn new(pointer_width: u32, endianness: Endianness) -> Self {
        assert!(
            pointer_width == 4 || pointer_width == 8,
            "unsupported pointer width {pointer_width}"
        );
        Self {
            pointer_width,
            endianness,
        }
    }
}

impl Default for TargetInfo {
    fn default() -> Self {
        Self::new(8, Endianness::Little)
    }
}
