//! DeviceSQL string codec for Pioneer databases
//!
//! DeviceSQL strings use three encoding formats, selected by the leading
//! length-and-kind byte:
//! - Short ASCII (LSB set): total length encoded in the upper 7 bits
//! - Long ASCII (0x40): 2-byte length + padding byte + ASCII data
//! - Long UTF-16LE (0x90): 2-byte length + padding byte + UTF-16LE data
//!
//! ISRCs are stored with the 0x90 kind byte but carry an ASCII payload
//! introduced by a 0x03 marker. Any other kind byte decodes to the empty
//! string with a warning; it is never a fatal error.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;
use crate::source::ByteSource;

/// Kind byte values
const KIND_LONG_ASCII: u8 = 0x40;
const KIND_UTF16LE: u8 = 0x90;

/// Marker byte introducing an ASCII ISRC payload inside a 0x90 string
const ISRC_MARKER: u8 = 0x03;

/// Which on-disk encoding a decoded string came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StringKind {
    ShortAscii,
    LongAscii,
    LongUtf16Le,
    Isrc,
    Unknown(u8),
}

/// A decoded DeviceSQL string together with its source variant and the
/// number of bytes it occupied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedString {
    pub text: String,
    pub kind: StringKind,
    pub consumed: u64,
}

impl DecodedString {
    fn empty(kind: StringKind, consumed: u64) -> Self {
        Self {
            text: String::new(),
            kind,
            consumed,
        }
    }
}

/// Decode the DeviceSQL string starting at `offset`.
///
/// Short reads propagate as [`crate::Error::Truncated`]. Encoding problems
/// inside the body (non-ASCII bytes in an ASCII variant, unpaired UTF-16
/// surrogates) downgrade to U+FFFD and decoding continues.
pub fn decode(src: &ByteSource, offset: u64) -> Result<DecodedString> {
    let kind_byte = src.read_u8(offset)?;

    if kind_byte & 0x01 == 1 {
        // Total length (header byte included) lives in the upper 7 bits.
        let total = (kind_byte >> 1) as u64;
        let body_len = total.saturating_sub(1);
        let body = src.read_bytes(offset + 1, body_len)?;
        return Ok(DecodedString {
            text: ascii_lossy(strip_nul(body)),
            kind: StringKind::ShortAscii,
            consumed: total.max(1),
        });
    }

    match kind_byte {
        KIND_LONG_ASCII => {
            let total = src.read_u16_le(offset + 1)? as u64;
            let body_len = total.saturating_sub(4);
            let body = src.read_bytes(offset + 4, body_len)?;
            Ok(DecodedString {
                text: ascii_lossy(strip_nul(body)),
                kind: StringKind::LongAscii,
                consumed: total.max(4),
            })
        }
        KIND_UTF16LE => {
            let total = src.read_u16_le(offset + 1)? as u64;
            let body_len = total.saturating_sub(4);
            let body = src.read_bytes(offset + 4, body_len)?;
            if body.first() == Some(&ISRC_MARKER) {
                // ASCII ISRC payload: 0x03 marker, text, NUL terminator.
                return Ok(DecodedString {
                    text: ascii_lossy(strip_nul(&body[1..])),
                    kind: StringKind::Isrc,
                    consumed: total.max(4),
                });
            }
            let units: Vec<u16> = body
                .chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                .collect();
            Ok(DecodedString {
                text: String::from_utf16_lossy(strip_nul_units(&units)),
                kind: StringKind::LongUtf16Le,
                consumed: total.max(4),
            })
        }
        other => {
            warn!(
                length_and_kind = other,
                offset, "unknown DeviceSQL string kind, returning empty string"
            );
            Ok(DecodedString::empty(StringKind::Unknown(other), 1))
        }
    }
}

fn strip_nul(body: &[u8]) -> &[u8] {
    let mut end = body.len();
    while end > 0 && body[end - 1] == 0 {
        end -= 1;
    }
    &body[..end]
}

fn strip_nul_units(units: &[u16]) -> &[u16] {
    let mut end = units.len();
    while end > 0 && units[end - 1] == 0 {
        end -= 1;
    }
    &units[..end]
}

fn ascii_lossy(body: &[u8]) -> String {
    body.iter()
        .map(|&b| if b < 0x80 { b as char } else { '\u{FFFD}' })
        .collect()
}
