//! Minimal-encoding variable-length unsigned integer codec.
//!
//! Four canonical widths: values below `0xfd` encode in a single byte;
//! otherwise a one-byte marker (`0xfd`, `0xfe`, `0xff`) is followed by the
//! value in 2, 4, or 8 little-endian bytes respectively. A value MUST be
//! encoded in the narrowest of these widths; decoding a wider-than-necessary
//! encoding is an error.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CompactSizeError {
    #[error("truncated compactsize")]
    Truncated,
    #[error("non-minimal compactsize encoding")]
    NonMinimal,
}

/// Appends the minimal encoding of `value` to `out`.
pub fn append(out: &mut Vec<u8>, value: u64) {
    if value < 0xfd {
        out.push(value as u8);
    } else if value <= 0xffff {
        out.push(0xfd);
        out.extend_from_slice(&(value as u16).to_le_bytes());
    } else if value <= 0xffff_ffff {
        out.push(0xfe);
        out.extend_from_slice(&(value as u32).to_le_bytes());
    } else {
        out.push(0xff);
        out.extend_from_slice(&value.to_le_bytes());
    }
}

/// Returns the minimal encoding of `value` as a standalone vector.
pub fn encode(value: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(9);
    append(&mut out, value);
    out
}

/// Decodes a minimal CompactSize from the front of `bytes`, returning the
/// value and the number of bytes consumed. Rejects non-minimal encodings.
pub fn decode(bytes: &[u8]) -> Result<(u64, usize), CompactSizeError> {
    let marker = *bytes.first().ok_or(CompactSizeError::Truncated)?;
    match marker {
        0..=0xfc => Ok((marker as u64, 1)),
        0xfd => {
            let raw = bytes.get(1..3).ok_or(CompactSizeError::Truncated)?;
            let value = u16::from_le_bytes(raw.try_into().unwrap());
            if value < 0xfd {
                return Err(CompactSizeError::NonMinimal);
            }
            Ok((value as u64, 3))
        }
        0xfe => {
            let raw = bytes.get(1..5).ok_or(CompactSizeError::Truncated)?;
            let value = u32::from_le_bytes(raw.try_into().unwrap());
            if value <= 0xffff {
                return Err(CompactSizeError::NonMinimal);
            }
            Ok((value as u64, 5))
        }
        0xff => {
            let raw = bytes.get(1..9).ok_or(CompactSizeError::Truncated)?;
            let value = u64::from_le_bytes(raw.try_into().unwrap());
            if value <= 0xffff_ffff {
                return Err(CompactSizeError::NonMinimal);
            }
            Ok((value, 9))
        }
    }
}

/// Width in bytes that the minimal encoding of `value` would occupy.
pub fn width(value: u64) -> usize {
    if value < 0xfd {
        1
    } else if value <= 0xffff {
        3
    } else if value <= 0xffff_ffff {
        5
    } else {
        9
    }
}
