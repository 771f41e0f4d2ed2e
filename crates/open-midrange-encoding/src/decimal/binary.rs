//! Big-endian binary integer encoding.
//!
//! The host stores integers most significant byte first regardless of
//! the platform this code runs on. Widths are 1, 2, 4 or 8 bytes.

use super::Result;
use crate::error::EncodingError;

fn check_width(width: usize) -> Result<()> {
    match width {
        1 | 2 | 4 | 8 => Ok(()),
        _ => Err(EncodingError::UnsupportedWidth { width }),
    }
}

fn range(width: usize, signed: bool) -> (i128, i128) {
    let bits = (width * 8) as u32;
    if signed {
        (-(1i128 << (bits - 1)), (1i128 << (bits - 1)) - 1)
    } else {
        (0, (1i128 << bits) - 1)
    }
}

/// Encode an integer into `width` big-endian bytes.
///
/// # Errors
/// Returns `IntegerOutOfRange` if the value does not fit the width and
/// signedness, or `UnsupportedWidth` for widths other than 1/2/4/8.
pub fn encode_binary(value: i128, width: usize, signed: bool) -> Result<Vec<u8>> {
    check_width(width)?;
    let (min, max) = range(width, signed);
    if value < min || value > max {
        return Err(EncodingError::IntegerOutOfRange {
            value,
            width,
            signedness: if signed { "signed" } else { "unsigned" },
        });
    }
    let full = value.to_be_bytes();
    Ok(full[full.len() - width..].to_vec())
}

/// Decode big-endian bytes into an integer.
///
/// Signed values are sign-extended, unsigned values zero-extended.
pub fn decode_binary(bytes: &[u8], signed: bool) -> Result<i128> {
    check_width(bytes.len())?;
    let negative = signed && bytes[0] & 0x80 != 0;
    let mut full = if negative { [0xFFu8; 16] } else { [0u8; 16] };
    full[16 - bytes.len()..].copy_from_slice(bytes);
    Ok(i128::from_be_bytes(full))
}
