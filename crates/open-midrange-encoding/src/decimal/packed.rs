//! Packed decimal encoding and decoding.
//!
//! Packed decimal stores two digits per byte with the rightmost nibble
//! holding the sign. A field of precision `p` occupies `p / 2 + 1` bytes;
//! when `p` is even the leading nibble is a zero pad.
//!
//! Example: +12345 with precision 5
//! - Layout: d1|d2 d3|d4 d5|sign
//! - Binary: 0x12 0x34 0x5F

use rust_decimal::Decimal;

use super::{from_digits, scaled_digits, Result, Sign};
use crate::error::EncodingError;

/// Storage size in bytes of a packed field with `precision` digits.
pub fn packed_len(precision: u8) -> usize {
    usize::from(precision) / 2 + 1
}

/// Encode a decimal value to packed decimal bytes.
///
/// # Errors
/// Returns `DecimalOverflow` if the value needs more integer digits than
/// `precision - scale` or more fractional digits than `scale`.
pub fn pack_decimal(value: &Decimal, precision: u8, scale: u8) -> Result<Vec<u8>> {
    let digits = scaled_digits(value, precision, scale)?;

    // Digits plus sign, with a leading zero nibble to fill the first byte.
    let mut nibbles = Vec::with_capacity(packed_len(precision) * 2);
    if (digits.len() + 1) % 2 == 1 {
        nibbles.push(0);
    }
    nibbles.extend_from_slice(&digits);
    nibbles.push(Sign::of(value).to_nibble());

    Ok(nibbles
        .chunks(2)
        .map(|pair| (pair[0] << 4) | pair[1])
        .collect())
}

/// Decode packed decimal bytes to a decimal value.
///
/// # Errors
/// Returns `MalformedDecimal` if any digit nibble is above 9 or the
/// sign nibble is not one of 0xA-0xF.
pub fn unpack_decimal(bytes: &[u8], scale: u8) -> Result<Decimal> {
    let Some((&last, leading)) = bytes.split_last() else {
        return Err(EncodingError::MalformedDecimal {
            message: "empty packed decimal".to_string(),
        });
    };

    let mut digits = Vec::with_capacity(bytes.len() * 2);
    for &byte in leading {
        let (high, low) = (byte >> 4, byte & 0x0F);
        if high > 9 || low > 9 {
            return Err(EncodingError::MalformedDecimal {
                message: format!("invalid digit nibble in byte 0x{:02X}", byte),
            });
        }
        digits.push(high);
        digits.push(low);
    }
    let high = last >> 4;
    if high > 9 {
        return Err(EncodingError::MalformedDecimal {
            message: format!("invalid digit nibble in byte 0x{:02X}", last),
        });
    }
    digits.push(high);

    let sign = Sign::from_nibble(last & 0x0F)?;
    from_digits(&digits, scale, sign)
}
