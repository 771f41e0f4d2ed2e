//! Zoned decimal encoding and decoding.
//!
//! Zoned decimal stores one digit per byte: zone nibble high, digit low.
//! Every zone is 0xF except the last, which carries the sign:
//!   - 0xF = positive (preferred)
//!   - 0xD = negative
//!
//! Example: -12345 with precision 5
//! - Binary: 0xF1 0xF2 0xF3 0xF4 0xD5

use rust_decimal::Decimal;

use super::{from_digits, scaled_digits, Result, Sign};
use crate::error::EncodingError;

/// Encode a decimal value to zoned decimal bytes (`precision` bytes long).
pub fn zone_decimal(value: &Decimal, precision: u8, scale: u8) -> Result<Vec<u8>> {
    let digits = scaled_digits(value, precision, scale)?;
    let sign_zone = Sign::of(value).to_nibble() << 4;
    let last = digits.len() - 1;

    Ok(digits
        .iter()
        .enumerate()
        .map(|(i, &digit)| {
            let zone = if i == last { sign_zone } else { 0xF0 };
            zone | digit
        })
        .collect())
}

/// Decode zoned decimal bytes to a decimal value.
///
/// # Errors
/// Returns `MalformedDecimal` for a digit nibble above 9, a non-0xF zone
/// before the last byte, or an invalid sign zone.
pub fn unzone_decimal(bytes: &[u8], scale: u8) -> Result<Decimal> {
    if bytes.is_empty() {
        return Err(EncodingError::MalformedDecimal {
            message: "empty zoned decimal".to_string(),
        });
    }

    let last = bytes.len() - 1;
    let mut digits = Vec::with_capacity(bytes.len());
    for (i, &byte) in bytes.iter().enumerate() {
        let (zone, digit) = (byte >> 4, byte & 0x0F);
        if digit > 9 {
            return Err(EncodingError::MalformedDecimal {
                message: format!("invalid digit nibble 0x{:X} in byte 0x{:02X}", digit, byte),
            });
        }
        if i != last && zone != 0x0F {
            return Err(EncodingError::MalformedDecimal {
                message: format!("invalid zone nibble 0x{:X} at position {}", zone, i),
            });
        }
        digits.push(digit);
    }

    let sign = Sign::from_nibble(bytes[last] >> 4)?;
    from_digits(&digits, scale, sign)
}
