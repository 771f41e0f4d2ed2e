//! Host numeric formats.
//!
//! This module provides encoding and decoding for the three numeric
//! storage formats found in midrange records:
//!
//! - **Packed Decimal**: BCD encoding with a trailing sign nibble
//! - **Zoned Decimal**: one digit per byte, sign in the last zone nibble
//! - **Binary**: big-endian two's complement and unsigned integers

mod binary;
mod packed;
mod zoned;

pub use binary::{decode_binary, encode_binary};
pub use packed::{pack_decimal, packed_len, unpack_decimal};
pub use zoned::{unzone_decimal, zone_decimal};

use rust_decimal::Decimal;

use crate::error::EncodingError;

/// Result type for decimal operations.
pub type Result<T> = std::result::Result<T, EncodingError>;

/// Largest precision representable by [`Decimal`].
pub const MAX_DECIMAL_PRECISION: u8 = 28;

/// Sign representation in packed and zoned formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sign {
    /// Positive value (sign nibble 0xA, 0xC, 0xE or 0xF).
    Positive,
    /// Negative value (sign nibble 0xB or 0xD).
    Negative,
}

impl Sign {
    /// Sign of a decimal value. Zero is always positive.
    pub fn of(value: &Decimal) -> Self {
        if value.is_sign_negative() && !value.is_zero() {
            Sign::Negative
        } else {
            Sign::Positive
        }
    }

    /// Preferred host sign nibble: 0xF positive, 0xD negative.
    pub fn to_nibble(self) -> u8 {
        match self {
            Sign::Positive => 0x0F,
            Sign::Negative => 0x0D,
        }
    }

    /// Parse a sign nibble.
    pub fn from_nibble(nibble: u8) -> Result<Self> {
        match nibble & 0x0F {
            0x0A | 0x0C | 0x0E | 0x0F => Ok(Sign::Positive),
            0x0B | 0x0D => Ok(Sign::Negative),
            other => Err(EncodingError::MalformedDecimal {
                message: format!("invalid sign nibble 0x{:X}", other),
            }),
        }
    }
}

/// Reject precision/scale pairs the decimal type cannot carry.
pub(crate) fn check_shape(precision: u8, scale: u8) -> Result<()> {
    if precision == 0 || precision > MAX_DECIMAL_PRECISION || scale > precision {
        return Err(EncodingError::UnsupportedPrecision { precision, scale });
    }
    Ok(())
}

/// Split a value into exactly `precision` decimal digits, most significant first,
/// with the implied decimal point `scale` digits from the right.
pub(crate) fn scaled_digits(value: &Decimal, precision: u8, scale: u8) -> Result<Vec<u8>> {
    check_shape(precision, scale)?;
    let overflow = || EncodingError::DecimalOverflow {
        value: value.to_string(),
        precision,
        scale,
    };

    let magnitude = value.abs();
    if magnitude.normalize().scale() > u32::from(scale) {
        return Err(overflow());
    }
    let integer_part = magnitude.trunc();
    let integer_digits = if integer_part.is_zero() {
        0
    } else {
        integer_part.normalize().to_string().len()
    };
    if integer_digits > usize::from(precision - scale) {
        return Err(overflow());
    }

    let mut scaled = magnitude;
    scaled.rescale(u32::from(scale));
    let text = scaled.mantissa().unsigned_abs().to_string();
    if text.len() > usize::from(precision) {
        return Err(overflow());
    }
    let padding = usize::from(precision) - text.len();
    let mut digits = vec![0u8; padding];
    digits.extend(text.bytes().map(|b| b - b'0'));
    Ok(digits)
}

/// Rebuild a decimal from digits (most significant first).
pub(crate) fn from_digits(digits: &[u8], scale: u8, sign: Sign) -> Result<Decimal> {
    let mut mantissa: i128 = 0;
    for &digit in digits {
        mantissa = mantissa * 10 + i128::from(digit);
    }
    if sign == Sign::Negative {
        mantissa = -mantissa;
    }
    Decimal::try_from_i128_with_scale(mantissa, u32::from(scale)).map_err(|e| {
        EncodingError::MalformedDecimal {
            message: format!("{} digits do not fit a decimal: {}", digits.len(), e),
        }
    })
}
