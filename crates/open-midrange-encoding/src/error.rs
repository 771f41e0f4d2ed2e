//! Encoding crate error types.

use miette::Diagnostic;
use thiserror::Error;

/// Errors produced while converting values to or from host representations.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum EncodingError {
    /// No code page is registered for the CCSID.
    #[error("no code page registered for CCSID {ccsid}")]
    #[diagnostic(code(encoding::invalid_code_page))]
    InvalidCodePage {
        /// The requested CCSID.
        ccsid: u16,
    },

    /// A character has no representation in the target code page.
    #[error("character '{ch}' (U+{code:04X}) cannot be encoded in {code_page}")]
    #[diagnostic(code(encoding::unmappable_character))]
    UnmappableCharacter {
        /// The offending character.
        ch: char,
        /// Its Unicode scalar value.
        code: u32,
        /// Name of the target code page.
        code_page: &'static str,
    },

    /// Packed or zoned bytes contain an invalid digit, zone or sign nibble.
    #[error("malformed decimal: {message}")]
    #[diagnostic(code(encoding::malformed_decimal))]
    MalformedDecimal {
        /// What was wrong with the bytes.
        message: String,
    },

    /// A decimal value does not fit the declared precision and scale.
    #[error("decimal {value} does not fit precision {precision} scale {scale}")]
    #[diagnostic(code(encoding::decimal_overflow))]
    DecimalOverflow {
        /// The value as text.
        value: String,
        /// Declared total digits.
        precision: u8,
        /// Declared fractional digits.
        scale: u8,
    },

    /// Precision or scale outside what the decimal type supports.
    #[error("unsupported decimal shape: precision {precision} scale {scale}")]
    #[diagnostic(code(encoding::unsupported_precision))]
    UnsupportedPrecision {
        /// Declared total digits.
        precision: u8,
        /// Declared fractional digits.
        scale: u8,
    },

    /// An integer does not fit the target binary width.
    #[error("integer {value} out of range for {width}-byte {signedness} field")]
    #[diagnostic(code(encoding::integer_out_of_range))]
    IntegerOutOfRange {
        /// The value being encoded.
        value: i128,
        /// Field width in bytes.
        width: usize,
        /// "signed" or "unsigned".
        signedness: &'static str,
    },

    /// Binary width other than 1, 2, 4 or 8 bytes.
    #[error("unsupported binary integer width {width}")]
    #[diagnostic(code(encoding::unsupported_width))]
    UnsupportedWidth {
        /// The requested width.
        width: usize,
    },
}
