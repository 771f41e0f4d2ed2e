//! EBCDIC text and host numeric encodings for OpenMidrange.
//!
//! This crate converts between Rust values and the byte representations
//! used by IBM midrange hosts:
//!
//! - **EBCDIC Conversion**: single-byte code pages looked up by CCSID (37, 500, 1140)
//! - **Packed Decimal**: BCD with a trailing sign nibble
//! - **Zoned Decimal**: one digit per byte, sign in the last zone
//! - **Binary Integer**: big-endian signed and unsigned integers
//!
//! # Example
//!
//! ```rust
//! use open_midrange_encoding::ebcdic::CodePageRegistry;
//! use open_midrange_encoding::decimal::{pack_decimal, unpack_decimal};
//! use rust_decimal::Decimal;
//! use std::str::FromStr;
//!
//! let registry = CodePageRegistry::with_defaults();
//! let cp037 = registry.lookup(37).unwrap();
//! let ebcdic = cp037.encode("HELLO").unwrap();
//! assert_eq!(cp037.decode(&ebcdic), "HELLO");
//!
//! let value = Decimal::from_str("-123.45").unwrap();
//! let packed = pack_decimal(&value, 7, 2).unwrap();
//! assert_eq!(unpack_decimal(&packed, 2).unwrap(), value);
//! ```

pub mod decimal;
pub mod ebcdic;
pub mod error;

pub use decimal::{
    decode_binary, encode_binary, pack_decimal, packed_len, unpack_decimal, unzone_decimal,
    zone_decimal, Sign, MAX_DECIMAL_PRECISION,
};
pub use ebcdic::{CodePage, CodePageRegistry, CCSID_BINARY, CP037, CP1140, CP500};
pub use error::EncodingError;

/// Result type for encoding operations.
pub type Result<T> = std::result::Result<T, EncodingError>;
