//! EBCDIC text conversion.
//!
//! Converts between Rust strings and single-byte EBCDIC code pages.
//!
//! # Supported Code Pages
//!
//! - **CP037** (CCSID 37): US/Canada
//! - **CP500** (CCSID 500): International
//! - **CP1140** (CCSID 1140): CP037 with the Euro sign
//!
//! Use [`CodePageRegistry`] for runtime lookup by CCSID.

mod registry;
mod tables;

pub use registry::CodePageRegistry;
pub use tables::{CodePage, CP037, CP1140, CP500};

use crate::error::EncodingError;

/// CCSID meaning "binary data, no conversion".
pub const CCSID_BINARY: u16 = 65535;

/// Result type for encoding operations.
pub type Result<T> = std::result::Result<T, EncodingError>;

impl CodePage {
    /// Decode EBCDIC bytes to a string.
    ///
    /// Every byte has a mapping, so decoding cannot fail.
    pub fn decode(&self, bytes: &[u8]) -> String {
        bytes.iter().map(|&b| self.ebcdic_to_char(b)).collect()
    }

    /// Encode a string to EBCDIC bytes.
    ///
    /// # Errors
    /// Returns `EncodingError::UnmappableCharacter` if the string contains a
    /// character the code page cannot represent.
    pub fn encode(&self, s: &str) -> Result<Vec<u8>> {
        let mut result = Vec::with_capacity(s.len());
        for ch in s.chars() {
            result.push(self.char_to_ebcdic(ch)?);
        }
        Ok(result)
    }

    /// Number of bytes `s` occupies once encoded.
    ///
    /// Single-byte pages encode one byte per character.
    pub fn encoded_len(&self, s: &str) -> usize {
        s.chars().count()
    }

    /// Convert a single EBCDIC byte to its character.
    pub fn ebcdic_to_char(&self, ebcdic: u8) -> char {
        match self.special_chars.iter().find(|&&(eb, _)| eb == ebcdic) {
            Some(&(_, ch)) => ch,
            None => char::from(self.ebcdic_to_latin1[usize::from(ebcdic)]),
        }
    }

    /// Convert a single character to EBCDIC.
    pub fn char_to_ebcdic(&self, ch: char) -> Result<u8> {
        if let Some(&(eb, _)) = self.special_chars.iter().find(|&&(_, c)| c == ch) {
            return Ok(eb);
        }
        let unmappable = || EncodingError::UnmappableCharacter {
            ch,
            code: ch as u32,
            code_page: self.name,
        };
        let latin1 = u8::try_from(u32::from(ch)).map_err(|_| unmappable())?;
        let eb = self.latin1_to_ebcdic[usize::from(latin1)];
        // The byte was reassigned to a special character on this page.
        if self.special_chars.iter().any(|&(special, _)| special == eb) {
            return Err(unmappable());
        }
        Ok(eb)
    }

    /// The blank used to pad fixed-width text (0x40 on every EBCDIC page).
    pub fn pad_byte(&self) -> u8 {
        self.latin1_to_ebcdic[usize::from(b' ')]
    }
}
