//! CCSID lookup.

use std::collections::HashMap;

use super::tables::{CodePage, CP037, CP1140, CP500};
use crate::error::EncodingError;

/// Maps CCSIDs to code pages.
///
/// Registries are plain values handed to whoever converts text, so tests
/// can run against a page set of their own.
#[derive(Debug, Clone, Default)]
pub struct CodePageRegistry {
    pages: HashMap<u16, &'static CodePage>,
}

impl CodePageRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding every shipped code page.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for page in [&CP037, &CP500, &CP1140] {
            registry.register(page);
        }
        registry
    }

    /// Add or replace a code page under its own CCSID.
    pub fn register(&mut self, page: &'static CodePage) {
        self.pages.insert(page.ccsid, page);
    }

    /// Look up a code page by CCSID.
    ///
    /// # Errors
    /// Returns `EncodingError::InvalidCodePage` if the CCSID is not registered.
    pub fn lookup(&self, ccsid: u16) -> Result<&'static CodePage, EncodingError> {
        self.pages
            .get(&ccsid)
            .copied()
            .ok_or(EncodingError::InvalidCodePage { ccsid })
    }

    /// Whether a CCSID is registered.
    pub fn contains(&self, ccsid: u16) -> bool {
        self.pages.contains_key(&ccsid)
    }

    /// Registered CCSIDs in ascending order.
    pub fn ccsids(&self) -> Vec<u16> {
        let mut ccsids: Vec<u16> = self.pages.keys().copied().collect();
        ccsids.sort_unstable();
        ccsids
    }
}
