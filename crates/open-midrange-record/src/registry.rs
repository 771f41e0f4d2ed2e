//! Named record formats.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::descriptor::StructureDescriptor;
use crate::error::{RecordError, RecordResult};

/// Record formats keyed by structure name.
///
/// Built once by the caller and handed to whatever decodes entries, in
/// place of a global table of known formats.
#[derive(Debug, Clone, Default)]
pub struct FormatRegistry {
    formats: HashMap<String, Arc<StructureDescriptor>>,
}

impl FormatRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a format under its structure name, replacing any previous one.
    pub fn register(&mut self, format: StructureDescriptor) -> Arc<StructureDescriptor> {
        let format = Arc::new(format);
        debug!(format = %format.name(), "Record format registered");
        self.formats
            .insert(format.name().to_string(), Arc::clone(&format));
        format
    }

    /// Look up a format by name.
    ///
    /// # Errors
    /// Returns `RecordError::UnknownFormat` if nothing is registered under `name`.
    pub fn get(&self, name: &str) -> RecordResult<Arc<StructureDescriptor>> {
        self.formats
            .get(name)
            .cloned()
            .ok_or_else(|| RecordError::UnknownFormat {
                name: name.to_string(),
            })
    }

    /// Registered format names in ascending order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.formats.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::FieldKind;

    fn format(name: &str) -> StructureDescriptor {
        StructureDescriptor::builder(name)
            .field("code", FieldKind::Int32)
            .build()
            .unwrap()
    }

    #[test]
    fn test_register_and_get() {
        let mut registry = FormatRegistry::new();
        registry.register(format("SPLF0100"));
        registry.register(format("JOBL0100"));
        assert_eq!(registry.names(), vec!["JOBL0100", "SPLF0100"]);
        assert_eq!(registry.get("SPLF0100").unwrap().name(), "SPLF0100");
    }

    #[test]
    fn test_unknown_format() {
        let err = FormatRegistry::new().get("USRL0100").unwrap_err();
        assert_eq!(
            err,
            RecordError::UnknownFormat {
                name: "USRL0100".into()
            }
        );
    }
}
