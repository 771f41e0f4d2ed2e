//! Field and structure descriptors.
//!
//! A [`StructureDescriptor`] is an ordered list of named fields. The order
//! is the wire order; offsets are computed while encoding or decoding, so
//! one descriptor describes a record wherever it sits in a buffer.
//!
//! ```text
//! JOBL0100                     offset
//!   jobName      FixedText(10)      0
//!   userName     FixedText(10)     10
//!   jobNumber    FixedText(6)      20
//!   textLength   Int32             26
//!   text         VariableText      30   (textLength bytes)
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use open_midrange_encoding::{packed_len, MAX_DECIMAL_PRECISION};
use serde::{Deserialize, Serialize};

use crate::error::{RecordError, RecordResult};

/// How text bytes are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextEncoding {
    /// Single-byte host code page, resolved through the codec's registry.
    Ccsid(u16),
    /// Raw bytes, no conversion.
    Binary,
}

/// Repetition of a nested structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Repeat {
    /// Exactly one embedded record.
    Once,
    /// A fixed number of records.
    Fixed(usize),
    /// As many records as an earlier integer field says.
    CountField(String),
}

/// The kind of a field together with its layout parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    /// 1-byte signed integer.
    Int8,
    /// 2-byte signed integer.
    Int16,
    /// 4-byte signed integer.
    Int32,
    /// 8-byte signed integer.
    Int64,
    /// 1-byte unsigned integer.
    UInt8,
    /// 2-byte unsigned integer.
    UInt16,
    /// 4-byte unsigned integer.
    UInt32,
    /// Exactly `width` bytes of text, blank padded.
    FixedText {
        /// Width in bytes.
        width: usize,
        /// Text encoding.
        encoding: TextEncoding,
    },
    /// Text whose byte length lives in an earlier integer field.
    VariableText {
        /// Name of the length field.
        length_field: String,
        /// Text encoding.
        encoding: TextEncoding,
        /// Length value that stands for "no value".
        null_length: i64,
        /// Optional upper bound on the encoded length.
        max_length: Option<usize>,
    },
    /// Raw bytes whose length lives in an earlier integer field.
    ByteArray {
        /// Name of the length field.
        length_field: String,
        /// Length value that stands for "no value".
        null_length: i64,
        /// Optional upper bound on the length.
        max_length: Option<usize>,
    },
    /// Packed decimal, `precision / 2 + 1` bytes.
    PackedDecimal {
        /// Total digits.
        precision: u8,
        /// Fractional digits.
        scale: u8,
    },
    /// Zoned decimal, `precision` bytes.
    ZonedDecimal {
        /// Total digits.
        precision: u8,
        /// Fractional digits.
        scale: u8,
    },
    /// An embedded structure or array of structures.
    Nested {
        /// Shape of each element.
        structure: Arc<StructureDescriptor>,
        /// How many elements.
        repeat: Repeat,
    },
}

impl FieldKind {
    /// Fixed-width text.
    pub fn fixed_text(width: usize, encoding: TextEncoding) -> Self {
        FieldKind::FixedText { width, encoding }
    }

    /// Fixed-width binary data (a handle, a reserved area).
    pub fn fixed_bytes(width: usize) -> Self {
        FieldKind::FixedText {
            width,
            encoding: TextEncoding::Binary,
        }
    }

    /// Variable-length text sized by `length_field`.
    pub fn variable_text(
        length_field: impl Into<String>,
        encoding: TextEncoding,
        null_length: i64,
    ) -> Self {
        FieldKind::VariableText {
            length_field: length_field.into(),
            encoding,
            null_length,
            max_length: None,
        }
    }

    /// Variable-length bytes sized by `length_field`.
    pub fn byte_array(length_field: impl Into<String>, null_length: i64) -> Self {
        FieldKind::ByteArray {
            length_field: length_field.into(),
            null_length,
            max_length: None,
        }
    }

    /// Packed decimal.
    pub fn packed(precision: u8, scale: u8) -> Self {
        FieldKind::PackedDecimal { precision, scale }
    }

    /// Zoned decimal.
    pub fn zoned(precision: u8, scale: u8) -> Self {
        FieldKind::ZonedDecimal { precision, scale }
    }

    /// A single embedded structure.
    pub fn nested(structure: Arc<StructureDescriptor>) -> Self {
        FieldKind::Nested {
            structure,
            repeat: Repeat::Once,
        }
    }

    /// An array of embedded structures.
    pub fn array(structure: Arc<StructureDescriptor>, repeat: Repeat) -> Self {
        FieldKind::Nested { structure, repeat }
    }

    /// Bound the length of a variable field. No effect on other kinds.
    pub fn with_max_length(mut self, max: usize) -> Self {
        if let FieldKind::VariableText { max_length, .. } | FieldKind::ByteArray { max_length, .. } =
            &mut self
        {
            *max_length = Some(max);
        }
        self
    }

    /// Width and signedness of integer kinds.
    pub fn integer_layout(&self) -> Option<(usize, bool)> {
        match self {
            FieldKind::Int8 => Some((1, true)),
            FieldKind::Int16 => Some((2, true)),
            FieldKind::Int32 => Some((4, true)),
            FieldKind::Int64 => Some((8, true)),
            FieldKind::UInt8 => Some((1, false)),
            FieldKind::UInt16 => Some((2, false)),
            FieldKind::UInt32 => Some((4, false)),
            _ => None,
        }
    }

    /// Width in bytes, or 0 when the width depends on the value.
    pub fn width(&self) -> usize {
        if let Some((width, _)) = self.integer_layout() {
            return width;
        }
        match self {
            FieldKind::FixedText { width, .. } => *width,
            FieldKind::PackedDecimal { precision, .. } => packed_len(*precision),
            FieldKind::ZonedDecimal { precision, .. } => usize::from(*precision),
            FieldKind::Nested { structure, repeat } => match (structure.fixed_length(), repeat) {
                (Some(len), Repeat::Once) => len,
                (Some(len), Repeat::Fixed(count)) => len * count,
                _ => 0,
            },
            _ => 0,
        }
    }

    /// Smallest number of bytes the field can occupy.
    fn min_width(&self) -> usize {
        match self {
            FieldKind::Nested { structure, repeat } => match repeat {
                Repeat::Once => structure.min_length(),
                Repeat::Fixed(count) => structure.min_length() * count,
                Repeat::CountField(_) => 0,
            },
            other => other.width(),
        }
    }
}

/// One named field of a structure.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    /// Field name, unique within its structure.
    pub name: String,
    /// Kind and layout.
    pub kind: FieldKind,
}

impl FieldDescriptor {
    /// Create a field descriptor.
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// Width in bytes, or 0 when variable.
    pub fn width(&self) -> usize {
        self.kind.width()
    }
}

/// An ordered, immutable record shape.
#[derive(Debug, Clone, PartialEq)]
pub struct StructureDescriptor {
    name: String,
    fields: Vec<FieldDescriptor>,
    alignment: usize,
    length_field: Option<String>,
    derived: HashSet<String>,
    min_length: usize,
}

impl StructureDescriptor {
    /// Start building a structure.
    pub fn builder(name: impl Into<String>) -> StructureBuilder {
        StructureBuilder {
            name: name.into(),
            fields: Vec::new(),
            alignment: 1,
            length_field: None,
        }
    }

    /// Structure name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fields in wire order.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Boundary the encoded length is rounded up to.
    pub fn alignment(&self) -> usize {
        self.alignment
    }

    /// Integer field that carries the record's own total length.
    pub fn length_field(&self) -> Option<&str> {
        self.length_field.as_deref()
    }

    /// Whether a field's value is computed by the encoder
    /// (length, count and record-length fields).
    pub fn is_derived(&self, field: &str) -> bool {
        self.derived.contains(field)
    }

    /// Bytes the record needs with every variable part empty, rounded to
    /// the alignment.
    pub fn min_length(&self) -> usize {
        self.min_length
    }

    /// Total length when no field depends on the value.
    pub fn fixed_length(&self) -> Option<usize> {
        let mut total = 0;
        for field in &self.fields {
            let width = field.width();
            if width == 0 {
                return None;
            }
            total += width;
        }
        Some(round_up(total, self.alignment))
    }
}

/// Round `len` up to a multiple of `alignment`.
pub(crate) fn round_up(len: usize, alignment: usize) -> usize {
    if alignment <= 1 {
        len
    } else {
        len.div_ceil(alignment) * alignment
    }
}

/// Builder for [`StructureDescriptor`]; validation happens in [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct StructureBuilder {
    name: String,
    fields: Vec<FieldDescriptor>,
    alignment: usize,
    length_field: Option<String>,
}

impl StructureBuilder {
    /// Append a field.
    pub fn field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(FieldDescriptor::new(name, kind));
        self
    }

    /// Round the encoded length up to `alignment` bytes (4 for
    /// self-describing sub-records).
    pub fn align_to(mut self, alignment: usize) -> Self {
        self.alignment = alignment;
        self
    }

    /// Name the integer field that carries the record's total length.
    pub fn record_length_field(mut self, name: impl Into<String>) -> Self {
        self.length_field = Some(name.into());
        self
    }

    /// Validate and freeze the structure.
    ///
    /// # Errors
    /// Returns `InvalidDescriptor` for duplicate names, references to
    /// missing or non-integer fields, references to later fields, bad
    /// decimal shapes, zero-width fixed fields, a non power of two
    /// alignment, or a structure that can encode to zero bytes.
    pub fn build(self) -> RecordResult<StructureDescriptor> {
        let invalid = |message: String| RecordError::InvalidDescriptor {
            structure: self.name.clone(),
            message,
        };

        if !self.alignment.is_power_of_two() {
            return Err(invalid(format!(
                "alignment {} is not a power of two",
                self.alignment
            )));
        }

        let mut seen: HashSet<&str> = HashSet::new();
        let mut derived: HashSet<String> = HashSet::new();

        for field in &self.fields {
            if field.name.is_empty() {
                return Err(invalid("field with empty name".to_string()));
            }

            // Length and count fields must already have been declared.
            let reference = match &field.kind {
                FieldKind::VariableText { length_field, .. }
                | FieldKind::ByteArray { length_field, .. } => Some(length_field),
                FieldKind::Nested {
                    repeat: Repeat::CountField(count_field),
                    ..
                } => Some(count_field),
                _ => None,
            };
            if let Some(reference) = reference {
                let target = self
                    .fields
                    .iter()
                    .find(|f| &f.name == reference)
                    .filter(|_| seen.contains(reference.as_str()))
                    .ok_or_else(|| {
                        invalid(format!(
                            "'{}' refers to '{}', which is not an earlier field",
                            field.name, reference
                        ))
                    })?;
                if target.kind.integer_layout().is_none() {
                    return Err(invalid(format!(
                        "'{}' refers to '{}', which is not an integer",
                        field.name, reference
                    )));
                }
                if !derived.insert(reference.clone()) {
                    return Err(invalid(format!(
                        "'{}' is used as a length or count by more than one field",
                        reference
                    )));
                }
            }

            match &field.kind {
                FieldKind::FixedText { width: 0, .. } => {
                    return Err(invalid(format!("'{}' has zero width", field.name)));
                }
                FieldKind::PackedDecimal { precision, scale }
                | FieldKind::ZonedDecimal { precision, scale }
                    if *precision == 0 || *precision > MAX_DECIMAL_PRECISION || scale > precision =>
                {
                    return Err(invalid(format!(
                        "'{}' has unsupported precision {} scale {}",
                        field.name, precision, scale
                    )));
                }
                _ => {}
            }

            if !seen.insert(field.name.as_str()) {
                return Err(invalid(format!("duplicate field '{}'", field.name)));
            }
        }

        if let Some(length_field) = &self.length_field {
            let target = self
                .fields
                .iter()
                .find(|f| &f.name == length_field)
                .ok_or_else(|| {
                    invalid(format!("record length field '{}' not found", length_field))
                })?;
            if target.kind.integer_layout().is_none() {
                return Err(invalid(format!(
                    "record length field '{}' is not an integer",
                    length_field
                )));
            }
            if !derived.insert(length_field.clone()) {
                return Err(invalid(format!(
                    "record length field '{}' is also a length or count",
                    length_field
                )));
            }
        }

        let unaligned: usize = self.fields.iter().map(|f| f.kind.min_width()).sum();
        let min_length = round_up(unaligned, self.alignment);
        // Every record, and so every array element, consumes at least one byte.
        if min_length == 0 {
            return Err(invalid("structure occupies no bytes".to_string()));
        }

        Ok(StructureDescriptor {
            name: self.name,
            fields: self.fields,
            alignment: self.alignment,
            length_field: self.length_field,
            derived,
            min_length,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EBCDIC: TextEncoding = TextEncoding::Ccsid(37);

    fn job_format() -> StructureDescriptor {
        StructureDescriptor::builder("JOBL0100")
            .field("jobName", FieldKind::fixed_text(10, EBCDIC))
            .field("userName", FieldKind::fixed_text(10, EBCDIC))
            .field("jobNumber", FieldKind::fixed_text(6, EBCDIC))
            .field("status", FieldKind::Int32)
            .build()
            .unwrap()
    }

    #[test]
    fn test_fixed_length() {
        let format = job_format();
        assert_eq!(format.fixed_length(), Some(30));
        assert_eq!(format.min_length(), 30);
        assert_eq!(format.fields()[2].width(), 6);
    }

    #[test]
    fn test_alignment_rounds_min_length() {
        let format = StructureDescriptor::builder("ENTRY")
            .field("len", FieldKind::Int32)
            .field("flag", FieldKind::fixed_text(1, EBCDIC))
            .align_to(4)
            .build()
            .unwrap();
        assert_eq!(format.min_length(), 8);
        assert_eq!(format.fixed_length(), Some(8));
    }

    #[test]
    fn test_variable_field_has_zero_width() {
        let format = StructureDescriptor::builder("VAR")
            .field("textLength", FieldKind::Int16)
            .field("text", FieldKind::variable_text("textLength", EBCDIC, -1))
            .build()
            .unwrap();
        assert_eq!(format.fields()[1].width(), 0);
        assert_eq!(format.fixed_length(), None);
        assert_eq!(format.min_length(), 2);
        assert!(format.is_derived("textLength"));
        assert!(!format.is_derived("text"));
    }

    #[test]
    fn test_nested_width() {
        let inner = Arc::new(job_format());
        let kind = FieldKind::array(inner.clone(), Repeat::Fixed(3));
        assert_eq!(kind.width(), 90);
        assert_eq!(FieldKind::nested(inner).width(), 30);
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let err = StructureDescriptor::builder("DUP")
            .field("a", FieldKind::Int8)
            .field("a", FieldKind::Int8)
            .build()
            .unwrap_err();
        assert!(matches!(err, RecordError::InvalidDescriptor { .. }));
    }

    #[test]
    fn test_length_field_must_precede() {
        let err = StructureDescriptor::builder("LATE")
            .field("text", FieldKind::variable_text("len", EBCDIC, 0))
            .field("len", FieldKind::Int32)
            .build()
            .unwrap_err();
        assert!(matches!(err, RecordError::InvalidDescriptor { .. }));
    }

    #[test]
    fn test_length_field_must_be_integer() {
        let err = StructureDescriptor::builder("NOTINT")
            .field("len", FieldKind::fixed_text(4, EBCDIC))
            .field("data", FieldKind::byte_array("len", 0))
            .build()
            .unwrap_err();
        assert!(matches!(err, RecordError::InvalidDescriptor { .. }));
    }

    #[test]
    fn test_shared_length_field_rejected() {
        let err = StructureDescriptor::builder("SHARED")
            .field("len", FieldKind::Int32)
            .field("a", FieldKind::byte_array("len", 0))
            .field("b", FieldKind::byte_array("len", 0))
            .build()
            .unwrap_err();
        assert!(matches!(err, RecordError::InvalidDescriptor { .. }));
    }

    #[test]
    fn test_bad_decimal_rejected() {
        for kind in [FieldKind::packed(0, 0), FieldKind::zoned(29, 0), FieldKind::packed(5, 6)] {
            let err = StructureDescriptor::builder("DEC")
                .field("amount", kind)
                .build()
                .unwrap_err();
            assert!(matches!(err, RecordError::InvalidDescriptor { .. }));
        }
    }

    #[test]
    fn test_empty_structure_rejected() {
        let err = StructureDescriptor::builder("EMPTY").build().unwrap_err();
        assert!(matches!(err, RecordError::InvalidDescriptor { .. }));

        let element = Arc::new(job_format());
        let err = StructureDescriptor::builder("NONE")
            .field("items", FieldKind::array(element, Repeat::Fixed(0)))
            .build()
            .unwrap_err();
        assert!(matches!(err, RecordError::InvalidDescriptor { .. }));
    }

    #[test]
    fn test_bad_alignment_rejected() {
        let err = StructureDescriptor::builder("ALIGN")
            .field("a", FieldKind::Int8)
            .align_to(3)
            .build()
            .unwrap_err();
        assert!(matches!(err, RecordError::InvalidDescriptor { .. }));
    }

    #[test]
    fn test_record_length_field() {
        let format = StructureDescriptor::builder("SELF")
            .field("entryLength", FieldKind::Int32)
            .field("code", FieldKind::Int16)
            .record_length_field("entryLength")
            .align_to(4)
            .build()
            .unwrap();
        assert_eq!(format.length_field(), Some("entryLength"));
        assert!(format.is_derived("entryLength"));

        let err = StructureDescriptor::builder("SELF")
            .field("code", FieldKind::Int16)
            .record_length_field("entryLength")
            .build()
            .unwrap_err();
        assert!(matches!(err, RecordError::InvalidDescriptor { .. }));
    }

    #[test]
    fn test_max_length_only_applies_to_variable_kinds() {
        let kind = FieldKind::byte_array("len", 0).with_max_length(16);
        assert!(matches!(
            kind,
            FieldKind::ByteArray {
                max_length: Some(16),
                ..
            }
        ));
        assert_eq!(FieldKind::Int32.with_max_length(16), FieldKind::Int32);
    }
}
