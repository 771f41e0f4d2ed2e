//! Record codec error types.

use miette::Diagnostic;
use open_midrange_encoding::EncodingError;
use thiserror::Error;

/// Errors produced while describing, encoding or decoding records.
///
/// Every codec error names the field and, where a byte position is
/// involved, the offset within the buffer being read or written.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum RecordError {
    /// The buffer ends before the record does.
    #[error("truncated record at '{field}': need {needed} bytes at offset {offset}, {available} available")]
    #[diagnostic(code(record::truncated_record))]
    TruncatedRecord {
        /// Field (or structure) being read.
        field: String,
        /// Offset of the read.
        offset: usize,
        /// Bytes required.
        needed: usize,
        /// Bytes remaining.
        available: usize,
    },

    /// A value is longer than its field allows.
    #[error("value for '{field}' is {length} bytes, field allows {max}")]
    #[diagnostic(code(record::field_too_long))]
    FieldTooLong {
        /// Field name.
        field: String,
        /// Encoded length of the value.
        length: usize,
        /// Maximum the field allows.
        max: usize,
    },

    /// Packed or zoned bytes are not a valid decimal.
    #[error("malformed decimal in '{field}' at offset {offset}: {source}")]
    #[diagnostic(code(record::malformed_decimal))]
    MalformedDecimal {
        /// Field name.
        field: String,
        /// Offset of the field.
        offset: usize,
        /// Underlying decode failure.
        source: EncodingError,
    },

    /// A length or count field holds a value that cannot be used.
    #[error("invalid length {length} for '{field}' at offset {offset}")]
    #[diagnostic(code(record::invalid_length))]
    InvalidLength {
        /// Field whose length is invalid.
        field: String,
        /// Offset of the field.
        offset: usize,
        /// The length read.
        length: i64,
    },

    /// A fixed-count array was given the wrong number of elements.
    #[error("'{field}' expects {expected} elements, got {found}")]
    #[diagnostic(code(record::count_mismatch))]
    CountMismatch {
        /// Field name.
        field: String,
        /// Declared element count.
        expected: usize,
        /// Supplied element count.
        found: usize,
    },

    /// A field required for encoding is absent from the value tree.
    #[error("structure '{structure}' is missing field '{field}'")]
    #[diagnostic(code(record::missing_field))]
    MissingField {
        /// Structure name.
        structure: String,
        /// Field name.
        field: String,
    },

    /// A value has the wrong shape for its field.
    #[error("field '{field}' expects {expected}, found {found}")]
    #[diagnostic(code(record::type_mismatch))]
    TypeMismatch {
        /// Field name.
        field: String,
        /// Expected value kind.
        expected: &'static str,
        /// Supplied value kind.
        found: &'static str,
    },

    /// A numeric value does not fit its field.
    #[error("value for '{field}' out of range: {source}")]
    #[diagnostic(code(record::value_out_of_range))]
    ValueOutOfRange {
        /// Field name.
        field: String,
        /// Underlying range failure.
        source: EncodingError,
    },

    /// Text conversion failed (unknown CCSID or unmappable character).
    #[error("text conversion failed for '{field}': {source}")]
    #[diagnostic(code(record::text_conversion))]
    TextConversion {
        /// Field name.
        field: String,
        /// Underlying conversion failure.
        source: EncodingError,
    },

    /// A self-describing record declares a length shorter than its content.
    #[error("record '{structure}' declares length {declared} but its fields occupy {consumed} bytes")]
    #[diagnostic(code(record::record_length_mismatch))]
    RecordLengthMismatch {
        /// Structure name.
        structure: String,
        /// Length carried in the record.
        declared: i64,
        /// Bytes actually decoded.
        consumed: usize,
    },

    /// A structure descriptor is internally inconsistent.
    #[error("invalid descriptor '{structure}': {message}")]
    #[diagnostic(code(record::invalid_descriptor))]
    InvalidDescriptor {
        /// Structure name.
        structure: String,
        /// What is wrong.
        message: String,
    },

    /// No format is registered under the name.
    #[error("unknown record format '{name}'")]
    #[diagnostic(code(record::unknown_format))]
    UnknownFormat {
        /// Requested format name.
        name: String,
    },
}

impl RecordError {
    /// Attach field context to an encoding-layer failure.
    pub(crate) fn from_encoding(field: &str, offset: usize, source: EncodingError) -> Self {
        let field = field.to_string();
        match source {
            EncodingError::MalformedDecimal { .. } => RecordError::MalformedDecimal {
                field,
                offset,
                source,
            },
            EncodingError::IntegerOutOfRange { .. }
            | EncodingError::DecimalOverflow { .. }
            | EncodingError::UnsupportedPrecision { .. }
            | EncodingError::UnsupportedWidth { .. } => {
                RecordError::ValueOutOfRange { field, source }
            }
            EncodingError::InvalidCodePage { .. } | EncodingError::UnmappableCharacter { .. } => {
                RecordError::TextConversion { field, source }
            }
        }
    }
}

/// Result type for record operations.
pub type RecordResult<T> = Result<T, RecordError>;
