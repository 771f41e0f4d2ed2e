//! Structure codec.
//!
//! Encodes a [`ValueTree`] into the byte layout a [`StructureDescriptor`]
//! describes and decodes it back. A single dispatcher over [`FieldKind`]
//! handles every kind; nested structures recurse.
//!
//! Encoding writes fields in descriptor order. Length, count and
//! record-length fields are written as placeholders and patched once the
//! data they describe has been written, so callers never compute them.
//! [`StructureCodec::byte_length`] runs the same writer against a byte
//! counter, which keeps it in exact agreement with
//! [`StructureCodec::encode`].

use std::collections::HashMap;
use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use open_midrange_encoding::{
    decode_binary, encode_binary, pack_decimal, packed_len, unpack_decimal, unzone_decimal,
    zone_decimal, CodePage, CodePageRegistry, CCSID_BINARY,
};
use rust_decimal::Decimal;

use crate::descriptor::{round_up, FieldDescriptor, FieldKind, Repeat, StructureDescriptor, TextEncoding};
use crate::error::{RecordError, RecordResult};
use crate::value::{Value, ValueTree};

/// Destination for encoded bytes.
trait Sink {
    fn position(&self) -> usize;
    fn put(&mut self, bytes: &[u8]);
    fn fill(&mut self, byte: u8, count: usize);
    fn patch(&mut self, at: usize, bytes: &[u8]);
}

impl Sink for BytesMut {
    fn position(&self) -> usize {
        self.len()
    }

    fn put(&mut self, bytes: &[u8]) {
        self.extend_from_slice(bytes);
    }

    fn fill(&mut self, byte: u8, count: usize) {
        self.put_bytes(byte, count);
    }

    fn patch(&mut self, at: usize, bytes: &[u8]) {
        self[at..at + bytes.len()].copy_from_slice(bytes);
    }
}

/// Counts bytes without storing them.
#[derive(Default)]
struct ByteCounter(usize);

impl Sink for ByteCounter {
    fn position(&self) -> usize {
        self.0
    }

    fn put(&mut self, bytes: &[u8]) {
        self.0 += bytes.len();
    }

    fn fill(&mut self, _byte: u8, count: usize) {
        self.0 += count;
    }

    fn patch(&mut self, _at: usize, _bytes: &[u8]) {}
}

/// Where an integer field was written, for later patching.
#[derive(Clone, Copy)]
struct IntegerSlot {
    at: usize,
    width: usize,
    signed: bool,
}

/// Encodes and decodes records described by [`StructureDescriptor`]s.
///
/// The codec holds only an immutable code page registry, so one instance
/// can be shared across threads and used on independent buffers at once.
#[derive(Debug, Clone)]
pub struct StructureCodec {
    code_pages: Arc<CodePageRegistry>,
}

impl Default for StructureCodec {
    fn default() -> Self {
        Self::new(Arc::new(CodePageRegistry::with_defaults()))
    }
}

impl StructureCodec {
    /// Create a codec resolving text CCSIDs through `code_pages`.
    pub fn new(code_pages: Arc<CodePageRegistry>) -> Self {
        Self { code_pages }
    }

    /// The code page registry in use.
    pub fn code_pages(&self) -> &CodePageRegistry {
        &self.code_pages
    }

    /// Encode `value` into a new buffer.
    ///
    /// # Errors
    /// `MissingField`, `TypeMismatch`, `FieldTooLong`, `ValueOutOfRange`,
    /// `CountMismatch` or `TextConversion`, each naming the field.
    pub fn encode(&self, descriptor: &StructureDescriptor, value: &ValueTree) -> RecordResult<Bytes> {
        let mut buf = BytesMut::new();
        self.encode_into(descriptor, value, &mut buf)?;
        Ok(buf.freeze())
    }

    /// Append the encoding of `value` to `buf`, returning the bytes written.
    pub fn encode_into(
        &self,
        descriptor: &StructureDescriptor,
        value: &ValueTree,
        buf: &mut BytesMut,
    ) -> RecordResult<usize> {
        let start = buf.len();
        self.write_structure(descriptor, value, buf)?;
        Ok(buf.len() - start)
    }

    /// Number of bytes [`encode`](Self::encode) produces for `value`,
    /// including alignment padding.
    pub fn byte_length(&self, descriptor: &StructureDescriptor, value: &ValueTree) -> RecordResult<usize> {
        let mut counter = ByteCounter::default();
        self.write_structure(descriptor, value, &mut counter)?;
        Ok(counter.0)
    }

    /// Decode one record starting at `offset`.
    ///
    /// Returns the decoded tree and the number of bytes the record
    /// occupies (including alignment padding or a declared record length).
    ///
    /// # Errors
    /// `TruncatedRecord` if `bytes` ends before the record does (checked
    /// against the descriptor's minimum length before any field is read),
    /// `MalformedDecimal`, `InvalidLength`, `RecordLengthMismatch` or
    /// `TextConversion`.
    pub fn decode(
        &self,
        descriptor: &StructureDescriptor,
        bytes: &[u8],
        offset: usize,
    ) -> RecordResult<(ValueTree, usize)> {
        let available = bytes.len().saturating_sub(offset);
        if available < descriptor.min_length() || offset > bytes.len() {
            return Err(RecordError::TruncatedRecord {
                field: descriptor.name().to_string(),
                offset,
                needed: descriptor.min_length(),
                available,
            });
        }
        self.read_structure(descriptor, bytes, offset)
    }

    /// Resolve a text encoding to a code page; `None` means binary.
    fn code_page(&self, field: &str, encoding: TextEncoding) -> RecordResult<Option<&'static CodePage>> {
        match encoding {
            TextEncoding::Binary | TextEncoding::Ccsid(CCSID_BINARY) => Ok(None),
            TextEncoding::Ccsid(ccsid) => self
                .code_pages
                .lookup(ccsid)
                .map(Some)
                .map_err(|e| RecordError::from_encoding(field, 0, e)),
        }
    }

    // ===========================================================================
    // Encoding
    // ===========================================================================

    fn write_structure<S: Sink>(
        &self,
        descriptor: &StructureDescriptor,
        tree: &ValueTree,
        sink: &mut S,
    ) -> RecordResult<()> {
        let start = sink.position();
        let mut slots: HashMap<&str, IntegerSlot> = HashMap::new();

        for field in descriptor.fields() {
            self.write_field(descriptor, field, tree, sink, &mut slots)?;
        }

        let unpadded = sink.position() - start;
        let total = round_up(unpadded, descriptor.alignment());
        sink.fill(0x00, total - unpadded);

        if let Some(length_field) = descriptor.length_field() {
            let total = i128::try_from(total).unwrap_or(i128::MAX);
            patch_integer(sink, &slots, length_field, total)?;
        }
        Ok(())
    }

    fn write_field<'d, S: Sink>(
        &self,
        descriptor: &'d StructureDescriptor,
        field: &'d FieldDescriptor,
        tree: &ValueTree,
        sink: &mut S,
        slots: &mut HashMap<&'d str, IntegerSlot>,
    ) -> RecordResult<()> {
        let name = field.name.as_str();

        if let Some((width, signed)) = field.kind.integer_layout() {
            // Derived fields get a placeholder that is patched later.
            let value = if descriptor.is_derived(name) {
                0
            } else {
                match required(descriptor, tree, name)? {
                    Value::Integer(v) => i128::from(*v),
                    other => return Err(mismatch(name, "integer", other)),
                }
            };
            let bytes = encode_binary(value, width, signed)
                .map_err(|e| RecordError::from_encoding(name, sink.position(), e))?;
            slots.insert(
                name,
                IntegerSlot {
                    at: sink.position(),
                    width,
                    signed,
                },
            );
            sink.put(&bytes);
            return Ok(());
        }

        match &field.kind {
            FieldKind::FixedText { width, encoding } => {
                let (bytes, pad) = match (self.code_page(name, *encoding)?, required(descriptor, tree, name)?) {
                    (Some(page), Value::Text(text)) => (
                        page.encode(text)
                            .map_err(|e| RecordError::from_encoding(name, sink.position(), e))?,
                        page.pad_byte(),
                    ),
                    (None, Value::Bytes(raw)) => (raw.clone(), 0x00),
                    (Some(_), other) => return Err(mismatch(name, "text", other)),
                    (None, other) => return Err(mismatch(name, "bytes", other)),
                };
                if bytes.len() > *width {
                    return Err(RecordError::FieldTooLong {
                        field: name.to_string(),
                        length: bytes.len(),
                        max: *width,
                    });
                }
                sink.put(&bytes);
                sink.fill(pad, width - bytes.len());
            }
            FieldKind::VariableText {
                length_field,
                encoding,
                null_length,
                max_length,
            } => {
                let bytes = match (self.code_page(name, *encoding)?, required(descriptor, tree, name)?) {
                    (_, Value::Null) => None,
                    (Some(page), Value::Text(text)) => Some(
                        page.encode(text)
                            .map_err(|e| RecordError::from_encoding(name, sink.position(), e))?,
                    ),
                    (None, Value::Bytes(raw)) => Some(raw.clone()),
                    (Some(_), other) => return Err(mismatch(name, "text or null", other)),
                    (None, other) => return Err(mismatch(name, "bytes or null", other)),
                };
                write_variable(sink, slots, name, length_field, *null_length, *max_length, bytes)?;
            }
            FieldKind::ByteArray {
                length_field,
                null_length,
                max_length,
            } => {
                let bytes = match required(descriptor, tree, name)? {
                    Value::Null => None,
                    Value::Bytes(raw) => Some(raw.clone()),
                    other => return Err(mismatch(name, "bytes or null", other)),
                };
                write_variable(sink, slots, name, length_field, *null_length, *max_length, bytes)?;
            }
            FieldKind::PackedDecimal { precision, scale } => {
                let value = decimal_value(name, required(descriptor, tree, name)?)?;
                let bytes = pack_decimal(&value, *precision, *scale)
                    .map_err(|e| RecordError::from_encoding(name, sink.position(), e))?;
                sink.put(&bytes);
            }
            FieldKind::ZonedDecimal { precision, scale } => {
                let value = decimal_value(name, required(descriptor, tree, name)?)?;
                let bytes = zone_decimal(&value, *precision, *scale)
                    .map_err(|e| RecordError::from_encoding(name, sink.position(), e))?;
                sink.put(&bytes);
            }
            FieldKind::Nested { structure, repeat } => {
                let value = required(descriptor, tree, name)?;
                match (repeat, value) {
                    (Repeat::Once, Value::Record(inner)) => {
                        self.write_structure(structure, inner, sink)?;
                    }
                    (Repeat::Once, other) => return Err(mismatch(name, "record", other)),
                    (Repeat::Fixed(count), Value::Array(items)) => {
                        if items.len() != *count {
                            return Err(RecordError::CountMismatch {
                                field: name.to_string(),
                                expected: *count,
                                found: items.len(),
                            });
                        }
                        for item in items {
                            self.write_structure(structure, item, sink)?;
                        }
                    }
                    (Repeat::CountField(count_field), Value::Array(items)) => {
                        let count = i128::try_from(items.len()).unwrap_or(i128::MAX);
                        patch_integer(sink, slots, count_field, count)?;
                        for item in items {
                            self.write_structure(structure, item, sink)?;
                        }
                    }
                    (_, other) => return Err(mismatch(name, "array", other)),
                }
            }
            // Integer kinds were handled above.
            _ => {}
        }
        Ok(())
    }

    // ===========================================================================
    // Decoding
    // ===========================================================================

    fn read_structure(
        &self,
        descriptor: &StructureDescriptor,
        bytes: &[u8],
        offset: usize,
    ) -> RecordResult<(ValueTree, usize)> {
        let mut cursor = offset;
        let mut integers: HashMap<&str, i64> = HashMap::new();
        let mut tree = ValueTree::new();

        for field in descriptor.fields() {
            let name = field.name.as_str();
            let value = if let Some((width, signed)) = field.kind.integer_layout() {
                let raw = take(bytes, &mut cursor, width, name)?;
                let value = decode_binary(raw, signed)
                    .map_err(|e| RecordError::from_encoding(name, cursor - width, e))?;
                // No integer kind is wider than i64.
                let value = value as i64;
                integers.insert(name, value);
                Value::Integer(value)
            } else {
                self.read_field(descriptor, field, bytes, &mut cursor, &integers)?
            };
            tree.insert(name, value);
        }

        let unpadded = cursor - offset;
        let consumed = match descriptor.length_field() {
            Some(length_field) => {
                let declared = integers.get(length_field).copied().unwrap_or_default();
                match usize::try_from(declared) {
                    Ok(len) if len >= unpadded => len,
                    _ => {
                        return Err(RecordError::RecordLengthMismatch {
                            structure: descriptor.name().to_string(),
                            declared,
                            consumed: unpadded,
                        })
                    }
                }
            }
            None => round_up(unpadded, descriptor.alignment()),
        };

        if offset + consumed > bytes.len() {
            return Err(RecordError::TruncatedRecord {
                field: descriptor.name().to_string(),
                offset: cursor,
                needed: consumed - unpadded,
                available: bytes.len() - cursor,
            });
        }
        Ok((tree, consumed))
    }

    fn read_field(
        &self,
        descriptor: &StructureDescriptor,
        field: &FieldDescriptor,
        bytes: &[u8],
        cursor: &mut usize,
        integers: &HashMap<&str, i64>,
    ) -> RecordResult<Value> {
        let name = field.name.as_str();
        let at = *cursor;

        let value = match &field.kind {
            FieldKind::FixedText { width, encoding } => {
                let raw = take(bytes, cursor, *width, name)?;
                match self.code_page(name, *encoding)? {
                    Some(page) => {
                        let pad = page.pad_byte();
                        let end = raw.iter().rposition(|&b| b != pad).map_or(0, |i| i + 1);
                        Value::Text(page.decode(&raw[..end]))
                    }
                    None => Value::Bytes(raw.to_vec()),
                }
            }
            FieldKind::VariableText {
                length_field,
                encoding,
                null_length,
                ..
            } => match variable_length(descriptor, name, length_field, *null_length, at, integers)? {
                None => Value::Null,
                Some(len) => {
                    let raw = take(bytes, cursor, len, name)?;
                    match self.code_page(name, *encoding)? {
                        Some(page) => Value::Text(page.decode(raw)),
                        None => Value::Bytes(raw.to_vec()),
                    }
                }
            },
            FieldKind::ByteArray {
                length_field,
                null_length,
                ..
            } => match variable_length(descriptor, name, length_field, *null_length, at, integers)? {
                None => Value::Null,
                Some(len) => Value::Bytes(take(bytes, cursor, len, name)?.to_vec()),
            },
            FieldKind::PackedDecimal { precision, scale } => {
                let raw = take(bytes, cursor, packed_len(*precision), name)?;
                Value::Decimal(
                    unpack_decimal(raw, *scale).map_err(|e| RecordError::from_encoding(name, at, e))?,
                )
            }
            FieldKind::ZonedDecimal { precision, scale } => {
                let raw = take(bytes, cursor, usize::from(*precision), name)?;
                Value::Decimal(
                    unzone_decimal(raw, *scale).map_err(|e| RecordError::from_encoding(name, at, e))?,
                )
            }
            FieldKind::Nested { structure, repeat } => {
                let count = match repeat {
                    Repeat::Once => {
                        let (inner, used) = self.read_structure(structure, bytes, *cursor)?;
                        *cursor += used;
                        return Ok(Value::Record(inner));
                    }
                    Repeat::Fixed(count) => *count,
                    Repeat::CountField(count_field) => {
                        let count = lookup_integer(descriptor, count_field, integers)?;
                        usize::try_from(count).map_err(|_| RecordError::InvalidLength {
                            field: name.to_string(),
                            offset: at,
                            length: count,
                        })?
                    }
                };
                // Elements may differ in length; each advances by what it consumed.
                let mut items = Vec::new();
                for _ in 0..count {
                    let (inner, used) = self.read_structure(structure, bytes, *cursor)?;
                    *cursor += used;
                    items.push(inner);
                }
                Value::Array(items)
            }
            _ => Value::Null,
        };
        Ok(value)
    }
}

/// Fetch a field that encoding needs.
fn required<'t>(descriptor: &StructureDescriptor, tree: &'t ValueTree, name: &str) -> RecordResult<&'t Value> {
    tree.get(name).ok_or_else(|| RecordError::MissingField {
        structure: descriptor.name().to_string(),
        field: name.to_string(),
    })
}

fn mismatch(field: &str, expected: &'static str, found: &Value) -> RecordError {
    RecordError::TypeMismatch {
        field: field.to_string(),
        expected,
        found: found.kind_name(),
    }
}

fn decimal_value(field: &str, value: &Value) -> RecordResult<Decimal> {
    match value {
        Value::Decimal(d) => Ok(*d),
        Value::Integer(i) => Ok(Decimal::from(*i)),
        other => Err(mismatch(field, "decimal", other)),
    }
}

/// Overwrite a previously written integer field.
fn patch_integer<S: Sink>(
    sink: &mut S,
    slots: &HashMap<&str, IntegerSlot>,
    name: &str,
    value: i128,
) -> RecordResult<()> {
    // Descriptor validation guarantees the slot exists.
    let Some(slot) = slots.get(name) else {
        return Ok(());
    };
    let bytes = encode_binary(value, slot.width, slot.signed)
        .map_err(|e| RecordError::from_encoding(name, slot.at, e))?;
    sink.patch(slot.at, &bytes);
    Ok(())
}

/// Write a variable-length payload and record its length (or the null
/// sentinel) in the length field.
fn write_variable<S: Sink>(
    sink: &mut S,
    slots: &HashMap<&str, IntegerSlot>,
    name: &str,
    length_field: &str,
    null_length: i64,
    max_length: Option<usize>,
    bytes: Option<Vec<u8>>,
) -> RecordResult<()> {
    match bytes {
        None => patch_integer(sink, slots, length_field, i128::from(null_length)),
        Some(bytes) => {
            if let Some(max) = max_length.filter(|max| bytes.len() > *max) {
                return Err(RecordError::FieldTooLong {
                    field: name.to_string(),
                    length: bytes.len(),
                    max,
                });
            }
            let length = i128::try_from(bytes.len()).unwrap_or(i128::MAX);
            patch_integer(sink, slots, length_field, length)?;
            sink.put(&bytes);
            Ok(())
        }
    }
}

/// Borrow `len` bytes at the cursor and advance it.
fn take<'b>(bytes: &'b [u8], cursor: &mut usize, len: usize, field: &str) -> RecordResult<&'b [u8]> {
    let start = *cursor;
    let available = bytes.len().saturating_sub(start);
    if len > available {
        return Err(RecordError::TruncatedRecord {
            field: field.to_string(),
            offset: start,
            needed: len,
            available,
        });
    }
    *cursor += len;
    Ok(&bytes[start..start + len])
}

fn lookup_integer(
    descriptor: &StructureDescriptor,
    name: &str,
    integers: &HashMap<&str, i64>,
) -> RecordResult<i64> {
    integers
        .get(name)
        .copied()
        .ok_or_else(|| RecordError::InvalidDescriptor {
            structure: descriptor.name().to_string(),
            message: format!("length field '{}' has not been decoded", name),
        })
}

/// Length of a variable field, or `None` when it holds the null sentinel.
fn variable_length(
    descriptor: &StructureDescriptor,
    field: &str,
    length_field: &str,
    null_length: i64,
    offset: usize,
    integers: &HashMap<&str, i64>,
) -> RecordResult<Option<usize>> {
    let length = lookup_integer(descriptor, length_field, integers)?;
    if length == null_length {
        return Ok(None);
    }
    usize::try_from(length)
        .map(Some)
        .map_err(|_| RecordError::InvalidLength {
            field: field.to_string(),
            offset,
            length,
        })
}
