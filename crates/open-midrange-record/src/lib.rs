//! Metadata-driven record codec for OpenMidrange.
//!
//! Host APIs exchange fixed-layout binary records whose shape is known
//! only from metadata. This crate describes those shapes and converts
//! between them and in-memory values:
//!
//! - [`FieldKind`] / [`FieldDescriptor`]: one value's width and encoding
//! - [`StructureDescriptor`]: an ordered record shape, possibly nested
//! - [`ValueTree`]: a decoded record
//! - [`StructureCodec`]: encode, decode and size records
//! - [`FormatRegistry`]: named formats passed to whoever needs them
//!
//! # Example
//!
//! ```rust
//! use open_midrange_record::{FieldKind, StructureCodec, StructureDescriptor, TextEncoding, ValueTree};
//!
//! let format = StructureDescriptor::builder("USER")
//!     .field("profile", FieldKind::fixed_text(10, TextEncoding::Ccsid(37)))
//!     .field("textLength", FieldKind::Int32)
//!     .field("text", FieldKind::variable_text("textLength", TextEncoding::Ccsid(37), -1))
//!     .build()
//!     .unwrap();
//!
//! let codec = StructureCodec::default();
//! let user = ValueTree::new().with("profile", "QSECOFR").with("text", "Security officer");
//! let bytes = codec.encode(&format, &user).unwrap();
//! assert_eq!(bytes.len(), codec.byte_length(&format, &user).unwrap());
//!
//! let (decoded, used) = codec.decode(&format, &bytes, 0).unwrap();
//! assert_eq!(used, bytes.len());
//! assert_eq!(decoded.get_text("text"), Some("Security officer"));
//! ```

pub mod codec;
pub mod descriptor;
pub mod error;
pub mod registry;
pub mod value;

pub use codec::StructureCodec;
pub use descriptor::{FieldDescriptor, FieldKind, Repeat, StructureBuilder, StructureDescriptor, TextEncoding};
pub use error::{RecordError, RecordResult};
pub use registry::FormatRegistry;
pub use value::{Value, ValueTree};
