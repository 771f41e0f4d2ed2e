//! Wire formats of the open-list programs.
//!
//! Every list call returns two buffers: a receiver holding entries, and an
//! 80-byte list information block describing the snapshot. The request
//! formats and the information block are ordinary record descriptors, so
//! a simulated host can decode requests with the same definitions.

use std::fmt;

use bytes::Bytes;
use open_midrange_record::{
    FieldKind, RecordResult, StructureCodec, StructureDescriptor, TextEncoding, ValueTree,
};

use crate::error::{ListError, ListResult};

/// Length of the list information block.
pub const LIST_INFORMATION_LEN: usize = 80;

/// Build mode asking the host to finish the list before returning.
pub const BUILD_SYNCHRONOUS: i32 = 0;

const CP037: TextEncoding = TextEncoding::Ccsid(37);

/// Opaque 4-byte token naming a list snapshot on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListHandle([u8; 4]);

impl ListHandle {
    /// Wrap raw handle bytes.
    pub fn new(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Raw handle bytes.
    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    /// Handle field of a decoded list information record.
    pub fn from_record(tree: &ValueTree) -> ListResult<Self> {
        let raw = tree
            .get_bytes("handle")
            .ok_or_else(|| ListError::inconsistent("list information has no handle"))?;
        Self::from_slice(raw)
    }

    fn from_slice(raw: &[u8]) -> ListResult<Self> {
        let bytes: [u8; 4] = raw
            .try_into()
            .map_err(|_| ListError::inconsistent(format!("list handle is {} bytes", raw.len())))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for ListHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0 {
            write!(f, "{b:02X}")?;
        }
        Ok(())
    }
}

/// Whether the host gathered everything it was asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoComplete {
    /// All requested information was returned.
    Complete,
    /// Some information could not be gathered.
    Incomplete,
    /// Only part of the information was returned.
    Partial,
}

impl InfoComplete {
    fn code(self) -> &'static str {
        match self {
            InfoComplete::Complete => "C",
            InfoComplete::Incomplete => "I",
            InfoComplete::Partial => "P",
        }
    }

    /// Informational only: blank or unknown indicators read as incomplete.
    fn from_code(code: &str) -> Self {
        match code {
            "C" => InfoComplete::Complete,
            "P" => InfoComplete::Partial,
            _ => InfoComplete::Incomplete,
        }
    }
}

/// Build state of the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStatus {
    /// Still being built ('0' pending, '1' in progress).
    Building,
    /// Fully built; the total is final.
    Complete,
    /// The host failed to build the list.
    Error,
}

impl BuildStatus {
    fn code(self) -> &'static str {
        match self {
            BuildStatus::Building => "1",
            BuildStatus::Complete => "2",
            BuildStatus::Error => "3",
        }
    }

    fn from_code(code: &str) -> ListResult<Self> {
        match code {
            "0" | "1" => Ok(BuildStatus::Building),
            "2" => Ok(BuildStatus::Complete),
            "3" => Ok(BuildStatus::Error),
            other => Err(ListError::inconsistent(format!("unknown list status {other:?}"))),
        }
    }
}

/// Decoded list information block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListStatus {
    /// Entries in the snapshot.
    pub total_records: usize,
    /// Entries in this call's receiver.
    pub records_returned: usize,
    /// Snapshot handle.
    pub handle: ListHandle,
    /// Bytes per entry; zero when entries are self-describing.
    pub record_length: usize,
    /// Completeness indicator.
    pub info_complete: InfoComplete,
    /// Creation timestamp as the host formats it (CYYMMDDHHMMSS).
    pub created: String,
    /// Build state.
    pub build_status: BuildStatus,
    /// Bytes of entry data the host wrote.
    pub info_length: usize,
    /// 1-based index of the first entry in the receiver; 0 when empty.
    pub first_record: usize,
}

impl ListStatus {
    /// Read the block from a decoded list information record.
    pub fn from_record(tree: &ValueTree) -> ListResult<Self> {
        Ok(Self {
            total_records: count(tree, "totalRecords")?,
            records_returned: count(tree, "recordsReturned")?,
            handle: ListHandle::from_record(tree)?,
            record_length: count(tree, "recordLength")?,
            info_complete: InfoComplete::from_code(tree.get_text("infoComplete").unwrap_or_default()),
            created: tree.get_text("created").unwrap_or_default().to_string(),
            build_status: BuildStatus::from_code(tree.get_text("listStatus").unwrap_or_default())?,
            info_length: count(tree, "infoLength")?,
            first_record: count(tree, "firstRecord")?,
        })
    }

    /// Render the block as a record, the inverse of [`from_record`](Self::from_record).
    pub fn to_record(&self) -> ValueTree {
        ValueTree::new()
            .with("totalRecords", as_i64(self.total_records))
            .with("recordsReturned", as_i64(self.records_returned))
            .with("handle", self.handle.as_bytes().to_vec())
            .with("recordLength", as_i64(self.record_length))
            .with("infoComplete", self.info_complete.code())
            .with("created", self.created.as_str())
            .with("listStatus", self.build_status.code())
            .with("reserved1", Vec::<u8>::new())
            .with("infoLength", as_i64(self.info_length))
            .with("firstRecord", as_i64(self.first_record))
            .with("reserved2", Vec::<u8>::new())
    }
}

fn count(tree: &ValueTree, field: &str) -> ListResult<usize> {
    let raw = tree
        .get_i64(field)
        .ok_or_else(|| ListError::inconsistent(format!("list information has no {field}")))?;
    usize::try_from(raw).map_err(|_| ListError::inconsistent(format!("{field} is negative ({raw})")))
}

fn as_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

/// Program that builds a list plus its encoded selection criteria.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Open-list program to call.
    pub program: String,
    /// Program-specific selection bytes.
    pub criteria: Bytes,
}

impl Selection {
    /// Selection from pre-encoded criteria.
    pub fn new(program: impl Into<String>, criteria: impl Into<Bytes>) -> Self {
        Self {
            program: program.into(),
            criteria: criteria.into(),
        }
    }

    /// Selection whose criteria are a record in the program's own format.
    pub fn from_record(
        program: impl Into<String>,
        codec: &StructureCodec,
        format: &StructureDescriptor,
        criteria: &ValueTree,
    ) -> ListResult<Self> {
        Ok(Self::new(program, codec.encode(format, criteria)?))
    }
}

/// Descriptors for every list request and the information block.
#[derive(Debug, Clone)]
pub struct ProtocolFormats {
    /// Open request.
    pub open: StructureDescriptor,
    /// Get-entries request.
    pub get_entries: StructureDescriptor,
    /// Close request.
    pub close: StructureDescriptor,
    /// List information block.
    pub list_information: StructureDescriptor,
}

impl ProtocolFormats {
    /// Build all four descriptors.
    pub fn new() -> RecordResult<Self> {
        let open = StructureDescriptor::builder("OPEN_LIST")
            .field("receiverLength", FieldKind::Int32)
            .field("recordsToReturn", FieldKind::Int32)
            .field("buildMode", FieldKind::Int32)
            .field("selectionLength", FieldKind::Int32)
            .field("selection", FieldKind::byte_array("selectionLength", -1))
            .build()?;

        let get_entries = StructureDescriptor::builder("GET_LIST_ENTRIES")
            .field("handle", FieldKind::fixed_bytes(4))
            .field("receiverLength", FieldKind::Int32)
            .field("recordsRequested", FieldKind::Int32)
            .field("startingRecord", FieldKind::Int32)
            .build()?;

        let close = StructureDescriptor::builder("CLOSE_LIST")
            .field("handle", FieldKind::fixed_bytes(4))
            .build()?;

        let list_information = StructureDescriptor::builder("LIST_INFORMATION")
            .field("totalRecords", FieldKind::Int32)
            .field("recordsReturned", FieldKind::Int32)
            .field("handle", FieldKind::fixed_bytes(4))
            .field("recordLength", FieldKind::Int32)
            .field("infoComplete", FieldKind::fixed_text(1, CP037))
            .field("created", FieldKind::fixed_text(13, CP037))
            .field("listStatus", FieldKind::fixed_text(1, CP037))
            .field("reserved1", FieldKind::fixed_bytes(1))
            .field("infoLength", FieldKind::Int32)
            .field("firstRecord", FieldKind::Int32)
            .field("reserved2", FieldKind::fixed_bytes(40))
            .build()?;

        Ok(Self {
            open,
            get_entries,
            close,
            list_information,
        })
    }
}
