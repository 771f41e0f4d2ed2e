//! Open-list session: one snapshot from open to close.
//!
//! ```text
//!   Idle --open--> Open --close--> Closed
//!                   |  ^
//!                   +--+ get_entries
//! ```
//!
//! A session is single-use. Once closed it stays closed, and close is
//! idempotent. Calls that fail because the host object is locked are
//! retried a bounded number of times; every other failure is returned at
//! once.

use std::sync::Arc;

use bytes::Bytes;
use open_midrange_record::{StructureCodec, StructureDescriptor, ValueTree};
use tracing::{debug, error, info, warn};

use crate::channel::{CallReply, CallRequest, RemoteCallChannel};
use crate::config::ListConfig;
use crate::error::{ListError, ListResult, Operation};
use crate::protocol::{
    BuildStatus, ListHandle, ListStatus, ProtocolFormats, Selection, BUILD_SYNCHRONOUS,
    LIST_INFORMATION_LEN,
};

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, nothing sent yet.
    Idle,
    /// A snapshot is held on the host.
    Open,
    /// The snapshot was released (or a close was attempted).
    Closed,
}

/// Entries returned by one call, still in wire form.
#[derive(Debug, Clone)]
pub struct RawChunk {
    /// List information returned with the entries.
    pub status: ListStatus,
    /// Receiver buffer.
    pub data: Bytes,
}

impl RawChunk {
    /// Number of entries in the buffer.
    pub fn len(&self) -> usize {
        self.status.records_returned
    }

    /// Whether the buffer holds no entries.
    pub fn is_empty(&self) -> bool {
        self.status.records_returned == 0
    }
}

/// Client side of one open list.
pub struct ListSession<C> {
    channel: C,
    codec: StructureCodec,
    config: ListConfig,
    formats: ProtocolFormats,
    state: SessionState,
    handle: Option<ListHandle>,
    snapshot: Option<ListStatus>,
    entry_format: Option<Arc<StructureDescriptor>>,
    prefetched: Option<RawChunk>,
}

impl<C: RemoteCallChannel> ListSession<C> {
    /// Create an idle session over `channel`.
    pub fn new(channel: C, codec: StructureCodec, config: ListConfig) -> ListResult<Self> {
        config.validate()?;
        Ok(Self {
            channel,
            codec,
            config,
            formats: ProtocolFormats::new()?,
            state: SessionState::Idle,
            handle: None,
            snapshot: None,
            entry_format: None,
            prefetched: None,
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Handle of the snapshot, once opened.
    pub fn handle(&self) -> Option<ListHandle> {
        self.handle
    }

    /// List information returned by open.
    pub fn status(&self) -> Option<&ListStatus> {
        self.snapshot.as_ref()
    }

    /// Entries in the snapshot, once opened.
    pub fn total_records(&self) -> Option<usize> {
        self.snapshot.as_ref().map(|s| s.total_records)
    }

    /// Underlying channel.
    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Session settings.
    pub fn config(&self) -> &ListConfig {
        &self.config
    }

    /// Shape of each list entry, once opened.
    pub fn entry_format(&self) -> Option<&Arc<StructureDescriptor>> {
        self.entry_format.as_ref()
    }

    /// Ask the host to build the list described by `selection`.
    ///
    /// `initial_buffer_size` sizes the open call's receiver; entries the
    /// host returns in it are kept and handed out by
    /// [`take_prefetched`](Self::take_prefetched). The list is built
    /// synchronously, so the returned total is final.
    pub fn open(
        &mut self,
        selection: &Selection,
        entry_format: Arc<StructureDescriptor>,
        initial_buffer_size: usize,
    ) -> ListResult<(ListHandle, ListStatus)> {
        if self.state != SessionState::Idle {
            return Err(ListError::SessionClosed {
                operation: Operation::Open,
            });
        }
        let per_entry = entry_format
            .fixed_length()
            .unwrap_or_else(|| entry_format.min_length())
            .max(1);
        let request = ValueTree::new()
            .with("receiverLength", as_i64(initial_buffer_size))
            .with("recordsToReturn", as_i64(initial_buffer_size / per_entry))
            .with("buildMode", BUILD_SYNCHRONOUS)
            .with("selection", selection.criteria.to_vec());
        let request = self.codec.encode(&self.formats.open, &request)?;

        let reply = self.call_with_retry(
            Operation::Open,
            CallRequest {
                program: selection.program.clone(),
                request,
                output_sizes: vec![initial_buffer_size, LIST_INFORMATION_LEN],
            },
        )?;
        let (data, info) = split_outputs(Operation::Open, reply)?;
        let tree = self.decode_information(&info)?;

        // Once a handle is readable the host holds a snapshot that must be
        // released, even if the rest of the reply is rejected.
        if let Ok(handle) = ListHandle::from_record(&tree) {
            self.state = SessionState::Open;
            self.handle = Some(handle);
            self.entry_format = Some(entry_format);
        }
        let checked = ListStatus::from_record(&tree)
            .and_then(|status| receiver_chunk(status, data))
            .and_then(|chunk| check_open(&chunk).map(|()| chunk));
        let chunk = match checked {
            Ok(chunk) => chunk,
            Err(err) => {
                self.close_after_failure();
                return Err(err);
            }
        };
        let status = chunk.status.clone();

        info!(
            program = %selection.program,
            handle = %status.handle,
            total = status.total_records,
            returned = status.records_returned,
            "Opened list"
        );
        self.snapshot = Some(status.clone());
        if !chunk.is_empty() {
            self.prefetched = Some(chunk);
        }
        Ok((status.handle, status))
    }

    /// Entries returned by the open call, if any and not yet taken.
    pub fn take_prefetched(&mut self) -> Option<RawChunk> {
        self.prefetched.take()
    }

    /// Fetch up to `count` entries starting at the 1-based index `start`.
    ///
    /// The reply is checked against the snapshot: the same total, the
    /// requested first record and no more entries than requested.
    pub fn get_entries(&mut self, count: usize, start: usize) -> ListResult<RawChunk> {
        if self.state != SessionState::Open {
            return Err(ListError::SessionClosed {
                operation: Operation::GetEntries,
            });
        }
        let (handle, snapshot) = match (self.handle, self.snapshot.as_ref()) {
            (Some(handle), Some(snapshot)) => (handle, snapshot.clone()),
            _ => {
                return Err(ListError::SessionClosed {
                    operation: Operation::GetEntries,
                })
            }
        };
        if count == 0 || start == 0 {
            return Err(ListError::InvalidConfiguration {
                message: format!("invalid entry range: {count} entries from record {start}"),
            });
        }

        let per_entry = self.entry_length(&snapshot);
        let receiver_length = per_entry.saturating_mul(count);
        let request = ValueTree::new()
            .with("handle", handle.as_bytes().to_vec())
            .with("receiverLength", as_i64(receiver_length))
            .with("recordsRequested", as_i64(count))
            .with("startingRecord", as_i64(start));
        let request = self.codec.encode(&self.formats.get_entries, &request)?;

        let reply = self.call_with_retry(
            Operation::GetEntries,
            CallRequest {
                program: self.config.get_entries_program.clone(),
                request,
                output_sizes: vec![receiver_length, LIST_INFORMATION_LEN],
            },
        )?;
        let chunk = self.chunk_from_reply(Operation::GetEntries, reply)?;
        let status = &chunk.status;

        if status.total_records != snapshot.total_records {
            return Err(ListError::inconsistent(format!(
                "total changed from {} to {}",
                snapshot.total_records, status.total_records
            )));
        }
        if status.records_returned > count {
            return Err(ListError::inconsistent(format!(
                "requested {count} entries, host returned {}",
                status.records_returned
            )));
        }
        if status.records_returned > 0 && status.first_record != start {
            return Err(ListError::inconsistent(format!(
                "requested entries from {start}, host returned from {}",
                status.first_record
            )));
        }

        debug!(
            handle = %handle,
            start,
            requested = count,
            returned = status.records_returned,
            "Fetched list entries"
        );
        Ok(chunk)
    }

    /// Decode every entry of `chunk` with the entry format given to open.
    pub fn decode_entries(&self, chunk: &RawChunk) -> ListResult<Vec<ValueTree>> {
        let format = self.entry_format.as_ref().ok_or(ListError::SessionClosed {
            operation: Operation::GetEntries,
        })?;
        let mut entries = Vec::with_capacity(chunk.len());
        let record_length = chunk.status.record_length;
        if record_length > 0 {
            for i in 0..chunk.len() {
                let begin = i * record_length;
                let end = (begin + record_length).min(chunk.data.len());
                let slot = chunk.data.get(begin..end).unwrap_or_default();
                let (entry, _) = self.codec.decode(format, slot, 0)?;
                entries.push(entry);
            }
        } else {
            // Self-describing entries packed back to back.
            let mut offset = 0;
            for _ in 0..chunk.len() {
                let (entry, used) = self.codec.decode(format, &chunk.data, offset)?;
                offset += used;
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    /// Release the snapshot.
    ///
    /// Closing an idle or already closed session does nothing. The session
    /// counts as closed even when the host call fails; the failure is
    /// returned so the caller learns the handle may have leaked.
    pub fn close(&mut self) -> ListResult<()> {
        if self.state != SessionState::Open {
            return Ok(());
        }
        self.state = SessionState::Closed;
        self.prefetched = None;
        let Some(handle) = self.handle else {
            return Ok(());
        };

        let request = ValueTree::new().with("handle", handle.as_bytes().to_vec());
        let request = self.codec.encode(&self.formats.close, &request)?;
        self.call_with_retry(
            Operation::Close,
            CallRequest {
                program: self.config.close_program.clone(),
                request,
                output_sizes: Vec::new(),
            },
        )?;
        info!(handle = %handle, "Closed list");
        Ok(())
    }

    /// Fetch and decode every entry, then close.
    ///
    /// The list is closed whether or not the fetch succeeds. A fetch
    /// error wins over a close error; a close error after a successful
    /// fetch is returned.
    pub fn fetch_all(&mut self) -> ListResult<Vec<ValueTree>> {
        let fetched = self.fetch_remaining();
        let closed = self.close();
        match (fetched, closed) {
            (Ok(entries), Ok(())) => Ok(entries),
            (Ok(_), Err(err)) => Err(err),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(close_err)) => {
                error!(error = %close_err, "Failed to close list after fetch failure");
                Err(err)
            }
        }
    }

    fn fetch_remaining(&mut self) -> ListResult<Vec<ValueTree>> {
        let total = self.total_records().ok_or(ListError::SessionClosed {
            operation: Operation::GetEntries,
        })?;
        let mut entries = Vec::with_capacity(total);
        if let Some(chunk) = self.take_prefetched() {
            if chunk.len() > total {
                return Err(ListError::inconsistent(format!(
                    "open returned {} entries of {total}",
                    chunk.len()
                )));
            }
            entries.extend(self.decode_entries(&chunk)?);
        }
        while entries.len() < total {
            let want = self.config.block_size.min(total - entries.len());
            let chunk = self.get_entries(want, entries.len() + 1)?;
            if chunk.is_empty() {
                return Err(ListError::inconsistent(format!(
                    "host returned no entries at {} of {total}",
                    entries.len() + 1
                )));
            }
            entries.extend(self.decode_entries(&chunk)?);
        }
        Ok(entries)
    }

    /// Close after a failure that is already being reported.
    pub(crate) fn close_after_failure(&mut self) {
        if let Err(err) = self.close() {
            error!(error = %err, "Failed to close list after error");
        }
    }

    fn entry_length(&self, snapshot: &ListStatus) -> usize {
        if snapshot.record_length > 0 {
            return snapshot.record_length;
        }
        self.entry_format
            .as_ref()
            .map_or(1, |f| f.fixed_length().unwrap_or_else(|| f.min_length()).max(1))
    }

    fn chunk_from_reply(&self, operation: Operation, reply: CallReply) -> ListResult<RawChunk> {
        let (data, info) = split_outputs(operation, reply)?;
        let tree = self.decode_information(&info)?;
        receiver_chunk(ListStatus::from_record(&tree)?, data)
    }

    fn decode_information(&self, info: &[u8]) -> ListResult<ValueTree> {
        if info.len() < LIST_INFORMATION_LEN {
            return Err(ListError::StatusBufferTooSmall {
                needed: LIST_INFORMATION_LEN,
                available: info.len(),
            });
        }
        let (tree, _) = self.codec.decode(&self.formats.list_information, info, 0)?;
        Ok(tree)
    }

    fn call_with_retry(&mut self, operation: Operation, request: CallRequest) -> ListResult<CallReply> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let reply = self
                .channel
                .call(&request)
                .map_err(|source| ListError::TransportFailure { operation, source })?;
            if reply.succeeded {
                return Ok(reply);
            }

            let message_ids: Vec<String> = reply.messages.iter().map(|m| m.id.clone()).collect();
            if !message_ids.iter().any(|id| self.config.is_lock_message(id)) {
                return Err(ListError::HostFailure {
                    operation,
                    message_ids,
                });
            }
            if attempt >= self.config.max_attempts {
                warn!(%operation, attempts = attempt, "Object still locked, giving up");
                return Err(ListError::LockTimeout {
                    operation,
                    attempts: attempt,
                    message_ids,
                });
            }
            warn!(
                %operation,
                attempt,
                max_attempts = self.config.max_attempts,
                delay_ms = self.config.retry_delay_ms,
                "Object locked, retrying"
            );
            std::thread::sleep(self.config.retry_delay());
        }
    }
}

/// Receiver and list information buffers of a reply.
fn split_outputs(operation: Operation, reply: CallReply) -> ListResult<(Bytes, Bytes)> {
    let mut outputs = reply.outputs.into_iter();
    match (outputs.next(), outputs.next()) {
        (Some(data), Some(info)) => Ok((data, info)),
        _ => Err(ListError::inconsistent(format!(
            "{operation} reply is missing its output buffers"
        ))),
    }
}

fn receiver_chunk(status: ListStatus, data: Bytes) -> ListResult<RawChunk> {
    let needed = status.records_returned.saturating_mul(status.record_length);
    if needed > data.len() {
        return Err(ListError::inconsistent(format!(
            "{} entries of {} bytes do not fit a {}-byte receiver",
            status.records_returned,
            status.record_length,
            data.len()
        )));
    }
    Ok(RawChunk { status, data })
}

/// A synchronous open must come back fully built and starting at record 1.
fn check_open(chunk: &RawChunk) -> ListResult<()> {
    match chunk.status.build_status {
        BuildStatus::Complete => {}
        BuildStatus::Building => {
            return Err(ListError::inconsistent("list still building after synchronous open"))
        }
        BuildStatus::Error => return Err(ListError::inconsistent("host failed to build the list")),
    }
    if !chunk.is_empty() && chunk.status.first_record != 1 {
        return Err(ListError::inconsistent(format!(
            "open returned entries from {}, expected 1",
            chunk.status.first_record
        )));
    }
    if chunk.len() > chunk.status.total_records {
        return Err(ListError::inconsistent(format!(
            "open returned {} entries of {}",
            chunk.len(),
            chunk.status.total_records
        )));
    }
    Ok(())
}

fn as_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

impl<C> Drop for ListSession<C> {
    fn drop(&mut self) {
        if self.state == SessionState::Open {
            // No host call from drop; the handle lives until the job ends.
            warn!(
                handle = %self.handle.map(|h| h.to_string()).unwrap_or_default(),
                "List session dropped while open"
            );
        }
    }
}
