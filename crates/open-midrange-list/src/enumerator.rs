//! Lazy, block-wise enumeration of an open list.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use open_midrange_record::ValueTree;
use tracing::{debug, error};

use crate::channel::RemoteCallChannel;
use crate::error::{ListError, ListResult, Operation};
use crate::session::{ListSession, SessionState};

/// Hands out the entries of an open list one at a time, fetching them
/// from the host a block at a time.
///
/// The enumerator owns the session and closes it exactly once: when the
/// last entry has been delivered, when [`close`](Self::close) is called,
/// or when a fetch fails. Entries already cached when the enumerator is
/// closed are still delivered. Access is serialized, so one enumerator
/// can be shared across threads.
pub struct PagedEnumerator<C> {
    inner: Mutex<Cursor<C>>,
}

struct Cursor<C> {
    session: ListSession<C>,
    block_size: usize,
    total: usize,
    /// Entries handed to the caller.
    position: usize,
    /// Entries received from the host.
    fetched: usize,
    cache: VecDeque<ValueTree>,
    closed: bool,
    /// Close failure from an exhausting `next_entry`, reported by the next call.
    pending: Option<ListError>,
}

impl<C: RemoteCallChannel> PagedEnumerator<C> {
    /// Enumerate an open session in blocks of the session's configured size.
    pub fn new(session: ListSession<C>) -> ListResult<Self> {
        let block_size = session.config().block_size;
        Self::with_block_size(session, block_size)
    }

    /// Enumerate an open session in blocks of `block_size` entries.
    pub fn with_block_size(mut session: ListSession<C>, block_size: usize) -> ListResult<Self> {
        if block_size == 0 {
            session.close_after_failure();
            return Err(ListError::InvalidConfiguration {
                message: "block_size must be at least 1".to_string(),
            });
        }
        let total = match (session.state(), session.total_records()) {
            (SessionState::Open, Some(total)) => total,
            _ => {
                return Err(ListError::SessionClosed {
                    operation: Operation::GetEntries,
                })
            }
        };

        let mut cursor = Cursor {
            session,
            block_size,
            total,
            position: 0,
            fetched: 0,
            cache: VecDeque::new(),
            closed: false,
            pending: None,
        };
        if let Some(chunk) = cursor.session.take_prefetched() {
            let accepted = cursor
                .session
                .decode_entries(&chunk)
                .and_then(|entries| cursor.accept(entries));
            if let Err(err) = accepted {
                cursor.abandon();
                return Err(err);
            }
        }
        Ok(Self {
            inner: Mutex::new(cursor),
        })
    }

    /// Whether another entry is available, fetching a block if needed.
    ///
    /// Once the list is exhausted the session is closed and this returns
    /// `false` from then on.
    pub fn has_next(&self) -> ListResult<bool> {
        let mut cursor = self.lock();
        cursor.report_pending()?;
        cursor.ensure_cached()
    }

    /// Next entry, or [`ListError::NoSuchElement`] when none remain.
    pub fn next_entry(&self) -> ListResult<ValueTree> {
        let mut cursor = self.lock();
        cursor.report_pending()?;
        if !cursor.ensure_cached()? {
            return Err(ListError::NoSuchElement);
        }
        let entry = cursor.cache.pop_front().ok_or(ListError::NoSuchElement)?;
        cursor.position += 1;
        if cursor.position == cursor.total {
            if let Err(err) = cursor.finish() {
                cursor.pending = Some(err);
            }
        }
        Ok(entry)
    }

    /// Release the host list. Entries already cached remain available.
    ///
    /// Closing more than once sends a single close to the host.
    pub fn close(&self) -> ListResult<()> {
        let mut cursor = self.lock();
        cursor.report_pending()?;
        cursor.finish()
    }

    /// Entries delivered so far.
    pub fn position(&self) -> usize {
        self.lock().position
    }

    /// Entries in the snapshot.
    pub fn total_records(&self) -> usize {
        self.lock().total
    }

    /// Whether the host list has been released.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Iterate the remaining entries. Stops after the first error.
    pub fn iter(&self) -> PagedIter<'_, C> {
        PagedIter {
            enumerator: self,
            failed: false,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Cursor<C>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<C: RemoteCallChannel> Cursor<C> {
    fn ensure_cached(&mut self) -> ListResult<bool> {
        if !self.cache.is_empty() {
            return Ok(true);
        }
        if self.closed {
            return Ok(false);
        }
        if self.fetched >= self.total {
            self.finish()?;
            return Ok(false);
        }
        self.fill()?;
        Ok(!self.cache.is_empty())
    }

    fn fill(&mut self) -> ListResult<()> {
        let want = self.block_size.min(self.total - self.fetched);
        let start = self.fetched + 1;
        let fetched = self
            .session
            .get_entries(want, start)
            .and_then(|chunk| self.session.decode_entries(&chunk));
        let result = fetched.and_then(|entries| {
            if entries.is_empty() {
                return Err(ListError::inconsistent(format!(
                    "host returned no entries at {start} of {}",
                    self.total
                )));
            }
            self.accept(entries)
        });
        if result.is_err() {
            self.abandon();
        }
        result
    }

    fn accept(&mut self, entries: Vec<ValueTree>) -> ListResult<()> {
        if self.fetched + entries.len() > self.total {
            return Err(ListError::inconsistent(format!(
                "received {} entries of {}",
                self.fetched + entries.len(),
                self.total
            )));
        }
        self.fetched += entries.len();
        debug!(fetched = self.fetched, total = self.total, "Cached list entries");
        self.cache.extend(entries);
        Ok(())
    }

    fn finish(&mut self) -> ListResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.session.close()
    }

    /// Best-effort close while another error is on its way out.
    fn abandon(&mut self) {
        if let Err(err) = self.finish() {
            error!(error = %err, "Failed to close list after fetch failure");
        }
    }

    fn report_pending(&mut self) -> ListResult<()> {
        match self.pending.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Iterator over the remaining entries of a [`PagedEnumerator`].
pub struct PagedIter<'a, C> {
    enumerator: &'a PagedEnumerator<C>,
    failed: bool,
}

impl<C: RemoteCallChannel> Iterator for PagedIter<'_, C> {
    type Item = ListResult<ValueTree>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.enumerator.has_next() {
            Ok(true) => {
                let entry = self.enumerator.next_entry();
                self.failed = entry.is_err();
                Some(entry)
            }
            Ok(false) => None,
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{CallReply, CallRequest, ChannelError};
    use crate::config::ListConfig;
    use crate::protocol::{BuildStatus, InfoComplete, ListHandle, ListStatus, ProtocolFormats, Selection};
    use bytes::Bytes;
    use open_midrange_record::{FieldKind, StructureCodec, StructureDescriptor};
    use std::sync::Arc;

    /// Serves `total` four-byte entries and counts close calls.
    struct Counting {
        total: usize,
        closes: usize,
    }

    impl RemoteCallChannel for Counting {
        fn call(&mut self, request: &CallRequest) -> Result<CallReply, ChannelError> {
            let formats = ProtocolFormats::new()?;
            let codec = StructureCodec::default();
            let (returned, first) = match request.program.as_str() {
                "QGYCLST" => {
                    self.closes += 1;
                    return Ok(CallReply::success(Vec::new()));
                }
                "QGYGTLE" => {
                    let (tree, _) = codec.decode(&formats.get_entries, &request.request, 0)?;
                    let start = tree.get_i64("startingRecord").unwrap_or(1) as usize;
                    let want = tree.get_i64("recordsRequested").unwrap_or(0) as usize;
                    (want.min(self.total + 1 - start), start)
                }
                _ => (0, 0),
            };
            let data: Vec<u8> = (first..first + returned)
                .flat_map(|id| (id as u32).to_be_bytes())
                .collect();
            let status = ListStatus {
                total_records: self.total,
                records_returned: returned,
                handle: ListHandle::new([0, 0, 0, 9]),
                record_length: 4,
                info_complete: InfoComplete::Complete,
                created: String::new(),
                build_status: BuildStatus::Complete,
                info_length: data.len(),
                first_record: first,
            };
            let info = codec.encode(&formats.list_information, &status.to_record())?;
            Ok(CallReply::success(vec![Bytes::from(data), info]))
        }
    }

    fn enumerator(total: usize, block: usize) -> PagedEnumerator<Counting> {
        let config = ListConfig {
            retry_delay_ms: 0,
            ..ListConfig::default()
        };
        let mut session = ListSession::new(
            Counting { total, closes: 0 },
            StructureCodec::default(),
            config,
        )
        .unwrap();
        let format = StructureDescriptor::builder("ENTRY")
            .field("id", FieldKind::Int32)
            .build()
            .unwrap();
        session
            .open(&Selection::new("QGYOLSPL", Bytes::new()), Arc::new(format), 0)
            .unwrap();
        PagedEnumerator::with_block_size(session, block).unwrap()
    }

    fn closes(e: &PagedEnumerator<Counting>) -> usize {
        e.lock().session_closes()
    }

    impl Cursor<Counting> {
        fn session_closes(&self) -> usize {
            self.session.channel().closes
        }
    }

    #[test]
    fn test_delivers_in_order_and_closes_once() {
        let e = enumerator(7, 3);
        let ids: Vec<i64> = e
            .iter()
            .map(|r| r.unwrap().get_i64("id").unwrap())
            .collect();
        assert_eq!(ids, (1..=7).collect::<Vec<_>>());
        assert!(e.is_closed());
        assert!(!e.has_next().unwrap());
        assert!(matches!(e.next_entry(), Err(ListError::NoSuchElement)));
        e.close().unwrap();
        assert_eq!(closes(&e), 1);
        assert_eq!(e.position(), 7);
    }

    #[test]
    fn test_empty_list() {
        let e = enumerator(0, 3);
        assert_eq!(e.total_records(), 0);
        assert!(!e.has_next().unwrap());
        assert!(e.is_closed());
        assert_eq!(closes(&e), 1);
    }

    #[test]
    fn test_close_keeps_cached_entries() {
        let e = enumerator(10, 4);
        assert_eq!(e.next_entry().unwrap().get_i64("id"), Some(1));
        e.close().unwrap();
        let rest: Vec<i64> = e.iter().map(|r| r.unwrap().get_i64("id").unwrap()).collect();
        assert_eq!(rest, vec![2, 3, 4]);
        assert!(!e.has_next().unwrap());
        assert_eq!(closes(&e), 1);
    }

    #[test]
    fn test_zero_block_size_rejected() {
        let config = ListConfig::default();
        let session =
            ListSession::new(Counting { total: 1, closes: 0 }, StructureCodec::default(), config)
                .unwrap();
        assert!(matches!(
            PagedEnumerator::with_block_size(session, 0),
            Err(ListError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_unopened_session_rejected() {
        let session = ListSession::new(
            Counting { total: 1, closes: 0 },
            StructureCodec::default(),
            ListConfig::default(),
        )
        .unwrap();
        assert!(matches!(
            PagedEnumerator::new(session),
            Err(ListError::SessionClosed { .. })
        ));
    }
}
