//! In-memory host that serves open lists over the real wire formats.

#![allow(dead_code)]

use std::sync::mpsc::{Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use open_midrange_list::{
    BuildStatus, CallReply, CallRequest, ChannelError, HostMessage, InfoComplete, ListConfig,
    ListHandle, ListSession, ListStatus, ProtocolFormats, RemoteCallChannel, Selection,
};
use open_midrange_record::{FieldKind, StructureCodec, StructureDescriptor, TextEncoding, ValueTree};

/// Bytes per simulated entry: a 4-byte id and a 6-character name.
pub const ENTRY_LEN: usize = 10;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn entry_format() -> Arc<StructureDescriptor> {
    Arc::new(
        StructureDescriptor::builder("OBJL0100")
            .field("id", FieldKind::Int32)
            .field("name", FieldKind::fixed_text(6, TextEncoding::Ccsid(37)))
            .build()
            .unwrap(),
    )
}

pub fn entry(id: usize) -> ValueTree {
    ValueTree::new()
        .with("id", id as i64)
        .with("name", format!("E{id:05}"))
}

/// Host behaviour knobs and a log of what the client sent.
#[derive(Debug, Default)]
pub struct HostState {
    pub total: usize,
    /// Entries the open call returns, when the receiver has room.
    pub open_returns: usize,
    /// Per-call caps the host cycles through; empty means no cap.
    pub partition: Vec<usize>,
    /// Get-entries calls still to answer with a lock message.
    pub locks_remaining: usize,
    /// Return one entry more than requested.
    pub overshoot: bool,
    /// Return nothing when asked to start here.
    pub stall_at: Option<usize>,
    /// Report a different total on get-entries.
    pub drift: bool,
    /// Reject the close call.
    pub reject_close: bool,
    /// Hold the next get-entries call until released.
    pub pause: Option<Pause>,

    pub programs: Vec<String>,
    /// (recordsRequested, startingRecord) of each get-entries call.
    pub gets: Vec<(usize, usize)>,
    pub closes: usize,
    next_cap: usize,
}

/// Signals that a get-entries call has arrived, then waits for `release`.
#[derive(Debug)]
pub struct Pause {
    pub entered: Sender<()>,
    pub release: Receiver<()>,
}

#[derive(Clone)]
pub struct SimulatedHost {
    state: Arc<Mutex<HostState>>,
    formats: Arc<ProtocolFormats>,
    codec: StructureCodec,
}

impl SimulatedHost {
    pub fn new(total: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(HostState {
                total,
                ..HostState::default()
            })),
            formats: Arc::new(ProtocolFormats::new().unwrap()),
            codec: StructureCodec::default(),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap()
    }

    /// A session over a clone of this host, opened with no prefetch room
    /// unless the host is set to return entries from open.
    pub fn open_session(&self, config: ListConfig) -> ListSession<SimulatedHost> {
        let buffer = self.state().open_returns * ENTRY_LEN;
        let mut session =
            ListSession::new(self.clone(), StructureCodec::default(), config).unwrap();
        session
            .open(&Selection::new("QGYOLOBJ", Bytes::from_static(b"*ALL")), entry_format(), buffer)
            .unwrap();
        session
    }

    fn reply(&self, total: usize, first: usize, returned: usize) -> Result<CallReply, ChannelError> {
        let format = entry_format();
        let mut data = Vec::with_capacity(returned * ENTRY_LEN);
        for id in first..first + returned {
            data.extend_from_slice(&self.codec.encode(&format, &entry(id))?);
        }
        let status = ListStatus {
            total_records: total,
            records_returned: returned,
            handle: ListHandle::new([0, 0, 0x10, 0x01]),
            record_length: ENTRY_LEN,
            info_complete: InfoComplete::Complete,
            created: "1261019093000".to_string(),
            build_status: BuildStatus::Complete,
            info_length: data.len(),
            first_record: if returned == 0 { 0 } else { first },
        };
        let info = self.codec.encode(&self.formats.list_information, &status.to_record())?;
        Ok(CallReply::success(vec![Bytes::from(data), info]))
    }
}

fn locked() -> CallReply {
    CallReply::failure(vec![HostMessage::new(
        "CPF9803",
        40,
        "Cannot allocate object QUSRSYS.",
    )])
}

impl RemoteCallChannel for SimulatedHost {
    fn call(&mut self, request: &CallRequest) -> Result<CallReply, ChannelError> {
        let mut state = self.state.lock().map_err(|e| e.to_string())?;
        state.programs.push(request.program.clone());
        match request.program.as_str() {
            "QGYCLST" => {
                let (tree, _) = self.codec.decode(&self.formats.close, &request.request, 0)?;
                assert_eq!(tree.get_bytes("handle"), Some(&[0, 0, 0x10, 0x01][..]));
                state.closes += 1;
                if state.reject_close {
                    return Ok(CallReply::failure(vec![HostMessage::new(
                        "GUI0002",
                        30,
                        "Request handle not valid.",
                    )]));
                }
                Ok(CallReply::success(Vec::new()))
            }
            "QGYGTLE" => {
                let (tree, _) = self.codec.decode(&self.formats.get_entries, &request.request, 0)?;
                let want = tree.get_i64("recordsRequested").unwrap_or(0) as usize;
                let start = tree.get_i64("startingRecord").unwrap_or(0) as usize;
                state.gets.push((want, start));
                if let Some(pause) = state.pause.take() {
                    drop(state);
                    pause.entered.send(()).map_err(|e| e.to_string())?;
                    pause.release.recv().map_err(|e| e.to_string())?;
                    state = self.state.lock().map_err(|e| e.to_string())?;
                }
                if state.locks_remaining > 0 {
                    state.locks_remaining -= 1;
                    return Ok(locked());
                }
                let mut returned = want.min(state.total + 1 - start);
                if !state.partition.is_empty() {
                    let cap = state.partition[state.next_cap % state.partition.len()];
                    state.next_cap += 1;
                    returned = returned.min(cap);
                }
                if state.overshoot {
                    returned = want + 1;
                }
                if state.stall_at == Some(start) {
                    returned = 0;
                }
                let total = if state.drift { state.total + 1 } else { state.total };
                drop(state);
                self.reply(total, start, returned)
            }
            _ => {
                let (tree, _) = self.codec.decode(&self.formats.open, &request.request, 0)?;
                assert_eq!(tree.get_bytes("selection"), Some(&b"*ALL"[..]));
                let room = tree.get_i64("receiverLength").unwrap_or(0) as usize / ENTRY_LEN;
                let returned = state.open_returns.min(state.total).min(room);
                let total = state.total;
                drop(state);
                self.reply(total, 1, returned)
            }
        }
    }
}

/// Settings with no wait between lock retries.
pub fn fast_config(block_size: usize) -> ListConfig {
    ListConfig {
        retry_delay_ms: 0,
        block_size,
        ..ListConfig::default()
    }
}
