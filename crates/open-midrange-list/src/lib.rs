//! Open-list pagination for OpenMidrange.
//!
//! Host list APIs build a snapshot of matching objects and hand back a
//! handle; the client then pulls entries in blocks and finally releases
//! the handle. This crate implements that protocol over any
//! [`RemoteCallChannel`]:
//!
//! - [`ListSession`]: open, get entries, close, with bounded lock retries
//! - [`PagedEnumerator`]: lazy one-at-a-time iteration over a session
//! - [`ProtocolFormats`] / [`ListStatus`]: the request and status layouts
//!
//! Entries are decoded with [`open_midrange_record`] descriptors supplied
//! by the caller.

pub mod channel;
pub mod config;
pub mod enumerator;
pub mod error;
pub mod protocol;
pub mod session;

pub use channel::{CallReply, CallRequest, ChannelError, HostMessage, RemoteCallChannel};
pub use config::ListConfig;
pub use enumerator::{PagedEnumerator, PagedIter};
pub use error::{ErrorKind, ListError, ListResult, Operation};
pub use protocol::{
    BuildStatus, InfoComplete, ListHandle, ListStatus, ProtocolFormats, Selection, BUILD_SYNCHRONOUS,
    LIST_INFORMATION_LEN,
};
pub use session::{ListSession, RawChunk, SessionState};
