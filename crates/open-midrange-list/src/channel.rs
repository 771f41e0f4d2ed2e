//! The remote call channel the list protocol runs over.
//!
//! The channel sends one request buffer to a host program and returns the
//! output buffers it asked for, or the messages the host produced. How the
//! bytes travel (sockets, sign-on, encryption) is the channel's business.

use bytes::Bytes;

/// Error raised by a channel implementation.
pub type ChannelError = Box<dyn std::error::Error + Send + Sync>;

/// One host message attached to a call reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostMessage {
    /// Message identifier, e.g. "CPF9803". The only part this crate inspects.
    pub id: String,
    /// Host severity (0-99).
    pub severity: u8,
    /// Message text, passed through untouched.
    pub text: String,
}

impl HostMessage {
    /// Create a host message.
    pub fn new(id: impl Into<String>, severity: u8, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            severity,
            text: text.into(),
        }
    }
}

/// A program call: request bytes plus the size of each output buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
    /// Host program to call.
    pub program: String,
    /// Encoded request.
    pub request: Bytes,
    /// Requested size of each output buffer, in order.
    pub output_sizes: Vec<usize>,
}

/// Result of a completed round trip.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallReply {
    /// Whether the program completed normally.
    pub succeeded: bool,
    /// Output buffers in the order requested.
    pub outputs: Vec<Bytes>,
    /// Messages the host returned.
    pub messages: Vec<HostMessage>,
}

impl CallReply {
    /// A successful reply.
    pub fn success(outputs: Vec<Bytes>) -> Self {
        Self {
            succeeded: true,
            outputs,
            messages: Vec::new(),
        }
    }

    /// A failed reply carrying host messages.
    pub fn failure(messages: Vec<HostMessage>) -> Self {
        Self {
            succeeded: false,
            outputs: Vec::new(),
            messages,
        }
    }
}

/// Synchronous request/response channel to the host.
///
/// Every call is a blocking round trip. A session never overlaps calls.
pub trait RemoteCallChannel {
    /// Send `request` and wait for the reply.
    ///
    /// A host-side failure is an `Ok` reply with `succeeded == false`;
    /// `Err` is reserved for the transport itself failing.
    fn call(&mut self, request: &CallRequest) -> Result<CallReply, ChannelError>;
}

impl<C: RemoteCallChannel + ?Sized> RemoteCallChannel for &mut C {
    fn call(&mut self, request: &CallRequest) -> Result<CallReply, ChannelError> {
        (**self).call(request)
    }
}

impl<C: RemoteCallChannel + ?Sized> RemoteCallChannel for Box<C> {
    fn call(&mut self, request: &CallRequest) -> Result<CallReply, ChannelError> {
        (**self).call(request)
    }
}
