//! Error types for blueberry-rs.
//!
//! Two layers:
//!
//! * [`DecodeError`]: per-notification failures.  Recoverable; the session
//!   logs them, drops the packet and keeps streaming.
//! * [`Error`]: lifecycle and configuration failures.  A lifecycle error ends
//!   the current [`crate::session::StreamSession::run`] invocation.

use thiserror::Error;

use crate::registry::Source;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Failure to turn one notification into a [`crate::types::Sample`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// No channel name was resolved for the notification.  Carries the
    /// offending source when the caller knew it.
    #[error("unknown channel ({})", describe_source(.0))]
    UnknownChannel(Option<Source>),

    /// The buffer is shorter than the layout selected for its channel.
    #[error("malformed packet on {channel}: need {expected} bytes, got {actual}")]
    MalformedPacket {
        channel: String,
        expected: usize,
        actual: usize,
    },
}

fn describe_source(source: &Option<Source>) -> String {
    match source {
        Some(s) => format!("source {s}"),
        None => "no source".into(),
    }
}

/// Lifecycle, transport and registry errors.
#[derive(Debug, Error)]
pub enum Error {
    /// The transport could not establish a link to the device.
    #[error("connection error: {0}")]
    Connection(String),

    /// Subscribing to a data channel failed; the session was torn down.
    #[error("subscription to {channel} failed: {reason}")]
    Subscription { channel: String, reason: String },

    /// Low-level transport failure (unsubscribe, disconnect, notification stream).
    #[error("transport error: {0}")]
    Transport(String),

    /// Two registry channels claim the same numeric handle.
    #[error("handle {handle} is assigned to both {first} and {second}")]
    DuplicateHandle {
        handle: u16,
        first: String,
        second: String,
    },

    /// A registry lookup by name found nothing.
    #[error("no channel named {0}")]
    UnknownChannel(String),
}

impl Error {
    /// `true` for errors that end a `run()` invocation.
    pub fn is_lifecycle(&self) -> bool {
        matches!(self, Error::Connection(_) | Error::Subscription { .. })
    }
}
