//! Transport seam between the stream session and a BLE stack.
//!
//! [`Transport`] establishes a link to a device address; the returned
//! [`Link`] subscribes to characteristics and yields a stream of
//! [`Notification`]s.  [`crate::ble::BleTransport`] implements it on top of
//! btleplug, [`mock::MockTransport`] in memory for tests and simulation.
//!
//! Retry and timeout policy for establishing the link belongs to the
//! transport, not to the session.

use async_trait::async_trait;
use futures::stream::BoxStream;
use uuid::Uuid;

use crate::error::Result;
use crate::registry::Source;

pub mod mock;

/// One notification pushed by the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Sending characteristic, as the platform stack reports it.
    pub source: Source,
    /// Raw payload bytes.
    pub value: Vec<u8>,
}

impl Notification {
    pub fn new(source: impl Into<Source>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            source: source.into(),
            value: value.into(),
        }
    }
}

/// Notifications from every subscribed characteristic, in arrival order.
///
/// The stream ends when the link drops.
pub type NotificationStream = BoxStream<'static, Notification>;

/// Connects to a device by address.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Owned so a session can hand it to a background task for release
    /// when the session itself is dropped mid-stream.
    type Link: Link + 'static;

    /// Establish a link.  Failures should be reported as
    /// [`crate::error::Error::Connection`].
    async fn connect(&self, address: &str) -> Result<Self::Link>;
}

/// An established connection, exclusively owned by one session.
#[async_trait]
pub trait Link: Send {
    /// Enable notifications on a characteristic.
    async fn subscribe(&mut self, characteristic: Uuid) -> Result<()>;

    /// Disable notifications on a characteristic.
    async fn unsubscribe(&mut self, characteristic: Uuid) -> Result<()>;

    /// Stream of notifications for all subscribed characteristics.
    async fn notifications(&mut self) -> Result<NotificationStream>;

    /// Release the link.
    async fn disconnect(&mut self) -> Result<()>;
}
