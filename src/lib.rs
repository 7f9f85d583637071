//! # blueberry-rs
//!
//! Async Rust library and CLI for streaming fNIRS data from
//! [Blueberry](https://blueberryx.com/) glasses over Bluetooth Low Energy.
//!
//! The glasses push two optical streams:
//!
//! | Channel | Characteristic | Payload |
//! |---|---|---|
//! | `short_path` | `2f2e2d2c-…` | 740 / 880 / 850 nm readings |
//! | `long_path` | `3f3e3d3c-…` | same, plus HR / HRV / motion / temperature on extended packets |
//!
//! ## Quick start
//!
//! ```no_run
//! use blueberry_rs::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut session = StreamSession::new(
//!         SessionConfig::new("AA:BB:CC:DD:EE:FF"),
//!         BleTransport::default(),
//!         |s: Sample| println!("{} #{}: {:?}", s.channel, s.packet_index, s.optical()),
//!     );
//!     let stop = session.stop_handle();
//!     tokio::spawn(async move {
//!         tokio::time::sleep(std::time::Duration::from_secs(25)).await;
//!         stop.stop();
//!     });
//!     session.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module overview
//!
//! | Module | Purpose |
//! |---|---|
//! | [`prelude`] | One-line glob import of the most commonly needed types |
//! | [`session`] | The connect / subscribe / stream / stop state machine |
//! | [`registry`] | Maps notification handles and UUIDs to channel names |
//! | [`parse`] | Byte-to-[`types::Sample`] decoder |
//! | [`protocol`] | GATT UUIDs, packet lengths, and the wire encoder |
//! | [`transport`] | Transport traits and the in-memory mock |
//! | [`ble`] | btleplug transport |
//! | [`sink`] | Consumer trait for decoded samples |
//! | [`types`] | Samples and session state |
//! | [`error`] | Error taxonomy |

pub mod ble;
pub mod error;
pub mod parse;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod sink;
pub mod transport;
pub mod types;

// ── Prelude ───────────────────────────────────────────────────────────────────

/// Convenience re-exports for downstream crates.
pub mod prelude {
    // ── Session ───────────────────────────────────────────────────────────────
    pub use crate::session::{SessionConfig, StopHandle, StreamSession};
    pub use crate::sink::SampleSink;

    // ── Transports ────────────────────────────────────────────────────────────
    pub use crate::ble::{BleTransport, BleTransportConfig};
    pub use crate::transport::mock::MockTransport;
    pub use crate::transport::{Link, Notification, Transport};

    // ── Decoding ──────────────────────────────────────────────────────────────
    pub use crate::parse::{decode, decode_notification};
    pub use crate::registry::{ChannelDescriptor, Registry, Source};

    // ── Data types ────────────────────────────────────────────────────────────
    pub use crate::error::{DecodeError, Error};
    pub use crate::types::{
        EndReason, ExtendedMetrics, Sample, SessionStatus, SessionSummary,
    };

    // ── Protocol constants ────────────────────────────────────────────────────
    pub use crate::protocol::{
        LONG_PATH, LONG_PATH_CHARACTERISTIC, SHORT_PATH, SHORT_PATH_CHARACTERISTIC,
    };
}
