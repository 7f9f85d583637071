//! GATT UUIDs, packet layout constants, and BLE wire-format helpers for
//! Blueberry glasses.
//!
//! All UUIDs are the vendor values flashed into the Blueberry fNIRS firmware.
//! They follow a descending-byte pattern (`0f0e0d0c-…`, `1f1e1d1c-…`, …) that
//! makes them easy to recognise in a BLE sniffer trace.

use uuid::Uuid;

use crate::types::Sample;

// ── Service ──────────────────────────────────────────────────────────────────

/// Primary GATT service UUID exposed by the fNIRS firmware.
pub const FNIRS_SERVICE_UUID: Uuid = Uuid::from_u128(0x0f0e0d0c_0b0a_0908_0706_050403020100);

// ── Characteristics ───────────────────────────────────────────────────────────

/// Write-only command characteristic.
///
/// Listed in the registry so that its identifier resolves, but never
/// subscribed to and never written by this crate.
pub const COMMAND_CHARACTERISTIC: Uuid =
    Uuid::from_u128(0x1f1e1d1c_1b1a_1918_1716_151413121110);

/// Short-path optical channel (shallow photon path, scalp signal).
pub const SHORT_PATH_CHARACTERISTIC: Uuid =
    Uuid::from_u128(0x2f2e2d2c_2b2a_2928_2726_252423222120);

/// Long-path optical channel (deep photon path, cortical signal).
///
/// Also carries the extended metrics payload on firmware that packs it.
pub const LONG_PATH_CHARACTERISTIC: Uuid =
    Uuid::from_u128(0x3f3e3d3c_3b3a_3938_3736_353433323130);

// ── Channel names ─────────────────────────────────────────────────────────────

pub const COMMAND: &str = "command";
pub const SHORT_PATH: &str = "short_path";
pub const LONG_PATH: &str = "long_path";

/// Names of the two streamed channels, in subscription order.
pub const DATA_CHANNEL_NAMES: [&str; 2] = [SHORT_PATH, LONG_PATH];

// ── Packet layout ─────────────────────────────────────────────────────────────

/// Bytes needed to decode the compact layout:
/// `packet_index:u8, sample_index:u8, channel1..3:i32`.
///
/// The firmware usually appends two reserved bytes; they are ignored and
/// not required.
pub const COMPACT_PACKET_LEN: usize = 14;

/// Bytes needed to decode the extended (long-path) layout:
/// compact fields + `metric_a, metric_b, hr, hrv, motion:u8, temperature:u16`.
///
/// Long-path notifications shorter than this fall back to the compact layout.
pub const EXTENDED_PACKET_LEN: usize = 21;

// ── Encoding ──────────────────────────────────────────────────────────────────

/// Encode a [`Sample`] back into the firmware's big-endian wire format.
///
/// Compact samples encode to exactly [`COMPACT_PACKET_LEN`] bytes, extended
/// samples to [`EXTENDED_PACKET_LEN`] bytes.  Used by the mock transport to
/// synthesise notifications.
///
/// # Example
///
/// ```
/// # use blueberry_rs::protocol::encode_sample;
/// # use blueberry_rs::types::Sample;
/// let s = Sample::compact("short_path", 1, 5, 256, -500, 100);
/// assert_eq!(
///     encode_sample(&s),
///     [0x01, 0x05, 0, 0, 1, 0, 0xFF, 0xFF, 0xFE, 0x0C, 0, 0, 0, 0x64]
/// );
/// ```
pub fn encode_sample(sample: &Sample) -> Vec<u8> {
    let mut out = Vec::with_capacity(EXTENDED_PACKET_LEN);
    out.push(sample.packet_index);
    out.push(sample.sample_index);
    out.extend_from_slice(&sample.channel1.to_be_bytes());
    out.extend_from_slice(&sample.channel2.to_be_bytes());
    out.extend_from_slice(&sample.channel3.to_be_bytes());
    if let Some(m) = &sample.extended {
        out.extend_from_slice(&[
            m.metric_a,
            m.metric_b,
            m.heart_rate,
            m.heart_rate_variability,
            m.motion_level,
        ]);
        out.extend_from_slice(&m.temperature.to_be_bytes());
    }
    out
}
