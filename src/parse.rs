//! Binary decoders for Blueberry BLE notification payloads.
//!
//! All public functions in this module are pure (no I/O, no shared state) and
//! are safe to call from any async or sync context.
//!
//! # Compact vs. extended layout
//!
//! The firmware has no type tag in its packets.  Long-path notifications
//! sometimes carry extra derived metrics; when they don't, the trailing fields
//! are simply omitted.  The layout is therefore chosen from the channel and
//! the payload length:
//!
//! | Channel | Length | Layout |
//! |---|---|---|
//! | `long_path` | ≥ 21 | extended |
//! | `long_path` | 14–20 | compact |
//! | anything else | ≥ 14 | compact |
//! | any | < 14 | [`DecodeError::MalformedPacket`] |
//!
//! Every field is big-endian; the three optical readings are two's-complement
//! `i32`, everything else is unsigned:
//!
//! ```text
//! offset  0   packet_index   u8
//!         1   sample_index   u8
//!         2   channel1       i32   740 nm
//!         6   channel2       i32   880 nm
//!        10   channel3       i32   850 nm
//!  ── extended layout only ──
//!        14   metric_a       u8
//!        15   metric_b       u8
//!        16   heart_rate     u8
//!        17   hrv            u8
//!        18   motion_level   u8
//!        19   temperature    u16
//! ```
//!
//! There is no checksum; integrity is left to the BLE link layer.

use crate::error::DecodeError;
use crate::protocol::{COMPACT_PACKET_LEN, EXTENDED_PACKET_LEN, LONG_PATH};
use crate::registry::{Registry, Source};
use crate::types::{ExtendedMetrics, Sample};

fn read_i32_be(data: &[u8], offset: usize) -> i32 {
    i32::from_be_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

fn read_u16_be(data: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([data[offset], data[offset + 1]])
}

/// Which layout a `(channel, length)` pair decodes with.
fn uses_extended_layout(channel: &str, len: usize) -> bool {
    channel == LONG_PATH && len >= EXTENDED_PACKET_LEN
}

/// Decode one notification payload for an already-resolved channel.
///
/// `channel` is the result of [`Registry::resolve`]; `None` yields
/// [`DecodeError::UnknownChannel`].  Buffers shorter than
/// [`COMPACT_PACKET_LEN`] yield [`DecodeError::MalformedPacket`].
/// Bytes beyond the selected layout are ignored.
///
/// # Example
///
/// ```
/// # use blueberry_rs::parse::decode;
/// let raw = [0x01, 0x05, 0, 0, 1, 0, 0xFF, 0xFF, 0xFE, 0x0C, 0, 0, 0, 0x64];
/// let s = decode(Some("short_path"), &raw).unwrap();
/// assert_eq!((s.channel1, s.channel2, s.channel3), (256, -500, 100));
/// assert!(!s.is_extended());
/// ```
pub fn decode(channel: Option<&str>, data: &[u8]) -> Result<Sample, DecodeError> {
    let channel = channel.ok_or(DecodeError::UnknownChannel(None))?;

    if data.len() < COMPACT_PACKET_LEN {
        return Err(DecodeError::MalformedPacket {
            channel: channel.to_owned(),
            expected: COMPACT_PACKET_LEN,
            actual: data.len(),
        });
    }

    let sample = Sample::compact(
        channel,
        data[0],
        data[1],
        read_i32_be(data, 2),
        read_i32_be(data, 6),
        read_i32_be(data, 10),
    );

    if !uses_extended_layout(channel, data.len()) {
        return Ok(sample);
    }

    Ok(sample.with_metrics(ExtendedMetrics {
        metric_a: data[14],
        metric_b: data[15],
        heart_rate: data[16],
        heart_rate_variability: data[17],
        motion_level: data[18],
        temperature: read_u16_be(data, 19),
    }))
}

/// Resolve `source` through `registry`, then [`decode`] the payload.
///
/// Unlike calling the two steps separately, an unresolved source is carried
/// in the returned [`DecodeError::UnknownChannel`] so it can be logged.
pub fn decode_notification(
    registry: &Registry,
    source: &Source,
    data: &[u8],
) -> Result<Sample, DecodeError> {
    match registry.resolve(source) {
        Some(channel) => decode(Some(channel), data),
        None => Err(DecodeError::UnknownChannel(Some(source.clone()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{encode_sample, SHORT_PATH};
    use proptest::prelude::*;

    const SCENARIO: [u8; 14] = [
        0x01, 0x05, 0x00, 0x00, 0x01, 0x00, 0xFF, 0xFF, 0xFE, 0x0C, 0x00, 0x00, 0x00, 0x64,
    ];

    fn extended_packet() -> Vec<u8> {
        vec![
            0x07, 0x02, // indices
            0x7F, 0xFF, 0xFF, 0xFF, // i32::MAX
            0x80, 0x00, 0x00, 0x00, // i32::MIN
            0xFF, 0xFF, 0xFF, 0xFF, // -1
            0x0A, 0x0B, 72, 40, 3, // metric_a, metric_b, hr, hrv, motion
            0x01, 0x2C, // temperature 300
        ]
    }

    #[test]
    fn short_path_scenario() {
        let s = decode(Some(SHORT_PATH), &SCENARIO).unwrap();
        assert_eq!(s, Sample::compact(SHORT_PATH, 1, 5, 256, -500, 100));
    }

    #[test]
    fn reserved_trailing_bytes_are_ignored() {
        let mut raw = SCENARIO.to_vec();
        raw.extend_from_slice(&[0xAA, 0xBB]);
        let s = decode(Some(SHORT_PATH), &raw).unwrap();
        assert_eq!(s, Sample::compact(SHORT_PATH, 1, 5, 256, -500, 100));
    }

    #[test]
    fn long_path_extended_layout() {
        let s = decode(Some(LONG_PATH), &extended_packet()).unwrap();
        assert_eq!(s.packet_index, 7);
        assert_eq!(s.sample_index, 2);
        assert_eq!(s.optical(), [i32::MAX, i32::MIN, -1]);
        assert_eq!(
            s.extended,
            Some(ExtendedMetrics {
                metric_a: 0x0A,
                metric_b: 0x0B,
                heart_rate: 72,
                heart_rate_variability: 40,
                motion_level: 3,
                temperature: 300,
            })
        );
    }

    #[test]
    fn short_path_never_uses_extended_layout() {
        let s = decode(Some(SHORT_PATH), &extended_packet()).unwrap();
        assert!(!s.is_extended());
        assert_eq!(s.optical(), [i32::MAX, i32::MIN, -1]);
    }

    #[test]
    fn long_path_falls_back_to_compact_below_21_bytes() {
        let full = extended_packet();
        for len in COMPACT_PACKET_LEN..EXTENDED_PACKET_LEN {
            let s = decode(Some(LONG_PATH), &full[..len]).unwrap();
            assert!(!s.is_extended(), "len {len} should decode compact");
            assert_eq!(s.optical(), [i32::MAX, i32::MIN, -1]);
        }
    }

    #[test]
    fn too_short_is_malformed() {
        for (channel, len) in [(SHORT_PATH, 13), (LONG_PATH, 13), (LONG_PATH, 0)] {
            let err = decode(Some(channel), &SCENARIO[..len]).unwrap_err();
            assert_eq!(
                err,
                DecodeError::MalformedPacket {
                    channel: channel.into(),
                    expected: COMPACT_PACKET_LEN,
                    actual: len,
                }
            );
        }
    }

    #[test]
    fn missing_channel_is_unknown() {
        assert_eq!(
            decode(None, &SCENARIO),
            Err(DecodeError::UnknownChannel(None))
        );
    }

    #[test]
    fn unknown_handle_carries_source() {
        let err = decode_notification(&Registry::default(), &Source::Handle(999), &SCENARIO)
            .unwrap_err();
        assert_eq!(err, DecodeError::UnknownChannel(Some(Source::Handle(999))));
        assert!(err.to_string().contains("999"));
    }

    #[test]
    fn notification_resolves_then_decodes() {
        let s = decode_notification(&Registry::default(), &Source::Handle(31), &extended_packet())
            .unwrap();
        assert_eq!(s.channel, LONG_PATH);
        assert!(s.is_extended());
    }

    fn arb_metrics() -> impl Strategy<Value = ExtendedMetrics> {
        (any::<[u8; 5]>(), any::<u16>()).prop_map(|(b, temperature)| ExtendedMetrics {
            metric_a: b[0],
            metric_b: b[1],
            heart_rate: b[2],
            heart_rate_variability: b[3],
            motion_level: b[4],
            temperature,
        })
    }

    proptest! {
        #[test]
        fn compact_round_trip(
            p in any::<u8>(), s in any::<u8>(),
            c in any::<[i32; 3]>(),
            long in any::<bool>(),
        ) {
            let channel = if long { LONG_PATH } else { SHORT_PATH };
            let sample = Sample::compact(channel, p, s, c[0], c[1], c[2]);
            prop_assert_eq!(decode(Some(channel), &encode_sample(&sample)), Ok(sample));
        }

        #[test]
        fn extended_round_trip(
            p in any::<u8>(), s in any::<u8>(),
            c in any::<[i32; 3]>(),
            m in arb_metrics(),
        ) {
            let sample = Sample::compact(LONG_PATH, p, s, c[0], c[1], c[2]).with_metrics(m);
            prop_assert_eq!(decode(Some(LONG_PATH), &encode_sample(&sample)), Ok(sample));
        }

        #[test]
        fn never_panics(data in proptest::collection::vec(any::<u8>(), 0..64), long in any::<bool>()) {
            let channel = if long { LONG_PATH } else { SHORT_PATH };
            let _ = decode(Some(channel), &data);
        }
    }
}
