/// Derived physiological metrics packed into long-path notifications.
///
/// Only present when the firmware sends the 21-byte extended layout.  None of
/// these values are scaled or corrected; they are passed through exactly as
/// the glasses computed them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExtendedMetrics {
    /// First opaque metric byte.
    ///
    /// PTT mean amplitude on the fNIRS firmware, systolic pressure on the
    /// blood-pressure firmware.  Interpretation depends on the firmware
    /// build, so it is not named after either.
    pub metric_a: u8,
    /// Second opaque metric byte (PTT ratio, or diastolic pressure).
    pub metric_b: u8,
    /// Heart rate as reported by the firmware.
    pub heart_rate: u8,
    /// Heart-rate variability as reported by the firmware.
    pub heart_rate_variability: u8,
    /// Motion level (accelerometer activity index).
    pub motion_level: u8,
    /// Raw temperature reading.
    pub temperature: u16,
}

/// One decoded fNIRS notification.
///
/// Built by [`crate::parse::decode`] and handed straight to the
/// [`crate::sink::SampleSink`]; the session keeps no reference to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    /// Resolved channel name (`"short_path"` or `"long_path"`).
    pub channel: String,
    /// Packet counter, wraps at 256.
    pub packet_index: u8,
    /// Sample counter within the acquisition, wraps at 256.
    pub sample_index: u8,
    /// 740 nm optical reading.
    pub channel1: i32,
    /// 880 nm optical reading.
    pub channel2: i32,
    /// 850 nm optical reading.
    pub channel3: i32,
    /// Extra metrics, `Some` only for extended long-path packets.
    pub extended: Option<ExtendedMetrics>,
}

impl Sample {
    /// Build a compact (non-extended) sample.
    pub fn compact(
        channel: impl Into<String>,
        packet_index: u8,
        sample_index: u8,
        channel1: i32,
        channel2: i32,
        channel3: i32,
    ) -> Self {
        Self {
            channel: channel.into(),
            packet_index,
            sample_index,
            channel1,
            channel2,
            channel3,
            extended: None,
        }
    }

    /// Attach extended metrics, turning this into an extended sample.
    pub fn with_metrics(mut self, metrics: ExtendedMetrics) -> Self {
        self.extended = Some(metrics);
        self
    }

    /// `true` if the extended metrics were packed into this notification.
    pub fn is_extended(&self) -> bool {
        self.extended.is_some()
    }

    /// The three optical readings in wavelength order (740, 880, 850 nm).
    pub fn optical(&self) -> [i32; 3] {
        [self.channel1, self.channel2, self.channel3]
    }
}

/// Lifecycle state of a [`crate::session::StreamSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Constructed, `run()` not started.
    Idle,
    /// Waiting for the transport to establish the link.
    Connecting,
    /// Both data channels subscribed, notifications flowing.
    Streaming,
    /// Unsubscribing and releasing the link.
    Stopping,
    /// Link released.  Reached exactly once per `run()`.
    Disconnected,
}

/// Why a successful `run()` ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// A stop was requested through a [`crate::session::StopHandle`].
    Stopped,
    /// The notification stream closed (device off or out of range).
    LinkLost,
}

/// Counters reported when a `run()` invocation completes without a
/// lifecycle error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    /// Samples forwarded to the sink.
    pub samples: u64,
    /// Notifications dropped because their source matched no channel.
    pub unknown_channel: u64,
    /// Notifications dropped because they were too short.
    pub malformed: u64,
    /// Whether the run ended on request or because the link went away.
    pub reason: EndReason,
}
