//! Connection and streaming lifecycle for one Blueberry device.
//!
//! ```text
//!   Idle ──run()──▶ Connecting ──subscribed──▶ Streaming
//!                     │   │                        │
//!                     │   └─subscribe error / stop─┤
//!                     │                            ▼
//!                     └──connect error──▶ Disconnected ◀── Stopping
//! ```
//!
//! A session runs on a single task: notification handling and the stop-flag
//! poll are interleaved with `tokio::select!`, so decoding and sink calls for
//! one session never run in parallel.  Stopping is cooperative: a
//! [`StopHandle::stop`] call is observed at the next poll tick (at most
//! [`SessionConfig::poll_interval`] later) or after the notification currently
//! being handled.
//!
//! Dropping a running `run()` future (for example by aborting its task) does
//! not leak the connection: the link is handed to a background task that
//! unsubscribes and disconnects, and the status still ends at
//! [`SessionStatus::Disconnected`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use log::{debug, info, warn};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use crate::error::{DecodeError, Error, Result};
use crate::parse::decode_notification;
use crate::protocol::DATA_CHANNEL_NAMES;
use crate::registry::Registry;
use crate::sink::SampleSink;
use crate::transport::{Link, Notification, Transport};
use crate::types::{EndReason, SessionStatus, SessionSummary};

/// Floor for [`SessionConfig::poll_interval`]; `tokio::time::interval`
/// rejects a zero period.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

// ── SessionConfig ─────────────────────────────────────────────────────────────

/// Configuration for [`StreamSession`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Device address handed to [`Transport::connect`].
    ///
    /// • Linux: Bluetooth MAC address (`AA:BB:CC:DD:EE:FF`)
    /// • macOS / Windows: platform peripheral identifier
    pub address: String,
    /// How often the stop flag is checked while no notification arrives.
    /// Upper bound on stop latency.  Default: 100 ms; values below 1 ms are
    /// raised to 1 ms.
    pub poll_interval: Duration,
    /// Channel table used to route notifications.  Default: the table for
    /// shipping Blueberry hardware; replace handles with
    /// [`Registry::with_handles`] for other device revisions.
    pub registry: Registry,
}

impl SessionConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            poll_interval: Duration::from_millis(100),
            registry: Registry::default(),
        }
    }
}

// ── StopHandle ────────────────────────────────────────────────────────────────

/// Cloneable handle for stopping and observing a [`StreamSession`] from
/// other tasks.
#[derive(Clone)]
pub struct StopHandle {
    stop: Arc<AtomicBool>,
    status: watch::Receiver<SessionStatus>,
}

impl StopHandle {
    /// Request the session to stop.
    ///
    /// Idempotent: returns `true` only for the call that actually raised the
    /// flag.  A stop raised while the session is connecting makes it unwind
    /// without entering [`SessionStatus::Streaming`]; a stop raised on a
    /// freshly constructed (idle) session cancels its first `run()`.  Once
    /// the session is stopping or disconnected the call is ignored, so it
    /// never leaks into a later `run()`.
    pub fn stop(&self) -> bool {
        let status = self.status();
        if matches!(status, SessionStatus::Stopping | SessionStatus::Disconnected) {
            debug!("Stop ignored; session is already {status:?}.");
            return false;
        }
        let first = !self.stop.swap(true, Ordering::SeqCst);
        if first {
            info!("Stop requested.");
        }
        first
    }

    /// `true` once a stop was requested and not yet consumed by `run()`.
    pub fn is_stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Current lifecycle state.
    pub fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    /// A receiver that is notified on every state change.
    pub fn subscribe_status(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }
}

// ── StreamSession ─────────────────────────────────────────────────────────────

/// Owns the link to one device and forwards decoded samples to a sink.
///
/// ```no_run
/// # use blueberry_rs::prelude::*;
/// # #[tokio::main]
/// # async fn main() -> anyhow::Result<()> {
/// let transport = BleTransport::new(BleTransportConfig::default());
/// let sink = |s: Sample| println!("{} {:?}", s.channel, s.optical());
/// let mut session = StreamSession::new(SessionConfig::new("AA:BB:CC:DD:EE:FF"), transport, sink);
///
/// let stop = session.stop_handle();
/// tokio::spawn(async move {
///     tokio::signal::ctrl_c().await.ok();
///     stop.stop();
/// });
///
/// let summary = session.run().await?;
/// println!("{} samples", summary.samples);
/// # Ok(())
/// # }
/// ```
pub struct StreamSession<T: Transport, S: SampleSink> {
    config: SessionConfig,
    transport: T,
    sink: S,
    stop: Arc<AtomicBool>,
    status: Arc<watch::Sender<SessionStatus>>,
}

impl<T: Transport, S: SampleSink> StreamSession<T, S> {
    pub fn new(config: SessionConfig, transport: T, sink: S) -> Self {
        let (status, _) = watch::channel(SessionStatus::Idle);
        Self {
            config,
            transport,
            sink,
            stop: Arc::new(AtomicBool::new(false)),
            status: Arc::new(status),
        }
    }

    /// Handle for stopping the session from another task.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            stop: Arc::clone(&self.stop),
            status: self.status.subscribe(),
        }
    }

    pub fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Consume the session and give the sink back (e.g. to flush a file).
    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Connect, subscribe to both data channels and stream until stopped or
    /// the link drops.
    ///
    /// Returns [`Error::Connection`] or [`Error::Subscription`] on lifecycle
    /// failures.  Per-notification decode errors are logged and counted in
    /// the returned [`SessionSummary`], never returned.  On every exit path
    /// the link is released and the status ends at
    /// [`SessionStatus::Disconnected`]; the stop flag is cleared so the
    /// session can be run again.
    pub async fn run(&mut self) -> Result<SessionSummary> {
        let mut teardown = Teardown::new(
            self.config.address.clone(),
            Arc::clone(&self.status),
            Arc::clone(&self.stop),
        );
        let result = self.connect_and_stream(&mut teardown).await;
        teardown.finish().await;
        match &result {
            Ok(summary) => info!(
                "{}: disconnected ({:?}); {} samples, {} unknown, {} malformed",
                self.config.address,
                summary.reason,
                summary.samples,
                summary.unknown_channel,
                summary.malformed
            ),
            Err(e) => warn!("{}: session ended with error: {e}", self.config.address),
        }
        result
    }

    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    fn set_status(&self, status: SessionStatus) {
        transition(&self.status, &self.config.address, status);
    }

    /// UUIDs of the streamed channels, in subscription order.
    fn data_channels(&self) -> Result<Vec<(&'static str, Uuid)>> {
        DATA_CHANNEL_NAMES
            .iter()
            .map(|&name| {
                self.config
                    .registry
                    .channel(name)
                    .map(|c| (name, c.stable_id))
                    .ok_or_else(|| Error::Subscription {
                        channel: name.to_owned(),
                        reason: "channel missing from registry".into(),
                    })
            })
            .collect()
    }

    async fn connect_and_stream(
        &mut self,
        teardown: &mut Teardown<T::Link>,
    ) -> Result<SessionSummary> {
        self.set_status(SessionStatus::Connecting);
        let address = self.config.address.clone();
        info!("Trying to connect to {address} …");

        let link = self.transport.connect(&address).await.map_err(|e| match e {
            Error::Connection(_) => e,
            other => Error::Connection(other.to_string()),
        })?;
        info!("Connected to {address}");

        let link = teardown.link.insert(link);
        self.stream(link, &mut teardown.subscribed).await
    }

    /// Subscribe and run the notification loop.  Every channel a subscribe
    /// was attempted on is pushed to `attempted` so teardown can undo it.
    async fn stream(
        &mut self,
        link: &mut T::Link,
        attempted: &mut Vec<(&'static str, Uuid)>,
    ) -> Result<SessionSummary> {
        let mut summary = SessionSummary {
            samples: 0,
            unknown_channel: 0,
            malformed: 0,
            reason: EndReason::Stopped,
        };

        let channels = self.data_channels()?;
        for (name, uuid) in channels {
            if self.stop_requested() {
                info!("Stop requested while connecting; not streaming.");
                return Ok(summary);
            }
            attempted.push((name, uuid));
            link.subscribe(uuid)
                .await
                .map_err(|e| Error::Subscription {
                    channel: name.to_owned(),
                    reason: e.to_string(),
                })?;
            debug!("Subscribed to {name} ({uuid})");
        }

        let mut notifications = link.notifications().await.map_err(|e| Error::Subscription {
            channel: "notifications".into(),
            reason: e.to_string(),
        })?;

        if self.stop_requested() {
            info!("Stop requested while connecting; not streaming.");
            return Ok(summary);
        }

        self.set_status(SessionStatus::Streaming);
        info!("Streaming from {}", self.config.address);

        let mut poll = tokio::time::interval(self.config.poll_interval.max(MIN_POLL_INTERVAL));
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut notif_count: u64 = 0;

        loop {
            tokio::select! {
                next = notifications.next() => match next {
                    Some(notif) => {
                        notif_count += 1;
                        if notif_count <= 3 || notif_count % 500 == 0 {
                            info!(
                                "notif #{notif_count} source={} len={}",
                                notif.source,
                                notif.value.len()
                            );
                        }
                        self.dispatch(notif, &mut summary);
                        if self.stop_requested() {
                            break;
                        }
                    }
                    None => {
                        warn!("Notification stream ended – device disconnected.");
                        summary.reason = EndReason::LinkLost;
                        break;
                    }
                },
                _ = poll.tick() => {
                    if self.stop_requested() {
                        break;
                    }
                }
            }
        }

        Ok(summary)
    }

    /// Resolve, decode and forward one notification.
    fn dispatch(&mut self, notif: Notification, summary: &mut SessionSummary) {
        match decode_notification(&self.config.registry, &notif.source, &notif.value) {
            Ok(sample) => {
                debug!("{}: {sample:?}", notif.source);
                summary.samples += 1;
                self.sink.on_sample(sample);
            }
            Err(e @ DecodeError::UnknownChannel(_)) => {
                summary.unknown_channel += 1;
                warn!("Dropping notification: {e}");
            }
            Err(e @ DecodeError::MalformedPacket { .. }) => {
                summary.malformed += 1;
                warn!("Dropping notification: {e}");
            }
        }
    }
}

fn transition(status: &watch::Sender<SessionStatus>, address: &str, next: SessionStatus) {
    let previous = status.send_replace(next);
    if previous != next {
        debug!("{address}: {previous:?} → {next:?}");
    }
}

/// Best-effort unsubscribe from every attempted channel, then disconnect.
async fn release<L: Link>(address: &str, link: &mut L, subscribed: &[(&'static str, Uuid)]) {
    for (name, uuid) in subscribed {
        if let Err(e) = link.unsubscribe(*uuid).await {
            warn!("{address}: unsubscribe from {name} failed: {e}");
        }
    }
    if let Err(e) = link.disconnect().await {
        warn!("{address}: disconnect failed: {e}");
    }
}

// ── Teardown ──────────────────────────────────────────────────────────────────

/// Owns the link for one `run()` invocation.
///
/// [`Teardown::finish`] releases it in line.  If the `run()` future is dropped
/// before that, `Drop` moves the link onto a background task that performs
/// the same release.
struct Teardown<L: Link + 'static> {
    address: String,
    link: Option<L>,
    subscribed: Vec<(&'static str, Uuid)>,
    status: Arc<watch::Sender<SessionStatus>>,
    stop: Arc<AtomicBool>,
    done: bool,
}

impl<L: Link + 'static> Teardown<L> {
    fn new(
        address: String,
        status: Arc<watch::Sender<SessionStatus>>,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            address,
            link: None,
            subscribed: Vec::new(),
            status,
            stop,
            done: false,
        }
    }

    async fn finish(&mut self) {
        if let Some(link) = self.link.as_mut() {
            transition(&self.status, &self.address, SessionStatus::Stopping);
            release(&self.address, link, &self.subscribed).await;
            self.link = None;
        }
        self.close();
    }

    /// Final transition; also clears the stop flag for the next `run()`.
    fn close(&mut self) {
        transition(&self.status, &self.address, SessionStatus::Disconnected);
        self.stop.store(false, Ordering::SeqCst);
        self.done = true;
    }
}

impl<L: Link + 'static> Drop for Teardown<L> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        let Some(mut link) = self.link.take() else {
            self.close();
            return;
        };
        transition(&self.status, &self.address, SessionStatus::Stopping);

        let address = std::mem::take(&mut self.address);
        let subscribed = std::mem::take(&mut self.subscribed);
        let status = Arc::clone(&self.status);
        let stop = Arc::clone(&self.stop);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                warn!("{address}: session dropped while connected; releasing link in background");
                runtime.spawn(async move {
                    release(&address, &mut link, &subscribed).await;
                    transition(&status, &address, SessionStatus::Disconnected);
                    stop.store(false, Ordering::SeqCst);
                });
            }
            Err(_) => {
                warn!("{address}: session dropped outside a runtime; link not disconnected");
                transition(&status, &address, SessionStatus::Disconnected);
                stop.store(false, Ordering::SeqCst);
            }
        }
    }
}
