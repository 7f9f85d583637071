//! In-memory transport for tests and the `--simulate` mode of the CLI.
//!
//! A [`MockTransport`] is cheap to clone; all clones share one state, so a
//! test can keep a clone to inject notifications and inspect the calls the
//! session made after handing the other clone to the session.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::{Link, Notification, NotificationStream, Transport};
use crate::error::{Error, Result};
use crate::registry::Source;

/// One call the session made on the transport or its link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Connect(String),
    Subscribe(Uuid),
    Unsubscribe(Uuid),
    Notifications,
    Disconnect,
}

struct MockTransportInner {
    calls: Vec<MockCall>,
    connect_delay: Duration,
    fail_connect: bool,
    fail_subscribe: HashSet<Uuid>,
    fail_unsubscribe: bool,
    tx: Option<mpsc::UnboundedSender<Notification>>,
    rx: Option<mpsc::UnboundedReceiver<Notification>>,
}

impl MockTransportInner {
    /// Open a fresh notification channel unless an unconsumed one exists.
    fn ensure_channel(&mut self) {
        if self.rx.is_none() {
            let (tx, rx) = mpsc::unbounded_channel();
            self.tx = Some(tx);
            self.rx = Some(rx);
        }
    }
}

/// Scriptable transport.
#[derive(Clone)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

impl MockTransport {
    /// Create a transport that connects instantly and accepts every call.
    pub fn new() -> Self {
        let mut inner = MockTransportInner {
            calls: Vec::new(),
            connect_delay: Duration::ZERO,
            fail_connect: false,
            fail_subscribe: HashSet::new(),
            fail_unsubscribe: false,
            tx: None,
            rx: None,
        };
        inner.ensure_channel();
        MockTransport {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    fn inner(&self) -> MutexGuard<'_, MockTransportInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Delay every `connect()` by `delay`.
    pub fn with_connect_delay(self, delay: Duration) -> Self {
        self.inner().connect_delay = delay;
        self
    }

    /// Make `connect()` fail.
    pub fn failing_connect(self) -> Self {
        self.inner().fail_connect = true;
        self
    }

    /// Make `subscribe()` fail for `characteristic`.
    pub fn failing_subscribe(self, characteristic: Uuid) -> Self {
        self.inner().fail_subscribe.insert(characteristic);
        self
    }

    /// Make every `unsubscribe()` fail.
    pub fn failing_unsubscribe(self) -> Self {
        self.inner().fail_unsubscribe = true;
        self
    }

    /// Queue a notification on the current link.  Notifications injected
    /// before the session asks for its stream are buffered and delivered in
    /// order.
    pub fn inject(&self, source: impl Into<Source>, value: impl Into<Vec<u8>>) {
        if let Some(tx) = &self.inner().tx {
            let _ = tx.send(Notification::new(source, value));
        }
    }

    /// Simulate the device dropping the link: the notification stream ends
    /// once the queued notifications are drained.
    pub fn drop_link(&self) {
        self.inner().tx = None;
    }

    /// Every call made so far.
    pub fn calls(&self) -> Vec<MockCall> {
        self.inner().calls.clone()
    }

    /// Number of recorded calls equal to `call`.
    pub fn count(&self, call: &MockCall) -> usize {
        self.inner().calls.iter().filter(|c| *c == call).count()
    }

    fn record(&self, call: MockCall) {
        self.inner().calls.push(call);
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Link = MockLink;

    async fn connect(&self, address: &str) -> Result<MockLink> {
        self.record(MockCall::Connect(address.to_owned()));
        let (delay, fail) = {
            let inner = self.inner();
            (inner.connect_delay, inner.fail_connect)
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(Error::Connection(format!("mock: no device at {address}")));
        }
        self.inner().ensure_channel();
        Ok(MockLink {
            transport: self.clone(),
        })
    }
}

/// Link handed out by [`MockTransport::connect`].
pub struct MockLink {
    transport: MockTransport,
}

#[async_trait]
impl Link for MockLink {
    async fn subscribe(&mut self, characteristic: Uuid) -> Result<()> {
        self.transport.record(MockCall::Subscribe(characteristic));
        if self.transport.inner().fail_subscribe.contains(&characteristic) {
            return Err(Error::Transport(format!(
                "mock: subscribe to {characteristic} refused"
            )));
        }
        Ok(())
    }

    async fn unsubscribe(&mut self, characteristic: Uuid) -> Result<()> {
        self.transport.record(MockCall::Unsubscribe(characteristic));
        if self.transport.inner().fail_unsubscribe {
            return Err(Error::Transport(format!(
                "mock: unsubscribe from {characteristic} refused"
            )));
        }
        Ok(())
    }

    async fn notifications(&mut self) -> Result<NotificationStream> {
        self.transport.record(MockCall::Notifications);
        let rx = self
            .transport
            .inner()
            .rx
            .take()
            .ok_or_else(|| Error::Transport("mock: notification stream already taken".into()))?;
        Ok(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|n| (n, rx))
        })
        .boxed())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.transport.record(MockCall::Disconnect);
        Ok(())
    }
}
