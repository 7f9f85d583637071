//! btleplug implementation of [`Transport`].
//!
//! Connect-by-address: the first Bluetooth adapter is scanned until a
//! peripheral whose platform id or MAC address equals the requested address
//! shows up, then the link is established with hard timeouts around
//! `connect()` and `discover_services()`.

use std::collections::BTreeSet;
use std::time::Duration;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use btleplug::api::{Central, Characteristic, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use log::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::protocol::FNIRS_SERVICE_UUID;
use crate::registry::Source;
use crate::transport::{Link, Notification, NotificationStream, Transport};

// ── BleTransportConfig ────────────────────────────────────────────────────────

/// Timeouts for [`BleTransport`].
#[derive(Debug, Clone)]
pub struct BleTransportConfig {
    /// How long to scan for the requested address before giving up.
    /// Default: `15`.
    pub scan_timeout_secs: u64,
    /// Hard limit on `connect()`.  BlueZ can block forever on an
    /// out-of-range device.  Default: `10`.
    pub connect_timeout_secs: u64,
    /// Hard limit on GATT service discovery.  Default: `15`.
    pub discover_timeout_secs: u64,
}

impl Default for BleTransportConfig {
    fn default() -> Self {
        Self {
            scan_timeout_secs: 15,
            connect_timeout_secs: 10,
            discover_timeout_secs: 15,
        }
    }
}

// ── BleTransport ──────────────────────────────────────────────────────────────

/// Bluetooth Low Energy transport backed by the platform stack
/// (BlueZ, CoreBluetooth or WinRT) through btleplug.
pub struct BleTransport {
    config: BleTransportConfig,
}

impl BleTransport {
    pub fn new(config: BleTransportConfig) -> Self {
        Self { config }
    }

    async fn first_adapter() -> anyhow::Result<Adapter> {
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No Bluetooth adapter found"))?;

        // CoreBluetooth starts in an "unknown" state and silently ignores
        // scans until it reports PoweredOn.
        #[cfg(target_os = "macos")]
        {
            use btleplug::api::CentralState;

            let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
            loop {
                match adapter.adapter_state().await {
                    Ok(CentralState::PoweredOn) => break,
                    Ok(state) if tokio::time::Instant::now() >= deadline => {
                        warn!("macOS: adapter still in state {state:?} after 3 s, proceeding anyway");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("macOS: adapter_state() error: {e}");
                        break;
                    }
                }
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            tokio::time::sleep(Duration::from_millis(300)).await;
        }

        Ok(adapter)
    }

    /// Poll the adapter until a peripheral matching `address` appears or the
    /// scan timeout expires.
    async fn find_peripheral(&self, adapter: &Adapter, address: &str) -> anyhow::Result<Peripheral> {
        use tokio::time::{sleep, timeout};

        let timeout_secs = self.config.scan_timeout_secs;
        let result = timeout(Duration::from_secs(timeout_secs), async {
            loop {
                for p in adapter.peripherals().await.unwrap_or_default() {
                    if peripheral_matches(&p, address) {
                        return p;
                    }
                }
                sleep(Duration::from_millis(250)).await;
            }
        })
        .await;

        result.map_err(|_| anyhow!("No device with address {address} found after {timeout_secs} s"))
    }

    async fn establish(&self, address: &str) -> anyhow::Result<BleLink> {
        let adapter = Self::first_adapter().await?;

        info!("Scanning for {address} (timeout: {} s) …", self.config.scan_timeout_secs);
        adapter.start_scan(ScanFilter::default()).await?;
        let found = self.find_peripheral(&adapter, address).await;
        adapter.stop_scan().await.ok();
        let peripheral = found?;

        tokio::time::timeout(
            Duration::from_secs(self.config.connect_timeout_secs),
            peripheral.connect(),
        )
        .await
        .map_err(|_| anyhow!("BLE connect() timed out after {} s", self.config.connect_timeout_secs))?
        .context("BLE connect() failed")?;

        // BlueZ reports the connection before the remote GATT cache is filled;
        // discovering too early returns an empty characteristic set.
        #[cfg(target_os = "linux")]
        tokio::time::sleep(Duration::from_millis(600)).await;

        tokio::time::timeout(
            Duration::from_secs(self.config.discover_timeout_secs),
            peripheral.discover_services(),
        )
        .await
        .map_err(|_| {
            anyhow!("discover_services() timed out after {} s", self.config.discover_timeout_secs)
        })??;

        if !peripheral.services().iter().any(|s| s.uuid == FNIRS_SERVICE_UUID) {
            warn!("{address}: fNIRS service {FNIRS_SERVICE_UUID} not advertised; trying anyway");
        }

        Ok(BleLink { peripheral })
    }
}

impl Default for BleTransport {
    fn default() -> Self {
        Self::new(BleTransportConfig::default())
    }
}

fn peripheral_matches(p: &Peripheral, address: &str) -> bool {
    p.id().to_string().eq_ignore_ascii_case(address)
        || p.address().to_string().eq_ignore_ascii_case(address)
}

#[async_trait]
impl Transport for BleTransport {
    type Link = BleLink;

    async fn connect(&self, address: &str) -> Result<BleLink> {
        self.establish(address)
            .await
            .map_err(|e| Error::Connection(format!("{e:#}")))
    }
}

// ── BleLink ───────────────────────────────────────────────────────────────────

/// A connected peripheral.
pub struct BleLink {
    peripheral: Peripheral,
}

impl BleLink {
    fn find_char(&self, uuid: Uuid) -> Result<Characteristic> {
        let chars: BTreeSet<Characteristic> = self.peripheral.characteristics();
        chars
            .into_iter()
            .find(|c| c.uuid == uuid)
            .ok_or_else(|| Error::Transport(format!("Characteristic {uuid} not found")))
    }
}

#[async_trait]
impl Link for BleLink {
    async fn subscribe(&mut self, characteristic: Uuid) -> Result<()> {
        let c = self.find_char(characteristic)?;
        self.peripheral
            .subscribe(&c)
            .await
            .map_err(|e| Error::Transport(e.to_string()))
    }

    async fn unsubscribe(&mut self, characteristic: Uuid) -> Result<()> {
        let c = self.find_char(characteristic)?;
        self.peripheral
            .unsubscribe(&c)
            .await
            .map_err(|e| Error::Transport(e.to_string()))
    }

    async fn notifications(&mut self) -> Result<NotificationStream> {
        let stream = self
            .peripheral
            .notifications()
            .await
            .map_err(|e| Error::Transport(format!("could not get notifications stream: {e}")))?;
        debug!("Notification stream opened");
        Ok(stream
            .map(|n| Notification {
                source: Source::from(n.uuid),
                value: n.value,
            })
            .boxed())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.peripheral
            .disconnect()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;
        info!("Blueberry disconnected.");
        Ok(())
    }
}
