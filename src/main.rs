use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{error, info};

use blueberry_rs::prelude::*;
use blueberry_rs::protocol::encode_sample;

/// Stream fNIRS samples from Blueberry glasses into a CSV file.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Device address (MAC on Linux, peripheral id on macOS / Windows).
    #[arg(short, long, required_unless_present = "simulate")]
    address: Option<String>,

    /// Log every decoded packet.
    #[arg(short, long)]
    debug: bool,

    /// Stop after this many seconds (default: run until Ctrl-C or SIGTERM).
    #[arg(long)]
    duration: Option<u64>,

    /// CSV output path (default: `<unix-time>.csv`).
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Use a built-in signal generator instead of real hardware.
    #[arg(long)]
    simulate: bool,
}

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

// ── CSV sink ──────────────────────────────────────────────────────────────────

/// Writes one row per sample, stamped with the wall-clock arrival time.
struct CsvSink {
    out: BufWriter<File>,
    failed: bool,
}

impl CsvSink {
    const HEADER: &'static str =
        "timestamp,idx,path,c1,c2,c3,metric_a,metric_b,hr,hrv,ml,temperature";

    fn create(path: &Path) -> Result<Self> {
        let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        let mut out = BufWriter::new(file);
        writeln!(out, "{}", Self::HEADER)?;
        Ok(Self { out, failed: false })
    }

    fn write_row(&mut self, s: &Sample) -> std::io::Result<()> {
        write!(
            self.out,
            "{},{},{},{},{},{}",
            now_secs(),
            s.packet_index,
            s.channel,
            s.channel1,
            s.channel2,
            s.channel3
        )?;
        match &s.extended {
            Some(m) => writeln!(
                self.out,
                ",{},{},{},{},{},{}",
                m.metric_a,
                m.metric_b,
                m.heart_rate,
                m.heart_rate_variability,
                m.motion_level,
                m.temperature
            ),
            None => writeln!(self.out, ",,,,,,"),
        }
    }

    fn finish(mut self) -> std::io::Result<()> {
        self.out.flush()
    }
}

impl SampleSink for CsvSink {
    fn on_sample(&mut self, sample: Sample) {
        if let Err(e) = self.write_row(&sample) {
            // Report once; keep streaming so the session still tears down cleanly.
            if !self.failed {
                error!("CSV write failed: {e}");
                self.failed = true;
            }
        }
    }
}

// ── Simulator ─────────────────────────────────────────────────────────────────

/// Feed synthetic notifications into `transport` at 10 Hz per channel.
fn spawn_simulator(transport: MockTransport) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_millis(100));
        let mut n: u32 = 0;
        loop {
            tick.tick().await;
            let t = n as f64 / 10.0;
            let wave = |f: f64, a: f64| (a * (2.0 * std::f64::consts::PI * f * t).sin()) as i32;
            let idx = (n % 256) as u8;

            let short = Sample::compact(
                SHORT_PATH,
                idx,
                idx,
                100_000 + wave(1.1, 2_000.0),
                120_000 + wave(1.1, 2_500.0),
                110_000 + wave(1.1, 2_200.0),
            );
            transport.inject(SHORT_PATH_CHARACTERISTIC, encode_sample(&short));

            let long = Sample::compact(
                LONG_PATH,
                idx,
                idx,
                80_000 + wave(0.1, 800.0),
                95_000 + wave(0.1, 1_000.0),
                90_000 + wave(0.1, 900.0),
            )
            .with_metrics(ExtendedMetrics {
                metric_a: 40,
                metric_b: 60,
                heart_rate: (66.0 + 4.0 * (0.05 * t).sin()) as u8,
                heart_rate_variability: 45,
                motion_level: 0,
                temperature: 3_450,
            });
            transport.inject(LONG_PATH_CHARACTERISTIC, encode_sample(&long));

            n = n.wrapping_add(1);
        }
    });
}

// ── Shutdown signals ──────────────────────────────────────────────────────────

/// Process signals that end a recording: SIGINT and SIGTERM on Unix, Ctrl-C
/// elsewhere.
///
/// Handlers are registered in [`Shutdown::install`], so a signal arriving
/// before [`Shutdown::recv`] is polled is not lost.
struct Shutdown {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl Shutdown {
    #[cfg(unix)]
    fn install() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    #[cfg(not(unix))]
    fn install() -> std::io::Result<Self> {
        Ok(Self {})
    }

    /// Wait for the next signal and return its name.
    #[cfg(unix)]
    async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
        }
    }

    #[cfg(not(unix))]
    async fn recv(&mut self) -> &'static str {
        match tokio::signal::ctrl_c().await {
            Ok(()) => "Ctrl-C",
            Err(e) => {
                error!("Ctrl-C handler failed: {e}");
                std::future::pending().await
            }
        }
    }
}

// ── Main ──────────────────────────────────────────────────────────────────────

async fn stream<T: Transport>(
    config: SessionConfig,
    transport: T,
    sink: CsvSink,
    duration: Option<u64>,
) -> Result<()> {
    let mut session = StreamSession::new(config, transport, sink);

    let stop = session.stop_handle();
    let shutdown = match Shutdown::install() {
        Ok(s) => Some(s),
        Err(e) => {
            error!("Cannot install signal handlers: {e}");
            None
        }
    };
    tokio::spawn(async move {
        let signalled = async {
            match shutdown {
                Some(mut s) => s.recv().await,
                None => std::future::pending().await,
            }
        };
        let elapsed = async {
            match duration {
                Some(secs) => {
                    tokio::time::sleep(Duration::from_secs(secs)).await;
                    "duration elapsed"
                }
                None => std::future::pending().await,
            }
        };
        let why = tokio::select! {
            why = signalled => why,
            why = elapsed => why,
        };
        info!("{why}: quitting, but first must disconnect …");
        stop.stop();
    });

    let result = session.run().await;
    session.into_sink().finish()?;
    let summary = result?;
    info!(
        "{} samples written ({} unknown, {} malformed dropped)",
        summary.samples, summary.unknown_channel, summary.malformed
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // ── Logging ───────────────────────────────────────────────────────────────
    // RUST_LOG overrides the flag, e.g. RUST_LOG=blueberry_rs=trace.
    let level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    // ── Output ────────────────────────────────────────────────────────────────
    let path = args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(format!("{}.csv", now_secs())));
    let sink = CsvSink::create(&path)?;
    info!("Writing samples to {}", path.display());

    if args.simulate {
        let transport = MockTransport::new();
        spawn_simulator(transport.clone());
        return stream(SessionConfig::new("simulator"), transport, sink, args.duration).await;
    }

    let Some(address) = args.address else {
        bail!("--address is required");
    };
    stream(
        SessionConfig::new(address),
        BleTransport::default(),
        sink,
        args.duration,
    )
    .await
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sigterm_is_a_shutdown_signal() {
        let mut shutdown = Shutdown::install().unwrap();
        let status = std::process::Command::new("kill")
            .args(["-TERM", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());

        let got = tokio::time::timeout(Duration::from_secs(5), shutdown.recv())
            .await
            .expect("no signal received");
        assert_eq!(got, "SIGTERM");
    }
}
