use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use tokio::task;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::error::{ProbeError, ProbeResult};
use crate::probe::UsageProbe;
use crate::shutdown::ShutdownSignal;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(2);

/// How samples are laid out on the output sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Rewrite one status line in place with a carriage return.
    Overwrite,
    /// One line per sample, for sinks that are not a terminal.
    Lines,
}

impl RenderMode {
    pub fn for_terminal(is_terminal: bool) -> Self {
        if is_terminal {
            RenderMode::Overwrite
        } else {
            RenderMode::Lines
        }
    }
}

pub struct Display<W> {
    out: W,
    mode: RenderMode,
    dirty: bool,
}

impl<W: Write> Display<W> {
    pub fn new(out: W, mode: RenderMode) -> Self {
        Self {
            out,
            mode,
            dirty: false,
        }
    }

    pub fn render(&mut self, sample: &ProbeResult<f64>) -> io::Result<()> {
        match (self.mode, sample) {
            (RenderMode::Overwrite, Ok(usage)) => {
                write!(self.out, "\rCPU Usage: {usage:.1}%          ")?
            }
            (RenderMode::Overwrite, Err(err)) => {
                write!(self.out, "\rError getting CPU info: {err}                      ")?
            }
            (RenderMode::Lines, Ok(usage)) => writeln!(self.out, "CPU Usage: {usage:.1}%")?,
            (RenderMode::Lines, Err(err)) => writeln!(self.out, "Error getting CPU info: {err}")?,
        }
        self.dirty = self.mode == RenderMode::Overwrite;
        self.out.flush()
    }

    /// Ends an in-place status line so whatever is printed next starts clean.
    pub fn finish(&mut self) -> io::Result<()> {
        if self.dirty {
            writeln!(self.out)?;
            self.dirty = false;
        }
        self.out.flush()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorStats {
    pub ticks: u64,
    pub successes: u64,
    pub failures: u64,
}

/// Samples CPU usage on a fixed interval and renders each result.
pub struct Monitor<W> {
    probe: Arc<dyn UsageProbe>,
    display: Display<W>,
    interval: Duration,
}

impl<W: Write> Monitor<W> {
    pub fn new(probe: Arc<dyn UsageProbe>, display: Display<W>, interval: Duration) -> Self {
        Self {
            probe,
            display,
            interval,
        }
    }

    pub async fn run(mut self, signal: ShutdownSignal) -> MonitorStats {
        let mut stats = MonitorStats::default();

        // Ticks land on start + k * interval. A probe that overruns a boundary
        // skips it instead of queueing a burst of catch-up ticks.
        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = signal.cancelled() => break,
                _ = ticker.tick() => {}
            }

            // The probe blocks, possibly for a long time. Race it against the
            // signal so a hung command cannot hold up shutdown.
            let probe = Arc::clone(&self.probe);
            let sample = tokio::select! {
                biased;
                _ = signal.cancelled() => break,
                joined = task::spawn_blocking(move || probe.sample()) => {
                    joined.unwrap_or_else(|e| Err(ProbeError::CommandFailed(format!("probe task aborted: {e}"))))
                }
            };

            stats.ticks += 1;
            match &sample {
                Ok(usage) => {
                    stats.successes += 1;
                    debug!(usage, "cpu sample");
                }
                Err(err) => {
                    stats.failures += 1;
                    debug!(error = %err, "cpu sample failed");
                }
            }

            if let Err(e) = self.display.render(&sample) {
                warn!(error = %e, "failed to render cpu usage");
            }
        }

        if let Err(e) = self.display.finish() {
            warn!(error = %e, "failed to finish cpu usage display");
        }
        stats
    }
}
