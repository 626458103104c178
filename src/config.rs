use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::monitor::DEFAULT_INTERVAL;
use crate::worker::DEFAULT_BATCH_SIZE;

/// Largest `-t` whose length in seconds still fits a `u64`.
pub const MAX_MINUTES: u64 = u64::MAX / 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProbeKind {
    /// Scrape the platform's `top` / `wmic` output
    Command,
    /// Read CPU counters in-process
    Native,
}

/// Saturate every core with busy work and watch CPU usage while it runs
#[derive(Debug, Parser)]
#[command(name = "cpu-stress", version, about)]
pub struct Args {
    /// Number of worker threads (defaults to the logical core count)
    #[arg(short = 'w', long = "workers")]
    pub workers: Option<usize>,

    /// Duration in minutes (0 means run until interrupted)
    #[arg(
        short = 't',
        long = "time",
        default_value_t = 0,
        value_parser = clap::value_parser!(u64).range(..=MAX_MINUTES)
    )]
    pub minutes: u64,

    /// Seconds between CPU usage samples
    #[arg(
        short = 'i',
        long = "interval",
        default_value_t = DEFAULT_INTERVAL.as_secs(),
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub interval_secs: u64,

    /// Where CPU usage readings come from
    #[arg(short = 'p', long = "probe", value_enum, default_value_t = ProbeKind::Command)]
    pub probe: ProbeKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub workers: usize,
    /// `None` runs until interrupted.
    pub duration: Option<Duration>,
    pub interval: Duration,
    pub batch_size: u64,
    pub probe: ProbeKind,
}

impl RunConfig {
    pub fn minutes(&self) -> Option<u64> {
        self.duration.map(|d| d.as_secs() / 60)
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            workers: num_cpus::get(),
            duration: None,
            interval: DEFAULT_INTERVAL,
            batch_size: DEFAULT_BATCH_SIZE,
            probe: ProbeKind::Command,
        }
    }
}

impl From<Args> for RunConfig {
    fn from(args: Args) -> Self {
        Self {
            workers: args.workers.unwrap_or_else(num_cpus::get),
            duration: (args.minutes > 0).then(|| Duration::from_secs(args.minutes * 60)),
            interval: Duration::from_secs(args.interval_secs),
            batch_size: DEFAULT_BATCH_SIZE,
            probe: args.probe,
        }
    }
}
