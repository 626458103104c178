//! One-shot queries for aggregate CPU utilization.
//!
//! [`CommandProbe`] shells out to the platform's own monitoring tool and scrapes
//! its text output. [`SysinfoProbe`] asks the OS directly through `sysinfo`.
//! The monitor only sees the [`UsageProbe`] trait, so either can be swapped in.

use std::process::Command;
use std::sync::Mutex;

use sysinfo::System;

use crate::error::{ProbeError, ProbeResult};

pub trait UsageProbe: Send + Sync {
    /// Performs exactly one blocking query and returns a percentage.
    fn sample(&self) -> ProbeResult<f64>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Platform {
    MacOs,
    Linux,
    Windows,
    Other(String),
}

impl Platform {
    pub fn current() -> Self {
        Self::from_os(std::env::consts::OS)
    }

    pub fn from_os(os: &str) -> Self {
        match os {
            "macos" => Platform::MacOs,
            "linux" => Platform::Linux,
            "windows" => Platform::Windows,
            other => Platform::Other(other.to_string()),
        }
    }
}

/// Shells out to `top` or `wmic` depending on the platform.
pub struct CommandProbe {
    platform: Platform,
}

impl CommandProbe {
    pub fn new(platform: Platform) -> Self {
        Self { platform }
    }

    pub fn for_current_platform() -> Self {
        Self::new(Platform::current())
    }
}

impl UsageProbe for CommandProbe {
    fn sample(&self) -> ProbeResult<f64> {
        match &self.platform {
            Platform::MacOs => parse_macos(&run("top", &["-l", "1", "-n", "0", "-stats", "cpu"])?),
            Platform::Linux => parse_linux(&run("top", &["-bn", "1"])?),
            Platform::Windows => parse_windows(&run("wmic", &["cpu", "get", "LoadPercentage"])?),
            Platform::Other(os) => Err(ProbeError::UnsupportedPlatform(os.clone())),
        }
    }
}

fn run(program: &str, args: &[&str]) -> ProbeResult<String> {
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|e| ProbeError::CommandFailed(format!("{program}: {e}")))?;

    if !output.status.success() {
        return Err(ProbeError::CommandFailed(format!(
            "{program} exited with {}",
            output.status
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn parse_percent(token: &str) -> ProbeResult<f64> {
    let trimmed = token.trim_end_matches(',').trim_end_matches('%');
    trimmed
        .parse::<f64>()
        .map_err(|_| ProbeError::ParseFailed(format!("not a percentage: {token:?}")))
}

/// `CPU usage: 12.3% user, 4.5% sys, 83.2% idle` -> user + sys.
pub fn parse_macos(output: &str) -> ProbeResult<f64> {
    let line = output
        .lines()
        .find(|line| line.contains("CPU usage"))
        .ok_or_else(|| ProbeError::ParseFailed("no CPU usage line in top output".to_string()))?;

    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 5 {
        return Err(ProbeError::ParseFailed(format!("short CPU usage line: {line:?}")));
    }

    let user = parse_percent(fields[2])?;
    let sys = parse_percent(fields[4])?;
    Ok(user + sys)
}

/// `%Cpu(s): 23.4 us, ...` -> 23.4.
pub fn parse_linux(output: &str) -> ProbeResult<f64> {
    let line = output
        .lines()
        .find(|line| line.contains("%Cpu(s)"))
        .ok_or_else(|| ProbeError::ParseFailed("no %Cpu(s) line in top output".to_string()))?;

    // top drops the space after the label once the value reaches 100.0
    let values = line
        .split_once(':')
        .map(|(_, rest)| rest)
        .ok_or_else(|| ProbeError::ParseFailed(format!("malformed %Cpu(s) line: {line:?}")))?;

    let token = values
        .split_whitespace()
        .next()
        .ok_or_else(|| ProbeError::ParseFailed(format!("empty %Cpu(s) line: {line:?}")))?;

    parse_percent(token)
}

/// Header line, then the value. wmic likes to pad with blank lines.
pub fn parse_windows(output: &str) -> ProbeResult<f64> {
    let token = output
        .lines()
        .skip(1)
        .map(str::trim)
        .find(|line| !line.is_empty())
        .ok_or_else(|| ProbeError::ParseFailed("unexpected wmic output format".to_string()))?;

    parse_percent(token)
}

/// Reads the global CPU usage straight from the OS.
///
/// Usage is computed between two refreshes, so the first refresh happens at
/// construction and each call measures the time since the previous one.
pub struct SysinfoProbe {
    system: Mutex<System>,
}

impl SysinfoProbe {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_usage();
        Self {
            system: Mutex::new(system),
        }
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl UsageProbe for SysinfoProbe {
    fn sample(&self) -> ProbeResult<f64> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return Err(ProbeError::UnsupportedPlatform(
                std::env::consts::OS.to_string(),
            ));
        }

        let mut system = self
            .system
            .lock()
            .map_err(|_| ProbeError::CommandFailed("cpu sampler poisoned".to_string()))?;
        system.refresh_cpu_usage();

        let usage = f64::from(system.global_cpu_usage());
        if usage.is_finite() {
            Ok(usage)
        } else {
            Err(ProbeError::ParseFailed(format!("invalid cpu usage {usage}")))
        }
    }
}
