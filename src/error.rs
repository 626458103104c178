use thiserror::Error;

/// Reasons a single utilization probe can fail.
///
/// None of these are fatal: the monitor renders the message and tries again on
/// the next tick.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProbeError {
    #[error("command failed: {0}")]
    CommandFailed(String),

    #[error("parse failed: {0}")]
    ParseFailed(String),

    #[error("unsupported operating system: {0}")]
    UnsupportedPlatform(String),
}

pub type ProbeResult<T> = std::result::Result<T, ProbeError>;
