//! Error types for serial device probing

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while opening, probing, or scanning ports
#[derive(Debug, Error)]
pub enum ProbeError {
    /// Failed to enumerate serial ports
    #[error("failed to enumerate ports: {0}")]
    EnumerationFailed(String),

    /// Port stayed locked by another process for every attempt
    #[error("port {port} still locked after {attempts} attempts")]
    LockTimeout { port: String, attempts: u32 },

    /// Host rejected the open for a reason other than lock contention
    #[error("failed to open port {port}: {reason}")]
    OpenFailed { port: String, reason: String },

    /// Device did not produce the expected response before the deadline
    #[error("timeout waiting for {device} on {port}")]
    ProbeTimeout { device: String, port: String },

    /// I/O error during the probe exchange
    #[error("I/O error on {port}: {reason}")]
    Io { port: String, reason: String },
}

impl ProbeError {
    pub(crate) fn io(port: &str, err: io::Error) -> Self {
        Self::Io {
            port: port.to_string(),
            reason: err.to_string(),
        }
    }
}

/// Failure reported by a transport when opening a port
#[derive(Debug, Error)]
pub enum OpenFailure {
    /// Port busy or in use by another process
    #[error("port {0} is busy or in use")]
    PortBusy(String),

    /// Any other host-level refusal (permissions, missing device node, ...)
    #[error("failed to open port {port}: {reason}")]
    Device { port: String, reason: String },
}

/// Errors in a caller-supplied probe specification
#[derive(Debug, Error)]
pub enum SpecError {
    /// A filter pattern is not a valid regular expression
    #[error("invalid filter pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// The expected response is empty and would match any stream
    #[error("probe response must not be empty")]
    EmptyResponse,

    /// Baud rate of zero
    #[error("invalid baud rate: {0}")]
    InvalidBaudRate(u32),

    /// Malformed JSON
    #[error("failed to parse probe spec: {0}")]
    Parse(#[from] serde_json::Error),

    /// Spec file could not be read
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
