//! Host serial transport
//!
//! The probe pipeline talks to the host through [`SerialTransport`]: list the
//! ports, and open one exclusively as an async byte stream. Closing a port is
//! dropping its handle.

use std::io;

use serialport::{available_ports, ErrorKind};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::trace;

use crate::error::{OpenFailure, ProbeError};
use crate::port::PortDescriptor;

/// Access to the host's serial subsystem
pub trait SerialTransport {
    /// Open port handle; dropping it closes the port
    type Port: AsyncRead + AsyncWrite + Unpin;

    /// Enumerate all serial ports, paths as reported by the host
    fn available_ports(&self) -> Result<Vec<PortDescriptor>, ProbeError>;

    /// Open `path` with exclusive access
    ///
    /// Lock contention must be reported as [`OpenFailure::PortBusy`] so the
    /// caller can retry it.
    fn open(&self, path: &str, baud_rate: u32) -> Result<Self::Port, OpenFailure>;
}

/// Errno descriptions the host reports when another process holds the port
const LOCK_MARKERS: &[&str] = &["busy", "resource temporarily unavailable", "cannot lock"];

/// Real serial ports via `serialport` / `tokio-serial`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTransport;

impl SystemTransport {
    pub fn new() -> Self {
        Self
    }
}

impl SerialTransport for SystemTransport {
    type Port = SerialStream;

    fn available_ports(&self) -> Result<Vec<PortDescriptor>, ProbeError> {
        let ports = available_ports().map_err(|e| ProbeError::EnumerationFailed(e.to_string()))?;

        Ok(ports
            .into_iter()
            .map(|p| PortDescriptor::from_serialport(p.port_name, &p.port_type))
            .collect())
    }

    fn open(&self, path: &str, baud_rate: u32) -> Result<Self::Port, OpenFailure> {
        trace!("Opening {} at {} baud", path, baud_rate);

        let stream = tokio_serial::new(path, baud_rate)
            .open_native_async()
            .map_err(|e| classify_open_error(path, e))?;

        // serialport already opens with TIOCEXCL; keep it set explicitly
        #[cfg(unix)]
        let stream = {
            let mut stream = stream;
            stream
                .set_exclusive(true)
                .map_err(|e| classify_open_error(path, e))?;
            stream
        };

        Ok(stream)
    }
}

/// Split open failures into retryable lock contention and everything else
fn classify_open_error(path: &str, err: serialport::Error) -> OpenFailure {
    if is_lock_contention(&err) {
        OpenFailure::PortBusy(path.to_string())
    } else {
        OpenFailure::Device {
            port: path.to_string(),
            reason: err.to_string(),
        }
    }
}

fn is_lock_contention(err: &serialport::Error) -> bool {
    if matches!(err.kind, ErrorKind::Io(io::ErrorKind::WouldBlock)) {
        return true;
    }
    let description = err.description.to_ascii_lowercase();
    LOCK_MARKERS.iter().any(|marker| description.contains(marker))
}
