//! In-memory transport for exercising the probe pipeline without hardware
//!
//! Each [`MockDevice`] is scripted: how many opens report the port as locked,
//! whether the open is refused outright, and what it answers once the probe
//! command arrives. The transport records every open attempt with its
//! timestamp and counts handles that have been closed.
//!
//! # Example
//!
//! ```rust
//! use sigprobe::mock::{MockDevice, MockTransport};
//! use sigprobe::PortDescriptor;
//!
//! let transport = MockTransport::new()
//!     .with_port(PortDescriptor::new("/dev/ttyUSB0"), MockDevice::replying(["OK"]))
//!     .with_port(PortDescriptor::new("/dev/ttyUSB1"), MockDevice::silent().locked_for(2));
//! ```

use std::collections::HashMap;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{duplex, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream, ReadBuf};
use tokio::time::Instant;
use tracing::trace;

use crate::error::{OpenFailure, ProbeError};
use crate::port::{normalize_port_path, PortDescriptor};
use crate::transport::SerialTransport;

const PIPE_CAPACITY: usize = 4096;

/// Scripted behavior of one virtual device
#[derive(Debug, Clone, Default)]
pub struct MockDevice {
    locked_for: u32,
    open_error: Option<String>,
    reply: Vec<Vec<u8>>,
    reply_delay: Duration,
}

impl MockDevice {
    /// Opens fine but never answers
    pub fn silent() -> Self {
        Self::default()
    }

    /// Answers the probe command with `chunks`, written one at a time
    pub fn replying<I, C>(chunks: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: AsRef<[u8]>,
    {
        Self {
            reply: chunks.into_iter().map(|c| c.as_ref().to_vec()).collect(),
            ..Self::default()
        }
    }

    /// Pause before each reply chunk
    pub fn with_reply_delay(mut self, delay: Duration) -> Self {
        self.reply_delay = delay;
        self
    }

    /// Report the port as locked for the next `attempts` opens
    pub fn locked_for(mut self, attempts: u32) -> Self {
        self.locked_for = attempts;
        self
    }

    /// Refuse every open with `reason`
    pub fn failing(mut self, reason: impl Into<String>) -> Self {
        self.open_error = Some(reason.into());
        self
    }
}

/// Open port on a [`MockTransport`]; counts itself as closed when dropped
#[derive(Debug)]
pub struct MockPort {
    path: String,
    pipe: DuplexStream,
    closed: Arc<AtomicUsize>,
}

impl MockPort {
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Drop for MockPort {
    fn drop(&mut self) {
        trace!("Mock port {} closed", self.path);
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

impl AsyncRead for MockPort {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().pipe).poll_read(cx, buf)
    }
}

impl AsyncWrite for MockPort {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().pipe).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().pipe).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().pipe).poll_shutdown(cx)
    }
}

#[derive(Debug, Clone)]
struct OpenAttempt {
    path: String,
    at: Instant,
}

/// Scripted serial subsystem
///
/// Opening a port spawns its device on the current tokio runtime.
#[derive(Debug, Default)]
pub struct MockTransport {
    ports: Vec<PortDescriptor>,
    devices: Mutex<HashMap<String, MockDevice>>,
    attempts: Mutex<Vec<OpenAttempt>>,
    closed: Arc<AtomicUsize>,
    enumeration_error: Option<String>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enumerate `port` and attach `device` behind it
    ///
    /// The device answers on the normalized path, the one the scanner opens.
    pub fn with_port(mut self, port: PortDescriptor, device: MockDevice) -> Self {
        let path = normalize_port_path(&port.path).into_owned();
        self.ports.push(port);
        self.with_device(path, device)
    }

    /// Attach `device` at `path` without enumerating it
    pub fn with_device(self, path: impl Into<String>, device: MockDevice) -> Self {
        lock(&self.devices).insert(path.into(), device);
        self
    }

    /// Make enumeration fail with `reason`
    pub fn failing_enumeration(mut self, reason: impl Into<String>) -> Self {
        self.enumeration_error = Some(reason.into());
        self
    }

    /// Timestamps of every open attempt on `path`
    pub fn open_attempts(&self, path: &str) -> Vec<Instant> {
        lock(&self.attempts)
            .iter()
            .filter(|a| a.path == path)
            .map(|a| a.at)
            .collect()
    }

    /// Paths opened so far, in attempt order
    pub fn opened_paths(&self) -> Vec<String> {
        lock(&self.attempts).iter().map(|a| a.path.clone()).collect()
    }

    /// Number of handles dropped so far
    pub fn closed_ports(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

impl SerialTransport for MockTransport {
    type Port = MockPort;

    fn available_ports(&self) -> Result<Vec<PortDescriptor>, ProbeError> {
        match &self.enumeration_error {
            Some(reason) => Err(ProbeError::EnumerationFailed(reason.clone())),
            None => Ok(self.ports.clone()),
        }
    }

    fn open(&self, path: &str, _baud_rate: u32) -> Result<Self::Port, OpenFailure> {
        lock(&self.attempts).push(OpenAttempt {
            path: path.to_string(),
            at: Instant::now(),
        });

        let mut devices = lock(&self.devices);
        let device = devices.get_mut(path).ok_or_else(|| OpenFailure::Device {
            port: path.to_string(),
            reason: "No such file or directory".to_string(),
        })?;

        if device.locked_for > 0 {
            device.locked_for -= 1;
            return Err(OpenFailure::PortBusy(path.to_string()));
        }
        if let Some(reason) = &device.open_error {
            return Err(OpenFailure::Device {
                port: path.to_string(),
                reason: reason.clone(),
            });
        }

        let (pipe, remote) = duplex(PIPE_CAPACITY);
        tokio::spawn(run_device(remote, device.reply.clone(), device.reply_delay));

        Ok(MockPort {
            path: path.to_string(),
            pipe,
            closed: Arc::clone(&self.closed),
        })
    }
}

/// Wait for the probe command, answer it, then hold the line until closed
async fn run_device(mut remote: DuplexStream, reply: Vec<Vec<u8>>, delay: Duration) {
    let mut buf = [0u8; 256];

    match remote.read(&mut buf).await {
        Ok(n) if n > 0 => {}
        _ => return,
    }

    for chunk in reply {
        tokio::time::sleep(delay).await;
        if remote.write_all(&chunk).await.is_err() {
            return;
        }
    }

    while let Ok(n) = remote.read(&mut buf).await {
        if n == 0 {
            break;
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
