//! Byte-pattern probing
//!
//! This module sends a fixed command to an open port and waits for a
//! fixed response to show up in what comes back. The transport may split
//! the reply arbitrarily, so the response is searched for across
//! everything received so far rather than chunk by chunk.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, trace};

use crate::error::ProbeError;
use crate::spec::ProbeSpec;

/// Deadline for the expected response, measured from before the write
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(500);

/// Accumulates inbound bytes and reports when a pattern first appears
#[derive(Debug)]
pub struct ResponseMatcher<'a> {
    pattern: &'a [u8],
    buffer: Vec<u8>,
    /// Bytes of `buffer` already searched
    searched: usize,
}

impl<'a> ResponseMatcher<'a> {
    pub fn new(pattern: &'a [u8]) -> Self {
        Self {
            pattern,
            buffer: Vec::new(),
            searched: 0,
        }
    }

    /// Append a chunk; `true` once the pattern occurs anywhere in the buffer
    pub fn push(&mut self, chunk: &[u8]) -> bool {
        self.buffer.extend_from_slice(chunk);

        let len = self.pattern.len();
        if len == 0 {
            return true;
        }
        if self.buffer.len() < len {
            return false;
        }

        // Only windows that end in the new bytes need checking
        let start = self.searched.saturating_sub(len - 1);
        self.searched = self.buffer.len();
        self.buffer[start..]
            .windows(len)
            .any(|window| window == self.pattern)
    }

    /// Everything received so far, in arrival order
    pub fn received(&self) -> &[u8] {
        &self.buffer
    }
}

/// Sends one probe command and waits for the response pattern
#[derive(Debug, Clone)]
pub struct BytePatternProber {
    command: Vec<u8>,
    response: Vec<u8>,
    timeout: Duration,
    debug: bool,
}

impl BytePatternProber {
    pub fn new(command: impl Into<Vec<u8>>, response: impl Into<Vec<u8>>) -> Self {
        Self {
            command: command.into(),
            response: response.into(),
            timeout: DEFAULT_PROBE_TIMEOUT,
            debug: false,
        }
    }

    pub fn from_spec(spec: &ProbeSpec) -> Self {
        Self::new(spec.probe_cmd.clone(), spec.probe_rsp.clone())
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Log every inbound chunk at debug level instead of trace
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Probe an open stream
    ///
    /// `device` and `port` only label the timeout error. The deadline is
    /// dropped together with the exchange as soon as the pattern matches.
    pub async fn probe<S>(&self, stream: &mut S, device: &str, port: &str) -> Result<(), ProbeError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let deadline = Instant::now() + self.timeout;

        match timeout_at(deadline, self.exchange(stream, port)).await {
            Ok(result) => result,
            Err(_) => {
                debug!("No {} response on {} within {:?}", device, port, self.timeout);
                Err(ProbeError::ProbeTimeout {
                    device: device.to_string(),
                    port: port.to_string(),
                })
            }
        }
    }

    async fn exchange<S>(&self, stream: &mut S, port: &str) -> Result<(), ProbeError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        trace!("Sending probe to {}: {:02X?}", port, self.command);
        stream
            .write_all(&self.command)
            .await
            .map_err(|e| ProbeError::io(port, e))?;
        stream.flush().await.map_err(|e| ProbeError::io(port, e))?;

        // An empty pattern is already present in an empty reply
        if self.response.is_empty() {
            return Ok(());
        }

        let mut matcher = ResponseMatcher::new(&self.response);
        let mut buf = [0u8; 256];

        loop {
            let n = stream
                .read(&mut buf)
                .await
                .map_err(|e| ProbeError::io(port, e))?;

            if n == 0 {
                // A closed stream is a silent device; let the deadline decide
                trace!("{} reached end of stream", port);
                return std::future::pending().await;
            }

            let chunk = &buf[..n];
            if self.debug {
                debug!("{} <- {:02X?}", port, chunk);
            } else {
                trace!("{} <- {:02X?}", port, chunk);
            }

            if matcher.push(chunk) {
                trace!(
                    "Matched response on {} after {} bytes",
                    port,
                    matcher.received().len()
                );
                return Ok(());
            }
        }
    }
}
