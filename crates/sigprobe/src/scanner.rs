//! Serial port scanner
//!
//! This module enumerates serial ports, filters them against a probe spec,
//! and runs open-then-probe on each candidate in turn.

use std::time::Duration;

use tracing::{debug, info};

use crate::error::ProbeError;
use crate::opener::{LockRetryOpener, RetryPolicy};
use crate::port::PortDescriptor;
use crate::probe::{BytePatternProber, DEFAULT_PROBE_TIMEOUT};
use crate::spec::ProbeSpec;
use crate::transport::SerialTransport;

/// Timing for opening and probing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeConfig {
    /// Lock-contention retry schedule
    pub retry: RetryPolicy,
    /// Deadline for the probe response
    pub probe_timeout: Duration,
    /// Log inbound probe traffic at debug level
    pub debug: bool,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            debug: false,
        }
    }
}

/// A port that answered the probe, with its open handle
#[derive(Debug)]
pub struct ProbeResult<P> {
    /// Name of the spec that identified the device
    pub prober: String,
    /// Port metadata, path normalized
    pub port: PortDescriptor,
    /// Open handle, now owned by the caller
    pub handle: P,
}

/// Serial port scanner
pub struct PortScanner<T> {
    transport: T,
    opener: LockRetryOpener,
    config: ProbeConfig,
}

impl<T: SerialTransport> PortScanner<T> {
    /// Create a scanner with default timing
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, ProbeConfig::default())
    }

    /// Create a scanner with custom timing
    pub fn with_config(transport: T, config: ProbeConfig) -> Self {
        Self {
            transport,
            opener: LockRetryOpener::new(config.retry),
            config,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Enumerate all serial ports, paths normalized
    pub fn list_ports(&self) -> Result<Vec<PortDescriptor>, ProbeError> {
        info!("Enumerating serial ports...");
        let ports: Vec<_> = self
            .transport
            .available_ports()?
            .into_iter()
            .map(PortDescriptor::normalized)
            .collect();

        if ports.is_empty() {
            info!("No serial ports found");
        } else {
            info!("Found {} serial port(s)", ports.len());
            for port in &ports {
                let desc = port.product.as_deref().unwrap_or("Unknown");
                info!("  {} - {}", port.path, desc);
            }
        }

        Ok(ports)
    }

    /// Ports that pass the spec's filter, in enumeration order, without opening any
    pub fn candidates(&self, spec: &ProbeSpec) -> Result<Vec<PortDescriptor>, ProbeError> {
        Ok(self
            .list_ports()?
            .into_iter()
            .filter(|port| {
                let accepted = spec.accepts(port);
                if !accepted {
                    debug!("{} does not match the {} filter", port.path, spec.name);
                }
                accepted
            })
            .collect())
    }

    /// Open `path` and confirm the device answers the probe
    ///
    /// The handle is closed before any probe failure is returned.
    pub async fn open_and_probe(&self, spec: &ProbeSpec, path: &str) -> Result<T::Port, ProbeError> {
        let mut port = self.opener.open(&self.transport, path, spec.baud_rate).await?;

        let prober = BytePatternProber::from_spec(spec)
            .with_timeout(self.config.probe_timeout)
            .with_debug(self.config.debug);

        match prober.probe(&mut port, &spec.name, path).await {
            Ok(()) => {
                info!("Identified {} on {}", spec.name, path);
                Ok(port)
            }
            Err(e) => {
                drop(port);
                debug!("Closed {} after failed probe", path);
                Err(e)
            }
        }
    }

    /// Probe every matching port, one at a time
    ///
    /// Ports that are locked, refuse to open, or do not answer are left out.
    /// Only a failure to enumerate is returned as an error.
    pub async fn probe_all(&self, spec: &ProbeSpec) -> Result<Vec<ProbeResult<T::Port>>, ProbeError> {
        let candidates = self.candidates(spec)?;
        debug!("{} candidate port(s) for {}", candidates.len(), spec.name);

        let mut results = Vec::new();
        for port in candidates {
            match self.open_and_probe(spec, &port.path).await {
                Ok(handle) => results.push(ProbeResult {
                    prober: spec.name.clone(),
                    port,
                    handle,
                }),
                Err(e) => debug!("Skipping {}: {}", port.path, e),
            }
        }

        info!("Found {} {} device(s)", results.len(), spec.name);
        Ok(results)
    }
}
