//! Single-device probe session
//!
//! [`DeviceProbe`] binds a transport to one [`ProbeSpec`]. It can open and
//! validate a specific port, holding the handle until the caller takes or
//! closes it, or scan every matching port on the host.

use tracing::debug;

use crate::error::{ProbeError, SpecError};
use crate::port::{normalize_port_path, PortDescriptor};
use crate::scanner::{PortScanner, ProbeConfig, ProbeResult};
use crate::spec::ProbeSpec;
use crate::transport::SerialTransport;

/// Open port held by a [`DeviceProbe`]
struct OpenPort<P> {
    path: String,
    handle: P,
}

/// Opens and validates devices matching one probe spec
pub struct DeviceProbe<T: SerialTransport> {
    scanner: PortScanner<T>,
    spec: ProbeSpec,
    open: Option<OpenPort<T::Port>>,
}

impl<T: SerialTransport> DeviceProbe<T> {
    /// Create a probe with default timing; the spec is validated first
    pub fn new(transport: T, spec: ProbeSpec) -> Result<Self, SpecError> {
        Self::with_config(transport, spec, ProbeConfig::default())
    }

    pub fn with_config(transport: T, spec: ProbeSpec, config: ProbeConfig) -> Result<Self, SpecError> {
        spec.validate()?;
        Ok(Self {
            scanner: PortScanner::with_config(transport, config),
            spec,
            open: None,
        })
    }

    pub fn spec(&self) -> &ProbeSpec {
        &self.spec
    }

    pub fn scanner(&self) -> &PortScanner<T> {
        &self.scanner
    }

    /// Open `path` and confirm the expected device answers
    ///
    /// Any port already held is closed first. On failure nothing is held.
    pub async fn open(&mut self, path: &str) -> Result<&mut T::Port, ProbeError> {
        self.close();

        let path = normalize_port_path(path).into_owned();
        let handle = self.scanner.open_and_probe(&self.spec, &path).await?;

        let open = self.open.insert(OpenPort { path, handle });
        Ok(&mut open.handle)
    }

    /// Close the held port, if any
    pub fn close(&mut self) {
        if let Some(open) = self.open.take() {
            debug!("Closing {}", open.path);
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    /// Path of the held port
    pub fn path(&self) -> Option<&str> {
        self.open.as_ref().map(|open| open.path.as_str())
    }

    pub fn port_mut(&mut self) -> Option<&mut T::Port> {
        self.open.as_mut().map(|open| &mut open.handle)
    }

    /// Hand the held port over to the caller
    pub fn take_port(&mut self) -> Option<T::Port> {
        self.open.take().map(|open| open.handle)
    }

    /// Matching ports on the host, without opening them
    pub fn candidates(&self) -> Result<Vec<PortDescriptor>, ProbeError> {
        self.scanner.candidates(&self.spec)
    }

    /// Probe every matching port; see [`PortScanner::probe_all`]
    pub async fn probe_all(&self) -> Result<Vec<ProbeResult<T::Port>>, ProbeError> {
        self.scanner.probe_all(&self.spec).await
    }
}
