//! Serial Device Signature Probing
//!
//! This crate finds a specific device among the serial ports on a host. A
//! [`ProbeSpec`] says which ports are worth trying, what to send, and what
//! the device must answer; the scanner opens each candidate exclusively
//! (waiting out other processes' locks), sends the probe, and keeps the ports
//! that answer.
//!
//! # Example
//!
//! ```rust,no_run
//! use sigprobe::{FilterGroup, PortField, PortScanner, ProbeSpec, SystemTransport};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let spec = ProbeSpec::new("Kenwood", 9600, "ID;", "ID019;")
//!     .with_filter_group(FilterGroup::new().with(PortField::Manufacturer, "^FTDI$")?);
//!
//! let scanner = PortScanner::new(SystemTransport::new());
//! for found in scanner.probe_all(&spec).await? {
//!     println!("{} on {}", found.prober, found.port.path);
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod mock;
pub mod opener;
pub mod port;
pub mod probe;
pub mod scanner;
pub mod session;
pub mod spec;
pub mod transport;

pub use error::{OpenFailure, ProbeError, SpecError};
pub use opener::{LockRetryOpener, RetryPolicy};
pub use port::{normalize_port_path, PortDescriptor, PortKind};
pub use probe::{BytePatternProber, ResponseMatcher};
pub use scanner::{PortScanner, ProbeConfig, ProbeResult};
pub use session::DeviceProbe;
pub use spec::{FieldPattern, FilterGroup, PortField, ProbeSpec};
pub use transport::{SerialTransport, SystemTransport};
