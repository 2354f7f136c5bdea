//! Serial port metadata as reported by the host

use std::borrow::Cow;

use serde::Serialize;
use serialport::SerialPortType;

use crate::spec::PortField;

/// Prefix of the macOS call-in device nodes, which block until carrier detect
const CALL_IN_PREFIX: &str = "/dev/tty.";
/// Prefix of the matching call-out nodes, which open immediately
const CALL_OUT_PREFIX: &str = "/dev/cu.";

/// Rewrite a wait-for-carrier USB serial path to its always-open twin.
///
/// `/dev/tty.usbserial-A1` and `/dev/cu.usbserial-A1` name the same
/// physical port; only the latter opens without a carrier signal. Any
/// other path is returned unchanged.
pub fn normalize_port_path(path: &str) -> Cow<'_, str> {
    match path.strip_prefix(CALL_IN_PREFIX) {
        Some(rest) if rest.starts_with("usb") => Cow::Owned(format!("{CALL_OUT_PREFIX}{rest}")),
        _ => Cow::Borrowed(path),
    }
}

/// Kind of bus a port is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PortKind {
    Usb,
    Pci,
    Bluetooth,
    #[default]
    Unknown,
}

/// Information about a serial port
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortDescriptor {
    /// Port path (e.g., /dev/ttyUSB0, /dev/cu.usbserial-A1, COM3)
    pub path: String,
    /// Bus the port sits on
    pub kind: PortKind,
    /// USB Vendor ID (if USB)
    pub vid: Option<u16>,
    /// USB Product ID (if USB)
    pub pid: Option<u16>,
    /// USB serial number (if available)
    pub serial_number: Option<String>,
    /// USB manufacturer string
    pub manufacturer: Option<String>,
    /// USB product string
    pub product: Option<String>,
}

impl PortDescriptor {
    /// Descriptor carrying only a path
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Create from serialport crate's port info
    pub(crate) fn from_serialport(name: String, port_type: &SerialPortType) -> Self {
        match port_type {
            SerialPortType::UsbPort(usb) => Self {
                path: name,
                kind: PortKind::Usb,
                vid: Some(usb.vid),
                pid: Some(usb.pid),
                serial_number: usb.serial_number.clone(),
                manufacturer: usb.manufacturer.clone(),
                product: usb.product.clone(),
            },
            SerialPortType::PciPort => Self {
                kind: PortKind::Pci,
                ..Self::new(name)
            },
            SerialPortType::BluetoothPort => Self {
                kind: PortKind::Bluetooth,
                ..Self::new(name)
            },
            SerialPortType::Unknown => Self::new(name),
        }
    }

    /// Same port with its path normalized for matching and opening
    pub fn normalized(self) -> Self {
        let rewritten = match normalize_port_path(&self.path) {
            Cow::Owned(path) => Some(path),
            Cow::Borrowed(_) => None,
        };
        match rewritten {
            Some(path) => Self { path, ..self },
            None => self,
        }
    }

    /// String value of a metadata field, `None` when the host did not report it
    ///
    /// USB IDs are rendered as four lowercase hex digits (`0403`).
    pub fn field(&self, field: PortField) -> Option<Cow<'_, str>> {
        match field {
            PortField::Path => Some(Cow::Borrowed(self.path.as_str())),
            PortField::Manufacturer => self.manufacturer.as_deref().map(Cow::Borrowed),
            PortField::Product => self.product.as_deref().map(Cow::Borrowed),
            PortField::SerialNumber => self.serial_number.as_deref().map(Cow::Borrowed),
            PortField::VendorId => self.vid.map(|id| Cow::Owned(format!("{id:04x}"))),
            PortField::ProductId => self.pid.map(|id| Cow::Owned(format!("{id:04x}"))),
            PortField::Unknown => None,
        }
    }

    /// Human-readable label: "path (Product)" or just the path
    pub fn display_label(&self) -> String {
        match &self.product {
            Some(product) => format!("{} ({})", self.path, product),
            None => self.path.clone(),
        }
    }
}
