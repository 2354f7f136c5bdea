//! Declarative probe specification
//!
//! A [`ProbeSpec`] names the device being looked for, the bytes to send it,
//! the bytes it must answer with, and which ports are worth trying. Specs are
//! usually loaded from JSON:
//!
//! ```json
//! {
//!   "name": "GPS receiver",
//!   "baudRate": 9600,
//!   "probeCmd": "$PMTK605*31\r\n",
//!   "probeRsp": "$PMTK705",
//!   "filter": [{ "vendor": "^FTDI$" }, { "vendorId": "10c4", "product": "^CP210" }]
//! }
//! ```
//!
//! Byte fields accept either a string or an array of byte values.

use std::fmt;
use std::path::Path;

use regex::Regex;
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};

use crate::error::SpecError;
use crate::port::PortDescriptor;

/// Metadata field a filter pattern applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PortField {
    Path,
    #[serde(alias = "vendor")]
    Manufacturer,
    Product,
    SerialNumber,
    VendorId,
    ProductId,
    /// A key no port reports; its group never matches
    #[serde(other)]
    Unknown,
}

impl PortField {
    pub fn as_str(&self) -> &'static str {
        match self {
            PortField::Path => "path",
            PortField::Manufacturer => "manufacturer",
            PortField::Product => "product",
            PortField::SerialNumber => "serialNumber",
            PortField::VendorId => "vendorId",
            PortField::ProductId => "productId",
            PortField::Unknown => "unknown",
        }
    }
}

impl fmt::Display for PortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compiled regular expression matched anywhere in a field value
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "String")]
pub struct FieldPattern(Regex);

impl FieldPattern {
    pub fn new(pattern: &str) -> Result<Self, SpecError> {
        Regex::new(pattern)
            .map(Self)
            .map_err(|source| SpecError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })
    }

    pub fn is_match(&self, value: &str) -> bool {
        self.0.is_match(value)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl TryFrom<String> for FieldPattern {
    type Error = SpecError;

    fn try_from(pattern: String) -> Result<Self, Self::Error> {
        Self::new(&pattern)
    }
}

/// Patterns that must all match for a port to be accepted
///
/// A field may carry several patterns (`vendor` and `manufacturer` name the
/// same field); each one is checked.
#[derive(Debug, Clone, Default)]
pub struct FilterGroup {
    patterns: Vec<(PortField, FieldPattern)>,
}

impl FilterGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pattern for `field`, on top of any already present
    pub fn with(mut self, field: PortField, pattern: &str) -> Result<Self, SpecError> {
        self.patterns.push((field, FieldPattern::new(pattern)?));
        Ok(self)
    }

    /// A field the port does not report never matches
    pub fn matches(&self, port: &PortDescriptor) -> bool {
        self.patterns.iter().all(|(field, pattern)| {
            port.field(*field)
                .is_some_and(|value| pattern.is_match(&value))
        })
    }

    pub fn patterns(&self) -> impl Iterator<Item = (PortField, &FieldPattern)> {
        self.patterns.iter().map(|(field, pattern)| (*field, pattern))
    }
}

impl<'de> Deserialize<'de> for FilterGroup {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct GroupVisitor;

        impl<'de> Visitor<'de> for GroupVisitor {
            type Value = FilterGroup;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of port fields to patterns")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut patterns = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some(entry) = map.next_entry::<PortField, FieldPattern>()? {
                    patterns.push(entry);
                }
                Ok(FilterGroup { patterns })
            }
        }

        deserializer.deserialize_map(GroupVisitor)
    }
}

/// What to look for and how to recognize it
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeSpec {
    /// Human-readable device name, used in results and errors
    pub name: String,
    pub baud_rate: u32,
    /// Bytes written once after the port opens
    #[serde(deserialize_with = "byte_string")]
    pub probe_cmd: Vec<u8>,
    /// Bytes that must appear somewhere in the reply
    #[serde(deserialize_with = "byte_string")]
    pub probe_rsp: Vec<u8>,
    /// Accepted if any group matches; an empty filter accepts every port
    #[serde(default)]
    pub filter: Vec<FilterGroup>,
}

impl ProbeSpec {
    pub fn new(
        name: impl Into<String>,
        baud_rate: u32,
        probe_cmd: impl Into<Vec<u8>>,
        probe_rsp: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            name: name.into(),
            baud_rate,
            probe_cmd: probe_cmd.into(),
            probe_rsp: probe_rsp.into(),
            filter: Vec::new(),
        }
    }

    pub fn with_filter_group(mut self, group: FilterGroup) -> Self {
        self.filter.push(group);
        self
    }

    /// Parse and validate a JSON spec
    pub fn from_json_str(json: &str) -> Result<Self, SpecError> {
        let spec: Self = serde_json::from_str(json)?;
        spec.validate()?;
        Ok(spec)
    }

    /// Load and validate a JSON spec file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, SpecError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| SpecError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), SpecError> {
        if self.baud_rate == 0 {
            return Err(SpecError::InvalidBaudRate(self.baud_rate));
        }
        if self.probe_rsp.is_empty() {
            return Err(SpecError::EmptyResponse);
        }
        Ok(())
    }

    /// Whether `port` passes the filter (AND within a group, OR across groups)
    pub fn accepts(&self, port: &PortDescriptor) -> bool {
        self.filter.is_empty() || self.filter.iter().any(|group| group.matches(port))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ByteString {
    Text(String),
    Raw(Vec<u8>),
}

fn byte_string<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match ByteString::deserialize(deserializer)? {
        ByteString::Text(text) => text.into_bytes(),
        ByteString::Raw(bytes) => bytes,
    })
}
