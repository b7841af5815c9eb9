//! Credentials and subscription configuration.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::SpoutError;

/// Default registration endpoint.
pub const DEFAULT_BASE_URL: &str = "https://output.limacharlie.io";

/// Interval at which the cloud emits keep-alive traces on an idle stream.
pub const CLOUD_KEEP_ALIVE_SECS: u64 = 60;

/// Default queue capacity.
pub const DEFAULT_MAX_BUFFER: usize = 1024;

/// Read buffer for the stream body. Generous so bursty traffic is pulled
/// in few large reads.
pub const READ_BUFFER_SIZE: usize = 10 * 1024 * 1024;

/// Read timeout for every network call.
///
/// Twice the keep-alive period plus a margin, so a silent dead connection
/// is detected without tearing down a stream that is merely idle.
pub fn read_timeout() -> Duration {
    Duration::from_secs(CLOUD_KEEP_ALIVE_SECS * 2 + 1)
}

/// Organization credentials, owned by the caller's session layer and
/// borrowed read-only by the registration handshake.
#[derive(Debug, Clone)]
pub struct Credentials {
    /// Organization id.
    pub oid: String,
    /// Secret API key.
    pub api_key: String,
}

impl Credentials {
    /// Create a new credential pair.
    pub fn new(oid: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            oid: oid.into(),
            api_key: api_key.into(),
        }
    }
}

/// Kind of data delivered by an output stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataKind {
    /// Sensor events.
    Event,
    /// Detections.
    Detect,
    /// Audit records.
    Audit,
}

impl DataKind {
    /// Wire name used in the registration request.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Event => "event",
            Self::Detect => "detect",
            Self::Audit => "audit",
        }
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataKind {
    type Err = SpoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "event" => Ok(Self::Event),
            "detect" => Ok(Self::Detect),
            "audit" => Ok(Self::Audit),
            other => Err(SpoutError::configuration(format!(
                "invalid data type: {other}"
            ))),
        }
    }
}

/// Subscription parameters for a spout. Immutable once the spout is opened.
#[derive(Debug, Clone)]
pub struct SpoutConfig {
    /// Kind of data to receive.
    pub data_kind: DataKind,
    /// Decode each line as JSON. When false, raw lines are queued as-is.
    pub is_parse: bool,
    /// Maximum number of messages buffered for the consumer.
    pub max_buffer: usize,
    /// Only receive events marked with this investigation id.
    pub inv_id: Option<String>,
    /// Only receive events from sensors with this tag.
    pub tag: Option<String>,
    /// Only receive detections of this category.
    pub cat: Option<String>,
    /// Registration endpoint. Overridable for testing.
    pub base_url: String,
}

impl SpoutConfig {
    /// Configuration with defaults for the given data kind.
    pub fn new(data_kind: DataKind) -> Self {
        Self {
            data_kind,
            is_parse: true,
            max_buffer: DEFAULT_MAX_BUFFER,
            inv_id: None,
            tag: None,
            cat: None,
            base_url: DEFAULT_BASE_URL.to_owned(),
        }
    }

    /// Disable JSON parsing; raw lines are delivered instead.
    pub fn raw(mut self) -> Self {
        self.is_parse = false;
        self
    }

    /// Set the queue capacity.
    pub fn max_buffer(mut self, max_buffer: usize) -> Self {
        self.max_buffer = max_buffer;
        self
    }

    /// Only receive events marked with this investigation id.
    pub fn inv_id(mut self, inv_id: impl Into<String>) -> Self {
        self.inv_id = Some(inv_id.into());
        self
    }

    /// Only receive events from sensors with this tag.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Only receive detections of this category.
    pub fn cat(mut self, cat: impl Into<String>) -> Self {
        self.cat = Some(cat.into());
        self
    }

    /// Override the registration endpoint.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_kind_round_trip() {
        for kind in [DataKind::Event, DataKind::Detect, DataKind::Audit] {
            assert_eq!(kind.as_str().parse::<DataKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_invalid_data_kind_is_configuration_error() {
        let err = "telemetry".parse::<DataKind>().unwrap_err();
        assert!(matches!(err, SpoutError::Configuration { .. }));
        assert!(err.to_string().contains("telemetry"));
    }

    #[test]
    fn test_config_defaults() {
        let config = SpoutConfig::new(DataKind::Event);
        assert!(config.is_parse);
        assert_eq!(config.max_buffer, DEFAULT_MAX_BUFFER);
        assert!(config.inv_id.is_none());
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_config_setters() {
        let config = SpoutConfig::new(DataKind::Detect)
            .raw()
            .max_buffer(16)
            .inv_id("inv-1")
            .tag("vip")
            .cat("malware");
        assert!(!config.is_parse);
        assert_eq!(config.max_buffer, 16);
        assert_eq!(config.cat.as_deref(), Some("malware"));
    }

    #[test]
    fn test_read_timeout_outlives_keep_alive() {
        assert!(read_timeout() > Duration::from_secs(CLOUD_KEEP_ALIVE_SECS * 2));
    }
}
