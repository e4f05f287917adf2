//! # Reflection Configuration
//!
//! Knobs of a [`crate::ReflectionClient`]. The struct is serde-friendly so it can be embedded
//! in a caller's own configuration file; `probe_timeout` is (de)serialized as milliseconds.
use crate::reflection::revision::ProtocolRevision;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upper bound for the connectivity probe of each revision.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReflectionConfig {
    /// The revision probed first. The other one is only tried if this one is unimplemented.
    pub preferred_revision: ProtocolRevision,
    #[serde(rename = "probe_timeout_ms", with = "millis")]
    pub probe_timeout: Duration,
    /// Sent as `host` in every reflection request. Servers generally ignore it.
    pub host: String,
}

impl Default for ReflectionConfig {
    fn default() -> Self {
        Self {
            preferred_revision: ProtocolRevision::default(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            host: String::new(),
        }
    }
}

impl ReflectionConfig {
    pub fn with_preferred_revision(mut self, revision: ProtocolRevision) -> Self {
        self.preferred_revision = revision;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ReflectionConfig::default();

        assert_eq!(config.preferred_revision, ProtocolRevision::V1);
        assert_eq!(config.probe_timeout, Duration::from_secs(5));
        assert!(config.host.is_empty());
    }

    #[test]
    fn test_partial_config_falls_back_to_defaults() {
        let config: ReflectionConfig =
            serde_json::from_str(r#"{ "preferred_revision": "v1alpha" }"#).unwrap();

        assert_eq!(config.preferred_revision, ProtocolRevision::V1Alpha);
        assert_eq!(config.probe_timeout, DEFAULT_PROBE_TIMEOUT);
    }

    #[test]
    fn test_probe_timeout_is_expressed_in_millis() {
        let config = ReflectionConfig::default().with_probe_timeout(Duration::from_millis(250));

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["probe_timeout_ms"], 250);

        let back: ReflectionConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, config);
    }
}
