//! # Protocol revisions
//!
//! The reflection service is published under two namespaces, `grpc.reflection.v1` and the
//! older `grpc.reflection.v1alpha`. Servers may implement either one (or both), so the
//! client has to probe before committing to one.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const V1_PATH: &str = "/grpc.reflection.v1.ServerReflection/ServerReflectionInfo";
const V1_ALPHA_PATH: &str = "/grpc.reflection.v1alpha.ServerReflection/ServerReflectionInfo";

/// A revision of the gRPC Server Reflection Protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ProtocolRevision {
    #[default]
    #[serde(rename = "v1")]
    V1,
    #[serde(rename = "v1alpha")]
    V1Alpha,
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown reflection revision '{0}', expected 'v1' or 'v1alpha'")]
pub struct UnknownRevision(String);

impl ProtocolRevision {
    /// The HTTP/2 path of the `ServerReflectionInfo` RPC under this revision.
    pub fn path(self) -> http::uri::PathAndQuery {
        let path = match self {
            ProtocolRevision::V1 => V1_PATH,
            ProtocolRevision::V1Alpha => V1_ALPHA_PATH,
        };

        http::uri::PathAndQuery::from_static(path)
    }

    /// The revision tried when this one turns out to be unimplemented.
    pub fn other(self) -> Self {
        match self {
            ProtocolRevision::V1 => ProtocolRevision::V1Alpha,
            ProtocolRevision::V1Alpha => ProtocolRevision::V1,
        }
    }

    /// Fully qualified name of the reflection service under this revision.
    pub fn service_name(self) -> &'static str {
        match self {
            ProtocolRevision::V1 => "grpc.reflection.v1.ServerReflection",
            ProtocolRevision::V1Alpha => "grpc.reflection.v1alpha.ServerReflection",
        }
    }

    /// The short name used in configuration and on the command line (`v1`, `v1alpha`).
    pub fn as_str(self) -> &'static str {
        match self {
            ProtocolRevision::V1 => "v1",
            ProtocolRevision::V1Alpha => "v1alpha",
        }
    }
}

impl fmt::Display for ProtocolRevision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProtocolRevision {
    type Err = UnknownRevision;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "v1" => Ok(ProtocolRevision::V1),
            "v1alpha" => Ok(ProtocolRevision::V1Alpha),
            _ => Err(UnknownRevision(s.to_string())),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_revision_paths_differ_only_by_namespace() {
        assert_eq!(
            ProtocolRevision::V1.path().as_str(),
            "/grpc.reflection.v1.ServerReflection/ServerReflectionInfo"
        );
        assert_eq!(
            ProtocolRevision::V1Alpha.path().as_str(),
            "/grpc.reflection.v1alpha.ServerReflection/ServerReflectionInfo"
        );
    }

    #[test]
    fn test_other_revision_is_an_involution() {
        for revision in [ProtocolRevision::V1, ProtocolRevision::V1Alpha] {
            assert_ne!(revision.other(), revision);
            assert_eq!(revision.other().other(), revision);
        }
    }

    #[test]
    fn test_parse_revision() {
        assert_eq!("v1".parse::<ProtocolRevision>().unwrap(), ProtocolRevision::V1);
        assert_eq!(
            " V1Alpha ".parse::<ProtocolRevision>().unwrap(),
            ProtocolRevision::V1Alpha
        );
        assert!("v2".parse::<ProtocolRevision>().is_err());
    }
}
