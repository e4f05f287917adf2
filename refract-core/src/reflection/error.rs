use super::revision::ProtocolRevision;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ClientConnectError {
    #[error("Invalid URL '{0}': {1}")]
    InvalidUrl(String, #[source] tonic::transport::Error),
    #[error("Failed to connect to '{0}': {1}")]
    ConnectionFailed(String, #[source] tonic::transport::Error),
}

/// Everything that can go wrong while negotiating a revision or resolving descriptors.
///
/// The type is `Clone` because a single negotiation outcome is shared between every
/// caller that awaited it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ReflectionResolveError {
    /// The server answered the probe with `UNIMPLEMENTED` for this revision.
    ///
    /// Only surfaces (wrapped in [`Self::NegotiationFailed`]) when both revisions are
    /// unimplemented.
    #[error("The server does not implement reflection revision {0}")]
    VersionUnsupported(ProtocolRevision),

    #[error("Failed to negotiate a reflection revision (last tried {revision}): {cause}")]
    NegotiationFailed {
        revision: ProtocolRevision,
        #[source]
        cause: Box<ReflectionResolveError>,
    },

    /// The negotiation task stopped before producing an outcome (it panicked, or the
    /// runtime shut down).
    #[error("Reflection revision negotiation was aborted: {0}")]
    NegotiationAborted(String),

    #[error("Connectivity probe for reflection revision {revision} timed out after {timeout:?}")]
    ConnectivityTimeout {
        revision: ProtocolRevision,
        timeout: Duration,
    },

    #[error("Symbol '{0}' not found by the reflection service")]
    SymbolNotFound(String),

    #[error("Server returned reflection error code {code}: {message}")]
    ServerError { code: i32, message: String },

    #[error("Reflection protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("The reflection stream failed with status: '{0}'")]
    Transport(#[source] tonic::Status),

    #[error("Protocol error: Received unexpected response type: {0}")]
    UnexpectedResponseType(String),

    #[error("Failed to decode FileDescriptorProto: {0}")]
    DecodeError(#[from] prost::DecodeError),
}

impl ReflectionResolveError {
    /// The server-reported error code, if this error carries one.
    pub fn code(&self) -> Option<i32> {
        match self {
            ReflectionResolveError::ServerError { code, .. } => Some(*code),
            ReflectionResolveError::Transport(status) => Some(status.code() as i32),
            ReflectionResolveError::NegotiationFailed { cause, .. } => cause.code(),
            _ => None,
        }
    }
}
