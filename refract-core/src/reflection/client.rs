//! # Reflection Client
//!
//! A client implementation for `grpc.reflection.v1` and `grpc.reflection.v1alpha`.
//!
//! This client is responsible for building the complete set of file descriptors describing a
//! symbol by querying a server that supports reflection. It handles the complexity of
//! dependency management by inspecting imports and fetching missing files until the entire
//! schema tree for the requested symbol is resolved.
//!
//! ## Dependency closure
//!
//! The walk is breadth-first over an explicit worklist with a visited set keyed by file name,
//! so it terminates on dependency cycles and never recurses. Fetched files land in a cache
//! that lives as long as the client: a file is requested from the server at most once, no
//! matter how many imports (or resolutions) lead to it.
//!
//! Fetches are issued one at a time, and the cache is locked for the whole walk, so
//! concurrent resolutions on the same client never fetch the same file twice.
//!
//! ## References
//!
//! * [gRPC Server Reflection Protocol](https://github.com/grpc/grpc/blob/master/doc/server-reflection.md)
use super::descriptor::{FileDescriptorBytes, ReflectedDescriptor};
use super::error::{ClientConnectError, ReflectionResolveError};
use super::negotiator::VersionNegotiator;
use super::proto::server_reflection_request::MessageRequest;
use super::proto::server_reflection_response::MessageResponse;
use super::proto::{ExtensionRequest, ServerReflectionRequest};
use super::revision::ProtocolRevision;
use super::session::{Outcome, StreamSession};
use super::transport::{ReflectionTransport, TonicTransport};
use crate::BoxError;
use crate::config::ReflectionConfig;
use http_body::Body as HttpBody;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use tonic::client::GrpcService;
use tonic::transport::{Channel, Endpoint};
use tracing::debug;

/// The extension numbers of a message type, as reported by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionNumbers {
    pub base_type_name: String,
    pub numbers: Vec<i32>,
}

/// Raw file descriptors already fetched, keyed by file name. Entries are never replaced.
#[derive(Debug, Default)]
struct DescriptorCache {
    files: HashMap<String, FileDescriptorBytes>,
}

impl DescriptorCache {
    fn get(&self, name: &str) -> Option<&FileDescriptorBytes> {
        self.files.get(name)
    }

    fn contains(&self, name: &str) -> bool {
        self.files.contains_key(name)
    }

    fn insert_all(&mut self, files: Vec<FileDescriptorBytes>) {
        for file in files {
            if !self.files.contains_key(file.name()) {
                self.files.insert(file.name().to_string(), file);
            }
        }
    }

    fn len(&self) -> usize {
        self.files.len()
    }
}

/// A generic client for the gRPC Server Reflection Protocol.
pub struct ReflectionClient<T = TonicTransport<Channel>> {
    transport: Arc<T>,
    negotiator: VersionNegotiator<T>,
    host: String,
    cache: Mutex<DescriptorCache>,
}

impl ReflectionClient<TonicTransport<Channel>> {
    /// Connects to a gRPC server at the specified address.
    ///
    /// This establishes a TCP connection but does not yet perform any reflection calls; the
    /// revision is negotiated on first use.
    ///
    /// # Arguments
    ///
    /// * `addr` - The URI of the server (e.g., `http://localhost:50051`).
    /// * `config` - Preferred revision, probe timeout and request host.
    pub async fn connect(addr: &str, config: ReflectionConfig) -> Result<Self, ClientConnectError> {
        let endpoint = Endpoint::new(addr.to_string())
            .map_err(|e| ClientConnectError::InvalidUrl(addr.to_string(), e))?;

        let channel = endpoint
            .connect()
            .await
            .map_err(|e| ClientConnectError::ConnectionFailed(addr.to_string(), e))?;

        Ok(Self::from_service(channel, config))
    }
}

impl<S> ReflectionClient<TonicTransport<S>>
where
    S: GrpcService<tonic::body::Body> + Clone + Send + Sync + 'static,
    S::Future: Send,
    S::Error: Into<BoxError> + Send,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    /// Creates a client wrapping an existing Tonic service (e.g., a `Channel` or `InterceptedService`).
    pub fn from_service(service: S, config: ReflectionConfig) -> Self {
        Self::new(TonicTransport::new(service), config)
    }
}

impl<T: ReflectionTransport> ReflectionClient<T> {
    pub fn new(transport: T, config: ReflectionConfig) -> Self {
        let transport = Arc::new(transport);
        let negotiator = VersionNegotiator::new(transport.clone(), &config);

        Self {
            transport,
            negotiator,
            host: config.host,
            cache: Mutex::new(DescriptorCache::default()),
        }
    }

    /// The revision negotiated with the server, if negotiation already happened.
    pub fn revision(&self) -> Option<ProtocolRevision> {
        self.negotiator.negotiated()
    }

    /// Negotiates the revision now instead of on the first request.
    pub async fn negotiate(&self) -> Result<ProtocolRevision, ReflectionResolveError> {
        self.negotiator.negotiate().await
    }

    /// Number of distinct files fetched so far.
    pub async fn cached_files(&self) -> usize {
        self.cache.lock().await.len()
    }

    /// Asks the reflection service for the file containing the requested symbol
    /// (e.g., `my.package.MyService`) and every file it transitively imports.
    ///
    /// # Returns
    ///
    /// * `Ok(ReflectedDescriptor)` - The closed set of files describing the symbol.
    /// * `Err(ReflectionResolveError::SymbolNotFound)` - The lookup returned no descriptor.
    /// * `Err(ReflectionResolveError)` - Negotiation or any fetch failed; nothing partial is returned.
    pub async fn resolve_symbol(
        &self,
        symbol: &str,
    ) -> Result<ReflectedDescriptor, ReflectionResolveError> {
        self.resolve_closure(MessageRequest::FileContainingSymbol(symbol.to_string()), || {
            ReflectionResolveError::SymbolNotFound(symbol.to_string())
        })
        .await
    }

    /// Resolves a file (e.g., `google/protobuf/empty.proto`) and its transitive imports.
    pub async fn resolve_file(
        &self,
        filename: &str,
    ) -> Result<ReflectedDescriptor, ReflectionResolveError> {
        self.resolve_closure(MessageRequest::FileByFilename(filename.to_string()), || {
            ReflectionResolveError::ProtocolViolation(format!(
                "no descriptor returned for file '{filename}'"
            ))
        })
        .await
    }

    /// Resolves the file declaring extension `extension_number` of `containing_type`, and its
    /// transitive imports.
    pub async fn resolve_extension(
        &self,
        containing_type: &str,
        extension_number: i32,
    ) -> Result<ReflectedDescriptor, ReflectionResolveError> {
        let request = MessageRequest::FileContainingExtension(ExtensionRequest {
            containing_type: containing_type.to_string(),
            extension_number,
        });

        self.resolve_closure(request, || {
            ReflectionResolveError::ProtocolViolation(format!(
                "no descriptor returned for extension {extension_number} of '{containing_type}'"
            ))
        })
        .await
    }

    /// Lists all services exposed by the server.
    pub async fn list_services(&self) -> Result<Vec<String>, ReflectionResolveError> {
        let revision = self.negotiator.negotiate().await?;
        let session = StreamSession::new(self.transport.as_ref(), revision);

        match self.request(&session, MessageRequest::ListServices(String::new())).await? {
            MessageResponse::ListServicesResponse(resp) => {
                Ok(resp.service.into_iter().map(|s| s.name).collect())
            }
            other => Err(unexpected(other)),
        }
    }

    /// Lists the field numbers of every known extension of `type_name`.
    pub async fn extension_numbers(
        &self,
        type_name: &str,
    ) -> Result<ExtensionNumbers, ReflectionResolveError> {
        let revision = self.negotiator.negotiate().await?;
        let session = StreamSession::new(self.transport.as_ref(), revision);
        let request = MessageRequest::AllExtensionNumbersOfType(type_name.to_string());

        match self.request(&session, request).await? {
            MessageResponse::AllExtensionNumbersResponse(resp) => Ok(ExtensionNumbers {
                base_type_name: resp.base_type_name,
                numbers: resp.extension_number,
            }),
            other => Err(unexpected(other)),
        }
    }

    async fn resolve_closure(
        &self,
        root_request: MessageRequest,
        on_empty: impl FnOnce() -> ReflectionResolveError,
    ) -> Result<ReflectedDescriptor, ReflectionResolveError> {
        let revision = self.negotiator.negotiate().await?;
        let session = StreamSession::new(self.transport.as_ref(), revision);

        let mut cache = self.cache.lock().await;

        let roots = self.fetch_files(&session, root_request).await?;
        if roots.is_empty() {
            return Err(on_empty());
        }

        let mut queue: VecDeque<String> = roots.iter().map(|f| f.name().to_string()).collect();
        cache.insert_all(roots);

        let mut visited = HashSet::new();
        let mut closure = Vec::new();

        while let Some(filename) = queue.pop_front() {
            if !visited.insert(filename.clone()) {
                continue;
            }

            if !cache.contains(&filename) {
                debug!(%filename, "Fetching missing dependency");

                let files = self
                    .fetch_files(&session, MessageRequest::FileByFilename(filename.clone()))
                    .await?;
                cache.insert_all(files);
            }

            let file = cache.get(&filename).ok_or_else(|| {
                ReflectionResolveError::ProtocolViolation(format!(
                    "server did not return requested file '{filename}'"
                ))
            })?;

            queue.extend(
                file.dependencies()
                    .iter()
                    .filter(|dep| !visited.contains(dep.as_str()))
                    .cloned(),
            );

            closure.push(file.clone());
        }

        debug!(files = closure.len(), cached = cache.len(), "Resolved descriptor closure");

        Ok(ReflectedDescriptor::new(closure))
    }

    async fn fetch_files(
        &self,
        session: &StreamSession<'_, T>,
        request: MessageRequest,
    ) -> Result<Vec<FileDescriptorBytes>, ReflectionResolveError> {
        match self.request(session, request).await? {
            MessageResponse::FileDescriptorResponse(resp) => resp
                .file_descriptor_proto
                .into_iter()
                .map(FileDescriptorBytes::peek)
                .collect(),
            other => Err(unexpected(other)),
        }
    }

    async fn request(
        &self,
        session: &StreamSession<'_, T>,
        request: MessageRequest,
    ) -> Result<MessageResponse, ReflectionResolveError> {
        let request = ServerReflectionRequest::new(&self.host, request);

        match session.exchange(request).await {
            Ok(Outcome::Data(payload)) => Ok(payload),
            Ok(Outcome::ServerError { code, message }) => {
                Err(ReflectionResolveError::ServerError { code, message })
            }
            Ok(Outcome::ProtocolViolation(reason)) => {
                Err(ReflectionResolveError::ProtocolViolation(reason))
            }
            Err(status) => Err(ReflectionResolveError::Transport(status)),
        }
    }
}

fn unexpected(response: MessageResponse) -> ReflectionResolveError {
    ReflectionResolveError::UnexpectedResponseType(format!("{response:?}"))
}
