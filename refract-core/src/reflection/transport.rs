//! # Reflection Transport
//!
//! The seam between the reflection logic and the network.
//!
//! A [`ReflectionTransport`] opens one bidirectional `ServerReflectionInfo` stream per call,
//! routed according to the requested [`ProtocolRevision`]. The returned [`ReflectionStream`]
//! offers the four primitives the session layer needs: `write`, `next_event`, and `cancel`
//! (opening being the transport's job).
//!
//! [`TonicTransport`] implements it on top of any `tonic` gRPC service (a `Channel`,
//! an `InterceptedService`, or an in-process server in tests).
use super::proto::{ServerReflectionRequest, ServerReflectionResponse};
use super::revision::ProtocolRevision;
use crate::BoxError;
use futures_util::future::BoxFuture;
use http_body::Body as HttpBody;
use std::future::Future;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::transport::Channel;
use tonic::{Status, Streaming, client::GrpcService};
use tonic_prost::ProstCodec;

/// One open `ServerReflectionInfo` stream.
pub trait ReflectionStream: Send {
    /// Writes a request message on the stream.
    fn write(
        &mut self,
        request: ServerReflectionRequest,
    ) -> impl Future<Output = Result<(), Status>> + Send;

    /// Waits for the next event from the peer.
    ///
    /// * `Some(Ok(response))` - A response message.
    /// * `Some(Err(status))` - A transport-level failure, or the call was rejected.
    /// * `None` - The stream ended.
    fn next_event(
        &mut self,
    ) -> impl Future<Output = Option<Result<ServerReflectionResponse, Status>>> + Send;

    /// Terminates the stream. Must be idempotent.
    fn cancel(&mut self);
}

/// Opens reflection streams for a given protocol revision.
pub trait ReflectionTransport: Send + Sync + 'static {
    type Stream: ReflectionStream + 'static;

    fn open(
        &self,
        revision: ProtocolRevision,
    ) -> impl Future<Output = Result<Self::Stream, Status>> + Send;
}

/// A [`ReflectionTransport`] backed by a `tonic` gRPC service.
#[derive(Debug, Clone)]
pub struct TonicTransport<S = Channel> {
    grpc: tonic::client::Grpc<S>,
}

impl<S> TonicTransport<S> {
    pub fn new(service: S) -> Self {
        Self {
            grpc: tonic::client::Grpc::new(service),
        }
    }
}

type PendingCall = BoxFuture<'static, Result<tonic::Response<Streaming<ServerReflectionResponse>>, Status>>;

impl<S> ReflectionTransport for TonicTransport<S>
where
    S: GrpcService<tonic::body::Body> + Clone + Send + Sync + 'static,
    S::Future: Send,
    S::Error: Into<BoxError> + Send,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    type Stream = TonicReflectionStream;

    fn open(
        &self,
        revision: ProtocolRevision,
    ) -> impl Future<Output = Result<Self::Stream, Status>> + Send {
        let mut grpc = self.grpc.clone();

        async move {
            let (tx, rx) = mpsc::channel(1);
            let path = revision.path();

            // The call is only driven once the first event is awaited, so that the request
            // is already buffered when the server starts processing the stream.
            let call: PendingCall = Box::pin(async move {
                grpc.ready().await.map_err(|e| {
                    let e: BoxError = e.into();
                    Status::unknown(format!("Service was not ready: {e}"))
                })?;

                grpc.streaming(
                    tonic::Request::new(ReceiverStream::new(rx)),
                    path,
                    ProstCodec::default(),
                )
                .await
            });

            Ok(TonicReflectionStream {
                requests: Some(tx),
                call: Some(call),
                responses: None,
            })
        }
    }
}

/// The [`ReflectionStream`] produced by [`TonicTransport`].
pub struct TonicReflectionStream {
    requests: Option<mpsc::Sender<ServerReflectionRequest>>,
    call: Option<PendingCall>,
    responses: Option<Streaming<ServerReflectionResponse>>,
}

impl ReflectionStream for TonicReflectionStream {
    async fn write(&mut self, request: ServerReflectionRequest) -> Result<(), Status> {
        let tx = self
            .requests
            .as_ref()
            .ok_or_else(|| Status::cancelled("Reflection stream was cancelled"))?;

        tx.send(request)
            .await
            .map_err(|_| Status::unavailable("Reflection stream closed before the request was sent"))
    }

    async fn next_event(&mut self) -> Option<Result<ServerReflectionResponse, Status>> {
        if let Some(call) = self.call.take() {
            match call.await {
                Ok(response) => self.responses = Some(response.into_inner()),
                Err(status) => return Some(Err(status)),
            }
        }

        let responses = self.responses.as_mut()?;
        responses.message().await.transpose()
    }

    fn cancel(&mut self) {
        // Dropping the response body resets the HTTP/2 stream.
        self.requests = None;
        self.call = None;
        self.responses = None;
    }
}
