//! # Stream Session
//!
//! A single request/response exchange with the reflection service.
//!
//! Every exchange opens a brand new stream, writes exactly one request and resolves on the
//! first event sent by the peer. One request per stream costs a stream setup per request but
//! removes any need to correlate responses with requests.
//!
//! The in-flight state of an exchange is tracked by [`PendingExchange`], which guarantees the
//! stream is cancelled on every exit path, including the exchange future being dropped
//! (e.g. by a timeout).
use super::proto::server_reflection_response::MessageResponse;
use super::proto::ServerReflectionRequest;
use super::revision::ProtocolRevision;
use super::transport::{ReflectionStream, ReflectionTransport};
use tonic::Status;
use tracing::{debug, trace};

/// How a single exchange was resolved by the peer.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// A non-error response payload.
    Data(MessageResponse),
    /// The server answered with an `ErrorResponse`.
    ServerError { code: i32, message: String },
    /// The peer broke the request/response contract.
    ProtocolViolation(String),
}

/// The lifecycle of a [`PendingExchange`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    /// The request is being written.
    Sent,
    /// The request was written, waiting for the first event.
    AwaitingResponse,
    /// The peer answered (with data or with an error response).
    Completed,
    /// The exchange failed: transport error or protocol violation.
    Failed,
}

impl ExchangeState {
    fn is_terminal(self) -> bool {
        matches!(self, ExchangeState::Completed | ExchangeState::Failed)
    }
}

/// Issues exchanges against one protocol revision of the reflection service.
pub struct StreamSession<'a, T> {
    transport: &'a T,
    revision: ProtocolRevision,
}

impl<'a, T: ReflectionTransport> StreamSession<'a, T> {
    pub fn new(transport: &'a T, revision: ProtocolRevision) -> Self {
        Self {
            transport,
            revision,
        }
    }

    pub fn revision(&self) -> ProtocolRevision {
        self.revision
    }

    /// Runs one request/response exchange over a freshly opened stream.
    ///
    /// # Returns
    ///
    /// * `Ok(Outcome)` - The peer produced an event (or ended the stream without one).
    /// * `Err(Status)` - The transport failed before any event; the status is left untouched.
    pub async fn exchange(&self, request: ServerReflectionRequest) -> Result<Outcome, Status> {
        let stream = self.transport.open(self.revision).await?;

        debug!(revision = %self.revision, request = ?request.message_request, "Reflection exchange");

        PendingExchange::new(stream).run(request).await
    }
}

/// The transient state of one round trip over a stream it owns.
pub struct PendingExchange<S: ReflectionStream> {
    stream: S,
    state: ExchangeState,
}

impl<S: ReflectionStream> PendingExchange<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            state: ExchangeState::Sent,
        }
    }

    pub fn state(&self) -> ExchangeState {
        self.state
    }

    /// Writes the request and resolves on the first event.
    pub async fn run(mut self, request: ServerReflectionRequest) -> Result<Outcome, Status> {
        if let Err(status) = self.stream.write(request).await {
            self.settle(ExchangeState::Failed);
            return Err(status);
        }

        self.transition(ExchangeState::AwaitingResponse);

        match self.stream.next_event().await {
            None => {
                self.settle(ExchangeState::Failed);
                Ok(Outcome::ProtocolViolation("ended without data".into()))
            }
            Some(Err(status)) => {
                self.settle(ExchangeState::Failed);
                Err(status)
            }
            Some(Ok(response)) => match response.message_response {
                Some(MessageResponse::ErrorResponse(e)) => {
                    self.settle(ExchangeState::Completed);
                    Ok(Outcome::ServerError {
                        code: e.error_code,
                        message: e.error_message,
                    })
                }
                Some(payload) => {
                    self.settle(ExchangeState::Completed);
                    Ok(Outcome::Data(payload))
                }
                None => {
                    self.settle(ExchangeState::Failed);
                    Ok(Outcome::ProtocolViolation(
                        "response carried no message".into(),
                    ))
                }
            },
        }
    }

    fn transition(&mut self, next: ExchangeState) {
        trace!(from = ?self.state, to = ?next, "Exchange state transition");
        self.state = next;
    }

    /// Moves to a terminal state and terminates the stream; no further reads are needed.
    fn settle(&mut self, terminal: ExchangeState) {
        self.transition(terminal);
        self.stream.cancel();
    }
}

impl<S: ReflectionStream> Drop for PendingExchange<S> {
    fn drop(&mut self) {
        if !self.state.is_terminal() {
            trace!(state = ?self.state, "Exchange abandoned, cancelling its stream");
            self.stream.cancel();
        }
    }
}
