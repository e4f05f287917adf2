//! # Version Negotiator
//!
//! Determines, once per client, which reflection revision the server implements.
//!
//! The preferred revision is probed with a `list_services` request bounded by a timeout. If
//! the server reports `UNIMPLEMENTED`, the other revision is probed exactly once. Any other
//! failure ends the negotiation right away: a failure unrelated to versioning would hit the
//! fallback probe as well.
//!
//! The probe runs on its own task, so it reaches its timeout (and cancels its stream) even
//! when every caller stopped waiting for it. Concurrent callers share that single task. A
//! successful outcome is kept for the lifetime of the negotiator; a failed one is handed to
//! every caller that awaited it, and the next call starts over.
use super::error::ReflectionResolveError;
use super::proto::{ServerReflectionRequest, server_reflection_request::MessageRequest};
use super::revision::ProtocolRevision;
use super::session::{Outcome, StreamSession};
use super::transport::ReflectionTransport;
use crate::config::ReflectionConfig;
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tonic::Code;
use tracing::{debug, info, warn};

type NegotiationOutcome = Result<ProtocolRevision, ReflectionResolveError>;
type NegotiationFuture = Shared<BoxFuture<'static, NegotiationOutcome>>;

enum Slot {
    Idle,
    InFlight {
        generation: u64,
        future: NegotiationFuture,
    },
    Settled(ProtocolRevision),
}

struct State {
    slot: Slot,
    next_generation: u64,
}

impl State {
    /// Records the outcome of negotiation `generation`, unless a newer one replaced it.
    fn settle(&mut self, generation: u64, outcome: &NegotiationOutcome) {
        if let Slot::InFlight {
            generation: current,
            ..
        } = &self.slot
            && *current == generation
        {
            self.slot = match outcome {
                Ok(revision) => Slot::Settled(*revision),
                Err(_) => Slot::Idle,
            };
        }
    }
}

pub struct VersionNegotiator<T> {
    transport: Arc<T>,
    preferred: ProtocolRevision,
    probe_timeout: Duration,
    host: String,
    state: Arc<Mutex<State>>,
}

impl<T: ReflectionTransport> VersionNegotiator<T> {
    pub fn new(transport: Arc<T>, config: &ReflectionConfig) -> Self {
        Self {
            transport,
            preferred: config.preferred_revision,
            probe_timeout: config.probe_timeout,
            host: config.host.clone(),
            state: Arc::new(Mutex::new(State {
                slot: Slot::Idle,
                next_generation: 0,
            })),
        }
    }

    /// The negotiated revision, if negotiation already succeeded.
    pub fn negotiated(&self) -> Option<ProtocolRevision> {
        match lock(&self.state).slot {
            Slot::Settled(revision) => Some(revision),
            _ => None,
        }
    }

    /// Returns the revision supported by the server, probing it on first use.
    ///
    /// Must be called within a Tokio runtime: the probe is spawned onto it.
    ///
    /// # Returns
    ///
    /// * `Ok(ProtocolRevision)` - The accepted revision, fixed from now on.
    /// * `Err(ReflectionResolveError::ConnectivityTimeout)` - A probe did not complete in time.
    /// * `Err(ReflectionResolveError::NegotiationFailed)` - Both revisions are unimplemented,
    ///   or a probe failed for a reason unrelated to versioning.
    pub async fn negotiate(&self) -> NegotiationOutcome {
        let (generation, future) = {
            let mut state = lock(&self.state);

            match &state.slot {
                Slot::Settled(revision) => return Ok(*revision),
                Slot::InFlight { generation, future } => (*generation, future.clone()),
                Slot::Idle => {
                    let generation = state.next_generation;
                    state.next_generation += 1;

                    let future = self.spawn_probe(generation);
                    state.slot = Slot::InFlight {
                        generation,
                        future: future.clone(),
                    };

                    (generation, future)
                }
            }
        };

        let outcome = future.await;

        // The task settles the slot itself; this only matters if it panicked.
        lock(&self.state).settle(generation, &outcome);

        outcome
    }

    fn spawn_probe(&self, generation: u64) -> NegotiationFuture {
        let transport = self.transport.clone();
        let state = self.state.clone();
        let (preferred, timeout, host) = (self.preferred, self.probe_timeout, self.host.clone());

        let task = tokio::spawn(async move {
            let outcome = probe_revisions(transport, preferred, timeout, host).await;
            lock(&state).settle(generation, &outcome);
            outcome
        });

        async move {
            task.await
                .unwrap_or_else(|e| Err(ReflectionResolveError::NegotiationAborted(e.to_string())))
        }
        .boxed()
        .shared()
    }
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn probe_revisions<T: ReflectionTransport>(
    transport: Arc<T>,
    preferred: ProtocolRevision,
    timeout: Duration,
    host: String,
) -> Result<ProtocolRevision, ReflectionResolveError> {
    let mut revision = preferred;

    let result = match probe(transport.as_ref(), revision, timeout, &host).await {
        Err(ReflectionResolveError::VersionUnsupported(_)) => {
            revision = preferred.other();
            warn!(
                unsupported = %preferred,
                fallback = %revision,
                "Reflection revision not implemented by the server, falling back"
            );
            probe(transport.as_ref(), revision, timeout, &host).await
        }
        result => result,
    };

    match result {
        Ok(()) => {
            info!(%revision, "Negotiated reflection revision");
            Ok(revision)
        }
        Err(err @ ReflectionResolveError::ConnectivityTimeout { .. }) => Err(err),
        Err(err) => Err(ReflectionResolveError::NegotiationFailed {
            revision,
            cause: Box::new(err),
        }),
    }
}

/// Runs the connectivity probe for one revision.
async fn probe<T: ReflectionTransport>(
    transport: &T,
    revision: ProtocolRevision,
    timeout: Duration,
    host: &str,
) -> Result<(), ReflectionResolveError> {
    let session = StreamSession::new(transport, revision);
    let request = ServerReflectionRequest::new(host, MessageRequest::ListServices(String::new()));

    debug!(%revision, ?timeout, "Probing reflection revision");

    // On expiry the exchange future is dropped, which cancels its stream.
    let outcome = tokio::time::timeout(timeout, session.exchange(request))
        .await
        .map_err(|_| ReflectionResolveError::ConnectivityTimeout { revision, timeout })?;

    match outcome {
        Ok(Outcome::Data(_)) => Ok(()),
        Ok(Outcome::ServerError { code, .. }) if code == Code::Unimplemented as i32 => {
            Err(ReflectionResolveError::VersionUnsupported(revision))
        }
        Ok(Outcome::ServerError { code, message }) => {
            Err(ReflectionResolveError::ServerError { code, message })
        }
        Ok(Outcome::ProtocolViolation(reason)) => {
            Err(ReflectionResolveError::ProtocolViolation(reason))
        }
        // Servers reject an unknown service path with an UNIMPLEMENTED status.
        Err(status) if status.code() == Code::Unimplemented => {
            Err(ReflectionResolveError::VersionUnsupported(revision))
        }
        Err(status) => Err(ReflectionResolveError::Transport(status)),
    }
}
