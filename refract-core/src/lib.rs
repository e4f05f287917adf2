//! # Refract Core
//!
//! `refract-core` is a client for the gRPC Server Reflection Protocol. It discovers the
//! Protobuf schema of a remote service at runtime, without any pre-compiled stub.
//!
//! ## Key Components
//!
//! * **[`ReflectionClient`]:** The main entry point. It negotiates which reflection revision
//!   the server speaks (`v1` or `v1alpha`) and resolves the transitive closure of file
//!   descriptors needed to describe a symbol.
//! * **[`ReflectedDescriptor`]:** The immutable set of raw file descriptors produced by one
//!   resolution, convertible into a `prost_reflect::DescriptorPool` on demand.
//! * **[`ReflectionConfig`]:** Preferred revision, probe timeout and host sent with every request.
//!
//! ## Internal building blocks
//!
//! The lower layers are public so that tests (and callers with unusual transports) can
//! plug in their own stream implementation:
//!
//! * **[`reflection::transport`]:** The `open / write / next_event / cancel` abstraction over a
//!   bidirectional stream, plus the `tonic` implementation.
//! * **[`reflection::session`]:** One request, one response, one stream.
//! * **[`reflection::negotiator`]:** Once-per-client revision negotiation.
//!
//! ## Re-exports
//!
//! This crate re-exports `prost`, `prost-reflect`, and `tonic` to ensure that consumers
//! use compatible versions of these underlying dependencies.
pub mod config;
pub mod reflection;

pub use config::ReflectionConfig;
pub use reflection::client::ReflectionClient;
pub use reflection::descriptor::{
    DescriptorPoolLoader, FileDescriptorBytes, ReflectedDescriptor, SchemaLoader,
};
pub use reflection::error::{ClientConnectError, ReflectionResolveError};
pub use reflection::revision::ProtocolRevision;

// Re-exports
pub use prost;
pub use prost_reflect;
pub use tonic;

/// Type alias for the standard boxed error used in generic bounds.
type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
