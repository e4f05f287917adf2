//! # Server Reflection
//!
//! This module contains the logic necessary to interact with the gRPC Server Reflection Protocol.
//!
//! It enables the client to query a server for its own Protobuf schema at runtime. Layers,
//! from the wire up:
//!
//! * [`proto`]: request/response messages shared by both protocol revisions.
//! * [`transport`]: opening a bidirectional stream for a given revision.
//! * [`session`]: a single request/response exchange over a fresh stream.
//! * [`negotiator`]: picking the revision the server supports.
//! * [`client`]: the dependency-closure walk and the descriptor cache.
pub mod client;
pub mod descriptor;
pub mod error;
pub mod negotiator;
pub mod proto;
pub mod revision;
pub mod session;
pub mod transport;
