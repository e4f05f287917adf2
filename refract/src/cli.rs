//! # CLI
//!
//! This module defines the command-line interface of `refract` using `clap`.
use clap::{Parser, Subcommand};
use refract_core::{ProtocolRevision, ReflectionConfig};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "refract", version, about = "gRPC server reflection explorer")]
pub struct Cli {
    /// The server URL to connect to (e.g. http://localhost:50051)
    pub url: String,

    /// Reflection revision to probe first (v1 or v1alpha)
    #[arg(long, default_value = "v1", value_parser = parse_revision)]
    pub revision: ProtocolRevision,

    /// How long to wait for each revision probe, in milliseconds
    #[arg(long, default_value_t = 5000)]
    pub probe_timeout_ms: u64,

    /// Host sent along with every reflection request
    #[arg(long, default_value = "")]
    pub host: String,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn reflection_config(&self) -> ReflectionConfig {
        ReflectionConfig::default()
            .with_preferred_revision(self.revision)
            .with_probe_timeout(Duration::from_millis(self.probe_timeout_ms))
            .with_host(self.host.clone())
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// List available services or other resources
    List {
        #[command(subcommand)]
        sub: ListCommands,
    },

    /// Resolve the files describing a symbol (service, message, enum, ...)
    ///
    /// ## Examples:
    ///
    /// ```bash
    /// refract http://localhost:50051 resolve my.pkg.Service --out descriptor.bin
    /// ```
    Resolve {
        /// Fully qualified symbol name (e.g. my.package.Service)
        symbol: String,
        /// Write the resolved files as a binary FileDescriptorSet
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Resolve a file by name, with every file it imports
    File {
        /// File name as registered on the server (e.g. my/package/service.proto)
        filename: String,
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Resolve the file declaring an extension, with every file it imports
    Extension {
        /// Fully qualified name of the extended message
        containing_type: String,
        /// Field number of the extension
        number: i32,
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum ListCommands {
    /// List all services available on the server
    Services,
    /// List the field numbers of all known extensions of a message
    Extensions {
        /// Fully qualified message name (e.g. my.package.Message)
        message: String,
    },
}

fn parse_revision(value: &str) -> Result<ProtocolRevision, String> {
    value.parse().map_err(|e| format!("{e}"))
}
