//! # Refract CLI Entry Point
//!
//! The main executable for the Refract tool. This file drives the application lifecycle:
//!
//! 1. **Initialization**: Parses command-line arguments using [`cli::Cli`] and installs logging.
//! 2. **Connection**: Opens a channel to the target server via `refract_core`.
//! 3. **Execution**: Delegates reflection lookups to the `ReflectionClient`.
//! 4. **Presentation**: Formats and prints the resulting data or error to standard output/error.
//!
//! Logs go to stderr and are filtered with `RUST_LOG` (defaults to `warn`).

mod cli;
mod formatter;

use clap::Parser;
use cli::{Cli, Commands, ListCommands};
use formatter::{FormattedString, ServiceList};
use refract_core::{ReflectedDescriptor, ReflectionClient, ReflectionConfig, ReflectionResolveError};
use std::path::Path;
use std::process;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    init_logging();

    let args = Cli::parse();
    let config = args.reflection_config();
    let client = connect_or_exit(&args.url, config).await;

    match args.command {
        Commands::List { sub } => match sub {
            ListCommands::Services => list_services(&client).await,
            ListCommands::Extensions { message } => list_extensions(&client, &message).await,
        },
        Commands::Resolve { symbol, out } => {
            let result = client.resolve_symbol(&symbol).await;
            print_descriptor(result, out.as_deref());
        }
        Commands::File { filename, out } => {
            let result = client.resolve_file(&filename).await;
            print_descriptor(result, out.as_deref());
        }
        Commands::Extension {
            containing_type,
            number,
            out,
        } => {
            let result = client.resolve_extension(&containing_type, number).await;
            print_descriptor(result, out.as_deref());
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn connect_or_exit(url: &str, config: ReflectionConfig) -> ReflectionClient {
    match ReflectionClient::connect(url, config).await {
        Ok(client) => client,
        Err(err) => exit_with(err),
    }
}

fn exit_with(err: impl Into<FormattedString>) -> ! {
    eprintln!("{}", err.into());
    process::exit(1);
}

async fn list_services(client: &ReflectionClient) {
    match client.list_services().await {
        Ok(services) => println!("{}", FormattedString::from(ServiceList(services))),
        Err(e) => exit_with(e),
    }
}

async fn list_extensions(client: &ReflectionClient, message: &str) {
    match client.extension_numbers(message).await {
        Ok(numbers) => println!("{}", FormattedString::from(numbers)),
        Err(e) => exit_with(e),
    }
}

fn print_descriptor(
    result: Result<ReflectedDescriptor, ReflectionResolveError>,
    out: Option<&Path>,
) {
    let descriptor = match result {
        Ok(descriptor) => descriptor,
        Err(e) => exit_with(e),
    };

    if let Some(path) = out {
        if let Err(err) = std::fs::write(path, descriptor.encode_file_descriptor_set()) {
            exit_with(err);
        }
        tracing::info!(path = %path.display(), files = descriptor.len(), "wrote descriptor set");
    }

    println!("{}", FormattedString::from(&descriptor));
}
