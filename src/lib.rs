//! Duocam - synchronized two-camera recording sessions.
//!
//! This is the main library crate. It provides the session controller, the
//! camera device contract, the session report and the command handlers used
//! by the `duocam` binary.

pub mod capture;
pub mod cli;
pub mod commands;
pub mod config;
pub mod recorder;
pub mod report;
pub mod utils;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging
///
/// `RUST_LOG` wins when set; otherwise `verbose` picks the crate level.
pub fn init_tracing(verbose: u8) {
    let default_filter = match verbose {
        0 => "duocam=info",
        1 => "duocam=debug",
        _ => "duocam=trace",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::debug!("Starting duocam v{}", env!("CARGO_PKG_VERSION"));
}
