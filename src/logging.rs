//! Tracing setup.
//!
//! `HARNESS_LOG` (falling back to `RUST_LOG`) sets the filter, with the usual
//! `RUST_LOG` syntax. `HARNESS_LOG_FORMAT=json` switches to newline-delimited
//! JSON; anything else gives plain text. Output always goes to stderr so the
//! host's stdout stays clean.
//!
//! ```bash
//! HARNESS_LOG=fragment_harness=debug HARNESS_LOG_FORMAT=json node host.js
//! ```

use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter, Registry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Text,
        }
    }

    fn from_env() -> Self {
        Self::parse(&std::env::var("HARNESS_LOG_FORMAT").unwrap_or_default())
    }
}

fn build_filter() -> EnvFilter {
    match std::env::var("HARNESS_LOG") {
        Ok(val) => EnvFilter::builder().parse_lossy(val),
        Err(_) => EnvFilter::from_default_env(),
    }
}

/// Installs the global subscriber. Does nothing unless `HARNESS_LOG` or
/// `RUST_LOG` is set. Returns false if a subscriber was already installed
/// or logging is off.
pub fn init_tracing() -> bool {
    if std::env::var("HARNESS_LOG").is_err() && std::env::var("RUST_LOG").is_err() {
        return false;
    }

    let filter = build_filter();
    match LogFormat::from_env() {
        LogFormat::Json => {
            let json_layer = fmt::layer().json().with_writer(std::io::stderr);
            Registry::default()
                .with(filter)
                .with(json_layer)
                .try_init()
                .is_ok()
        }
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init()
            .is_ok(),
    }
}
