//! # DPA Telemetry
//!
//! Structured logging for the DPA protocol stack.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use dpa_telemetry::{init_logging, TelemetryConfig};
//!
//! fn main() {
//!     let config = TelemetryConfig::from_env();
//!     init_logging(&config).expect("Failed to init logging");
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `OTEL_SERVICE_NAME` | `dpa-protocol` | Service name in records |
//! | `DPA_LOG_LEVEL` | `info` | Log level filter (`RUST_LOG` also honoured) |
//! | `DPA_JSON_LOGS` | `false` | JSON records (defaults on in containers) |
//! | `DPA_CONSOLE_OUTPUT` | `true` | Console output |

#![warn(missing_docs)]

mod config;
mod logging;

pub use config::{TelemetryConfig, DEFAULT_SERVICE_NAME};
pub use logging::{build_filter, init_logging};

use thiserror::Error;

/// Logging initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// The level filter could not be parsed.
    #[error("Invalid log filter: {0}")]
    Filter(String),

    /// A global subscriber is already installed.
    #[error("Logging already initialized: {0}")]
    AlreadyInitialized(String),
}
