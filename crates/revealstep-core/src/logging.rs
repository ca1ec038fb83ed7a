#![forbid(unsafe_code)]

//! Logging and tracing support.
//!
//! The engine emits `tracing` events with structured fields (`slide`,
//! `surface`, `marker`, ...). Installing a subscriber is left to the
//! embedding application; with the `tracing-json` feature this module can
//! install a JSON one.

pub use tracing::{
    debug, debug_span, error, error_span, info, info_span, trace, trace_span, warn, warn_span,
};

use std::fmt;

/// Default filter directive when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "revealstep_core=info";

/// Failure to install a global subscriber.
#[derive(Debug)]
pub enum LoggingError {
    /// The filter directive did not parse.
    Filter(String),
    /// A global subscriber is already installed.
    AlreadyInstalled,
}

impl fmt::Display for LoggingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Filter(msg) => write!(f, "invalid log filter: {msg}"),
            Self::AlreadyInstalled => write!(f, "a global tracing subscriber is already installed"),
        }
    }
}

impl std::error::Error for LoggingError {}

/// Install a JSON subscriber writing to stderr.
///
/// `filter` overrides `RUST_LOG`; with neither set, [`DEFAULT_FILTER`] is
/// used.
#[cfg(feature = "tracing-json")]
pub fn init_json_subscriber(filter: Option<&str>) -> Result<(), LoggingError> {
    use tracing_subscriber::EnvFilter;

    let filter = match filter {
        Some(directive) => {
            EnvFilter::try_new(directive).map_err(|e| LoggingError::Filter(e.to_string()))?
        }
        None => EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(DEFAULT_FILTER))
            .map_err(|e| LoggingError::Filter(e.to_string()))?,
    };
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|_| LoggingError::AlreadyInstalled)
}
