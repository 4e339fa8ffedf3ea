//! Structured debug logging system

use rtcbridge_core::{BridgeError, BridgeResult};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Filter used when neither an explicit filter nor `RUST_LOG` is set
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Installs the process-wide `tracing` subscriber
#[derive(Debug, Clone, Default)]
pub struct DebugLogger {
    filter: Option<String>,
}

impl DebugLogger {
    /// Create a logger using `RUST_LOG`, falling back to [`DEFAULT_LOG_FILTER`]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a logger with an explicit filter directive (e.g. `"rtcbridge=debug"`)
    pub fn with_filter(filter: impl Into<String>) -> Self {
        Self {
            filter: Some(filter.into()),
        }
    }

    /// Build the filter this logger would install
    ///
    /// An explicit directive wins over `RUST_LOG`.
    pub fn env_filter(&self) -> BridgeResult<EnvFilter> {
        match &self.filter {
            Some(directive) => EnvFilter::try_new(directive).map_err(|e| BridgeError::Initialization {
                reason: format!("invalid log filter '{}': {}", directive, e),
            }),
            None => Ok(EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))),
        }
    }

    /// Install the subscriber
    ///
    /// Fails when a global subscriber is already installed.
    pub fn init(&self) -> BridgeResult<()> {
        let filter = self.env_filter()?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .try_init()
            .map_err(|e| BridgeError::Initialization {
                reason: format!("failed to initialize tracing: {}", e),
            })?;
        debug!("Debug logging initialized");
        Ok(())
    }

    /// Install the subscriber unless one already exists
    pub fn init_logging(&self) {
        if let Err(e) = self.init() {
            debug!("Logging not initialized: {}", e);
        }
    }
}
