//! Configuration types and defaults

use rtcbridge_core::{BridgeError, BridgeResult};
use rtcbridge_media::{MuteTiming, VideoDefaults};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Name of the thread render helpers are allocated on
pub const DEFAULT_CAPTURE_THREAD_NAME: &str = "CaptureThread";

/// Global bridge configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Install a tracing subscriber on init
    pub debug_logging: bool,
    /// Filter directive for the subscriber; `RUST_LOG` when unset
    pub log_filter: Option<String>,
    /// Remote video mute detection timing
    pub mute_timing: MuteTiming,
    /// Render helper thread name
    pub capture_thread_name: String,
    /// Capture format used when constraints leave fields unset
    pub video_defaults: VideoDefaults,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            debug_logging: false,
            log_filter: None,
            mute_timing: MuteTiming::default(),
            capture_thread_name: DEFAULT_CAPTURE_THREAD_NAME.to_string(),
            video_defaults: VideoDefaults::default(),
        }
    }
}

impl BridgeConfig {
    /// Verbose logging for local development
    pub fn development() -> Self {
        Self {
            debug_logging: true,
            log_filter: Some("rtcbridge=debug,rtcbridge_media=debug,rtcbridge_core=debug".to_string()),
            ..Self::default()
        }
    }

    /// Quiet logging, subscriber left to the host application
    pub fn production() -> Self {
        Self {
            debug_logging: false,
            log_filter: Some("warn".to_string()),
            ..Self::default()
        }
    }

    /// Override the mute detection timing
    pub fn with_mute_timing(mut self, initial_delay: Duration, period: Duration) -> Self {
        self.mute_timing = MuteTiming {
            initial_delay,
            period,
        };
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> BridgeResult<()> {
        if self.capture_thread_name.trim().is_empty() {
            return Err(BridgeError::Initialization {
                reason: "capture thread name must not be empty".to_string(),
            });
        }

        if self.mute_timing.period.is_zero() {
            return Err(BridgeError::Initialization {
                reason: "mute detection period must be positive".to_string(),
            });
        }

        self.video_defaults
            .validate()
            .map_err(|e| BridgeError::Initialization {
                reason: e.to_string(),
            })
    }
}
