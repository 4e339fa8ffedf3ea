//! Host platform capabilities: foreground context, cameras and screen capture

use crate::engine::VideoCapturer;
use crate::error::BridgeResult;
use async_trait::async_trait;
use std::sync::Arc;

/// Enumerates camera devices and builds capturers for them
pub trait CameraEnumerator: Send + Sync {
    /// Device names, in platform order
    fn device_names(&self) -> Vec<String>;
    /// Whether the named device faces the user; may fail on legacy camera APIs
    fn is_front_facing(&self, name: &str) -> BridgeResult<bool>;
    /// Create a capturer for the named device
    fn create_capturer(&self, name: &str) -> Option<Arc<dyn VideoCapturer>>;
}

/// Opaque screen-capture permission result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenCaptureGrant {
    /// Platform token identifying the grant
    pub token: String,
}

/// Display size in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayMetrics {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

/// Host application context
#[async_trait]
pub trait HostContext: Send + Sync {
    /// Whether a foreground UI context is currently available
    fn has_foreground_context(&self) -> bool;
    /// Camera enumerator for this host
    fn camera_enumerator(&self) -> Arc<dyn CameraEnumerator>;
    /// Current display size
    fn display_metrics(&self) -> DisplayMetrics;
    /// Whether the platform screen-capture service is reachable
    fn screen_capture_available(&self) -> bool;
    /// Ask the user for screen-capture permission
    async fn request_screen_capture(&self) -> BridgeResult<ScreenCaptureGrant>;
    /// Create a screen capturer for a granted permission
    fn create_screen_capturer(
        &self,
        grant: &ScreenCaptureGrant,
        width: u32,
        height: u32,
    ) -> Option<Arc<dyn VideoCapturer>>;
}
