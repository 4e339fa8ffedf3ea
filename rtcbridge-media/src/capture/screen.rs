//! Screen capture controller

use super::{CaptureController, CaptureCore, CaptureKind};
use async_trait::async_trait;
use rtcbridge_core::{CaptureSettings, CapturerEventsListener, HostContext, ScreenCaptureGrant, VideoCapturer};
use std::sync::Arc;

/// Frame rate used for screen capture
pub const SCREEN_FRAME_RATE: u32 = 30;

/// Controller for a screen projection granted by the user
pub struct ScreenCaptureController {
    core: CaptureCore,
    host: Arc<dyn HostContext>,
    grant: ScreenCaptureGrant,
}

impl ScreenCaptureController {
    /// Create a controller capturing at the display size
    pub fn new(host: Arc<dyn HostContext>, grant: ScreenCaptureGrant, width: u32, height: u32) -> Self {
        Self {
            core: CaptureCore::new(width, height, SCREEN_FRAME_RATE),
            host,
            grant,
        }
    }
}

#[async_trait]
impl CaptureController for ScreenCaptureController {
    fn kind(&self) -> CaptureKind {
        CaptureKind::Screen
    }

    fn initialize(&self) -> Option<Arc<dyn VideoCapturer>> {
        let (width, height, _) = self.core.format();
        let capturer = self.host.create_screen_capturer(&self.grant, width, height)?;
        self.core.set_capturer(capturer.clone());
        Some(capturer)
    }

    fn start_capture(&self) {
        self.core.start();
    }

    fn stop_capture(&self) -> bool {
        self.core.stop()
    }

    fn dispose(&self) {
        self.core.dispose();
    }

    fn settings(&self) -> CaptureSettings {
        let (width, height, frame_rate) = self.core.format();
        CaptureSettings {
            device_id: "screen-capture".to_string(),
            group_id: String::new(),
            height,
            width,
            frame_rate,
            facing_mode: None,
        }
    }

    fn set_capturer_events_listener(&self, listener: Arc<dyn CapturerEventsListener>) {
        if let Some(capturer) = self.core.capturer() {
            capturer.set_events_listener(listener);
        }
    }
}
