//! Capture controllers
//!
//! A [`CaptureController`] owns one capture device for the lifetime of a
//! local video track (and of every clone of it). Two variants exist:
//! [`CameraCaptureController`] and [`ScreenCaptureController`]. Both share
//! the start/stop/dispose bookkeeping in [`CaptureCore`].

pub mod camera;
pub mod screen;

pub use camera::CameraCaptureController;
pub use screen::ScreenCaptureController;

use crate::constraints::VideoConstraints;
use crate::error::{MediaError, MediaResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use rtcbridge_core::{CaptureSettings, CapturerEventsListener, VideoCapturer};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Kind of device behind a controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureKind {
    /// Camera device
    Camera,
    /// Screen projection
    Screen,
}

impl fmt::Display for CaptureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureKind::Camera => write!(f, "camera"),
            CaptureKind::Screen => write!(f, "screen"),
        }
    }
}

/// Capture device lifecycle shared by a track and its clones
#[async_trait]
pub trait CaptureController: Send + Sync {
    /// Device kind
    fn kind(&self) -> CaptureKind;

    /// Open the device; `None` when no capturer could be produced
    fn initialize(&self) -> Option<Arc<dyn VideoCapturer>>;

    /// Start (or restart) capturing at the current format
    fn start_capture(&self);

    /// Stop capturing; false when the device failed to stop
    fn stop_capture(&self) -> bool;

    /// Release the device
    fn dispose(&self);

    /// Current capture settings
    fn settings(&self) -> CaptureSettings;

    /// Register for capturer-initiated stops
    fn set_capturer_events_listener(&self, listener: Arc<dyn CapturerEventsListener>);

    /// Apply new constraints while capturing
    async fn apply_constraints(&self, _constraints: VideoConstraints) -> MediaResult<CaptureSettings> {
        Err(MediaError::Unsupported {
            operation: format!("applyConstraints on {} capture", self.kind()),
        })
    }
}

#[derive(Default)]
struct CoreState {
    capturer: Option<Arc<dyn VideoCapturer>>,
    width: u32,
    height: u32,
    frame_rate: u32,
    capturing: bool,
    disposed: bool,
}

/// Start/stop/dispose bookkeeping common to every controller
pub struct CaptureCore {
    state: Mutex<CoreState>,
}

impl CaptureCore {
    /// Create a core targeting the given format
    pub fn new(width: u32, height: u32, frame_rate: u32) -> Self {
        Self {
            state: Mutex::new(CoreState {
                width,
                height,
                frame_rate,
                ..Default::default()
            }),
        }
    }

    /// Adopt a freshly created capturer
    pub fn set_capturer(&self, capturer: Arc<dyn VideoCapturer>) {
        self.state.lock().capturer = Some(capturer);
    }

    /// The current capturer, if initialized and not disposed
    pub fn capturer(&self) -> Option<Arc<dyn VideoCapturer>> {
        self.state.lock().capturer.clone()
    }

    /// Target (width, height, frame rate)
    pub fn format(&self) -> (u32, u32, u32) {
        let state = self.state.lock();
        (state.width, state.height, state.frame_rate)
    }

    /// Whether the device is currently capturing
    pub fn is_capturing(&self) -> bool {
        self.state.lock().capturing
    }

    /// Start capturing unless already running
    pub fn start(&self) {
        let (capturer, width, height, frame_rate) = {
            let mut state = self.state.lock();
            if state.capturing || state.disposed {
                return;
            }
            let Some(capturer) = state.capturer.clone() else {
                return;
            };
            state.capturing = true;
            (capturer, state.width, state.height, state.frame_rate)
        };
        debug!("🎥 Starting capture at {}x{}@{}", width, height, frame_rate);
        capturer.start_capture(width, height, frame_rate);
    }

    /// Stop capturing; a controller that is not capturing stops trivially
    pub fn stop(&self) -> bool {
        let capturer = {
            let state = self.state.lock();
            if !state.capturing {
                return true;
            }
            match state.capturer.clone() {
                Some(capturer) => capturer,
                None => return true,
            }
        };

        match capturer.stop_capture() {
            Ok(()) => {
                self.state.lock().capturing = false;
                debug!("Capture stopped");
                true
            }
            Err(e) => {
                warn!("Failed to stop capture: {}", e);
                false
            }
        }
    }

    /// Change the target format, applying it to a running capturer
    pub fn change_format(&self, width: u32, height: u32, frame_rate: u32) -> MediaResult<()> {
        let (capturer, capturing) = {
            let state = self.state.lock();
            (state.capturer.clone(), state.capturing)
        };
        if let (Some(capturer), true) = (capturer, capturing) {
            capturer
                .change_capture_format(width, height, frame_rate)
                .map_err(MediaError::from)?;
        }

        let mut state = self.state.lock();
        state.width = width;
        state.height = height;
        state.frame_rate = frame_rate;
        Ok(())
    }

    /// Release the capturer; only the first call has an effect
    pub fn dispose(&self) {
        let capturer = {
            let mut state = self.state.lock();
            if state.disposed {
                return;
            }
            state.disposed = true;
            state.capturing = false;
            state.capturer.take()
        };
        if let Some(capturer) = capturer {
            capturer.dispose();
        }
    }
}
