//! Camera capture controller

use super::{CaptureController, CaptureCore, CaptureKind};
use crate::constraints::{FacingMode, VideoConstraints, VideoDefaults};
use crate::error::{MediaError, MediaResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use rtcbridge_core::{CameraEnumerator, CaptureSettings, CapturerEventsListener, VideoCapturer};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
struct SelectedDevice {
    index: usize,
    facing: FacingMode,
}

/// Controller for a camera device
pub struct CameraCaptureController {
    core: CaptureCore,
    enumerator: Arc<dyn CameraEnumerator>,
    constraints: VideoConstraints,
    device: Mutex<Option<SelectedDevice>>,
}

impl CameraCaptureController {
    /// Create a controller; the device is chosen on [`initialize`](CaptureController::initialize)
    pub fn new(
        enumerator: Arc<dyn CameraEnumerator>,
        constraints: VideoConstraints,
        defaults: &VideoDefaults,
    ) -> Self {
        let (width, height, frame_rate) = constraints.format(defaults);
        Self {
            core: CaptureCore::new(width, height, frame_rate),
            enumerator,
            constraints,
            device: Mutex::new(None),
        }
    }

    fn facing_of(&self, name: &str) -> Option<FacingMode> {
        self.enumerator
            .is_front_facing(name)
            .ok()
            .map(FacingMode::from_front_facing)
    }

    fn try_device(&self, index: usize, name: &str) -> Option<(Arc<dyn VideoCapturer>, SelectedDevice)> {
        let capturer = self.enumerator.create_capturer(name)?;
        let facing = self.facing_of(name).unwrap_or(FacingMode::User);
        debug!("Opened camera {} ({})", name, facing.as_str());
        Some((capturer, SelectedDevice { index, facing }))
    }

    /// Requested device id first, then the requested facing, then any device
    fn select_device(&self) -> Option<(Arc<dyn VideoCapturer>, SelectedDevice)> {
        let names = self.enumerator.device_names();

        if let Some(id) = self.constraints.device_id.as_deref() {
            match id.parse::<usize>().ok().and_then(|i| names.get(i).map(|n| (i, n))) {
                Some((index, name)) => {
                    if let Some(found) = self.try_device(index, name) {
                        return Some(found);
                    }
                    warn!("Camera {} could not be opened", name);
                }
                None => warn!("Unknown camera device id {}", id),
            }
        }

        let wanted = self.constraints.facing();
        for (index, name) in names.iter().enumerate() {
            if self.facing_of(name) == Some(wanted) {
                if let Some(found) = self.try_device(index, name) {
                    return Some(found);
                }
            }
        }

        names
            .iter()
            .enumerate()
            .find_map(|(index, name)| self.try_device(index, name))
    }

    fn switch_facing(&self, wanted: FacingMode) -> MediaResult<()> {
        let current = self.device.lock().clone();
        if current.as_ref().map(|d| d.facing) == Some(wanted) {
            return Ok(());
        }
        let capturer = self.core.capturer().ok_or(MediaError::CaptureNotActive)?;

        let names = self.enumerator.device_names();
        let (index, name) = names
            .iter()
            .enumerate()
            .find(|(_, name)| self.facing_of(name) == Some(wanted))
            .ok_or_else(|| MediaError::DeviceNotFound {
                device_id: wanted.as_str().to_string(),
            })?;

        capturer.switch_camera(name).map_err(MediaError::from)?;
        info!("📷 Switched camera to {} ({})", name, wanted.as_str());
        *self.device.lock() = Some(SelectedDevice {
            index,
            facing: wanted,
        });
        Ok(())
    }
}

#[async_trait]
impl CaptureController for CameraCaptureController {
    fn kind(&self) -> CaptureKind {
        CaptureKind::Camera
    }

    fn initialize(&self) -> Option<Arc<dyn VideoCapturer>> {
        let Some((capturer, device)) = self.select_device() else {
            warn!("No camera could be opened");
            return None;
        };
        *self.device.lock() = Some(device);
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
        let device = self.device.lock().clone();
        CaptureSettings {
            device_id: device
                .as_ref()
                .map(|d| d.index.to_string())
                .unwrap_or_default(),
            group_id: String::new(),
            height,
            width,
            frame_rate,
            facing_mode: Some(
                device
                    .map(|d| d.facing)
                    .unwrap_or_else(|| self.constraints.facing())
                    .as_str()
                    .to_string(),
            ),
        }
    }

    fn set_capturer_events_listener(&self, listener: Arc<dyn CapturerEventsListener>) {
        if let Some(capturer) = self.core.capturer() {
            capturer.set_events_listener(listener);
        }
    }

    async fn apply_constraints(&self, constraints: VideoConstraints) -> MediaResult<CaptureSettings> {
        constraints.validate()?;

        let (width, height, frame_rate) = self.core.format();
        let current = VideoDefaults {
            width,
            height,
            frame_rate,
        };
        let (width, height, frame_rate) = constraints.format(&current);
        self.core.change_format(width, height, frame_rate)?;

        if let Some(facing) = constraints.facing_mode {
            self.switch_facing(facing)?;
        }

        Ok(self.settings())
    }
}
