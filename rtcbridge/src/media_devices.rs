//! Media acquisition commands
//!
//! `getUserMedia`, `getDisplayMedia` and `enumerateDevices` on top of the
//! track registry, the stream assembler and the host context.

use parking_lot::Mutex;
use rtcbridge_core::{
    BridgeError, BridgeResult, HostContext, MediaDeviceInfo, ScreenCaptureGrant, SerialExecutor,
    TrackInfo,
};
use rtcbridge_media::{
    enumerate_devices, CameraCaptureController, CaptureController, LocalStreamInfo, ManagedTrack,
    ScreenCaptureController, StreamAssembler, TrackRegistry, VideoConstraints, VideoDefaults,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of a screen capture acquisition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayMediaInfo {
    /// Handle of the new stream
    pub stream_id: String,
    /// Descriptor of the screen track
    pub track: TrackInfo,
}

/// Constraints of a `getUserMedia` request
///
/// A key that is absent, `null` or `false` is not requested; `true` requests
/// the kind with default constraints.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct UserMediaConstraints {
    /// Audio constraints
    pub audio: Option<Value>,
    /// Video constraints
    pub video: Option<Value>,
}

impl UserMediaConstraints {
    fn requested(value: &Option<Value>) -> Option<&Value> {
        match value {
            None | Some(Value::Null) | Some(Value::Bool(false)) => None,
            Some(value) => Some(value),
        }
    }

    /// Audio options, if audio was requested
    pub fn audio_options(&self) -> Option<Map<String, Value>> {
        Self::requested(&self.audio).map(|value| match value {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        })
    }

    /// Video constraints, if video was requested
    pub fn video_constraints(&self) -> BridgeResult<Option<VideoConstraints>> {
        match Self::requested(&self.video) {
            None => Ok(None),
            Some(Value::Object(map)) => serde_json::from_value(Value::Object(map.clone()))
                .map(Some)
                .map_err(|e| BridgeError::Abort {
                    reason: format!("invalid video constraints: {}", e),
                }),
            Some(_) => Ok(Some(VideoConstraints::default())),
        }
    }
}

/// Marks a display media request as in flight until dropped
struct PendingGuard {
    pending: Arc<Mutex<bool>>,
}

impl PendingGuard {
    fn acquire(pending: &Arc<Mutex<bool>>) -> BridgeResult<Self> {
        let mut flag = pending.lock();
        if *flag {
            return Err(BridgeError::invalid_state("another display media request is pending"));
        }
        *flag = true;
        Ok(Self {
            pending: pending.clone(),
        })
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        *self.pending.lock() = false;
    }
}

/// Acquisition of local camera, microphone and screen media
#[derive(Clone)]
pub struct MediaDevices {
    host: Arc<dyn HostContext>,
    registry: Arc<TrackRegistry>,
    streams: Arc<StreamAssembler>,
    executor: SerialExecutor,
    video_defaults: VideoDefaults,
    display_pending: Arc<Mutex<bool>>,
}

impl MediaDevices {
    /// Create the acquisition layer
    pub fn new(
        host: Arc<dyn HostContext>,
        registry: Arc<TrackRegistry>,
        streams: Arc<StreamAssembler>,
        executor: SerialExecutor,
        video_defaults: VideoDefaults,
    ) -> Self {
        Self {
            host,
            registry,
            streams,
            executor,
            video_defaults,
            display_pending: Arc::new(Mutex::new(false)),
        }
    }

    /// Describe every camera plus the audio input
    pub fn enumerate_devices(&self) -> Vec<MediaDeviceInfo> {
        enumerate_devices(self.host.camera_enumerator().as_ref())
    }

    /// Acquire local audio and/or camera media into a new stream
    ///
    /// Fails with `AbortError` when neither kind is requested or neither
    /// could be created, and with `InvalidStateError` when video is requested
    /// without a foreground context.
    pub fn get_user_media(&self, constraints: &UserMediaConstraints) -> BridgeResult<LocalStreamInfo> {
        let audio = constraints.audio_options();
        let video = constraints.video_constraints()?;

        if audio.is_none() && video.is_none() {
            return Err(BridgeError::Abort {
                reason: "neither audio nor video requested".to_string(),
            });
        }

        // Checked first so a refused request leaves no audio track behind
        if video.is_some() && !self.host.has_foreground_context() {
            return Err(BridgeError::invalid_state("no foreground context for video capture"));
        }

        let mut track_ids = Vec::with_capacity(2);

        if let Some(options) = audio {
            match self.registry.create_audio_track(&options) {
                Ok(track) => track_ids.push(track.id().to_string()),
                Err(e) => warn!("getUserMedia: audio track not created: {}", e),
            }
        }

        if let Some(video) = video {
            debug!("getUserMedia(video): {:?}", video);
            let controller: Arc<dyn CaptureController> = Arc::new(CameraCaptureController::new(
                self.host.camera_enumerator(),
                video,
                &self.video_defaults,
            ));
            if let Some(track) = self.create_video_track(controller) {
                track_ids.push(track.id().to_string());
            }
        }

        if track_ids.is_empty() {
            return Err(BridgeError::Abort {
                reason: "no track could be created".to_string(),
            });
        }

        Ok(self.streams.create_stream(&track_ids))
    }

    /// Acquire the screen into a new stream
    ///
    /// Only one request may be pending at a time. The permission prompt is
    /// awaited off the executor; the track is created on it.
    pub async fn get_display_media(&self) -> BridgeResult<DisplayMediaInfo> {
        let _pending = PendingGuard::acquire(&self.display_pending)?;

        if !self.host.has_foreground_context() {
            return Err(BridgeError::invalid_state("no foreground context for screen capture"));
        }
        if !self.host.screen_capture_available() {
            return Err(BridgeError::invalid_state("screen capture service unavailable"));
        }

        let grant = self.host.request_screen_capture().await?;
        debug!("Screen capture granted");

        let devices = self.clone();
        self.executor
            .call(move || devices.create_screen_stream(grant))
            .await?
    }

    fn create_screen_stream(&self, grant: ScreenCaptureGrant) -> BridgeResult<DisplayMediaInfo> {
        let metrics = self.host.display_metrics();
        let controller: Arc<dyn CaptureController> = Arc::new(ScreenCaptureController::new(
            self.host.clone(),
            grant,
            metrics.width,
            metrics.height,
        ));

        let track = self.create_video_track(controller).ok_or_else(|| BridgeError::Abort {
            reason: "screen track could not be created".to_string(),
        })?;

        let info = self.streams.create_stream(&[track.id().to_string()]);
        let track = info.tracks.into_iter().next().ok_or_else(|| BridgeError::Abort {
            reason: "no screen track info".to_string(),
        })?;

        info!("📺 Screen capture stream {} created", info.stream_id);
        Ok(DisplayMediaInfo {
            stream_id: info.stream_id,
            track,
        })
    }

    fn create_video_track(&self, controller: Arc<dyn CaptureController>) -> Option<Arc<ManagedTrack>> {
        match self.registry.create_video_track(controller.clone()) {
            Ok(Some(track)) => Some(track),
            Ok(None) => {
                controller.dispose();
                None
            }
            Err(e) => {
                warn!("{} video track not created: {}", controller.kind(), e);
                controller.dispose();
                None
            }
        }
    }
}
