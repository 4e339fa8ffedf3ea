//! Local track registry
//!
//! Every locally created track lives in one [`TrackRegistry`] keyed by id.
//! A clone shares the source, capture controller and render helper of the
//! track it was cloned from and records that track's id as its parent. Only
//! the original (a track without a parent) ever disposes shared resources.

use crate::adapter::{MuteTiming, VideoTrackAdapter, LOCAL_OWNER_ID};
use crate::capture::{CaptureController, CaptureKind};
use crate::constraints::{audio_constraints_from_options, strip_null_mandatory, VideoConstraints};
use crate::effects::{ProcessorRegistry, VideoEffectChain};
use parking_lot::RwLock;
use rtcbridge_core::{
    AudioSettings, BridgeError, BridgeEvent, BridgeResult, CaptureSettings, CapturerEventsListener,
    EventEmitter, MediaEngine, MediaKind, MediaSource, MediaStreamTrack, RenderHelper, TrackInfo,
    TrackReadyState, TrackSettings,
};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A locally created audio or video track
pub struct ManagedTrack {
    id: String,
    kind: MediaKind,
    track: Arc<dyn MediaStreamTrack>,
    source: Arc<dyn MediaSource>,
    capture_controller: Option<Arc<dyn CaptureController>>,
    render_helper: Option<Arc<dyn RenderHelper>>,
    parent: Option<String>,
    disposed: AtomicBool,
}

impl ManagedTrack {
    /// Track id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Media kind
    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    /// Native track handle
    pub fn track(&self) -> &Arc<dyn MediaStreamTrack> {
        &self.track
    }

    /// Capture controller shared with clones (video only)
    pub fn capture_controller(&self) -> Option<&Arc<dyn CaptureController>> {
        self.capture_controller.as_ref()
    }

    /// Id of the track this one was cloned from
    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    /// Whether this track is a clone (and so owns no shared resource)
    pub fn is_clone(&self) -> bool {
        self.parent.is_some()
    }

    /// Whether the track has been disposed
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Current enabled flag of the native track
    pub fn enabled(&self) -> bool {
        self.track.enabled()
    }
}

impl std::fmt::Debug for ManagedTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedTrack")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("parent", &self.parent)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

struct CapturerEndedNotifier {
    track: Weak<ManagedTrack>,
    emitter: EventEmitter,
}

impl CapturerEventsListener for CapturerEndedNotifier {
    fn on_capturer_ended(&self) {
        let Some(track) = self.track.upgrade() else {
            return;
        };
        if track.is_disposed() {
            return;
        }
        info!("Capturer for track {} ended", track.id());

        // A dispose may already be queued ahead of this job
        let sink = self.emitter.sink().clone();
        self.emitter.executor().execute(move || {
            if track.is_disposed() {
                debug!("Track {} disposed before its end was reported", track.id());
                return;
            }
            sink.send(BridgeEvent::TrackEnded {
                track_id: track.id().to_string(),
            });
        });
    }
}

/// Sole authority for local track creation, cloning, enabling and disposal
pub struct TrackRegistry {
    engine: Arc<dyn MediaEngine>,
    emitter: EventEmitter,
    tracks: RwLock<HashMap<String, Arc<ManagedTrack>>>,
    adapter: VideoTrackAdapter,
    processors: Arc<ProcessorRegistry>,
    capture_thread_name: String,
}

impl TrackRegistry {
    /// Create an empty registry
    pub fn new(
        engine: Arc<dyn MediaEngine>,
        emitter: EventEmitter,
        capture_thread_name: impl Into<String>,
    ) -> Self {
        let adapter = VideoTrackAdapter::new(LOCAL_OWNER_ID, emitter.clone(), MuteTiming::default());
        Self {
            engine,
            emitter,
            tracks: RwLock::new(HashMap::new()),
            adapter,
            processors: Arc::new(ProcessorRegistry::new()),
            capture_thread_name: capture_thread_name.into(),
        }
    }

    /// Create an audio track from a consumer constraint object
    ///
    /// Null-valued mandatory entries are stripped before the engine sees them.
    pub fn create_audio_track(&self, options: &Map<String, Value>) -> BridgeResult<Arc<ManagedTrack>> {
        let mut constraints = audio_constraints_from_options(options);
        strip_null_mandatory(&mut constraints);

        let source = self.engine.create_audio_source(&constraints).map_err(|e| {
            warn!("Audio source creation failed: {}", e);
            BridgeError::SourceCreation {
                kind: MediaKind::Audio.to_string(),
            }
        })?;

        let id = Uuid::new_v4().to_string();
        let track = self.engine.create_audio_track(&id, &source);
        let managed = Arc::new(ManagedTrack {
            id: id.clone(),
            kind: MediaKind::Audio,
            track,
            source,
            capture_controller: None,
            render_helper: None,
            parent: None,
            disposed: AtomicBool::new(false),
        });

        self.tracks.write().insert(id.clone(), managed.clone());
        info!("🎤 Created audio track {}", id);
        Ok(managed)
    }

    /// Create a video track driven by `controller`
    ///
    /// Returns `Ok(None)` when the controller produces no capturer or no
    /// render helper can be allocated; the controller is then left to the
    /// caller. Capture starts only after the track is registered.
    pub fn create_video_track(
        &self,
        controller: Arc<dyn CaptureController>,
    ) -> BridgeResult<Option<Arc<ManagedTrack>>> {
        let Some(capturer) = controller.initialize() else {
            debug!("No capturer available");
            return Ok(None);
        };

        let Some(helper) = self.engine.create_render_helper(&self.capture_thread_name) else {
            warn!("Error creating render helper");
            return Ok(None);
        };

        let source = match self.engine.create_video_source(capturer.is_screencast()) {
            Ok(source) => source,
            Err(e) => {
                warn!("Video source creation failed: {}", e);
                helper.dispose();
                return Err(BridgeError::SourceCreation {
                    kind: MediaKind::Video.to_string(),
                });
            }
        };
        capturer.initialize(helper.clone(), source.clone());

        let id = Uuid::new_v4().to_string();
        let track = self.engine.create_video_track(&id, &source);
        self.adapter.add_dimension_detector(track.clone());
        track.set_enabled(true);

        let managed = Arc::new(ManagedTrack {
            id: id.clone(),
            kind: MediaKind::Video,
            track,
            source,
            capture_controller: Some(controller.clone()),
            render_helper: Some(helper),
            parent: None,
            disposed: AtomicBool::new(false),
        });
        controller.set_capturer_events_listener(Arc::new(CapturerEndedNotifier {
            track: Arc::downgrade(&managed),
            emitter: self.emitter.clone(),
        }));

        self.tracks.write().insert(id.clone(), managed.clone());
        controller.start_capture();

        info!("📹 Created {} video track {}", controller.kind(), id);
        Ok(Some(managed))
    }

    /// Clone a registered track
    pub fn clone_track(&self, id: &str) -> BridgeResult<Arc<ManagedTrack>> {
        let original = self
            .get(id)
            .ok_or_else(|| BridgeError::not_found("track", id))?;

        let clone_id = Uuid::new_v4().to_string();
        let track = match original.kind {
            MediaKind::Audio => self.engine.create_audio_track(&clone_id, &original.source),
            MediaKind::Video => self.engine.create_video_track(&clone_id, &original.source),
        };
        track.set_enabled(original.track.enabled());
        if original.kind == MediaKind::Video {
            self.adapter.add_dimension_detector(track.clone());
        }

        let clone = Arc::new(ManagedTrack {
            id: clone_id.clone(),
            kind: original.kind,
            track,
            source: original.source.clone(),
            capture_controller: original.capture_controller.clone(),
            render_helper: original.render_helper.clone(),
            parent: Some(original.id.clone()),
            disposed: AtomicBool::new(false),
        });

        self.tracks.write().insert(clone_id.clone(), clone.clone());
        debug!("Cloned track {} as {}", id, clone_id);
        Ok(clone)
    }

    /// Enable or disable a track
    ///
    /// Enabling a video track (re)starts the shared capture device. Disabling
    /// stops it only when the track is the original. Unknown ids are ignored.
    pub fn set_enabled(&self, id: &str, enabled: bool) {
        let Some(managed) = self.get(id) else {
            debug!("set_enabled on unknown track {}", id);
            return;
        };

        managed.track.set_enabled(enabled);

        if let Some(controller) = &managed.capture_controller {
            if enabled {
                controller.start_capture();
            } else if !managed.is_clone() {
                controller.stop_capture();
            }
        }
    }

    /// Dispose a track; returns false when it was unknown or already disposed
    pub fn dispose(&self, id: &str) -> bool {
        let Some(managed) = self.tracks.write().remove(id) else {
            return false;
        };
        if managed.disposed.swap(true, Ordering::AcqRel) {
            return false;
        }

        if managed.is_clone() {
            self.adapter.remove_dimension_detector(id);
        } else {
            if let Some(controller) = &managed.capture_controller {
                if controller.stop_capture() {
                    controller.dispose();
                } else {
                    warn!("Capture for track {} did not stop, controller left undisposed", id);
                }
            }
            self.adapter.remove_dimension_detector(id);
            if let Some(helper) = &managed.render_helper {
                helper.stop_listening();
                helper.dispose();
            }
            managed.source.dispose();
        }
        managed.track.dispose();

        info!("🧹 Disposed {} track {}", managed.kind, id);
        true
    }

    /// Apply new video constraints to a track's capture controller
    pub async fn apply_constraints(
        &self,
        id: &str,
        constraints: VideoConstraints,
    ) -> BridgeResult<CaptureSettings> {
        let managed = self
            .get(id)
            .ok_or_else(|| BridgeError::not_found("track", id))?;
        let controller = managed
            .capture_controller
            .clone()
            .ok_or_else(|| BridgeError::NotSupported {
                operation: format!("applyConstraints on {} track", managed.kind),
            })?;

        controller
            .apply_constraints(constraints)
            .await
            .map_err(BridgeError::from)
    }

    /// Install the named effects on a camera track's source
    ///
    /// `None` removes any installed effects. Unknown names are logged and
    /// skipped. Returns false, leaving the source untouched, when the track
    /// is unknown or not backed by a camera.
    pub fn set_video_effects<S: AsRef<str>>(&self, id: &str, names: Option<&[S]>) -> bool {
        let Some(managed) = self.get(id) else {
            debug!("set_video_effects on unknown track {}", id);
            return false;
        };
        let is_camera = managed
            .capture_controller
            .as_ref()
            .is_some_and(|controller| controller.kind() == CaptureKind::Camera);
        if !is_camera {
            debug!("Track {} is not a camera track, ignoring video effects", id);
            return false;
        }

        match names {
            Some(names) => {
                let Some(helper) = managed.render_helper.clone() else {
                    warn!("Camera track {} has no render helper", id);
                    return false;
                };
                let chain = VideoEffectChain::new(self.processors.resolve(names), helper);
                info!("🎨 Applying {} video effect(s) to track {}", chain.len(), id);
                managed.source.set_video_processor(Some(Arc::new(chain)));
            }
            None => {
                info!("Clearing video effects on track {}", id);
                managed.source.set_video_processor(None);
            }
        }
        true
    }

    /// Effects available to [`set_video_effects`](Self::set_video_effects)
    pub fn processors(&self) -> &Arc<ProcessorRegistry> {
        &self.processors
    }

    /// Look up a registered track
    pub fn get(&self, id: &str) -> Option<Arc<ManagedTrack>> {
        self.tracks.read().get(id).cloned()
    }

    /// Native handle of a registered track
    pub fn native_track(&self, id: &str) -> Option<Arc<dyn MediaStreamTrack>> {
        self.get(id).map(|managed| managed.track.clone())
    }

    /// Whether `id` is registered
    pub fn contains(&self, id: &str) -> bool {
        self.tracks.read().contains_key(id)
    }

    /// Number of registered tracks
    pub fn len(&self) -> usize {
        self.tracks.read().len()
    }

    /// Whether no track is registered
    pub fn is_empty(&self) -> bool {
        self.tracks.read().is_empty()
    }

    /// Capture controller backing a video track
    pub fn capture_controller(&self, id: &str) -> Option<Arc<dyn CaptureController>> {
        self.get(id).and_then(|managed| managed.capture_controller.clone())
    }

    /// Descriptor of a local track
    pub fn track_info(&self, id: &str) -> Option<TrackInfo> {
        let managed = self.get(id)?;
        let settings = match managed.kind {
            MediaKind::Audio => Some(TrackSettings::Audio(AudioSettings::default())),
            MediaKind::Video => managed
                .capture_controller
                .as_ref()
                .map(|controller| TrackSettings::Video(controller.settings())),
        };

        Some(TrackInfo {
            enabled: managed.track.enabled(),
            id: managed.id.clone(),
            kind: managed.kind,
            ready_state: TrackReadyState::Live,
            remote: false,
            settings,
        })
    }

    /// Observers attached to local video tracks
    pub fn adapter(&self) -> &VideoTrackAdapter {
        &self.adapter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::CameraCaptureController;
    use crate::constraints::VideoDefaults;
    use rtcbridge_core::testing::{FakeCameraEnumerator, FakeEngine};
    use rtcbridge_core::{EventSink, SerialExecutor};
    use serde_json::json;

    fn registry() -> (TrackRegistry, Arc<FakeEngine>) {
        let executor = SerialExecutor::spawn("tracks-test").unwrap();
        let (sink, _rx) = EventSink::channel();
        let engine = FakeEngine::new();
        let registry = TrackRegistry::new(engine.clone(), EventEmitter::new(executor, sink), "CaptureThread");
        (registry, engine)
    }

    fn camera(cameras: Arc<FakeCameraEnumerator>) -> Arc<dyn CaptureController> {
        Arc::new(CameraCaptureController::new(
            cameras,
            VideoConstraints::default(),
            &VideoDefaults::default(),
        ))
    }

    #[tokio::test]
    async fn test_audio_track_strips_null_constraints() {
        let (registry, engine) = registry();
        let options = json!({"echoCancellation": true, "deviceId": null});
        let track = registry
            .create_audio_track(options.as_object().unwrap())
            .unwrap();

        let passed = engine.last_audio_constraints.lock().clone().unwrap();
        assert_eq!(passed.mandatory.len(), 1);
        assert_eq!(passed.mandatory[0].key, "echoCancellation");
        assert!(registry.contains(track.id()));
        assert_eq!(track.kind(), MediaKind::Audio);
    }

    #[tokio::test]
    async fn test_audio_source_refusal() {
        let (registry, engine) = registry();
        engine.refuse_audio_source.store(true, Ordering::SeqCst);
        let err = registry.create_audio_track(&Map::new()).unwrap_err();
        assert_eq!(err.error_code(), "SourceCreationError");
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_video_track_starts_after_registration() {
        let (registry, engine) = registry();
        let cameras = FakeCameraEnumerator::front_and_back();
        let track = registry.create_video_track(camera(cameras.clone())).unwrap().unwrap();

        let capturer = cameras.last_capturer().unwrap();
        assert!(capturer.is_capturing());
        assert!(capturer.initialized.load(Ordering::SeqCst));
        assert!(track.enabled());
        assert_eq!(registry.adapter().dimension_detector_count(), 1);
        assert_eq!(engine.track(track.id()).unwrap().sink_count(), 1);
    }

    #[tokio::test]
    async fn test_video_track_without_capturer() {
        let (registry, _engine) = registry();
        let result = registry
            .create_video_track(camera(FakeCameraEnumerator::empty()))
            .unwrap();
        assert!(result.is_none());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_video_track_without_render_helper() {
        let (registry, engine) = registry();
        engine.refuse_render_helper.store(true, Ordering::SeqCst);
        let cameras = FakeCameraEnumerator::front_and_back();
        let result = registry.create_video_track(camera(cameras.clone())).unwrap();

        assert!(result.is_none());
        assert!(registry.is_empty());
        assert_eq!(cameras.last_capturer().unwrap().starts(), 0);
    }

    #[tokio::test]
    async fn test_clone_unknown_track() {
        let (registry, _engine) = registry();
        let err = registry.clone_track("missing").unwrap_err();
        assert_eq!(err.error_code(), "NotFoundError");
    }

    #[tokio::test]
    async fn test_clone_copies_enabled_flag() {
        let (registry, _engine) = registry();
        let audio = registry.create_audio_track(&Map::new()).unwrap();
        registry.set_enabled(audio.id(), false);

        let clone = registry.clone_track(audio.id()).unwrap();
        assert!(!clone.enabled());
        assert_eq!(clone.parent(), Some(audio.id()));
        assert!(clone.is_clone());
    }

    #[tokio::test]
    async fn test_track_info_settings() {
        let (registry, _engine) = registry();
        let audio = registry.create_audio_track(&Map::new()).unwrap();
        let info = registry.track_info(audio.id()).unwrap();
        assert_eq!(info.settings, Some(TrackSettings::Audio(AudioSettings::default())));
        assert!(!info.remote);

        let video = registry
            .create_video_track(camera(FakeCameraEnumerator::front_and_back()))
            .unwrap()
            .unwrap();
        let info = registry.track_info(video.id()).unwrap();
        match info.settings {
            Some(TrackSettings::Video(settings)) => {
                assert_eq!(settings.device_id, "0");
                assert_eq!(settings.facing_mode.as_deref(), Some("user"));
            }
            other => panic!("unexpected settings {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_apply_constraints_on_audio_not_supported() {
        let (registry, _engine) = registry();
        let audio = registry.create_audio_track(&Map::new()).unwrap();
        let err = registry
            .apply_constraints(audio.id(), VideoConstraints::default())
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "NotSupportedError");

        let err = registry
            .apply_constraints("missing", VideoConstraints::default())
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "NotFoundError");
    }
}
