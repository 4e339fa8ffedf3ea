//! Integration tests for the local track lifecycle
//!
//! Covers the clone graph: shared resources are released exactly once, by
//! the original, and clones never stop the shared capture device.

use rtcbridge_core::testing::{FakeCameraEnumerator, FakeCapturer, FakeEngine, FakeHost};
use rtcbridge_core::{
    BridgeEvent, EventEmitter, EventSink, MediaKind, RenderHelper, ScreenCaptureGrant,
    SerialExecutor, VideoFrameInfo, VideoFrameProcessor,
};
use rtcbridge_media::*;
use serde_json::Map;
use std::sync::atomic::Ordering;
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

struct Harness {
    registry: Arc<TrackRegistry>,
    engine: Arc<FakeEngine>,
    cameras: Arc<FakeCameraEnumerator>,
    executor: SerialExecutor,
    events: UnboundedReceiver<BridgeEvent>,
}

impl Harness {
    fn new() -> Self {
        let executor = SerialExecutor::spawn("track-lifecycle").unwrap();
        let (sink, events) = EventSink::channel();
        let engine = FakeEngine::new();
        let registry = Arc::new(TrackRegistry::new(
            engine.clone(),
            EventEmitter::new(executor.clone(), sink),
            "CaptureThread",
        ));
        Self {
            registry,
            engine,
            cameras: FakeCameraEnumerator::front_and_back(),
            executor,
            events,
        }
    }

    fn video_track(&self) -> Arc<ManagedTrack> {
        let controller = Arc::new(CameraCaptureController::new(
            self.cameras.clone(),
            VideoConstraints::default(),
            &VideoDefaults::default(),
        ));
        self.registry
            .create_video_track(controller)
            .unwrap()
            .unwrap()
    }

    fn capturer(&self) -> Arc<FakeCapturer> {
        self.cameras.last_capturer().unwrap()
    }

    /// Park the executor until the returned sender is dropped or sent to
    fn hold_executor(&self) -> std_mpsc::Sender<()> {
        let (release, gate) = std_mpsc::channel::<()>();
        self.executor.execute(move || {
            let _ = gate.recv();
        });
        release
    }

    /// Queue a dispose behind whatever is already on the executor
    fn queue_dispose(&self, id: &str) {
        let registry = self.registry.clone();
        let id = id.to_string();
        self.executor.execute(move || {
            registry.dispose(&id);
        });
    }

    fn drain(&mut self) -> Vec<BridgeEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

// ============================================================================
// DISPOSAL TESTS
// ============================================================================

#[tokio::test]
async fn test_clone_disposal_releases_only_clone_handle() {
    let h = Harness::new();
    let original = h.video_track();
    let clone = h.registry.clone_track(original.id()).unwrap();
    assert_eq!(h.registry.adapter().dimension_detector_count(), 2);

    assert!(h.registry.dispose(clone.id()));

    let source = h.engine.last_source().unwrap();
    let helper = h.engine.last_helper().unwrap();
    assert_eq!(h.engine.track(clone.id()).unwrap().disposed(), 1);
    assert_eq!(h.engine.track(original.id()).unwrap().disposed(), 0);
    assert_eq!(source.disposed(), 0);
    assert_eq!(helper.disposed(), 0);
    assert_eq!(h.capturer().disposed(), 0);
    assert!(h.capturer().is_capturing());
    assert_eq!(h.registry.adapter().dimension_detector_count(), 1);
}

#[tokio::test]
async fn test_original_disposal_releases_shared_resources_once() {
    let h = Harness::new();
    let original = h.video_track();
    let first = h.registry.clone_track(original.id()).unwrap();
    let second = h.registry.clone_track(original.id()).unwrap();

    assert!(h.registry.dispose(first.id()));
    assert!(h.registry.dispose(original.id()));
    assert!(h.registry.dispose(second.id()));

    let source = h.engine.last_source().unwrap();
    let helper = h.engine.last_helper().unwrap();
    assert_eq!(source.disposed(), 1);
    assert_eq!(helper.disposed(), 1);
    assert_eq!(helper.stop_count.load(Ordering::SeqCst), 1);
    assert_eq!(h.capturer().disposed(), 1);
    assert_eq!(h.capturer().stops(), 1);
    assert!(h.registry.is_empty());
    assert_eq!(h.registry.adapter().dimension_detector_count(), 0);
}

#[tokio::test]
async fn test_dispose_is_idempotent() {
    let h = Harness::new();
    let audio = h.registry.create_audio_track(&Map::new()).unwrap();

    assert!(h.registry.dispose(audio.id()));
    assert!(!h.registry.dispose(audio.id()));
    assert!(!h.registry.dispose("never-existed"));

    assert_eq!(h.engine.last_source().unwrap().disposed(), 1);
    assert_eq!(h.engine.track(audio.id()).unwrap().disposed(), 1);
    assert!(audio.is_disposed());
}

#[tokio::test]
async fn test_failed_stop_leaves_controller_undisposed() {
    let h = Harness::new();
    let original = h.video_track();
    h.capturer().fail_stop.store(true, Ordering::SeqCst);

    assert!(h.registry.dispose(original.id()));

    assert_eq!(h.capturer().disposed(), 0);
    assert_eq!(h.engine.last_helper().unwrap().disposed(), 1);
    assert_eq!(h.engine.last_source().unwrap().disposed(), 1);
    assert_eq!(h.engine.track(original.id()).unwrap().disposed(), 1);
}

// ============================================================================
// ENABLE / DISABLE TESTS
// ============================================================================

#[tokio::test]
async fn test_disabling_clone_keeps_capture_running() {
    let h = Harness::new();
    let original = h.video_track();
    let clone = h.registry.clone_track(original.id()).unwrap();
    let sibling = h.registry.clone_track(original.id()).unwrap();

    h.registry.set_enabled(clone.id(), false);

    assert!(!clone.enabled());
    assert!(original.enabled());
    assert!(sibling.enabled());
    assert!(h.capturer().is_capturing());
    assert_eq!(h.capturer().stops(), 0);
}

#[tokio::test]
async fn test_disabling_original_stops_capture() {
    let h = Harness::new();
    let original = h.video_track();

    h.registry.set_enabled(original.id(), false);
    assert!(!h.capturer().is_capturing());
    assert!(!original.enabled());

    // Re-enabling through a clone restarts the shared device
    let clone = h.registry.clone_track(original.id()).unwrap();
    assert!(!clone.enabled());
    h.registry.set_enabled(clone.id(), true);
    assert!(h.capturer().is_capturing());
    assert_eq!(h.capturer().starts(), 2);
}

#[tokio::test]
async fn test_set_enabled_unknown_track_is_noop() {
    let h = Harness::new();
    h.registry.set_enabled("missing", false);
    assert!(h.registry.is_empty());
}

// ============================================================================
// OBSERVER TESTS
// ============================================================================

#[tokio::test]
async fn test_clone_has_its_own_dimension_detector() {
    let mut h = Harness::new();
    let original = h.video_track();
    let clone = h.registry.clone_track(original.id()).unwrap();

    h.engine
        .track(clone.id())
        .unwrap()
        .deliver_frame(VideoFrameInfo::new(1280, 720));
    h.executor.flush().await;

    assert_eq!(
        h.drain(),
        vec![BridgeEvent::VideoTrackDimensionChanged {
            pc_id: -1,
            track_id: clone.id().to_string(),
            width: 1280,
            height: 720,
        }]
    );

    h.registry.dispose(clone.id());
    h.engine
        .track(clone.id())
        .unwrap()
        .deliver_frame(VideoFrameInfo::new(640, 360));
    h.executor.flush().await;
    assert!(h.drain().is_empty());
}

#[tokio::test]
async fn test_capturer_end_emits_track_ended_until_disposed() {
    let mut h = Harness::new();
    let original = h.video_track();

    h.capturer().end();
    h.executor.flush().await;
    assert_eq!(
        h.drain(),
        vec![BridgeEvent::TrackEnded {
            track_id: original.id().to_string(),
        }]
    );

    h.registry.dispose(original.id());
    h.capturer().end();
    h.executor.flush().await;
    assert!(h.drain().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_frame_during_queued_dispose_emits_nothing() {
    let mut h = Harness::new();
    let track = h.video_track();

    let release = h.hold_executor();
    h.queue_dispose(track.id());
    h.engine
        .track(track.id())
        .unwrap()
        .deliver_frame(VideoFrameInfo::new(640, 480));
    release.send(()).unwrap();
    h.executor.flush().await;

    assert!(track.is_disposed());
    assert!(!h
        .drain()
        .iter()
        .any(|event| matches!(event, BridgeEvent::VideoTrackDimensionChanged { .. })));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_capturer_end_during_queued_dispose_emits_nothing() {
    let mut h = Harness::new();
    let track = h.video_track();

    let release = h.hold_executor();
    h.queue_dispose(track.id());
    h.capturer().end();
    release.send(()).unwrap();
    h.executor.flush().await;

    assert!(track.is_disposed());
    assert!(h.drain().is_empty());
}

#[tokio::test]
async fn test_audio_clone_has_no_dimension_detector() {
    let h = Harness::new();
    let audio = h.registry.create_audio_track(&Map::new()).unwrap();
    let before = h.registry.adapter().dimension_detector_count();

    let clone = h.registry.clone_track(audio.id()).unwrap();

    assert_eq!(clone.kind(), MediaKind::Audio);
    assert_eq!(h.registry.adapter().dimension_detector_count(), before);
    assert_eq!(h.engine.track(clone.id()).unwrap().sink_count(), 0);
}

#[tokio::test]
async fn test_audio_clone_shares_source() {
    let h = Harness::new();
    let audio = h.registry.create_audio_track(&Map::new()).unwrap();
    let clone = h.registry.clone_track(audio.id()).unwrap();

    assert_eq!(clone.kind(), MediaKind::Audio);
    assert_eq!(h.engine.sources.lock().len(), 1);

    h.registry.dispose(clone.id());
    assert_eq!(h.engine.last_source().unwrap().disposed(), 0);
    h.registry.dispose(audio.id());
    assert_eq!(h.engine.last_source().unwrap().disposed(), 1);
}

// ============================================================================
// STREAM ASSEMBLY TESTS
// ============================================================================

#[tokio::test]
async fn test_stream_with_audio_and_video() {
    let h = Harness::new();
    let assembler = StreamAssembler::new(h.engine.clone(), h.registry.clone());
    let audio = h.registry.create_audio_track(&Map::new()).unwrap();
    let video = h.video_track();

    let info = assembler.create_stream(&[audio.id().to_string(), video.id().to_string()]);

    assert_eq!(info.tracks.len(), 2);
    assert_eq!(info.tracks[0].id, audio.id());
    assert_eq!(info.tracks[0].kind.as_str(), "audio");
    assert_eq!(info.tracks[1].id, video.id());
    assert_eq!(info.tracks[1].kind.as_str(), "video");

    let record = serde_json::to_value(&info).unwrap();
    assert_eq!(record["tracks"][0]["readyState"], "live");
    assert_eq!(record["tracks"][0]["remote"], false);
    assert_eq!(record["tracks"][0]["settings"]["deviceId"], "audio-1");
    assert_eq!(record["tracks"][1]["settings"]["width"], 1280);
}

// ============================================================================
// VIDEO EFFECTS TESTS
// ============================================================================

struct Mirror;

impl VideoFrameProcessor for Mirror {
    fn process(&self, mut frame: VideoFrameInfo, _helper: &dyn RenderHelper) -> VideoFrameInfo {
        frame.rotation = (frame.rotation + 180) % 360;
        frame
    }
}

struct Downscale;

impl VideoFrameProcessor for Downscale {
    fn process(&self, frame: VideoFrameInfo, _helper: &dyn RenderHelper) -> VideoFrameInfo {
        VideoFrameInfo {
            width: frame.width / 2,
            height: frame.height / 2,
            rotation: frame.rotation,
        }
    }
}

fn register_effects(h: &Harness) {
    h.registry.processors().register("mirror", Arc::new(Mirror));
    h.registry.processors().register("downscale", Arc::new(Downscale));
}

#[tokio::test]
async fn test_video_effects_apply_known_names_in_order() {
    let h = Harness::new();
    register_effects(&h);
    let track = h.video_track();
    let source = h.engine.last_source().unwrap();

    assert!(h
        .registry
        .set_video_effects(track.id(), Some(&["downscale", "mirror"][..])));

    assert!(source.has_processor());
    let frame = source.capture_frame(VideoFrameInfo::new(1280, 720));
    assert_eq!((frame.width, frame.height, frame.rotation), (640, 360, 180));
}

#[tokio::test]
async fn test_video_effects_skip_unknown_names() {
    let h = Harness::new();
    register_effects(&h);
    let track = h.video_track();
    let source = h.engine.last_source().unwrap();

    let names = vec!["sepia".to_string(), "downscale".to_string()];
    assert!(h.registry.set_video_effects(track.id(), Some(names.as_slice())));

    let frame = source.capture_frame(VideoFrameInfo::new(1280, 720));
    assert_eq!(frame, VideoFrameInfo::new(640, 360));

    // Only unknown names still installs a pass-through chain
    assert!(h.registry.set_video_effects(track.id(), Some(&["sepia"][..])));
    assert!(source.has_processor());
    assert_eq!(
        source.capture_frame(VideoFrameInfo::new(1280, 720)),
        VideoFrameInfo::new(1280, 720)
    );
}

#[tokio::test]
async fn test_video_effects_none_removes_processor() {
    let h = Harness::new();
    register_effects(&h);
    let track = h.video_track();
    let source = h.engine.last_source().unwrap();

    h.registry.set_video_effects(track.id(), Some(&["mirror"][..]));
    assert!(source.has_processor());

    assert!(h.registry.set_video_effects::<&str>(track.id(), None));
    assert!(!source.has_processor());
    assert_eq!(
        source.capture_frame(VideoFrameInfo::new(1280, 720)),
        VideoFrameInfo::new(1280, 720)
    );
}

#[tokio::test]
async fn test_video_effects_ignore_screen_audio_and_unknown_tracks() {
    let h = Harness::new();
    register_effects(&h);

    let screen = Arc::new(ScreenCaptureController::new(
        FakeHost::new(),
        ScreenCaptureGrant {
            token: "grant".to_string(),
        },
        1080,
        1920,
    ));
    let screen_track = h.registry.create_video_track(screen).unwrap().unwrap();
    let screen_source = h.engine.last_source().unwrap();
    assert!(!h
        .registry
        .set_video_effects(screen_track.id(), Some(&["mirror"][..])));
    assert!(!screen_source.has_processor());

    let audio = h.registry.create_audio_track(&Map::new()).unwrap();
    let audio_source = h.engine.last_source().unwrap();
    assert!(!h.registry.set_video_effects(audio.id(), Some(&["mirror"][..])));
    assert!(!audio_source.has_processor());

    assert!(!h.registry.set_video_effects("never-existed", Some(&["mirror"][..])));
}
