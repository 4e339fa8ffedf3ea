//! Per-track video observers
//!
//! A [`VideoTrackAdapter`] attaches frame sinks to video tracks belonging to
//! one owner (a session, or `-1` for local tracks):
//!
//! - a dimension detector that reports `videoTrackDimensionChanged` whenever
//!   the rotated frame size changes;
//! - a mute detector (remote tracks) that counts frames and periodically
//!   reports `mediaStreamTrackMuteChanged` on transitions.
//!
//! Sinks run on capture/render contexts, so they only touch atomics and hand
//! events to the [`EventEmitter`]'s executor. The removed flag is checked
//! again inside the job, so a frame racing a removal never reports after it.

use parking_lot::Mutex;
use rtcbridge_core::{BridgeEvent, EventEmitter, MediaKind, MediaStreamTrack, VideoFrameInfo, VideoSink};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep};
use tracing::{debug, warn};

/// Owner id used for local tracks
pub const LOCAL_OWNER_ID: i32 = -1;

/// Timing of the mute detection check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MuteTiming {
    /// Delay before the first check
    pub initial_delay: Duration,
    /// Interval between checks
    pub period: Duration,
}

impl Default for MuteTiming {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(3000),
            period: Duration::from_millis(1500),
        }
    }
}

/// Enqueue `event`; dropped if `removed` is set by the time the job runs
fn emit_while_attached(emitter: &EventEmitter, removed: &Arc<AtomicBool>, event: BridgeEvent) {
    let removed = removed.clone();
    let sink = emitter.sink().clone();
    emitter.executor().execute(move || {
        if removed.load(Ordering::Acquire) {
            debug!("Dropping {} for a removed observer", event.event_type());
            return;
        }
        sink.send(event);
    });
}

struct DimensionDetector {
    owner_id: i32,
    track_id: String,
    last: Mutex<(u32, u32)>,
    removed: Arc<AtomicBool>,
    emitter: EventEmitter,
}

impl VideoSink for DimensionDetector {
    fn on_frame(&self, frame: &VideoFrameInfo) {
        if self.removed.load(Ordering::Acquire) {
            return;
        }

        let size = (frame.rotated_width(), frame.rotated_height());
        {
            let mut last = self.last.lock();
            if *last == size {
                return;
            }
            *last = size;
        }

        emit_while_attached(
            &self.emitter,
            &self.removed,
            BridgeEvent::VideoTrackDimensionChanged {
                pc_id: self.owner_id,
                track_id: self.track_id.clone(),
                width: size.0,
                height: size.1,
            },
        );
    }
}

struct MuteDetector {
    owner_id: i32,
    track_id: String,
    frames: AtomicU64,
    muted: AtomicBool,
    removed: Arc<AtomicBool>,
    emitter: EventEmitter,
}

impl MuteDetector {
    fn check(&self) {
        if self.removed.load(Ordering::Acquire) {
            return;
        }

        let muted = self.frames.swap(0, Ordering::AcqRel) == 0;
        if self.muted.swap(muted, Ordering::AcqRel) != muted {
            debug!("Track {} mute changed: {}", self.track_id, muted);
            emit_while_attached(
                &self.emitter,
                &self.removed,
                BridgeEvent::TrackMuteChanged {
                    pc_id: self.owner_id,
                    track_id: self.track_id.clone(),
                    muted,
                },
            );
        }
    }
}

impl VideoSink for MuteDetector {
    fn on_frame(&self, _frame: &VideoFrameInfo) {
        if !self.removed.load(Ordering::Acquire) {
            self.frames.fetch_add(1, Ordering::AcqRel);
        }
    }
}

struct DimensionRegistration {
    track: Arc<dyn MediaStreamTrack>,
    detector: Arc<DimensionDetector>,
}

struct MuteRegistration {
    track: Arc<dyn MediaStreamTrack>,
    detector: Arc<MuteDetector>,
    task: Option<JoinHandle<()>>,
}

/// Dimension and mute observers for the video tracks of one owner
pub struct VideoTrackAdapter {
    owner_id: i32,
    emitter: EventEmitter,
    timing: MuteTiming,
    dimension_detectors: Mutex<HashMap<String, DimensionRegistration>>,
    mute_detectors: Mutex<HashMap<String, MuteRegistration>>,
}

impl VideoTrackAdapter {
    /// Create an adapter for `owner_id`
    pub fn new(owner_id: i32, emitter: EventEmitter, timing: MuteTiming) -> Self {
        Self {
            owner_id,
            emitter,
            timing,
            dimension_detectors: Mutex::new(HashMap::new()),
            mute_detectors: Mutex::new(HashMap::new()),
        }
    }

    /// Owner id carried by emitted events
    pub fn owner_id(&self) -> i32 {
        self.owner_id
    }

    /// Attach a dimension detector; audio tracks and known ids are ignored
    pub fn add_dimension_detector(&self, track: Arc<dyn MediaStreamTrack>) {
        if track.kind() != MediaKind::Video {
            return;
        }
        let track_id = track.id();
        let mut detectors = self.dimension_detectors.lock();
        if detectors.contains_key(&track_id) {
            return;
        }

        let detector = Arc::new(DimensionDetector {
            owner_id: self.owner_id,
            track_id: track_id.clone(),
            last: Mutex::new((0, 0)),
            removed: Arc::new(AtomicBool::new(false)),
            emitter: self.emitter.clone(),
        });
        track.add_sink(detector.clone());
        debug!("Dimension detector added for track {} (owner {})", track_id, self.owner_id);
        detectors.insert(track_id, DimensionRegistration { track, detector });
    }

    /// Detach the dimension detector of `track_id`; frames still in flight are dropped
    pub fn remove_dimension_detector(&self, track_id: &str) {
        let Some(registration) = self.dimension_detectors.lock().remove(track_id) else {
            return;
        };
        registration.detector.removed.store(true, Ordering::Release);
        let sink: Arc<dyn VideoSink> = registration.detector;
        registration.track.remove_sink(&sink);
        debug!("Dimension detector removed for track {}", track_id);
    }

    /// Attach a mute detector and start its periodic check
    pub fn add_adapter(&self, track: Arc<dyn MediaStreamTrack>) {
        if track.kind() != MediaKind::Video {
            return;
        }
        let track_id = track.id();
        let mut adapters = self.mute_detectors.lock();
        if adapters.contains_key(&track_id) {
            return;
        }

        let detector = Arc::new(MuteDetector {
            owner_id: self.owner_id,
            track_id: track_id.clone(),
            frames: AtomicU64::new(0),
            muted: AtomicBool::new(false),
            removed: Arc::new(AtomicBool::new(false)),
            emitter: self.emitter.clone(),
        });
        track.add_sink(detector.clone());

        let task = match Handle::try_current() {
            Ok(handle) => {
                let checker = detector.clone();
                let timing = self.timing;
                Some(handle.spawn(async move {
                    sleep(timing.initial_delay).await;
                    let mut ticker = interval(timing.period);
                    loop {
                        ticker.tick().await;
                        checker.check();
                    }
                }))
            }
            Err(_) => {
                warn!("No runtime available, mute detection disabled for track {}", track_id);
                None
            }
        };

        debug!("Mute detector added for track {} (owner {})", track_id, self.owner_id);
        adapters.insert(
            track_id,
            MuteRegistration {
                track,
                detector,
                task,
            },
        );
    }

    /// Detach the mute detector of `track_id` and stop its check
    pub fn remove_adapter(&self, track_id: &str) {
        let Some(registration) = self.mute_detectors.lock().remove(track_id) else {
            return;
        };
        registration.detector.removed.store(true, Ordering::Release);
        if let Some(task) = registration.task {
            task.abort();
        }
        let sink: Arc<dyn VideoSink> = registration.detector;
        registration.track.remove_sink(&sink);
        debug!("Mute detector removed for track {}", track_id);
    }

    /// Number of attached dimension detectors
    pub fn dimension_detector_count(&self) -> usize {
        self.dimension_detectors.lock().len()
    }

    /// Number of attached mute detectors
    pub fn adapter_count(&self) -> usize {
        self.mute_detectors.lock().len()
    }
}

impl Drop for VideoTrackAdapter {
    fn drop(&mut self) {
        for (_, registration) in self.mute_detectors.lock().drain() {
            registration.detector.removed.store(true, Ordering::Release);
            if let Some(task) = registration.task {
                task.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtcbridge_core::testing::FakeTrack;
    use rtcbridge_core::{EventSink, SerialExecutor};
    use tokio::sync::mpsc::UnboundedReceiver;

    fn adapter(owner_id: i32, timing: MuteTiming) -> (VideoTrackAdapter, SerialExecutor, UnboundedReceiver<BridgeEvent>) {
        let executor = SerialExecutor::spawn("adapter-test").unwrap();
        let (sink, rx) = EventSink::channel();
        let emitter = EventEmitter::new(executor.clone(), sink);
        (VideoTrackAdapter::new(owner_id, emitter, timing), executor, rx)
    }

    fn drain(rx: &mut UnboundedReceiver<BridgeEvent>) -> Vec<BridgeEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_dimension_events_only_on_change() {
        let (adapter, executor, mut rx) = adapter(LOCAL_OWNER_ID, MuteTiming::default());
        let track = FakeTrack::new("v1", MediaKind::Video);
        adapter.add_dimension_detector(track.clone());

        track.deliver_frame(VideoFrameInfo::new(640, 480));
        track.deliver_frame(VideoFrameInfo::new(640, 480));
        track.deliver_frame(VideoFrameInfo {
            width: 640,
            height: 480,
            rotation: 90,
        });
        executor.flush().await;

        let events = drain(&mut rx);
        assert_eq!(
            events,
            vec![
                BridgeEvent::VideoTrackDimensionChanged {
                    pc_id: -1,
                    track_id: "v1".to_string(),
                    width: 640,
                    height: 480,
                },
                BridgeEvent::VideoTrackDimensionChanged {
                    pc_id: -1,
                    track_id: "v1".to_string(),
                    width: 480,
                    height: 640,
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_removed_detector_drops_frames() {
        let (adapter, executor, mut rx) = adapter(3, MuteTiming::default());
        let track = FakeTrack::new("v1", MediaKind::Video);
        adapter.add_dimension_detector(track.clone());
        assert_eq!(track.sink_count(), 1);

        adapter.remove_dimension_detector("v1");
        adapter.remove_dimension_detector("v1");
        assert_eq!(track.sink_count(), 0);
        assert_eq!(adapter.dimension_detector_count(), 0);

        track.deliver_frame(VideoFrameInfo::new(320, 240));
        executor.flush().await;
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_audio_tracks_are_ignored() {
        let (adapter, _executor, _rx) = adapter(0, MuteTiming::default());
        let track = FakeTrack::new("a1", MediaKind::Audio);
        adapter.add_dimension_detector(track.clone());
        adapter.add_adapter(track.clone());
        assert_eq!(adapter.dimension_detector_count(), 0);
        assert_eq!(adapter.adapter_count(), 0);
        assert_eq!(track.sink_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mute_transitions() {
        let timing = MuteTiming {
            initial_delay: Duration::from_millis(300),
            period: Duration::from_millis(100),
        };
        let (adapter, executor, mut rx) = adapter(7, timing);
        let track = FakeTrack::new("remote-v", MediaKind::Video);
        adapter.add_adapter(track.clone());

        // No frames before the first check: muted
        sleep(Duration::from_millis(350)).await;
        executor.flush().await;
        assert_eq!(
            drain(&mut rx),
            vec![BridgeEvent::TrackMuteChanged {
                pc_id: 7,
                track_id: "remote-v".to_string(),
                muted: true,
            }]
        );

        // Still muted: no repeat
        sleep(Duration::from_millis(100)).await;
        executor.flush().await;
        assert!(drain(&mut rx).is_empty());

        // Frames flow again: unmuted
        track.deliver_frame(VideoFrameInfo::new(640, 480));
        sleep(Duration::from_millis(100)).await;
        executor.flush().await;
        assert_eq!(
            drain(&mut rx),
            vec![BridgeEvent::TrackMuteChanged {
                pc_id: 7,
                track_id: "remote-v".to_string(),
                muted: false,
            }]
        );

        adapter.remove_adapter("remote-v");
        assert_eq!(track.sink_count(), 0);
        sleep(Duration::from_millis(500)).await;
        executor.flush().await;
        assert!(drain(&mut rx).is_empty());
    }
}
