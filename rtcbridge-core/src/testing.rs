//! In-memory engine, device and host fakes
//!
//! Every fake counts the lifecycle calls it receives so tests can assert
//! exactly-once disposal and capture state.

use crate::engine::{
    CapturerEventsListener, EngineConstraints, MediaEngine, MediaKind, MediaSource, MediaStream,
    MediaStreamTrack, RenderHelper, TrackReadyState, VideoCapturer, VideoFrameInfo, VideoProcessor,
    VideoSink,
};
use crate::error::{BridgeError, BridgeResult};
use crate::host::{CameraEnumerator, DisplayMetrics, HostContext, ScreenCaptureGrant};
use crate::peer::{
    DataBuffer, DataChannel, DataChannelInit, DataChannelObserver, DataChannelState,
    PeerConnection, PeerConnectionObserver, RtcConfiguration, RtcStatsReport, RtpReceiver,
    RtpSender, RtpTransceiver, RtpTransceiverDirection, RtpTransceiverInit, SessionDescription,
    StatsTarget, TransceiverSource,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

static NEXT_ID: AtomicUsize = AtomicUsize::new(1);

fn next_id(prefix: &str) -> String {
    format!("{}-{}", prefix, NEXT_ID.fetch_add(1, Ordering::Relaxed))
}

/// Fake native track
pub struct FakeTrack {
    id: String,
    kind: MediaKind,
    enabled: AtomicBool,
    ended: AtomicBool,
    sinks: Mutex<Vec<Arc<dyn VideoSink>>>,
    /// Number of `dispose` calls
    pub dispose_count: AtomicUsize,
}

impl FakeTrack {
    /// Create a live, disabled track
    pub fn new(id: impl Into<String>, kind: MediaKind) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            kind,
            enabled: AtomicBool::new(false),
            ended: AtomicBool::new(false),
            sinks: Mutex::new(Vec::new()),
            dispose_count: AtomicUsize::new(0),
        })
    }

    /// Deliver a frame to every attached sink
    pub fn deliver_frame(&self, frame: VideoFrameInfo) {
        let sinks = self.sinks.lock().clone();
        for sink in sinks {
            sink.on_frame(&frame);
        }
    }

    /// Number of attached sinks
    pub fn sink_count(&self) -> usize {
        self.sinks.lock().len()
    }

    /// Mark the track ended
    pub fn end(&self) {
        self.ended.store(true, Ordering::SeqCst);
    }

    /// Number of `dispose` calls
    pub fn disposed(&self) -> usize {
        self.dispose_count.load(Ordering::SeqCst)
    }
}

impl MediaStreamTrack for FakeTrack {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    fn ready_state(&self) -> TrackReadyState {
        if self.ended.load(Ordering::SeqCst) {
            TrackReadyState::Ended
        } else {
            TrackReadyState::Live
        }
    }

    fn add_sink(&self, sink: Arc<dyn VideoSink>) {
        self.sinks.lock().push(sink);
    }

    fn remove_sink(&self, sink: &Arc<dyn VideoSink>) {
        let target = Arc::as_ptr(sink) as *const ();
        self.sinks
            .lock()
            .retain(|s| Arc::as_ptr(s) as *const () != target);
    }

    fn dispose(&self) {
        self.dispose_count.fetch_add(1, Ordering::SeqCst);
    }
}

/// Fake native source
pub struct FakeSource {
    kind: MediaKind,
    processor: Mutex<Option<Arc<dyn VideoProcessor>>>,
    /// Number of `dispose` calls
    pub dispose_count: AtomicUsize,
}

impl FakeSource {
    /// Number of `dispose` calls
    pub fn disposed(&self) -> usize {
        self.dispose_count.load(Ordering::SeqCst)
    }

    /// Whether a frame processor is installed
    pub fn has_processor(&self) -> bool {
        self.processor.lock().is_some()
    }

    /// Run a captured frame through the installed processor, if any
    pub fn capture_frame(&self, frame: VideoFrameInfo) -> VideoFrameInfo {
        let processor = self.processor.lock().clone();
        match processor {
            Some(processor) => processor.on_frame_captured(frame),
            None => frame,
        }
    }
}

impl MediaSource for FakeSource {
    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn dispose(&self) {
        self.dispose_count.fetch_add(1, Ordering::SeqCst);
    }

    fn set_video_processor(&self, processor: Option<Arc<dyn VideoProcessor>>) {
        *self.processor.lock() = processor;
    }
}

/// Fake render helper
#[derive(Default)]
pub struct FakeRenderHelper {
    /// Number of `stop_listening` calls
    pub stop_count: AtomicUsize,
    /// Number of `dispose` calls
    pub dispose_count: AtomicUsize,
}

impl FakeRenderHelper {
    /// Number of `dispose` calls
    pub fn disposed(&self) -> usize {
        self.dispose_count.load(Ordering::SeqCst)
    }
}

impl RenderHelper for FakeRenderHelper {
    fn stop_listening(&self) {
        self.stop_count.fetch_add(1, Ordering::SeqCst);
    }

    fn dispose(&self) {
        self.dispose_count.fetch_add(1, Ordering::SeqCst);
    }
}

/// Fake capture device
#[derive(Default)]
pub struct FakeCapturer {
    /// Device name
    pub device: Mutex<String>,
    screencast: bool,
    /// Whether `initialize` was called
    pub initialized: AtomicBool,
    /// Number of `start_capture` calls
    pub start_count: AtomicUsize,
    /// Number of `stop_capture` calls
    pub stop_count: AtomicUsize,
    /// Number of `dispose` calls
    pub dispose_count: AtomicUsize,
    /// Make `stop_capture` fail
    pub fail_stop: AtomicBool,
    /// Make `change_capture_format` fail
    pub fail_format: AtomicBool,
    /// Last requested (width, height, fps)
    pub format: Mutex<Option<(u32, u32, u32)>>,
    listener: Mutex<Option<Arc<dyn CapturerEventsListener>>>,
}

impl FakeCapturer {
    /// Camera capturer for `device`
    pub fn camera(device: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            device: Mutex::new(device.into()),
            ..Default::default()
        })
    }

    /// Screen capturer
    pub fn screen() -> Arc<Self> {
        Arc::new(Self {
            device: Mutex::new("screen".to_string()),
            screencast: true,
            ..Default::default()
        })
    }

    /// Whether capture is currently running
    pub fn is_capturing(&self) -> bool {
        self.start_count.load(Ordering::SeqCst) > self.stop_count.load(Ordering::SeqCst)
    }

    /// Simulate the capturer stopping on its own
    pub fn end(&self) {
        let listener = self.listener.lock().clone();
        if let Some(listener) = listener {
            listener.on_capturer_ended();
        }
    }

    /// Number of `start_capture` calls
    pub fn starts(&self) -> usize {
        self.start_count.load(Ordering::SeqCst)
    }

    /// Number of `stop_capture` calls
    pub fn stops(&self) -> usize {
        self.stop_count.load(Ordering::SeqCst)
    }

    /// Number of `dispose` calls
    pub fn disposed(&self) -> usize {
        self.dispose_count.load(Ordering::SeqCst)
    }
}

impl VideoCapturer for FakeCapturer {
    fn initialize(&self, _helper: Arc<dyn RenderHelper>, _source: Arc<dyn MediaSource>) {
        self.initialized.store(true, Ordering::SeqCst);
    }

    fn start_capture(&self, width: u32, height: u32, frame_rate: u32) {
        *self.format.lock() = Some((width, height, frame_rate));
        self.start_count.fetch_add(1, Ordering::SeqCst);
    }

    fn stop_capture(&self) -> BridgeResult<()> {
        self.stop_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(BridgeError::Device {
                reason: "interrupted while stopping".to_string(),
            });
        }
        Ok(())
    }

    fn change_capture_format(&self, width: u32, height: u32, frame_rate: u32) -> BridgeResult<()> {
        if self.fail_format.load(Ordering::SeqCst) {
            return Err(BridgeError::Device {
                reason: "format not supported".to_string(),
            });
        }
        *self.format.lock() = Some((width, height, frame_rate));
        Ok(())
    }

    fn switch_camera(&self, device_name: &str) -> BridgeResult<()> {
        *self.device.lock() = device_name.to_string();
        Ok(())
    }

    fn is_screencast(&self) -> bool {
        self.screencast
    }

    fn set_events_listener(&self, listener: Arc<dyn CapturerEventsListener>) {
        *self.listener.lock() = Some(listener);
    }

    fn dispose(&self) {
        self.dispose_count.fetch_add(1, Ordering::SeqCst);
    }
}

/// Fake media stream
pub struct FakeStream {
    id: String,
    tracks: Mutex<Vec<Arc<dyn MediaStreamTrack>>>,
}

impl FakeStream {
    /// Create a stream holding `tracks`
    pub fn new(id: impl Into<String>, tracks: Vec<Arc<dyn MediaStreamTrack>>) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            tracks: Mutex::new(tracks),
        })
    }
}

impl MediaStream for FakeStream {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn add_track(&self, track: Arc<dyn MediaStreamTrack>) {
        self.tracks.lock().push(track);
    }

    fn tracks(&self) -> Vec<Arc<dyn MediaStreamTrack>> {
        self.tracks.lock().clone()
    }
}

/// Fake media engine
#[derive(Default)]
pub struct FakeEngine {
    /// Sources created so far
    pub sources: Mutex<Vec<Arc<FakeSource>>>,
    /// Tracks created so far
    pub tracks: Mutex<Vec<Arc<FakeTrack>>>,
    /// Render helpers created so far
    pub helpers: Mutex<Vec<Arc<FakeRenderHelper>>>,
    /// Streams created so far
    pub streams: Mutex<Vec<Arc<FakeStream>>>,
    /// Sessions created so far, with their observers
    pub sessions: Mutex<Vec<(Arc<FakePeerConnection>, Arc<dyn PeerConnectionObserver>)>>,
    /// Constraints passed to the last audio source creation
    pub last_audio_constraints: Mutex<Option<EngineConstraints>>,
    /// Refuse to allocate render helpers
    pub refuse_render_helper: AtomicBool,
    /// Refuse to create audio sources
    pub refuse_audio_source: AtomicBool,
    /// Refuse to create peer connections
    pub refuse_peer_connection: AtomicBool,
}

impl FakeEngine {
    /// Create an engine
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Look up a created track
    pub fn track(&self, id: &str) -> Option<Arc<FakeTrack>> {
        self.tracks.lock().iter().find(|t| t.id == id).cloned()
    }

    /// Most recently created source
    pub fn last_source(&self) -> Option<Arc<FakeSource>> {
        self.sources.lock().last().cloned()
    }

    /// Most recently created render helper
    pub fn last_helper(&self) -> Option<Arc<FakeRenderHelper>> {
        self.helpers.lock().last().cloned()
    }

    /// Most recently created session and its observer
    pub fn last_session(&self) -> Option<(Arc<FakePeerConnection>, Arc<dyn PeerConnectionObserver>)> {
        self.sessions.lock().last().cloned()
    }

    fn new_source(&self, kind: MediaKind) -> Arc<dyn MediaSource> {
        let source = Arc::new(FakeSource {
            kind,
            processor: Mutex::new(None),
            dispose_count: AtomicUsize::new(0),
        });
        self.sources.lock().push(source.clone());
        source
    }

    fn new_track(&self, id: &str, kind: MediaKind) -> Arc<dyn MediaStreamTrack> {
        let track = FakeTrack::new(id, kind);
        track.set_enabled(true);
        self.tracks.lock().push(track.clone());
        track
    }
}

impl MediaEngine for FakeEngine {
    fn create_audio_source(&self, constraints: &EngineConstraints) -> BridgeResult<Arc<dyn MediaSource>> {
        *self.last_audio_constraints.lock() = Some(constraints.clone());
        let has_null = constraints.mandatory.iter().any(|c| c.value.is_none());
        if has_null || self.refuse_audio_source.load(Ordering::SeqCst) {
            return Err(BridgeError::SourceCreation {
                kind: "audio".to_string(),
            });
        }
        Ok(self.new_source(MediaKind::Audio))
    }

    fn create_audio_track(&self, id: &str, _source: &Arc<dyn MediaSource>) -> Arc<dyn MediaStreamTrack> {
        self.new_track(id, MediaKind::Audio)
    }

    fn create_video_source(&self, _is_screencast: bool) -> BridgeResult<Arc<dyn MediaSource>> {
        Ok(self.new_source(MediaKind::Video))
    }

    fn create_video_track(&self, id: &str, _source: &Arc<dyn MediaSource>) -> Arc<dyn MediaStreamTrack> {
        self.new_track(id, MediaKind::Video)
    }

    fn create_render_helper(&self, _thread_name: &str) -> Option<Arc<dyn RenderHelper>> {
        if self.refuse_render_helper.load(Ordering::SeqCst) {
            return None;
        }
        let helper = Arc::new(FakeRenderHelper::default());
        self.helpers.lock().push(helper.clone());
        Some(helper)
    }

    fn create_local_media_stream(&self, id: &str) -> Arc<dyn MediaStream> {
        let stream = FakeStream::new(id, Vec::new());
        self.streams.lock().push(stream.clone());
        stream
    }

    fn create_peer_connection(
        &self,
        _configuration: &RtcConfiguration,
        observer: Arc<dyn PeerConnectionObserver>,
    ) -> Option<Arc<dyn PeerConnection>> {
        if self.refuse_peer_connection.load(Ordering::SeqCst) {
            return None;
        }
        let pc = Arc::new(FakePeerConnection::default());
        self.sessions.lock().push((pc.clone(), observer));
        Some(pc)
    }
}

/// Fake camera enumerator
#[derive(Default)]
pub struct FakeCameraEnumerator {
    /// (name, front facing) per device
    pub devices: Vec<(String, bool)>,
    /// Devices whose facing query fails
    pub broken: Vec<String>,
    /// Devices that yield no capturer
    pub unavailable: Vec<String>,
    /// Capturers handed out so far
    pub capturers: Mutex<Vec<Arc<FakeCapturer>>>,
}

impl FakeCameraEnumerator {
    /// Enumerator with one front and one back camera
    pub fn front_and_back() -> Arc<Self> {
        Arc::new(Self {
            devices: vec![
                ("Camera 0, Facing front".to_string(), true),
                ("Camera 1, Facing back".to_string(), false),
            ],
            ..Default::default()
        })
    }

    /// Enumerator without cameras
    pub fn empty() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Most recently created capturer
    pub fn last_capturer(&self) -> Option<Arc<FakeCapturer>> {
        self.capturers.lock().last().cloned()
    }
}

impl CameraEnumerator for FakeCameraEnumerator {
    fn device_names(&self) -> Vec<String> {
        self.devices.iter().map(|(name, _)| name.clone()).collect()
    }

    fn is_front_facing(&self, name: &str) -> BridgeResult<bool> {
        if self.broken.iter().any(|b| b == name) {
            return Err(BridgeError::Device {
                reason: format!("cannot query {}", name),
            });
        }
        self.devices
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, front)| *front)
            .ok_or_else(|| BridgeError::not_found("camera", name))
    }

    fn create_capturer(&self, name: &str) -> Option<Arc<dyn VideoCapturer>> {
        if self.unavailable.iter().any(|u| u == name) {
            return None;
        }
        let capturer = FakeCapturer::camera(name);
        self.capturers.lock().push(capturer.clone());
        Some(capturer)
    }
}

/// Fake host context
pub struct FakeHost {
    /// Camera enumerator
    pub cameras: Arc<FakeCameraEnumerator>,
    /// Whether a foreground context exists
    pub foreground: AtomicBool,
    /// Whether the screen-capture service is reachable
    pub screen_available: AtomicBool,
    /// Whether the user grants screen capture
    pub grant_screen: AtomicBool,
    /// Hold permission requests until [`release_permission`](Self::release_permission)
    pub hold_permission: AtomicBool,
    release: Notify,
    /// Screen capturers handed out so far
    pub screen_capturers: Mutex<Vec<Arc<FakeCapturer>>>,
}

impl FakeHost {
    /// Foreground host with two cameras that grants screen capture
    pub fn new() -> Arc<Self> {
        Self::with_cameras(FakeCameraEnumerator::front_and_back())
    }

    /// Foreground host with the given cameras
    pub fn with_cameras(cameras: Arc<FakeCameraEnumerator>) -> Arc<Self> {
        Arc::new(Self {
            cameras,
            foreground: AtomicBool::new(true),
            screen_available: AtomicBool::new(true),
            grant_screen: AtomicBool::new(true),
            hold_permission: AtomicBool::new(false),
            release: Notify::new(),
            screen_capturers: Mutex::new(Vec::new()),
        })
    }

    /// Let a held permission request complete
    pub fn release_permission(&self) {
        self.release.notify_one();
    }
}

#[async_trait]
impl HostContext for FakeHost {
    fn has_foreground_context(&self) -> bool {
        self.foreground.load(Ordering::SeqCst)
    }

    fn camera_enumerator(&self) -> Arc<dyn CameraEnumerator> {
        self.cameras.clone()
    }

    fn display_metrics(&self) -> DisplayMetrics {
        DisplayMetrics {
            width: 1080,
            height: 2340,
        }
    }

    fn screen_capture_available(&self) -> bool {
        self.screen_available.load(Ordering::SeqCst)
    }

    async fn request_screen_capture(&self) -> BridgeResult<ScreenCaptureGrant> {
        if self.hold_permission.load(Ordering::SeqCst) {
            self.release.notified().await;
        }
        if self.grant_screen.load(Ordering::SeqCst) {
            Ok(ScreenCaptureGrant {
                token: next_id("grant"),
            })
        } else {
            Err(BridgeError::PermissionDenied {
                reason: "user declined screen capture".to_string(),
            })
        }
    }

    fn create_screen_capturer(
        &self,
        _grant: &ScreenCaptureGrant,
        _width: u32,
        _height: u32,
    ) -> Option<Arc<dyn VideoCapturer>> {
        let capturer = FakeCapturer::screen();
        self.screen_capturers.lock().push(capturer.clone());
        Some(capturer)
    }
}

/// Fake RTP sender
pub struct FakeSender {
    id: String,
    track: Mutex<Option<Arc<dyn MediaStreamTrack>>>,
}

impl RtpSender for FakeSender {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn track(&self) -> Option<Arc<dyn MediaStreamTrack>> {
        self.track.lock().clone()
    }
}

/// Fake RTP receiver
pub struct FakeReceiver {
    id: String,
    /// Received track
    pub track: Arc<FakeTrack>,
}

impl RtpReceiver for FakeReceiver {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn track(&self) -> Arc<dyn MediaStreamTrack> {
        self.track.clone()
    }
}

/// Fake RTP transceiver
pub struct FakeTransceiver {
    mid: Option<String>,
    /// Sending half
    pub sender: Arc<FakeSender>,
    /// Receiving half
    pub receiver: Arc<FakeReceiver>,
    direction: Mutex<RtpTransceiverDirection>,
}

impl FakeTransceiver {
    /// Change the preferred direction
    pub fn set_direction(&self, direction: RtpTransceiverDirection) {
        *self.direction.lock() = direction;
    }
}

impl RtpTransceiver for FakeTransceiver {
    fn mid(&self) -> Option<String> {
        self.mid.clone()
    }

    fn sender(&self) -> Arc<dyn RtpSender> {
        self.sender.clone()
    }

    fn receiver(&self) -> Arc<dyn RtpReceiver> {
        self.receiver.clone()
    }

    fn direction(&self) -> RtpTransceiverDirection {
        *self.direction.lock()
    }

    fn current_direction(&self) -> Option<RtpTransceiverDirection> {
        None
    }

    fn is_stopped(&self) -> bool {
        false
    }
}

/// Fake data channel
pub struct FakeDataChannel {
    label: String,
    id: i32,
    state: Mutex<DataChannelState>,
    buffered: AtomicU64,
    observer: Mutex<Option<Arc<dyn DataChannelObserver>>>,
    /// Init the channel was created with
    pub init: DataChannelInit,
    /// Buffers sent so far
    pub sent: Mutex<Vec<DataBuffer>>,
    /// Number of `unregister_observer` calls
    pub unregister_count: AtomicUsize,
    /// Number of `close` calls
    pub close_count: AtomicUsize,
    /// Make `send` refuse every buffer
    pub refuse_sends: AtomicBool,
}

impl FakeDataChannel {
    /// Create a connecting channel
    pub fn new(label: impl Into<String>, id: i32, init: DataChannelInit) -> Arc<Self> {
        Arc::new(Self {
            label: label.into(),
            id,
            state: Mutex::new(DataChannelState::Connecting),
            buffered: AtomicU64::new(0),
            observer: Mutex::new(None),
            init,
            sent: Mutex::new(Vec::new()),
            unregister_count: AtomicUsize::new(0),
            close_count: AtomicUsize::new(0),
            refuse_sends: AtomicBool::new(false),
        })
    }

    fn observer(&self) -> Option<Arc<dyn DataChannelObserver>> {
        self.observer.lock().clone()
    }

    /// Whether an observer is registered
    pub fn has_observer(&self) -> bool {
        self.observer.lock().is_some()
    }

    /// Change state and notify the observer
    pub fn set_state(&self, state: DataChannelState) {
        *self.state.lock() = state;
        if let Some(observer) = self.observer() {
            observer.on_state_change();
        }
    }

    /// Deliver an inbound message
    pub fn receive(&self, buffer: DataBuffer) {
        if let Some(observer) = self.observer() {
            observer.on_message(buffer);
        }
    }

    /// Change the buffered amount and notify the observer
    pub fn set_buffered_amount(&self, amount: u64) {
        let previous = self.buffered.swap(amount, Ordering::SeqCst);
        if let Some(observer) = self.observer() {
            observer.on_buffered_amount_change(previous);
        }
    }
}

impl DataChannel for FakeDataChannel {
    fn label(&self) -> String {
        self.label.clone()
    }

    fn id(&self) -> i32 {
        self.id
    }

    fn state(&self) -> DataChannelState {
        *self.state.lock()
    }

    fn buffered_amount(&self) -> u64 {
        self.buffered.load(Ordering::SeqCst)
    }

    fn register_observer(&self, observer: Arc<dyn DataChannelObserver>) {
        *self.observer.lock() = Some(observer);
    }

    fn unregister_observer(&self) {
        self.unregister_count.fetch_add(1, Ordering::SeqCst);
        *self.observer.lock() = None;
    }

    fn send(&self, buffer: DataBuffer) -> bool {
        if self.refuse_sends.load(Ordering::SeqCst) {
            return false;
        }
        self.sent.lock().push(buffer);
        true
    }

    fn close(&self) {
        self.close_count.fetch_add(1, Ordering::SeqCst);
    }
}

/// Fake peer connection
#[derive(Default)]
pub struct FakePeerConnection {
    /// Transceivers, in creation order
    pub transceivers: Mutex<Vec<Arc<FakeTransceiver>>>,
    /// Extra senders not attached to a transceiver
    pub extra_senders: Mutex<Vec<Arc<FakeSender>>>,
    /// Current local description
    pub local_description: Mutex<Option<SessionDescription>>,
    /// Channels created so far
    pub data_channels: Mutex<Vec<Arc<FakeDataChannel>>>,
    /// Report returned by every stats query
    pub stats: Mutex<RtcStatsReport>,
    /// Targets queried so far ("connection", "sender:<id>", "receiver:<id>")
    pub stats_queries: Mutex<Vec<String>>,
    /// Refuse to create data channels
    pub refuse_data_channels: AtomicBool,
    /// Number of `close` calls
    pub close_count: AtomicUsize,
    /// Number of `dispose` calls
    pub dispose_count: AtomicUsize,
}

impl FakePeerConnection {
    fn new_transceiver(
        &self,
        kind: MediaKind,
        local: Option<Arc<dyn MediaStreamTrack>>,
        direction: RtpTransceiverDirection,
    ) -> Arc<FakeTransceiver> {
        let index = self.transceivers.lock().len();
        let transceiver = Arc::new(FakeTransceiver {
            mid: Some(index.to_string()),
            sender: Arc::new(FakeSender {
                id: next_id("sender"),
                track: Mutex::new(local),
            }),
            receiver: Arc::new(FakeReceiver {
                id: next_id("receiver"),
                track: FakeTrack::new(next_id("remote-track"), kind),
            }),
            direction: Mutex::new(direction),
        });
        self.transceivers.lock().push(transceiver.clone());
        transceiver
    }

    /// Add a receive transceiver carrying a fresh remote track
    pub fn add_remote(&self, kind: MediaKind) -> Arc<FakeTransceiver> {
        self.new_transceiver(kind, None, RtpTransceiverDirection::RecvOnly)
    }

    /// A receiver that belongs to no transceiver
    pub fn orphan_receiver(kind: MediaKind) -> Arc<FakeReceiver> {
        Arc::new(FakeReceiver {
            id: next_id("orphan-receiver"),
            track: FakeTrack::new(next_id("orphan-track"), kind),
        })
    }

    /// Attach a sender carrying `track` outside any transceiver
    pub fn add_sender(&self, track: Arc<dyn MediaStreamTrack>) -> Arc<FakeSender> {
        let sender = Arc::new(FakeSender {
            id: next_id("sender"),
            track: Mutex::new(Some(track)),
        });
        self.extra_senders.lock().push(sender.clone());
        sender
    }

    /// Most recently created data channel
    pub fn last_data_channel(&self) -> Option<Arc<FakeDataChannel>> {
        self.data_channels.lock().last().cloned()
    }

    /// Number of `dispose` calls
    pub fn disposed(&self) -> usize {
        self.dispose_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PeerConnection for FakePeerConnection {
    fn senders(&self) -> Vec<Arc<dyn RtpSender>> {
        let mut senders: Vec<Arc<dyn RtpSender>> = self
            .transceivers
            .lock()
            .iter()
            .map(|t| t.sender.clone() as Arc<dyn RtpSender>)
            .collect();
        senders.extend(
            self.extra_senders
                .lock()
                .iter()
                .map(|s| s.clone() as Arc<dyn RtpSender>),
        );
        senders
    }

    fn receivers(&self) -> Vec<Arc<dyn RtpReceiver>> {
        self.transceivers
            .lock()
            .iter()
            .map(|t| t.receiver.clone() as Arc<dyn RtpReceiver>)
            .collect()
    }

    fn transceivers(&self) -> Vec<Arc<dyn RtpTransceiver>> {
        self.transceivers
            .lock()
            .iter()
            .map(|t| t.clone() as Arc<dyn RtpTransceiver>)
            .collect()
    }

    fn local_description(&self) -> Option<SessionDescription> {
        self.local_description.lock().clone()
    }

    fn create_data_channel(&self, label: &str, init: &DataChannelInit) -> Option<Arc<dyn DataChannel>> {
        if self.refuse_data_channels.load(Ordering::SeqCst) {
            return None;
        }
        let id = if init.id >= 0 {
            init.id
        } else {
            self.data_channels.lock().len() as i32
        };
        let channel = FakeDataChannel::new(label, id, init.clone());
        self.data_channels.lock().push(channel.clone());
        Some(channel)
    }

    fn add_transceiver(
        &self,
        source: TransceiverSource,
        init: &RtpTransceiverInit,
    ) -> Option<Arc<dyn RtpTransceiver>> {
        let transceiver = match source {
            TransceiverSource::Kind(kind) => self.new_transceiver(kind, None, init.direction),
            TransceiverSource::Track(track) => {
                let kind = track.kind();
                self.new_transceiver(kind, Some(track), init.direction)
            }
        };
        Some(transceiver)
    }

    async fn get_stats(&self, target: StatsTarget) -> RtcStatsReport {
        let query = match &target {
            StatsTarget::Connection => "connection".to_string(),
            StatsTarget::Sender(sender) => format!("sender:{}", sender.id()),
            StatsTarget::Receiver(receiver) => format!("receiver:{}", receiver.id()),
        };
        self.stats_queries.lock().push(query);
        self.stats.lock().clone()
    }

    fn close(&self) {
        self.close_count.fetch_add(1, Ordering::SeqCst);
    }

    fn dispose(&self) {
        self.dispose_count.fetch_add(1, Ordering::SeqCst);
    }
}
