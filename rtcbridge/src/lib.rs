//! # rtcbridge
//!
//! Media track lifecycle and peer connection event bridging for a native
//! WebRTC engine.
//!
//! The bridge sits between an engine (expressed through the capability traits
//! of [`rtcbridge_core`]) and a consumer that issues commands and reads one
//! ordered stream of events:
//!
//! - local tracks are created, cloned, enabled and disposed through the
//!   [`TrackRegistry`], which releases shared capture resources exactly once;
//! - every native callback is funnelled through one [`SerialExecutor`], so
//!   the consumer observes a single total order of [`BridgeEvent`]s.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rtcbridge::{RtcBridge, RtcConfiguration, UserMediaConstraints};
//!
//! # async fn example(engine: std::sync::Arc<dyn rtcbridge::MediaEngine>,
//! #                  host: std::sync::Arc<dyn rtcbridge::HostContext>) -> rtcbridge::BridgeResult<()> {
//! let bridge = RtcBridge::init(engine, host)?;
//! let mut events = bridge.events().expect("events are taken once");
//!
//! let constraints = UserMediaConstraints {
//!     audio: Some(serde_json::json!(true)),
//!     video: Some(serde_json::json!({"facingMode": "user"})),
//! };
//! let stream = bridge.get_user_media(constraints).await?;
//! println!("local stream {}", stream.stream_id);
//! bridge.peer_connection_init(0, RtcConfiguration::default()).await?;
//!
//! while let Some(event) = events.next().await {
//!     println!("{}", event.to_record());
//! }
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

// Re-export core types for easy access
pub use rtcbridge_core::{
    BridgeError, BridgeEvent, BridgeResult, CaptureSettings, DataChannelInfo, HostContext,
    MediaDeviceInfo, MediaEngine, MediaKind, RtcConfiguration, RtpTransceiverInit,
    SerialExecutor, TrackInfo, TransceiverInfo, VideoFrameProcessor,
};
pub use rtcbridge_media::{
    LocalStreamInfo, MuteTiming, ProcessorRegistry, VideoConstraints, VideoDefaults,
};

// Public API modules
pub mod config;
pub mod data_channel;
pub mod event;
pub mod media_devices;
pub mod session;

// Re-export main API types
pub use config::BridgeConfig;
pub use data_channel::{DataChannelOptions, DataChannelSupervisor, DataChannelWrapper};
pub use event::{EventFilter, EventStream, FilteredEventStream};
pub use media_devices::{DisplayMediaInfo, MediaDevices, UserMediaConstraints};
pub use session::{AddedTransceiver, SessionObserver, StatsRequest};

use dashmap::DashMap;
use parking_lot::Mutex;
use rtcbridge_core::{EventEmitter, EventSink, RtcStatsReport, TransceiverSource};
use rtcbridge_diagnostics::{stats_to_json, DebugLogger};
use rtcbridge_media::{StreamAssembler, TrackRegistry};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info};

/// What a transceiver is added for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransceiverRequest {
    /// A media kind without a track
    Kind(MediaKind),
    /// A registered local track, by id
    Track(String),
}

/// Main entry point of the bridge
#[derive(Clone)]
pub struct RtcBridge {
    inner: Arc<BridgeInner>,
}

struct BridgeInner {
    engine: Arc<dyn MediaEngine>,
    executor: SerialExecutor,
    emitter: EventEmitter,
    events: Mutex<Option<UnboundedReceiver<BridgeEvent>>>,
    tracks: Arc<TrackRegistry>,
    streams: Arc<StreamAssembler>,
    sessions: DashMap<i32, SessionObserver>,
    devices: MediaDevices,
    config: BridgeConfig,
}

impl BridgeInner {
    fn session(&self, pc_id: i32) -> BridgeResult<SessionObserver> {
        self.sessions
            .get(&pc_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| BridgeError::not_found("peer connection", pc_id.to_string()))
    }
}

impl RtcBridge {
    /// Initialize the bridge with default settings
    ///
    /// Must be called within a tokio runtime.
    pub fn init(engine: Arc<dyn MediaEngine>, host: Arc<dyn HostContext>) -> BridgeResult<Self> {
        Self::init_with(engine, host, BridgeConfig::default())
    }

    /// Initialize with custom configuration
    pub fn init_with(
        engine: Arc<dyn MediaEngine>,
        host: Arc<dyn HostContext>,
        config: BridgeConfig,
    ) -> BridgeResult<Self> {
        config.validate()?;

        if config.debug_logging {
            let logger = match &config.log_filter {
                Some(filter) => DebugLogger::with_filter(filter.clone()),
                None => DebugLogger::new(),
            };
            logger.init_logging();
        }

        let executor = SerialExecutor::spawn("rtcbridge")?;
        let (sink, events) = EventSink::channel();
        let emitter = EventEmitter::new(executor.clone(), sink);

        let tracks = Arc::new(TrackRegistry::new(
            engine.clone(),
            emitter.clone(),
            config.capture_thread_name.clone(),
        ));
        let streams = Arc::new(StreamAssembler::new(engine.clone(), tracks.clone()));
        let devices = MediaDevices::new(
            host,
            tracks.clone(),
            streams.clone(),
            executor.clone(),
            config.video_defaults,
        );

        info!("🚀 rtcbridge initialized");
        Ok(Self {
            inner: Arc::new(BridgeInner {
                engine,
                executor,
                emitter,
                events: Mutex::new(Some(events)),
                tracks,
                streams,
                sessions: DashMap::new(),
                devices,
                config,
            }),
        })
    }

    /// Get the global configuration
    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    /// Take the consumer event stream; `None` after the first call
    pub fn events(&self) -> Option<EventStream> {
        self.inner.events.lock().take().map(EventStream::new)
    }

    /// Local track registry
    pub fn tracks(&self) -> &Arc<TrackRegistry> {
        &self.inner.tracks
    }

    /// Named video effects available to camera tracks
    pub fn video_effects(&self) -> &Arc<ProcessorRegistry> {
        self.inner.tracks.processors()
    }

    /// Session by id
    pub fn session(&self, pc_id: i32) -> Option<SessionObserver> {
        self.inner.session(pc_id).ok()
    }

    async fn run<F, T>(&self, command: F) -> BridgeResult<T>
    where
        F: FnOnce(&BridgeInner) -> BridgeResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let inner = self.inner.clone();
        self.inner.executor.call(move || command(&inner)).await?
    }

    // ------------------------------------------------------------------
    // Devices
    // ------------------------------------------------------------------

    /// Describe every camera plus the audio input
    pub async fn enumerate_devices(&self) -> BridgeResult<Vec<MediaDeviceInfo>> {
        self.run(|inner| Ok(inner.devices.enumerate_devices())).await
    }

    /// Acquire local audio and/or camera media
    pub async fn get_user_media(&self, constraints: UserMediaConstraints) -> BridgeResult<LocalStreamInfo> {
        self.run(move |inner| inner.devices.get_user_media(&constraints)).await
    }

    /// Acquire the screen
    pub async fn get_display_media(&self) -> BridgeResult<DisplayMediaInfo> {
        self.inner.devices.get_display_media().await
    }

    // ------------------------------------------------------------------
    // Tracks and streams
    // ------------------------------------------------------------------

    /// Enable or disable a local track
    pub async fn media_stream_track_set_enabled(&self, track_id: String, enabled: bool) -> BridgeResult<()> {
        self.run(move |inner| {
            inner.tracks.set_enabled(&track_id, enabled);
            Ok(())
        })
        .await
    }

    /// Dispose a local track; unknown ids are ignored
    pub async fn media_stream_track_release(&self, track_id: String) -> BridgeResult<()> {
        self.run(move |inner| {
            if !inner.tracks.dispose(&track_id) {
                debug!("Track {} already released", track_id);
            }
            Ok(())
        })
        .await
    }

    /// Clone a local track and return the clone's id
    pub async fn media_stream_track_clone(&self, track_id: String) -> BridgeResult<String> {
        self.run(move |inner| {
            inner
                .tracks
                .clone_track(&track_id)
                .map(|clone| clone.id().to_string())
        })
        .await
    }

    /// Install named effects on a camera track, or clear them with `None`
    ///
    /// Unknown track ids and non-camera tracks are ignored.
    pub async fn media_stream_track_set_video_effects(
        &self,
        track_id: String,
        names: Option<Vec<String>>,
    ) -> BridgeResult<()> {
        self.run(move |inner| {
            inner.tracks.set_video_effects(&track_id, names.as_deref());
            Ok(())
        })
        .await
    }

    /// Apply new constraints to a local video track
    pub async fn media_stream_track_apply_constraints(
        &self,
        track_id: String,
        constraints: VideoConstraints,
    ) -> BridgeResult<CaptureSettings> {
        let result = self.inner.tracks.apply_constraints(&track_id, constraints).await;
        // Completion is delivered in executor order
        self.inner.executor.call(move || result).await?
    }

    /// Assemble a local stream from registered tracks
    pub async fn media_stream_create(&self, track_ids: Vec<String>) -> BridgeResult<LocalStreamInfo> {
        self.run(move |inner| Ok(inner.streams.create_stream(&track_ids))).await
    }

    /// Forget a local stream; its tracks stay registered
    pub async fn media_stream_release(&self, stream_id: String) -> BridgeResult<bool> {
        self.run(move |inner| Ok(inner.streams.release(&stream_id))).await
    }

    // ------------------------------------------------------------------
    // Peer connections
    // ------------------------------------------------------------------

    /// Create session `pc_id`
    pub async fn peer_connection_init(&self, pc_id: i32, configuration: RtcConfiguration) -> BridgeResult<()> {
        self.run(move |inner| {
            if inner.sessions.contains_key(&pc_id) {
                return Err(BridgeError::invalid_state(format!(
                    "peer connection {} already exists",
                    pc_id
                )));
            }
            let session = SessionObserver::create(
                inner.engine.as_ref(),
                &configuration,
                pc_id,
                inner.emitter.clone(),
                inner.config.mute_timing,
            )?;
            inner.sessions.insert(pc_id, session);
            Ok(())
        })
        .await
    }

    /// Close session `pc_id`; its registries are kept until disposal
    pub async fn peer_connection_close(&self, pc_id: i32) -> BridgeResult<()> {
        self.run(move |inner| {
            inner.session(pc_id)?.close();
            Ok(())
        })
        .await
    }

    /// Dispose session `pc_id`; unknown or already disposed ids are ignored
    pub async fn peer_connection_dispose(&self, pc_id: i32) -> BridgeResult<()> {
        self.run(move |inner| {
            if let Some((_, session)) = inner.sessions.remove(&pc_id) {
                session.dispose();
            }
            Ok(())
        })
        .await
    }

    /// Add a transceiver to session `pc_id`
    pub async fn peer_connection_add_transceiver(
        &self,
        pc_id: i32,
        request: TransceiverRequest,
        init: RtpTransceiverInit,
    ) -> BridgeResult<AddedTransceiver> {
        self.run(move |inner| {
            let session = inner.session(pc_id)?;
            let source = match request {
                TransceiverRequest::Kind(kind) => TransceiverSource::Kind(kind),
                TransceiverRequest::Track(track_id) => TransceiverSource::Track(
                    inner
                        .tracks
                        .native_track(&track_id)
                        .ok_or_else(|| BridgeError::not_found("track", track_id))?,
                ),
            };
            session.add_transceiver(source, &init)
        })
        .await
    }

    /// Transceiver of session `pc_id` owning sender `sender_id`
    pub async fn peer_connection_get_transceiver(
        &self,
        pc_id: i32,
        sender_id: String,
    ) -> BridgeResult<TransceiverInfo> {
        self.run(move |inner| {
            let transceiver = inner
                .session(pc_id)?
                .transceiver(&sender_id)
                .ok_or_else(|| BridgeError::not_found("transceiver", sender_id))?;
            Ok(TransceiverInfo::from_transceiver(pc_id, transceiver.as_ref()))
        })
        .await
    }

    async fn stats(&self, pc_id: i32, request: OwnedStatsRequest) -> BridgeResult<String> {
        let (session, target) = self
            .run(move |inner| {
                let session = inner.session(pc_id)?;
                let target = session.stats_target(request.as_request());
                Ok((session, target))
            })
            .await?;

        let report: RtcStatsReport = session.get_stats(target).await;
        self.inner
            .executor
            .call(move || stats_to_json(&report))
            .await
    }

    /// Stats of the whole connection, as JSON
    pub async fn peer_connection_get_stats(&self, pc_id: i32) -> BridgeResult<String> {
        self.stats(pc_id, OwnedStatsRequest::Connection).await
    }

    /// Stats of one receiver, as JSON; an unknown receiver yields an empty report
    pub async fn receiver_get_stats(&self, pc_id: i32, receiver_id: String) -> BridgeResult<String> {
        self.stats(pc_id, OwnedStatsRequest::Receiver(receiver_id)).await
    }

    /// Stats of one sender, as JSON; an unknown sender yields an empty report
    pub async fn sender_get_stats(&self, pc_id: i32, sender_id: String) -> BridgeResult<String> {
        self.stats(pc_id, OwnedStatsRequest::Sender(sender_id)).await
    }

    // ------------------------------------------------------------------
    // Data channels
    // ------------------------------------------------------------------

    /// Create a data channel on session `pc_id`
    ///
    /// Resolves with `None` when the engine refuses the channel.
    pub async fn create_data_channel(
        &self,
        pc_id: i32,
        label: String,
        options: DataChannelOptions,
    ) -> BridgeResult<Option<DataChannelInfo>> {
        self.run(move |inner| Ok(inner.session(pc_id)?.create_data_channel(&label, &options)))
            .await
    }

    /// Close a data channel; its observer keeps reporting the final states
    pub async fn data_channel_close(&self, pc_id: i32, react_tag: String) -> BridgeResult<()> {
        self.run(move |inner| inner.session(pc_id)?.data_channels().close(&react_tag))
            .await
    }

    /// Unregister a data channel and forget it
    pub async fn data_channel_dispose(&self, pc_id: i32, react_tag: String) -> BridgeResult<()> {
        self.run(move |inner| {
            inner.session(pc_id)?.data_channels().dispose_channel(&react_tag);
            Ok(())
        })
        .await
    }

    /// Send a `text` or base64 `binary` payload
    pub async fn data_channel_send(
        &self,
        pc_id: i32,
        react_tag: String,
        data: String,
        kind: String,
    ) -> BridgeResult<()> {
        self.run(move |inner| {
            inner
                .session(pc_id)?
                .data_channels()
                .send(&react_tag, &data, &kind)
        })
        .await
    }

    // ------------------------------------------------------------------
    // Shutdown
    // ------------------------------------------------------------------

    /// Dispose every session and stop the executor
    ///
    /// Local tracks are left to the consumer to release.
    pub async fn shutdown(&self) -> BridgeResult<()> {
        self.run(|inner| {
            let ids: Vec<i32> = inner.sessions.iter().map(|entry| *entry.key()).collect();
            for id in ids {
                if let Some((_, session)) = inner.sessions.remove(&id) {
                    session.dispose();
                }
            }
            Ok(())
        })
        .await?;
        self.inner.executor.shutdown();
        info!("rtcbridge shut down");
        Ok(())
    }
}

enum OwnedStatsRequest {
    Connection,
    Sender(String),
    Receiver(String),
}

impl OwnedStatsRequest {
    fn as_request(&self) -> StatsRequest<'_> {
        match self {
            OwnedStatsRequest::Connection => StatsRequest::Connection,
            OwnedStatsRequest::Sender(id) => StatsRequest::Sender(id),
            OwnedStatsRequest::Receiver(id) => StatsRequest::Receiver(id),
        }
    }
}
