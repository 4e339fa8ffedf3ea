//! Peer connection sessions
//!
//! A [`SessionObserver`] is bound to one native peer connection. Native
//! callbacks are turned into executor jobs that update the remote-side
//! registries and write [`BridgeEvent`]s to the sink, so the consumer sees
//! them in a single total order. Once the session is disposed, pending and
//! late callbacks are dropped.

use crate::data_channel::{DataChannelOptions, DataChannelSupervisor};
use parking_lot::{Mutex, RwLock};
use rtcbridge_core::{
    BridgeError, BridgeEvent, BridgeResult, DataChannel, DataChannelInfo, DescriptionSnapshot,
    EventEmitter, IceCandidate, IceConnectionState, IceGatheringState, MediaEngine, MediaKind,
    MediaStream, MediaStreamTrack, PeerConnection, PeerConnectionObserver, PeerConnectionState,
    ReceiverInfo, RtcConfiguration, RtcStatsReport, RtpReceiver, RtpSender, RtpTransceiver,
    RtpTransceiverInit, SignalingState, StatsTarget, StreamInfo, TransceiverInfo,
    TransceiverSource,
};
use rtcbridge_media::{MuteTiming, VideoTrackAdapter};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Result of adding a transceiver
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddedTransceiver {
    /// Arrival order, shared with remote track announcements
    pub transceiver_order: u32,
    /// Transceiver descriptor
    pub transceiver: TransceiverInfo,
}

#[derive(Default)]
struct RemoteState {
    /// Native stream id to external handle
    stream_ids: HashMap<String, String>,
    /// External handle to stream
    streams: HashMap<String, Arc<dyn MediaStream>>,
    /// Native track id to track
    tracks: HashMap<String, Arc<dyn MediaStreamTrack>>,
    next_transceiver_order: u32,
}

impl RemoteState {
    fn next_order(&mut self) -> u32 {
        let order = self.next_transceiver_order;
        self.next_transceiver_order += 1;
        order
    }
}

struct SessionInner {
    pc_id: i32,
    emitter: EventEmitter,
    pc: RwLock<Option<Arc<dyn PeerConnection>>>,
    remote: Mutex<RemoteState>,
    adapter: VideoTrackAdapter,
    data_channels: DataChannelSupervisor,
    disposed: AtomicBool,
}

impl SessionInner {
    fn pc(&self) -> Option<Arc<dyn PeerConnection>> {
        self.pc.read().clone()
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    fn local_description(&self) -> DescriptionSnapshot {
        DescriptionSnapshot(self.pc().and_then(|pc| pc.local_description()))
    }

    fn send(&self, event: BridgeEvent) {
        self.emitter.sink().send(event);
    }

    fn handle_add_track(&self, receiver: Arc<dyn RtpReceiver>, streams: Vec<Arc<dyn MediaStream>>) {
        let Some(pc) = self.pc() else {
            return;
        };
        let receiver_id = receiver.id();
        let Some(transceiver) = pc
            .transceivers()
            .into_iter()
            .find(|t| t.receiver().id() == receiver_id)
        else {
            debug!(
                "No transceiver for receiver {} on session {}, dropping track event",
                receiver_id, self.pc_id
            );
            return;
        };

        let track = receiver.track();
        let track_id = track.id();

        let (stream_infos, order) = {
            let mut remote = self.remote.lock();

            // Direction changes re-announce known tracks; register only once
            if !remote.tracks.contains_key(&track_id) {
                if track.kind() == MediaKind::Video {
                    self.adapter.add_dimension_detector(track.clone());
                    self.adapter.add_adapter(track.clone());
                }
                remote.tracks.insert(track_id.clone(), track);
                debug!("Registered remote {} on session {}", track_id, self.pc_id);
            }

            let mut stream_infos = Vec::with_capacity(streams.len());
            for stream in streams {
                let handle = remote
                    .stream_ids
                    .entry(stream.id())
                    .or_insert_with(|| Uuid::new_v4().to_string())
                    .clone();
                stream_infos.push(StreamInfo::remote(&handle, stream.as_ref()));
                remote.streams.insert(handle, stream);
            }
            (stream_infos, remote.next_order())
        };

        self.send(BridgeEvent::TrackAdded {
            pc_id: self.pc_id,
            streams: stream_infos,
            receiver: ReceiverInfo::from_receiver(receiver.as_ref()),
            transceiver_order: order,
            transceiver: TransceiverInfo::from_transceiver(self.pc_id, transceiver.as_ref()),
        });
    }

    fn dispose(&self) {
        let remote = std::mem::take(&mut *self.remote.lock());
        for track_id in remote.tracks.keys() {
            self.adapter.remove_dimension_detector(track_id);
            self.adapter.remove_adapter(track_id);
        }

        let pc = self.pc.write().take();
        if let Some(pc) = &pc {
            for track in pc.senders().iter().filter_map(|s| s.track()) {
                if track.kind() == MediaKind::Video {
                    self.adapter.remove_adapter(&track.id());
                }
            }
        }
        self.data_channels.dispose_all();
        if let Some(pc) = pc {
            pc.dispose();
        }

        info!(
            "🧹 Disposed session {} ({} remote tracks, {} remote streams)",
            self.pc_id,
            remote.tracks.len(),
            remote.streams.len()
        );
    }
}

/// Native callback entry point, held by the engine
///
/// Holds the session weakly: the session owns the peer connection, which
/// owns this observer.
struct NativeObserver {
    session: Weak<SessionInner>,
}

impl NativeObserver {
    fn enqueue<F>(&self, handler: F)
    where
        F: FnOnce(&SessionInner) + Send + 'static,
    {
        let Some(session) = self.session.upgrade() else {
            return;
        };
        if session.is_disposed() {
            return;
        }
        let job_session = session.clone();
        session.emitter.executor().execute(move || {
            if job_session.is_disposed() {
                return;
            }
            handler(&job_session);
        });
    }
}

impl PeerConnectionObserver for NativeObserver {
    fn on_ice_candidate(&self, candidate: IceCandidate) {
        self.enqueue(move |s| {
            s.send(BridgeEvent::IceCandidate {
                pc_id: s.pc_id,
                candidate,
                sdp: s.local_description(),
            })
        });
    }

    fn on_ice_connection_change(&self, state: IceConnectionState) {
        self.enqueue(move |s| {
            s.send(BridgeEvent::IceConnectionChanged {
                pc_id: s.pc_id,
                ice_connection_state: state,
            })
        });
    }

    fn on_connection_change(&self, state: PeerConnectionState) {
        self.enqueue(move |s| {
            s.send(BridgeEvent::ConnectionStateChanged {
                pc_id: s.pc_id,
                connection_state: state,
            })
        });
    }

    fn on_ice_gathering_change(&self, state: IceGatheringState) {
        self.enqueue(move |s| {
            let sdp = (state == IceGatheringState::Complete).then(|| s.local_description());
            s.send(BridgeEvent::IceGatheringChanged {
                pc_id: s.pc_id,
                ice_gathering_state: state,
                sdp,
            })
        });
    }

    fn on_signaling_change(&self, state: SignalingState) {
        self.enqueue(move |s| {
            s.send(BridgeEvent::SignalingStateChanged {
                pc_id: s.pc_id,
                signaling_state: state,
            })
        });
    }

    fn on_data_channel(&self, channel: Arc<dyn DataChannel>) {
        self.enqueue(move |s| {
            let data_channel = s.data_channels.register(channel, None);
            s.send(BridgeEvent::DataChannelOpened {
                pc_id: s.pc_id,
                data_channel,
            })
        });
    }

    fn on_renegotiation_needed(&self) {
        self.enqueue(|s| s.send(BridgeEvent::RenegotiationNeeded { pc_id: s.pc_id }));
    }

    fn on_add_track(&self, receiver: Arc<dyn RtpReceiver>, streams: Vec<Arc<dyn MediaStream>>) {
        self.enqueue(move |s| s.handle_add_track(receiver, streams));
    }

    fn on_remove_track(&self, receiver: Arc<dyn RtpReceiver>) {
        // Remote registries keep the track until the session is disposed
        self.enqueue(move |s| {
            s.send(BridgeEvent::TrackRemoved {
                pc_id: s.pc_id,
                receiver_id: receiver.id(),
            })
        });
    }
}

/// One peer connection and its remote-side registries
#[derive(Clone)]
pub struct SessionObserver {
    inner: Arc<SessionInner>,
}

impl SessionObserver {
    /// Create the native peer connection for session `pc_id`
    ///
    /// Fails with `InvalidStateError` when the engine refuses to create it.
    pub fn create(
        engine: &dyn MediaEngine,
        configuration: &RtcConfiguration,
        pc_id: i32,
        emitter: EventEmitter,
        mute_timing: MuteTiming,
    ) -> BridgeResult<Self> {
        let inner = Arc::new(SessionInner {
            pc_id,
            adapter: VideoTrackAdapter::new(pc_id, emitter.clone(), mute_timing),
            data_channels: DataChannelSupervisor::new(pc_id, emitter.clone()),
            emitter,
            pc: RwLock::new(None),
            remote: Mutex::new(RemoteState::default()),
            disposed: AtomicBool::new(false),
        });

        let observer = Arc::new(NativeObserver {
            session: Arc::downgrade(&inner),
        });
        let pc = engine
            .create_peer_connection(configuration, observer)
            .ok_or_else(|| {
                warn!("Engine refused to create peer connection {}", pc_id);
                BridgeError::invalid_state("failed to create peer connection")
            })?;
        *inner.pc.write() = Some(pc);

        info!("📡 Created session {} with {} ICE servers", pc_id, configuration.ice_servers.len());
        Ok(Self { inner })
    }

    /// Session id
    pub fn id(&self) -> i32 {
        self.inner.pc_id
    }

    /// Native peer connection, until the session is disposed
    pub fn peer_connection(&self) -> Option<Arc<dyn PeerConnection>> {
        self.inner.pc()
    }

    /// Whether [`dispose`](Self::dispose) ran
    pub fn is_disposed(&self) -> bool {
        self.inner.is_disposed()
    }

    /// Data channels of this session
    pub fn data_channels(&self) -> &DataChannelSupervisor {
        &self.inner.data_channels
    }

    /// Per-track video observers of this session
    pub fn adapter(&self) -> &VideoTrackAdapter {
        &self.inner.adapter
    }

    fn live_pc(&self) -> BridgeResult<Arc<dyn PeerConnection>> {
        self.inner
            .pc()
            .ok_or_else(|| BridgeError::invalid_state(format!("session {} is disposed", self.id())))
    }

    /// Create a local data channel
    ///
    /// Returns `None` when the engine refuses, e.g. after the session closed.
    pub fn create_data_channel(&self, label: &str, options: &DataChannelOptions) -> Option<DataChannelInfo> {
        let pc = self.inner.pc()?;
        let init = options.to_init();
        let Some(channel) = pc.create_data_channel(label, &init) else {
            warn!("Engine refused data channel {} on session {}", label, self.id());
            return None;
        };
        Some(self.inner.data_channels.register(channel, Some(&init)))
    }

    /// Add a transceiver for a media kind or an existing local track
    pub fn add_transceiver(
        &self,
        source: TransceiverSource,
        init: &RtpTransceiverInit,
    ) -> BridgeResult<AddedTransceiver> {
        let pc = self.live_pc()?;
        let transceiver = pc
            .add_transceiver(source, init)
            .ok_or_else(|| BridgeError::invalid_state("engine refused to add a transceiver"))?;
        let transceiver_order = self.inner.remote.lock().next_order();
        Ok(AddedTransceiver {
            transceiver_order,
            transceiver: TransceiverInfo::from_transceiver(self.id(), transceiver.as_ref()),
        })
    }

    /// Transceiver owning the sender `sender_id`
    pub fn transceiver(&self, sender_id: &str) -> Option<Arc<dyn RtpTransceiver>> {
        self.inner
            .pc()?
            .transceivers()
            .into_iter()
            .find(|t| t.sender().id() == sender_id)
    }

    /// Sender by id
    pub fn sender(&self, id: &str) -> Option<Arc<dyn RtpSender>> {
        self.inner.pc()?.senders().into_iter().find(|s| s.id() == id)
    }

    /// Receiver by id
    pub fn receiver(&self, id: &str) -> Option<Arc<dyn RtpReceiver>> {
        self.inner.pc()?.receivers().into_iter().find(|r| r.id() == id)
    }

    /// Remote stream by external handle
    pub fn remote_stream(&self, handle: &str) -> Option<Arc<dyn MediaStream>> {
        self.inner.remote.lock().streams.get(handle).cloned()
    }

    /// Remote track by native id
    pub fn remote_track(&self, track_id: &str) -> Option<Arc<dyn MediaStreamTrack>> {
        self.inner.remote.lock().tracks.get(track_id).cloned()
    }

    /// Number of distinct remote tracks seen
    pub fn remote_track_count(&self) -> usize {
        self.inner.remote.lock().tracks.len()
    }

    /// Number of remote streams seen
    pub fn remote_stream_count(&self) -> usize {
        self.inner.remote.lock().streams.len()
    }

    /// Resolve a stats target; unknown sender or receiver ids yield `None`
    pub fn stats_target(&self, target: StatsRequest<'_>) -> Option<StatsTarget> {
        match target {
            StatsRequest::Connection => Some(StatsTarget::Connection),
            StatsRequest::Sender(id) => self.sender(id).map(StatsTarget::Sender),
            StatsRequest::Receiver(id) => self.receiver(id).map(StatsTarget::Receiver),
        }
    }

    /// Collect statistics; an unresolved target yields an empty report
    pub async fn get_stats(&self, target: Option<StatsTarget>) -> RtcStatsReport {
        match (self.inner.pc(), target) {
            (Some(pc), Some(target)) => pc.get_stats(target).await,
            _ => RtcStatsReport::empty(),
        }
    }

    /// Close the native connection; registries are kept
    pub fn close(&self) {
        if let Some(pc) = self.inner.pc() {
            pc.close();
            debug!("Closed session {}", self.id());
        }
    }

    /// Release the session; only the first call has an effect
    pub fn dispose(&self) -> bool {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.inner.dispose();
        true
    }
}

/// Stats query as requested by the consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsRequest<'a> {
    /// Whole connection
    Connection,
    /// Sender by id
    Sender(&'a str),
    /// Receiver by id
    Receiver(&'a str),
}
