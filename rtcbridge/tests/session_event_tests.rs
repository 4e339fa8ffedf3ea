//! Integration tests for session event translation
//!
//! Native callbacks are driven through the fake engine's observer handle and
//! the resulting event stream is checked for content, order and registry
//! effects.

use rtcbridge::session::SessionObserver;
use rtcbridge::{DataChannelOptions, MuteTiming};
use rtcbridge_core::testing::{FakeDataChannel, FakeEngine, FakePeerConnection, FakeStream};
use rtcbridge_core::{
    BridgeEvent, DataBuffer, DataChannelInit, DataChannelState, DataPayloadKind, EventEmitter,
    EventSink, IceCandidate, IceConnectionState, MediaKind, MediaStream, MediaStreamTrack,
    PeerConnectionObserver, PeerConnectionState, RtcConfiguration, RtpTransceiverDirection,
    RtpReceiver, RtpTransceiverInit, SdpType, SerialExecutor, SessionDescription, SignalingState,
    TransceiverSource, VideoFrameInfo,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

const PC_ID: i32 = 7;

struct Harness {
    session: SessionObserver,
    pc: Arc<FakePeerConnection>,
    observer: Arc<dyn PeerConnectionObserver>,
    executor: SerialExecutor,
    events: UnboundedReceiver<BridgeEvent>,
}

impl Harness {
    fn new() -> Self {
        let executor = SerialExecutor::spawn("session-events").unwrap();
        let (sink, events) = EventSink::channel();
        let engine = FakeEngine::new();
        let session = SessionObserver::create(
            engine.as_ref(),
            &RtcConfiguration::default(),
            PC_ID,
            EventEmitter::new(executor.clone(), sink),
            MuteTiming::default(),
        )
        .unwrap();
        let (pc, observer) = engine.last_session().unwrap();
        Self {
            session,
            pc,
            observer,
            executor,
            events,
        }
    }

    async fn drain(&mut self) -> Vec<BridgeEvent> {
        self.executor.flush().await;
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

fn stream_of(id: &str, tracks: Vec<Arc<dyn MediaStreamTrack>>) -> Arc<dyn MediaStream> {
    FakeStream::new(id, tracks)
}

// ============================================================================
// STATE EVENT TESTS
// ============================================================================

#[tokio::test]
async fn test_state_events_keep_arrival_order() {
    let mut h = Harness::new();

    h.observer.on_signaling_change(SignalingState::HaveLocalOffer);
    h.observer.on_ice_connection_change(IceConnectionState::Checking);
    h.observer.on_connection_change(PeerConnectionState::Connecting);
    h.observer.on_ice_candidates_removed(Vec::new());
    h.observer.on_ice_connection_receiving_change(true);
    h.observer.on_renegotiation_needed();
    h.observer.on_connection_change(PeerConnectionState::Connected);

    let names: Vec<&str> = h.drain().await.iter().map(|e| e.event_type()).collect();
    assert_eq!(
        names,
        vec![
            "peerConnectionSignalingStateChanged",
            "peerConnectionIceConnectionChanged",
            "peerConnectionStateChanged",
            "peerConnectionOnRenegotiationNeeded",
            "peerConnectionStateChanged",
        ]
    );
}

#[tokio::test]
async fn test_ice_candidate_record() {
    let mut h = Harness::new();
    *h.pc.local_description.lock() = Some(SessionDescription {
        sdp_type: SdpType::Offer,
        sdp: "v=0".to_string(),
    });

    h.observer.on_ice_candidate(IceCandidate {
        sdp_m_line_index: 0,
        sdp_mid: "0".to_string(),
        sdp: "candidate:1 1 udp 2122260223 192.168.1.2 54321 typ host".to_string(),
    });

    let events = h.drain().await;
    let record = events[0].to_record();
    assert_eq!(record["event"], "peerConnectionGotICECandidate");
    assert_eq!(record["payload"]["pcId"], PC_ID);
    assert_eq!(record["payload"]["candidate"]["sdpMLineIndex"], 0);
    assert_eq!(record["payload"]["candidate"]["sdpMid"], "0");
    assert!(record["payload"]["candidate"]["candidate"]
        .as_str()
        .unwrap()
        .starts_with("candidate:1"));
    assert_eq!(record["payload"]["sdp"]["type"], "offer");
    assert_eq!(record["payload"]["sdp"]["sdp"], "v=0");
}

// ============================================================================
// REMOTE TRACK TESTS
// ============================================================================

#[tokio::test]
async fn test_duplicate_add_track_reemits_without_reregistering() {
    let mut h = Harness::new();
    let transceiver = h.pc.add_remote(MediaKind::Video);
    let track: Arc<dyn MediaStreamTrack> = transceiver.receiver.track.clone();
    let stream = stream_of("remote-stream", vec![track]);

    h.observer.on_add_track(transceiver.receiver.clone(), vec![stream.clone()]);
    // Direction flip re-announces the same track
    transceiver.set_direction(RtpTransceiverDirection::SendRecv);
    h.observer.on_add_track(transceiver.receiver.clone(), vec![stream]);

    let events = h.drain().await;
    assert_eq!(events.len(), 2);
    let orders: Vec<u32> = events
        .iter()
        .map(|e| match e {
            BridgeEvent::TrackAdded {
                transceiver_order, ..
            } => *transceiver_order,
            other => panic!("unexpected event {:?}", other),
        })
        .collect();
    assert_eq!(orders, vec![0, 1]);

    match &events[1] {
        BridgeEvent::TrackAdded {
            pc_id,
            streams,
            receiver,
            transceiver: info,
            ..
        } => {
            assert_eq!(*pc_id, PC_ID);
            assert_eq!(streams.len(), 1);
            assert_eq!(streams[0].stream_id, "remote-stream");
            assert_eq!(streams[0].tracks.len(), 1);
            assert!(streams[0].tracks[0].remote);
            assert_eq!(receiver.track.id, transceiver.receiver.track.id());
            assert_eq!(info.direction, RtpTransceiverDirection::SendRecv);
            assert_eq!(info.peer_connection_id, PC_ID);
        }
        other => panic!("unexpected event {:?}", other),
    }

    assert_eq!(h.session.remote_track_count(), 1);
    assert_eq!(h.session.adapter().dimension_detector_count(), 1);
    assert_eq!(h.session.adapter().adapter_count(), 1);
    assert_eq!(transceiver.receiver.track.sink_count(), 2);
}

#[tokio::test]
async fn test_audio_track_gets_no_video_observers() {
    let mut h = Harness::new();
    let transceiver = h.pc.add_remote(MediaKind::Audio);

    h.observer.on_add_track(transceiver.receiver.clone(), Vec::new());

    let events = h.drain().await;
    assert!(matches!(&events[0], BridgeEvent::TrackAdded { streams, .. } if streams.is_empty()));
    assert_eq!(h.session.remote_track_count(), 1);
    assert_eq!(h.session.adapter().dimension_detector_count(), 0);
    assert_eq!(h.session.adapter().adapter_count(), 0);
}

#[tokio::test]
async fn test_add_track_without_transceiver_is_dropped() {
    let mut h = Harness::new();
    let orphan = FakePeerConnection::orphan_receiver(MediaKind::Video);

    h.observer.on_add_track(orphan, Vec::new());

    assert!(h.drain().await.is_empty());
    assert_eq!(h.session.remote_track_count(), 0);
}

#[tokio::test]
async fn test_remove_track_keeps_track_queryable() {
    let mut h = Harness::new();
    let transceiver = h.pc.add_remote(MediaKind::Video);
    let track_id = transceiver.receiver.track.id();

    h.observer.on_add_track(transceiver.receiver.clone(), Vec::new());
    h.observer.on_remove_track(transceiver.receiver.clone());

    let events = h.drain().await;
    assert_eq!(
        events[1],
        BridgeEvent::TrackRemoved {
            pc_id: PC_ID,
            receiver_id: transceiver.receiver.id(),
        }
    );
    assert!(h.session.remote_track(&track_id).is_some());
}

#[tokio::test]
async fn test_remote_dimension_events() {
    let mut h = Harness::new();
    let transceiver = h.pc.add_remote(MediaKind::Video);
    h.observer.on_add_track(transceiver.receiver.clone(), Vec::new());
    h.drain().await;

    let track = transceiver.receiver.track.clone();
    track.deliver_frame(VideoFrameInfo::new(640, 480));
    track.deliver_frame(VideoFrameInfo::new(640, 480));
    track.deliver_frame(VideoFrameInfo::new(1280, 720));

    let events = h.drain().await;
    assert_eq!(
        events,
        vec![
            BridgeEvent::VideoTrackDimensionChanged {
                pc_id: PC_ID,
                track_id: track.id(),
                width: 640,
                height: 480,
            },
            BridgeEvent::VideoTrackDimensionChanged {
                pc_id: PC_ID,
                track_id: track.id(),
                width: 1280,
                height: 720,
            },
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_remote_mute_detection() {
    let mut h = Harness::new();
    let transceiver = h.pc.add_remote(MediaKind::Video);
    h.observer.on_add_track(transceiver.receiver.clone(), Vec::new());
    h.drain().await;

    // No frames before the first check
    tokio::time::sleep(Duration::from_millis(3100)).await;
    let events = h.drain().await;
    assert_eq!(
        events,
        vec![BridgeEvent::TrackMuteChanged {
            pc_id: PC_ID,
            track_id: transceiver.receiver.track.id(),
            muted: true,
        }]
    );

    transceiver
        .receiver
        .track
        .deliver_frame(VideoFrameInfo::new(320, 240));
    tokio::time::sleep(Duration::from_millis(1500)).await;
    let events = h.drain().await;
    assert!(events.contains(&BridgeEvent::TrackMuteChanged {
        pc_id: PC_ID,
        track_id: transceiver.receiver.track.id(),
        muted: false,
    }));
}

#[tokio::test]
async fn test_add_transceiver_shares_order_counter() {
    let mut h = Harness::new();
    let remote = h.pc.add_remote(MediaKind::Audio);
    h.observer.on_add_track(remote.receiver.clone(), Vec::new());
    h.drain().await;

    let added = h
        .session
        .add_transceiver(TransceiverSource::Kind(MediaKind::Video), &RtpTransceiverInit::default())
        .unwrap();
    assert_eq!(added.transceiver_order, 1);
    assert_eq!(added.transceiver.peer_connection_id, PC_ID);

    let sender_id = added.transceiver.sender.id.clone();
    assert!(h.session.transceiver(&sender_id).is_some());
    assert!(h.session.sender(&sender_id).is_some());
    assert!(h.session.transceiver("unknown").is_none());
}

// ============================================================================
// DATA CHANNEL TESTS
// ============================================================================

#[tokio::test]
async fn test_inbound_data_channel_flow() {
    let mut h = Harness::new();
    let init = DataChannelInit {
        ordered: false,
        max_retransmits: 4,
        ..Default::default()
    };
    let channel = FakeDataChannel::new("remote-chat", 2, init);

    h.observer.on_data_channel(channel.clone());
    let events = h.drain().await;
    let info = match &events[0] {
        BridgeEvent::DataChannelOpened { pc_id, data_channel } => {
            assert_eq!(*pc_id, PC_ID);
            data_channel.clone()
        }
        other => panic!("unexpected event {:?}", other),
    };
    assert_eq!(info.label, "remote-chat");
    assert!(info.ordered);
    assert_eq!(info.max_retransmits, -1);
    assert_eq!(info.max_packet_life_time, -1);
    assert_eq!(info.ready_state, DataChannelState::Connecting);

    channel.set_state(DataChannelState::Open);
    channel.receive(DataBuffer {
        data: bytes::Bytes::from_static(b"hi"),
        binary: false,
    });
    channel.receive(DataBuffer {
        data: bytes::Bytes::from_static(&[0, 1, 2]),
        binary: true,
    });
    channel.set_buffered_amount(64);

    let events = h.drain().await;
    assert_eq!(
        events,
        vec![
            BridgeEvent::DataChannelStateChanged {
                peer_connection_id: PC_ID,
                react_tag: info.react_tag.clone(),
                id: 2,
                state: DataChannelState::Open,
            },
            BridgeEvent::DataChannelMessage {
                peer_connection_id: PC_ID,
                react_tag: info.react_tag.clone(),
                kind: DataPayloadKind::Text,
                data: "hi".to_string(),
            },
            BridgeEvent::DataChannelMessage {
                peer_connection_id: PC_ID,
                react_tag: info.react_tag.clone(),
                kind: DataPayloadKind::Binary,
                data: "AAEC".to_string(),
            },
            BridgeEvent::DataChannelBufferedAmountChanged {
                peer_connection_id: PC_ID,
                react_tag: info.react_tag.clone(),
                buffered_amount: 64,
            },
        ]
    );
}

#[tokio::test]
async fn test_local_data_channel_reports_init() {
    let h = Harness::new();
    let options: DataChannelOptions = serde_json::from_value(serde_json::json!({
        "ordered": false,
        "maxRetransmitTime": 500,
        "protocol": "chat-v1",
        "negotiated": true,
        "id": 9
    }))
    .unwrap();

    let info = h.session.create_data_channel("chat", &options).unwrap();
    assert_eq!(info.id, 9);
    assert!(!info.ordered);
    assert_eq!(info.max_packet_life_time, 500);
    assert_eq!(info.max_retransmits, -1);
    assert_eq!(info.protocol, "chat-v1");
    assert!(info.negotiated);
    assert_eq!(h.session.data_channels().len(), 1);

    h.pc.refuse_data_channels.store(true, Ordering::SeqCst);
    assert!(h.session.create_data_channel("late", &options).is_none());
    assert_eq!(h.session.data_channels().len(), 1);
}

// ============================================================================
// DISPOSAL TESTS
// ============================================================================

#[tokio::test]
async fn test_dispose_runs_once_and_clears_everything() {
    let mut h = Harness::new();
    let transceiver = h.pc.add_remote(MediaKind::Video);
    h.observer.on_add_track(
        transceiver.receiver.clone(),
        vec![stream_of("remote-stream", Vec::new())],
    );
    let info = h
        .session
        .create_data_channel("chat", &DataChannelOptions::default())
        .unwrap();
    h.drain().await;
    let channel = h.pc.last_data_channel().unwrap();

    assert!(h.session.dispose());
    assert!(!h.session.dispose());

    assert!(h.session.is_disposed());
    assert_eq!(h.pc.disposed(), 1);
    assert_eq!(h.session.remote_track_count(), 0);
    assert_eq!(h.session.remote_stream_count(), 0);
    assert!(h.session.data_channels().is_empty());
    assert_eq!(h.session.adapter().dimension_detector_count(), 0);
    assert_eq!(h.session.adapter().adapter_count(), 0);
    assert_eq!(transceiver.receiver.track.sink_count(), 0);
    assert!(!channel.has_observer());
    assert_eq!(channel.unregister_count.load(Ordering::SeqCst), 1);
    assert!(h.session.data_channels().send(&info.react_tag, "x", "text").is_err());
}

#[tokio::test]
async fn test_callbacks_after_dispose_are_dropped() {
    let mut h = Harness::new();
    let transceiver = h.pc.add_remote(MediaKind::Video);

    // Queued before disposal, run after it
    h.observer.on_signaling_change(SignalingState::Stable);
    h.session.dispose();
    h.observer.on_add_track(transceiver.receiver.clone(), Vec::new());
    h.observer.on_connection_change(PeerConnectionState::Closed);

    assert!(h.drain().await.is_empty());
    assert_eq!(h.session.remote_track_count(), 0);
}
