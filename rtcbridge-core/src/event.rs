//! Events delivered to the consumer
//!
//! Every event is a [`BridgeEvent`] written to one [`EventSink`]. Handlers
//! that already run on the [`SerialExecutor`] write to the sink directly;
//! everything else goes through an [`EventEmitter`], which enqueues the write
//! so that all events share the executor's total order.

use crate::executor::SerialExecutor;
use crate::peer::{
    DataChannelState, DataPayloadKind, IceCandidate, IceConnectionState, IceGatheringState,
    PeerConnectionState, SessionDescription, SignalingState,
};
use crate::records::{DataChannelInfo, ReceiverInfo, StreamInfo, TransceiverInfo};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use tokio::sync::mpsc;
use tracing::debug;

/// Snapshot of the local description attached to ICE events
///
/// Serializes as an empty object when no description exists, which happens
/// while a rollback is in progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptionSnapshot(pub Option<SessionDescription>);

impl Serialize for DescriptionSnapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match &self.0 {
            Some(description) => description.serialize(serializer),
            None => serializer.serialize_map(Some(0))?.end(),
        }
    }
}

/// Event emitted to the consumer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "payload")]
pub enum BridgeEvent {
    /// A local ICE candidate was gathered
    #[serde(rename = "peerConnectionGotICECandidate", rename_all = "camelCase")]
    IceCandidate {
        /// Session id
        pc_id: i32,
        /// Gathered candidate
        candidate: IceCandidate,
        /// Local description at the time of gathering
        sdp: DescriptionSnapshot,
    },
    /// ICE connection state changed
    #[serde(rename = "peerConnectionIceConnectionChanged", rename_all = "camelCase")]
    IceConnectionChanged {
        /// Session id
        pc_id: i32,
        /// New state
        ice_connection_state: IceConnectionState,
    },
    /// Overall connection state changed
    #[serde(rename = "peerConnectionStateChanged", rename_all = "camelCase")]
    ConnectionStateChanged {
        /// Session id
        pc_id: i32,
        /// New state
        connection_state: PeerConnectionState,
    },
    /// ICE gathering state changed
    #[serde(rename = "peerConnectionIceGatheringChanged", rename_all = "camelCase")]
    IceGatheringChanged {
        /// Session id
        pc_id: i32,
        /// New state
        ice_gathering_state: IceGatheringState,
        /// Local description, attached once gathering is complete
        #[serde(skip_serializing_if = "Option::is_none")]
        sdp: Option<DescriptionSnapshot>,
    },
    /// Signaling state changed
    #[serde(rename = "peerConnectionSignalingStateChanged", rename_all = "camelCase")]
    SignalingStateChanged {
        /// Session id
        pc_id: i32,
        /// New state
        signaling_state: SignalingState,
    },
    /// Renegotiation is needed
    #[serde(rename = "peerConnectionOnRenegotiationNeeded", rename_all = "camelCase")]
    RenegotiationNeeded {
        /// Session id
        pc_id: i32,
    },
    /// A remote track was added or re-announced
    #[serde(rename = "peerConnectionOnTrack", rename_all = "camelCase")]
    TrackAdded {
        /// Session id
        pc_id: i32,
        /// Streams the track belongs to
        streams: Vec<StreamInfo>,
        /// Receiver of the track
        receiver: ReceiverInfo,
        /// Arrival order of the announcement
        transceiver_order: u32,
        /// Transceiver owning the receiver
        transceiver: TransceiverInfo,
    },
    /// A remote track was removed
    #[serde(rename = "peerConnectionOnRemoveTrack", rename_all = "camelCase")]
    TrackRemoved {
        /// Session id
        pc_id: i32,
        /// Receiver of the removed track
        receiver_id: String,
    },
    /// The remote peer opened a data channel
    #[serde(rename = "peerConnectionDidOpenDataChannel", rename_all = "camelCase")]
    DataChannelOpened {
        /// Session id
        pc_id: i32,
        /// Channel descriptor
        data_channel: DataChannelInfo,
    },
    /// Data channel state changed
    #[serde(rename = "dataChannelStateChanged", rename_all = "camelCase")]
    DataChannelStateChanged {
        /// Session id
        peer_connection_id: i32,
        /// Channel handle
        react_tag: String,
        /// SCTP stream id
        id: i32,
        /// New state
        state: DataChannelState,
    },
    /// Data channel message received
    #[serde(rename = "dataChannelReceiveMessage", rename_all = "camelCase")]
    DataChannelMessage {
        /// Session id
        peer_connection_id: i32,
        /// Channel handle
        react_tag: String,
        /// Payload kind
        #[serde(rename = "type")]
        kind: DataPayloadKind,
        /// Text, or base64 for binary payloads
        data: String,
    },
    /// Data channel buffered amount changed
    #[serde(rename = "dataChannelDidChangeBufferedAmount", rename_all = "camelCase")]
    DataChannelBufferedAmountChanged {
        /// Session id
        peer_connection_id: i32,
        /// Channel handle
        react_tag: String,
        /// Bytes currently buffered
        buffered_amount: u64,
    },
    /// Frame dimensions of a video track changed
    #[serde(rename = "videoTrackDimensionChanged", rename_all = "camelCase")]
    VideoTrackDimensionChanged {
        /// Session id, -1 for local tracks
        pc_id: i32,
        /// Track id
        track_id: String,
        /// New width
        width: u32,
        /// New height
        height: u32,
    },
    /// A remote video track stopped or resumed delivering frames
    #[serde(rename = "mediaStreamTrackMuteChanged", rename_all = "camelCase")]
    TrackMuteChanged {
        /// Session id
        pc_id: i32,
        /// Track id
        track_id: String,
        /// Whether the track is now muted
        muted: bool,
    },
    /// A local track's capturer ended on its own
    #[serde(rename = "mediaStreamTrackEnded", rename_all = "camelCase")]
    TrackEnded {
        /// Track id
        track_id: String,
    },
}

impl BridgeEvent {
    /// Event name on the wire
    pub fn event_type(&self) -> &'static str {
        match self {
            BridgeEvent::IceCandidate { .. } => "peerConnectionGotICECandidate",
            BridgeEvent::IceConnectionChanged { .. } => "peerConnectionIceConnectionChanged",
            BridgeEvent::ConnectionStateChanged { .. } => "peerConnectionStateChanged",
            BridgeEvent::IceGatheringChanged { .. } => "peerConnectionIceGatheringChanged",
            BridgeEvent::SignalingStateChanged { .. } => "peerConnectionSignalingStateChanged",
            BridgeEvent::RenegotiationNeeded { .. } => "peerConnectionOnRenegotiationNeeded",
            BridgeEvent::TrackAdded { .. } => "peerConnectionOnTrack",
            BridgeEvent::TrackRemoved { .. } => "peerConnectionOnRemoveTrack",
            BridgeEvent::DataChannelOpened { .. } => "peerConnectionDidOpenDataChannel",
            BridgeEvent::DataChannelStateChanged { .. } => "dataChannelStateChanged",
            BridgeEvent::DataChannelMessage { .. } => "dataChannelReceiveMessage",
            BridgeEvent::DataChannelBufferedAmountChanged { .. } => {
                "dataChannelDidChangeBufferedAmount"
            }
            BridgeEvent::VideoTrackDimensionChanged { .. } => "videoTrackDimensionChanged",
            BridgeEvent::TrackMuteChanged { .. } => "mediaStreamTrackMuteChanged",
            BridgeEvent::TrackEnded { .. } => "mediaStreamTrackEnded",
        }
    }

    /// Session the event belongs to, if any
    pub fn session_id(&self) -> Option<i32> {
        match self {
            BridgeEvent::IceCandidate { pc_id, .. }
            | BridgeEvent::IceConnectionChanged { pc_id, .. }
            | BridgeEvent::ConnectionStateChanged { pc_id, .. }
            | BridgeEvent::IceGatheringChanged { pc_id, .. }
            | BridgeEvent::SignalingStateChanged { pc_id, .. }
            | BridgeEvent::RenegotiationNeeded { pc_id }
            | BridgeEvent::TrackAdded { pc_id, .. }
            | BridgeEvent::TrackRemoved { pc_id, .. }
            | BridgeEvent::DataChannelOpened { pc_id, .. }
            | BridgeEvent::TrackMuteChanged { pc_id, .. } => Some(*pc_id),
            BridgeEvent::VideoTrackDimensionChanged { pc_id, .. } if *pc_id >= 0 => Some(*pc_id),
            BridgeEvent::DataChannelStateChanged {
                peer_connection_id, ..
            }
            | BridgeEvent::DataChannelMessage {
                peer_connection_id, ..
            }
            | BridgeEvent::DataChannelBufferedAmountChanged {
                peer_connection_id, ..
            } => Some(*peer_connection_id),
            _ => None,
        }
    }

    /// Check if this is a session state or ICE event
    pub fn is_session_event(&self) -> bool {
        matches!(
            self,
            BridgeEvent::IceCandidate { .. }
                | BridgeEvent::IceConnectionChanged { .. }
                | BridgeEvent::ConnectionStateChanged { .. }
                | BridgeEvent::IceGatheringChanged { .. }
                | BridgeEvent::SignalingStateChanged { .. }
                | BridgeEvent::RenegotiationNeeded { .. }
        )
    }

    /// Check if this is a track-related event
    pub fn is_track_event(&self) -> bool {
        matches!(
            self,
            BridgeEvent::TrackAdded { .. }
                | BridgeEvent::TrackRemoved { .. }
                | BridgeEvent::VideoTrackDimensionChanged { .. }
                | BridgeEvent::TrackMuteChanged { .. }
                | BridgeEvent::TrackEnded { .. }
        )
    }

    /// Check if this is a data channel event
    pub fn is_data_channel_event(&self) -> bool {
        matches!(
            self,
            BridgeEvent::DataChannelOpened { .. }
                | BridgeEvent::DataChannelStateChanged { .. }
                | BridgeEvent::DataChannelMessage { .. }
                | BridgeEvent::DataChannelBufferedAmountChanged { .. }
        )
    }

    /// Render the event as its `{event, payload}` wire record
    pub fn to_record(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Write end of the consumer event channel
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<BridgeEvent>,
}

impl EventSink {
    /// Create a sink and the receiver the consumer reads from
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<BridgeEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Deliver an event immediately
    ///
    /// Only call this from a job running on the serialized executor.
    pub fn send(&self, event: BridgeEvent) {
        debug!("📡 Emitting event: {}", event.event_type());
        if self.tx.send(event).is_err() {
            debug!("Event receiver dropped, discarding event");
        }
    }
}

/// Emits events from any context through the serialized executor
#[derive(Debug, Clone)]
pub struct EventEmitter {
    executor: SerialExecutor,
    sink: EventSink,
}

impl EventEmitter {
    /// Create an emitter writing to `sink` in `executor` order
    pub fn new(executor: SerialExecutor, sink: EventSink) -> Self {
        Self { executor, sink }
    }

    /// Enqueue an event; never blocks the calling context
    pub fn emit(&self, event: BridgeEvent) {
        let sink = self.sink.clone();
        self.executor.execute(move || sink.send(event));
    }

    /// The executor events are ordered on
    pub fn executor(&self) -> &SerialExecutor {
        &self.executor
    }

    /// The underlying sink, for handlers already running on the executor
    pub fn sink(&self) -> &EventSink {
        &self.sink
    }
}
