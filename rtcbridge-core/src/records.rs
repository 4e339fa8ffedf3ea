//! Wire records describing tracks, streams, RTP objects and data channels
//!
//! These are the payload shapes the consumer sees, both in command results
//! and inside [`BridgeEvent`](crate::event::BridgeEvent)s.

use crate::engine::{MediaKind, MediaStream, MediaStreamTrack, TrackReadyState};
use crate::peer::{DataChannelState, RtpReceiver, RtpSender, RtpTransceiver, RtpTransceiverDirection};
use serde::{Deserialize, Serialize};

/// Descriptor of a track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackInfo {
    /// Enabled flag
    pub enabled: bool,
    /// Track id
    pub id: String,
    /// Media kind
    pub kind: MediaKind,
    /// Ready state
    pub ready_state: TrackReadyState,
    /// Whether the track was received from a remote peer
    pub remote: bool,
    /// Kind-specific settings block, local tracks only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<TrackSettings>,
}

impl TrackInfo {
    /// Describe a remote track as received from the engine
    pub fn remote(track: &dyn MediaStreamTrack) -> Self {
        Self {
            enabled: track.enabled(),
            id: track.id(),
            kind: track.kind(),
            ready_state: track.ready_state(),
            remote: true,
            settings: None,
        }
    }
}

/// Kind-specific settings of a local track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TrackSettings {
    /// Capture device settings
    Video(CaptureSettings),
    /// Fixed audio device descriptor
    Audio(AudioSettings),
}

/// Settings reported by a capture controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureSettings {
    /// Device id ("screen-capture" for screen capture)
    pub device_id: String,
    /// Group id, always empty
    pub group_id: String,
    /// Frame height
    pub height: u32,
    /// Frame width
    pub width: u32,
    /// Frames per second
    pub frame_rate: u32,
    /// Facing mode for cameras
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facing_mode: Option<String>,
}

/// Settings block reported for local audio tracks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioSettings {
    /// Device id
    pub device_id: String,
    /// Group id
    pub group_id: String,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            device_id: "audio-1".to_string(),
            group_id: String::new(),
        }
    }
}

/// Descriptor of a media stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamInfo {
    /// Native stream id
    pub stream_id: String,
    /// Handle minted for the stream
    pub stream_react_tag: String,
    /// Tracks in the stream
    pub tracks: Vec<TrackInfo>,
}

impl StreamInfo {
    /// Describe a remote stream under its external handle
    pub fn remote(handle: &str, stream: &dyn MediaStream) -> Self {
        Self {
            stream_id: stream.id(),
            stream_react_tag: handle.to_string(),
            tracks: stream
                .tracks()
                .iter()
                .map(|track| TrackInfo::remote(track.as_ref()))
                .collect(),
        }
    }
}

/// Descriptor of an RTP receiver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiverInfo {
    /// Receiver id
    pub id: String,
    /// Received track
    pub track: TrackInfo,
}

impl ReceiverInfo {
    /// Describe a native receiver
    pub fn from_receiver(receiver: &dyn RtpReceiver) -> Self {
        Self {
            id: receiver.id(),
            track: TrackInfo::remote(receiver.track().as_ref()),
        }
    }
}

/// Descriptor of an RTP sender
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SenderInfo {
    /// Sender id
    pub id: String,
    /// Sent track, if any
    pub track: Option<TrackInfo>,
}

impl SenderInfo {
    /// Describe a native sender
    pub fn from_sender(sender: &dyn RtpSender) -> Self {
        Self {
            id: sender.id(),
            track: sender.track().map(|track| {
                let mut info = TrackInfo::remote(track.as_ref());
                info.remote = false;
                info
            }),
        }
    }
}

/// Descriptor of an RTP transceiver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransceiverInfo {
    /// Transceiver id (the sender id)
    pub id: String,
    /// Owning session
    pub peer_connection_id: i32,
    /// Whether the transceiver was stopped
    pub is_stopped: bool,
    /// Negotiated media id
    pub mid: Option<String>,
    /// Preferred direction
    pub direction: RtpTransceiverDirection,
    /// Negotiated direction
    pub current_direction: Option<RtpTransceiverDirection>,
    /// Sending half
    pub sender: SenderInfo,
    /// Receiving half
    pub receiver: ReceiverInfo,
}

impl TransceiverInfo {
    /// Describe a native transceiver belonging to session `pc_id`
    pub fn from_transceiver(pc_id: i32, transceiver: &dyn RtpTransceiver) -> Self {
        let sender = transceiver.sender();
        Self {
            id: sender.id(),
            peer_connection_id: pc_id,
            is_stopped: transceiver.is_stopped(),
            mid: transceiver.mid(),
            direction: transceiver.direction(),
            current_direction: transceiver.current_direction(),
            sender: SenderInfo::from_sender(sender.as_ref()),
            receiver: ReceiverInfo::from_receiver(transceiver.receiver().as_ref()),
        }
    }
}

/// Descriptor of a data channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataChannelInfo {
    /// Owning session
    pub peer_connection_id: i32,
    /// Handle minted for the channel
    pub react_tag: String,
    /// Channel label
    pub label: String,
    /// SCTP stream id
    pub id: i32,
    /// Ordered delivery
    pub ordered: bool,
    /// Maximum retransmit time in milliseconds
    pub max_packet_life_time: i32,
    /// Maximum retransmissions
    pub max_retransmits: i32,
    /// Sub-protocol
    pub protocol: String,
    /// Negotiated out of band
    pub negotiated: bool,
    /// Current state
    pub ready_state: DataChannelState,
}

/// Capture device descriptor returned by device enumeration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaDeviceInfo {
    /// Device id (camera index or "audio-1")
    pub device_id: String,
    /// Group id, always empty
    pub group_id: String,
    /// Human readable label
    pub label: String,
    /// "videoinput" or "audioinput"
    pub kind: String,
    /// "front" or "environment" for cameras
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facing: Option<String>,
}
