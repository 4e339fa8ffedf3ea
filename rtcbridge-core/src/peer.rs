//! Peer connection capabilities
//!
//! Session, RTP and data-channel handles exposed by the native engine, plus
//! the engine state enums translated to the stable string identifiers used at
//! the consumer boundary.

use crate::engine::{MediaKind, MediaStream, MediaStreamTrack};
use crate::error::BridgeError;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Peer connection configuration passed through to the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RtcConfiguration {
    /// ICE servers
    pub ice_servers: Vec<IceServer>,
    /// ICE transport policy
    pub ice_transport_policy: IceTransportPolicy,
    /// Bundle policy
    pub bundle_policy: BundlePolicy,
}

impl Default for RtcConfiguration {
    fn default() -> Self {
        Self {
            ice_servers: Vec::new(),
            ice_transport_policy: IceTransportPolicy::All,
            bundle_policy: BundlePolicy::Balanced,
        }
    }
}

/// ICE server entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    /// Server URLs
    pub urls: Vec<String>,
    /// Optional username
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Optional credential
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

/// ICE transport policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IceTransportPolicy {
    /// Gather no candidates
    None,
    /// Relay candidates only
    Relay,
    /// All candidates
    All,
}

/// Bundle policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BundlePolicy {
    /// One transport per media type
    Balanced,
    /// One transport per m-line
    MaxCompat,
    /// Single transport for all media
    MaxBundle,
}

/// Overall peer connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerConnectionState {
    /// Not yet connecting
    New,
    /// Transports are connecting
    Connecting,
    /// All transports connected
    Connected,
    /// A transport lost connectivity
    Disconnected,
    /// A transport failed
    Failed,
    /// Connection closed
    Closed,
}

impl PeerConnectionState {
    /// Stable string identifier used on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            PeerConnectionState::New => "new",
            PeerConnectionState::Connecting => "connecting",
            PeerConnectionState::Connected => "connected",
            PeerConnectionState::Disconnected => "disconnected",
            PeerConnectionState::Failed => "failed",
            PeerConnectionState::Closed => "closed",
        }
    }
}

/// ICE connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IceConnectionState {
    /// Gathering addresses or waiting for remote candidates
    New,
    /// Checking candidate pairs
    Checking,
    /// A usable pair was found
    Connected,
    /// Checking finished
    Completed,
    /// No usable pair
    Failed,
    /// Connectivity lost
    Disconnected,
    /// ICE agent shut down
    Closed,
}

impl IceConnectionState {
    /// Stable string identifier used on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            IceConnectionState::New => "new",
            IceConnectionState::Checking => "checking",
            IceConnectionState::Connected => "connected",
            IceConnectionState::Completed => "completed",
            IceConnectionState::Failed => "failed",
            IceConnectionState::Disconnected => "disconnected",
            IceConnectionState::Closed => "closed",
        }
    }
}

/// ICE gathering state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IceGatheringState {
    /// Nothing gathered yet
    New,
    /// Gathering in progress
    Gathering,
    /// Gathering finished
    Complete,
}

impl IceGatheringState {
    /// Stable string identifier used on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            IceGatheringState::New => "new",
            IceGatheringState::Gathering => "gathering",
            IceGatheringState::Complete => "complete",
        }
    }
}

/// Signaling state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalingState {
    /// No offer/answer exchange in progress
    Stable,
    /// Local offer applied
    HaveLocalOffer,
    /// Local provisional answer applied
    HaveLocalPranswer,
    /// Remote offer applied
    HaveRemoteOffer,
    /// Remote provisional answer applied
    HaveRemotePranswer,
    /// Connection closed
    Closed,
}

impl SignalingState {
    /// Stable string identifier used on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalingState::Stable => "stable",
            SignalingState::HaveLocalOffer => "have-local-offer",
            SignalingState::HaveLocalPranswer => "have-local-pranswer",
            SignalingState::HaveRemoteOffer => "have-remote-offer",
            SignalingState::HaveRemotePranswer => "have-remote-pranswer",
            SignalingState::Closed => "closed",
        }
    }
}

/// Session description type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    /// Offer
    Offer,
    /// Provisional answer
    Pranswer,
    /// Answer
    Answer,
    /// Rollback
    Rollback,
}

/// Session description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    /// Description type
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    /// SDP text
    pub sdp: String,
}

/// ICE candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    /// Media line index
    pub sdp_m_line_index: i32,
    /// Media stream identification
    pub sdp_mid: String,
    /// Candidate line
    #[serde(rename = "candidate")]
    pub sdp: String,
}

/// Data channel state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataChannelState {
    /// Being established
    Connecting,
    /// Ready to send
    Open,
    /// Closing handshake in progress
    Closing,
    /// Closed
    Closed,
}

impl DataChannelState {
    /// Stable string identifier used on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            DataChannelState::Connecting => "connecting",
            DataChannelState::Open => "open",
            DataChannelState::Closing => "closing",
            DataChannelState::Closed => "closed",
        }
    }
}

/// Data channel message buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataBuffer {
    /// Payload bytes
    pub data: Bytes,
    /// Whether the payload is binary (as opposed to UTF-8 text)
    pub binary: bool,
}

/// Kind of a data channel payload at the consumer boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataPayloadKind {
    /// UTF-8 text
    Text,
    /// Base64-encoded binary
    Binary,
}

impl std::str::FromStr for DataPayloadKind {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(DataPayloadKind::Text),
            "binary" => Ok(DataPayloadKind::Binary),
            other => Err(BridgeError::UnsupportedType {
                data_type: other.to_string(),
            }),
        }
    }
}

/// Data channel creation parameters, with the engine's defaults
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataChannelInit {
    /// Pre-negotiated stream id, -1 when unset
    pub id: i32,
    /// Ordered delivery
    pub ordered: bool,
    /// Maximum retransmit time in milliseconds, -1 when unset
    pub max_retransmit_time_ms: i32,
    /// Maximum retransmissions, -1 when unset
    pub max_retransmits: i32,
    /// Sub-protocol
    pub protocol: String,
    /// Whether the channel is negotiated out of band
    pub negotiated: bool,
}

impl Default for DataChannelInit {
    fn default() -> Self {
        Self {
            id: -1,
            ordered: true,
            max_retransmit_time_ms: -1,
            max_retransmits: -1,
            protocol: String::new(),
            negotiated: false,
        }
    }
}

/// Receives data channel callbacks on native contexts
pub trait DataChannelObserver: Send + Sync {
    /// Buffered amount changed from `previous_amount`
    fn on_buffered_amount_change(&self, previous_amount: u64);
    /// Channel state changed
    fn on_state_change(&self);
    /// A message arrived
    fn on_message(&self, buffer: DataBuffer);
}

/// Native data channel
pub trait DataChannel: Send + Sync {
    /// Channel label
    fn label(&self) -> String;
    /// SCTP stream id
    fn id(&self) -> i32;
    /// Current state
    fn state(&self) -> DataChannelState;
    /// Bytes queued but not yet sent
    fn buffered_amount(&self) -> u64;
    /// Register the callback observer
    fn register_observer(&self, observer: Arc<dyn DataChannelObserver>);
    /// Drop the callback observer
    fn unregister_observer(&self);
    /// Send a buffer; false when the engine refused it
    fn send(&self, buffer: DataBuffer) -> bool;
    /// Start the closing handshake
    fn close(&self);
}

/// Transceiver direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RtpTransceiverDirection {
    /// Send and receive
    SendRecv,
    /// Send only
    SendOnly,
    /// Receive only
    RecvOnly,
    /// Neither
    Inactive,
    /// Transceiver stopped
    Stopped,
}

impl RtpTransceiverDirection {
    /// Stable string identifier used on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            RtpTransceiverDirection::SendRecv => "sendrecv",
            RtpTransceiverDirection::SendOnly => "sendonly",
            RtpTransceiverDirection::RecvOnly => "recvonly",
            RtpTransceiverDirection::Inactive => "inactive",
            RtpTransceiverDirection::Stopped => "stopped",
        }
    }
}

/// Parameters for adding a transceiver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RtpTransceiverInit {
    /// Initial direction
    pub direction: RtpTransceiverDirection,
    /// Associated stream ids
    pub stream_ids: Vec<String>,
}

impl Default for RtpTransceiverInit {
    fn default() -> Self {
        Self {
            direction: RtpTransceiverDirection::SendRecv,
            stream_ids: Vec::new(),
        }
    }
}

/// Native RTP sender
pub trait RtpSender: Send + Sync {
    /// Sender id
    fn id(&self) -> String;
    /// Track being sent, if any
    fn track(&self) -> Option<Arc<dyn MediaStreamTrack>>;
}

/// Native RTP receiver
pub trait RtpReceiver: Send + Sync {
    /// Receiver id
    fn id(&self) -> String;
    /// Track being received
    fn track(&self) -> Arc<dyn MediaStreamTrack>;
}

/// Native RTP transceiver
pub trait RtpTransceiver: Send + Sync {
    /// Negotiated media id
    fn mid(&self) -> Option<String>;
    /// Sending half
    fn sender(&self) -> Arc<dyn RtpSender>;
    /// Receiving half
    fn receiver(&self) -> Arc<dyn RtpReceiver>;
    /// Preferred direction
    fn direction(&self) -> RtpTransceiverDirection;
    /// Negotiated direction
    fn current_direction(&self) -> Option<RtpTransceiverDirection>;
    /// Whether the transceiver was stopped
    fn is_stopped(&self) -> bool;
}

/// Single stats object in a report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RtcStats {
    /// Stats object id
    pub id: String,
    /// Stats type (e.g. "inbound-rtp")
    pub stats_type: String,
    /// Timestamp in microseconds
    pub timestamp_us: f64,
    /// Remaining members
    pub members: serde_json::Map<String, serde_json::Value>,
}

/// Stats report keyed by stats object id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RtcStatsReport {
    /// Report timestamp in microseconds
    pub timestamp_us: f64,
    /// Stats objects
    pub stats: BTreeMap<String, RtcStats>,
}

impl RtcStatsReport {
    /// An empty report, used when the stats target is unknown
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether the report holds no stats objects
    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }
}

/// Stats query target
#[derive(Clone)]
pub enum StatsTarget {
    /// Whole connection
    Connection,
    /// A single sender
    Sender(Arc<dyn RtpSender>),
    /// A single receiver
    Receiver(Arc<dyn RtpReceiver>),
}

/// What a new transceiver is created for
#[derive(Clone)]
pub enum TransceiverSource {
    /// A media kind without a track
    Kind(MediaKind),
    /// An existing local track
    Track(Arc<dyn MediaStreamTrack>),
}

/// Native peer connection
#[async_trait]
pub trait PeerConnection: Send + Sync {
    /// Current senders
    fn senders(&self) -> Vec<Arc<dyn RtpSender>>;
    /// Current receivers
    fn receivers(&self) -> Vec<Arc<dyn RtpReceiver>>;
    /// Current transceivers
    fn transceivers(&self) -> Vec<Arc<dyn RtpTransceiver>>;
    /// Current local description, absent during rollback
    fn local_description(&self) -> Option<SessionDescription>;
    /// Create a data channel; `None` when the engine refuses (e.g. closed)
    fn create_data_channel(&self, label: &str, init: &DataChannelInit) -> Option<Arc<dyn DataChannel>>;
    /// Add a transceiver
    fn add_transceiver(
        &self,
        source: TransceiverSource,
        init: &RtpTransceiverInit,
    ) -> Option<Arc<dyn RtpTransceiver>>;
    /// Collect statistics
    async fn get_stats(&self, target: StatsTarget) -> RtcStatsReport;
    /// Close the connection
    fn close(&self);
    /// Release every native resource held by the connection
    fn dispose(&self);
}

/// Native session callbacks, delivered on engine contexts
pub trait PeerConnectionObserver: Send + Sync {
    /// A local ICE candidate was gathered
    fn on_ice_candidate(&self, candidate: IceCandidate);
    /// Candidates were removed
    fn on_ice_candidates_removed(&self, _candidates: Vec<IceCandidate>) {}
    /// ICE connection state changed
    fn on_ice_connection_change(&self, state: IceConnectionState);
    /// Receiving state of the ICE transport changed
    fn on_ice_connection_receiving_change(&self, _receiving: bool) {}
    /// Overall connection state changed
    fn on_connection_change(&self, state: PeerConnectionState);
    /// ICE gathering state changed
    fn on_ice_gathering_change(&self, state: IceGatheringState);
    /// Signaling state changed
    fn on_signaling_change(&self, state: SignalingState);
    /// The remote peer opened a data channel
    fn on_data_channel(&self, channel: Arc<dyn DataChannel>);
    /// Renegotiation is needed
    fn on_renegotiation_needed(&self);
    /// A remote track was signaled
    fn on_add_track(&self, receiver: Arc<dyn RtpReceiver>, streams: Vec<Arc<dyn MediaStream>>);
    /// A remote track was removed
    fn on_remove_track(&self, receiver: Arc<dyn RtpReceiver>);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_strings() {
        assert_eq!(SignalingState::HaveLocalPranswer.as_str(), "have-local-pranswer");
        assert_eq!(IceConnectionState::Completed.as_str(), "completed");
        assert_eq!(PeerConnectionState::Connecting.as_str(), "connecting");
        assert_eq!(IceGatheringState::Complete.as_str(), "complete");
        assert_eq!(DataChannelState::Closing.as_str(), "closing");
        assert_eq!(RtpTransceiverDirection::RecvOnly.as_str(), "recvonly");
    }

    #[test]
    fn test_payload_kind_parsing() {
        assert_eq!("text".parse::<DataPayloadKind>(), Ok(DataPayloadKind::Text));
        assert_eq!("binary".parse::<DataPayloadKind>(), Ok(DataPayloadKind::Binary));
        let err = "blob".parse::<DataPayloadKind>().unwrap_err();
        assert_eq!(err.error_code(), "UnsupportedTypeError");
    }

    #[test]
    fn test_data_channel_init_defaults() {
        let init = DataChannelInit::default();
        assert!(init.ordered);
        assert_eq!(init.max_retransmits, -1);
        assert_eq!(init.max_retransmit_time_ms, -1);
        assert_eq!(init.protocol, "");
        assert!(!init.negotiated);
    }

    #[test]
    fn test_configuration_deserialize() {
        let config: RtcConfiguration = serde_json::from_str(
            r#"{"iceServers":[{"urls":["stun:stun.example.org"]}],"bundlePolicy":"max-bundle"}"#,
        )
        .unwrap();
        assert_eq!(config.ice_servers.len(), 1);
        assert_eq!(config.bundle_policy, BundlePolicy::MaxBundle);
        assert_eq!(config.ice_transport_policy, IceTransportPolicy::All);
    }
}
