//! # rtcbridge Core
//!
//! Foundations shared by every rtcbridge crate: the capability traits the
//! native media/session engine is driven through, the consumer-facing error
//! taxonomy, the wire records and events, and the serialized executor that
//! orders every native callback.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod engine;
pub mod error;
pub mod event;
pub mod executor;
pub mod host;
pub mod peer;
pub mod records;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export main types
pub use engine::{
    CapturerEventsListener, ConstraintEntry, EngineConstraints, MediaEngine, MediaKind,
    MediaSource, MediaStream, MediaStreamTrack, RenderHelper, TrackReadyState, VideoCapturer,
    VideoFrameInfo, VideoFrameProcessor, VideoProcessor, VideoSink,
};
pub use error::{BridgeError, BridgeResult};
pub use event::{BridgeEvent, DescriptionSnapshot, EventEmitter, EventSink};
pub use executor::SerialExecutor;
pub use host::{CameraEnumerator, DisplayMetrics, HostContext, ScreenCaptureGrant};
pub use peer::{
    BundlePolicy, DataBuffer, DataChannel, DataChannelInit, DataChannelObserver,
    DataChannelState, DataPayloadKind, IceCandidate, IceConnectionState, IceGatheringState,
    IceServer, IceTransportPolicy, PeerConnection, PeerConnectionObserver, PeerConnectionState,
    RtcConfiguration, RtcStats, RtcStatsReport, RtpReceiver, RtpSender, RtpTransceiver,
    RtpTransceiverDirection, RtpTransceiverInit, SdpType, SessionDescription, SignalingState,
    StatsTarget, TransceiverSource,
};
pub use records::{
    AudioSettings, CaptureSettings, DataChannelInfo, MediaDeviceInfo, ReceiverInfo, SenderInfo,
    StreamInfo, TrackInfo, TrackSettings, TransceiverInfo,
};
