//! Media engine capabilities
//!
//! The native engine (sources, tracks, capturers and render helpers) is an
//! external collaborator. These traits are the seam between it and the
//! lifecycle management done by the rest of the workspace.

use crate::error::BridgeResult;
use crate::peer::{PeerConnection, PeerConnectionObserver, RtcConfiguration};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Kind of media carried by a track or source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Audio media
    Audio,
    /// Video media
    Video,
}

impl MediaKind {
    /// Stable string identifier used on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ready state of a native track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackReadyState {
    /// Track is producing or able to produce media
    Live,
    /// Track has permanently ended
    Ended,
}

impl TrackReadyState {
    /// Stable string identifier used on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackReadyState::Live => "live",
            TrackReadyState::Ended => "ended",
        }
    }
}

/// Geometry of a single video frame as seen by a sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoFrameInfo {
    /// Buffer width in pixels
    pub width: u32,
    /// Buffer height in pixels
    pub height: u32,
    /// Clockwise rotation in degrees (0, 90, 180 or 270)
    pub rotation: u32,
}

impl VideoFrameInfo {
    /// Create frame info without rotation
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            rotation: 0,
        }
    }

    /// Width after applying rotation
    pub fn rotated_width(&self) -> u32 {
        if self.rotation % 180 == 0 {
            self.width
        } else {
            self.height
        }
    }

    /// Height after applying rotation
    pub fn rotated_height(&self) -> u32 {
        if self.rotation % 180 == 0 {
            self.height
        } else {
            self.width
        }
    }
}

/// Receives frames from a video track
///
/// Called on capture or render contexts; implementations must return quickly.
pub trait VideoSink: Send + Sync {
    /// A frame was delivered
    fn on_frame(&self, frame: &VideoFrameInfo);
}

/// Native media track handle
pub trait MediaStreamTrack: Send + Sync {
    /// Track identifier
    fn id(&self) -> String;
    /// Media kind
    fn kind(&self) -> MediaKind;
    /// Whether the track is enabled
    fn enabled(&self) -> bool;
    /// Enable or disable the track
    fn set_enabled(&self, enabled: bool);
    /// Current ready state
    fn ready_state(&self) -> TrackReadyState;
    /// Attach a frame sink (video tracks only; audio tracks ignore it)
    fn add_sink(&self, sink: Arc<dyn VideoSink>);
    /// Detach a previously attached frame sink
    fn remove_sink(&self, sink: &Arc<dyn VideoSink>);
    /// Release the native handle
    fn dispose(&self);
}

/// Native media source shared by a track and its clones
pub trait MediaSource: Send + Sync {
    /// Media kind
    fn kind(&self) -> MediaKind;
    /// Release the native source
    fn dispose(&self);
    /// Install a processor for captured frames; `None` removes it
    ///
    /// Sources that cannot process frames ignore the call.
    fn set_video_processor(&self, processor: Option<Arc<dyn VideoProcessor>>) {
        let _ = processor;
    }
}

/// Hook a video source runs every captured frame through before delivery
pub trait VideoProcessor: Send + Sync {
    /// Transform one captured frame
    fn on_frame_captured(&self, frame: VideoFrameInfo) -> VideoFrameInfo;
}

/// A named frame effect (blur, background replacement, ...)
///
/// Effects get the render helper of the track's capturer so they can
/// allocate frame buffers on the capture thread.
pub trait VideoFrameProcessor: Send + Sync {
    /// Apply the effect to one frame
    fn process(&self, frame: VideoFrameInfo, helper: &dyn RenderHelper) -> VideoFrameInfo;
}

/// Render/capture helper resource backing a video capturer
pub trait RenderHelper: Send + Sync {
    /// Stop delivering frames to the capturer
    fn stop_listening(&self);
    /// Release the helper
    fn dispose(&self);
}

/// Notified by a capturer when it stops on its own
pub trait CapturerEventsListener: Send + Sync {
    /// The capturer ended (device lost, projection revoked)
    fn on_capturer_ended(&self);
}

/// Native capture device driver
pub trait VideoCapturer: Send + Sync {
    /// Bind the capturer to its helper and destination source
    fn initialize(&self, helper: Arc<dyn RenderHelper>, source: Arc<dyn MediaSource>);
    /// Start producing frames
    fn start_capture(&self, width: u32, height: u32, frame_rate: u32);
    /// Stop producing frames
    fn stop_capture(&self) -> BridgeResult<()>;
    /// Change resolution and frame rate while capturing
    fn change_capture_format(&self, width: u32, height: u32, frame_rate: u32) -> BridgeResult<()>;
    /// Switch to another camera device by name
    fn switch_camera(&self, _device_name: &str) -> BridgeResult<()> {
        Err(crate::error::BridgeError::NotSupported {
            operation: "switch_camera".to_string(),
        })
    }
    /// Whether this capturer produces screen content
    fn is_screencast(&self) -> bool;
    /// Register for capturer-initiated stops
    fn set_events_listener(&self, _listener: Arc<dyn CapturerEventsListener>) {}
    /// Release the capturer
    fn dispose(&self);
}

/// Native media stream container
pub trait MediaStream: Send + Sync {
    /// Stream identifier
    fn id(&self) -> String;
    /// Add a track to the stream
    fn add_track(&self, track: Arc<dyn MediaStreamTrack>);
    /// Tracks currently in the stream
    fn tracks(&self) -> Vec<Arc<dyn MediaStreamTrack>>;
}

/// Audio source constraint entry passed to the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintEntry {
    /// Constraint name
    pub key: String,
    /// Constraint value, absent when the consumer supplied `null`
    pub value: Option<String>,
}

/// Engine-level constraint set for source creation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConstraints {
    /// Mandatory entries
    pub mandatory: Vec<ConstraintEntry>,
    /// Optional entries
    pub optional: Vec<ConstraintEntry>,
}

/// Factory for native sources, tracks, streams and sessions
pub trait MediaEngine: Send + Sync {
    /// Create an audio source
    fn create_audio_source(&self, constraints: &EngineConstraints) -> BridgeResult<Arc<dyn MediaSource>>;
    /// Create an audio track reading from `source`
    fn create_audio_track(&self, id: &str, source: &Arc<dyn MediaSource>) -> Arc<dyn MediaStreamTrack>;
    /// Create a video source
    fn create_video_source(&self, is_screencast: bool) -> BridgeResult<Arc<dyn MediaSource>>;
    /// Create a video track reading from `source`
    fn create_video_track(&self, id: &str, source: &Arc<dyn MediaSource>) -> Arc<dyn MediaStreamTrack>;
    /// Allocate a render helper on a dedicated thread
    fn create_render_helper(&self, thread_name: &str) -> Option<Arc<dyn RenderHelper>>;
    /// Create an empty local media stream
    fn create_local_media_stream(&self, id: &str) -> Arc<dyn MediaStream>;
    /// Create a peer connection delivering callbacks to `observer`
    fn create_peer_connection(
        &self,
        configuration: &RtcConfiguration,
        observer: Arc<dyn PeerConnectionObserver>,
    ) -> Option<Arc<dyn PeerConnection>>;
}
