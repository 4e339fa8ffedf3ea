//! # rtcbridge Media
//!
//! Local track lifecycle for rtcbridge. This crate owns capture controllers,
//! the track registry with its clone graph, local stream assembly, named
//! video effects and the per-track video observers (frame dimensions, mute
//! detection).

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod adapter;
pub mod capture;
pub mod constraints;
pub mod devices;
pub mod effects;
pub mod error;
pub mod stream;
pub mod tracks;

// Re-export main types
pub use adapter::{MuteTiming, VideoTrackAdapter, LOCAL_OWNER_ID};
pub use capture::{
    CameraCaptureController, CaptureController, CaptureCore, CaptureKind, ScreenCaptureController,
};
pub use constraints::{
    audio_constraints_from_options, strip_null_mandatory, FacingMode, VideoConstraints,
    VideoDefaults,
};
pub use devices::enumerate_devices;
pub use effects::{ProcessorRegistry, VideoEffectChain};
pub use error::{ErrorCategory, MediaError, MediaResult};
pub use stream::{LocalStreamInfo, StreamAssembler};
pub use tracks::{ManagedTrack, TrackRegistry};
