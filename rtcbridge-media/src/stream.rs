//! Local media stream assembly

use crate::tracks::TrackRegistry;
use parking_lot::RwLock;
use rtcbridge_core::{MediaEngine, MediaStream, TrackInfo};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Result of assembling a local stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalStreamInfo {
    /// Handle of the new stream
    pub stream_id: String,
    /// Descriptors of the tracks added to it
    pub tracks: Vec<TrackInfo>,
}

/// Builds local streams from registered tracks and keeps them by handle
pub struct StreamAssembler {
    engine: Arc<dyn MediaEngine>,
    registry: Arc<TrackRegistry>,
    streams: RwLock<HashMap<String, Arc<dyn MediaStream>>>,
}

impl StreamAssembler {
    /// Create an assembler reading tracks from `registry`
    pub fn new(engine: Arc<dyn MediaEngine>, registry: Arc<TrackRegistry>) -> Self {
        Self {
            engine,
            registry,
            streams: RwLock::new(HashMap::new()),
        }
    }

    /// Create a stream holding the given tracks
    ///
    /// Ids that are not registered are skipped. An empty list yields an
    /// empty, registered stream.
    pub fn create_stream(&self, track_ids: &[String]) -> LocalStreamInfo {
        let handle = Uuid::new_v4().to_string();
        let stream = self.engine.create_local_media_stream(&handle);

        let mut tracks = Vec::with_capacity(track_ids.len());
        for id in track_ids {
            match (self.registry.native_track(id), self.registry.track_info(id)) {
                (Some(native), Some(info)) => {
                    stream.add_track(native);
                    tracks.push(info);
                }
                _ => warn!("Track {} not found, not adding it to stream {}", id, handle),
            }
        }

        self.streams.write().insert(handle.clone(), stream);
        debug!("Created local stream {} with {} tracks", handle, tracks.len());

        LocalStreamInfo {
            stream_id: handle,
            tracks,
        }
    }

    /// Look up a stream by handle
    pub fn stream(&self, handle: &str) -> Option<Arc<dyn MediaStream>> {
        self.streams.read().get(handle).cloned()
    }

    /// Unregister a stream; its tracks are left untouched
    pub fn release(&self, handle: &str) -> bool {
        self.streams.write().remove(handle).is_some()
    }

    /// Number of registered streams
    pub fn len(&self) -> usize {
        self.streams.read().len()
    }

    /// Whether no stream is registered
    pub fn is_empty(&self) -> bool {
        self.streams.read().is_empty()
    }
}
