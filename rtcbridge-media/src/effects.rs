//! Named video effects for camera tracks
//!
//! The host application registers [`VideoFrameProcessor`]s by name. A track
//! asking for a list of names gets a [`VideoEffectChain`] installed on its
//! source; frames pass through the chain in the order the names were given.

use parking_lot::RwLock;
use rtcbridge_core::{RenderHelper, VideoFrameInfo, VideoFrameProcessor, VideoProcessor};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error};

/// Name-keyed lookup of the effects available to tracks
#[derive(Default)]
pub struct ProcessorRegistry {
    processors: RwLock<HashMap<String, Arc<dyn VideoFrameProcessor>>>,
}

impl ProcessorRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `processor` under `name`, replacing any previous one
    pub fn register(&self, name: impl Into<String>, processor: Arc<dyn VideoFrameProcessor>) {
        let name = name.into();
        debug!("Registered video effect '{}'", name);
        self.processors.write().insert(name, processor);
    }

    /// Remove the effect registered under `name`
    pub fn unregister(&self, name: &str) -> bool {
        self.processors.write().remove(name).is_some()
    }

    /// Look up an effect
    pub fn get(&self, name: &str) -> Option<Arc<dyn VideoFrameProcessor>> {
        self.processors.read().get(name).cloned()
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.processors.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered effects
    pub fn len(&self) -> usize {
        self.processors.read().len()
    }

    /// Whether no effect is registered
    pub fn is_empty(&self) -> bool {
        self.processors.read().is_empty()
    }

    /// Resolve `names` in order; unknown names are logged and skipped
    pub fn resolve<S: AsRef<str>>(&self, names: &[S]) -> Vec<Arc<dyn VideoFrameProcessor>> {
        let processors = self.processors.read();
        names
            .iter()
            .filter_map(|name| {
                let name = name.as_ref();
                let found = processors.get(name).cloned();
                if found.is_none() {
                    error!("No video effect registered as '{}'", name);
                }
                found
            })
            .collect()
    }
}

impl std::fmt::Debug for ProcessorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorRegistry")
            .field("names", &self.names())
            .finish()
    }
}

/// Ordered effects applied to every frame a source captures
pub struct VideoEffectChain {
    processors: Vec<Arc<dyn VideoFrameProcessor>>,
    helper: Arc<dyn RenderHelper>,
}

impl VideoEffectChain {
    /// Chain `processors` on the capture thread owned by `helper`
    pub fn new(processors: Vec<Arc<dyn VideoFrameProcessor>>, helper: Arc<dyn RenderHelper>) -> Self {
        Self { processors, helper }
    }

    /// Number of effects in the chain
    pub fn len(&self) -> usize {
        self.processors.len()
    }

    /// Whether the chain passes frames through unchanged
    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }
}

impl VideoProcessor for VideoEffectChain {
    fn on_frame_captured(&self, frame: VideoFrameInfo) -> VideoFrameInfo {
        self.processors
            .iter()
            .fold(frame, |frame, processor| processor.process(frame, self.helper.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtcbridge_core::testing::FakeRenderHelper;

    struct Rotate;

    impl VideoFrameProcessor for Rotate {
        fn process(&self, mut frame: VideoFrameInfo, _helper: &dyn RenderHelper) -> VideoFrameInfo {
            frame.rotation = (frame.rotation + 90) % 360;
            frame
        }
    }

    struct Halve;

    impl VideoFrameProcessor for Halve {
        fn process(&self, frame: VideoFrameInfo, _helper: &dyn RenderHelper) -> VideoFrameInfo {
            VideoFrameInfo {
                width: frame.width / 2,
                height: frame.height / 2,
                rotation: frame.rotation,
            }
        }
    }

    #[test]
    fn test_resolve_skips_unknown_names() {
        let registry = ProcessorRegistry::new();
        registry.register("rotate", Arc::new(Rotate));
        registry.register("halve", Arc::new(Halve));

        let resolved = registry.resolve(&["halve", "sparkles", "rotate"]);
        assert_eq!(resolved.len(), 2);
        assert_eq!(registry.names(), vec!["halve", "rotate"]);

        assert!(registry.unregister("halve"));
        assert!(!registry.unregister("halve"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_chain_applies_effects_in_order() {
        let registry = ProcessorRegistry::new();
        registry.register("rotate", Arc::new(Rotate));
        registry.register("halve", Arc::new(Halve));

        let chain = VideoEffectChain::new(
            registry.resolve(&["rotate", "halve", "rotate"]),
            Arc::new(FakeRenderHelper::default()),
        );
        let frame = chain.on_frame_captured(VideoFrameInfo::new(1280, 720));

        assert_eq!((frame.width, frame.height, frame.rotation), (640, 360, 180));
        assert_eq!(frame.rotated_width(), 640);
    }

    #[test]
    fn test_empty_chain_passes_frames_through() {
        let chain = VideoEffectChain::new(Vec::new(), Arc::new(FakeRenderHelper::default()));
        assert!(chain.is_empty());
        assert_eq!(chain.on_frame_captured(VideoFrameInfo::new(320, 240)), VideoFrameInfo::new(320, 240));
    }
}
