//! Loop closure detection for visual SLAM / place recognition.
//!
//! Given a sequence of monocular or stereo frames presented one at a time,
//! [`LoopClosureEngine`] decides for each new frame whether it revisits a
//! location previously seen, and if so, identifies the prior frame index
//! and (for stereo) the rigid transform between the two viewpoints.
//!
//! Keypoint/descriptor extraction is treated as a black box — callers supply
//! an [`Observation`] per frame (or implement [`FeatureExtractor`]) rather
//! than raw images. The engine is single-threaded and synchronous: `set_node`
//! and `get_loop_closure` are not reentrant and must be serialized by the
//! caller.
//!
//! ```
//! use loop_closure::{Config, LoopClosureEngine, Observation, DescriptorMatrix, Keypoint};
//!
//! let mut engine = LoopClosureEngine::new(Config::default());
//! engine.init().unwrap();
//!
//! let descriptors = DescriptorMatrix::from_rows(4, 4, vec![0.0; 16]);
//! let keypoints = vec![Keypoint::new(0.0, 0.0); 4];
//! engine
//!     .set_node("frame-0", Observation::Mono { keypoints, descriptors })
//!     .unwrap();
//! let result = engine.get_loop_closure().unwrap();
//! assert!(!result.valid); // the first node can never close a loop
//! ```

mod config;
mod engine;
mod error;
mod extractor;
mod feature_store;
mod geometry;
mod hash_index;
mod hasher;
mod matching;
mod types;
mod verifier;

pub use config::Config;
pub use engine::{LoopClosureEngine, LoopClosureResult};
pub use error::{Error, Result};
pub use extractor::FeatureExtractor;
pub use feature_store::{FeatureStore, FileFeatureStore, MemoryFeatureStore};
pub use types::{
    CameraModel, DescriptorMatrix, Keypoint, NodeIndex, NodeRecord, Observation, Point3, Transform,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doctest_shaped_smoke_test() {
        let mut engine = LoopClosureEngine::new(Config::default());
        engine.init().unwrap();
        let descriptors = DescriptorMatrix::from_rows(4, 4, vec![0.0; 16]);
        let keypoints = vec![Keypoint::new(0.0, 0.0); 4];
        engine
            .set_node(
                "frame-0",
                Observation::Mono {
                    keypoints,
                    descriptors,
                },
            )
            .unwrap();
        let result = engine.get_loop_closure().unwrap();
        assert!(!result.valid);
    }
}
