//! The feature-extractor contract consumed by hosts of the engine.
//!
//! Keypoint/descriptor extraction is explicitly out of scope for this crate
//! (spec §1 Non-goals): implementations live in the host application (e.g.
//! backed by an OpenCV detector) and are handed to the engine through this
//! trait, or bypassed entirely via `LoopClosureEngine::set_node` with a
//! pre-built [`crate::Observation`].

use crate::types::Observation;

/// A black-box keypoint/descriptor extractor. Descriptor dimensionality `D`
/// is fixed per extractor instance (spec §6).
pub trait FeatureExtractor {
    type Image;

    /// Extract keypoints and descriptors from a single image.
    fn extract_mono(&mut self, image: &Self::Image) -> Observation;

    /// Extract keypoints, descriptors and triangulated 3-D points (in the
    /// left camera frame) from a stereo pair.
    fn extract_stereo(&mut self, left: &Self::Image, right: &Self::Image) -> Observation;
}
