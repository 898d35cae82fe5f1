//! Engine configuration and validation.

use crate::error::{Error, Result};

/// Recognized configuration options, per spec §3.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Config {
    /// `P`: hash length / random projection basis dimensionality.
    pub num_proj: usize,
    /// Ratio-test threshold for cross-checked descriptor matching.
    pub desc_thresh: f32,
    /// RANSAC inlier distance for fundamental-matrix fit (mono), Sampson distance.
    pub epipolar_thresh: f64,
    /// RANSAC reprojection threshold (stereo PnP).
    pub max_reproj_err: f64,
    /// Minimum temporal gap between query and a legal candidate.
    pub min_neighbour: usize,
    /// Maximum number of top-ranked hash candidates to geometrically verify.
    pub n_candidates: usize,
    /// Minimum cross-check descriptor matches required to proceed to geometry.
    pub min_matches: usize,
    /// Minimum geometric inliers required to accept a closure.
    pub min_inliers: usize,
    /// Require an additional verification against an immediate temporal
    /// neighbor of the accepted candidate.
    pub validate: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            num_proj: 32,
            desc_thresh: 0.8,
            epipolar_thresh: 3.0,
            max_reproj_err: 8.0,
            min_neighbour: 5,
            n_candidates: 3,
            min_matches: 20,
            min_inliers: 12,
            validate: false,
        }
    }
}

impl Config {
    /// Validate parameter ranges. Called from `LoopClosureEngine::init`;
    /// a failure here is the only way `Error::ConfigInvalid` is produced.
    pub fn validate(&self) -> Result<()> {
        if self.num_proj == 0 {
            return Err(Error::ConfigInvalid("num_proj must be > 0".into()));
        }
        if !(0.0..=1.0).contains(&self.desc_thresh) {
            return Err(Error::ConfigInvalid(
                "desc_thresh must be in [0, 1]".into(),
            ));
        }
        if self.epipolar_thresh <= 0.0 {
            return Err(Error::ConfigInvalid("epipolar_thresh must be > 0".into()));
        }
        if self.max_reproj_err <= 0.0 {
            return Err(Error::ConfigInvalid("max_reproj_err must be > 0".into()));
        }
        if self.n_candidates == 0 {
            return Err(Error::ConfigInvalid("n_candidates must be > 0".into()));
        }
        if self.min_matches == 0 {
            return Err(Error::ConfigInvalid("min_matches must be > 0".into()));
        }
        if self.min_inliers == 0 {
            return Err(Error::ConfigInvalid("min_inliers must be > 0".into()));
        }
        Ok(())
    }
}
