//! Cross-checked descriptor matching plus epipolar (mono) or PnP (stereo)
//! geometric verification between a query node and a stored candidate.

use nalgebra::Point2;
use tracing::debug;

use crate::config::Config;
use crate::geometry::{estimate_fundamental_ransac, estimate_pose_pnp_ransac};
use crate::matching::cross_check_matches;
use crate::types::{CameraModel, NodeRecord, Transform};

/// RANSAC confidence used for the mono fundamental-matrix fit.
const RANSAC_CONFIDENCE: f64 = 0.999;
const PNP_MAX_ITERS: usize = 100;

/// Outcome of verifying a query node against one candidate.
pub struct VerifyOutcome {
    pub ok: bool,
    pub matches: usize,
    pub inliers: usize,
    pub transform: Transform,
    pub name: String,
}

impl VerifyOutcome {
    fn rejected(matches: usize, name: String) -> Self {
        Self {
            ok: false,
            matches,
            inliers: 0,
            transform: Transform::identity(),
            name,
        }
    }
}

pub struct Verifier<'a> {
    config: &'a Config,
    camera: Option<&'a CameraModel>,
}

impl<'a> Verifier<'a> {
    pub fn new(config: &'a Config, camera: Option<&'a CameraModel>) -> Self {
        Self { config, camera }
    }

    /// Verify `query` against `candidate`.
    pub fn verify(&self, query: &NodeRecord, candidate: &NodeRecord) -> VerifyOutcome {
        let matches = cross_check_matches(
            &query.descriptors,
            &candidate.descriptors,
            self.config.desc_thresh,
        );

        if matches.len() < self.config.min_matches {
            debug!(
                matches = matches.len(),
                min_matches = self.config.min_matches,
                "verification rejected: insufficient cross-check matches"
            );
            return VerifyOutcome::rejected(matches.len(), candidate.name.clone());
        }

        let is_stereo = !candidate.points3d.is_empty() && self.camera.is_some();
        if is_stereo {
            self.verify_stereo(query, candidate, &matches)
        } else {
            self.verify_mono(query, candidate, &matches)
        }
    }

    fn verify_mono(
        &self,
        query: &NodeRecord,
        candidate: &NodeRecord,
        matches: &[(usize, usize)],
    ) -> VerifyOutcome {
        let pairs: Vec<(Point2<f64>, Point2<f64>)> = matches
            .iter()
            .map(|&(qi, ci)| {
                let q = query.keypoints[qi];
                let c = candidate.keypoints[ci];
                (
                    Point2::new(q.x as f64, q.y as f64),
                    Point2::new(c.x as f64, c.y as f64),
                )
            })
            .collect();

        let result = estimate_fundamental_ransac(
            &pairs,
            self.config.epipolar_thresh,
            RANSAC_CONFIDENCE,
        );

        let Some((_f, inliers)) = result else {
            debug!("verification rejected: degenerate or unsolvable epipolar geometry");
            return VerifyOutcome {
                ok: false,
                matches: matches.len(),
                inliers: 0,
                transform: Transform::identity(),
                name: candidate.name.clone(),
            };
        };

        if inliers.len() < self.config.min_inliers {
            debug!(
                inliers = inliers.len(),
                min_inliers = self.config.min_inliers,
                "verification rejected: insufficient epipolar inliers"
            );
            return VerifyOutcome {
                ok: false,
                matches: matches.len(),
                inliers: inliers.len(),
                transform: Transform::identity(),
                name: candidate.name.clone(),
            };
        }

        VerifyOutcome {
            ok: true,
            matches: matches.len(),
            inliers: inliers.len(),
            transform: Transform::identity(),
            name: candidate.name.clone(),
        }
    }

    fn verify_stereo(
        &self,
        query: &NodeRecord,
        candidate: &NodeRecord,
        matches: &[(usize, usize)],
    ) -> VerifyOutcome {
        let camera = self.camera.expect("stereo verification requires a camera model");

        let points3d: Vec<_> = matches.iter().map(|&(_, ci)| candidate.points3d[ci]).collect();
        let points2d: Vec<_> = matches.iter().map(|&(qi, _)| query.keypoints[qi]).collect();

        let result = estimate_pose_pnp_ransac(
            &points3d,
            &points2d,
            camera,
            self.config.max_reproj_err,
            PNP_MAX_ITERS,
            self.config.min_inliers,
        );

        let Some((rotation, translation, inliers)) = result else {
            debug!("verification rejected: PnP-RANSAC failed to find a valid pose");
            return VerifyOutcome {
                ok: false,
                matches: matches.len(),
                inliers: 0,
                transform: Transform::identity(),
                name: candidate.name.clone(),
            };
        };

        VerifyOutcome {
            ok: true,
            matches: matches.len(),
            inliers: inliers.len(),
            transform: Transform::from_rotation_translation(rotation, translation),
            name: candidate.name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DescriptorMatrix, Keypoint};

    fn node(name: &str, rows: usize, cols: usize) -> NodeRecord {
        NodeRecord {
            name: name.into(),
            keypoints: (0..rows).map(|i| Keypoint::new(i as f32, 0.0)).collect(),
            descriptors: DescriptorMatrix::from_rows(rows, cols, vec![0.0; rows * cols]),
            points3d: vec![],
        }
    }

    #[test]
    fn verify_rejects_below_min_matches() {
        let config = Config {
            min_matches: 1000,
            ..Config::default()
        };
        let verifier = Verifier::new(&config, None);
        let query = node("q", 5, 4);
        let candidate = node("c", 5, 4);
        let outcome = verifier.verify(&query, &candidate);
        assert!(!outcome.ok);
    }
}
