//! RANSAC-based geometric verification: fundamental-matrix fit for monocular
//! pairs, PnP pose estimation for stereo pairs.

use nalgebra::{DMatrix, Matrix3, Point2, Rotation3, SVD};
use rand::seq::SliceRandom;

use crate::types::{CameraModel, Keypoint, Point3};

const FUNDAMENTAL_MIN_SAMPLE: usize = 8;
const PNP_MIN_SAMPLE: usize = 6;
/// RANSAC loop-termination heuristic only: once a sampled pose clears this
/// many inliers, stop iterating rather than spend the remaining budget
/// looking for a marginally better one. This is unrelated to the caller's
/// `min_inliers` accept gate below, which is what actually decides ok/not-ok.
const PNP_EARLY_STOP_INLIERS: usize = 40;
/// Below this Frobenius norm a fundamental matrix is treated as degenerate.
/// Rank-deficiency (the third singular value collapsing) is checked
/// separately; this is a cheap first filter, not the sole check (see §9:
/// the source's fragile 3-entry-sum check is replaced outright here).
const DEGENERATE_EPS: f64 = 1e-6;

/// Normalize a set of 2-D points (Hartley normalization): translate the
/// centroid to the origin and scale so the average distance to the origin is
/// `sqrt(2)`. Returns the normalized points and the 3x3 normalization matrix.
fn normalize_points(points: &[Point2<f64>]) -> (Vec<Point2<f64>>, Matrix3<f64>) {
    let n = points.len() as f64;
    let centroid = points.iter().fold(Point2::origin(), |acc, p| acc + p.coords) / n;
    let mean_dist = points
        .iter()
        .map(|p| (p - centroid).norm())
        .sum::<f64>()
        / n;
    let scale = if mean_dist > 1e-12 {
        std::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };

    let t = Matrix3::new(
        scale,
        0.0,
        -scale * centroid.x,
        0.0,
        scale,
        -scale * centroid.y,
        0.0,
        0.0,
        1.0,
    );

    let normalized = points
        .iter()
        .map(|p| Point2::new(scale * (p.x - centroid.x), scale * (p.y - centroid.y)))
        .collect();

    (normalized, t)
}

/// Solve the normalized 8-point algorithm for a minimal (or larger) sample of
/// correspondences, enforcing the rank-2 constraint.
fn solve_fundamental(pairs: &[(Point2<f64>, Point2<f64>)]) -> Option<Matrix3<f64>> {
    if pairs.len() < 8 {
        return None;
    }

    let (p1, t1) = normalize_points(&pairs.iter().map(|(a, _)| *a).collect::<Vec<_>>());
    let (p2, t2) = normalize_points(&pairs.iter().map(|(_, b)| *b).collect::<Vec<_>>());

    let mut rows = Vec::with_capacity(pairs.len());
    for (a, b) in p1.iter().zip(p2.iter()) {
        rows.push(vec![
            b.x * a.x,
            b.x * a.y,
            b.x,
            b.y * a.x,
            b.y * a.y,
            b.y,
            a.x,
            a.y,
            1.0,
        ]);
    }
    let a_mat = DMatrix::from_fn(rows.len(), 9, |r, c| rows[r][c]);

    let svd = SVD::new(a_mat, true, true);
    let v_t = svd.v_t?;
    let f_vec = v_t.row(v_t.nrows() - 1).transpose();
    let f_approx = Matrix3::from_iterator(f_vec.iter().copied()).transpose();

    // Enforce rank-2 by zeroing the smallest singular value.
    let svd_f = SVD::new(f_approx, true, true);
    let mut sigma = svd_f.singular_values;
    sigma[2] = 0.0;
    let u = svd_f.u?;
    let v_t = svd_f.v_t?;
    let f_rank2 = u * Matrix3::from_diagonal(&sigma) * v_t;

    // Denormalize: F = T2^T * F_norm * T1.
    Some(t2.transpose() * f_rank2 * t1)
}

/// Sampson distance for a single correspondence under fundamental matrix `f`.
fn sampson_distance(f: &Matrix3<f64>, a: &Point2<f64>, b: &Point2<f64>) -> f64 {
    let x1 = nalgebra::Vector3::new(a.x, a.y, 1.0);
    let x2 = nalgebra::Vector3::new(b.x, b.y, 1.0);
    let fx1 = f * x1;
    let ftx2 = f.transpose() * x2;
    let numer = (x2.dot(&fx1)).powi(2);
    let denom = fx1.x.powi(2) + fx1.y.powi(2) + ftx2.x.powi(2) + ftx2.y.powi(2);
    if denom <= 1e-12 {
        f64::MAX
    } else {
        numer / denom
    }
}

fn is_degenerate(f: &Matrix3<f64>) -> bool {
    let frob = f.iter().map(|v| v * v).sum::<f64>().sqrt();
    if frob < DEGENERATE_EPS {
        return true;
    }
    let svd = SVD::new(*f, false, false);
    // A valid fundamental matrix has rank 2: the smallest singular value
    // should already be ~0 after enforcement, but a near-zero *second*
    // singular value means the epipolar geometry itself is degenerate
    // (e.g. all points collinear).
    svd.singular_values[1] < DEGENERATE_EPS
}

/// RANSAC fundamental-matrix estimation with Sampson-distance inlier scoring.
///
/// Returns `(F, inlier indices)` or `None` if no non-degenerate model with at
/// least 8 inliers could be found.
pub fn estimate_fundamental_ransac(
    pairs: &[(Point2<f64>, Point2<f64>)],
    threshold: f64,
    confidence: f64,
) -> Option<(Matrix3<f64>, Vec<usize>)> {
    if pairs.len() < FUNDAMENTAL_MIN_SAMPLE {
        return None;
    }

    let mut rng = rand::thread_rng();
    let mut best: Option<(Matrix3<f64>, Vec<usize>)> = None;
    let threshold_sq = threshold * threshold;

    let max_iters = 2000usize;
    let mut iters_needed = max_iters;
    let mut iter = 0;
    let indices: Vec<usize> = (0..pairs.len()).collect();

    while iter < iters_needed.min(max_iters) {
        iter += 1;
        let sample: Vec<usize> = indices
            .choose_multiple(&mut rng, FUNDAMENTAL_MIN_SAMPLE)
            .copied()
            .collect();
        if sample.len() < FUNDAMENTAL_MIN_SAMPLE {
            continue;
        }
        let sample_pairs: Vec<(Point2<f64>, Point2<f64>)> =
            sample.iter().map(|&i| pairs[i]).collect();

        let Some(f) = solve_fundamental(&sample_pairs) else {
            continue;
        };
        if is_degenerate(&f) {
            continue;
        }

        let inliers: Vec<usize> = pairs
            .iter()
            .enumerate()
            .filter(|(_, (a, b))| sampson_distance(&f, a, b) < threshold_sq)
            .map(|(i, _)| i)
            .collect();

        if best.as_ref().map(|(_, i)| inliers.len() > i.len()).unwrap_or(true) {
            // Adaptive iteration count from the observed inlier ratio.
            let w = (inliers.len() as f64 / pairs.len() as f64).max(1e-6);
            let denom = (1.0 - w.powi(FUNDAMENTAL_MIN_SAMPLE as i32)).ln();
            if denom < 0.0 {
                let needed = ((1.0 - confidence).ln() / denom).ceil();
                if needed.is_finite() && needed > 0.0 {
                    iters_needed = (needed as usize).min(max_iters);
                }
            }
            best = Some((f, inliers));
        }
    }

    let (f, inliers) = best?;
    if is_degenerate(&f) {
        return None;
    }
    Some((f, inliers))
}

/// Project a 3-D point with a candidate-to-query rigid transform and camera
/// intrinsics, returning normalized pixel coordinates.
fn project(k: &Matrix3<f64>, r: &Rotation3<f64>, t: &nalgebra::Vector3<f64>, p: &Point3) -> Option<Point2<f64>> {
    let point_cam = r * nalgebra::Vector3::new(p.x as f64, p.y as f64, p.z as f64) + t;
    if point_cam.z <= 1e-9 {
        return None;
    }
    let uvw = k * point_cam;
    Some(Point2::new(uvw.x / uvw.z, uvw.y / uvw.z))
}

/// Solve camera pose `[R | t]` from 3-D/2-D correspondences via a linear DLT
/// over the camera projection matrix, followed by orthogonalizing the
/// rotation block (nearest rotation matrix by SVD).
fn solve_pnp_linear(
    points3d: &[Point3],
    points2d_norm: &[Point2<f64>],
) -> Option<(Rotation3<f64>, nalgebra::Vector3<f64>)> {
    let n = points3d.len();
    if n < PNP_MIN_SAMPLE {
        return None;
    }

    let mut rows = Vec::with_capacity(n * 2);
    for (p3, p2) in points3d.iter().zip(points2d_norm.iter()) {
        let (x, y, z) = (p3.x as f64, p3.y as f64, p3.z as f64);
        let (u, v) = (p2.x, p2.y);
        rows.push(vec![x, y, z, 1.0, 0.0, 0.0, 0.0, 0.0, -u * x, -u * y, -u * z, -u]);
        rows.push(vec![0.0, 0.0, 0.0, 0.0, x, y, z, 1.0, -v * x, -v * y, -v * z, -v]);
    }
    let a_mat = DMatrix::from_fn(rows.len(), 12, |r, c| rows[r][c]);

    let svd = SVD::new(a_mat, true, true);
    let v_t = svd.v_t?;
    let p_vec = v_t.row(v_t.nrows() - 1);

    let m = nalgebra::Matrix3::new(
        p_vec[0], p_vec[1], p_vec[2], p_vec[4], p_vec[5], p_vec[6], p_vec[8], p_vec[9], p_vec[10],
    );
    let t_raw = nalgebra::Vector3::new(p_vec[3], p_vec[7], p_vec[11]);

    // Recover scale from the nearest-orthogonal projection of M, then fix
    // the sign so points project in front of the camera.
    let svd_m = SVD::new(m, true, true);
    let scale = svd_m.singular_values.sum() / 3.0;
    if scale.abs() < 1e-9 {
        return None;
    }
    let u = svd_m.u?;
    let v_t_m = svd_m.v_t?;
    let mut r_mat = u * v_t_m;
    let mut t = t_raw / scale;

    if r_mat.determinant() < 0.0 {
        r_mat = -r_mat;
        t = -t;
    }

    let rotation = Rotation3::from_matrix_unchecked(r_mat);
    Some((rotation, t))
}

/// PnP-RANSAC: estimate the candidate-to-query rigid transform from 3-D
/// points in the candidate frame and matched 2-D points in the query image.
/// `min_inliers` is the caller's accept gate — a model with fewer inliers is
/// rejected outright (`None`) regardless of how many RANSAC iterations ran.
pub fn estimate_pose_pnp_ransac(
    points3d: &[Point3],
    points2d: &[Keypoint],
    camera: &CameraModel,
    threshold: f64,
    max_iters: usize,
    min_inliers: usize,
) -> Option<(Rotation3<f64>, nalgebra::Vector3<f64>, Vec<usize>)> {
    let n = points3d.len();
    if n < PNP_MIN_SAMPLE || n != points2d.len() {
        return None;
    }

    let k_inv = camera.k.try_inverse()?;
    let normalized: Vec<Point2<f64>> = points2d
        .iter()
        .map(|kp| {
            let v = k_inv * nalgebra::Vector3::new(kp.x as f64, kp.y as f64, 1.0);
            Point2::new(v.x / v.z, v.y / v.z)
        })
        .collect();

    let mut rng = rand::thread_rng();
    let indices: Vec<usize> = (0..n).collect();
    let mut best: Option<(Rotation3<f64>, nalgebra::Vector3<f64>, Vec<usize>)> = None;

    for _ in 0..max_iters {
        let sample: Vec<usize> = indices.choose_multiple(&mut rng, PNP_MIN_SAMPLE).copied().collect();
        if sample.len() < PNP_MIN_SAMPLE {
            continue;
        }
        let sample_3d: Vec<Point3> = sample.iter().map(|&i| points3d[i]).collect();
        let sample_2d: Vec<Point2<f64>> = sample.iter().map(|&i| normalized[i]).collect();

        let Some((r, t)) = solve_pnp_linear(&sample_3d, &sample_2d) else {
            continue;
        };

        let inliers: Vec<usize> = (0..n)
            .filter(|&i| {
                match project(&camera.k, &r, &t, &points3d[i]) {
                    Some(proj) => {
                        let observed = Point2::new(points2d[i].x as f64, points2d[i].y as f64);
                        (proj - observed).norm() < threshold
                    }
                    None => false,
                }
            })
            .collect();

        if best.as_ref().map(|(_, _, i)| inliers.len() > i.len()).unwrap_or(true) {
            let found_enough = inliers.len() >= PNP_EARLY_STOP_INLIERS;
            best = Some((r, t, inliers));
            if found_enough {
                break;
            }
        }
    }

    let (r, t, inliers) = best?;
    if inliers.len() < min_inliers {
        return None;
    }

    // Refine the pose using the full inlier set.
    let inlier_3d: Vec<Point3> = inliers.iter().map(|&i| points3d[i]).collect();
    let inlier_2d: Vec<Point2<f64>> = inliers.iter().map(|&i| normalized[i]).collect();
    let (r_refined, t_refined) = solve_pnp_linear(&inlier_3d, &inlier_2d).unwrap_or((r, t));

    Some((r_refined, t_refined, inliers))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CameraModel;

    #[test]
    fn fundamental_ransac_rejects_too_few_points() {
        let pairs = vec![(Point2::new(0.0, 0.0), Point2::new(0.0, 0.0)); 4];
        assert!(estimate_fundamental_ransac(&pairs, 1.0, 0.99).is_none());
    }

    #[test]
    fn pnp_ransac_rejects_mismatched_lengths() {
        let camera = CameraModel::new(Matrix3::new(500.0, 0.0, 320.0, 0.0, 500.0, 240.0, 0.0, 0.0, 1.0));
        let points3d = vec![Point3::new(0.0, 0.0, 1.0); 10];
        let points2d = vec![Keypoint::new(0.0, 0.0); 5];
        assert!(estimate_pose_pnp_ransac(&points3d, &points2d, &camera, 2.0, 50, 6).is_none());
    }

    #[test]
    fn pnp_ransac_recovers_identity_pose_from_perfect_projections() {
        let camera = CameraModel::new(Matrix3::new(
            500.0, 0.0, 320.0, 0.0, 500.0, 240.0, 0.0, 0.0, 1.0,
        ));
        let points3d: Vec<Point3> = (0..40)
            .map(|i| Point3::new((i % 5) as f32 - 2.0, (i / 5) as f32 - 2.0, 5.0))
            .collect();
        let identity_r = Rotation3::identity();
        let identity_t = nalgebra::Vector3::zeros();
        let points2d: Vec<Keypoint> = points3d
            .iter()
            .map(|p| {
                let proj = project(&camera.k, &identity_r, &identity_t, p).unwrap();
                Keypoint::new(proj.x as f32, proj.y as f32)
            })
            .collect();

        let result = estimate_pose_pnp_ransac(&points3d, &points2d, &camera, 3.0, 200, 20);
        assert!(result.is_some());
        let (_, _, inliers) = result.unwrap();
        assert!(inliers.len() >= 20);
    }

    #[test]
    fn pnp_ransac_accepts_below_the_early_stop_threshold() {
        // A caller-supplied `min_inliers` well under `PNP_EARLY_STOP_INLIERS`
        // (40) must still be honored as the accept gate: a correspondence
        // set with only ~15 inliers out of 20 points should be accepted, not
        // silently held to a floor of 40.
        let camera = CameraModel::new(Matrix3::new(
            500.0, 0.0, 320.0, 0.0, 500.0, 240.0, 0.0, 0.0, 1.0,
        ));
        let points3d: Vec<Point3> = (0..20)
            .map(|i| Point3::new((i % 5) as f32 - 2.0, (i / 5) as f32 - 2.0, 5.0))
            .collect();
        let identity_r = Rotation3::identity();
        let identity_t = nalgebra::Vector3::zeros();
        let mut points2d: Vec<Keypoint> = points3d
            .iter()
            .map(|p| {
                let proj = project(&camera.k, &identity_r, &identity_t, p).unwrap();
                Keypoint::new(proj.x as f32, proj.y as f32)
            })
            .collect();
        // Knock 5 points far off their true projection so they can't be
        // inliers, leaving at most 15 of 20 consistent with any one pose.
        for kp in points2d.iter_mut().take(5) {
            kp.x += 500.0;
        }

        assert!(estimate_pose_pnp_ransac(&points3d, &points2d, &camera, 3.0, 200, 40).is_none());
        let result = estimate_pose_pnp_ransac(&points3d, &points2d, &camera, 3.0, 200, 12);
        assert!(result.is_some());
        let (_, _, inliers) = result.unwrap();
        assert!(inliers.len() >= 12 && inliers.len() < 40);
    }
}
