//! End-to-end scenarios driving the engine through a synthetic frame
//! sequence, covering the loop-closure invariants: no false positives on an
//! unrelated sequence, true positives on exact and transformed revisits,
//! temporal neighbor validation, the min_neighbour guard, and scratch
//! directory cleanup on teardown.

use nalgebra::{Matrix3, Rotation3, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use loop_closure::{
    CameraModel, Config, DescriptorMatrix, FileFeatureStore, Keypoint, LoopClosureEngine,
    MemoryFeatureStore, Observation, Point3,
};

fn mono_frame(rng: &mut StdRng, rows: usize, cols: usize) -> Observation {
    let data: Vec<f32> = (0..rows * cols).map(|_| rng.gen_range(-1.0..1.0)).collect();
    Observation::Mono {
        keypoints: (0..rows).map(|i| Keypoint::new(i as f32, 0.0)).collect(),
        descriptors: DescriptorMatrix::from_rows(rows, cols, data),
    }
}

#[test]
fn s1_unrelated_sequence_reports_no_closures() {
    let config = Config {
        min_neighbour: 5,
        n_candidates: 3,
        min_matches: 20,
        min_inliers: 12,
        ..Config::default()
    };
    let mut engine = LoopClosureEngine::new(config);
    engine.init().unwrap();

    let mut rng = StdRng::seed_from_u64(10);
    for i in 0..50 {
        let frame = mono_frame(&mut rng, 40, 16);
        engine.set_node(format!("f{i}"), frame).unwrap();
        let result = engine.get_loop_closure().unwrap();
        assert!(!result.valid, "frame {i} unexpectedly reported a closure");
    }
}

#[test]
fn s2_exact_revisit_is_detected() {
    let config = Config {
        min_neighbour: 5,
        n_candidates: 50,
        min_matches: 20,
        min_inliers: 12,
        ..Config::default()
    };
    let mut engine = LoopClosureEngine::new(config);
    engine.init().unwrap();

    let mut rng = StdRng::seed_from_u64(11);
    let mut repeated = None;
    for i in 0..50 {
        let frame = if i == 10 {
            let f = mono_frame(&mut rng, 40, 16);
            repeated = Some(f.clone());
            f
        } else if i == 49 {
            repeated.clone().unwrap()
        } else {
            mono_frame(&mut rng, 40, 16)
        };

        engine.set_node(format!("f{i}"), frame).unwrap();
        let result = engine.get_loop_closure().unwrap();
        if i == 49 {
            assert!(result.valid, "byte-identical repeat of frame 10 was not detected");
            assert_eq!(result.index.unwrap().get(), 10);
        } else {
            assert!(!result.valid, "frame {i} unexpectedly reported a closure");
        }
    }
}

#[test]
fn s3_stereo_revisit_recovers_known_pose() {
    let camera = CameraModel::new(Matrix3::new(
        500.0, 0.0, 320.0, 0.0, 500.0, 240.0, 0.0, 0.0, 1.0,
    ));
    let config = Config {
        min_neighbour: 3,
        n_candidates: 40,
        min_matches: 20,
        min_inliers: 12,
        ..Config::default()
    };
    let mut engine = LoopClosureEngine::new(config);
    engine.set_camera_model(camera);
    engine.init().unwrap();

    let mut rng = StdRng::seed_from_u64(12);

    // The candidate frame: a stereo observation with 60 triangulated points
    // and distinctive per-point descriptors.
    let candidate_points3d: Vec<Point3> = (0..60)
        .map(|i| Point3::new((i % 10) as f32 - 5.0, (i / 10) as f32 - 3.0, 6.0))
        .collect();
    let candidate_descriptors: Vec<f32> = (0..60 * 8).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let candidate_descriptors = DescriptorMatrix::from_rows(60, 8, candidate_descriptors);
    let candidate_keypoints: Vec<Keypoint> = (0..60).map(|i| Keypoint::new(i as f32, 0.0)).collect();

    for i in 0..5 {
        let frame = mono_frame(&mut rng, 40, 8);
        engine.set_node(format!("f{i}"), frame).unwrap();
        engine.get_loop_closure().unwrap();
    }

    engine
        .set_node(
            "f5",
            Observation::Stereo {
                keypoints: candidate_keypoints,
                descriptors: candidate_descriptors.clone(),
                points3d: candidate_points3d.clone(),
            },
        )
        .unwrap();
    engine.get_loop_closure().unwrap();

    for i in 6..30 {
        let frame = mono_frame(&mut rng, 40, 8);
        engine.set_node(format!("f{i}"), frame).unwrap();
        engine.get_loop_closure().unwrap();
    }

    // The query frame is a known rigid translation of the candidate's 3-D
    // points, re-projected into a moved camera, with matching descriptors.
    let true_translation = Vector3::new(0.2, -0.1, 0.0);
    let true_rotation = Rotation3::identity();
    let query_keypoints: Vec<Keypoint> = candidate_points3d
        .iter()
        .map(|p| {
            let point_cam =
                true_rotation * Vector3::new(p.x as f64, p.y as f64, p.z as f64) + true_translation;
            let uvw = camera.k * point_cam;
            Keypoint::new((uvw.x / uvw.z) as f32, (uvw.y / uvw.z) as f32)
        })
        .collect();

    engine
        .set_node(
            "f30",
            Observation::Mono {
                keypoints: query_keypoints,
                descriptors: candidate_descriptors,
            },
        )
        .unwrap();
    let result = engine.get_loop_closure().unwrap();

    assert!(result.valid, "stereo revisit was not detected");
    assert_eq!(result.index.unwrap().get(), 5);
    assert!((result.transform.translation - true_translation).norm() < 0.5);
}

#[test]
fn s4_neighbor_validation_rejects_spurious_closure() {
    let mut rng = StdRng::seed_from_u64(13);
    let base_frames: Vec<Observation> = (0..40).map(|_| mono_frame(&mut rng, 40, 16)).collect();
    let repeat_of_12 = base_frames[12].clone();

    let run = |validate: bool| -> bool {
        let config = Config {
            min_neighbour: 5,
            n_candidates: 40,
            min_matches: 20,
            min_inliers: 12,
            validate,
            ..Config::default()
        };
        let mut engine = LoopClosureEngine::new(config);
        engine.init().unwrap();

        for (i, frame) in base_frames.iter().cloned().enumerate() {
            engine.set_node(format!("f{i}"), frame).unwrap();
            engine.get_loop_closure().unwrap();
        }
        engine.set_node("f40", repeat_of_12.clone()).unwrap();
        let result = engine.get_loop_closure().unwrap();
        result.valid
    };

    assert!(run(false), "unvalidated engine should accept the spurious-looking repeat");
    assert!(
        !run(true),
        "neighbor validation should reject a closure whose temporal neighbors don't corroborate it"
    );
}

#[test]
fn s5_min_neighbour_guard_holds_under_identical_frames() {
    let config = Config {
        min_neighbour: 5,
        n_candidates: 10,
        min_matches: 5,
        min_inliers: 3,
        ..Config::default()
    };
    let mut engine = LoopClosureEngine::new(config);
    engine.init().unwrap();

    let mut rng = StdRng::seed_from_u64(14);
    let frame = mono_frame(&mut rng, 30, 8);

    for i in 0..10 {
        engine.set_node(format!("f{i}"), frame.clone()).unwrap();
        let result = engine.get_loop_closure().unwrap();
        if let Some(index) = result.index {
            assert!(
                i - index.get() > config.min_neighbour,
                "closure to index {} accepted at frame {i} violates min_neighbour",
                index.get()
            );
        }
    }
}

#[test]
fn s6_finalize_and_drop_clean_up_scratch_directory() {
    let base = tempfile::tempdir().unwrap();
    let store = FileFeatureStore::new(base.path()).unwrap();

    let config = Config::default();
    let mut engine = LoopClosureEngine::with_store(config, store);
    engine.init().unwrap();

    let mut rng = StdRng::seed_from_u64(15);
    engine.set_node("f0", mono_frame(&mut rng, 20, 8)).unwrap();
    engine.get_loop_closure().unwrap();
    engine.finalize();

    drop(engine);

    let leftover: Vec<_> = std::fs::read_dir(base.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .collect();
    assert!(
        leftover.is_empty(),
        "feature store scratch directory was not cleaned up: {leftover:?}"
    );
}

#[test]
fn memory_store_is_the_default_backend() {
    let engine = LoopClosureEngine::new(Config::default());
    let _: LoopClosureEngine<MemoryFeatureStore> = engine;
}
