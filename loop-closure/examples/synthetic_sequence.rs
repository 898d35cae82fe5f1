//! Feeds a short synthetic frame sequence through the engine, including one
//! byte-identical repeat, and prints the detected closure.

use loop_closure::{Config, DescriptorMatrix, Keypoint, LoopClosureEngine, Observation};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_frame(rng: &mut StdRng, rows: usize, cols: usize) -> Observation {
    let data: Vec<f32> = (0..rows * cols).map(|_| rng.gen_range(-1.0..1.0)).collect();
    Observation::Mono {
        keypoints: (0..rows).map(|i| Keypoint::new(i as f32, 0.0)).collect(),
        descriptors: DescriptorMatrix::from_rows(rows, cols, data),
    }
}

fn main() {
    tracing_subscriber::fmt::init();

    let config = Config {
        min_neighbour: 5,
        n_candidates: 3,
        min_matches: 20,
        min_inliers: 12,
        ..Config::default()
    };

    let mut engine = LoopClosureEngine::new(config);
    engine.init().expect("valid configuration");

    let mut rng = StdRng::seed_from_u64(7);
    let frames: Vec<Observation> = (0..10).map(|_| random_frame(&mut rng, 300, 32)).collect();

    // Repeat frame 2 byte-for-byte at the end of the sequence.
    let repeated = frames[2].clone();

    for (i, frame) in frames.iter().cloned().enumerate() {
        engine.set_node(format!("frame-{i}"), frame).unwrap();
        let result = engine.get_loop_closure().unwrap();
        println!("frame {i}: valid={} index={:?}", result.valid, result.index);
    }

    engine.set_node("frame-10 (repeat of 2)", repeated).unwrap();
    let result = engine.get_loop_closure().unwrap();
    println!(
        "frame 10: valid={} index={:?} name={:?}",
        result.valid, result.index, result.name
    );

    engine.finalize();
}
