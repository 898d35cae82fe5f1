use bencher::{benchmark_group, benchmark_main, Bencher};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use loop_closure::{Config, DescriptorMatrix, Keypoint, LoopClosureEngine, Observation};

const SEED: u64 = 123456789;

benchmark_main!(benches);
benchmark_group!(benches, ingest_and_query_warm_engine, ingest_into_cold_engine);

fn frame(rng: &mut StdRng, rows: usize, cols: usize) -> Observation {
    let data: Vec<f32> = (0..rows * cols).map(|_| rng.gen_range(-1.0..1.0)).collect();
    Observation::Mono {
        keypoints: (0..rows).map(|i| Keypoint::new(i as f32, 0.0)).collect(),
        descriptors: DescriptorMatrix::from_rows(rows, cols, data),
    }
}

/// Hashing plus candidate-ranking cost once the engine has enough history to
/// be actively searching every ingested frame.
fn ingest_and_query_warm_engine(bench: &mut Bencher) {
    let config = Config {
        min_neighbour: 5,
        n_candidates: 5,
        ..Config::default()
    };
    let mut engine = LoopClosureEngine::new(config);
    engine.init().unwrap();

    let mut rng = StdRng::seed_from_u64(SEED);
    for i in 0..200 {
        let obs = frame(&mut rng, 300, 32);
        engine.set_node(format!("warmup-{i}"), obs).unwrap();
        engine.get_loop_closure().unwrap();
    }

    bench.iter(|| {
        let obs = frame(&mut rng, 300, 32);
        engine.set_node("bench", obs).unwrap();
        engine.get_loop_closure().unwrap()
    })
}

/// Cost of the first few ingestions, while the hash basis is still being
/// bootstrapped and the index is below `min_neighbour`.
fn ingest_into_cold_engine(bench: &mut Bencher) {
    let config = Config::default();
    let mut rng = StdRng::seed_from_u64(SEED);

    bench.iter(|| {
        let mut engine = LoopClosureEngine::new(config);
        engine.init().unwrap();
        let obs = frame(&mut rng, 300, 32);
        engine.set_node("cold", obs).unwrap();
        engine.get_loop_closure().unwrap()
    })
}
