//! Random-projection image hashing.
//!
//! Maps a variable-height descriptor matrix to a fixed-length real vector by
//! projecting every descriptor row onto each of `P` random unit basis
//! vectors, sorting the resulting scalars descending, and summing a fixed
//! prefix. The sort makes the hash invariant to keypoint ordering; the fixed
//! prefix length makes it robust to keypoint-count drift after the first
//! node.

use nalgebra::DMatrix;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};

use crate::error::{Error, Result};
use crate::types::DescriptorMatrix;

/// A fixed-length hash vector of length `P`.
pub type HashVector = Vec<f32>;

/// Random projection basis, `P` rows of length `D`, each unit-norm.
///
/// Built once from the first non-empty descriptor matrix ingested by the
/// engine; immutable afterwards.
pub struct Hasher {
    basis: Option<DMatrix<f32>>,
    /// `L`, the reference keypoint count the prefix is clamped to.
    prefix_len: usize,
    num_proj: usize,
    seed: u64,
}

impl Hasher {
    pub fn new(num_proj: usize, seed: u64) -> Self {
        Self {
            basis: None,
            prefix_len: 0,
            num_proj,
            seed,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.basis.is_some()
    }

    pub fn descriptor_dim(&self) -> Option<usize> {
        self.basis.as_ref().map(|b| b.ncols())
    }

    /// Initialize the basis from the reference descriptor matrix `reference`.
    /// Must be called exactly once, with the first non-empty descriptor
    /// matrix the engine ingests.
    pub fn init(&mut self, reference: &DescriptorMatrix) {
        debug_assert!(!self.is_initialized(), "Hasher::init called twice");
        let dim = reference.cols();
        let mut rng = rand::rngs::StdRng::seed_from_u64(self.seed);
        let normal = StandardNormal;

        let mut rows = Vec::with_capacity(self.num_proj * dim);
        for _ in 0..self.num_proj {
            let mut row: Vec<f32> = (0..dim).map(|_| normal.sample(&mut rng)).collect();
            let norm = row.iter().map(|v| v * v).sum::<f32>().sqrt();
            if norm > 0.0 {
                for v in row.iter_mut() {
                    *v /= norm;
                }
            }
            rows.extend(row);
        }

        self.basis = Some(DMatrix::from_row_slice(self.num_proj, dim, &rows));
        self.prefix_len = reference.rows();
    }

    /// Compute the hash vector for `descriptors`, failing if its
    /// dimensionality doesn't match the basis.
    pub fn hash(&self, descriptors: &DescriptorMatrix) -> Result<HashVector> {
        let basis = self.basis.as_ref().expect("Hasher not initialized");
        let dim = basis.ncols();
        if descriptors.cols() != 0 && descriptors.cols() != dim {
            return Err(Error::DimensionMismatch {
                expected: dim,
                found: descriptors.cols(),
            });
        }

        let k = descriptors.rows();
        // Clamp the prefix to min(K, L): if K < L, use all K entries.
        let prefix = self.prefix_len.min(k);

        let mut hash = vec![0.0f32; self.num_proj];
        if k == 0 {
            return Ok(hash);
        }

        for (j, hj) in hash.iter_mut().enumerate() {
            let b_row: Vec<f32> = basis.row(j).iter().copied().collect();
            let mut projections: Vec<f32> = (0..k)
                .map(|i| {
                    descriptors
                        .row(i)
                        .iter()
                        .zip(b_row.iter())
                        .map(|(x, b)| x * b)
                        .sum()
                })
                .collect();
            projections.sort_unstable_by(|a, b| b.partial_cmp(a).unwrap());
            *hj = projections[..prefix].iter().sum();
        }

        Ok(hash)
    }

    /// L1 distance between two hash vectors. Smaller is more similar.
    pub fn distance(&self, a: &HashVector, b: &HashVector) -> f32 {
        a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).sum()
    }
}
