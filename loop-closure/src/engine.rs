//! The loop closure engine: ingests nodes, maintains the hash index, ranks
//! candidates and runs geometric verification, per spec §4.5.

use tracing::{debug, info};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::extractor::FeatureExtractor;
use crate::feature_store::{FeatureStore, MemoryFeatureStore};
use crate::hash_index::{rank_candidates, HashIndex};
use crate::hasher::Hasher;
use crate::types::{CameraModel, NodeIndex, NodeRecord, Observation, Transform};
use crate::verifier::Verifier;

/// The engine's lifecycle state, per spec §4.5.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum EngineState {
    Uninitialized,
    Warming,
    Active,
}

/// Result of a `get_loop_closure` call.
#[derive(Clone, Debug, PartialEq)]
pub struct LoopClosureResult {
    pub valid: bool,
    /// `None` stands in for the spec's `index = -1` sentinel.
    pub index: Option<NodeIndex>,
    pub name: String,
    pub transform: Transform,
}

impl LoopClosureResult {
    fn none() -> Self {
        Self {
            valid: false,
            index: None,
            name: String::new(),
            transform: Transform::identity(),
        }
    }
}

/// Orchestrates hashing, candidate ranking and geometric verification across
/// an ingested sequence of nodes.
///
/// `set_node` and `get_loop_closure` are not reentrant; callers must
/// serialize them (spec §5). The engine owns its `FeatureStore` and
/// `HashIndex` exclusively, so no internal locking is used.
pub struct LoopClosureEngine<S: FeatureStore = MemoryFeatureStore> {
    config: Config,
    camera: Option<CameraModel>,
    store: S,
    hasher: Hasher,
    hash_index: HashIndex,
    state: EngineState,
    next_index: usize,
    current: Option<NodeIndex>,
    seed: u64,
}

impl LoopClosureEngine<MemoryFeatureStore> {
    /// Construct an engine backed by an in-memory feature store.
    pub fn new(config: Config) -> Self {
        Self::with_store(config, MemoryFeatureStore::new())
    }
}

impl<S: FeatureStore> LoopClosureEngine<S> {
    pub fn with_store(config: Config, store: S) -> Self {
        let seed = 0xC0FFEE;
        Self {
            config,
            camera: None,
            store,
            hasher: Hasher::new(config.num_proj.max(1), seed),
            hash_index: HashIndex::new(),
            state: EngineState::Uninitialized,
            next_index: 0,
            current: None,
            seed,
        }
    }

    /// Validate and install the engine configuration. Must be called once
    /// before the first `set_node`.
    pub fn set_params(&mut self, config: Config) -> Result<()> {
        config.validate()?;
        self.config = config;
        self.hasher = Hasher::new(config.num_proj, self.seed);
        Ok(())
    }

    /// Install camera intrinsics; required once before the first stereo
    /// `set_node`.
    pub fn set_camera_model(&mut self, camera: CameraModel) {
        self.camera = Some(camera);
    }

    /// Validate current configuration. No-op beyond that: the engine has no
    /// other resources to acquire (in-memory store needs none; a
    /// `FileFeatureStore` is created by the caller and handed in via
    /// `with_store`, so its directory already exists by construction).
    pub fn init(&self) -> Result<()> {
        self.config.validate()
    }

    /// Ingest a pre-extracted observation, assigning it the next node index.
    pub fn set_node(&mut self, name: impl Into<String>, observation: Observation) -> Result<NodeIndex> {
        let index = NodeIndex(self.next_index);
        self.next_index += 1;

        if self.hasher.is_initialized() {
            let dim = self.hasher.descriptor_dim().unwrap_or(0);
            let found = observation.descriptors().cols();
            if found != 0 && found != dim {
                return Err(Error::DimensionMismatch { expected: dim, found });
            }
        }

        let record = NodeRecord::from_observation(name.into(), &observation);
        self.store.put(index, record)?;
        self.current = Some(index);

        info!(index = index.get(), "ingested node");
        Ok(index)
    }

    /// Run `extractor` over `image` and ingest the resulting mono observation.
    /// A convenience wrapper around [`Self::set_node`] for hosts that hand
    /// the engine raw images instead of calling the extractor themselves.
    pub fn set_node_with_extractor<E: FeatureExtractor>(
        &mut self,
        extractor: &mut E,
        name: impl Into<String>,
        image: &E::Image,
    ) -> Result<NodeIndex> {
        let observation = extractor.extract_mono(image);
        self.set_node(name, observation)
    }

    /// Run `extractor` over a stereo pair and ingest the resulting stereo
    /// observation. See [`Self::set_node_with_extractor`].
    pub fn set_node_stereo_with_extractor<E: FeatureExtractor>(
        &mut self,
        extractor: &mut E,
        name: impl Into<String>,
        left: &E::Image,
        right: &E::Image,
    ) -> Result<NodeIndex> {
        let observation = extractor.extract_stereo(left, right);
        self.set_node(name, observation)
    }

    /// Run the loop-closure search for the most recently ingested node, per
    /// the algorithm in spec §4.5.
    pub fn get_loop_closure(&mut self) -> Result<LoopClosureResult> {
        let Some(current) = self.current else {
            return Ok(LoopClosureResult::none());
        };

        let record = self.store.get(current)?;

        if !self.hasher.is_initialized() {
            if record.descriptors.is_empty() {
                // Cannot bootstrap the basis from an empty observation; wait
                // for a node that actually has descriptors.
                return Ok(LoopClosureResult::none());
            }
            self.hasher.init(&record.descriptors);
            let h = self.hasher.hash(&record.descriptors)?;
            self.hash_index.append(current, h);
            self.state = EngineState::Warming;
            debug!("hasher bootstrapped from first node");
            return Ok(LoopClosureResult::none());
        }

        let query_hash = self.hasher.hash(&record.descriptors)?;
        if record.descriptors.is_empty() {
            debug!(
                index = current.get(),
                "skipping hash-index append for empty-descriptor node"
            );
        } else {
            self.hash_index.append(current, query_hash.clone());
        }

        if self.hash_index.size() <= self.config.min_neighbour {
            return Ok(LoopClosureResult::none());
        }

        if self.state == EngineState::Warming {
            self.state = EngineState::Active;
            info!("engine transitioned to active state");
        }

        let candidates = rank_candidates(
            &self.hash_index,
            &query_hash,
            current,
            self.config.min_neighbour,
            &self.hasher,
        );

        let verifier = Verifier::new(&self.config, self.camera.as_ref());
        let n = self.config.n_candidates.min(candidates.len());

        for (rank, (c, _dist)) in candidates.iter().take(n).enumerate() {
            let candidate_record = match self.store.get(*c) {
                Ok(r) => r,
                Err(Error::NotFound(_)) => {
                    debug!(rank, candidate = c.get(), "candidate not found, skipping");
                    continue;
                }
                Err(e) => return Err(e),
            };

            let outcome = verifier.verify(&record, &candidate_record);
            if !outcome.ok {
                continue;
            }

            if !self.config.validate {
                info!(index = c.get(), "loop closure accepted");
                return Ok(LoopClosureResult {
                    valid: true,
                    index: Some(*c),
                    name: outcome.name,
                    transform: outcome.transform,
                });
            }

            if self.neighbor_validates(&verifier, &record, *c) {
                info!(index = c.get(), "loop closure accepted after neighbor validation");
                return Ok(LoopClosureResult {
                    valid: true,
                    index: Some(*c),
                    name: outcome.name,
                    transform: outcome.transform,
                });
            }

            debug!(candidate = c.get(), "neighbor validation failed, trying next rank");
        }

        Ok(LoopClosureResult::none())
    }

    fn neighbor_validates(&self, verifier: &Verifier<'_>, query: &NodeRecord, candidate: NodeIndex) -> bool {
        for neighbor in [candidate.get().checked_sub(1), Some(candidate.get() + 1)] {
            let Some(idx) = neighbor else { continue };
            let Ok(neighbor_record) = self.store.get(NodeIndex(idx)) else {
                continue;
            };
            if verifier.verify(query, &neighbor_record).ok {
                return true;
            }
        }
        false
    }

    /// Tear down the engine. Implementations backed by a `FileFeatureStore`
    /// should drop (or explicitly close) the store afterwards; this call
    /// only resets in-process state.
    pub fn finalize(&mut self) {
        self.hash_index = HashIndex::new();
        self.current = None;
        self.state = EngineState::Uninitialized;
    }

    #[cfg(test)]
    fn hash_index_size(&self) -> usize {
        self.hash_index.size()
    }
}
