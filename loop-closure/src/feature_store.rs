//! Per-node persistence of keypoints, descriptors, 3-D points and name.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use crate::error::{Error, Result};
use crate::types::{NodeIndex, NodeRecord};

/// Durable storage for node records, keyed by node index.
pub trait FeatureStore: Send {
    fn put(&self, index: NodeIndex, record: NodeRecord) -> Result<()>;
    fn get(&self, index: NodeIndex) -> Result<NodeRecord>;
}

/// In-memory feature store. The default backing for tests and for hosts that
/// don't need cross-process persistence.
#[derive(Default)]
pub struct MemoryFeatureStore {
    nodes: RwLock<HashMap<NodeIndex, NodeRecord>>,
}

impl MemoryFeatureStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FeatureStore for MemoryFeatureStore {
    fn put(&self, index: NodeIndex, record: NodeRecord) -> Result<()> {
        self.nodes.write().insert(index, record);
        Ok(())
    }

    fn get(&self, index: NodeIndex) -> Result<NodeRecord> {
        self.nodes
            .read()
            .get(&index)
            .cloned()
            .ok_or(Error::NotFound(index))
    }
}

/// File-backed feature store: one keyed-text (`yml`) record per node, inside
/// a scratch directory created under a caller-supplied base path with a
/// process-unique suffix. The directory is removed on [`FileFeatureStore::close`].
pub struct FileFeatureStore {
    dir: PathBuf,
}

impl FileFeatureStore {
    /// Create the scratch directory `<base>/loop-closure-<uuid>`.
    pub fn new(base: impl AsRef<Path>) -> Result<Self> {
        let dir = base
            .as_ref()
            .join(format!("loop-closure-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir)?;
        tracing::debug!(dir = %dir.display(), "created feature store scratch directory");
        Ok(Self { dir })
    }

    fn path_for(&self, index: NodeIndex) -> PathBuf {
        self.dir.join(format!("node_{}.yml", index.get()))
    }

    /// Remove the scratch directory. Tolerates it already being gone.
    pub fn close(&self) -> Result<()> {
        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl FeatureStore for FileFeatureStore {
    fn put(&self, index: NodeIndex, record: NodeRecord) -> Result<()> {
        let path = self.path_for(index);
        let text = serde_yaml::to_string(&record)
            .map_err(|e| Error::DirectoryError(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
        std::fs::write(path, text)?;
        Ok(())
    }

    fn get(&self, index: NodeIndex) -> Result<NodeRecord> {
        let path = self.path_for(index);
        let text = std::fs::read_to_string(path).map_err(|_| Error::NotFound(index))?;
        serde_yaml::from_str(&text).map_err(|e| {
            Error::DirectoryError(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })
    }
}

impl Drop for FileFeatureStore {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(?e, "failed to clean up feature store scratch directory");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DescriptorMatrix, Keypoint};

    fn sample_record() -> NodeRecord {
        NodeRecord {
            name: "frame-0".into(),
            keypoints: vec![Keypoint::new(1.0, 2.0), Keypoint::new(3.0, 4.0)],
            descriptors: DescriptorMatrix::from_rows(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]),
            points3d: vec![],
        }
    }

    #[test]
    fn memory_store_round_trips() {
        let store = MemoryFeatureStore::new();
        let record = sample_record();
        store.put(NodeIndex(0), record.clone()).unwrap();
        let got = store.get(NodeIndex(0)).unwrap();
        assert_eq!(got.name, record.name);
        assert_eq!(got.keypoints, record.keypoints);
        assert_eq!(got.descriptors.row(0), record.descriptors.row(0));
    }

    #[test]
    fn memory_store_not_found() {
        let store = MemoryFeatureStore::new();
        assert!(matches!(store.get(NodeIndex(5)), Err(Error::NotFound(_))));
    }

    #[test]
    fn file_store_round_trips_and_cleans_up() {
        let base = tempfile::tempdir().unwrap();
        let dir_path;
        {
            let store = FileFeatureStore::new(base.path()).unwrap();
            dir_path = store.dir.clone();
            let record = sample_record();
            store.put(NodeIndex(3), record.clone()).unwrap();
            let got = store.get(NodeIndex(3)).unwrap();
            assert_eq!(got.name, record.name);
            assert_eq!(got.points3d, record.points3d);
            assert!(dir_path.exists());
        }
        assert!(!dir_path.exists());
    }
}
