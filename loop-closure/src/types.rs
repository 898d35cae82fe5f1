//! Shared data types: node indices, keypoints, 3-D points, descriptor
//! matrices, rigid transforms and the persisted node record.

use nalgebra::{DMatrix, Matrix3, Rotation3, Vector3};
use serde::{Deserialize, Serialize};

/// A node index, assigned in ingestion order starting at 0.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeIndex(pub usize);

impl NodeIndex {
    pub fn get(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for NodeIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A 2-D keypoint in pixel coordinates.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
}

impl Keypoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// A 3-D point, expressed in the owning camera's frame.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Point3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// A dense descriptor matrix, one row per keypoint, serialized as a flat
/// buffer so it round-trips exactly through the feature store.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DescriptorMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl DescriptorMatrix {
    pub fn from_rows(rows: usize, cols: usize, data: Vec<f32>) -> Self {
        assert_eq!(data.len(), rows * cols, "descriptor buffer size mismatch");
        Self { rows, cols, data }
    }

    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Borrow row `i` as a descriptor slice.
    pub fn row(&self, i: usize) -> &[f32] {
        let start = i * self.cols;
        &self.data[start..start + self.cols]
    }

    pub fn row_iter(&self) -> impl Iterator<Item = &[f32]> {
        (0..self.rows).map(move |i| self.row(i))
    }

    /// View as a dense nalgebra matrix (rows = keypoints, cols = dimensions).
    pub fn as_dmatrix(&self) -> DMatrix<f32> {
        // nalgebra is column-major; build by transposing our row-major data.
        DMatrix::from_row_slice(self.rows, self.cols, &self.data)
    }
}

/// Rigid transform from candidate frame to query frame.
///
/// Mono verification cannot recover metric scale and always returns
/// [`Transform::identity`]; stereo verification returns the candidate-to-query
/// transform recovered from PnP-RANSAC.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub rotation: Rotation3<f64>,
    pub translation: Vector3<f64>,
}

impl Transform {
    pub fn identity() -> Self {
        Self {
            rotation: Rotation3::identity(),
            translation: Vector3::zeros(),
        }
    }

    pub fn from_rotation_translation(rotation: Rotation3<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation,
            translation,
        }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

/// Pinhole camera intrinsics, no distortion. Required once before the first
/// stereo `set_node` call.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraModel {
    pub k: Matrix3<f64>,
}

impl CameraModel {
    pub fn new(k: Matrix3<f64>) -> Self {
        Self { k }
    }
}

/// An observation handed to the engine by `set_node`: either a monocular
/// frame (keypoints + descriptors) or a stereo frame (additionally carrying
/// triangulated 3-D points in the left camera frame, one per keypoint).
#[derive(Clone, Debug)]
pub enum Observation {
    Mono {
        keypoints: Vec<Keypoint>,
        descriptors: DescriptorMatrix,
    },
    Stereo {
        keypoints: Vec<Keypoint>,
        descriptors: DescriptorMatrix,
        points3d: Vec<Point3>,
    },
}

impl Observation {
    pub fn keypoints(&self) -> &[Keypoint] {
        match self {
            Observation::Mono { keypoints, .. } => keypoints,
            Observation::Stereo { keypoints, .. } => keypoints,
        }
    }

    pub fn descriptors(&self) -> &DescriptorMatrix {
        match self {
            Observation::Mono { descriptors, .. } => descriptors,
            Observation::Stereo { descriptors, .. } => descriptors,
        }
    }

    pub fn points3d(&self) -> &[Point3] {
        match self {
            Observation::Mono { .. } => &[],
            Observation::Stereo { points3d, .. } => points3d,
        }
    }

    pub fn is_stereo(&self) -> bool {
        matches!(self, Observation::Stereo { .. })
    }
}

/// A persisted node record: everything the feature store keeps for one node.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeRecord {
    pub name: String,
    pub keypoints: Vec<Keypoint>,
    pub descriptors: DescriptorMatrix,
    pub points3d: Vec<Point3>,
}

impl NodeRecord {
    pub fn from_observation(name: String, observation: &Observation) -> Self {
        Self {
            name,
            keypoints: observation.keypoints().to_vec(),
            descriptors: observation.descriptors().clone(),
            points3d: observation.points3d().to_vec(),
        }
    }
}
