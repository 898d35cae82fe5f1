use thiserror::Error;

use crate::types::NodeIndex;

/// Errors surfaced by the loop closure engine.
///
/// Per the error policy: [`Error::ConfigInvalid`] and [`Error::DirectoryError`]
/// surface from `init`/`finalize`, and [`Error::DimensionMismatch`] surfaces
/// from the offending `set_node` call. [`Error::NotFound`] never escapes
/// [`crate::LoopClosureEngine`] — it is caught internally during
/// `get_loop_closure` and downgrades the offending candidate to a rejection.
///
/// Degenerate or unsolvable geometry (spec §7's `DegenerateGeometry` kind) is
/// not a variant here: `geometry::estimate_fundamental_ransac` and
/// `geometry::estimate_pose_pnp_ransac` already signal that case as `None`,
/// and `verifier::Verifier::verify` turns `None` directly into
/// `VerifyOutcome { ok: false, .. }`. Since that outcome never needs to
/// propagate past the engine either, routing it through this enum first
/// would add a conversion step without a caller that observes it.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("scratch directory error: {0}")]
    DirectoryError(#[from] std::io::Error),

    #[error("descriptor dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("node {0:?} not found in feature store")]
    NotFound(NodeIndex),
}

pub type Result<T> = std::result::Result<T, Error>;
