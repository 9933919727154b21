//! Error type shared by every stage of mesh generation.

use std::path::PathBuf;

use thiserror::Error;

use crate::octree::CubeCoordinate;

/// Errors raised while building, refining, addressing or extracting a mesh.
///
/// Budget exhaustion is not an error; the refinement driver reports it and
/// stops the current stage.
#[derive(Debug, Error)]
pub enum MeshError {
  /// A leaf id that does not refer to a current leaf.
  #[error("leaf {leaf} does not exist (tree has {n_leaves} leaves)")]
  InvalidLeaf { leaf: usize, n_leaves: usize },

  /// A cube id that does not refer to a live cube.
  #[error("cube {0} does not exist")]
  InvalidCube(usize),

  /// Splitting would exceed the deepest representable level.
  #[error("cannot refine {0:?}: maximum refinement level reached")]
  LevelLimit(CubeCoordinate),

  /// The keep point is unusable for inside/outside classification.
  #[error("keep point {point:?} {reason}")]
  KeepPoint { point: [f64; 3], reason: &'static str },

  /// Partitions disagreed on a collective call.
  #[error("partition {rank} desynchronized: {detail}")]
  Desynchronized { rank: usize, detail: String },

  /// A partition hung up while others still expected messages.
  #[error("partition {rank} lost its peers")]
  Disconnected { rank: usize },

  /// The geometry has no triangles.
  #[error("surface {0} has no triangles")]
  EmptySurface(String),

  #[error("failed to read {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("{path}:{line}: {message}")]
  Parse {
    path: PathBuf,
    line: usize,
    message: String,
  },

  #[error("invalid mesh dictionary: {0}")]
  Config(String),

  #[error("failed to parse mesh dictionary: {0}")]
  Toml(#[from] toml::de::Error),
}

pub type Result<T, E = MeshError> = std::result::Result<T, E>;
