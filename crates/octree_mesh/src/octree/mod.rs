//! Octree module: cube coordinates, the arena-backed tree and consistent
//! refinement.
//!
//! # Level Convention
//!
//! Level 0 = the root cube, higher level = finer.
//!
//! ```text
//! Cell Size = root side / 2^level
//! ```
//!
//! # Module Structure
//!
//! - [`coordinates`]: `CubeCoordinate` - immutable value type for cube
//!   positions, neighbour tables and node keys
//! - [`cube`]: `OctreeCube` arena records and `CubeType`
//! - [`tree`]: `Octree` - refinement, merging, neighbour search
//! - [`refinement`]: consistent refinement closure and buffer layers
//! - [`distribution`]: leaf ownership across partitions

pub mod coordinates;
pub mod cube;
pub mod distribution;
pub mod refinement;
pub mod tree;

// Re-exports
pub use coordinates::{CubeCoordinate, NodeKey, MAX_LEVEL};
pub use cube::{CubeId, CubeType, LeafId, OctreeCube};
pub use distribution::DistributionMap;
pub use tree::{Lookup, NeighbourLeaf, Octree};
