//! octree_mesh - octree-based Cartesian mesh generation for CFD
//!
//! Builds hexahedral-dominant polyhedral meshes by refining an octree
//! around closed triangulated surfaces and extracting one cell per leaf.
//! The octree topology is replicated on every partition while leaf
//! ownership is distributed, so the same code runs serially or on several
//! in-process partitions.
//!
//! # Components
//!
//! - [`octree`]: cube coordinates, the arena-backed tree, the 2:1
//!   refinement closure and leaf distribution
//! - [`addressing`]: lazily computed node, face and edge tables over the
//!   leaves of one partition
//! - [`extract`]: polyhedral mesh extraction with optional split-hex
//!   decomposition
//! - [`driver`]: the refinement state machine
//! - [`surface`]: surface, feature and shell oracles
//! - [`parallel`]: communicators and decomposition
//!
//! # Example
//!
//! ```ignore
//! use octree_mesh::{MeshDict, MeshGeometry, RefineDriver, RefinementParameters};
//! use octree_mesh::parallel::{MortonDecomposer, SerialCommunicator};
//!
//! let dict = MeshDict::load("meshDict.toml".as_ref())?;
//! let surface = dict.read_surfaces()?;
//! let features = dict.read_features()?;
//! let shells = dict.build_shells();
//! let geometry = MeshGeometry {
//!   surface: &surface,
//!   features: &features,
//!   shells: &shells,
//!   keep_point: dict.keep_point(),
//!   cell_zones: dict.cell_zones(),
//! };
//!
//! let params = RefinementParameters::from_dict(&dict);
//! let mut driver = RefineDriver::background(SerialCommunicator, MortonDecomposer, geometry, params)?;
//! let summary = driver.run()?;
//! let mesh = driver.create_mesh()?;
//!
//! println!("{} cells, {} faces", summary.n_cells, mesh.faces.len());
//! ```

pub mod addressing;
pub mod config;
pub mod driver;
pub mod error;
pub mod extract;
pub mod geometry;
pub mod octree;
pub mod parallel;
pub mod surface;

#[cfg(test)]
pub mod test_utils;

// Re-export commonly used items
pub use addressing::{AddressingSettings, BoxType, OctreeAddressing};
pub use config::MeshDict;
pub use driver::{MeshGeometry, RefineDriver, RefineStage, RefineSummary, RefinementParameters};
pub use error::{MeshError, Result};
pub use extract::{MeshExtractor, PolyMesh};
pub use geometry::BoundBox;
pub use octree::{CubeCoordinate, CubeType, LeafId, Octree};
pub use surface::{SurfaceQuery, TriSurface};
