//! Polyhedral mesh extraction from the octree addressing.
//!
//! One cell per MESHCELL leaf, in leaf order. Points are the addressing
//! nodes. Face loops are the octree face loops, so faces next to finer
//! cells carry their hanging midpoints. Split-hex cells can optionally be
//! decomposed into pyramids and tetrahedra.

mod decompose;
mod poly_mesh;

pub use poly_mesh::{CellZone, FacePoints, Patch, PatchKind, PolyMesh, ZoneMap};

use std::collections::BTreeMap;

use tracing::info;

use crate::addressing::{BoxType, OctreeAddressing};
use crate::error::Result;
use crate::octree::LeafId;
use poly_mesh::RawFace;

pub const WALL_PATCH: &str = "walls";
pub const DOMAIN_PATCH: &str = "domain";

pub struct MeshExtractor<'a, 'o> {
  addressing: &'a OctreeAddressing<'o>,
  decompose_split_hexes: bool,
  zones: Option<&'a ZoneMap>,
  leaf_cell: Vec<Option<usize>>,
  cell_leaves: Vec<LeafId>,
}

impl<'a, 'o> MeshExtractor<'a, 'o> {
  pub fn new(addressing: &'a OctreeAddressing<'o>) -> Self {
    Self {
      addressing,
      decompose_split_hexes: false,
      zones: None,
      leaf_cell: Vec::new(),
      cell_leaves: Vec::new(),
    }
  }

  pub fn decompose_split_hexes(mut self, decompose: bool) -> Self {
    self.decompose_split_hexes = decompose;
    self
  }

  pub fn with_zones(mut self, zones: &'a ZoneMap) -> Self {
    self.zones = Some(zones);
    self
  }

  #[tracing::instrument(skip_all, name = "extract::create_mesh")]
  pub fn create_mesh(mut self) -> Result<PolyMesh> {
    self.create_points_and_addressing();
    let mut mesh = self.create_poly_mesh();
    if self.decompose_split_hexes {
      mesh = self.decompose_split_hexes_into_tets_and_pyramids(mesh);
    }
    info!(
      points = mesh.points.len(),
      faces = mesh.faces.len(),
      internal_faces = mesh.n_internal_faces(),
      cells = mesh.n_cells(),
      patches = mesh.patches.len(),
      "created polyhedral mesh"
    );
    Ok(mesh)
  }

  /// Map MESHCELL leaves to cells in leaf order.
  fn create_points_and_addressing(&mut self) {
    let box_type = self.addressing.box_type();
    self.leaf_cell = vec![None; box_type.len()];
    self.cell_leaves.clear();
    for (leaf, t) in box_type.iter().enumerate() {
      if t.contains(BoxType::MESHCELL) {
        self.leaf_cell[leaf] = Some(self.cell_leaves.len());
        self.cell_leaves.push(leaf);
      }
    }
  }

  fn cell_of(&self, leaf: LeafId) -> usize {
    // Faces are only created for MESHCELL leaves.
    self.leaf_cell[leaf].unwrap_or(usize::MAX)
  }

  fn create_poly_mesh(&self) -> PolyMesh {
    let addr = self.addressing;
    let rank = addr.settings().rank;
    let loops = addr.octree_face_loops();
    let owners = addr.octree_face_owner();
    let neighbours = addr.octree_face_neighbour();
    let far = addr.octree_face_far_leaf();

    let mut patch_info = vec![(WALL_PATCH.to_string(), PatchKind::Wall), (DOMAIN_PATCH.to_string(), PatchKind::Domain)];
    let mut processor_patch: BTreeMap<usize, usize> = BTreeMap::new();
    for face in 0..owners.len() {
      if let Some(remote) = addr.processor_face_leaf(face) {
        processor_patch.entry(addr.octree().owner(remote)).or_default();
      }
    }
    for (other, patch) in processor_patch.iter_mut() {
      *patch = patch_info.len();
      patch_info.push((format!("procBoundary{rank}to{other}"), PatchKind::Processor { neighbour_rank: *other }));
    }

    let raw: Vec<RawFace> = (0..owners.len())
      .map(|face| {
        let patch = match (neighbours[face], far[face]) {
          (Some(_), _) => None,
          (None, None) => Some(1),
          (None, Some(_)) => Some(match addr.processor_face_leaf(face) {
            Some(remote) => processor_patch[&addr.octree().owner(remote)],
            None => 0,
          }),
        };
        RawFace {
          points: loops[face].clone(),
          owner: self.cell_of(owners[face]),
          neighbour: neighbours[face].map(|n| self.cell_of(n)),
          patch,
        }
      })
      .collect();

    let mut mesh = PolyMesh::assemble(addr.octree_points().to_vec(), raw, self.cell_leaves.len(), patch_info);
    mesh.cell_leaves = self.cell_leaves.clone();
    if let Some(zones) = self.zones {
      mesh.cell_zones = zones
        .names
        .iter()
        .enumerate()
        .map(|(zone, name)| CellZone {
          name: name.clone(),
          cells: (0..mesh.n_cells()).filter(|&cell| zones.zone(mesh.cell_leaves[cell]) == Some(zone)).collect(),
        })
        .collect();
    }
    mesh
  }
}
