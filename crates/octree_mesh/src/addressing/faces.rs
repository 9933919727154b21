use smallvec::SmallVec;
use tracing::{debug, warn};

use super::nodes::mid_key;
use super::{FaceId, FaceTables, NodeId, OctreeAddressing};
use crate::octree::coordinates::{opposite_direction, CubeCoordinate, FACE_CORNERS};
use crate::octree::{LeafId, NeighbourLeaf};

/// Same loop seen from the other side.
#[inline]
fn reversed([a, b, c, d]: [NodeId; 4]) -> [NodeId; 4] {
  [a, d, c, b]
}

impl FaceTables {
  fn push(
    &mut self,
    nodes: [NodeId; 4],
    owner: LeafId,
    neighbour: Option<LeafId>,
    direction: usize,
    far_leaf: Option<LeafId>,
  ) {
    self.nodes.push(nodes);
    self.owner.push(owner);
    self.neighbour.push(neighbour);
    self.direction.push(direction);
    self.far_leaf.push(far_leaf);
  }
}

impl OctreeAddressing<'_> {
  /// Nodes of the face of `cube` in `direction`, outward from the cube.
  fn cube_face_nodes(&self, cube: CubeCoordinate, direction: usize) -> Option<[NodeId; 4]> {
    let mut nodes = [0; 4];
    for (slot, &corner) in FACE_CORNERS[direction].iter().enumerate() {
      nodes[slot] = self.node_for_key(cube.corner_key(corner))?;
    }
    Some(nodes)
  }

  /// Create the faces of all MESHCELL leaves.
  ///
  /// Same-level neighbours: the lower leaf id creates the face. Coarser
  /// neighbour: the finer leaf creates it. Non-mesh cubes, other ranks and
  /// the domain boundary give faces without a neighbour, one per finer leaf
  /// on the far side.
  #[tracing::instrument(skip_all, name = "addressing::create_octree_faces")]
  pub(super) fn create_octree_faces(&self) -> FaceTables {
    let octree = self.octree;
    let mut faces = FaceTables::default();
    let mut skipped = 0usize;

    for leaf in 0..octree.number_of_leaves() {
      if !self.is_local_mesh_cube(leaf) {
        continue;
      }
      let c = octree.leaf_coordinates(leaf);

      for direction in 0..6 {
        match octree.find_neighbour_leaf(leaf, direction) {
          NeighbourLeaf::Boundary => match self.cube_face_nodes(c, direction) {
            Some(nodes) => faces.push(nodes, leaf, None, direction, None),
            None => skipped += 1,
          },
          NeighbourLeaf::Leaf(n) => {
            let Some(nodes) = self.cube_face_nodes(c, direction) else {
              skipped += 1;
              continue;
            };
            if !self.is_local_mesh_cube(n) {
              faces.push(nodes, leaf, None, direction, Some(n));
            } else if octree.leaf_level(n) < c.level || leaf < n {
              if leaf < n {
                faces.push(nodes, leaf, Some(n), direction, Some(n));
              } else {
                faces.push(reversed(nodes), n, Some(leaf), opposite_direction(direction), Some(leaf));
              }
            }
          }
          NeighbourLeaf::Refined(_) => {
            let back = opposite_direction(direction);
            for finer in octree.find_neighbours_in_direction(leaf, direction) {
              if self.is_local_mesh_cube(finer) {
                continue;
              }
              match self.cube_face_nodes(octree.leaf_coordinates(finer), back) {
                Some(nodes) => faces.push(reversed(nodes), leaf, None, direction, Some(finer)),
                None => skipped += 1,
              }
            }
          }
        }
      }
    }

    if skipped > 0 {
      warn!(skipped, "faces without nodes; the tree is not balanced");
    }
    debug!(faces = faces.nodes.len(), "created octree faces");
    faces
  }

  pub(super) fn create_face_loops(&self) -> Vec<SmallVec<[NodeId; 8]>> {
    self
      .octree_faces()
      .iter()
      .map(|face| {
        let mut points = SmallVec::new();
        for i in 0..4 {
          let (a, b) = (face[i], face[(i + 1) % 4]);
          points.push(a);
          if let Some(mid) = self.node_for_key(mid_key(self.node_key(a), self.node_key(b))) {
            points.push(mid);
          }
        }
        points
      })
      .collect()
  }

  pub(super) fn calculate_leaf_faces(&self) -> Vec<SmallVec<[FaceId; 6]>> {
    let mut leaf_faces = vec![SmallVec::new(); self.octree.number_of_leaves()];
    let owner = self.octree_face_owner();
    let neighbour = self.octree_face_neighbour();
    for face in 0..owner.len() {
      leaf_faces[owner[face]].push(face);
      if let Some(n) = neighbour[face] {
        leaf_faces[n].push(face);
      }
    }
    leaf_faces
  }

  pub(super) fn calculate_node_faces(&self) -> Vec<SmallVec<[FaceId; 12]>> {
    let mut node_faces = vec![SmallVec::new(); self.number_of_nodes()];
    for (face, points) in self.octree_face_loops().iter().enumerate() {
      for &node in points {
        node_faces[node].push(face);
      }
    }
    node_faces
  }

  pub(super) fn calculate_leaf_leaves(&self) -> Vec<SmallVec<[LeafId; 6]>> {
    let mut leaf_leaves: Vec<SmallVec<[LeafId; 6]>> = vec![SmallVec::new(); self.octree.number_of_leaves()];
    for (&owner, neighbour) in self.octree_face_owner().iter().zip(self.octree_face_neighbour()) {
      if let Some(n) = *neighbour {
        leaf_leaves[owner].push(n);
        leaf_leaves[n].push(owner);
      }
    }
    for row in &mut leaf_leaves {
      row.sort_unstable();
      row.dedup();
    }
    leaf_leaves
  }
}
