//! Demand-driven addressing tables derived from an [`Octree`].
//!
//! Every table is computed on first access from the tree and the tables it
//! depends on, then cached:
//!
//! ```text
//! box_type ─► node_labels ─► node_leaves ─► node_type
//!                  │
//!                  └─► octree_faces ─► face_loops ─► octree_edges
//!                          │                              │
//!                          └─► leaf_faces, node_faces,    └─► leaf_edges, edge_leaves,
//!                              leaf_leaves                    node_edges, face_edges, edge_faces
//! ```
//!
//! The addressing borrows the tree immutably, so the tree cannot change
//! while cached tables exist. [`OctreeAddressing::clear_out`] drops every
//! table; [`OctreeAddressing::set_box_type`] drops everything derived from
//! box types.

mod box_type;
mod edges;
mod faces;
mod global;
mod irregular;
mod nodes;

pub use box_type::BoxType;
pub use global::GlobalNumbering;

use std::collections::HashMap;

use glam::DVec3;
use once_cell::unsync::OnceCell;
use smallvec::SmallVec;

use crate::error::Result;
use crate::octree::{CubeType, LeafId, NodeKey, Octree};
use crate::parallel::Communicator;

pub type NodeId = usize;
pub type FaceId = usize;
pub type EdgeId = usize;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AddressingSettings {
  /// Cubes cut by the surface become mesh cells too.
  pub use_data_boxes: bool,
  /// Rank whose leaves become mesh cells.
  pub rank: usize,
}

#[derive(Debug, Default)]
pub(crate) struct NodeTables {
  labels: Vec<Option<[NodeId; 8]>>,
  points: Vec<DVec3>,
  keys: Vec<NodeKey>,
  key_map: HashMap<NodeKey, NodeId>,
}

#[derive(Debug, Default)]
pub(crate) struct FaceTables {
  nodes: Vec<[NodeId; 4]>,
  owner: Vec<LeafId>,
  neighbour: Vec<Option<LeafId>>,
  direction: Vec<usize>,
  far_leaf: Vec<Option<LeafId>>,
}

#[derive(Debug, Default)]
pub(crate) struct EdgeTables {
  nodes: Vec<[NodeId; 2]>,
  face_edges: Vec<SmallVec<[EdgeId; 8]>>,
}

pub struct OctreeAddressing<'a> {
  octree: &'a Octree,
  settings: AddressingSettings,

  box_type: OnceCell<Vec<BoxType>>,
  nodes: OnceCell<NodeTables>,
  node_leaves: OnceCell<Vec<[Option<LeafId>; 8]>>,
  node_type: OnceCell<Vec<BoxType>>,

  faces: OnceCell<FaceTables>,
  face_loops: OnceCell<Vec<SmallVec<[NodeId; 8]>>>,
  leaf_faces: OnceCell<Vec<SmallVec<[FaceId; 6]>>>,
  node_faces: OnceCell<Vec<SmallVec<[FaceId; 12]>>>,
  leaf_leaves: OnceCell<Vec<SmallVec<[LeafId; 6]>>>,

  edges: OnceCell<EdgeTables>,
  leaf_edges: OnceCell<Vec<SmallVec<[EdgeId; 12]>>>,
  edge_leaves: OnceCell<Vec<SmallVec<[LeafId; 4]>>>,
  node_edges: OnceCell<Vec<SmallVec<[EdgeId; 6]>>>,
  edge_faces: OnceCell<Vec<SmallVec<[FaceId; 4]>>>,

  global_points: OnceCell<GlobalNumbering>,
  global_faces: OnceCell<GlobalNumbering>,
  global_leaves: OnceCell<GlobalNumbering>,
}

impl<'a> OctreeAddressing<'a> {
  pub fn new(octree: &'a Octree, settings: AddressingSettings) -> Self {
    Self {
      octree,
      settings,
      box_type: OnceCell::new(),
      nodes: OnceCell::new(),
      node_leaves: OnceCell::new(),
      node_type: OnceCell::new(),
      faces: OnceCell::new(),
      face_loops: OnceCell::new(),
      leaf_faces: OnceCell::new(),
      node_faces: OnceCell::new(),
      leaf_leaves: OnceCell::new(),
      edges: OnceCell::new(),
      leaf_edges: OnceCell::new(),
      edge_leaves: OnceCell::new(),
      node_edges: OnceCell::new(),
      edge_faces: OnceCell::new(),
      global_points: OnceCell::new(),
      global_faces: OnceCell::new(),
      global_leaves: OnceCell::new(),
    }
  }

  pub fn octree(&self) -> &'a Octree {
    self.octree
  }

  pub fn settings(&self) -> AddressingSettings {
    self.settings
  }

  /// Drop every cached table.
  pub fn clear_out(&mut self) {
    self.box_type.take();
    self.clear_derived();
  }

  /// Drop every table computed from box types.
  fn clear_derived(&mut self) {
    self.nodes.take();
    self.node_leaves.take();
    self.node_type.take();
    self.faces.take();
    self.face_loops.take();
    self.leaf_faces.take();
    self.node_faces.take();
    self.leaf_leaves.take();
    self.edges.take();
    self.leaf_edges.take();
    self.edge_leaves.take();
    self.node_edges.take();
    self.edge_faces.take();
    self.global_points.take();
    self.global_faces.take();
    self.global_leaves.take();
  }

  // ===========================================================================
  // Box types
  // ===========================================================================

  /// Whether a leaf becomes a mesh cell on its owner rank.
  #[inline]
  pub fn is_mesh_cube(&self, leaf: LeafId) -> bool {
    self.octree.cube_type(leaf).is_mesh(self.settings.use_data_boxes)
  }

  /// Whether a leaf becomes a mesh cell on this rank.
  #[inline]
  pub fn is_local_mesh_cube(&self, leaf: LeafId) -> bool {
    self.box_type()[leaf].contains(BoxType::MESHCELL)
  }

  pub fn box_type(&self) -> &[BoxType] {
    self.box_type.get_or_init(|| self.find_used_boxes())
  }

  #[tracing::instrument(skip_all, name = "addressing::find_used_boxes")]
  fn find_used_boxes(&self) -> Vec<BoxType> {
    let octree = self.octree;
    let mut types: Vec<BoxType> = (0..octree.number_of_leaves())
      .map(|leaf| {
        let mut t = BoxType::NONE;
        if self.is_mesh_cube(leaf) && octree.owner(leaf) == self.settings.rank {
          t |= BoxType::MESHCELL;
        }
        if octree.cube_type(leaf) == CubeType::Data {
          t |= BoxType::BOUNDARY;
        }
        t
      })
      .collect();

    for leaf in 0..types.len() {
      if types[leaf].contains(BoxType::MESHCELL) && self.has_finer_neighbour(leaf) {
        types[leaf] |= BoxType::SPLITHEX;
      }
    }
    types
  }

  fn has_finer_neighbour(&self, leaf: LeafId) -> bool {
    use crate::octree::coordinates::{EDGE_OFFSETS, FACE_OFFSETS};
    let level = self.octree.leaf_level(leaf);
    FACE_OFFSETS
      .iter()
      .chain(EDGE_OFFSETS.iter())
      .flat_map(|&offset| self.octree.neighbour_leaves(leaf, offset))
      .any(|n| self.octree.leaf_level(n) > level)
  }

  /// OR `flags` into the type of `leaf`. Drops every table that depends on
  /// box types.
  pub fn set_box_type(&mut self, leaf: LeafId, flags: BoxType) {
    self.box_type();
    if let Some(types) = self.box_type.get_mut() {
      types[leaf] |= flags;
    }
    self.clear_derived();
  }

  pub fn number_of_mesh_cells(&self) -> usize {
    self
      .box_type()
      .iter()
      .filter(|t| t.contains(BoxType::MESHCELL))
      .count()
  }

  // ===========================================================================
  // Nodes
  // ===========================================================================

  fn node_tables(&self) -> &NodeTables {
    self.nodes.get_or_init(|| self.create_node_labels())
  }

  /// Node of every corner of each MESHCELL leaf; `None` rows for others.
  pub fn node_labels(&self) -> &[Option<[NodeId; 8]>] {
    &self.node_tables().labels
  }

  pub fn number_of_nodes(&self) -> usize {
    self.node_tables().points.len()
  }

  pub fn octree_points(&self) -> &[DVec3] {
    &self.node_tables().points
  }

  pub fn node_key(&self, node: NodeId) -> NodeKey {
    self.node_tables().keys[node]
  }

  pub fn node_for_key(&self, key: NodeKey) -> Option<NodeId> {
    self.node_tables().key_map.get(&key).copied()
  }

  /// The 8 leaves around each node; slot `7 - c` holds the leaf having
  /// the node as corner `c`.
  pub fn node_leaves(&self) -> &[[Option<LeafId>; 8]] {
    self.node_leaves.get_or_init(|| {
      self
        .node_tables()
        .keys
        .iter()
        .map(|&key| self.octree.leaves_around_point(key))
        .collect()
    })
  }

  pub fn node_type(&self) -> &[BoxType] {
    self.node_type.get_or_init(|| self.calculate_node_type())
  }

  // ===========================================================================
  // Faces
  // ===========================================================================

  fn face_tables(&self) -> &FaceTables {
    self.faces.get_or_init(|| self.create_octree_faces())
  }

  /// Corner nodes of each face, ordered outward from the owner.
  pub fn octree_faces(&self) -> &[[NodeId; 4]] {
    &self.face_tables().nodes
  }

  pub fn number_of_faces(&self) -> usize {
    self.face_tables().nodes.len()
  }

  pub fn octree_face_owner(&self) -> &[LeafId] {
    &self.face_tables().owner
  }

  /// `None` for faces on the domain boundary, against non-mesh cubes or
  /// against other ranks.
  pub fn octree_face_neighbour(&self) -> &[Option<LeafId>] {
    &self.face_tables().neighbour
  }

  /// Direction from the owner to the other side.
  pub fn octree_face_direction(&self) -> &[usize] {
    &self.face_tables().direction
  }

  /// Leaf on the other side of a boundary face; `None` on the domain
  /// boundary. Equal to the neighbour for internal faces.
  pub fn octree_face_far_leaf(&self) -> &[Option<LeafId>] {
    &self.face_tables().far_leaf
  }

  /// Face corner loops with existing edge-midpoint nodes inserted.
  pub fn octree_face_loops(&self) -> &[SmallVec<[NodeId; 8]>] {
    self.face_loops.get_or_init(|| self.create_face_loops())
  }

  pub fn leaf_faces(&self) -> &[SmallVec<[FaceId; 6]>] {
    self.leaf_faces.get_or_init(|| self.calculate_leaf_faces())
  }

  pub fn node_faces(&self) -> &[SmallVec<[FaceId; 12]>] {
    self.node_faces.get_or_init(|| self.calculate_node_faces())
  }

  /// Neighbours of each leaf through internal faces.
  pub fn leaf_leaves(&self) -> &[SmallVec<[LeafId; 6]>] {
    self.leaf_leaves.get_or_init(|| self.calculate_leaf_leaves())
  }

  // ===========================================================================
  // Edges
  // ===========================================================================

  fn edge_tables(&self) -> &EdgeTables {
    self.edges.get_or_init(|| self.create_octree_edges())
  }

  /// Unique segments of the face loops, node ids sorted.
  pub fn octree_edges(&self) -> &[[NodeId; 2]] {
    &self.edge_tables().nodes
  }

  pub fn face_edges(&self) -> &[SmallVec<[EdgeId; 8]>] {
    &self.edge_tables().face_edges
  }

  pub fn edge_faces(&self) -> &[SmallVec<[FaceId; 4]>] {
    self.edge_faces.get_or_init(|| self.calculate_edge_faces())
  }

  pub fn leaf_edges(&self) -> &[SmallVec<[EdgeId; 12]>] {
    self.leaf_edges.get_or_init(|| self.calculate_leaf_edges())
  }

  /// Every leaf touching each edge.
  pub fn edge_leaves(&self) -> &[SmallVec<[LeafId; 4]>] {
    self.edge_leaves.get_or_init(|| self.calculate_edge_leaves())
  }

  pub fn node_edges(&self) -> &[SmallVec<[EdgeId; 6]>] {
    self.node_edges.get_or_init(|| self.calculate_node_edges())
  }

  // ===========================================================================
  // Parallel numbering
  // ===========================================================================

  /// Collective.
  pub fn global_point_labels<C: Communicator>(&self, comm: &C) -> Result<&GlobalNumbering> {
    self.global_points.get_or_try_init(|| self.calc_global_point_labels(comm))
  }

  /// Collective.
  pub fn global_face_labels<C: Communicator>(&self, comm: &C) -> Result<&GlobalNumbering> {
    self.global_faces.get_or_try_init(|| self.calc_global_face_labels(comm))
  }

  /// Collective. Indexed by leaf id.
  pub fn global_leaf_labels<C: Communicator>(&self, comm: &C) -> Result<&GlobalNumbering> {
    self.global_leaves.get_or_try_init(|| self.calc_global_leaf_labels(comm))
  }
}

#[cfg(test)]
#[path = "addressing_test.rs"]
mod addressing_test;
