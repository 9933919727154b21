//! Octree - arena-backed hierarchical partition of the root box.
//!
//! Cubes live in a vector and refer to each other by index. Splitting a leaf
//! appends 8 consecutive records; merging marks them dead. The leaf list is
//! rebuilt depth-first in octant order after every mutation batch, which
//! makes leaf ids follow a Morton curve.

use smallvec::SmallVec;
use tracing::debug;

use super::coordinates::{
  CubeCoordinate, NodeKey, CORNER_OFFSETS, EDGE_OFFSETS, FACE_OFFSETS, MAX_LEVEL, NODE_OFFSETS,
};
use super::cube::{CubeId, CubeType, LeafId, OctreeCube};
use crate::error::{MeshError, Result};
use crate::geometry::BoundBox;

/// Result of locating a coordinate in the tree.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Lookup {
  /// Leaf at the coordinate's level or coarser containing it.
  Leaf(LeafId),
  /// The cube at the coordinate exists and is refined further.
  Refined(CubeId),
  /// Coordinate lies outside the root box.
  Outside,
}

/// Face neighbour found by the ancestor walk.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum NeighbourLeaf {
  /// Same-level or coarser leaf.
  Leaf(LeafId),
  /// Same-level cube whose children touch the face.
  Refined(CubeId),
  /// The face lies on the root box boundary.
  Boundary,
}

#[derive(Clone, Debug)]
pub struct Octree {
  root_box: BoundBox,
  cubes: Vec<OctreeCube>,
  leaves: Vec<CubeId>,
  revision: u64,
}

const ROOT: CubeId = 0;

impl Octree {
  /// Tree with a single root leaf covering `root_box`, which must be a cube.
  pub fn new(root_box: BoundBox) -> Self {
    let size = root_box.size();
    debug_assert!(
      (size.x - size.y).abs() <= 1e-9 * size.x && (size.x - size.z).abs() <= 1e-9 * size.x,
      "root box must be a cube"
    );

    let mut root = OctreeCube::new(CubeCoordinate::root(), None);
    root.leaf = Some(0);
    Self {
      root_box,
      cubes: vec![root],
      leaves: vec![ROOT],
      revision: 0,
    }
  }

  /// Smallest cube enclosing `bounds` plus one cell of margin whose side is
  /// `max_cell_size * 2^level`. Returns the box and that level.
  pub fn root_box_for(bounds: &BoundBox, max_cell_size: f64) -> (BoundBox, u32) {
    let extent = bounds.size().max_element() + 2.0 * max_cell_size;
    let mut level = 0;
    while max_cell_size * ((1u64 << level) as f64) < extent && level + 1 < MAX_LEVEL {
      level += 1;
    }
    let half = 0.5 * max_cell_size * (1u64 << level) as f64;
    let root = BoundBox::from_center_half_extents(bounds.center(), glam::DVec3::splat(half));
    (root, level)
  }

  // ===========================================================================
  // Accessors
  // ===========================================================================

  #[inline]
  pub fn root_box(&self) -> &BoundBox {
    &self.root_box
  }

  /// Bumped on every mutation.
  #[inline]
  pub fn revision(&self) -> u64 {
    self.revision
  }

  #[inline]
  pub fn number_of_leaves(&self) -> usize {
    self.leaves.len()
  }

  /// Arena ids of the current leaves, indexed by leaf id.
  #[inline]
  pub fn leaves(&self) -> &[CubeId] {
    &self.leaves
  }

  #[inline]
  pub fn cube(&self, cube: CubeId) -> &OctreeCube {
    &self.cubes[cube]
  }

  #[inline]
  pub fn leaf(&self, leaf: LeafId) -> &OctreeCube {
    &self.cubes[self.leaves[leaf]]
  }

  #[inline]
  pub fn leaf_coordinates(&self, leaf: LeafId) -> CubeCoordinate {
    self.leaf(leaf).coordinates
  }

  #[inline]
  pub fn leaf_level(&self, leaf: LeafId) -> u32 {
    self.leaf(leaf).coordinates.level
  }

  pub fn leaf_box(&self, leaf: LeafId) -> BoundBox {
    self.leaf_coordinates(leaf).bounding_box(&self.root_box)
  }

  pub fn leaf_centre(&self, leaf: LeafId) -> glam::DVec3 {
    self.leaf_coordinates(leaf).centre(&self.root_box)
  }

  #[inline]
  pub fn cube_type(&self, leaf: LeafId) -> CubeType {
    self.leaf(leaf).cube_type
  }

  pub fn set_cube_type(&mut self, leaf: LeafId, cube_type: CubeType) {
    let cube = self.leaves[leaf];
    self.cubes[cube].cube_type = cube_type;
  }

  #[inline]
  pub fn owner(&self, leaf: LeafId) -> usize {
    self.leaf(leaf).owner
  }

  pub fn set_owner(&mut self, leaf: LeafId, owner: usize) {
    let cube = self.leaves[leaf];
    self.cubes[cube].owner = owner;
  }

  #[inline]
  pub fn intersected(&self, leaf: LeafId) -> Option<bool> {
    self.leaf(leaf).intersected
  }

  pub fn set_intersected(&mut self, leaf: LeafId, intersected: bool) {
    let cube = self.leaves[leaf];
    self.cubes[cube].intersected = Some(intersected);
  }

  /// Leaves owned by `rank`.
  pub fn owned_leaves(&self, rank: usize) -> impl Iterator<Item = LeafId> + '_ {
    (0..self.leaves.len()).filter(move |&leaf| self.owner(leaf) == rank)
  }

  pub fn max_leaf_level(&self) -> u32 {
    self
      .leaves
      .iter()
      .map(|&c| self.cubes[c].coordinates.level)
      .max()
      .unwrap_or(0)
  }

  fn check_leaf(&self, leaf: LeafId) -> Result<CubeId> {
    match self.leaves.get(leaf) {
      Some(&cube) if self.cubes[cube].is_leaf() => Ok(cube),
      _ => Err(MeshError::InvalidLeaf {
        leaf,
        n_leaves: self.leaves.len(),
      }),
    }
  }

  // ===========================================================================
  // Mutation
  // ===========================================================================

  /// Split one leaf into 8 children and renumber the leaves.
  pub fn refine_leaf(&mut self, leaf: LeafId) -> Result<()> {
    let cube = self.check_leaf(leaf)?;
    self.split_cube(cube)?;
    self.update_leaves();
    Ok(())
  }

  /// Batch refinement: split every listed leaf (ids of the current leaf
  /// list), then renumber once. Returns the number of leaves split.
  pub fn refine_selected(&mut self, leaves: &[LeafId]) -> Result<usize> {
    let cubes = leaves
      .iter()
      .map(|&leaf| self.check_leaf(leaf))
      .collect::<Result<Vec<_>>>()?;

    let mut n_split = 0;
    for cube in cubes {
      // Duplicates in the batch are split once.
      if self.cubes[cube].is_leaf() {
        self.split_cube(cube)?;
        n_split += 1;
      }
    }
    self.update_leaves();
    debug!(split = n_split, leaves = self.leaves.len(), "refined leaves");
    Ok(n_split)
  }

  /// Split every leaf until all leaves reach `level`.
  pub fn refine_uniformly(&mut self, level: u32) -> Result<()> {
    loop {
      let coarse: Vec<LeafId> = (0..self.leaves.len())
        .filter(|&leaf| self.leaf_level(leaf) < level)
        .collect();
      if coarse.is_empty() {
        return Ok(());
      }
      self.refine_selected(&coarse)?;
    }
  }

  fn split_cube(&mut self, cube: CubeId) -> Result<()> {
    let parent = self.cubes[cube].clone();
    if !parent.coordinates.can_split() {
      return Err(MeshError::LevelLimit(parent.coordinates));
    }

    let first = self.cubes.len();
    for octant in 0..8 {
      let mut child = OctreeCube::new(parent.coordinates.child(octant), Some(cube));
      child.owner = parent.owner;
      // Cubes not cut by the surface keep their side; cut ones need a new test.
      child.cube_type = match parent.cube_type {
        CubeType::Inside | CubeType::Outside => parent.cube_type,
        _ => CubeType::Unknown,
      };
      if parent.intersected == Some(false) {
        child.intersected = Some(false);
      }
      self.cubes.push(child);
    }

    let parent = &mut self.cubes[cube];
    parent.first_child = Some(first);
    parent.leaf = None;
    self.revision += 1;
    Ok(())
  }

  /// Turn a cube whose 8 children are leaves back into a leaf.
  pub fn merge_children(&mut self, cube: CubeId) -> Result<()> {
    let first = match self.cubes.get(cube) {
      Some(c) if c.alive => c.first_child.ok_or(MeshError::InvalidCube(cube))?,
      _ => return Err(MeshError::InvalidCube(cube)),
    };
    if (first..first + 8).any(|child| !self.cubes[child].is_leaf()) {
      return Err(MeshError::InvalidCube(cube));
    }

    let kids = &self.cubes[first..first + 8];
    let owner = kids[0].owner;
    let cube_type = if kids.iter().all(|k| k.cube_type == kids[0].cube_type) {
      kids[0].cube_type
    } else if kids.iter().any(|k| k.cube_type == CubeType::Data) {
      CubeType::Data
    } else {
      CubeType::Unknown
    };
    let intersected = if kids.iter().any(|k| k.intersected == Some(true)) {
      Some(true)
    } else if kids.iter().all(|k| k.intersected == Some(false)) {
      Some(false)
    } else {
      None
    };

    for child in first..first + 8 {
      self.cubes[child].alive = false;
      self.cubes[child].leaf = None;
    }
    let parent = &mut self.cubes[cube];
    parent.first_child = None;
    parent.owner = owner;
    parent.cube_type = cube_type;
    parent.intersected = intersected;
    self.revision += 1;
    self.update_leaves();
    Ok(())
  }

  /// Rebuild the leaf list depth-first in octant order.
  fn update_leaves(&mut self) {
    self.leaves.clear();
    let mut stack: Vec<CubeId> = vec![ROOT];
    while let Some(cube) = stack.pop() {
      match self.cubes[cube].first_child {
        Some(first) => {
          // Reverse push keeps octant 0 on top.
          stack.extend((first..first + 8).rev());
        }
        None => {
          self.cubes[cube].leaf = Some(self.leaves.len());
          self.leaves.push(cube);
        }
      }
    }
  }

  /// Assign contiguous runs of the leaf list to `n_parts` partitions.
  pub fn distribute_leaves(&mut self, n_parts: usize) {
    let n = self.leaves.len();
    let n_parts = n_parts.max(1);
    for leaf in 0..n {
      let owner = leaf * n_parts / n.max(1);
      self.set_owner(leaf, owner);
    }
    self.revision += 1;
  }

  // ===========================================================================
  // Searching
  // ===========================================================================

  /// Locate a coordinate by descending from the root.
  pub fn find_leaf(&self, coordinates: CubeCoordinate) -> Lookup {
    if !coordinates.is_valid() {
      return Lookup::Outside;
    }
    let mut cube = ROOT;
    for level in 1..=coordinates.level {
      let current = &self.cubes[cube];
      match current.first_child {
        None => break,
        Some(first) => cube = first + coordinates.ancestor_at(level).octant_in_parent(),
      }
    }
    let found = &self.cubes[cube];
    match found.leaf {
      Some(leaf) if found.first_child.is_none() => Lookup::Leaf(leaf),
      _ => Lookup::Refined(cube),
    }
  }

  /// Face neighbour of a leaf: walk up to the common ancestor, then down the
  /// mirrored path.
  pub fn find_neighbour_leaf(&self, leaf: LeafId, direction: usize) -> NeighbourLeaf {
    let axis_bit = 1usize << (direction / 2);
    let positive = direction & 1 == 1;

    let mut path: SmallVec<[usize; 32]> = SmallVec::new();
    let mut cube = self.leaves[leaf];
    let sibling = loop {
      let current = &self.cubes[cube];
      let Some(parent) = current.parent else {
        return NeighbourLeaf::Boundary;
      };
      let octant = current.coordinates.octant_in_parent();
      let on_far_side = (octant & axis_bit != 0) == positive;
      if on_far_side {
        path.push(octant);
        cube = parent;
      } else {
        break self.cubes[parent].child(octant ^ axis_bit);
      };
    };

    let Some(mut cube) = sibling else {
      return NeighbourLeaf::Boundary;
    };
    for &octant in path.iter().rev() {
      match self.cubes[cube].child(octant ^ axis_bit) {
        Some(child) => cube = child,
        None => break,
      }
    }

    let found = &self.cubes[cube];
    match found.leaf {
      Some(leaf) if found.first_child.is_none() => NeighbourLeaf::Leaf(leaf),
      _ => NeighbourLeaf::Refined(cube),
    }
  }

  /// Every leaf touching the face of `leaf` in `direction`.
  pub fn find_neighbours_in_direction(&self, leaf: LeafId, direction: usize) -> SmallVec<[LeafId; 4]> {
    let mut out = SmallVec::new();
    match self.find_neighbour_leaf(leaf, direction) {
      NeighbourLeaf::Boundary => {}
      NeighbourLeaf::Leaf(n) => out.push(n),
      NeighbourLeaf::Refined(cube) => self.collect_touching_leaves(cube, FACE_OFFSETS[direction], &mut out),
    }
    out
  }

  /// Leaves adjacent to `leaf` across the face, edge or vertex given by
  /// `offset` (one of the 26 neighbour offsets).
  pub fn neighbour_leaves(&self, leaf: LeafId, offset: (i32, i32, i32)) -> SmallVec<[LeafId; 4]> {
    let mut out = SmallVec::new();
    match self.find_leaf(self.leaf_coordinates(leaf).offset(offset)) {
      Lookup::Outside => {}
      Lookup::Leaf(n) => out.push(n),
      Lookup::Refined(cube) => self.collect_touching_leaves(cube, offset, &mut out),
    }
    out
  }

  /// All leaves adjacent to `leaf` over faces, edges and vertices.
  pub fn all_neighbour_leaves(&self, leaf: LeafId) -> Vec<LeafId> {
    let mut out: Vec<LeafId> = FACE_OFFSETS
      .iter()
      .chain(EDGE_OFFSETS.iter())
      .chain(NODE_OFFSETS.iter())
      .flat_map(|&offset| self.neighbour_leaves(leaf, offset))
      .collect();
    out.sort_unstable();
    out.dedup();
    out
  }

  /// Leaves below `cube` touching a cube that sits at `-offset` from it.
  fn collect_touching_leaves(&self, cube: CubeId, offset: (i32, i32, i32), out: &mut SmallVec<[LeafId; 4]>) {
    let current = &self.cubes[cube];
    let Some(first) = current.first_child else {
      if let Some(leaf) = current.leaf {
        out.push(leaf);
      }
      return;
    };
    let offsets = [offset.0, offset.1, offset.2];
    for octant in 0..8 {
      let touches = (0..3).all(|axis| {
        let bit = (octant >> axis) & 1;
        match offsets[axis] {
          1 => bit == 0,
          -1 => bit == 1,
          _ => true,
        }
      });
      if touches {
        self.collect_touching_leaves(first + octant, offset, out);
      }
    }
  }

  /// The (up to) 8 leaves around a node position. Slot `s` holds the leaf
  /// on the side given by the corner bits of `s`; a leaf having the point as
  /// its corner `c` sits in slot `7 - c`.
  pub fn leaves_around_point(&self, key: NodeKey) -> [Option<LeafId>; 8] {
    let mut around = [None; 8];
    for (slot, &(ox, oy, oz)) in CORNER_OFFSETS.iter().enumerate() {
      let cell = [key[0] - 1 + ox as i64, key[1] - 1 + oy as i64, key[2] - 1 + oz as i64];
      if cell.iter().any(|&c| c < 0 || c >= 1i64 << MAX_LEVEL) {
        continue;
      }
      if let Lookup::Leaf(leaf) = self.find_leaf(CubeCoordinate::containing_key(cell, MAX_LEVEL)) {
        around[slot] = Some(leaf);
      }
    }
    around
  }

  /// Corner index of `leaf` located at `key`, if any.
  pub fn corner_at(&self, leaf: LeafId, key: NodeKey) -> Option<usize> {
    let c = self.leaf_coordinates(leaf);
    (0..8).find(|&corner| c.corner_key(corner) == key)
  }

  /// Leaf containing a world-space point.
  pub fn find_leaf_containing(&self, point: glam::DVec3) -> Option<LeafId> {
    if !self.root_box.contains_point(point) {
      return None;
    }
    let rel = (point - self.root_box.min) / self.root_box.size();
    let n = (1i64 << MAX_LEVEL) as f64;
    let key = [
      ((rel.x * n) as i64).clamp(0, (1i64 << MAX_LEVEL) - 1),
      ((rel.y * n) as i64).clamp(0, (1i64 << MAX_LEVEL) - 1),
      ((rel.z * n) as i64).clamp(0, (1i64 << MAX_LEVEL) - 1),
    ];
    match self.find_leaf(CubeCoordinate::containing_key(key, MAX_LEVEL)) {
      Lookup::Leaf(leaf) => Some(leaf),
      _ => None,
    }
  }

  /// True when no two leaves adjacent over a face or an edge differ by more
  /// than one level.
  pub fn is_balanced(&self) -> bool {
    (0..self.leaves.len()).all(|leaf| {
      let c = self.leaf_coordinates(leaf);
      FACE_OFFSETS.iter().chain(EDGE_OFFSETS.iter()).all(|&offset| {
        match self.find_leaf(c.offset(offset)) {
          Lookup::Leaf(n) => self.leaf_level(n) + 1 >= c.level,
          _ => true,
        }
      })
    })
  }
}

#[cfg(test)]
#[path = "tree_test.rs"]
mod tree_test;
