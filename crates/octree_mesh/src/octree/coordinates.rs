//! CubeCoordinate - immutable value type representing a cube in the octree.
//!
//! Cubes are identified by their grid coordinates at their own level.
//! Level 0 = the root cube, higher level = finer.

use std::cmp::Ordering;

use glam::DVec3;

use crate::geometry::BoundBox;

/// Deepest level a cube may reach. Node keys are expressed on this grid.
pub const MAX_LEVEL: u32 = 30;

/// Position of an octree node (cube corner) on the finest grid.
pub type NodeKey = [i64; 3];

/// Offsets of the 6 face neighbours, indexed by direction.
pub const FACE_OFFSETS: [(i32, i32, i32); 6] = [
  (-1, 0, 0), // -X
  (1, 0, 0),  // +X
  (0, -1, 0), // -Y
  (0, 1, 0),  // +Y
  (0, 0, -1), // -Z
  (0, 0, 1),  // +Z
];

/// Offsets of the 12 neighbours sharing only an edge.
pub const EDGE_OFFSETS: [(i32, i32, i32); 12] = [
  (-1, -1, 0),
  (1, -1, 0),
  (-1, 1, 0),
  (1, 1, 0),
  (-1, 0, -1),
  (1, 0, -1),
  (-1, 0, 1),
  (1, 0, 1),
  (0, -1, -1),
  (0, 1, -1),
  (0, -1, 1),
  (0, 1, 1),
];

/// Offsets of the 8 neighbours sharing only a vertex, indexed like corners.
pub const NODE_OFFSETS: [(i32, i32, i32); 8] = [
  (-1, -1, -1),
  (1, -1, -1),
  (-1, 1, -1),
  (1, 1, -1),
  (-1, -1, 1),
  (1, -1, 1),
  (-1, 1, 1),
  (1, 1, 1),
];

/// Corner offsets of a hex, bit 0 = X, bit 1 = Y, bit 2 = Z.
pub const CORNER_OFFSETS: [(i32, i32, i32); 8] = [
  (0, 0, 0),
  (1, 0, 0),
  (0, 1, 0),
  (1, 1, 0),
  (0, 0, 1),
  (1, 0, 1),
  (0, 1, 1),
  (1, 1, 1),
];

/// Corners of each face, ordered so the loop normal points outward.
pub const FACE_CORNERS: [[usize; 4]; 6] = [
  [0, 4, 6, 2],
  [1, 3, 7, 5],
  [0, 1, 5, 4],
  [2, 6, 7, 3],
  [0, 2, 3, 1],
  [4, 5, 7, 6],
];

/// Corner pairs of the 12 hex edges: 4 along X, 4 along Y, 4 along Z.
pub const EDGE_CORNERS: [[usize; 2]; 12] = [
  [0, 1],
  [2, 3],
  [4, 5],
  [6, 7],
  [0, 2],
  [1, 3],
  [4, 6],
  [5, 7],
  [0, 4],
  [1, 5],
  [2, 6],
  [3, 7],
];

/// Opposite face direction (-X <-> +X and so on).
#[inline]
pub const fn opposite_direction(direction: usize) -> usize {
  direction ^ 1
}

/// Axis (0 = X, 1 = Y, 2 = Z) of a face direction.
#[inline]
pub const fn direction_axis(direction: usize) -> usize {
  direction / 2
}

/// Octree cube coordinate - immutable value type.
///
/// Grid coordinates are at the cube's own level. Equality and hashing
/// include the level; ordering is only defined between cubes of the same
/// level.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct CubeCoordinate {
  pub x: i32,
  pub y: i32,
  pub z: i32,
  /// Refinement level (0 = root)
  pub level: u32,
}

impl CubeCoordinate {
  pub const fn new(x: i32, y: i32, z: i32, level: u32) -> Self {
    Self { x, y, z, level }
  }

  /// The single cube covering the whole domain.
  pub const fn root() -> Self {
    Self::new(0, 0, 0, 0)
  }

  /// True when the children of this cube stay below [`MAX_LEVEL`].
  #[inline]
  pub const fn can_split(&self) -> bool {
    self.level + 1 < MAX_LEVEL
  }

  /// True when the coordinate lies inside the domain at its level.
  pub fn is_valid(&self) -> bool {
    if self.level > MAX_LEVEL {
      return false;
    }
    let n = 1i64 << self.level;
    [self.x, self.y, self.z]
      .iter()
      .all(|&c| c >= 0 && (c as i64) < n)
  }

  /// Parent cube one level up. Returns None at the root.
  pub fn parent(&self) -> Option<Self> {
    if self.level == 0 {
      return None;
    }
    Some(Self {
      x: self.x >> 1,
      y: self.y >> 1,
      z: self.z >> 1,
      level: self.level - 1,
    })
  }

  /// Child cube one level down.
  ///
  /// Octant: 0-7 where bits represent +X, +Y, +Z offsets:
  /// - bit 0: X offset (0 or 1)
  /// - bit 1: Y offset (0 or 1)
  /// - bit 2: Z offset (0 or 1)
  pub fn child(&self, octant: usize) -> Self {
    debug_assert!(octant < 8, "octant out of range: {octant}");
    let (cx, cy, cz) = CORNER_OFFSETS[octant];
    Self {
      x: self.x * 2 + cx,
      y: self.y * 2 + cy,
      z: self.z * 2 + cz,
      level: self.level + 1,
    }
  }

  /// Octant this cube occupies inside its parent.
  #[inline]
  pub fn octant_in_parent(&self) -> usize {
    ((self.x & 1) | ((self.y & 1) << 1) | ((self.z & 1) << 2)) as usize
  }

  /// Face neighbour at the same level. Not checked against the domain.
  pub fn neighbour(&self, direction: usize) -> Self {
    self.offset(FACE_OFFSETS[direction])
  }

  /// Neighbour sharing only an edge (see [`EDGE_OFFSETS`]).
  pub fn neighbour_over_edge(&self, edge_direction: usize) -> Self {
    self.offset(EDGE_OFFSETS[edge_direction])
  }

  /// Neighbour sharing only a vertex (see [`NODE_OFFSETS`]).
  pub fn neighbour_over_node(&self, node_direction: usize) -> Self {
    self.offset(NODE_OFFSETS[node_direction])
  }

  #[inline]
  pub fn offset(&self, (dx, dy, dz): (i32, i32, i32)) -> Self {
    Self::new(self.x + dx, self.y + dy, self.z + dz, self.level)
  }

  /// Ancestor at a coarser (or equal) level.
  pub fn ancestor_at(&self, level: u32) -> Self {
    debug_assert!(level <= self.level);
    let shift = self.level - level;
    Self::new(self.x >> shift, self.y >> shift, self.z >> shift, level)
  }

  pub fn is_ancestor_of(&self, other: &CubeCoordinate) -> bool {
    self.level < other.level && other.ancestor_at(self.level) == *self
  }

  /// Finest-grid key of a corner of this cube.
  pub fn corner_key(&self, corner: usize) -> NodeKey {
    let (cx, cy, cz) = CORNER_OFFSETS[corner];
    let shift = MAX_LEVEL - self.level;
    [
      ((self.x + cx) as i64) << shift,
      ((self.y + cy) as i64) << shift,
      ((self.z + cz) as i64) << shift,
    ]
  }

  /// Finest-grid key of the cube centre. Defined for levels below
  /// [`MAX_LEVEL`].
  pub fn centre_key(&self) -> NodeKey {
    let shift = MAX_LEVEL - self.level;
    let half = 1i64 << shift.saturating_sub(1);
    [
      ((self.x as i64) << shift) + half,
      ((self.y as i64) << shift) + half,
      ((self.z as i64) << shift) + half,
    ]
  }

  /// Edge length of this cube on the finest grid.
  #[inline]
  pub fn key_size(&self) -> i64 {
    1i64 << (MAX_LEVEL - self.level)
  }

  /// Cube at `level` containing the finest-grid cell whose min corner is
  /// `key`.
  pub fn containing_key(key: NodeKey, level: u32) -> Self {
    let shift = MAX_LEVEL - level;
    Self::new(
      (key[0] >> shift) as i32,
      (key[1] >> shift) as i32,
      (key[2] >> shift) as i32,
      level,
    )
  }

  pub fn cell_size(&self, root: &BoundBox) -> f64 {
    root.size().x / (1u64 << self.level) as f64
  }

  pub fn bounding_box(&self, root: &BoundBox) -> BoundBox {
    let size = self.cell_size(root);
    let min = root.min + DVec3::new(self.x as f64, self.y as f64, self.z as f64) * size;
    BoundBox::new(min, min + DVec3::splat(size))
  }

  pub fn centre(&self, root: &BoundBox) -> DVec3 {
    self.bounding_box(root).center()
  }
}

impl PartialOrd for CubeCoordinate {
  /// Cubes on different levels are not comparable.
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    if self.level != other.level {
      return None;
    }
    Some((self.x, self.y, self.z).cmp(&(other.x, other.y, other.z)))
  }
}

/// World position of a node key inside the root box.
pub fn key_position(key: NodeKey, root: &BoundBox) -> DVec3 {
  let scale = root.size().x / (1u64 << MAX_LEVEL) as f64;
  root.min + DVec3::new(key[0] as f64, key[1] as f64, key[2] as f64) * scale
}

#[cfg(test)]
#[path = "coordinates_test.rs"]
mod coordinates_test;
