//! Arena record for one octree cube.

use super::coordinates::CubeCoordinate;

/// Index of a cube record in the octree arena. Stable across mutations.
pub type CubeId = usize;

/// Index into the current leaf list. Renumbered after every mutation.
pub type LeafId = usize;

/// Classification of a cube with respect to the input geometry.
///
/// Replicated on every partition; ownership is tracked separately.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Hash)]
pub enum CubeType {
  /// Not classified yet. Treated as part of the domain.
  #[default]
  Unknown,
  /// Removed from the domain.
  Outside,
  /// Cut by the surface.
  Data,
  /// Inside the domain and not cut by the surface.
  Inside,
}

impl CubeType {
  /// Whether a cube of this type becomes a mesh cell.
  #[inline]
  pub fn is_mesh(self, use_data_boxes: bool) -> bool {
    match self {
      CubeType::Unknown | CubeType::Inside => true,
      CubeType::Data => use_data_boxes,
      CubeType::Outside => false,
    }
  }
}

/// One cube of the octree: a leaf or an internal node with 8 children.
#[derive(Clone, Debug)]
pub struct OctreeCube {
  pub coordinates: CubeCoordinate,
  pub cube_type: CubeType,
  /// Partition owning this cube while it is a leaf.
  pub owner: usize,
  pub parent: Option<CubeId>,
  /// Children are 8 consecutive records starting here.
  pub first_child: Option<CubeId>,
  /// Position in the leaf list, `None` for internal or dead cubes.
  pub leaf: Option<LeafId>,
  /// Cached surface intersection test, `None` until tested.
  pub intersected: Option<bool>,
  pub(crate) alive: bool,
}

impl OctreeCube {
  pub(crate) fn new(coordinates: CubeCoordinate, parent: Option<CubeId>) -> Self {
    Self {
      coordinates,
      cube_type: CubeType::Unknown,
      owner: 0,
      parent,
      first_child: None,
      leaf: None,
      intersected: None,
      alive: true,
    }
  }

  #[inline]
  pub fn is_leaf(&self) -> bool {
    self.alive && self.first_child.is_none()
  }

  #[inline]
  pub fn is_alive(&self) -> bool {
    self.alive
  }

  #[inline]
  pub fn level(&self) -> u32 {
    self.coordinates.level
  }

  /// Arena id of the child in `octant`.
  #[inline]
  pub fn child(&self, octant: usize) -> Option<CubeId> {
    self.first_child.map(|first| first + octant)
  }
}
