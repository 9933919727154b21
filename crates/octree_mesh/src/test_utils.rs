//! Test utilities shared by the unit tests.
//!
//! Provides tree fixtures and mock surfaces and shells for exercising the
//! addressing, extraction and refinement stages in isolation.

use glam::DVec3;

use crate::addressing::AddressingSettings;
use crate::geometry::BoundBox;
use crate::octree::{CubeType, LeafId, Octree};
use crate::surface::{RefinementShell, SurfaceHit, SurfaceQuery, TriSurface};

// =============================================================================
// Tree fixtures
// =============================================================================

pub fn unit_box() -> BoundBox {
  BoundBox::new(DVec3::ZERO, DVec3::ONE)
}

/// Unit cube refined uniformly to `level`.
pub fn uniform_tree(level: u32) -> Octree {
  let mut tree = Octree::new(unit_box());
  tree.refine_uniformly(level).expect("uniform refinement");
  tree
}

/// Level-1 tree with octant 0 refined once more: leaves 0..8 are the fine
/// children, leaves 8..15 the coarse octants 1..7.
pub fn tree_with_fine_octant() -> Octree {
  let mut tree = uniform_tree(1);
  tree.refine_leaf(0).expect("octant 0 splits");
  tree
}

/// Set the type of every leaf from a closure.
pub fn set_types(tree: &mut Octree, f: impl Fn(LeafId) -> CubeType) {
  for leaf in 0..tree.number_of_leaves() {
    tree.set_cube_type(leaf, f(leaf));
  }
}

pub fn serial_settings() -> AddressingSettings {
  AddressingSettings {
    use_data_boxes: false,
    rank: 0,
  }
}

// =============================================================================
// Mock surfaces
// =============================================================================

/// Horizontal plane `z = height` spanning well past the unit cube. The
/// diagonal between the two triangles misses every dyadic cell centre.
pub fn plane_surface(height: f64, min_level: u32, max_level: u32) -> TriSurface {
  let c = |x: f64, y: f64| DVec3::new(x, y, height);
  let triangles = vec![
    [c(-1.1, -1.0), c(2.0, -1.0), c(2.0, 2.3)],
    [c(-1.1, -1.0), c(2.0, 2.3), c(-1.1, 2.3)],
  ];
  let mut surface = TriSurface::new();
  surface.add_surface("plane", triangles, min_level, max_level).expect("non-empty");
  surface
}

pub fn sphere_surface(centre: DVec3, radius: f64, min_level: u32, max_level: u32) -> TriSurface {
  let mut surface = TriSurface::new();
  surface
    .add_surface("sphere", TriSurface::sphere(centre, radius, 3), min_level, max_level)
    .expect("non-empty");
  surface
}

/// Surface that is never hit.
pub struct NoSurface;

impl SurfaceQuery for NoSurface {
  fn bounds(&self) -> BoundBox {
    unit_box()
  }

  fn n_surfaces(&self) -> usize {
    0
  }

  fn min_level(&self, _surface: usize) -> u32 {
    0
  }

  fn max_level(&self, _surface: usize) -> u32 {
    0
  }

  fn intersects_box(&self, _bb: &BoundBox) -> bool {
    false
  }

  fn find_all_intersections(&self, _start: DVec3, _end: DVec3) -> Vec<SurfaceHit> {
    Vec::new()
  }

  fn nearest_normal(&self, _p: DVec3) -> Option<DVec3> {
    None
  }

  fn contains(&self, _surface: usize, _p: DVec3) -> bool {
    false
  }
}

// =============================================================================
// Mock shells
// =============================================================================

/// Shell asking for the same level everywhere.
pub struct ConstantShell(pub u32);

impl RefinementShell for ConstantShell {
  fn level_at(&self, _p: DVec3) -> Option<u32> {
    Some(self.0)
  }
}
