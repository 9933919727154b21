//! Geometry oracles consumed by refinement.
//!
//! - [`SurfaceQuery`]: the surface-intersection oracle, implemented by
//!   [`TriSurface`]
//! - [`FeatureEdges`]: sharp edges to resolve with targeted refinement
//! - [`RefinementShell`]: point-in-volume test with a target level

mod features;
mod shells;
mod trisurface;

pub use features::FeatureEdges;
pub use shells::{BoxShell, RefinementShell, ShellMode, ShellSet, SphereShell};
pub use trisurface::TriSurface;

use glam::DVec3;

use crate::geometry::BoundBox;

/// One crossing of a segment with a surface.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SurfaceHit {
  /// Index of the surface that was hit.
  pub surface: usize,
  pub point: DVec3,
  /// Unit normal of the hit triangle.
  pub normal: DVec3,
  /// Position along the segment, 0 at the start.
  pub t: f64,
}

/// Closed triangulated surfaces with per-surface refinement levels.
pub trait SurfaceQuery: Send + Sync {
  /// Bounding box of all surfaces.
  fn bounds(&self) -> BoundBox;

  fn n_surfaces(&self) -> usize;

  /// Level every cell cut by `surface` has to reach.
  fn min_level(&self, surface: usize) -> u32;

  /// Level cells cut by `surface` may reach through curvature refinement.
  fn max_level(&self, surface: usize) -> u32;

  /// Whether any triangle touches the box.
  fn intersects_box(&self, bb: &BoundBox) -> bool;

  /// All crossings of the segment, ordered by `t`.
  fn find_all_intersections(&self, start: DVec3, end: DVec3) -> Vec<SurfaceHit>;

  /// Normal of the triangle closest to `p`.
  fn nearest_normal(&self, p: DVec3) -> Option<DVec3>;

  /// Whether `p` lies inside the closed `surface`.
  fn contains(&self, surface: usize, p: DVec3) -> bool;

  /// Nearest crossing whose surface asks for a level above `current_level`.
  fn find_higher_intersection(&self, start: DVec3, end: DVec3, current_level: u32) -> Option<SurfaceHit> {
    self
      .find_all_intersections(start, end)
      .into_iter()
      .find(|hit| self.min_level(hit.surface) > current_level)
  }

  /// Whether curvature refinement can change anything.
  fn has_curvature_range(&self) -> bool {
    (0..self.n_surfaces()).any(|s| self.min_level(s) != self.max_level(s))
  }
}

impl<S: SurfaceQuery + ?Sized> SurfaceQuery for Box<S> {
  fn bounds(&self) -> BoundBox {
    (**self).bounds()
  }

  fn n_surfaces(&self) -> usize {
    (**self).n_surfaces()
  }

  fn min_level(&self, surface: usize) -> u32 {
    (**self).min_level(surface)
  }

  fn max_level(&self, surface: usize) -> u32 {
    (**self).max_level(surface)
  }

  fn intersects_box(&self, bb: &BoundBox) -> bool {
    (**self).intersects_box(bb)
  }

  fn find_all_intersections(&self, start: DVec3, end: DVec3) -> Vec<SurfaceHit> {
    (**self).find_all_intersections(start, end)
  }

  fn nearest_normal(&self, p: DVec3) -> Option<DVec3> {
    (**self).nearest_normal(p)
  }

  fn contains(&self, surface: usize, p: DVec3) -> bool {
    (**self).contains(surface, p)
  }
}
