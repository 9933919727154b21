//! Refinement criteria: which owned leaves ask to be split.

use glam::DVec3;
use tracing::{debug, info};

use super::{RefineDriver, RefineStage};
use crate::addressing::{AddressingSettings, OctreeAddressing};
use crate::octree::coordinates::FACE_OFFSETS;
use crate::octree::{CubeType, LeafId};
use crate::parallel::{Communicator, Decomposer};
use crate::surface::SurfaceQuery;

/// Leaves marked for refinement on one rank, each at most once.
pub(crate) struct RefineMarks {
  marked: Vec<bool>,
  n_marked: usize,
  n_allowed: usize,
}

impl RefineMarks {
  pub fn new(n_leaves: usize, n_allowed: usize) -> Self {
    Self {
      marked: vec![false; n_leaves],
      n_marked: 0,
      n_allowed,
    }
  }

  /// Mark `leaf` unless the allowance is used up.
  pub fn mark(&mut self, leaf: LeafId) -> bool {
    if self.marked[leaf] {
      return true;
    }
    if self.is_full() {
      return false;
    }
    self.marked[leaf] = true;
    self.n_marked += 1;
    true
  }

  #[inline]
  pub fn is_full(&self) -> bool {
    self.n_marked >= self.n_allowed
  }

  pub fn len(&self) -> usize {
    self.n_marked
  }

  pub fn into_leaves(self) -> Vec<LeafId> {
    self
      .marked
      .iter()
      .enumerate()
      .filter_map(|(leaf, &m)| m.then_some(leaf))
      .collect()
  }
}

/// First crossing seen inside a leaf while looking for curvature.
#[derive(Clone, Copy)]
struct FirstHit {
  normal: DVec3,
}

impl<C, D, S> RefineDriver<'_, C, D, S>
where
  C: Communicator,
  D: Decomposer,
  S: SurfaceQuery + ?Sized,
{
  /// Whether `leaf` is an owned leaf of the domain.
  #[inline]
  pub(super) fn is_local_cell(&self, leaf: LeafId) -> bool {
    self.octree.owner(leaf) == self.comm.rank() && self.octree.cube_type(leaf) != CubeType::Outside
  }

  pub(super) fn n_local_cells(&self) -> usize {
    self
      .octree
      .owned_leaves(self.comm.rank())
      .filter(|&leaf| self.octree.cube_type(leaf) != CubeType::Outside)
      .count()
  }

  /// Owned leaves the criteria of `stage` want refined.
  #[tracing::instrument(skip_all, name = "driver::find_candidates")]
  pub(super) fn find_candidates(&self, stage: RefineStage, n_global: usize) -> Vec<LeafId> {
    let budget = self.params.budget;
    if budget.is_exhausted(n_global) {
      info!("No cells marked for refinement since reached limit");
      return Vec::new();
    }
    let n_allowed = budget.allowed_refinements(n_global, self.comm.size());
    let mut marks = RefineMarks::new(self.octree.number_of_leaves(), n_allowed);

    match stage {
      RefineStage::FeatureRefine => self.mark_feature_leaves(&mut marks),
      RefineStage::SurfaceRefine => self.mark_surface_leaves(&mut marks),
      RefineStage::ShellRefine => self.mark_shell_leaves(&mut marks),
      _ => {}
    }

    debug!(marked = marks.len(), allowed = n_allowed, "refinement candidates");
    marks.into_leaves()
  }

  fn mark_feature_leaves(&self, marks: &mut RefineMarks) {
    if self.geometry.features.is_empty() {
      return;
    }
    for leaf in self.octree.owned_leaves(self.comm.rank()) {
      if self.octree.cube_type(leaf) == CubeType::Outside {
        continue;
      }
      let level = self.octree.leaf_level(leaf);
      let bb = self.octree.leaf_box(leaf);
      let wanted = self
        .geometry
        .features
        .iter()
        .any(|feature| feature.level > level && feature.intersects_box(&bb));
      if wanted && !marks.mark(leaf) {
        return;
      }
    }
  }

  /// Test the segments between the centres of leaves sharing a face.
  /// Boundary faces use the owner centre mirrored across the face.
  fn mark_surface_leaves(&self, marks: &mut RefineMarks) {
    let octree = &self.octree;
    let surface = self.geometry.surface;
    let addr = OctreeAddressing::new(
      octree,
      AddressingSettings {
        use_data_boxes: true,
        rank: self.comm.rank(),
      },
    );
    let curvature = self.params.curvature_enabled() && surface.has_curvature_range();
    let mut first_hits: Vec<Option<FirstHit>> = vec![None; if curvature { octree.number_of_leaves() } else { 0 }];

    let owners = addr.octree_face_owner();
    let others = addr.octree_face_far_leaf();
    let directions = addr.octree_face_direction();
    for face in 0..owners.len() {
      let owner = owners[face];
      let other = others[face];
      let cut = octree.intersected(owner) == Some(true) || other.is_some_and(|n| octree.intersected(n) == Some(true));
      if !cut {
        continue;
      }

      let start = octree.leaf_centre(owner);
      let end = match other {
        Some(n) => octree.leaf_centre(n),
        None => {
          let (dx, dy, dz) = FACE_OFFSETS[directions[face]];
          start + DVec3::new(dx as f64, dy as f64, dz as f64) * octree.leaf_box(owner).size()
        }
      };
      let side_of = |p: DVec3| match other {
        Some(n) if !octree.leaf_box(owner).contains_point(p) => n,
        _ => owner,
      };

      let level = other.map_or(octree.leaf_level(owner), |n| octree.leaf_level(owner).min(octree.leaf_level(n)));
      if let Some(hit) = surface.find_higher_intersection(start, end, level) {
        let side = side_of(hit.point);
        if self.is_local_cell(side) && octree.leaf_level(side) < surface.min_level(hit.surface) && !marks.mark(side) {
          return;
        }
      }

      if !curvature {
        continue;
      }
      for hit in surface.find_all_intersections(start, end) {
        let side = side_of(hit.point);
        if !self.is_local_cell(side) || octree.leaf_level(side) >= surface.max_level(hit.surface) {
          continue;
        }
        match first_hits[side] {
          None => first_hits[side] = Some(FirstHit { normal: hit.normal }),
          Some(first) if first.normal.dot(hit.normal) < self.params.curvature => {
            if !marks.mark(side) {
              return;
            }
          }
          Some(_) => {}
        }
      }
    }
  }

  fn mark_shell_leaves(&self, marks: &mut RefineMarks) {
    let shells = self.geometry.shells;
    if shells.is_empty() {
      return;
    }
    let octree = &self.octree;
    let mut inside: Vec<LeafId> = Vec::new();
    let mut finest = 0;
    for leaf in octree.owned_leaves(self.comm.rank()) {
      if octree.cube_type(leaf) == CubeType::Outside {
        continue;
      }
      if let Some(level) = shells.find_higher_level(octree.leaf_centre(leaf), octree.leaf_level(leaf)) {
        inside.push(leaf);
        finest = finest.max(level);
      }
    }
    if inside.is_empty() {
      return;
    }

    let grown = octree.mark_additional_layers(&inside, self.params.n_buffer_layers);
    for leaf in grown {
      if self.is_local_cell(leaf) && octree.leaf_level(leaf) < finest && !marks.mark(leaf) {
        return;
      }
    }
  }
}
