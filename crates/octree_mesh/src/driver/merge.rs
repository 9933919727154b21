//! Merging flat blocks of boundary cubes back into their parent.

use tracing::info;

use super::{RefineDriver, RefinementStats, MERGE_NORMAL_COSINE};
use crate::error::Result;
use crate::octree::coordinates::{EDGE_OFFSETS, FACE_OFFSETS};
use crate::octree::{CubeId, CubeType, LeafId};
use crate::parallel::{Communicator, Decomposer};
use crate::surface::SurfaceQuery;

impl<C, D, S> RefineDriver<'_, C, D, S>
where
  C: Communicator,
  D: Decomposer,
  S: SurfaceQuery + ?Sized,
{
  /// Parent of a block of 8 owned boundary leaves that can be merged.
  fn mergeable_parent(&self, leaf: LeafId, min_level: u32) -> Option<CubeId> {
    let octree = &self.octree;
    let cube = octree.leaf(leaf);
    if cube.coordinates.octant_in_parent() != 0 {
      return None;
    }
    let parent = cube.parent?;
    if octree.cube(parent).level() < min_level {
      return None;
    }
    let first = octree.cube(parent).first_child?;

    let mut children = [0; 8];
    for (octant, child) in (first..first + 8).enumerate() {
      let c = octree.cube(child);
      let child_leaf = c.leaf.filter(|_| c.is_leaf())?;
      if octree.cube_type(child_leaf) != CubeType::Data || octree.owner(child_leaf) != self.comm.rank() {
        return None;
      }
      children[octant] = child_leaf;
    }

    let surface = self.geometry.surface;
    let reference = surface.nearest_normal(octree.leaf_centre(children[0]))?;
    for &child in &children[1..] {
      let normal = surface.nearest_normal(octree.leaf_centre(child))?;
      if normal.dot(reference) < MERGE_NORMAL_COSINE {
        return None;
      }
    }

    // The parent must stay within one level of every neighbour.
    let level = cube.level();
    let balanced = children.iter().all(|&child| {
      FACE_OFFSETS
        .iter()
        .chain(EDGE_OFFSETS.iter())
        .flat_map(|&offset| octree.neighbour_leaves(child, offset))
        .all(|nb| octree.leaf_level(nb) <= level)
    });
    balanced.then_some(parent)
  }

  #[tracing::instrument(skip_all, name = "driver::merge_patch_faces")]
  pub(super) fn merge_patch_faces(&mut self) -> Result<RefinementStats> {
    let surface = self.geometry.surface;
    let min_level = (0..surface.n_surfaces()).map(|s| surface.min_level(s)).max().unwrap_or(0);

    let local: Vec<CubeId> = self
      .octree
      .owned_leaves(self.comm.rank())
      .filter_map(|leaf| self.mergeable_parent(leaf, min_level))
      .collect();
    let mut parents: Vec<CubeId> = self.comm.all_gather(local)?.into_iter().flatten().collect();
    parents.sort_unstable();
    parents.dedup();

    for &parent in &parents {
      self.octree.merge_children(parent)?;
    }
    info!(merged = parents.len(), leaves = self.octree.number_of_leaves(), "merged patch faces");
    Ok(RefinementStats {
      merged: parents.len(),
      ..Default::default()
    })
  }
}
