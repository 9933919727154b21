//! Fixing cells that touch only over an edge or a point.

use tracing::{debug, info, warn};

use super::{RefineDriver, RefinementStats, MAX_IRREGULAR_ITERATIONS};
use crate::error::Result;
use crate::octree::{CubeType, LeafId};
use crate::parallel::{Communicator, Decomposer};
use crate::surface::SurfaceQuery;

impl<C, D, S> RefineDriver<'_, C, D, S>
where
  C: Communicator,
  D: Decomposer,
  S: SurfaceQuery + ?Sized,
{
  /// Irregular leaves found by any partition, sorted.
  fn gather_irregular_leaves(&self) -> Result<Vec<LeafId>> {
    let local = self.addressing().find_irregular_leaves();
    let mut marked: Vec<LeafId> = self.comm.all_gather(local)?.into_iter().flatten().collect();
    marked.sort_unstable();
    marked.dedup();
    Ok(marked)
  }

  /// Refine cut cubes around irregular connections while the budget
  /// allows, otherwise take the offending mesh cubes out of the mesh. Then
  /// report baffles left between two mesh cells.
  #[tracing::instrument(skip_all, name = "driver::fix_irregular_connections")]
  pub(super) fn fix_irregular_connections(&mut self) -> Result<RefinementStats> {
    let mut stats = RefinementStats::default();

    for iteration in 0..MAX_IRREGULAR_ITERATIONS {
      let marked = self.gather_irregular_leaves()?;
      if marked.is_empty() {
        break;
      }
      stats.iterations += 1;
      debug!(iteration, leaves = marked.len(), "irregular connections");

      let last = iteration + 1 == MAX_IRREGULAR_ITERATIONS;
      let refinable: Vec<LeafId> = marked
        .iter()
        .copied()
        .filter(|&leaf| self.octree.cube_type(leaf) == CubeType::Data && self.octree.leaf(leaf).coordinates.can_split())
        .collect();
      if !last && !refinable.is_empty() {
        let n_global = self.comm.all_reduce_sum(self.n_local_cells())?;
        let closure = self.octree.consistent_refinement(&refinable, self.params.allow_split_hex);
        if self.params.budget.fits(n_global, closure.len()) {
          self.octree.refine_selected(&closure)?;
          stats.refined += closure.len();
          self.classify_leaves()?;
          if self.outside_removed {
            stats.removed += self.remove_outside()?;
          }
          continue;
        }
        warn!(refine = closure.len(), "cell budget too small to refine irregular connections");
      }

      stats.removed += self.demote(&marked);
    }

    let remaining = self.gather_irregular_leaves()?;
    if !remaining.is_empty() {
      warn!(leaves = remaining.len(), "irregular connections left after fixing");
    }

    stats.baffles = self.find_baffles().len();
    info!(
      baffles = stats.baffles,
      refined = stats.refined,
      removed = stats.removed,
      "free-standing baffles"
    );
    Ok(stats)
  }

  /// Take mesh cubes out of the mesh: into the boundary layer, or out of
  /// the domain when boundary cubes are mesh cells themselves.
  fn demote(&mut self, leaves: &[LeafId]) -> usize {
    let use_data_boxes = self.params.use_data_boxes;
    let demoted = if use_data_boxes { CubeType::Outside } else { CubeType::Data };
    let mut n_demoted = 0;
    for &leaf in leaves {
      if self.octree.cube_type(leaf).is_mesh(use_data_boxes) {
        self.octree.set_cube_type(leaf, demoted);
        n_demoted += 1;
      }
    }
    n_demoted
  }
}
