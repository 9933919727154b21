//! Load balancing around refinement passes.

use tracing::debug;

use super::{RefineDriver, CELLS_PER_SPLIT};
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
  /// Refine, then rebalance if the partitions drifted too far apart.
  /// Returns the number of leaves moved.
  pub(super) fn refine_and_balance(&mut self, closure: &[LeafId]) -> Result<usize> {
    self.octree.refine_selected(closure)?;
    let unbalance = self.load_unbalance()?;
    if unbalance <= self.params.max_load_unbalance {
      return Ok(0);
    }
    debug!(unbalance, "rebalancing after refinement");
    self.balance(|_| 1.0)
  }

  /// Balance with the refined leaves weighted by their future children,
  /// then refine.
  pub(super) fn balance_and_refine(&mut self, closure: &[LeafId]) -> Result<usize> {
    let mut refined = vec![false; self.octree.number_of_leaves()];
    for &leaf in closure {
      refined[leaf] = true;
    }
    let moved = self.balance(|leaf| if refined[leaf] { (1 + CELLS_PER_SPLIT) as f64 } else { 1.0 })?;
    self.octree.refine_selected(closure)?;
    Ok(moved)
  }

  /// Largest relative deviation of a partition from the mean cell count.
  pub(super) fn load_unbalance(&self) -> Result<f64> {
    let counts = self.comm.all_gather(self.n_local_cells())?;
    let total: usize = counts.iter().sum();
    if total == 0 {
      return Ok(0.0);
    }
    let ideal = total as f64 / counts.len() as f64;
    Ok(counts.iter().map(|&n| (1.0 - n as f64 / ideal).abs()).fold(0.0, f64::max))
  }

  /// Redistribute owned leaves by `weight`; removed leaves weigh nothing.
  /// Returns the number of leaves moved over all partitions.
  pub(super) fn balance(&mut self, weight: impl Fn(LeafId) -> f64) -> Result<usize> {
    if !self.comm.is_parallel() {
      return Ok(0);
    }
    let leaves: Vec<LeafId> = self.octree.owned_leaves(self.comm.rank()).collect();
    let centres: Vec<_> = leaves.iter().map(|&leaf| self.octree.leaf_centre(leaf)).collect();
    let weights: Vec<f64> = leaves
      .iter()
      .map(|&leaf| match self.octree.cube_type(leaf) {
        CubeType::Outside => 0.0,
        _ => weight(leaf),
      })
      .collect();

    let assignment = self.decomposer.decompose(&self.comm, &centres, &weights)?;
    let map = self.octree.redistribute(&self.comm, &leaves, &assignment)?;
    Ok(map.total_moved())
  }
}
