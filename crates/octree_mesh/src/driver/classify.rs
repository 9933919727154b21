//! Cube classification: surface intersection, the keep-point flood fill
//! and baffles.

use std::collections::{HashSet, VecDeque};

use tracing::{debug, info, warn};

use super::{RefineDriver, RefinementStats};
use crate::error::{MeshError, Result};
use crate::octree::{CubeType, LeafId};
use crate::parallel::{Communicator, Decomposer};
use crate::surface::SurfaceQuery;

impl<C, D, S> RefineDriver<'_, C, D, S>
where
  C: Communicator,
  D: Decomposer,
  S: SurfaceQuery + ?Sized,
{
  /// Test owned leaves of unknown intersection against the surface and
  /// share the answers. Cut leaves become `Data`. Returns the number of
  /// newly cut leaves over all partitions.
  #[tracing::instrument(skip_all, name = "driver::classify_leaves")]
  pub(super) fn classify_leaves(&mut self) -> Result<usize> {
    let surface = self.geometry.surface;
    let local: Vec<(LeafId, bool)> = self
      .octree
      .owned_leaves(self.comm.rank())
      .filter(|&leaf| self.octree.intersected(leaf).is_none() && self.octree.cube_type(leaf) != CubeType::Outside)
      .map(|leaf| (leaf, surface.intersects_box(&self.octree.leaf_box(leaf))))
      .collect();

    let mut n_cut = 0;
    for (leaf, cut) in self.comm.all_gather(local)?.into_iter().flatten() {
      self.octree.set_intersected(leaf, cut);
      if cut {
        self.octree.set_cube_type(leaf, CubeType::Data);
        n_cut += 1;
      }
    }
    debug!(cut = n_cut, "classified leaves");
    Ok(n_cut)
  }

  /// Leaf holding the keep point.
  pub(super) fn keep_leaf(&self) -> Result<LeafId> {
    let point = self.geometry.keep_point;
    let error = |reason| MeshError::KeepPoint {
      point: point.to_array(),
      reason,
    };
    let leaf = self
      .octree
      .find_leaf_containing(point)
      .ok_or_else(|| error("lies outside the octree"))?;
    match self.octree.cube_type(leaf) {
      CubeType::Data => Err(error("lies in a cube cut by the surface")),
      CubeType::Outside => Err(error("lies in a removed cube")),
      _ => Ok(leaf),
    }
  }

  /// Flood fill from the keep point through uncut cubes. Reached cubes
  /// become `Inside`, cut cubes within `n_buffer_layers` face hops of them
  /// stay `Data`, everything else becomes `Outside`. Runs on the
  /// replicated types, so every partition gets the same answer without
  /// communication. Returns the number of newly removed leaves.
  #[tracing::instrument(skip_all, name = "driver::remove_outside")]
  pub(super) fn remove_outside(&mut self) -> Result<usize> {
    let keep = match self.keep_leaf() {
      Ok(leaf) => leaf,
      Err(e) => {
        warn!("{}", e);
        return Err(e);
      }
    };
    let octree = &self.octree;
    let n_leaves = octree.number_of_leaves();
    let open = |leaf: LeafId| !matches!(octree.cube_type(leaf), CubeType::Data | CubeType::Outside);

    let mut reached = vec![false; n_leaves];
    reached[keep] = true;
    let mut queue = VecDeque::from([keep]);
    while let Some(leaf) = queue.pop_front() {
      for direction in 0..6 {
        for nb in octree.find_neighbours_in_direction(leaf, direction) {
          if !reached[nb] && open(nb) {
            reached[nb] = true;
            queue.push_back(nb);
          }
        }
      }
    }

    // Hops into the cut layer; at least one so the boundary survives.
    let mut kept_data = vec![false; n_leaves];
    let mut front: Vec<LeafId> = (0..n_leaves).filter(|&leaf| reached[leaf]).collect();
    for _ in 0..self.params.n_buffer_layers.max(1) {
      let mut next = Vec::new();
      for &leaf in &front {
        for direction in 0..6 {
          for nb in octree.find_neighbours_in_direction(leaf, direction) {
            if !kept_data[nb] && octree.cube_type(nb) == CubeType::Data {
              kept_data[nb] = true;
              next.push(nb);
            }
          }
        }
      }
      if next.is_empty() {
        break;
      }
      front = next;
    }

    let mut removed = 0;
    for leaf in 0..n_leaves {
      let cube_type = self.octree.cube_type(leaf);
      let new_type = if reached[leaf] {
        CubeType::Inside
      } else if kept_data[leaf] {
        CubeType::Data
      } else {
        CubeType::Outside
      };
      if new_type != cube_type {
        if new_type == CubeType::Outside {
          removed += 1;
        }
        self.octree.set_cube_type(leaf, new_type);
      }
    }
    info!(
      inside = reached.iter().filter(|&&r| r).count(),
      boundary = kept_data.iter().filter(|&&k| k).count(),
      removed,
      "removed cubes outside the domain"
    );
    Ok(removed)
  }

  // ===========================================================================
  // Baffles
  // ===========================================================================

  /// Face-adjacent pairs of mesh cubes whose centre segment crosses the
  /// surface. Each pair is listed once, from its finer side or from the
  /// lower leaf at equal levels.
  pub(super) fn find_baffles(&self) -> Vec<(LeafId, LeafId)> {
    let octree = &self.octree;
    let is_mesh = |leaf: LeafId| octree.cube_type(leaf).is_mesh(self.params.use_data_boxes);
    let mut baffles = Vec::new();
    for leaf in (0..octree.number_of_leaves()).filter(|&leaf| is_mesh(leaf)) {
      let level = octree.leaf_level(leaf);
      for direction in 0..6 {
        for nb in octree.find_neighbours_in_direction(leaf, direction) {
          let nb_level = octree.leaf_level(nb);
          if !is_mesh(nb) || nb_level > level || (nb_level == level && nb < leaf) {
            continue;
          }
          let hits = self
            .geometry
            .surface
            .find_all_intersections(octree.leaf_centre(leaf), octree.leaf_centre(nb));
          if !hits.is_empty() {
            baffles.push((leaf, nb));
          }
        }
      }
    }
    baffles
  }

  /// Remove mesh cubes that cannot be reached from the keep point
  /// without crossing a baffle.
  #[tracing::instrument(skip_all, name = "driver::split_at_baffles")]
  pub(super) fn split_at_baffles(&mut self) -> Result<RefinementStats> {
    let baffles = self.find_baffles();
    let keep = self.keep_leaf()?;
    let blocked: HashSet<(LeafId, LeafId)> = baffles.iter().map(|&(a, b)| (a.min(b), a.max(b))).collect();

    let octree = &self.octree;
    let is_mesh = |leaf: LeafId| octree.cube_type(leaf).is_mesh(self.params.use_data_boxes);
    let mut reached = vec![false; octree.number_of_leaves()];
    reached[keep] = true;
    let mut queue = VecDeque::from([keep]);
    while let Some(leaf) = queue.pop_front() {
      for direction in 0..6 {
        for nb in octree.find_neighbours_in_direction(leaf, direction) {
          if !reached[nb] && is_mesh(nb) && !blocked.contains(&(leaf.min(nb), leaf.max(nb))) {
            reached[nb] = true;
            queue.push_back(nb);
          }
        }
      }
    }

    let unreached: Vec<LeafId> = (0..self.octree.number_of_leaves())
      .filter(|&leaf| is_mesh(leaf) && !reached[leaf])
      .collect();
    for &leaf in &unreached {
      self.octree.set_cube_type(leaf, CubeType::Outside);
    }
    info!(baffles = baffles.len(), removed = unreached.len(), "split at baffles");
    Ok(RefinementStats {
      removed: unreached.len(),
      baffles: baffles.len(),
      ..Default::default()
    })
  }
}
