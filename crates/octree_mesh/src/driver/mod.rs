//! Refinement driver: takes a background octree to a mesh-ready one.
//!
//! The driver is a state machine. Every stage runs the same collective
//! calls on every partition, so the replicated octree topology and cube
//! types stay identical everywhere while leaf ownership is distributed.
//!
//! # Stages
//!
//! ```text
//! FeatureRefine -> SurfaceRefine -> RemoveOutside -> ShellRefine
//!   -> BaffleSplit -> Zonify -> SplitMergeBaffles
//!   -> [MergePatchFaces] -> FinalBalance -> Done
//! ```
//!
//! The refine stages share one inner loop: mark owned candidates, gather
//! them, close the set under the 2:1 rule, check the cell budget, refine
//! and balance, classify the new leaves.

mod balance;
pub mod budget;
mod candidates;
mod classify;
mod irregular;
mod merge;
pub mod parameters;
mod zones;

pub use budget::{CellBudget, RefinementStats, CELLS_PER_SPLIT};
pub use parameters::{RefinementParameters, MAX_ITER, MAX_IRREGULAR_ITERATIONS, MERGE_NORMAL_COSINE};

use glam::DVec3;
use tracing::{info, warn};
use web_time::Instant;

use crate::addressing::{AddressingSettings, OctreeAddressing};
use crate::error::Result;
use crate::extract::{MeshExtractor, PolyMesh, ZoneMap};
use crate::octree::{LeafId, Octree};
use crate::parallel::{Communicator, Decomposer};
use crate::surface::{FeatureEdges, ShellSet, SurfaceQuery};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RefineStage {
  FeatureRefine,
  SurfaceRefine,
  RemoveOutside,
  ShellRefine,
  BaffleSplit,
  Zonify,
  SplitMergeBaffles,
  MergePatchFaces,
  FinalBalance,
  Done,
}

impl RefineStage {
  /// Stage after `self`. `MergePatchFaces` only runs when enabled.
  pub fn next(self, merge_patch_faces: bool) -> Self {
    match self {
      RefineStage::FeatureRefine => RefineStage::SurfaceRefine,
      RefineStage::SurfaceRefine => RefineStage::RemoveOutside,
      RefineStage::RemoveOutside => RefineStage::ShellRefine,
      RefineStage::ShellRefine => RefineStage::BaffleSplit,
      RefineStage::BaffleSplit => RefineStage::Zonify,
      RefineStage::Zonify => RefineStage::SplitMergeBaffles,
      RefineStage::SplitMergeBaffles if merge_patch_faces => RefineStage::MergePatchFaces,
      RefineStage::SplitMergeBaffles | RefineStage::MergePatchFaces => RefineStage::FinalBalance,
      RefineStage::FinalBalance | RefineStage::Done => RefineStage::Done,
    }
  }

  pub fn name(self) -> &'static str {
    match self {
      RefineStage::FeatureRefine => "feature_refine",
      RefineStage::SurfaceRefine => "surface_refine",
      RefineStage::RemoveOutside => "remove_outside",
      RefineStage::ShellRefine => "shell_refine",
      RefineStage::BaffleSplit => "baffle_split",
      RefineStage::Zonify => "zonify",
      RefineStage::SplitMergeBaffles => "split_merge_baffles",
      RefineStage::MergePatchFaces => "merge_patch_faces",
      RefineStage::FinalBalance => "final_balance",
      RefineStage::Done => "done",
    }
  }
}

/// Geometry the driver refines against.
pub struct MeshGeometry<'g, S: ?Sized> {
  pub surface: &'g S,
  pub features: &'g [FeatureEdges],
  pub shells: &'g ShellSet,
  /// Point inside the domain to keep.
  pub keep_point: DVec3,
  /// Zone name per surface index.
  pub cell_zones: Vec<Option<String>>,
}

/// Outcome of one stage on this partition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StageReport {
  pub stage: RefineStage,
  pub stats: RefinementStats,
  pub timing_us: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefineSummary {
  pub stages: Vec<StageReport>,
  /// Mesh cells over all partitions.
  pub n_cells: usize,
  pub n_leaves: usize,
  pub max_level: u32,
  pub total_us: u64,
}

impl RefineSummary {
  pub fn totals(&self) -> RefinementStats {
    let mut total = RefinementStats::default();
    for report in &self.stages {
      total.accumulate(&report.stats);
    }
    total
  }
}

pub struct RefineDriver<'g, C, D, S: ?Sized> {
  octree: Octree,
  comm: C,
  decomposer: D,
  geometry: MeshGeometry<'g, S>,
  params: RefinementParameters,
  stage: RefineStage,
  /// Outside removal ran; later refinement re-floods from the keep point.
  outside_removed: bool,
  zoned: bool,
  zones: ZoneMap,
  reports: Vec<StageReport>,
}

impl<'g, C, D, S> RefineDriver<'g, C, D, S>
where
  C: Communicator,
  D: Decomposer,
  S: SurfaceQuery + ?Sized,
{
  pub fn new(
    octree: Octree,
    comm: C,
    decomposer: D,
    geometry: MeshGeometry<'g, S>,
    params: RefinementParameters,
  ) -> Self {
    Self {
      octree,
      comm,
      decomposer,
      geometry,
      params,
      stage: RefineStage::FeatureRefine,
      outside_removed: false,
      zoned: false,
      zones: ZoneMap::default(),
      reports: Vec::new(),
    }
  }

  /// Uniform background tree around the surface at `max_cell_size`,
  /// distributed over the partitions and classified. Collective.
  #[tracing::instrument(skip_all, name = "driver::background")]
  pub fn background(comm: C, decomposer: D, geometry: MeshGeometry<'g, S>, params: RefinementParameters) -> Result<Self> {
    let (root_box, level) = Octree::root_box_for(&geometry.surface.bounds(), params.max_cell_size);
    let mut octree = Octree::new(root_box);
    octree.refine_uniformly(level)?;
    octree.distribute_leaves(comm.size());
    info!(level, leaves = octree.number_of_leaves(), "background octree");

    let mut driver = Self::new(octree, comm, decomposer, geometry, params);
    driver.classify_leaves()?;
    Ok(driver)
  }

  // ===========================================================================
  // Accessors
  // ===========================================================================

  pub fn octree(&self) -> &Octree {
    &self.octree
  }

  pub fn comm(&self) -> &C {
    &self.comm
  }

  pub fn stage(&self) -> RefineStage {
    self.stage
  }

  pub fn parameters(&self) -> &RefinementParameters {
    &self.params
  }

  pub fn reports(&self) -> &[StageReport] {
    &self.reports
  }

  /// Zones of the current leaves; empty before zoning.
  pub fn zones(&self) -> &ZoneMap {
    &self.zones
  }

  /// Addressing of this partition's mesh cells.
  pub fn addressing(&self) -> OctreeAddressing<'_> {
    OctreeAddressing::new(
      &self.octree,
      AddressingSettings {
        use_data_boxes: self.params.use_data_boxes,
        rank: self.comm.rank(),
      },
    )
  }

  /// Extract this partition's polyhedral mesh.
  pub fn create_mesh(&self) -> Result<PolyMesh> {
    let addressing = self.addressing();
    MeshExtractor::new(&addressing)
      .decompose_split_hexes(self.params.decompose_split_hexes)
      .with_zones(&self.zones)
      .create_mesh()
  }

  // ===========================================================================
  // State machine
  // ===========================================================================

  /// Run the current stage and advance. Returns the new stage.
  pub fn step(&mut self) -> Result<RefineStage> {
    let stage = self.stage;
    if stage == RefineStage::Done {
      return Ok(stage);
    }

    let start = Instant::now();
    let revision = self.octree.revision();
    let stats = {
      let _span = tracing::info_span!("refine_stage", stage = stage.name()).entered();
      self.run_stage(stage)?
    };
    if self.zoned && self.octree.revision() != revision {
      self.assign_zones();
    }
    let timing_us = start.elapsed().as_micros() as u64;

    info!(
      stage = stage.name(),
      iterations = stats.iterations,
      refined = stats.refined,
      removed = stats.removed,
      leaves = self.octree.number_of_leaves(),
      timing_us,
      "stage finished"
    );
    self.reports.push(StageReport { stage, stats, timing_us });
    self.stage = stage.next(self.params.merge_patch_faces);
    Ok(self.stage)
  }

  /// Run every remaining stage.
  pub fn run(&mut self) -> Result<RefineSummary> {
    let start = Instant::now();
    while self.stage != RefineStage::Done {
      self.step()?;
    }
    let n_cells = self.comm.all_reduce_sum(self.addressing().number_of_mesh_cells())?;
    let total_us = start.elapsed().as_micros() as u64;
    info!(cells = n_cells, leaves = self.octree.number_of_leaves(), total_us, "refinement finished");
    Ok(RefineSummary {
      stages: self.reports.clone(),
      n_cells,
      n_leaves: self.octree.number_of_leaves(),
      max_level: self.octree.max_leaf_level(),
      total_us,
    })
  }

  fn run_stage(&mut self, stage: RefineStage) -> Result<RefinementStats> {
    match stage {
      RefineStage::FeatureRefine | RefineStage::SurfaceRefine | RefineStage::ShellRefine => self.refine_loop(stage),
      RefineStage::RemoveOutside => {
        let removed = self.remove_outside()?;
        self.outside_removed = true;
        Ok(RefinementStats {
          removed,
          ..Default::default()
        })
      }
      RefineStage::BaffleSplit => self.split_at_baffles(),
      RefineStage::Zonify => {
        let zoned = self.assign_zones();
        self.zoned = true;
        info!(cells = zoned, zones = self.zones.names.len(), "assigned cell zones");
        Ok(RefinementStats::default())
      }
      RefineStage::SplitMergeBaffles => self.fix_irregular_connections(),
      RefineStage::MergePatchFaces => self.merge_patch_faces(),
      RefineStage::FinalBalance => {
        let moved = self.balance(|_| 1.0)?;
        Ok(RefinementStats {
          moved,
          ..Default::default()
        })
      }
      RefineStage::Done => Ok(RefinementStats::default()),
    }
  }

  // ===========================================================================
  // Refinement loop
  // ===========================================================================

  #[tracing::instrument(skip_all, name = "driver::refine_loop")]
  fn refine_loop(&mut self, stage: RefineStage) -> Result<RefinementStats> {
    let mut stats = RefinementStats::default();

    for iteration in 0..MAX_ITER {
      let n_global = self.comm.all_reduce_sum(self.n_local_cells())?;
      let local = self.find_candidates(stage, n_global);
      stats.marked += self.comm.all_reduce_sum(local.len())?;

      let mut candidates: Vec<LeafId> = self.comm.all_gather(local)?.into_iter().flatten().collect();
      candidates.sort_unstable();
      candidates.dedup();
      let mut closure = self.octree.consistent_refinement(&candidates, self.params.allow_split_hex);

      info!(
        stage = stage.name(),
        iteration,
        cells = n_global,
        candidates = candidates.len(),
        refine = closure.len(),
        "refinement pass"
      );
      if closure.is_empty()
        || (iteration as u32 >= self.octree.max_leaf_level() && closure.len() <= self.params.min_refine_cells)
      {
        break;
      }

      while !self.params.budget.fits(n_global, closure.len()) && !candidates.is_empty() {
        candidates.truncate(candidates.len() / 2);
        closure = self.octree.consistent_refinement(&candidates, self.params.allow_split_hex);
        stats.truncated = true;
      }
      if stats.truncated {
        warn!(
          cells = n_global,
          refine = closure.len(),
          max_global_cells = self.params.budget.max_global_cells,
          "refinement truncated to the cell budget"
        );
      }
      if closure.is_empty() {
        break;
      }

      let largest = self.comm.all_gather(self.n_local_cells())?.into_iter().max().unwrap_or(0);
      if self.params.budget.local_limit_reached(largest) {
        stats.moved += self.balance_and_refine(&closure)?;
      } else {
        stats.moved += self.refine_and_balance(&closure)?;
      }
      stats.refined += closure.len();
      stats.iterations += 1;

      self.classify_leaves()?;
      if self.outside_removed {
        stats.removed += self.remove_outside()?;
      }
      if stats.truncated {
        break;
      }
    }
    Ok(stats)
  }
}
