//! Decomposition oracle: weighted assignment of cells to partitions.

use glam::DVec3;
use tracing::debug;

use super::Communicator;
use crate::error::Result;
use crate::geometry::BoundBox;

/// Assigns every local cell to a partition. Collective.
pub trait Decomposer {
  /// `centres` and `weights` describe this rank's cells; the result holds
  /// the new rank of each of them.
  fn decompose<C: Communicator>(&self, comm: &C, centres: &[DVec3], weights: &[f64]) -> Result<Vec<usize>>;
}

/// Cuts the Morton curve through all cell centres into equal-weight runs.
#[derive(Clone, Copy, Debug, Default)]
pub struct MortonDecomposer;

/// Bits per axis of the Morton code.
const MORTON_BITS: u32 = 21;

/// Spread the low 21 bits of `v` so that they occupy every third bit.
fn spread_bits(v: u64) -> u64 {
  let mut x = v & 0x1f_ffff;
  x = (x | (x << 32)) & 0x001f_0000_0000_ffff;
  x = (x | (x << 16)) & 0x001f_0000_ff00_00ff;
  x = (x | (x << 8)) & 0x100f_00f0_0f00_f00f;
  x = (x | (x << 4)) & 0x10c3_0c30_c30c_30c3;
  x = (x | (x << 2)) & 0x1249_2492_4924_9249;
  x
}

/// Morton code of a point inside `bounds`.
pub fn morton_code(p: DVec3, bounds: &BoundBox) -> u64 {
  let size = bounds.size().max(DVec3::splat(f64::MIN_POSITIVE));
  let rel = ((p - bounds.min) / size).clamp(DVec3::ZERO, DVec3::ONE);
  let scale = ((1u64 << MORTON_BITS) - 1) as f64;
  let q = |v: f64| (v * scale) as u64;
  spread_bits(q(rel.x)) | (spread_bits(q(rel.y)) << 1) | (spread_bits(q(rel.z)) << 2)
}

impl Decomposer for MortonDecomposer {
  fn decompose<C: Communicator>(&self, comm: &C, centres: &[DVec3], weights: &[f64]) -> Result<Vec<usize>> {
    let n_parts = comm.size();
    if n_parts == 1 {
      return Ok(vec![0; centres.len()]);
    }

    let local = BoundBox::from_points(centres.iter().copied());
    let bounds = comm
      .all_gather(local)?
      .into_iter()
      .flatten()
      .reduce(|a, b| a.union(&b))
      .unwrap_or(BoundBox::new(DVec3::ZERO, DVec3::ONE));

    let mine: Vec<(u64, usize, usize, f64)> = centres
      .iter()
      .zip(weights)
      .enumerate()
      .map(|(i, (&c, &w))| (morton_code(c, &bounds), comm.rank(), i, w))
      .collect();
    let mut all: Vec<(u64, usize, usize, f64)> = comm.all_gather(mine)?.into_iter().flatten().collect();
    all.sort_by(|a, b| (a.0, a.1, a.2).cmp(&(b.0, b.1, b.2)));

    let total: f64 = all.iter().map(|e| e.3).sum();
    let mut assignment = vec![0; centres.len()];
    let mut before = 0.0;
    for (_, rank, index, weight) in all {
      // Cell goes to the part holding the midpoint of its weight.
      let mid = before + 0.5 * weight;
      let part = ((mid / total.max(f64::MIN_POSITIVE)) * n_parts as f64) as usize;
      if rank == comm.rank() {
        assignment[index] = part.min(n_parts - 1);
      }
      before += weight;
    }

    debug!(cells = centres.len(), total_weight = total, "morton decomposition");
    Ok(assignment)
  }
}
