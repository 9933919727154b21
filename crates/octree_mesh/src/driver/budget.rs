//! Cell-count limits for the refinement loops.
//!
//! Refining one leaf adds 7 cells. The global budget caps the total cell
//! count over all partitions; the local budget decides whether load is
//! balanced before or after a refinement pass.

use crate::config::RefinementSection;

/// New cells created by splitting one leaf.
pub const CELLS_PER_SPLIT: usize = 7;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CellBudget {
	/// Maximum number of cells over all partitions.
	pub max_global_cells: usize,
	/// Partition size above which load is balanced before refining.
	pub max_local_cells: usize,
}

impl CellBudget {
	pub const UNLIMITED: Self = Self {
		max_global_cells: usize::MAX,
		max_local_cells: usize::MAX,
	};

	pub fn from_section(section: &RefinementSection) -> Self {
		Self {
			max_global_cells: section.max_global_cells,
			max_local_cells: section.max_local_cells,
		}
	}

	#[inline]
	pub fn is_exhausted(&self, n_global: usize) -> bool {
		n_global >= self.max_global_cells
	}

	/// Leaves one partition may mark: its share of the remaining budget.
	#[inline]
	pub fn allowed_refinements(&self, n_global: usize, n_parts: usize) -> usize {
		self.max_global_cells.saturating_sub(n_global) / CELLS_PER_SPLIT / n_parts.max(1)
	}

	/// Whether splitting `n_refine` leaves stays within the global limit.
	#[inline]
	pub fn fits(&self, n_global: usize, n_refine: usize) -> bool {
		n_refine
			.checked_mul(CELLS_PER_SPLIT)
			.and_then(|added| added.checked_add(n_global))
			.is_some_and(|total| total <= self.max_global_cells)
	}

	#[inline]
	pub fn local_limit_reached(&self, largest_partition: usize) -> bool {
		largest_partition >= self.max_local_cells
	}
}

impl Default for CellBudget {
	fn default() -> Self {
		Self::from_section(&RefinementSection::default())
	}
}

/// Counters of one driver stage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RefinementStats {
	/// Inner loop passes.
	pub iterations: usize,
	/// Leaves marked by the refinement criteria.
	pub marked: usize,
	/// Leaves split, consistent refinement included.
	pub refined: usize,
	/// Leaves taken out of the mesh.
	pub removed: usize,
	/// Leaves moved between partitions.
	pub moved: usize,
	/// Sibling blocks merged back into their parent.
	pub merged: usize,
	/// Faces crossed by the surface between two mesh cubes.
	pub baffles: usize,
	/// The candidate set was cut to fit the cell budget.
	pub truncated: bool,
}

impl RefinementStats {
	#[inline]
	pub fn new_cells(&self) -> usize {
		self.refined * CELLS_PER_SPLIT
	}

	pub fn accumulate(&mut self, other: &RefinementStats) {
		self.iterations += other.iterations;
		self.marked += other.marked;
		self.refined += other.refined;
		self.removed += other.removed;
		self.moved += other.moved;
		self.merged += other.merged;
		self.baffles += other.baffles;
		self.truncated |= other.truncated;
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_default_budget() {
		let budget = CellBudget::default();
		assert_eq!(budget.max_global_cells, 2_000_000);
		assert_eq!(budget.max_local_cells, 1_000_000);
	}

	#[test]
	fn test_allowed_refinements() {
		let budget = CellBudget {
			max_global_cells: 120,
			max_local_cells: 100,
		};
		assert_eq!(budget.allowed_refinements(64, 1), 8);
		assert_eq!(budget.allowed_refinements(64, 2), 4);
		assert_eq!(budget.allowed_refinements(200, 1), 0);
		assert!(budget.is_exhausted(120));
	}

	#[test]
	fn test_fits() {
		let budget = CellBudget {
			max_global_cells: 120,
			max_local_cells: 100,
		};
		assert!(budget.fits(64, 8));
		assert!(!budget.fits(64, 9));
		assert!(CellBudget::UNLIMITED.fits(usize::MAX - 1, 0));
		assert!(!CellBudget::UNLIMITED.fits(usize::MAX, 1));
	}

	#[test]
	fn test_stats_accumulate() {
		let mut total = RefinementStats::default();
		total.accumulate(&RefinementStats {
			iterations: 2,
			refined: 3,
			..Default::default()
		});
		total.accumulate(&RefinementStats {
			iterations: 1,
			truncated: true,
			..Default::default()
		});
		assert_eq!(total.iterations, 3);
		assert_eq!(total.new_cells(), 21);
		assert!(total.truncated);
	}
}
