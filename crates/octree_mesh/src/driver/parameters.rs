use crate::config::{MeshDict, RefinementSection};

use super::budget::CellBudget;

/// Upper bound on passes of one refinement loop.
pub const MAX_ITER: usize = 100;

/// Upper bound on passes of the irregular-connection fix.
pub const MAX_IRREGULAR_ITERATIONS: usize = 5;

/// Largest angle between surface normals of a mergeable block.
pub const MERGE_NORMAL_COSINE: f64 = std::f64::consts::FRAC_1_SQRT_2;

/// Settings of a refinement run.
#[derive(Clone, Debug, PartialEq)]
pub struct RefinementParameters {
  pub max_cell_size: f64,
  pub budget: CellBudget,
  /// Below this many leaves to split a loop may stop early.
  pub min_refine_cells: usize,
  pub n_buffer_layers: usize,
  /// Cosine of the curvature angle; outside `[-1, 1]` curvature is off.
  pub curvature: f64,
  pub max_load_unbalance: f64,
  pub allow_split_hex: bool,
  pub merge_patch_faces: bool,
  pub use_data_boxes: bool,
  pub decompose_split_hexes: bool,
}

impl RefinementParameters {
  pub fn from_dict(dict: &MeshDict) -> Self {
    let section = &dict.refinement;
    Self {
      max_cell_size: dict.max_cell_size,
      curvature: dict.curvature_cosine(),
      ..Self::from_section(section)
    }
  }

  fn from_section(section: &RefinementSection) -> Self {
    Self {
      max_cell_size: 1.0,
      budget: CellBudget::from_section(section),
      min_refine_cells: section.min_refine_cells,
      n_buffer_layers: section.n_buffer_layers,
      curvature: section.curvature_angle.to_radians().cos(),
      max_load_unbalance: section.max_load_unbalance,
      allow_split_hex: section.allow_split_hex,
      merge_patch_faces: section.merge_patch_faces,
      use_data_boxes: section.use_data_boxes,
      decompose_split_hexes: section.decompose_split_hexes,
    }
  }

  #[inline]
  pub fn curvature_enabled(&self) -> bool {
    (-1.0..=1.0).contains(&self.curvature)
  }
}

impl Default for RefinementParameters {
  fn default() -> Self {
    Self::from_section(&RefinementSection::default())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_from_dict() {
    let dict = MeshDict::from_toml_str(
      r#"
        max_cell_size = 0.5
        keep_point = [0.1, 0.1, 0.1]

        [refinement]
        curvature_angle = 200.0
        max_global_cells = 1000
      "#,
    )
    .expect("valid dictionary");
    let params = RefinementParameters::from_dict(&dict);
    assert_eq!(params.max_cell_size, 0.5);
    assert_eq!(params.budget.max_global_cells, 1000);
    assert!(!params.curvature_enabled());
  }

  #[test]
  fn test_default_curvature() {
    let params = RefinementParameters::default();
    assert!(params.curvature_enabled());
    assert!((params.curvature - 30f64.to_radians().cos()).abs() < 1e-12);
    assert_eq!(params.n_buffer_layers, 1);
  }
}
