//! Mesh dictionary: the TOML configuration of a meshing run.

use std::path::{Path, PathBuf};

use glam::DVec3;
use serde::Deserialize;

use crate::error::{MeshError, Result};
use crate::geometry::BoundBox;
use crate::octree::MAX_LEVEL;
use crate::surface::{BoxShell, FeatureEdges, ShellMode, ShellSet, SphereShell, TriSurface};

/// Root of the mesh dictionary.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MeshDict {
  /// Edge length of the coarsest (background) cells.
  pub max_cell_size: f64,
  /// Point inside the region to mesh.
  pub keep_point: [f64; 3],
  #[serde(default)]
  pub refinement: RefinementSection,
  #[serde(default)]
  pub surfaces: Vec<SurfaceEntry>,
  #[serde(default)]
  pub features: Vec<FeatureEntry>,
  #[serde(default)]
  pub shells: Vec<ShellEntry>,
}

/// `[refinement]`: budgets and switches of the refinement driver.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RefinementSection {
  #[serde(default = "default_max_global_cells")]
  pub max_global_cells: usize,
  #[serde(default = "default_max_local_cells")]
  pub max_local_cells: usize,
  /// Inner loops stop when fewer cells than this would be refined.
  #[serde(default)]
  pub min_refine_cells: usize,
  #[serde(default = "default_buffer_layers")]
  pub n_buffer_layers: usize,
  /// Normal divergence in degrees that triggers curvature refinement.
  /// Values above 180 switch curvature refinement off.
  #[serde(default = "default_curvature_angle")]
  pub curvature_angle: f64,
  #[serde(default = "default_max_load_unbalance")]
  pub max_load_unbalance: f64,
  #[serde(default = "default_true")]
  pub allow_split_hex: bool,
  #[serde(default)]
  pub merge_patch_faces: bool,
  #[serde(default)]
  pub use_data_boxes: bool,
  #[serde(default = "default_true")]
  pub decompose_split_hexes: bool,
}

impl Default for RefinementSection {
  fn default() -> Self {
    Self {
      max_global_cells: default_max_global_cells(),
      max_local_cells: default_max_local_cells(),
      min_refine_cells: 0,
      n_buffer_layers: default_buffer_layers(),
      curvature_angle: default_curvature_angle(),
      max_load_unbalance: default_max_load_unbalance(),
      allow_split_hex: true,
      merge_patch_faces: false,
      use_data_boxes: false,
      decompose_split_hexes: true,
    }
  }
}

/// `[[surfaces]]`: a closed STL surface and its levels.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SurfaceEntry {
  pub file: PathBuf,
  pub min_level: u32,
  /// Defaults to `min_level` (no curvature refinement).
  pub max_level: Option<u32>,
  /// Cells inside the surface go to this zone.
  pub cell_zone: Option<String>,
}

/// `[[features]]`: an OBJ file of feature lines.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeatureEntry {
  pub file: PathBuf,
  pub level: u32,
}

/// `[[shells]]`
#[derive(Clone, Debug, Deserialize)]
pub struct ShellEntry {
  #[serde(flatten)]
  pub geometry: ShellGeometry,
  #[serde(default)]
  pub mode: ShellModeEntry,
  pub level: u32,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ShellGeometry {
  Box { min: [f64; 3], max: [f64; 3] },
  Sphere { centre: [f64; 3], radius: f64 },
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ShellModeEntry {
  #[default]
  Inside,
  Outside,
}

fn default_max_global_cells() -> usize {
  2_000_000
}

fn default_max_local_cells() -> usize {
  1_000_000
}

fn default_buffer_layers() -> usize {
  1
}

fn default_curvature_angle() -> f64 {
  30.0
}

fn default_max_load_unbalance() -> f64 {
  0.1
}

fn default_true() -> bool {
  true
}

impl MeshDict {
  /// Load and validate a dictionary file. Relative surface and feature
  /// paths are resolved against the file's directory.
  pub fn load(path: &Path) -> Result<Self> {
    let content = std::fs::read_to_string(path).map_err(|source| MeshError::Io {
      path: path.to_path_buf(),
      source,
    })?;
    let mut dict = Self::from_toml_str(&content)?;

    if let Some(dir) = path.parent() {
      for surface in &mut dict.surfaces {
        surface.file = dir.join(&surface.file);
      }
      for feature in &mut dict.features {
        feature.file = dir.join(&feature.file);
      }
    }
    Ok(dict)
  }

  pub fn from_toml_str(content: &str) -> Result<Self> {
    let dict: MeshDict = toml::from_str(content)?;
    dict.validate()?;
    Ok(dict)
  }

  pub fn validate(&self) -> Result<()> {
    if !(self.max_cell_size > 0.0) {
      return Err(MeshError::Config(format!(
        "max_cell_size must be positive, got {}",
        self.max_cell_size
      )));
    }
    let r = &self.refinement;
    if r.max_local_cells == 0 || r.max_global_cells == 0 {
      return Err(MeshError::Config("cell budgets must be positive".to_string()));
    }
    if !(0.0..=1.0).contains(&r.max_load_unbalance) {
      return Err(MeshError::Config(format!(
        "max_load_unbalance must be in [0, 1], got {}",
        r.max_load_unbalance
      )));
    }
    if r.curvature_angle < 0.0 {
      return Err(MeshError::Config(format!(
        "curvature_angle must not be negative, got {}",
        r.curvature_angle
      )));
    }

    let mut levels = self
      .surfaces
      .iter()
      .flat_map(|s| [Some(s.min_level), s.max_level])
      .flatten()
      .chain(self.features.iter().map(|f| f.level))
      .chain(self.shells.iter().map(|s| s.level));
    if let Some(level) = levels.find(|&l| l >= MAX_LEVEL) {
      return Err(MeshError::Config(format!("level {level} exceeds {}", MAX_LEVEL - 1)));
    }
    for surface in &self.surfaces {
      if surface.max_level.is_some_and(|max| max < surface.min_level) {
        return Err(MeshError::Config(format!(
          "{}: max_level below min_level",
          surface.file.display()
        )));
      }
    }
    for shell in &self.shells {
      match shell.geometry {
        ShellGeometry::Box { min, max } if (0..3).any(|i| min[i] > max[i]) => {
          return Err(MeshError::Config("shell box min exceeds max".to_string()));
        }
        ShellGeometry::Sphere { radius, .. } if !(radius > 0.0) => {
          return Err(MeshError::Config(format!("shell sphere radius {radius}")));
        }
        _ => {}
      }
    }
    Ok(())
  }

  pub fn keep_point(&self) -> DVec3 {
    DVec3::from_array(self.keep_point)
  }

  /// Cosine threshold for curvature refinement; values below -1 disable it.
  pub fn curvature_cosine(&self) -> f64 {
    if self.refinement.curvature_angle > 180.0 {
      -2.0
    } else {
      self.refinement.curvature_angle.to_radians().cos()
    }
  }

  /// Read every surface file into one [`TriSurface`].
  pub fn read_surfaces(&self) -> Result<TriSurface> {
    let mut surface = TriSurface::new();
    for entry in &self.surfaces {
      surface.read_stl(&entry.file, entry.min_level, entry.max_level.unwrap_or(entry.min_level))?;
    }
    Ok(surface)
  }

  pub fn read_features(&self) -> Result<Vec<FeatureEdges>> {
    self
      .features
      .iter()
      .map(|entry| FeatureEdges::read_obj(&entry.file, entry.level))
      .collect()
  }

  pub fn build_shells(&self) -> ShellSet {
    let mut shells = ShellSet::new();
    for entry in &self.shells {
      let mode = match entry.mode {
        ShellModeEntry::Inside => ShellMode::Inside,
        ShellModeEntry::Outside => ShellMode::Outside,
      };
      match entry.geometry {
        ShellGeometry::Box { min, max } => shells.push(BoxShell {
          bounds: BoundBox::new(DVec3::from_array(min), DVec3::from_array(max)),
          mode,
          level: entry.level,
        }),
        ShellGeometry::Sphere { centre, radius } => shells.push(SphereShell {
          centre: DVec3::from_array(centre),
          radius,
          mode,
          level: entry.level,
        }),
      }
    }
    shells
  }

  /// Zone name per surface index, in reading order.
  pub fn cell_zones(&self) -> Vec<Option<String>> {
    self.surfaces.iter().map(|s| s.cell_zone.clone()).collect()
  }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;
