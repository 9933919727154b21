//! Feature edge sets: line segments marking sharp geometry.

use std::path::Path;

use glam::DVec3;

use crate::error::{MeshError, Result};
use crate::geometry::BoundBox;

/// Line segments every cell they cross has to be refined to `level`.
#[derive(Clone, Debug)]
pub struct FeatureEdges {
  pub name: String,
  pub level: u32,
  edges: Vec<[DVec3; 2]>,
}

impl FeatureEdges {
  pub fn new(name: impl Into<String>, edges: Vec<[DVec3; 2]>, level: u32) -> Self {
    Self {
      name: name.into(),
      level,
      edges,
    }
  }

  /// Read `v` and `l` records of an OBJ file. Polylines become
  /// consecutive segments.
  pub fn read_obj(path: &Path, level: u32) -> Result<Self> {
    let text = std::fs::read_to_string(path).map_err(|source| MeshError::Io {
      path: path.to_path_buf(),
      source,
    })?;
    let parse_error = |line: usize, message: String| MeshError::Parse {
      path: path.to_path_buf(),
      line,
      message,
    };

    let mut points: Vec<DVec3> = Vec::new();
    let mut edges = Vec::new();
    for (i, line) in text.lines().enumerate() {
      let mut words = line.split_whitespace();
      match words.next() {
        Some("v") => {
          let c: Vec<f64> = words
            .take(3)
            .map(str::parse)
            .collect::<std::result::Result<_, _>>()
            .map_err(|e: std::num::ParseFloatError| parse_error(i + 1, e.to_string()))?;
          if c.len() != 3 {
            return Err(parse_error(i + 1, "vertex needs 3 coordinates".to_string()));
          }
          points.push(DVec3::new(c[0], c[1], c[2]));
        }
        Some("l") => {
          let ids: Vec<usize> = words
            .map(|w| {
              // OBJ indices are 1-based and may carry a texture index.
              let index = w.split('/').next().unwrap_or(w);
              match index.parse::<usize>() {
                Ok(n) if n >= 1 && n <= points.len() => Ok(n - 1),
                _ => Err(parse_error(i + 1, format!("bad vertex index {w}"))),
              }
            })
            .collect::<Result<_>>()?;
          edges.extend(ids.windows(2).map(|w| [points[w[0]], points[w[1]]]));
        }
        _ => {}
      }
    }

    let name = path
      .file_stem()
      .map(|s| s.to_string_lossy().into_owned())
      .unwrap_or_else(|| "features".to_string());
    Ok(Self::new(name, edges, level))
  }

  pub fn edges(&self) -> &[[DVec3; 2]] {
    &self.edges
  }

  /// Whether any segment passes through the box.
  pub fn intersects_box(&self, bb: &BoundBox) -> bool {
    self.edges.iter().any(|&[a, b]| bb.intersects_segment(a, b))
  }
}
