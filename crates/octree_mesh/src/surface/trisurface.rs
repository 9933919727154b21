//! Triangulated surfaces read from STL files or built in code.

use std::path::Path;

use glam::DVec3;
use tracing::debug;

use super::{SurfaceHit, SurfaceQuery};
use crate::error::{MeshError, Result};
use crate::geometry::{closest_point_on_triangle, segment_triangle_intersection, triangle_normal, BoundBox};

#[derive(Clone, Debug)]
struct SurfaceInfo {
  name: String,
  min_level: u32,
  max_level: u32,
  bounds: BoundBox,
}

/// A set of closed triangulated surfaces.
#[derive(Clone, Debug, Default)]
pub struct TriSurface {
  triangles: Vec<[DVec3; 3]>,
  /// Per-triangle bounding box for cheap rejection.
  triangle_bounds: Vec<BoundBox>,
  surface_of: Vec<usize>,
  surfaces: Vec<SurfaceInfo>,
}

/// Ray direction for inside tests; skewed to avoid hitting edges head-on.
const INSIDE_RAY: DVec3 = DVec3::new(1.0, 0.000_123_7, 0.000_451_9);

impl TriSurface {
  pub fn new() -> Self {
    Self::default()
  }

  /// Add a surface and return its index.
  pub fn add_surface(
    &mut self,
    name: impl Into<String>,
    triangles: Vec<[DVec3; 3]>,
    min_level: u32,
    max_level: u32,
  ) -> Result<usize> {
    let name = name.into();
    let bounds = BoundBox::from_points(triangles.iter().flatten().copied())
      .ok_or_else(|| MeshError::EmptySurface(name.clone()))?;

    let index = self.surfaces.len();
    for tri in triangles {
      self.triangle_bounds.push(BoundBox::from_points(tri).unwrap_or(bounds));
      self.triangles.push(tri);
      self.surface_of.push(index);
    }
    debug!(surface = %name, triangles = self.surface_of.iter().filter(|&&s| s == index).count(), "added surface");
    self.surfaces.push(SurfaceInfo {
      name,
      min_level,
      max_level: max_level.max(min_level),
      bounds,
    });
    Ok(index)
  }

  /// Read an STL file (ASCII or binary) as one surface.
  pub fn read_stl(&mut self, path: &Path, min_level: u32, max_level: u32) -> Result<usize> {
    let bytes = std::fs::read(path).map_err(|source| MeshError::Io {
      path: path.to_path_buf(),
      source,
    })?;
    let name = path
      .file_stem()
      .map(|s| s.to_string_lossy().into_owned())
      .unwrap_or_else(|| "surface".to_string());

    let triangles = if is_ascii_stl(&bytes) {
      parse_ascii_stl(path, &String::from_utf8_lossy(&bytes))?
    } else {
      parse_binary_stl(path, &bytes)?
    };
    self.add_surface(name, triangles, min_level, max_level)
  }

  /// Axis-aligned box surface with outward normals.
  pub fn cuboid(bounds: &BoundBox) -> Vec<[DVec3; 3]> {
    let c = |i: usize| {
      DVec3::new(
        if i & 1 == 0 { bounds.min.x } else { bounds.max.x },
        if i & 2 == 0 { bounds.min.y } else { bounds.max.y },
        if i & 4 == 0 { bounds.min.z } else { bounds.max.z },
      )
    };
    crate::octree::coordinates::FACE_CORNERS
      .iter()
      .flat_map(|f| [[c(f[0]), c(f[1]), c(f[2])], [c(f[0]), c(f[2]), c(f[3])]])
      .collect()
  }

  /// Sphere approximated by a subdivided octahedron.
  pub fn sphere(centre: DVec3, radius: f64, subdivisions: u32) -> Vec<[DVec3; 3]> {
    let axes = [DVec3::X, DVec3::Y, DVec3::Z];
    let mut faces: Vec<[DVec3; 3]> = Vec::with_capacity(8);
    for octant in 0..8 {
      let s = |axis: usize| if octant & (1 << axis) == 0 { 1.0 } else { -1.0 };
      let (a, b, c) = (axes[0] * s(0), axes[1] * s(1), axes[2] * s(2));
      // Keep the winding outward whatever the octant's handedness.
      if s(0) * s(1) * s(2) > 0.0 {
        faces.push([a, b, c]);
      } else {
        faces.push([a, c, b]);
      }
    }
    for _ in 0..subdivisions {
      faces = faces
        .into_iter()
        .flat_map(|[a, b, c]| {
          let ab = ((a + b) * 0.5).normalize();
          let bc = ((b + c) * 0.5).normalize();
          let ca = ((c + a) * 0.5).normalize();
          [[a, ab, ca], [ab, b, bc], [ca, bc, c], [ab, bc, ca]]
        })
        .collect();
    }
    faces
      .into_iter()
      .map(|tri| tri.map(|p| centre + p * radius))
      .collect()
  }

  pub fn surface_name(&self, surface: usize) -> &str {
    &self.surfaces[surface].name
  }

  pub fn n_triangles(&self) -> usize {
    self.triangles.len()
  }
}

impl SurfaceQuery for TriSurface {
  fn bounds(&self) -> BoundBox {
    self
      .surfaces
      .iter()
      .map(|s| s.bounds)
      .reduce(|a, b| a.union(&b))
      .unwrap_or(BoundBox::new(DVec3::ZERO, DVec3::ZERO))
  }

  fn n_surfaces(&self) -> usize {
    self.surfaces.len()
  }

  fn min_level(&self, surface: usize) -> u32 {
    self.surfaces[surface].min_level
  }

  fn max_level(&self, surface: usize) -> u32 {
    self.surfaces[surface].max_level
  }

  fn intersects_box(&self, bb: &BoundBox) -> bool {
    self
      .triangles
      .iter()
      .zip(&self.triangle_bounds)
      .any(|(tri, tb)| tb.overlaps(bb) && bb.intersects_triangle(tri))
  }

  fn find_all_intersections(&self, start: DVec3, end: DVec3) -> Vec<SurfaceHit> {
    let Some(seg) = BoundBox::from_points([start, end]) else {
      return Vec::new();
    };
    let mut hits: Vec<SurfaceHit> = self
      .triangles
      .iter()
      .zip(&self.triangle_bounds)
      .zip(&self.surface_of)
      .filter(|((_, tb), _)| tb.overlaps(&seg))
      .filter_map(|((tri, _), &surface)| {
        segment_triangle_intersection(start, end, tri).map(|t| SurfaceHit {
          surface,
          point: start + (end - start) * t,
          normal: triangle_normal(tri),
          t,
        })
      })
      .collect();
    hits.sort_by(|a, b| a.t.total_cmp(&b.t));
    hits
  }

  fn nearest_normal(&self, p: DVec3) -> Option<DVec3> {
    self
      .triangles
      .iter()
      .map(|tri| (closest_point_on_triangle(p, tri).distance_squared(p), tri))
      .min_by(|a, b| a.0.total_cmp(&b.0))
      .map(|(_, tri)| triangle_normal(tri))
  }

  fn contains(&self, surface: usize, p: DVec3) -> bool {
    let info = &self.surfaces[surface];
    if !info.bounds.contains_point(p) {
      return false;
    }
    let reach = info.bounds.size().length() * 2.0 + 1.0;
    let end = p + INSIDE_RAY * reach;
    let crossings = self
      .triangles
      .iter()
      .zip(&self.surface_of)
      .filter(|(_, &s)| s == surface)
      .filter(|(tri, _)| segment_triangle_intersection(p, end, tri).is_some())
      .count();
    crossings % 2 == 1
  }
}

fn is_ascii_stl(bytes: &[u8]) -> bool {
  let head = &bytes[..bytes.len().min(512)];
  head.starts_with(b"solid") && String::from_utf8_lossy(head).contains("facet")
}

fn parse_ascii_stl(path: &Path, text: &str) -> Result<Vec<[DVec3; 3]>> {
  let mut triangles = Vec::new();
  let mut corners: Vec<DVec3> = Vec::with_capacity(3);

  for (line_no, line) in text.lines().enumerate() {
    let mut words = line.split_whitespace();
    match words.next() {
      Some("vertex") => {
        let coords: Vec<f64> = words
          .map(|w| w.parse::<f64>())
          .collect::<std::result::Result<_, _>>()
          .map_err(|e| MeshError::Parse {
            path: path.to_path_buf(),
            line: line_no + 1,
            message: e.to_string(),
          })?;
        if coords.len() != 3 {
          return Err(MeshError::Parse {
            path: path.to_path_buf(),
            line: line_no + 1,
            message: format!("vertex with {} coordinates", coords.len()),
          });
        }
        corners.push(DVec3::new(coords[0], coords[1], coords[2]));
      }
      Some("endfacet") => {
        if corners.len() != 3 {
          return Err(MeshError::Parse {
            path: path.to_path_buf(),
            line: line_no + 1,
            message: format!("facet with {} vertices", corners.len()),
          });
        }
        triangles.push([corners[0], corners[1], corners[2]]);
        corners.clear();
      }
      _ => {}
    }
  }
  Ok(triangles)
}

fn parse_binary_stl(path: &Path, bytes: &[u8]) -> Result<Vec<[DVec3; 3]>> {
  let parse_error = |message: String| MeshError::Parse {
    path: path.to_path_buf(),
    line: 0,
    message,
  };
  let count_bytes: [u8; 4] = bytes
    .get(80..84)
    .and_then(|b| b.try_into().ok())
    .ok_or_else(|| parse_error("truncated binary header".to_string()))?;
  let count = u32::from_le_bytes(count_bytes) as usize;
  if bytes.len() < 84 + count * 50 {
    return Err(parse_error(format!("expected {count} triangles")));
  }

  let read_f32 = |offset: usize| {
    let mut b = [0u8; 4];
    b.copy_from_slice(&bytes[offset..offset + 4]);
    f32::from_le_bytes(b) as f64
  };
  Ok(
    (0..count)
      .map(|i| {
        // Skip the 12-byte facet normal.
        let base = 84 + i * 50 + 12;
        let vertex = |v: usize| {
          let o = base + v * 12;
          DVec3::new(read_f32(o), read_f32(o + 4), read_f32(o + 8))
        };
        [vertex(0), vertex(1), vertex(2)]
      })
      .collect(),
  )
}

#[cfg(test)]
#[path = "trisurface_test.rs"]
mod trisurface_test;
