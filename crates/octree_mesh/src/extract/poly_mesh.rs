//! Polyhedral mesh in owner/neighbour face addressing.

use std::cmp::Ordering;
use std::fmt;

use glam::DVec3;
use smallvec::SmallVec;

use crate::octree::LeafId;

/// Point loop of one face.
pub type FacePoints = SmallVec<[usize; 8]>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PatchKind {
  /// Faces against cubes that are not part of the mesh.
  Wall,
  /// Faces on the root box.
  Domain,
  /// Faces shared with a mesh cell of another rank.
  Processor { neighbour_rank: usize },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Patch {
  pub name: String,
  pub kind: PatchKind,
  /// First face of the patch.
  pub start: usize,
  pub size: usize,
}

impl Patch {
  pub fn faces(&self) -> std::ops::Range<usize> {
    self.start..self.start + self.size
  }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CellZone {
  pub name: String,
  pub cells: Vec<usize>,
}

/// Zone of every leaf, as assigned by zoning.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ZoneMap {
  pub names: Vec<String>,
  pub zone_of: Vec<Option<usize>>,
}

impl ZoneMap {
  pub fn zone(&self, leaf: LeafId) -> Option<usize> {
    self.zone_of.get(leaf).copied().flatten()
  }
}

/// Face record before assembly. Boundary faces carry their patch index.
#[derive(Clone, Debug)]
pub(crate) struct RawFace {
  pub points: FacePoints,
  pub owner: usize,
  pub neighbour: Option<usize>,
  pub patch: Option<usize>,
}

/// Coordinates of a face's points in ascending order. Equal on every rank
/// that holds the face, whatever the loop's start and orientation.
type FaceLocation = SmallVec<[[f64; 3]; 8]>;

fn face_location(points: &[DVec3], ring: &[usize]) -> FaceLocation {
  let mut location: FaceLocation = ring.iter().map(|&p| points[p].to_array()).collect();
  location.sort_by(cmp_coordinates);
  location
}

fn cmp_coordinates(a: &[f64; 3], b: &[f64; 3]) -> Ordering {
  a[0].total_cmp(&b[0]).then(a[1].total_cmp(&b[1])).then(a[2].total_cmp(&b[2]))
}

fn cmp_locations(a: &FaceLocation, b: &FaceLocation) -> Ordering {
  a.iter()
    .zip(b.iter())
    .map(|(pa, pb)| cmp_coordinates(pa, pb))
    .find(|o| o.is_ne())
    .unwrap_or_else(|| a.len().cmp(&b.len()))
}

#[derive(Clone, Default, PartialEq)]
pub struct PolyMesh {
  pub points: Vec<DVec3>,
  pub faces: Vec<FacePoints>,
  pub owner: Vec<usize>,
  /// Neighbour of each internal face; internal faces come first.
  pub neighbour: Vec<usize>,
  /// Faces of each cell.
  pub cells: Vec<SmallVec<[usize; 8]>>,
  /// Leaf every cell was made from.
  pub cell_leaves: Vec<LeafId>,
  pub patches: Vec<Patch>,
  pub cell_zones: Vec<CellZone>,
}

impl fmt::Debug for PolyMesh {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("PolyMesh")
      .field("points", &self.points.len())
      .field("faces", &self.faces.len())
      .field("internal_faces", &self.neighbour.len())
      .field("cells", &self.cells.len())
      .field("patches", &self.patches)
      .finish()
  }
}

impl PolyMesh {
  /// Build the face lists from unordered records.
  ///
  /// Internal faces are flipped to `owner < neighbour` and sorted by
  /// (owner, neighbour). Boundary faces follow in patch order and keep
  /// their relative order inside a patch, except on processor patches:
  /// those are sorted by face location so that both sides of an interface
  /// list the shared faces in the same order.
  pub(crate) fn assemble(
    points: Vec<DVec3>,
    mut raw: Vec<RawFace>,
    n_cells: usize,
    patch_info: Vec<(String, PatchKind)>,
  ) -> Self {
    for face in raw.iter_mut() {
      if let Some(n) = face.neighbour {
        if n < face.owner {
          face.neighbour = Some(face.owner);
          face.owner = n;
          face.points[1..].reverse();
        }
      }
    }

    let locations: Vec<Option<FaceLocation>> = raw
      .iter()
      .map(|face| {
        let processor = face
          .patch
          .is_some_and(|p| matches!(patch_info[p].1, PatchKind::Processor { .. }));
        processor.then(|| face_location(&points, &face.points))
      })
      .collect();
    let section = |face: &RawFace| match face.neighbour {
      Some(n) => (0, face.owner, n),
      None => (1, face.patch.unwrap_or(usize::MAX), 0),
    };
    let mut order: Vec<usize> = (0..raw.len()).collect();
    order.sort_by(|&a, &b| {
      section(&raw[a])
        .cmp(&section(&raw[b]))
        .then_with(|| match (&locations[a], &locations[b]) {
          (Some(la), Some(lb)) => cmp_locations(la, lb),
          _ => Ordering::Equal,
        })
    });
    let mut slots: Vec<Option<RawFace>> = raw.into_iter().map(Some).collect();
    let raw: Vec<RawFace> = order.iter().filter_map(|&r| slots[r].take()).collect();

    let mut mesh = PolyMesh {
      points,
      cells: vec![SmallVec::new(); n_cells],
      ..Default::default()
    };
    let mut patch_sizes = vec![0usize; patch_info.len()];
    for (id, face) in raw.into_iter().enumerate() {
      mesh.cells[face.owner].push(id);
      mesh.owner.push(face.owner);
      if let Some(n) = face.neighbour {
        mesh.cells[n].push(id);
        mesh.neighbour.push(n);
      }
      if let Some(patch) = face.patch {
        patch_sizes[patch] += 1;
      }
      mesh.faces.push(face.points);
    }

    let mut start = mesh.neighbour.len();
    for ((name, kind), size) in patch_info.into_iter().zip(patch_sizes) {
      mesh.patches.push(Patch { name, kind, start, size });
      start += size;
    }
    mesh
  }

  #[inline]
  pub fn n_internal_faces(&self) -> usize {
    self.neighbour.len()
  }

  #[inline]
  pub fn n_cells(&self) -> usize {
    self.cells.len()
  }

  pub fn patch(&self, name: &str) -> Option<&Patch> {
    self.patches.iter().find(|p| p.name == name)
  }

  pub fn face_centre(&self, face: usize) -> DVec3 {
    let loop_points = &self.faces[face];
    loop_points.iter().map(|&p| self.points[p]).sum::<DVec3>() / loop_points.len() as f64
  }

  /// Area-weighted normal of a face, pointing away from its owner.
  pub fn face_area_vector(&self, face: usize) -> DVec3 {
    let loop_points = &self.faces[face];
    let c = self.face_centre(face);
    let n = loop_points.len();
    (0..n)
      .map(|i| {
        let a = self.points[loop_points[i]] - c;
        let b = self.points[loop_points[(i + 1) % n]] - c;
        a.cross(b)
      })
      .sum::<DVec3>()
      * 0.5
  }

  /// Magnitude of the summed outward area vectors of a cell, relative to
  /// its total face area. Zero for a closed cell.
  pub fn cell_closedness(&self, cell: usize) -> f64 {
    let mut sum = DVec3::ZERO;
    let mut total = 0.0;
    for &face in &self.cells[cell] {
      let area = self.face_area_vector(face);
      total += area.length();
      sum += if self.owner[face] == cell { area } else { -area };
    }
    if total > 0.0 {
      sum.length() / total
    } else {
      0.0
    }
  }

  /// Volume by the divergence theorem.
  pub fn cell_volume(&self, cell: usize) -> f64 {
    self.cells[cell]
      .iter()
      .map(|&face| {
        let v = self.face_centre(face).dot(self.face_area_vector(face)) / 3.0;
        if self.owner[face] == cell {
          v
        } else {
          -v
        }
      })
      .sum()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use smallvec::smallvec;

  fn unit_cube_faces() -> (Vec<DVec3>, Vec<RawFace>) {
    let points = (0..8)
      .map(|c| DVec3::new((c & 1) as f64, ((c >> 1) & 1) as f64, ((c >> 2) & 1) as f64))
      .collect();
    let loops: [[usize; 4]; 6] = [[0, 4, 6, 2], [1, 3, 7, 5], [0, 1, 5, 4], [2, 6, 7, 3], [0, 2, 3, 1], [4, 5, 7, 6]];
    let raw = loops
      .iter()
      .map(|l| RawFace {
        points: l.iter().copied().collect(),
        owner: 0,
        neighbour: None,
        patch: Some(0),
      })
      .collect();
    (points, raw)
  }

  #[test]
  fn test_single_cube() {
    let (points, raw) = unit_cube_faces();
    let mesh = PolyMesh::assemble(points, raw, 1, vec![("walls".into(), PatchKind::Wall)]);
    assert_eq!(mesh.n_internal_faces(), 0);
    assert_eq!(mesh.patches[0].faces(), 0..6);
    assert!(mesh.cell_closedness(0) < 1e-12);
    assert!((mesh.cell_volume(0) - 1.0).abs() < 1e-12);
    assert_eq!(mesh.face_area_vector(0), DVec3::new(-1.0, 0.0, 0.0));
  }

  /// Internal faces with owner above neighbour are flipped.
  #[test]
  fn test_assemble_flips_internal_faces() {
    let raw = vec![
      RawFace {
        points: smallvec![0, 1, 2, 3],
        owner: 1,
        neighbour: Some(0),
        patch: None,
      },
      RawFace {
        points: smallvec![4, 5, 6, 7],
        owner: 0,
        neighbour: None,
        patch: Some(1),
      },
      RawFace {
        points: smallvec![8, 9, 10, 11],
        owner: 1,
        neighbour: None,
        patch: Some(0),
      },
    ];
    let patches = vec![("walls".into(), PatchKind::Wall), ("domain".into(), PatchKind::Domain)];
    let mesh = PolyMesh::assemble(vec![DVec3::ZERO; 12], raw, 2, patches);

    assert_eq!(mesh.owner, vec![0, 1, 0]);
    assert_eq!(mesh.neighbour, vec![1]);
    assert_eq!(mesh.faces[0].as_slice(), &[0, 3, 2, 1]);
    assert_eq!(mesh.faces[1].as_slice(), &[8, 9, 10, 11]);
    assert_eq!(mesh.patch("domain").map(|p| p.start), Some(2));
    assert_eq!(mesh.cells[1].as_slice(), &[0, 1]);
  }
}
