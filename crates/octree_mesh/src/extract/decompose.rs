//! Decomposition of split-hex cells into pyramids and tetrahedra.

use std::collections::HashMap;

use glam::DVec3;
use smallvec::smallvec;
use tracing::{debug, warn};

use super::poly_mesh::RawFace;
use super::{CellZone, MeshExtractor, PatchKind, PolyMesh};
use crate::addressing::BoxType;

impl MeshExtractor<'_, '_> {
  /// Faces of split-hex cells with hanging points are fanned into
  /// triangles around their centre, as are processor faces with hanging
  /// points. Each split-hex cell then becomes one
  /// pyramid per quad and one tetrahedron per triangle, all sharing a
  /// point at the cell centre.
  #[tracing::instrument(skip_all, name = "extract::decompose_split_hexes")]
  pub(super) fn decompose_split_hexes_into_tets_and_pyramids(&self, mesh: PolyMesh) -> PolyMesh {
    let box_type = self.addressing.box_type();
    let split: Vec<bool> = mesh
      .cell_leaves
      .iter()
      .map(|&leaf| box_type[leaf].contains(BoxType::SPLITHEX))
      .collect();
    let fans_processor_faces = mesh
      .patches
      .iter()
      .filter(|patch| matches!(patch.kind, PatchKind::Processor { .. }))
      .flat_map(|patch| patch.faces())
      .any(|face| mesh.faces[face].len() > 4);
    if !split.contains(&true) && !fans_processor_faces {
      return mesh;
    }

    let PolyMesh {
      mut points,
      faces,
      owner,
      neighbour,
      cell_leaves,
      patches,
      cell_zones,
      ..
    } = mesh;
    let n_cells = cell_leaves.len();
    let n_internal = neighbour.len();
    let mut patch_of = vec![None; faces.len()];
    for (patch, info) in patches.iter().enumerate() {
      for face in info.faces() {
        patch_of[face] = Some(patch);
      }
    }

    let mut raw: Vec<RawFace> = Vec::with_capacity(faces.len());
    let mut n_fanned = 0;
    for (face, ring) in faces.into_iter().enumerate() {
      let nb = (face < n_internal).then(|| neighbour[face]);
      // The coarser side of a processor face with hanging points is a
      // split hex on the other rank.
      let processor = patch_of[face].is_some_and(|p| matches!(patches[p].kind, PatchKind::Processor { .. }));
      let touches_split = split[owner[face]] || nb.is_some_and(|n| split[n]) || processor;
      if !touches_split || ring.len() <= 4 {
        raw.push(RawFace {
          points: ring,
          owner: owner[face],
          neighbour: nb,
          patch: patch_of[face],
        });
        continue;
      }

      let (lo, hi) = ring
        .iter()
        .fold((DVec3::INFINITY, DVec3::NEG_INFINITY), |(lo, hi), &p| (lo.min(points[p]), hi.max(points[p])));
      let centre = 0.5 * (lo + hi);
      let c = points.len();
      points.push(centre);
      for i in 0..ring.len() {
        raw.push(RawFace {
          points: smallvec![ring[i], ring[(i + 1) % ring.len()], c],
          owner: owner[face],
          neighbour: nb,
          patch: patch_of[face],
        });
      }
      n_fanned += 1;
    }

    let mut cell_faces: Vec<Vec<usize>> = vec![Vec::new(); n_cells];
    for (r, face) in raw.iter().enumerate() {
      cell_faces[face.owner].push(r);
      if let Some(n) = face.neighbour {
        cell_faces[n].push(r);
      }
    }

    // New cell ids keep the original cell order.
    let mut first = Vec::with_capacity(n_cells);
    let mut new_leaves = Vec::new();
    for cell in 0..n_cells {
      first.push(new_leaves.len());
      let count = if split[cell] { cell_faces[cell].len() } else { 1 };
      new_leaves.extend(std::iter::repeat(cell_leaves[cell]).take(count));
    }

    let mut inner: Vec<RawFace> = Vec::new();
    let mut open_edges = 0;
    for cell in (0..n_cells).filter(|&c| split[c]) {
      let apex = points.len();
      points.push(self.addressing.octree().leaf_centre(cell_leaves[cell]));

      let outward: Vec<Vec<usize>> = cell_faces[cell]
        .iter()
        .map(|&r| {
          let mut ring: Vec<usize> = raw[r].points.to_vec();
          if raw[r].owner != cell {
            ring[1..].reverse();
          }
          ring
        })
        .collect();
      let mut edge_face: HashMap<(usize, usize), usize> = HashMap::new();
      for (j, ring) in outward.iter().enumerate() {
        for i in 0..ring.len() {
          edge_face.insert((ring[i], ring[(i + 1) % ring.len()]), j);
        }
      }
      for (j, ring) in outward.iter().enumerate() {
        for i in 0..ring.len() {
          let (a, b) = (ring[i], ring[(i + 1) % ring.len()]);
          match edge_face.get(&(b, a)) {
            Some(&k) if k > j => inner.push(RawFace {
              points: smallvec![b, a, apex],
              owner: first[cell] + j,
              neighbour: Some(first[cell] + k),
              patch: None,
            }),
            Some(_) => {}
            None => open_edges += 1,
          }
        }
      }
    }
    if open_edges > 0 {
      warn!(open_edges, "split-hex cells are not closed");
    }

    let mut slot_owner = vec![0; raw.len()];
    let mut slot_neighbour = vec![None; raw.len()];
    for cell in 0..n_cells {
      for (j, &r) in cell_faces[cell].iter().enumerate() {
        let id = if split[cell] { first[cell] + j } else { first[cell] };
        if raw[r].owner == cell {
          slot_owner[r] = id;
        } else {
          slot_neighbour[r] = Some(id);
        }
      }
    }
    for (r, face) in raw.iter_mut().enumerate() {
      face.owner = slot_owner[r];
      face.neighbour = slot_neighbour[r];
    }
    raw.extend(inner);

    let n_split = split.iter().filter(|&&s| s).count();
    debug!(split_cells = n_split, fanned_faces = n_fanned, cells = new_leaves.len(), "decomposed split hexes");

    let count_of = |cell: usize| if split[cell] { cell_faces[cell].len() } else { 1 };
    let cell_zones = cell_zones
      .into_iter()
      .map(|zone| CellZone {
        name: zone.name,
        cells: zone.cells.iter().flat_map(|&c| first[c]..first[c] + count_of(c)).collect(),
      })
      .collect();
    let patch_info = patches.into_iter().map(|p| (p.name, p.kind)).collect();

    let mut mesh = PolyMesh::assemble(points, raw, new_leaves.len(), patch_info);
    mesh.cell_leaves = new_leaves;
    mesh.cell_zones = cell_zones;
    mesh
  }
}
