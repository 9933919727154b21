use std::collections::HashMap;

use smallvec::SmallVec;
use tracing::debug;

use super::nodes::mid_key;
use super::{EdgeId, EdgeTables, FaceId, NodeId, OctreeAddressing};
use crate::geometry::BoundBox;
use crate::octree::LeafId;
use crate::surface::SurfaceQuery;

impl OctreeAddressing<'_> {
  /// Collect the unique segments of all face loops.
  #[tracing::instrument(skip_all, name = "addressing::create_octree_edges")]
  pub(super) fn create_octree_edges(&self) -> EdgeTables {
    let loops = self.octree_face_loops();
    let mut tables = EdgeTables {
      nodes: Vec::new(),
      face_edges: Vec::with_capacity(loops.len()),
    };
    let mut lookup: HashMap<[NodeId; 2], EdgeId> = HashMap::new();

    for points in loops {
      let mut row = SmallVec::new();
      for i in 0..points.len() {
        let (a, b) = (points[i], points[(i + 1) % points.len()]);
        let key = [a.min(b), a.max(b)];
        let edge = *lookup.entry(key).or_insert_with(|| {
          tables.nodes.push(key);
          tables.nodes.len() - 1
        });
        row.push(edge);
      }
      tables.face_edges.push(row);
    }

    debug!(edges = tables.nodes.len(), "created octree edges");
    tables
  }

  pub(super) fn calculate_edge_faces(&self) -> Vec<SmallVec<[FaceId; 4]>> {
    let mut edge_faces = vec![SmallVec::new(); self.octree_edges().len()];
    for (face, row) in self.face_edges().iter().enumerate() {
      for &edge in row {
        edge_faces[edge].push(face);
      }
    }
    edge_faces
  }

  pub(super) fn calculate_leaf_edges(&self) -> Vec<SmallVec<[EdgeId; 12]>> {
    let face_edges = self.face_edges();
    self
      .leaf_faces()
      .iter()
      .map(|faces| {
        let mut row: SmallVec<[EdgeId; 12]> = faces.iter().flat_map(|&f| face_edges[f].iter().copied()).collect();
        row.sort_unstable();
        row.dedup();
        row
      })
      .collect()
  }

  /// Leaves around the midpoint of each edge, of any type and owner.
  pub(super) fn calculate_edge_leaves(&self) -> Vec<SmallVec<[LeafId; 4]>> {
    self
      .octree_edges()
      .iter()
      .map(|&[a, b]| {
        let around = self.octree.leaves_around_point(mid_key(self.node_key(a), self.node_key(b)));
        let mut row: SmallVec<[LeafId; 4]> = around.iter().flatten().copied().collect();
        row.sort_unstable();
        row.dedup();
        row
      })
      .collect()
  }

  pub(super) fn calculate_node_edges(&self) -> Vec<SmallVec<[EdgeId; 6]>> {
    let mut node_edges = vec![SmallVec::new(); self.number_of_nodes()];
    for (edge, &[a, b]) in self.octree_edges().iter().enumerate() {
      node_edges[a].push(edge);
      node_edges[b].push(edge);
    }
    node_edges
  }

  /// Whether the surface passes through the face.
  pub fn is_intersected_face<S: SurfaceQuery + ?Sized>(&self, face: FaceId, surface: &S) -> bool {
    let points = self.octree_points();
    let corners = self.octree_faces()[face].map(|node| points[node]);
    BoundBox::from_points(corners).is_some_and(|bb| surface.intersects_box(&bb))
  }

  /// Whether the surface crosses the edge.
  pub fn is_intersected_edge<S: SurfaceQuery + ?Sized>(&self, edge: EdgeId, surface: &S) -> bool {
    let points = self.octree_points();
    let [a, b] = self.octree_edges()[edge];
    !surface.find_all_intersections(points[a], points[b]).is_empty()
  }
}
