use std::collections::HashMap;

use tracing::debug;

use super::{BoxType, NodeId, NodeTables, OctreeAddressing};
use crate::octree::coordinates::{key_position, EDGE_CORNERS, FACE_CORNERS};
use crate::octree::{CubeType, LeafId, NodeKey};

/// Midpoint of two keys on the finest grid.
#[inline]
pub(crate) fn mid_key(a: NodeKey, b: NodeKey) -> NodeKey {
  [(a[0] + b[0]) / 2, (a[1] + b[1]) / 2, (a[2] + b[2]) / 2]
}

impl OctreeAddressing<'_> {
  /// Number the corners of MESHCELL leaves, plus the edge midpoints and
  /// face centres where a finer leaf has a corner.
  #[tracing::instrument(skip_all, name = "addressing::create_node_labels")]
  pub(super) fn create_node_labels(&self) -> NodeTables {
    let octree = self.octree;
    let root = *octree.root_box();
    let box_type = self.box_type();

    let mut tables = NodeTables {
      labels: vec![None; octree.number_of_leaves()],
      key_map: HashMap::new(),
      ..Default::default()
    };
    let insert = |tables: &mut NodeTables, key: NodeKey| -> NodeId {
      if let Some(&node) = tables.key_map.get(&key) {
        return node;
      }
      let node = tables.keys.len();
      tables.keys.push(key);
      tables.points.push(key_position(key, &root));
      tables.key_map.insert(key, node);
      node
    };

    for leaf in 0..octree.number_of_leaves() {
      if !box_type[leaf].contains(BoxType::MESHCELL) {
        continue;
      }
      let c = octree.leaf_coordinates(leaf);
      let corners: [NodeKey; 8] = std::array::from_fn(|corner| c.corner_key(corner));
      let row: [NodeId; 8] = corners.map(|key| insert(&mut tables, key));
      tables.labels[leaf] = Some(row);

      if !box_type[leaf].contains(BoxType::SPLITHEX) {
        continue;
      }
      let hanging = EDGE_CORNERS
        .iter()
        .map(|&[a, b]| mid_key(corners[a], corners[b]))
        .chain(FACE_CORNERS.iter().map(|f| mid_key(corners[f[0]], corners[f[2]])));
      for key in hanging {
        if self.is_corner_of_finer_leaf(key, c.level) {
          insert(&mut tables, key);
        }
      }
    }

    debug!(nodes = tables.keys.len(), "created node labels");
    tables
  }

  fn is_corner_of_finer_leaf(&self, key: NodeKey, level: u32) -> bool {
    self
      .octree
      .leaves_around_point(key)
      .iter()
      .flatten()
      .any(|&leaf| self.octree.leaf_level(leaf) > level)
  }

  /// Classify nodes by the cubes around them.
  #[tracing::instrument(skip_all, name = "addressing::calculate_node_type")]
  pub(super) fn calculate_node_type(&self) -> Vec<BoxType> {
    self
      .node_leaves()
      .iter()
      .map(|around| {
        let mut outer = false;
        let mut mesh = false;
        let mut non_mesh = false;
        for slot in around {
          match *slot {
            None => {
              outer = true;
              non_mesh = true;
            }
            Some(leaf) => {
              if self.octree.cube_type(leaf) == CubeType::Outside {
                outer = true;
              }
              if self.is_mesh_cube(leaf) {
                mesh = true;
              } else {
                non_mesh = true;
              }
            }
          }
        }

        let mut t = if outer {
          BoxType::OUTERNODE
        } else if mesh {
          BoxType::INNERNODE
        } else {
          BoxType::NONE
        };
        if mesh && non_mesh {
          t |= BoxType::BOUNDARYNODE;
        }
        t
      })
      .collect()
  }

  /// Node at the midpoint of hex edge `edge` (0..12) of `leaf`, if any.
  pub fn find_edge_centre(&self, leaf: LeafId, edge: usize) -> Option<NodeId> {
    let c = self.octree.leaf_coordinates(leaf);
    let [a, b] = EDGE_CORNERS[edge];
    self.node_for_key(mid_key(c.corner_key(a), c.corner_key(b)))
  }
}
