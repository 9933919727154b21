use std::collections::HashMap;

use super::*;
use crate::error::MeshError;
use crate::octree::coordinates::EDGE_CORNERS;
use crate::parallel::{run_partitioned, Communicator, SerialCommunicator};
use crate::test_utils::{plane_surface, serial_settings, set_types, tree_with_fine_octant, uniform_tree};

/// Sum of outward area vectors over the faces of `leaf`.
fn closure_of(addr: &OctreeAddressing, leaf: LeafId) -> DVec3 {
  let points = addr.octree_points();
  addr.leaf_faces()[leaf]
    .iter()
    .map(|&face| {
      let ring = &addr.octree_face_loops()[face];
      let area: DVec3 = (0..ring.len())
        .map(|i| points[ring[i]].cross(points[ring[(i + 1) % ring.len()]]))
        .sum::<DVec3>()
        * 0.5;
      if addr.octree_face_owner()[face] == leaf {
        area
      } else {
        -area
      }
    })
    .sum()
}

// =========================================================================
// Box types
// =========================================================================

#[test]
fn test_all_unknown_leaves_are_mesh_cells() {
  let tree = uniform_tree(1);
  let addr = OctreeAddressing::new(&tree, serial_settings());
  assert_eq!(addr.number_of_mesh_cells(), 8);
  assert!(addr.box_type().iter().all(|t| *t == BoxType::MESHCELL));
}

/// Data leaves get BOUNDARY, and become cells only with data boxes on.
#[test]
fn test_data_boxes() {
  let mut tree = uniform_tree(1);
  tree.set_cube_type(2, CubeType::Data);
  tree.set_cube_type(5, CubeType::Outside);

  let addr = OctreeAddressing::new(&tree, serial_settings());
  assert_eq!(addr.box_type()[2], BoxType::BOUNDARY);
  assert_eq!(addr.box_type()[5], BoxType::NONE);
  assert_eq!(addr.number_of_mesh_cells(), 6);

  let with_data = OctreeAddressing::new(
    &tree,
    AddressingSettings {
      use_data_boxes: true,
      rank: 0,
    },
  );
  assert_eq!(with_data.box_type()[2], BoxType::MESHCELL | BoxType::BOUNDARY);
  assert_eq!(with_data.number_of_mesh_cells(), 7);
}

/// Leaves touching the fine octant over a face or an edge are split hexes;
/// the one touching it only at a vertex is not.
#[test]
fn test_split_hex_marks() {
  let tree = tree_with_fine_octant();
  let addr = OctreeAddressing::new(&tree, serial_settings());
  let split: Vec<LeafId> = (0..tree.number_of_leaves())
    .filter(|&leaf| addr.box_type()[leaf].contains(BoxType::SPLITHEX))
    .collect();
  assert_eq!(split, vec![8, 9, 10, 11, 12, 13]);
}

/// Leaves of another rank are not mesh cells here.
#[test]
fn test_foreign_leaves_are_not_mesh_cells() {
  let mut tree = uniform_tree(1);
  tree.distribute_leaves(2);
  let addr = OctreeAddressing::new(&tree, AddressingSettings { use_data_boxes: false, rank: 1 });
  let cells: Vec<LeafId> = (0..8).filter(|&leaf| addr.is_local_mesh_cube(leaf)).collect();
  assert_eq!(cells, vec![4, 5, 6, 7]);
}

// =========================================================================
// Nodes
// =========================================================================

#[test]
fn test_uniform_node_count() {
  let tree = uniform_tree(1);
  let addr = OctreeAddressing::new(&tree, serial_settings());
  assert_eq!(addr.number_of_nodes(), 27);
  assert_eq!(addr.octree_points().len(), 27);
}

/// Leaves sharing a corner position get the same node.
#[test]
fn test_shared_corners_share_nodes() {
  let tree = tree_with_fine_octant();
  let addr = OctreeAddressing::new(&tree, serial_settings());

  let mut by_key: HashMap<NodeKey, NodeId> = HashMap::new();
  for leaf in 0..tree.number_of_leaves() {
    let row = addr.node_labels()[leaf].expect("every leaf is a mesh cell");
    let c = tree.leaf_coordinates(leaf);
    for (corner, &node) in row.iter().enumerate() {
      let key = c.corner_key(corner);
      assert_eq!(addr.node_key(node), key);
      assert_eq!(*by_key.entry(key).or_insert(node), node, "leaf {} corner {}", leaf, corner);
    }
  }
  // 27 fine + 27 coarse grid points, 8 of them shared.
  assert_eq!(addr.number_of_nodes(), 46);
}

#[test]
fn test_node_leaves_slots() {
  let tree = uniform_tree(1);
  let addr = OctreeAddressing::new(&tree, serial_settings());
  let centre = addr.node_labels()[0].expect("mesh cell")[7];
  let around = addr.node_leaves()[centre];
  for corner in 0..8 {
    // Leaf `o` has the centre as its corner `7 - o`.
    assert_eq!(around[7 - corner], Some(7 - corner));
  }
}

#[test]
fn test_node_types() {
  let mut tree = uniform_tree(1);
  let addr = OctreeAddressing::new(&tree, serial_settings());
  let row = addr.node_labels()[0].expect("mesh cell");
  assert_eq!(addr.node_type()[row[7]], BoxType::INNERNODE);
  assert_eq!(addr.node_type()[row[0]], BoxType::OUTERNODE | BoxType::BOUNDARYNODE);
  drop(addr);

  tree.set_cube_type(7, CubeType::Outside);
  let addr = OctreeAddressing::new(&tree, serial_settings());
  let centre = addr.node_labels()[0].expect("mesh cell")[7];
  assert_eq!(addr.node_type()[centre], BoxType::OUTERNODE | BoxType::BOUNDARYNODE);
}

#[test]
fn test_find_edge_centre() {
  let tree = tree_with_fine_octant();
  let addr = OctreeAddressing::new(&tree, serial_settings());
  // Octant 1 touches the fine block along its edge 8 but not along edge 3.
  assert_eq!(EDGE_CORNERS[8], [0, 4]);
  let centre = addr.find_edge_centre(8, 8).expect("hanging node on the shared edge");
  assert_eq!(addr.octree_points()[centre], DVec3::new(0.5, 0.0, 0.25));
  assert!(addr.find_edge_centre(8, 3).is_none());
}

// =========================================================================
// Faces
// =========================================================================

#[test]
fn test_uniform_faces() {
  let tree = uniform_tree(1);
  let addr = OctreeAddressing::new(&tree, serial_settings());
  let internal = addr.octree_face_neighbour().iter().filter(|n| n.is_some()).count();
  assert_eq!(addr.number_of_faces(), 36);
  assert_eq!(internal, 12);
  assert!(addr.leaf_faces().iter().all(|faces| faces.len() == 6));
  assert!(addr.octree_face_loops().iter().all(|ring| ring.len() == 4));
}

#[test]
fn test_owner_below_neighbour() {
  let tree = tree_with_fine_octant();
  let addr = OctreeAddressing::new(&tree, serial_settings());
  for (face, &owner) in addr.octree_face_owner().iter().enumerate() {
    if let Some(n) = addr.octree_face_neighbour()[face] {
      assert!(owner < n, "face {}: owner {} neighbour {}", face, owner, n);
    }
  }
}

#[test]
fn test_transition_faces() {
  let tree = tree_with_fine_octant();
  let addr = OctreeAddressing::new(&tree, serial_settings());
  let internal = addr.octree_face_neighbour().iter().filter(|n| n.is_some()).count();
  assert_eq!(addr.number_of_faces(), 66);
  assert_eq!(internal, 33);

  // Coarse faces along the fine block carry the hanging midpoints.
  let loops = addr.octree_face_loops();
  assert!(loops.iter().any(|ring| ring.len() > 4));
  for leaf in 0..8 {
    for &face in &addr.leaf_faces()[leaf] {
      assert_eq!(loops[face].len(), 4, "fine face {} of leaf {}", face, leaf);
    }
  }
  // Octant 1 sees 4 fine faces instead of its -X face.
  assert_eq!(addr.leaf_faces()[8].len(), 9);
}

/// Face loops close every cell, coarse or fine.
#[test]
fn test_cells_are_closed() {
  let tree = tree_with_fine_octant();
  let addr = OctreeAddressing::new(&tree, serial_settings());
  for leaf in 0..tree.number_of_leaves() {
    let sum = closure_of(&addr, leaf);
    assert!(sum.length() < 1e-12, "leaf {} is open: {:?}", leaf, sum);
  }
}

#[test]
fn test_leaf_leaves_symmetric() {
  let tree = tree_with_fine_octant();
  let addr = OctreeAddressing::new(&tree, serial_settings());
  let leaf_leaves = addr.leaf_leaves();
  for (leaf, row) in leaf_leaves.iter().enumerate() {
    for &n in row {
      assert!(leaf_leaves[n].contains(&leaf));
    }
  }
  // Octant 7 touches octants 3, 5 and 6 over faces.
  assert_eq!(leaf_leaves[14].as_slice(), &[10, 12, 13]);
}

// =========================================================================
// Edges
// =========================================================================

#[test]
fn test_uniform_edges() {
  let tree = uniform_tree(1);
  let addr = OctreeAddressing::new(&tree, serial_settings());
  assert_eq!(addr.octree_edges().len(), 54);
  assert!(addr.octree_edges().iter().all(|&[a, b]| a < b));
  assert!(addr.face_edges().iter().all(|row| row.len() == 4));
  // Edges inside the domain border 4 faces, edges on its boundary 2 or 3.
  assert!(addr.edge_faces().iter().all(|row| (2..=4).contains(&row.len())));
  assert!(addr.leaf_edges().iter().all(|row| row.len() == 12));

  let centre = addr.node_labels()[0].expect("mesh cell")[7];
  assert_eq!(addr.node_edges()[centre].len(), 6);
  for (edge, leaves) in addr.edge_leaves().iter().enumerate() {
    assert!((1..=4).contains(&leaves.len()), "edge {}: {:?}", edge, leaves);
  }
}

#[test]
fn test_intersected_faces_and_edges() {
  let tree = uniform_tree(1);
  let addr = OctreeAddressing::new(&tree, serial_settings());
  let surface = plane_surface(0.25, 1, 1);

  let faces_of_leaf_0 = &addr.leaf_faces()[0];
  let side = faces_of_leaf_0
    .iter()
    .copied()
    .find(|&f| addr.octree_face_owner()[f] == 0 && addr.octree_face_direction()[f] == 0)
    .expect("-X face");
  let bottom = faces_of_leaf_0
    .iter()
    .copied()
    .find(|&f| addr.octree_face_direction()[f] == 4)
    .expect("-Z face");
  assert!(addr.is_intersected_face(side, &surface));
  assert!(!addr.is_intersected_face(bottom, &surface));

  let points = addr.octree_points();
  let vertical = (0..addr.octree_edges().len())
    .find(|&e| {
      let [a, b] = addr.octree_edges()[e];
      points[a].z != points[b].z && points[a].z.min(points[b].z) == 0.0 && points[a].x != points[a].y
    })
    .expect("vertical edge in the lower half");
  let horizontal = (0..addr.octree_edges().len())
    .find(|&e| {
      let [a, b] = addr.octree_edges()[e];
      points[a].z == 0.0 && points[b].z == 0.0
    })
    .expect("edge on the bottom");
  assert!(addr.is_intersected_edge(vertical, &surface));
  assert!(!addr.is_intersected_edge(horizontal, &surface));
}

// =========================================================================
// Caching
// =========================================================================

/// Repeated queries return the cached table; clearing recomputes the same.
#[test]
fn test_tables_are_cached() {
  let tree = tree_with_fine_octant();
  let mut addr = OctreeAddressing::new(&tree, serial_settings());
  let first = addr.octree_faces().as_ptr();
  assert_eq!(first, addr.octree_faces().as_ptr());

  let faces = addr.octree_faces().to_vec();
  let labels = addr.node_labels().to_vec();
  addr.clear_out();
  assert_eq!(addr.octree_faces(), faces.as_slice());
  assert_eq!(addr.node_labels(), labels.as_slice());
}

#[test]
fn test_set_box_type_drops_derived_tables() {
  let tree = uniform_tree(1);
  let mut addr = OctreeAddressing::new(&tree, serial_settings());
  let n_faces = addr.number_of_faces();

  addr.set_box_type(3, BoxType::SPLITHEX);
  assert_eq!(addr.box_type()[3], BoxType::MESHCELL | BoxType::SPLITHEX);
  assert_eq!(addr.box_type()[2], BoxType::MESHCELL);
  assert_eq!(addr.number_of_faces(), n_faces);

  addr.clear_out();
  assert_eq!(addr.box_type()[3], BoxType::MESHCELL);
}

// =========================================================================
// Irregular connections
// =========================================================================

/// Two cubes meeting only at the domain centre form two groups there.
#[test]
fn test_vertex_contact_is_irregular() {
  let mut tree = uniform_tree(1);
  set_types(&mut tree, |leaf| if leaf == 0 || leaf == 7 { CubeType::Inside } else { CubeType::Outside });
  let addr = OctreeAddressing::new(&tree, serial_settings());
  assert_eq!(addr.find_irregular_leaves(), (0..8).collect::<Vec<_>>());
}

#[test]
fn test_edge_contact_is_irregular() {
  let mut tree = uniform_tree(1);
  set_types(&mut tree, |leaf| if leaf == 0 || leaf == 3 { CubeType::Inside } else { CubeType::Outside });
  let addr = OctreeAddressing::new(&tree, serial_settings());
  let marked = addr.find_irregular_leaves();
  assert!(marked.contains(&0) && marked.contains(&3), "{:?}", marked);
}

#[test]
fn test_face_contact_is_regular() {
  let mut tree = uniform_tree(1);
  set_types(&mut tree, |leaf| if leaf <= 1 { CubeType::Inside } else { CubeType::Outside });
  let addr = OctreeAddressing::new(&tree, serial_settings());
  assert!(addr.find_irregular_leaves().is_empty());
}

// =========================================================================
// Global numbering
// =========================================================================

#[test]
fn test_serial_global_labels() {
  let tree = tree_with_fine_octant();
  let addr = OctreeAddressing::new(&tree, serial_settings());
  let comm = SerialCommunicator;

  let points = addr.global_point_labels(&comm).expect("serial numbering");
  assert_eq!(points.n_global, addr.number_of_nodes());
  assert_eq!(points.n_shared(), 0);
  assert!((0..addr.number_of_nodes()).all(|node| points.label(node) == Some(node)));

  let leaves = addr.global_leaf_labels(&comm).expect("serial numbering");
  assert_eq!(leaves.n_global, 15);
  assert_eq!(leaves.label(14), Some(14));
}

/// Two ranks split a 4x4x4 grid at z = 0.5 and agree on shared labels.
#[test]
fn test_parallel_global_labels() {
  type Shared = (usize, usize, usize, Vec<(NodeKey, usize)>, Vec<(LeafId, usize)>);

  let results = run_partitioned(2, |comm| {
    let mut tree = uniform_tree(2);
    tree.distribute_leaves(2);
    let addr = OctreeAddressing::new(
      &tree,
      AddressingSettings {
        use_data_boxes: false,
        rank: comm.rank(),
      },
    );

    let points = addr.global_point_labels(&comm)?;
    let faces = addr.global_face_labels(&comm)?;
    let leaves = addr.global_leaf_labels(&comm)?;
    let shared_points: Vec<(NodeKey, usize)> = points
      .global_to_local
      .iter()
      .map(|(&label, &node)| (addr.node_key(node), label))
      .collect();
    let foreign: Vec<(LeafId, usize)> = leaves
      .global_to_local
      .iter()
      .filter(|(_, &leaf)| tree.owner(leaf) != comm.rank())
      .map(|(&label, &leaf)| (leaf, label))
      .collect();
    Ok::<Shared, MeshError>((points.n_global, faces.n_global, leaves.n_global, shared_points, foreign))
  })
  .expect("pool starts");

  let (p0, f0, l0, shared0, foreign0) = results[0].as_ref().expect("rank 0 numbers");
  let (p1, f1, l1, shared1, foreign1) = results[1].as_ref().expect("rank 1 numbers");
  assert_eq!((*p0, *p1), (125, 125));
  assert_eq!((*f0, *f1), (240, 240));
  assert_eq!((*l0, *l1), (64, 64));

  let map0: HashMap<NodeKey, usize> = shared0.iter().copied().collect();
  let map1: HashMap<NodeKey, usize> = shared1.iter().copied().collect();
  assert_eq!(map0.len(), 25);
  assert_eq!(map0, map1);
  // Rank 0 owns every shared point.
  assert!(map0.values().all(|&label| label < 75));

  // Foreign leaves across the cut carry their owner's labels.
  assert_eq!(foreign0.len(), 16);
  assert!(foreign0.iter().all(|&(leaf, label)| leaf >= 32 && label == leaf));
  assert!(foreign1.iter().all(|&(leaf, label)| leaf < 32 && label == leaf));
}
