//! Detection of non-manifold connections between mesh cubes.

use tracing::debug;

use super::nodes::mid_key;
use super::OctreeAddressing;
use crate::octree::LeafId;

/// Union-find over the 8 slots around a point.
struct SlotSets([usize; 8]);

impl SlotSets {
  fn new() -> Self {
    Self(std::array::from_fn(|s| s))
  }

  fn find(&mut self, mut s: usize) -> usize {
    while self.0[s] != s {
      self.0[s] = self.0[self.0[s]];
      s = self.0[s];
    }
    s
  }

  fn union(&mut self, a: usize, b: usize) {
    let (ra, rb) = (self.find(a), self.find(b));
    if ra != rb {
      self.0[ra.max(rb)] = ra.min(rb);
    }
  }
}

impl OctreeAddressing<'_> {
  /// Number of face-connected groups of mesh cubes among the 8 cells
  /// around a point. Slots differing in one bit lie on both sides of an
  /// axis plane through the point, so two mesh cubes there share a face.
  pub fn mesh_groups_around(&self, around: &[Option<LeafId>; 8]) -> usize {
    let is_mesh = |s: usize| around[s].is_some_and(|leaf| self.is_mesh_cube(leaf));
    let mut sets = SlotSets::new();
    for s in 0..8 {
      if !is_mesh(s) {
        continue;
      }
      for bit in [1, 2, 4] {
        let t = s ^ bit;
        if t > s && is_mesh(t) {
          sets.union(s, t);
        }
      }
      for t in s + 1..8 {
        if around[t] == around[s] {
          sets.union(s, t);
        }
      }
    }

    let mut roots: Vec<usize> = (0..8).filter(|&s| is_mesh(s)).map(|s| sets.find(s)).collect();
    roots.sort_unstable();
    roots.dedup();
    roots.len()
  }

  /// Leaves around every node or edge of this rank where mesh cubes meet
  /// in more than one group. Sorted and duplicate free.
  #[tracing::instrument(skip_all, name = "addressing::find_irregular_leaves")]
  pub fn find_irregular_leaves(&self) -> Vec<LeafId> {
    let mut marked: Vec<LeafId> = Vec::new();
    let mut n_nodes = 0;
    let mut n_edges = 0;

    for around in self.node_leaves() {
      if self.mesh_groups_around(around) > 1 {
        marked.extend(around.iter().flatten());
        n_nodes += 1;
      }
    }
    for &[a, b] in self.octree_edges() {
      let around = self.octree.leaves_around_point(mid_key(self.node_key(a), self.node_key(b)));
      if self.mesh_groups_around(&around) > 1 {
        marked.extend(around.iter().flatten());
        n_edges += 1;
      }
    }

    marked.sort_unstable();
    marked.dedup();
    if !marked.is_empty() {
      debug!(nodes = n_nodes, edges = n_edges, leaves = marked.len(), "irregular connections");
    }
    marked
  }
}
