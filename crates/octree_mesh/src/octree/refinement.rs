//! Consistent refinement: closing a candidate set under the 2:1 rule.
//!
//! # Neighbour Enforcement
//!
//! After refining a leaf its children sit one level deeper. Any face or
//! edge neighbour more than one level coarser than those children would
//! break the balance, so it has to be refined in the same pass. The closure
//! is computed breadth first until no more leaves are added; the tree
//! itself is only mutated later through [`Octree::refine_selected`], so the
//! caller can check the cell budget first.

use std::collections::VecDeque;

use tracing::debug;

use super::coordinates::{EDGE_OFFSETS, FACE_OFFSETS};
use super::cube::LeafId;
use super::tree::{Lookup, Octree};

impl Octree {
  /// Extend `candidates` until refining exactly the returned set keeps the
  /// tree balanced. Returns sorted leaf ids.
  ///
  /// With `allow_split_hex == false` refinement proceeds per parent block:
  /// once a leaf is selected its leaf siblings are selected as well.
  pub fn consistent_refinement(&self, candidates: &[LeafId], allow_split_hex: bool) -> Vec<LeafId> {
    let n_leaves = self.number_of_leaves();
    let mut selected = vec![false; n_leaves];
    let mut queue: VecDeque<LeafId> = VecDeque::new();

    for &leaf in candidates {
      debug_assert!(leaf < n_leaves, "candidate {leaf} is not a leaf");
      if leaf < n_leaves && !selected[leaf] {
        selected[leaf] = true;
        queue.push_back(leaf);
      }
    }

    let mut n_added = 0usize;
    while let Some(leaf) = queue.pop_front() {
      let coordinates = self.leaf_coordinates(leaf);

      for &offset in FACE_OFFSETS.iter().chain(EDGE_OFFSETS.iter()) {
        if let Lookup::Leaf(nei) = self.find_leaf(coordinates.offset(offset)) {
          if self.leaf_level(nei) < coordinates.level && !selected[nei] {
            selected[nei] = true;
            queue.push_back(nei);
            n_added += 1;
          }
        }
      }

      if !allow_split_hex {
        for sibling in self.leaf_siblings(leaf) {
          if !selected[sibling] {
            selected[sibling] = true;
            queue.push_back(sibling);
            n_added += 1;
          }
        }
      }
    }

    debug!(candidates = candidates.len(), added = n_added, "consistent refinement");
    selected
      .iter()
      .enumerate()
      .filter_map(|(leaf, &s)| s.then_some(leaf))
      .collect()
  }

  /// Grow a leaf set by `n_layers` rings of face, edge and vertex
  /// neighbours. Returns sorted leaf ids.
  pub fn mark_additional_layers(&self, leaves: &[LeafId], n_layers: usize) -> Vec<LeafId> {
    let mut selected = vec![false; self.number_of_leaves()];
    let mut front: Vec<LeafId> = Vec::with_capacity(leaves.len());
    for &leaf in leaves {
      if !selected[leaf] {
        selected[leaf] = true;
        front.push(leaf);
      }
    }

    for _ in 0..n_layers {
      let mut next = Vec::new();
      for &leaf in &front {
        for nei in self.all_neighbour_leaves(leaf) {
          if !selected[nei] {
            selected[nei] = true;
            next.push(nei);
          }
        }
      }
      if next.is_empty() {
        break;
      }
      front = next;
    }

    selected
      .iter()
      .enumerate()
      .filter_map(|(leaf, &s)| s.then_some(leaf))
      .collect()
  }

  /// Siblings of `leaf` that are leaves themselves.
  fn leaf_siblings(&self, leaf: LeafId) -> impl Iterator<Item = LeafId> + '_ {
    let parent = self.leaf(leaf).parent;
    parent
      .and_then(|p| self.cube(p).first_child)
      .into_iter()
      .flat_map(|first| first..first + 8)
      .filter_map(move |cube| {
        let c = self.cube(cube);
        if c.is_leaf() { c.leaf } else { None }
      })
      .filter(move |&sibling| sibling != leaf)
  }
}

#[cfg(test)]
#[path = "refinement_test.rs"]
mod refinement_test;
