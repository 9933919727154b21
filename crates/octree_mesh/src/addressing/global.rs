//! Global numbering of points, faces and leaves across partitions.
//!
//! Shared entities are found by exchanging keys with the ranks that own
//! cubes around them. The lowest sharing rank owns the canonical label;
//! every rank numbers the entities it owns in one contiguous range.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use smallvec::{smallvec, SmallVec};
use tracing::debug;

use super::OctreeAddressing;
use crate::error::{MeshError, Result};
use crate::octree::{LeafId, NodeKey};
use crate::parallel::Communicator;

/// Global labels of one kind of entity.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GlobalNumbering {
  /// Global label per local entity; `None` where this rank has no label.
  pub global_label: Vec<Option<usize>>,
  /// Local entity of every shared global label.
  pub global_to_local: HashMap<usize, usize>,
  /// Sharing ranks (this one included) of shared entities; empty otherwise.
  pub at_procs: Vec<SmallVec<[usize; 4]>>,
  /// Number of distinct entities over all ranks.
  pub n_global: usize,
}

impl GlobalNumbering {
  #[inline]
  pub fn label(&self, local: usize) -> Option<usize> {
    self.global_label.get(local).copied().flatten()
  }

  #[inline]
  pub fn is_shared(&self, local: usize) -> bool {
    !self.at_procs[local].is_empty()
  }

  pub fn n_shared(&self) -> usize {
    self.global_to_local.len()
  }
}

/// Number entities identified by `keys`; `candidates` lists the other
/// ranks that may hold each entity. Collective.
fn number_shared_entities<C, K>(comm: &C, keys: &[K], candidates: &[SmallVec<[usize; 4]>]) -> Result<GlobalNumbering>
where
  C: Communicator,
  K: Clone + Eq + Hash + Send + 'static,
{
  let me = comm.rank();
  let n_parts = comm.size();

  let mut outgoing: Vec<Vec<K>> = vec![Vec::new(); n_parts];
  for (key, ranks) in keys.iter().zip(candidates) {
    for &r in ranks.iter().filter(|&&r| r != me) {
      outgoing[r].push(key.clone());
    }
  }
  let received: Vec<HashSet<K>> = comm
    .all_to_all(outgoing)?
    .into_iter()
    .map(|bucket| bucket.into_iter().collect())
    .collect();

  // Shared with `r` only when both sides expected it.
  let at_procs: Vec<SmallVec<[usize; 4]>> = keys
    .iter()
    .zip(candidates)
    .map(|(key, ranks)| {
      let mut procs: SmallVec<[usize; 4]> = ranks
        .iter()
        .copied()
        .filter(|&r| r != me && received[r].contains(key))
        .collect();
      if procs.is_empty() {
        return procs;
      }
      procs.push(me);
      procs.sort_unstable();
      procs.dedup();
      procs
    })
    .collect();

  let owned = |i: usize| at_procs[i].first().map_or(true, |&lowest| lowest == me);
  let n_owned = (0..keys.len()).filter(|&i| owned(i)).count();
  let (offset, n_global) = comm.exclusive_offset(n_owned)?;

  let mut global_label = vec![None; keys.len()];
  let mut next = offset;
  let mut outgoing: Vec<Vec<(K, usize)>> = vec![Vec::new(); n_parts];
  for i in (0..keys.len()).filter(|&i| owned(i)) {
    global_label[i] = Some(next);
    for &r in at_procs[i].iter().filter(|&&r| r != me) {
      outgoing[r].push((keys[i].clone(), next));
    }
    next += 1;
  }

  let local_of: HashMap<&K, usize> = keys.iter().enumerate().map(|(i, k)| (k, i)).collect();
  for (from, bucket) in comm.all_to_all(outgoing)?.into_iter().enumerate() {
    for (key, label) in bucket {
      let local = local_of.get(&key).copied().filter(|&i| at_procs[i].first() == Some(&from));
      let Some(local) = local else {
        return Err(MeshError::Desynchronized {
          rank: me,
          detail: format!("rank {from} sent a label for an entity it does not own here"),
        });
      };
      global_label[local] = Some(label);
    }
  }

  let mut global_to_local = HashMap::new();
  for (i, procs) in at_procs.iter().enumerate() {
    if procs.is_empty() {
      continue;
    }
    let Some(label) = global_label[i] else {
      return Err(MeshError::Desynchronized {
        rank: me,
        detail: format!("no global label received for shared entity {i}"),
      });
    };
    global_to_local.insert(label, i);
  }

  Ok(GlobalNumbering {
    global_label,
    global_to_local,
    at_procs,
    n_global,
  })
}

impl OctreeAddressing<'_> {
  #[tracing::instrument(skip_all, name = "addressing::global_point_labels")]
  pub(super) fn calc_global_point_labels<C: Communicator>(&self, comm: &C) -> Result<GlobalNumbering> {
    let me = comm.rank();
    let keys: Vec<NodeKey> = (0..self.number_of_nodes()).map(|node| self.node_key(node)).collect();
    let candidates: Vec<SmallVec<[usize; 4]>> = self
      .node_leaves()
      .iter()
      .map(|around| {
        let mut ranks: SmallVec<[usize; 4]> = around
          .iter()
          .flatten()
          .filter(|&&leaf| self.is_mesh_cube(leaf))
          .map(|&leaf| self.octree.owner(leaf))
          .filter(|&r| r != me)
          .collect();
        ranks.sort_unstable();
        ranks.dedup();
        ranks
      })
      .collect();

    let numbering = number_shared_entities(comm, &keys, &candidates)?;
    debug!(
      points = keys.len(),
      shared = numbering.n_shared(),
      global = numbering.n_global,
      "global point labels"
    );
    Ok(numbering)
  }

  /// Remote mesh leaf across a face, if the face is a processor face.
  pub fn processor_face_leaf(&self, face: usize) -> Option<LeafId> {
    let far = self.octree_face_far_leaf()[face]?;
    let remote = self.octree_face_neighbour()[face].is_none()
      && self.is_mesh_cube(far)
      && self.octree.owner(far) != self.settings.rank;
    remote.then_some(far)
  }

  #[tracing::instrument(skip_all, name = "addressing::global_face_labels")]
  pub(super) fn calc_global_face_labels<C: Communicator>(&self, comm: &C) -> Result<GlobalNumbering> {
    let faces = self.octree_faces();
    let keys: Vec<(NodeKey, NodeKey)> = faces
      .iter()
      .map(|face| {
        let corners = face.map(|node| self.node_key(node));
        let lo = std::array::from_fn(|axis| corners.iter().map(|k| k[axis]).min().unwrap_or(0));
        let hi = std::array::from_fn(|axis| corners.iter().map(|k| k[axis]).max().unwrap_or(0));
        (lo, hi)
      })
      .collect();
    let candidates: Vec<SmallVec<[usize; 4]>> = (0..faces.len())
      .map(|face| match self.processor_face_leaf(face) {
        Some(far) => smallvec![self.octree.owner(far)],
        None => SmallVec::new(),
      })
      .collect();

    let numbering = number_shared_entities(comm, &keys, &candidates)?;
    debug!(
      faces = keys.len(),
      shared = numbering.n_shared(),
      global = numbering.n_global,
      "global face labels"
    );
    Ok(numbering)
  }

  /// Labels for owned mesh leaves and for remote leaves across processor
  /// faces.
  #[tracing::instrument(skip_all, name = "addressing::global_leaf_labels")]
  pub(super) fn calc_global_leaf_labels<C: Communicator>(&self, comm: &C) -> Result<GlobalNumbering> {
    let me = comm.rank();
    let n_leaves = self.octree.number_of_leaves();
    let mesh_leaves: Vec<LeafId> = (0..n_leaves).filter(|&leaf| self.is_local_mesh_cube(leaf)).collect();
    let (offset, n_global) = comm.exclusive_offset(mesh_leaves.len())?;

    let mut global_label = vec![None; n_leaves];
    for (i, &leaf) in mesh_leaves.iter().enumerate() {
      global_label[leaf] = Some(offset + i);
    }

    let mut at_procs: Vec<SmallVec<[usize; 4]>> = vec![SmallVec::new(); n_leaves];
    let mut outgoing: Vec<Vec<(LeafId, usize)>> = vec![Vec::new(); comm.size()];
    let owner = self.octree_face_owner();
    for face in 0..owner.len() {
      let Some(far) = self.processor_face_leaf(face) else {
        continue;
      };
      let (local, remote) = (owner[face], self.octree.owner(far));
      if let Some(label) = global_label[local] {
        outgoing[remote].push((local, label));
      }
      for (leaf, procs) in [(local, [me, remote]), (far, [remote, me])] {
        at_procs[leaf].extend(procs);
      }
    }
    for procs in &mut at_procs {
      procs.sort_unstable();
      procs.dedup();
    }

    for (from, bucket) in comm.all_to_all(outgoing)?.into_iter().enumerate() {
      for (leaf, label) in bucket {
        if leaf >= n_leaves || self.octree.owner(leaf) != from {
          return Err(MeshError::Desynchronized {
            rank: me,
            detail: format!("rank {from} labelled leaf {leaf} it does not own"),
          });
        }
        global_label[leaf] = Some(label);
      }
    }

    let mut global_to_local = HashMap::new();
    for (leaf, procs) in at_procs.iter().enumerate() {
      if procs.is_empty() {
        continue;
      }
      match global_label[leaf] {
        Some(label) => {
          global_to_local.insert(label, leaf);
        }
        None => {
          return Err(MeshError::Desynchronized {
            rank: me,
            detail: format!("no global label received for leaf {leaf}"),
          })
        }
      }
    }

    debug!(cells = mesh_leaves.len(), global = n_global, "global leaf labels");
    Ok(GlobalNumbering {
      global_label,
      global_to_local,
      at_procs,
      n_global,
    })
  }
}
