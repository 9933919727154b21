//! Moving leaf ownership between partitions.
//!
//! The tree topology is replicated on every partition; only the owner of
//! each leaf differs. Redistribution therefore exchanges (leaf, new owner)
//! pairs and applies them on every replica.

use tracing::info;

use super::cube::LeafId;
use super::tree::Octree;
use crate::error::{MeshError, Result};
use crate::parallel::Communicator;

/// Number of leaves moved between each pair of partitions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DistributionMap {
  /// `moved[from][to]`
  pub moved: Vec<Vec<usize>>,
}

impl DistributionMap {
  pub fn total_moved(&self) -> usize {
    self
      .moved
      .iter()
      .enumerate()
      .map(|(from, row)| row.iter().enumerate().filter(|(to, _)| *to != from).map(|(_, n)| n).sum::<usize>())
      .sum()
  }

  pub fn sent_from(&self, rank: usize) -> usize {
    self.moved[rank].iter().enumerate().filter(|(to, _)| *to != rank).map(|(_, n)| n).sum()
  }

  pub fn received_by(&self, rank: usize) -> usize {
    self
      .moved
      .iter()
      .enumerate()
      .filter(|(from, _)| *from != rank)
      .map(|(_, row)| row[rank])
      .sum()
  }
}

impl Octree {
  /// Give `leaves` (owned by this rank) the owners in `assignment`.
  /// Collective; every replica ends up with the same ownership.
  pub fn redistribute<C: Communicator>(
    &mut self,
    comm: &C,
    leaves: &[LeafId],
    assignment: &[usize],
  ) -> Result<DistributionMap> {
    if leaves.len() != assignment.len() {
      return Err(MeshError::Config(format!(
        "{} leaves but {} assignments",
        leaves.len(),
        assignment.len()
      )));
    }

    let n_parts = comm.size();
    let changes: Vec<(LeafId, usize)> = leaves
      .iter()
      .zip(assignment)
      .map(|(&leaf, &to)| (leaf, to.min(n_parts - 1)))
      .collect();

    let mut moved = vec![vec![0; n_parts]; n_parts];
    for (from, bucket) in comm.all_gather(changes)?.into_iter().enumerate() {
      for (leaf, to) in bucket {
        if leaf >= self.number_of_leaves() || self.owner(leaf) != from {
          return Err(MeshError::Desynchronized {
            rank: comm.rank(),
            detail: format!("rank {from} moved leaf {leaf} it does not own"),
          });
        }
        moved[from][to] += 1;
        self.set_owner(leaf, to);
      }
    }

    let map = DistributionMap { moved };
    info!(
      moved = map.total_moved(),
      local = self.owned_leaves(comm.rank()).count(),
      "redistributed leaves"
    );
    Ok(map)
  }
}

#[cfg(test)]
mod tests {
  use glam::DVec3;

  use super::*;
  use crate::geometry::BoundBox;
  use crate::parallel::{run_partitioned, SerialCommunicator};

  #[test]
  fn test_serial_redistribution_keeps_owner() {
    let mut tree = Octree::new(BoundBox::new(DVec3::ZERO, DVec3::ONE));
    tree.refine_leaf(0).unwrap();
    let leaves: Vec<LeafId> = (0..8).collect();

    let map = tree.redistribute(&SerialCommunicator, &leaves, &[0; 8]).unwrap();
    assert_eq!(map.total_moved(), 0);
    assert!((0..8).all(|leaf| tree.owner(leaf) == 0));
  }

  #[test]
  fn test_replicas_agree_after_redistribution() {
    let owners = run_partitioned(2, |comm| {
      let mut tree = Octree::new(BoundBox::new(DVec3::ZERO, DVec3::ONE));
      tree.refine_leaf(0)?;
      tree.distribute_leaves(2);

      // Rank 0 hands its last leaf to rank 1.
      let mine: Vec<LeafId> = tree.owned_leaves(comm.rank()).collect();
      let assignment: Vec<usize> = mine
        .iter()
        .map(|&leaf| if leaf == 3 { 1 } else { comm.rank() })
        .collect();
      let map = tree.redistribute(&comm, &mine, &assignment)?;
      assert_eq!(map.sent_from(0), 1);
      assert_eq!(map.received_by(1), 1);
      Ok::<_, MeshError>((0..8).map(|leaf| tree.owner(leaf)).collect::<Vec<_>>())
    })
    .unwrap();

    let first = owners[0].as_ref().expect("rank 0");
    assert_eq!(first, owners[1].as_ref().expect("rank 1"));
    assert_eq!(first, &vec![0, 0, 0, 1, 1, 1, 1, 1]);
  }
}
