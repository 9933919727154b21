//! Process-group abstraction for SPMD partitions.
//!
//! Every partition runs the same sequential algorithm over its share of the
//! leaves. Collective calls on a [`Communicator`] are synchronisation points:
//! every rank has to make the same calls in the same order.
//!
//! # Implementations
//!
//! - [`SerialCommunicator`]: a single partition, collectives are local.
//! - [`ChannelCommunicator`]: in-process partitions connected by crossbeam
//!   channels, started with [`run_partitioned`] on a rayon pool.

mod channel;
pub mod decompose;
mod serial;

pub use channel::{run_partitioned, ChannelCommunicator};
pub use decompose::{Decomposer, MortonDecomposer};
pub use serial::SerialCommunicator;

use crate::error::{MeshError, Result};

/// Collective operations over a group of partitions.
pub trait Communicator {
  fn rank(&self) -> usize;

  fn size(&self) -> usize;

  /// Send `outgoing[r]` to rank `r` and receive one bucket from every rank,
  /// indexed by sender.
  fn all_to_all<T: Send + 'static>(&self, outgoing: Vec<Vec<T>>) -> Result<Vec<Vec<T>>>;

  #[inline]
  fn is_parallel(&self) -> bool {
    self.size() > 1
  }

  /// Every rank's value, indexed by rank.
  fn all_gather<T: Clone + Send + 'static>(&self, value: T) -> Result<Vec<T>> {
    let outgoing = (0..self.size()).map(|_| vec![value.clone()]).collect();
    self
      .all_to_all(outgoing)?
      .into_iter()
      .enumerate()
      .map(|(from, mut bucket)| {
        bucket.pop().ok_or_else(|| MeshError::Desynchronized {
          rank: self.rank(),
          detail: format!("rank {from} contributed nothing to a gather"),
        })
      })
      .collect()
  }

  fn all_reduce_sum(&self, value: usize) -> Result<usize> {
    Ok(self.all_gather(value)?.into_iter().sum())
  }

  fn all_reduce_max(&self, value: f64) -> Result<f64> {
    Ok(self.all_gather(value)?.into_iter().fold(f64::NEG_INFINITY, f64::max))
  }

  fn all_reduce_or(&self, value: bool) -> Result<bool> {
    Ok(self.all_gather(value)?.into_iter().any(|v| v))
  }

  /// Exclusive prefix sum of `count` over ranks, plus the total.
  fn exclusive_offset(&self, count: usize) -> Result<(usize, usize)> {
    let counts = self.all_gather(count)?;
    let offset = counts[..self.rank()].iter().sum();
    Ok((offset, counts.iter().sum()))
  }

  fn barrier(&self) -> Result<()> {
    self.all_gather(())?;
    Ok(())
  }
}
