//! In-process partitions connected by crossbeam channels.
//!
//! Each rank owns one receiver and a sender to every rank. Payloads are
//! type-erased (`Box<dyn Any + Send>`) and tagged with the sequence number
//! of the collective call, so a rank that is already one collective ahead
//! cannot be confused with the current one.

use std::any::Any;
use std::cell::{Cell, RefCell};

use crossbeam_channel::{self as channel, Receiver, Sender};
use tracing::{debug, warn};

use super::Communicator;
use crate::error::{MeshError, Result};

/// Sequence number announcing that a rank has left the group.
const HANGUP: u64 = u64::MAX;

struct Envelope {
  from: usize,
  seq: u64,
  payload: Box<dyn Any + Send>,
}

/// One rank of an in-process partition group.
pub struct ChannelCommunicator {
  rank: usize,
  size: usize,
  senders: Vec<Sender<Envelope>>,
  receiver: Receiver<Envelope>,
  seq: Cell<u64>,
  /// Messages that arrived for a later collective.
  early: RefCell<Vec<Envelope>>,
  /// Ranks that have hung up. Their last collective may still be pending
  /// here.
  departed: RefCell<Vec<bool>>,
}

impl ChannelCommunicator {
  /// Create a fully connected group of `size` ranks.
  pub fn group(size: usize) -> Vec<Self> {
    let (senders, receivers): (Vec<_>, Vec<_>) = (0..size).map(|_| channel::unbounded()).unzip();
    receivers
      .into_iter()
      .enumerate()
      .map(|(rank, receiver)| Self {
        rank,
        size,
        senders: senders.clone(),
        receiver,
        seq: Cell::new(0),
        early: RefCell::new(Vec::new()),
        departed: RefCell::new(vec![false; size]),
      })
      .collect()
  }

  fn desync(&self, detail: String) -> MeshError {
    MeshError::Desynchronized {
      rank: self.rank,
      detail,
    }
  }

  fn accept<T: 'static>(&self, envelope: Envelope, incoming: &mut [Option<Vec<T>>]) -> Result<()> {
    let from = envelope.from;
    let bucket = envelope
      .payload
      .downcast::<Vec<T>>()
      .map_err(|_| self.desync(format!("rank {from} sent a payload of another type")))?;
    if incoming[from].replace(*bucket).is_some() {
      return Err(self.desync(format!("rank {from} sent twice in one collective")));
    }
    Ok(())
  }

  fn missing_departed<T>(&self, incoming: &[Option<Vec<T>>]) -> Option<usize> {
    self
      .departed
      .borrow()
      .iter()
      .enumerate()
      .find_map(|(from, &gone)| (gone && incoming[from].is_none()).then_some(from))
  }
}

impl Communicator for ChannelCommunicator {
  fn rank(&self) -> usize {
    self.rank
  }

  fn size(&self) -> usize {
    self.size
  }

  fn all_to_all<T: Send + 'static>(&self, outgoing: Vec<Vec<T>>) -> Result<Vec<Vec<T>>> {
    if outgoing.len() != self.size {
      return Err(self.desync(format!("{} buckets for {} ranks", outgoing.len(), self.size)));
    }
    let seq = self.seq.get();
    self.seq.set(seq + 1);

    for (to, bucket) in outgoing.into_iter().enumerate() {
      let envelope = Envelope {
        from: self.rank,
        seq,
        payload: Box::new(bucket),
      };
      self.senders[to]
        .send(envelope)
        .map_err(|_| MeshError::Disconnected { rank: self.rank })?;
    }

    let mut incoming: Vec<Option<Vec<T>>> = (0..self.size).map(|_| None).collect();
    let mut remaining = self.size;

    let early = std::mem::take(&mut *self.early.borrow_mut());
    for envelope in early {
      if envelope.seq == seq {
        self.accept(envelope, &mut incoming)?;
        remaining -= 1;
      } else {
        self.early.borrow_mut().push(envelope);
      }
    }

    // A departed rank sends nothing after its hangup.
    if let Some(from) = self.missing_departed(&incoming) {
      return Err(MeshError::Disconnected { rank: from });
    }

    while remaining > 0 {
      let envelope = self
        .receiver
        .recv()
        .map_err(|_| MeshError::Disconnected { rank: self.rank })?;
      match envelope.seq {
        HANGUP => {
          let from = envelope.from;
          self.departed.borrow_mut()[from] = true;
          if incoming[from].is_none() {
            return Err(MeshError::Disconnected { rank: from });
          }
        }
        s if s == seq => {
          self.accept(envelope, &mut incoming)?;
          remaining -= 1;
        }
        s if s > seq => self.early.borrow_mut().push(envelope),
        s => {
          return Err(self.desync(format!(
            "rank {} is at collective {} while this rank is at {}",
            envelope.from, s, seq
          )))
        }
      }
    }

    incoming
      .into_iter()
      .map(|bucket| bucket.ok_or_else(|| self.desync("missing bucket".to_string())))
      .collect()
  }
}

impl Drop for ChannelCommunicator {
  fn drop(&mut self) {
    // Peers still waiting on this rank get an error instead of blocking.
    for (to, sender) in self.senders.iter().enumerate() {
      if to != self.rank {
        let _ = sender.send(Envelope {
          from: self.rank,
          seq: HANGUP,
          payload: Box::new(()),
        });
      }
    }
  }
}

/// Run `job` once per rank on a dedicated rayon pool with one thread per
/// partition, returning the results ordered by rank.
pub fn run_partitioned<F, R>(n_partitions: usize, job: F) -> Result<Vec<R>>
where
  F: Fn(ChannelCommunicator) -> R + Sync,
  R: Send,
{
  let n_partitions = n_partitions.max(1);
  let pool = rayon::ThreadPoolBuilder::new()
    .num_threads(n_partitions)
    .thread_name(|i| format!("partition-{i}"))
    .build()
    .map_err(|e| MeshError::Config(format!("cannot start partition pool: {e}")))?;

  debug!(n_partitions, "starting partitions");
  let (tx, rx) = channel::unbounded();
  pool.scope(|scope| {
    for comm in ChannelCommunicator::group(n_partitions) {
      let tx = tx.clone();
      let job = &job;
      scope.spawn(move |_| {
        let rank = comm.rank();
        let result = job(comm);
        if tx.send((rank, result)).is_err() {
          warn!(rank, "partition result dropped");
        }
      });
    }
  });
  drop(tx);

  let mut results: Vec<(usize, R)> = rx.iter().collect();
  results.sort_by_key(|(rank, _)| *rank);
  Ok(results.into_iter().map(|(_, r)| r).collect())
}

#[cfg(test)]
#[path = "channel_test.rs"]
mod channel_test;
