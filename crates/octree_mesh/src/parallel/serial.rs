use super::Communicator;
use crate::error::{MeshError, Result};

/// Communicator for a run with one partition.
#[derive(Clone, Copy, Debug, Default)]
pub struct SerialCommunicator;

impl Communicator for SerialCommunicator {
  fn rank(&self) -> usize {
    0
  }

  fn size(&self) -> usize {
    1
  }

  fn all_to_all<T: Send + 'static>(&self, outgoing: Vec<Vec<T>>) -> Result<Vec<Vec<T>>> {
    if outgoing.len() != 1 {
      return Err(MeshError::Desynchronized {
        rank: 0,
        detail: format!("{} buckets for a single partition", outgoing.len()),
      });
    }
    Ok(outgoing)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_serial_collectives() {
    let comm = SerialCommunicator;
    assert_eq!(comm.all_reduce_sum(7).unwrap(), 7);
    assert_eq!(comm.all_reduce_max(1.5).unwrap(), 1.5);
    assert!(!comm.all_reduce_or(false).unwrap());
    assert_eq!(comm.exclusive_offset(4).unwrap(), (0, 4));
    assert!(!comm.is_parallel());
  }

  #[test]
  fn test_serial_rejects_extra_buckets() {
    let comm = SerialCommunicator;
    assert!(comm.all_to_all(vec![vec![1], vec![2]]).is_err());
  }
}
