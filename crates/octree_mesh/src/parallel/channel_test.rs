use super::*;

// =========================================================================
// Collectives over in-process partitions
// =========================================================================

/// Reductions see every rank's contribution.
#[test]
fn test_reductions() {
  let results = run_partitioned(4, |comm| {
    let sum = comm.all_reduce_sum(comm.rank() + 1)?;
    let max = comm.all_reduce_max(comm.rank() as f64)?;
    let any = comm.all_reduce_or(comm.rank() == 2)?;
    let offset = comm.exclusive_offset(10 * (comm.rank() + 1))?;
    comm.barrier()?;
    Ok::<_, MeshError>((sum, max, any, offset))
  })
  .expect("pool starts");

  for (rank, result) in results.into_iter().enumerate() {
    let (sum, max, any, (offset, total)) = result.expect("collectives succeed");
    assert_eq!(sum, 10);
    assert_eq!(max, 3.0);
    assert!(any);
    assert_eq!(total, 100);
    let expected_offset: usize = (0..rank).map(|r| 10 * (r + 1)).sum();
    assert_eq!(offset, expected_offset, "rank {} offset", rank);
  }
}

/// Buckets reach the rank they were addressed to, tagged by sender.
#[test]
fn test_all_to_all_routing() {
  let results = run_partitioned(3, |comm| {
    let outgoing = (0..comm.size())
      .map(|to| vec![(comm.rank(), to)])
      .collect();
    comm.all_to_all(outgoing)
  })
  .expect("pool starts");

  for (rank, incoming) in results.into_iter().enumerate() {
    let incoming = incoming.expect("exchange succeeds");
    for (from, bucket) in incoming.iter().enumerate() {
      assert_eq!(bucket, &vec![(from, rank)]);
    }
  }
}

/// Back-to-back collectives do not mix up messages from fast ranks.
#[test]
fn test_many_collectives_in_sequence() {
  let results = run_partitioned(4, |comm| {
    let mut acc = 0;
    for round in 0..50 {
      acc += comm.all_reduce_sum(round * comm.rank())?;
    }
    Ok::<_, MeshError>(acc)
  })
  .expect("pool starts");

  let expected: usize = (0..50).map(|round| round * 6).sum();
  for result in results {
    assert_eq!(result.expect("collectives succeed"), expected);
  }
}

/// Ranks that finish and hang up while slower peers are still collecting
/// the same exchange do not fail those peers.
#[test]
fn test_early_finishers_do_not_break_slow_peers() {
  let failures: usize = std::thread::scope(|scope| {
    let groups: Vec<_> = (0..6)
      .map(|_| {
        scope.spawn(|| {
          let mut failures = 0;
          for _ in 0..40 {
            let results = run_partitioned(6, |comm| {
              let outgoing = (0..comm.size()).map(|to| vec![(comm.rank() * 10 + to) as u64; 500]).collect();
              comm.all_to_all(outgoing).map(|incoming| incoming.len())
            })
            .expect("pool starts");
            failures += results.iter().filter(|r| !matches!(r, Ok(6))).count();
          }
          failures
        })
      })
      .collect();
    groups.into_iter().map(|g| g.join().expect("group thread")).sum()
  });
  assert_eq!(failures, 0);
}

/// Ranks disagreeing on the payload type fail instead of hanging.
#[test]
fn test_type_mismatch_is_fatal() {
  let results = run_partitioned(2, |comm| {
    if comm.rank() == 0 {
      comm.all_gather(1u32).map(|_| ())
    } else {
      comm.all_gather(String::from("one")).map(|_| ())
    }
  })
  .expect("pool starts");

  for result in results {
    assert!(matches!(result, Err(MeshError::Desynchronized { .. })));
  }
}

/// A rank that leaves early makes its peers fail on the next collective.
#[test]
fn test_missing_collective_is_reported() {
  let results = run_partitioned(2, |comm| {
    comm.barrier()?;
    if comm.rank() == 0 {
      comm.barrier()?;
    }
    Ok::<_, MeshError>(())
  })
  .expect("pool starts");

  assert!(matches!(results[0], Err(MeshError::Disconnected { rank: 1 })));
  assert!(results[1].is_ok());
}
