//! Message-passing substrate: barrier, all-gather, gather-to-root, broadcast
//! and point-to-point send/recv, realized as an in-process thread cohort
//! rather than a binding to a real MPI runtime.
//!
//! Built on a pending-count Mutex+Condvar pattern, turned into a reusable,
//! abortable multi-phase barrier instead of a one-shot work queue.

use laz::laszip::ChunkTableEntry;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use crate::error::{Error, Result};

/// A barrier that every peer can also abort: a peer that hits a fatal error
/// releases everyone else currently waiting instead of leaving them to hang
/// forever.
struct AbortableBarrier {
    peers: usize,
    count: Mutex<(usize, u64)>,
    cv: Condvar,
}

impl AbortableBarrier {
    fn new(peers: usize) -> Self {
        Self {
            peers,
            count: Mutex::new((0, 0)),
            cv: Condvar::new(),
        }
    }

    /// Returns `true` if every peer reached this generation of the barrier,
    /// `false` if it was released early by an abort. The generation check is
    /// always evaluated before the abort flag, so a peer that arrives after
    /// the barrier has genuinely completed never reports a spurious abort
    /// just because some *later* step aborted in the meantime.
    fn wait(&self, aborted: &AtomicBool) -> bool {
        let mut guard = self.count.lock().unwrap();
        let my_generation = guard.1;
        guard.0 += 1;
        if guard.0 == self.peers {
            guard.0 = 0;
            guard.1 += 1;
            self.cv.notify_all();
            true
        } else {
            loop {
                if guard.1 != my_generation {
                    return true;
                }
                if aborted.load(Ordering::SeqCst) {
                    return false;
                }
                guard = self.cv.wait(guard).unwrap();
            }
        }
    }

    fn release_all(&self) {
        self.cv.notify_all();
    }
}

/// A single-shot value that one peer sets and every peer (including the
/// setter) can block-read, used for broadcast and single-pair send/recv.
struct OnceSignal<T> {
    value: Mutex<Option<T>>,
    cv: Condvar,
}

impl<T: Clone> OnceSignal<T> {
    fn new() -> Self {
        Self {
            value: Mutex::new(None),
            cv: Condvar::new(),
        }
    }

    fn set(&self, v: T) {
        *self.value.lock().unwrap() = Some(v);
        self.cv.notify_all();
    }

    /// The value, once set, is returned regardless of the abort flag: a
    /// value-set is checked before abort on every wakeup so a peer can never
    /// observe a spurious abort for a signal that already has its answer.
    fn get(&self, aborted: &AtomicBool) -> Option<T> {
        let mut guard = self.value.lock().unwrap();
        loop {
            if let Some(v) = guard.as_ref() {
                return Some(v.clone());
            }
            if aborted.load(Ordering::SeqCst) {
                return None;
            }
            guard = self.cv.wait(guard).unwrap();
        }
    }
}

/// A round of per-rank slots, filled once by each peer and then read back by
/// every peer (all-gather) or by a single root (gather).
struct RoundBoard<T> {
    slots: Mutex<Vec<Option<T>>>,
    cv: Condvar,
}

impl<T: Clone> RoundBoard<T> {
    fn new(peers: usize) -> Self {
        Self {
            slots: Mutex::new(vec![None; peers]),
            cv: Condvar::new(),
        }
    }

    fn submit(&self, rank: usize, value: T) {
        let mut slots = self.slots.lock().unwrap();
        slots[rank] = Some(value);
        self.cv.notify_all();
    }

    /// All slots filled is checked before the abort flag on every wakeup, so
    /// a round that every peer genuinely completed is never reported as
    /// aborted just because some later step failed in the meantime.
    fn collect_all(&self, aborted: &AtomicBool) -> Option<Vec<T>> {
        let mut slots = self.slots.lock().unwrap();
        loop {
            if slots.iter().all(Option::is_some) {
                return Some(slots.iter().cloned().map(Option::unwrap).collect());
            }
            if aborted.load(Ordering::SeqCst) {
                return None;
            }
            slots = self.cv.wait(slots).unwrap();
        }
    }
}

struct CohortShared {
    peers: u32,
    barrier: AbortableBarrier,
    npoints_board: RoundBoard<u64>,
    bytes_board: RoundBoard<u64>,
    chunks_board: RoundBoard<u32>,
    chunk_bytes_board: RoundBoard<Vec<ChunkTableEntry>>,
    header_end_signal: OnceSignal<u64>,
    table_pos_signal: OnceSignal<u64>,
    aborted: AtomicBool,
    abort_rank: AtomicI64,
}

/// A peer's handle onto the shared cohort state.
#[derive(Clone)]
pub struct Cohort {
    rank: u32,
    shared: Arc<CohortShared>,
}

impl Cohort {
    /// Builds `peers` handles, one per rank, sharing the same underlying
    /// synchronization state. Call sites spawn one thread per returned handle.
    pub fn new_cohort(peers: u32) -> Vec<Cohort> {
        let shared = Arc::new(CohortShared {
            peers,
            barrier: AbortableBarrier::new(peers as usize),
            npoints_board: RoundBoard::new(peers as usize),
            bytes_board: RoundBoard::new(peers as usize),
            chunks_board: RoundBoard::new(peers as usize),
            chunk_bytes_board: RoundBoard::new(peers as usize),
            header_end_signal: OnceSignal::new(),
            table_pos_signal: OnceSignal::new(),
            aborted: AtomicBool::new(false),
            abort_rank: AtomicI64::new(-1),
        });
        (0..peers)
            .map(|rank| Cohort {
                rank,
                shared: shared.clone(),
            })
            .collect()
    }

    pub fn rank(&self) -> u32 {
        self.rank
    }

    pub fn peers(&self) -> u32 {
        self.shared.peers
    }

    fn check_aborted(&self) -> Result<()> {
        if self.shared.aborted.load(Ordering::SeqCst) {
            Err(Error::CollectiveFailure {
                aborting_rank: self.shared.abort_rank.load(Ordering::SeqCst).max(0) as u32,
            })
        } else {
            Ok(())
        }
    }

    /// Aborts the whole cohort. Called by the first peer to detect a fatal
    /// error; releases every other peer blocked anywhere in the substrate.
    pub fn abort(&self) {
        if !self.shared.aborted.swap(true, Ordering::SeqCst) {
            self.shared.abort_rank.store(self.rank as i64, Ordering::SeqCst);
        }
        self.shared.barrier.release_all();
        self.shared.npoints_board.cv.notify_all();
        self.shared.bytes_board.cv.notify_all();
        self.shared.chunks_board.cv.notify_all();
        self.shared.chunk_bytes_board.cv.notify_all();
        self.shared.header_end_signal.cv.notify_all();
        self.shared.table_pos_signal.cv.notify_all();
    }

    pub fn barrier(&self) -> Result<()> {
        if self.shared.barrier.wait(&self.shared.aborted) {
            Ok(())
        } else {
            self.check_aborted()
        }
    }

    /// All-gather of each peer's source point count, used at job start to
    /// detect `PartitionMismatch`.
    pub fn all_gather_npoints(&self, value: u64) -> Result<Vec<u64>> {
        self.shared.npoints_board.submit(self.rank as usize, value);
        self.shared
            .npoints_board
            .collect_all(&self.shared.aborted)
            .ok_or_else(|| self.check_aborted().unwrap_err())
    }

    /// All-gather of `local_bytes`.
    pub fn all_gather_bytes(&self, value: u64) -> Result<Vec<u64>> {
        self.shared.bytes_board.submit(self.rank as usize, value);
        self.shared
            .bytes_board
            .collect_all(&self.shared.aborted)
            .ok_or_else(|| self.check_aborted().unwrap_err())
    }

    /// Gather-to-last-rank of `local_chunks`. Returns `Some` only on the last
    /// rank.
    pub fn gather_chunks_to_last(&self, value: u32) -> Result<Option<Vec<u32>>> {
        self.shared.chunks_board.submit(self.rank as usize, value);
        if self.rank + 1 == self.peers() {
            let all = self
                .shared
                .chunks_board
                .collect_all(&self.shared.aborted)
                .ok_or_else(|| self.check_aborted().unwrap_err())?;
            Ok(Some(all))
        } else {
            self.check_aborted()?;
            Ok(None)
        }
    }

    /// Send-to-last-rank of `chunk_bytes`, tag *CHUNK_BYTES*. Returns the
    /// concatenation in rank order only on the last rank.
    pub fn send_chunk_bytes_to_last(
        &self,
        value: Vec<ChunkTableEntry>,
    ) -> Result<Option<Vec<ChunkTableEntry>>> {
        self.shared
            .chunk_bytes_board
            .submit(self.rank as usize, value);
        if self.rank + 1 == self.peers() {
            let per_peer = self
                .shared
                .chunk_bytes_board
                .collect_all(&self.shared.aborted)
                .ok_or_else(|| self.check_aborted().unwrap_err())?;
            Ok(Some(per_peer.into_iter().flatten().collect()))
        } else {
            self.check_aborted()?;
            Ok(None)
        }
    }

    /// Broadcast of `header_end` from rank 0, the peer that writes the header.
    pub fn broadcast_header_end(&self, value: Option<u64>) -> Result<u64> {
        if self.rank == 0 {
            let v = value.expect("rank 0 must supply the broadcast value");
            self.shared.header_end_signal.set(v);
        }
        self.shared
            .header_end_signal
            .get(&self.shared.aborted)
            .ok_or_else(|| self.check_aborted().unwrap_err())
    }

    /// Send-from-rank-0-to-rank-P-1 of the table position, tag *TABLE_POS*.
    /// Returns the value only on the last rank.
    pub fn send_table_pos_to_last(&self, value: Option<u64>) -> Result<Option<u64>> {
        if self.rank == 0 {
            let v = value.expect("rank 0 must supply the table position");
            self.shared.table_pos_signal.set(v);
        }
        if self.rank + 1 == self.peers() {
            let v = self
                .shared
                .table_pos_signal
                .get(&self.shared.aborted)
                .ok_or_else(|| self.check_aborted().unwrap_err())?;
            Ok(Some(v))
        } else {
            self.check_aborted()?;
            Ok(None)
        }
    }
}
