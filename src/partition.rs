//! Partitioner: derives each peer's disjoint, contiguous range of source
//! point indices.

use crate::error::{Error, Result};

/// A half-open interval `[start, end)` of source point indices owned by one peer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PeerRange {
    pub start: u64,
    pub end: u64,
}

impl PeerRange {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// LAS->LAZ: chunk-aligned "deal-one-extra-to-low-ranks" distribution of whole
/// `C`-point chunks, with the last peer additionally absorbing the trailing
/// partial chunk.
pub fn partition_las_to_laz(n_points: u64, peers: u32, rank: u32, chunk_size: u64) -> Result<PeerRange> {
    let k = n_points / chunk_size;
    let l = n_points % chunk_size;
    let peers64 = peers as u64;

    if k < peers64 {
        return Err(Error::InsufficientChunks {
            chunks: k,
            peers,
        });
    }

    let base_chunks = k / peers64;
    let extra_recipients = k % peers64;

    let chunks_for = |r: u64| -> u64 {
        if r < extra_recipients {
            base_chunks + 1
        } else {
            base_chunks
        }
    };

    let mut start = 0u64;
    for r in 0..rank as u64 {
        start += chunks_for(r) * chunk_size;
    }
    let mut end = start + chunks_for(rank as u64) * chunk_size;
    if rank == peers - 1 {
        end += l;
    }

    Ok(PeerRange { start, end })
}

/// LAZ->LAS: equal split by point count, remainder given entirely to the last peer.
pub fn partition_laz_to_las(n_points: u64, peers: u32, rank: u32) -> PeerRange {
    let peers64 = peers as u64;
    let base = n_points / peers64;
    let remainder = n_points % peers64;

    let start = base * rank as u64;
    let mut end = start + base;
    if rank == peers - 1 {
        end += remainder;
    }

    PeerRange { start, end }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranges(n: u64, p: u32, c: u64) -> Vec<PeerRange> {
        (0..p)
            .map(|r| partition_las_to_laz(n, p, r, c).unwrap())
            .collect()
    }

    #[test]
    fn s1_exact_chunks() {
        let rs = ranges(150_000, 3, 50_000);
        assert_eq!(rs, vec![
            PeerRange { start: 0, end: 50_000 },
            PeerRange { start: 50_000, end: 100_000 },
            PeerRange { start: 100_000, end: 150_000 },
        ]);
    }

    #[test]
    fn s2_trailing_partial_absorbed_by_last() {
        let rs = ranges(150_001, 3, 50_000);
        assert_eq!(rs[0].len(), 50_000);
        assert_eq!(rs[1].len(), 50_000);
        assert_eq!(rs[2].len(), 50_001);
        assert_eq!(rs[2].start, 100_000);
        assert_eq!(rs[2].end, 150_001);
    }

    #[test]
    fn s3_insufficient_chunks() {
        let err = partition_las_to_laz(100_000, 3, 0, 50_000).unwrap_err();
        assert!(matches!(
            err,
            Error::InsufficientChunks { chunks: 2, peers: 3 }
        ));
    }

    #[test]
    fn s4_uneven_chunk_distribution() {
        let rs = ranges(250_000, 3, 50_000);
        assert_eq!(rs[0].len(), 100_000);
        assert_eq!(rs[1].len(), 100_000);
        assert_eq!(rs[2].len(), 50_000);
    }

    #[test]
    fn coverage_and_contiguity() {
        for (n, p, c) in [(150_000u64, 3u32, 50_000u64), (250_000, 4, 50_000), (50_000, 1, 50_000)] {
            let rs = ranges(n, p, c);
            assert_eq!(rs[0].start, 0);
            assert_eq!(rs.last().unwrap().end, n);
            for w in rs.windows(2) {
                assert_eq!(w[0].end, w[1].start);
            }
        }
    }

    #[test]
    fn chunk_alignment_for_non_last_peers() {
        let rs = ranges(250_000, 3, 50_000);
        for r in &rs[..rs.len() - 1] {
            assert_eq!(r.start % 50_000, 0);
            assert_eq!(r.end % 50_000, 0);
        }
    }

    #[test]
    fn s5_equal_split_remainder_to_last() {
        let rs: Vec<_> = (0..3).map(|r| partition_laz_to_las(100_001, 3, r)).collect();
        assert_eq!(rs[0].len(), 33_333);
        assert_eq!(rs[1].len(), 33_333);
        assert_eq!(rs[2].len(), 33_335);
        assert_eq!(rs[0].start, 0);
        assert_eq!(rs.last().unwrap().end, 100_001);
    }
}
