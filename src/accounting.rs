//! Explicit chunk accounting, owned by the coordinator rather than carried as
//! mutable state on the encoder/writer.

use laz::laszip::ChunkTableEntry;

/// A peer's running record of the chunks it has emitted so far.
#[derive(Clone, Debug, Default)]
pub struct ChunkAccounting {
    pub chunk_bytes: Vec<ChunkTableEntry>,
}

impl ChunkAccounting {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total compressed bytes recorded so far (sum over completed chunks).
    pub fn local_bytes(&self) -> u64 {
        self.chunk_bytes.iter().map(|e| e.byte_count).sum()
    }

    /// Number of chunks completed so far.
    pub fn local_chunks(&self) -> u32 {
        self.chunk_bytes.len() as u32
    }

    /// Record a completed chunk's point count and compressed byte length.
    pub fn record_chunk(&mut self, point_count: u64, byte_count: u64) {
        self.chunk_bytes.push(ChunkTableEntry {
            point_count,
            byte_count,
        });
    }
}
