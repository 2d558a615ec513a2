use thiserror::Error;

/// crate specific Result type
pub type Result<T> = std::result::Result<T, Error>;

/// crate specific Error enum
#[derive(Error, Debug)]
pub enum Error {
    /// K < P for LAS->LAZ: fewer whole chunks than peers.
    #[error("insufficient chunks: {chunks} whole chunks available for {peers} peers")]
    InsufficientChunks { chunks: u64, peers: u32 },

    /// Peers disagree on N, P or C.
    #[error("partition mismatch: rank {rank} observed n_points={n_points} chunk_size={chunk_size} peers={peers}, which disagrees with rank 0")]
    PartitionMismatch {
        rank: u32,
        n_points: u64,
        chunk_size: u64,
        peers: u32,
    },

    /// A peer's final-pass byte count differs from its sizing-pass byte count.
    #[error("sizing mismatch on rank {rank}: sizing pass produced {sizing_bytes} bytes, final pass produced {final_bytes} bytes")]
    SizingMismatch {
        rank: u32,
        sizing_bytes: u64,
        final_bytes: u64,
    },

    /// LAS 1.3/1.4 input in parallel mode: undefined by the protocol, rejected.
    #[error("unsupported LAS version {major}.{minor} in parallel mode (only 1.0/1.1/1.2 are supported)")]
    UnsupportedVersion { major: u8, minor: u8 },

    /// Surfaced when a peer observes another peer's abort.
    #[error("collective failure: cohort aborted by rank {aborting_rank}")]
    CollectiveFailure { aborting_rank: u32 },

    /// [las::Error]
    #[error(transparent)]
    LasError(#[from] las::Error),

    /// [laz::LasZipError]
    #[error(transparent)]
    LasZipError(#[from] laz::LasZipError),

    /// [std::io::Error]
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// The responsible peer's rank, when the failure is attributable to one.
    pub fn rank(&self) -> Option<u32> {
        match self {
            Error::InsufficientChunks { .. } => Some(0),
            Error::PartitionMismatch { rank, .. } => Some(*rank),
            Error::SizingMismatch { rank, .. } => Some(*rank),
            Error::CollectiveFailure { aborting_rank } => Some(*aborting_rank),
            _ => None,
        }
    }
}
