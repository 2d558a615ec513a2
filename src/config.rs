//! CLI surface and run configuration.

use clap::Parser;
use std::path::PathBuf;

/// Default chunk size `C`, matching the LAZ ecosystem default.
pub const DEFAULT_CHUNK_SIZE: u64 = 50_000;

/// Conversion direction. Inferred from the input unless overridden.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    LasToLaz,
    LazToLas,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "parlaz", about = "Parallel LAS/LAZ chunked-codec coordinator")]
pub struct Cli {
    /// Input file path.
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,

    /// Output file path.
    #[arg(short = 'o', long = "output")]
    pub output: PathBuf,

    /// Number of cooperating peers.
    #[arg(short = 'p', long = "peers", default_value_t = 1)]
    pub peers: u32,

    /// Chunk size `C` (points per independent arithmetic-coder chunk).
    #[arg(short = 'c', long = "chunk-size", default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: u64,

    /// Verbose diagnostic logging.
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

/// Fully resolved run configuration, shared (by value, cloned) with every peer.
#[derive(Clone, Debug)]
pub struct Config {
    pub input: PathBuf,
    pub output: PathBuf,
    pub peers: u32,
    pub chunk_size: u64,
    pub direction: Direction,
}

impl Config {
    pub fn from_cli(cli: Cli, direction: Direction) -> Self {
        Config {
            input: cli.input,
            output: cli.output,
            peers: cli.peers,
            chunk_size: cli.chunk_size,
            direction,
        }
    }
}
