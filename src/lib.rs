//! Parallel LAS/LAZ chunked-codec coordinator.
//!
//! A cooperative of peers converts a LAS file to LAZ (or back) in parallel by
//! partitioning the point range and exchanging placement information through a
//! small set of collective operations, modeled on MPI's barrier/gather/broadcast
//! primitives but realized in-process over OS threads.

pub mod accounting;
pub mod cohort;
pub mod config;
pub mod coordinator;
pub mod encoder;
pub mod error;
pub mod las_out;
pub mod partition;
pub mod sink;

pub use cohort::Cohort;
pub use config::{Cli, Config, Direction, DEFAULT_CHUNK_SIZE};
pub use error::{Error, Result};

/// Inspects `path`'s LAS/LAZ header to decide which direction to run: the
/// direction is determined by whether the input file's point data is
/// LASzip-compressed.
pub fn infer_direction(path: &std::path::Path) -> Result<Direction> {
    let reader = las::Reader::from_path(path)?;
    if reader.header().point_format().is_compressed {
        Ok(Direction::LazToLas)
    } else {
        Ok(Direction::LasToLaz)
    }
}

/// Runs the full cooperative job: spawns one thread per peer and dispatches to
/// the appropriate direction's driver.
pub fn run(config: Config) -> Result<()> {
    let peers = cohort::Cohort::new_cohort(config.peers);
    let results: Vec<Result<()>> = std::thread::scope(|scope| {
        let handles: Vec<_> = peers
            .into_iter()
            .map(|peer| {
                let config = config.clone();
                scope.spawn(move || match config.direction {
                    Direction::LasToLaz => coordinator::run_las_to_laz(peer, config),
                    Direction::LazToLas => las_out::run_laz_to_las(peer, config),
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("peer thread panicked"))
            .collect()
    });

    results.into_iter().collect::<Result<Vec<()>>>()?;
    Ok(())
}
