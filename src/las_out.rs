//! Drives the LAZ->LAS direction: equal-split partitioning, a single pass, no
//! sizing pass and no chunk table.

use las::{Builder, Reader};
use log::{debug, info};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};

use crate::cohort::Cohort;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::partition::partition_laz_to_las;

fn check_version(header: &las::Header) -> Result<()> {
    let v = header.version();
    match (v.major, v.minor) {
        (1, 0) | (1, 1) | (1, 2) => Ok(()),
        (major, minor) => Err(Error::UnsupportedVersion { major, minor }),
    }
}

/// Builds the plain LAS output header from the (decompressed) source header.
fn build_output_header(source: &las::Header) -> Result<las::Header> {
    let mut builder: Builder = Builder::from(source.clone());
    builder.point_format.is_compressed = false;
    builder.generating_software = "parlaz".to_string();
    builder.vlrs.retain(|vlr| !las::laz::is_laszip_vlr(vlr));
    Ok(builder.into_header()?)
}

/// Runs one peer's side of the LAZ->LAS conversion end to end.
pub fn run_laz_to_las(peer: Cohort, config: Config) -> Result<()> {
    match run_laz_to_las_inner(&peer, &config) {
        Ok(()) => Ok(()),
        Err(e) => {
            peer.abort();
            Err(e)
        }
    }
}

fn run_laz_to_las_inner(peer: &Cohort, config: &Config) -> Result<()> {
    let rank = peer.rank();

    let mut reader = Reader::from_path(&config.input)?;
    check_version(reader.header())?;
    let n_points = reader.header().number_of_points();

    let all_n = peer.all_gather_npoints(n_points)?;
    if all_n.iter().any(|&n| n != all_n[0]) {
        return Err(Error::PartitionMismatch {
            rank,
            n_points,
            chunk_size: config.chunk_size,
            peers: config.peers,
        });
    }

    let range = partition_laz_to_las(n_points, config.peers, rank);
    debug!("rank {rank}: partitioned [{}, {})", range.start, range.end);
    peer.barrier()?; // Partitioning -> Writing

    let out_header = build_output_header(reader.header())?;
    let point_format = *out_header.point_format();
    let record_len = point_format.len() as u64;

    let header_end_from_rank0 = if rank == 0 {
        let mut file = BufWriter::new(File::create(&config.output)?);
        out_header.write_to(&mut file)?;
        file.flush()?;
        info!("wrote header to {}", config.output.display());
        Some(file.stream_position()?)
    } else {
        None
    };
    let header_end = peer.broadcast_header_end(header_end_from_rank0)?;

    let absolute_offset = header_end + range.start * record_len;
    let mut out_file = BufWriter::new(OpenOptions::new().write(true).open(&config.output)?);
    out_file.seek(SeekFrom::Start(absolute_offset))?;

    reader.seek(range.start)?;
    let transforms = *reader.header().transforms();
    let mut buf = vec![0u8; record_len as usize];
    for _ in range.start..range.end {
        let point = reader
            .read_point()?
            .expect("range within [0, N) must yield a point");
        let raw = point.into_raw(&transforms)?;
        raw.write_to(&mut buf[..], &point_format)?;
        out_file.write_all(&buf)?;
    }
    out_file.flush()?;
    debug!("rank {rank}: wrote {} points", range.len());

    Ok(())
}
