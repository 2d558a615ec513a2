//! Drives the LAS->LAZ parallel chunked-codec protocol: Sizing Pass ->
//! Placement Exchange -> Final Pass & Table Writer.

use byteorder::{LittleEndian, WriteBytesExt};
use las::{Builder, Reader, Vlr};
use laz::laszip::{ChunkTable, ChunkTableEntry, LazItemRecordBuilder, LazItemType, LazVlr, LazVlrBuilder};
use log::{debug, info};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};

use crate::accounting::ChunkAccounting;
use crate::cohort::Cohort;
use crate::config::Config;
use crate::encoder::PeerEncoder;
use crate::error::{Error, Result};
use crate::partition::{partition_las_to_laz, PeerRange};
use crate::sink::CountingSink;

/// Builds the LASzip items/VLR for `point_format` at the given fixed chunk
/// size, mirroring `las::Header::add_laz_vlr`'s item-selection logic with a
/// caller-supplied chunk size instead of the library default.
fn build_laz_vlr(point_format: &las::point::Format, chunk_size: u64) -> LazVlr {
    let mut builder = LazItemRecordBuilder::new();
    if !point_format.is_extended {
        builder.add_item(LazItemType::Point10);
        if point_format.has_gps_time {
            builder.add_item(LazItemType::GpsTime);
        }
        if point_format.has_color {
            builder.add_item(LazItemType::RGB12);
        }
        if point_format.has_waveform {
            builder.add_item(LazItemType::WavePacket13);
        }
        if point_format.extra_bytes > 0 {
            builder.add_item(LazItemType::Byte(point_format.extra_bytes));
        }
    } else {
        builder.add_item(LazItemType::Point14);
        if point_format.has_color {
            if point_format.has_nir {
                builder.add_item(LazItemType::RGBNIR14);
            } else {
                builder.add_item(LazItemType::RGB14);
            }
        }
        if point_format.has_waveform {
            builder.add_item(LazItemType::WavePacket14);
        }
        if point_format.extra_bytes > 0 {
            builder.add_item(LazItemType::Byte14(point_format.extra_bytes));
        }
    }
    LazVlrBuilder::new(builder.build())
        .with_fixed_chunk_size(chunk_size as u32)
        .build()
}

fn check_version(header: &las::Header) -> Result<()> {
    let v = header.version();
    match (v.major, v.minor) {
        (1, 0) | (1, 1) | (1, 2) => Ok(()),
        (major, minor) => Err(Error::UnsupportedVersion { major, minor }),
    }
}

/// Builds the LAZ output header (with an embedded LASzip VLR at `chunk_size`)
/// from the source header. Every peer computes this independently and
/// deterministically; only rank 0 actually writes it.
fn build_output_header(source: &las::Header, chunk_size: u64) -> Result<(las::Header, LazVlr)> {
    let mut builder: Builder = Builder::from(source.clone());
    builder.point_format.is_compressed = true;
    builder.generating_software = "parlaz".to_string();

    let laz_vlr = build_laz_vlr(&builder.point_format, chunk_size);
    let mut vlr_data = Vec::new();
    laz_vlr.write_to(&mut vlr_data)?;
    builder.vlrs.push(Vlr {
        user_id: LazVlr::USER_ID.to_owned(),
        record_id: LazVlr::RECORD_ID,
        description: LazVlr::DESCRIPTION.to_owned(),
        data: vlr_data,
    });

    let header = builder.into_header()?;
    Ok((header, laz_vlr))
}

/// Reads `range` from `reader` and feeds it through `encoder`, breaking a new
/// chunk every `chunk_size` points. Used for both the sizing pass and the
/// final pass, which must encode identically for the byte counts to line up.
fn encode_range<W: Write + Seek + Send>(
    reader: &mut Reader,
    range: PeerRange,
    chunk_size: u64,
    encoder: &mut PeerEncoder<'_, W>,
    accounting: &mut ChunkAccounting,
) -> Result<()> {
    reader.seek(range.start)?;
    let point_format = *reader.header().point_format();
    let transforms = *reader.header().transforms();

    let mut buf = vec![0u8; point_format.len() as usize];
    let mut in_chunk = 0u64;
    for _ in range.start..range.end {
        let point = reader
            .read_point()?
            .expect("range within [0, N) must yield a point");
        let raw = point.into_raw(&transforms)?;
        raw.write_to(&mut buf[..], &point_format)?;
        encoder.compress_point(&buf)?;
        in_chunk += 1;
        if in_chunk == chunk_size {
            encoder.finish_chunk(accounting, in_chunk)?;
            in_chunk = 0;
        }
    }
    if in_chunk > 0 {
        encoder.finish_chunk(accounting, in_chunk)?;
    }
    Ok(())
}

/// Runs one peer's side of the LAS->LAZ conversion end to end. On any error the
/// cohort is aborted so no sibling peer is left blocked forever.
pub fn run_las_to_laz(peer: Cohort, config: Config) -> Result<()> {
    match run_las_to_laz_inner(&peer, &config) {
        Ok(()) => Ok(()),
        Err(e) => {
            peer.abort();
            Err(e)
        }
    }
}

fn run_las_to_laz_inner(peer: &Cohort, config: &Config) -> Result<()> {
    let rank = peer.rank();
    let is_last = rank + 1 == peer.peers();

    // --- Partitioning ---
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

    let range = partition_las_to_laz(n_points, config.peers, rank, config.chunk_size)?;
    debug!("rank {rank}: partitioned [{}, {})", range.start, range.end);
    peer.barrier()?; // Partitioning -> Sizing

    // --- Sizing Pass ---
    let (out_header, laz_vlr) = build_output_header(reader.header(), config.chunk_size)?;
    let mut sizing_sink = CountingSink::new();
    let mut sizing_encoder = PeerEncoder::new(&mut sizing_sink, laz_vlr.clone())?;
    let mut sizing_accounting = ChunkAccounting::new();
    encode_range(
        &mut reader,
        range,
        config.chunk_size,
        &mut sizing_encoder,
        &mut sizing_accounting,
    )?;
    let local_bytes = sizing_accounting.local_bytes();
    let local_chunks = sizing_accounting.local_chunks();
    debug!("rank {rank}: sizing pass complete, {local_bytes} bytes in {local_chunks} chunks");

    peer.barrier()?; // Sizing -> Exchange

    // --- Placement Exchange ---
    let all_bytes = peer.all_gather_bytes(local_bytes)?;
    let all_chunks = peer.gather_chunks_to_last(local_chunks)?;
    let gathered_chunk_bytes =
        peer.send_chunk_bytes_to_last(sizing_accounting.chunk_bytes.clone())?;

    let header_end_from_rank0 = if rank == 0 {
        let mut file = BufWriter::new(File::create(&config.output)?);
        out_header.write_to(&mut file)?;
        let header_end = file.stream_position()?;
        file.write_i64::<LittleEndian>(-1)?; // reserved offset-to-chunk-table pointer
        file.flush()?;
        info!("wrote header prefix to {}", config.output.display());
        Some(header_end + 8)
    } else {
        None
    };
    let header_end = peer.broadcast_header_end(header_end_from_rank0)?;

    let total_bytes: u64 = all_bytes.iter().sum();
    let derived_table_pos = header_end + total_bytes;
    let table_pos_to_send = if rank == 0 { Some(derived_table_pos) } else { None };
    let table_pos_received = peer.send_table_pos_to_last(table_pos_to_send)?;

    peer.barrier()?; // Exchange -> Final

    // --- Final Pass ---
    let absolute_offset = header_end + all_bytes[..rank as usize].iter().sum::<u64>();
    let mut out_file = BufWriter::new(OpenOptions::new().write(true).open(&config.output)?);
    out_file.seek(SeekFrom::Start(absolute_offset))?;

    let mut final_encoder = PeerEncoder::new(out_file, laz_vlr.clone())?;
    let mut final_accounting = ChunkAccounting::new();
    encode_range(
        &mut reader,
        range,
        config.chunk_size,
        &mut final_encoder,
        &mut final_accounting,
    )?;
    let final_bytes = final_accounting.local_bytes();
    if final_bytes != local_bytes {
        return Err(Error::SizingMismatch {
            rank,
            sizing_bytes: local_bytes,
            final_bytes,
        });
    }
    let mut out_file = final_encoder.into_inner();
    out_file.flush()?;
    debug!("rank {rank}: final pass complete, {final_bytes} bytes");

    peer.barrier()?; // Final -> TableWriting

    // --- Table Writer (rank P-1 only) ---
    if is_last {
        let all_chunks = all_chunks.expect("last rank receives gathered chunk counts");
        let chunk_bytes: Vec<ChunkTableEntry> =
            gathered_chunk_bytes.expect("last rank receives gathered chunk bytes");
        let number_chunks: u32 = all_chunks.iter().sum();
        debug_assert_eq!(number_chunks as usize, chunk_bytes.len());

        let table_pos = table_pos_received.expect("last rank receives TABLE_POS");
        debug_assert_eq!(table_pos, derived_table_pos);

        let mut chunk_table = ChunkTable::with_capacity(chunk_bytes.len());
        for entry in chunk_bytes {
            chunk_table.push(entry);
        }

        out_file.seek(SeekFrom::Start(table_pos))?;
        chunk_table.write_to(&mut out_file, &laz_vlr)?;

        out_file.seek(SeekFrom::Start(header_end - 8))?;
        out_file.write_i64::<LittleEndian>(table_pos as i64)?;
        out_file.flush()?;
        info!("wrote global chunk table with {number_chunks} chunks");
    }

    Ok(())
}
