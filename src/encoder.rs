//! Chunk-aware LAZ point compressor that records completed-chunk accounting
//! externally rather than owning a chunk table itself: the coordinator
//! supplies an [`ChunkAccounting`] and receives one entry per chunk boundary.

use crate::accounting::ChunkAccounting;
use laz::laszip::{LazItem, LazVlr};
use laz::record::{LayeredPointRecordCompressor, RecordCompressor, SequentialPointRecordCompressor};
use laz::LasZipError;

use std::io::{Seek, Write};

/// Picks the record compressor matching `items`' version, the way
/// `laz::laszip::details::record_compressor_from_laz_items` does internally
/// for `LasZipCompressor` (not exposed publicly, so reimplemented here).
fn record_compressor_for<'a, W: Write + Send + 'a>(
    items: &Vec<LazItem>,
    dst: W,
) -> crate::error::Result<Box<dyn RecordCompressor<W> + Send + 'a>> {
    let first = items
        .first()
        .expect("a LazVlr always carries at least one item");
    let mut compressor: Box<dyn RecordCompressor<W> + Send> = match first.version() {
        1 | 2 => Box::new(SequentialPointRecordCompressor::new(dst)),
        3 | 4 => Box::new(LayeredPointRecordCompressor::new(dst)),
        v => return Err(LasZipError::UnsupportedLazItemVersion(first.item_type(), v).into()),
    };
    compressor.set_fields_from(items)?;
    Ok(compressor)
}

pub struct PeerEncoder<'a, W: Write + Seek + Send + 'a> {
    vlr: LazVlr,
    record_compressor: Box<dyn RecordCompressor<W> + Send + 'a>,
    /// Absolute position in `W` where this peer's encoded region begins.
    region_start: u64,
    /// Absolute position in `W` where the currently-open chunk began.
    chunk_start: u64,
}

impl<'a, W: Write + Seek + Send + 'a> PeerEncoder<'a, W> {
    /// Creates an encoder that will compress points starting at `dst`'s current
    /// stream position, which becomes this peer's region origin.
    pub fn new(mut dst: W, vlr: LazVlr) -> crate::error::Result<Self> {
        let region_start = dst.stream_position()?;
        let record_compressor = record_compressor_for(vlr.items(), dst)?;
        Ok(Self {
            vlr,
            record_compressor,
            region_start,
            chunk_start: region_start,
        })
    }

    /// Compresses one point's raw LAS-layout bytes.
    pub fn compress_point(&mut self, raw: &[u8]) -> std::io::Result<()> {
        self.record_compressor.compress_next(raw)
    }

    /// Terminates the current arithmetic-coder chunk, records it (point count
    /// and compressed byte length) into `accounting`, and resets the
    /// compressor so the next call to [`compress_point`](Self::compress_point)
    /// starts a fresh chunk.
    pub fn finish_chunk(
        &mut self,
        accounting: &mut ChunkAccounting,
        point_count: u64,
    ) -> crate::error::Result<()> {
        self.record_compressor.done()?;
        let end = self.record_compressor.get_mut().stream_position()?;
        accounting.record_chunk(point_count, end - self.chunk_start);
        self.chunk_start = end;

        self.record_compressor.reset();
        self.record_compressor.set_fields_from(self.vlr.items())?;
        Ok(())
    }

    /// Total bytes written into `W` for this peer's region so far.
    pub fn bytes_written(&mut self) -> std::io::Result<u64> {
        Ok(self.record_compressor.get_mut().stream_position()? - self.region_start)
    }

    pub fn into_inner(self) -> W {
        self.record_compressor.box_into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::CountingSink;
    use laz::laszip::{LazItemRecordBuilder, LazItemType};

    fn point10_vlr() -> LazVlr {
        let items = LazItemRecordBuilder::new()
            .add_item(LazItemType::Point10)
            .build();
        LazVlr::from_laz_items(items)
    }

    #[test]
    fn compresses_points_and_reports_chunk_boundaries() {
        let vlr = point10_vlr();
        let mut enc = PeerEncoder::new(CountingSink::new(), vlr).unwrap();
        let mut acc = ChunkAccounting::new();

        let raw_point = [0u8; 20];
        for _ in 0..10 {
            enc.compress_point(&raw_point).unwrap();
        }
        enc.finish_chunk(&mut acc, 10).unwrap();

        assert_eq!(acc.local_chunks(), 1);
        assert!(acc.local_bytes() > 0);
        assert_eq!(enc.bytes_written().unwrap(), acc.local_bytes());
    }
}
