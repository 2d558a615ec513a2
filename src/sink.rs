//! Null-backed byte sink used by the sizing pass: counts bytes written
//! without retaining or writing them anywhere.

use std::io::{self, Seek, SeekFrom, Write};

/// A `Write + Seek` sink that discards all bytes but tracks the logical stream
/// position precisely, including seeks past the current length (as the LAZ
/// encoder's reserved chunk-table-offset placeholder requires).
#[derive(Debug, Default)]
pub struct CountingSink {
    pos: u64,
    len: u64,
}

impl CountingSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Write for CountingSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pos += buf.len() as u64;
        self.len = self.len.max(self.pos);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for CountingSink {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let new_pos = match pos {
            SeekFrom::Start(p) => p as i64,
            SeekFrom::Current(d) => self.pos as i64 + d,
            SeekFrom::End(d) => self.len as i64 + d,
        };
        if new_pos < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek to a negative position",
            ));
        }
        self.pos = new_pos as u64;
        self.len = self.len.max(self.pos);
        Ok(self.pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_writes() {
        let mut sink = CountingSink::new();
        sink.write_all(&[0u8; 8]).unwrap();
        sink.write_all(&[0u8; 100]).unwrap();
        assert_eq!(sink.stream_position().unwrap(), 108);
    }

    #[test]
    fn seek_past_end_extends_length() {
        let mut sink = CountingSink::new();
        sink.seek(SeekFrom::Start(1000)).unwrap();
        assert_eq!(sink.stream_position().unwrap(), 1000);
        sink.write_all(&[0u8; 8]).unwrap();
        assert_eq!(sink.seek(SeekFrom::End(0)).unwrap(), 1008);
    }
}
