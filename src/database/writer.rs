//! `StreamWriter`: one writer per slice file. Buffers incoming, already
//! globally-sorted-within-slice k-mers into the currently open block and
//! flushes it to disk whenever the block's bucket prefix changes or the
//! block reaches its size target.

use crate::bits::BitStream;
use crate::count_array::CountRecord;
use crate::database::block::encode_block;
use crate::error::{MerylError, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Default number of k-mers buffered per block before a forced flush.
/// A real deployment would tune this to the expected record size; the
/// concrete value is not load-bearing for correctness.
pub const DEFAULT_BLOCK_SIZE_TARGET: usize = 1 << 16;

pub struct StreamWriter {
    path: PathBuf,
    file: BufWriter<File>,
    residual_width: u32,
    block_prefix_width: u32,
    label_width: u32,
    block_size_target: usize,
    current_prefix: Option<u64>,
    buffer: Vec<CountRecord>,
    /// Per-block mini-index: (block_prefix, byte offset of the block).
    mini_index: Vec<(u64, u64)>,
    bytes_written: u64,
    total_kmers: u64,
}

impl StreamWriter {
    pub fn create(
        path: impl AsRef<Path>,
        residual_width: u32,
        block_prefix_width: u32,
        label_width: u32,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(|e| MerylError::io(&path, e))?;
        Ok(StreamWriter {
            path,
            file: BufWriter::new(file),
            residual_width,
            block_prefix_width,
            label_width,
            block_size_target: DEFAULT_BLOCK_SIZE_TARGET,
            current_prefix: None,
            buffer: Vec::new(),
            mini_index: Vec::new(),
            bytes_written: 0,
            total_kmers: 0,
        })
    }

    pub fn with_block_size_target(mut self, target: usize) -> Self {
        self.block_size_target = target.max(1);
        self
    }

    /// `residual` is the slice-local suffix with the block prefix bits
    /// already split off (i.e. just the low `residual_width` bits); the
    /// block prefix itself is derived from the high `block_prefix_width`
    /// bits of the full slice-local suffix, which the caller supplies
    /// alongside the residual.
    pub fn add_mer(&mut self, block_prefix: u64, residual: u128, value: u32, label: u64) -> Result<()> {
        if self.current_prefix != Some(block_prefix) || self.buffer.len() >= self.block_size_target
        {
            self.flush_block()?;
            self.current_prefix = Some(block_prefix);
        }
        self.buffer.push(CountRecord {
            suffix: residual,
            value,
            label,
        });
        Ok(())
    }

    fn flush_block(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let prefix = self.current_prefix.expect("buffer non-empty implies a current prefix");
        let mut bs = BitStream::new();
        encode_block(
            &mut bs,
            prefix,
            self.block_prefix_width,
            self.residual_width,
            self.label_width,
            &self.buffer,
        );

        let offset = self.bytes_written;
        let mut bytes = Vec::new();
        bs.serialize(&mut bytes);
        self.file
            .write_all(&bytes)
            .map_err(|e| MerylError::io(&self.path, e))?;
        self.bytes_written += bytes.len() as u64;

        self.mini_index.push((prefix, offset));
        self.total_kmers += self.buffer.len() as u64;
        self.buffer.clear();
        Ok(())
    }

    /// Flushes the final partial block and the slice mini-index, and
    /// closes the file. Returns the number of k-mers written and the
    /// mini-index for the caller to persist.
    pub fn close(mut self) -> Result<(u64, Vec<(u64, u64)>)> {
        self.flush_block()?;
        self.file.flush().map_err(|e| MerylError::io(&self.path, e))?;
        Ok((self.total_kmers, self.mini_index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::reader::SliceReader;
    use tempfile::tempdir;

    #[test]
    fn writes_multiple_blocks_on_prefix_change() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("0x000000.merylData");
        let mut w = StreamWriter::create(&path, 10, 4, 0).unwrap().with_block_size_target(100);

        w.add_mer(0, 5, 1, 0).unwrap();
        w.add_mer(0, 9, 1, 0).unwrap();
        w.add_mer(1, 2, 1, 0).unwrap();
        w.add_mer(1, 3, 1, 0).unwrap();
        let (total, mini_index) = w.close().unwrap();

        assert_eq!(total, 4);
        assert_eq!(mini_index.len(), 2);
        assert_eq!(mini_index[0].0, 0);
        assert_eq!(mini_index[1].0, 1);

        let mut reader = SliceReader::open(&path, 4, 0).unwrap();
        let mut all = Vec::new();
        while let Some(rec) = reader.next_record().unwrap() {
            all.push(rec);
        }
        assert_eq!(all.len(), 4);
    }

    #[test]
    fn forces_flush_at_block_size_target() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("0x000000.merylData");
        let mut w = StreamWriter::create(&path, 20, 0, 0).unwrap().with_block_size_target(3);
        for i in 0..10u128 {
            w.add_mer(0, i, 1, 0).unwrap();
        }
        let (total, mini_index) = w.close().unwrap();
        assert_eq!(total, 10);
        // 10 records at block size 3 => 4 blocks (3,3,3,1)
        assert_eq!(mini_index.len(), 4);
    }
}
