//! Sequential and lookup readers over one slice data file.

use crate::bits::BitStream;
use crate::count_array::CountRecord;
use crate::database::block::decode_block;
use crate::error::MerylError;
use std::path::{Path, PathBuf};

/// One decoded record, still carrying its block prefix: the caller
/// reassembles the full slice-local suffix as
/// `(block_prefix << residual_width) | suffix` when `residual_width` is
/// uniform across the slice, or simply treats `(block_prefix, suffix)` as
/// an opaque sort key, since both widen monotonically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceRecord {
    pub block_prefix: u64,
    pub suffix: u128,
    pub value: u32,
    pub label: u64,
}

/// Reads blocks out of a slice file in file order, handing back records one
/// at a time within the current block before decoding the next.
///
/// Each block was serialized independently by `StreamWriter` (its own
/// `BitStream::serialize` blob, self-delimiting via a length header), so the
/// file is a concatenation of blobs rather than one combined bitstream; the
/// reader walks that concatenation one blob at a time.
pub struct SliceReader {
    path: PathBuf,
    bytes: Vec<u8>,
    byte_offset: usize,
    block_prefix_width: u32,
    label_width: u32,
    current_block: Vec<CountRecord>,
    current_block_prefix: u64,
    idx_in_block: usize,
}

impl SliceReader {
    pub fn open(
        path: impl AsRef<Path>,
        block_prefix_width: u32,
        label_width: u32,
    ) -> crate::error::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let bytes = std::fs::read(&path).map_err(|e| MerylError::io(&path, e))?;
        Ok(SliceReader {
            path,
            bytes,
            byte_offset: 0,
            block_prefix_width,
            label_width,
            current_block: Vec::new(),
            current_block_prefix: 0,
            idx_in_block: 0,
        })
    }

    fn load_next_block(&mut self) -> crate::error::Result<bool> {
        if self.byte_offset >= self.bytes.len() {
            return Ok(false);
        }
        let (mut stream, consumed) = BitStream::deserialize(&self.bytes[self.byte_offset..])
            .map_err(|e| MerylError::internal(format!("{}: {e}", self.path.display())))?;
        self.byte_offset += consumed;

        let (prefix, records) = decode_block(
            &mut stream,
            self.block_prefix_width,
            self.label_width,
            &self.path,
        )?;
        self.current_block_prefix = prefix;
        self.current_block = records;
        self.idx_in_block = 0;
        Ok(true)
    }

    pub fn next_record(&mut self) -> crate::error::Result<Option<SliceRecord>> {
        loop {
            if self.idx_in_block < self.current_block.len() {
                let r = self.current_block[self.idx_in_block];
                self.idx_in_block += 1;
                return Ok(Some(SliceRecord {
                    block_prefix: self.current_block_prefix,
                    suffix: r.suffix,
                    value: r.value,
                    label: r.label,
                }));
            }
            if !self.load_next_block()? {
                return Ok(None);
            }
        }
    }
}

/// Binary-searches within a slice file for a specific `(block_prefix,
/// suffix)` pair, for `meryl lookup`-style existence queries (grounded on
/// `meryl-lookup/existence.C` in the original source). Blocks are decoded
/// in order since a slice file has no top-level block index; this is a
/// linear scan with early exit once `block_prefix` is exceeded, which is
/// adequate for point lookups against small-to-medium slices.
pub fn lookup(
    path: impl AsRef<Path>,
    block_prefix_width: u32,
    label_width: u32,
    target_block_prefix: u64,
    target_suffix: u128,
) -> crate::error::Result<Option<(u32, u64)>> {
    let mut reader = SliceReader::open(path, block_prefix_width, label_width)?;
    while let Some(rec) = reader.next_record()? {
        if rec.block_prefix > target_block_prefix {
            return Ok(None);
        }
        if rec.block_prefix == target_block_prefix && rec.suffix == target_suffix {
            return Ok(Some((rec.value, rec.label)));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::writer::StreamWriter;
    use tempfile::tempdir;

    #[test]
    fn reads_records_in_file_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("0x00.merylData");
        let mut w = StreamWriter::create(&path, 8, 2, 0).unwrap().with_block_size_target(2);
        w.add_mer(0, 1, 1, 0).unwrap();
        w.add_mer(0, 2, 1, 0).unwrap();
        w.add_mer(1, 0, 3, 0).unwrap();
        w.close().unwrap();

        let mut reader = SliceReader::open(&path, 2, 0).unwrap();
        let first = reader.next_record().unwrap().unwrap();
        assert_eq!((first.block_prefix, first.suffix), (0, 1));
        let second = reader.next_record().unwrap().unwrap();
        assert_eq!((second.block_prefix, second.suffix), (0, 2));
        let third = reader.next_record().unwrap().unwrap();
        assert_eq!((third.block_prefix, third.suffix, third.value), (1, 0, 3));
        assert!(reader.next_record().unwrap().is_none());
    }

    #[test]
    fn lookup_finds_existing_and_rejects_missing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("0x00.merylData");
        let mut w = StreamWriter::create(&path, 8, 2, 0).unwrap();
        w.add_mer(0, 1, 5, 0).unwrap();
        w.add_mer(0, 9, 7, 0).unwrap();
        w.close().unwrap();

        assert_eq!(lookup(&path, 2, 0, 0, 9).unwrap(), Some((7, 0)));
        assert_eq!(lookup(&path, 2, 0, 0, 3).unwrap(), None);
    }
}
