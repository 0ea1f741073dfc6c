//! The `merylIndex` file: two fixed 64-bit magic words (chosen, per the
//! original meryl source, to spell out `merylDat`/`a00Fil\n` in a hex
//! dump), schema widths, and the embedded statistics/histogram so a
//! histogram can be re-emitted without scanning the slice data files.

use crate::bits::BitStream;
use crate::error::{FormatError, MerylError, Result};
use std::path::{Path, PathBuf};

pub const MAGIC1: u64 = 0x7461_446c_7972_656d;
pub const MAGIC2: u64 = 0x0a30_3065_6c69_4661;

pub const INDEX_FILE_NAME: &str = "merylIndex";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Index {
    pub k: u32,
    pub label_width: u32,
    pub slice_prefix_width: u32,
    pub block_prefix_width: u32,
    pub num_unique: u64,
    pub num_distinct: u64,
    pub num_total: u64,
    /// (value, occurrences) pairs, sorted by value ascending.
    pub histogram: Vec<(u32, u64)>,
    pub format_version: u32,
}

impl Index {
    pub fn new(k: u32, label_width: u32, slice_prefix_width: u32, block_prefix_width: u32) -> Self {
        Index {
            k,
            label_width,
            slice_prefix_width,
            block_prefix_width,
            num_unique: 0,
            num_distinct: 0,
            num_total: 0,
            histogram: Vec::new(),
            format_version: 2,
        }
    }

    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut bs = BitStream::new();
        bs.write_binary(64, MAGIC1);
        bs.write_binary(64, MAGIC2);
        bs.write_binary(32, self.k as u64);
        bs.write_binary(32, self.label_width as u64);
        bs.write_binary(32, self.slice_prefix_width as u64);
        bs.write_binary(32, self.block_prefix_width as u64);
        bs.write_binary(32, self.format_version as u64);
        bs.write_binary(64, self.num_unique);
        bs.write_binary(64, self.num_distinct);
        bs.write_binary(64, self.num_total);
        bs.write_binary(64, self.histogram.len() as u64);
        for &(value, occurrences) in &self.histogram {
            bs.write_binary(64, value as u64);
            bs.write_binary(64, occurrences);
        }

        let mut bytes = Vec::new();
        bs.serialize(&mut bytes);
        std::fs::write(path, &bytes).map_err(|e| MerylError::io(path, e))
    }

    pub fn read_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path: PathBuf = path.as_ref().to_path_buf();
        let bytes = std::fs::read(&path).map_err(|e| MerylError::io(&path, e))?;
        let (mut bs, _) = BitStream::deserialize(&bytes)
            .map_err(|_| FormatError::BadMagic { path: path.clone() })?;
        bs.seek(0)
            .map_err(|_| FormatError::BadMagic { path: path.clone() })?;

        let magic_fail = || FormatError::BadMagic { path: path.clone() };
        let m1 = bs.read_binary(64).map_err(|_| magic_fail())?;
        let m2 = bs.read_binary(64).map_err(|_| magic_fail())?;
        if m1 != MAGIC1 || m2 != MAGIC2 {
            return Err(magic_fail().into());
        }

        let premature = |offset: u64| FormatError::PrematureEnd {
            path: path.clone(),
            offset,
        };

        let k = bs.read_binary(32).map_err(|_| premature(bs.position()))? as u32;
        let label_width = bs.read_binary(32).map_err(|_| premature(bs.position()))? as u32;
        let slice_prefix_width = bs.read_binary(32).map_err(|_| premature(bs.position()))? as u32;
        let block_prefix_width = bs.read_binary(32).map_err(|_| premature(bs.position()))? as u32;
        let format_version = bs.read_binary(32).map_err(|_| premature(bs.position()))? as u32;
        let num_unique = bs.read_binary(64).map_err(|_| premature(bs.position()))?;
        let num_distinct = bs.read_binary(64).map_err(|_| premature(bs.position()))?;
        let num_total = bs.read_binary(64).map_err(|_| premature(bs.position()))?;
        let hist_len = bs.read_binary(64).map_err(|_| premature(bs.position()))?;

        let mut histogram = Vec::with_capacity(hist_len as usize);
        for _ in 0..hist_len {
            let value = bs.read_binary(64).map_err(|_| premature(bs.position()))? as u32;
            let occurrences = bs.read_binary(64).map_err(|_| premature(bs.position()))?;
            histogram.push((value, occurrences));
        }

        Ok(Index {
            k,
            label_width,
            slice_prefix_width,
            block_prefix_width,
            num_unique,
            num_distinct,
            num_total,
            histogram,
            format_version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trips_through_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(INDEX_FILE_NAME);

        let mut idx = Index::new(21, 8, 6, 10);
        idx.num_unique = 100;
        idx.num_distinct = 150;
        idx.num_total = 500;
        idx.histogram = vec![(1, 50), (2, 30), (5, 20)];
        idx.write_to_file(&path).unwrap();

        let restored = Index::read_from_file(&path).unwrap();
        assert_eq!(restored, idx);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notadb");
        std::fs::write(&path, b"not a meryl database at all, just junk bytes").unwrap();
        assert!(Index::read_from_file(&path).is_err());
    }
}
