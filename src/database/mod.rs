//! On-disk database layout: a directory holding `merylIndex` plus up to
//! `schema::NUM_SLICES` data files named by their zero-padded hex slice
//! number, e.g. `0x00.merylData`.
//!
//! Slice files use a plain zero-padded hex slice index rather than the
//! four leading bases of the slice's k-mer range, keeping the naming
//! independent of any particular base encoding. Recorded in DESIGN.md.

pub mod block;
pub mod index;
pub mod reader;
pub mod writer;

use crate::error::{ConfigurationError, MerylError, Result};
use crate::schema::{KmerSchema, NUM_SLICES};
use index::{Index, INDEX_FILE_NAME};
use reader::SliceReader;
use std::path::{Path, PathBuf};
use tempfile::Builder as TempBuilder;

fn slice_file_name(slice: u32) -> String {
    format!("0x{slice:02x}.merylData")
}

pub fn slice_path(dir: impl AsRef<Path>, slice: u32) -> PathBuf {
    dir.as_ref().join(slice_file_name(slice))
}

/// A database directory opened for reading: the index plus the path to
/// each of the `NUM_SLICES` slice files (a slice may be absent if it held
/// no k-mers).
pub struct Database {
    dir: PathBuf,
    pub index: Index,
}

impl Database {
    /// Atomically creates a new, empty database directory: contents are
    /// assembled under a sibling temp directory and only `rename`d into
    /// place once fully written, so a reader never observes a partially
    /// populated directory.
    pub fn create_atomically(
        final_dir: impl AsRef<Path>,
        schema: &KmerSchema,
        build: impl FnOnce(&Path) -> Result<Index>,
    ) -> Result<Database> {
        let final_dir = final_dir.as_ref();
        if final_dir.exists() {
            return Err(ConfigurationError::OutputExists(final_dir.to_path_buf()).into());
        }
        let parent = final_dir.parent().unwrap_or_else(|| Path::new("."));
        let prefix = final_dir
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("meryl-output");
        let staging = TempBuilder::new()
            .prefix(&format!(".{prefix}."))
            .tempdir_in(parent)
            .map_err(|e| MerylError::io(parent, e))?;

        let _ = schema;
        let index = build(staging.path())?;
        index.write_to_file(staging.path().join(INDEX_FILE_NAME))?;

        let staging_path = staging.into_path();
        std::fs::rename(&staging_path, final_dir).map_err(|e| {
            let _ = std::fs::remove_dir_all(&staging_path);
            MerylError::io(final_dir, e)
        })?;

        Ok(Database {
            dir: final_dir.to_path_buf(),
            index,
        })
    }

    pub fn open(dir: impl AsRef<Path>) -> Result<Database> {
        let dir = dir.as_ref().to_path_buf();
        let index = Index::read_from_file(dir.join(INDEX_FILE_NAME))?;
        Ok(Database { dir, index })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn slice_path(&self, slice: u32) -> PathBuf {
        slice_path(&self.dir, slice)
    }

    pub fn open_slice(&self, slice: u32) -> Result<Option<SliceReader>> {
        let path = self.slice_path(slice);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(SliceReader::open(
            path,
            self.index.block_prefix_width,
            self.index.label_width,
        )?))
    }

    /// Point lookup of one canonical k-mer's packed value, reassembled from
    /// its slice and suffix the same way the counting driver splits k-mers
    /// apart (top `SLICE_PREFIX_BITS` bits select the slice, the rest is
    /// the slice-local suffix).
    pub fn contains(&self, packed_canonical: u128, mer_bits: u32) -> Result<Option<(u32, u64)>> {
        let suffix_bits = crate::schema::suffix_bits_from_mer_bits(mer_bits);
        let slice = (packed_canonical >> suffix_bits) as u32;
        let suffix = packed_canonical & ((1u128 << suffix_bits) - 1);

        match self.open_slice(slice)? {
            None => Ok(None),
            Some(mut reader) => {
                let block_prefix_width = self.index.block_prefix_width;
                let target_block_prefix = if block_prefix_width == 0 {
                    0
                } else {
                    (suffix >> (suffix_bits - block_prefix_width)) as u64
                };
                let residual_width = suffix_bits - block_prefix_width;
                let target_residual = suffix & ((1u128 << residual_width) - 1);
                while let Some(rec) = reader.next_record()? {
                    if rec.block_prefix > target_block_prefix {
                        return Ok(None);
                    }
                    if rec.block_prefix == target_block_prefix && rec.suffix == target_residual {
                        return Ok(Some((rec.value, rec.label)));
                    }
                }
                Ok(None)
            }
        }
    }
}

pub fn all_slices() -> std::ops::Range<u32> {
    0..NUM_SLICES
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::index::Index;
    use crate::database::writer::StreamWriter;
    use crate::schema::KmerSchema;
    use tempfile::tempdir;

    #[test]
    fn create_atomically_never_leaves_a_partial_dir_on_failure() {
        let root = tempdir().unwrap();
        let final_dir = root.path().join("out.meryl");
        let schema = KmerSchema::new(8, 0).unwrap();

        let result = Database::create_atomically(&final_dir, &schema, |_staging| {
            Err(MerylError::internal("boom"))
        });
        assert!(result.is_err());
        assert!(!final_dir.exists());
    }

    #[test]
    fn create_then_open_round_trips() {
        let root = tempdir().unwrap();
        let final_dir = root.path().join("out.meryl");
        let schema = KmerSchema::new(8, 0).unwrap();

        let db = Database::create_atomically(&final_dir, &schema, |staging| {
            let mut w = StreamWriter::create(slice_path(staging, 0), 4, 0, 0).unwrap();
            w.add_mer(0, 3, 7, 0).unwrap();
            w.close().unwrap();

            let mut idx = Index::new(schema.k(), schema.label_width(), 6, 0);
            idx.num_distinct = 1;
            idx.num_unique = 1;
            idx.num_total = 1;
            Ok(idx)
        })
        .unwrap();
        assert_eq!(db.index.num_distinct, 1);

        let reopened = Database::open(&final_dir).unwrap();
        let mut reader = reopened.open_slice(0).unwrap().unwrap();
        let rec = reader.next_record().unwrap().unwrap();
        assert_eq!((rec.suffix, rec.value), (3, 7));
        assert!(reopened.open_slice(1).unwrap().is_none());
    }
}
