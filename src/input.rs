//! Concrete `SliceInput` sources: adapts a database slice,
//! a sorted list file, or an in-memory counted slice into the trait the
//! action compute loop merges over.

use crate::action::compute::{Record, SliceInput};
use crate::count_array::CountRecord;
use crate::database::reader::SliceReader;
use crate::database::Database;
use crate::error::{MerylError, Result};
use crate::kmer::string_to_packed;
use std::io::BufRead;
use std::path::Path;

/// Wraps one slice of an on-disk database, reconstructing each record's
/// full slice-local suffix from its `(block_prefix, residual)` pair.
pub struct DatabaseSliceInput {
    reader: Option<SliceReader>,
    residual_width: u32,
}

impl DatabaseSliceInput {
    pub fn open(db: &Database, slice: u32) -> Result<Self> {
        let suffix_bits = crate::schema::suffix_bits_from_mer_bits(db.index.k * 2);
        let residual_width = suffix_bits - db.index.block_prefix_width;
        Ok(DatabaseSliceInput {
            reader: db.open_slice(slice)?,
            residual_width,
        })
    }
}

impl SliceInput for DatabaseSliceInput {
    fn advance(&mut self) -> Result<Option<Record>> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };
        match reader.next_record()? {
            Some(rec) => {
                let suffix = ((rec.block_prefix as u128) << self.residual_width) | rec.suffix;
                Ok(Some(Record {
                    suffix,
                    value: rec.value,
                    label: rec.label,
                }))
            }
            None => Ok(None),
        }
    }
}

/// An already-sorted, in-memory slice of counted k-mers, as produced by
/// `CountArray::flush` during the counting pass over sequence input.
pub struct MemorySliceInput {
    records: std::vec::IntoIter<CountRecord>,
}

impl MemorySliceInput {
    pub fn new(records: Vec<CountRecord>) -> Self {
        MemorySliceInput {
            records: records.into_iter(),
        }
    }
}

impl SliceInput for MemorySliceInput {
    fn advance(&mut self) -> Result<Option<Record>> {
        Ok(self.records.next().map(|r| Record {
            suffix: r.suffix,
            value: r.value,
            label: r.label,
        }))
    }
}

/// A text list file (`meryl print` output or hand-authored): one
/// `kmer\tvalue[\tlabel]` line per k-mer, read in full and filtered down
/// to the records belonging to one slice. List files are expected to be
/// sorted by k-mer already, matching `meryl print`'s own output order.
pub struct ListSliceInput {
    records: std::vec::IntoIter<Record>,
}

impl ListSliceInput {
    pub fn open(path: impl AsRef<Path>, k: u32, slice: u32) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| MerylError::io(path, e))?;
        let suffix_bits = crate::schema::suffix_bits_from_mer_bits(k * 2);
        let mut records = Vec::new();

        for line in std::io::BufReader::new(file).lines() {
            let line = line.map_err(|e| MerylError::io(path, e))?;
            if line.is_empty() {
                continue;
            }
            let mut fields = line.split('\t');
            let kmer_field = fields.next().ok_or_else(|| malformed(path, &line))?;
            let value_field = fields.next().ok_or_else(|| malformed(path, &line))?;
            let label_field = fields.next();

            let packed =
                string_to_packed(k, kmer_field.as_bytes()).ok_or_else(|| malformed(path, &line))?;
            let value: u32 = value_field.parse().map_err(|_| malformed(path, &line))?;
            let label: u64 = match label_field {
                Some(text) if text.starts_with("0x") => {
                    u64::from_str_radix(&text[2..], 16).map_err(|_| malformed(path, &line))?
                }
                Some(text) => text.parse().map_err(|_| malformed(path, &line))?,
                None => 0,
            };

            let record_slice = (packed >> suffix_bits) as u32;
            if record_slice != slice {
                continue;
            }
            let suffix = packed & ((1u128 << suffix_bits) - 1);
            records.push(Record {
                suffix,
                value,
                label,
            });
        }

        records.sort_by_key(|r| r.suffix);
        Ok(ListSliceInput {
            records: records.into_iter(),
        })
    }
}

impl SliceInput for ListSliceInput {
    fn advance(&mut self) -> Result<Option<Record>> {
        Ok(self.records.next())
    }
}

fn malformed(path: &Path, line: &str) -> MerylError {
    MerylError::internal(format!("{}: malformed list line: {line:?}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::writer::StreamWriter;
    use crate::database::{index::Index, slice_path, Database};
    use crate::schema::KmerSchema;
    use tempfile::tempdir;

    #[test]
    fn database_slice_input_reconstructs_full_suffix() {
        let root = tempdir().unwrap();
        let final_dir = root.path().join("db.meryl");
        let schema = KmerSchema::new(8, 0).unwrap();

        let db = Database::create_atomically(&final_dir, &schema, |staging| {
            let mut w = StreamWriter::create(slice_path(staging, 0), 6, 4, 0).unwrap();
            w.add_mer(0b0001, 0b000101, 9, 0).unwrap();
            w.close().unwrap();
            let mut idx = Index::new(schema.k(), schema.label_width(), 6, 4);
            idx.num_distinct = 1;
            Ok(idx)
        })
        .unwrap();

        let mut input = DatabaseSliceInput::open(&db, 0).unwrap();
        let rec = input.advance().unwrap().unwrap();
        assert_eq!(rec.suffix, 0b0001_000101);
        assert_eq!(rec.value, 9);
        assert!(input.advance().unwrap().is_none());
    }

    #[test]
    fn list_slice_input_filters_by_slice_and_sorts() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("list.txt");
        // k=4 -> suffix_bits = 8 - 6 = 2, slice = top 6 bits of the 8-bit packed value.
        std::fs::write(&path, "AAAA\t3\nAAAC\t1\nGGGG\t2\n").unwrap();

        let mut input0 = ListSliceInput::open(&path, 4, 0).unwrap();
        let mut out = Vec::new();
        while let Some(rec) = input0.advance().unwrap() {
            out.push((rec.suffix, rec.value));
        }
        assert_eq!(out, vec![(0, 3), (1, 1)]);
    }
}
