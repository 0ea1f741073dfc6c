//! List/print output: each `(k-mer, value[, label])` record as
//! a tab-separated text line. A path with two or more `#` characters fans
//! out into one file per slice, written without locking; any other path is
//! a single shared writer serialized behind a mutex.

use crate::error::{MerylError, Result};
use crate::kmer::packed_to_string;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

fn hash_count(path: &str) -> usize {
    path.chars().filter(|&c| c == '#').count()
}

/// Substitutes the `#` run in `path` with the zero-padded `slice` index,
/// sized to the number of `#`s present.
fn slice_path_for(path: &str, slice: u32) -> PathBuf {
    let width = hash_count(path);
    let replacement = format!("{slice:0width$}", width = width);
    let run = "#".repeat(width);
    PathBuf::from(path.replacen(&run, &replacement, 1))
}

pub enum Printer {
    /// One independent writer per slice, no cross-slice synchronization.
    PerSlice { template: String },
    /// A single file (or stdout) shared across all slices.
    Shared(Mutex<Box<dyn Write + Send>>),
}

impl Printer {
    pub fn for_path(path: &str) -> Result<Printer> {
        if hash_count(path) >= 2 {
            Ok(Printer::PerSlice {
                template: path.to_string(),
            })
        } else {
            let file = File::create(path).map_err(|e| MerylError::io(Path::new(path), e))?;
            Ok(Printer::Shared(Mutex::new(Box::new(BufWriter::new(file)))))
        }
    }

    pub fn stdout() -> Printer {
        Printer::Shared(Mutex::new(Box::new(std::io::stdout())))
    }

    /// Opens (or reuses) the writer this slice should use, writes every
    /// record line by line, and flushes before returning.
    pub fn write_slice(
        &self,
        slice: u32,
        k: u32,
        records: impl IntoIterator<Item = (u128, u32, Option<u64>)>,
    ) -> Result<()> {
        match self {
            Printer::PerSlice { template } => {
                let path = slice_path_for(template, slice);
                let file = File::create(&path).map_err(|e| MerylError::io(&path, e))?;
                let mut writer = BufWriter::new(file);
                for (suffix, value, label) in records {
                    write_line(&mut writer, k, suffix, value, label)
                        .map_err(|e| MerylError::io(&path, e))?;
                }
                writer.flush().map_err(|e| MerylError::io(&path, e))?;
            }
            Printer::Shared(writer) => {
                let mut guard = writer.lock().unwrap();
                for (suffix, value, label) in records {
                    write_line(&mut *guard, k, suffix, value, label)
                        .map_err(|e| MerylError::internal(format!("print writer: {e}")))?;
                }
                guard.flush().map_err(|e| MerylError::internal(format!("print writer: {e}")))?;
            }
        }
        Ok(())
    }
}

fn write_line(
    w: &mut dyn Write,
    k: u32,
    suffix: u128,
    value: u32,
    label: Option<u64>,
) -> std::io::Result<()> {
    let text = packed_to_string(k, suffix);
    match label {
        Some(l) => writeln!(w, "{text}\t{value}\t{l:#x}"),
        None => writeln!(w, "{text}\t{value}"),
    }
}
