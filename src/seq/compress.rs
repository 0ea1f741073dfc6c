//! Transparent decompression by file extension: gzip, bzip2, and xz, so all
//! three compression schemes the crate depends on are actually reachable
//! from the CLI.

use crate::error::{MerylError, Result};
use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use xz2::read::XzDecoder;

/// Opens `path`, wrapping it in the decompressor implied by its extension.
/// Unrecognized extensions are read as plain text, matching `needletail`'s
/// own fallback.
pub fn open_transparent(path: impl AsRef<Path>) -> Result<Box<dyn Read + Send>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| MerylError::io(path, e))?;
    let reader = BufReader::new(file);

    match path.extension().and_then(|e| e.to_str()) {
        Some("gz") => Ok(Box::new(GzDecoder::new(reader))),
        Some("bz2") => Ok(Box::new(BzDecoder::new(reader))),
        Some("xz") => Ok(Box::new(XzDecoder::new(reader))),
        _ => Ok(Box::new(reader)),
    }
}

/// True if `path`'s extension marks it as one of the recognized
/// compression wrappers (as opposed to an uncompressed sequence file).
pub fn is_compressed(path: impl AsRef<Path>) -> bool {
    matches!(
        path.as_ref().extension().and_then(|e| e.to_str()),
        Some("gz") | Some("bz2") | Some("xz")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn gz_round_trips_through_open_transparent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reads.fa.gz");
        let file = File::create(&path).unwrap();
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder.write_all(b">seq1\nACGT\n").unwrap();
        encoder.finish().unwrap();

        let mut reader = open_transparent(&path).unwrap();
        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        assert_eq!(out, ">seq1\nACGT\n");
    }

    #[test]
    fn plain_file_passes_through_unmodified() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reads.fa");
        std::fs::write(&path, ">seq1\nACGT\n").unwrap();

        let mut reader = open_transparent(&path).unwrap();
        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        assert_eq!(out, ">seq1\nACGT\n");
    }

    #[test]
    fn extension_classification() {
        assert!(is_compressed("reads.fq.gz"));
        assert!(is_compressed("reads.fa.bz2"));
        assert!(is_compressed("reads.fa.xz"));
        assert!(!is_compressed("reads.fa"));
    }
}
