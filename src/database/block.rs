//! Per-block encode/decode: an Elias-Fano-like split of the in-block
//! residual suffix into a unary-delta-coded high part and a fixed-width
//! binary low part, plus a fixed-width binary value stream and an
//! optional fixed-width binary label stream.

use crate::bits::BitStream;
use crate::count_array::CountRecord;
use crate::error::{FormatError, MerylError, Result};
use std::path::Path;

pub const KMER_CODING_ELIAS_FANO: u8 = 1;
pub const COUNT_CODING_FIXED_BINARY: u8 = 1;

/// `ceil(log2(n))` computed by doubling, matching `libkmer.C`'s approach so
/// behavior at exact powers of two matches the original rather than a
/// float-log path.
pub fn unary_bits_for(n_kmers: u64) -> u32 {
    let mut bits = 0u32;
    let mut sum: u64 = 1;
    while sum < n_kmers {
        bits += 1;
        sum <<= 1;
    }
    bits
}

/// Encodes one block's records (already sorted ascending by `residual`,
/// which is the slice-local suffix with the block prefix bits stripped
/// off) into `out`.
pub fn encode_block(
    out: &mut BitStream,
    block_prefix: u64,
    block_prefix_width: u32,
    residual_width: u32,
    label_width: u32,
    records: &[CountRecord],
) {
    out.write_binary(block_prefix_width, block_prefix);
    out.write_binary(64, records.len() as u64);

    let unary_bits = unary_bits_for(records.len() as u64);
    let binary_bits = residual_width - unary_bits;

    out.write_binary(8, KMER_CODING_ELIAS_FANO as u64);
    out.write_binary(32, unary_bits as u64);
    out.write_binary(32, binary_bits as u64);

    let mut last_high: u64 = 0;
    for r in records {
        let high = if unary_bits == 0 {
            0
        } else {
            (r.suffix >> binary_bits) as u64
        };
        out.write_unary(high - last_high);
        write_wide(out, binary_bits, r.suffix & mask128(binary_bits));
        last_high = high;
    }

    out.write_binary(8, COUNT_CODING_FIXED_BINARY as u64);
    for r in records {
        out.write_binary(32, r.value as u64);
    }

    if label_width > 0 {
        for r in records {
            out.write_binary(label_width, r.label);
        }
    }
}

#[inline]
fn mask128(bits: u32) -> u128 {
    if bits == 0 {
        0
    } else if bits >= 128 {
        u128::MAX
    } else {
        (1u128 << bits) - 1
    }
}

/// `BitStream::write_binary` is capped at 64 bits; residual
/// suffix widths for large k can exceed that, so wide fields are split
/// into a (width-64)-bit high chunk and a 64-bit low chunk.
fn write_wide(out: &mut BitStream, width: u32, value: u128) {
    if width <= 64 {
        out.write_binary(width, value as u64);
        return;
    }
    let high_width = width - 64;
    out.write_binary(high_width, (value >> 64) as u64);
    out.write_binary(64, (value & mask128(64)) as u64);
}

fn read_wide(data: &mut BitStream, width: u32) -> Result<u128> {
    if width <= 64 {
        return Ok(data.read_binary(width)? as u128);
    }
    let high_width = width - 64;
    let high = data.read_binary(high_width)? as u128;
    let low = data.read_binary(64)? as u128;
    Ok((high << 64) | low)
}

/// Decodes one block, returning `(block_prefix, records)`. `path` and
/// `offset` are used only to annotate format errors.
pub fn decode_block(
    data: &mut BitStream,
    block_prefix_width: u32,
    label_width: u32,
    path: &Path,
) -> Result<(u64, Vec<CountRecord>)> {
    let premature = || {
        MerylError::Format(FormatError::PrematureEnd {
            path: path.to_path_buf(),
            offset: data.position(),
        })
    };

    let block_prefix = data.read_binary(block_prefix_width).map_err(|_| premature())?;
    let n_kmers = data.read_binary(64).map_err(|_| premature())?;

    let coding_type = data.read_binary(8).map_err(|_| premature())? as u8;
    if coding_type != KMER_CODING_ELIAS_FANO {
        return Err(FormatError::UnknownKmerCoding {
            path: path.to_path_buf(),
            coding_type,
        }
        .into());
    }
    let unary_bits = data.read_binary(32).map_err(|_| premature())? as u32;
    let binary_bits = data.read_binary(32).map_err(|_| premature())? as u32;

    let mut suffixes = Vec::with_capacity(n_kmers as usize);
    let mut high: u64 = 0;
    for _ in 0..n_kmers {
        let delta = data.read_unary().map_err(|_| premature())?;
        high += delta;
        let low = read_wide(data, binary_bits).map_err(|_| premature())?;
        let suffix = ((high as u128) << binary_bits) | low;
        suffixes.push(suffix);
    }

    let count_coding = data.read_binary(8).map_err(|_| premature())? as u8;
    if count_coding != COUNT_CODING_FIXED_BINARY {
        return Err(FormatError::UnknownCountCoding {
            path: path.to_path_buf(),
            coding_type: count_coding,
        }
        .into());
    }
    let mut values = Vec::with_capacity(n_kmers as usize);
    for _ in 0..n_kmers {
        values.push(data.read_binary(32).map_err(|_| premature())? as u32);
    }

    let mut labels = vec![0u64; n_kmers as usize];
    if label_width > 0 {
        for l in labels.iter_mut() {
            *l = data.read_binary(label_width).map_err(|_| premature())?;
        }
    }

    let mut records = Vec::with_capacity(n_kmers as usize);
    let mut prev: Option<u128> = None;
    for i in 0..n_kmers as usize {
        if let Some(p) = prev {
            if suffixes[i] < p {
                return Err(MerylError::internal(format!(
                    "{}: block at prefix {block_prefix} is not sorted ascending",
                    path.display()
                )));
            }
        }
        prev = Some(suffixes[i]);
        records.push(CountRecord {
            suffix: suffixes[i],
            value: values[i],
            label: labels[i],
        });
    }

    let _ = unary_bits;
    Ok((block_prefix, records))
}
