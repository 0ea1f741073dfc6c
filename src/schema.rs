//! The k-mer schema: mer size and label width, carried as an explicit
//! immutable handle instead of process-wide global state.
//! Every k-mer-producing component is constructed with (or
//! inherits) a `KmerSchema`; opening a second database under a mismatched
//! schema is a configuration error.

use crate::error::{ConfigurationError, Result};

pub const MAX_MER_SIZE: u32 = 64;
pub const MAX_LABEL_WIDTH: u32 = 64;

/// The number of slice files a database is always partitioned into,
/// regardless of k or counting mode.
pub const NUM_SLICES: u32 = 64;
pub const SLICE_PREFIX_BITS: u32 = 6;

/// Width, in bits, of the suffix once the fixed slice prefix is removed
/// from a `mer_bits`-wide packed k-mer. Saturates to 0 rather than
/// underflowing for small k (k=1 and k=2 have fewer than `SLICE_PREFIX_BITS`
/// bits total). Shared by every site that only has `mer_bits`/`k` on hand
/// rather than a full `KmerSchema`.
#[inline]
pub fn suffix_bits_from_mer_bits(mer_bits: u32) -> u32 {
    mer_bits.saturating_sub(SLICE_PREFIX_BITS)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KmerSchema {
    k: u32,
    label_width: u32,
}

impl KmerSchema {
    pub fn new(k: u32, label_width: u32) -> Result<Self> {
        if k == 0 || k > MAX_MER_SIZE {
            return Err(ConfigurationError::InvalidMerSize(k).into());
        }
        if label_width > MAX_LABEL_WIDTH {
            return Err(ConfigurationError::InvalidLabelWidth(label_width).into());
        }
        Ok(KmerSchema { k, label_width })
    }

    #[inline]
    pub fn k(&self) -> u32 {
        self.k
    }

    #[inline]
    pub fn label_width(&self) -> u32 {
        self.label_width
    }

    /// Total width, in bits, of the packed 2k-bit k-mer.
    #[inline]
    pub fn mer_bits(&self) -> u32 {
        self.k * 2
    }

    /// Width, in bits, of the suffix once the fixed 6-bit slice prefix is
    /// removed from the 2k-bit k-mer.
    #[inline]
    pub fn suffix_bits(&self) -> u32 {
        suffix_bits_from_mer_bits(self.mer_bits())
    }

    /// Verify that `other` describes the same schema as `self`; used when
    /// opening a second database or list input into a running action.
    pub fn assert_compatible(&self, other: &KmerSchema, source: impl Into<String>) -> Result<()> {
        if self.k != other.k {
            return Err(ConfigurationError::MerSizeMismatch {
                expected: self.k,
                actual: other.k,
                source: source.into(),
            }
            .into());
        }
        if self.label_width != other.label_width {
            return Err(ConfigurationError::LabelWidthMismatch {
                expected: self.label_width,
                actual: other.label_width,
                source: source.into(),
            }
            .into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_and_oversized_k() {
        assert!(KmerSchema::new(0, 0).is_err());
        assert!(KmerSchema::new(65, 0).is_err());
        assert!(KmerSchema::new(64, 0).is_ok());
    }

    #[test]
    fn rejects_oversized_label_width() {
        assert!(KmerSchema::new(21, 65).is_err());
        assert!(KmerSchema::new(21, 64).is_ok());
    }

    #[test]
    fn suffix_bits_accounts_for_slice_prefix() {
        let schema = KmerSchema::new(21, 0).unwrap();
        assert_eq!(schema.mer_bits(), 42);
        assert_eq!(schema.suffix_bits(), 36);
    }

    #[test]
    fn suffix_bits_saturates_for_small_k() {
        // k=1 (mer_bits=2) and k=2 (mer_bits=4) have fewer bits than the
        // slice prefix; suffix_bits must saturate to 0, not underflow.
        assert_eq!(KmerSchema::new(1, 0).unwrap().suffix_bits(), 0);
        assert_eq!(KmerSchema::new(2, 0).unwrap().suffix_bits(), 0);
        assert_eq!(suffix_bits_from_mer_bits(2), 0);
        assert_eq!(suffix_bits_from_mer_bits(4), 0);
    }

    #[test]
    fn mismatch_is_reported() {
        let a = KmerSchema::new(21, 0).unwrap();
        let b = KmerSchema::new(19, 0).unwrap();
        assert!(a.assert_compatible(&b, "test.meryl").is_err());
    }
}
