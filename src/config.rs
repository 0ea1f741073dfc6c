//! Run-wide configuration: carried explicitly through the
//! driver and scheduler instead of living as process-wide globals, the
//! same design choice `schema::KmerSchema` makes for k and label width.

use crate::error::{ConfigurationError, Result};
use crate::kmer::Strand;
use crate::schema::KmerSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountingMode {
    Auto,
    DirectArray,
    PartitionedSort,
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub schema: KmerSchema,
    /// Advisory but enforced memory budget, in bytes.
    pub memory_budget_bytes: u64,
    /// 0 lets the scheduler pick rayon's default.
    pub thread_budget: usize,
    /// Restrict counting output to k-mers ending in this base sequence,
    /// packed the same way as a k-mer suffix; `None` disables the filter.
    pub count_suffix: Option<(u32, u128)>,
    pub mode: CountingMode,
    /// Which strand(s) the counting driver emits: forward, reverse, or the
    /// canonical (lexicographically smaller) form.
    pub strand: Strand,
}

impl RunConfig {
    pub fn new(k: u32, label_width: u32, memory_budget_bytes: u64, thread_budget: usize) -> Result<Self> {
        let schema = KmerSchema::new(k, label_width)?;
        if memory_budget_bytes == 0 {
            return Err(ConfigurationError::BudgetTooSmall {
                budget_bytes: memory_budget_bytes,
                k,
            }
            .into());
        }
        Ok(RunConfig {
            schema,
            memory_budget_bytes,
            thread_budget,
            count_suffix: None,
            mode: CountingMode::Auto,
            strand: Strand::Canonical,
        })
    }

    pub fn with_count_suffix(mut self, width: u32, value: u128) -> Self {
        self.count_suffix = Some((width, value));
        self
    }

    pub fn with_mode(mut self, mode: CountingMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_strand(mut self, strand: Strand) -> Self {
        self.strand = strand;
        self
    }

    /// Whether direct-array counting (a flat `4^k`-entry counter table, one
    /// saturating `u32` per packed k-mer) fits the configured memory
    /// budget. Four bytes per entry rather than the byte-plus-overflow-plane
    /// scheme of a bit-packed counter, traded for a much simpler
    /// implementation; `driver::count_direct_array` uses the same layout.
    pub fn direct_array_fits_budget(&self) -> bool {
        let k = self.schema.k();
        if k > 31 {
            // 4^k would overflow a reasonable allocation long before this.
            return false;
        }
        let entries = 1u64 << (2 * k);
        entries
            .checked_mul(4)
            .map(|bytes| bytes <= self.memory_budget_bytes)
            .unwrap_or(false)
    }

    pub fn resolve_mode(&self) -> CountingMode {
        match self.mode {
            CountingMode::Auto => {
                if self.direct_array_fits_budget() {
                    CountingMode::DirectArray
                } else {
                    CountingMode::PartitionedSort
                }
            }
            explicit => explicit,
        }
    }
}
