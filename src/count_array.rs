//! Per-prefix accumulator: collects the suffix (and optional
//! value/label) of every incoming k-mer sharing a prefix into segmented bit
//! pages, then sorts and reduces to a distinct, sorted list on flush.
//!
//! Pages are fixed-size and allocated whole, not doubled, so the running
//! memory-budget estimate tracked by the counting driver stays close to the
//! actual resident set.

use itertools::Itertools;

/// One OS page (4096 bytes = 512 64-bit words) minus a one-word header.
const PAGE_WORDS: usize = 511;
const WORD_BITS: u32 = 64;

#[derive(Debug, Default)]
struct SegmentedBits {
    pages: Vec<Vec<u64>>,
    len_bits: u64,
    read_pos: u64,
}

#[inline]
fn low_mask128(bits: u32) -> u128 {
    if bits == 0 {
        0
    } else if bits >= 128 {
        u128::MAX
    } else {
        (1u128 << bits) - 1
    }
}

impl SegmentedBits {
    fn ensure_page(&mut self, global_word_idx: usize) {
        let page_idx = global_word_idx / PAGE_WORDS;
        while self.pages.len() <= page_idx {
            self.pages.push(vec![0u64; PAGE_WORDS]);
        }
    }

    #[inline]
    fn word(&self, idx: usize) -> u64 {
        self.pages[idx / PAGE_WORDS][idx % PAGE_WORDS]
    }

    #[inline]
    fn word_mut(&mut self, idx: usize) -> &mut u64 {
        let page = idx / PAGE_WORDS;
        let word = idx % PAGE_WORDS;
        &mut self.pages[page][word]
    }

    fn write_binary(&mut self, width: u32, value: u128) {
        if width == 0 {
            return;
        }
        let start = self.len_bits;
        let end = start + width as u64;
        self.ensure_page(((end + WORD_BITS as u64 - 1) / WORD_BITS as u64) as usize - 1);

        let mut remaining = width;
        let mut bit_cursor = start;
        let mut v = value;

        while remaining > 0 {
            let word_idx = (bit_cursor / WORD_BITS as u64) as usize;
            let bit_in_word = (bit_cursor % WORD_BITS as u64) as u32;
            let space = WORD_BITS - bit_in_word;
            let take = remaining.min(space);

            let shift_out = remaining - take;
            let chunk = ((v >> shift_out) & low_mask128(take)) as u64;
            let dest_shift = space - take;
            *self.word_mut(word_idx) |= chunk << dest_shift;

            remaining -= take;
            bit_cursor += take as u64;
            v &= low_mask128(shift_out);
        }

        self.len_bits = end;
    }

    fn read_binary(&mut self, width: u32) -> u128 {
        if width == 0 {
            return 0;
        }
        let mut remaining = width;
        let mut bit_cursor = self.read_pos;
        let mut acc: u128 = 0;

        while remaining > 0 {
            let word_idx = (bit_cursor / WORD_BITS as u64) as usize;
            let bit_in_word = (bit_cursor % WORD_BITS as u64) as u32;
            let space = WORD_BITS - bit_in_word;
            let take = remaining.min(space);

            let dest_shift = space - take;
            let chunk = (self.word(word_idx) >> dest_shift) as u128 & low_mask128(take);
            acc = (acc << take) | chunk;

            remaining -= take;
            bit_cursor += take as u64;
        }

        self.read_pos = bit_cursor;
        acc
    }

    fn rewind(&mut self) {
        self.read_pos = 0;
    }

    fn resident_bytes(&self) -> usize {
        self.pages.len() * PAGE_WORDS * std::mem::size_of::<u64>()
    }

    fn clear(&mut self) {
        self.pages.clear();
        self.len_bits = 0;
        self.read_pos = 0;
    }
}

/// How occurrences sharing the same suffix are folded together on flush
///.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceMode {
    /// Default: value becomes the run length, label becomes the
    /// bitwise-OR of all occurrences' labels (or zero if no labels).
    CountOccurrences,
    /// No reduction: every input triple is preserved, even duplicate
    /// suffixes, provided they differ in value or label.
    MultiSet,
    /// Sum of input values with saturating addition at `u32::MAX`; labels
    /// OR-accumulated same as `CountOccurrences`.
    ImportedValueSum,
}

pub const SATURATED_VALUE: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CountRecord {
    pub suffix: u128,
    pub value: u32,
    pub label: u64,
}

/// Accumulates suffixes (and optional per-occurrence value/label) sharing
/// one prefix, until the host signals a flush.
pub struct CountArray {
    prefix: u64,
    suffix_width: u32,
    label_width: u32,
    has_values: bool,
    suffixes: SegmentedBits,
    values: SegmentedBits,
    labels: SegmentedBits,
    count: u64,
    last_reported_bytes: usize,
}

impl CountArray {
    pub fn new(prefix: u64, suffix_width: u32, label_width: u32, has_values: bool) -> Self {
        CountArray {
            prefix,
            suffix_width,
            label_width,
            has_values,
            suffixes: SegmentedBits::default(),
            values: SegmentedBits::default(),
            labels: SegmentedBits::default(),
            count: 0,
            last_reported_bytes: 0,
        }
    }

    #[inline]
    pub fn prefix(&self) -> u64 {
        self.prefix
    }

    #[inline]
    pub fn len(&self) -> u64 {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Appends one occurrence. `suffix` must fit in `suffix_width` bits.
    pub fn push(&mut self, suffix: u128, value: Option<u32>, label: Option<u64>) {
        self.suffixes.write_binary(self.suffix_width, suffix);
        if self.has_values {
            self.values
                .write_binary(32, value.unwrap_or(1) as u128);
        }
        if self.label_width > 0 {
            self.labels
                .write_binary(self.label_width, label.unwrap_or(0) as u128);
        }
        self.count += 1;
    }

    /// Bytes allocated (page-resident) since the last call to this method.
    pub fn used_size_delta(&mut self) -> usize {
        let total = self.suffixes.resident_bytes()
            + self.values.resident_bytes()
            + self.labels.resident_bytes();
        let delta = total.saturating_sub(self.last_reported_bytes);
        self.last_reported_bytes = total;
        delta
    }

    pub fn resident_bytes(&self) -> usize {
        self.suffixes.resident_bytes() + self.values.resident_bytes() + self.labels.resident_bytes()
    }

    /// Unpacks, sorts, and reduces the accumulated occurrences, then frees
    /// the page storage. Sort tie-break: suffix ascending, value
    /// ascending, label ascending.
    pub fn flush(&mut self, mode: ReduceMode) -> Vec<CountRecord> {
        self.suffixes.rewind();
        self.values.rewind();
        self.labels.rewind();

        let mut raw: Vec<CountRecord> = Vec::with_capacity(self.count as usize);
        for _ in 0..self.count {
            let suffix = self.suffixes.read_binary(self.suffix_width);
            let value = if self.has_values {
                self.values.read_binary(32) as u32
            } else {
                1
            };
            let label = if self.label_width > 0 {
                self.labels.read_binary(self.label_width) as u64
            } else {
                0
            };
            raw.push(CountRecord {
                suffix,
                value,
                label,
            });
        }
        raw.sort_unstable_by(|a, b| {
            a.suffix
                .cmp(&b.suffix)
                .then(a.value.cmp(&b.value))
                .then(a.label.cmp(&b.label))
        });

        let reduced = match mode {
            ReduceMode::MultiSet => raw,
            ReduceMode::CountOccurrences => raw
                .into_iter()
                .chunk_by(|r| r.suffix)
                .into_iter()
                .map(|(suffix, group)| {
                    let mut run_len: u32 = 0;
                    let mut label_acc: u64 = 0;
                    for r in group {
                        run_len = run_len.saturating_add(1);
                        label_acc |= r.label;
                    }
                    CountRecord {
                        suffix,
                        value: run_len,
                        label: label_acc,
                    }
                })
                .collect(),
            ReduceMode::ImportedValueSum => raw
                .into_iter()
                .chunk_by(|r| r.suffix)
                .into_iter()
                .map(|(suffix, group)| {
                    let mut value_acc: u32 = 0;
                    let mut label_acc: u64 = 0;
                    for r in group {
                        value_acc = value_acc.saturating_add(r.value).min(SATURATED_VALUE);
                        label_acc |= r.label;
                    }
                    CountRecord {
                        suffix,
                        value: value_acc,
                        label: label_acc,
                    }
                })
                .collect(),
        };

        self.suffixes.clear();
        self.values.clear();
        self.labels.clear();
        self.count = 0;
        self.last_reported_bytes = 0;

        reduced
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reduces_by_default_count_mode() {
        let mut arr = CountArray::new(0, 10, 0, false);
        arr.push(3, None, None);
        arr.push(1, None, None);
        arr.push(3, None, None);
        arr.push(2, None, None);
        arr.push(3, None, None);
        let out = arr.flush(ReduceMode::CountOccurrences);
        assert_eq!(
            out,
            vec![
                CountRecord { suffix: 1, value: 1, label: 0 },
                CountRecord { suffix: 2, value: 1, label: 0 },
                CountRecord { suffix: 3, value: 3, label: 0 },
            ]
        );
        assert!(arr.is_empty());
    }

    #[test]
    fn multiset_mode_preserves_every_occurrence() {
        let mut arr = CountArray::new(0, 10, 0, true);
        arr.push(5, Some(10), None);
        arr.push(5, Some(20), None);
        let out = arr.flush(ReduceMode::MultiSet);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].value, 10);
        assert_eq!(out[1].value, 20);
    }

    #[test]
    fn imported_value_sum_saturates() {
        let mut arr = CountArray::new(0, 10, 0, true);
        arr.push(1, Some(u32::MAX - 1), None);
        arr.push(1, Some(5), None);
        let out = arr.flush(ReduceMode::ImportedValueSum);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].value, SATURATED_VALUE);
    }

    #[test]
    fn label_is_or_accumulated() {
        let mut arr = CountArray::new(0, 10, 8, true);
        arr.push(1, Some(1), Some(0b0001));
        arr.push(1, Some(1), Some(0b0010));
        let out = arr.flush(ReduceMode::CountOccurrences);
        assert_eq!(out[0].label, 0b0011);
    }

    #[test]
    fn push_spans_many_pages() {
        let mut arr = CountArray::new(0, 17, 0, false);
        let n = 5000u128;
        for i in 0..n {
            arr.push(i % (1 << 17), None, None);
        }
        assert_eq!(arr.len(), n as u64);
        let out = arr.flush(ReduceMode::CountOccurrences);
        let total: u64 = out.iter().map(|r| r.value as u64).sum();
        assert_eq!(total, n as u64);
    }

    #[test]
    fn used_size_delta_tracks_growth() {
        let mut arr = CountArray::new(0, 40, 0, false);
        let d0 = arr.used_size_delta();
        assert_eq!(d0, 0);
        for i in 0..2000u128 {
            arr.push(i, None, None);
        }
        let d1 = arr.used_size_delta();
        assert!(d1 > 0);
        let d2 = arr.used_size_delta();
        assert_eq!(d2, 0, "no growth without new pushes");
    }
}
