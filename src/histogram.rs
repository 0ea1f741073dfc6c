//! Value-distribution accumulator for the histogram/statistics actions.
//! One accumulator runs per slice during the compute pass;
//! `Histogram::merge` folds the 64 per-slice accumulators together at end
//! of stream, the same shape as `CountArray`'s per-slice design.

use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct Histogram {
    /// value -> number of distinct k-mers observed with that value.
    counts: BTreeMap<u32, u64>,
}

impl Histogram {
    pub fn new() -> Self {
        Histogram::default()
    }

    pub fn observe(&mut self, value: u32) {
        *self.counts.entry(value).or_insert(0) += 1;
    }

    pub fn merge(&mut self, other: &Histogram) {
        for (&value, &occurrences) in &other.counts {
            *self.counts.entry(value).or_insert(0) += occurrences;
        }
    }

    /// `(value, occurrences)` pairs in ascending value order.
    pub fn entries(&self) -> Vec<(u32, u64)> {
        self.counts.iter().map(|(&v, &c)| (v, c)).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Renders the textual histogram report: one `value<TAB>occurrences`
    /// line per value seen, ascending.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (value, occurrences) in self.entries() {
            out.push_str(&format!("{value}\t{occurrences}\n"));
        }
        out
    }

    pub fn statistics(&self) -> Statistics {
        let mut distinct = 0u64;
        let mut unique = 0u64;
        let mut total = 0u64;
        for (&value, &occurrences) in &self.counts {
            distinct += occurrences;
            total += value as u64 * occurrences;
            if value == 1 {
                unique += occurrences;
            }
        }

        let mut cumulative = Vec::with_capacity(self.counts.len());
        let mut running = 0u64;
        for (value, occurrences) in self.entries() {
            running += occurrences;
            cumulative.push(CumulativeEntry {
                value,
                occurrences,
                cumulative_distinct: running,
            });
        }

        Statistics {
            total_kmers: total,
            distinct_kmers: distinct,
            unique_kmers: unique,
            cumulative_distribution: cumulative,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CumulativeEntry {
    pub value: u32,
    pub occurrences: u64,
    pub cumulative_distinct: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Statistics {
    pub total_kmers: u64,
    pub distinct_kmers: u64,
    pub unique_kmers: u64,
    pub cumulative_distribution: Vec<CumulativeEntry>,
}

impl Statistics {
    pub fn to_report(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("total\t{}\n", self.total_kmers));
        out.push_str(&format!("distinct\t{}\n", self.distinct_kmers));
        out.push_str(&format!("unique\t{}\n", self.unique_kmers));
        out
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merges_per_slice_accumulators() {
        let mut a = Histogram::new();
        a.observe(1);
        a.observe(1);
        a.observe(3);

        let mut b = Histogram::new();
        b.observe(1);
        b.observe(2);

        a.merge(&b);
        assert_eq!(a.entries(), vec![(1, 3), (2, 1), (3, 1)]);
    }

    #[test]
    fn statistics_match_spec_example() {
        // "AAACCCAAA" at k=3: AAA x3 (folds to value 3), AAC x1, ACC x1,
        // CCC x1, CCA x1, CAA x1 -> values {3,1,1,1,1,1}; histogram {1:5,3:1}.
        let mut h = Histogram::new();
        for _ in 0..5 {
            h.observe(1);
        }
        h.observe(3);
        let stats = h.statistics();
        assert_eq!(stats.distinct_kmers, 6);
        assert_eq!(stats.unique_kmers, 5);
        assert_eq!(stats.total_kmers, 5 + 3);
    }

    #[test]
    fn render_is_tab_separated_ascending() {
        let mut h = Histogram::new();
        h.observe(2);
        h.observe(1);
        h.observe(2);
        assert_eq!(h.render(), "1\t1\n2\t2\n");
    }

    #[test]
    fn cumulative_distribution_is_monotonic() {
        let mut h = Histogram::new();
        h.observe(1);
        h.observe(1);
        h.observe(5);
        let stats = h.statistics();
        let running: Vec<u64> = stats
            .cumulative_distribution
            .iter()
            .map(|e| e.cumulative_distinct)
            .collect();
        assert_eq!(running, vec![2, 3]);
    }
}
