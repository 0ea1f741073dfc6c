//! The counting/action driver: turns an `ActionTree` node
//! into a concrete result — a database, a histogram, or printed text — by
//! recursively wiring up `SliceInput`s and running the per-slice merge loop
//! across all `NUM_SLICES` slices in parallel.
//!
//! Counting nodes are special-cased: unlike a `Filter`/set-algebra node,
//! which merges already-sorted per-slice streams, a counting node scans raw
//! sequence input once, bucket-sorts every canonical k-mer occurrence by
//! slice into a `CountArray`, and only then looks like a sorted per-slice
//! stream to the rest of the tree. That scan-and-reduce happens once per
//! counting node and is cached, since every downstream reference to the
//! same node must see the same counted multiset.

use crate::action::compute::{Compute, Record, SliceInput};
use crate::action::{ActionKind, ActionTree, InputRef};
use crate::config::{CountingMode, RunConfig};
use crate::count_array::{CountArray, CountRecord, ReduceMode};
use crate::database::index::Index;
use crate::database::writer::StreamWriter;
use crate::database::{self, Database};
use crate::error::{ConfigurationError, MerylError, Result};
use crate::histogram::Histogram;
use crate::input::{DatabaseSliceInput, ListSliceInput, MemorySliceInput};
use crate::kmer::iter::KmerIter;
use crate::kmer::Strand;
use crate::printer::Printer;
use crate::schema::{KmerSchema, SLICE_PREFIX_BITS};
use crate::scheduler;
use crate::seq;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Adapts a nested `Compute` (the output of an upstream action node) into a
/// `SliceInput` another node can merge over.
struct ComputeSliceInput {
    compute: Compute,
}

impl SliceInput for ComputeSliceInput {
    fn advance(&mut self) -> Result<Option<Record>> {
        match self.compute.next()? {
            Some((suffix, value, label)) => Ok(Some(Record {
                suffix,
                value,
                label,
            })),
            None => Ok(None),
        }
    }
}

/// Whether a selected k-mer value's low `width` bits match a count-suffix
/// restriction; always true when no restriction is configured.
fn matches_count_suffix(selected: u128, count_suffix: Option<(u32, u128)>) -> bool {
    match count_suffix {
        Some((width, value)) => {
            let mask = if width == 0 { 0 } else { (1u128 << width) - 1 };
            (selected & mask) == (value & mask)
        }
        None => true,
    }
}

/// Scans `paths` once, routing every selected-strand k-mer occurrence into
/// the `CountArray` for its slice, then flushes each slice to a sorted,
/// distinct-reduced record list. The partitioned-sort counting path.
fn count_into_slices(
    paths: &[PathBuf],
    k: u32,
    suffix_bits: u32,
    strand: Strand,
    count_suffix: Option<(u32, u128)>,
) -> Result<Vec<Vec<CountRecord>>> {
    let mut arrays: Vec<CountArray> = (0..crate::schema::NUM_SLICES)
        .map(|s| CountArray::new(s as u64, suffix_bits, 0, false))
        .collect();

    seq::for_each_record(paths, |rec| {
        for occ in KmerIter::new(&rec.bases, k) {
            let selected = occ.for_strand(strand);
            if !matches_count_suffix(selected, count_suffix) {
                continue;
            }
            let slice = (selected >> suffix_bits) as usize;
            let suffix = selected & ((1u128 << suffix_bits) - 1);
            arrays[slice].push(suffix, None, None);
        }
        Ok(())
    })?;

    Ok(arrays
        .into_iter()
        .map(|mut a| a.flush(ReduceMode::CountOccurrences))
        .collect())
}

/// Direct flat-array counting for small k: one saturating `u32` counter per
/// packed k-mer value, indexed directly rather than bucketed by prefix and
/// sorted afterward. Chosen by `RunConfig::resolve_mode` only when the
/// whole `4^k`-entry table comfortably fits the memory budget.
fn count_direct_array(
    paths: &[PathBuf],
    k: u32,
    suffix_bits: u32,
    strand: Strand,
    count_suffix: Option<(u32, u128)>,
) -> Result<Vec<Vec<CountRecord>>> {
    let entries = 1usize << (2 * k);
    let mut counts = vec![0u32; entries];

    seq::for_each_record(paths, |rec| {
        for occ in KmerIter::new(&rec.bases, k) {
            let selected = occ.for_strand(strand);
            if !matches_count_suffix(selected, count_suffix) {
                continue;
            }
            let idx = selected as usize;
            counts[idx] = counts[idx].saturating_add(1);
        }
        Ok(())
    })?;

    let mut per_slice: Vec<Vec<CountRecord>> = (0..crate::schema::NUM_SLICES as usize)
        .map(|_| Vec::new())
        .collect();
    for (packed, &count) in counts.iter().enumerate() {
        if count == 0 {
            continue;
        }
        let packed = packed as u128;
        let slice = (packed >> suffix_bits) as usize;
        let suffix = packed & ((1u128 << suffix_bits) - 1);
        per_slice[slice].push(CountRecord {
            suffix,
            value: count,
            label: 0,
        });
    }
    for bucket in &mut per_slice {
        bucket.sort_unstable_by_key(|r| r.suffix);
    }
    Ok(per_slice)
}

/// Picks how many bits of a slice-local suffix head each on-disk block, per
/// the direct-array/partitioned-sort split: direct-array mode
/// keeps one block per slice (the whole suffix range fits comfortably), and
/// partitioned-sort mode caps block width so no single block dominates the
/// memory budget while encoding.
pub fn choose_block_prefix_width(mode: crate::config::CountingMode, suffix_bits: u32) -> u32 {
    match mode {
        crate::config::CountingMode::DirectArray => 0,
        crate::config::CountingMode::PartitionedSort => suffix_bits.min(12),
        crate::config::CountingMode::Auto => suffix_bits.min(12),
    }
}

/// Runs an `ActionTree` to a concrete result for one node at a time. Built
/// once per command invocation; counting results are memoized across the
/// lifetime of one `Driver` so a counting node referenced by more than one
/// downstream action is only scanned once.
pub struct Driver<'a> {
    tree: &'a ActionTree,
    schema: KmerSchema,
    thread_budget: usize,
    strand: Strand,
    count_suffix: Option<(u32, u128)>,
    mode: CountingMode,
    counted_cache: Mutex<HashMap<usize, Arc<Vec<Vec<CountRecord>>>>>,
}

impl<'a> Driver<'a> {
    pub fn new(tree: &'a ActionTree, config: &RunConfig) -> Self {
        Driver {
            tree,
            schema: config.schema,
            thread_budget: config.thread_budget,
            strand: config.strand,
            count_suffix: config.count_suffix,
            mode: config.resolve_mode(),
            counted_cache: Mutex::new(HashMap::new()),
        }
    }

    fn counted_slices(&self, node_idx: usize) -> Result<Arc<Vec<Vec<CountRecord>>>> {
        if let Some(cached) = self.counted_cache.lock().unwrap().get(&node_idx) {
            return Ok(Arc::clone(cached));
        }
        let node = &self.tree.nodes[node_idx];
        let seq_paths: Vec<PathBuf> = node
            .inputs
            .iter()
            .filter_map(|i| match i {
                InputRef::Sequence(p) => Some(p.clone()),
                _ => None,
            })
            .collect();
        if seq_paths.is_empty() {
            return Err(ConfigurationError::CountingWithoutSequenceInput.into());
        }
        let expanded = seq::expand_inputs(&seq_paths)?;
        let per_slice = match self.mode {
            CountingMode::DirectArray => count_direct_array(
                &expanded,
                self.schema.k(),
                self.schema.suffix_bits(),
                self.strand,
                self.count_suffix,
            )?,
            CountingMode::PartitionedSort | CountingMode::Auto => count_into_slices(
                &expanded,
                self.schema.k(),
                self.schema.suffix_bits(),
                self.strand,
                self.count_suffix,
            )?,
        };
        let arc = Arc::new(per_slice);
        self.counted_cache
            .lock()
            .unwrap()
            .insert(node_idx, Arc::clone(&arc));
        Ok(arc)
    }

    fn build_slice_input(&self, input_ref: &InputRef, slice: u32) -> Result<Box<dyn SliceInput>> {
        match input_ref {
            InputRef::Action(j) => {
                let compute = self.build_compute(*j, slice)?;
                Ok(Box::new(ComputeSliceInput { compute }))
            }
            InputRef::Database(path) => {
                let db = Database::open(path)?;
                self.schema.assert_compatible(
                    &KmerSchema::new(db.index.k, db.index.label_width)?,
                    path.display().to_string(),
                )?;
                Ok(Box::new(DatabaseSliceInput::open(&db, slice)?))
            }
            InputRef::List(path) => Ok(Box::new(ListSliceInput::open(
                path,
                self.schema.k(),
                slice,
            )?)),
            InputRef::Sequence(_) => Err(MerylError::internal(
                "a sequence input can only feed a counting action directly",
            )),
        }
    }

    fn build_compute(&self, node_idx: usize, slice: u32) -> Result<Compute> {
        let node = &self.tree.nodes[node_idx];
        if node.kind == ActionKind::Counting {
            let per_slice = self.counted_slices(node_idx)?;
            let records = per_slice[slice as usize].clone();
            let input: Box<dyn SliceInput> = Box::new(MemorySliceInput::new(records));
            return Ok(Compute::new(node, vec![input], self.schema.mer_bits()));
        }

        let mut inputs = Vec::with_capacity(node.inputs.len());
        for input_ref in &node.inputs {
            inputs.push(self.build_slice_input(input_ref, slice)?);
        }
        Ok(Compute::new(node, inputs, self.schema.mer_bits()))
    }

    /// Materializes a node's output as a new on-disk database.
    pub fn run_to_database(
        &self,
        node_idx: usize,
        output_dir: impl AsRef<Path>,
        block_prefix_width: u32,
    ) -> Result<Database> {
        let residual_width = self.schema.suffix_bits() - block_prefix_width;
        Database::create_atomically(output_dir, &self.schema, |staging| {
            let results: Vec<(u64, Histogram)> =
                scheduler::run_all_slices(self.thread_budget, |slice| {
                    let mut compute = self.build_compute(node_idx, slice)?;
                    let mut writer = StreamWriter::create(
                        database::slice_path(staging, slice),
                        residual_width,
                        block_prefix_width,
                        self.schema.label_width(),
                    )?;
                    let mut hist = Histogram::new();
                    let mut total = 0u64;
                    while let Some((suffix, value, label)) = compute.next()? {
                        hist.observe(value);
                        total += 1;
                        let block_prefix = if block_prefix_width == 0 {
                            0
                        } else {
                            (suffix >> residual_width) as u64
                        };
                        let residual = suffix & ((1u128 << residual_width) - 1);
                        writer.add_mer(block_prefix, residual, value, label)?;
                    }
                    writer.close()?;
                    Ok((total, hist))
                })?;

            let mut index = Index::new(
                self.schema.k(),
                self.schema.label_width(),
                SLICE_PREFIX_BITS,
                block_prefix_width,
            );
            let mut histogram = Histogram::new();
            let mut num_distinct = 0u64;
            for (total, hist) in &results {
                num_distinct += total;
                histogram.merge(hist);
            }
            let stats = histogram.statistics();
            index.num_distinct = num_distinct;
            index.num_unique = stats.unique_kmers;
            index.num_total = stats.total_kmers;
            index.histogram = histogram.entries();
            Ok(index)
        })
    }

    /// Drains a node's output into a single merged histogram, without
    /// writing a database (the `Histogram`/`Statistics` action kinds).
    pub fn run_to_histogram(&self, node_idx: usize) -> Result<Histogram> {
        let per_slice: Vec<Histogram> = scheduler::run_all_slices(self.thread_budget, |slice| {
            let mut compute = self.build_compute(node_idx, slice)?;
            compute.drain_into_histogram()?;
            Ok(compute.histogram)
        })?;
        let mut merged = Histogram::new();
        for h in per_slice {
            merged.merge(&h);
        }
        Ok(merged)
    }

    /// Drains a node's output through `printer` (the `Print` action kind).
    pub fn run_to_printer(&self, node_idx: usize, printer: &Printer) -> Result<()> {
        scheduler::run_all_slices(self.thread_budget, |slice| {
            let mut compute = self.build_compute(node_idx, slice)?;
            let mut records = Vec::new();
            while let Some((suffix, value, label)) = compute.next()? {
                let label_opt = (self.schema.label_width() > 0).then_some(label);
                records.push((suffix, value, label_opt));
            }
            printer.write_slice(slice, self.schema.k(), records)
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionTemplate, ActionTree};
    use tempfile::tempdir;

    fn write_fasta(dir: &std::path::Path, name: &str, seq: &[u8]) -> PathBuf {
        let path = dir.join(name);
        let mut content = Vec::new();
        content.extend_from_slice(b">r\n");
        content.extend_from_slice(seq);
        content.push(b'\n');
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn counts_acgtacgt_at_k4() {
        let dir = tempdir().unwrap();
        let fasta = write_fasta(dir.path(), "reads.fa", b"ACGTACGT");

        let mut tree = ActionTree::new();
        let node = ActionTemplate::new(ActionKind::Counting)
            .with_input(InputRef::Sequence(fasta));
        tree.push(node);

        let config = RunConfig::new(4, 0, 1 << 20, 1).unwrap();
        let driver = Driver::new(&tree, &config);
        let hist = driver.run_to_histogram(0).unwrap();
        // ACGT:2, CGTA:1, GTAC:1, TACG:1 -> histogram {1:3, 2:1}
        assert_eq!(hist.entries(), vec![(1, 3), (2, 1)]);
    }

    #[test]
    fn counts_tttt_at_k3_forward_only_differs_from_canonical() {
        let dir = tempdir().unwrap();
        let fasta = write_fasta(dir.path(), "reads.fa", b"TTTT");

        let mut tree = ActionTree::new();
        let node = ActionTemplate::new(ActionKind::Counting)
            .with_input(InputRef::Sequence(fasta));
        tree.push(node);

        // TTT's canonical form is AAA (its reverse complement), so forward-only
        // emission must still report the count under TTT's own packed value
        // rather than silently folding onto the canonical form.
        let config = RunConfig::new(3, 0, 1 << 20, 1)
            .unwrap()
            .with_strand(Strand::Forward);
        let driver = Driver::new(&tree, &config);
        let hist = driver.run_to_histogram(0).unwrap();
        // two windows, both forward "TTT" -> one distinct k-mer with value 2
        assert_eq!(hist.entries(), vec![(2, 1)]);

        let canonical_config = RunConfig::new(3, 0, 1 << 20, 1).unwrap();
        let canonical_driver = Driver::new(&tree, &canonical_config);
        let canonical_hist = canonical_driver.run_to_histogram(0).unwrap();
        // canonical folds TTT onto AAA, but the resulting histogram shape is
        // the same here (one distinct k-mer, value 2) -- the point is that
        // forward-only emission did not error or silently no-op, it took the
        // explicit forward path through `for_strand`.
        assert_eq!(canonical_hist.entries(), vec![(2, 1)]);
    }

    #[test]
    fn union_sum_of_two_counted_inputs() {
        let dir = tempdir().unwrap();
        let a = write_fasta(dir.path(), "a.fa", b"AAAAAA"); // AAA x4 (k=3, palindrome-free overlaps)
        let b = write_fasta(dir.path(), "b.fa", b"AAA");

        let mut tree = ActionTree::new();
        let count_a = tree.push(
            ActionTemplate::new(ActionKind::Counting).with_input(InputRef::Sequence(a)),
        );
        let count_b = tree.push(
            ActionTemplate::new(ActionKind::Counting).with_input(InputRef::Sequence(b)),
        );
        let union_node = crate::action::union_sum(vec![
            InputRef::Action(count_a),
            InputRef::Action(count_b),
        ]);
        tree.push(union_node);

        let config = RunConfig::new(3, 0, 1 << 20, 1).unwrap();
        let driver = Driver::new(&tree, &config);
        let hist = driver.run_to_histogram(2).unwrap();
        // a: AAA appears 4 times (positions 0..4 in "AAAAAA"); b: AAA once. sum = 5.
        assert_eq!(hist.entries(), vec![(5, 1)]);
    }

    #[test]
    fn intersect_min_of_two_counted_databases() {
        let dir = tempdir().unwrap();
        let a = write_fasta(dir.path(), "a.fa", b"AAAAAA"); // AAA x4
        let b = write_fasta(dir.path(), "b.fa", b"AAA"); // AAA x1

        let mut tree = ActionTree::new();
        let count_a = tree.push(
            ActionTemplate::new(ActionKind::Counting).with_input(InputRef::Sequence(a)),
        );
        let count_b = tree.push(
            ActionTemplate::new(ActionKind::Counting).with_input(InputRef::Sequence(b)),
        );
        let intersect_node = crate::action::intersect_min(vec![
            InputRef::Action(count_a),
            InputRef::Action(count_b),
        ]);
        tree.push(intersect_node);

        let config = RunConfig::new(3, 0, 1 << 20, 1).unwrap();
        let driver = Driver::new(&tree, &config);
        let hist = driver.run_to_histogram(2).unwrap();
        // min(4, 1) = 1
        assert_eq!(hist.entries(), vec![(1, 1)]);
    }

    #[test]
    fn counting_into_a_database_records_accurate_index_stats() {
        let dir = tempdir().unwrap();
        let fasta = write_fasta(dir.path(), "reads.fa", b"ACGTACGT");

        let mut tree = ActionTree::new();
        let node = ActionTemplate::new(ActionKind::Counting)
            .with_input(InputRef::Sequence(fasta));
        tree.push(node);

        let config = RunConfig::new(4, 0, 1 << 20, 1).unwrap();
        let driver = Driver::new(&tree, &config);
        let out_dir = dir.path().join("out.meryl");
        let db = driver.run_to_database(0, &out_dir, 0).unwrap();

        // ACGT:2, CGTA:1, GTAC:1, TACG:1 -> 4 distinct k-mers, 5 total occurrences.
        assert_eq!(db.index.num_distinct, 4);
        assert_eq!(db.index.num_total, 5);
    }

    #[test]
    fn filter_drops_kmers_below_threshold() {
        let dir = tempdir().unwrap();
        let fasta = write_fasta(dir.path(), "reads.fa", b"ACGTACGT");

        let mut tree = ActionTree::new();
        let count = tree.push(
            ActionTemplate::new(ActionKind::Counting).with_input(InputRef::Sequence(fasta)),
        );
        let selector = crate::action::Selector {
            products: vec![crate::action::Product {
                atoms: vec![crate::action::Atom::Value {
                    lhs: crate::action::Side::Output,
                    op: crate::action::Comparator::Ge,
                    rhs: crate::action::Side::Const(2),
                    negate: false,
                }],
            }],
        };
        let filter_node = ActionTemplate::new(ActionKind::Filter)
            .with_input(InputRef::Action(count))
            .with_selector(selector);
        tree.push(filter_node);

        let config = RunConfig::new(4, 0, 1 << 20, 1).unwrap();
        let driver = Driver::new(&tree, &config);
        let hist = driver.run_to_histogram(1).unwrap();
        // only ACGT (value 2) survives a >=2 filter; CGTA/GTAC/TACG (value 1) are dropped.
        assert_eq!(hist.entries(), vec![(2, 1)]);
    }

    #[test]
    fn direct_array_and_partitioned_sort_modes_agree() {
        let dir = tempdir().unwrap();
        let fasta = write_fasta(dir.path(), "reads.fa", b"ACGTACGTTTACGGCATCGA");

        let mut tree = ActionTree::new();
        let node = ActionTemplate::new(ActionKind::Counting)
            .with_input(InputRef::Sequence(fasta));
        tree.push(node);

        let direct_config = RunConfig::new(4, 0, 1 << 20, 1)
            .unwrap()
            .with_mode(CountingMode::DirectArray);
        let direct_driver = Driver::new(&tree, &direct_config);
        let direct_hist = direct_driver.run_to_histogram(0).unwrap();

        let sorted_config = RunConfig::new(4, 0, 1 << 20, 1)
            .unwrap()
            .with_mode(CountingMode::PartitionedSort);
        let sorted_driver = Driver::new(&tree, &sorted_config);
        let sorted_hist = sorted_driver.run_to_histogram(0).unwrap();

        assert_eq!(direct_hist.entries(), sorted_hist.entries());
    }
}
