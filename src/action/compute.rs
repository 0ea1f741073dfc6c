//! Per-slice compute instance: the runtime side of an `ActionTemplate`,
//! running the merge loop against one slice's worth
//! of inputs.

use super::assign::ActiveEntry;
use super::selector::{BaseCounts, EvalContext};
use super::{ActionKind, ActionTemplate, LabelAssign, Selector, ValueAssign};
use crate::histogram::Histogram;

/// One record as produced by any slice-local input: a database reader, a
/// sorted list reader, a counting pass over sequence, or an upstream
/// action's own `Compute`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record {
    pub suffix: u128,
    pub value: u32,
    pub label: u64,
}

/// A slice-local source of records in strictly ascending suffix order.
pub trait SliceInput {
    fn advance(&mut self) -> crate::error::Result<Option<Record>>;
}

/// Counts bases in the low `k` 2-bit codes of `suffix`. Slice-local inputs
/// only carry the suffix (the slice/block prefix bits live outside the
/// `Compute` loop), so `Bases` selectors see the suffix's bases, not the
/// full k-mer's; callers that need whole-k-mer base composition should
/// prefer a `Value`/`Label` selector fed from a precomputed annotation.
fn base_counts_of(suffix: u128, k: u32) -> BaseCounts {
    let mut counts = BaseCounts { a: 0, c: 0, g: 0, t: 0 };
    let mut v = suffix;
    for _ in 0..k {
        match (v & 0b11) as u8 {
            0 => counts.a += 1,
            1 => counts.c += 1,
            2 => counts.t += 1,
            3 => counts.g += 1,
            _ => unreachable!(),
        }
        v >>= 2;
    }
    counts
}

struct InputSlot {
    input: Box<dyn SliceInput>,
    current: Option<Record>,
    active_last_round: bool,
}

/// Runs one `ActionTemplate`'s merge loop over a fixed set of slice inputs,
/// yielding `(suffix, value, label)` triples in ascending order.
pub struct Compute {
    kind: ActionKind,
    value_assign: ValueAssign,
    label_assign: LabelAssign,
    selector: Selector,
    mer_bits: u32,
    slots: Vec<InputSlot>,
    pub histogram: Histogram,
    started: bool,
}

impl Compute {
    pub fn new(template: &ActionTemplate, inputs: Vec<Box<dyn SliceInput>>, mer_bits: u32) -> Self {
        Compute {
            kind: template.kind.clone(),
            value_assign: template.value_assign,
            label_assign: template.label_assign,
            selector: template.selector.clone(),
            mer_bits,
            slots: inputs
                .into_iter()
                .map(|input| InputSlot {
                    input,
                    current: None,
                    active_last_round: true,
                })
                .collect(),
            histogram: Histogram::new(),
            started: false,
        }
    }

    /// Runs the loop to completion for non-forwarding actions
    /// (histogram/statistics), returning the accumulated histogram.
    pub fn drain_into_histogram(&mut self) -> crate::error::Result<()> {
        debug_assert!(matches!(
            self.kind,
            ActionKind::Histogram | ActionKind::Statistics
        ));
        while let Some((_, value, _)) = self.next()? {
            self.histogram.observe(value);
        }
        Ok(())
    }

    /// Advances the merge loop by one emitted record, or returns `None` at
    /// end of stream.
    pub fn next(&mut self) -> crate::error::Result<Option<(u128, u32, u64)>> {
        loop {
            for slot in &mut self.slots {
                if slot.active_last_round {
                    slot.current = slot.input.advance()?;
                    slot.active_last_round = false;
                }
            }
            self.started = true;

            let min_suffix = self
                .slots
                .iter()
                .filter_map(|s| s.current.map(|r| r.suffix))
                .min();
            let Some(min_suffix) = min_suffix else {
                return Ok(None);
            };

            let active: Vec<ActiveEntry> = self
                .slots
                .iter()
                .enumerate()
                .filter_map(|(idx, s)| {
                    s.current.and_then(|r| {
                        (r.suffix == min_suffix).then_some(ActiveEntry {
                            input_index: idx,
                            value: r.value,
                            label: r.label,
                        })
                    })
                })
                .collect();

            let output_value = self.value_assign.apply(&active);
            let output_label = self.label_assign.apply(&active, self.value_assign);
            let ctx = EvalContext {
                active: &active,
                output_value,
                output_label,
                base_counts: base_counts_of(min_suffix, self.mer_bits / 2),
            };
            let emit = self.selector.evaluate(&ctx);

            for &entry in &active {
                self.slots[entry.input_index].active_last_round = true;
            }

            if emit {
                return Ok(Some((min_suffix, output_value, output_label)));
            }
            // Selector rejected this k-mer: the inputs tied for the
            // minimum must still advance past it next round; everything
            // else keeps pointing at its own current (larger) record.
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionTemplate, InputRef};

    struct VecInput {
        records: std::vec::IntoIter<Record>,
    }

    impl VecInput {
        fn new(records: Vec<Record>) -> Self {
            VecInput {
                records: records.into_iter(),
            }
        }
    }

    impl SliceInput for VecInput {
        fn advance(&mut self) -> crate::error::Result<Option<Record>> {
            Ok(self.records.next())
        }
    }

    fn rec(suffix: u128, value: u32) -> Record {
        Record {
            suffix,
            value,
            label: 0,
        }
    }

    #[test]
    fn union_sum_merges_two_sorted_inputs() {
        let template = crate::action::union_sum(vec![InputRef::Action(0), InputRef::Action(1)]);
        let a: Box<dyn SliceInput> = Box::new(VecInput::new(vec![rec(0, 3), rec(1, 1)]));
        let b: Box<dyn SliceInput> = Box::new(VecInput::new(vec![rec(0, 5), rec(2, 2)]));
        let mut compute = Compute::new(&template, vec![a, b], 6);

        let mut out = Vec::new();
        while let Some((suffix, value, _)) = compute.next().unwrap() {
            out.push((suffix, value));
        }
        assert_eq!(out, vec![(0, 8), (1, 1), (2, 2)]);
    }

    #[test]
    fn intersect_min_only_emits_shared_suffixes() {
        let template = crate::action::intersect_min(vec![InputRef::Action(0), InputRef::Action(1)]);
        let a: Box<dyn SliceInput> = Box::new(VecInput::new(vec![rec(0, 3), rec(1, 1)]));
        let b: Box<dyn SliceInput> = Box::new(VecInput::new(vec![rec(0, 5), rec(2, 2)]));
        let mut compute = Compute::new(&template, vec![a, b], 6);

        let mut out = Vec::new();
        while let Some((suffix, value, _)) = compute.next().unwrap() {
            out.push((suffix, value));
        }
        assert_eq!(out, vec![(0, 3)]);
    }

    #[test]
    fn filter_by_value_selector_drops_low_values() {
        let mut template = ActionTemplate::new(ActionKind::Filter);
        template.selector = Selector {
            products: vec![super::super::selector::Product {
                atoms: vec![super::super::selector::Atom::Value {
                    lhs: super::super::selector::Side::Output,
                    op: super::super::selector::Comparator::Ge,
                    rhs: super::super::selector::Side::Const(2),
                    negate: false,
                }],
            }],
        };
        template.value_assign = ValueAssign::Nop;
        let input: Box<dyn SliceInput> =
            Box::new(VecInput::new(vec![rec(0, 1), rec(1, 2), rec(2, 3)]));
        let mut compute = Compute::new(&template, vec![input], 6);

        let mut out = Vec::new();
        while let Some((suffix, value, _)) = compute.next().unwrap() {
            out.push((suffix, value));
        }
        assert_eq!(out, vec![(1, 2), (2, 3)]);
    }
}
