//! The action tree: a forest of nodes describing counting,
//! set-algebra filtering, histogram/statistics, and list/print output,
//! built once at command time and cloned into 64 per-slice `Compute`
//! instances for the parallel phase ("cyclic ownership").
//!
//! Cross-references that the original keeps as raw pointers between
//! mirrored template/compute structures are kept here as dense indices
//! into `ActionTree`'s own `Vec`, so the whole tree (and its per-slice
//! clones) is a single flat array with no destructor-ordering concerns.

pub mod assign;
pub mod compute;
pub mod selector;

pub use assign::{LabelAssign, ValueAssign};
pub use selector::{Atom, Comparator, Product, Selector, Side};

/// A handle to a node's input: another node in the same tree, or an
/// external source resolved before the compute phase starts.
#[derive(Debug, Clone)]
pub enum InputRef {
    Action(usize),
    Database(std::path::PathBuf),
    List(std::path::PathBuf),
    Sequence(std::path::PathBuf),
}

/// What an action does with the k-mers it emits, beyond the common
/// value/label/selector machinery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionKind {
    /// Counts sequence input into a new multiset of (kmer, count).
    Counting,
    /// Filters/combines existing inputs via value-assign/label-assign/selector.
    Filter,
    /// Consumes one input, emits nothing, accumulates a histogram.
    Histogram,
    /// Consumes one input, emits nothing, accumulates summary statistics.
    Statistics,
    /// Consumes one input, writes each record as a text line.
    Print,
}

#[derive(Debug, Clone)]
pub struct ActionTemplate {
    pub kind: ActionKind,
    pub inputs: Vec<InputRef>,
    pub value_assign: ValueAssign,
    pub label_assign: LabelAssign,
    pub selector: Selector,
    pub database_output: Option<std::path::PathBuf>,
    pub list_output: Option<std::path::PathBuf>,
}

impl ActionTemplate {
    pub fn new(kind: ActionKind) -> Self {
        ActionTemplate {
            kind,
            inputs: Vec::new(),
            value_assign: ValueAssign::Nop,
            label_assign: LabelAssign::Nop,
            selector: Selector::always(),
            database_output: None,
            list_output: None,
        }
    }

    pub fn with_input(mut self, input: InputRef) -> Self {
        self.inputs.push(input);
        self
    }

    pub fn with_value_assign(mut self, rule: ValueAssign) -> Self {
        self.value_assign = rule;
        self
    }

    pub fn with_label_assign(mut self, rule: LabelAssign) -> Self {
        self.label_assign = rule;
        self
    }

    pub fn with_selector(mut self, selector: Selector) -> Self {
        self.selector = selector;
        self
    }
}

/// A forest of `ActionTemplate`s, addressed by dense index. `InputRef::Action`
/// indices are into this same vector.
#[derive(Debug, Clone, Default)]
pub struct ActionTree {
    pub nodes: Vec<ActionTemplate>,
}

impl ActionTree {
    pub fn new() -> Self {
        ActionTree::default()
    }

    pub fn push(&mut self, node: ActionTemplate) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }
}

/// `union = (present in any, value=Count, label=Or)`.
pub fn union(inputs: Vec<InputRef>) -> ActionTemplate {
    let n = inputs.len();
    ActionTemplate::new(ActionKind::Filter)
        .with_selector(Selector::present_in_any(n))
        .with_value_assign(ValueAssign::Count)
        .with_label_assign(LabelAssign::Or(0))
        .with_inputs(inputs)
}

pub fn union_min(inputs: Vec<InputRef>) -> ActionTemplate {
    union(inputs).with_value_assign(ValueAssign::Min(u32::MAX))
}

pub fn union_max(inputs: Vec<InputRef>) -> ActionTemplate {
    union(inputs).with_value_assign(ValueAssign::Max(0))
}

pub fn union_sum(inputs: Vec<InputRef>) -> ActionTemplate {
    union(inputs).with_value_assign(ValueAssign::Add(0))
}

/// `intersect = (present in all, value=First, label=And)`.
pub fn intersect(inputs: Vec<InputRef>) -> ActionTemplate {
    let n = inputs.len();
    ActionTemplate::new(ActionKind::Filter)
        .with_selector(Selector::present_in_all(n))
        .with_value_assign(ValueAssign::First)
        .with_label_assign(LabelAssign::And(u64::MAX))
        .with_inputs(inputs)
}

pub fn intersect_min(inputs: Vec<InputRef>) -> ActionTemplate {
    intersect(inputs).with_value_assign(ValueAssign::Min(u32::MAX))
}

pub fn intersect_max(inputs: Vec<InputRef>) -> ActionTemplate {
    intersect(inputs).with_value_assign(ValueAssign::Max(0))
}

pub fn intersect_sum(inputs: Vec<InputRef>) -> ActionTemplate {
    intersect(inputs).with_value_assign(ValueAssign::Add(0))
}

/// `subtract = (present in input 0, value=Sub, label=Difference)`.
pub fn subtract(inputs: Vec<InputRef>) -> ActionTemplate {
    ActionTemplate::new(ActionKind::Filter)
        .with_selector(Selector::present_in_input(0))
        .with_value_assign(ValueAssign::Sub(0))
        .with_label_assign(LabelAssign::Difference)
        .with_inputs(inputs)
}

/// `difference = (present only in input 0, value=First, label=First)`.
pub fn difference(inputs: Vec<InputRef>) -> ActionTemplate {
    ActionTemplate::new(ActionKind::Filter)
        .with_selector(Selector::present_only_in_input(0))
        .with_value_assign(ValueAssign::First)
        .with_label_assign(LabelAssign::First)
        .with_inputs(inputs)
}

impl ActionTemplate {
    fn with_inputs(mut self, inputs: Vec<InputRef>) -> Self {
        self.inputs = inputs;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_alias_sets_count_and_or() {
        let u = union(vec![InputRef::Action(0), InputRef::Action(1)]);
        assert_eq!(u.value_assign, ValueAssign::Count);
        assert_eq!(u.label_assign, LabelAssign::Or(0));
    }

    #[test]
    fn intersect_alias_sets_first_and_and() {
        let i = intersect(vec![InputRef::Action(0), InputRef::Action(1)]);
        assert_eq!(i.value_assign, ValueAssign::First);
        assert_eq!(i.label_assign, LabelAssign::And(u64::MAX));
    }
}
