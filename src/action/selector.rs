//! Selector evaluation: a sum-of-products boolean expression over the
//! active list built by the per-slice compute loop.

use super::assign::ActiveEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Lt,
    Le,
    Eq,
    Ne,
    Ge,
    Gt,
}

impl Comparator {
    fn apply<T: PartialOrd>(&self, lhs: T, rhs: T) -> bool {
        match self {
            Comparator::Lt => lhs < rhs,
            Comparator::Le => lhs <= rhs,
            Comparator::Eq => lhs == rhs,
            Comparator::Ne => lhs != rhs,
            Comparator::Ge => lhs >= rhs,
            Comparator::Gt => lhs > rhs,
        }
    }
}

/// One side of a value/label comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Const(u64),
    /// The value/label the node is about to assign to its output, computed
    /// from the active list using the node's own assign rule.
    Output,
    /// The value/label carried by a specific input, if that input is in
    /// the active list this round (absent inputs compare as 0).
    Input(usize),
}

#[derive(Debug, Clone, Copy)]
pub struct BaseCounts {
    pub a: u32,
    pub c: u32,
    pub g: u32,
    pub t: u32,
}

/// One atomic test, optionally negated.
#[derive(Debug, Clone)]
pub enum Atom {
    Value {
        lhs: Side,
        op: Comparator,
        rhs: Side,
        negate: bool,
    },
    Label {
        lhs: Side,
        op: Comparator,
        rhs: Side,
        negate: bool,
    },
    /// Count of the requested base subset in the output k-mer, compared
    /// against a constant.
    Bases {
        count_a: bool,
        count_c: bool,
        count_g: bool,
        count_t: bool,
        op: Comparator,
        rhs: u32,
        negate: bool,
    },
    /// "present in at least `n` inputs" when `at_least = Some(n)`,
    /// "present in input `i`" when `exactly = Some(i)`, "present in all of
    /// `total_inputs`" when `at_least = Some(total_inputs)`.
    Membership { at_least: Option<usize>, exactly: Option<usize>, negate: bool },
}

/// Context the per-slice compute loop gives the selector for one round.
pub struct EvalContext<'a> {
    pub active: &'a [ActiveEntry],
    pub output_value: u32,
    pub output_label: u64,
    pub base_counts: BaseCounts,
}

impl<'a> EvalContext<'a> {
    fn side_value(&self, side: Side) -> u64 {
        match side {
            Side::Const(c) => c,
            Side::Output => self.output_value as u64,
            Side::Input(i) => self
                .active
                .iter()
                .find(|e| e.input_index == i)
                .map(|e| e.value as u64)
                .unwrap_or(0),
        }
    }

    fn side_label(&self, side: Side) -> u64 {
        match side {
            Side::Const(c) => c,
            Side::Output => self.output_label,
            Side::Input(i) => self
                .active
                .iter()
                .find(|e| e.input_index == i)
                .map(|e| e.label)
                .unwrap_or(0),
        }
    }
}

impl Atom {
    fn evaluate(&self, ctx: &EvalContext) -> bool {
        let raw = match *self {
            Atom::Value { lhs, op, rhs, .. } => op.apply(ctx.side_value(lhs), ctx.side_value(rhs)),
            Atom::Label { lhs, op, rhs, .. } => op.apply(ctx.side_label(lhs), ctx.side_label(rhs)),
            Atom::Bases {
                count_a,
                count_c,
                count_g,
                count_t,
                op,
                rhs,
                ..
            } => {
                let mut n = 0u32;
                if count_a {
                    n += ctx.base_counts.a;
                }
                if count_c {
                    n += ctx.base_counts.c;
                }
                if count_g {
                    n += ctx.base_counts.g;
                }
                if count_t {
                    n += ctx.base_counts.t;
                }
                op.apply(n, rhs)
            }
            Atom::Membership {
                at_least, exactly, ..
            } => {
                let present = ctx.active.len();
                let mut ok = true;
                if let Some(n) = at_least {
                    ok &= present >= n;
                }
                if let Some(i) = exactly {
                    ok &= ctx.active.iter().any(|e| e.input_index == i);
                }
                ok
            }
        };
        let negate = match self {
            Atom::Value { negate, .. }
            | Atom::Label { negate, .. }
            | Atom::Bases { negate, .. }
            | Atom::Membership { negate, .. } => *negate,
        };
        raw ^ negate
    }
}

/// A conjunction ("product") of atoms.
#[derive(Debug, Clone, Default)]
pub struct Product {
    pub atoms: Vec<Atom>,
}

impl Product {
    fn evaluate(&self, ctx: &EvalContext) -> bool {
        self.atoms.iter().all(|a| a.evaluate(ctx))
    }
}

/// Sum-of-products: true iff any product is satisfied. An empty selector
/// (no products at all) always evaluates true — the node's default is to
/// pass everything through.
#[derive(Debug, Clone, Default)]
pub struct Selector {
    pub products: Vec<Product>,
}

impl Selector {
    pub fn always() -> Self {
        Selector { products: Vec::new() }
    }

    pub fn evaluate(&self, ctx: &EvalContext) -> bool {
        if self.products.is_empty() {
            return true;
        }
        self.products.iter().any(|p| p.evaluate(ctx))
    }

    pub fn present_in_any(_total_inputs: usize) -> Self {
        Selector {
            products: vec![Product {
                atoms: vec![Atom::Membership {
                    at_least: Some(1),
                    exactly: None,
                    negate: false,
                }],
            }],
        }
    }

    pub fn present_in_all(total_inputs: usize) -> Self {
        Selector {
            products: vec![Product {
                atoms: vec![Atom::Membership {
                    at_least: Some(total_inputs),
                    exactly: None,
                    negate: false,
                }],
            }],
        }
    }

    pub fn present_in_input(i: usize) -> Self {
        Selector {
            products: vec![Product {
                atoms: vec![Atom::Membership {
                    at_least: None,
                    exactly: Some(i),
                    negate: false,
                }],
            }],
        }
    }

    /// "present only in input `i`": present in `i` and in no other input.
    pub fn present_only_in_input(i: usize) -> Self {
        Selector {
            products: vec![Product {
                atoms: vec![
                    Atom::Membership {
                        at_least: None,
                        exactly: Some(i),
                        negate: false,
                    },
                    Atom::Membership {
                        at_least: Some(2),
                        exactly: None,
                        negate: true,
                    },
                ],
            }],
        }
    }
}
