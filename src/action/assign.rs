//! Value-assign and label-assign rules. Both operate over the
//! *active list*: the `(input_index, value, label)` triples whose current
//! k-mer equals the round's minimum.
//!
//! Two choices the source left ambiguous (`#warning wrong` markers on
//! `Selected`, `First`, `RotateLeft`/`RotateRight`) are fixed here per the
//! documented resolution: `Selected` reads from whichever input the
//! tiebreak below designates as "selected", and `Rotate` is a true
//! bitwise rotation by `n mod width`, not a shift.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveEntry {
    pub input_index: usize,
    pub value: u32,
    pub label: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueAssign {
    Nop,
    Set(u32),
    Selected,
    First,
    Min(u32),
    Max(u32),
    Add(u32),
    Sub(u32),
    Mul(u32),
    Div(u32),
    DivRoundUp(u32),
    Mod(u32),
    Count,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelAssign {
    Nop,
    Set(u64),
    Selected,
    First,
    Min,
    Max,
    And(u64),
    Or(u64),
    Xor(u64),
    Difference,
    Lightest,
    Heaviest,
    Invert,
    ShiftLeft(u32),
    ShiftRight(u32),
    RotateLeft(u32),
    RotateRight(u32),
}

/// The input chosen as "selected" for both `ValueAssign::Selected` and
/// `LabelAssign::Selected`: the active entry with the lowest input index
/// among those tied for the extreme value used by this node's own
/// value-assign rule, falling back to the first active entry when the
/// rule carries no natural extremum (e.g. `Count`, `Set`).
fn selected_entry(active: &[ActiveEntry], value_rule: ValueAssign) -> Option<ActiveEntry> {
    if active.is_empty() {
        return None;
    }
    let pick_extreme = |better: fn(u32, u32) -> bool| {
        let mut best = active[0];
        for &e in &active[1..] {
            if better(e.value, best.value) {
                best = e;
            }
        }
        best
    };
    Some(match value_rule {
        ValueAssign::Min(_) => pick_extreme(|a, b| a < b),
        ValueAssign::Max(_) => pick_extreme(|a, b| a > b),
        _ => active[0],
    })
}

impl ValueAssign {
    pub fn apply(&self, active: &[ActiveEntry]) -> u32 {
        match *self {
            ValueAssign::Nop => active.first().map(|e| e.value).unwrap_or(0),
            ValueAssign::Set(c) => c,
            ValueAssign::Selected => selected_entry(active, *self).map(|e| e.value).unwrap_or(0),
            ValueAssign::First => active
                .iter()
                .find(|e| e.input_index == 0)
                .map(|e| e.value)
                .unwrap_or(0),
            ValueAssign::Min(c) => active.iter().map(|e| e.value).fold(c, u32::min),
            ValueAssign::Max(c) => active.iter().map(|e| e.value).fold(c, u32::max),
            ValueAssign::Add(c) => active
                .iter()
                .fold(c, |acc, e| acc.saturating_add(e.value)),
            ValueAssign::Sub(c) => {
                let total: u32 = active
                    .iter()
                    .fold(0u32, |acc, e| acc.saturating_add(e.value));
                c.saturating_sub(total)
            }
            ValueAssign::Mul(c) => active
                .iter()
                .fold(c, |acc, e| acc.saturating_mul(e.value.max(1))),
            ValueAssign::Div(c) => {
                if c == 0 {
                    0
                } else {
                    let selected = selected_entry(active, ValueAssign::Selected)
                        .map(|e| e.value)
                        .unwrap_or(0);
                    selected / c
                }
            }
            ValueAssign::DivRoundUp(c) => {
                if c == 0 {
                    0
                } else {
                    let selected = selected_entry(active, ValueAssign::Selected)
                        .map(|e| e.value)
                        .unwrap_or(0);
                    if selected == 0 {
                        0
                    } else {
                        (selected + c - 1) / c
                    }
                }
            }
            ValueAssign::Mod(c) => {
                if c == 0 {
                    0
                } else {
                    let selected = selected_entry(active, ValueAssign::Selected)
                        .map(|e| e.value)
                        .unwrap_or(0);
                    selected % c
                }
            }
            ValueAssign::Count => active.len() as u32,
        }
    }
}

impl LabelAssign {
    pub fn apply(&self, active: &[ActiveEntry], value_rule: ValueAssign) -> u64 {
        match *self {
            LabelAssign::Nop => active.first().map(|e| e.label).unwrap_or(0),
            LabelAssign::Set(c) => c,
            LabelAssign::Selected => selected_entry(active, value_rule)
                .map(|e| e.label)
                .unwrap_or(0),
            LabelAssign::First => active
                .iter()
                .find(|e| e.input_index == 0)
                .map(|e| e.label)
                .unwrap_or(0),
            LabelAssign::Min => active.iter().map(|e| e.label).min().unwrap_or(0),
            LabelAssign::Max => active.iter().map(|e| e.label).max().unwrap_or(0),
            LabelAssign::And(c) => active.iter().fold(c, |acc, e| acc & e.label),
            LabelAssign::Or(c) => active.iter().fold(c, |acc, e| acc | e.label),
            LabelAssign::Xor(c) => active.iter().fold(c, |acc, e| acc ^ e.label),
            LabelAssign::Difference => {
                let first = active
                    .iter()
                    .find(|e| e.input_index == 0)
                    .map(|e| e.label)
                    .unwrap_or(0);
                let rest = active
                    .iter()
                    .filter(|e| e.input_index != 0)
                    .fold(0u64, |acc, e| acc | e.label);
                first & !rest
            }
            LabelAssign::Lightest => active
                .iter()
                .min_by_key(|e| e.label)
                .map(|e| e.label)
                .unwrap_or(0),
            LabelAssign::Heaviest => active
                .iter()
                .max_by_key(|e| e.label)
                .map(|e| e.label)
                .unwrap_or(0),
            LabelAssign::Invert => {
                let base = active.first().map(|e| e.label).unwrap_or(0);
                !base
            }
            LabelAssign::ShiftLeft(n) => {
                let base = active.first().map(|e| e.label).unwrap_or(0);
                base.checked_shl(n % 64).unwrap_or(0)
            }
            LabelAssign::ShiftRight(n) => {
                let base = active.first().map(|e| e.label).unwrap_or(0);
                base.checked_shr(n % 64).unwrap_or(0)
            }
            LabelAssign::RotateLeft(n) => {
                let base = active.first().map(|e| e.label).unwrap_or(0);
                base.rotate_left(n % 64)
            }
            LabelAssign::RotateRight(n) => {
                let base = active.first().map(|e| e.label).unwrap_or(0);
                base.rotate_right(n % 64)
            }
        }
    }
}
