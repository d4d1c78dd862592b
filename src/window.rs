//! Shift and trailing-window primitives plus the minimum-history rule that
//! decides which derived rows exist.
//!
//! Every primitive returns one `Option<f64>` per input position; `None` marks a
//! position whose window is not fully defined.

/// How much surrounding data a derived column needs at a given row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HistoryRequirement {
    /// Rows strictly before the current one that must exist.
    pub lookback: usize,
    /// Rows strictly after the current one that must exist.
    pub lookahead: usize,
}

impl HistoryRequirement {
    pub fn lookback(rows: usize) -> Self {
        Self {
            lookback: rows,
            lookahead: 0,
        }
    }

    pub fn lookahead(rows: usize) -> Self {
        Self {
            lookback: 0,
            lookahead: rows,
        }
    }

    /// The strictest combination of two requirements.
    pub fn max(self, other: Self) -> Self {
        Self {
            lookback: self.lookback.max(other.lookback),
            lookahead: self.lookahead.max(other.lookahead),
        }
    }

    pub fn is_satisfied(&self, index: usize, len: usize) -> bool {
        index >= self.lookback && index + self.lookahead < len
    }

    /// Rows of a series of length `len` that satisfy the requirement.
    pub fn satisfied_rows(&self, len: usize) -> usize {
        len.saturating_sub(self.lookback + self.lookahead)
    }
}

/// Which rows a trailing window of width `w` covers at row `t`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowEnd {
    /// Rows `t-w+1 ..= t`.
    Inclusive,
    /// Rows `t-w ..= t-1`.
    Exclusive,
}

impl WindowEnd {
    pub fn requirement(self, width: usize) -> HistoryRequirement {
        match self {
            Self::Inclusive => HistoryRequirement::lookback(width.saturating_sub(1)),
            Self::Exclusive => HistoryRequirement::lookback(width),
        }
    }
}

/// Value `k` rows earlier.
pub fn lag(values: &[f64], k: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|t| t.checked_sub(k).map(|src| values[src]))
        .collect()
}

/// Previous position's value of an already partial column.
pub fn shift_partial(values: &[Option<f64>]) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|t| t.checked_sub(1).and_then(|src| values[src]))
        .collect()
}

pub fn trailing_mean(values: &[f64], width: usize, end: WindowEnd) -> Vec<Option<f64>> {
    windowed(values.len(), width, end, |range| Some(mean(&values[range])))
}

/// Sample standard deviation (`n - 1` denominator); undefined for width 1.
pub fn trailing_std(values: &[f64], width: usize, end: WindowEnd) -> Vec<Option<f64>> {
    windowed(values.len(), width, end, |range| sample_std(&values[range]))
}

/// Trailing inclusive mean over a partial column; defined only when every
/// value in the window is defined.
pub fn trailing_mean_partial(values: &[Option<f64>], width: usize) -> Vec<Option<f64>> {
    windowed(values.len(), width, WindowEnd::Inclusive, |range| {
        let window: Option<Vec<f64>> = values[range].iter().copied().collect();
        window.map(|w| mean(&w))
    })
}

/// Mean of the `horizon` values strictly after each position.
pub fn forward_mean(values: &[f64], horizon: usize) -> Vec<Option<f64>> {
    let len = values.len();
    (0..len)
        .map(|t| {
            if horizon == 0 || t + horizon >= len {
                None
            } else {
                Some(mean(&values[t + 1..=t + horizon]))
            }
        })
        .collect()
}

pub fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

pub fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values);
    let variance = values
        .iter()
        .map(|v| {
            let d = *v - m;
            d * d
        })
        .sum::<f64>()
        / (values.len() - 1) as f64;
    Some(variance.sqrt())
}

fn windowed(
    len: usize,
    width: usize,
    end: WindowEnd,
    stat: impl Fn(std::ops::Range<usize>) -> Option<f64>,
) -> Vec<Option<f64>> {
    if width == 0 {
        return vec![None; len];
    }
    (0..len)
        .map(|t| {
            let stop = match end {
                WindowEnd::Inclusive => t + 1,
                WindowEnd::Exclusive => t,
            };
            let start = stop.checked_sub(width)?;
            stat(start..stop)
        })
        .collect()
}
