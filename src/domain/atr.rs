//! Wilder average true range over 15-minute bars.
//!
//! True range needs a previous close, so the first bar of the history only seeds `prev_close`.
//! Seed = simple mean of the first `length` true ranges, then
//! `atr = (prev_atr * (length - 1) + tr) / length`. The last value is reported, rounded to two
//! decimals. Fewer than `length` true ranges yields 0.0, which downstream reads as "ATR disabled".

use super::bar::Bar;

pub const ATR_LENGTH: usize = 14;

pub fn true_ranges(bars: &[Bar]) -> Vec<f64> {
    bars.windows(2)
        .map(|pair| pair[1].true_range(pair[0].close))
        .collect()
}

/// Full Wilder ATR series aligned with `true_ranges(bars)`; `None` until the seed is available.
pub fn wilder_series(bars: &[Bar], length: usize) -> Vec<Option<f64>> {
    let trs = true_ranges(bars);
    if length == 0 || trs.len() < length {
        return vec![None; trs.len()];
    }

    let mut out: Vec<Option<f64>> = Vec::with_capacity(trs.len());
    let mut prev = 0.0;
    for (i, tr) in trs.iter().enumerate() {
        if i + 1 < length {
            out.push(None);
        } else if i + 1 == length {
            prev = trs[..length].iter().sum::<f64>() / length as f64;
            out.push(Some(prev));
        } else {
            prev = (prev * (length - 1) as f64 + tr) / length as f64;
            out.push(Some(prev));
        }
    }
    out
}

/// Last Wilder ATR value rounded to 2 decimals, or 0.0 when there is not enough history.
pub fn wilder_atr(bars: &[Bar], length: usize) -> f64 {
    match wilder_series(bars, length).last().copied().flatten() {
        Some(v) => (v * 100.0).round() / 100.0,
        None => 0.0,
    }
}
