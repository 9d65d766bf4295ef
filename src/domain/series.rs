//! Bar-series utilities: time-window slicing and 1-minute to 15-minute aggregation.
//!
//! All series are assumed ordered by timestamp, so every window is a contiguous sub-slice found
//! by binary search. Empty input always yields an empty output; callers turn that into their own
//! explicit "no data" status.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use std::ops::Bound;

use super::bar::Bar;

/// Time of day as (hour, minute). Session constants are expressed this way.
pub type HourMinute = (u32, u32);

pub const SESSION_OPEN: HourMinute = (9, 15);
pub const FIFTEEN_MINUTES: u32 = 15;

pub fn time_of(hm: HourMinute) -> NaiveTime {
    NaiveTime::from_hms_opt(hm.0, hm.1, 0).unwrap_or(NaiveTime::MIN)
}

pub fn at(date: NaiveDate, hm: HourMinute) -> NaiveDateTime {
    date.and_time(time_of(hm))
}

/// Trade date of a series (date of its first bar).
pub fn session_date(bars: &[Bar]) -> Option<NaiveDate> {
    bars.first().map(Bar::date)
}

/// Sub-slice of `bars` whose timestamps fall within the given bounds.
pub fn window(bars: &[Bar], start: Bound<NaiveDateTime>, end: Bound<NaiveDateTime>) -> &[Bar] {
    let lo = match start {
        Bound::Included(t) => bars.partition_point(|b| b.ts < t),
        Bound::Excluded(t) => bars.partition_point(|b| b.ts <= t),
        Bound::Unbounded => 0,
    };
    let hi = match end {
        Bound::Included(t) => bars.partition_point(|b| b.ts <= t),
        Bound::Excluded(t) => bars.partition_point(|b| b.ts < t),
        Bound::Unbounded => bars.len(),
    };
    if lo >= hi { &bars[0..0] } else { &bars[lo..hi] }
}

/// [start, end)
pub fn half_open(bars: &[Bar], start: NaiveDateTime, end: NaiveDateTime) -> &[Bar] {
    window(bars, Bound::Included(start), Bound::Excluded(end))
}

/// [start, end]
pub fn closed(bars: &[Bar], start: NaiveDateTime, end: NaiveDateTime) -> &[Bar] {
    window(bars, Bound::Included(start), Bound::Included(end))
}

/// [start, ..)
pub fn from(bars: &[Bar], start: NaiveDateTime) -> &[Bar] {
    window(bars, Bound::Included(start), Bound::Unbounded)
}

/// (.., end]
pub fn through(bars: &[Bar], end: NaiveDateTime) -> &[Bar] {
    window(bars, Bound::Unbounded, Bound::Included(end))
}

/// Start of the clock-aligned bucket of `minutes` containing `ts`.
pub fn bucket_start(ts: NaiveDateTime, minutes: u32) -> NaiveDateTime {
    let minutes = minutes.max(1);
    let minute_of_day = ts.hour() * 60 + ts.minute();
    let floored = minute_of_day - minute_of_day % minutes;
    ts.date().and_time(NaiveTime::MIN) + Duration::minutes(floored as i64)
}

/// Aggregate into clock-aligned buckets: first open, max high, min low, last close.
///
/// Buckets with no constituent bars never appear. Buckets cut by the edge of a sliced window are
/// kept with the constituents that are present.
pub fn resample(bars: &[Bar], minutes: u32) -> Vec<Bar> {
    let mut out: Vec<Bar> = Vec::new();
    for bar in bars {
        let start = bucket_start(bar.ts, minutes);
        match out.last_mut() {
            Some(current) if current.ts == start => {
                current.high = current.high.max(bar.high);
                current.low = current.low.min(bar.low);
                current.close = bar.close;
                current.volume = match (current.volume, bar.volume) {
                    (Some(a), Some(b)) => Some(a + b),
                    (a, b) => a.or(b),
                };
            }
            _ => out.push(Bar {
                ts: start,
                open: bar.open,
                high: bar.high,
                low: bar.low,
                close: bar.close,
                volume: bar.volume,
            }),
        }
    }
    out
}

pub fn resample_15m(bars: &[Bar]) -> Vec<Bar> {
    resample(bars, FIFTEEN_MINUTES)
}

/// Bar stamped exactly at `ts`.
pub fn bar_at(bars: &[Bar], ts: NaiveDateTime) -> Option<&Bar> {
    bars.binary_search_by_key(&ts, |b| b.ts)
        .ok()
        .map(|i| &bars[i])
}

/// Close of the bar at `ts`, or the last close before it.
pub fn close_at_or_before(bars: &[Bar], ts: NaiveDateTime) -> Option<f64> {
    let idx = bars.partition_point(|b| b.ts <= ts);
    if idx == 0 {
        None
    } else {
        Some(bars[idx - 1].close)
    }
}

/// Highest high and lowest low of a non-empty series.
pub fn high_low(bars: &[Bar]) -> Option<(f64, f64)> {
    if bars.is_empty() {
        return None;
    }
    let high = bars.iter().map(|b| b.high).fold(f64::MIN, f64::max);
    let low = bars.iter().map(|b| b.low).fold(f64::MAX, f64::min);
    Some((high, low))
}
