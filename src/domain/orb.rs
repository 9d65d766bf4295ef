//! Opening-range marking and breakout detection.
//!
//! Morning mode marks the 10:00–10:15 range and searches the 15-minute closes up to 12:30;
//! midday mode marks 12:30–12:45 and searches every later 15-minute bar. Both use the rounded
//! trigger levels from [`round_index_price_for_side`]. The legacy morning detector compares raw
//! closes against the mark up to the 12:15 bar and prices the trigger at the bar's extreme.

use chrono::NaiveDateTime;
use serde::Serialize;
use std::fmt;
use std::ops::Bound;
use tracing::debug;

use super::bar::Bar;
use super::series::{self, HourMinute};
use super::side::{Side, round_index_price_for_side};

pub const MORNING_MARK_START: HourMinute = (10, 0);
pub const MORNING_MARK_END: HourMinute = (10, 15);
pub const MORNING_WINDOW_END: HourMinute = (12, 30);
pub const LEGACY_LAST_BAR: HourMinute = (12, 15);
pub const MIDDAY_MARK_START: HourMinute = (12, 30);
pub const HIGH_VOL_ATR_MULTIPLE: f64 = 1.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrbMode {
    Morning,
    Midday,
}

impl fmt::Display for OrbMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrbMode::Morning => write!(f, "MORNING"),
            OrbMode::Midday => write!(f, "MIDDAY"),
        }
    }
}

/// High/low of the reference range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RangeMark {
    pub high: f64,
    pub low: f64,
}

impl RangeMark {
    pub fn range(&self) -> f64 {
        self.high - self.low
    }
}

/// The bar, side and price confirming a breakout.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Trigger {
    pub side: Side,
    pub time: NaiveDateTime,
    pub price: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OrbSignal {
    pub mode: OrbMode,
    pub mark: RangeMark,
    pub trigger: Trigger,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrbOutcome {
    NoData,
    /// The marking bar is missing.
    NoMark,
    /// Marked, but no bars inside the search window.
    NoWindow { mark: RangeMark },
    NoBreakout { mark: RangeMark },
    Triggered(OrbSignal),
}

impl OrbOutcome {
    pub fn mark(&self) -> Option<RangeMark> {
        match self {
            OrbOutcome::NoWindow { mark } | OrbOutcome::NoBreakout { mark } => Some(*mark),
            OrbOutcome::Triggered(signal) => Some(signal.mark),
            OrbOutcome::NoData | OrbOutcome::NoMark => None,
        }
    }

    pub fn signal(&self) -> Option<OrbSignal> {
        match self {
            OrbOutcome::Triggered(signal) => Some(*signal),
            _ => None,
        }
    }
}

/// First 15-minute close reaching a rounded trigger level. BUY is checked before SELL on
/// the same bar; the trigger price is that close re-rounded for the winning side.
fn scan_rounded(bars_15m: &[Bar], mark: RangeMark) -> Option<Trigger> {
    let buy_level = round_index_price_for_side(mark.high, Side::Buy) as f64;
    let sell_level = round_index_price_for_side(mark.low, Side::Sell) as f64;

    bars_15m.iter().find_map(|bar| {
        debug!(ts = %bar.ts, close = bar.close, buy_level, sell_level, "orb 15m check");
        if bar.close >= buy_level {
            Some(Trigger {
                side: Side::Buy,
                time: bar.ts,
                price: round_index_price_for_side(bar.close, Side::Buy) as f64,
            })
        } else if bar.close <= sell_level {
            Some(Trigger {
                side: Side::Sell,
                time: bar.ts,
                price: round_index_price_for_side(bar.close, Side::Sell) as f64,
            })
        } else {
            None
        }
    })
}

/// Morning ORB on the primary (rounded-trigger) path.
pub fn morning_orb(bars: &[Bar]) -> OrbOutcome {
    let Some(date) = series::session_date(bars) else {
        return OrbOutcome::NoData;
    };
    let mark_end = series::at(date, MORNING_MARK_END);
    let marking = series::half_open(bars, series::at(date, MORNING_MARK_START), mark_end);
    let Some((high, low)) = series::high_low(marking) else {
        return OrbOutcome::NoMark;
    };
    let mark = RangeMark { high, low };

    let window = series::closed(bars, mark_end, series::at(date, MORNING_WINDOW_END));
    if window.is_empty() {
        return OrbOutcome::NoWindow { mark };
    }

    match scan_rounded(&series::resample_15m(window), mark) {
        Some(trigger) => {
            debug!(side = %trigger.side, time = %trigger.time, price = trigger.price, "morning orb breakout");
            OrbOutcome::Triggered(OrbSignal {
                mode: OrbMode::Morning,
                mark,
                trigger,
            })
        }
        None => OrbOutcome::NoBreakout { mark },
    }
}

/// Legacy morning ORB: raw close beyond the 10:00 bar's range, last eligible bar 12:15,
/// trigger priced at the breakout bar's high (BUY) or low (SELL).
pub fn morning_orb_legacy(bars: &[Bar]) -> OrbOutcome {
    let Some(date) = series::session_date(bars) else {
        return OrbOutcome::NoData;
    };
    let bars_15m = series::resample_15m(bars);
    let mark_ts = series::at(date, MORNING_MARK_START);
    let Some(mark_bar) = series::bar_at(&bars_15m, mark_ts) else {
        return OrbOutcome::NoMark;
    };
    let mark = RangeMark {
        high: mark_bar.high,
        low: mark_bar.low,
    };

    let window = series::window(
        &bars_15m,
        Bound::Excluded(mark_ts),
        Bound::Included(series::at(date, LEGACY_LAST_BAR)),
    );
    if window.is_empty() {
        return OrbOutcome::NoWindow { mark };
    }

    let trigger = window.iter().find_map(|bar| {
        if bar.close > mark.high {
            Some(Trigger {
                side: Side::Buy,
                time: bar.ts,
                price: bar.high,
            })
        } else if bar.close < mark.low {
            Some(Trigger {
                side: Side::Sell,
                time: bar.ts,
                price: bar.low,
            })
        } else {
            None
        }
    });

    match trigger {
        Some(trigger) => OrbOutcome::Triggered(OrbSignal {
            mode: OrbMode::Morning,
            mark,
            trigger,
        }),
        None => OrbOutcome::NoBreakout { mark },
    }
}

/// Midday ORB: 12:30 bar marks the range, every later 15-minute bar is eligible.
pub fn midday_orb(bars: &[Bar]) -> OrbOutcome {
    let Some(date) = series::session_date(bars) else {
        return OrbOutcome::NoData;
    };
    let bars_15m = series::resample_15m(bars);
    let mark_ts = series::at(date, MIDDAY_MARK_START);
    let Some(mark_bar) = series::bar_at(&bars_15m, mark_ts) else {
        return OrbOutcome::NoMark;
    };
    let mark = RangeMark {
        high: mark_bar.high,
        low: mark_bar.low,
    };
    debug!(high = mark.high, low = mark.low, "midday orb mark");

    let window = series::window(&bars_15m, Bound::Excluded(mark_ts), Bound::Unbounded);
    if window.is_empty() {
        return OrbOutcome::NoWindow { mark };
    }

    match scan_rounded(window, mark) {
        Some(trigger) => {
            debug!(side = %trigger.side, time = %trigger.time, price = trigger.price, "midday orb breakout");
            OrbOutcome::Triggered(OrbSignal {
                mode: OrbMode::Midday,
                mark,
                trigger,
            })
        }
        None => OrbOutcome::NoBreakout { mark },
    }
}

/// Range of a bar (or marked window) relative to ATR14.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RangeRatio {
    pub high: f64,
    pub low: f64,
    pub range: f64,
    pub atr: f64,
    pub ratio: f64,
    pub is_high_vol: bool,
}

impl RangeRatio {
    /// `None` when ATR is disabled (zero).
    pub fn new(high: f64, low: f64, atr: f64) -> Option<Self> {
        if atr <= 0.0 {
            return None;
        }
        let range = high - low;
        let ratio = range / atr;
        Some(Self {
            high,
            low,
            range,
            atr,
            ratio,
            is_high_vol: ratio >= HIGH_VOL_ATR_MULTIPLE,
        })
    }
}

/// 10:00–10:15 range against ATR14.
pub fn orb_atr_ratio(bars: &[Bar], atr: f64) -> Option<RangeRatio> {
    let date = series::session_date(bars)?;
    let marking = series::half_open(
        bars,
        series::at(date, MORNING_MARK_START),
        series::at(date, MORNING_MARK_END),
    );
    let (high, low) = series::high_low(marking)?;
    let ratio = RangeRatio::new(high, low, atr)?;
    debug!(high, low, atr, ratio = ratio.ratio, high_vol = ratio.is_high_vol, "orb/atr ratio");
    Some(ratio)
}

/// The 15-minute bucket containing the breakout.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BreakoutBucket {
    pub start: NaiveDateTime,
    pub high: f64,
    pub low: f64,
}

impl BreakoutBucket {
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    pub fn atr_ratio(&self, atr: f64) -> Option<RangeRatio> {
        RangeRatio::new(self.high, self.low, atr)
    }
}

pub fn breakout_bucket(bars_15m: &[Bar], trigger_time: NaiveDateTime) -> Option<BreakoutBucket> {
    let start = series::bucket_start(trigger_time, series::FIFTEEN_MINUTES);
    let bar = series::bar_at(bars_15m, start)?;
    Some(BreakoutBucket {
        start,
        high: bar.high,
        low: bar.low,
    })
}
