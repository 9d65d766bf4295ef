//! Gap and half-gap classification of the session open against the prior session.
//!
//! A full gap (first 15 minutes entirely outside the prior range) stops the session before any
//! ORB logic. A half gap is an open-to-prior-close move larger than 2.10 ATR; it only changes the
//! exit policy.

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use tracing::debug;

use super::bar::Bar;
use super::series::{self, HourMinute, SESSION_OPEN};

pub const FIRST_15_END: HourMinute = (9, 30);
pub const HALF_GAP_ATR_THRESHOLD: f64 = 2.10;
pub const PREV_BREAK_CUTOFF: HourMinute = (13, 30);

/// High, low and close of the previous trading session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PriorSession {
    pub date: NaiveDate,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl PriorSession {
    pub fn from_bars(bars: &[Bar]) -> Option<Self> {
        let (high, low) = series::high_low(bars)?;
        let last = bars.last()?;
        Some(Self {
            date: last.date(),
            high,
            low,
            close: last.close,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GapType {
    GapUp,
    GapDown,
    NoGap,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GapCheck {
    NoData,
    NoFirst15,
    Classified {
        gap_type: GapType,
        first_high: f64,
        first_low: f64,
        prev_high: f64,
        prev_low: f64,
    },
}

impl GapCheck {
    /// GAP_UP or GAP_DOWN: the session is abandoned.
    pub fn is_full_gap(&self) -> bool {
        matches!(
            self,
            GapCheck::Classified {
                gap_type: GapType::GapUp | GapType::GapDown,
                ..
            }
        )
    }
}

pub fn detect_gap_day(bars: &[Bar], prev_high: f64, prev_low: f64) -> GapCheck {
    let Some(date) = series::session_date(bars) else {
        return GapCheck::NoData;
    };
    let first_15 = series::half_open(
        bars,
        series::at(date, SESSION_OPEN),
        series::at(date, FIRST_15_END),
    );
    let Some((first_high, first_low)) = series::high_low(first_15) else {
        return GapCheck::NoFirst15;
    };

    let gap_type = if first_low > prev_high {
        GapType::GapUp
    } else if first_high < prev_low {
        GapType::GapDown
    } else {
        GapType::NoGap
    };

    debug!(
        first_low,
        first_high, prev_high, prev_low, ?gap_type, "full gap check"
    );

    GapCheck::Classified {
        gap_type,
        first_high,
        first_low,
        prev_high,
        prev_low,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HalfGapType {
    HalfGapUp,
    HalfGapDown,
    NoHalfGap,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HalfGapCheck {
    NoData,
    NoOpen,
    NoAtr {
        daily_open: f64,
    },
    Classified {
        half_gap_type: HalfGapType,
        daily_open: f64,
        prev_close: f64,
        atr_14: f64,
        gap_diff: f64,
        gap_atr: f64,
    },
}

impl HalfGapCheck {
    pub fn is_half_gap(&self) -> bool {
        matches!(
            self,
            HalfGapCheck::Classified {
                half_gap_type: HalfGapType::HalfGapUp | HalfGapType::HalfGapDown,
                ..
            }
        )
    }

    pub fn half_gap_type(&self) -> Option<HalfGapType> {
        match self {
            HalfGapCheck::Classified { half_gap_type, .. } => Some(*half_gap_type),
            _ => None,
        }
    }
}

/// `gap_atr = (daily_open - prev_close) / atr14`; beyond ±2.10 is a half gap.
///
/// `prev_close` falls back to the daily open when the prior session is unknown, which makes
/// the gap zero.
pub fn detect_half_gap(bars: &[Bar], prev_close: Option<f64>, atr_14: f64) -> HalfGapCheck {
    let Some(date) = series::session_date(bars) else {
        return HalfGapCheck::NoData;
    };
    let open_ts = series::at(date, SESSION_OPEN);
    let Some(first) = series::half_open(bars, open_ts, open_ts + chrono::Duration::minutes(1))
        .first()
    else {
        return HalfGapCheck::NoOpen;
    };
    let daily_open = first.open;

    if atr_14 <= 0.0 {
        return HalfGapCheck::NoAtr { daily_open };
    }

    let prev_close = prev_close.unwrap_or(daily_open);
    let gap_diff = daily_open - prev_close;
    let gap_atr = gap_diff / atr_14;

    let half_gap_type = if gap_atr > HALF_GAP_ATR_THRESHOLD {
        HalfGapType::HalfGapUp
    } else if gap_atr < -HALF_GAP_ATR_THRESHOLD {
        HalfGapType::HalfGapDown
    } else {
        HalfGapType::NoHalfGap
    };

    debug!(daily_open, prev_close, atr_14, gap_atr, ?half_gap_type, "half gap check");

    HalfGapCheck::Classified {
        half_gap_type,
        daily_open,
        prev_close,
        atr_14,
        gap_diff,
        gap_atr,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BreakDirection {
    Up,
    Down,
}

/// First close outside the prior session's range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PriorRangeBreak {
    pub direction: BreakDirection,
    pub time: NaiveDateTime,
    /// Bar high for an upside break, bar low for a downside break.
    pub price: f64,
}

/// Close-based break of the prior high/low on `bars`. Zero prior levels mean "unknown".
pub fn prior_range_break(bars: &[Bar], prev_high: f64, prev_low: f64) -> Option<PriorRangeBreak> {
    if prev_high == 0.0 || prev_low == 0.0 {
        return None;
    }
    bars.iter().find_map(|bar| {
        if bar.close > prev_high {
            Some(PriorRangeBreak {
                direction: BreakDirection::Up,
                time: bar.ts,
                price: bar.high,
            })
        } else if bar.close < prev_low {
            Some(PriorRangeBreak {
                direction: BreakDirection::Down,
                time: bar.ts,
                price: bar.low,
            })
        } else {
            None
        }
    })
}

/// Prior range broken on the live 1-minute series at or before 13:30.
pub fn prior_range_break_before_cutoff(
    bars: &[Bar],
    prev_high: f64,
    prev_low: f64,
) -> Option<PriorRangeBreak> {
    let date = series::session_date(bars)?;
    let until = series::through(bars, series::at(date, PREV_BREAK_CUTOFF));
    prior_range_break(until, prev_high, prev_low)
}
