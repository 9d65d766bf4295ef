//! CHOTI day detection and re-based breakout search.
//!
//! A morning breakout whose own 15-minute bucket is more than 1.99 times the marked range
//! re-bases the mark on that bucket and searches again on raw closes up to 12:00. A re-trigger
//! nominates the *opposite* leg as primary.

use chrono::Duration;
use serde::Serialize;
use std::ops::Bound;
use tracing::{debug, info};

use super::bar::Bar;
use super::orb::{BreakoutBucket, OrbMode, OrbSignal, RangeMark, Trigger};
use super::series::{self, HourMinute};
use super::side::Side;

pub const CHOTI_RATIO_THRESHOLD: f64 = 1.99;
pub const CHOTI_SEARCH_END: HourMinute = (12, 0);

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChotiCheck {
    pub orb_range: f64,
    pub bo_range: f64,
    pub ratio: f64,
    pub is_choti: bool,
}

/// Compare the breakout bucket's range against the marked range.
///
/// `None` when the rule is inert: not a morning trigger, or either range is non-positive.
pub fn check_choti(signal: &OrbSignal, bucket: &BreakoutBucket) -> Option<ChotiCheck> {
    if signal.mode != OrbMode::Morning {
        return None;
    }
    let orb_range = signal.mark.range();
    let bo_range = bucket.range();
    if orb_range <= 0.0 || bo_range <= 0.0 {
        return None;
    }
    let ratio = bo_range / orb_range;
    let check = ChotiCheck {
        orb_range,
        bo_range,
        ratio,
        is_choti: ratio > CHOTI_RATIO_THRESHOLD,
    };
    debug!(orb_range, bo_range, ratio, is_choti = check.is_choti, "choti check");
    Some(check)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChotiOutcome {
    /// Found a new breakout against the re-based mark.
    Retriggered {
        mark: RangeMark,
        trigger: Trigger,
        /// Leg nominated as primary: the opposite of the re-trigger side.
        primary: Side,
    },
    /// No close beyond the re-based mark through 12:00; midday must be evaluated from scratch.
    NoRetrigger { mark: RangeMark },
}

impl ChotiOutcome {
    pub fn mark(&self) -> RangeMark {
        match self {
            ChotiOutcome::Retriggered { mark, .. } | ChotiOutcome::NoRetrigger { mark } => *mark,
        }
    }
}

/// Search minute bars stamped after `bucket.start + 15m` and up to 12:00, resampled to 15
/// minutes, for a raw close beyond the bucket's own high/low.
pub fn run_choti_new_orb(bars: &[Bar], bucket: &BreakoutBucket) -> ChotiOutcome {
    let mark = RangeMark {
        high: bucket.high,
        low: bucket.low,
    };
    let Some(date) = series::session_date(bars) else {
        return ChotiOutcome::NoRetrigger { mark };
    };

    let after = bucket.start + Duration::minutes(series::FIFTEEN_MINUTES as i64);
    let end = series::at(date, CHOTI_SEARCH_END);
    let window = series::window(bars, Bound::Excluded(after), Bound::Included(end));
    debug!(start = %after, end = %end, high = mark.high, low = mark.low, "choti re-based search");

    let trigger = series::resample_15m(window).iter().find_map(|bar| {
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
        Some(trigger) => {
            let primary = trigger.side.opposite();
            info!(side = %trigger.side, time = %trigger.time, price = trigger.price, primary = primary.bo_label(), "choti re-trigger");
            ChotiOutcome::Retriggered {
                mark,
                trigger,
                primary,
            }
        }
        None => {
            info!("no choti re-trigger through 12:00");
            ChotiOutcome::NoRetrigger { mark }
        }
    }
}
