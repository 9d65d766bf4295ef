//! Per-leg entry windows and entry-candle search.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;
use std::ops::Bound;

use super::bar::Bar;
use super::orb::{OrbMode, Trigger};
use super::series::{self, HourMinute};
use super::side::Side;

pub const NO_TRIGGER_ENTRY_START: HourMinute = (10, 15);
pub const MIDDAY_ENTRY_START: HourMinute = (13, 30);
pub const DEFAULT_BO_START: HourMinute = (10, 14);

/// CHOTI window for the leg on the re-trigger side.
pub fn choti_matching_window() -> Duration {
    Duration::hours(2)
}

/// CHOTI window for the leg against the re-trigger side.
pub fn choti_opposite_window() -> Duration {
    Duration::minutes(75)
}

/// Base start of the entry search: trigger + 15m in the morning, 13:30 at midday, 10:15 when
/// there is no trigger.
pub fn entry_start_time(
    date: NaiveDate,
    trigger_time: Option<NaiveDateTime>,
    mode: OrbMode,
) -> NaiveDateTime {
    match (mode, trigger_time) {
        (OrbMode::Midday, _) => series::at(date, MIDDAY_ENTRY_START),
        (OrbMode::Morning, Some(t)) => t + Duration::minutes(series::FIFTEEN_MINUTES as i64),
        (OrbMode::Morning, None) => series::at(date, NO_TRIGGER_ENTRY_START),
    }
}

/// `[start, end]`, open-ended when `end` is `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EntryWindow {
    pub start: NaiveDateTime,
    pub end: Option<NaiveDateTime>,
}

impl EntryWindow {
    pub fn slice<'a>(&self, bars: &'a [Bar]) -> &'a [Bar] {
        let end = match self.end {
            Some(end) => Bound::Included(end),
            None => Bound::Unbounded,
        };
        series::window(bars, Bound::Included(self.start), end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LegWindows {
    pub buy: EntryWindow,
    pub sell: EntryWindow,
}

impl LegWindows {
    pub fn for_side(&self, side: Side) -> &EntryWindow {
        match side {
            Side::Buy => &self.buy,
            Side::Sell => &self.sell,
        }
    }
}

/// Entry windows for both legs.
///
/// Normally both legs share an open-ended window from the base start. After a CHOTI re-trigger
/// the leg matching the new trigger side closes at trigger + 2h and the other leg at
/// trigger + 1h15m.
pub fn leg_windows(
    date: NaiveDate,
    mode: OrbMode,
    trigger: Option<&Trigger>,
    choti_retriggered: bool,
) -> LegWindows {
    let start = entry_start_time(date, trigger.map(|t| t.time), mode);
    let open = EntryWindow { start, end: None };

    match trigger {
        Some(trigger) if mode == OrbMode::Morning && choti_retriggered => {
            let matching = EntryWindow {
                start,
                end: Some(trigger.time + choti_matching_window()),
            };
            let opposite = EntryWindow {
                start,
                end: Some(trigger.time + choti_opposite_window()),
            };
            match trigger.side {
                Side::Buy => LegWindows {
                    buy: matching,
                    sell: opposite,
                },
                Side::Sell => LegWindows {
                    buy: opposite,
                    sell: matching,
                },
            }
        }
        _ => LegWindows {
            buy: open,
            sell: open,
        },
    }
}

/// A leg that may not enter before a given time of day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoRestriction {
    pub side: Side,
    pub until: NaiveTime,
}

/// Filters applied after the window: the global earliest-entry time and an optional
/// per-leg restriction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EntryFilter {
    pub bo_start: NaiveTime,
    pub restriction: Option<BoRestriction>,
}

impl Default for EntryFilter {
    fn default() -> Self {
        Self {
            bo_start: series::time_of(DEFAULT_BO_START),
            restriction: None,
        }
    }
}

impl EntryFilter {
    /// Earliest time of day a bar on `side` may be considered.
    pub fn earliest(&self, side: Side) -> NaiveTime {
        match self.restriction {
            Some(r) if r.side == side => r.until.max(self.bo_start),
            _ => self.bo_start,
        }
    }
}

/// Bars eligible for entry on `side`.
pub fn leg_bars<'a>(
    bars: &'a [Bar],
    window: &EntryWindow,
    side: Side,
    filter: &EntryFilter,
) -> &'a [Bar] {
    let windowed = window.slice(bars);
    let Some(date) = series::session_date(windowed) else {
        return windowed;
    };
    series::from(windowed, date.and_time(filter.earliest(side)))
}

/// First bar whose range touches `level` (`low <= level <= high`).
pub fn find_entry_candle(bars: &[Bar], level: f64) -> Option<&Bar> {
    bars.iter().find(|b| b.touches(level))
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntrySearch {
    Found { time: NaiveDateTime, close: f64 },
    NoEntry,
}

impl EntrySearch {
    pub fn is_found(&self) -> bool {
        matches!(self, EntrySearch::Found { .. })
    }
}

pub fn search_entry(bars: &[Bar], level: f64) -> EntrySearch {
    match find_entry_candle(bars, level) {
        Some(candle) => EntrySearch::Found {
            time: candle.ts,
            close: candle.close,
        },
        None => EntrySearch::NoEntry,
    }
}
