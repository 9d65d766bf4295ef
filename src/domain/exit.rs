//! Exit state machine for one leg.
//!
//! From the entry bar onward each bar is checked against a rule-dependent priority table of
//! stop-loss and target conditions, then the 15:00 cutoff. Prices are read from the paired
//! price series (option or index) at the bar's timestamp. Positions are always long the
//! instrument, so pnl is `(exit - entry) * lot_size * lots` for both legs.

use chrono::NaiveDateTime;
use serde::Serialize;
use std::fmt;
use tracing::debug;

use super::bar::Bar;
use super::levels::{LegLevels, MappingRule};
use super::orb::OrbMode;
use super::series::{self, HourMinute};
use super::side::Side;

pub const EOD_CUTOFF: HourMinute = (15, 0);
pub const ORB_LATE_FROM: HourMinute = (13, 30);
pub const DEFAULT_LOT_SIZE: i64 = 65;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleTag {
    HalfGap,
    AtrNormal,
    OrbLate,
}

impl From<MappingRule> for RuleTag {
    fn from(rule: MappingRule) -> Self {
        match rule {
            MappingRule::HalfGap => RuleTag::HalfGap,
            MappingRule::AtrNormal => RuleTag::AtrNormal,
        }
    }
}

impl fmt::Display for RuleTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleTag::HalfGap => write!(f, "HALF_GAP"),
            RuleTag::AtrNormal => write!(f, "ATR_NORMAL"),
            RuleTag::OrbLate => write!(f, "ORB_LATE"),
        }
    }
}

impl RuleTag {
    /// A morning entry at or after 13:30 is late and exits on the t2 tier.
    pub fn for_entry(mode: OrbMode, entry_time: NaiveDateTime, mapping: MappingRule) -> RuleTag {
        if mode == OrbMode::Morning && entry_time.time() >= series::time_of(ORB_LATE_FROM) {
            RuleTag::OrbLate
        } else {
            mapping.into()
        }
    }

    pub fn target(self, levels: &LegLevels) -> f64 {
        match self {
            RuleTag::OrbLate => levels.t2,
            RuleTag::HalfGap | RuleTag::AtrNormal => levels.t4,
        }
    }

    fn target_status(self) -> LegStatus {
        match self {
            RuleTag::HalfGap => LegStatus::HalfGapTarget,
            RuleTag::AtrNormal => LegStatus::AtrTarget,
            RuleTag::OrbLate => LegStatus::OrbLateTarget,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LegStatus {
    #[serde(rename = "NO_ENTRY")]
    NoEntry,
    #[serde(rename = "NO_OPT_ENTRY")]
    NoOptEntry,
    #[serde(rename = "SL")]
    StopLoss,
    #[serde(rename = "ATR_T4")]
    AtrTarget,
    #[serde(rename = "HALF_GAP_T")]
    HalfGapTarget,
    #[serde(rename = "ORB_LATE_T")]
    OrbLateTarget,
    #[serde(rename = "EOD_1500")]
    EndOfDay,
    #[serde(rename = "OPEN")]
    Open,
}

impl LegStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LegStatus::NoEntry => "NO_ENTRY",
            LegStatus::NoOptEntry => "NO_OPT_ENTRY",
            LegStatus::StopLoss => "SL",
            LegStatus::AtrTarget => "ATR_T4",
            LegStatus::HalfGapTarget => "HALF_GAP_T",
            LegStatus::OrbLateTarget => "ORB_LATE_T",
            LegStatus::EndOfDay => "EOD_1500",
            LegStatus::Open => "OPEN",
        }
    }

    /// Whether a position was opened for this leg.
    pub fn is_entered(self) -> bool {
        !matches!(self, LegStatus::NoEntry | LegStatus::NoOptEntry)
    }
}

impl fmt::Display for LegStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Check {
    StopLoss,
    Target,
}

/// Priority order of the price checks. The SELL leg under a scalp or late rule looks at its
/// target before its stop.
fn check_order(side: Side, rule: RuleTag) -> [Check; 2] {
    match (side, rule) {
        (Side::Sell, RuleTag::HalfGap | RuleTag::OrbLate) => [Check::Target, Check::StopLoss],
        _ => [Check::StopLoss, Check::Target],
    }
}

/// Everything the state machine needs for one leg.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ExitPlan {
    pub side: Side,
    pub rule: RuleTag,
    pub entry_time: NaiveDateTime,
    pub target: f64,
    pub sl: f64,
}

impl ExitPlan {
    pub fn new(side: Side, rule: RuleTag, entry_time: NaiveDateTime, levels: &LegLevels) -> Self {
        Self {
            side,
            rule,
            entry_time,
            target: rule.target(levels),
            sl: levels.sl,
        }
    }

    fn fires(&self, check: Check, bar: &Bar) -> bool {
        match (check, self.side) {
            (Check::StopLoss, Side::Buy) => self.sl > 0.0 && bar.low <= self.sl,
            (Check::StopLoss, Side::Sell) => self.sl > 0.0 && bar.high >= self.sl,
            (Check::Target, Side::Buy) => self.target > 0.0 && bar.high >= self.target,
            (Check::Target, Side::Sell) => self.target > 0.0 && bar.low <= self.target,
        }
    }

    fn status_for(&self, check: Check) -> LegStatus {
        match check {
            Check::StopLoss => LegStatus::StopLoss,
            Check::Target => self.rule.target_status(),
        }
    }
}

/// Terminal record of one leg.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegResult {
    pub side: Side,
    pub status: LegStatus,
    pub rule: Option<RuleTag>,
    pub entry_time: Option<NaiveDateTime>,
    /// Index close of the entry candle.
    pub entry_index: Option<f64>,
    /// Instrument price paid at entry.
    pub entry_price: Option<f64>,
    pub exit_time: Option<NaiveDateTime>,
    pub exit_index: Option<f64>,
    pub exit_price: Option<f64>,
    pub pnl: f64,
}

impl LegResult {
    pub fn no_entry(side: Side) -> Self {
        Self {
            side,
            status: LegStatus::NoEntry,
            rule: None,
            entry_time: None,
            entry_index: None,
            entry_price: None,
            exit_time: None,
            exit_index: None,
            exit_price: None,
            pnl: 0.0,
        }
    }
}

/// `(exit - entry) * lot_size * lots`; non-positive lots count as one.
pub fn pnl(entry: f64, exit: f64, lot_size: i64, lots: i64) -> f64 {
    let lots = if lots <= 0 { 1 } else { lots };
    (exit - entry) * (lot_size * lots) as f64
}

/// Run the state machine for one leg.
///
/// `index_bars` drives the checks; `price_bars` supplies the instrument price (last close at or
/// before each timestamp). A missing or zero entry price rejects the leg.
pub fn run_exit(
    index_bars: &[Bar],
    price_bars: &[Bar],
    plan: &ExitPlan,
    entry_index: f64,
    lot_size: i64,
    lots: i64,
) -> LegResult {
    let mut result = LegResult {
        rule: Some(plan.rule),
        entry_time: Some(plan.entry_time),
        entry_index: Some(entry_index),
        ..LegResult::no_entry(plan.side)
    };

    let entry_price = match series::close_at_or_before(price_bars, plan.entry_time) {
        Some(p) if p != 0.0 => p,
        _ => {
            result.status = LegStatus::NoOptEntry;
            return result;
        }
    };
    result.entry_price = Some(entry_price);

    let Some(date) = series::session_date(index_bars) else {
        result.status = LegStatus::Open;
        return result;
    };
    let eod = series::at(date, EOD_CUTOFF);
    let order = check_order(plan.side, plan.rule);

    for bar in series::from(index_bars, plan.entry_time) {
        let status = order
            .iter()
            .find(|&&check| plan.fires(check, bar))
            .map(|&check| plan.status_for(check))
            .or_else(|| (bar.ts >= eod).then_some(LegStatus::EndOfDay));

        if let Some(status) = status {
            let exit_price = series::close_at_or_before(price_bars, bar.ts).filter(|p| *p != 0.0);
            debug!(side = %plan.side, %status, ts = %bar.ts, index = bar.close, ?exit_price, "leg exit");
            result.status = status;
            result.exit_time = Some(bar.ts);
            result.exit_index = Some(bar.close);
            result.exit_price = exit_price;
            result.pnl = exit_price.map_or(0.0, |exit| pnl(entry_price, exit, lot_size, lots));
            return result;
        }
    }

    result.status = LegStatus::Open;
    result
}
