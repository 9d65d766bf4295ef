//! Single-session decision pipeline.
//!
//! Stages run strictly in order: full-gap check, ATR and half-gap, ORB (morning unless the
//! prior range already broke before 13:30, midday otherwise or as fallback), CHOTI re-basing,
//! level mapping, per-leg entry search, then the exit machine. Every expected "no trade"
//! outcome ends the evaluation with a [`SessionStatus`]; only collaborator failures and level
//! table gaps surface as `Err`.

use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;
use tracing::{debug, info};

use super::atr::{ATR_LENGTH, wilder_atr};
use super::bar::Bar;
use super::choti::{ChotiCheck, ChotiOutcome, check_choti, run_choti_new_orb};
use super::entry::{EntrySearch, LegWindows, leg_bars, leg_windows, search_entry};
use super::error::TraderError;
use super::exit::{ExitPlan, LegResult, RuleTag, run_exit};
use super::gap::{
    GapCheck, HalfGapCheck, PriorRangeBreak, PriorSession, detect_gap_day, detect_half_gap,
    prior_range_break_before_cutoff,
};
use super::levels::{MappingRule, SessionLevels, map_levels, price_key};
use super::orb::{
    OrbMode, OrbOutcome, OrbSignal, RangeMark, RangeRatio, Trigger, breakout_bucket, midday_orb,
    morning_orb, morning_orb_legacy, orb_atr_ratio,
};
use super::series;
use super::session_config::{InstrumentConfig, OrbDetector};
use super::side::Side;
use crate::ports::data_port::{Instrument, MarketDataPort, OptionKind};
use crate::ports::level_table_port::LevelTablePort;

pub const STRIKE_STEP: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Ok,
    NoData,
    GapDay,
    #[serde(rename = "NO_ORB_BREAKOUT")]
    NoBreakout,
    ChotiMiddayFail,
    #[serde(rename = "MORNING_INVALID_NOENTRY_CHOTI")]
    MorningInvalidNoEntryChoti,
    NoOptionData,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Ok => "OK",
            SessionStatus::NoData => "NO_DATA",
            SessionStatus::GapDay => "GAP_DAY",
            SessionStatus::NoBreakout => "NO_ORB_BREAKOUT",
            SessionStatus::ChotiMiddayFail => "CHOTI_MIDDAY_FAIL",
            SessionStatus::MorningInvalidNoEntryChoti => "MORNING_INVALID_NOENTRY_CHOTI",
            SessionStatus::NoOptionData => "NO_OPTION_DATA",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything decided for one session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecisionResult {
    pub date: NaiveDate,
    pub status: SessionStatus,
    pub message: String,
    pub prior: Option<PriorSession>,
    pub gap: Option<GapCheck>,
    pub half_gap: Option<HalfGapCheck>,
    pub atr_14: f64,
    pub prior_break: Option<PriorRangeBreak>,
    pub midday_forced: bool,
    pub orb_mode: Option<OrbMode>,
    pub mark: Option<RangeMark>,
    pub trigger: Option<Trigger>,
    pub orb_ratio: Option<RangeRatio>,
    pub breakout_ratio: Option<RangeRatio>,
    pub high_vol: bool,
    pub choti: Option<ChotiCheck>,
    pub choti_outcome: Option<ChotiOutcome>,
    pub is_choti_day: bool,
    pub mapping_rule: Option<MappingRule>,
    pub price_key: Option<i64>,
    pub levels: Option<SessionLevels>,
    pub windows: Option<LegWindows>,
    pub ce_strike: Option<i64>,
    pub pe_strike: Option<i64>,
    pub buy_entry: EntrySearch,
    pub sell_entry: EntrySearch,
    pub buy: LegResult,
    pub sell: LegResult,
    pub primary_side: Side,
    pub rule_tags: Vec<String>,
}

impl DecisionResult {
    fn new(date: NaiveDate, primary_side: Side) -> Self {
        Self {
            date,
            status: SessionStatus::Ok,
            message: String::new(),
            prior: None,
            gap: None,
            half_gap: None,
            atr_14: 0.0,
            prior_break: None,
            midday_forced: false,
            orb_mode: None,
            mark: None,
            trigger: None,
            orb_ratio: None,
            breakout_ratio: None,
            high_vol: false,
            choti: None,
            choti_outcome: None,
            is_choti_day: false,
            mapping_rule: None,
            price_key: None,
            levels: None,
            windows: None,
            ce_strike: None,
            pe_strike: None,
            buy_entry: EntrySearch::NoEntry,
            sell_entry: EntrySearch::NoEntry,
            buy: LegResult::no_entry(Side::Buy),
            sell: LegResult::no_entry(Side::Sell),
            primary_side,
            rule_tags: Vec::new(),
        }
    }

    fn finish(mut self, status: SessionStatus, message: impl Into<String>) -> Self {
        self.status = status;
        self.message = message.into();
        info!(date = %self.date, status = %self.status, message = %self.message, "session evaluated");
        self
    }

    pub fn leg(&self, side: Side) -> &LegResult {
        match side {
            Side::Buy => &self.buy,
            Side::Sell => &self.sell,
        }
    }

    /// Leg nominated as the actionable trade.
    pub fn primary(&self) -> &LegResult {
        self.leg(self.primary_side)
    }

    fn apply_signal(&mut self, signal: &OrbSignal) {
        self.orb_mode = Some(signal.mode);
        self.mark = Some(signal.mark);
        self.trigger = Some(signal.trigger);
    }

    fn apply_plan(&mut self, plan: &LegPlan) {
        self.price_key = Some(plan.price_key);
        self.levels = Some(plan.levels);
        self.windows = Some(plan.windows);
        self.buy_entry = plan.buy_entry;
        self.sell_entry = plan.sell_entry;
    }
}

/// Options strike for a leg level: nearest multiple of 50, ties to even.
pub fn strike_for_level(level: f64) -> i64 {
    ((level / STRIKE_STEP).round_ties_even() * STRIKE_STEP) as i64
}

/// Display chips for a finished session.
pub fn rule_tags(
    is_choti_day: bool,
    midday: bool,
    mapping: MappingRule,
    high_vol: bool,
) -> Vec<String> {
    let mut tags = Vec::new();
    if is_choti_day {
        tags.push("CHOTI_DAY".to_string());
    }
    if midday {
        tags.push("MIDDAY".to_string());
    }
    tags.push(RuleTag::from(mapping).to_string());
    if high_vol {
        tags.push("HIGH_VOL_ORB".to_string());
    }
    tags
}

/// Levels, windows and entry candles derived from one signal.
struct LegPlan {
    price_key: i64,
    levels: SessionLevels,
    windows: LegWindows,
    buy_entry: EntrySearch,
    sell_entry: EntrySearch,
}

impl LegPlan {
    fn entry(&self, side: Side) -> EntrySearch {
        match side {
            Side::Buy => self.buy_entry,
            Side::Sell => self.sell_entry,
        }
    }

    fn any_entry(&self) -> bool {
        self.buy_entry.is_found() || self.sell_entry.is_found()
    }
}

struct PlanInputs<'a> {
    date: NaiveDate,
    bars: &'a [Bar],
    mapping: MappingRule,
    atr: f64,
    high_vol: bool,
    config: &'a InstrumentConfig,
}

fn plan_legs(
    inputs: &PlanInputs<'_>,
    signal: &OrbSignal,
    choti_retriggered: bool,
    table: &dyn LevelTablePort,
) -> Result<LegPlan, TraderError> {
    let key = price_key(signal.trigger.price);
    let record = table.levels(key, signal.mode)?;
    let levels = map_levels(
        &record,
        signal.trigger.side,
        inputs.mapping,
        inputs.atr,
        inputs.high_vol,
    );

    let windows = leg_windows(
        inputs.date,
        signal.mode,
        Some(&signal.trigger),
        choti_retriggered,
    );
    let search = |side: Side| {
        let eligible = leg_bars(
            inputs.bars,
            windows.for_side(side),
            side,
            &inputs.config.entry_filter,
        );
        search_entry(eligible, levels.leg(side).level)
    };
    let buy_entry = search(Side::Buy);
    let sell_entry = search(Side::Sell);
    debug!(key, ?windows, ?buy_entry, ?sell_entry, "legs planned");

    Ok(LegPlan {
        price_key: key,
        levels,
        windows,
        buy_entry,
        sell_entry,
    })
}

/// Evaluate one session end to end.
pub fn evaluate(
    date: NaiveDate,
    config: &InstrumentConfig,
    data: &dyn MarketDataPort,
    table: &dyn LevelTablePort,
) -> Result<DecisionResult, TraderError> {
    let mut result = DecisionResult::new(date, config.boside);
    let index = Instrument::index(&config.index_symbol);

    let bars = data.fetch_minute_bars(date, &index)?;
    if bars.is_empty() {
        return Ok(result.finish(SessionStatus::NoData, format!("no {index} bars")));
    }

    let prior = data.previous_session(date, &index)?;
    result.prior = Some(prior);

    let gap = detect_gap_day(&bars, prior.high, prior.low);
    let full_gap = gap.is_full_gap();
    result.gap = Some(gap);
    if full_gap {
        return Ok(result.finish(SessionStatus::GapDay, "full gap against previous session"));
    }

    let atr = wilder_atr(&data.atr_history(date, &index, &bars)?, ATR_LENGTH);
    result.atr_14 = atr;
    let half_gap = detect_half_gap(&bars, Some(prior.close), atr);
    let mapping = if half_gap.is_half_gap() {
        MappingRule::HalfGap
    } else {
        MappingRule::AtrNormal
    };
    result.half_gap = Some(half_gap);
    result.mapping_rule = Some(mapping);
    debug!(atr, ?mapping, "atr and mapping rule");

    let orb_ratio = orb_atr_ratio(&bars, atr);
    result.orb_ratio = orb_ratio;

    let prior_break = prior_range_break_before_cutoff(&bars, prior.high, prior.low);
    result.prior_break = prior_break;
    result.midday_forced = prior_break.is_some();

    // ORB: morning first unless forced to midday; midday is the last fallback.
    let morning = if result.midday_forced {
        info!("prior range broken before 13:30, midday only");
        None
    } else {
        Some(match config.orb_detector {
            OrbDetector::Rounded => morning_orb(&bars),
            OrbDetector::Legacy => morning_orb_legacy(&bars),
        })
    };
    let mut signal = match morning.as_ref().and_then(OrbOutcome::signal) {
        Some(signal) => signal,
        None => match midday_orb(&bars) {
            OrbOutcome::Triggered(signal) => signal,
            other => {
                result.mark = other.mark();
                return Ok(result.finish(
                    SessionStatus::NoBreakout,
                    "no morning or midday breakout",
                ));
            }
        },
    };
    result.apply_signal(&signal);

    let bars_15m = series::resample_15m(&bars);
    let bucket = breakout_bucket(&bars_15m, signal.trigger.time);
    result.breakout_ratio = bucket.and_then(|b| b.atr_ratio(atr));
    result.high_vol = orb_ratio.is_some_and(|r| r.is_high_vol)
        || result.breakout_ratio.is_some_and(|r| r.is_high_vol);

    // CHOTI re-basing of a morning trigger.
    let mut choti_retriggered = false;
    let mut primary_override = None;
    if let Some(bucket) = bucket {
        result.choti = check_choti(&signal, &bucket);
    }
    let choti_bucket = bucket.filter(|_| result.choti.is_some_and(|c| c.is_choti));
    if let Some(bucket) = choti_bucket {
        result.is_choti_day = true;
        let outcome = run_choti_new_orb(&bars, &bucket);
        match &outcome {
            ChotiOutcome::Retriggered {
                mark,
                trigger,
                primary,
            } => {
                signal = OrbSignal {
                    mode: OrbMode::Morning,
                    mark: *mark,
                    trigger: *trigger,
                };
                choti_retriggered = true;
                primary_override = Some(*primary);
            }
            ChotiOutcome::NoRetrigger { .. } => match midday_orb(&bars) {
                OrbOutcome::Triggered(midday) => signal = midday,
                other => {
                    result.choti_outcome = Some(outcome.clone());
                    result.mark = other.mark().or(result.mark);
                    return Ok(result.finish(
                        SessionStatus::ChotiMiddayFail,
                        "no midday breakout after choti re-base",
                    ));
                }
            },
        }
        result.choti_outcome = Some(outcome);
        result.apply_signal(&signal);
    }

    let inputs = PlanInputs {
        date,
        bars: &bars,
        mapping,
        atr,
        high_vol: result.high_vol,
        config,
    };
    let mut plan = plan_legs(&inputs, &signal, choti_retriggered, table)?;

    // A re-triggered CHOTI morning with no entry on either leg retries midday from scratch.
    if choti_retriggered && !plan.any_entry() {
        info!("no entry inside choti windows, retrying midday");
        match midday_orb(&bars) {
            OrbOutcome::Triggered(midday) => {
                signal = midday;
                choti_retriggered = false;
                primary_override = None;
                // The legs now come from a plain midday breakout.
                result.is_choti_day = false;
                result.choti_outcome = None;
                result.apply_signal(&signal);
                plan = plan_legs(&inputs, &signal, choti_retriggered, table)?;
            }
            _ => {
                result.apply_plan(&plan);
                return Ok(result.finish(
                    SessionStatus::MorningInvalidNoEntryChoti,
                    "no entry within choti windows and no midday breakout",
                ));
            }
        }
    }
    result.apply_plan(&plan);
    result.primary_side = primary_override.unwrap_or(config.boside);
    result.rule_tags = rule_tags(
        result.is_choti_day,
        signal.mode == OrbMode::Midday,
        mapping,
        result.high_vol,
    );

    // Price series for each leg.
    let (buy_prices, sell_prices) = if config.is_index_mode() {
        (bars.clone(), bars.clone())
    } else {
        let ce_strike = strike_for_level(plan.levels.buy.level);
        let pe_strike = strike_for_level(plan.levels.sell.level);
        result.ce_strike = Some(ce_strike);
        result.pe_strike = Some(pe_strike);
        let option = |strike: i64, kind: OptionKind| Instrument::Option {
            underlying: config.index_symbol.clone(),
            expiry: config.expiry.clone(),
            strike,
            kind,
        };
        let ce = data.fetch_minute_bars(date, &option(ce_strike, OptionKind::Call))?;
        let pe = data.fetch_minute_bars(date, &option(pe_strike, OptionKind::Put))?;
        if ce.is_empty() || pe.is_empty() {
            return Ok(result.finish(
                SessionStatus::NoOptionData,
                format!("no option bars for CE {ce_strike} / PE {pe_strike}"),
            ));
        }
        (ce, pe)
    };

    for side in [Side::Buy, Side::Sell] {
        let EntrySearch::Found { time, close } = plan.entry(side) else {
            continue;
        };
        let rule = RuleTag::for_entry(signal.mode, time, mapping);
        let exit_plan = ExitPlan::new(side, rule, time, plan.levels.leg(side));
        let prices = match side {
            Side::Buy => &buy_prices,
            Side::Sell => &sell_prices,
        };
        let leg = run_exit(
            &bars,
            prices,
            &exit_plan,
            close,
            config.lot_size,
            config.lots,
        );
        match side {
            Side::Buy => result.buy = leg,
            Side::Sell => result.sell = leg,
        }
    }

    let message = format!(
        "{} {} trigger at {} ({})",
        signal.mode,
        signal.trigger.side,
        signal.trigger.time.format("%H:%M"),
        signal.trigger.price
    );
    Ok(result.finish(SessionStatus::Ok, message))
}
