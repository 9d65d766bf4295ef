#![allow(dead_code)]

use chrono::{Duration, NaiveDate, NaiveDateTime};
use orbtrader::domain::bar::Bar;
use orbtrader::domain::error::TraderError;
use orbtrader::domain::levels::LevelRecord;
use orbtrader::domain::orb::OrbMode;
use orbtrader::domain::session_config::InstrumentConfig;
use orbtrader::ports::data_port::{Instrument, MarketDataPort};
use orbtrader::ports::level_table_port::LevelTablePort;
use std::collections::HashMap;

/// Centre price of the fixture sessions.
pub const BASE: f64 = 25000.0;

pub struct MockMarketData {
    pub data: HashMap<(NaiveDate, String), Vec<Bar>>,
    pub errors: HashMap<String, String>,
}

impl MockMarketData {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, date: NaiveDate, key: &str, bars: Vec<Bar>) -> Self {
        self.data.insert((date, key.to_string()), bars);
        self
    }

    pub fn with_error(mut self, key: &str, reason: &str) -> Self {
        self.errors.insert(key.to_string(), reason.to_string());
        self
    }
}

impl MarketDataPort for MockMarketData {
    fn fetch_minute_bars(
        &self,
        date: NaiveDate,
        instrument: &Instrument,
    ) -> Result<Vec<Bar>, TraderError> {
        let key = instrument.key();
        if let Some(reason) = self.errors.get(&key) {
            return Err(TraderError::Data {
                reason: reason.clone(),
            });
        }
        Ok(self.data.get(&(date, key)).cloned().unwrap_or_default())
    }
}

/// Returns the same row for every key, or nothing at all.
pub struct MockLevelTable {
    pub record: Option<LevelRecord>,
}

impl MockLevelTable {
    pub fn uniform(record: LevelRecord) -> Self {
        Self {
            record: Some(record),
        }
    }

    pub fn missing() -> Self {
        Self { record: None }
    }
}

impl LevelTablePort for MockLevelTable {
    fn levels(&self, key: i64, mode: OrbMode) -> Result<LevelRecord, TraderError> {
        self.record
            .clone()
            .ok_or_else(|| TraderError::LevelKeyMissing {
                key,
                mode: mode.to_string().to_lowercase(),
            })
    }
}

/// Levels used by the fixture sessions.
///
/// Triggered BUY: buy 25030 (t2 25040), sell 24960. Triggered SELL: sell 24970, buy 25050.
pub fn standard_record() -> LevelRecord {
    LevelRecord {
        buy_entry: 25030.4,
        buy_entry_opp: 25050.7,
        buy_t15: 25035.0,
        buy_t2: 25040.0,
        buy_t25: 25060.0,
        buy_t3: 25080.0,
        buy_t35: 25100.0,
        buy_t4: 25120.0,
        sell_entry: 24970.6,
        sell_entry_opp: 24960.2,
        sell_t15: 24955.0,
        sell_t2: 24950.0,
        sell_t25: 24930.0,
        sell_t3: 24910.0,
        sell_t35: 24890.0,
        sell_t4: 24870.0,
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// 2025-03-12, a Wednesday.
pub fn session_day() -> NaiveDate {
    date(2025, 3, 12)
}

/// 2025-03-11, the session before [`session_day`].
pub fn prior_day() -> NaiveDate {
    date(2025, 3, 11)
}

pub fn at(day: NaiveDate, h: u32, m: u32) -> NaiveDateTime {
    day.and_hms_opt(h, m, 0).unwrap()
}

pub fn ts(h: u32, m: u32) -> NaiveDateTime {
    at(session_day(), h, m)
}

/// Minute bars closing at `price` with high/low `price ± 5`.
pub fn flat(day: NaiveDate, start: (u32, u32), count: usize, price: f64) -> Vec<Bar> {
    let first = at(day, start.0, start.1);
    (0..count)
        .map(|i| Bar {
            ts: first + Duration::minutes(i as i64),
            open: price,
            high: price + 5.0,
            low: price - 5.0,
            close: price,
            volume: Some(100),
        })
        .collect()
}

/// Minutes from `start` up to and including 15:29.
pub fn minutes_to_close(start: (u32, u32)) -> usize {
    let start = start.0 * 60 + start.1;
    (15 * 60 + 29 - start + 1) as usize
}

/// Build a session from `(start, price)` legs; each leg runs until the next one starts and
/// the last runs to 15:29.
pub fn session(day: NaiveDate, legs: &[((u32, u32), f64)]) -> Vec<Bar> {
    let mut bars = Vec::new();
    for (i, &(start, price)) in legs.iter().enumerate() {
        let count = match legs.get(i + 1) {
            Some(&(next, _)) => ((next.0 * 60 + next.1) - (start.0 * 60 + start.1)) as usize,
            None => minutes_to_close(start),
        };
        bars.extend(flat(day, start, count, price));
    }
    bars
}

/// Previous session: range 24800..25200 set by the opening minute, then flat at 25000 so every
/// later 15-minute true range is 10. Together with a flat-ish open this gives ATR14 = 10.
pub fn prior_session_bars() -> Vec<Bar> {
    let mut bars = flat(prior_day(), (9, 15), minutes_to_close((9, 15)), BASE);
    bars[0].high = BASE + 200.0;
    bars[0].low = BASE - 200.0;
    bars
}

/// Morning breakout day: flat to 10:14, BUY trigger on the 10:15 bucket (close 25010, trigger
/// price 25011), buy entry touched at 10:45, t2 target reached at 10:46.
pub fn morning_breakout_bars() -> Vec<Bar> {
    session(
        session_day(),
        &[
            ((9, 15), BASE),
            ((10, 15), BASE + 10.0),
            ((10, 30), BASE + 20.0),
            ((10, 45), BASE + 30.0),
            ((10, 46), BASE + 45.0),
        ],
    )
}

pub fn market_with_session(bars: Vec<Bar>) -> MockMarketData {
    MockMarketData::new()
        .with_bars(prior_day(), "NIFTY", prior_session_bars())
        .with_bars(session_day(), "NIFTY", bars)
}

pub fn index_config() -> InstrumentConfig {
    InstrumentConfig::default()
}

pub fn option_config(expiry: &str) -> InstrumentConfig {
    InstrumentConfig {
        expiry: expiry.to_string(),
        ..InstrumentConfig::default()
    }
}
