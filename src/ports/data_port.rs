//! Market data port trait.

use crate::domain::bar::Bar;
use crate::domain::error::TraderError;
use crate::domain::gap::{FIRST_15_END, PriorSession};
use crate::domain::series;
use chrono::{Duration, NaiveDate};
use serde::Serialize;
use std::fmt;
use std::ops::Bound;

/// Calendar days searched backwards for the previous trading session.
pub const PREVIOUS_SESSION_LOOKBACK_DAYS: u32 = 10;

/// Calendar days of history fed into ATR14.
pub const ATR_HISTORY_DAYS: u32 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum OptionKind {
    #[serde(rename = "CE")]
    Call,
    #[serde(rename = "PE")]
    Put,
}

impl fmt::Display for OptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionKind::Call => write!(f, "CE"),
            OptionKind::Put => write!(f, "PE"),
        }
    }
}

/// A tradable series.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum Instrument {
    Index {
        symbol: String,
    },
    Option {
        underlying: String,
        expiry: String,
        strike: i64,
        kind: OptionKind,
    },
}

impl Instrument {
    pub fn index(symbol: &str) -> Self {
        Instrument::Index {
            symbol: symbol.to_string(),
        }
    }

    /// Storage key, e.g. `NIFTY` or `NIFTY_30SEP25_25000_CE`.
    pub fn key(&self) -> String {
        match self {
            Instrument::Index { symbol } => symbol.clone(),
            Instrument::Option {
                underlying,
                expiry,
                strike,
                kind,
            } => format!("{underlying}_{expiry}_{strike}_{kind}"),
        }
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

pub trait MarketDataPort {
    /// Ordered 1-minute bars of one session. An empty vector means no session that day.
    fn fetch_minute_bars(
        &self,
        date: NaiveDate,
        instrument: &Instrument,
    ) -> Result<Vec<Bar>, TraderError>;

    /// Nearest earlier session with data, walking back up to
    /// [`PREVIOUS_SESSION_LOOKBACK_DAYS`] calendar days.
    fn previous_session(
        &self,
        date: NaiveDate,
        instrument: &Instrument,
    ) -> Result<PriorSession, TraderError> {
        for back in 1..=PREVIOUS_SESSION_LOOKBACK_DAYS {
            let day = date - Duration::days(back as i64);
            let bars = self.fetch_minute_bars(day, instrument)?;
            if let Some(prior) = PriorSession::from_bars(&bars) {
                return Ok(prior);
            }
        }
        Err(TraderError::NoPreviousSession {
            date,
            lookback_days: PREVIOUS_SESSION_LOOKBACK_DAYS,
        })
    }

    /// 15-minute bars for ATR14: the prior [`ATR_HISTORY_DAYS`] calendar days followed by
    /// `today` up to its first 15 minutes, oldest first.
    fn atr_history(
        &self,
        date: NaiveDate,
        instrument: &Instrument,
        today: &[Bar],
    ) -> Result<Vec<Bar>, TraderError> {
        let mut out = Vec::new();
        for back in (1..=ATR_HISTORY_DAYS).rev() {
            let day = date - Duration::days(back as i64);
            let bars = self.fetch_minute_bars(day, instrument)?;
            out.extend(series::resample_15m(&bars));
        }
        let first_15_end = series::at(date, FIRST_15_END);
        let opening = series::window(today, Bound::Unbounded, Bound::Excluded(first_15_end));
        out.extend(series::resample_15m(opening));
        Ok(out)
    }
}
