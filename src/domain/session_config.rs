//! Per-instrument session settings and their validation.
//!
//! Validation runs before any evaluation so that a bad file fails fast with the offending
//! section and key.

use crate::domain::entry::{BoRestriction, DEFAULT_BO_START, EntryFilter};
use crate::domain::error::TraderError;
use crate::domain::exit::DEFAULT_LOT_SIZE;
use crate::domain::series;
use crate::domain::side::Side;
use crate::ports::config_port::ConfigPort;
use serde::Serialize;

pub const INDEX_EXPIRY: &str = "INDEX";
pub const DEFAULT_INDEX_SYMBOL: &str = "NIFTY";

/// Morning breakout detector used by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OrbDetector {
    /// Rounded trigger levels, window through 12:30.
    Rounded,
    /// Raw close against the mark, window through 12:15.
    Legacy,
}

/// Everything one evaluation needs besides the collaborators.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstrumentConfig {
    pub index_symbol: String,
    /// `INDEX` prices the legs off the index; anything else names an option expiry.
    pub expiry: String,
    /// Leg nominated as primary unless a CHOTI re-trigger overrides it.
    pub boside: Side,
    pub entry_filter: EntryFilter,
    pub lots: i64,
    pub lot_size: i64,
    pub orb_detector: OrbDetector,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            index_symbol: DEFAULT_INDEX_SYMBOL.to_string(),
            expiry: INDEX_EXPIRY.to_string(),
            boside: Side::Buy,
            entry_filter: EntryFilter::default(),
            lots: 1,
            lot_size: DEFAULT_LOT_SIZE,
            orb_detector: OrbDetector::Rounded,
        }
    }
}

impl InstrumentConfig {
    pub fn is_index_mode(&self) -> bool {
        self.expiry.trim().eq_ignore_ascii_case(INDEX_EXPIRY)
    }

    /// Build from `[data]` and `[session]`. Assumes [`validate_session_config`] passed;
    /// unparseable values fall back to defaults.
    pub fn from_config(config: &dyn ConfigPort) -> Self {
        let defaults = Self::default();

        let restriction = match (
            config.get_string("session", "bo_restrict_side"),
            config.get_time("session", "bo_restrict_until"),
        ) {
            (Some(side), Some(until)) if !side.trim().is_empty() => side
                .parse::<Side>()
                .ok()
                .map(|side| BoRestriction { side, until }),
            _ => None,
        };

        Self {
            index_symbol: config
                .get_string("data", "index_symbol")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.index_symbol),
            expiry: config
                .get_string("session", "expiry")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.expiry),
            boside: config
                .get_string("session", "boside")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.boside),
            entry_filter: EntryFilter {
                bo_start: config
                    .get_time("session", "bo_start")
                    .unwrap_or(defaults.entry_filter.bo_start),
                restriction,
            },
            lots: config.get_int("session", "lots", defaults.lots),
            lot_size: config.get_int("session", "lot_size", defaults.lot_size),
            orb_detector: match config.get_string("session", "orb_detector").as_deref() {
                Some(s) if s.trim().eq_ignore_ascii_case("legacy") => OrbDetector::Legacy,
                _ => OrbDetector::Rounded,
            },
        }
    }
}

pub fn validate_session_config(config: &dyn ConfigPort) -> Result<(), TraderError> {
    validate_data_source(config)?;
    validate_level_tables(config)?;
    validate_boside(config)?;
    validate_times(config)?;
    validate_restriction(config)?;
    validate_sizes(config)?;
    validate_orb_detector(config)?;
    Ok(())
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> TraderError {
    TraderError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn require(config: &dyn ConfigPort, section: &str, key: &str) -> Result<String, TraderError> {
    match config.get_string(section, key) {
        Some(s) if !s.trim().is_empty() => Ok(s),
        _ => Err(TraderError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        }),
    }
}

fn validate_data_source(config: &dyn ConfigPort) -> Result<(), TraderError> {
    let source = config
        .get_string("data", "source")
        .unwrap_or_else(|| "csv".to_string());
    match source.trim().to_lowercase().as_str() {
        "csv" | "sqlite" => {}
        other => {
            return Err(invalid(
                "data",
                "source",
                format!("unknown source '{other}', expected csv or sqlite"),
            ));
        }
    }
    require(config, "data", "path")?;
    if config.get_int("data", "pool_size", 4) < 1 {
        return Err(invalid("data", "pool_size", "pool_size must be at least 1"));
    }
    Ok(())
}

fn validate_level_tables(config: &dyn ConfigPort) -> Result<(), TraderError> {
    require(config, "levels", "morning_table")?;
    require(config, "levels", "midday_table")?;
    Ok(())
}

fn validate_boside(config: &dyn ConfigPort) -> Result<(), TraderError> {
    if let Some(raw) = config.get_string("session", "boside") {
        raw.parse::<Side>()
            .map_err(|reason| invalid("session", "boside", reason))?;
    }
    Ok(())
}

fn validate_times(config: &dyn ConfigPort) -> Result<(), TraderError> {
    if config.get_string("session", "bo_start").is_some()
        && config.get_time("session", "bo_start").is_none()
    {
        return Err(invalid(
            "session",
            "bo_start",
            format!(
                "expected HH:MM, default is {:02}:{:02}",
                DEFAULT_BO_START.0, DEFAULT_BO_START.1
            ),
        ));
    }
    Ok(())
}

fn validate_restriction(config: &dyn ConfigPort) -> Result<(), TraderError> {
    let side = config
        .get_string("session", "bo_restrict_side")
        .filter(|s| !s.trim().is_empty());
    let until = config
        .get_string("session", "bo_restrict_until")
        .filter(|s| !s.trim().is_empty());

    match (side, until) {
        (None, None) => Ok(()),
        (Some(side), Some(_)) => {
            side.parse::<Side>()
                .map_err(|reason| invalid("session", "bo_restrict_side", reason))?;
            match config.get_time("session", "bo_restrict_until") {
                Some(t) if t >= series::time_of(series::SESSION_OPEN) => Ok(()),
                Some(_) => Err(invalid(
                    "session",
                    "bo_restrict_until",
                    "restriction ends before the session opens",
                )),
                None => Err(invalid(
                    "session",
                    "bo_restrict_until",
                    "expected HHMM or HH:MM",
                )),
            }
        }
        (Some(_), None) => Err(TraderError::ConfigMissing {
            section: "session".to_string(),
            key: "bo_restrict_until".to_string(),
        }),
        (None, Some(_)) => Err(TraderError::ConfigMissing {
            section: "session".to_string(),
            key: "bo_restrict_side".to_string(),
        }),
    }
}

fn validate_sizes(config: &dyn ConfigPort) -> Result<(), TraderError> {
    if config.get_int("session", "lot_size", DEFAULT_LOT_SIZE) < 1 {
        return Err(invalid("session", "lot_size", "lot_size must be at least 1"));
    }
    if config.get_int("session", "lots", 1) < 0 {
        return Err(invalid("session", "lots", "lots must be non-negative"));
    }
    Ok(())
}

fn validate_orb_detector(config: &dyn ConfigPort) -> Result<(), TraderError> {
    match config.get_string("session", "orb_detector") {
        None => Ok(()),
        Some(s) => match s.trim().to_lowercase().as_str() {
            "rounded" | "legacy" => Ok(()),
            other => Err(invalid(
                "session",
                "orb_detector",
                format!("unknown detector '{other}', expected rounded or legacy"),
            )),
        },
    }
}
