//! Domain error types.
//!
//! Only genuine failures live here. Expected "no trade today" outcomes (no data, no breakout,
//! gap day) are carried as statuses on the stage results, never as errors.

/// Top-level error type for orbtrader.
#[derive(Debug, thiserror::Error)]
pub enum TraderError {
    #[error("market data error: {reason}")]
    Data { reason: String },

    #[error("market data query error: {reason}")]
    DataQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("level table has no row for key {key} ({mode} table)")]
    LevelKeyMissing { key: i64, mode: String },

    #[error("level table error: {reason}")]
    LevelTable { reason: String },

    #[error("no previous session found within {lookback_days} days before {date}")]
    NoPreviousSession {
        date: chrono::NaiveDate,
        lookback_days: u32,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&TraderError> for std::process::ExitCode {
    fn from(err: &TraderError) -> Self {
        let code: u8 = match err {
            TraderError::Io(_) | TraderError::Csv(_) | TraderError::Json(_) => 1,
            TraderError::ConfigParse { .. }
            | TraderError::ConfigMissing { .. }
            | TraderError::ConfigInvalid { .. } => 2,
            TraderError::Data { .. } | TraderError::DataQuery { .. } => 3,
            TraderError::LevelKeyMissing { .. } | TraderError::LevelTable { .. } => 4,
            TraderError::NoPreviousSession { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_key_message_names_table() {
        let err = TraderError::LevelKeyMissing {
            key: 24500,
            mode: "midday".into(),
        };
        assert_eq!(
            err.to_string(),
            "level table has no row for key 24500 (midday table)"
        );
    }

    #[test]
    fn config_errors_share_exit_code() {
        let missing = TraderError::ConfigMissing {
            section: "session".into(),
            key: "lots".into(),
        };
        let invalid = TraderError::ConfigInvalid {
            section: "session".into(),
            key: "lots".into(),
            reason: "must be positive".into(),
        };
        assert_eq!(
            std::process::ExitCode::from(&missing),
            std::process::ExitCode::from(2)
        );
        assert_eq!(
            std::process::ExitCode::from(&invalid),
            std::process::ExitCode::from(2)
        );
    }
}
