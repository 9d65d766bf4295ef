//! Multi-day replay of the session pipeline.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

use super::error::TraderError;
use super::pipeline::{DecisionResult, evaluate};
use super::session_config::InstrumentConfig;
use crate::ports::data_port::MarketDataPort;
use crate::ports::level_table_port::LevelTablePort;

/// Weekdays in `[from, to]`. Exchange holidays are left to the data (they come back as
/// `NO_DATA`).
pub fn trading_days(from: NaiveDate, to: NaiveDate) -> Vec<NaiveDate> {
    let mut days = Vec::new();
    let mut day = from;
    while day <= to {
        if !matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
            days.push(day);
        }
        day += Duration::days(1);
    }
    days
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedSession {
    pub date: NaiveDate,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct BacktestRun {
    pub sessions: Vec<DecisionResult>,
    pub skipped: Vec<SkippedSession>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestSummary {
    pub sessions: usize,
    pub skipped: usize,
    /// Sessions whose primary leg entered.
    pub trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub total_pnl: f64,
    pub status_counts: BTreeMap<String, usize>,
    pub exit_counts: BTreeMap<String, usize>,
}

impl BacktestRun {
    pub fn summary(&self) -> BacktestSummary {
        let mut summary = BacktestSummary {
            sessions: self.sessions.len(),
            skipped: self.skipped.len(),
            trades: 0,
            wins: 0,
            losses: 0,
            total_pnl: 0.0,
            status_counts: BTreeMap::new(),
            exit_counts: BTreeMap::new(),
        };
        for session in &self.sessions {
            *summary
                .status_counts
                .entry(session.status.to_string())
                .or_default() += 1;

            let primary = session.primary();
            if !primary.status.is_entered() {
                continue;
            }
            summary.trades += 1;
            summary.total_pnl += primary.pnl;
            if primary.pnl > 0.0 {
                summary.wins += 1;
            } else if primary.pnl < 0.0 {
                summary.losses += 1;
            }
            *summary
                .exit_counts
                .entry(primary.status.to_string())
                .or_default() += 1;
        }
        summary
    }
}

/// Evaluate every weekday in `[from, to]`.
///
/// A session without a previous session inside the lookback is skipped and recorded; any
/// other collaborator error aborts the run.
pub fn run_backtest(
    from: NaiveDate,
    to: NaiveDate,
    config: &InstrumentConfig,
    data: &dyn MarketDataPort,
    table: &dyn LevelTablePort,
) -> Result<BacktestRun, TraderError> {
    let mut run = BacktestRun::default();
    for date in trading_days(from, to) {
        match evaluate(date, config, data, table) {
            Ok(result) => run.sessions.push(result),
            Err(err @ TraderError::NoPreviousSession { .. }) => {
                warn!(%date, error = %err, "skipping session");
                run.skipped.push(SkippedSession {
                    date,
                    reason: err.to_string(),
                });
            }
            Err(err) => return Err(err),
        }
    }
    info!(
        sessions = run.sessions.len(),
        skipped = run.skipped.len(),
        "backtest complete"
    );
    Ok(run)
}
