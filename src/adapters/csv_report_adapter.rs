//! Backtest report as CSV, one row per evaluated session.

use crate::domain::backtest::BacktestRun;
use crate::domain::error::TraderError;
use crate::domain::exit::LegResult;
use crate::domain::pipeline::DecisionResult;
use crate::ports::report_port::ReportPort;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::Path;

const TIME_FORMAT: &str = "%H:%M";

#[derive(Debug, Serialize)]
struct ReportRow {
    date: String,
    status: String,
    orb_mode: String,
    trigger_side: String,
    trigger_time: String,
    trigger_price: Option<f64>,
    atr_14: f64,
    is_choti_day: bool,
    high_vol: bool,
    rule_tags: String,
    primary_side: String,
    buy_status: String,
    buy_entry_time: String,
    buy_entry_price: Option<f64>,
    buy_exit_time: String,
    buy_exit_price: Option<f64>,
    buy_pnl: f64,
    sell_status: String,
    sell_entry_time: String,
    sell_entry_price: Option<f64>,
    sell_exit_time: String,
    sell_exit_price: Option<f64>,
    sell_pnl: f64,
}

fn hhmm(ts: Option<chrono::NaiveDateTime>) -> String {
    ts.map(|t| t.format(TIME_FORMAT).to_string())
        .unwrap_or_default()
}

impl ReportRow {
    fn from_session(session: &DecisionResult) -> Self {
        let leg = |leg: &LegResult| {
            (
                leg.status.to_string(),
                hhmm(leg.entry_time),
                leg.entry_price,
                hhmm(leg.exit_time),
                leg.exit_price,
                leg.pnl,
            )
        };
        let (buy_status, buy_entry_time, buy_entry_price, buy_exit_time, buy_exit_price, buy_pnl) =
            leg(&session.buy);
        let (
            sell_status,
            sell_entry_time,
            sell_entry_price,
            sell_exit_time,
            sell_exit_price,
            sell_pnl,
        ) = leg(&session.sell);

        Self {
            date: session.date.format("%Y-%m-%d").to_string(),
            status: session.status.to_string(),
            orb_mode: session
                .orb_mode
                .map(|m| m.to_string())
                .unwrap_or_default(),
            trigger_side: session
                .trigger
                .map(|t| t.side.to_string())
                .unwrap_or_default(),
            trigger_time: hhmm(session.trigger.map(|t| t.time)),
            trigger_price: session.trigger.map(|t| t.price),
            atr_14: session.atr_14,
            is_choti_day: session.is_choti_day,
            high_vol: session.high_vol,
            rule_tags: session.rule_tags.join("|"),
            primary_side: session.primary_side.to_string(),
            buy_status,
            buy_entry_time,
            buy_entry_price,
            buy_exit_time,
            buy_exit_price,
            buy_pnl,
            sell_status,
            sell_entry_time,
            sell_entry_price,
            sell_exit_time,
            sell_exit_price,
            sell_pnl,
        }
    }
}

pub struct CsvReportAdapter;

impl CsvReportAdapter {
    pub fn new() -> Self {
        Self
    }

    /// Write the report rows to any sink.
    pub fn write_to<W: Write>(&self, run: &BacktestRun, sink: W) -> Result<(), TraderError> {
        let mut writer = csv::Writer::from_writer(sink);
        for session in &run.sessions {
            writer.serialize(ReportRow::from_session(session))?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl Default for CsvReportAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportPort for CsvReportAdapter {
    fn write(&self, run: &BacktestRun, output_path: &str) -> Result<(), TraderError> {
        let path = Path::new(output_path);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = fs::File::create(path)?;
        self.write_to(run, file)
    }
}
