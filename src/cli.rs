//! CLI definition and dispatch.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::json_level_table::JsonLevelTable;
use crate::domain::backtest::{self as backtest_engine, BacktestSummary};
use crate::domain::error::TraderError;
use crate::domain::pipeline::{self, DecisionResult};
use crate::domain::session_config::{InstrumentConfig, validate_session_config};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::MarketDataPort;
use crate::ports::report_port::ReportPort;

const DEFAULT_REPORT_PATH: &str = "backtest.csv";

#[derive(Parser, Debug)]
#[command(name = "orbtrader", about = "Opening-range breakout session evaluator")]
pub struct Cli {
    /// Debug-level logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Evaluate one session
    Evaluate {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        date: NaiveDate,
        /// Print the full decision as JSON
        #[arg(long)]
        json: bool,
    },
    /// Evaluate every weekday in a date range and write a CSV report
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        from: NaiveDate,
        #[arg(long)]
        to: NaiveDate,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Load a minute-bar CSV into the SQLite bar store
    Import {
        #[arg(short, long)]
        config: PathBuf,
        /// Instrument key, e.g. NIFTY or NIFTY_13MAR25_25000_CE
        #[arg(long)]
        symbol: String,
        #[arg(long)]
        file: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Evaluate { config, date, json } => run_evaluate(&config, date, json),
        Command::Backtest {
            config,
            from,
            to,
            output,
        } => run_backtest(&config, from, to, output.as_ref()),
        Command::Validate { config } => run_validate(&config),
        Command::Import {
            config,
            symbol,
            file,
        } => run_import(&config, &symbol, &file),
    }
}

fn fail(err: &TraderError) -> ExitCode {
    eprintln!("error: {err}");
    err.into()
}

pub fn load_config(path: &PathBuf) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| fail(&e))
}

/// Load and validate the config, then build the session settings.
fn load_session(path: &PathBuf) -> Result<(FileConfigAdapter, InstrumentConfig), ExitCode> {
    let adapter = load_config(path)?;
    validate_session_config(&adapter).map_err(|e| fail(&e))?;
    let session = InstrumentConfig::from_config(&adapter);
    Ok((adapter, session))
}

/// Market data adapter selected by `[data] source`.
pub fn build_data_port(config: &dyn ConfigPort) -> Result<Box<dyn MarketDataPort>, TraderError> {
    let source = config
        .get_string("data", "source")
        .unwrap_or_else(|| "csv".to_string())
        .trim()
        .to_lowercase();
    match source.as_str() {
        "csv" => {
            let path = config
                .get_string("data", "path")
                .ok_or_else(|| TraderError::ConfigMissing {
                    section: "data".into(),
                    key: "path".into(),
                })?;
            Ok(Box::new(CsvAdapter::new(PathBuf::from(path))))
        }
        #[cfg(feature = "sqlite")]
        "sqlite" => {
            use crate::adapters::sqlite_adapter::SqliteAdapter;
            let adapter = SqliteAdapter::from_config(config)?;
            adapter.initialize_schema()?;
            Ok(Box::new(adapter))
        }
        other => Err(TraderError::ConfigInvalid {
            section: "data".into(),
            key: "source".into(),
            reason: format!("unsupported source '{other}'"),
        }),
    }
}

fn print_decision(result: &DecisionResult) {
    println!("{}  {}", result.date, result.status);
    if !result.message.is_empty() {
        println!("  {}", result.message);
    }
    println!("  ATR14: {:.2}", result.atr_14);
    if let Some(mark) = result.mark {
        println!("  Mark:  {:.2} / {:.2}", mark.high, mark.low);
    }
    if !result.rule_tags.is_empty() {
        println!("  Tags:  {}", result.rule_tags.join(", "));
    }
    if let Some(levels) = result.levels {
        for leg in [&result.buy, &result.sell] {
            let l = levels.leg(leg.side);
            let marker = if leg.side == result.primary_side {
                "*"
            } else {
                " "
            };
            println!(
                " {marker}{:<4} level {:.0}  t2 {:.0}  t4 {:.0}  sl {:.0}  -> {}  pnl {:.2}",
                leg.side.to_string(),
                l.level,
                l.t2,
                l.t4,
                l.sl,
                leg.status,
                leg.pnl
            );
        }
    }
}

fn run_evaluate(config_path: &PathBuf, date: NaiveDate, json: bool) -> ExitCode {
    let (adapter, session) = match load_session(config_path) {
        Ok(s) => s,
        Err(code) => return code,
    };
    let data = match build_data_port(&adapter) {
        Ok(d) => d,
        Err(e) => return fail(&e),
    };
    let table = match JsonLevelTable::from_config(&adapter) {
        Ok(t) => t,
        Err(e) => return fail(&e),
    };

    let result = match pipeline::evaluate(date, &session, data.as_ref(), &table) {
        Ok(r) => r,
        Err(e) => return fail(&e),
    };

    if json {
        match serde_json::to_string_pretty(&result) {
            Ok(s) => println!("{s}"),
            Err(e) => return fail(&TraderError::from(e)),
        }
    } else {
        print_decision(&result);
    }
    ExitCode::SUCCESS
}

fn print_summary(summary: &BacktestSummary) {
    eprintln!("\n=== Backtest Summary ===");
    eprintln!("Sessions:   {}", summary.sessions);
    eprintln!("Skipped:    {}", summary.skipped);
    eprintln!("Trades:     {}", summary.trades);
    eprintln!("Wins:       {}", summary.wins);
    eprintln!("Losses:     {}", summary.losses);
    eprintln!("Total PnL:  {:.2}", summary.total_pnl);
    if !summary.status_counts.is_empty() {
        eprintln!("\nSession statuses:");
        for (status, count) in &summary.status_counts {
            eprintln!("  {status}: {count}");
        }
    }
    if !summary.exit_counts.is_empty() {
        eprintln!("\nPrimary leg exits:");
        for (status, count) in &summary.exit_counts {
            eprintln!("  {status}: {count}");
        }
    }
}

fn run_backtest(
    config_path: &PathBuf,
    from: NaiveDate,
    to: NaiveDate,
    output_path: Option<&PathBuf>,
) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let (adapter, session) = match load_session(config_path) {
        Ok(s) => s,
        Err(code) => return code,
    };
    let data = match build_data_port(&adapter) {
        Ok(d) => d,
        Err(e) => return fail(&e),
    };
    let table = match JsonLevelTable::from_config(&adapter) {
        Ok(t) => t,
        Err(e) => return fail(&e),
    };

    eprintln!("Running backtest: {} to {}", from, to);
    let run = match backtest_engine::run_backtest(from, to, &session, data.as_ref(), &table) {
        Ok(r) => r,
        Err(e) => return fail(&e),
    };

    print_summary(&run.summary());

    let output = output_path
        .map(|p| p.display().to_string())
        .or_else(|| adapter.get_string("report", "output"))
        .unwrap_or_else(|| DEFAULT_REPORT_PATH.to_string());

    match CsvReportAdapter::new().write(&run, &output) {
        Ok(()) => {
            eprintln!("\nReport written to: {output}");
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}

fn run_validate(config_path: &PathBuf) -> ExitCode {
    eprintln!("Validating config: {}", config_path.display());
    let (_, session) = match load_session(config_path) {
        Ok(s) => s,
        Err(code) => return code,
    };

    eprintln!("  index:    {}", session.index_symbol);
    eprintln!("  expiry:   {}", session.expiry);
    eprintln!("  boside:   {}", session.boside.bo_label());
    eprintln!("  bo_start: {}", session.entry_filter.bo_start.format("%H:%M"));
    if let Some(r) = session.entry_filter.restriction {
        eprintln!(
            "  restrict: {} until {}",
            r.side.bo_label(),
            r.until.format("%H:%M")
        );
    }
    eprintln!("  lots:     {} x {}", session.lots, session.lot_size);

    eprintln!("\nConfiguration is valid.");
    ExitCode::SUCCESS
}

fn run_import(config_path: &PathBuf, symbol: &str, file: &PathBuf) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };

    #[cfg(feature = "sqlite")]
    {
        use crate::adapters::csv_adapter::read_minute_bars;
        use crate::adapters::sqlite_adapter::SqliteAdapter;
        use tracing::info;

        let source = config.get_string("data", "source").unwrap_or_default();
        if !source.trim().eq_ignore_ascii_case("sqlite") {
            return fail(&TraderError::ConfigInvalid {
                section: "data".into(),
                key: "source".into(),
                reason: "import requires source = sqlite".into(),
            });
        }

        let store = match SqliteAdapter::from_config(&config) {
            Ok(s) => s,
            Err(e) => return fail(&e),
        };
        if let Err(e) = store.initialize_schema() {
            return fail(&e);
        }

        let bars = match std::fs::File::open(file)
            .map_err(TraderError::from)
            .and_then(read_minute_bars)
        {
            Ok(b) => b,
            Err(e) => return fail(&e),
        };

        match store.insert_bars(symbol, &bars) {
            Ok(n) => {
                info!(symbol, rows = n, "bars imported");
                eprintln!("Imported {n} bars for {symbol}");
                ExitCode::SUCCESS
            }
            Err(e) => fail(&e),
        }
    }

    #[cfg(not(feature = "sqlite"))]
    {
        let _ = (config, symbol, file);
        eprintln!("error: sqlite feature is required for import");
        ExitCode::from(1)
    }
}
