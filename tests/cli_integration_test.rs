//! CLI integration tests against real files on disk.
//!
//! Tests cover:
//! - `validate` with good and broken configs
//! - `evaluate` over a per-day CSV data directory and JSON level tables
//! - `backtest` writing the CSV report
//! - `import` into the SQLite bar store

mod common;

use clap::Parser;
use common::*;
use orbtrader::adapters::file_config_adapter::FileConfigAdapter;
use orbtrader::cli::{self, Cli};
use orbtrader::domain::bar::Bar;
use orbtrader::domain::levels::LevelRecord;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tempfile::TempDir;

fn write_day_csv(root: &Path, key: &str, bars: &[Bar]) -> PathBuf {
    let dir = root.join(key);
    fs::create_dir_all(&dir).unwrap();
    let day = bars[0].ts.date();
    let path = dir.join(format!("{}.csv", day.format("%Y-%m-%d")));
    let mut body = String::from("time,open,high,low,close,volume\n");
    for b in bars {
        body.push_str(&format!(
            "{},{},{},{},{},{}\n",
            b.ts.format("%Y-%m-%d %H:%M:%S"),
            b.open,
            b.high,
            b.low,
            b.close,
            b.volume.unwrap_or(0)
        ));
    }
    fs::write(&path, body).unwrap();
    path
}

fn write_table(path: &Path, keys: &[i64]) {
    let table: BTreeMap<String, LevelRecord> = keys
        .iter()
        .map(|k| (k.to_string(), standard_record()))
        .collect();
    fs::write(path, serde_json::to_string_pretty(&table).unwrap()).unwrap();
}

/// Data directory, level tables and config for the morning breakout fixture.
struct Workspace {
    dir: TempDir,
    config: PathBuf,
}

impl Workspace {
    fn new(extra: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let data = dir.path().join("bars");
        write_day_csv(&data, "NIFTY", &prior_session_bars());
        write_day_csv(&data, "NIFTY", &morning_breakout_bars());

        let morning = dir.path().join("morning.json");
        let midday = dir.path().join("midday.json");
        write_table(&morning, &[25011]);
        write_table(&midday, &[25000]);

        let config = dir.path().join("orbtrader.ini");
        fs::write(
            &config,
            format!(
                "[data]\nsource = csv\npath = {}\n\n[levels]\nmorning_table = {}\nmidday_table = {}\n\n[session]\nexpiry = INDEX\nboside = BUYBO\n{}",
                data.display(),
                morning.display(),
                midday.display(),
                extra
            ),
        )
        .unwrap();
        Self { dir, config }
    }

    fn config_arg(&self) -> String {
        self.config.display().to_string()
    }
}

fn run(args: &[&str]) -> ExitCode {
    let mut argv = vec!["orbtrader"];
    argv.extend_from_slice(args);
    cli::run(Cli::parse_from(argv))
}

mod validate {
    use super::*;

    #[test]
    fn valid_config_passes() {
        let ws = Workspace::new("bo_start = 10:14\nlot_size = 75\n");
        assert_eq!(run(&["validate", "-c", &ws.config_arg()]), ExitCode::SUCCESS);
    }

    #[test]
    fn zero_lot_size_is_config_error() {
        let ws = Workspace::new("lot_size = 0\n");
        assert_eq!(run(&["validate", "-c", &ws.config_arg()]), ExitCode::from(2));
    }

    #[test]
    fn missing_file_is_config_error() {
        assert_eq!(
            run(&["validate", "-c", "/nonexistent/orbtrader.ini"]),
            ExitCode::from(2)
        );
    }

    #[test]
    fn session_settings_load_from_file() {
        let ws = Workspace::new("lots = 3\nbo_restrict_side = SELLBO\nbo_restrict_until = 1100\n");
        let adapter = FileConfigAdapter::from_file(&ws.config).unwrap();
        let config = orbtrader::domain::session_config::InstrumentConfig::from_config(&adapter);
        assert_eq!(config.lots, 3);
        assert!(config.is_index_mode());
        let restriction = config.entry_filter.restriction.unwrap();
        assert_eq!(restriction.side, orbtrader::domain::side::Side::Sell);
    }
}

mod evaluate {
    use super::*;

    #[test]
    fn evaluates_session_from_csv_files() {
        let ws = Workspace::new("");
        assert_eq!(
            run(&["evaluate", "-c", &ws.config_arg(), "--date", "2025-03-12"]),
            ExitCode::SUCCESS
        );
        assert_eq!(
            run(&[
                "evaluate",
                "-c",
                &ws.config_arg(),
                "--date",
                "2025-03-12",
                "--json"
            ]),
            ExitCode::SUCCESS
        );
    }

    #[test]
    fn missing_previous_session_exits_with_code_5() {
        let ws = Workspace::new("");
        assert_eq!(
            run(&["evaluate", "-c", &ws.config_arg(), "--date", "2025-03-11"]),
            ExitCode::from(5)
        );
    }

    #[test]
    fn missing_level_row_exits_with_code_4() {
        let ws = Workspace::new("");
        write_table(&ws.dir.path().join("morning.json"), &[24000]);
        assert_eq!(
            run(&["evaluate", "-c", &ws.config_arg(), "--date", "2025-03-12"]),
            ExitCode::from(4)
        );
    }

    #[test]
    fn data_port_reads_written_files() {
        let ws = Workspace::new("");
        let adapter = FileConfigAdapter::from_file(&ws.config).unwrap();
        let data = cli::build_data_port(&adapter).unwrap();
        let bars = data
            .fetch_minute_bars(
                session_day(),
                &orbtrader::ports::data_port::Instrument::index("NIFTY"),
            )
            .unwrap();
        assert_eq!(bars, morning_breakout_bars());
    }
}

mod backtest {
    use super::*;

    #[test]
    fn writes_one_report_row_per_session() {
        let ws = Workspace::new("");
        let out = ws.dir.path().join("out").join("report.csv");
        let code = run(&[
            "backtest",
            "-c",
            &ws.config_arg(),
            "--from",
            "2025-03-12",
            "--to",
            "2025-03-14",
            "-o",
            out.to_str().unwrap(),
        ]);
        assert_eq!(code, ExitCode::SUCCESS);

        let mut reader = csv::Reader::from_path(&out).unwrap();
        let headers = reader.headers().unwrap().clone();
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 3);

        let col = |name: &str| headers.iter().position(|h| h == name).unwrap();
        assert_eq!(&rows[0][col("date")], "2025-03-12");
        assert_eq!(&rows[0][col("status")], "OK");
        assert_eq!(&rows[0][col("trigger_side")], "BUY");
        assert_eq!(&rows[0][col("buy_status")], "ATR_T4");
        assert_eq!(&rows[0][col("buy_pnl")], "975.0");
        assert_eq!(&rows[1][col("status")], "NO_DATA");
        assert_eq!(&rows[2][col("date")], "2025-03-14");
    }

    #[test]
    fn report_path_falls_back_to_config() {
        let ws = Workspace::new("");
        let out = ws.dir.path().join("from_config.csv");
        let mut content = fs::read_to_string(&ws.config).unwrap();
        content.push_str(&format!("\n[report]\noutput = {}\n", out.display()));
        fs::write(&ws.config, content).unwrap();

        let code = run(&[
            "backtest",
            "-c",
            &ws.config_arg(),
            "--from",
            "2025-03-12",
            "--to",
            "2025-03-12",
        ]);
        assert_eq!(code, ExitCode::SUCCESS);
        assert!(out.exists());
    }
}

#[cfg(feature = "sqlite")]
mod import {
    use super::*;
    use orbtrader::adapters::sqlite_adapter::SqliteAdapter;
    use orbtrader::ports::data_port::{Instrument, MarketDataPort};

    #[test]
    fn imports_csv_into_store() {
        let dir = TempDir::new().unwrap();
        let csv = write_day_csv(dir.path(), "src", &morning_breakout_bars());
        let db = dir.path().join("bars.db");
        let config = dir.path().join("import.ini");
        fs::write(
            &config,
            format!("[data]\nsource = sqlite\npath = {}\n", db.display()),
        )
        .unwrap();

        let code = run(&[
            "import",
            "-c",
            config.to_str().unwrap(),
            "--symbol",
            "NIFTY",
            "--file",
            csv.to_str().unwrap(),
        ]);
        assert_eq!(code, ExitCode::SUCCESS);

        let adapter = FileConfigAdapter::from_file(&config).unwrap();
        let store = SqliteAdapter::from_config(&adapter).unwrap();
        let bars = store
            .fetch_minute_bars(session_day(), &Instrument::index("NIFTY"))
            .unwrap();
        assert_eq!(bars.len(), morning_breakout_bars().len());
    }

    #[test]
    fn zero_pool_size_is_config_error() {
        let dir = TempDir::new().unwrap();
        let csv = write_day_csv(dir.path(), "src", &morning_breakout_bars());
        let config = dir.path().join("import.ini");
        fs::write(
            &config,
            format!(
                "[data]\nsource = sqlite\npath = {}\npool_size = 0\n",
                dir.path().join("bars.db").display()
            ),
        )
        .unwrap();

        let code = run(&[
            "import",
            "-c",
            config.to_str().unwrap(),
            "--symbol",
            "NIFTY",
            "--file",
            csv.to_str().unwrap(),
        ]);
        assert_eq!(code, ExitCode::from(2));
    }

    #[test]
    fn import_requires_sqlite_source() {
        let ws = Workspace::new("");
        let csv = ws.dir.path().join("bars").join("NIFTY").join("2025-03-12.csv");
        let code = run(&[
            "import",
            "-c",
            &ws.config_arg(),
            "--symbol",
            "NIFTY",
            "--file",
            csv.to_str().unwrap(),
        ]);
        assert_eq!(code, ExitCode::from(2));
    }
}
