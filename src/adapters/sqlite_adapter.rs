//! SQLite market data adapter.
//!
//! Minute bars of every instrument live in one `bars` table keyed by instrument key and
//! timestamp.

use crate::domain::bar::Bar;
use crate::domain::error::TraderError;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::{Instrument, MarketDataPort};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, TraderError> {
        let db_path =
            config
                .get_string("data", "path")
                .ok_or_else(|| TraderError::ConfigMissing {
                    section: "data".into(),
                    key: "path".into(),
                })?;

        let pool_size = config.get_int("data", "pool_size", 4);
        let pool_size = u32::try_from(pool_size)
            .ok()
            .filter(|&n| n >= 1)
            .ok_or_else(|| TraderError::ConfigInvalid {
                section: "data".into(),
                key: "pool_size".into(),
                reason: format!("must be at least 1, got {pool_size}"),
            })?;

        let manager = SqliteConnectionManager::file(&db_path);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(|e: r2d2::Error| TraderError::Data {
                reason: e.to_string(),
            })?;

        Ok(Self { pool })
    }

    pub fn in_memory() -> Result<Self, TraderError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e: r2d2::Error| TraderError::Data {
                reason: e.to_string(),
            })?;

        Ok(Self { pool })
    }

    pub fn initialize_schema(&self) -> Result<(), TraderError> {
        let conn = self.pool.get().map_err(|e: r2d2::Error| TraderError::Data {
            reason: e.to_string(),
        })?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS bars (
                instrument TEXT NOT NULL,
                ts TEXT NOT NULL,
                open REAL NOT NULL,
                high REAL NOT NULL,
                low REAL NOT NULL,
                close REAL NOT NULL,
                volume INTEGER,
                PRIMARY KEY (instrument, ts)
            );
            CREATE INDEX IF NOT EXISTS idx_bars_ts ON bars(ts);",
        )
        .map_err(|e: rusqlite::Error| TraderError::DataQuery {
            reason: e.to_string(),
        })?;

        Ok(())
    }

    /// Insert or replace bars under one instrument key (see [`Instrument::key`]) in a single
    /// transaction. Returns the number of rows written.
    pub fn insert_bars(&self, key: &str, bars: &[Bar]) -> Result<usize, TraderError> {
        let mut conn = self.pool.get().map_err(|e: r2d2::Error| TraderError::Data {
            reason: e.to_string(),
        })?;

        let tx = conn
            .transaction()
            .map_err(|e: rusqlite::Error| TraderError::DataQuery {
                reason: e.to_string(),
            })?;

        for bar in bars {
            tx.execute(
                "INSERT OR REPLACE INTO bars (instrument, ts, open, high, low, close, volume)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    key,
                    bar.ts.format(TS_FORMAT).to_string(),
                    bar.open,
                    bar.high,
                    bar.low,
                    bar.close,
                    bar.volume
                ],
            )
            .map_err(|e: rusqlite::Error| TraderError::DataQuery {
                reason: e.to_string(),
            })?;
        }

        tx.commit()
            .map_err(|e: rusqlite::Error| TraderError::DataQuery {
                reason: e.to_string(),
            })?;

        Ok(bars.len())
    }
}

impl MarketDataPort for SqliteAdapter {
    fn fetch_minute_bars(
        &self,
        date: NaiveDate,
        instrument: &Instrument,
    ) -> Result<Vec<Bar>, TraderError> {
        let conn = self.pool.get().map_err(|e: r2d2::Error| TraderError::Data {
            reason: e.to_string(),
        })?;

        let start = date.and_time(chrono::NaiveTime::MIN);
        let end = start + Duration::days(1);

        let query = "SELECT ts, open, high, low, close, volume
                     FROM bars
                     WHERE instrument = ?1 AND ts >= ?2 AND ts < ?3
                     ORDER BY ts ASC";

        let mut stmt = conn
            .prepare(query)
            .map_err(|e: rusqlite::Error| TraderError::DataQuery {
                reason: e.to_string(),
            })?;

        let rows = stmt
            .query_map(
                params![
                    instrument.key(),
                    start.format(TS_FORMAT).to_string(),
                    end.format(TS_FORMAT).to_string()
                ],
                |row| {
                    let ts_str: String = row.get(0)?;
                    let ts = NaiveDateTime::parse_from_str(&ts_str, TS_FORMAT).map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(
                            ts_str.len(),
                            rusqlite::types::Type::Text,
                            Box::new(e),
                        )
                    })?;
                    Ok(Bar {
                        ts,
                        open: row.get(1)?,
                        high: row.get(2)?,
                        low: row.get(3)?,
                        close: row.get(4)?,
                        volume: row.get(5)?,
                    })
                },
            )
            .map_err(|e: rusqlite::Error| TraderError::DataQuery {
                reason: e.to_string(),
            })?;

        let mut bars = Vec::new();
        for row in rows {
            bars.push(row.map_err(|e: rusqlite::Error| TraderError::DataQuery {
                reason: e.to_string(),
            })?);
        }

        Ok(bars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::data_port::OptionKind;

    struct EmptyConfig;

    impl ConfigPort for EmptyConfig {
        fn get_string(&self, _section: &str, _key: &str) -> Option<String> {
            None
        }
        fn get_int(&self, _section: &str, _key: &str, default: i64) -> i64 {
            default
        }
    }

    /// Only `[data]` keys, all as strings.
    struct DataConfig(Vec<(&'static str, &'static str)>);

    impl ConfigPort for DataConfig {
        fn get_string(&self, section: &str, key: &str) -> Option<String> {
            if section != "data" {
                return None;
            }
            self.0
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
        fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
            self.get_string(section, key)
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        }
    }

    fn ts(d: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, d)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn bar(ts: NaiveDateTime, close: f64) -> Bar {
        Bar {
            ts,
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: Some(100),
        }
    }

    #[test]
    fn from_config_missing_path() {
        let config = EmptyConfig;
        let result = SqliteAdapter::from_config(&config);
        match result {
            Err(TraderError::ConfigMissing { section, key }) => {
                assert_eq!(section, "data");
                assert_eq!(key, "path");
            }
            Err(other) => panic!("expected ConfigMissing, got: {other}"),
            Ok(_) => panic!("expected error, got Ok"),
        }
    }

    #[test]
    fn from_config_rejects_non_positive_pool_size() {
        for size in ["0", "-3"] {
            let config = DataConfig(vec![("path", ":memory:"), ("pool_size", size)]);
            match SqliteAdapter::from_config(&config) {
                Err(TraderError::ConfigInvalid { section, key, .. }) => {
                    assert_eq!(section, "data");
                    assert_eq!(key, "pool_size");
                }
                Err(other) => panic!("expected ConfigInvalid, got: {other}"),
                Ok(_) => panic!("pool_size {size} accepted"),
            }
        }
    }

    #[test]
    fn in_memory_initialization() {
        let adapter = SqliteAdapter::in_memory().unwrap();
        adapter.initialize_schema().unwrap();
    }

    #[test]
    fn fetch_returns_one_session_in_order() {
        let adapter = SqliteAdapter::in_memory().unwrap();
        adapter.initialize_schema().unwrap();
        let nifty = Instrument::index("NIFTY");

        let written = adapter
            .insert_bars(
                "NIFTY",
                &[
                    bar(ts(12, 9, 16), 101.0),
                    bar(ts(12, 9, 15), 100.0),
                    bar(ts(11, 15, 29), 99.0),
                    bar(ts(13, 9, 15), 102.0),
                ],
            )
            .unwrap();
        assert_eq!(written, 4);

        let bars = adapter
            .fetch_minute_bars(NaiveDate::from_ymd_opt(2025, 3, 12).unwrap(), &nifty)
            .unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].ts, ts(12, 9, 15));
        assert_eq!(bars[1].close, 101.0);
        assert_eq!(bars[1].volume, Some(100));
    }

    #[test]
    fn instruments_are_kept_apart() {
        let adapter = SqliteAdapter::in_memory().unwrap();
        adapter.initialize_schema().unwrap();
        let pe = Instrument::Option {
            underlying: "NIFTY".into(),
            expiry: "13MAR25".into(),
            strike: 24900,
            kind: OptionKind::Put,
        };
        adapter.insert_bars(&pe.key(), &[bar(ts(12, 10, 0), 55.0)]).unwrap();

        let date = NaiveDate::from_ymd_opt(2025, 3, 12).unwrap();
        assert_eq!(adapter.fetch_minute_bars(date, &pe).unwrap().len(), 1);
        assert!(
            adapter
                .fetch_minute_bars(date, &Instrument::index("NIFTY"))
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn reinsert_replaces_bar() {
        let adapter = SqliteAdapter::in_memory().unwrap();
        adapter.initialize_schema().unwrap();
        let nifty = Instrument::index("NIFTY");
        adapter.insert_bars("NIFTY", &[bar(ts(12, 9, 15), 100.0)]).unwrap();
        adapter.insert_bars("NIFTY", &[bar(ts(12, 9, 15), 105.0)]).unwrap();

        let bars = adapter
            .fetch_minute_bars(NaiveDate::from_ymd_opt(2025, 3, 12).unwrap(), &nifty)
            .unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].close, 105.0);
    }
}
