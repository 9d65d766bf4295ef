//! CSV file market data adapter.
//!
//! One file per instrument and session: `<base>/<instrument key>/<YYYY-MM-DD>.csv`. A missing
//! file is a day without a session and yields no bars.

use crate::domain::bar::Bar;
use crate::domain::error::TraderError;
use crate::ports::data_port::{Instrument, MarketDataPort};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use std::fs;
use std::io::Read;
use std::path::PathBuf;

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, date: NaiveDate, instrument: &Instrument) -> PathBuf {
        self.base_path
            .join(instrument.key())
            .join(format!("{}.csv", date.format("%Y-%m-%d")))
    }
}

/// Parse a bar timestamp: RFC 3339 (offset dropped, wall-clock kept) or
/// `YYYY-MM-DD HH:MM[:SS]` with a space or `T`.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.naive_local());
    }
    [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
    ]
    .iter()
    .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}

struct Columns {
    time: usize,
    open: usize,
    high: usize,
    low: usize,
    close: usize,
    volume: Option<usize>,
}

impl Columns {
    fn from_headers(headers: &csv::StringRecord) -> Result<Self, TraderError> {
        let find = |names: &[&str]| {
            headers
                .iter()
                .position(|h| names.iter().any(|n| h.trim().eq_ignore_ascii_case(n)))
        };
        let require = |name: &str| {
            find(&[name]).ok_or_else(|| TraderError::Data {
                reason: format!("missing {name} column"),
            })
        };
        Ok(Self {
            // Without a named time column the first column is the time axis.
            time: find(&["time", "timestamp", "datetime", "date"]).unwrap_or(0),
            open: require("open")?,
            high: require("high")?,
            low: require("low")?,
            close: require("close")?,
            volume: find(&["volume"]),
        })
    }
}

fn parse_field(record: &csv::StringRecord, idx: usize, name: &str) -> Result<f64, TraderError> {
    record
        .get(idx)
        .ok_or_else(|| TraderError::Data {
            reason: format!("missing {name} value"),
        })?
        .trim()
        .parse()
        .map_err(|e| TraderError::Data {
            reason: format!("invalid {name} value: {e}"),
        })
}

/// Read minute bars from CSV with a header row. Output is sorted by timestamp with duplicate
/// stamps removed (first one kept).
pub fn read_minute_bars<R: Read>(reader: R) -> Result<Vec<Bar>, TraderError> {
    let mut rdr = csv::Reader::from_reader(reader);
    let columns = Columns::from_headers(rdr.headers()?)?;
    let mut bars = Vec::new();

    for result in rdr.records() {
        let record = result?;
        let raw_ts = record.get(columns.time).ok_or_else(|| TraderError::Data {
            reason: "missing time value".into(),
        })?;
        let ts = parse_timestamp(raw_ts).ok_or_else(|| TraderError::Data {
            reason: format!("invalid timestamp '{raw_ts}'"),
        })?;

        let volume = match columns.volume.and_then(|i| record.get(i)) {
            Some(v) if !v.trim().is_empty() => Some(v.trim().parse::<f64>().map_err(|e| {
                TraderError::Data {
                    reason: format!("invalid volume value: {e}"),
                }
            })? as i64),
            _ => None,
        };

        bars.push(Bar {
            ts,
            open: parse_field(&record, columns.open, "open")?,
            high: parse_field(&record, columns.high, "high")?,
            low: parse_field(&record, columns.low, "low")?,
            close: parse_field(&record, columns.close, "close")?,
            volume,
        });
    }

    bars.sort_by_key(|b| b.ts);
    bars.dedup_by_key(|b| b.ts);
    Ok(bars)
}

impl MarketDataPort for CsvAdapter {
    fn fetch_minute_bars(
        &self,
        date: NaiveDate,
        instrument: &Instrument,
    ) -> Result<Vec<Bar>, TraderError> {
        let path = self.csv_path(date, instrument);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&path).map_err(|e| TraderError::Data {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;
        let bars = read_minute_bars(content.as_bytes()).map_err(|e| TraderError::Data {
            reason: format!("{}: {}", path.display(), e),
        })?;
        Ok(bars.into_iter().filter(|b| b.date() == date).collect())
    }
}
