//! Level lookup tables loaded from JSON.
//!
//! Each table is one object keyed by price key:
//!
//! ```json
//! { "24000": { "buy_entry": 24020.4, "buy_entry_opp": 24040.7, ... }, "24001": { ... } }
//! ```

use crate::domain::error::TraderError;
use crate::domain::levels::LevelRecord;
use crate::domain::orb::OrbMode;
use crate::ports::config_port::ConfigPort;
use crate::ports::level_table_port::LevelTablePort;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use tracing::debug;

type Table = BTreeMap<i64, LevelRecord>;

#[derive(Debug)]
pub struct JsonLevelTable {
    morning: Table,
    midday: Table,
}

fn parse_table(name: &str, content: &str) -> Result<Table, TraderError> {
    let raw: HashMap<String, LevelRecord> =
        serde_json::from_str(content).map_err(|e| TraderError::LevelTable {
            reason: format!("{name} table: {e}"),
        })?;

    let mut table = Table::new();
    for (key, record) in raw {
        let parsed = key
            .trim()
            .parse::<i64>()
            .or_else(|_| key.trim().parse::<f64>().map(|k| k.trunc() as i64))
            .map_err(|_| TraderError::LevelTable {
                reason: format!("{name} table: invalid price key '{key}'"),
            })?;
        table.insert(parsed, record);
    }
    debug!(table = name, rows = table.len(), "level table loaded");
    Ok(table)
}

fn read_table(name: &str, path: &Path) -> Result<Table, TraderError> {
    let content = fs::read_to_string(path).map_err(|e| TraderError::LevelTable {
        reason: format!("failed to read {}: {}", path.display(), e),
    })?;
    parse_table(name, &content)
}

impl JsonLevelTable {
    pub fn from_strs(morning: &str, midday: &str) -> Result<Self, TraderError> {
        Ok(Self {
            morning: parse_table("morning", morning)?,
            midday: parse_table("midday", midday)?,
        })
    }

    pub fn from_files<P: AsRef<Path>>(morning: P, midday: P) -> Result<Self, TraderError> {
        Ok(Self {
            morning: read_table("morning", morning.as_ref())?,
            midday: read_table("midday", midday.as_ref())?,
        })
    }

    /// Load the two tables named by `[levels] morning_table` and `midday_table`.
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, TraderError> {
        let path = |key: &str| {
            config
                .get_string("levels", key)
                .ok_or_else(|| TraderError::ConfigMissing {
                    section: "levels".into(),
                    key: key.into(),
                })
        };
        Self::from_files(path("morning_table")?, path("midday_table")?)
    }

    fn table(&self, mode: OrbMode) -> &Table {
        match mode {
            OrbMode::Morning => &self.morning,
            OrbMode::Midday => &self.midday,
        }
    }
}

impl LevelTablePort for JsonLevelTable {
    fn levels(&self, key: i64, mode: OrbMode) -> Result<LevelRecord, TraderError> {
        self.table(mode)
            .get(&key)
            .cloned()
            .ok_or_else(|| TraderError::LevelKeyMissing {
                key,
                mode: mode.to_string().to_lowercase(),
            })
    }
}
