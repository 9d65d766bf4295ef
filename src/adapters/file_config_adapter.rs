//! INI file configuration adapter.

use crate::domain::error::TraderError;
use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

/// Sections and keys are case-insensitive; values are returned trimmed.
pub struct FileConfigAdapter {
    ini: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, TraderError> {
        let path = path.as_ref();
        let mut ini = Ini::new();
        ini.load(path).map_err(|reason| TraderError::ConfigParse {
            file: path.display().to_string(),
            reason,
        })?;
        Ok(Self { ini })
    }

    pub fn from_string(content: &str) -> Result<Self, TraderError> {
        let mut ini = Ini::new();
        ini.read(content.to_string())
            .map_err(|reason| TraderError::ConfigParse {
                file: "<inline>".into(),
                reason,
            })?;
        Ok(Self { ini })
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.ini
            .get(section, key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    /// Unparseable numbers fall back to `default`, the same as a missing key.
    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.get_string(section, key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    #[test]
    fn from_string_parses_config() {
        let content = r#"
[data]
source = csv
path = /srv/bars

[levels]
morning_table = levels/morning.json
midday_table = levels/midday.json
"#;
        let adapter = FileConfigAdapter::from_string(content).unwrap();
        assert_eq!(adapter.get_string("data", "path"), Some("/srv/bars".to_string()));
        assert_eq!(
            adapter.get_string("levels", "midday_table"),
            Some("levels/midday.json".to_string())
        );
    }

    #[test]
    fn get_string_returns_none_for_missing_key() {
        let adapter = FileConfigAdapter::from_string("[session]\nexpiry = INDEX\n").unwrap();
        assert_eq!(adapter.get_string("session", "missing"), None);
        assert_eq!(adapter.get_string("missing_section", "key"), None);
    }

    #[test]
    fn get_int_returns_value_or_default() {
        let adapter =
            FileConfigAdapter::from_string("[session]\nlot_size = 75\nlots = abc\n").unwrap();
        assert_eq!(adapter.get_int("session", "lot_size", 0), 75);
        assert_eq!(adapter.get_int("session", "lots", 1), 1);
        assert_eq!(adapter.get_int("session", "missing", 42), 42);
    }

    #[test]
    fn get_time_accepts_both_layouts() {
        let adapter = FileConfigAdapter::from_string(
            "[session]\nbo_start = 10:14\nbo_restrict_until = 1030\nbad = noon\n",
        )
        .unwrap();
        assert_eq!(
            adapter.get_time("session", "bo_start"),
            NaiveTime::from_hms_opt(10, 14, 0)
        );
        assert_eq!(
            adapter.get_time("session", "bo_restrict_until"),
            NaiveTime::from_hms_opt(10, 30, 0)
        );
        assert_eq!(adapter.get_time("session", "bad"), None);
        assert_eq!(adapter.get_time("session", "missing"), None);
    }

    #[test]
    fn from_file_reads_config() {
        let file = create_temp_config("[report]\noutput = out/backtest.csv\n");
        let adapter = FileConfigAdapter::from_file(file.path()).unwrap();
        assert_eq!(
            adapter.get_string("report", "output"),
            Some("out/backtest.csv".to_string())
        );
    }

    #[test]
    fn from_file_returns_error_for_missing_file() {
        let result = FileConfigAdapter::from_file("/nonexistent/path/config.ini");
        assert!(matches!(
            result,
            Err(TraderError::ConfigParse { file, .. }) if file == "/nonexistent/path/config.ini"
        ));
    }

    #[test]
    fn blank_values_count_as_missing() {
        let adapter =
            FileConfigAdapter::from_string("[Data]
Path =   
source =  csv 
").unwrap();
        assert_eq!(adapter.get_string("data", "path"), None);
        assert_eq!(adapter.get_string("data", "source"), Some("csv".to_string()));
    }
}
