//! Configuration access port trait.

use chrono::NaiveTime;

pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;
    fn get_int(&self, section: &str, key: &str, default: i64) -> i64;

    /// Time of day written as `HH:MM` or `HHMM`. `None` when missing or unparseable.
    fn get_time(&self, section: &str, key: &str) -> Option<NaiveTime> {
        let raw = self.get_string(section, key)?;
        let raw = raw.trim();
        NaiveTime::parse_from_str(raw, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(raw, "%H%M"))
            .ok()
    }
}
