//! Concrete adapter implementations for ports.

pub mod csv_adapter;
pub mod csv_report_adapter;
pub mod file_config_adapter;
pub mod json_level_table;
#[cfg(feature = "sqlite")]
pub mod sqlite_adapter;
