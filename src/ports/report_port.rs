//! Report generation port trait.

use crate::domain::backtest::BacktestRun;
use crate::domain::error::TraderError;

/// Port for writing backtest reports.
pub trait ReportPort {
    fn write(&self, run: &BacktestRun, output_path: &str) -> Result<(), TraderError>;
}
