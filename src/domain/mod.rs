//! Core domain types and the session decision pipeline.

pub mod atr;
pub mod backtest;
pub mod bar;
pub mod choti;
pub mod entry;
pub mod error;
pub mod exit;
pub mod gap;
pub mod levels;
pub mod orb;
pub mod pipeline;
pub mod series;
pub mod session_config;
pub mod side;
