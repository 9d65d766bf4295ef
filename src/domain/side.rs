//! Trade side and the index price quantization rules.
//!
//! Every index-level trigger and target comparison uses side-specific integer rounding:
//! BUY moves to the next integer above `floor(x)`, SELL floors. There is no nearest-rounding
//! anywhere in the pipeline.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// Leg designation used by the restriction and primary-leg settings.
    pub fn bo_label(self) -> &'static str {
        match self {
            Side::Buy => "BUYBO",
            Side::Sell => "SELLBO",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

impl FromStr for Side {
    type Err = String;

    /// Accepts `BUY`, `BUYBO`, `BUY_BO` and the SELL equivalents, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let cleaned = s.trim().to_uppercase().replace('_', "");
        match cleaned.as_str() {
            "BUY" | "BUYBO" => Ok(Side::Buy),
            "SELL" | "SELLBO" => Ok(Side::Sell),
            _ => Err(format!("invalid side: {s}")),
        }
    }
}

/// BUY: `floor(x) + 1`; SELL: `floor(x)`.
///
/// Not idempotent for BUY: 26000.0 rounds to 26001.
pub fn round_index_price_for_side(price: f64, side: Side) -> i64 {
    let floored = price.floor() as i64;
    match side {
        Side::Buy => floored + 1,
        Side::Sell => floored,
    }
}

/// Drop the decimal part (toward zero), never round.
pub fn cut_dec(x: f64) -> f64 {
    x.trunc()
}
