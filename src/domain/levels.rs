//! Level mapping: turns a trigger price into buy/sell leg levels via a precomputed table.
//!
//! The table is keyed by an integer price (trigger price truncated, clamped to 24000..=27000)
//! and has one row per key with entry, opposite-entry and target tiers for both sides. Two
//! mapping rules choose the final target tier; the stop-loss of each leg is always the other
//! leg's entry. Every stored value is truncated to an integer.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::side::{Side, cut_dec};

pub const PRICE_KEY_MIN: i64 = 24000;
pub const PRICE_KEY_MAX: i64 = 27000;

/// One row of the level table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelRecord {
    pub buy_entry: f64,
    pub buy_entry_opp: f64,
    pub buy_t15: f64,
    pub buy_t2: f64,
    pub buy_t25: f64,
    pub buy_t3: f64,
    pub buy_t35: f64,
    pub buy_t4: f64,
    pub sell_entry: f64,
    pub sell_entry_opp: f64,
    pub sell_t15: f64,
    pub sell_t2: f64,
    pub sell_t25: f64,
    pub sell_t3: f64,
    pub sell_t35: f64,
    pub sell_t4: f64,
}

/// Entry and target tiers of one side, as read for a given trigger side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tiers {
    pub entry: f64,
    pub t15: f64,
    pub t2: f64,
    pub t25: f64,
    pub t3: f64,
    pub t35: f64,
    pub t4: f64,
}

impl Tiers {
    /// Candidates for the ATR target, nearest first.
    pub fn target_candidates(&self) -> [f64; 5] {
        [self.t2, self.t25, self.t3, self.t35, self.t4]
    }
}

impl LevelRecord {
    /// Tiers for `side`. The triggered side reads `<side>_entry`; the other reads
    /// `<side>_entry_opp`.
    pub fn tiers(&self, side: Side, trigger_side: Side) -> Tiers {
        let triggered = side == trigger_side;
        match side {
            Side::Buy => Tiers {
                entry: if triggered { self.buy_entry } else { self.buy_entry_opp },
                t15: self.buy_t15,
                t2: self.buy_t2,
                t25: self.buy_t25,
                t3: self.buy_t3,
                t35: self.buy_t35,
                t4: self.buy_t4,
            },
            Side::Sell => Tiers {
                entry: if triggered { self.sell_entry } else { self.sell_entry_opp },
                t15: self.sell_t15,
                t2: self.sell_t2,
                t25: self.sell_t25,
                t3: self.sell_t3,
                t35: self.sell_t35,
                t4: self.sell_t4,
            },
        }
    }
}

/// Lookup key for a trigger price: truncated toward zero, then clamped to the table range.
pub fn price_key(trigger_price: f64) -> i64 {
    (trigger_price.trunc() as i64).clamp(PRICE_KEY_MIN, PRICE_KEY_MAX)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MappingRule {
    HalfGap,
    AtrNormal,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LegLevels {
    pub level: f64,
    pub t2: f64,
    pub t4: f64,
    pub sl: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SessionLevels {
    pub buy: LegLevels,
    pub sell: LegLevels,
}

impl SessionLevels {
    pub fn leg(&self, side: Side) -> &LegLevels {
        match side {
            Side::Buy => &self.buy,
            Side::Sell => &self.sell,
        }
    }
}

/// Closest tier not overshooting `raw_target`.
///
/// BUY takes the largest candidate `<= raw_target`, else the largest candidate.
/// SELL takes the smallest candidate `>= raw_target`, else the smallest candidate.
pub fn select_atr_tier(candidates: &[f64], raw_target: f64, side: Side) -> f64 {
    match side {
        Side::Buy => {
            let all_max = candidates.iter().copied().fold(f64::MIN, f64::max);
            let below = candidates
                .iter()
                .copied()
                .filter(|&c| c <= raw_target)
                .fold(None, |acc: Option<f64>, c| Some(acc.map_or(c, |a| a.max(c))));
            below.unwrap_or(all_max)
        }
        Side::Sell => {
            let all_min = candidates.iter().copied().fold(f64::MAX, f64::min);
            let above = candidates
                .iter()
                .copied()
                .filter(|&c| c >= raw_target)
                .fold(None, |acc: Option<f64>, c| Some(acc.map_or(c, |a| a.min(c))));
            above.unwrap_or(all_min)
        }
    }
}

/// ATR_NORMAL target for one side. A disabled ATR (`<= 0`) falls back to the t4 tier.
pub fn pick_atr_target(tiers: &Tiers, entry: f64, side: Side, atr: f64) -> f64 {
    if atr <= 0.0 {
        return cut_dec(tiers.t4);
    }
    let raw_target = match side {
        Side::Buy => entry + 2.0 * atr,
        Side::Sell => entry - 2.0 * atr,
    };
    cut_dec(select_atr_tier(&tiers.target_candidates(), raw_target, side))
}

/// Map one table row to both legs' levels.
///
/// On a high-volatility day the non-triggered leg's entry moves to its t1.5 tier before
/// anything else is derived from it.
pub fn map_levels(
    record: &LevelRecord,
    trigger_side: Side,
    rule: MappingRule,
    atr: f64,
    high_vol: bool,
) -> SessionLevels {
    let mut buy = record.tiers(Side::Buy, trigger_side);
    let mut sell = record.tiers(Side::Sell, trigger_side);

    if high_vol {
        match trigger_side {
            Side::Buy => sell.entry = sell.t15,
            Side::Sell => buy.entry = buy.t15,
        }
    }

    let buy_level = cut_dec(buy.entry);
    let sell_level = cut_dec(sell.entry);

    let (buy_t4, sell_t4) = match rule {
        MappingRule::HalfGap => {
            let scalp = |tiers: &Tiers, side: Side| {
                if side == trigger_side {
                    cut_dec(tiers.t2)
                } else {
                    cut_dec(tiers.t15)
                }
            };
            (scalp(&buy, Side::Buy), scalp(&sell, Side::Sell))
        }
        MappingRule::AtrNormal => (
            pick_atr_target(&buy, buy_level, Side::Buy, atr),
            pick_atr_target(&sell, sell_level, Side::Sell, atr),
        ),
    };

    let levels = SessionLevels {
        buy: LegLevels {
            level: buy_level,
            t2: cut_dec(buy.t2),
            t4: buy_t4,
            sl: sell_level,
        },
        sell: LegLevels {
            level: sell_level,
            t2: cut_dec(sell.t2),
            t4: sell_t4,
            sl: buy_level,
        },
    };
    debug!(?rule, %trigger_side, high_vol, ?levels, "mapped levels");
    levels
}


#[cfg(test)]
mod tests {
    use super::test_support::record_around;
    use super::*;

    #[test]
    fn price_key_truncates_and_clamps() {
        assert_eq!(price_key(25012.9), 25012);
        assert_eq!(price_key(23000.0), PRICE_KEY_MIN);
        assert_eq!(price_key(28000.5), PRICE_KEY_MAX);
        assert_eq!(price_key(27000.99), PRICE_KEY_MAX);
    }

    #[test]
    fn atr_tier_buy_largest_below() {
        let c = [100.0, 105.0, 110.0, 115.0, 120.0];
        assert_eq!(select_atr_tier(&c, 107.0, Side::Buy), 105.0);
        assert_eq!(select_atr_tier(&c, 50.0, Side::Buy), 120.0);
        assert_eq!(select_atr_tier(&c, 500.0, Side::Buy), 120.0);
    }

    #[test]
    fn atr_tier_sell_smallest_above() {
        let c = [120.0, 115.0, 110.0, 105.0, 100.0];
        assert_eq!(select_atr_tier(&c, 107.0, Side::Sell), 110.0);
        assert_eq!(select_atr_tier(&c, 200.0, Side::Sell), 100.0);
        assert_eq!(select_atr_tier(&c, 10.0, Side::Sell), 100.0);
    }

    #[test]
    fn triggered_side_uses_entry_other_uses_opp() {
        let rec = record_around(25000.0);
        let levels = map_levels(&rec, Side::Buy, MappingRule::AtrNormal, 0.0, false);
        assert_eq!(levels.buy.level, 25020.0);
        assert_eq!(levels.sell.level, 24959.0);
        let levels = map_levels(&rec, Side::Sell, MappingRule::AtrNormal, 0.0, false);
        assert_eq!(levels.sell.level, 24979.0);
        assert_eq!(levels.buy.level, 25040.0);
    }

    #[test]
    fn stops_are_opposite_entries() {
        let rec = record_around(25000.0);
        for rule in [MappingRule::HalfGap, MappingRule::AtrNormal] {
            let levels = map_levels(&rec, Side::Buy, rule, 30.0, false);
            assert_eq!(levels.buy.sl, levels.sell.level);
            assert_eq!(levels.sell.sl, levels.buy.level);
        }
    }

    #[test]
    fn half_gap_scalps() {
        let rec = record_around(25000.0);
        let levels = map_levels(&rec, Side::Sell, MappingRule::HalfGap, 30.0, false);
        assert_eq!(levels.sell.t4, 24920.0);
        assert_eq!(levels.buy.t4, 25060.0);
        assert_eq!(levels.buy.t2, 25080.0);
    }

    #[test]
    fn atr_normal_picks_tiers_from_entry() {
        let rec = record_around(25000.0);
        // buy entry 25020, raw 25020 + 2*45 = 25110 -> t25 (25100)
        // sell entry opp 24959, raw 24959 - 90 = 24869 -> smallest >= is t3 (24880)
        let levels = map_levels(&rec, Side::Buy, MappingRule::AtrNormal, 45.0, false);
        assert_eq!(levels.buy.t4, 25100.0);
        assert_eq!(levels.sell.t4, 24880.0);
    }

    #[test]
    fn atr_disabled_uses_t4() {
        let rec = record_around(25000.0);
        let levels = map_levels(&rec, Side::Buy, MappingRule::AtrNormal, 0.0, false);
        assert_eq!(levels.buy.t4, 25160.0);
        assert_eq!(levels.sell.t4, 24840.0);
    }

    #[test]
    fn high_vol_moves_opposite_entry_to_t15() {
        let rec = record_around(25000.0);
        let levels = map_levels(&rec, Side::Buy, MappingRule::AtrNormal, 0.0, true);
        assert_eq!(levels.buy.level, 25020.0);
        assert_eq!(levels.sell.level, 24940.0);
        assert_eq!(levels.buy.sl, 24940.0);

        let levels = map_levels(&rec, Side::Sell, MappingRule::HalfGap, 0.0, true);
        assert_eq!(levels.buy.level, 25060.0);
        assert_eq!(levels.sell.sl, 25060.0);
    }

    #[test]
    fn deserializes_table_row() {
        let json = r#"{
            "buy_entry": 25020.5, "buy_entry_opp": 25040, "buy_t15": 25060, "buy_t2": 25080,
            "buy_t25": 25100, "buy_t3": 25120, "buy_t35": 25140, "buy_t4": 25160,
            "sell_entry": 24979.5, "sell_entry_opp": 24960, "sell_t15": 24940, "sell_t2": 24920,
            "sell_t25": 24900, "sell_t3": 24880, "sell_t35": 24860, "sell_t4": 24840,
            "buy_sl": 24979.5, "sell_sl": 25020.5
        }"#;
        let rec: LevelRecord = serde_json::from_str(json).unwrap();
        assert_eq!(rec.buy_entry, 25020.5);
        assert_eq!(rec.sell_t4, 24840.0);
    }
}
