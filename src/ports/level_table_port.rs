//! Level lookup table port trait.

use crate::domain::error::TraderError;
use crate::domain::levels::LevelRecord;
use crate::domain::orb::OrbMode;

pub trait LevelTablePort {
    /// Row for an already clamped price key. A missing key is an error: tables are dense over
    /// the clamp range.
    fn levels(&self, key: i64, mode: OrbMode) -> Result<LevelRecord, TraderError>;
}
