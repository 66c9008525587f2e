use parse_display::Display;
use serde::{Deserialize, Serialize};


/// One creature profile of the catalog.
///
/// Records are never modified after they are loaded; the store replaces the whole
/// sequence instead.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[display("#{id} {name}")]
pub struct Record {
    pub id: u32,
    pub name: String,
    #[serde(rename = "type")]
    pub types: Vec<String>,
    #[serde(flatten)]
    pub stats: BaseStats,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BaseStats {
    pub hp: u32,
    pub attack: u32,
    pub defense: u32,
    pub special_attack: u32,
    pub special_defense: u32,
    pub speed: u32,
}

impl BaseStats {
    /// Sum of all six stats.
    pub fn total(&self) -> u64 {
        [
            self.hp,
            self.attack,
            self.defense,
            self.special_attack,
            self.special_defense,
            self.speed,
        ]
        .into_iter()
        .map(u64::from)
        .sum()
    }
}

/// Parses a JSON array of records.
///
/// No validation beyond the shape of the document is performed; duplicate ids and
/// empty arrays are accepted.
pub fn parse_records(bytes: &[u8]) -> serde_json::Result<Vec<Record>> {
    serde_json::from_slice(bytes)
}
