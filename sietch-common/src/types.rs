use serde::{Deserialize, Serialize};

/// Population reading for one sietch, e.g. "Hagga Basin 42/100"
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SietchReading {
    /// Sietch name as shown in the first table cell
    pub name: String,
    /// Players currently in the sietch
    pub player_count: u32,
    /// Capacity reported by the page (not checked against `player_count`)
    pub max_players: u32,
}

impl SietchReading {
    pub fn new(name: impl Into<String>, player_count: u32, max_players: u32) -> Self {
        Self {
            name: name.into(),
            player_count,
            max_players,
        }
    }

    /// True when the page reports more players than capacity.
    pub fn is_over_capacity(&self) -> bool {
        self.player_count > self.max_players
    }
}

impl std::fmt::Display for SietchReading {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}/{}", self.name, self.player_count, self.max_players)
    }
}

/// All sietch readings for one server captured in a single extraction pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSnapshot {
    /// Server identifier, e.g. "Arrakis-1"
    pub name: String,
    /// Region label, e.g. "US-East"
    pub region: String,
    /// Readings in table order
    pub sietches: Vec<SietchReading>,
}

impl ServerSnapshot {
    pub fn total_players(&self) -> u64 {
        self.sietches.iter().map(|s| u64::from(s.player_count)).sum()
    }

    pub fn total_capacity(&self) -> u64 {
        self.sietches.iter().map(|s| u64::from(s.max_players)).sum()
    }
}

impl std::fmt::Display for ServerSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({}): {} sietches, {}/{} players",
            self.name,
            self.region,
            self.sietches.len(),
            self.total_players(),
            self.total_capacity()
        )
    }
}
