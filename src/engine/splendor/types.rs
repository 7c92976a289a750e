use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub const WIN_SCORE: u32 = 15;
pub const MAX_HELD_GEMS: u32 = 10;
pub const MAX_RESERVED: usize = 3;
pub const REVEALED_PER_LEVEL: usize = 4;
pub const STANDARD_GEMS_IN_POOL: u32 = 7;
pub const GOLD_IN_POOL: u32 = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum GemColor {
    White,
    Blue,
    Green,
    Red,
    Black,
    Gold,
}

impl GemColor {
    pub const ALL: [GemColor; 6] = [
        GemColor::White,
        GemColor::Blue,
        GemColor::Green,
        GemColor::Red,
        GemColor::Black,
        GemColor::Gold,
    ];

    /// Every color except the gold wildcard.
    pub const STANDARD: [GemColor; 5] = [
        GemColor::White,
        GemColor::Blue,
        GemColor::Green,
        GemColor::Red,
        GemColor::Black,
    ];

    pub fn name(self) -> &'static str {
        match self {
            GemColor::White => "White",
            GemColor::Blue => "Blue",
            GemColor::Green => "Green",
            GemColor::Red => "Red",
            GemColor::Black => "Black",
            GemColor::Gold => "Gold",
        }
    }
}

impl fmt::Display for GemColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub type GemCount = BTreeMap<GemColor, u32>;

pub fn zero_gems() -> GemCount {
    GemColor::ALL.into_iter().map(|c| (c, 0)).collect()
}

pub fn initial_pool() -> GemCount {
    GemColor::ALL
        .into_iter()
        .map(|c| {
            let n = if c == GemColor::Gold {
                GOLD_IN_POOL
            } else {
                STANDARD_GEMS_IN_POOL
            };
            (c, n)
        })
        .collect()
}

pub fn total_gems(gems: &GemCount) -> u32 {
    gems.values().sum()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardState {
    /// Still in the deck.
    Hidden,
    /// Face up on the table, purchasable or reservable.
    Revealed,
    /// Taken by a player (bought or reserved off the table).
    Bought,
}

/// A development card. Exactly four cards per level stay revealed while
/// that level's deck has cards left.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DevCard {
    pub id: u32,
    pub level: u8,
    pub bonus: GemColor,
    pub points: u32,
    pub cost: GemCount,
    pub state: CardState,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NobleCard {
    pub id: String,
    /// Required bonus-card count per color.
    pub cost: GemCount,
    pub points: u32,
    pub state: CardState,
}

/// The most recent action a player took, kept for clients that render a
/// turn recap.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LastAction {
    pub action: String,
    #[serde(rename = "playerID")]
    pub player_id: String,
    pub payload: serde_json::Value,
}
