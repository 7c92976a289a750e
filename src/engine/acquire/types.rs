use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

pub type Money = i64;

/// Board dimensions: columns 1..=12, rows 'A'..='I'.
pub const NUM_COLS: u8 = 12;
pub const NUM_ROWS: u8 = 9;
pub const BOARD_TILES: usize = (NUM_COLS as usize) * (NUM_ROWS as usize);

pub const STARTING_CASH: Money = 6000;
pub const STARTING_HAND: usize = 5;
pub const MAX_HAND: usize = 6;
pub const STOCK_PER_COMPANY: u32 = 25;
pub const MAX_BUY_PER_TURN: u32 = 3;
/// A chain of this many tiles can no longer be absorbed.
pub const SAFE_CHAIN: u32 = 11;
/// A chain of this many tiles allows the game to be ended.
pub const ENDGAME_CHAIN: u32 = 41;

/// The seven hotel chains, partitioned into three price tiers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Company {
    Tower,
    Sackson,
    American,
    Festival,
    Worldwide,
    Continental,
    Imperial,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tier {
    Low,
    Medium,
    Premium,
}

impl Company {
    pub const ALL: [Company; 7] = [
        Company::Tower,
        Company::Sackson,
        Company::American,
        Company::Festival,
        Company::Worldwide,
        Company::Continental,
        Company::Imperial,
    ];

    pub fn tier(self) -> Tier {
        match self {
            Company::Tower | Company::Sackson => Tier::Low,
            Company::American | Company::Festival | Company::Worldwide => Tier::Medium,
            Company::Continental | Company::Imperial => Tier::Premium,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Company::Tower => "Tower",
            Company::Sackson => "Sackson",
            Company::American => "American",
            Company::Festival => "Festival",
            Company::Worldwide => "Worldwide",
            Company::Continental => "Continental",
            Company::Imperial => "Imperial",
        }
    }
}

impl fmt::Display for Company {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Company {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Company::ALL
            .into_iter()
            .find(|c| c.name() == s)
            .ok_or(())
    }
}

/// One cell of the 12x9 board, addressed as `"<col><row>"`, e.g. `"12I"`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tile {
    col: u8, // 1..=12
    row: u8, // 0..=8, rendered 'A'..='I'
}

impl Tile {
    pub fn new(col: u8, row: u8) -> Option<Self> {
        if (1..=NUM_COLS).contains(&col) && row < NUM_ROWS {
            Some(Self { col, row })
        } else {
            None
        }
    }

    pub fn col(self) -> u8 {
        self.col
    }

    pub fn row_char(self) -> char {
        (b'A' + self.row) as char
    }

    /// All board positions in column-major order (`1A`, `1B`, .., `12I`).
    pub fn all() -> impl Iterator<Item = Tile> {
        (1..=NUM_COLS).flat_map(|col| (0..NUM_ROWS).map(move |row| Tile { col, row }))
    }

    /// Up/down/left/right neighbors that stay on the board.
    pub fn neighbors(self) -> Vec<Tile> {
        let mut out = Vec::with_capacity(4);
        if self.col > 1 {
            out.push(Tile { col: self.col - 1, row: self.row });
        }
        if self.col < NUM_COLS {
            out.push(Tile { col: self.col + 1, row: self.row });
        }
        if self.row > 0 {
            out.push(Tile { col: self.col, row: self.row - 1 });
        }
        if self.row + 1 < NUM_ROWS {
            out.push(Tile { col: self.col, row: self.row + 1 });
        }
        out
    }
}

impl fmt::Display for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.col, self.row_char())
    }
}

impl fmt::Debug for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tile({}{})", self.col, self.row_char())
    }
}

impl FromStr for Tile {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() < 2 {
            return Err(());
        }
        let (num, letter) = s.split_at(s.len() - 1);
        let col: u8 = num.parse().map_err(|_| ())?;
        let ch = letter.chars().next().ok_or(())?;
        if !ch.is_ascii_uppercase() {
            return Err(());
        }
        Tile::new(col, (ch as u8) - b'A').ok_or(())
    }
}

impl Serialize for Tile {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Tile {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse()
            .map_err(|_| de::Error::custom(format!("invalid tile id {s:?}")))
    }
}

/// Board-cell ownership. `Unplaced` cells are still in the draw pool;
/// a placed tile starts `Neutral` and may later join a chain. Placed
/// tiles are never removed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TileOwner {
    #[default]
    Unplaced,
    Neutral,
    Chain(Company),
}

impl TileOwner {
    pub fn company(self) -> Option<Company> {
        match self {
            TileOwner::Chain(c) => Some(c),
            _ => None,
        }
    }

    pub fn is_placed(self) -> bool {
        self != TileOwner::Unplaced
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TileOwner::Unplaced => "",
            TileOwner::Neutral => "Blank",
            TileOwner::Chain(c) => c.name(),
        }
    }
}

impl Serialize for TileOwner {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TileOwner {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        match s.as_str() {
            "" => Ok(TileOwner::Unplaced),
            "Blank" => Ok(TileOwner::Neutral),
            other => other
                .parse()
                .map(TileOwner::Chain)
                .map_err(|_| de::Error::custom(format!("unknown tile owner {other:?}"))),
        }
    }
}

pub type Board = BTreeMap<Tile, TileOwner>;

/// Durable per-company record. `tiles` and `stock_total` are reconciled
/// against the board and the seat holdings before every broadcast.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyRecord {
    pub name: Company,
    pub tiles: u32,
    #[serde(rename = "stockPrice")]
    pub stock_price: Money,
    #[serde(rename = "stockTotal")]
    pub stock_total: u32,
}

impl CompanyRecord {
    pub fn new(name: Company) -> Self {
        Self {
            name,
            tiles: 0,
            stock_price: 0,
            stock_total: STOCK_PER_COMPANY,
        }
    }

    pub fn is_active(&self) -> bool {
        self.tiles >= 2
    }

    pub fn is_safe(&self) -> bool {
        self.tiles >= SAFE_CHAIN
    }
}

/// Ephemeral merger state. Exists only between a merging placement and the
/// last holder's settle; consolidated here instead of the loose per-key
/// records the persisted layout would otherwise need.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MergerScratchpad {
    /// Surviving company. Empty while a tie is waiting on `merging_selection`.
    #[serde(rename = "mainCompany")]
    pub main_company: Option<Company>,
    /// Tied-for-largest chains the current player must pick from.
    #[serde(rename = "mainCandidates")]
    pub main_candidates: Vec<Company>,
    /// Chains that will be absorbed once settlement completes.
    #[serde(rename = "otherCompanies")]
    pub other_companies: Vec<Company>,
    /// Per absorbed company: who still has to settle, and what was paid out.
    pub settles: BTreeMap<Company, SettleRecord>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SettleRecord {
    pub holders: Vec<String>,
    pub dividends: BTreeMap<String, Money>,
}

/// One absorbed-company decision inside a `merging_settle` message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleDecision {
    pub company: Company,
    pub sell_amount: u32,
    pub exchange_amount: u32,
}
