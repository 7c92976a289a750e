use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::engine::acquire::{
    Board, Company, CompanyRecord, MergerScratchpad, Money, Tile, TileOwner,
};
use crate::engine::splendor::{DevCard, GemCount, LastAction, NobleCard};
use crate::engine::{GameKind, Phase};

pub mod memory;

pub use memory::MemoryStore;

/// Store failures are coarse on purpose: handlers log and drop, they never
/// retry or branch on the details.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("failed to decode stored value: {0}")]
    Parse(String),
    #[error("store backend unreachable: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Durable room header.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoomMeta {
    pub game: GameKind,
    #[serde(rename = "userID")]
    pub owner: String,
    #[serde(rename = "maxPlayers")]
    pub max_players: usize,
    /// True once the roster filled and everyone readied; cleared again when
    /// a seat drops so the lobby can show the interruption.
    #[serde(rename = "roomStatus")]
    pub started: bool,
    #[serde(rename = "gameStatus")]
    pub phase: Phase,
    #[serde(rename = "gameStart", skip_serializing_if = "Option::is_none", default)]
    pub game_start: Option<DateTime<Local>>,
}

/// Token proving ownership of a named short-TTL lock; only its holder can
/// release early.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockToken(pub String);

/// Typed persistence of room, seat and game state, keyed by room id (and
/// player id where relevant). The store never validates game rules; rule
/// enforcement lives entirely in the engines.
#[async_trait]
pub trait RoomStore: Send + Sync {
    // ---- room meta ----
    async fn create_room(&self, room: &str, meta: RoomMeta) -> StoreResult<()>;
    async fn room_meta(&self, room: &str) -> StoreResult<RoomMeta>;
    async fn set_room_meta(&self, room: &str, meta: RoomMeta) -> StoreResult<()>;
    async fn list_rooms(&self) -> StoreResult<Vec<(String, RoomMeta)>>;
    /// Removes every resource belonging to the room.
    async fn delete_room(&self, room: &str) -> StoreResult<()>;

    // ---- turn pointers ----
    async fn current_player(&self, room: &str) -> StoreResult<Option<String>>;
    async fn set_current_player(&self, room: &str, player: &str) -> StoreResult<()>;
    async fn first_player(&self, room: &str) -> StoreResult<Option<String>>;
    async fn set_first_player(&self, room: &str, player: &str) -> StoreResult<()>;

    /// Whether per-player state was ever initialized for this seat (used to
    /// tell a reconnect from a first join).
    async fn player_exists(&self, room: &str, player: &str) -> StoreResult<bool>;

    // ---- Acquire: board and companies ----
    async fn board(&self, room: &str) -> StoreResult<Board>;
    async fn set_tile(&self, room: &str, tile: Tile, owner: TileOwner) -> StoreResult<()>;
    async fn set_tiles(&self, room: &str, updates: &[(Tile, TileOwner)]) -> StoreResult<()>;
    async fn company(&self, room: &str, company: Company) -> StoreResult<CompanyRecord>;
    async fn set_company(&self, room: &str, record: CompanyRecord) -> StoreResult<()>;
    async fn companies(&self, room: &str) -> StoreResult<BTreeMap<Company, CompanyRecord>>;

    // ---- Acquire: per-seat state ----
    async fn cash(&self, room: &str, player: &str) -> StoreResult<Money>;
    async fn set_cash(&self, room: &str, player: &str, amount: Money) -> StoreResult<()>;
    async fn add_cash(&self, room: &str, player: &str, delta: Money) -> StoreResult<Money>;
    async fn hand(&self, room: &str, player: &str) -> StoreResult<Vec<Tile>>;
    async fn set_hand(&self, room: &str, player: &str, tiles: &[Tile]) -> StoreResult<()>;
    async fn push_hand_tile(&self, room: &str, player: &str, tile: Tile) -> StoreResult<()>;
    /// Returns false when the tile was not in the hand.
    async fn remove_hand_tile(&self, room: &str, player: &str, tile: Tile) -> StoreResult<bool>;
    async fn stocks(&self, room: &str, player: &str) -> StoreResult<BTreeMap<Company, u32>>;
    async fn set_stocks(
        &self,
        room: &str,
        player: &str,
        stocks: &BTreeMap<Company, u32>,
    ) -> StoreResult<()>;

    // ---- Acquire: merger scratchpad ----
    async fn scratchpad(&self, room: &str) -> StoreResult<Option<MergerScratchpad>>;
    async fn set_scratchpad(&self, room: &str, pad: &MergerScratchpad) -> StoreResult<()>;
    async fn clear_scratchpad(&self, room: &str) -> StoreResult<()>;
    async fn last_tile(&self, room: &str) -> StoreResult<Option<Tile>>;
    async fn set_last_tile(&self, room: &str, tile: Option<Tile>) -> StoreResult<()>;

    // ---- Splendor: table state ----
    async fn gem_pool(&self, room: &str) -> StoreResult<GemCount>;
    async fn set_gem_pool(&self, room: &str, pool: &GemCount) -> StoreResult<()>;
    async fn card(&self, room: &str, id: u32) -> StoreResult<DevCard>;
    async fn set_card(&self, room: &str, card: &DevCard) -> StoreResult<()>;
    /// All development cards in deck order (the order fixes which hidden
    /// card is revealed next).
    async fn all_cards(&self, room: &str) -> StoreResult<Vec<DevCard>>;
    async fn set_all_cards(&self, room: &str, cards: &[DevCard]) -> StoreResult<()>;
    async fn set_noble(&self, room: &str, noble: &NobleCard) -> StoreResult<()>;
    async fn all_nobles(&self, room: &str) -> StoreResult<Vec<NobleCard>>;
    async fn set_all_nobles(&self, room: &str, nobles: &[NobleCard]) -> StoreResult<()>;

    // ---- Splendor: per-seat state ----
    async fn player_gems(&self, room: &str, player: &str) -> StoreResult<GemCount>;
    async fn set_player_gems(&self, room: &str, player: &str, gems: &GemCount)
        -> StoreResult<()>;
    async fn player_cards(&self, room: &str, player: &str) -> StoreResult<Vec<DevCard>>;
    async fn set_player_cards(
        &self,
        room: &str,
        player: &str,
        cards: &[DevCard],
    ) -> StoreResult<()>;
    async fn reserved_cards(&self, room: &str, player: &str) -> StoreResult<Vec<DevCard>>;
    async fn set_reserved_cards(
        &self,
        room: &str,
        player: &str,
        cards: &[DevCard],
    ) -> StoreResult<()>;
    async fn player_nobles(&self, room: &str, player: &str) -> StoreResult<Vec<NobleCard>>;
    async fn set_player_nobles(
        &self,
        room: &str,
        player: &str,
        nobles: &[NobleCard],
    ) -> StoreResult<()>;
    async fn score(&self, room: &str, player: &str) -> StoreResult<u32>;
    async fn set_score(&self, room: &str, player: &str, score: u32) -> StoreResult<()>;
    async fn last_action(&self, room: &str, player: &str) -> StoreResult<Option<LastAction>>;
    async fn set_last_action(&self, room: &str, action: &LastAction) -> StoreResult<()>;

    // ---- named short-TTL locks ----
    /// Returns None when the lock is currently held. The lock expires on its
    /// own after `ttl` if never released.
    async fn try_lock(&self, name: &str, ttl: Duration) -> StoreResult<Option<LockToken>>;
    /// Releasing with a stale token is a no-op.
    async fn release_lock(&self, name: &str, token: &LockToken) -> StoreResult<()>;
}
