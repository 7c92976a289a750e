use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::engine::acquire::{
    Board, Company, CompanyRecord, MergerScratchpad, Money, Tile, TileOwner,
};
use crate::engine::splendor::{self, DevCard, GemCount, LastAction, NobleCard};

use super::{LockToken, RoomMeta, RoomStore, StoreError, StoreResult};

const LOG_TARGET: &str = "boardroom::store::memory";

#[derive(Clone, Debug, Default)]
struct SeatRecord {
    cash: Money,
    hand: Vec<Tile>,
    stocks: BTreeMap<Company, u32>,
    gems: GemCount,
    cards: Vec<DevCard>,
    reserved: Vec<DevCard>,
    nobles: Vec<NobleCard>,
    score: u32,
}

#[derive(Clone, Debug)]
struct RoomRecord {
    meta: RoomMeta,
    current_player: Option<String>,
    first_player: Option<String>,
    board: Board,
    companies: BTreeMap<Company, CompanyRecord>,
    seats: HashMap<String, SeatRecord>,
    scratchpad: Option<MergerScratchpad>,
    last_tile: Option<Tile>,
    gem_pool: GemCount,
    cards: Vec<DevCard>,
    nobles: Vec<NobleCard>,
    last_actions: HashMap<String, LastAction>,
}

impl RoomRecord {
    fn new(meta: RoomMeta) -> Self {
        Self {
            meta,
            current_player: None,
            first_player: None,
            board: Board::new(),
            companies: BTreeMap::new(),
            seats: HashMap::new(),
            scratchpad: None,
            last_tile: None,
            gem_pool: splendor::zero_gems(),
            cards: Vec::new(),
            nobles: Vec::new(),
            last_actions: HashMap::new(),
        }
    }
}

/// Process-local room store. Lives behind the same trait a networked
/// backend would implement; the engines cannot tell the difference.
pub struct MemoryStore {
    rooms: RwLock<HashMap<String, RoomRecord>>,
    locks: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn missing(room: &str) -> StoreError {
    StoreError::NotFound(format!("room {room}"))
}

impl MemoryStore {
    async fn read<T>(
        &self,
        room: &str,
        f: impl FnOnce(&RoomRecord) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let rooms = self.rooms.read().await;
        let record = rooms.get(room).ok_or_else(|| missing(room))?;
        f(record)
    }

    async fn write<T>(
        &self,
        room: &str,
        f: impl FnOnce(&mut RoomRecord) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut rooms = self.rooms.write().await;
        let record = rooms.get_mut(room).ok_or_else(|| missing(room))?;
        f(record)
    }

    fn seat<'a>(record: &'a RoomRecord, player: &str) -> StoreResult<&'a SeatRecord> {
        record
            .seats
            .get(player)
            .ok_or_else(|| StoreError::NotFound(format!("player {player}")))
    }

    fn seat_mut<'a>(record: &'a mut RoomRecord, player: &str) -> &'a mut SeatRecord {
        record.seats.entry(player.to_string()).or_default()
    }
}

#[async_trait]
impl RoomStore for MemoryStore {
    async fn create_room(&self, room: &str, meta: RoomMeta) -> StoreResult<()> {
        let mut rooms = self.rooms.write().await;
        rooms.insert(room.to_string(), RoomRecord::new(meta));
        debug!(target: LOG_TARGET, room, total = rooms.len(), "room record created");
        Ok(())
    }

    async fn room_meta(&self, room: &str) -> StoreResult<RoomMeta> {
        self.read(room, |r| Ok(r.meta.clone())).await
    }

    async fn set_room_meta(&self, room: &str, meta: RoomMeta) -> StoreResult<()> {
        self.write(room, |r| {
            r.meta = meta;
            Ok(())
        })
        .await
    }

    async fn list_rooms(&self) -> StoreResult<Vec<(String, RoomMeta)>> {
        let rooms = self.rooms.read().await;
        let mut out: Vec<(String, RoomMeta)> = rooms
            .iter()
            .map(|(id, r)| (id.clone(), r.meta.clone()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(out)
    }

    async fn delete_room(&self, room: &str) -> StoreResult<()> {
        let mut rooms = self.rooms.write().await;
        rooms.remove(room);
        Ok(())
    }

    async fn current_player(&self, room: &str) -> StoreResult<Option<String>> {
        self.read(room, |r| Ok(r.current_player.clone())).await
    }

    async fn set_current_player(&self, room: &str, player: &str) -> StoreResult<()> {
        self.write(room, |r| {
            r.current_player = Some(player.to_string());
            Ok(())
        })
        .await
    }

    async fn first_player(&self, room: &str) -> StoreResult<Option<String>> {
        self.read(room, |r| Ok(r.first_player.clone())).await
    }

    async fn set_first_player(&self, room: &str, player: &str) -> StoreResult<()> {
        self.write(room, |r| {
            r.first_player = Some(player.to_string());
            Ok(())
        })
        .await
    }

    async fn player_exists(&self, room: &str, player: &str) -> StoreResult<bool> {
        self.read(room, |r| Ok(r.seats.contains_key(player))).await
    }

    async fn board(&self, room: &str) -> StoreResult<Board> {
        self.read(room, |r| Ok(r.board.clone())).await
    }

    async fn set_tile(&self, room: &str, tile: Tile, owner: TileOwner) -> StoreResult<()> {
        self.write(room, |r| {
            r.board.insert(tile, owner);
            Ok(())
        })
        .await
    }

    async fn set_tiles(&self, room: &str, updates: &[(Tile, TileOwner)]) -> StoreResult<()> {
        self.write(room, |r| {
            for (tile, owner) in updates {
                r.board.insert(*tile, *owner);
            }
            Ok(())
        })
        .await
    }

    async fn company(&self, room: &str, company: Company) -> StoreResult<CompanyRecord> {
        self.read(room, |r| {
            r.companies
                .get(&company)
                .cloned()
                .ok_or_else(|| StoreError::NotFound(format!("company {company}")))
        })
        .await
    }

    async fn set_company(&self, room: &str, record: CompanyRecord) -> StoreResult<()> {
        self.write(room, |r| {
            r.companies.insert(record.name, record);
            Ok(())
        })
        .await
    }

    async fn companies(&self, room: &str) -> StoreResult<BTreeMap<Company, CompanyRecord>> {
        self.read(room, |r| Ok(r.companies.clone())).await
    }

    async fn cash(&self, room: &str, player: &str) -> StoreResult<Money> {
        self.read(room, |r| Ok(Self::seat(r, player)?.cash)).await
    }

    async fn set_cash(&self, room: &str, player: &str, amount: Money) -> StoreResult<()> {
        self.write(room, |r| {
            Self::seat_mut(r, player).cash = amount;
            Ok(())
        })
        .await
    }

    async fn add_cash(&self, room: &str, player: &str, delta: Money) -> StoreResult<Money> {
        self.write(room, |r| {
            let seat = Self::seat_mut(r, player);
            seat.cash += delta;
            Ok(seat.cash)
        })
        .await
    }

    async fn hand(&self, room: &str, player: &str) -> StoreResult<Vec<Tile>> {
        self.read(room, |r| Ok(Self::seat(r, player)?.hand.clone()))
            .await
    }

    async fn set_hand(&self, room: &str, player: &str, tiles: &[Tile]) -> StoreResult<()> {
        self.write(room, |r| {
            Self::seat_mut(r, player).hand = tiles.to_vec();
            Ok(())
        })
        .await
    }

    async fn push_hand_tile(&self, room: &str, player: &str, tile: Tile) -> StoreResult<()> {
        self.write(room, |r| {
            Self::seat_mut(r, player).hand.push(tile);
            Ok(())
        })
        .await
    }

    async fn remove_hand_tile(&self, room: &str, player: &str, tile: Tile) -> StoreResult<bool> {
        self.write(room, |r| {
            let hand = &mut Self::seat_mut(r, player).hand;
            match hand.iter().position(|t| *t == tile) {
                Some(idx) => {
                    hand.remove(idx);
                    Ok(true)
                }
                None => Ok(false),
            }
        })
        .await
    }

    async fn stocks(&self, room: &str, player: &str) -> StoreResult<BTreeMap<Company, u32>> {
        self.read(room, |r| Ok(Self::seat(r, player)?.stocks.clone()))
            .await
    }

    async fn set_stocks(
        &self,
        room: &str,
        player: &str,
        stocks: &BTreeMap<Company, u32>,
    ) -> StoreResult<()> {
        self.write(room, |r| {
            Self::seat_mut(r, player).stocks = stocks.clone();
            Ok(())
        })
        .await
    }

    async fn scratchpad(&self, room: &str) -> StoreResult<Option<MergerScratchpad>> {
        self.read(room, |r| Ok(r.scratchpad.clone())).await
    }

    async fn set_scratchpad(&self, room: &str, pad: &MergerScratchpad) -> StoreResult<()> {
        self.write(room, |r| {
            r.scratchpad = Some(pad.clone());
            Ok(())
        })
        .await
    }

    async fn clear_scratchpad(&self, room: &str) -> StoreResult<()> {
        self.write(room, |r| {
            r.scratchpad = None;
            Ok(())
        })
        .await
    }

    async fn last_tile(&self, room: &str) -> StoreResult<Option<Tile>> {
        self.read(room, |r| Ok(r.last_tile)).await
    }

    async fn set_last_tile(&self, room: &str, tile: Option<Tile>) -> StoreResult<()> {
        self.write(room, |r| {
            r.last_tile = tile;
            Ok(())
        })
        .await
    }

    async fn gem_pool(&self, room: &str) -> StoreResult<GemCount> {
        self.read(room, |r| Ok(r.gem_pool.clone())).await
    }

    async fn set_gem_pool(&self, room: &str, pool: &GemCount) -> StoreResult<()> {
        self.write(room, |r| {
            r.gem_pool = pool.clone();
            Ok(())
        })
        .await
    }

    async fn card(&self, room: &str, id: u32) -> StoreResult<DevCard> {
        self.read(room, |r| {
            r.cards
                .iter()
                .find(|c| c.id == id)
                .cloned()
                .ok_or_else(|| StoreError::NotFound(format!("card {id}")))
        })
        .await
    }

    async fn set_card(&self, room: &str, card: &DevCard) -> StoreResult<()> {
        self.write(room, |r| {
            match r.cards.iter_mut().find(|c| c.id == card.id) {
                Some(slot) => *slot = card.clone(),
                None => r.cards.push(card.clone()),
            }
            Ok(())
        })
        .await
    }

    async fn all_cards(&self, room: &str) -> StoreResult<Vec<DevCard>> {
        self.read(room, |r| Ok(r.cards.clone())).await
    }

    async fn set_all_cards(&self, room: &str, cards: &[DevCard]) -> StoreResult<()> {
        self.write(room, |r| {
            r.cards = cards.to_vec();
            Ok(())
        })
        .await
    }

    async fn set_noble(&self, room: &str, noble: &NobleCard) -> StoreResult<()> {
        self.write(room, |r| {
            match r.nobles.iter_mut().find(|n| n.id == noble.id) {
                Some(slot) => *slot = noble.clone(),
                None => r.nobles.push(noble.clone()),
            }
            Ok(())
        })
        .await
    }

    async fn all_nobles(&self, room: &str) -> StoreResult<Vec<NobleCard>> {
        self.read(room, |r| Ok(r.nobles.clone())).await
    }

    async fn set_all_nobles(&self, room: &str, nobles: &[NobleCard]) -> StoreResult<()> {
        self.write(room, |r| {
            r.nobles = nobles.to_vec();
            Ok(())
        })
        .await
    }

    async fn player_gems(&self, room: &str, player: &str) -> StoreResult<GemCount> {
        self.read(room, |r| Ok(Self::seat(r, player)?.gems.clone()))
            .await
    }

    async fn set_player_gems(
        &self,
        room: &str,
        player: &str,
        gems: &GemCount,
    ) -> StoreResult<()> {
        self.write(room, |r| {
            Self::seat_mut(r, player).gems = gems.clone();
            Ok(())
        })
        .await
    }

    async fn player_cards(&self, room: &str, player: &str) -> StoreResult<Vec<DevCard>> {
        self.read(room, |r| Ok(Self::seat(r, player)?.cards.clone()))
            .await
    }

    async fn set_player_cards(
        &self,
        room: &str,
        player: &str,
        cards: &[DevCard],
    ) -> StoreResult<()> {
        self.write(room, |r| {
            Self::seat_mut(r, player).cards = cards.to_vec();
            Ok(())
        })
        .await
    }

    async fn reserved_cards(&self, room: &str, player: &str) -> StoreResult<Vec<DevCard>> {
        self.read(room, |r| Ok(Self::seat(r, player)?.reserved.clone()))
            .await
    }

    async fn set_reserved_cards(
        &self,
        room: &str,
        player: &str,
        cards: &[DevCard],
    ) -> StoreResult<()> {
        self.write(room, |r| {
            Self::seat_mut(r, player).reserved = cards.to_vec();
            Ok(())
        })
        .await
    }

    async fn player_nobles(&self, room: &str, player: &str) -> StoreResult<Vec<NobleCard>> {
        self.read(room, |r| Ok(Self::seat(r, player)?.nobles.clone()))
            .await
    }

    async fn set_player_nobles(
        &self,
        room: &str,
        player: &str,
        nobles: &[NobleCard],
    ) -> StoreResult<()> {
        self.write(room, |r| {
            Self::seat_mut(r, player).nobles = nobles.to_vec();
            Ok(())
        })
        .await
    }

    async fn score(&self, room: &str, player: &str) -> StoreResult<u32> {
        self.read(room, |r| Ok(Self::seat(r, player)?.score)).await
    }

    async fn set_score(&self, room: &str, player: &str, score: u32) -> StoreResult<()> {
        self.write(room, |r| {
            Self::seat_mut(r, player).score = score;
            Ok(())
        })
        .await
    }

    async fn last_action(&self, room: &str, player: &str) -> StoreResult<Option<LastAction>> {
        self.read(room, |r| Ok(r.last_actions.get(player).cloned()))
            .await
    }

    async fn set_last_action(&self, room: &str, action: &LastAction) -> StoreResult<()> {
        self.write(room, |r| {
            r.last_actions
                .insert(action.player_id.clone(), action.clone());
            Ok(())
        })
        .await
    }

    async fn try_lock(&self, name: &str, ttl: Duration) -> StoreResult<Option<LockToken>> {
        let mut locks = self.locks.lock().await;
        let now = Instant::now();
        if let Some((_, deadline)) = locks.get(name) {
            if *deadline > now {
                return Ok(None);
            }
        }
        let token = Uuid::new_v4().to_string();
        locks.insert(name.to_string(), (token.clone(), now + ttl));
        Ok(Some(LockToken(token)))
    }

    async fn release_lock(&self, name: &str, token: &LockToken) -> StoreResult<()> {
        let mut locks = self.locks.lock().await;
        if let Some((held, _)) = locks.get(name) {
            if *held == token.0 {
                locks.remove(name);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{GameKind, Phase};

    fn meta() -> RoomMeta {
        RoomMeta {
            game: GameKind::Acquire,
            owner: "alice".into(),
            max_players: 2,
            started: false,
            phase: Phase::SetTile,
            game_start: None,
        }
    }

    #[tokio::test]
    async fn missing_room_is_not_found() {
        let store = MemoryStore::new();
        let err = store.room_meta("nope").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn seat_state_round_trips() {
        let store = MemoryStore::new();
        store.create_room("r1", meta()).await.unwrap();
        store.set_cash("r1", "alice", 6000).await.unwrap();
        assert_eq!(store.add_cash("r1", "alice", -500).await.unwrap(), 5500);
        assert_eq!(store.cash("r1", "alice").await.unwrap(), 5500);

        let tile: Tile = "5C".parse().unwrap();
        store.set_hand("r1", "alice", &[tile]).await.unwrap();
        assert!(store.remove_hand_tile("r1", "alice", tile).await.unwrap());
        assert!(!store.remove_hand_tile("r1", "alice", tile).await.unwrap());
    }

    #[tokio::test]
    async fn named_lock_is_exclusive_until_released() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(5);
        let token = store.try_lock("merge_settle:r1", ttl).await.unwrap().unwrap();
        assert!(store.try_lock("merge_settle:r1", ttl).await.unwrap().is_none());

        // a stale token cannot release someone else's lock
        let stale = LockToken("bogus".into());
        store.release_lock("merge_settle:r1", &stale).await.unwrap();
        assert!(store.try_lock("merge_settle:r1", ttl).await.unwrap().is_none());

        store.release_lock("merge_settle:r1", &token).await.unwrap();
        assert!(store.try_lock("merge_settle:r1", ttl).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn expired_lock_can_be_taken_over() {
        let store = MemoryStore::new();
        let _token = store
            .try_lock("merge_settle:r2", Duration::from_millis(0))
            .await
            .unwrap()
            .unwrap();
        // TTL of zero is immediately stale
        assert!(store
            .try_lock("merge_settle:r2", Duration::from_secs(5))
            .await
            .unwrap()
            .is_some());
    }
}
