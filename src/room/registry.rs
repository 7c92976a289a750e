use std::sync::Arc;

use dashmap::DashMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{info, warn};

use crate::ai::VirtualConn;
use crate::engine::GameKind;
use crate::store::{RoomStore, StoreError};

use super::conn::Conn;
use super::room::{JoinError, Room};

const LOG_TARGET: &str = "boardroom::room::registry";

/// Process-wide map of live rooms. Rooms are hydrated lazily from the
/// store: a room created over HTTP exists durably before its first
/// connection arrives.
pub struct Registry {
    rooms: DashMap<String, Arc<Room>>,
    store: Arc<dyn RoomStore>,
    rng: parking_lot::Mutex<StdRng>,
}

impl Registry {
    pub fn new(store: Arc<dyn RoomStore>, seed: Option<u64>) -> Arc<Self> {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Arc::new(Self {
            rooms: DashMap::new(),
            store,
            rng: parking_lot::Mutex::new(rng),
        })
    }

    pub fn store(&self) -> Arc<dyn RoomStore> {
        Arc::clone(&self.store)
    }

    pub fn child_rng(&self) -> StdRng {
        let mut guard = self.rng.lock();
        StdRng::seed_from_u64(guard.gen())
    }

    /// Fetch the live room, hydrating it from the store on first touch.
    pub async fn room(&self, room_id: &str) -> Result<Arc<Room>, JoinError> {
        if let Some(room) = self.rooms.get(room_id) {
            return Ok(Arc::clone(&room));
        }
        let meta = self.store.room_meta(room_id).await.map_err(|err| match err {
            StoreError::NotFound(_) => JoinError::NotFound,
            other => JoinError::Store(other),
        })?;
        let room = Room::new(
            room_id.to_string(),
            meta.game,
            Arc::clone(&self.store),
            self.child_rng(),
        );
        let entry = self
            .rooms
            .entry(room_id.to_string())
            .or_insert_with(|| Arc::clone(&room));
        Ok(Arc::clone(&entry))
    }

    pub fn get(&self, room_id: &str) -> Option<Arc<Room>> {
        self.rooms.get(room_id).map(|r| Arc::clone(&r))
    }

    /// Seat a player (joining or reconnecting) and return the room.
    pub async fn join(
        &self,
        room_id: &str,
        player_id: &str,
        conn: Arc<dyn Conn>,
    ) -> Result<Arc<Room>, JoinError> {
        let room = self.room(room_id).await?;
        room.join(player_id, conn).await?;
        Ok(room)
    }

    /// Seat `count` AI players on virtual connections. Called at room
    /// creation; the AI seats are born ready.
    pub async fn seat_virtual(&self, room_id: &str, count: usize) -> Result<(), JoinError> {
        if count == 0 {
            return Ok(());
        }
        let room = self.room(room_id).await?;
        for idx in 1..=count {
            let player_id = format!("{}{}", crate::ai::AI_PREFIX, idx);
            let conn: Arc<dyn Conn> = Arc::new(VirtualConn::new(player_id.clone(), &room));
            room.join(&player_id, conn).await?;
            info!(target: LOG_TARGET, room = room_id, player = %player_id, "AI seated");
        }
        Ok(())
    }

    pub fn remove(&self, room_id: &str) {
        self.rooms.remove(room_id);
    }

    /// Drop every room with no live human connection, in memory and in
    /// the store. Runs from the daily reset task.
    pub async fn sweep_dormant(&self) {
        let ids: Vec<String> = self.rooms.iter().map(|e| e.key().clone()).collect();
        let mut removed = 0usize;
        for id in ids {
            let Some(room) = self.get(&id) else { continue };
            if room.has_live_humans().await {
                continue;
            }
            self.rooms.remove(&id);
            if let Err(err) = self.store.delete_room(&id).await {
                warn!(target: LOG_TARGET, room = %id, %err, "failed to delete dormant room");
            }
            removed += 1;
        }
        if removed > 0 {
            info!(target: LOG_TARGET, removed, remaining = self.rooms.len(), "dormant rooms swept");
        }
    }
}
