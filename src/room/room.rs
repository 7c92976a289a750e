use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Local;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::engine::{acquire, splendor, ActionError, GameKind, HandlerCtx, Phase};
use crate::store::{RoomStore, StoreError};

use super::conn::Conn;
use super::router::{parse_frame, ClientMessage};
use super::turn;

const LOG_TARGET: &str = "boardroom::room";

#[derive(Debug, thiserror::Error)]
pub enum JoinError {
    #[error("room not found")]
    NotFound,
    #[error("room is full")]
    Full,
    #[error("game already started")]
    Started,
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct Seat {
    pub player_id: String,
    pub conn: Option<Arc<dyn Conn>>,
    pub online: bool,
    pub ready: bool,
}

pub struct RoomInner {
    pub seats: Vec<Seat>,
}

impl RoomInner {
    fn seat_order(&self) -> Vec<String> {
        self.seats.iter().map(|s| s.player_id.clone()).collect()
    }
}

/// One live room: the ordered seat roster and the mutex that serializes
/// every handler, seat mutation and broadcast. Two actions in the same
/// room never interleave; different rooms run in parallel.
pub struct Room {
    pub id: String,
    pub game: GameKind,
    store: Arc<dyn RoomStore>,
    inner: Mutex<RoomInner>,
    rng: parking_lot::Mutex<StdRng>,
    /// Set when stored state fails to decode: the room stops accepting
    /// actions until an operator deletes and recreates it.
    quiesced: AtomicBool,
}

impl Room {
    pub fn new(id: String, game: GameKind, store: Arc<dyn RoomStore>, rng: StdRng) -> Arc<Self> {
        Arc::new(Self {
            id,
            game,
            store,
            inner: Mutex::new(RoomInner { seats: Vec::new() }),
            rng: parking_lot::Mutex::new(rng),
            quiesced: AtomicBool::new(false),
        })
    }

    pub fn store(&self) -> Arc<dyn RoomStore> {
        Arc::clone(&self.store)
    }

    /// Fork a deterministic child RNG; handlers keep it across await
    /// points, the room-level RNG is never held that long.
    fn child_rng(&self) -> StdRng {
        let mut guard = self.rng.lock();
        StdRng::seed_from_u64(guard.gen())
    }

    /// Seat a player, or hand their seat back after a reconnect. A new
    /// connection for a seated player displaces the previous one.
    pub async fn join(&self, player_id: &str, conn: Arc<dyn Conn>) -> Result<(), JoinError> {
        let mut inner = self.inner.lock().await;

        if let Some(seat) = inner.seats.iter_mut().find(|s| s.player_id == player_id) {
            if let Some(old) = seat.conn.take() {
                old.close();
            }
            seat.conn = Some(conn);
            seat.online = true;
            info!(target: LOG_TARGET, room = %self.id, player = player_id, "player reconnected");
            return Ok(());
        }

        let meta = self.store.room_meta(&self.id).await.map_err(|err| match err {
            StoreError::NotFound(_) => JoinError::NotFound,
            other => JoinError::Store(other),
        })?;
        if meta.started {
            return Err(JoinError::Started);
        }
        if inner.seats.len() >= meta.max_players {
            return Err(JoinError::Full);
        }

        let is_virtual = conn.is_virtual();
        inner.seats.push(Seat {
            player_id: player_id.to_string(),
            conn: Some(conn),
            online: true,
            ready: is_virtual,
        });
        info!(
            target: LOG_TARGET,
            room = %self.id, player = player_id, seats = inner.seats.len(),
            max = meta.max_players, "player joined"
        );

        // Virtual seats carry no client that could send `ready`; their
        // state is set up at join time.
        if is_virtual {
            let order = inner.seat_order();
            let mut rng = self.child_rng();
            if let Err(err) = self.init_player(player_id, &order, &mut rng).await {
                warn!(target: LOG_TARGET, room = %self.id, player = player_id, %err, "AI seat init failed");
            }
        }
        Ok(())
    }

    async fn init_player(
        &self,
        player_id: &str,
        seat_order: &[String],
        rng: &mut StdRng,
    ) -> Result<(), ActionError> {
        if self.store.player_exists(&self.id, player_id).await? {
            return Ok(());
        }
        match self.game {
            GameKind::Acquire => {
                acquire::init_player(self.store.as_ref(), &self.id, player_id, seat_order, rng)
                    .await
            }
            GameKind::Splendor => {
                splendor::init_player(self.store.as_ref(), &self.id, player_id).await
            }
        }
    }

    /// One inbound frame from a live connection: parse, dispatch, then
    /// broadcast the room no matter how the handler fared.
    pub async fn handle_frame(self: &Arc<Self>, player_id: &str, raw: &str) {
        let msg = match parse_frame(raw) {
            Ok(msg) => msg,
            Err(err) => {
                warn!(
                    target: LOG_TARGET,
                    room = %self.id, player = player_id, %err, "dropping malformed frame"
                );
                return;
            }
        };
        self.handle_message(player_id, msg).await;
    }

    /// Shared entry point for parsed frames; the AI driver injects its
    /// synthesized messages here, exactly like a human client's.
    pub async fn handle_message(self: &Arc<Self>, player_id: &str, msg: ClientMessage) {
        if self.quiesced.load(Ordering::Relaxed) {
            error!(
                target: LOG_TARGET,
                room = %self.id, player = player_id, "room is quiesced, action dropped"
            );
            return;
        }
        let mut inner = self.inner.lock().await;
        let ctx = HandlerCtx {
            room_id: self.id.clone(),
            player_id: player_id.to_string(),
            seat_order: inner.seat_order(),
        };
        debug!(
            target: LOG_TARGET,
            room = %self.id, player = player_id, kind = msg.kind(), "dispatching message"
        );
        if let Err(err) = self.dispatch(&mut inner, &ctx, msg).await {
            if let ActionError::Store(StoreError::Parse(_)) = &err {
                // Decoded state is inconsistent with the rules: this never
                // happens in a healthy room, so stop touching it.
                error!(
                    target: LOG_TARGET,
                    room = %self.id, %err, "stored state is corrupt, quiescing room"
                );
                self.quiesced.store(true, Ordering::Relaxed);
            } else {
                // Precondition and rule failures are not punished; the
                // client reconciles against the broadcast that follows.
                info!(
                    target: LOG_TARGET,
                    room = %self.id, player = player_id, %err, "action refused"
                );
            }
        }
        self.broadcast_locked(&mut inner).await;
    }

    async fn dispatch(
        &self,
        inner: &mut RoomInner,
        ctx: &HandlerCtx,
        msg: ClientMessage,
    ) -> Result<(), ActionError> {
        let store = self.store.as_ref();
        match (self.game, msg) {
            (_, ClientMessage::Ready) => self.handle_ready(inner, ctx).await,
            (_, ClientMessage::PlayAudio { payload }) => {
                self.relay_audio(inner, &payload);
                Ok(())
            }
            (GameKind::Acquire, ClientMessage::PlaceTile { payload }) => {
                let mut rng = self.child_rng();
                acquire::handle_place_tile(store, ctx, &mut rng, payload).await
            }
            (GameKind::Acquire, ClientMessage::CreateCompany { payload }) => {
                acquire::handle_create_company(store, ctx, payload).await
            }
            (GameKind::Acquire, ClientMessage::BuyStock { payload }) => {
                let mut rng = self.child_rng();
                acquire::handle_buy_stock(store, ctx, &mut rng, &payload).await
            }
            (GameKind::Acquire, ClientMessage::MergingSelection { payload }) => {
                acquire::handle_merging_selection(store, ctx, payload).await
            }
            (GameKind::Acquire, ClientMessage::MergingSettle { payload }) => {
                acquire::handle_merging_settle(store, ctx, &payload).await
            }
            (GameKind::Acquire, ClientMessage::GameEnd) => {
                acquire::handle_game_end(store, ctx).await
            }
            (GameKind::Acquire, ClientMessage::RestartGame) => {
                let mut rng = self.child_rng();
                acquire::handle_restart(store, ctx, &mut rng).await
            }
            (GameKind::Splendor, ClientMessage::GetGem { payload }) => {
                splendor::handle_get_gem(store, ctx, &payload).await
            }
            (GameKind::Splendor, ClientMessage::BuyCard { payload }) => {
                splendor::handle_buy_card(store, ctx, payload).await
            }
            (GameKind::Splendor, ClientMessage::PreserveCard { payload }) => {
                splendor::handle_preserve_card(store, ctx, payload).await
            }
            (GameKind::Splendor, ClientMessage::GameEnd) => {
                splendor::handle_game_end(store, ctx).await
            }
            (GameKind::Splendor, ClientMessage::RestartGame) => {
                let mut rng = self.child_rng();
                splendor::handle_restart(store, ctx, &mut rng).await
            }
            (_, other) => {
                warn!(
                    target: LOG_TARGET,
                    room = %self.id, kind = other.kind(), "message not valid for this game variant"
                );
                Err(ActionError::Illegal("message not valid for this game variant"))
            }
        }
    }

    /// `ready`: set up the seat's durable state on first contact and start
    /// the game once the roster is full and everyone is ready.
    async fn handle_ready(&self, inner: &mut RoomInner, ctx: &HandlerCtx) -> Result<(), ActionError> {
        let order = inner.seat_order();
        let mut rng = self.child_rng();
        self.init_player(&ctx.player_id, &order, &mut rng).await?;

        if let Some(seat) = inner.seats.iter_mut().find(|s| s.player_id == ctx.player_id) {
            seat.ready = true;
        }

        let mut meta = self.store.room_meta(&self.id).await?;
        let roster_full = inner.seats.len() == meta.max_players;
        let all_ready = inner.seats.iter().all(|s| s.ready);
        if !roster_full || !all_ready {
            return Ok(());
        }

        meta.started = true;
        if meta.game_start.is_none() {
            meta.game_start = Some(Local::now());
        }
        if meta.phase == Phase::Waiting {
            meta.phase = match self.game {
                GameKind::Acquire => Phase::SetTile,
                GameKind::Splendor => Phase::Playing,
            };
        }
        self.store.set_room_meta(&self.id, meta).await?;

        if self.store.current_player(&self.id).await?.is_none() {
            if let Some(starter) = turn::choose_starter(&order, &mut rng) {
                self.store.set_current_player(&self.id, &starter).await?;
                self.store.set_first_player(&self.id, &starter).await?;
                info!(target: LOG_TARGET, room = %self.id, %starter, "game started");
            }
        }
        Ok(())
    }

    /// `play_audio`: relay a sound cue to every online seat; no state.
    fn relay_audio(&self, inner: &mut RoomInner, audio: &str) {
        let frame = serde_json::json!({ "type": "audio", "message": audio }).to_string();
        for seat in inner.seats.iter_mut().filter(|s| s.online) {
            if let Some(conn) = &seat.conn {
                if conn.send(frame.clone()).is_err() {
                    seat.online = false;
                    seat.conn = None;
                }
            }
        }
    }

    /// Fan the current state out to every online seat. A failed write
    /// marks that seat offline; nothing is rolled back.
    pub async fn broadcast(self: &Arc<Self>) {
        let mut inner = self.inner.lock().await;
        self.broadcast_locked(&mut inner).await;
    }

    async fn broadcast_locked(&self, inner: &mut RoomInner) {
        let order = inner.seat_order();
        let store = self.store.as_ref();

        enum Bundle {
            Acquire(acquire::SyncBundle),
            Splendor(splendor::SyncBundle),
        }
        let bundle = match self.game {
            GameKind::Acquire => {
                acquire::assemble_sync(store, &self.id, &order).await.map(Bundle::Acquire)
            }
            GameKind::Splendor => {
                splendor::assemble_sync(store, &self.id, &order).await.map(Bundle::Splendor)
            }
        };
        let bundle = match bundle {
            Ok(bundle) => bundle,
            Err(err) => {
                warn!(target: LOG_TARGET, room = %self.id, %err, "snapshot assembly failed");
                return;
            }
        };

        for seat in inner.seats.iter_mut().filter(|s| s.online) {
            let frame = match &bundle {
                Bundle::Acquire(b) => serde_json::to_string(&b.frame_for(&seat.player_id)),
                Bundle::Splendor(b) => serde_json::to_string(&b.frame_for(&seat.player_id)),
            };
            let frame = match frame {
                Ok(frame) => frame,
                Err(err) => {
                    warn!(target: LOG_TARGET, room = %self.id, %err, "frame encode failed");
                    continue;
                }
            };
            if let Some(conn) = &seat.conn {
                if conn.send(frame).is_err() {
                    warn!(
                        target: LOG_TARGET,
                        room = %self.id, player = %seat.player_id, "write failed, marking offline"
                    );
                    seat.online = false;
                    seat.conn = None;
                }
            }
        }
    }

    /// Reader loop ended: keep the seat, drop the connection, and let the
    /// lobby see the interruption. The turn pointer is untouched so a
    /// reconnecting player resumes their turn.
    pub async fn handle_disconnect(self: &Arc<Self>, player_id: &str) {
        let mut inner = self.inner.lock().await;
        let Some(seat) = inner.seats.iter_mut().find(|s| s.player_id == player_id) else {
            return;
        };
        seat.online = false;
        seat.conn = None;
        info!(target: LOG_TARGET, room = %self.id, player = player_id, "player disconnected");

        match self.store.room_meta(&self.id).await {
            Ok(mut meta) if meta.started => {
                meta.started = false;
                if let Err(err) = self.store.set_room_meta(&self.id, meta).await {
                    warn!(target: LOG_TARGET, room = %self.id, %err, "failed to flag interruption");
                }
            }
            Ok(_) => {}
            Err(err) => {
                warn!(target: LOG_TARGET, room = %self.id, %err, "failed to load meta on disconnect")
            }
        }
        self.broadcast_locked(&mut inner).await;
    }

    /// Roster snapshot for the lobby listing.
    pub async fn roster(&self) -> Vec<(String, bool)> {
        let inner = self.inner.lock().await;
        inner
            .seats
            .iter()
            .map(|s| (s.player_id.clone(), s.online))
            .collect()
    }

    /// True while any human connection is online; AI-only rooms count as
    /// dormant for the nightly sweep.
    pub async fn has_live_humans(&self) -> bool {
        let inner = self.inner.lock().await;
        inner.seats.iter().any(|s| {
            s.online
                && s.conn
                    .as_ref()
                    .map(|c| !c.is_virtual())
                    .unwrap_or(false)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::acquire;
    use crate::room::conn::ConnError;
    use crate::store::{MemoryStore, RoomMeta};

    struct FakeConn {
        frames: parking_lot::Mutex<Vec<String>>,
    }

    impl FakeConn {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                frames: parking_lot::Mutex::new(Vec::new()),
            })
        }

        fn last_frame(&self) -> Option<String> {
            self.frames.lock().last().cloned()
        }
    }

    impl Conn for FakeConn {
        fn send(&self, frame: String) -> Result<(), ConnError> {
            self.frames.lock().push(frame);
            Ok(())
        }

        fn close(&self) {}
    }

    async fn acquire_room(max_players: usize) -> (Arc<Room>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        store
            .create_room(
                "r1",
                RoomMeta {
                    game: GameKind::Acquire,
                    owner: "a".to_string(),
                    max_players,
                    started: false,
                    phase: Phase::SetTile,
                    game_start: None,
                },
            )
            .await
            .unwrap();
        acquire::init_room(store.as_ref(), "r1").await.unwrap();
        let room = Room::new(
            "r1".to_string(),
            GameKind::Acquire,
            store.clone() as Arc<dyn RoomStore>,
            StdRng::seed_from_u64(5),
        );
        (room, store)
    }

    #[tokio::test]
    async fn late_joiners_are_refused() {
        let (room, _store) = acquire_room(2).await;
        room.join("a", FakeConn::new()).await.unwrap();
        room.join("b", FakeConn::new()).await.unwrap();
        assert!(matches!(
            room.join("c", FakeConn::new()).await,
            Err(JoinError::Full)
        ));

        // Once started, even a free seat count would not admit newcomers.
        room.handle_message("a", ClientMessage::Ready).await;
        room.handle_message("b", ClientMessage::Ready).await;
        assert!(matches!(
            room.join("c", FakeConn::new()).await,
            Err(JoinError::Started)
        ));
    }

    #[tokio::test]
    async fn all_ready_starts_the_game_with_a_starter() {
        let (room, store) = acquire_room(2).await;
        room.join("a", FakeConn::new()).await.unwrap();
        room.join("b", FakeConn::new()).await.unwrap();
        room.handle_message("a", ClientMessage::Ready).await;
        assert!(!store.room_meta("r1").await.unwrap().started);

        room.handle_message("b", ClientMessage::Ready).await;
        let meta = store.room_meta("r1").await.unwrap();
        assert!(meta.started);
        assert!(meta.game_start.is_some());
        let starter = store.current_player("r1").await.unwrap().unwrap();
        assert!(starter == "a" || starter == "b");
        assert_eq!(store.first_player("r1").await.unwrap(), Some(starter));
    }

    #[tokio::test]
    async fn reconnect_returns_the_same_seat() {
        let (room, store) = acquire_room(2).await;
        let conn_a = FakeConn::new();
        room.join("a", conn_a.clone()).await.unwrap();
        room.join("b", FakeConn::new()).await.unwrap();
        room.handle_message("a", ClientMessage::Ready).await;
        room.handle_message("b", ClientMessage::Ready).await;

        let hand_before = store.hand("r1", "a").await.unwrap();
        let cash_before = store.cash("r1", "a").await.unwrap();
        room.handle_disconnect("a").await;
        assert!(!store.room_meta("r1").await.unwrap().started);

        room.join("a", FakeConn::new()).await.unwrap();
        assert_eq!(store.hand("r1", "a").await.unwrap(), hand_before);
        assert_eq!(store.cash("r1", "a").await.unwrap(), cash_before);
        // Re-readying must not redeal the seat.
        room.handle_message("a", ClientMessage::Ready).await;
        assert_eq!(store.hand("r1", "a").await.unwrap(), hand_before);
    }

    #[tokio::test]
    async fn turn_stalls_while_its_owner_is_offline() {
        let (room, store) = acquire_room(2).await;
        room.join("a", FakeConn::new()).await.unwrap();
        room.join("b", FakeConn::new()).await.unwrap();
        room.handle_message("a", ClientMessage::Ready).await;
        room.handle_message("b", ClientMessage::Ready).await;

        let current = store.current_player("r1").await.unwrap().unwrap();
        let other = if current == "a" { "b" } else { "a" };

        room.handle_disconnect(&current).await;

        // The other seat cannot act in the absent player's stead.
        let tile = store.hand("r1", other).await.unwrap()[0];
        room.handle_message(other, ClientMessage::PlaceTile { payload: tile })
            .await;
        assert!(store.hand("r1", other).await.unwrap().contains(&tile));
        assert_eq!(
            store.current_player("r1").await.unwrap().as_deref(),
            Some(current.as_str())
        );

        // Reconnect and resume: the stalled turn plays out normally.
        room.join(&current, FakeConn::new()).await.unwrap();
        let tile = store.hand("r1", &current).await.unwrap()[0];
        room.handle_message(&current, ClientMessage::PlaceTile { payload: tile })
            .await;
        let board = store.board("r1").await.unwrap();
        assert_ne!(board[&tile], crate::engine::acquire::TileOwner::Unplaced);
        // A lone opening tile skips the buy phase and passes the turn.
        assert_eq!(
            store.current_player("r1").await.unwrap().as_deref(),
            Some(other)
        );
    }

    #[tokio::test]
    async fn broadcast_hides_other_hands() {
        let (room, store) = acquire_room(2).await;
        let conn_a = FakeConn::new();
        room.join("a", conn_a.clone()).await.unwrap();
        room.join("b", FakeConn::new()).await.unwrap();
        room.handle_message("a", ClientMessage::Ready).await;
        room.handle_message("b", ClientMessage::Ready).await;

        let frame = conn_a.last_frame().unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["type"], "sync");
        assert_eq!(value["playerId"], "a");
        assert!(value["playerData"]["a"]["tiles"].is_array());
        assert!(value["playerData"]["b"]["tiles"].is_null());
        let _ = store.hand("r1", "b").await.unwrap();
    }
}
