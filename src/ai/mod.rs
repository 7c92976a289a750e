use std::sync::{Arc, Weak};
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::room::{ClientMessage, Conn, ConnError, Room};
use crate::tokio_tools::spawn_named_task;

pub mod acquire;
pub mod splendor;

const LOG_TARGET: &str = "boardroom::ai";
/// Virtual seats are marked by their player-id prefix.
pub const AI_PREFIX: &str = "ai_";
const MIN_DELAY_SECS: u64 = 1;
const MAX_DELAY_SECS: u64 = 5;

pub fn is_ai_player(player_id: &str) -> bool {
    player_id.starts_with(AI_PREFIX)
}

/// The AI's end of the wire. It cannot be read from; writing a `sync`
/// frame to it may schedule a synthesized action, which re-enters the room
/// through the same message path a human frame would.
pub struct VirtualConn {
    player_id: String,
    room: Weak<Room>,
}

impl VirtualConn {
    pub fn new(player_id: String, room: &Arc<Room>) -> Self {
        Self {
            player_id,
            room: Arc::downgrade(room),
        }
    }
}

impl Conn for VirtualConn {
    fn send(&self, frame: String) -> Result<(), ConnError> {
        if let Some(room) = self.room.upgrade() {
            maybe_act(room, self.player_id.clone(), &frame);
        }
        Ok(())
    }

    fn close(&self) {}

    fn is_virtual(&self) -> bool {
        true
    }
}

/// Inspect a broadcast frame and, when it is this AI's turn (or its
/// settlement is awaited), schedule a delayed action. The delay paces the
/// game so humans can follow along.
fn maybe_act(room: Arc<Room>, player_id: String, frame: &str) {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(frame) else {
        return;
    };
    if value.get("type").and_then(|t| t.as_str()) != Some("sync") {
        return;
    }
    let room_data = &value["roomData"];
    let current = room_data["currentPlayer"].as_str().unwrap_or_default().to_string();
    let Some(phase) = room_data["roomInfo"]["gameStatus"].as_str().map(str::to_string) else {
        return;
    };

    let my_settle_turn = phase == "mergingSettle"
        && value["tempData"]["merger"]["settles"]
            .as_object()
            .map(|settles| {
                settles.values().any(|record| {
                    record["holders"]
                        .as_array()
                        .and_then(|holders| holders.first())
                        .and_then(|h| h.as_str())
                        == Some(player_id.as_str())
                })
            })
            .unwrap_or(false);
    if !my_settle_turn && current != player_id {
        return;
    }
    if !is_ai_player(&player_id) {
        return;
    }

    let candidates: Vec<String> = value["tempData"]["merger"]["mainCandidates"]
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|c| c.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    debug!(target: LOG_TARGET, player = %player_id, %phase, "scheduling AI action");
    spawn_named_task(format!("ai-turn-{player_id}"), async move {
        let delay = rand::thread_rng().gen_range(MIN_DELAY_SECS..=MAX_DELAY_SECS);
        tokio::time::sleep(Duration::from_secs(delay)).await;

        let msg = match decide(&room, &player_id, &phase, &candidates).await {
            Some(msg) => msg,
            None => {
                debug!(target: LOG_TARGET, player = %player_id, %phase, "no AI action available");
                return;
            }
        };
        room.handle_message(&player_id, msg).await;
    });
}

async fn decide(
    room: &Arc<Room>,
    player_id: &str,
    phase: &str,
    candidates: &[String],
) -> Option<ClientMessage> {
    let store = room.store();
    let store = store.as_ref();
    let room_id = room.id.as_str();
    match phase {
        "setTile" => acquire::choose_tile(store, room_id, player_id)
            .await
            .map(|payload| ClientMessage::PlaceTile { payload }),
        "createCompany" => acquire::choose_company(store, room_id)
            .await
            .map(|payload| ClientMessage::CreateCompany { payload }),
        "buyStock" => acquire::choose_stocks(store, room_id, player_id)
            .await
            .map(|payload| ClientMessage::BuyStock { payload }),
        "mergingSelection" => acquire::choose_selection(store, room_id, player_id, candidates)
            .await
            .map(|payload| ClientMessage::MergingSelection { payload }),
        "mergingSettle" => acquire::choose_settle(store, room_id, player_id)
            .await
            .map(|payload| ClientMessage::MergingSettle { payload }),
        "playing" | "last_turn" => splendor::choose_action(store, room_id, player_id).await,
        "end" => Some(ClientMessage::RestartGame),
        other => {
            warn!(target: LOG_TARGET, phase = other, "no AI behavior for this phase");
            None
        }
    }
}
