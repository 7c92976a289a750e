use std::collections::BTreeMap;

use serde::Serialize;

use crate::engine::ActionError;
use crate::store::{RoomMeta, RoomStore};

use super::engine::refresh_scores_and_phase;
use super::types::*;

#[derive(Clone, Debug, Serialize)]
pub struct SeatView {
    #[serde(rename = "normalCard")]
    pub normal_cards: Vec<DevCard>,
    #[serde(rename = "nobleCard")]
    pub noble_cards: Vec<NobleCard>,
    pub gem: GemCount,
    pub score: u32,
    #[serde(rename = "reserveCard")]
    pub reserve_cards: Vec<DevCard>,
}

#[derive(Clone, Debug, Serialize)]
pub struct RoomView {
    /// Revealed development cards grouped by level. Hidden cards never
    /// leave the server.
    pub card: BTreeMap<u8, Vec<DevCard>>,
    pub gems: GemCount,
    pub nobles: Vec<NobleCard>,
    #[serde(rename = "roomInfo")]
    pub room_info: RoomMeta,
    #[serde(rename = "currentPlayer")]
    pub current_player: String,
    #[serde(rename = "lastActions")]
    pub last_actions: BTreeMap<String, LastAction>,
}

#[derive(Clone, Debug, Serialize)]
pub struct SplendorSync {
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(rename = "playerId")]
    pub player_id: String,
    #[serde(rename = "playerData")]
    pub player_data: BTreeMap<String, SeatView>,
    #[serde(rename = "roomData")]
    pub room_data: RoomView,
}

pub struct SyncBundle {
    seats: BTreeMap<String, SeatView>,
    room: RoomView,
}

impl SyncBundle {
    pub fn frame_for(&self, recipient: &str) -> SplendorSync {
        SplendorSync {
            kind: "sync",
            player_id: recipient.to_string(),
            player_data: self.seats.clone(),
            room_data: self.room.clone(),
        }
    }
}

/// Assemble one broadcast's worth of state reads; scores and the
/// last-turn/end transitions are refreshed first so the frame already
/// reflects them.
pub async fn assemble_sync(
    store: &dyn RoomStore,
    room_id: &str,
    seat_order: &[String],
) -> Result<SyncBundle, ActionError> {
    refresh_scores_and_phase(store, room_id, seat_order).await?;

    let meta = store.room_meta(room_id).await?;
    let current_player = store.current_player(room_id).await?.unwrap_or_default();

    let mut seats = BTreeMap::new();
    let mut last_actions = BTreeMap::new();
    for seat in seat_order {
        if !store.player_exists(room_id, seat).await? {
            continue;
        }
        seats.insert(
            seat.clone(),
            SeatView {
                normal_cards: store.player_cards(room_id, seat).await?,
                noble_cards: store.player_nobles(room_id, seat).await?,
                gem: store.player_gems(room_id, seat).await?,
                score: store.score(room_id, seat).await?,
                reserve_cards: store.reserved_cards(room_id, seat).await?,
            },
        );
        if let Some(action) = store.last_action(room_id, seat).await? {
            last_actions.insert(seat.clone(), action);
        }
    }

    let mut revealed: BTreeMap<u8, Vec<DevCard>> = BTreeMap::new();
    for card in store.all_cards(room_id).await? {
        if card.state == CardState::Revealed {
            revealed.entry(card.level).or_default().push(card);
        }
    }
    let nobles: Vec<NobleCard> = store
        .all_nobles(room_id)
        .await?
        .into_iter()
        .filter(|n| n.state == CardState::Revealed)
        .collect();

    Ok(SyncBundle {
        seats,
        room: RoomView {
            card: revealed,
            gems: store.gem_pool(room_id).await?,
            nobles,
            room_info: meta,
            current_player,
            last_actions,
        },
    })
}
