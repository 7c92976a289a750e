use std::collections::BTreeMap;

use serde::Serialize;

use crate::engine::ActionError;
use crate::store::{RoomMeta, RoomStore};

use super::board::count_company_tiles;
use super::rules::stock_info;
use super::types::*;

#[derive(Clone, Debug, Serialize)]
pub struct SeatInfo {
    pub money: Money,
}

#[derive(Clone, Debug, Serialize)]
pub struct SeatView {
    pub info: SeatInfo,
    pub stocks: BTreeMap<Company, u32>,
    /// Hands are private: populated only in the frame sent to their owner.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tiles: Option<Vec<Tile>>,
}

#[derive(Clone, Debug, Serialize)]
pub struct TileView {
    pub id: Tile,
    pub belong: TileOwner,
}

#[derive(Clone, Debug, Serialize)]
pub struct RoomView {
    #[serde(rename = "companyInfo")]
    pub companies: BTreeMap<Company, CompanyRecord>,
    #[serde(rename = "currentPlayer")]
    pub current_player: String,
    #[serde(rename = "roomInfo")]
    pub room_info: RoomMeta,
    pub tiles: BTreeMap<String, TileView>,
}

#[derive(Clone, Debug, Serialize)]
pub struct TempView {
    #[serde(rename = "lastTile")]
    pub last_tile: Option<Tile>,
    pub merger: Option<MergerScratchpad>,
}

/// The `sync` frame: everything a client needs to render from scratch.
#[derive(Clone, Debug, Serialize)]
pub struct AcquireSync {
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(rename = "playerId")]
    pub player_id: String,
    /// Net worth per seat: cash plus shares at current prices.
    pub result: BTreeMap<String, Money>,
    #[serde(rename = "playerData")]
    pub player_data: BTreeMap<String, SeatView>,
    #[serde(rename = "roomData")]
    pub room_data: RoomView,
    #[serde(rename = "tempData")]
    pub temp_data: TempView,
}

/// Everything shared between the per-seat frames of one broadcast.
pub struct SyncBundle {
    result: BTreeMap<String, Money>,
    seats: BTreeMap<String, SeatView>,
    hands: BTreeMap<String, Vec<Tile>>,
    room: RoomView,
    temp: TempView,
}

impl SyncBundle {
    pub fn frame_for(&self, recipient: &str) -> AcquireSync {
        let mut player_data = self.seats.clone();
        if let Some(view) = player_data.get_mut(recipient) {
            view.tiles = self.hands.get(recipient).cloned();
        }
        AcquireSync {
            kind: "sync",
            player_id: recipient.to_string(),
            result: self.result.clone(),
            player_data,
            room_data: self.room.clone(),
            temp_data: self.temp.clone(),
        }
    }
}

/// Re-derive every company record from the board and the seat holdings.
/// Chain sizes, remaining bank stock and prices are all functions of that
/// state, so every broadcast reflects them exactly.
pub async fn reconcile_companies(
    store: &dyn RoomStore,
    room_id: &str,
    seat_order: &[String],
) -> Result<(), ActionError> {
    let board = store.board(room_id).await?;
    let mut held: BTreeMap<Company, u32> = BTreeMap::new();
    for seat in seat_order {
        if !store.player_exists(room_id, seat).await? {
            continue;
        }
        for (company, count) in store.stocks(room_id, seat).await? {
            *held.entry(company).or_insert(0) += count;
        }
    }
    for company in Company::ALL {
        let mut record = store.company(room_id, company).await?;
        record.tiles = count_company_tiles(&board, company);
        record.stock_total = STOCK_PER_COMPANY
            .saturating_sub(held.get(&company).copied().unwrap_or(0));
        record.stock_price = stock_info(company.tier(), record.tiles).price;
        store.set_company(room_id, record).await?;
    }
    Ok(())
}

/// Assemble one broadcast's worth of state reads.
pub async fn assemble_sync(
    store: &dyn RoomStore,
    room_id: &str,
    seat_order: &[String],
) -> Result<SyncBundle, ActionError> {
    reconcile_companies(store, room_id, seat_order).await?;

    let meta = store.room_meta(room_id).await?;
    let companies = store.companies(room_id).await?;
    let board = store.board(room_id).await?;
    let current_player = store.current_player(room_id).await?.unwrap_or_default();

    let mut result = BTreeMap::new();
    let mut seats = BTreeMap::new();
    let mut hands = BTreeMap::new();
    for seat in seat_order {
        if !store.player_exists(room_id, seat).await? {
            continue;
        }
        let cash = store.cash(room_id, seat).await?;
        let stocks = store.stocks(room_id, seat).await?;
        let holdings_value: Money = stocks
            .iter()
            .map(|(company, count)| {
                companies
                    .get(company)
                    .map(|r| r.stock_price * Money::from(*count))
                    .unwrap_or(0)
            })
            .sum();
        result.insert(seat.clone(), cash + holdings_value);
        hands.insert(seat.clone(), store.hand(room_id, seat).await?);
        seats.insert(
            seat.clone(),
            SeatView {
                info: SeatInfo { money: cash },
                stocks,
                tiles: None,
            },
        );
    }

    let tiles = board
        .iter()
        .map(|(tile, owner)| {
            (
                tile.to_string(),
                TileView {
                    id: *tile,
                    belong: *owner,
                },
            )
        })
        .collect();

    Ok(SyncBundle {
        result,
        seats,
        hands,
        room: RoomView {
            companies,
            current_player,
            room_info: meta,
            tiles,
        },
        temp: TempView {
            last_tile: store.last_tile(room_id).await?,
            merger: store.scratchpad(room_id).await?,
        },
    })
}
