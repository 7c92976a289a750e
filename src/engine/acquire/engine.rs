use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::{debug, info, warn};

use crate::engine::{ActionError, HandlerCtx, Phase};
use crate::room::turn;
use crate::store::RoomStore;

use super::board::{chain_region, classify_neighbors, count_company_tiles, empty_board, undealt_tiles};
use super::merger::{self, compute_dividends};
use super::rules::stock_info;
use super::types::*;

const LOG_TARGET: &str = "boardroom::engine::acquire";

/// Seed a freshly created (or restarted) room: an empty 108-cell board and
/// the seven companies at zero tiles with a full stock bank.
pub async fn init_room(store: &dyn RoomStore, room_id: &str) -> Result<(), ActionError> {
    let board: Vec<(Tile, TileOwner)> = empty_board().into_iter().collect();
    store.set_tiles(room_id, &board).await?;
    for company in Company::ALL {
        store.set_company(room_id, CompanyRecord::new(company)).await?;
    }
    store.set_last_tile(room_id, None).await?;
    store.clear_scratchpad(room_id).await?;
    Ok(())
}

/// First-join seat setup: starting cash, a five-tile hand drawn from the
/// undealt pool, and an all-zero stock book.
pub async fn init_player(
    store: &dyn RoomStore,
    room_id: &str,
    player_id: &str,
    seat_order: &[String],
    rng: &mut StdRng,
) -> Result<(), ActionError> {
    store.set_cash(room_id, player_id, STARTING_CASH).await?;

    let board = store.board(room_id).await?;
    let mut hands = Vec::with_capacity(seat_order.len());
    for seat in seat_order {
        if store.player_exists(room_id, seat).await? {
            hands.push(store.hand(room_id, seat).await?);
        }
    }
    let mut pool = undealt_tiles(&board, &hands);
    pool.shuffle(rng);
    pool.truncate(STARTING_HAND);
    store.set_hand(room_id, player_id, &pool).await?;

    let zeroed: BTreeMap<Company, u32> = Company::ALL.into_iter().map(|c| (c, 0)).collect();
    store.set_stocks(room_id, player_id, &zeroed).await?;
    Ok(())
}

async fn require_phase(
    store: &dyn RoomStore,
    room_id: &str,
    expected: Phase,
) -> Result<(), ActionError> {
    let meta = store.room_meta(room_id).await?;
    if meta.phase != expected {
        return Err(ActionError::WrongPhase(meta.phase));
    }
    Ok(())
}

async fn require_turn(
    store: &dyn RoomStore,
    room_id: &str,
    player_id: &str,
) -> Result<(), ActionError> {
    let current = store.current_player(room_id).await?;
    if current.as_deref() != Some(player_id) {
        return Err(ActionError::OutOfTurn);
    }
    Ok(())
}

async fn set_phase(store: &dyn RoomStore, room_id: &str, phase: Phase) -> Result<(), ActionError> {
    let mut meta = store.room_meta(room_id).await?;
    meta.phase = phase;
    store.set_room_meta(room_id, meta).await?;
    debug!(target: LOG_TARGET, room = room_id, %phase, "phase updated");
    Ok(())
}

/// Deal one random undealt tile into the actor's hand, if any remain and
/// the hand has room.
pub(crate) async fn deal_tile(
    store: &dyn RoomStore,
    room_id: &str,
    player_id: &str,
    seat_order: &[String],
    rng: &mut StdRng,
) -> Result<(), ActionError> {
    let board = store.board(room_id).await?;
    let mut hands = Vec::with_capacity(seat_order.len());
    for seat in seat_order {
        if store.player_exists(room_id, seat).await? {
            hands.push(store.hand(room_id, seat).await?);
        }
    }
    let mut pool = undealt_tiles(&board, &hands);
    if pool.is_empty() {
        warn!(target: LOG_TARGET, room = room_id, "draw pool exhausted, no tile dealt");
        return Ok(());
    }
    pool.shuffle(rng);
    if store.hand(room_id, player_id).await?.len() < MAX_HAND {
        store.push_hand_tile(room_id, player_id, pool[0]).await?;
    }
    Ok(())
}

async fn advance_turn(
    store: &dyn RoomStore,
    room_id: &str,
    ctx: &HandlerCtx,
) -> Result<(), ActionError> {
    if let Some(next) = turn::next_seat(&ctx.seat_order, &ctx.player_id) {
        store.set_current_player(room_id, &next).await?;
    }
    Ok(())
}

/// After a non-merging placement: head to the buy phase when there is
/// anything on the market, otherwise deal and pass the turn directly.
async fn post_placement(
    store: &dyn RoomStore,
    ctx: &HandlerCtx,
    rng: &mut StdRng,
) -> Result<(), ActionError> {
    let companies = store.companies(&ctx.room_id).await?;
    if companies.values().any(|c| c.tiles > 0) {
        set_phase(store, &ctx.room_id, Phase::BuyStock).await?;
        return Ok(());
    }
    deal_tile(store, &ctx.room_id, &ctx.player_id, &ctx.seat_order, rng).await?;
    advance_turn(store, &ctx.room_id, ctx).await?;
    Ok(())
}

/// `place_tile`: put a hand tile on the board and classify what it touches.
pub async fn handle_place_tile(
    store: &dyn RoomStore,
    ctx: &HandlerCtx,
    rng: &mut StdRng,
    tile: Tile,
) -> Result<(), ActionError> {
    require_phase(store, &ctx.room_id, Phase::SetTile).await?;
    require_turn(store, &ctx.room_id, &ctx.player_id).await?;

    if !store.remove_hand_tile(&ctx.room_id, &ctx.player_id, tile).await? {
        return Err(ActionError::Illegal("tile is not in the player's hand"));
    }
    store.set_tile(&ctx.room_id, tile, TileOwner::Neutral).await?;
    store.set_last_tile(&ctx.room_id, Some(tile)).await?;
    info!(target: LOG_TARGET, room = %ctx.room_id, player = %ctx.player_id, %tile, "tile placed");

    let board = store.board(&ctx.room_id).await?;
    let adjacency = classify_neighbors(&board, tile);

    if adjacency.companies.len() >= 2 {
        return merger::begin_merger(store, ctx, tile, &adjacency.companies).await;
    }

    if adjacency.companies.len() == 1 {
        let company = *adjacency.companies.iter().next().expect("one neighbor");
        expand_chain(store, &ctx.room_id, tile, company).await?;
        set_phase(store, &ctx.room_id, Phase::BuyStock).await?;
        return Ok(());
    }

    if adjacency.neutral >= 1 {
        let companies = store.companies(&ctx.room_id).await?;
        if companies.values().any(|c| c.tiles == 0) {
            set_phase(store, &ctx.room_id, Phase::CreateCompany).await?;
            return Ok(());
        }
        debug!(target: LOG_TARGET, room = %ctx.room_id, "no company left to found");
    }

    post_placement(store, ctx, rng).await
}

/// Grow `company` over the placed tile and every neutral tile connected to
/// it, then recount the chain from the board.
async fn expand_chain(
    store: &dyn RoomStore,
    room_id: &str,
    from: Tile,
    company: Company,
) -> Result<(), ActionError> {
    let board = store.board(room_id).await?;
    let region = chain_region(&board, from, company);
    let updates: Vec<(Tile, TileOwner)> = region
        .iter()
        .map(|t| (*t, TileOwner::Chain(company)))
        .collect();
    store.set_tiles(room_id, &updates).await?;

    let board = store.board(room_id).await?;
    let mut record = store.company(room_id, company).await?;
    record.tiles = count_company_tiles(&board, company);
    record.stock_price = stock_info(company.tier(), record.tiles).price;
    store.set_company(room_id, record).await?;
    Ok(())
}

/// `create_company`: found an inactive chain on the just-placed tile. The
/// founder receives one free share if the bank still has one.
pub async fn handle_create_company(
    store: &dyn RoomStore,
    ctx: &HandlerCtx,
    company: Company,
) -> Result<(), ActionError> {
    require_phase(store, &ctx.room_id, Phase::CreateCompany).await?;
    require_turn(store, &ctx.room_id, &ctx.player_id).await?;

    let record = store.company(&ctx.room_id, company).await?;
    if record.tiles != 0 {
        return Err(ActionError::Illegal("company is already on the board"));
    }
    let Some(tile) = store.last_tile(&ctx.room_id).await? else {
        return Err(ActionError::Illegal("no placed tile to found on"));
    };

    expand_chain(store, &ctx.room_id, tile, company).await?;

    let mut record = store.company(&ctx.room_id, company).await?;
    if record.stock_total > 0 {
        record.stock_total -= 1;
        store.set_company(&ctx.room_id, record).await?;
        let mut stocks = store.stocks(&ctx.room_id, &ctx.player_id).await?;
        *stocks.entry(company).or_insert(0) += 1;
        store.set_stocks(&ctx.room_id, &ctx.player_id, &stocks).await?;
    }
    info!(
        target: LOG_TARGET,
        room = %ctx.room_id, player = %ctx.player_id, %company, "company founded"
    );

    set_phase(store, &ctx.room_id, Phase::BuyStock).await?;
    Ok(())
}

/// `buy_stock`: up to three shares of active chains, then draw a
/// replacement tile and pass the turn.
pub async fn handle_buy_stock(
    store: &dyn RoomStore,
    ctx: &HandlerCtx,
    rng: &mut StdRng,
    order: &BTreeMap<Company, u32>,
) -> Result<(), ActionError> {
    require_phase(store, &ctx.room_id, Phase::BuyStock).await?;
    require_turn(store, &ctx.room_id, &ctx.player_id).await?;

    let requested: u32 = order.values().sum();
    if requested > MAX_BUY_PER_TURN {
        return Err(ActionError::Illegal("at most three shares per turn"));
    }

    let mut total_price: Money = 0;
    let mut records = Vec::with_capacity(order.len());
    for (&company, &count) in order {
        if count == 0 {
            continue;
        }
        let record = store.company(&ctx.room_id, company).await?;
        if !record.is_active() {
            return Err(ActionError::Illegal("company is not on the board"));
        }
        if count > record.stock_total {
            return Err(ActionError::Illegal("company stock is sold out"));
        }
        total_price += record.stock_price * Money::from(count);
        records.push((record, count));
    }
    let cash = store.cash(&ctx.room_id, &ctx.player_id).await?;
    if total_price > cash {
        return Err(ActionError::Illegal("not enough cash"));
    }

    let mut stocks = store.stocks(&ctx.room_id, &ctx.player_id).await?;
    for (mut record, count) in records {
        record.stock_total -= count;
        *stocks.entry(record.name).or_insert(0) += count;
        store.set_company(&ctx.room_id, record).await?;
    }
    store.set_stocks(&ctx.room_id, &ctx.player_id, &stocks).await?;
    store.add_cash(&ctx.room_id, &ctx.player_id, -total_price).await?;
    info!(
        target: LOG_TARGET,
        room = %ctx.room_id, player = %ctx.player_id, shares = requested, spent = total_price,
        "stock purchased"
    );

    deal_tile(store, &ctx.room_id, &ctx.player_id, &ctx.seat_order, rng).await?;
    advance_turn(store, &ctx.room_id, ctx).await?;
    set_phase(store, &ctx.room_id, Phase::SetTile).await?;
    Ok(())
}

/// `game_end`: allowed once every active chain is safe, or any chain
/// reached 41 tiles. Pays each chain's bonuses one final time and converts
/// every share to cash at current prices.
pub async fn handle_game_end(store: &dyn RoomStore, ctx: &HandlerCtx) -> Result<(), ActionError> {
    let meta = store.room_meta(&ctx.room_id).await?;
    if meta.phase == Phase::End {
        return Err(ActionError::WrongPhase(meta.phase));
    }

    let companies = store.companies(&ctx.room_id).await?;
    let active: Vec<&CompanyRecord> = companies.values().filter(|c| c.is_active()).collect();
    let giant = companies.values().any(|c| c.tiles >= ENDGAME_CHAIN);
    let all_safe = !active.is_empty() && active.iter().all(|c| c.is_safe());
    if !giant && !all_safe {
        return Err(ActionError::Illegal("the game cannot be ended yet"));
    }

    // Final payout: shareholder bonuses, then share conversion.
    for record in companies.values().filter(|c| c.is_active()) {
        let mut holders: Vec<(String, u32)> = Vec::new();
        for seat in &ctx.seat_order {
            let count = store
                .stocks(&ctx.room_id, seat)
                .await?
                .get(&record.name)
                .copied()
                .unwrap_or(0);
            if count > 0 {
                holders.push((seat.clone(), count));
            }
        }
        holders.sort_by(|a, b| b.1.cmp(&a.1));
        let info = stock_info(record.name.tier(), record.tiles);
        for (player, bonus) in compute_dividends(&holders, info.bonus_first, info.bonus_second) {
            store.add_cash(&ctx.room_id, &player, bonus).await?;
        }
    }
    for seat in &ctx.seat_order {
        let stocks = store.stocks(&ctx.room_id, seat).await?;
        let mut proceeds: Money = 0;
        for (company, count) in &stocks {
            if *count == 0 {
                continue;
            }
            let record = &companies[company];
            proceeds += record.stock_price * Money::from(*count);
        }
        if proceeds > 0 {
            store.add_cash(&ctx.room_id, seat, proceeds).await?;
        }
        let zeroed: BTreeMap<Company, u32> = Company::ALL.into_iter().map(|c| (c, 0)).collect();
        store.set_stocks(&ctx.room_id, seat, &zeroed).await?;
    }
    for mut record in companies.into_values() {
        record.stock_total = STOCK_PER_COMPANY;
        store.set_company(&ctx.room_id, record).await?;
    }

    set_phase(store, &ctx.room_id, Phase::End).await?;
    info!(target: LOG_TARGET, room = %ctx.room_id, player = %ctx.player_id, "game ended");
    Ok(())
}

/// `restart_game`: wipe the table but keep the roster and the turn
/// pointer.
pub async fn handle_restart(
    store: &dyn RoomStore,
    ctx: &HandlerCtx,
    rng: &mut StdRng,
) -> Result<(), ActionError> {
    require_phase(store, &ctx.room_id, Phase::End).await?;

    init_room(store, &ctx.room_id).await?;
    for seat in &ctx.seat_order {
        store.set_hand(&ctx.room_id, seat, &[]).await?;
    }
    for seat in &ctx.seat_order {
        init_player(store, &ctx.room_id, seat, &ctx.seat_order, rng).await?;
    }
    set_phase(store, &ctx.room_id, Phase::SetTile).await?;
    info!(target: LOG_TARGET, room = %ctx.room_id, "game restarted");
    Ok(())
}
