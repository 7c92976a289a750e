use std::collections::BTreeSet;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::engine::{ActionError, HandlerCtx, Phase};
use crate::store::RoomStore;

use super::board::{count_company_tiles, neutral_region};
use super::rules::stock_info;
use super::types::*;

const LOG_TARGET: &str = "boardroom::engine::acquire::merger";
/// Settlement is the one multi-actor phase; a short store-level lock
/// serializes concurrent holders even across processes.
const SETTLE_LOCK_TTL: Duration = Duration::from_secs(5);

fn settle_lock_name(room_id: &str) -> String {
    format!("merge_settle:{room_id}")
}

async fn set_phase(store: &dyn RoomStore, room_id: &str, phase: Phase) -> Result<(), ActionError> {
    let mut meta = store.room_meta(room_id).await?;
    meta.phase = phase;
    store.set_room_meta(room_id, meta).await?;
    Ok(())
}

/// Entered from `place_tile` when the tile touches two or more chains.
pub(crate) async fn begin_merger(
    store: &dyn RoomStore,
    ctx: &HandlerCtx,
    tile: Tile,
    neighbors: &BTreeSet<Company>,
) -> Result<(), ActionError> {
    let companies = store.companies(&ctx.room_id).await?;
    let size_of = |c: Company| companies.get(&c).map(|r| r.tiles).unwrap_or(0);
    let max = neighbors.iter().map(|c| size_of(*c)).max().unwrap_or(0);
    let tied: Vec<Company> = neighbors
        .iter()
        .copied()
        .filter(|c| size_of(*c) == max)
        .collect();

    if tied.len() > 1 {
        let others: Vec<Company> = neighbors
            .iter()
            .copied()
            .filter(|c| !tied.contains(c) && size_of(*c) < SAFE_CHAIN)
            .collect();
        if others.is_empty() && max >= SAFE_CHAIN {
            // Every tied chain is safe: nothing can be absorbed, the tile
            // stays neutral and the turn moves on.
            info!(target: LOG_TARGET, room = %ctx.room_id, %tile, "merger between safe chains skipped");
            set_phase(store, &ctx.room_id, Phase::BuyStock).await?;
            return Ok(());
        }
        let pad = MergerScratchpad {
            main_company: None,
            main_candidates: tied,
            other_companies: others,
            settles: Default::default(),
        };
        store.set_scratchpad(&ctx.room_id, &pad).await?;
        set_phase(store, &ctx.room_id, Phase::MergingSelection).await?;
        return Ok(());
    }

    let main = tied[0];
    let others: Vec<Company> = neighbors
        .iter()
        .copied()
        .filter(|c| *c != main && size_of(*c) < SAFE_CHAIN)
        .collect();
    if others.is_empty() {
        info!(target: LOG_TARGET, room = %ctx.room_id, %tile, "no absorbable chain, merger skipped");
        set_phase(store, &ctx.room_id, Phase::BuyStock).await?;
        return Ok(());
    }
    run_merge_process(store, ctx, main, others).await
}

/// `merging_selection`: the current player breaks the size tie.
pub async fn handle_merging_selection(
    store: &dyn RoomStore,
    ctx: &HandlerCtx,
    chosen: Company,
) -> Result<(), ActionError> {
    let meta = store.room_meta(&ctx.room_id).await?;
    if meta.phase != Phase::MergingSelection {
        return Err(ActionError::WrongPhase(meta.phase));
    }
    let current = store.current_player(&ctx.room_id).await?;
    if current.as_deref() != Some(ctx.player_id.as_str()) {
        return Err(ActionError::OutOfTurn);
    }

    let pad = store
        .scratchpad(&ctx.room_id)
        .await?
        .ok_or(ActionError::Illegal("no merger selection pending"))?;
    if !pad.main_candidates.contains(&chosen) {
        return Err(ActionError::Illegal("company is not among the tied chains"));
    }

    // Tied losers join the absorption pool; re-filter safety in case a
    // stale selection arrives after the board changed.
    let companies = store.companies(&ctx.room_id).await?;
    let size_of = |c: Company| companies.get(&c).map(|r| r.tiles).unwrap_or(0);
    let mut losers = pad.other_companies.clone();
    losers.extend(pad.main_candidates.iter().copied().filter(|c| *c != chosen));
    losers.retain(|c| size_of(*c) < SAFE_CHAIN);

    if losers.is_empty() {
        store.clear_scratchpad(&ctx.room_id).await?;
        set_phase(store, &ctx.room_id, Phase::BuyStock).await?;
        return Ok(());
    }
    run_merge_process(store, ctx, chosen, losers).await
}

/// Pay shareholder bonuses for every absorbed chain and record who still
/// has to settle. Bonuses use the absorbed chain's own tier and size.
async fn run_merge_process(
    store: &dyn RoomStore,
    ctx: &HandlerCtx,
    main: Company,
    others: Vec<Company>,
) -> Result<(), ActionError> {
    let mut pad = MergerScratchpad {
        main_company: Some(main),
        main_candidates: Vec::new(),
        other_companies: others.clone(),
        settles: Default::default(),
    };

    for absorbed in others {
        let record = store.company(&ctx.room_id, absorbed).await?;
        let mut holders: Vec<(String, u32)> = Vec::new();
        for seat in &ctx.seat_order {
            let count = store
                .stocks(&ctx.room_id, seat)
                .await?
                .get(&absorbed)
                .copied()
                .unwrap_or(0);
            if count > 0 {
                holders.push((seat.clone(), count));
            }
        }
        holders.sort_by(|a, b| b.1.cmp(&a.1));

        let info = stock_info(absorbed.tier(), record.tiles);
        let dividends = compute_dividends(&holders, info.bonus_first, info.bonus_second);
        for (player, amount) in &dividends {
            store.add_cash(&ctx.room_id, player, *amount).await?;
            debug!(
                target: LOG_TARGET,
                room = %ctx.room_id, %absorbed, player = %player, amount, "dividend paid"
            );
        }
        pad.settles.insert(
            absorbed,
            SettleRecord {
                holders: holders.into_iter().map(|(p, _)| p).collect(),
                dividends: dividends.into_iter().collect(),
            },
        );
    }

    info!(
        target: LOG_TARGET,
        room = %ctx.room_id, %main, absorbed = ?pad.other_companies, "merger dividends settled"
    );

    if pad.settles.values().all(|s| s.holders.is_empty()) {
        // Nobody holds shares of any absorbed chain: complete immediately.
        finalize_settlement(store, &ctx.room_id, &pad, main).await?;
        return Ok(());
    }
    store.set_scratchpad(&ctx.room_id, &pad).await?;
    set_phase(store, &ctx.room_id, Phase::MergingSettle).await?;
    Ok(())
}

/// Dividend ranking. `holders` must be sorted by share count descending.
pub fn compute_dividends(
    holders: &[(String, u32)],
    first_bonus: Money,
    second_bonus: Money,
) -> Vec<(String, Money)> {
    match holders {
        [] => Vec::new(),
        [(sole, _)] => vec![(sole.clone(), first_bonus)],
        [(top, top_count), rest @ ..] => {
            let tied_first: Vec<&String> = std::iter::once(top)
                .chain(rest.iter().filter(|(_, c)| c == top_count).map(|(p, _)| p))
                .collect();
            if tied_first.len() >= 2 {
                let share = (first_bonus + second_bonus) / tied_first.len() as Money;
                return tied_first.into_iter().map(|p| (p.clone(), share)).collect();
            }
            let second_count = rest[0].1;
            let tied_second: Vec<&String> = rest
                .iter()
                .filter(|(_, c)| *c == second_count)
                .map(|(p, _)| p)
                .collect();
            let share = second_bonus / tied_second.len() as Money;
            let mut out = vec![(top.clone(), first_bonus)];
            out.extend(tied_second.into_iter().map(|p| (p.clone(), share)));
            out
        }
    }
}

/// `merging_settle`: one holder's sell/exchange/keep decision across all
/// absorbed chains. Multiple holders may race here, hence the named lock.
pub async fn handle_merging_settle(
    store: &dyn RoomStore,
    ctx: &HandlerCtx,
    decisions: &[SettleDecision],
) -> Result<(), ActionError> {
    let meta = store.room_meta(&ctx.room_id).await?;
    if meta.phase != Phase::MergingSettle {
        return Err(ActionError::WrongPhase(meta.phase));
    }

    let lock_name = settle_lock_name(&ctx.room_id);
    let Some(token) = store.try_lock(&lock_name, SETTLE_LOCK_TTL).await? else {
        warn!(target: LOG_TARGET, room = %ctx.room_id, player = %ctx.player_id, "settle lock busy");
        return Err(ActionError::Illegal("another settlement is in progress"));
    };
    let result = settle_locked(store, ctx, decisions).await;
    store.release_lock(&lock_name, &token).await?;
    result
}

async fn settle_locked(
    store: &dyn RoomStore,
    ctx: &HandlerCtx,
    decisions: &[SettleDecision],
) -> Result<(), ActionError> {
    let mut pad = store
        .scratchpad(&ctx.room_id)
        .await?
        .ok_or(ActionError::Illegal("no merger to settle"))?;
    let main = pad
        .main_company
        .ok_or(ActionError::Illegal("merger survivor not chosen yet"))?;

    if !pad
        .settles
        .values()
        .any(|s| s.holders.iter().any(|h| h == &ctx.player_id))
    {
        return Err(ActionError::Illegal("player has nothing to settle"));
    }

    let mut stocks = store.stocks(&ctx.room_id, &ctx.player_id).await?;
    let mut main_record = store.company(&ctx.room_id, main).await?;

    // Validate the whole batch before touching anything.
    let mut exchanged_main: u32 = 0;
    let mut seen: BTreeSet<Company> = BTreeSet::new();
    for decision in decisions {
        if !pad.settles.contains_key(&decision.company) {
            return Err(ActionError::Illegal("company is not being absorbed"));
        }
        if !seen.insert(decision.company) {
            return Err(ActionError::Illegal("duplicate company in settle batch"));
        }
        let held = stocks.get(&decision.company).copied().unwrap_or(0);
        if decision.sell_amount + decision.exchange_amount > held {
            return Err(ActionError::Illegal("selling more shares than held"));
        }
        if decision.exchange_amount % 2 != 0 {
            return Err(ActionError::Illegal("exchange amount must be even"));
        }
        exchanged_main += decision.exchange_amount / 2;
    }
    if exchanged_main > main_record.stock_total {
        return Err(ActionError::Illegal("survivor stock bank exhausted"));
    }

    let mut proceeds: Money = 0;
    for decision in decisions {
        if decision.sell_amount == 0 && decision.exchange_amount == 0 {
            continue;
        }
        let mut absorbed = store.company(&ctx.room_id, decision.company).await?;
        proceeds += absorbed.stock_price * Money::from(decision.sell_amount);
        // Both sold and exchanged shares return to the dissolving chain's
        // bank; the exchange additionally draws on the survivor's.
        absorbed.stock_total += decision.sell_amount + decision.exchange_amount;
        store.set_company(&ctx.room_id, absorbed).await?;

        let held = stocks.entry(decision.company).or_insert(0);
        *held -= decision.sell_amount + decision.exchange_amount;
        *stocks.entry(main).or_insert(0) += decision.exchange_amount / 2;
    }
    main_record.stock_total -= exchanged_main;
    store.set_company(&ctx.room_id, main_record).await?;
    store.set_stocks(&ctx.room_id, &ctx.player_id, &stocks).await?;
    if proceeds > 0 {
        store.add_cash(&ctx.room_id, &ctx.player_id, proceeds).await?;
    }

    for record in pad.settles.values_mut() {
        record.holders.retain(|h| h != &ctx.player_id);
    }
    info!(
        target: LOG_TARGET,
        room = %ctx.room_id, player = %ctx.player_id, proceeds, exchanged = exchanged_main,
        "holder settled"
    );

    if pad.settles.values().all(|s| s.holders.is_empty()) {
        finalize_settlement(store, &ctx.room_id, &pad, main).await?;
    } else {
        store.set_scratchpad(&ctx.room_id, &pad).await?;
    }
    Ok(())
}

/// Last holder done: repaint every absorbed tile plus the neutral region
/// around the trigger tile, recount the affected chains and clear the
/// scratchpad.
async fn finalize_settlement(
    store: &dyn RoomStore,
    room_id: &str,
    pad: &MergerScratchpad,
    main: Company,
) -> Result<(), ActionError> {
    let board = store.board(room_id).await?;
    let mut updates: Vec<(Tile, TileOwner)> = Vec::new();
    for (tile, owner) in &board {
        if let TileOwner::Chain(c) = owner {
            if pad.settles.contains_key(c) {
                updates.push((*tile, TileOwner::Chain(main)));
            }
        }
    }
    if let Some(trigger) = store.last_tile(room_id).await? {
        for tile in neutral_region(&board, trigger) {
            updates.push((tile, TileOwner::Chain(main)));
        }
    }
    store.set_tiles(room_id, &updates).await?;

    let board = store.board(room_id).await?;
    for company in pad.settles.keys().copied().chain(std::iter::once(main)) {
        let mut record = store.company(room_id, company).await?;
        record.tiles = count_company_tiles(&board, company);
        record.stock_price = stock_info(company.tier(), record.tiles).price;
        store.set_company(room_id, record).await?;
    }

    store.clear_scratchpad(room_id).await?;
    set_phase(store, room_id, Phase::BuyStock).await?;
    info!(target: LOG_TARGET, room = room_id, %main, "merger settlement complete");
    Ok(())
}
