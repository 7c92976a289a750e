use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use tracing::warn;

use crate::engine::acquire::{
    Company, Money, SettleDecision, Tier, Tile, TileOwner, MAX_BUY_PER_TURN, STOCK_PER_COMPANY,
};
use crate::store::RoomStore;

const LOG_TARGET: &str = "boardroom::ai::acquire";
/// The bot stops accumulating one chain past this holding.
const MAX_HOLDING: u32 = 13;

/// Prefer a tile touching an existing chain, then any placed tile, then
/// random.
pub async fn choose_tile(store: &dyn RoomStore, room_id: &str, player_id: &str) -> Option<Tile> {
    let hand = store.hand(room_id, player_id).await.ok()?;
    if hand.is_empty() {
        return None;
    }
    let board = store.board(room_id).await.ok()?;

    let touches = |tile: &Tile, chains_only: bool| {
        tile.neighbors().into_iter().any(|n| {
            match board.get(&n).copied().unwrap_or_default() {
                TileOwner::Chain(_) => true,
                TileOwner::Neutral => !chains_only,
                TileOwner::Unplaced => false,
            }
        })
    };
    if let Some(tile) = hand.iter().find(|t| touches(t, true)) {
        return Some(*tile);
    }
    if let Some(tile) = hand.iter().find(|t| touches(t, false)) {
        return Some(*tile);
    }
    hand.choose(&mut rand::thread_rng()).copied()
}

/// Found the most expensive tier still available.
pub async fn choose_company(store: &dyn RoomStore, room_id: &str) -> Option<Company> {
    let companies = store.companies(room_id).await.ok()?;
    let uncreated: Vec<Company> = companies
        .values()
        .filter(|r| r.tiles == 0)
        .map(|r| r.name)
        .collect();
    for tier in [Tier::Premium, Tier::Medium, Tier::Low] {
        let in_tier: Vec<Company> = uncreated.iter().copied().filter(|c| c.tier() == tier).collect();
        if let Some(pick) = in_tier.choose(&mut rand::thread_rng()) {
            return Some(*pick);
        }
    }
    None
}

/// Greedy cheapest-first purchase, up to three shares, capped per company.
/// An empty order is still a valid turn.
pub async fn choose_stocks(
    store: &dyn RoomStore,
    room_id: &str,
    player_id: &str,
) -> Option<BTreeMap<Company, u32>> {
    let companies = store.companies(room_id).await.ok()?;
    let mut money = store.cash(room_id, player_id).await.ok()?;
    let holdings = store.stocks(room_id, player_id).await.ok()?;

    let mut options: Vec<(Money, Company, u32)> = companies
        .values()
        .filter(|r| {
            r.tiles > 0
                && r.stock_total > 0
                && r.stock_price <= money
                && holdings.get(&r.name).copied().unwrap_or(0) < MAX_HOLDING
        })
        .map(|r| (r.stock_price, r.name, r.stock_total))
        .collect();
    options.sort();

    let mut order = BTreeMap::new();
    let mut bought = 0u32;
    for (price, company, remain) in options {
        if bought >= MAX_BUY_PER_TURN || money < price {
            break;
        }
        let affordable = (money / price.max(1)) as u32;
        let count = (MAX_BUY_PER_TURN - bought).min(remain).min(affordable);
        if count == 0 {
            continue;
        }
        order.insert(company, count);
        money -= price * Money::from(count);
        bought += count;
    }
    Some(order)
}

/// Keep the chain where the bot owns the largest fraction of the shares
/// already in play.
pub async fn choose_selection(
    store: &dyn RoomStore,
    room_id: &str,
    player_id: &str,
    candidates: &[String],
) -> Option<Company> {
    let companies = store.companies(room_id).await.ok()?;
    let holdings = store.stocks(room_id, player_id).await.ok()?;

    let mut best: Option<(f64, Company)> = None;
    for name in candidates {
        let Ok(company) = name.parse::<Company>() else {
            warn!(target: LOG_TARGET, company = %name, "unknown merger candidate");
            continue;
        };
        let Some(record) = companies.get(&company) else {
            continue;
        };
        let in_play = STOCK_PER_COMPANY.saturating_sub(record.stock_total);
        if in_play == 0 {
            continue;
        }
        let fraction = f64::from(holdings.get(&company).copied().unwrap_or(0)) / f64::from(in_play);
        if best.map(|(b, _)| fraction > b).unwrap_or(true) {
            best = Some((fraction, company));
        }
    }
    best.map(|(_, company)| company)
        .or_else(|| candidates.first().and_then(|n| n.parse().ok()))
}

/// Exchange two-for-one when the absorbed share is worth at least half a
/// survivor share, otherwise sell everything.
pub async fn choose_settle(
    store: &dyn RoomStore,
    room_id: &str,
    player_id: &str,
) -> Option<Vec<SettleDecision>> {
    let pad = store.scratchpad(room_id).await.ok()??;
    let main = pad.main_company?;
    let companies = store.companies(room_id).await.ok()?;
    let holdings = store.stocks(room_id, player_id).await.ok()?;
    let main_record = companies.get(&main)?;

    let mut decisions = Vec::new();
    let mut bank_left = main_record.stock_total;
    for company in pad.settles.keys() {
        let held = holdings.get(company).copied().unwrap_or(0);
        if held == 0 {
            continue;
        }
        let Some(record) = companies.get(company) else {
            continue;
        };
        let mut exchange = 0u32;
        if record.stock_price / 2 >= main_record.stock_price && main_record.stock_price > 0 {
            exchange = (held - held % 2).min(bank_left * 2);
            bank_left -= exchange / 2;
        }
        decisions.push(SettleDecision {
            company: *company,
            sell_amount: held - exchange,
            exchange_amount: exchange,
        });
    }
    Some(decisions)
}
