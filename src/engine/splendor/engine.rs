use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::{debug, info};

use crate::engine::{ActionError, HandlerCtx, Phase};
use crate::room::turn;
use crate::store::RoomStore;

use super::cards::{base_deck, noble_tiles};
use super::types::*;

const LOG_TARGET: &str = "boardroom::engine::splendor";

/// Seed a freshly created (or restarted) room: shuffled decks with four
/// cards per level face up, `max_players + 1` nobles revealed, full gem
/// bank.
pub async fn init_room(
    store: &dyn RoomStore,
    room_id: &str,
    max_players: usize,
    rng: &mut StdRng,
) -> Result<(), ActionError> {
    let mut deck = Vec::new();
    for level in 1..=3u8 {
        let mut cards: Vec<DevCard> = base_deck().into_iter().filter(|c| c.level == level).collect();
        cards.shuffle(rng);
        for (idx, card) in cards.iter_mut().enumerate() {
            card.state = if idx < REVEALED_PER_LEVEL {
                CardState::Revealed
            } else {
                CardState::Hidden
            };
        }
        deck.extend(cards);
    }
    store.set_all_cards(room_id, &deck).await?;

    let mut nobles = noble_tiles();
    nobles.shuffle(rng);
    for (idx, noble) in nobles.iter_mut().enumerate() {
        noble.state = if idx < max_players + 1 {
            CardState::Revealed
        } else {
            CardState::Hidden
        };
    }
    store.set_all_nobles(room_id, &nobles).await?;

    store.set_gem_pool(room_id, &initial_pool()).await?;
    Ok(())
}

/// First-join seat setup: empty tableau, no gems, zero score.
pub async fn init_player(
    store: &dyn RoomStore,
    room_id: &str,
    player_id: &str,
) -> Result<(), ActionError> {
    store.set_player_gems(room_id, player_id, &zero_gems()).await?;
    store.set_player_cards(room_id, player_id, &[]).await?;
    store.set_reserved_cards(room_id, player_id, &[]).await?;
    store.set_player_nobles(room_id, player_id, &[]).await?;
    store.set_score(room_id, player_id, 0).await?;
    Ok(())
}

async fn require_acting_phase(store: &dyn RoomStore, room_id: &str) -> Result<(), ActionError> {
    let meta = store.room_meta(room_id).await?;
    match meta.phase {
        Phase::Playing | Phase::LastTurn => Ok(()),
        other => Err(ActionError::WrongPhase(other)),
    }
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

async fn advance_turn(store: &dyn RoomStore, ctx: &HandlerCtx) -> Result<(), ActionError> {
    if let Some(next) = turn::next_seat(&ctx.seat_order, &ctx.player_id) {
        store.set_current_player(&ctx.room_id, &next).await?;
    }
    Ok(())
}

async fn record_last_action(
    store: &dyn RoomStore,
    ctx: &HandlerCtx,
    action: &str,
    payload: serde_json::Value,
) -> Result<(), ActionError> {
    store
        .set_last_action(
            &ctx.room_id,
            &LastAction {
                action: action.to_string(),
                player_id: ctx.player_id.clone(),
                payload,
            },
        )
        .await?;
    Ok(())
}

/// `get_gem`: three distinct colors, or two of one color while that color
/// still has at least four in the bank. Gold is never taken directly and
/// the ten-gem hand limit is enforced by rejection.
pub async fn handle_get_gem(
    store: &dyn RoomStore,
    ctx: &HandlerCtx,
    take: &GemCount,
) -> Result<(), ActionError> {
    require_acting_phase(store, &ctx.room_id).await?;
    require_turn(store, &ctx.room_id, &ctx.player_id).await?;

    if take.get(&GemColor::Gold).copied().unwrap_or(0) > 0 {
        return Err(ActionError::Illegal("gold cannot be taken directly"));
    }
    let taken: Vec<(GemColor, u32)> = take
        .iter()
        .filter(|(_, n)| **n > 0)
        .map(|(c, n)| (*c, *n))
        .collect();
    let total: u32 = taken.iter().map(|(_, n)| n).sum();

    let pool = store.gem_pool(&ctx.room_id).await?;
    let three_distinct = total == 3 && taken.len() == 3 && taken.iter().all(|(_, n)| *n == 1);
    let two_same = total == 2
        && taken.len() == 1
        && pool.get(&taken[0].0).copied().unwrap_or(0) >= 4;
    if !three_distinct && !two_same {
        return Err(ActionError::Illegal("take three distinct gems or two of a plentiful color"));
    }
    for (color, n) in &taken {
        if pool.get(color).copied().unwrap_or(0) < *n {
            return Err(ActionError::Illegal("bank does not hold enough gems"));
        }
    }

    let mut gems = store.player_gems(&ctx.room_id, &ctx.player_id).await?;
    if total_gems(&gems) + total > MAX_HELD_GEMS {
        return Err(ActionError::Illegal("cannot hold more than ten gems"));
    }

    let mut pool = pool;
    for (color, n) in &taken {
        *pool.entry(*color).or_insert(0) -= n;
        *gems.entry(*color).or_insert(0) += n;
    }
    store.set_gem_pool(&ctx.room_id, &pool).await?;
    store.set_player_gems(&ctx.room_id, &ctx.player_id, &gems).await?;
    record_last_action(store, ctx, "get_gem", serde_json::to_value(take).unwrap_or_default())
        .await?;
    info!(target: LOG_TARGET, room = %ctx.room_id, player = %ctx.player_id, total, "gems taken");

    advance_turn(store, ctx).await
}

fn bonus_counts(cards: &[DevCard]) -> BTreeMap<GemColor, u32> {
    let mut counts = BTreeMap::new();
    for card in cards {
        *counts.entry(card.bonus).or_insert(0) += 1;
    }
    counts
}

/// `buy_card`: pay a revealed or self-reserved card, discounts first, gems
/// next, gold for any shortfall.
pub async fn handle_buy_card(
    store: &dyn RoomStore,
    ctx: &HandlerCtx,
    card_id: u32,
) -> Result<(), ActionError> {
    require_acting_phase(store, &ctx.room_id).await?;
    require_turn(store, &ctx.room_id, &ctx.player_id).await?;

    let mut reserved = store.reserved_cards(&ctx.room_id, &ctx.player_id).await?;
    let from_reserve = reserved.iter().position(|c| c.id == card_id);
    let card = match from_reserve {
        Some(idx) => reserved[idx].clone(),
        None => {
            let card = store.card(&ctx.room_id, card_id).await?;
            if card.state != CardState::Revealed {
                return Err(ActionError::Illegal("card is not available for purchase"));
            }
            card
        }
    };

    let mut owned = store.player_cards(&ctx.room_id, &ctx.player_id).await?;
    let discounts = bonus_counts(&owned);
    let mut gems = store.player_gems(&ctx.room_id, &ctx.player_id).await?;

    let mut paid: GemCount = GemCount::new();
    let mut gold_needed: u32 = 0;
    for color in GemColor::STANDARD {
        let cost = card.cost.get(&color).copied().unwrap_or(0);
        let need = cost.saturating_sub(discounts.get(&color).copied().unwrap_or(0));
        let pay = need.min(gems.get(&color).copied().unwrap_or(0));
        if pay > 0 {
            paid.insert(color, pay);
        }
        gold_needed += need - pay;
    }
    if gold_needed > gems.get(&GemColor::Gold).copied().unwrap_or(0) {
        return Err(ActionError::Illegal("not enough gems to pay for the card"));
    }
    if gold_needed > 0 {
        paid.insert(GemColor::Gold, gold_needed);
    }

    let mut pool = store.gem_pool(&ctx.room_id).await?;
    for (color, n) in &paid {
        *gems.entry(*color).or_insert(0) -= n;
        *pool.entry(*color).or_insert(0) += n;
    }
    store.set_player_gems(&ctx.room_id, &ctx.player_id, &gems).await?;
    store.set_gem_pool(&ctx.room_id, &pool).await?;

    let mut bought = card.clone();
    bought.state = CardState::Bought;
    owned.push(bought.clone());
    store.set_player_cards(&ctx.room_id, &ctx.player_id, &owned).await?;

    if let Some(idx) = from_reserve {
        reserved.remove(idx);
        store
            .set_reserved_cards(&ctx.room_id, &ctx.player_id, &reserved)
            .await?;
    } else {
        store.set_card(&ctx.room_id, &bought).await?;
        reveal_replacement(store, &ctx.room_id, card.level).await?;
    }

    record_last_action(store, ctx, "buy_card", serde_json::to_value(&card).unwrap_or_default())
        .await?;
    award_nobles(store, ctx, &owned).await?;
    info!(
        target: LOG_TARGET,
        room = %ctx.room_id, player = %ctx.player_id, card = card_id, "card bought"
    );

    advance_turn(store, ctx).await
}

/// `preserve_card`: reserve a revealed card (limit three) and take one
/// gold from the bank.
pub async fn handle_preserve_card(
    store: &dyn RoomStore,
    ctx: &HandlerCtx,
    card_id: u32,
) -> Result<(), ActionError> {
    require_acting_phase(store, &ctx.room_id).await?;
    require_turn(store, &ctx.room_id, &ctx.player_id).await?;

    let card = store.card(&ctx.room_id, card_id).await?;
    if card.state != CardState::Revealed {
        return Err(ActionError::Illegal("only revealed cards can be reserved"));
    }
    let mut reserved = store.reserved_cards(&ctx.room_id, &ctx.player_id).await?;
    if reserved.len() >= MAX_RESERVED {
        return Err(ActionError::Illegal("reserve limit reached"));
    }
    let mut pool = store.gem_pool(&ctx.room_id).await?;
    if pool.get(&GemColor::Gold).copied().unwrap_or(0) == 0 {
        return Err(ActionError::Illegal("no gold left in the bank"));
    }
    let mut gems = store.player_gems(&ctx.room_id, &ctx.player_id).await?;
    if total_gems(&gems) + 1 > MAX_HELD_GEMS {
        return Err(ActionError::Illegal("cannot hold more than ten gems"));
    }

    *pool.entry(GemColor::Gold).or_insert(0) -= 1;
    *gems.entry(GemColor::Gold).or_insert(0) += 1;
    store.set_gem_pool(&ctx.room_id, &pool).await?;
    store.set_player_gems(&ctx.room_id, &ctx.player_id, &gems).await?;

    let mut taken = card.clone();
    taken.state = CardState::Bought;
    store.set_card(&ctx.room_id, &taken).await?;
    reserved.push(taken);
    store
        .set_reserved_cards(&ctx.room_id, &ctx.player_id, &reserved)
        .await?;
    reveal_replacement(store, &ctx.room_id, card.level).await?;

    record_last_action(
        store,
        ctx,
        "preserve_card",
        serde_json::to_value(&card).unwrap_or_default(),
    )
    .await?;
    info!(
        target: LOG_TARGET,
        room = %ctx.room_id, player = %ctx.player_id, card = card_id, "card reserved"
    );

    advance_turn(store, ctx).await
}

/// Flip the next hidden card of `level`, if the deck still has one. Deck
/// order is the shuffled order fixed at init.
async fn reveal_replacement(
    store: &dyn RoomStore,
    room_id: &str,
    level: u8,
) -> Result<(), ActionError> {
    let cards = store.all_cards(room_id).await?;
    if let Some(next) = cards
        .iter()
        .find(|c| c.level == level && c.state == CardState::Hidden)
    {
        let mut revealed = next.clone();
        revealed.state = CardState::Revealed;
        store.set_card(room_id, &revealed).await?;
        debug!(target: LOG_TARGET, room = room_id, card = revealed.id, level, "card revealed");
    }
    Ok(())
}

/// Award every revealed noble whose requirement the buyer now meets, in
/// table order. Visiting more than one noble on the same turn is allowed.
async fn award_nobles(
    store: &dyn RoomStore,
    ctx: &HandlerCtx,
    owned: &[DevCard],
) -> Result<(), ActionError> {
    let counts = bonus_counts(owned);
    let nobles = store.all_nobles(&ctx.room_id).await?;
    let mut player_nobles = store.player_nobles(&ctx.room_id, &ctx.player_id).await?;
    let mut awarded = false;
    for noble in nobles.iter().filter(|n| n.state == CardState::Revealed) {
        let satisfied = noble
            .cost
            .iter()
            .all(|(color, need)| counts.get(color).copied().unwrap_or(0) >= *need);
        if !satisfied {
            continue;
        }
        let mut taken = noble.clone();
        taken.state = CardState::Bought;
        store.set_noble(&ctx.room_id, &taken).await?;
        player_nobles.push(taken);
        awarded = true;
        info!(
            target: LOG_TARGET,
            room = %ctx.room_id, player = %ctx.player_id, noble = %noble.id, "noble awarded"
        );
    }
    if awarded {
        store
            .set_player_nobles(&ctx.room_id, &ctx.player_id, &player_nobles)
            .await?;
    }
    Ok(())
}

/// Pre-broadcast pass: refresh every seat's score, then evaluate the
/// last-turn / end transitions against the next actor.
pub async fn refresh_scores_and_phase(
    store: &dyn RoomStore,
    room_id: &str,
    seat_order: &[String],
) -> Result<(), ActionError> {
    let mut best = 0u32;
    for seat in seat_order {
        if !store.player_exists(room_id, seat).await? {
            continue;
        }
        let cards = store.player_cards(room_id, seat).await?;
        let nobles = store.player_nobles(room_id, seat).await?;
        let score: u32 = cards.iter().map(|c| c.points).sum::<u32>()
            + nobles.iter().map(|n| n.points).sum::<u32>();
        store.set_score(room_id, seat, score).await?;
        best = best.max(score);
    }

    let mut meta = store.room_meta(room_id).await?;
    let current = store.current_player(room_id).await?;
    let first = store.first_player(room_id).await?;
    let wrapped = current.is_some() && current == first;

    if best >= WIN_SCORE && meta.phase == Phase::Playing {
        meta.phase = if wrapped { Phase::End } else { Phase::LastTurn };
        store.set_room_meta(room_id, meta.clone()).await?;
        info!(target: LOG_TARGET, room = room_id, phase = %meta.phase, "win threshold reached");
    } else if meta.phase == Phase::LastTurn && wrapped {
        meta.phase = Phase::End;
        store.set_room_meta(room_id, meta).await?;
        info!(target: LOG_TARGET, room = room_id, "final round complete");
    }
    Ok(())
}

/// `game_end`: the actor declares the game over.
pub async fn handle_game_end(store: &dyn RoomStore, ctx: &HandlerCtx) -> Result<(), ActionError> {
    let mut meta = store.room_meta(&ctx.room_id).await?;
    meta.phase = Phase::End;
    store.set_room_meta(&ctx.room_id, meta).await?;
    info!(target: LOG_TARGET, room = %ctx.room_id, player = %ctx.player_id, "game ended");
    Ok(())
}

/// `restart_game`: fresh decks and seats, same roster, same turn pointer.
pub async fn handle_restart(
    store: &dyn RoomStore,
    ctx: &HandlerCtx,
    rng: &mut StdRng,
) -> Result<(), ActionError> {
    let meta = store.room_meta(&ctx.room_id).await?;
    if meta.phase != Phase::End {
        return Err(ActionError::WrongPhase(meta.phase));
    }

    init_room(store, &ctx.room_id, meta.max_players, rng).await?;
    for seat in &ctx.seat_order {
        init_player(store, &ctx.room_id, seat).await?;
    }
    let mut meta = meta;
    meta.phase = Phase::Playing;
    store.set_room_meta(&ctx.room_id, meta).await?;
    info!(target: LOG_TARGET, room = %ctx.room_id, "game restarted");
    Ok(())
}
