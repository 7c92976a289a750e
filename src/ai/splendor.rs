use std::collections::BTreeMap;

use crate::engine::splendor::{
    total_gems, CardState, DevCard, GemColor, MAX_HELD_GEMS, MAX_RESERVED,
};
use crate::room::ClientMessage;
use crate::store::RoomStore;

/// Any-legal-action bot: buy the cheapest affordable card, otherwise draw
/// gems, otherwise reserve. Good enough to keep a table moving.
pub async fn choose_action(
    store: &dyn RoomStore,
    room_id: &str,
    player_id: &str,
) -> Option<ClientMessage> {
    let gems = store.player_gems(room_id, player_id).await.ok()?;
    let owned = store.player_cards(room_id, player_id).await.ok()?;
    let reserved = store.reserved_cards(room_id, player_id).await.ok()?;
    let pool = store.gem_pool(room_id).await.ok()?;
    let all_cards = store.all_cards(room_id).await.ok()?;

    let mut discounts: BTreeMap<GemColor, u32> = BTreeMap::new();
    for card in &owned {
        *discounts.entry(card.bonus).or_insert(0) += 1;
    }
    let affordable = |card: &DevCard| {
        let mut gold_needed = 0u32;
        for color in GemColor::STANDARD {
            let cost = card.cost.get(&color).copied().unwrap_or(0);
            let need = cost.saturating_sub(discounts.get(&color).copied().unwrap_or(0));
            gold_needed += need.saturating_sub(gems.get(&color).copied().unwrap_or(0));
        }
        gold_needed <= gems.get(&GemColor::Gold).copied().unwrap_or(0)
    };

    // Reserved cards first (they already cost a reserve slot), then the
    // cheapest revealed card by total printed cost.
    if let Some(card) = reserved.iter().find(|c| affordable(c)) {
        return Some(ClientMessage::BuyCard { payload: card.id });
    }
    let mut revealed: Vec<&DevCard> = all_cards
        .iter()
        .filter(|c| c.state == CardState::Revealed)
        .collect();
    revealed.sort_by_key(|c| (c.cost.values().sum::<u32>(), c.id));
    if let Some(card) = revealed.iter().find(|c| affordable(c)).copied() {
        return Some(ClientMessage::BuyCard { payload: card.id });
    }

    let held = total_gems(&gems);
    if held + 3 <= MAX_HELD_GEMS {
        let distinct: Vec<GemColor> = GemColor::STANDARD
            .into_iter()
            .filter(|c| pool.get(c).copied().unwrap_or(0) > 0)
            .take(3)
            .collect();
        if distinct.len() == 3 {
            let payload = distinct.into_iter().map(|c| (c, 1)).collect();
            return Some(ClientMessage::GetGem { payload });
        }
    }
    if held + 2 <= MAX_HELD_GEMS {
        if let Some(color) = GemColor::STANDARD
            .into_iter()
            .find(|c| pool.get(c).copied().unwrap_or(0) >= 4)
        {
            return Some(ClientMessage::GetGem {
                payload: BTreeMap::from([(color, 2)]),
            });
        }
    }

    if reserved.len() < MAX_RESERVED
        && pool.get(&GemColor::Gold).copied().unwrap_or(0) > 0
        && held + 1 <= MAX_HELD_GEMS
    {
        if let Some(card) = revealed.first() {
            return Some(ClientMessage::PreserveCard { payload: card.id });
        }
    }
    None
}
