#![cfg(test)]

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::engine::{ActionError, GameKind, HandlerCtx, Phase};
use crate::store::{MemoryStore, RoomMeta, RoomStore};

use super::*;

const ROOM: &str = "room01";

fn t(label: &str) -> Tile {
    label.parse().unwrap()
}

fn ctx(player: &str, order: &[String]) -> HandlerCtx {
    HandlerCtx {
        room_id: ROOM.to_string(),
        player_id: player.to_string(),
        seat_order: order.to_vec(),
    }
}

async fn new_table(players: &[&str]) -> (MemoryStore, Vec<String>) {
    let store = MemoryStore::new();
    store
        .create_room(
            ROOM,
            RoomMeta {
                game: GameKind::Acquire,
                owner: players[0].to_string(),
                max_players: players.len(),
                started: true,
                phase: Phase::SetTile,
                game_start: None,
            },
        )
        .await
        .unwrap();
    init_room(&store, ROOM).await.unwrap();

    let order: Vec<String> = players.iter().map(|p| p.to_string()).collect();
    let mut rng = StdRng::seed_from_u64(42);
    for player in &order {
        init_player(&store, ROOM, player, &order, &mut rng).await.unwrap();
    }
    store.set_current_player(ROOM, players[0]).await.unwrap();
    (store, order)
}

/// Put a chain on the board and make its record agree.
async fn paint(store: &MemoryStore, company: Company, tiles: &[&str]) {
    let updates: Vec<(Tile, TileOwner)> = tiles
        .iter()
        .map(|label| (t(label), TileOwner::Chain(company)))
        .collect();
    store.set_tiles(ROOM, &updates).await.unwrap();
    let mut record = store.company(ROOM, company).await.unwrap();
    record.tiles = tiles.len() as u32;
    record.stock_price = stock_info(company.tier(), record.tiles).price;
    store.set_company(ROOM, record).await.unwrap();
}

async fn paint_neutral(store: &MemoryStore, tiles: &[&str]) {
    let updates: Vec<(Tile, TileOwner)> = tiles
        .iter()
        .map(|label| (t(label), TileOwner::Neutral))
        .collect();
    store.set_tiles(ROOM, &updates).await.unwrap();
}

/// Hand a player shares while keeping the bank consistent (P1).
async fn give_shares(store: &MemoryStore, player: &str, company: Company, count: u32) {
    let mut stocks = store.stocks(ROOM, player).await.unwrap();
    *stocks.entry(company).or_insert(0) += count;
    store.set_stocks(ROOM, player, &stocks).await.unwrap();
    let mut record = store.company(ROOM, company).await.unwrap();
    record.stock_total -= count;
    store.set_company(ROOM, record).await.unwrap();
}

async fn assert_stock_conservation(store: &MemoryStore, order: &[String]) {
    for company in Company::ALL {
        let record = store.company(ROOM, company).await.unwrap();
        let mut held = 0;
        for player in order {
            held += store
                .stocks(ROOM, player)
                .await
                .unwrap()
                .get(&company)
                .copied()
                .unwrap_or(0);
        }
        assert_eq!(
            record.stock_total + held,
            STOCK_PER_COMPANY,
            "conservation broken for {company}"
        );
    }
}

async fn phase_of(store: &MemoryStore) -> Phase {
    store.room_meta(ROOM).await.unwrap().phase
}

#[tokio::test]
async fn expansion_floods_through_neutral_tiles() {
    // Imperial holds 3B-3D, neutrals sit at 3A and 4B; placing 2B must
    // pull all six cells into the chain.
    let (store, order) = new_table(&["a", "b"]).await;
    paint(&store, Company::Imperial, &["3B", "3C", "3D"]).await;
    paint_neutral(&store, &["3A", "4B"]).await;
    store.set_hand(ROOM, "a", &[t("2B")]).await.unwrap();

    let mut rng = StdRng::seed_from_u64(1);
    handle_place_tile(&store, &ctx("a", &order), &mut rng, t("2B"))
        .await
        .unwrap();

    let board = store.board(ROOM).await.unwrap();
    for label in ["2B", "3A", "3B", "3C", "3D", "4B"] {
        assert_eq!(board[&t(label)], TileOwner::Chain(Company::Imperial), "{label}");
    }
    let record = store.company(ROOM, Company::Imperial).await.unwrap();
    assert_eq!(record.tiles, 6);
    assert_eq!(phase_of(&store).await, Phase::BuyStock);
}

#[tokio::test]
async fn founding_a_company_grants_the_founder_share() {
    let (store, order) = new_table(&["a", "b"]).await;
    paint_neutral(&store, &["5E"]).await;
    store.set_hand(ROOM, "a", &[t("5F")]).await.unwrap();

    let mut rng = StdRng::seed_from_u64(1);
    handle_place_tile(&store, &ctx("a", &order), &mut rng, t("5F"))
        .await
        .unwrap();
    assert_eq!(phase_of(&store).await, Phase::CreateCompany);

    handle_create_company(&store, &ctx("a", &order), Company::Imperial)
        .await
        .unwrap();
    let record = store.company(ROOM, Company::Imperial).await.unwrap();
    assert_eq!(record.tiles, 2);
    assert_eq!(record.stock_total, STOCK_PER_COMPANY - 1);
    let stocks = store.stocks(ROOM, "a").await.unwrap();
    assert_eq!(stocks[&Company::Imperial], 1);
    assert_eq!(phase_of(&store).await, Phase::BuyStock);
    assert_stock_conservation(&store, &order).await;
}

#[tokio::test]
async fn sole_holder_collects_the_first_bonus() {
    // Tower (7 tiles) absorbs Sackson (6 tiles, low tier, price 600).
    let (store, order) = new_table(&["a", "b"]).await;
    paint(&store, Company::Sackson, &["1A", "2A", "3A", "4A", "5A", "6A"]).await;
    paint(&store, Company::Tower, &["1C", "2C", "3C", "4C", "5C", "6C", "7C"]).await;
    give_shares(&store, "a", Company::Sackson, 3).await;
    store.set_hand(ROOM, "a", &[t("1B")]).await.unwrap();

    let mut rng = StdRng::seed_from_u64(1);
    handle_place_tile(&store, &ctx("a", &order), &mut rng, t("1B"))
        .await
        .unwrap();

    assert_eq!(store.cash(ROOM, "a").await.unwrap(), STARTING_CASH + 6000);
    assert_eq!(store.cash(ROOM, "b").await.unwrap(), STARTING_CASH);
    assert_eq!(phase_of(&store).await, Phase::MergingSettle);

    let pad = store.scratchpad(ROOM).await.unwrap().unwrap();
    assert_eq!(pad.main_company, Some(Company::Tower));
    assert_eq!(pad.settles[&Company::Sackson].holders, vec!["a".to_string()]);
}

#[tokio::test]
async fn settle_sell_exchange_and_keep() {
    let (store, order) = new_table(&["a", "b"]).await;
    paint(&store, Company::Sackson, &["1A", "2A", "3A", "4A", "5A", "6A"]).await;
    paint(&store, Company::Tower, &["1C", "2C", "3C", "4C", "5C", "6C", "7C"]).await;
    give_shares(&store, "a", Company::Sackson, 5).await;
    store.set_hand(ROOM, "a", &[t("1B")]).await.unwrap();

    let mut rng = StdRng::seed_from_u64(1);
    handle_place_tile(&store, &ctx("a", &order), &mut rng, t("1B"))
        .await
        .unwrap();
    let cash_after_bonus = store.cash(ROOM, "a").await.unwrap();

    // Sell two at 600, trade two for one Tower share, keep one.
    handle_merging_settle(
        &store,
        &ctx("a", &order),
        &[SettleDecision {
            company: Company::Sackson,
            sell_amount: 2,
            exchange_amount: 2,
        }],
    )
    .await
    .unwrap();

    assert_eq!(store.cash(ROOM, "a").await.unwrap(), cash_after_bonus + 1200);
    let stocks = store.stocks(ROOM, "a").await.unwrap();
    assert_eq!(stocks[&Company::Sackson], 1);
    assert_eq!(stocks[&Company::Tower], 1);
    assert_stock_conservation(&store, &order).await;

    // Last holder settled: the board flips and the scratchpad is gone.
    assert_eq!(store.scratchpad(ROOM).await.unwrap(), None);
    assert_eq!(phase_of(&store).await, Phase::BuyStock);
    let tower = store.company(ROOM, Company::Tower).await.unwrap();
    assert_eq!(tower.tiles, 14); // 7 + 6 absorbed + the trigger tile
    let sackson = store.company(ROOM, Company::Sackson).await.unwrap();
    assert_eq!(sackson.tiles, 0);
}

#[tokio::test]
async fn settle_rejects_odd_exchange_and_overdraw() {
    let (store, order) = new_table(&["a", "b"]).await;
    paint(&store, Company::Sackson, &["1A", "2A", "3A"]).await;
    paint(&store, Company::Tower, &["1C", "2C", "3C", "4C"]).await;
    give_shares(&store, "a", Company::Sackson, 3).await;
    store.set_hand(ROOM, "a", &[t("1B")]).await.unwrap();

    let mut rng = StdRng::seed_from_u64(1);
    handle_place_tile(&store, &ctx("a", &order), &mut rng, t("1B"))
        .await
        .unwrap();

    let odd = handle_merging_settle(
        &store,
        &ctx("a", &order),
        &[SettleDecision {
            company: Company::Sackson,
            sell_amount: 0,
            exchange_amount: 1,
        }],
    )
    .await;
    assert!(matches!(odd, Err(ActionError::Illegal(_))));

    let overdrawn = handle_merging_settle(
        &store,
        &ctx("a", &order),
        &[SettleDecision {
            company: Company::Sackson,
            sell_amount: 4,
            exchange_amount: 0,
        }],
    )
    .await;
    assert!(matches!(overdrawn, Err(ActionError::Illegal(_))));
    // The refused batches left nothing half-applied.
    assert_stock_conservation(&store, &order).await;
}

#[tokio::test]
async fn merger_between_safe_chains_is_skipped() {
    let (store, order) = new_table(&["a", "b"]).await;
    let imperial: Vec<String> = (1..=11).map(|c| format!("{c}A")).collect();
    let continental: Vec<String> = (1..=11).map(|c| format!("{c}C")).collect();
    paint(
        &store,
        Company::Imperial,
        &imperial.iter().map(String::as_str).collect::<Vec<_>>(),
    )
    .await;
    paint(
        &store,
        Company::Continental,
        &continental.iter().map(String::as_str).collect::<Vec<_>>(),
    )
    .await;
    store.set_hand(ROOM, "a", &[t("1B")]).await.unwrap();

    let mut rng = StdRng::seed_from_u64(1);
    handle_place_tile(&store, &ctx("a", &order), &mut rng, t("1B"))
        .await
        .unwrap();

    let board = store.board(ROOM).await.unwrap();
    assert_eq!(board[&t("1B")], TileOwner::Neutral);
    assert_eq!(store.scratchpad(ROOM).await.unwrap(), None);
    assert_eq!(phase_of(&store).await, Phase::BuyStock);
}

#[tokio::test]
async fn tied_chains_wait_for_a_selection() {
    // Tower and American tie at 3; Sackson (2) is the only absorbable one.
    let (store, order) = new_table(&["a", "b"]).await;
    paint(&store, Company::Tower, &["1A", "2A", "3A"]).await;
    paint(&store, Company::American, &["1C", "2C", "3C"]).await;
    paint(&store, Company::Sackson, &["3B", "4B"]).await;
    give_shares(&store, "a", Company::Sackson, 2).await;
    give_shares(&store, "b", Company::Tower, 1).await;
    store.set_hand(ROOM, "a", &[t("2B")]).await.unwrap();

    let mut rng = StdRng::seed_from_u64(1);
    handle_place_tile(&store, &ctx("a", &order), &mut rng, t("2B"))
        .await
        .unwrap();
    assert_eq!(phase_of(&store).await, Phase::MergingSelection);
    let pad = store.scratchpad(ROOM).await.unwrap().unwrap();
    assert_eq!(pad.main_candidates, vec![Company::Tower, Company::American]);
    assert_eq!(pad.other_companies, vec![Company::Sackson]);

    handle_merging_selection(&store, &ctx("a", &order), Company::American)
        .await
        .unwrap();
    let pad = store.scratchpad(ROOM).await.unwrap().unwrap();
    assert_eq!(pad.main_company, Some(Company::American));
    // The tied loser joins the absorption pool.
    assert!(pad.settles.contains_key(&Company::Tower));
    assert!(pad.settles.contains_key(&Company::Sackson));
    assert_eq!(phase_of(&store).await, Phase::MergingSettle);
}

#[test]
fn dividend_ranking_covers_the_tie_cases() {
    let holders = |counts: &[(&str, u32)]| -> Vec<(String, u32)> {
        counts.iter().map(|(p, c)| (p.to_string(), *c)).collect()
    };

    // Sole holder takes the first bonus alone.
    let out = compute_dividends(&holders(&[("a", 3)]), 6000, 3000);
    assert_eq!(out, vec![("a".to_string(), 6000)]);

    // Unique first and second.
    let out = compute_dividends(&holders(&[("a", 5), ("b", 2)]), 6000, 3000);
    assert_eq!(out, vec![("a".to_string(), 6000), ("b".to_string(), 3000)]);

    // Tie for first splits both bonuses, floor division.
    let out = compute_dividends(&holders(&[("a", 3), ("b", 3), ("c", 1)]), 5000, 2500);
    assert_eq!(
        out,
        vec![("a".to_string(), 3750), ("b".to_string(), 3750)]
    );

    // Unique first, tie for second splits the second bonus.
    let out = compute_dividends(&holders(&[("a", 5), ("b", 2), ("c", 2)]), 6000, 3000);
    assert_eq!(
        out,
        vec![
            ("a".to_string(), 6000),
            ("b".to_string(), 1500),
            ("c".to_string(), 1500)
        ]
    );
}

#[tokio::test]
async fn buying_stock_draws_a_tile_and_passes_the_turn() {
    let (store, order) = new_table(&["a", "b"]).await;
    paint(&store, Company::Tower, &["1A", "2A"]).await;
    let mut meta = store.room_meta(ROOM).await.unwrap();
    meta.phase = Phase::BuyStock;
    store.set_room_meta(ROOM, meta).await.unwrap();
    store.set_hand(ROOM, "a", &[t("9I")]).await.unwrap();

    let mut rng = StdRng::seed_from_u64(1);
    let order_map = BTreeMap::from([(Company::Tower, 3u32)]);
    handle_buy_stock(&store, &ctx("a", &order), &mut rng, &order_map)
        .await
        .unwrap();

    assert_eq!(store.cash(ROOM, "a").await.unwrap(), STARTING_CASH - 600);
    assert_eq!(store.stocks(ROOM, "a").await.unwrap()[&Company::Tower], 3);
    assert_eq!(store.hand(ROOM, "a").await.unwrap().len(), 2);
    assert_eq!(store.current_player(ROOM).await.unwrap().as_deref(), Some("b"));
    assert_eq!(phase_of(&store).await, Phase::SetTile);
    assert_stock_conservation(&store, &order).await;
}

#[tokio::test]
async fn buy_limits_are_enforced() {
    let (store, order) = new_table(&["a", "b"]).await;
    paint(&store, Company::Tower, &["1A", "2A"]).await;
    let mut meta = store.room_meta(ROOM).await.unwrap();
    meta.phase = Phase::BuyStock;
    store.set_room_meta(ROOM, meta).await.unwrap();

    let mut rng = StdRng::seed_from_u64(1);
    let too_many = BTreeMap::from([(Company::Tower, 4u32)]);
    assert!(matches!(
        handle_buy_stock(&store, &ctx("a", &order), &mut rng, &too_many).await,
        Err(ActionError::Illegal(_))
    ));

    let inactive = BTreeMap::from([(Company::Imperial, 1u32)]);
    assert!(matches!(
        handle_buy_stock(&store, &ctx("a", &order), &mut rng, &inactive).await,
        Err(ActionError::Illegal(_))
    ));

    store.set_cash(ROOM, "a", 100).await.unwrap();
    let unaffordable = BTreeMap::from([(Company::Tower, 1u32)]);
    assert!(matches!(
        handle_buy_stock(&store, &ctx("a", &order), &mut rng, &unaffordable).await,
        Err(ActionError::Illegal(_))
    ));

    // Out-of-turn actors are refused regardless of the order.
    let fine = BTreeMap::from([(Company::Tower, 1u32)]);
    assert!(matches!(
        handle_buy_stock(&store, &ctx("b", &order), &mut rng, &fine).await,
        Err(ActionError::OutOfTurn)
    ));
}

#[tokio::test]
async fn game_end_converts_shares_at_current_prices() {
    let (store, order) = new_table(&["a", "b"]).await;
    let tower: Vec<String> = (1..=11).map(|c| format!("{c}A")).collect();
    paint(
        &store,
        Company::Tower,
        &tower.iter().map(String::as_str).collect::<Vec<_>>(),
    )
    .await;
    give_shares(&store, "a", Company::Tower, 2).await;

    handle_game_end(&store, &ctx("a", &order)).await.unwrap();

    // Sole holder bonus (10 x 700) plus conversion (2 x 700).
    assert_eq!(
        store.cash(ROOM, "a").await.unwrap(),
        STARTING_CASH + 7000 + 1400
    );
    assert_eq!(store.stocks(ROOM, "a").await.unwrap()[&Company::Tower], 0);
    assert_eq!(
        store.company(ROOM, Company::Tower).await.unwrap().stock_total,
        STOCK_PER_COMPANY
    );
    assert_eq!(phase_of(&store).await, Phase::End);
}

#[tokio::test]
async fn game_end_is_refused_while_chains_are_vulnerable() {
    let (store, order) = new_table(&["a", "b"]).await;
    paint(&store, Company::Tower, &["1A", "2A"]).await;
    assert!(matches!(
        handle_game_end(&store, &ctx("a", &order)).await,
        Err(ActionError::Illegal(_))
    ));
}

#[tokio::test]
async fn restart_reseeds_the_table() {
    let (store, order) = new_table(&["a", "b"]).await;
    paint(&store, Company::Tower, &["1A", "2A"]).await;
    give_shares(&store, "a", Company::Tower, 2).await;
    store.set_cash(ROOM, "a", 123).await.unwrap();
    let mut meta = store.room_meta(ROOM).await.unwrap();
    meta.phase = Phase::End;
    store.set_room_meta(ROOM, meta).await.unwrap();

    let mut rng = StdRng::seed_from_u64(9);
    handle_restart(&store, &ctx("a", &order), &mut rng).await.unwrap();

    assert_eq!(store.cash(ROOM, "a").await.unwrap(), STARTING_CASH);
    assert_eq!(store.hand(ROOM, "a").await.unwrap().len(), STARTING_HAND);
    assert_eq!(store.stocks(ROOM, "a").await.unwrap()[&Company::Tower], 0);
    let board = store.board(ROOM).await.unwrap();
    assert!(board.values().all(|owner| *owner == TileOwner::Unplaced));
    assert_eq!(phase_of(&store).await, Phase::SetTile);
    assert_stock_conservation(&store, &order).await;
}

#[tokio::test]
async fn reconciliation_is_a_pure_function_of_the_board() {
    // Painting a chain and then restoring the previous board restores the
    // company record: ownership lives on the board alone.
    let (store, order) = new_table(&["a", "b"]).await;
    let before = store.board(ROOM).await.unwrap();

    paint(&store, Company::Festival, &["7F", "8F", "9F"]).await;
    reconcile_companies(&store, ROOM, &order).await.unwrap();
    assert_eq!(store.company(ROOM, Company::Festival).await.unwrap().tiles, 3);

    let restore: Vec<(Tile, TileOwner)> = before.into_iter().collect();
    store.set_tiles(ROOM, &restore).await.unwrap();
    reconcile_companies(&store, ROOM, &order).await.unwrap();
    let record = store.company(ROOM, Company::Festival).await.unwrap();
    assert_eq!(record.tiles, 0);
    assert_eq!(record.stock_price, 0);
}

#[tokio::test]
async fn hands_and_board_account_for_every_tile() {
    let (store, order) = new_table(&["a", "b", "c"]).await;
    let board = store.board(ROOM).await.unwrap();
    let unplaced = board
        .values()
        .filter(|owner| **owner == TileOwner::Unplaced)
        .count();
    let mut in_hands = 0;
    for player in &order {
        let hand = store.hand(ROOM, player).await.unwrap();
        assert!(hand.len() <= MAX_HAND);
        in_hands += hand.len();
    }
    // Freshly dealt: nothing placed yet, hands are disjoint draws.
    assert_eq!(in_hands, 3 * STARTING_HAND);
    assert_eq!(unplaced, BOARD_TILES);
}
