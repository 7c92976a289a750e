use super::types::{CardState, DevCard, GemColor, NobleCard};

// Cost templates per level, expressed relative to the card's bonus color.
// Each row is (points, [cost on bonus+1, bonus+2, bonus+3, bonus+4, bonus]):
// rotating the same shapes through all five colors yields a full deck with
// the standard 40/30/20 level split.
const LEVEL1_SHAPES: [(u32, [u32; 5]); 8] = [
    (0, [1, 1, 1, 1, 0]),
    (0, [2, 1, 1, 1, 0]),
    (0, [2, 2, 0, 1, 0]),
    (0, [3, 1, 1, 0, 0]),
    (0, [2, 1, 0, 0, 0]),
    (0, [2, 0, 2, 0, 0]),
    (0, [3, 0, 0, 0, 0]),
    (1, [4, 0, 0, 0, 0]),
];

const LEVEL2_SHAPES: [(u32, [u32; 5]); 6] = [
    (1, [3, 2, 2, 0, 0]),
    (1, [3, 0, 3, 0, 2]),
    (2, [4, 2, 0, 0, 1]),
    (2, [5, 3, 0, 0, 0]),
    (2, [5, 0, 0, 0, 0]),
    (3, [6, 0, 0, 0, 0]),
];

const LEVEL3_SHAPES: [(u32, [u32; 5]); 4] = [
    (3, [3, 3, 5, 3, 0]),
    (4, [7, 0, 0, 0, 0]),
    (4, [6, 3, 0, 0, 3]),
    (5, [7, 3, 0, 0, 0]),
];

fn cards_for_level(level: u8, shapes: &[(u32, [u32; 5])], next_id: &mut u32) -> Vec<DevCard> {
    let mut cards = Vec::new();
    for (bonus_idx, bonus) in GemColor::STANDARD.into_iter().enumerate() {
        for (points, shape) in shapes {
            let mut cost = super::types::GemCount::new();
            for (offset, amount) in shape.iter().enumerate() {
                if *amount == 0 {
                    continue;
                }
                // offset 4 targets the bonus color itself, 0..=3 rotate away
                // from it so no two colors share an identical deck.
                let color = GemColor::STANDARD[(bonus_idx + offset + 1) % 5];
                *cost.entry(color).or_insert(0) += amount;
            }
            cards.push(DevCard {
                id: *next_id,
                level,
                bonus,
                points: *points,
                cost,
                state: CardState::Hidden,
            });
            *next_id += 1;
        }
    }
    cards
}

/// The full 90-card development deck (40 level-1, 30 level-2, 20 level-3),
/// all hidden.
pub fn base_deck() -> Vec<DevCard> {
    let mut next_id = 1;
    let mut deck = cards_for_level(1, &LEVEL1_SHAPES, &mut next_id);
    deck.extend(cards_for_level(2, &LEVEL2_SHAPES, &mut next_id));
    deck.extend(cards_for_level(3, &LEVEL3_SHAPES, &mut next_id));
    deck
}

const NOBLE_SHAPES: [[(GemColor, u32); 3]; 10] = [
    [(GemColor::White, 4), (GemColor::Blue, 4), (GemColor::Gold, 0)],
    [(GemColor::Blue, 4), (GemColor::Green, 4), (GemColor::Gold, 0)],
    [(GemColor::Green, 4), (GemColor::Red, 4), (GemColor::Gold, 0)],
    [(GemColor::Red, 4), (GemColor::Black, 4), (GemColor::Gold, 0)],
    [(GemColor::Black, 4), (GemColor::White, 4), (GemColor::Gold, 0)],
    [(GemColor::White, 3), (GemColor::Blue, 3), (GemColor::Green, 3)],
    [(GemColor::Blue, 3), (GemColor::Green, 3), (GemColor::Red, 3)],
    [(GemColor::Green, 3), (GemColor::Red, 3), (GemColor::Black, 3)],
    [(GemColor::Red, 3), (GemColor::Black, 3), (GemColor::White, 3)],
    [(GemColor::Black, 3), (GemColor::White, 3), (GemColor::Blue, 3)],
];

/// The ten noble tiles, each worth three points, all hidden.
pub fn noble_tiles() -> Vec<NobleCard> {
    NOBLE_SHAPES
        .iter()
        .enumerate()
        .map(|(idx, shape)| {
            let cost = shape
                .iter()
                .filter(|(_, amount)| *amount > 0)
                .map(|(color, amount)| (*color, *amount))
                .collect();
            NobleCard {
                id: format!("N{}", idx + 1),
                cost,
                points: 3,
                state: CardState::Hidden,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deck_has_standard_level_split() {
        let deck = base_deck();
        assert_eq!(deck.len(), 90);
        assert_eq!(deck.iter().filter(|c| c.level == 1).count(), 40);
        assert_eq!(deck.iter().filter(|c| c.level == 2).count(), 30);
        assert_eq!(deck.iter().filter(|c| c.level == 3).count(), 20);
        // ids are unique
        let mut ids: Vec<u32> = deck.iter().map(|c| c.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 90);
    }

    #[test]
    fn no_card_costs_its_own_bonus_at_level_one() {
        // The rotation keeps the cheap cards payable without their own color.
        let deck = base_deck();
        for card in deck.iter().filter(|c| c.level == 1 && c.points == 0) {
            assert_eq!(card.cost.get(&card.bonus), None, "card {}", card.id);
        }
    }

    #[test]
    fn ten_nobles_worth_three_points() {
        let nobles = noble_tiles();
        assert_eq!(nobles.len(), 10);
        assert!(nobles.iter().all(|n| n.points == 3));
        assert!(nobles.iter().all(|n| !n.cost.contains_key(&GemColor::Gold)));
    }
}
