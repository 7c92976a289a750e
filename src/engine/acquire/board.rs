use std::collections::{BTreeSet, HashSet};

use super::types::{Board, Company, Tile, TileOwner};

/// What the placed tile touches: the distinct active chains around it and
/// the number of neutral neighbors.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Adjacency {
    pub companies: BTreeSet<Company>,
    pub neutral: usize,
}

pub fn classify_neighbors(board: &Board, tile: Tile) -> Adjacency {
    let mut adj = Adjacency::default();
    for n in tile.neighbors() {
        match board.get(&n).copied().unwrap_or_default() {
            TileOwner::Unplaced => {}
            TileOwner::Neutral => adj.neutral += 1,
            TileOwner::Chain(c) => {
                adj.companies.insert(c);
            }
        }
    }
    adj
}

/// Flood-fill from `start` across neutral tiles and tiles already owned by
/// `company`. Returns every reached position, `start` included. This is the
/// region that becomes (or extends) the chain.
pub fn chain_region(board: &Board, start: Tile, company: Company) -> Vec<Tile> {
    let absorbable = |owner: TileOwner| match owner {
        TileOwner::Neutral => true,
        TileOwner::Chain(c) => c == company,
        TileOwner::Unplaced => false,
    };
    let mut visited: HashSet<Tile> = HashSet::new();
    let mut queue = vec![start];
    let mut region = Vec::new();
    while let Some(tile) = queue.pop() {
        if !visited.insert(tile) {
            continue;
        }
        region.push(tile);
        for n in tile.neighbors() {
            if visited.contains(&n) {
                continue;
            }
            let owner = board.get(&n).copied().unwrap_or_default();
            if absorbable(owner) {
                queue.push(n);
            }
        }
    }
    region
}

/// The maximal neutral-connected region containing `start` (used when the
/// merger survivor claims the tile that triggered it).
pub fn neutral_region(board: &Board, start: Tile) -> Vec<Tile> {
    let mut visited: HashSet<Tile> = HashSet::new();
    let mut queue = vec![start];
    let mut region = Vec::new();
    while let Some(tile) = queue.pop() {
        if !visited.insert(tile) {
            continue;
        }
        region.push(tile);
        for n in tile.neighbors() {
            if !visited.contains(&n)
                && board.get(&n).copied().unwrap_or_default() == TileOwner::Neutral
            {
                queue.push(n);
            }
        }
    }
    region
}

pub fn count_company_tiles(board: &Board, company: Company) -> u32 {
    board
        .values()
        .filter(|owner| **owner == TileOwner::Chain(company))
        .count() as u32
}

/// Positions still in the draw pool: unplaced on the board and in nobody's
/// hand.
pub fn undealt_tiles(board: &Board, hands: &[Vec<Tile>]) -> Vec<Tile> {
    let held: HashSet<Tile> = hands.iter().flatten().copied().collect();
    board
        .iter()
        .filter(|(tile, owner)| **owner == TileOwner::Unplaced && !held.contains(tile))
        .map(|(tile, _)| *tile)
        .collect()
}

/// A fresh 108-cell board with every position unplaced.
pub fn empty_board() -> Board {
    Tile::all().map(|t| (t, TileOwner::Unplaced)).collect()
}
