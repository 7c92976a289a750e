use super::types::{Money, Tier};

/// Share price and merger bonuses at a given chain size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StockInfo {
    pub price: Money,
    pub bonus_first: Money,
    pub bonus_second: Money,
}

/// Step table shared by all tiers; the tier shifts the base price.
/// Chains below two tiles are not active and are worth nothing.
pub fn stock_info(tier: Tier, tiles: u32) -> StockInfo {
    let base: Money = match tiles {
        0 | 1 => {
            return StockInfo {
                price: 0,
                bonus_first: 0,
                bonus_second: 0,
            }
        }
        2 => 200,
        3 => 300,
        4 => 400,
        5 => 500,
        6..=10 => 600,
        11..=20 => 700,
        21..=30 => 800,
        31..=40 => 900,
        _ => 1000,
    };
    let price = base
        + match tier {
            Tier::Low => 0,
            Tier::Medium => 100,
            Tier::Premium => 200,
        };
    StockInfo {
        price,
        bonus_first: price * 10,
        bonus_second: price * 5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_offsets_match_the_published_table() {
        assert_eq!(stock_info(Tier::Low, 2).price, 200);
        assert_eq!(stock_info(Tier::Medium, 2).price, 300);
        assert_eq!(stock_info(Tier::Premium, 2).price, 400);
        assert_eq!(stock_info(Tier::Low, 6).price, 600);
        assert_eq!(stock_info(Tier::Low, 10).price, 600);
        assert_eq!(stock_info(Tier::Medium, 11).price, 800);
        assert_eq!(stock_info(Tier::Premium, 41).price, 1200);
        assert_eq!(stock_info(Tier::Premium, 120).price, 1200);
    }

    #[test]
    fn bonuses_scale_with_price() {
        let info = stock_info(Tier::Low, 6);
        assert_eq!(info.bonus_first, 6000);
        assert_eq!(info.bonus_second, 3000);
        let dead = stock_info(Tier::Premium, 1);
        assert_eq!(dead.price, 0);
        assert_eq!(dead.bonus_first, 0);
    }
}
