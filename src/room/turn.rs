use rand::rngs::StdRng;
use rand::Rng;

/// Round-robin successor in join order, wrapping. Disconnected seats are
/// not skipped: a stalled turn resumes when its owner reconnects (or the
/// AI driver acts for a virtual seat).
pub fn next_seat(order: &[String], current: &str) -> Option<String> {
    if order.is_empty() {
        return None;
    }
    let idx = order.iter().position(|p| p == current)?;
    Some(order[(idx + 1) % order.len()].clone())
}

/// Uniformly random starting seat, picked once when the last `ready`
/// arrives.
pub fn choose_starter(order: &[String], rng: &mut StdRng) -> Option<String> {
    if order.is_empty() {
        return None;
    }
    Some(order[rng.gen_range(0..order.len())].clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn order() -> Vec<String> {
        vec!["a".into(), "b".into(), "c".into()]
    }

    #[test]
    fn round_robin_wraps() {
        let order = order();
        assert_eq!(next_seat(&order, "a").as_deref(), Some("b"));
        assert_eq!(next_seat(&order, "c").as_deref(), Some("a"));
        assert_eq!(next_seat(&order, "ghost"), None);
        assert_eq!(next_seat(&[], "a"), None);
    }

    #[test]
    fn starter_is_drawn_from_the_roster() {
        let order = order();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let starter = choose_starter(&order, &mut rng).unwrap();
            assert!(order.contains(&starter));
        }
    }
}
