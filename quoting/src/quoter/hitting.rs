//! Hitting-logic price safeguards.
//!
//! Applied to every target price before any gateway action, using the
//! shared [`BestBook`] view of the instrument.

use crate::book::BestBook;
use crate::config::HittingLogic;
use arara_markets::{Price, Side};

/// Adjust a target price according to the configured hitting logic.
pub fn apply_hitting_logic(
    logic: HittingLogic,
    side: Side,
    price: Price,
    best: BestBook,
    tick: Price,
) -> Price {
    match logic {
        HittingLogic::AllowAll => price,
        HittingLogic::OurBest => clamp_to_our_best(side, price, best),
        HittingLogic::Pennying => penny(side, price, best, tick),
    }
}

/// Never quote through our side's best level.
fn clamp_to_our_best(side: Side, price: Price, best: BestBook) -> Price {
    match side {
        Side::Buy => match best.bid {
            Some(bid) if price > bid => bid,
            _ => price,
        },
        Side::Sell => match best.ask {
            Some(ask) if price < ask => ask,
            _ => price,
        },
    }
}

/// Place one tick inside the opposite best when the target would cross.
/// A one-tick spread leaves no room to penny and falls back to
/// [`clamp_to_our_best`].
fn penny(side: Side, price: Price, best: BestBook, tick: Price) -> Price {
    let (Some(bid), Some(ask)) = (best.bid, best.ask) else {
        return price;
    };

    let crosses = match side {
        Side::Buy => price >= ask,
        Side::Sell => price <= bid,
    };
    if !crosses {
        return price;
    }

    if best.spread_is_one_tick(tick) {
        return clamp_to_our_best(side, price, best);
    }

    match side {
        Side::Buy => {
            let pennied = bid.saturating_add(tick);
            if pennied >= ask {
                clamp_to_our_best(side, price, best)
            } else {
                pennied
            }
        }
        Side::Sell => {
            let pennied = ask.saturating_sub(tick);
            if pennied <= bid {
                clamp_to_our_best(side, price, best)
            } else {
                pennied
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(value: i64) -> Price {
        Price::from_raw(value)
    }

    fn best(bid: i64, ask: i64) -> BestBook {
        BestBook {
            bid: Some(raw(bid)),
            ask: Some(raw(ask)),
        }
    }

    #[test]
    fn test_pennying() {
        struct TestCase {
            side: Side,
            price: Price,
            best: BestBook,
            expected: Price,
        }

        // tick = 0.01, prices in raw 1e-8 units
        let tick = raw(1_000_000);
        let tests = vec![
            TestCase {
                // TC0: one-tick spread falls back to our best
                // bestBid=100.00, bestAsk=100.01, buy target 100.05
                side: Side::Buy,
                price: raw(10_005_000_000),
                best: best(10_000_000_000, 10_001_000_000),
                expected: raw(10_000_000_000),
            },
            TestCase {
                // TC1: wide spread pennies one tick inside
                // bestAsk=100.03, buy target 100.05 -> 100.01
                side: Side::Buy,
                price: raw(10_005_000_000),
                best: best(10_000_000_000, 10_003_000_000),
                expected: raw(10_001_000_000),
            },
            TestCase {
                // TC2: non-crossing target untouched
                side: Side::Buy,
                price: raw(9_999_000_000),
                best: best(10_000_000_000, 10_003_000_000),
                expected: raw(9_999_000_000),
            },
            TestCase {
                // TC3: sell side pennies below the ask
                // bestBid=100.00, bestAsk=100.03, sell target 99.95 -> 100.02
                side: Side::Sell,
                price: raw(9_995_000_000),
                best: best(10_000_000_000, 10_003_000_000),
                expected: raw(10_002_000_000),
            },
            TestCase {
                // TC4: sell one-tick spread clamps to the ask
                side: Side::Sell,
                price: raw(9_995_000_000),
                best: best(10_000_000_000, 10_001_000_000),
                expected: raw(10_001_000_000),
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            assert_eq!(
                apply_hitting_logic(HittingLogic::Pennying, test.side, test.price, test.best, tick),
                test.expected,
                "TC{index} failed"
            );
        }
    }

    #[test]
    fn test_our_best_clamps() {
        let tick = raw(1_000_000);

        // Buy through the bid clamps to the bid
        assert_eq!(
            apply_hitting_logic(
                HittingLogic::OurBest,
                Side::Buy,
                raw(10_005_000_000),
                best(10_000_000_000, 10_003_000_000),
                tick,
            ),
            raw(10_000_000_000)
        );

        // Sell through the ask clamps to the ask
        assert_eq!(
            apply_hitting_logic(
                HittingLogic::OurBest,
                Side::Sell,
                raw(9_995_000_000),
                best(10_000_000_000, 10_003_000_000),
                tick,
            ),
            raw(10_003_000_000)
        );

        // Passive prices stay untouched
        assert_eq!(
            apply_hitting_logic(
                HittingLogic::OurBest,
                Side::Buy,
                raw(9_990_000_000),
                best(10_000_000_000, 10_003_000_000),
                tick,
            ),
            raw(9_990_000_000)
        );
    }

    #[test]
    fn test_allow_all_never_adjusts() {
        let tick = raw(1_000_000);
        assert_eq!(
            apply_hitting_logic(
                HittingLogic::AllowAll,
                Side::Buy,
                raw(10_005_000_000),
                best(10_000_000_000, 10_001_000_000),
                tick,
            ),
            raw(10_005_000_000)
        );
    }

    #[test]
    fn test_missing_levels_leave_price_untouched() {
        let tick = raw(1_000_000);
        let empty = BestBook::default();
        for logic in [HittingLogic::OurBest, HittingLogic::Pennying] {
            assert_eq!(
                apply_hitting_logic(logic, Side::Buy, raw(123), empty, tick),
                raw(123)
            );
        }
    }
}
