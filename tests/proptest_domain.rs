//! Property-Based Tests — Domain Layer Invariants
//!
//! Uses `proptest` to verify that sizing and the order lifecycle
//! maintain their invariants across random inputs.

use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use intx_perps_bot::domain::lifecycle::{OrderEvent, OrderState};
use intx_perps_bot::domain::sizing::{floor_to_step, RiskSizer};
use intx_perps_bot::domain::trade::PortfolioSummary;

fn summary(max_withdrawal: Decimal) -> PortfolioSummary {
    PortfolioSummary {
        max_withdrawal,
        ..PortfolioSummary::default()
    }
}

/// Amount in hundredths, up to 100k.
fn money() -> impl Strategy<Value = Decimal> {
    (0i64..10_000_000).prop_map(|cents| Decimal::new(cents, 2))
}

/// Price in tenths, from 1.0 up to 200k.
fn price() -> impl Strategy<Value = Decimal> {
    (10i64..2_000_000).prop_map(|tenths| Decimal::new(tenths, 1))
}

fn leverage() -> impl Strategy<Value = Decimal> {
    (1i64..=50).prop_map(Decimal::from)
}

// ── Risk Sizer Properties ───────────────────────────────────

proptest! {
    /// The sized notional never exceeds the leveraged allocation.
    #[test]
    fn notional_never_exceeds_cap(mw in money(), p in price(), lev in leverage()) {
        let sizer = RiskSizer::default();
        let sized = sizer.size(&summary(mw), p, lev).unwrap();

        let cap = lev * mw * sizer.allocation_fraction();
        prop_assert!(sized.base_size * p <= cap, "{} * {p} > {cap}", sized.base_size);
        prop_assert!(sized.base_size >= Decimal::ZERO);
    }

    /// Size is a whole number of steps, and one more step would breach the cap.
    #[test]
    fn size_is_largest_step_multiple(mw in money(), p in price(), lev in leverage()) {
        let sizer = RiskSizer::default();
        let step = dec!(0.001);
        let sized = sizer.size(&summary(mw), p, lev).unwrap();

        prop_assert!((sized.base_size % step).is_zero());
        let cap = lev * mw * sizer.allocation_fraction();
        prop_assert!((sized.base_size + step) * p > cap);
    }

    /// The limit price sits at or below the slipped price, within one step.
    #[test]
    fn limit_price_below_market(p in price(), lev in leverage()) {
        let sizer = RiskSizer::default();
        let step = dec!(0.1);
        let sized = sizer.size(&summary(dec!(1000)), p, lev).unwrap();

        let slipped = p * sizer.price_slippage_factor();
        prop_assert!(sized.limit_price <= slipped);
        prop_assert!(sized.limit_price > slipped - step);
        prop_assert!((sized.limit_price % step).is_zero());
        prop_assert!(sized.limit_price <= p);
    }

    /// More withdrawable funds never produce a smaller order.
    #[test]
    fn size_monotonic_in_max_withdrawal(a in money(), b in money(), p in price()) {
        let sizer = RiskSizer::default();
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let small = sizer.size(&summary(lo), p, dec!(10)).unwrap();
        let large = sizer.size(&summary(hi), p, dec!(10)).unwrap();
        prop_assert!(small.base_size <= large.base_size);
    }

    /// A negative max withdrawal sizes to nothing rather than going short.
    #[test]
    fn negative_withdrawal_sizes_to_zero(cents in 1i64..10_000_000, p in price()) {
        let sized = RiskSizer::default()
            .size(&summary(Decimal::new(-cents, 2)), p, dec!(10))
            .unwrap();
        prop_assert!(sized.is_empty());
    }

    /// Flooring twice is the same as flooring once.
    #[test]
    fn floor_is_idempotent(v in money(), step_exp in 0u32..6) {
        let step = Decimal::new(1, step_exp);
        let once = floor_to_step(v, step).unwrap();
        prop_assert_eq!(floor_to_step(once, step).unwrap(), once);
        prop_assert!(once <= v);
    }
}

// ── Order Lifecycle Properties ──────────────────────────────

fn event() -> impl Strategy<Value = OrderEvent> {
    prop_oneof![
        Just(OrderEvent::Submit),
        Just(OrderEvent::Accept),
        Just(OrderEvent::Reject),
        Just(OrderEvent::TransportFailure),
        Just(OrderEvent::RequestCancel),
        Just(OrderEvent::ConfirmCancel),
        Just(OrderEvent::CancelRefused),
    ]
}

proptest! {
    /// Cancelled is only reachable through an accepted order, and a
    /// rejected transition leaves the state untouched.
    #[test]
    fn cancelled_requires_acceptance(events in prop::collection::vec(event(), 0..20)) {
        let mut state = OrderState::Sized;
        let mut accepted = false;

        for e in events {
            if let Ok(next) = state.apply(e) {
                if state == OrderState::Submitted && next == OrderState::Open {
                    accepted = true;
                }
                state = next;
            }
            if state == OrderState::Cancelled {
                prop_assert!(accepted);
            }
        }
    }

    /// Failed and Unresolved accept no further events.
    #[test]
    fn failed_and_unresolved_are_dead_ends(e in event()) {
        prop_assert!(OrderState::Failed.apply(e).is_err());
        prop_assert!(OrderState::Unresolved.apply(e).is_err());
    }
}
