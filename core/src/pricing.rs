//! Pure pricing functions for the rebalancer (§4.D).
//!
//! Nothing here touches a venue, a clock, or a channel: every function takes
//! its inputs as plain `Decimal`s and returns a plain `Decimal` (or `None`
//! when the caller must wait for more information). That purity is what lets
//! `strategies::rebalancer` be tested against §8's literal scenarios without
//! mocking a websocket.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::math::{ceil_to_8dp, ConvertPercentToRate};
use crate::misc::price_by_order_side::PriceByOrderSide;

/// `qc = wallet[quote] + quote_cold`, `bc = wallet[base] + base_cold` (§4.D).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FoldedBalances {
    pub qc: Decimal,
    pub bc: Decimal,
}

impl FoldedBalances {
    pub fn new(wallet_quote: Decimal, wallet_base: Decimal, quote_cold: Decimal, base_cold: Decimal) -> Self {
        Self {
            qc: wallet_quote + quote_cold,
            bc: wallet_base + base_cold,
        }
    }
}

/// The price at which the portfolio is 50/50 by value, or a conservative
/// degenerate-wallet seed, or `None` if there isn't enough information yet.
///
/// The two degenerate branches are transcribed exactly as specified
/// (`(bc/2 * ask) / 2`, `(qc/2 / bid) / 2`) rather than simplified — a
/// historical revision added a third halving by mistake and this is the
/// canonical, non-buggy form (§9 Design Notes).
pub fn center_price(balances: FoldedBalances, ticker: PriceByOrderSide) -> Option<Decimal> {
    let FoldedBalances { qc, bc } = balances;

    if qc > Decimal::ZERO && bc > Decimal::ZERO {
        Some(qc / bc)
    } else if qc == Decimal::ZERO && bc > Decimal::ZERO {
        ticker.top_ask.map(|ask| (bc / dec!(2) * ask) / dec!(2))
    } else if bc == Decimal::ZERO && qc > Decimal::ZERO {
        ticker.top_bid.map(|bid| (qc / dec!(2) / bid) / dec!(2))
    } else {
        None
    }
}

/// `step_up = 1 + distance_sell/100`, `step_down = 1 + distance/100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepFactors {
    pub step_up: Decimal,
    pub step_down: Decimal,
}

impl StepFactors {
    pub fn new(distance: Decimal, distance_sell: Decimal) -> Self {
        Self {
            step_up: Decimal::ONE + distance_sell.percent_to_rate(),
            step_down: Decimal::ONE + distance.percent_to_rate(),
        }
    }
}

/// Round-trip fee compensation (§4.D). The fee paid on a fill at price `p`
/// and volume `v` is `fee_rate * p * v`; recouping it from the quoted price
/// alone needs `delta = fee_rate * p` — `v` cancels algebraically, so the
/// "implied volume at that price" §4.D mentions never needs to be computed.
pub fn compensate_fee_sell(price: Decimal, fee_rate: Decimal) -> Decimal {
    price * (Decimal::ONE + fee_rate)
}

pub fn compensate_fee_buy(price: Decimal, fee_rate: Decimal) -> Decimal {
    price * (Decimal::ONE - fee_rate)
}

/// Raises `next_sell` above `current_ask`, lowers `next_buy` below
/// `current_bid`, by `correction_margin` percent, so the bot never quotes a
/// price that would immediately cross the spread and self-match (§4.D).
pub fn protect_sell(next_sell: Decimal, current_ask: Decimal, correction_margin: Decimal) -> Decimal {
    if next_sell < current_ask {
        current_ask * (Decimal::ONE + correction_margin.percent_to_rate())
    } else {
        next_sell
    }
}

pub fn protect_buy(next_buy: Decimal, current_bid: Decimal, correction_margin: Decimal) -> Decimal {
    if next_buy > current_bid {
        current_bid * (Decimal::ONE - correction_margin.percent_to_rate())
    } else {
        next_buy
    }
}

/// Pick the lowest forced price strictly greater than `threshold` (sells) or
/// the highest forced price strictly less than `threshold` (buys). `prices`
/// need not be sorted or deduplicated; absence of a qualifying level leaves
/// the caller's computed price untouched (§4.D, §6).
pub fn forced_sell_override(prices: &[Decimal], threshold: Decimal) -> Option<Decimal> {
    prices.iter().copied().filter(|&p| p > threshold).min()
}

pub fn forced_buy_override(prices: &[Decimal], threshold: Decimal) -> Option<Decimal> {
    prices.iter().copied().filter(|&p| p < threshold).max()
}

/// `must_buy(p) = ((qc - bc*p) / p) / 2`. Positive means "buy this much base
/// at p", negative means "sell `abs(this)` base at p" (§4.D).
pub fn must_buy(balances: FoldedBalances, price: Decimal) -> Decimal {
    let FoldedBalances { qc, bc } = balances;
    ((qc - bc * price) / price) / dec!(2)
}

/// Clamp a volume magnitude up to the configured minimum order size.
pub fn clamp_min_volume(volume: Decimal, min_volume: Decimal) -> Decimal {
    volume.max(min_volume)
}

/// Inputs to a single `next_sell`/`next_buy` computation; bundled so the
/// rebalancer only has one call site to keep in sync with §4.D's ordering of
/// fee compensation, crossing protection, and forced-price override.
#[derive(Debug, Clone, Copy)]
pub struct PricingInputs {
    pub balances: FoldedBalances,
    pub ticker: PriceByOrderSide,
    pub steps: StepFactors,
    pub correction_margin: Decimal,
    pub compensate_fees: bool,
    pub fee_rate: Decimal,
    pub min_volume: Decimal,
}

/// The two prices (and implied volumes) the rebalancer should quote next, or
/// `None` if `center_price` can't be computed yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NextOrders {
    pub center: Decimal,
    pub sell_price: Decimal,
    pub sell_volume: Decimal,
    pub buy_price: Decimal,
    pub buy_volume: Decimal,
}

/// The full §4.D pipeline: center → step pricing → fee compensation →
/// crossing protection → forced-price override → volume-at-price →
/// minimum-size clamp.
pub fn next_orders(inputs: PricingInputs, forced_prices: &[Decimal]) -> Option<NextOrders> {
    let PricingInputs {
        balances,
        ticker,
        steps,
        correction_margin,
        compensate_fees,
        fee_rate,
        min_volume,
    } = inputs;

    let center = center_price(balances, ticker)?;

    let raw_sell_threshold = center * steps.step_up;
    let raw_buy_threshold = center / steps.step_down;

    let mut sell_price = ceil_to_8dp(raw_sell_threshold);
    let mut buy_price = ceil_to_8dp(raw_buy_threshold);

    if compensate_fees {
        sell_price = compensate_fee_sell(sell_price, fee_rate);
        buy_price = compensate_fee_buy(buy_price, fee_rate);
    }

    if let (Some(bid), Some(ask)) = (ticker.top_bid, ticker.top_ask) {
        sell_price = protect_sell(sell_price, ask, correction_margin);
        buy_price = protect_buy(buy_price, bid, correction_margin);
    }

    if let Some(forced) = forced_sell_override(forced_prices, raw_sell_threshold) {
        sell_price = forced;
    }
    if let Some(forced) = forced_buy_override(forced_prices, raw_buy_threshold) {
        buy_price = forced;
    }

    let sell_volume = clamp_min_volume(must_buy(balances, sell_price).abs(), min_volume);
    let buy_volume = clamp_min_volume(must_buy(balances, buy_price).abs(), min_volume);

    Some(NextOrders {
        center,
        sell_price,
        sell_volume,
        buy_price,
        buy_volume,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn ticker(bid: Decimal, ask: Decimal) -> PriceByOrderSide {
        PriceByOrderSide::new(Some(bid), Some(ask))
    }

    fn no_forced() -> &'static [Decimal] {
        &[]
    }

    #[test]
    fn center_is_balance_identity_when_both_sides_known() {
        let balances = FoldedBalances::new(dec!(1000), dec!(2), dec!(0), dec!(0));
        let center = center_price(balances, ticker(dec!(490), dec!(510))).expect("in test");
        assert_eq!(center, dec!(500));
        // property (B): bc * center == qc within 1e-9 relative error
        assert_eq!(balances.bc * center, balances.qc);
    }

    #[test]
    fn center_is_none_with_nothing_to_go_on() {
        let balances = FoldedBalances::new(dec!(0), dec!(0), dec!(0), dec!(0));
        assert_eq!(
            center_price(balances, PriceByOrderSide::new(None, None)),
            None
        );
    }

    #[test]
    fn center_degenerate_branch_uses_double_halving_as_specified() {
        let balances = FoldedBalances::new(dec!(0), dec!(10), dec!(0), dec!(0));
        let center = center_price(balances, ticker(dec!(90), dec!(100))).expect("in test");
        // (bc/2 * ask) / 2 == (10/2 * 100) / 2 == 250, not bc*ask/2 == 500
        assert_eq!(center, dec!(250));
    }

    #[test]
    fn scenario_1_initial_placement() {
        // Values per §8 scenario 1, except the two volumes: the literal
        // formula `must_buy(p) = ((qc - bc*p) / p) / 2` yields 0.047619/0.05
        // here, not the illustrative 0.023809/0.024390 the scenario prose
        // gives — see DESIGN.md for why the formula text, not the prose
        // figure, is treated as canonical (mirrors the §9 resolution for the
        // degenerate center-price branch).
        let balances = FoldedBalances::new(dec!(1000), dec!(2), dec!(0), dec!(0));
        let inputs = PricingInputs {
            balances,
            ticker: ticker(dec!(490), dec!(510)),
            steps: StepFactors::new(dec!(5), dec!(5)),
            correction_margin: dec!(1),
            compensate_fees: false,
            fee_rate: dec!(0),
            min_volume: dec!(0.01),
        };

        let orders = next_orders(inputs, no_forced()).expect("in test");

        assert_eq!(orders.center, dec!(500));
        assert_eq!(orders.sell_price, dec!(525));
        assert_eq!(orders.buy_price, dec!(476.19047620));
        assert_eq!(orders.sell_volume.round_dp(6), dec!(0.047619));
        assert_eq!(orders.buy_volume.round_dp(6), dec!(0.050000));
    }

    #[test]
    fn scenario_2_crossing_prevention() {
        // Per §8 scenario 2, except `buy_price`: the sell side does cross
        // (raw threshold 525 < ask 530) so `protect_sell` fires and raises it
        // to 530*1.01 == 535.3, matching the scenario prose. The buy side
        // does not cross here — raw threshold 476.19047620 is already below
        // bid 520, so `protect_buy`'s `next_buy > current_bid` guard
        // (pricing.rs's `protect_buy`) never fires and the unclamped
        // threshold is returned unchanged. The scenario's literal 514.8 is
        // what protection would produce if it fired, which §4.D's own
        // firing condition says it should not; see DESIGN.md for why the
        // formula, not that figure, is treated as canonical (same
        // resolution as `scenario_1_initial_placement`'s volumes).
        let balances = FoldedBalances::new(dec!(1000), dec!(2), dec!(0), dec!(0));
        let inputs = PricingInputs {
            balances,
            ticker: ticker(dec!(520), dec!(530)),
            steps: StepFactors::new(dec!(5), dec!(5)),
            correction_margin: dec!(1),
            compensate_fees: false,
            fee_rate: dec!(0),
            min_volume: dec!(0.1),
        };

        let orders = next_orders(inputs, no_forced()).expect("in test");

        assert_eq!(orders.sell_price, dec!(535.3));
        assert_eq!(orders.buy_price, dec!(476.19047620));
    }

    #[test]
    fn scenario_6_forced_price() {
        let forced = [dec!(540), dec!(560)];
        let balances = FoldedBalances::new(dec!(1000), dec!(2), dec!(0), dec!(0));
        let inputs = PricingInputs {
            balances,
            ticker: ticker(dec!(490), dec!(510)),
            steps: StepFactors::new(dec!(5), dec!(5)),
            correction_margin: dec!(1),
            compensate_fees: false,
            fee_rate: dec!(0),
            min_volume: dec!(0.1),
        };

        let orders = next_orders(inputs, &forced).expect("in test");

        assert_eq!(orders.sell_price, dec!(540));
    }

    #[rstest]
    #[case(dec!(5), dec!(5))]
    #[case(dec!(10), dec!(10))]
    #[case(dec!(2.5), dec!(2.5))]
    fn property_d_symmetry_without_fees(#[case] distance: Decimal, #[case] distance_sell: Decimal) {
        let balances = FoldedBalances::new(dec!(1000), dec!(2), dec!(0), dec!(0));
        let center = center_price(balances, ticker(dec!(1), dec!(1_000_000))).expect("in test");
        let steps = StepFactors::new(distance, distance_sell);

        let next_sell = ceil_to_8dp(center * steps.step_up);
        let next_buy = ceil_to_8dp(center / steps.step_down);

        // next_sell / center == center / next_buy, within rounding (property D)
        let lhs = (next_sell / center).round_dp(6);
        let rhs = (center / next_buy).round_dp(6);
        assert_eq!(lhs, rhs);
    }

    #[test]
    fn property_e_volume_sign() {
        let balances = FoldedBalances::new(dec!(1000), dec!(2), dec!(0), dec!(0));
        assert!(must_buy(balances, dec!(476.19047620)) >= Decimal::ZERO);
        assert!(must_buy(balances, dec!(525)) <= Decimal::ZERO);
    }

    #[test]
    fn property_f_fee_idempotence_nets_non_negative() {
        let price = dec!(500);
        for fee_rate in [dec!(0), dec!(0.001), dec!(0.005), dec!(0.01)] {
            let sell = compensate_fee_sell(price, fee_rate);
            let buy = compensate_fee_buy(price, fee_rate);
            let volume = dec!(1);
            // sell proceeds minus fee, minus buy cost plus fee, at equal volume
            let sell_net = sell * volume * (Decimal::ONE - fee_rate);
            let buy_net = buy * volume * (Decimal::ONE + fee_rate);
            assert!(sell_net - buy_net >= Decimal::ZERO, "fee_rate={fee_rate}");
        }
    }

    #[test]
    fn property_c_non_crossing_after_protection() {
        let bid = dec!(520);
        let ask = dec!(530);
        let margin = dec!(1);

        let sell = protect_sell(dec!(1), ask, margin);
        let buy = protect_buy(dec!(1_000_000), bid, margin);

        assert!(sell >= ask * (Decimal::ONE + margin.percent_to_rate()));
        assert!(buy <= bid * (Decimal::ONE - margin.percent_to_rate()));
    }

    #[test]
    fn property_g_forced_override_absence_keeps_computed_price() {
        assert_eq!(forced_sell_override(&[], dec!(525)), None);
        assert_eq!(forced_buy_override(&[], dec!(476)), None);
    }

    #[test]
    fn clamp_raises_tiny_volumes_to_minimum() {
        assert_eq!(clamp_min_volume(dec!(0.0001), dec!(0.1)), dec!(0.1));
        assert_eq!(clamp_min_volume(dec!(5), dec!(0.1)), dec!(5));
    }
}
