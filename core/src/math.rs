use rust_decimal::Decimal;
use rust_decimal_macros::dec;

pub trait ConvertPercentToRate {
    fn percent_to_rate(&self) -> Decimal;
}

impl ConvertPercentToRate for Decimal {
    fn percent_to_rate(&self) -> Decimal {
        let proportion_multiplier = dec!(0.01);
        self * proportion_multiplier
    }
}

const EIGHT_DP_SCALE: Decimal = dec!(100_000_000);

/// Round a price up to 8 decimal places (§4.D `ceil_to_8dp`).
///
/// This is a true ceiling, not nearest-rounding: any non-zero remainder past
/// the 8th decimal place always rounds away from zero, even when the next
/// digit is less than 5. Venue price grids are historically 8dp fixed point;
/// the rebalancer relies on this to never under-quote a sell or over-quote a
/// buy by the sub-satoshi remainder a nearest-rounding scheme would drop.
pub fn ceil_to_8dp(value: Decimal) -> Decimal {
    (value * EIGHT_DP_SCALE).ceil() / EIGHT_DP_SCALE
}

#[cfg(test)]
mod test {
    use super::*;
    use rstest::rstest;

    use mmb_domain::market::powi;
    use rust_decimal_macros::dec;

    #[rstest]
    #[case(dec!(0.1), -1, dec!(10))]
    #[case(dec!(0.1), -6, dec!(1000000))]
    #[case(dec!(1.6), 2, dec!(2.56))]
    fn custom_powi(#[case] value: Decimal, #[case] degree: i8, #[case] expected: Decimal) {
        let powered = powi(value, degree);

        assert_eq!(powered, expected);
    }

    #[rstest]
    #[case(dec!(1.000000001), dec!(1.00000001))]
    #[case(dec!(1.00000001), dec!(1.00000001))]
    #[case(dec!(525), dec!(525))]
    fn ceil_to_8dp_rounds_up(#[case] value: Decimal, #[case] expected: Decimal) {
        assert_eq!(ceil_to_8dp(value), expected);
    }
}
