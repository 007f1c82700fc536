use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Per-currency decimal-shift between a venue's native fixed-point integer
/// representation (e.g. satoshis, 1e8 subunits per BTC) and the human-facing
/// `Decimal` values the pricing engine works with.
///
/// `to_scaled(to_decimal(x)) == x` must hold for every legal `x`; this is the
/// boundary where venue-bound numbers are routed through integer arithmetic
/// once the float-facing engine has chosen them (§9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VenueScale {
    /// Number of decimal digits of subunit precision, e.g. 8 for 1e8 subunits/unit.
    digits: u32,
}

impl VenueScale {
    pub const fn new(digits: u32) -> Self {
        Self { digits }
    }

    pub fn to_decimal(&self, scaled: i64) -> Decimal {
        Decimal::new(scaled, self.digits)
    }

    pub fn to_scaled(&self, value: Decimal) -> i64 {
        let shifted = value * Decimal::from(10i64.pow(self.digits));
        shifted
            .round()
            .mantissa()
            .try_into()
            .expect("scaled value overflowed i64")
    }
}
