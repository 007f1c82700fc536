use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::exchanges::common::{Amount, CurrencyCode, Price};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSide {
    Bid,
    Ask,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Submitted,
    Open,
    Pending,
    Executing,
    PostPending,
    Removed,
}

impl OrderStatus {
    /// Counted as "open" by `check_trades`'s `open_n` (§4.E step 3); every other
    /// status is in-flight and counts toward `pending_n`.
    pub fn is_open(&self) -> bool {
        matches!(self, OrderStatus::Open)
    }
}

/// A resting order as seen through the venue's own-order reporting. `oid` is the
/// opaque venue identifier; ownership is primarily established by registry
/// membership, with the price-marker digit (§9) kept only as a legacy fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub oid: String,
    pub side: OrderSide,
    pub price: Price,
    pub volume: Amount,
    pub status: OrderStatus,
}

impl Order {
    pub fn new(oid: String, side: OrderSide, price: Price, volume: Amount, status: OrderStatus) -> Self {
        Self {
            oid,
            side,
            price,
            volume,
            status,
        }
    }
}

/// Registry of `oid`s issued by this bot instance, correlated via the `reqid`
/// round-trip (§9: "primarily rely on a registry of issued oids").
#[derive(Debug, Default, Clone)]
pub struct OwnOrderRegistry {
    marker_digit: Option<u8>,
    oids: std::collections::HashSet<String>,
}

impl OwnOrderRegistry {
    pub fn new(marker_digit: Option<u8>) -> Self {
        Self {
            marker_digit,
            oids: Default::default(),
        }
    }

    pub fn register(&mut self, oid: String) {
        self.oids.insert(oid);
    }

    pub fn forget(&mut self, oid: &str) {
        self.oids.remove(oid);
    }

    /// An order is our own iff its `oid` is registered, or (legacy fallback)
    /// its price carries the configured marker digit in the first decimal place.
    pub fn owns(&self, order: &Order) -> bool {
        if self.oids.contains(&order.oid) {
            return true;
        }

        match self.marker_digit {
            Some(marker) => price_marker_digit(order.price) == marker,
            None => false,
        }
    }
}

fn price_marker_digit(price: Price) -> u8 {
    let scaled = (price * rust_decimal::Decimal::from(10)).trunc();
    let digit = scaled % rust_decimal::Decimal::from(10);
    digit
        .abs()
        .to_string()
        .parse()
        .expect("single decimal digit always parses as u8")
}

/// In-memory projection of venue state (§3, §4.C).
#[derive(Debug, Clone, Default)]
pub struct OrderBook {
    pub bid: Price,
    pub ask: Price,
    pub owns: Vec<Order>,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update_ticker(&mut self, bid: Price, ask: Price) {
        self.bid = bid;
        self.ask = ask;
    }

    /// Count of own orders with `status == Open`, per `check_trades` step 3.
    pub fn open_count(&self) -> usize {
        self.owns.iter().filter(|o| o.status.is_open()).count()
    }

    /// Count of own orders with any other status (in-flight).
    pub fn pending_count(&self) -> usize {
        self.owns.len() - self.open_count()
    }
}

/// Mapping `currency → amount`, after venue-native scaled-integer conversion (§3).
///
/// An empty wallet means "not yet known": the strategy must refuse to trade
/// until the first `info`/`wallet` snapshot arrives.
#[derive(Debug, Clone, Default)]
pub struct Wallet {
    balances: HashMap<CurrencyCode, Amount>,
}

impl Wallet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_balances(balances: impl IntoIterator<Item = (CurrencyCode, Amount)>) -> Self {
        Self {
            balances: balances.into_iter().collect(),
        }
    }

    pub fn is_known(&self) -> bool {
        !self.balances.is_empty()
    }

    pub fn get(&self, currency: CurrencyCode) -> Amount {
        self.balances
            .get(&currency)
            .copied()
            .unwrap_or_else(|| rust_decimal::Decimal::from(0))
    }

    pub fn set(&mut self, currency: CurrencyCode, amount: Amount) {
        self.balances.insert(currency, amount);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    #[test]
    fn wallet_is_unknown_until_first_snapshot() {
        let wallet = Wallet::new();
        assert!(!wallet.is_known());
    }

    #[test]
    fn wallet_reports_zero_for_missing_currency() {
        let wallet = Wallet::from_balances([(CurrencyCode::new("usd"), dec!(100))]);
        assert!(wallet.is_known());
        assert_eq!(wallet.get(CurrencyCode::new("usd")), dec!(100));
        assert_eq!(wallet.get(CurrencyCode::new("btc")), dec!(0));
    }

    #[test]
    fn order_book_counts_open_and_pending_separately() {
        let mut book = OrderBook::new();
        book.owns.push(Order::new(
            "1".to_owned(),
            OrderSide::Bid,
            dec!(100),
            dec!(1),
            OrderStatus::Open,
        ));
        book.owns.push(Order::new(
            "2".to_owned(),
            OrderSide::Ask,
            dec!(110),
            dec!(1),
            OrderStatus::Pending,
        ));

        assert_eq!(book.open_count(), 1);
        assert_eq!(book.pending_count(), 1);
    }

    #[test]
    fn registry_recognizes_registered_oid() {
        let mut registry = OwnOrderRegistry::new(None);
        registry.register("abc".to_owned());

        let order = Order::new(
            "abc".to_owned(),
            OrderSide::Bid,
            dec!(100),
            dec!(1),
            OrderStatus::Open,
        );
        assert!(registry.owns(&order));
    }

    #[test]
    fn registry_falls_back_to_marker_digit() {
        let registry = OwnOrderRegistry::new(Some(7));

        let marked = Order::new(
            "not-ours".to_owned(),
            OrderSide::Bid,
            dec!(100.7),
            dec!(1),
            OrderStatus::Open,
        );
        assert!(registry.owns(&marked));

        let unmarked = Order::new(
            "also-not-ours".to_owned(),
            OrderSide::Bid,
            dec!(100.3),
            dec!(1),
            OrderStatus::Open,
        );
        assert!(!registry.owns(&unmarked));
    }
}
