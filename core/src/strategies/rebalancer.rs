//! Rebalancer strategy (§4.E): the event-driven state machine that consumes
//! the order book/wallet projection's signals (§4.C), calls into the pricing
//! engine (§4.D) and issues orders back through the exchange client (§4.B).
//!
//! The `check_trades` decision procedure is split into a pure [`decide`]
//! function, the same way `pricing` keeps its formulas free of any venue or
//! clock dependency: the branching in §4.E is exhaustively table-tested
//! without standing up a websocket, and [`Rebalancer`] itself is the thin
//! orchestration layer that feeds it live state and carries out its verdict.

use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::broadcast;

use crate::exchanges::client::ExchangeClient;
use crate::exchanges::events::{ExchangeEvent, TradeEvent};
use crate::exchanges::order_book::{OrderBook, OrderSide, Wallet};
use crate::forced_price::read_forced_prices;
use crate::misc::price_by_order_side::PriceByOrderSide;
use crate::misc::trade_log::{TradeLog, TradeLogRow};
use crate::pricing::{self, FoldedBalances, PricingInputs, StepFactors};
use crate::settings::RebalancerSettings;
use mmb_domain::market::CurrencyCode;
use mmb_utils::cancellation_token::CancellationToken;

/// One minimal price-grid unit at 8dp — the "satoshi dust" §4.E proactively cancels.
const DUST_VOLUME: Decimal = dec!(0.00000001);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebalancerState {
    IdleWaiting,
    Halted,
    Armed,
    Reconciling,
    Placing,
}

/// Pure inputs to [`decide`]; a plain snapshot of everything step 1-7 of
/// `check_trades` branches on.
#[derive(Debug, Clone, Copy)]
pub struct CheckTradesInputs {
    pub state: RebalancerState,
    pub wallet_known: bool,
    pub pending_acks: usize,
    pub open_n: usize,
    pub pending_n: usize,
    pub balance_fresh: bool,
    pub wallet_quote: Decimal,
    pub wallet_base: Decimal,
    pub quote_limit: Decimal,
    pub base_limit: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Nothing to do this tick: steady-state *Armed*, or waiting for quiescence.
    Noop,
    /// A fill just reduced us to one open order; force a fresh balance snapshot.
    RequestInfo,
    /// A configured minimum-balance limit is violated: cancel everything, stay halted.
    CancelAllAndHalt,
    /// One order is resting after a fill: cancel it and place a fresh pair.
    CancelRemainingThenPlace,
    /// Invariant breach (three or more own orders open): cancel everything, re-place.
    CancelAllThenPlace,
    /// No own orders and not already placing: place a fresh pair.
    Place,
}

/// §4.E's `check_trades` decision procedure, steps 1-7, as a pure function of
/// the current projection. The caller is responsible for carrying out the
/// verdict (cancel/place/request-info) and updating `state` accordingly.
pub fn decide(inputs: CheckTradesInputs) -> Decision {
    if inputs.state == RebalancerState::Halted {
        return Decision::Noop;
    }
    if !inputs.wallet_known || inputs.pending_acks > 0 {
        return Decision::Noop;
    }
    if inputs.pending_n > 0 {
        return Decision::Noop;
    }

    match inputs.open_n {
        2 => Decision::Noop,
        1 => {
            if !inputs.balance_fresh {
                Decision::RequestInfo
            } else if inputs.wallet_quote < inputs.quote_limit || inputs.wallet_base < inputs.base_limit {
                Decision::CancelAllAndHalt
            } else {
                Decision::CancelRemainingThenPlace
            }
        }
        0 => {
            if inputs.state == RebalancerState::Placing {
                Decision::Noop
            } else {
                Decision::Place
            }
        }
        _ => Decision::CancelAllThenPlace,
    }
}

/// The strategy's view of its two synthetic resting orders in simulation mode (§4.E).
#[derive(Debug, Clone, Copy)]
pub struct SimOrders {
    pub next_buy: Decimal,
    pub buy_amt: Decimal,
    pub next_sell: Decimal,
    pub sell_amt: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimFill {
    Sell { price: Decimal, volume: Decimal },
    Buy { price: Decimal, volume: Decimal },
}

/// §4.E simulation path: a ticker tick synthesizes a fill once price crosses
/// one of the stored simulated orders. Sell is checked first, matching the
/// source's tick ordering; both sides never fire on the same tick in
/// practice since `next_buy < next_sell`.
pub fn simulate_fill(sim_orders: &SimOrders, bid: Decimal, ask: Decimal) -> Option<SimFill> {
    if ask > Decimal::ZERO && ask >= sim_orders.next_sell {
        Some(SimFill::Sell {
            price: sim_orders.next_sell,
            volume: sim_orders.sell_amt,
        })
    } else if bid > Decimal::ZERO && bid <= sim_orders.next_buy {
        Some(SimFill::Buy {
            price: sim_orders.next_buy,
            volume: sim_orders.buy_amt,
        })
    } else {
        None
    }
}

/// Debits/credits the shadow wallet for a synthesized fill (§4.E simulation path).
pub fn apply_sim_fill(wallet: &mut Wallet, quote: CurrencyCode, base: CurrencyCode, fill: SimFill) {
    match fill {
        SimFill::Sell { price, volume } => {
            wallet.set(base, wallet.get(base) - volume);
            wallet.set(quote, wallet.get(quote) + price * volume);
        }
        SimFill::Buy { price, volume } => {
            wallet.set(base, wallet.get(base) + volume);
            wallet.set(quote, wallet.get(quote) - price * volume);
        }
    }
}

/// Event-driven orchestration around [`decide`]/the pricing engine for one
/// venue/pair (§2 component E). Owns no venue I/O itself — all of that lives
/// in `ExchangeClient`; this just reacts to its broadcast signals.
pub struct Rebalancer {
    settings: RebalancerSettings,
    client: Arc<ExchangeClient>,
    quote: CurrencyCode,
    base: CurrencyCode,
    state: RebalancerState,
    pending_acks: usize,
    balance_fresh: bool,
    sim_wallet: Option<Wallet>,
    sim_orders: Option<SimOrders>,
    trade_log: Option<TradeLog>,
}

impl Rebalancer {
    pub fn new(settings: RebalancerSettings, client: Arc<ExchangeClient>) -> Self {
        let quote = settings.currency_pair.quote;
        let base = settings.currency_pair.base;

        let sim_wallet = settings.simulate.then(|| {
            let mut wallet = Wallet::new();
            wallet.set(quote, settings.simulate_quote);
            wallet.set(base, settings.simulate_base);
            wallet
        });

        let trade_log = settings.trade_log_path.as_deref().and_then(|path| {
            TradeLog::open(path)
                .map_err(|err| log::warn!("unable to open trade log at {}: {}", path.display(), err))
                .ok()
        });

        Self {
            quote,
            base,
            state: RebalancerState::IdleWaiting,
            pending_acks: 0,
            balance_fresh: true,
            sim_wallet,
            sim_orders: None,
            trade_log,
            settings,
            client,
        }
    }

    pub fn state(&self) -> RebalancerState {
        self.state
    }

    /// User "cancel" command (§4.E transitions; the interactive UI that
    /// issues it is an external collaborator, §1/§6).
    pub fn halt(&mut self) {
        let (book, _wallet) = self.client.snapshot();
        self.cancel_all(&book);
        self.state = RebalancerState::Halted;
    }

    /// User "start" command.
    pub fn start(&mut self) {
        if self.state == RebalancerState::Halted {
            self.state = RebalancerState::Placing;
        }
        self.check_trades();
    }

    /// Drives the dispatch loop (§5 task 4) until cancelled or the upstream
    /// broadcast channel closes.
    pub async fn run(mut self, mut events: broadcast::Receiver<ExchangeEvent>, stop: CancellationToken) {
        loop {
            tokio::select! {
                _ = stop.when_cancelled() => return,
                received = events.recv() => {
                    match received {
                        Ok(event) => self.handle_event(event),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            log::warn!(
                                "{}: rebalancer dispatch lagged, skipped {} events",
                                self.client.exchange_account_id,
                                skipped
                            );
                        }
                        Err(broadcast::error::RecvError::Closed) => return,
                    }
                }
            }
        }
    }

    fn handle_event(&mut self, event: ExchangeEvent) {
        match event {
            ExchangeEvent::Ticker(ticker) => {
                if self.settings.simulate {
                    self.tick_simulation(ticker.bid, ticker.ask);
                }
                self.check_trades();
            }
            ExchangeEvent::Trade(trade) => {
                if trade.own {
                    self.balance_fresh = false;
                    self.log_own_trade(&trade);
                }
                self.check_trades();
            }
            ExchangeEvent::OwnsChanged(_) => {
                self.pending_acks = self.pending_acks.saturating_sub(1);
                self.check_trades();
            }
            ExchangeEvent::Wallet(_) => {
                self.balance_fresh = true;
                self.check_trades();
            }
            ExchangeEvent::Connected(_) => {
                self.state = RebalancerState::IdleWaiting;
            }
            ExchangeEvent::Remark(remark) => {
                log::warn!("{}: {}", self.client.exchange_account_id, remark.message);
            }
            ExchangeEvent::Result(_) => {}
        }
    }

    /// §4.E's `check_trades`, invoked on every relevant signal. No-op in
    /// simulation mode: the simulated path is entirely driven off
    /// `tick_simulation`, and no real order is ever submitted (§4.E).
    fn check_trades(&mut self) {
        if self.settings.simulate {
            return;
        }

        let (book, wallet) = self.client.snapshot();
        self.cancel_dust(&book);

        let inputs = CheckTradesInputs {
            state: self.state,
            wallet_known: wallet.is_known(),
            pending_acks: self.pending_acks,
            open_n: book.open_count(),
            pending_n: book.pending_count(),
            balance_fresh: self.balance_fresh,
            wallet_quote: wallet.get(self.quote),
            wallet_base: wallet.get(self.base),
            quote_limit: self.settings.quote_limit,
            base_limit: self.settings.base_limit,
        };

        match decide(inputs) {
            Decision::Noop => {
                if inputs.open_n == 2 {
                    self.state = RebalancerState::Armed;
                }
            }
            Decision::RequestInfo => {
                self.state = RebalancerState::Reconciling;
                self.client.request_info();
            }
            Decision::CancelAllAndHalt => {
                self.cancel_all(&book);
                self.state = RebalancerState::Halted;
            }
            Decision::CancelRemainingThenPlace | Decision::CancelAllThenPlace => {
                self.cancel_all(&book);
                self.state = RebalancerState::Placing;
                self.place_orders(&book, &wallet);
            }
            Decision::Place => {
                self.state = RebalancerState::Placing;
                self.place_orders(&book, &wallet);
            }
        }
    }

    /// Appends one row to the CSV trade log (§6) for a fill identified as our own.
    fn log_own_trade(&mut self, trade: &TradeEvent) {
        let Some(trade_log) = self.trade_log.as_mut() else {
            return;
        };

        let (book, wallet) = self.client.snapshot();
        let balances = FoldedBalances::new(
            wallet.get(self.quote),
            wallet.get(self.base),
            self.settings.quote_cold,
            self.settings.base_cold,
        );
        let ticker = PriceByOrderSide::new(nonzero(book.bid), nonzero(book.ask));
        let center = pricing::center_price(balances, ticker).unwrap_or(Decimal::ZERO);

        let quote_ratio = if balances.qc != Decimal::ZERO {
            wallet.get(self.quote) / balances.qc
        } else {
            Decimal::ZERO
        };
        let base_ratio = if balances.bc != Decimal::ZERO {
            wallet.get(self.base) / balances.bc
        } else {
            Decimal::ZERO
        };

        let row = TradeLogRow {
            date: trade.date,
            side: trade.side,
            volume: trade.volume,
            price: trade.price,
            fee_rate: self.settings.simulate_fee,
            center,
            wallet_quote: wallet.get(self.quote),
            total_quote: balances.qc,
            quote_cold: self.settings.quote_cold,
            quote_ratio,
            wallet_base: wallet.get(self.base),
            total_base: balances.bc,
            base_cold: self.settings.base_cold,
            base_ratio,
        };

        if let Err(err) = trade_log.append(row) {
            log::warn!("{}: failed to append trade log row: {}", self.client.exchange_account_id, err);
        }
    }

    fn place_orders(&mut self, book: &OrderBook, wallet: &Wallet) {
        let balances = FoldedBalances::new(
            wallet.get(self.quote),
            wallet.get(self.base),
            self.settings.quote_cold,
            self.settings.base_cold,
        );
        let ticker = PriceByOrderSide::new(nonzero(book.bid), nonzero(book.ask));

        match self.compute_next_orders(balances, ticker) {
            Some(orders) => {
                self.client
                    .send_order_add(OrderSide::Ask, orders.sell_price, orders.sell_volume);
                self.client
                    .send_order_add(OrderSide::Bid, orders.buy_price, orders.buy_volume);
                self.pending_acks += 2;
            }
            None => {
                self.state = RebalancerState::IdleWaiting;
            }
        }
    }

    fn compute_next_orders(
        &self,
        balances: FoldedBalances,
        ticker: PriceByOrderSide,
    ) -> Option<pricing::NextOrders> {
        let steps = StepFactors::new(self.settings.distance, self.settings.distance_sell);
        let forced = self.forced_prices();

        let inputs = PricingInputs {
            balances,
            ticker,
            steps,
            correction_margin: self.settings.correction_margin,
            compensate_fees: self.settings.compensate_fees,
            fee_rate: self.settings.simulate_fee,
            min_volume: self.settings.min_volume,
        };

        pricing::next_orders(inputs, &forced)
    }

    fn forced_prices(&self) -> Vec<Decimal> {
        match &self.settings.forced_price_dir {
            Some(dir) => read_forced_prices(dir),
            None => Vec::new(),
        }
    }

    fn cancel_all(&mut self, book: &OrderBook) {
        for order in &book.owns {
            self.client.send_order_cancel(&order.oid);
            self.pending_acks += 1;
        }
    }

    fn cancel_dust(&mut self, book: &OrderBook) {
        for order in &book.owns {
            if order.volume == DUST_VOLUME {
                self.client.send_order_cancel(&order.oid);
                self.pending_acks += 1;
            }
        }
    }

    // -- simulation path (§4.E) ----------------------------------------------

    fn tick_simulation(&mut self, bid: Decimal, ask: Decimal) {
        let Some(sim_orders) = self.sim_orders else {
            self.place_orders_simulated(bid, ask);
            return;
        };

        if let Some(fill) = simulate_fill(&sim_orders, bid, ask) {
            let mut wallet = self.sim_wallet.clone().unwrap_or_default();
            apply_sim_fill(&mut wallet, self.quote, self.base, fill);
            self.sim_wallet = Some(wallet);
            self.sim_orders = None;
            self.place_orders_simulated(bid, ask);
        }
    }

    fn place_orders_simulated(&mut self, bid: Decimal, ask: Decimal) {
        let wallet = self.sim_wallet.clone().unwrap_or_default();
        let balances = FoldedBalances::new(
            wallet.get(self.quote),
            wallet.get(self.base),
            self.settings.quote_cold,
            self.settings.base_cold,
        );
        let ticker = PriceByOrderSide::new(nonzero(bid), nonzero(ask));

        if let Some(orders) = self.compute_next_orders(balances, ticker) {
            self.sim_orders = Some(SimOrders {
                next_buy: orders.buy_price,
                buy_amt: orders.buy_volume,
                next_sell: orders.sell_price,
                sell_amt: orders.sell_volume,
            });
            self.state = RebalancerState::Armed;
        }
    }
}

fn nonzero(price: Decimal) -> Option<Decimal> {
    (price > Decimal::ZERO).then_some(price)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    fn base_inputs() -> CheckTradesInputs {
        CheckTradesInputs {
            state: RebalancerState::Armed,
            wallet_known: true,
            pending_acks: 0,
            open_n: 2,
            pending_n: 0,
            balance_fresh: true,
            wallet_quote: dec!(1000),
            wallet_base: dec!(2),
            quote_limit: dec!(0),
            base_limit: dec!(0),
        }
    }

    #[test]
    fn halted_always_noops_property_h() {
        let inputs = CheckTradesInputs {
            state: RebalancerState::Halted,
            open_n: 0,
            ..base_inputs()
        };
        assert_eq!(decide(inputs), Decision::Noop);
    }

    #[test]
    fn steady_state_two_open_is_noop() {
        assert_eq!(decide(base_inputs()), Decision::Noop);
    }

    #[test]
    fn wallet_unknown_waits() {
        let inputs = CheckTradesInputs {
            wallet_known: false,
            ..base_inputs()
        };
        assert_eq!(decide(inputs), Decision::Noop);
    }

    #[test]
    fn in_flight_acks_wait() {
        let inputs = CheckTradesInputs {
            pending_acks: 1,
            ..base_inputs()
        };
        assert_eq!(decide(inputs), Decision::Noop);
    }

    #[test]
    fn pending_orders_wait_for_quiescence() {
        let inputs = CheckTradesInputs {
            pending_n: 1,
            open_n: 1,
            ..base_inputs()
        };
        assert_eq!(decide(inputs), Decision::Noop);
    }

    #[test]
    fn single_fill_requests_info_before_balances_refresh() {
        let inputs = CheckTradesInputs {
            open_n: 1,
            balance_fresh: false,
            ..base_inputs()
        };
        assert_eq!(decide(inputs), Decision::RequestInfo);
    }

    #[test]
    fn scenario_3_fill_reconciliation_cancels_remaining_once_fresh() {
        let inputs = CheckTradesInputs {
            open_n: 1,
            balance_fresh: true,
            ..base_inputs()
        };
        assert_eq!(decide(inputs), Decision::CancelRemainingThenPlace);
    }

    #[test]
    fn scenario_4_minimum_balance_halt() {
        let inputs = CheckTradesInputs {
            open_n: 1,
            balance_fresh: true,
            wallet_quote: dec!(95),
            wallet_base: dec!(3),
            quote_limit: dec!(100),
            base_limit: dec!(0),
            ..base_inputs()
        };
        assert_eq!(decide(inputs), Decision::CancelAllAndHalt);
    }

    #[test]
    fn zero_open_while_placing_waits() {
        let inputs = CheckTradesInputs {
            open_n: 0,
            state: RebalancerState::Placing,
            ..base_inputs()
        };
        assert_eq!(decide(inputs), Decision::Noop);
    }

    #[test]
    fn zero_open_otherwise_places() {
        let inputs = CheckTradesInputs {
            open_n: 0,
            state: RebalancerState::IdleWaiting,
            ..base_inputs()
        };
        assert_eq!(decide(inputs), Decision::Place);
    }

    #[test]
    fn invariant_breach_three_open_cancels_and_replaces() {
        let inputs = CheckTradesInputs {
            open_n: 3,
            ..base_inputs()
        };
        assert_eq!(decide(inputs), Decision::CancelAllThenPlace);
    }

    #[test]
    fn scenario_5_simulation_fill_debits_base_credits_quote() {
        let sim_orders = SimOrders {
            next_buy: dec!(476.19047620),
            buy_amt: dec!(0.05),
            next_sell: dec!(525),
            sell_amt: dec!(0.02),
        };

        let fill = simulate_fill(&sim_orders, dec!(520), dec!(526)).expect("ask crossed next_sell");
        assert_eq!(
            fill,
            SimFill::Sell {
                price: dec!(525),
                volume: dec!(0.02)
            }
        );

        let quote = CurrencyCode::new("usd");
        let base = CurrencyCode::new("btc");
        let mut wallet = Wallet::new();
        wallet.set(quote, dec!(1000));
        wallet.set(base, dec!(2));

        apply_sim_fill(&mut wallet, quote, base, fill);

        assert_eq!(wallet.get(quote), dec!(1000) + dec!(0.02) * dec!(525));
        assert_eq!(wallet.get(base), dec!(2) - dec!(0.02));
    }

    #[test]
    fn simulate_fill_buy_side_symmetric() {
        let sim_orders = SimOrders {
            next_buy: dec!(476.19047620),
            buy_amt: dec!(0.05),
            next_sell: dec!(525),
            sell_amt: dec!(0.02),
        };

        let fill = simulate_fill(&sim_orders, dec!(470), dec!(480)).expect("bid crossed next_buy");
        assert_eq!(
            fill,
            SimFill::Buy {
                price: dec!(476.19047620),
                volume: dec!(0.05)
            }
        );
    }

    #[test]
    fn simulate_fill_absent_when_price_inside_band() {
        let sim_orders = SimOrders {
            next_buy: dec!(476.19047620),
            buy_amt: dec!(0.05),
            next_sell: dec!(525),
            sell_amt: dec!(0.02),
        };

        assert_eq!(simulate_fill(&sim_orders, dec!(500), dec!(510)), None);
    }
}
