use std::fmt::{Display, Formatter};

use mmb_utils::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

use crate::exchanges::common::{Amount, CurrencyCode, ExchangeAccountId, Price};
use crate::exchanges::order_book::OrderSide;

pub const CHANNEL_MAX_EVENTS_COUNT: usize = 200_000;

#[derive(Debug, Clone, Serialize, Deserialize, Eq)]
pub enum TradeId {
    Number(u64),
    String(Box<str>),
}

impl From<Value> for TradeId {
    fn from(value: Value) -> Self {
        match value.as_u64() {
            Some(value) => TradeId::Number(value),
            None => TradeId::String(value.to_string().into_boxed_str()),
        }
    }
}

impl PartialEq for TradeId {
    fn eq(&self, other: &TradeId) -> bool {
        let panic_msg = "TradeId formats don't match";
        match self {
            TradeId::Number(this) => match other {
                TradeId::Number(other) => this == other,
                TradeId::String(_) => panic!("{}", panic_msg),
            },
            TradeId::String(this) => match other {
                TradeId::Number(_) => panic!("{}", panic_msg),
                TradeId::String(other) => this == other,
            },
        }
    }
}

impl Display for TradeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeId::Number(number) => write!(f, "{}", number),
            TradeId::String(string) => write!(f, "{}", string),
        }
    }
}

/// `signal_ticker(bid, ask)`: fires whenever top-of-book moves.
#[derive(Debug, Clone)]
pub struct TickerEvent {
    pub exchange_account_id: ExchangeAccountId,
    pub bid: Price,
    pub ask: Price,
}

/// `signal_trade(date, price, volume, side, own)`: one per executed trade.
#[derive(Debug, Clone)]
pub struct TradeEvent {
    pub exchange_account_id: ExchangeAccountId,
    pub trade_id: Option<TradeId>,
    pub date: DateTime,
    pub price: Price,
    pub volume: Amount,
    pub side: OrderSide,
    /// `true` when this trade filled one of our own orders.
    pub own: bool,
}

/// `signal_owns_changed()`: the order book's `owns` sequence changed shape or status.
#[derive(Debug, Clone)]
pub struct OwnsChangedEvent {
    pub exchange_account_id: ExchangeAccountId,
}

/// `signal_wallet()`: a fresh balance snapshot (`info`) arrived.
#[derive(Debug, Clone)]
pub struct WalletEvent {
    pub exchange_account_id: ExchangeAccountId,
    pub balances: Vec<(CurrencyCode, Amount)>,
}

/// Emitted once the receive loop's (re)connect handshake completes.
#[derive(Debug, Clone)]
pub struct ConnectedEvent {
    pub exchange_account_id: ExchangeAccountId,
}

/// `{op:"remark", success, message, token, id}`: a business-level rejection
/// from the venue, surfaced without retry (§4.A, §7).
#[derive(Debug, Clone)]
pub struct RemarkEvent {
    pub exchange_account_id: ExchangeAccountId,
    pub success: bool,
    pub message: String,
    pub token: Option<String>,
    pub id: Option<String>,
}

/// `{op:"result", result, id}`: the HTTP worker's translation of a successful
/// signed call into the streaming-shape envelope (§4.B), correlated by `id`
/// (the `reqid` an outbound `send_order_add`/`send_order_cancel` produced).
#[derive(Debug, Clone)]
pub struct ResultEvent {
    pub exchange_account_id: ExchangeAccountId,
    pub data: Value,
    pub id: String,
}

#[derive(Debug, Clone)]
pub enum ExchangeEvent {
    Ticker(TickerEvent),
    Trade(TradeEvent),
    OwnsChanged(OwnsChangedEvent),
    Wallet(WalletEvent),
    Connected(ConnectedEvent),
    Remark(RemarkEvent),
    Result(ResultEvent),
}

pub(crate) struct ExchangeEvents {
    events_sender: broadcast::Sender<ExchangeEvent>,
}

impl ExchangeEvents {
    pub fn new(events_sender: broadcast::Sender<ExchangeEvent>) -> Self {
        ExchangeEvents { events_sender }
    }

    pub fn get_events_channel(&self) -> broadcast::Receiver<ExchangeEvent> {
        self.events_sender.subscribe()
    }
}
