use std::path::PathBuf;

use mmb_domain::market::{CurrencyCode, CurrencyPair, ExchangeAccountId};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

pub trait BaseStrategySettings {
    fn exchange_account_id(&self) -> ExchangeAccountId;
    fn currency_pair(&self) -> CurrencyPair;
    fn max_amount(&self) -> Decimal;
}

/// Application settings
/// Attention! After changing in runtime, you need to save the settings.
/// For the settings to be applied, the bot must be restarted after changing the config.
#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
pub struct AppSettings<StrategySettings>
where
    StrategySettings: BaseStrategySettings + Clone,
{
    pub strategy: StrategySettings,
    pub core: CoreSettings,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CoreSettings {
    pub exchanges: Vec<ExchangeSettings>,
}

/// Which of the three historically-observed signing/streaming conventions a
/// venue speaks. See `exchanges::signing` for the concrete MAC construction
/// and `exchanges::client` for the streaming transport each implies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VenueKind {
    /// MtGox-style: body HMAC'd with endpoint prefix, Rest-Key/Rest-Sign headers, Socket.IO stream.
    MtGoxStyle,
    /// Kraken-style: SHA256(nonce||body) HMAC'd with path prefix, API-Key/API-Sign headers, websocket stream.
    KrakenStyle,
    /// Poloniex-style: body HMAC'd directly, Key/Sign headers, websocket stream.
    PoloniexStyle,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ExchangeSettings {
    pub exchange_account_id: ExchangeAccountId,
    pub api_key: String,
    pub secret_key: String,
    pub venue_kind: VenueKind,
    pub host: String,
    pub websocket_host: String,
    pub currency_pair: CurrencyPairSetting,
    /// Whether trade-history backfill is requested on (re)connect.
    pub request_trades: bool,
    pub subscribe_to_market_data: bool,
    pub websocket_channels: Vec<String>,
    /// Minimum delay enforced between signed HTTP requests (§4.B rate limiting).
    pub min_request_interval_ms: u64,
}

impl ExchangeSettings {
    // only for tests
    pub fn new_short(
        exchange_account_id: ExchangeAccountId,
        api_key: String,
        secret_key: String,
        venue_kind: VenueKind,
    ) -> Self {
        Self {
            exchange_account_id,
            api_key,
            secret_key,
            venue_kind,
            host: String::new(),
            websocket_host: String::new(),
            currency_pair: CurrencyPairSetting::new(CurrencyCode::new("BTC"), CurrencyCode::new("USD")),
            request_trades: false,
            subscribe_to_market_data: true,
            websocket_channels: vec![],
            min_request_interval_ms: 1000,
        }
    }
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        ExchangeSettings {
            exchange_account_id: ExchangeAccountId::new("", 0),
            api_key: "".to_string(),
            secret_key: "".to_string(),
            venue_kind: VenueKind::KrakenStyle,
            host: "".to_string(),
            websocket_host: "".to_string(),
            currency_pair: CurrencyPairSetting::new(CurrencyCode::new(""), CurrencyCode::new("")),
            request_trades: false,
            subscribe_to_market_data: true,
            websocket_channels: vec![],
            min_request_interval_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CurrencyPairSetting {
    pub base: CurrencyCode,
    pub quote: CurrencyCode,
}

impl CurrencyPairSetting {
    pub fn new(base: CurrencyCode, quote: CurrencyCode) -> Self {
        Self { base, quote }
    }
}

/// Strategy settings for the portfolio-rebalancing market maker (§6).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RebalancerSettings {
    pub exchange_account_id: ExchangeAccountId,
    pub currency_pair: CurrencyPairSetting,
    pub max_amount: Decimal,

    pub simulate: bool,
    pub distance: Decimal,
    pub distance_sell: Decimal,
    pub quote_cold: Decimal,
    pub base_cold: Decimal,
    pub quote_limit: Decimal,
    pub base_limit: Decimal,
    pub marker: u8,
    pub compensate_fees: bool,
    pub correction_margin: Decimal,
    pub min_volume: Decimal,

    pub simulate_quote: Decimal,
    pub simulate_base: Decimal,
    pub simulate_fee: Decimal,

    /// External collaborator contract (§6): directory probed for
    /// `_balancer_force_<price>*` marker files.
    pub forced_price_dir: Option<PathBuf>,

    /// CSV trade log sink (§6): one line per own trade. `None` disables logging.
    pub trade_log_path: Option<PathBuf>,
}

impl Default for RebalancerSettings {
    fn default() -> Self {
        Self {
            exchange_account_id: ExchangeAccountId::new("", 0),
            currency_pair: CurrencyPairSetting::new(CurrencyCode::new(""), CurrencyCode::new("")),
            max_amount: dec!(0),
            simulate: true,
            distance: dec!(5),
            distance_sell: dec!(5),
            quote_cold: dec!(0),
            base_cold: dec!(0),
            quote_limit: dec!(0),
            base_limit: dec!(0),
            marker: 0,
            compensate_fees: false,
            correction_margin: dec!(1),
            min_volume: dec!(0.1),
            simulate_quote: dec!(0),
            simulate_base: dec!(0),
            simulate_fee: dec!(0),
            forced_price_dir: None,
            trade_log_path: Some(PathBuf::from("trades.csv")),
        }
    }
}

impl BaseStrategySettings for RebalancerSettings {
    fn exchange_account_id(&self) -> ExchangeAccountId {
        self.exchange_account_id
    }

    fn currency_pair(&self) -> CurrencyPair {
        CurrencyPair::from_codes(self.currency_pair.base, self.currency_pair.quote)
    }

    fn max_amount(&self) -> Decimal {
        self.max_amount
    }
}
