use std::collections::BTreeMap;
use std::time::Duration;

use crate::exchanges::events::ExchangeEvent;
use crate::lifecycle::app_lifetime_manager::AppLifetimeManager;
use anyhow::{anyhow, Result};
pub use mmb_domain::market::{
    CurrencyCode, CurrencyPair, CurrencyPairCodes, ExchangeAccountId, ExchangeErrorType,
    ExchangeId, ExchangeIdParseError, MarketAccountId, MarketId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;

pub type Price = Decimal;
pub type Amount = Decimal;
pub type SortedOrderData = BTreeMap<Price, Amount>;

#[derive(Debug, Eq, PartialEq, Clone, Serialize, Deserialize, Error)]
#[error("Type: {error_type:?} Message: {message} Code {code:?}")]
pub struct ExchangeError {
    pub error_type: ExchangeErrorType,
    pub message: String,
    pub code: Option<i64>,
}

impl ExchangeError {
    pub fn new(error_type: ExchangeErrorType, message: String, code: Option<i64>) -> Self {
        Self {
            error_type,
            message,
            code,
        }
    }

    pub fn parsing_error(message: String) -> Self {
        ExchangeError::new(ExchangeErrorType::ParsingError, message, None)
    }

    pub fn unknown(message: &str) -> Self {
        Self {
            error_type: ExchangeErrorType::Unknown,
            message: message.to_owned(),
            code: None,
        }
    }

    pub fn authentication(message: String) -> Self {
        Self {
            error_type: ExchangeErrorType::Authentication,
            message,
            code: None,
        }
    }

    pub fn set_pending(&mut self, pending_time: Duration) {
        self.error_type = ExchangeErrorType::PendingError(pending_time);
    }
}

/// Publishes a streaming signal and, on a closed channel (no receivers left alive),
/// treats it as fatal and triggers graceful shutdown (§4.C).
pub fn send_event(
    events_channel: &broadcast::Sender<ExchangeEvent>,
    lifetime_manager: Arc<AppLifetimeManager>,
    id: ExchangeAccountId,
    event: ExchangeEvent,
) -> Result<()> {
    match events_channel.send(event) {
        Ok(_) => Ok(()),
        Err(error) => {
            let msg = format!("Unable to send exchange event in {}: {}", id, error);
            log::error!("{}", msg);
            lifetime_manager.spawn_graceful_shutdown(&msg);
            Err(anyhow!(msg))
        }
    }
}
