//! CSV trade log sink (§6): one line per own trade, written next to wherever
//! the bot is launched from. Appends rather than truncates so a restart
//! keeps history; the header is written once, on first creation.

use std::fs::OpenOptions;
use std::path::Path;

use anyhow::{Context, Result};
use csv::Writer;
use mmb_utils::DateTime;
use rust_decimal::Decimal;

use crate::exchanges::order_book::OrderSide;

const HEADER: [&str; 14] = [
    "date",
    "side",
    "volume",
    "price",
    "fee_rate",
    "center",
    "wallet_quote",
    "total_quote",
    "quote_cold",
    "quote_ratio",
    "wallet_base",
    "total_base",
    "base_cold",
    "base_ratio",
];

/// One own-trade record, in column order matching `HEADER`.
#[derive(Debug, Clone, Copy)]
pub struct TradeLogRow {
    pub date: DateTime,
    pub side: OrderSide,
    pub volume: Decimal,
    pub price: Decimal,
    pub fee_rate: Decimal,
    pub center: Decimal,
    pub wallet_quote: Decimal,
    pub total_quote: Decimal,
    pub quote_cold: Decimal,
    pub quote_ratio: Decimal,
    pub wallet_base: Decimal,
    pub total_base: Decimal,
    pub base_cold: Decimal,
    pub base_ratio: Decimal,
}

pub struct TradeLog {
    writer: Writer<std::fs::File>,
}

impl TradeLog {
    pub fn open(path: &Path) -> Result<Self> {
        let already_exists = path.exists();

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("unable to open trade log at {}", path.display()))?;

        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        if !already_exists {
            writer.write_record(HEADER).context("unable to write trade log header")?;
        }

        Ok(Self { writer })
    }

    pub fn append(&mut self, row: TradeLogRow) -> Result<()> {
        let side = match row.side {
            OrderSide::Bid => "buy",
            OrderSide::Ask => "sell",
        };

        self.writer
            .write_record([
                row.date.to_rfc3339(),
                side.to_owned(),
                row.volume.to_string(),
                row.price.to_string(),
                row.fee_rate.to_string(),
                row.center.to_string(),
                row.wallet_quote.to_string(),
                row.total_quote.to_string(),
                row.quote_cold.to_string(),
                row.quote_ratio.to_string(),
                row.wallet_base.to_string(),
                row.total_base.to_string(),
                row.base_cold.to_string(),
                row.base_ratio.to_string(),
            ])
            .context("unable to append trade log row")?;

        self.writer.flush().context("unable to flush trade log")
    }
}
