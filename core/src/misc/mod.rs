pub mod price_by_order_side;
pub mod time;
pub mod trade_log;
