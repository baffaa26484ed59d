use std::time::Duration;

use tm_execution::OrderKind;

// Reason codes returned with `CallFailure::Rejected`.
pub const REASON_ORDER_NOT_FOUND: i32 = 404;
pub const REASON_TRADE_NOT_FOUND: i32 = 405;
pub const REASON_ORDER_NOT_PENDING: i32 = 409;
pub const REASON_TRADE_NOT_OPEN: i32 = 410;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PaperOrderStatus {
    Pending,
    Filled,
    Cancelled,
}

/// A resting limit/stop order.
#[derive(Clone, Debug, PartialEq)]
pub struct PaperOrder {
    pub order_id: String,
    pub kind: OrderKind,
    pub instrument_id: String,
    pub units: i64,
    pub price: Option<f64>,
    pub take_profit_price: f64,
    pub stop_loss_price: f64,
    pub status: PaperOrderStatus,
    /// Set when the order fills.
    pub trade_id: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PaperTradeStatus {
    Open,
    Closed,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PaperTrade {
    pub trade_id: String,
    pub instrument_id: String,
    pub units: i64,
    pub take_profit_price: f64,
    pub stop_loss_price: f64,
    pub status: PaperTradeStatus,
    /// Order that opened the trade; `None` for market orders.
    pub opened_by: Option<String>,
}

/// When a call's handle resolves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Resolution {
    /// Handles come back already resolved.
    #[default]
    Immediate,
    /// Handles stay unresolved until [`crate::PaperBroker::release_all`].
    Manual,
    /// A tokio task resolves each handle after the delay.
    Latency(Duration),
}

impl Resolution {
    /// `0` means immediate.
    pub fn from_latency_ms(ms: u64) -> Self {
        if ms == 0 {
            Resolution::Immediate
        } else {
            Resolution::Latency(Duration::from_millis(ms))
        }
    }
}
