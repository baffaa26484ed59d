//! tm-schemas
//!
//! Inbound wire messages accepted by the trade manager: one new-order message
//! per order kind plus the boolean poll signal. Deadlines travel as strings
//! (`""` = no deadline) and are parsed with [`parse_deadline`].

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Wire format of validity deadlines, e.g. `2024-05-01 09:30:00.000000`.
pub const DEADLINE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketOrderMsg {
    pub req_id: String,
    pub instrument_id: String,
    pub units: i64,
    pub take_profit_price: f64,
    pub stop_loss_price: f64,
    #[serde(default)]
    pub valid_period_settlement: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitOrderMsg {
    pub req_id: String,
    pub instrument_id: String,
    pub units: i64,
    pub price: f64,
    pub take_profit_price: f64,
    pub stop_loss_price: f64,
    #[serde(default)]
    pub valid_period_new: String,
    #[serde(default)]
    pub valid_period_settlement: String,
}

/// Same shape as a limit order; kept as its own type so the kind is carried
/// by the message type rather than a flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopOrderMsg {
    pub req_id: String,
    pub instrument_id: String,
    pub units: i64,
    pub price: f64,
    pub take_profit_price: f64,
    pub stop_loss_price: f64,
    #[serde(default)]
    pub valid_period_new: String,
    #[serde(default)]
    pub valid_period_settlement: String,
}

/// Any new-order message, tagged by kind. This is the shape used by order
/// files (`{"kind": "limit", ...}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InboundOrder {
    Market(MarketOrderMsg),
    Limit(LimitOrderMsg),
    Stop(StopOrderMsg),
}

impl InboundOrder {
    pub fn req_id(&self) -> &str {
        match self {
            InboundOrder::Market(m) => &m.req_id,
            InboundOrder::Limit(m) => &m.req_id,
            InboundOrder::Stop(m) => &m.req_id,
        }
    }
}

/// Poll trigger. Only `data == true` runs a poll pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollSignal {
    pub data: bool,
}

// ---------------------------------------------------------------------------
// Deadline parsing
// ---------------------------------------------------------------------------

/// A deadline string that is neither empty, [`DEADLINE_FORMAT`] nor RFC 3339.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadlineParseError {
    pub field: &'static str,
    pub value: String,
}

impl std::fmt::Display for DeadlineParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid deadline in {}: {:?} (expected \"{}\" or RFC 3339)",
            self.field, self.value, DEADLINE_FORMAT
        )
    }
}

impl std::error::Error for DeadlineParseError {}

/// Parse an optional deadline. Empty (or whitespace) means "no deadline".
///
/// Naive timestamps in [`DEADLINE_FORMAT`] are interpreted as UTC.
pub fn parse_deadline(
    field: &'static str,
    raw: &str,
) -> Result<Option<DateTime<Utc>>, DeadlineParseError> {
    let s = raw.trim();
    if s.is_empty() {
        return Ok(None);
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, DEADLINE_FORMAT) {
        return Ok(Some(naive.and_utc()));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(Some(dt.with_timezone(&Utc)));
    }
    Err(DeadlineParseError {
        field,
        value: raw.to_string(),
    })
}

/// Render a deadline back into the wire format.
pub fn format_deadline(ts: &DateTime<Utc>) -> String {
    ts.naive_utc().format(DEADLINE_FORMAT).to_string()
}
