use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tm_schemas::{parse_deadline, DeadlineParseError, InboundOrder};

use crate::rpc::CreateOrderRequest;

/// Caller-assigned request identifier. Unique among active orders.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderKind {
    Market,
    Limit,
    Stop,
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderKind::Market => write!(f, "MARKET"),
            OrderKind::Limit => write!(f, "LIMIT"),
            OrderKind::Stop => write!(f, "STOP"),
        }
    }
}

// ---------------------------------------------------------------------------
// OrderRequest
// ---------------------------------------------------------------------------

/// A new-order request. Immutable once accepted by the manager.
#[derive(Clone, Debug, PartialEq)]
pub struct OrderRequest {
    pub request_id: RequestId,
    pub kind: OrderKind,
    pub instrument_id: String,
    /// Signed: positive = buy, negative = sell.
    pub units: i64,
    /// Limit/stop price. Must be `Some` exactly when `kind != Market`.
    pub price: Option<f64>,
    pub take_profit_price: f64,
    pub stop_loss_price: f64,
    /// How long the order may stay unfilled. `None` = until polled.
    pub new_order_deadline: Option<DateTime<Utc>>,
    /// How long the opened trade may stay open. `None` = until polled.
    pub settlement_deadline: Option<DateTime<Utc>>,
}

impl OrderRequest {
    pub fn market(
        request_id: impl Into<RequestId>,
        instrument_id: impl Into<String>,
        units: i64,
        take_profit_price: f64,
        stop_loss_price: f64,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            kind: OrderKind::Market,
            instrument_id: instrument_id.into(),
            units,
            price: None,
            take_profit_price,
            stop_loss_price,
            new_order_deadline: None,
            settlement_deadline: None,
        }
    }

    pub fn limit(
        request_id: impl Into<RequestId>,
        instrument_id: impl Into<String>,
        units: i64,
        price: f64,
        take_profit_price: f64,
        stop_loss_price: f64,
    ) -> Self {
        Self {
            kind: OrderKind::Limit,
            price: Some(price),
            ..Self::market(
                request_id,
                instrument_id,
                units,
                take_profit_price,
                stop_loss_price,
            )
        }
    }

    pub fn stop(
        request_id: impl Into<RequestId>,
        instrument_id: impl Into<String>,
        units: i64,
        price: f64,
        take_profit_price: f64,
        stop_loss_price: f64,
    ) -> Self {
        Self {
            kind: OrderKind::Stop,
            ..Self::limit(
                request_id,
                instrument_id,
                units,
                price,
                take_profit_price,
                stop_loss_price,
            )
        }
    }

    pub fn with_new_order_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.new_order_deadline = Some(deadline);
        self
    }

    pub fn with_settlement_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.settlement_deadline = Some(deadline);
        self
    }

    /// Kind-specific field checks. Runs before any broker call is issued.
    pub fn validate(&self) -> Result<(), SubmitError> {
        if self.units == 0 {
            return Err(SubmitError::ZeroUnits);
        }
        match (self.kind, self.price) {
            (OrderKind::Market, Some(_)) => Err(SubmitError::UnexpectedPrice),
            (OrderKind::Limit | OrderKind::Stop, None) => {
                Err(SubmitError::MissingPrice { kind: self.kind })
            }
            (OrderKind::Limit | OrderKind::Stop, Some(p)) if !p.is_finite() || p <= 0.0 => {
                Err(SubmitError::InvalidPrice { price: p })
            }
            _ => Ok(()),
        }
    }

    pub fn create_request(&self) -> CreateOrderRequest {
        CreateOrderRequest {
            kind: self.kind,
            instrument_id: self.instrument_id.clone(),
            units: self.units,
            price: self.price,
            take_profit_price: self.take_profit_price,
            stop_loss_price: self.stop_loss_price,
        }
    }
}

impl TryFrom<InboundOrder> for OrderRequest {
    type Error = SubmitError;

    fn try_from(msg: InboundOrder) -> Result<Self, Self::Error> {
        let req = match msg {
            InboundOrder::Market(m) => OrderRequest {
                settlement_deadline: parse_deadline(
                    "valid_period_settlement",
                    &m.valid_period_settlement,
                )?,
                ..OrderRequest::market(
                    m.req_id,
                    m.instrument_id,
                    m.units,
                    m.take_profit_price,
                    m.stop_loss_price,
                )
            },
            InboundOrder::Limit(m) => OrderRequest {
                new_order_deadline: parse_deadline("valid_period_new", &m.valid_period_new)?,
                settlement_deadline: parse_deadline(
                    "valid_period_settlement",
                    &m.valid_period_settlement,
                )?,
                ..OrderRequest::limit(
                    m.req_id,
                    m.instrument_id,
                    m.units,
                    m.price,
                    m.take_profit_price,
                    m.stop_loss_price,
                )
            },
            InboundOrder::Stop(m) => OrderRequest {
                new_order_deadline: parse_deadline("valid_period_new", &m.valid_period_new)?,
                settlement_deadline: parse_deadline(
                    "valid_period_settlement",
                    &m.valid_period_settlement,
                )?,
                ..OrderRequest::stop(
                    m.req_id,
                    m.instrument_id,
                    m.units,
                    m.price,
                    m.take_profit_price,
                    m.stop_loss_price,
                )
            },
        };
        Ok(req)
    }
}

// ---------------------------------------------------------------------------
// SubmitError
// ---------------------------------------------------------------------------

/// Synchronous rejection of a submission. No record is created and no broker
/// call is issued.
#[derive(Clone, Debug, PartialEq)]
pub enum SubmitError {
    /// Limit/stop order without a price.
    MissingPrice { kind: OrderKind },
    /// Market order carrying a price.
    UnexpectedPrice,
    InvalidPrice { price: f64 },
    ZeroUnits,
    InvalidDeadline(DeadlineParseError),
    /// The request id is already being tracked.
    DuplicateRequest(RequestId),
}

impl fmt::Display for SubmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmitError::MissingPrice { kind } => write!(f, "{kind} order requires a price"),
            SubmitError::UnexpectedPrice => write!(f, "MARKET order must not carry a price"),
            SubmitError::InvalidPrice { price } => write!(f, "invalid order price: {price}"),
            SubmitError::ZeroUnits => write!(f, "order units must be non-zero"),
            SubmitError::InvalidDeadline(e) => write!(f, "{e}"),
            SubmitError::DuplicateRequest(id) => {
                write!(f, "request id {id} is already active")
            }
        }
    }
}

impl std::error::Error for SubmitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SubmitError::InvalidDeadline(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DeadlineParseError> for SubmitError {
    fn from(e: DeadlineParseError) -> Self {
        SubmitError::InvalidDeadline(e)
    }
}
