//! Broker RPC boundary.
//!
//! Every broker operation is asynchronous from the manager's point of view:
//! the adapter returns a [`PendingCall`] immediately and the evaluation pass
//! polls it with [`PendingCall::is_resolved`] / [`PendingCall::result`]. No
//! thread ever blocks waiting for the broker.
//!
//! ```text
//! adapter                         manager (evaluation pass)
//!   │  PendingCall::channel()        │
//!   ├──► PendingCall ───────────────►│ is_resolved()? ── no ──► no change
//!   │                                │        │
//!   └──► CallResolver::resolve(..) ──┼────────┘ yes ─► result() ─► transition
//! ```
//!
//! Adapters backed by an async transport can use [`spawn_call`] to turn a
//! future into a handle.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::oneshot::{self, error::TryRecvError};

use crate::types::OrderKind;

// ---------------------------------------------------------------------------
// BrokerOp
// ---------------------------------------------------------------------------

/// The remote operations this core issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BrokerOp {
    OrderCreate,
    OrderDetails,
    OrderCancel,
    TradeDetails,
    TradeClose,
}

impl BrokerOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrokerOp::OrderCreate => "order_create",
            BrokerOp::OrderDetails => "order_details",
            BrokerOp::OrderCancel => "order_cancel",
            BrokerOp::TradeDetails => "trade_details",
            BrokerOp::TradeClose => "trade_close",
        }
    }
}

impl std::fmt::Display for BrokerOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// CallFailure
// ---------------------------------------------------------------------------

/// Why a broker call did not succeed.
///
/// All variants end the order's tracking; none is retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallFailure {
    /// No usable response: broker unreachable, malformed payload.
    Transport(String),
    /// The broker answered with `success = false`.
    Rejected { reason_code: i32 },
    /// The resolver was dropped without answering.
    Dropped,
}

impl CallFailure {
    pub fn reason_code(&self) -> Option<i32> {
        match self {
            CallFailure::Rejected { reason_code } => Some(*reason_code),
            _ => None,
        }
    }
}

impl std::fmt::Display for CallFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallFailure::Transport(msg) => write!(f, "communication failure: {msg}"),
            CallFailure::Rejected { reason_code } => {
                write!(f, "request rejected by broker [reason code:{reason_code}]")
            }
            CallFailure::Dropped => write!(f, "communication failure: call abandoned"),
        }
    }
}

impl std::error::Error for CallFailure {}

pub type CallOutcome<T> = Result<T, CallFailure>;

// ---------------------------------------------------------------------------
// PendingCall / CallResolver
// ---------------------------------------------------------------------------

enum Slot<T> {
    Waiting(oneshot::Receiver<CallOutcome<T>>),
    Resolved(CallOutcome<T>),
}

/// Receipt for an in-flight broker call.
///
/// Once resolved, the outcome stays readable through [`result`][Self::result]
/// until the handle is dropped.
pub struct PendingCall<T> {
    op: BrokerOp,
    slot: Slot<T>,
}

impl<T> PendingCall<T> {
    /// A handle plus the resolver that completes it.
    pub fn channel(op: BrokerOp) -> (CallResolver<T>, PendingCall<T>) {
        let (tx, rx) = oneshot::channel();
        (
            CallResolver { op, tx },
            PendingCall {
                op,
                slot: Slot::Waiting(rx),
            },
        )
    }

    /// A handle that is already resolved.
    pub fn resolved(op: BrokerOp, outcome: CallOutcome<T>) -> Self {
        Self {
            op,
            slot: Slot::Resolved(outcome),
        }
    }

    pub fn op(&self) -> BrokerOp {
        self.op
    }

    /// Non-blocking check. A dropped resolver counts as resolved with
    /// [`CallFailure::Dropped`].
    pub fn is_resolved(&mut self) -> bool {
        let polled = match &mut self.slot {
            Slot::Resolved(_) => return true,
            Slot::Waiting(rx) => rx.try_recv(),
        };
        match polled {
            Ok(outcome) => self.slot = Slot::Resolved(outcome),
            Err(TryRecvError::Empty) => return false,
            Err(TryRecvError::Closed) => self.slot = Slot::Resolved(Err(CallFailure::Dropped)),
        }
        true
    }

    /// The outcome, if [`is_resolved`][Self::is_resolved] has observed it.
    pub fn result(&self) -> Option<&CallOutcome<T>> {
        match &self.slot {
            Slot::Resolved(outcome) => Some(outcome),
            Slot::Waiting(_) => None,
        }
    }
}

impl<T> std::fmt::Debug for PendingCall<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingCall")
            .field("op", &self.op)
            .field("resolved", &matches!(self.slot, Slot::Resolved(_)))
            .finish()
    }
}

/// Completes exactly one [`PendingCall`].
pub struct CallResolver<T> {
    op: BrokerOp,
    tx: oneshot::Sender<CallOutcome<T>>,
}

impl<T> CallResolver<T> {
    pub fn op(&self) -> BrokerOp {
        self.op
    }

    /// Returns `false` if the handle was already dropped.
    pub fn resolve(self, outcome: CallOutcome<T>) -> bool {
        self.tx.send(outcome).is_ok()
    }

    pub fn succeed(self, value: T) -> bool {
        self.resolve(Ok(value))
    }

    pub fn reject(self, reason_code: i32) -> bool {
        self.resolve(Err(CallFailure::Rejected { reason_code }))
    }
}

impl<T> std::fmt::Debug for CallResolver<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallResolver").field("op", &self.op).finish()
    }
}

/// Drive `fut` on the Tokio runtime and hand back a handle for its outcome.
///
/// Must be called from within a Tokio runtime.
pub fn spawn_call<T, F>(op: BrokerOp, fut: F) -> PendingCall<T>
where
    T: Send + 'static,
    F: Future<Output = CallOutcome<T>> + Send + 'static,
{
    let (resolver, call) = PendingCall::channel(op);
    tokio::spawn(async move {
        let outcome = fut.await;
        // The record may already be gone; nothing to do then.
        let _ = resolver.resolve(outcome);
    });
    call
}

// ---------------------------------------------------------------------------
// Request / response payloads
// ---------------------------------------------------------------------------

/// Broker-agnostic order creation request.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateOrderRequest {
    pub kind: OrderKind,
    pub instrument_id: String,
    pub units: i64,
    /// Limit/stop price; `None` for market orders.
    pub price: Option<f64>,
    pub take_profit_price: f64,
    pub stop_loss_price: f64,
}

/// Accepted creation. `id` is the trade id for market orders and the
/// order id for limit/stop orders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateAck {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelAck {
    pub order_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportedOrderState {
    Filled,
    Pending,
    /// Anything else the broker reports (e.g. `CANCELLED`, `TRIGGERED`).
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderDetails {
    pub state: ReportedOrderState,
    /// Present when the order filled and opened a trade.
    pub opened_trade_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportedTradeState {
    Open,
    Closed,
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeDetails {
    pub state: ReportedTradeState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseAck {
    pub trade_id: String,
}

// ---------------------------------------------------------------------------
// BrokerRpc
// ---------------------------------------------------------------------------

/// The remote operations the order manager depends on.
///
/// Implementations must return without waiting on the broker.
pub trait BrokerRpc {
    fn create(&self, req: CreateOrderRequest) -> PendingCall<CreateAck>;
    fn cancel(&self, order_id: &str) -> PendingCall<CancelAck>;
    fn fetch_order_details(&self, order_id: &str) -> PendingCall<OrderDetails>;
    fn fetch_trade_details(&self, trade_id: &str) -> PendingCall<TradeDetails>;
    fn close_trade(&self, trade_id: &str) -> PendingCall<CloseAck>;
}

impl<B: BrokerRpc + ?Sized> BrokerRpc for Arc<B> {
    fn create(&self, req: CreateOrderRequest) -> PendingCall<CreateAck> {
        (**self).create(req)
    }

    fn cancel(&self, order_id: &str) -> PendingCall<CancelAck> {
        (**self).cancel(order_id)
    }

    fn fetch_order_details(&self, order_id: &str) -> PendingCall<OrderDetails> {
        (**self).fetch_order_details(order_id)
    }

    fn fetch_trade_details(&self, trade_id: &str) -> PendingCall<TradeDetails> {
        (**self).fetch_trade_details(trade_id)
    }

    fn close_trade(&self, trade_id: &str) -> PendingCall<CloseAck> {
        (**self).close_trade(trade_id)
    }
}
