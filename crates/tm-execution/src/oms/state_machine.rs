//! Per-order state machine.
//!
//! # Design
//!
//! An [`OrderRecord`] tracks one order from the create call to a terminal
//! state. [`OrderRecord::evaluate`] is the whole transition function: it reads
//! the record's outstanding call (if any), the current time and the poll flag,
//! moves the record to its next state, and returns a [`Transition`]. It never
//! issues broker calls and never logs; the manager looks the transition up in
//! the trigger table and does both.
//!
//! # State diagram
//!
//! ```text
//!                    create ok (market)
//!   WaitCreateRsp ───────────────────────────────────┐
//!        │ create ok (limit/stop)                    ▼
//!        ▼            poll | new deadline     SettlementPending ◄────────┐
//!    NewPending ─────────────────────► DetailsWaitRsp   │ poll | settle  │ open, before
//!        ▲  pending, before deadline       │  │  │ filled│ deadline      │ deadline / other
//!        └─────────────────────────────────┘  │  └──────►│               │
//!                          pending, deadline  ▼          ▼               │
//!                                    CancelWaitRsp   TradeDetailsWaitRsp ┘
//!                                          │           │ closed   │ open, deadline
//!                                       ok ▼        ok ▼          ▼
//!                                        NormalEnd ◄──────── CloseWaitRsp
//!
//!   any failed call ───────────────────────────────────────► AbnormalEnd
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::rpc::{
    BrokerOp, CallFailure, CallOutcome, CancelAck, CloseAck, CreateAck, OrderDetails,
    PendingCall, ReportedOrderState, ReportedTradeState, TradeDetails,
};
use crate::types::{OrderKind, OrderRequest, RequestId};

// ---------------------------------------------------------------------------
// OrderState
// ---------------------------------------------------------------------------

/// Lifecycle states. The numeric codes match the broker-side log format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderState {
    /// (1) Waiting for the broker to accept or reject the new order.
    WaitCreateRsp,
    /// (2) Accepted, not yet filled. Waiting for a poll or the new-order deadline.
    NewPending,
    /// (3) Asking the broker whether the pending order has filled.
    DetailsWaitRsp,
    /// (4) New-order deadline passed while pending; cancelling.
    CancelWaitRsp,
    /// (5) A trade is open. Waiting for a poll or the settlement deadline.
    SettlementPending,
    /// (6) Asking the broker whether the open trade has closed.
    TradeDetailsWaitRsp,
    /// (7) Settlement deadline passed while the trade was open; closing.
    CloseWaitRsp,
    /// (254) Lifecycle completed. **Terminal.**
    NormalEnd,
    /// (255) Lifecycle aborted by a failed call. **Terminal.**
    AbnormalEnd,
}

impl OrderState {
    pub fn code(&self) -> u8 {
        match self {
            OrderState::WaitCreateRsp => 1,
            OrderState::NewPending => 2,
            OrderState::DetailsWaitRsp => 3,
            OrderState::CancelWaitRsp => 4,
            OrderState::SettlementPending => 5,
            OrderState::TradeDetailsWaitRsp => 6,
            OrderState::CloseWaitRsp => 7,
            OrderState::NormalEnd => 254,
            OrderState::AbnormalEnd => 255,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderState::NormalEnd | OrderState::AbnormalEnd)
    }

    /// `true` for the `…WAIT_RSP` states, which always own an outstanding call.
    pub fn awaits_response(&self) -> bool {
        matches!(
            self,
            OrderState::WaitCreateRsp
                | OrderState::DetailsWaitRsp
                | OrderState::CancelWaitRsp
                | OrderState::TradeDetailsWaitRsp
                | OrderState::CloseWaitRsp
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderState::WaitCreateRsp => "WAIT_CREATE_RSP",
            OrderState::NewPending => "NEW_PENDING",
            OrderState::DetailsWaitRsp => "DETAILS_WAIT_RSP",
            OrderState::CancelWaitRsp => "CANCEL_WAIT_RSP",
            OrderState::SettlementPending => "SETTLEMENT_PENDING",
            OrderState::TradeDetailsWaitRsp => "TRADE_DETAILS_WAIT_RSP",
            OrderState::CloseWaitRsp => "CLOSE_WAIT_RSP",
            OrderState::NormalEnd => "NORMAL_END",
            OrderState::AbnormalEnd => "ABNORMAL_END",
        }
    }
}

impl std::fmt::Display for OrderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.as_str(), self.code())
    }
}

// ---------------------------------------------------------------------------
// OutstandingCall
// ---------------------------------------------------------------------------

/// The one in-flight broker call a record may own.
#[derive(Debug)]
pub enum OutstandingCall {
    Create(PendingCall<CreateAck>),
    OrderDetails(PendingCall<OrderDetails>),
    Cancel(PendingCall<CancelAck>),
    TradeDetails(PendingCall<TradeDetails>),
    Close(PendingCall<CloseAck>),
}

impl OutstandingCall {
    pub fn op(&self) -> BrokerOp {
        match self {
            OutstandingCall::Create(c) => c.op(),
            OutstandingCall::OrderDetails(c) => c.op(),
            OutstandingCall::Cancel(c) => c.op(),
            OutstandingCall::TradeDetails(c) => c.op(),
            OutstandingCall::Close(c) => c.op(),
        }
    }
}

/// Poll `call`; `Some(outcome)` once it has resolved.
fn resolved<T: Clone>(call: &mut PendingCall<T>) -> Option<CallOutcome<T>> {
    if call.is_resolved() {
        call.result().cloned()
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Transition
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deadline {
    NewOrder,
    Settlement,
}

/// Why a transition happened, when that is worth reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionNote {
    /// The outstanding call failed; the record is now `AbnormalEnd`.
    CallFailed { op: BrokerOp, failure: CallFailure },
    /// A `…WAIT_RSP` state was found without its call.
    CallMissing { expected: BrokerOp },
    /// A pending state advanced because of a poll signal.
    Polled,
    DeadlineElapsed(Deadline),
    /// Order details reported a state other than FILLED/PENDING.
    UnexpectedOrderState(String),
    /// Trade details reported a state other than OPEN/CLOSED.
    UnexpectedTradeState(String),
}

/// Result of one [`OrderRecord::evaluate`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub request_id: RequestId,
    pub from: OrderState,
    pub to: OrderState,
    pub note: Option<TransitionNote>,
}

impl Transition {
    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

// ---------------------------------------------------------------------------
// OrderRecord
// ---------------------------------------------------------------------------

/// One tracked order. Owned exclusively by the order manager.
#[derive(Debug)]
pub struct OrderRecord {
    request_id: RequestId,
    kind: OrderKind,
    instrument_id: String,
    order_id: Option<String>,
    trade_id: Option<String>,
    state: OrderState,
    call: Option<OutstandingCall>,
    new_order_deadline: Option<DateTime<Utc>>,
    settlement_deadline: Option<DateTime<Utc>>,
}

impl OrderRecord {
    /// Build a record in `WaitCreateRsp` around the already-issued create call.
    pub fn new(request: &OrderRequest, create_call: PendingCall<CreateAck>) -> Self {
        Self {
            request_id: request.request_id.clone(),
            kind: request.kind,
            instrument_id: request.instrument_id.clone(),
            order_id: None,
            trade_id: None,
            state: OrderState::WaitCreateRsp,
            call: Some(OutstandingCall::Create(create_call)),
            new_order_deadline: request.new_order_deadline,
            settlement_deadline: request.settlement_deadline,
        }
    }

    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    pub fn kind(&self) -> OrderKind {
        self.kind
    }

    pub fn instrument_id(&self) -> &str {
        &self.instrument_id
    }

    /// Broker order id; set once creation of a limit/stop order succeeds.
    pub fn order_id(&self) -> Option<&str> {
        self.order_id.as_deref()
    }

    /// Broker trade id; set once a trade opens.
    pub fn trade_id(&self) -> Option<&str> {
        self.trade_id.as_deref()
    }

    pub fn state(&self) -> OrderState {
        self.state
    }

    pub fn new_order_deadline(&self) -> Option<DateTime<Utc>> {
        self.new_order_deadline
    }

    pub fn settlement_deadline(&self) -> Option<DateTime<Utc>> {
        self.settlement_deadline
    }

    pub fn outstanding_op(&self) -> Option<BrokerOp> {
        self.call.as_ref().map(OutstandingCall::op)
    }

    pub fn has_outstanding_call(&self) -> bool {
        self.call.is_some()
    }

    /// Attach the follow-up call issued for the transition just evaluated.
    pub(crate) fn attach(&mut self, call: OutstandingCall) {
        debug_assert!(self.call.is_none(), "record already owns a call");
        self.call = Some(call);
    }

    /// End tracking when a follow-up call could not be issued.
    pub(crate) fn abort(&mut self) {
        self.call = None;
        self.state = OrderState::AbnormalEnd;
    }

    /// Run the transition function once.
    ///
    /// Deadlines are inclusive: `now >= deadline` counts as elapsed. Without a
    /// deadline the two pending states only advance on `poll`.
    pub fn evaluate(&mut self, now: DateTime<Utc>, poll: bool) -> Transition {
        let from = self.state;
        let note = match self.state {
            OrderState::WaitCreateRsp => self.on_create_rsp(),
            OrderState::NewPending => self.on_new_pending(now, poll),
            OrderState::DetailsWaitRsp => self.on_order_details_rsp(now),
            OrderState::CancelWaitRsp => self.on_cancel_rsp(),
            OrderState::SettlementPending => self.on_settlement_pending(now, poll),
            OrderState::TradeDetailsWaitRsp => self.on_trade_details_rsp(now),
            OrderState::CloseWaitRsp => self.on_close_rsp(),
            OrderState::NormalEnd | OrderState::AbnormalEnd => None,
        };
        Transition {
            request_id: self.request_id.clone(),
            from,
            to: self.state,
            note,
        }
    }

    // -- state 1 -------------------------------------------------------------

    fn on_create_rsp(&mut self) -> Option<TransitionNote> {
        let outcome = match self.call.as_mut() {
            Some(OutstandingCall::Create(call)) => resolved(call)?,
            _ => return self.call_missing(BrokerOp::OrderCreate),
        };
        match outcome {
            Err(failure) => self.fail(BrokerOp::OrderCreate, failure),
            Ok(ack) => {
                self.call = None;
                if self.kind == OrderKind::Market {
                    self.set_trade_id(ack.id);
                    self.state = OrderState::SettlementPending;
                } else {
                    self.set_order_id(ack.id);
                    self.state = OrderState::NewPending;
                }
                None
            }
        }
    }

    // -- state 2 -------------------------------------------------------------

    fn on_new_pending(&mut self, now: DateTime<Utc>, poll: bool) -> Option<TransitionNote> {
        if poll {
            self.state = OrderState::DetailsWaitRsp;
            Some(TransitionNote::Polled)
        } else if elapsed(self.new_order_deadline, now) {
            self.state = OrderState::DetailsWaitRsp;
            Some(TransitionNote::DeadlineElapsed(Deadline::NewOrder))
        } else {
            None
        }
    }

    // -- state 3 -------------------------------------------------------------

    fn on_order_details_rsp(&mut self, now: DateTime<Utc>) -> Option<TransitionNote> {
        let outcome = match self.call.as_mut() {
            Some(OutstandingCall::OrderDetails(call)) => resolved(call)?,
            _ => return self.call_missing(BrokerOp::OrderDetails),
        };
        let details = match outcome {
            Err(failure) => return self.fail(BrokerOp::OrderDetails, failure),
            Ok(details) => details,
        };
        match details.state {
            ReportedOrderState::Filled => match details.opened_trade_id {
                Some(trade_id) => {
                    self.call = None;
                    self.set_trade_id(trade_id);
                    self.state = OrderState::SettlementPending;
                    None
                }
                None => self.fail(
                    BrokerOp::OrderDetails,
                    CallFailure::Transport("filled order reported without a trade id".into()),
                ),
            },
            ReportedOrderState::Pending => {
                self.call = None;
                if elapsed(self.new_order_deadline, now) {
                    self.state = OrderState::CancelWaitRsp;
                    Some(TransitionNote::DeadlineElapsed(Deadline::NewOrder))
                } else {
                    self.state = OrderState::NewPending;
                    None
                }
            }
            // Stay put; the resolved call stays attached.
            ReportedOrderState::Other(s) => Some(TransitionNote::UnexpectedOrderState(s)),
        }
    }

    // -- state 4 -------------------------------------------------------------

    fn on_cancel_rsp(&mut self) -> Option<TransitionNote> {
        let outcome = match self.call.as_mut() {
            Some(OutstandingCall::Cancel(call)) => resolved(call)?,
            _ => return self.call_missing(BrokerOp::OrderCancel),
        };
        match outcome {
            Err(failure) => self.fail(BrokerOp::OrderCancel, failure),
            Ok(_) => self.finish(),
        }
    }

    // -- state 5 -------------------------------------------------------------

    fn on_settlement_pending(&mut self, now: DateTime<Utc>, poll: bool) -> Option<TransitionNote> {
        if poll {
            self.state = OrderState::TradeDetailsWaitRsp;
            Some(TransitionNote::Polled)
        } else if elapsed(self.settlement_deadline, now) {
            self.state = OrderState::TradeDetailsWaitRsp;
            Some(TransitionNote::DeadlineElapsed(Deadline::Settlement))
        } else {
            None
        }
    }

    // -- state 6 -------------------------------------------------------------

    fn on_trade_details_rsp(&mut self, now: DateTime<Utc>) -> Option<TransitionNote> {
        let outcome = match self.call.as_mut() {
            Some(OutstandingCall::TradeDetails(call)) => resolved(call)?,
            _ => return self.call_missing(BrokerOp::TradeDetails),
        };
        let details = match outcome {
            Err(failure) => return self.fail(BrokerOp::TradeDetails, failure),
            Ok(details) => details,
        };
        self.call = None;
        match details.state {
            ReportedTradeState::Closed => {
                self.state = OrderState::NormalEnd;
                None
            }
            ReportedTradeState::Open if elapsed(self.settlement_deadline, now) => {
                self.state = OrderState::CloseWaitRsp;
                Some(TransitionNote::DeadlineElapsed(Deadline::Settlement))
            }
            ReportedTradeState::Open => {
                self.state = OrderState::SettlementPending;
                None
            }
            ReportedTradeState::Other(s) => {
                self.state = OrderState::SettlementPending;
                Some(TransitionNote::UnexpectedTradeState(s))
            }
        }
    }

    // -- state 7 -------------------------------------------------------------

    fn on_close_rsp(&mut self) -> Option<TransitionNote> {
        let outcome = match self.call.as_mut() {
            Some(OutstandingCall::Close(call)) => resolved(call)?,
            _ => return self.call_missing(BrokerOp::TradeClose),
        };
        match outcome {
            Err(failure) => self.fail(BrokerOp::TradeClose, failure),
            Ok(_) => self.finish(),
        }
    }

    // -- helpers -------------------------------------------------------------

    fn finish(&mut self) -> Option<TransitionNote> {
        self.call = None;
        self.state = OrderState::NormalEnd;
        None
    }

    fn fail(&mut self, op: BrokerOp, failure: CallFailure) -> Option<TransitionNote> {
        self.call = None;
        self.state = OrderState::AbnormalEnd;
        Some(TransitionNote::CallFailed { op, failure })
    }

    fn call_missing(&mut self, expected: BrokerOp) -> Option<TransitionNote> {
        self.abort();
        Some(TransitionNote::CallMissing { expected })
    }

    fn set_order_id(&mut self, id: String) {
        if self.order_id.is_none() {
            self.order_id = Some(id);
        }
    }

    fn set_trade_id(&mut self, id: String) {
        if self.trade_id.is_none() {
            self.trade_id = Some(id);
        }
    }
}

fn elapsed(deadline: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    deadline.is_some_and(|d| now >= d)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
