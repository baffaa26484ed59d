//! tm-execution
//!
//! Order lifecycle core for a trade manager:
//! - `rpc`: the non-blocking broker boundary (`BrokerRpc`, `PendingCall`)
//! - `types`: validated order requests
//! - `oms`: per-order state machine, trigger table and `OrderManager`
//!
//! Nothing here blocks on the broker or reads the clock; callers pass `now`
//! into every evaluation pass.

mod rpc;
mod types;

pub mod oms;

pub use rpc::{
    spawn_call, BrokerOp, BrokerRpc, CallFailure, CallOutcome, CallResolver, CancelAck, CloseAck,
    CreateAck, CreateOrderRequest, OrderDetails, PendingCall, ReportedOrderState,
    ReportedTradeState, TradeDetails,
};
pub use types::{OrderKind, OrderRequest, RequestId, SubmitError};

pub use oms::manager::{FinishedOrder, IssuedCall, OrderManager, PassReport};
pub use oms::state_machine::{Deadline, OrderRecord, OrderState, Transition, TransitionNote};
pub use oms::triggers::{FollowUp, TRIGGER_TABLE};
