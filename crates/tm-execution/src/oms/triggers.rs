//! Follow-up calls fired on specific state changes.
//!
//! The state machine only decides *where* a record goes; this table decides
//! which broker call must be in flight once it gets there.

use crate::rpc::{BrokerOp, BrokerRpc};

use super::state_machine::{OrderRecord, OrderState, OutstandingCall};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUp {
    FetchOrderDetails,
    CancelOrder,
    FetchTradeDetails,
    CloseTrade,
}

impl FollowUp {
    pub fn op(&self) -> BrokerOp {
        match self {
            FollowUp::FetchOrderDetails => BrokerOp::OrderDetails,
            FollowUp::CancelOrder => BrokerOp::OrderCancel,
            FollowUp::FetchTradeDetails => BrokerOp::TradeDetails,
            FollowUp::CloseTrade => BrokerOp::TradeClose,
        }
    }
}

/// `(from, to) -> follow-up` for every transition that needs a broker call.
pub const TRIGGER_TABLE: [(OrderState, OrderState, FollowUp); 4] = [
    (
        OrderState::NewPending,
        OrderState::DetailsWaitRsp,
        FollowUp::FetchOrderDetails,
    ),
    (
        OrderState::DetailsWaitRsp,
        OrderState::CancelWaitRsp,
        FollowUp::CancelOrder,
    ),
    (
        OrderState::SettlementPending,
        OrderState::TradeDetailsWaitRsp,
        FollowUp::FetchTradeDetails,
    ),
    (
        OrderState::TradeDetailsWaitRsp,
        OrderState::CloseWaitRsp,
        FollowUp::CloseTrade,
    ),
];

pub fn follow_up_for(from: OrderState, to: OrderState) -> Option<FollowUp> {
    TRIGGER_TABLE
        .iter()
        .find(|(f, t, _)| *f == from && *t == to)
        .map(|(_, _, follow_up)| *follow_up)
}

/// The record lacks the broker id a follow-up needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissingBrokerId {
    pub follow_up: FollowUp,
}

impl std::fmt::Display for MissingBrokerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let which = match self.follow_up {
            FollowUp::FetchOrderDetails | FollowUp::CancelOrder => "order id",
            FollowUp::FetchTradeDetails | FollowUp::CloseTrade => "trade id",
        };
        write!(f, "cannot issue {}: no {which}", self.follow_up.op())
    }
}

impl std::error::Error for MissingBrokerId {}

/// Issue `follow_up` against `broker` and attach the handle to `record`.
///
/// Returns the broker id the call targets. If the id is missing the record
/// is aborted to `AbnormalEnd` and no call is made.
pub fn issue<B: BrokerRpc + ?Sized>(
    broker: &B,
    follow_up: FollowUp,
    record: &mut OrderRecord,
) -> Result<String, MissingBrokerId> {
    let target = match follow_up {
        FollowUp::FetchOrderDetails | FollowUp::CancelOrder => record.order_id(),
        FollowUp::FetchTradeDetails | FollowUp::CloseTrade => record.trade_id(),
    };
    let Some(target) = target.map(str::to_string) else {
        record.abort();
        return Err(MissingBrokerId { follow_up });
    };

    let call = match follow_up {
        FollowUp::FetchOrderDetails => {
            OutstandingCall::OrderDetails(broker.fetch_order_details(&target))
        }
        FollowUp::CancelOrder => OutstandingCall::Cancel(broker.cancel(&target)),
        FollowUp::FetchTradeDetails => {
            OutstandingCall::TradeDetails(broker.fetch_trade_details(&target))
        }
        FollowUp::CloseTrade => OutstandingCall::Close(broker.close_trade(&target)),
    };
    record.attach(call);
    Ok(target)
}
