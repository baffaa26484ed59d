//! Hand-driven broker for scenario tests.
//!
//! Every call returns an unresolved handle. Tests resolve them explicitly by
//! target (instrument for creates, order/trade id for the rest), which lets a
//! scenario control exactly which pass observes which answer.

#![allow(dead_code)]

use std::sync::Mutex;

use tm_execution::{
    BrokerOp, BrokerRpc, CallOutcome, CallResolver, CancelAck, CloseAck, CreateAck,
    CreateOrderRequest, OrderDetails, PendingCall, TradeDetails,
};

enum Waiting {
    Create(CallResolver<CreateAck>),
    OrderDetails(CallResolver<OrderDetails>),
    Cancel(CallResolver<CancelAck>),
    TradeDetails(CallResolver<TradeDetails>),
    Close(CallResolver<CloseAck>),
}

#[derive(Default)]
pub struct ScriptedBroker {
    /// Every call made, in order: (op, target).
    calls: Mutex<Vec<(BrokerOp, String)>>,
    waiting: Mutex<Vec<(BrokerOp, String, Waiting)>>,
}

impl ScriptedBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<(BrokerOp, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, op: BrokerOp) -> usize {
        self.calls.lock().unwrap().iter().filter(|(o, _)| *o == op).count()
    }

    pub fn unresolved(&self) -> usize {
        self.waiting.lock().unwrap().len()
    }

    fn record(&self, op: BrokerOp, target: &str, w: Waiting) {
        self.calls.lock().unwrap().push((op, target.to_string()));
        self.waiting.lock().unwrap().push((op, target.to_string(), w));
    }

    fn take(&self, op: BrokerOp, target: &str) -> Waiting {
        let mut waiting = self.waiting.lock().unwrap();
        let idx = waiting
            .iter()
            .position(|(o, t, _)| *o == op && t == target)
            .unwrap_or_else(|| panic!("no unresolved {op} call for {target}"));
        waiting.remove(idx).2
    }

    pub fn resolve_create(&self, instrument: &str, outcome: CallOutcome<CreateAck>) {
        match self.take(BrokerOp::OrderCreate, instrument) {
            Waiting::Create(r) => assert!(r.resolve(outcome)),
            _ => unreachable!(),
        }
    }

    pub fn resolve_order_details(&self, order_id: &str, outcome: CallOutcome<OrderDetails>) {
        match self.take(BrokerOp::OrderDetails, order_id) {
            Waiting::OrderDetails(r) => assert!(r.resolve(outcome)),
            _ => unreachable!(),
        }
    }

    pub fn resolve_cancel(&self, order_id: &str, outcome: CallOutcome<CancelAck>) {
        match self.take(BrokerOp::OrderCancel, order_id) {
            Waiting::Cancel(r) => assert!(r.resolve(outcome)),
            _ => unreachable!(),
        }
    }

    pub fn resolve_trade_details(&self, trade_id: &str, outcome: CallOutcome<TradeDetails>) {
        match self.take(BrokerOp::TradeDetails, trade_id) {
            Waiting::TradeDetails(r) => assert!(r.resolve(outcome)),
            _ => unreachable!(),
        }
    }

    pub fn resolve_close(&self, trade_id: &str, outcome: CallOutcome<CloseAck>) {
        match self.take(BrokerOp::TradeClose, trade_id) {
            Waiting::Close(r) => assert!(r.resolve(outcome)),
            _ => unreachable!(),
        }
    }
}

impl BrokerRpc for ScriptedBroker {
    fn create(&self, req: CreateOrderRequest) -> PendingCall<CreateAck> {
        let (r, call) = PendingCall::channel(BrokerOp::OrderCreate);
        self.record(BrokerOp::OrderCreate, &req.instrument_id, Waiting::Create(r));
        call
    }

    fn cancel(&self, order_id: &str) -> PendingCall<CancelAck> {
        let (r, call) = PendingCall::channel(BrokerOp::OrderCancel);
        self.record(BrokerOp::OrderCancel, order_id, Waiting::Cancel(r));
        call
    }

    fn fetch_order_details(&self, order_id: &str) -> PendingCall<OrderDetails> {
        let (r, call) = PendingCall::channel(BrokerOp::OrderDetails);
        self.record(BrokerOp::OrderDetails, order_id, Waiting::OrderDetails(r));
        call
    }

    fn fetch_trade_details(&self, trade_id: &str) -> PendingCall<TradeDetails> {
        let (r, call) = PendingCall::channel(BrokerOp::TradeDetails);
        self.record(BrokerOp::TradeDetails, trade_id, Waiting::TradeDetails(r));
        call
    }

    fn close_trade(&self, trade_id: &str) -> PendingCall<CloseAck> {
        let (r, call) = PendingCall::channel(BrokerOp::TradeClose);
        self.record(BrokerOp::TradeClose, trade_id, Waiting::Close(r));
        call
    }
}
