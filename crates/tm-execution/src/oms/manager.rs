//! OrderManager: owns the active set and runs evaluation passes.
//!
//! `submit`, `tick` and `poll` take `&mut self`, so callers serialise them by
//! construction. The manager never blocks on the broker; outstanding calls are
//! only inspected when a pass visits their record.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::rpc::{BrokerOp, BrokerRpc};
use crate::types::{OrderKind, OrderRequest, RequestId, SubmitError};

use super::state_machine::{OrderRecord, OrderState, Transition, TransitionNote};
use super::triggers::{follow_up_for, issue};

/// A follow-up call issued during a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCall {
    pub request_id: RequestId,
    pub op: BrokerOp,
    /// Order id or trade id the call targets.
    pub target_id: String,
}

/// A record removed from the active set at the end of a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedOrder {
    pub request_id: RequestId,
    pub kind: OrderKind,
    pub state: OrderState,
    pub order_id: Option<String>,
    pub trade_id: Option<String>,
}

/// What one evaluation pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    pub poll: bool,
    /// Only transitions that changed state or carried a note.
    pub transitions: Vec<Transition>,
    pub calls_issued: Vec<IssuedCall>,
    pub finished: Vec<FinishedOrder>,
}

impl PassReport {
    pub fn is_quiet(&self) -> bool {
        self.transitions.is_empty() && self.calls_issued.is_empty() && self.finished.is_empty()
    }
}

pub struct OrderManager<B> {
    broker: B,
    records: Vec<OrderRecord>,
    active_ids: HashSet<RequestId>,
}

impl<B: BrokerRpc> OrderManager<B> {
    pub fn new(broker: B) -> Self {
        Self {
            broker,
            records: Vec::new(),
            active_ids: HashSet::new(),
        }
    }

    /// Validate, issue the create call, and start tracking the order.
    pub fn submit(&mut self, request: OrderRequest) -> Result<RequestId, SubmitError> {
        request.validate()?;
        if self.active_ids.contains(&request.request_id) {
            return Err(SubmitError::DuplicateRequest(request.request_id));
        }

        let call = self.broker.create(request.create_request());
        let record = OrderRecord::new(&request, call);
        info!(
            request_id = %request.request_id,
            kind = %request.kind,
            instrument = %request.instrument_id,
            units = request.units,
            "order submitted"
        );

        self.active_ids.insert(request.request_id.clone());
        self.records.push(record);
        Ok(request.request_id)
    }

    /// Periodic pass.
    pub fn tick(&mut self, now: DateTime<Utc>) -> PassReport {
        self.run_pass(now, false)
    }

    /// On-demand pass: pending states advance regardless of their deadlines.
    pub fn poll(&mut self, now: DateTime<Utc>) -> PassReport {
        self.run_pass(now, true)
    }

    fn run_pass(&mut self, now: DateTime<Utc>, poll: bool) -> PassReport {
        let mut report = PassReport {
            poll,
            ..PassReport::default()
        };

        for record in self.records.iter_mut() {
            let transition = record.evaluate(now, poll);
            log_transition(&transition);

            if let Some(follow_up) = follow_up_for(transition.from, transition.to) {
                match issue(&self.broker, follow_up, record) {
                    Ok(target_id) => {
                        debug!(
                            request_id = %transition.request_id,
                            op = %follow_up.op(),
                            target = %target_id,
                            "follow-up call issued"
                        );
                        report.calls_issued.push(IssuedCall {
                            request_id: transition.request_id.clone(),
                            op: follow_up.op(),
                            target_id,
                        });
                    }
                    Err(e) => {
                        error!(request_id = %transition.request_id, "{e}");
                    }
                }
            }

            if transition.changed() || transition.note.is_some() {
                report.transitions.push(transition);
            }
        }

        // Prune after the whole pass so terminal states show up in the report.
        let mut kept = Vec::with_capacity(self.records.len());
        for record in self.records.drain(..) {
            if record.state().is_terminal() {
                info!(
                    request_id = %record.request_id(),
                    state = %record.state(),
                    order_id = record.order_id().unwrap_or("-"),
                    trade_id = record.trade_id().unwrap_or("-"),
                    "order finished"
                );
                self.active_ids.remove(record.request_id());
                report.finished.push(FinishedOrder {
                    request_id: record.request_id().clone(),
                    kind: record.kind(),
                    state: record.state(),
                    order_id: record.order_id().map(str::to_string),
                    trade_id: record.trade_id().map(str::to_string),
                });
            } else {
                kept.push(record);
            }
        }
        self.records = kept;

        report
    }

    pub fn state_of(&self, request_id: &RequestId) -> Option<OrderState> {
        self.record(request_id).map(OrderRecord::state)
    }

    pub fn record(&self, request_id: &RequestId) -> Option<&OrderRecord> {
        self.records.iter().find(|r| r.request_id() == request_id)
    }

    /// Active records in submission order.
    pub fn records(&self) -> &[OrderRecord] {
        &self.records
    }

    pub fn active_len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn broker(&self) -> &B {
        &self.broker
    }
}

fn log_transition(t: &Transition) {
    match &t.note {
        Some(TransitionNote::CallFailed { op, failure }) => match failure.reason_code() {
            Some(code) => error!(
                request_id = %t.request_id,
                from = %t.from,
                op = %op,
                reason_code = code,
                "broker call failed: {failure}"
            ),
            None => error!(
                request_id = %t.request_id,
                from = %t.from,
                op = %op,
                "broker call failed: {failure}"
            ),
        },
        Some(TransitionNote::CallMissing { expected }) => error!(
            request_id = %t.request_id,
            from = %t.from,
            op = %expected,
            "no outstanding call in a response-wait state"
        ),
        Some(TransitionNote::UnexpectedOrderState(s)) => warn!(
            request_id = %t.request_id,
            reported = %s,
            "unexpected order state from order details"
        ),
        Some(TransitionNote::UnexpectedTradeState(s)) => warn!(
            request_id = %t.request_id,
            reported = %s,
            "unexpected trade state from trade details"
        ),
        Some(TransitionNote::DeadlineElapsed(which)) => info!(
            request_id = %t.request_id,
            from = %t.from,
            to = %t.to,
            deadline = ?which,
            "validity deadline elapsed"
        ),
        Some(TransitionNote::Polled) | None => {}
    }
    if t.changed() {
        debug!(request_id = %t.request_id, from = %t.from, to = %t.to, "state changed");
    }
}
