//! Scenario: Limit/Stop order lifecycle
//!
//! A limit order waits in NEW_PENDING until polled or until its new-order
//! deadline passes. A details call then decides: filled opens a trade,
//! still-pending re-arms (before the deadline) or cancels (after it).

mod support;

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use support::ScriptedBroker;
use tm_execution::{
    BrokerOp, CancelAck, CreateAck, OrderDetails, OrderManager, OrderRequest, OrderState,
    ReportedOrderState, ReportedTradeState, RequestId, TradeDetails,
};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()
}

fn accepted_limit(
    broker: &Arc<ScriptedBroker>,
    mgr: &mut OrderManager<Arc<ScriptedBroker>>,
    req: OrderRequest,
) -> RequestId {
    let instrument = req.instrument_id.clone();
    let id = mgr.submit(req).unwrap();
    broker.resolve_create(&instrument, Ok(CreateAck { id: "ORD-1".into() }));
    mgr.tick(t0());
    assert_eq!(mgr.state_of(&id), Some(OrderState::NewPending));
    id
}

fn pending() -> OrderDetails {
    OrderDetails {
        state: ReportedOrderState::Pending,
        opened_trade_id: None,
    }
}

#[test]
fn poll_without_deadline_issues_exactly_one_details_call() {
    let broker = Arc::new(ScriptedBroker::new());
    let mut mgr = OrderManager::new(Arc::clone(&broker));
    let id = accepted_limit(
        &broker,
        &mut mgr,
        OrderRequest::limit("lim-1", "USD_JPY", 1000, 150.0, 151.0, 149.0),
    );
    assert_eq!(mgr.record(&id).unwrap().order_id(), Some("ORD-1"));

    // No deadline: ticks alone never move it.
    for days in [1, 30, 365] {
        mgr.tick(t0() + Duration::days(days));
    }
    assert_eq!(mgr.state_of(&id), Some(OrderState::NewPending));
    assert_eq!(broker.count(BrokerOp::OrderDetails), 0);

    let report = mgr.poll(t0());
    assert_eq!(mgr.state_of(&id), Some(OrderState::DetailsWaitRsp));
    assert_eq!(report.calls_issued.len(), 1);
    assert_eq!(broker.count(BrokerOp::OrderDetails), 1);

    // Further polls while the call is outstanding issue nothing new.
    mgr.poll(t0());
    mgr.poll(t0());
    assert_eq!(broker.count(BrokerOp::OrderDetails), 1);
    assert_eq!(
        mgr.record(&id).unwrap().outstanding_op(),
        Some(BrokerOp::OrderDetails)
    );
}

#[test]
fn new_order_deadline_triggers_details_on_plain_tick() {
    let broker = Arc::new(ScriptedBroker::new());
    let mut mgr = OrderManager::new(Arc::clone(&broker));
    let deadline = t0() + Duration::seconds(30);
    let id = accepted_limit(
        &broker,
        &mut mgr,
        OrderRequest::stop("stp-1", "EUR_USD", -500, 1.08, 1.05, 1.10)
            .with_new_order_deadline(deadline),
    );

    mgr.tick(deadline - Duration::milliseconds(1));
    assert_eq!(mgr.state_of(&id), Some(OrderState::NewPending));

    mgr.tick(deadline);
    assert_eq!(mgr.state_of(&id), Some(OrderState::DetailsWaitRsp));
    assert_eq!(broker.count(BrokerOp::OrderDetails), 1);
}

#[test]
fn still_pending_round_trips_and_rearms_with_a_new_call() {
    let broker = Arc::new(ScriptedBroker::new());
    let mut mgr = OrderManager::new(Arc::clone(&broker));
    let deadline = t0() + Duration::hours(1);
    let id = accepted_limit(
        &broker,
        &mut mgr,
        OrderRequest::limit("lim-2", "USD_JPY", 1000, 150.0, 151.0, 149.0)
            .with_new_order_deadline(deadline),
    );

    mgr.poll(t0());
    broker.resolve_order_details("ORD-1", Ok(pending()));
    let report = mgr.tick(t0());
    assert_eq!(report.transitions[0].to, OrderState::NewPending);
    assert!(!mgr.record(&id).unwrap().has_outstanding_call());

    mgr.poll(t0());
    assert_eq!(mgr.state_of(&id), Some(OrderState::DetailsWaitRsp));
    assert_eq!(
        broker.count(BrokerOp::OrderDetails),
        2,
        "re-trigger must issue a fresh details call"
    );
    assert_eq!(broker.unresolved(), 1);
}

#[test]
fn still_pending_after_deadline_cancels_and_ends_normally() {
    let broker = Arc::new(ScriptedBroker::new());
    let mut mgr = OrderManager::new(Arc::clone(&broker));
    let deadline = t0() + Duration::minutes(1);
    let id = accepted_limit(
        &broker,
        &mut mgr,
        OrderRequest::limit("lim-3", "AUD_USD", 2000, 0.65, 0.66, 0.64)
            .with_new_order_deadline(deadline),
    );

    mgr.tick(deadline);
    broker.resolve_order_details("ORD-1", Ok(pending()));
    let report = mgr.tick(deadline);
    assert_eq!(mgr.state_of(&id), Some(OrderState::CancelWaitRsp));
    assert_eq!(report.calls_issued[0].op, BrokerOp::OrderCancel);
    assert_eq!(report.calls_issued[0].target_id, "ORD-1");

    broker.resolve_cancel(
        "ORD-1",
        Ok(CancelAck {
            order_id: "ORD-1".into(),
        }),
    );
    let report = mgr.tick(deadline);
    assert_eq!(report.finished.len(), 1);
    assert_eq!(report.finished[0].state, OrderState::NormalEnd);
    assert_eq!(report.finished[0].order_id.as_deref(), Some("ORD-1"));
    assert_eq!(report.finished[0].trade_id, None);
    assert!(mgr.is_empty());
}

#[test]
fn filled_order_moves_to_trade_tracking() {
    let broker = Arc::new(ScriptedBroker::new());
    let mut mgr = OrderManager::new(Arc::clone(&broker));
    let id = accepted_limit(
        &broker,
        &mut mgr,
        OrderRequest::limit("lim-4", "USD_JPY", 1000, 150.0, 151.0, 149.0),
    );

    mgr.poll(t0());
    broker.resolve_order_details(
        "ORD-1",
        Ok(OrderDetails {
            state: ReportedOrderState::Filled,
            opened_trade_id: Some("TRD-42".into()),
        }),
    );
    mgr.tick(t0());
    let rec = mgr.record(&id).unwrap();
    assert_eq!(rec.state(), OrderState::SettlementPending);
    assert_eq!(rec.order_id(), Some("ORD-1"));
    assert_eq!(rec.trade_id(), Some("TRD-42"));

    let report = mgr.poll(t0());
    assert_eq!(report.calls_issued[0].target_id, "TRD-42");
    broker.resolve_trade_details(
        "TRD-42",
        Ok(TradeDetails {
            state: ReportedTradeState::Other("UNKNOWN".into()),
        }),
    );
    mgr.tick(t0());
    assert_eq!(
        mgr.state_of(&id),
        Some(OrderState::SettlementPending),
        "unexpected trade state re-arms"
    );
}

#[test]
fn unexpected_order_state_holds_without_new_calls() {
    let broker = Arc::new(ScriptedBroker::new());
    let mut mgr = OrderManager::new(Arc::clone(&broker));
    let id = accepted_limit(
        &broker,
        &mut mgr,
        OrderRequest::limit("lim-5", "USD_JPY", 1000, 150.0, 151.0, 149.0),
    );
    mgr.poll(t0());
    broker.resolve_order_details(
        "ORD-1",
        Ok(OrderDetails {
            state: ReportedOrderState::Other("TRIGGERED".into()),
            opened_trade_id: None,
        }),
    );
    for _ in 0..3 {
        mgr.poll(t0());
    }
    assert_eq!(mgr.state_of(&id), Some(OrderState::DetailsWaitRsp));
    assert_eq!(broker.count(BrokerOp::OrderDetails), 1);
}
