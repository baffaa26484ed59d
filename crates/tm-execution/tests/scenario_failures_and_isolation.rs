//! Scenario: Failed calls and record isolation
//!
//! Any failed broker call ends the record in ABNORMAL_END; it is pruned after
//! that pass and never generates another call. Records share nothing, so one
//! order's failure leaves its neighbours untouched.

mod support;

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use support::ScriptedBroker;
use tm_execution::{
    BrokerOp, CallFailure, CreateAck, OrderDetails, OrderManager, OrderRequest, OrderState,
    ReportedOrderState, SubmitError, TransitionNote,
};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()
}

#[test]
fn rejected_create_ends_abnormally_and_stops_calling() {
    let broker = Arc::new(ScriptedBroker::new());
    let mut mgr = OrderManager::new(Arc::clone(&broker));
    let id = mgr
        .submit(OrderRequest::limit("r-1", "USD_JPY", 1000, 150.0, 151.0, 149.0))
        .unwrap();

    broker.resolve_create("USD_JPY", Err(CallFailure::Rejected { reason_code: 13 }));
    let report = mgr.poll(t0());
    assert_eq!(report.transitions.len(), 1);
    assert_eq!(
        report.transitions[0].note,
        Some(TransitionNote::CallFailed {
            op: BrokerOp::OrderCreate,
            failure: CallFailure::Rejected { reason_code: 13 },
        })
    );
    assert_eq!(report.finished[0].state, OrderState::AbnormalEnd);
    assert_eq!(mgr.state_of(&id), None);

    for _ in 0..3 {
        mgr.poll(t0());
    }
    assert_eq!(broker.calls().len(), 1, "only the create was ever issued");
}

#[test]
fn transport_failure_on_details_is_treated_like_rejection() {
    let broker = Arc::new(ScriptedBroker::new());
    let mut mgr = OrderManager::new(Arc::clone(&broker));
    mgr.submit(OrderRequest::limit("r-2", "USD_JPY", 1000, 150.0, 151.0, 149.0))
        .unwrap();
    broker.resolve_create("USD_JPY", Ok(CreateAck { id: "O-2".into() }));
    mgr.tick(t0());
    mgr.poll(t0());

    broker.resolve_order_details("O-2", Err(CallFailure::Transport("timeout".into())));
    let report = mgr.tick(t0());
    assert_eq!(report.finished[0].state, OrderState::AbnormalEnd);
    assert_eq!(report.finished[0].order_id.as_deref(), Some("O-2"));
    assert!(mgr.is_empty());
}

#[test]
fn two_orders_progress_independently() {
    let broker = Arc::new(ScriptedBroker::new());
    let mut mgr = OrderManager::new(Arc::clone(&broker));
    let a = mgr
        .submit(OrderRequest::limit("a", "USD_JPY", 1000, 150.0, 151.0, 149.0))
        .unwrap();
    let b = mgr
        .submit(OrderRequest::market("b", "EUR_USD", 500, 1.2, 1.0))
        .unwrap();

    broker.resolve_create("EUR_USD", Ok(CreateAck { id: "T-B".into() }));
    mgr.tick(t0());
    assert_eq!(mgr.state_of(&a), Some(OrderState::WaitCreateRsp));
    assert_eq!(mgr.state_of(&b), Some(OrderState::SettlementPending));

    broker.resolve_create("USD_JPY", Err(CallFailure::Rejected { reason_code: 1 }));
    let report = mgr.tick(t0());
    assert_eq!(report.finished.len(), 1);
    assert_eq!(report.finished[0].request_id, a);
    assert_eq!(mgr.state_of(&b), Some(OrderState::SettlementPending));
    assert_eq!(mgr.active_len(), 1);
}

#[test]
fn records_are_visited_in_submission_order() {
    let broker = Arc::new(ScriptedBroker::new());
    let mut mgr = OrderManager::new(Arc::clone(&broker));
    for (id, instr) in [("x", "I1"), ("y", "I2"), ("z", "I3")] {
        mgr.submit(OrderRequest::limit(id, instr, 1, 1.0, 1.1, 0.9))
            .unwrap();
    }
    for (instr, oid) in [("I3", "O3"), ("I1", "O1"), ("I2", "O2")] {
        broker.resolve_create(instr, Ok(CreateAck { id: oid.into() }));
    }
    mgr.tick(t0());
    let report = mgr.poll(t0());
    let targets: Vec<_> = report
        .calls_issued
        .iter()
        .map(|c| c.target_id.as_str())
        .collect();
    assert_eq!(targets, ["O1", "O2", "O3"]);
    let order: Vec<_> = mgr.records().iter().map(|r| r.request_id().as_str()).collect();
    assert_eq!(order, ["x", "y", "z"]);
}

#[test]
fn at_most_one_outstanding_call_per_record() {
    let broker = Arc::new(ScriptedBroker::new());
    let mut mgr = OrderManager::new(Arc::clone(&broker));
    mgr.submit(OrderRequest::limit("one", "USD_JPY", 1000, 150.0, 151.0, 149.0))
        .unwrap();
    broker.resolve_create("USD_JPY", Ok(CreateAck { id: "O-1".into() }));

    for round in 0..4 {
        mgr.poll(t0());
        mgr.tick(t0());
        assert!(broker.unresolved() <= 1, "round {round}");
        if round == 1 {
            broker.resolve_order_details(
                "O-1",
                Ok(OrderDetails {
                    state: ReportedOrderState::Pending,
                    opened_trade_id: None,
                }),
            );
        }
    }
    for rec in mgr.records() {
        if rec.state().is_terminal() || !rec.state().awaits_response() {
            assert!(!rec.has_outstanding_call());
        }
    }
}

#[test]
fn invalid_submissions_create_no_record_and_no_call() {
    let broker = Arc::new(ScriptedBroker::new());
    let mut mgr = OrderManager::new(Arc::clone(&broker));

    let mut no_price = OrderRequest::stop("s", "USD_JPY", 1000, 150.0, 151.0, 149.0);
    no_price.price = None;
    assert!(matches!(
        mgr.submit(no_price),
        Err(SubmitError::MissingPrice { .. })
    ));
    assert_eq!(
        mgr.submit(OrderRequest::market("m", "USD_JPY", 0, 151.0, 149.0)),
        Err(SubmitError::ZeroUnits)
    );
    assert!(mgr.is_empty());
    assert!(broker.calls().is_empty());
}
