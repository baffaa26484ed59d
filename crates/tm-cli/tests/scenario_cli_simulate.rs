//! Scenario: `tm simulate` plays an order file against the paper broker.
//!
//! A market order whose settlement deadline is already past is force-closed
//! and reported as NORMAL_END; an invalid order is rejected up front.

use std::io::Write;

use predicates::prelude::*;

fn file(body: &str) -> tempfile::NamedTempFile {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    f.write_all(body.as_bytes()).unwrap();
    f
}

#[test]
fn simulate_reports_finished_and_rejected_orders() {
    let config = file("manager:\n  tick_interval_ms: 10\n");
    let orders = file(
        r#"[
          {"kind": "market", "req_id": "mkt-1", "instrument_id": "USD_JPY", "units": 1000,
           "take_profit_price": 152.0, "stop_loss_price": 148.0,
           "valid_period_settlement": "2000-01-01 00:00:00.000000"},
          {"kind": "limit", "req_id": "bad-1", "instrument_id": "USD_JPY", "units": 0,
           "price": 150.0, "take_profit_price": 151.0, "stop_loss_price": 149.0}
        ]"#,
    );

    let mut cmd = assert_cmd::Command::cargo_bin("tm").unwrap();
    cmd.env_remove("RUST_LOG")
        .arg("simulate")
        .arg("--config")
        .arg(config.path())
        .arg("--orders")
        .arg(orders.path())
        .arg("--max-secs")
        .arg("10")
        .assert()
        .success()
        .stdout(predicate::str::contains("rejected req_id=bad-1"))
        .stdout(predicate::str::contains(r#""request_id":"mkt-1""#))
        .stdout(predicate::str::contains(r#""state":"NORMAL_END""#))
        .stdout(predicate::str::contains("finished=1 active=0"));
}

#[test]
fn simulate_with_missing_orders_file_fails() {
    let mut cmd = assert_cmd::Command::cargo_bin("tm").unwrap();
    cmd.arg("simulate")
        .arg("--orders")
        .arg("/no/such/orders.json")
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read orders"));
}
