//! `tm simulate`: boot the runtime against the paper broker and play an
//! order file through it.
//!
//! Output is line oriented on stdout:
//! - `rejected req_id=... reason=...` for submissions that fail validation
//! - one JSON `OrderEvent` per finished order
//! - `active req_id=... state=...` for orders still open at the end
//! - a final `finished=N active=M` summary

use std::collections::HashSet;
use std::fs;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde_json::Value;
use tm_broker_paper::{PaperBroker, Resolution};
use tm_config::{report_unused_keys, LoadedConfig, TradeManagerConfig, UnusedKeyPolicy};
use tm_execution::{OrderManager, RequestId};
use tm_runtime::{spawn_order_manager, OrderEvent, RuntimeConfig};
use tm_schemas::{InboundOrder, PollSignal};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use uuid::Uuid;

pub async fn run(
    loaded: &LoadedConfig,
    settings: &TradeManagerConfig,
    orders_path: &str,
    max_secs: u64,
) -> Result<()> {
    let report = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Warn)?;
    for ptr in &report.unused_leaf_pointers {
        warn!(key = %ptr, "unused config key");
    }
    info!(config_hash = %loaded.config_hash, "config loaded");

    let orders = read_orders(orders_path)?;

    let broker = PaperBroker::new()
        .with_resolution(Resolution::from_latency_ms(settings.paper.latency_ms))
        .with_fill_pending_on_fetch(settings.paper.fill_pending_on_fetch);
    let cfg = RuntimeConfig::from_settings(settings);
    let poll_every = cfg.tick_interval;
    let (handle, join) = spawn_order_manager(OrderManager::new(broker), cfg);
    let mut events = handle.subscribe();

    let mut outstanding: HashSet<RequestId> = HashSet::new();
    for msg in orders {
        let req_id = msg.req_id().to_string();
        match handle.submit_message(msg).await {
            Ok(id) => {
                outstanding.insert(id);
            }
            Err(e) => println!("rejected req_id={req_id} reason={e}"),
        }
    }

    let mut finished = 0usize;
    let mut poll_ticker = tokio::time::interval(poll_every);
    let stop_at = tokio::time::sleep(Duration::from_secs(max_secs));
    tokio::pin!(stop_at);

    while !outstanding.is_empty() {
        tokio::select! {
            _ = &mut stop_at => {
                warn!(active = outstanding.len(), "time limit reached");
                break;
            }
            _ = poll_ticker.tick() => {
                handle.poll(PollSignal { data: true }).await?;
            }
            ev = events.recv() => match ev {
                Ok(ev @ OrderEvent::Finished { .. }) => {
                    if let OrderEvent::Finished { request_id, .. } = &ev {
                        outstanding.remove(request_id);
                    }
                    finished += 1;
                    println!("{}", serde_json::to_string(&ev)?);
                }
                Ok(OrderEvent::PassCompleted { .. }) => {}
                Err(RecvError::Lagged(n)) => warn!(skipped = n, "event bus lagged"),
                Err(RecvError::Closed) => bail!("order manager stopped unexpectedly"),
            },
        }
    }

    handle.shutdown().await?;
    let manager = join.await.context("order manager task failed")?;
    for rec in manager.records() {
        println!(
            "active req_id={} state={}",
            rec.request_id(),
            rec.state().as_str()
        );
    }
    println!("finished={} active={}", finished, manager.active_len());
    Ok(())
}

/// Read a JSON array of order messages. Entries without a `req_id` get a
/// fresh UUID.
fn read_orders(path: &str) -> Result<Vec<InboundOrder>> {
    let raw = fs::read_to_string(path).with_context(|| format!("failed to read orders: {path}"))?;
    let doc: Value = serde_json::from_str(&raw).context("orders file is not valid JSON")?;
    let Value::Array(items) = doc else {
        bail!("orders file must contain a JSON array");
    };

    items
        .into_iter()
        .enumerate()
        .map(|(i, mut item)| {
            if let Value::Object(map) = &mut item {
                let missing = map
                    .get("req_id")
                    .and_then(Value::as_str)
                    .map_or(true, str::is_empty);
                if missing {
                    map.insert(
                        "req_id".to_string(),
                        Value::String(Uuid::new_v4().to_string()),
                    );
                }
            }
            serde_json::from_value(item).with_context(|| format!("invalid order at index {i}"))
        })
        .collect()
}
