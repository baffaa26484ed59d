//! tm-runtime
//!
//! Drives an [`OrderManager`] from a single tokio task. The task owns the
//! manager outright, so submissions, periodic ticks and poll signals are
//! serialised without a lock:
//!
//! ```text
//!   ManagerHandle ──mpsc──► ┌───────────────┐ ──broadcast──► subscribers
//!   (submit/poll/shutdown)  │  manager task │   OrderEvent
//!   tokio interval ───────► └───────────────┘
//! ```

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tm_config::TradeManagerConfig;
use tm_execution::{
    BrokerRpc, OrderKind, OrderManager, OrderRequest, OrderState, PassReport, RequestId,
    SubmitError,
};
use tm_schemas::{InboundOrder, PollSignal};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// RuntimeConfig
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    pub tick_interval: Duration,
    pub command_buffer: usize,
    pub event_buffer: usize,
    /// Source of `now` for every pass.
    pub clock: fn() -> DateTime<Utc>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::from_settings(&TradeManagerConfig::default())
    }
}

impl RuntimeConfig {
    pub fn from_settings(cfg: &TradeManagerConfig) -> Self {
        Self {
            tick_interval: cfg.manager.tick_interval(),
            command_buffer: cfg.runtime.command_buffer,
            event_buffer: cfg.runtime.event_buffer,
            clock: Utc::now,
        }
    }
}

// ---------------------------------------------------------------------------
// OrderEvent: event bus payload
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    /// A record reached a terminal state and left the active set.
    Finished {
        request_id: RequestId,
        kind: OrderKind,
        state: OrderState,
        order_id: Option<String>,
        trade_id: Option<String>,
    },
    PassCompleted { poll: bool, active: usize },
}

// ---------------------------------------------------------------------------
// ManagerHandle
// ---------------------------------------------------------------------------

enum Command {
    Submit {
        request: OrderRequest,
        reply: oneshot::Sender<Result<RequestId, SubmitError>>,
    },
    Poll(PollSignal),
    Shutdown,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HandleError {
    /// The manager task has stopped.
    Closed,
    Rejected(SubmitError),
}

impl std::fmt::Display for HandleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandleError::Closed => write!(f, "order manager task is not running"),
            HandleError::Rejected(e) => write!(f, "submission rejected: {e}"),
        }
    }
}

impl std::error::Error for HandleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HandleError::Rejected(e) => Some(e),
            HandleError::Closed => None,
        }
    }
}

impl From<SubmitError> for HandleError {
    fn from(e: SubmitError) -> Self {
        HandleError::Rejected(e)
    }
}

/// Cloneable front door to the manager task.
#[derive(Clone)]
pub struct ManagerHandle {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<OrderEvent>,
}

impl ManagerHandle {
    pub async fn submit(&self, request: OrderRequest) -> Result<RequestId, HandleError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Submit { request, reply })
            .await
            .map_err(|_| HandleError::Closed)?;
        Ok(rx.await.map_err(|_| HandleError::Closed)??)
    }

    /// Convert a wire message and submit it.
    pub async fn submit_message(&self, msg: InboundOrder) -> Result<RequestId, HandleError> {
        let request = OrderRequest::try_from(msg)?;
        self.submit(request).await
    }

    /// Only `data == true` triggers a poll pass; `false` is dropped by the task.
    pub async fn poll(&self, signal: PollSignal) -> Result<(), HandleError> {
        self.commands
            .send(Command::Poll(signal))
            .await
            .map_err(|_| HandleError::Closed)
    }

    pub async fn shutdown(&self) -> Result<(), HandleError> {
        self.commands
            .send(Command::Shutdown)
            .await
            .map_err(|_| HandleError::Closed)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OrderEvent> {
        self.events.subscribe()
    }
}

// ---------------------------------------------------------------------------
// Manager task
// ---------------------------------------------------------------------------

/// Spawn the manager task. The join handle yields the manager back after
/// shutdown (or once every handle is dropped).
pub fn spawn_order_manager<B>(
    manager: OrderManager<B>,
    cfg: RuntimeConfig,
) -> (ManagerHandle, JoinHandle<OrderManager<B>>)
where
    B: BrokerRpc + Send + 'static,
{
    let (commands, rx) = mpsc::channel(cfg.command_buffer);
    let (events, _) = broadcast::channel(cfg.event_buffer);
    let handle = ManagerHandle {
        commands,
        events: events.clone(),
    };
    let join = tokio::spawn(run(manager, rx, events, cfg));
    (handle, join)
}

async fn run<B: BrokerRpc>(
    mut manager: OrderManager<B>,
    mut commands: mpsc::Receiver<Command>,
    events: broadcast::Sender<OrderEvent>,
    cfg: RuntimeConfig,
) -> OrderManager<B> {
    let mut ticker = tokio::time::interval(cfg.tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(tick_ms = cfg.tick_interval.as_millis() as u64, "order manager started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let report = manager.tick((cfg.clock)());
                publish(&events, &report, manager.active_len());
            }
            cmd = commands.recv() => match cmd {
                Some(Command::Submit { request, reply }) => {
                    let result = manager.submit(request);
                    if let Err(e) = &result {
                        warn!("submission rejected: {e}");
                    }
                    let _ = reply.send(result);
                }
                Some(Command::Poll(PollSignal { data: true })) => {
                    let report = manager.poll((cfg.clock)());
                    publish(&events, &report, manager.active_len());
                }
                Some(Command::Poll(PollSignal { data: false })) => {
                    debug!("poll signal false; ignored");
                }
                Some(Command::Shutdown) | None => break,
            },
        }
    }

    info!(active = manager.active_len(), "order manager stopped");
    manager
}

fn publish(events: &broadcast::Sender<OrderEvent>, report: &PassReport, active: usize) {
    // No subscribers is fine.
    for f in &report.finished {
        let _ = events.send(OrderEvent::Finished {
            request_id: f.request_id.clone(),
            kind: f.kind,
            state: f.state,
            order_id: f.order_id.clone(),
            trade_id: f.trade_id.clone(),
        });
    }
    let _ = events.send(OrderEvent::PassCompleted {
        poll: report.poll,
        active,
    });
}
