//! Deterministic in-memory "paper" broker.
//!
//! Design decisions (kept simple and deterministic):
//! - Ids are sequential: `ORD-000001`, `TRD-000001`, ... No randomness.
//! - A market create opens a trade immediately and answers with the trade id.
//!   A limit/stop create rests as a pending order and answers with the order id.
//! - Every call mutates the book when it is made; [`Resolution`] only decides
//!   when the caller gets to see the answer.
//! - Pending orders fill either through [`PaperBroker::fill_order`] or, when
//!   `fill_pending_on_fetch` is on, the first time their details are fetched.
//! - Failures are injected per operation with [`PaperBroker::reject_next`] and
//!   [`PaperBroker::fail_next`].
//!
//! Clones share one book, so a test (or the CLI) can keep a handle for the
//! broker-side hooks while the order manager owns another.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tm_execution::{
    spawn_call, BrokerOp, BrokerRpc, CallFailure, CallOutcome, CancelAck, CloseAck, CreateAck,
    CreateOrderRequest, OrderDetails, OrderKind, PendingCall, ReportedOrderState,
    ReportedTradeState, TradeDetails,
};
use tracing::debug;

pub mod types;

pub use types::{
    PaperOrder, PaperOrderStatus, PaperTrade, PaperTradeStatus, Resolution,
    REASON_ORDER_NOT_FOUND, REASON_ORDER_NOT_PENDING, REASON_TRADE_NOT_FOUND,
    REASON_TRADE_NOT_OPEN,
};

type Release = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct PaperBook {
    orders: BTreeMap<String, PaperOrder>,
    trades: BTreeMap<String, PaperTrade>,
    order_seq: u64,
    trade_seq: u64,
    injected: BTreeMap<BrokerOp, CallFailure>,
    fill_pending_on_fetch: bool,
    /// Answers held back in [`Resolution::Manual`] mode.
    held: Vec<Release>,
}

impl PaperBook {
    fn open_trade(
        &mut self,
        instrument_id: &str,
        units: i64,
        take_profit_price: f64,
        stop_loss_price: f64,
        opened_by: Option<String>,
    ) -> String {
        self.trade_seq += 1;
        let trade_id = format!("TRD-{:06}", self.trade_seq);
        self.trades.insert(
            trade_id.clone(),
            PaperTrade {
                trade_id: trade_id.clone(),
                instrument_id: instrument_id.to_string(),
                units,
                take_profit_price,
                stop_loss_price,
                status: PaperTradeStatus::Open,
                opened_by,
            },
        );
        trade_id
    }

    /// Fill a pending order. Returns the new trade id, or `None` if the order
    /// is unknown or not pending.
    fn fill(&mut self, order_id: &str) -> Option<String> {
        let order = self.orders.get(order_id)?;
        if order.status != PaperOrderStatus::Pending {
            return None;
        }
        let (instrument, units, tp, sl) = (
            order.instrument_id.clone(),
            order.units,
            order.take_profit_price,
            order.stop_loss_price,
        );
        let trade_id = self.open_trade(&instrument, units, tp, sl, Some(order_id.to_string()));
        if let Some(order) = self.orders.get_mut(order_id) {
            order.status = PaperOrderStatus::Filled;
            order.trade_id = Some(trade_id.clone());
        }
        Some(trade_id)
    }

    fn create(&mut self, req: CreateOrderRequest) -> CallOutcome<CreateAck> {
        let id = match req.kind {
            OrderKind::Market => self.open_trade(
                &req.instrument_id,
                req.units,
                req.take_profit_price,
                req.stop_loss_price,
                None,
            ),
            OrderKind::Limit | OrderKind::Stop => {
                self.order_seq += 1;
                let order_id = format!("ORD-{:06}", self.order_seq);
                self.orders.insert(
                    order_id.clone(),
                    PaperOrder {
                        order_id: order_id.clone(),
                        kind: req.kind,
                        instrument_id: req.instrument_id,
                        units: req.units,
                        price: req.price,
                        take_profit_price: req.take_profit_price,
                        stop_loss_price: req.stop_loss_price,
                        status: PaperOrderStatus::Pending,
                        trade_id: None,
                    },
                );
                order_id
            }
        };
        Ok(CreateAck { id })
    }

    fn cancel(&mut self, order_id: &str) -> CallOutcome<CancelAck> {
        let order = self
            .orders
            .get_mut(order_id)
            .ok_or_else(|| rejected(REASON_ORDER_NOT_FOUND))?;
        if order.status != PaperOrderStatus::Pending {
            return Err(rejected(REASON_ORDER_NOT_PENDING));
        }
        order.status = PaperOrderStatus::Cancelled;
        Ok(CancelAck {
            order_id: order_id.to_string(),
        })
    }

    fn order_details(&mut self, order_id: &str) -> CallOutcome<OrderDetails> {
        let status = self
            .orders
            .get(order_id)
            .map(|o| o.status)
            .ok_or_else(|| rejected(REASON_ORDER_NOT_FOUND))?;
        if status == PaperOrderStatus::Pending && self.fill_pending_on_fetch {
            self.fill(order_id);
        }
        let order = self
            .orders
            .get(order_id)
            .ok_or_else(|| rejected(REASON_ORDER_NOT_FOUND))?;
        let state = match order.status {
            PaperOrderStatus::Pending => ReportedOrderState::Pending,
            PaperOrderStatus::Filled => ReportedOrderState::Filled,
            PaperOrderStatus::Cancelled => ReportedOrderState::Other("CANCELLED".to_string()),
        };
        Ok(OrderDetails {
            state,
            opened_trade_id: order.trade_id.clone(),
        })
    }

    fn trade_details(&self, trade_id: &str) -> CallOutcome<TradeDetails> {
        let trade = self
            .trades
            .get(trade_id)
            .ok_or_else(|| rejected(REASON_TRADE_NOT_FOUND))?;
        let state = match trade.status {
            PaperTradeStatus::Open => ReportedTradeState::Open,
            PaperTradeStatus::Closed => ReportedTradeState::Closed,
        };
        Ok(TradeDetails { state })
    }

    fn close(&mut self, trade_id: &str) -> CallOutcome<CloseAck> {
        let trade = self
            .trades
            .get_mut(trade_id)
            .ok_or_else(|| rejected(REASON_TRADE_NOT_FOUND))?;
        if trade.status != PaperTradeStatus::Open {
            return Err(rejected(REASON_TRADE_NOT_OPEN));
        }
        trade.status = PaperTradeStatus::Closed;
        Ok(CloseAck {
            trade_id: trade_id.to_string(),
        })
    }
}

fn rejected(reason_code: i32) -> CallFailure {
    CallFailure::Rejected { reason_code }
}

// ---------------------------------------------------------------------------
// PaperBroker
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct PaperBroker {
    book: Arc<Mutex<PaperBook>>,
    resolution: Resolution,
}

impl Default for PaperBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PaperBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let book = self.lock();
        f.debug_struct("PaperBroker")
            .field("resolution", &self.resolution)
            .field("orders", &book.orders.len())
            .field("trades", &book.trades.len())
            .field("held", &book.held.len())
            .finish()
    }
}

impl PaperBroker {
    /// Immediate resolution; pending orders fill on their first details fetch.
    pub fn new() -> Self {
        Self {
            book: Arc::new(Mutex::new(PaperBook {
                fill_pending_on_fetch: true,
                ..PaperBook::default()
            })),
            resolution: Resolution::Immediate,
        }
    }

    pub fn with_resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn with_fill_pending_on_fetch(self, on: bool) -> Self {
        self.lock().fill_pending_on_fetch = on;
        self
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    fn lock(&self) -> MutexGuard<'_, PaperBook> {
        // Book updates are single assignments; a panicked holder cannot leave
        // it half-written.
        self.book.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // -- broker-side hooks ---------------------------------------------------

    /// Fill a pending order as if the market reached its price.
    pub fn fill_order(&self, order_id: &str) -> Option<String> {
        self.lock().fill(order_id)
    }

    /// Close an open trade as if take-profit or stop-loss hit.
    pub fn close_trade_at_broker(&self, trade_id: &str) -> bool {
        let mut book = self.lock();
        match book.trades.get_mut(trade_id) {
            Some(t) if t.status == PaperTradeStatus::Open => {
                t.status = PaperTradeStatus::Closed;
                true
            }
            _ => false,
        }
    }

    /// The next `op` call is rejected with `reason_code` and has no effect.
    pub fn reject_next(&self, op: BrokerOp, reason_code: i32) {
        self.lock().injected.insert(op, rejected(reason_code));
    }

    /// The next `op` call fails with a transport error and has no effect.
    pub fn fail_next(&self, op: BrokerOp) {
        self.lock()
            .injected
            .insert(op, CallFailure::Transport(format!("paper: injected {op} failure")));
    }

    /// Resolve every held handle ([`Resolution::Manual`]). Returns how many.
    pub fn release_all(&self) -> usize {
        let held = std::mem::take(&mut self.lock().held);
        let n = held.len();
        for release in held {
            release();
        }
        n
    }

    pub fn held(&self) -> usize {
        self.lock().held.len()
    }

    // -- inspection ----------------------------------------------------------

    pub fn order(&self, order_id: &str) -> Option<PaperOrder> {
        self.lock().orders.get(order_id).cloned()
    }

    pub fn trade(&self, trade_id: &str) -> Option<PaperTrade> {
        self.lock().trades.get(trade_id).cloned()
    }

    /// Deterministic listing: BTreeMap iteration order is stable.
    pub fn orders(&self) -> Vec<PaperOrder> {
        self.lock().orders.values().cloned().collect()
    }

    pub fn trades(&self) -> Vec<PaperTrade> {
        self.lock().trades.values().cloned().collect()
    }

    // -- call plumbing -------------------------------------------------------

    /// Run `f` against the book unless a failure was injected for `op`.
    fn execute<T>(
        &self,
        op: BrokerOp,
        f: impl FnOnce(&mut PaperBook) -> CallOutcome<T>,
    ) -> CallOutcome<T> {
        let mut book = self.lock();
        let outcome = match book.injected.remove(&op) {
            Some(failure) => Err(failure),
            None => f(&mut *book),
        };
        match &outcome {
            Ok(_) => debug!(op = %op, "paper call accepted"),
            Err(e) => debug!(op = %op, "paper call failed: {e}"),
        }
        outcome
    }

    fn deliver<T: Send + 'static>(&self, op: BrokerOp, outcome: CallOutcome<T>) -> PendingCall<T> {
        match self.resolution {
            Resolution::Immediate => PendingCall::resolved(op, outcome),
            Resolution::Manual => {
                let (resolver, call) = PendingCall::channel(op);
                self.lock().held.push(Box::new(move || {
                    let _ = resolver.resolve(outcome);
                }));
                call
            }
            Resolution::Latency(delay) => spawn_call(op, async move {
                tokio::time::sleep(delay).await;
                outcome
            }),
        }
    }
}

impl BrokerRpc for PaperBroker {
    fn create(&self, req: CreateOrderRequest) -> PendingCall<CreateAck> {
        let outcome = self.execute(BrokerOp::OrderCreate, |book| book.create(req));
        self.deliver(BrokerOp::OrderCreate, outcome)
    }

    fn cancel(&self, order_id: &str) -> PendingCall<CancelAck> {
        let outcome = self.execute(BrokerOp::OrderCancel, |book| book.cancel(order_id));
        self.deliver(BrokerOp::OrderCancel, outcome)
    }

    fn fetch_order_details(&self, order_id: &str) -> PendingCall<OrderDetails> {
        let outcome = self.execute(BrokerOp::OrderDetails, |book| book.order_details(order_id));
        self.deliver(BrokerOp::OrderDetails, outcome)
    }

    fn fetch_trade_details(&self, trade_id: &str) -> PendingCall<TradeDetails> {
        let outcome = self.execute(BrokerOp::TradeDetails, |book| book.trade_details(trade_id));
        self.deliver(BrokerOp::TradeDetails, outcome)
    }

    fn close_trade(&self, trade_id: &str) -> PendingCall<CloseAck> {
        let outcome = self.execute(BrokerOp::TradeClose, |book| book.close(trade_id));
        self.deliver(BrokerOp::TradeClose, outcome)
    }
}
