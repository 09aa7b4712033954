//! ID allocation and rate limiting.
//!
//! Three disjoint ID classes share one global token bucket:
//!
//! - `Static` always hands out ID `0` — static requests (e.g. a cancel)
//!   never need a unique correlation ID of their own.
//! - `Ticker` grows from [`GatewayConfig::min_ticker_id`] up to (but not
//!   including) [`GatewayConfig::min_order_id`], then wraps back down —
//!   this keeps the ticker and order ranges disjoint forever.
//! - `Order` grows from the gateway's reported `next_valid_id` (or the
//!   configured floor, whichever is larger) without ever wrapping.
//!
//! A quote is a promise of one ID and one token. The token is not
//! replenished when the caller acknowledges receipt of the quote — it is
//! replenished one second after the quote was *issued*, so a caller that
//! sits on a quote for a while does not let the bucket over-fill while it
//! waits.

use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::task::JoinHandle;

use crate::config::GatewayConfig;

/// Which disjoint ID range a request draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IdClass {
    Static,
    Ticker,
    Order,
}

/// One reserved ID plus the channel the limiter waits on before treating
/// the ID as spent and starting its replenishment clock.
pub(crate) struct Quote {
    pub(crate) id: i64,
    pub(crate) ack: oneshot::Sender<()>,
}

type ReplyTo = oneshot::Sender<Quote>;

/// Handle used by request-lifecycle tasks to reserve an ID of a given class.
#[derive(Clone)]
pub(crate) struct IdLimiter {
    static_tx: mpsc::Sender<ReplyTo>,
    ticker_tx: mpsc::Sender<ReplyTo>,
    order_tx: mpsc::Sender<ReplyTo>,
}

impl IdLimiter {
    /// Reserves one ID of the given class, blocking until the global token
    /// bucket has capacity. The caller must send on `Quote::ack` once the
    /// request carrying this ID has been written to the wire (or, on
    /// failure to write, drop it — either releases the limiter to move on).
    pub(crate) async fn reserve(&self, class: IdClass) -> Quote {
        let (reply_tx, reply_rx) = oneshot::channel();
        let tx = match class {
            IdClass::Static => &self.static_tx,
            IdClass::Ticker => &self.ticker_tx,
            IdClass::Order => &self.order_tx,
        };
        // The limiter task never exits while any IdLimiter handle is alive,
        // so these are not expected to fail.
        let _ = tx.send(reply_tx).await;
        reply_rx
            .await
            .expect("limiter task dropped its reply channel while serving a reservation")
    }
}

struct ClassState {
    next: i64,
    wrap_at: Option<i64>,
    wrap_to: Option<i64>,
}

impl ClassState {
    fn advance(&mut self) {
        self.next += 1;
        if let (Some(wrap_at), Some(wrap_to)) = (self.wrap_at, self.wrap_to) {
            if self.next == wrap_at {
                self.next = wrap_to;
            }
        }
    }
}

/// Spawns the limiter task and returns a cloneable handle to it.
///
/// `next_valid_id` is the gateway's handshake-reported floor for order IDs;
/// it wins over the configured default floor whenever it is larger, so a
/// reconnect never reissues an ID the gateway has already seen.
pub(crate) fn spawn(config: &GatewayConfig, next_valid_id: i64) -> (IdLimiter, JoinHandle<()>) {
    let (static_tx, static_rx) = mpsc::channel(1);
    let (ticker_tx, ticker_rx) = mpsc::channel(1);
    let (order_tx, order_rx) = mpsc::channel(1);

    let min_order_id = config.min_order_id();
    let min_ticker_id = config.min_ticker_id();
    let order_floor = next_valid_id.max(min_order_id);
    let requests_per_second = config.requests_per_second();

    let semaphore = std::sync::Arc::new(Semaphore::new(requests_per_second as usize));

    let static_handle = tokio::spawn(run_class(
        static_rx,
        ClassState {
            next: 0,
            wrap_at: None,
            wrap_to: None,
        },
        semaphore.clone(),
    ));
    let ticker_handle = tokio::spawn(run_class(
        ticker_rx,
        ClassState {
            next: min_ticker_id,
            wrap_at: Some(min_order_id),
            wrap_to: Some(min_ticker_id),
        },
        semaphore.clone(),
    ));
    let order_handle = tokio::spawn(run_class(
        order_rx,
        ClassState {
            next: order_floor,
            wrap_at: None,
            wrap_to: None,
        },
        semaphore,
    ));

    let handle = tokio::spawn(async move {
        let _ = tokio::join!(static_handle, ticker_handle, order_handle);
    });

    (
        IdLimiter {
            static_tx,
            ticker_tx,
            order_tx,
        },
        handle,
    )
}

/// Drives one ID class's reservation queue to completion.
///
/// Each class runs on its own task so that one class sitting on an unacked
/// quote — waiting for its caller to finish writing the request — never
/// blocks the other two classes from reserving IDs of their own. The three
/// tasks race for permits on the same shared [`Semaphore`], which is where
/// the global requests-per-second cap is actually enforced; per-class
/// reservation order beyond that is otherwise independent.
async fn run_class(
    mut rx: mpsc::Receiver<ReplyTo>,
    mut state: ClassState,
    semaphore: std::sync::Arc<Semaphore>,
) {
    while let Some(reply) = rx.recv().await {
        serve(reply, &mut state, &semaphore).await;
    }
}

async fn serve(reply: ReplyTo, state: &mut ClassState, semaphore: &std::sync::Arc<Semaphore>) {
    let permit = semaphore
        .clone()
        .acquire_owned()
        .await
        .expect("semaphore is never closed");
    permit.forget();
    let issued_at = Instant::now();

    let id = state.next;
    let (ack_tx, ack_rx) = oneshot::channel();
    let handed_over = reply.send(Quote { id, ack: ack_tx }).is_ok();

    // Wait for the caller to signal (or, on I/O failure, simply drop) the
    // ack; either way the ID has been consumed by this point and the
    // counter advances, matching the gateway's own tolerance of IDs that
    // were reserved but never successfully written.
    if handed_over {
        let _ = ack_rx.await;
        state.advance();
    }
    schedule_replenish(semaphore.clone(), issued_at);
}

fn schedule_replenish(semaphore: std::sync::Arc<Semaphore>, issued_at: Instant) {
    tokio::spawn(async move {
        let deadline = issued_at + Duration::from_secs(1);
        tokio::time::sleep_until(deadline.into()).await;
        semaphore.add_permits(1);
    });
}
