//! The per-request lifecycle: reserve an ID, register, write, wait out the
//! rate limiter, serve replies, and tear down.

use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

use crate::config::GatewayConfig;
use crate::error::{GwError, GwResult};
use crate::limiter::{IdClass, IdLimiter};
use crate::receiver::{ReceiverHandle, Routed};
use crate::request::{ReplyCount, Request, RequestKind};
use crate::wire::Message;
use crate::writer::SharedWriter;

/// A single reply delivered to the caller: either a decoded frame (with
/// its wire code, for codecs that need to distinguish partial vs. final
/// messages) or the gateway's own error for this request.
#[derive(Debug)]
pub enum Reply {
    Message { code: i32, message: Message },
    Error(crate::error::ProtocolError),
    /// No reply arrived within [`GatewayConfig::first_reply_timeout`]. The
    /// channel closes immediately after this, same as any other terminal
    /// reply.
    Timeout,
}

/// Handle for an in-flight request, returned by [`crate::Connection::request`].
#[derive(Debug)]
pub struct RequestHandle {
    messages: mpsc::Receiver<Reply>,
    cancelable: bool,
    cancel_tx: Option<oneshot::Sender<oneshot::Sender<GwResult<()>>>>,
}

impl RequestHandle {
    /// Receives the next reply, or `None` once the request has finished.
    pub async fn recv(&mut self) -> Option<Reply> {
        self.messages.recv().await
    }

    /// Cancels the request, if its kind supports cancellation.
    ///
    /// Returns [`GwError::NotCancelable`] if the request's `Request` impl
    /// never supported cancellation. Returns [`GwError::AlreadyFinished`]
    /// on every call after the first — whether this is the second `cancel`
    /// call or the request had already finished naturally — so callers
    /// never hang waiting on a second cancel of the same request.
    pub async fn cancel(&mut self) -> GwResult<()> {
        if !self.cancelable {
            return Err(GwError::NotCancelable);
        }
        let Some(cancel_tx) = self.cancel_tx.take() else {
            return Err(GwError::AlreadyFinished);
        };
        let (ack_tx, ack_rx) = oneshot::channel();
        if cancel_tx.send(ack_tx).is_err() {
            return Err(GwError::AlreadyFinished);
        }
        ack_rx.await.unwrap_or(Err(GwError::AlreadyFinished))
    }
}

fn id_class_for(kind: RequestKind) -> IdClass {
    match kind {
        RequestKind::Static => IdClass::Static,
        RequestKind::Ticker | RequestKind::Historical => IdClass::Ticker,
        RequestKind::Order => IdClass::Order,
    }
}

/// Runs one request end to end and returns the handle the caller observes.
///
/// This does the ID reservation and initial write itself, synchronously
/// from the caller's point of view (it's all `.await`ed before returning),
/// then spawns a task to serve replies for the lifetime of the request.
pub(crate) async fn run<Req: Request>(
    request: Req,
    server_version: i64,
    config: &GatewayConfig,
    limiter: &IdLimiter,
    receiver: &ReceiverHandle,
    writer: &SharedWriter,
) -> GwResult<RequestHandle> {
    if request.kind() == RequestKind::Order && config.is_readonly() {
        return Err(GwError::Readonly);
    }

    let class = id_class_for(request.kind());
    let quote = limiter.reserve(class).await;
    let req_id = quote.id;

    let reply_count = request.reply_count();
    let mut inbound = if matches!(reply_count, ReplyCount::Zero) {
        None
    } else {
        match receiver.register(req_id).await {
            Ok(rx) => Some(rx),
            Err(e) => {
                let _ = quote.ack.send(());
                return Err(e);
            }
        }
    };

    let mut body = Vec::new();
    request.write_body(&mut body, req_id, server_version);
    let write_result = writer.write_request(&body).await;
    let _ = quote.ack.send(());

    if let Err(e) = write_result {
        if inbound.is_some() {
            receiver.unregister(req_id).await;
        }
        return Err(e);
    }

    if reply_count == ReplyCount::Zero {
        let (_tx, rx) = mpsc::channel(1);
        return Ok(RequestHandle {
            messages: rx,
            cancelable: false,
            cancel_tx: None,
        });
    }

    let cancelable = request.cancelable();
    let (out_tx, out_rx) = mpsc::channel(16);
    let cancel_tx = if cancelable {
        let (tx, rx) = oneshot::channel();
        spawn_serve(
            request,
            req_id,
            reply_count,
            inbound.take().expect("reply_count != Zero implies inbound was registered"),
            out_tx,
            receiver.clone(),
            config.first_reply_timeout(),
            Some((rx, limiter.clone(), writer.clone())),
        );
        Some(tx)
    } else {
        spawn_serve(
            request,
            req_id,
            reply_count,
            inbound.take().expect("reply_count != Zero implies inbound was registered"),
            out_tx,
            receiver.clone(),
            config.first_reply_timeout(),
            None,
        );
        None
    };

    Ok(RequestHandle {
        messages: out_rx,
        cancelable,
        cancel_tx,
    })
}

type CancelWiring = (
    oneshot::Receiver<oneshot::Sender<GwResult<()>>>,
    IdLimiter,
    SharedWriter,
);

fn spawn_serve<Req: Request>(
    request: Req,
    req_id: i64,
    reply_count: ReplyCount,
    mut inbound: mpsc::Receiver<Routed>,
    out_tx: mpsc::Sender<Reply>,
    receiver: ReceiverHandle,
    first_reply_timeout: std::time::Duration,
    cancel_wiring: Option<CancelWiring>,
) {
    tokio::spawn(async move {
        let (mut cancel_rx_fut, limiter, writer) = match cancel_wiring {
            Some((rx, limiter, writer)) => (Some(rx), Some(limiter), Some(writer)),
            None => (None, None, None),
        };

        let first = match timeout(first_reply_timeout, inbound.recv()).await {
            Ok(Some(routed)) => routed,
            Ok(None) => {
                receiver.unregister(req_id).await;
                return;
            }
            Err(_) => {
                let _ = out_tx.send(Reply::Timeout).await;
                receiver.unregister(req_id).await;
                return;
            }
        };

        if deliver_and_check_done(&out_tx, first, reply_count).await {
            receiver.unregister(req_id).await;
            return;
        }

        loop {
            if let Some(cancel_rx_mut) = cancel_rx_fut.as_mut() {
                tokio::select! {
                    ack_reply = cancel_rx_mut => {
                        if let Ok(ack_tx) = ack_reply {
                            let result = do_cancel(&request, req_id, limiter.as_ref(), writer.as_ref(), &receiver).await;
                            let _ = ack_tx.send(result);
                        }
                        return;
                    }
                    routed = inbound.recv() => {
                        match routed {
                            Some(routed) => {
                                if deliver_and_check_done(&out_tx, routed, reply_count).await {
                                    receiver.unregister(req_id).await;
                                    return;
                                }
                            }
                            None => {
                                receiver.unregister(req_id).await;
                                return;
                            }
                        }
                    }
                }
            } else {
                match inbound.recv().await {
                    Some(routed) => {
                        if deliver_and_check_done(&out_tx, routed, reply_count).await {
                            receiver.unregister(req_id).await;
                            return;
                        }
                    }
                    None => {
                        receiver.unregister(req_id).await;
                        return;
                    }
                }
            }
        }
    });
}

/// Delivers one routed message to the caller and reports whether the
/// request is now finished.
async fn deliver_and_check_done(
    out_tx: &mpsc::Sender<Reply>,
    routed: Routed,
    reply_count: ReplyCount,
) -> bool {
    match routed {
        Routed::Error(p) => {
            let _ = out_tx.send(Reply::Error(p)).await;
            true
        }
        Routed::Message { code, message } => {
            let is_last = match reply_count {
                ReplyCount::Zero => true,
                ReplyCount::One => true,
                ReplyCount::Many { end_code } => end_code == Some(code),
            };
            let _ = out_tx.send(Reply::Message { code, message }).await;
            is_last
        }
    }
}

async fn do_cancel<Req: Request>(
    request: &Req,
    req_id: i64,
    limiter: Option<&IdLimiter>,
    writer: Option<&SharedWriter>,
    receiver: &ReceiverHandle,
) -> GwResult<()> {
    let (Some(limiter), Some(writer)) = (limiter, writer) else {
        return Err(GwError::NotCancelable);
    };
    let quote = limiter.reserve(IdClass::Static).await;
    let mut body = Vec::new();
    request.write_cancel(&mut body, req_id);
    let result = writer.write_request(&body).await;
    let _ = quote.ack.send(());
    receiver.unregister(req_id).await;
    result
}
