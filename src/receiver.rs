//! The Receiver: the single task that owns the socket's read half and the
//! ID → channel registry. No other task ever touches either.

use std::collections::HashMap;

use tokio::io::AsyncRead;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::{GwError, GwResult, ProtocolError};
use crate::wire::{FrameReader, Message, RoutingId};

/// ID reserved for connection-wide and unsolicited traffic. Never handed
/// out by the limiter, never registered or unregistered by a request.
pub(crate) const SYSTEM_ID: i64 = -1;

/// One frame's worth of routed content, handed to whichever channel owns
/// its request ID.
pub(crate) enum Routed {
    /// A successfully decoded frame, still positioned after its code+id
    /// for the caller to continue reading.
    Message { code: i32, message: Message },
    /// The gateway reported an error against this specific request.
    Error(ProtocolError),
}

enum Control {
    Register {
        id: i64,
        tx: mpsc::Sender<Routed>,
        ack: oneshot::Sender<GwResult<()>>,
    },
    Unregister {
        id: i64,
    },
}

/// Handle used by request-lifecycle tasks and the supervisor to register
/// and unregister interest in a request ID.
#[derive(Clone)]
pub(crate) struct ReceiverHandle {
    control_tx: mpsc::Sender<Control>,
}

impl ReceiverHandle {
    /// Registers `id`, returning the channel its replies will arrive on.
    /// Waits for the registration to actually land in the registry before
    /// returning, so the caller can safely write its request immediately
    /// after.
    pub(crate) async fn register(&self, id: i64) -> GwResult<mpsc::Receiver<Routed>> {
        let (tx, rx) = mpsc::channel(16);
        let (ack_tx, ack_rx) = oneshot::channel();
        self.control_tx
            .send(Control::Register { id, tx, ack: ack_tx })
            .await
            .map_err(|_| GwError::Disconnected)?;
        ack_rx.await.map_err(|_| GwError::Disconnected)??;
        Ok(rx)
    }

    /// Unregisters `id`. Idempotent: unregistering an ID that is not (or
    /// is no longer) registered is not an error.
    pub(crate) async fn unregister(&self, id: i64) {
        let _ = self.control_tx.send(Control::Unregister { id }).await;
    }
}

/// Spawns the Receiver task.
///
/// `pending` is the set of raw frames the handshake saw but could not
/// route (nothing was registered yet); they are dispatched to the system
/// channel before the task starts reading fresh frames off `reader`.
pub(crate) fn spawn<R>(
    reader: FrameReader<R>,
    pending: Vec<Vec<u8>>,
) -> (ReceiverHandle, mpsc::Receiver<Routed>, JoinHandle<GwResult<()>>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let (control_tx, control_rx) = mpsc::channel(32);
    let (system_tx, system_rx) = mpsc::channel(64);

    let handle = tokio::spawn(run(reader, pending, control_rx, system_tx));

    (ReceiverHandle { control_tx }, system_rx, handle)
}

async fn run<R>(
    mut reader: FrameReader<R>,
    pending: Vec<Vec<u8>>,
    mut control_rx: mpsc::Receiver<Control>,
    system_tx: mpsc::Sender<Routed>,
) -> GwResult<()>
where
    R: AsyncRead + Unpin,
{
    let mut registry: HashMap<i64, mpsc::Sender<Routed>> = HashMap::new();

    for payload in pending {
        dispatch(&payload, &mut registry, &system_tx).await;
    }

    loop {
        tokio::select! {
            control = control_rx.recv() => {
                match control {
                    Some(Control::Register { id, tx, ack }) => {
                        let result = if registry.contains_key(&id) {
                            Err(GwError::DuplicateReqId { id })
                        } else {
                            registry.insert(id, tx);
                            Ok(())
                        };
                        let _ = ack.send(result);
                    }
                    Some(Control::Unregister { id }) => {
                        registry.remove(&id);
                    }
                    None => {
                        // All handles dropped: no one can issue requests
                        // anymore, but keep serving the system channel
                        // until the socket itself goes away.
                    }
                }
            }
            frame = reader.read_frame() => {
                match frame? {
                    Some(payload) => dispatch(&payload, &mut registry, &system_tx).await,
                    None => return Err(GwError::Disconnected),
                }
            }
        }
    }
}

async fn dispatch(
    payload: &[u8],
    registry: &mut HashMap<i64, mpsc::Sender<Routed>>,
    system_tx: &mpsc::Sender<Routed>,
) {
    match Message::open(payload) {
        Ok(opened) => {
            let id = match opened.req_id {
                RoutingId::Request(id) => id,
                RoutingId::System => SYSTEM_ID,
                RoutingId::Ignore => return,
            };
            let routed = Routed::Message {
                code: opened.code,
                message: opened.message,
            };
            route(id, routed, registry, system_tx).await;
        }
        Err(GwError::Protocol(p)) => {
            let id = p.req_id.unwrap_or(SYSTEM_ID);
            route(id, Routed::Error(p), registry, system_tx).await;
        }
        Err(e) => {
            log::warn!("dropping unparsable frame: {e}");
        }
    }
}

async fn route(
    id: i64,
    routed: Routed,
    registry: &mut HashMap<i64, mpsc::Sender<Routed>>,
    system_tx: &mpsc::Sender<Routed>,
) {
    match registry.get(&id) {
        Some(tx) => {
            if tx.send(routed).await.is_err() {
                // Listener quit without unregistering; treat as if it
                // never existed so a later message for the same ID isn't
                // held responsible for someone else's cleanup bug.
                registry.remove(&id);
            }
        }
        None => {
            let _ = system_tx.send(routed).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn frame_payload(fields: &[&str]) -> Vec<u8> {
        let mut buf = Vec::new();
        for f in fields {
            buf.extend_from_slice(f.as_bytes());
            buf.push(0);
        }
        buf
    }

    fn framed(payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        out.extend_from_slice(payload);
        out
    }

    #[tokio::test]
    async fn routes_a_registered_reply_and_unregistered_traffic_to_system() {
        // Use a duplex pipe rather than a pre-filled buffer so the frames
        // only arrive after registration has completed, the way a real
        // socket's bytes would only arrive after the peer's own request.
        let (client_end, mut server_end) = tokio::io::duplex(4096);
        let reader = FrameReader::new(client_end);
        let (handle, mut system_rx, _join) = spawn(reader, Vec::new());

        let mut rx = handle.register(42).await.unwrap();

        use tokio::io::AsyncWriteExt;
        server_end
            .write_all(&framed(&frame_payload(&["99", "42", "data"])))
            .await
            .unwrap();
        server_end
            .write_all(&framed(&frame_payload(&["99", "7", "orphan"])))
            .await
            .unwrap();

        match rx.recv().await.unwrap() {
            Routed::Message { code, .. } => assert_eq!(code, 99),
            Routed::Error(_) => panic!("expected a message"),
        }

        match system_rx.recv().await.unwrap() {
            Routed::Message { code, .. } => assert_eq!(code, 99),
            Routed::Error(_) => panic!("expected a message"),
        }
    }

    #[tokio::test]
    async fn registering_a_duplicate_id_is_rejected() {
        // A duplex pipe with nothing written never signals EOF, unlike an
        // empty in-memory buffer, so the receiver task stays up for the
        // registration calls below.
        let (client_end, _server_end) = tokio::io::duplex(4096);
        let reader = FrameReader::new(client_end);
        let (handle, _system_rx, _join) = spawn(reader, Vec::new());
        let _first = handle.register(5).await.unwrap();
        let err = handle.register(5).await.unwrap_err();
        assert!(matches!(err, GwError::DuplicateReqId { id: 5 }));
    }

    #[tokio::test]
    async fn routes_protocol_errors_to_the_addressed_request() {
        let (client_end, mut server_end) = tokio::io::duplex(4096);
        let reader = FrameReader::new(client_end);
        let (handle, _system_rx, _join) = spawn(reader, Vec::new());
        let mut rx = handle.register(42).await.unwrap();

        use tokio::io::AsyncWriteExt;
        server_end
            .write_all(&framed(&frame_payload(&["4", "2", "42", "321", "bad"])))
            .await
            .unwrap();

        match rx.recv().await.unwrap() {
            Routed::Error(p) => {
                assert_eq!(p.code, 321);
                assert_eq!(p.req_id, Some(42));
            }
            Routed::Message { .. } => panic!("expected an error"),
        }
    }

    #[tokio::test]
    async fn pending_frames_from_the_handshake_surface_on_the_system_channel() {
        // Nothing can have registered interest in a frame seen during the
        // handshake, since requests are only ever issued afterward — so
        // pending frames always land on the system channel.
        let pending = vec![frame_payload(&["99", "3", "buffered"])];
        let reader = FrameReader::new(Cursor::new(Vec::new()));
        let (_handle, mut system_rx, _join) = spawn(reader, pending);
        match system_rx.recv().await.unwrap() {
            Routed::Message { code, .. } => assert_eq!(code, 99),
            Routed::Error(_) => panic!("expected a message"),
        }
    }
}
