//! The public entry point: owns the TCP connection, drives the handshake,
//! and wires up the limiter, receiver, and writer for the lifetime of one
//! connection attempt.

use tokio::net::TcpStream;
use tokio::task::JoinHandle;

use crate::config::GatewayConfig;
use crate::error::{GwError, GwResult};
use crate::handshake::{self, HandshakeInfo};
use crate::limiter::{self, IdLimiter};
use crate::lifecycle::{self, RequestHandle};
use crate::receiver::{self, ReceiverHandle, Routed};
use crate::request::Request;
use crate::wire::{FrameReader, FrameWriter};
use crate::writer::SharedWriter;

/// A live connection to the gateway: the handshake has completed and the
/// receiver, limiter, and writer tasks are all running.
pub struct Connection {
    handshake_info: HandshakeInfo,
    config: GatewayConfig,
    limiter: IdLimiter,
    receiver: ReceiverHandle,
    writer: SharedWriter,
    receiver_task: JoinHandle<GwResult<()>>,
    system_task: JoinHandle<()>,
}

impl Connection {
    /// Dials `addr`, performs the handshake, and starts all background
    /// tasks. Returns once the connection is ready to accept requests.
    pub async fn connect(
        addr: &str,
        client_id: i64,
        config: GatewayConfig,
    ) -> GwResult<Self> {
        log::debug!("connecting to {addr}");
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let (read_half, write_half) = stream.into_split();

        let mut reader = FrameReader::new(read_half);
        let mut writer = FrameWriter::new(write_half);

        let (handshake_info, pending) =
            handshake::perform(&mut reader, &mut writer, &config, client_id).await?;

        log::debug!(
            "connected: server_version={}, next_valid_id={}, managed_accounts={:?}",
            handshake_info.server_version,
            handshake_info.next_valid_id,
            handshake_info.managed_accounts,
        );

        let (limiter, _limiter_task) = limiter::spawn(&config, handshake_info.next_valid_id);
        let (receiver, mut system_rx, receiver_task) = receiver::spawn(reader, pending);
        let writer = SharedWriter::new(writer);

        let system_task = tokio::spawn(async move {
            while let Some(routed) = system_rx.recv().await {
                match routed {
                    Routed::Message { code, .. } => {
                        log::debug!("unsolicited system message, code={code}");
                    }
                    Routed::Error(e) => {
                        log::warn!("connection-wide gateway error: {e}");
                    }
                }
            }
        });

        Ok(Self {
            handshake_info,
            config,
            limiter,
            receiver,
            writer,
            receiver_task,
            system_task,
        })
    }

    /// The handshake result negotiated when this connection was established.
    pub fn handshake_info(&self) -> &HandshakeInfo {
        &self.handshake_info
    }

    /// Issues one request and returns a handle to its replies.
    ///
    /// This is the single entry point every request kind goes through:
    /// the ID reservation, registration, write, and rate-limiter
    /// acknowledgement all happen before this returns; only the ongoing
    /// reply delivery (and, for cancelable kinds, the cancel handshake)
    /// continues in a background task after that.
    pub async fn request<Req: Request>(&self, request: Req) -> GwResult<RequestHandle> {
        lifecycle::run(
            request,
            self.handshake_info.server_version,
            &self.config,
            &self.limiter,
            &self.receiver,
            &self.writer,
        )
        .await
    }

    /// Closes the connection and waits for its background tasks to unwind.
    ///
    /// Any in-flight requests observe their inbound channel close; the
    /// next message they try to receive is `None`.
    pub async fn terminate(self) -> GwResult<()> {
        self.receiver_task.abort();
        self.system_task.abort();
        Ok(())
    }

    /// Waits for the connection to end, whether via [`Connection::terminate`]
    /// or a receiver failure (e.g. the gateway closing the socket).
    ///
    /// Consumes the connection: once a caller has waited on `done`, no
    /// further requests can be issued against it, matching the one-shot
    /// nature of a single TCP session.
    pub async fn done(self) -> GwResult<()> {
        self.system_task.abort();
        match self.receiver_task.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Ok(()),
            Err(e) => Err(GwError::Io(std::io::Error::new(std::io::ErrorKind::Other, e))),
        }
    }
}

/// Reconnects to `addr` whenever the current connection ends, sleeping
/// [`GatewayConfig::reconnect_interval`] between attempts, and hands each
/// successfully (re-)established connection to `on_connect`.
///
/// Runs forever, mirroring the gateway's own expectation that a client
/// stays connected indefinitely; cancel the task this is running in
/// (e.g. via [`tokio::task::JoinHandle::abort`]) to stop it.
pub async fn keep_alive<F, Fut>(
    addr: &str,
    client_id: i64,
    config: GatewayConfig,
    mut on_connect: F,
) -> GwResult<()>
where
    F: FnMut(Connection) -> Fut,
    Fut: std::future::Future<Output = GwResult<()>>,
{
    loop {
        let connection = match Connection::connect(addr, client_id, config.clone()).await {
            Ok(conn) => conn,
            Err(e) => {
                log::warn!("reconnect attempt failed: {e}");
                tokio::time::sleep(config.reconnect_interval()).await;
                continue;
            }
        };

        if let Err(e) = on_connect(connection).await {
            log::warn!("connection ended: {e}");
        }
        tokio::time::sleep(config.reconnect_interval()).await;
    }
}
