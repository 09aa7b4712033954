//! The connection handshake: banner exchange, `startApi`, and the initial
//! `nextValidId`/`managedAccounts` pair every connection waits for before
//! it is usable.

use std::time::Instant;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;

use crate::config::GatewayConfig;
use crate::error::{GwError, GwResult};
use crate::wire::codes;
use crate::wire::{FrameReader, FrameWriter, Message};

/// Everything learned from the gateway during the handshake.
#[derive(Debug, Clone)]
pub struct HandshakeInfo {
    /// The server's negotiated protocol version.
    pub server_version: i64,
    /// The server-reported connection time, as the raw string it sent —
    /// parsing it into a concrete timestamp type is a codec concern.
    pub connection_time: String,
    /// The first order ID the client may use, per the gateway.
    pub next_valid_id: i64,
    /// Managed account names, in the order the gateway listed them.
    pub managed_accounts: Vec<String>,
}

/// Runs the handshake to completion over an already-connected socket.
///
/// Returns the negotiated [`HandshakeInfo`] plus any frames that arrived
/// before both required fields were seen (an oddly-ordered or chatty
/// gateway can interleave unrelated pushes into the handshake window) —
/// those frames still need routing once the receiver task starts.
pub(crate) async fn perform<R, W>(
    reader: &mut FrameReader<R>,
    writer: &mut FrameWriter<W>,
    config: &GatewayConfig,
    client_id: i64,
) -> GwResult<(HandshakeInfo, Vec<Vec<u8>>)>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    timeout(config.handshake_timeout(), run(reader, writer, config, client_id))
        .await
        .map_err(|_| GwError::Handshake(Box::new(GwError::Timeout)))?
        .map_err(|e| GwError::Handshake(Box::new(e)))
}

async fn run<R, W>(
    reader: &mut FrameReader<R>,
    writer: &mut FrameWriter<W>,
    config: &GatewayConfig,
    client_id: i64,
) -> GwResult<(HandshakeInfo, Vec<Vec<u8>>)>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let start = Instant::now();
    let (min, max) = config.client_version_range();
    let version_range = format!("v{min}..{max}");
    writer.write_banner(version_range.as_bytes()).await?;
    log::trace!("handshake: banner sent ({min}..{max})");

    let mut pending = Vec::new();

    // The banner reply is the one frame in this protocol with exactly two
    // fields and no leading request code: server version and connection
    // time. Anything else seen before it is buffered, not discarded.
    let (server_version, connection_time) = loop {
        let payload = reader
            .read_frame()
            .await?
            .ok_or(GwError::Disconnected)?;
        let fields = split_fields(&payload);
        if fields.len() == 2 {
            let server_version: i64 = fields[0].parse().map_err(|_| {
                GwError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "non-numeric server version in handshake banner reply",
                ))
            })?;
            break (server_version, fields[1].clone());
        }
        pending.push(payload);
    };
    log::debug!("handshake: server version {server_version}");

    write_start_api(writer, client_id).await?;
    log::trace!("handshake: start-api sent");

    let mut next_valid_id = None;
    let mut managed_accounts = None;
    while next_valid_id.is_none() || managed_accounts.is_none() {
        let payload = reader
            .read_frame()
            .await?
            .ok_or(GwError::Disconnected)?;
        let mut msg = Message::parse(&payload)?;
        let code: i32 = msg.read_int()?;
        if code == codes::NEXT_VALID_ID {
            let _version: i64 = msg.read_int()?;
            next_valid_id = Some(msg.read_int()?);
        } else if code == codes::MANAGED_ACCOUNTS {
            let _version: i64 = msg.read_int()?;
            let accounts = msg.read_string()?;
            managed_accounts = Some(
                accounts
                    .split(',')
                    .filter(|s| !s.is_empty())
                    .map(str::to_owned)
                    .collect(),
            );
        } else {
            pending.push(payload);
        }
    }

    log::debug!(
        "handshake complete in {} ms",
        Instant::now().duration_since(start).as_millis()
    );

    Ok((
        HandshakeInfo {
            server_version,
            connection_time,
            next_valid_id: next_valid_id.expect("loop only exits once both fields are set"),
            managed_accounts: managed_accounts.expect("loop only exits once both fields are set"),
        },
        pending,
    ))
}

async fn write_start_api<W: AsyncWrite + Unpin>(
    writer: &mut FrameWriter<W>,
    client_id: i64,
) -> GwResult<()> {
    const START_API_CODE: i32 = 71;
    const START_API_VERSION: i32 = 2;
    let mut payload = Vec::new();
    for field in [
        START_API_CODE.to_string(),
        START_API_VERSION.to_string(),
        client_id.to_string(),
        String::new(),
    ] {
        payload.extend_from_slice(field.as_bytes());
        payload.push(0);
    }
    writer.write_frame(&payload).await?;
    Ok(())
}

fn split_fields(payload: &[u8]) -> Vec<String> {
    let text = String::from_utf8_lossy(payload);
    let mut fields: Vec<String> = text.split('\0').map(str::to_owned).collect();
    if fields.last().map(String::is_empty).unwrap_or(false) {
        fields.pop();
    }
    fields
}
