//! Length-prefixed frame reading and writing.
//!
//! A frame is a 4-byte big-endian unsigned length followed by exactly that
//! many bytes of payload. The payload is a sequence of NUL-terminated UTF-8
//! fields; splitting those into fields is `Message`'s job, not the
//! `Framer`'s — the framer only knows about length prefixes.

use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Maximum frame payload size accepted from the wire.
///
/// The gateway never sends frames anywhere near this size; it exists to
/// bound the `Vec` allocation driven by an attacker- or bug-controlled
/// length prefix.
const MAX_FRAME_LEN: u32 = 64 * 1024 * 1024;

/// Reads length-prefixed frames off an `AsyncRead` half of the connection.
pub(crate) struct FrameReader<R> {
    inner: R,
}

impl<R: AsyncReadExt + Unpin> FrameReader<R> {
    pub(crate) fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Reads one frame's payload. Returns `Ok(None)` on clean EOF between
    /// frames (no bytes of a new frame were seen); any other I/O failure,
    /// including a short read mid-frame, is terminal.
    pub(crate) async fn read_frame(&mut self) -> std::io::Result<Option<Vec<u8>>> {
        let mut len_buf = [0_u8; 4];
        match self.inner.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e),
        }
        let len = u32::from_be_bytes(len_buf);
        if len > MAX_FRAME_LEN {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("frame length {len} exceeds maximum of {MAX_FRAME_LEN}"),
            ));
        }
        let mut payload = vec![0_u8; len as usize];
        self.inner.read_exact(&mut payload).await?;
        log::trace!("frame in: {} bytes", payload.len());
        Ok(Some(payload))
    }
}

/// Writes length-prefixed frames to an `AsyncWrite` half of the connection.
///
/// Owned by exactly one task at a time — the request-lifecycle task that
/// currently holds an ID quote (see [`crate::limiter::IdLimiter`]) — so no
/// internal locking is needed.
pub(crate) struct FrameWriter<W> {
    inner: W,
    scratch: Vec<u8>,
}

impl<W: AsyncWriteExt + Unpin> FrameWriter<W> {
    pub(crate) fn new(inner: W) -> Self {
        Self {
            inner,
            scratch: Vec::with_capacity(256),
        }
    }

    /// Writes one length-prefixed frame and flushes.
    pub(crate) async fn write_frame(&mut self, payload: &[u8]) -> std::io::Result<()> {
        self.scratch.clear();
        self.scratch
            .extend_from_slice(&(payload.len() as u32).to_be_bytes());
        self.scratch.extend_from_slice(payload);
        self.inner.write_all(&self.scratch).await?;
        self.inner.flush().await?;
        log::trace!("frame out: {} bytes", payload.len());
        Ok(())
    }

    /// Writes the raw handshake banner (`API\0`, length, client version
    /// string) — not itself length-prefixed the same way as a regular frame.
    pub(crate) async fn write_banner(&mut self, version_range: &[u8]) -> std::io::Result<()> {
        self.inner.write_all(b"API\0").await?;
        self.inner
            .write_all(&(version_range.len() as u32).to_be_bytes())
            .await?;
        self.inner.write_all(version_range).await?;
        self.inner.flush().await?;
        Ok(())
    }
}
