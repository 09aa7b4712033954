//! The shared handle request-lifecycle tasks use to write framed requests.
//!
//! Within a single ID class, at most one task ever holds a quote at a
//! time — that class's serving loop blocks on a quote's `ack` before
//! issuing the next one. Across classes, two lifecycle tasks can race to
//! write concurrently (e.g. a ticker request and an order request both
//! holding a fresh quote at once); the `Mutex` below is what actually
//! prevents their frames from interleaving on the wire, since nothing
//! upstream of it serializes writes across classes.

use std::sync::Arc;

use tokio::io::AsyncWrite;
use tokio::sync::Mutex;

use crate::error::GwResult;
use crate::wire::FrameWriter;

/// Cloneable handle onto the connection's single write half.
pub(crate) struct SharedWriter {
    inner: Arc<Mutex<dyn FramedWrite + Send>>,
}

impl Clone for SharedWriter {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

trait FramedWrite {
    fn write_request<'a>(
        &'a mut self,
        body: &'a [u8],
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = GwResult<()>> + Send + 'a>>;
}

impl<W: AsyncWrite + Unpin + Send> FramedWrite for FrameWriter<W> {
    fn write_request<'a>(
        &'a mut self,
        body: &'a [u8],
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = GwResult<()>> + Send + 'a>> {
        Box::pin(async move { Ok(self.write_frame(body).await?) })
    }
}

impl SharedWriter {
    pub(crate) fn new<W: AsyncWrite + Unpin + Send + 'static>(inner: FrameWriter<W>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    /// Writes one length-prefixed request frame.
    pub(crate) async fn write_request(&self, body: &[u8]) -> GwResult<()> {
        let mut guard = self.inner.lock().await;
        guard.write_request(body).await
    }
}
