//! Transport adapters sitting between the session and the raw stream

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Sink;
use tokio::io::{AsyncRead, ReadBuf};
use tokio::time::Instant;
use tracing::debug;

use super::codec::{packet_kind, Outbound};

/// Inbound reader that remembers when it last produced any bytes.
///
/// Sits below the frame decoder so partial frames count as activity too.
#[derive(Debug)]
pub struct ActivityReader<R> {
    inner: R,
    last_read: Option<Instant>,
}

impl<R> ActivityReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            last_read: None,
        }
    }

    pub fn last_read(&self) -> Option<Instant> {
        self.last_read
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for ActivityReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        let poll = Pin::new(&mut this.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = poll {
            if buf.filled().len() > before {
                this.last_read = Some(Instant::now());
            }
        }
        poll
    }
}

/// Outbound sink wrapper that logs protocol packets as they pass.
///
/// Readiness, flush and close are forwarded untouched; every item given to
/// `start_send` reaches the inner sink unchanged and in order.
#[derive(Debug)]
pub struct OutboundInterceptor<S> {
    inner: S,
    client_id: Arc<str>,
}

impl<S> OutboundInterceptor<S> {
    pub fn new(inner: S, client_id: &str) -> Self {
        Self {
            inner,
            client_id: Arc::from(client_id),
        }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S> Sink<Outbound> for OutboundInterceptor<S>
where
    S: Sink<Outbound> + Unpin,
{
    type Error = S::Error;

    fn poll_ready(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), S::Error>> {
        Pin::new(&mut self.inner).poll_ready(cx)
    }

    fn start_send(mut self: Pin<&mut Self>, item: Outbound) -> Result<(), S::Error> {
        if let Outbound::Packet(packet) = &item {
            debug!(
                "client:{}, write mqtt {} packet: {:?}",
                self.client_id,
                packet_kind(packet),
                packet
            );
        }
        Pin::new(&mut self.inner).start_send(item)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), S::Error>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_close(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), S::Error>> {
        Pin::new(&mut self.inner).poll_close(cx)
    }
}
