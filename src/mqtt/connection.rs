//! Per-connection handle shared with the delegate
//!
//! A [`ConnectionHandle`] is the delegate's view of one live transport
//! connection: it can queue writes and request a close, but never touches the
//! transport directly. Everything it queues is drained by the session task
//! that owns the connection, so writes stay ordered and never block the
//! caller.

use std::sync::Arc;

use bytes::Bytes;
use rumqttc::mqttbytes::v4::Packet;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::codec::Outbound;

#[derive(Clone, Debug)]
pub struct ConnectionHandle {
    client_id: Arc<str>,
    outbox: mpsc::UnboundedSender<Outbound>,
    closed: CancellationToken,
}

impl ConnectionHandle {
    /// Creates a handle together with the receiving end of its outbox
    pub fn new(client_id: &str) -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (outbox, outbox_rx) = mpsc::unbounded_channel();
        let handle = Self {
            client_id: Arc::from(client_id),
            outbox,
            closed: CancellationToken::new(),
        };
        (handle, outbox_rx)
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// True until a close has been requested or the session has ended
    pub fn is_active(&self) -> bool {
        !self.closed.is_cancelled()
    }

    /// Queues a packet for writing. Returns false if the connection is gone.
    pub fn write(&self, packet: Packet) -> bool {
        self.queue(Outbound::Packet(packet))
    }

    /// Queues raw bytes for writing, bypassing the packet encoder
    pub fn write_raw(&self, bytes: Bytes) -> bool {
        self.queue(Outbound::Raw(bytes))
    }

    fn queue(&self, item: Outbound) -> bool {
        if !self.is_active() {
            debug!(
                "client:{} dropping write on inactive connection",
                self.client_id
            );
            return false;
        }
        match self.outbox.send(item) {
            Ok(()) => true,
            Err(_) => {
                warn!("client:{} outbox closed, write dropped", self.client_id);
                false
            }
        }
    }

    /// Requests the connection to close. Idempotent; returns true only for
    /// the call that initiated the close.
    pub fn close(&self) -> bool {
        if self.closed.is_cancelled() {
            return false;
        }
        debug!("client:{} close requested", self.client_id);
        self.closed.cancel();
        true
    }

    /// Resolves once a close has been requested
    pub async fn closed(&self) {
        self.closed.cancelled().await
    }
}
