//! Connection session with statum state machine for one transport connection
//!
//! Every connection gets its own session running in its own tokio task. The
//! task owns the transport, the keepalive timers and the outbox, so all
//! events for one connection are handled one after another and nothing in
//! the session needs a lock.
//!
//! # State Machine
//!
//! ```text
//! Connecting ──► Connected ──► Terminated
//!  (on_connect)   (run loop)    (teardown, terminal notification)
//! ```
//!
//! # Run Loop
//!
//! ```text
//!            ┌─ close requested ──────────────► LocalClose
//!            ├─ inbound frame ──► dispatcher ─► delegate
//! select! ───┼─ outbox item ────► interceptor ► transport
//!            ├─ heartbeat tick ─► send_pingreq
//!            └─ idle deadline ──► IdleTimeout
//! ```

use std::sync::Arc;

use chrono::Local;
use std::panic::AssertUnwindSafe;

use futures::{FutureExt, SinkExt, StreamExt};
use rumqttc::mqttbytes::v4::Packet;
use statum::{machine, state};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, error, info, warn};

use super::codec::{MqttCodec, Outbound, DEFAULT_MAX_PACKET_SIZE};
use super::config::ConnectParameters;
use super::connection::ConnectionHandle;
use super::delegate::MqttDelegate;
use super::dispatcher::{self, Dispatched};
use super::error::SessionError;
use super::fault;
use super::keepalive::{self, IdleCheck};
use super::lifecycle::Lifecycle;
use super::status::{self, ConnectionState, SessionStatus, TerminationCause};
use super::transport::{ActivityReader, OutboundInterceptor};

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;
type Inbound = FramedRead<ActivityReader<BoxedReader>, MqttCodec>;
type OutboundSink = OutboundInterceptor<FramedWrite<BoxedWriter, MqttCodec>>;

/// States for the session lifecycle using statum
#[state]
#[derive(Debug, Clone)]
pub enum SessionState {
    Connecting,                  // Transport up, delegate not told yet
    Connected,                   // Run loop active
    Terminated(TerminationCause), // Loop left, teardown pending
}

#[machine]
pub struct Session<S: SessionState> {
    conn: ConnectionHandle,
    delegate: Arc<dyn MqttDelegate>,
    inbound: Inbound,
    outbound: OutboundSink,
    outbox: mpsc::UnboundedReceiver<Outbound>,
    lifecycle: Lifecycle,
    status: watch::Sender<SessionStatus>,
    fault: Option<SessionError>,
}

impl<S: SessionState> Session<S> {
    pub fn client_id(&self) -> &str {
        self.conn.client_id()
    }

    pub fn connection(&self) -> &ConnectionHandle {
        &self.conn
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    fn update_status(&self, update: impl FnOnce(&mut SessionStatus)) {
        self.status.send_modify(update);
    }
}

impl Session<Connecting> {
    /// Wraps a connected transport. Nothing is read or written until the
    /// session is activated.
    pub fn create<T>(
        transport: T,
        params: &ConnectParameters,
        delegate: Arc<dyn MqttDelegate>,
        max_packet_size: usize,
    ) -> Self
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let client_id = params.client_id();
        debug!(
            "Creating session for client:{} keepalive {}s, coefficient {}",
            client_id,
            params.keepalive_secs(),
            params.coefficient().as_f64()
        );

        let (reader, writer) = tokio::io::split(transport);
        let reader: BoxedReader = Box::new(reader);
        let writer: BoxedWriter = Box::new(writer);

        let inbound = FramedRead::new(ActivityReader::new(reader), MqttCodec::new(max_packet_size));
        let outbound = OutboundInterceptor::new(
            FramedWrite::new(writer, MqttCodec::new(max_packet_size)),
            client_id,
        );
        let (conn, outbox) = ConnectionHandle::new(client_id);
        let (status_sender, _) = status::channel();

        Self::new(
            conn,
            delegate,
            inbound,
            outbound,
            outbox,
            Lifecycle::new(params),
            status_sender,
            None, // fault
        )
    }

    /// Transport-active: tells the delegate and enters the run state.
    /// No keepalive timers exist until the broker accepts the connection.
    pub fn activate(mut self) -> Session<Connected> {
        info!("client:{} tcp connection successful", self.client_id());
        self.update_status(|s| s.connection_state = ConnectionState::Connected);

        if let Err(e) = self.delegate.on_connect(&self.conn) {
            self.fault = Some(SessionError::Delegate {
                client_id: self.client_id().to_string(),
                callback: "on_connect",
                message: format!("{:#}", e),
            });
        }
        self.transition()
    }
}

impl Session<Connected> {
    /// Runs until the connection closes, goes idle or faults
    pub async fn run(mut self) -> Session<Terminated> {
        let cause = if self.fault.is_some() {
            TerminationCause::Fault
        } else {
            self.run_until_terminated().await
        };

        debug!(
            "client:{} transitioning to Terminated state: {:?}",
            self.client_id(),
            cause
        );
        self.update_status(|s| {
            s.connection_state = ConnectionState::Terminated;
            s.termination = Some(cause);
        });
        self.transition_with(cause)
    }

    async fn run_until_terminated(&mut self) -> TerminationCause {
        loop {
            tokio::select! {
                biased;

                _ = self.conn.closed() => {
                    info!("client:{} close requested", self.client_id());
                    return TerminationCause::LocalClose;
                }

                frame = self.inbound.next() => match frame {
                    Some(Ok(packet)) => {
                        if let Err(e) = self.on_packet(packet) {
                            self.fault = Some(e);
                            return TerminationCause::Fault;
                        }
                    }
                    Some(Err(e)) => {
                        self.fault = Some(SessionError::from_codec(self.conn.client_id(), e));
                        return TerminationCause::Fault;
                    }
                    None => {
                        info!("client:{} tcp disconnected", self.client_id());
                        return TerminationCause::PeerClosed;
                    }
                },

                Some(item) = self.outbox.recv() => {
                    if let Err(e) = self.write(item).await {
                        self.fault = Some(e);
                        return TerminationCause::Fault;
                    }
                }

                _ = keepalive::next_tick(&mut self.lifecycle.heartbeat) => {
                    self.on_heartbeat();
                }

                _ = keepalive::next_deadline(&mut self.lifecycle.watchdog) => {
                    if self.on_idle_deadline() {
                        return TerminationCause::IdleTimeout;
                    }
                }
            }
        }
    }

    fn on_packet(&mut self, packet: Packet) -> Result<(), SessionError> {
        self.update_status(|s| {
            s.packets_received += 1;
            s.last_activity = Some(Local::now());
        });

        let outcome = dispatcher::dispatch(
            &mut self.lifecycle,
            self.delegate.as_ref(),
            &self.conn,
            &packet,
        )?;

        let accepted = self.lifecycle.is_accepted();
        self.update_status(|s| {
            s.accepted = accepted;
            if let Dispatched::Ignored(_) = outcome {
                s.packets_ignored += 1;
            }
        });
        Ok(())
    }

    async fn write(&mut self, item: Outbound) -> Result<(), SessionError> {
        if let Err(e) = self.outbound.send(item).await {
            return Err(SessionError::from_codec(self.conn.client_id(), e));
        }
        self.update_status(|s| s.packets_sent += 1);
        Ok(())
    }

    fn on_heartbeat(&mut self) {
        if !self.conn.is_active() {
            self.lifecycle.cancel_heartbeat();
            return;
        }
        debug!("client:{} sending heartbeat", self.client_id());
        self.delegate.send_pingreq(&self.conn);
        self.update_status(|s| s.heartbeats_sent += 1);
    }

    /// Returns true when the connection has been idle for a whole window
    fn on_idle_deadline(&mut self) -> bool {
        let last_read = self.inbound.get_ref().last_read();
        let Some(watchdog) = self.lifecycle.watchdog.as_mut() else {
            return false;
        };
        match watchdog.check(last_read) {
            IdleCheck::Idle => {
                warn!(
                    "client:{} read timeout after {:?}, will disconnect",
                    self.conn.client_id(),
                    watchdog.window()
                );
                true
            }
            IdleCheck::Rearmed(deadline) => {
                debug!(
                    "client:{} inbound activity seen, idle deadline moved to {:?}",
                    self.conn.client_id(),
                    deadline
                );
                false
            }
        }
    }
}

impl Session<Terminated> {
    /// Tears the session down and sends the single terminal notification
    pub async fn finish(mut self) -> Result<TerminationCause, SessionError> {
        let cause = self
            .get_state_data()
            .copied()
            .unwrap_or(TerminationCause::Fault);

        self.lifecycle.teardown();

        if cause == TerminationCause::LocalClose {
            self.flush_outbox().await;
        }

        let result = match self.fault.take() {
            Some(fault) => {
                fault::handle_fault(self.delegate.as_ref(), &self.conn, &fault);
                Err(fault)
            }
            None => {
                self.conn.close();
                if let Err(e) = self.delegate.on_disconnect(&self.conn) {
                    warn!(
                        "client:{} disconnect callback failed: {:#}",
                        self.client_id(),
                        e
                    );
                }
                Ok(cause)
            }
        };

        self.close_transport().await;
        result
    }

    /// Writes whatever was queued before the close was requested
    async fn flush_outbox(&mut self) {
        while let Ok(item) = self.outbox.try_recv() {
            if let Err(e) = self.outbound.feed(item).await {
                warn!(
                    "client:{} dropping queued writes on close: {}",
                    self.client_id(),
                    e
                );
                return;
            }
        }
    }

    async fn close_transport(&mut self) {
        match self.outbound.close().await {
            Ok(()) => debug!("client:{} transport closed", self.client_id()),
            Err(e) => debug!(
                "client:{} transport close reported: {}",
                self.client_id(),
                e
            ),
        }
    }
}

/// Handle for a session running in its own tokio task
pub struct SessionHandle {
    client_id: String,
    conn: ConnectionHandle,
    status: watch::Receiver<SessionStatus>,
    task_handle: JoinHandle<Result<TerminationCause, SessionError>>,
}

impl SessionHandle {
    /// Spawns a session over an already connected transport
    pub fn spawn<T>(transport: T, params: ConnectParameters, delegate: Arc<dyn MqttDelegate>) -> Self
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        Self::spawn_with_limit(transport, params, delegate, DEFAULT_MAX_PACKET_SIZE)
    }

    pub fn spawn_with_limit<T>(
        transport: T,
        params: ConnectParameters,
        delegate: Arc<dyn MqttDelegate>,
        max_packet_size: usize,
    ) -> Self
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let session = Session::create(transport, &params, Arc::clone(&delegate), max_packet_size);
        let conn = session.connection().clone();
        let status = session.subscribe();
        let client_id = params.client_id().to_string();

        let task_conn = conn.clone();
        let task_handle = tokio::spawn(async move {
            info!("Spawning session for client:{}", task_conn.client_id());
            let _close = fault::CloseOnDrop::new(&task_conn);

            // a panicking callback takes the session with it; the delegate
            // still gets its terminal notification
            let outcome = AssertUnwindSafe(async move { session.activate().run().await })
                .catch_unwind()
                .await;
            match outcome {
                Ok(terminated) => terminated.finish().await,
                Err(payload) => Err(fault::handle_panic(delegate.as_ref(), &task_conn, payload)),
            }
        });

        Self {
            client_id,
            conn,
            status,
            task_handle,
        }
    }

    pub fn connection(&self) -> &ConnectionHandle {
        &self.conn
    }

    pub fn status(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    /// Waits for the session to end on its own
    pub async fn join(self) -> Result<TerminationCause, SessionError> {
        match self.task_handle.await {
            Ok(result) => result,
            Err(e) => {
                error!("Session task failed: {} - {}", self.client_id, e);
                Err(SessionError::Task {
                    client_id: self.client_id,
                    message: e.to_string(),
                })
            }
        }
    }

    /// Requests a close and waits for teardown to complete
    pub async fn shutdown(self) -> Result<TerminationCause, SessionError> {
        debug!("Sending shutdown signal to session: {}", self.client_id);
        self.conn.close();
        self.join().await
    }
}
