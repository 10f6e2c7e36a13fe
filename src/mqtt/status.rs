use chrono::{DateTime, Local};
use tokio::sync::watch;

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Connecting,
    Connected,
    Terminated,
}

/// Why a session ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TerminationCause {
    /// The peer closed the transport
    PeerClosed,
    /// A close was requested through the connection handle
    LocalClose,
    /// No inbound data within the idle window
    IdleTimeout,
    /// A decode, I/O or delegate fault
    Fault,
}

/// Snapshot of a session, published on a watch channel
#[derive(Clone, Debug, Default)]
pub struct SessionStatus {
    pub connection_state: ConnectionState,
    pub accepted: bool,
    pub packets_received: usize,
    /// Inbound packets of a kind a broker never sends to a client
    pub packets_ignored: usize,
    pub packets_sent: usize,
    pub heartbeats_sent: usize,
    pub last_activity: Option<DateTime<Local>>,
    pub termination: Option<TerminationCause>,
}

pub(crate) fn channel() -> (watch::Sender<SessionStatus>, watch::Receiver<SessionStatus>) {
    watch::channel(SessionStatus::default())
}
