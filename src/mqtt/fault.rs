//! Terminal fault handling for a session

use std::any::Any;

use tracing::{debug, error, warn};

use super::connection::ConnectionHandle;
use super::delegate::MqttDelegate;
use super::error::SessionError;

/// Closes the connection when dropped, including during unwinding
pub(crate) struct CloseOnDrop {
    conn: ConnectionHandle,
}

impl CloseOnDrop {
    pub(crate) fn new(conn: &ConnectionHandle) -> Self {
        Self { conn: conn.clone() }
    }
}

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        if self.conn.close() {
            debug!("client:{} connection closed on drop", self.conn.client_id());
        }
    }
}

/// Reports a fault to the delegate and closes the connection.
///
/// The close is tied to a drop guard, so it happens even if `on_fault`
/// returns an error or panics.
pub fn handle_fault(delegate: &dyn MqttDelegate, conn: &ConnectionHandle, fault: &SessionError) {
    let _close = CloseOnDrop::new(conn);

    error!(
        "client:{} encountered an exception in the connection: {}",
        conn.client_id(),
        fault
    );
    if let Err(e) = delegate.on_fault(conn, fault) {
        warn!(
            "client:{} fault callback failed: {:#}",
            conn.client_id(),
            e
        );
    }
}

/// Turns a panic caught in the session task into a reported fault
pub fn handle_panic(
    delegate: &dyn MqttDelegate,
    conn: &ConnectionHandle,
    payload: Box<dyn Any + Send>,
) -> SessionError {
    let fault = SessionError::Task {
        client_id: conn.client_id().to_string(),
        message: format!("panicked: {}", panic_message(&*payload)),
    };
    handle_fault(delegate, conn, &fault);
    fault
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown cause"
    }
}
