//! Keepalive half of the connection lifecycle
//!
//! Holds the per-session timer state that appears once the broker accepts
//! the connection and disappears at teardown.

use tracing::{debug, info, warn};

use super::config::ConnectParameters;
use super::keepalive::{Heartbeat, IdleWatchdog, KeepaliveTimings};

#[derive(Debug)]
pub struct Lifecycle {
    client_id: String,
    timings: KeepaliveTimings,
    accepted: bool,
    pub(crate) heartbeat: Option<Heartbeat>,
    pub(crate) watchdog: Option<IdleWatchdog>,
}

impl Lifecycle {
    pub fn new(params: &ConnectParameters) -> Self {
        Self {
            client_id: params.client_id().to_string(),
            timings: KeepaliveTimings::from_parameters(params),
            accepted: false,
            heartbeat: None,
            watchdog: None,
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.accepted
    }

    pub fn heartbeat_active(&self) -> bool {
        self.heartbeat.is_some()
    }

    pub fn watchdog_installed(&self) -> bool {
        self.watchdog.is_some()
    }

    /// Installs the idle watchdog and starts the heartbeat.
    ///
    /// Runs at most once per session; returns false when the connection was
    /// already accepted and nothing was re-armed.
    pub fn on_accepted(&mut self) -> bool {
        if self.accepted {
            warn!(
                "client:{} received a second accepted CONNACK, keeping existing timers",
                self.client_id
            );
            return false;
        }
        self.accepted = true;

        info!(
            "client:{} connection accepted, heartbeat every {:?}, idle window {:?}",
            self.client_id, self.timings.heartbeat_interval, self.timings.idle_window
        );
        self.watchdog = Some(IdleWatchdog::install(self.timings.idle_window));
        self.heartbeat = Some(Heartbeat::start(self.timings.heartbeat_interval));
        true
    }

    /// Stops the heartbeat; the session keeps running
    pub fn cancel_heartbeat(&mut self) {
        if self.heartbeat.take().is_some() {
            debug!("client:{} heartbeat cancelled", self.client_id);
        }
    }

    /// Cancels the heartbeat and removes the watchdog
    pub fn teardown(&mut self) {
        self.cancel_heartbeat();
        if self.watchdog.take().is_some() {
            debug!("client:{} idle watchdog removed", self.client_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn lifecycle() -> Lifecycle {
        Lifecycle::new(&ConnectParameters::new("c1", 60, 0.8).unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn accept_installs_timers_once() {
        let mut lifecycle = lifecycle();
        assert!(!lifecycle.heartbeat_active());
        assert!(!lifecycle.watchdog_installed());

        assert!(lifecycle.on_accepted());
        assert!(lifecycle.is_accepted());
        assert_eq!(
            lifecycle.heartbeat.as_ref().map(Heartbeat::period),
            Some(Duration::from_millis(48_000))
        );
        assert_eq!(
            lifecycle.watchdog.as_ref().map(IdleWatchdog::window),
            Some(Duration::from_millis(90_000))
        );

        assert!(!lifecycle.on_accepted());
    }

    #[tokio::test(start_paused = true)]
    async fn second_accept_keeps_original_timers() {
        let mut lifecycle = lifecycle();
        lifecycle.on_accepted();
        let start = tokio::time::Instant::now();

        tokio::time::advance(Duration::from_secs(10)).await;
        lifecycle.on_accepted();

        let first = lifecycle.heartbeat.as_mut().unwrap().tick().await;
        assert_eq!(first - start, Duration::from_secs(48));
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_removes_timers() {
        let mut lifecycle = lifecycle();
        lifecycle.on_accepted();
        lifecycle.teardown();
        assert!(!lifecycle.heartbeat_active());
        assert!(!lifecycle.watchdog_installed());
        // still accepted: teardown is terminal
        assert!(!lifecycle.on_accepted());
    }
}
