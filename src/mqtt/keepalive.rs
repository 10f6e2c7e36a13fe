//! Keepalive heartbeat and inbound idle watchdog
//!
//! Both timers belong to exactly one session and are polled from that
//! session's task, so neither needs any synchronisation. They are
//! independent of each other: the heartbeat is spaced by the configured
//! coefficient while the watchdog window is always one and a half keepalive
//! periods.
//!
//! ```text
//! accept ──► Heartbeat ── tick every heartbeat_interval ──► PINGREQ
//!        └─► IdleWatchdog ── no inbound bytes for idle_window ──► close
//! ```

use std::future;
use std::pin::Pin;
use std::time::Duration;

use tokio::time::{self, Instant, Interval, MissedTickBehavior, Sleep};

use super::config::ConnectParameters;

/// Timer periods derived from the connect parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepaliveTimings {
    pub heartbeat_interval: Duration,
    pub idle_window: Duration,
}

impl KeepaliveTimings {
    pub fn from_parameters(params: &ConnectParameters) -> Self {
        let keepalive_ms = u64::from(params.keepalive_secs()) * 1000;
        let heartbeat_ms = params.coefficient().apply(keepalive_ms).max(1);
        let idle_ms = keepalive_ms + (keepalive_ms >> 1);

        Self {
            heartbeat_interval: Duration::from_millis(heartbeat_ms),
            idle_window: Duration::from_millis(idle_ms),
        }
    }
}

/// Repeating heartbeat timer. Dropping it cancels all future ticks.
#[derive(Debug)]
pub struct Heartbeat {
    ticker: Interval,
}

impl Heartbeat {
    /// Starts the timer; the first tick comes one full period from now
    pub fn start(period: Duration) -> Self {
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { ticker }
    }

    pub fn period(&self) -> Duration {
        self.ticker.period()
    }

    pub async fn tick(&mut self) -> Instant {
        self.ticker.tick().await
    }
}

/// Waits for the next tick of an optional heartbeat, forever if there is none
pub async fn next_tick(heartbeat: &mut Option<Heartbeat>) -> Instant {
    match heartbeat {
        Some(heartbeat) => heartbeat.tick().await,
        None => future::pending().await,
    }
}

/// Outcome of a watchdog deadline check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleCheck {
    /// Inbound data arrived in time; the deadline moved to the given instant
    Rearmed(Instant),
    /// No inbound data for a whole window. Reported only once.
    Idle,
}

/// Read-inactivity timer for the inbound path
#[derive(Debug)]
pub struct IdleWatchdog {
    window: Duration,
    installed_at: Instant,
    deadline: Pin<Box<Sleep>>,
    fired: bool,
}

impl IdleWatchdog {
    pub fn install(window: Duration) -> Self {
        let installed_at = Instant::now();
        Self {
            window,
            installed_at,
            deadline: Box::pin(time::sleep_until(installed_at + window)),
            fired: false,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Resolves when the current deadline passes. Never resolves once the
    /// watchdog has reported idle.
    pub async fn expired(&mut self) {
        if self.fired {
            return future::pending().await;
        }
        self.deadline.as_mut().await
    }

    /// Compares the deadline against the last inbound read and either
    /// re-arms or reports idle
    pub fn check(&mut self, last_read: Option<Instant>) -> IdleCheck {
        let reference = match last_read {
            Some(read_at) if read_at > self.installed_at => read_at,
            _ => self.installed_at,
        };
        let idle_at = reference + self.window;

        if Instant::now() >= idle_at {
            self.fired = true;
            IdleCheck::Idle
        } else {
            self.deadline.as_mut().reset(idle_at);
            IdleCheck::Rearmed(idle_at)
        }
    }
}

/// Waits for the deadline of an optional watchdog, forever if there is none
pub async fn next_deadline(watchdog: &mut Option<IdleWatchdog>) {
    match watchdog {
        Some(watchdog) => watchdog.expired().await,
        None => future::pending().await,
    }
}
