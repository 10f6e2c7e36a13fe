//! # MQTT Session Module
//!
//! Client-side session layer of an MQTT 3.1.1 client. A session owns one live
//! transport connection, routes decoded packets to application callbacks and
//! keeps the connection alive with a heartbeat and an inbound idle watchdog.
//!
//! ## Module Architecture
//!
//! ```text
//! mqtt/
//! ├── config.rs           - Connect parameters and the keepalive coefficient
//! ├── error.rs            - Session, codec and parameter errors
//! ├── codec.rs            - tokio-util framing over the rumqttc v4 codec
//! ├── connection.rs       - Per-connection handle given to the delegate
//! ├── delegate.rs         - Delegate trait and the logging default delegate
//! ├── message_manager.rs  - Received message representation and forwarding
//! ├── dispatcher.rs       - Packet kind to delegate callback routing
//! ├── keepalive.rs        - Heartbeat timer and idle watchdog
//! ├── lifecycle.rs        - Accept handling and timer teardown
//! ├── fault.rs            - Terminal fault handling with guaranteed close
//! ├── transport.rs        - Read activity tracking and outbound interceptor
//! ├── status.rs           - Session status published on a watch channel
//! └── session.rs          - Session state machine, run loop and task handle
//! ```
//!
//! ## Data Flow
//!
//! ```text
//! transport ──► ActivityReader ──► MqttCodec ──► dispatcher ──► MqttDelegate
//!     ▲                                                              │
//!     └── OutboundInterceptor ◄── MqttCodec ◄── outbox ◄── ConnectionHandle
//! ```
//!
//! The dispatcher and fault handler are free functions over per-session
//! state, so one delegate can serve many sessions without any of them
//! seeing another's timers or identifiers.

pub mod codec;
pub mod config;
pub mod connection;
pub mod delegate;
pub mod dispatcher;
pub mod error;
pub mod fault;
pub mod keepalive;
pub mod lifecycle;
pub mod message_manager;
pub mod session;
pub mod status;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use codec::{MqttCodec, Outbound};
pub use config::{ConnectParameters, KeepaliveCoefficient};
pub use connection::ConnectionHandle;
pub use delegate::{DelegateResult, LoggingDelegate, MqttDelegate};
pub use error::{CodecError, ConfigError, SessionError};
pub use keepalive::KeepaliveTimings;
pub use message_manager::{MqttMessage, MsgManager};
pub use session::{Session, SessionHandle};
pub use status::{ConnectionState, SessionStatus, TerminationCause};
