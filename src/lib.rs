//! Client-side MQTT session layer: connection lifecycle, packet dispatch,
//! keepalive heartbeat and idle watchdog.

pub mod config;
pub mod mqtt;
