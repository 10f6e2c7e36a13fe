//! Shared helpers for session integration tests

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use color_eyre::eyre::eyre;
use futures::{SinkExt, StreamExt};
use mqtt_session::mqtt::{
    ConnectParameters, ConnectionHandle, DelegateResult, MqttCodec, MqttDelegate, Outbound,
    SessionError, SessionHandle,
};
use rumqttc::mqttbytes::v4::{
    ConnAck, ConnectReturnCode, Packet, PubAck, PubComp, PubRec, PubRel, Publish, SubAck, UnsubAck,
};
use tokio::io::DuplexStream;
use tokio::time::Instant;
use tokio_util::codec::Framed;

/// Broker end of an in-memory connection
pub type Broker = Framed<DuplexStream, MqttCodec>;

/// Delegate that records every callback with the time it ran
#[derive(Default)]
pub struct Recorder {
    calls: Mutex<Vec<(&'static str, Instant)>>,
    failing: Mutex<HashSet<&'static str>>,
    panicking: Mutex<HashSet<&'static str>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().iter().map(|(name, _)| *name).collect()
    }

    pub fn count(&self, callback: &str) -> usize {
        self.calls().iter().filter(|name| **name == callback).count()
    }

    pub fn fail_on(&self, callback: &'static str) {
        self.failing.lock().unwrap().insert(callback);
    }

    pub fn panic_on(&self, callback: &'static str) {
        self.panicking.lock().unwrap().insert(callback);
    }

    fn record(&self, callback: &'static str) -> DelegateResult {
        self.calls.lock().unwrap().push((callback, Instant::now()));
        if self.panicking.lock().unwrap().contains(callback) {
            panic!("{} panicked in test", callback);
        }
        if self.failing.lock().unwrap().contains(callback) {
            return Err(eyre!("{} rejected by test", callback));
        }
        Ok(())
    }
}

impl MqttDelegate for Recorder {
    fn on_connect(&self, _conn: &ConnectionHandle) -> DelegateResult {
        self.record("on_connect")
    }

    fn connack(&self, _conn: &ConnectionHandle, _ack: &ConnAck) -> DelegateResult {
        self.record("connack")
    }

    fn suback(&self, _conn: &ConnectionHandle, _ack: &SubAck) -> DelegateResult {
        self.record("suback")
    }

    fn unsuback(&self, _conn: &ConnectionHandle, _ack: &UnsubAck) -> DelegateResult {
        self.record("unsuback")
    }

    fn pingresp(&self, _conn: &ConnectionHandle) -> DelegateResult {
        self.record("pingresp")
    }

    fn publish(&self, _conn: &ConnectionHandle, _publish: &Publish) -> DelegateResult {
        self.record("publish")
    }

    fn puback(&self, _conn: &ConnectionHandle, _ack: &PubAck) -> DelegateResult {
        self.record("puback")
    }

    fn pubrec(&self, _conn: &ConnectionHandle, _rec: &PubRec) -> DelegateResult {
        self.record("pubrec")
    }

    fn pubrel(&self, _conn: &ConnectionHandle, _rel: &PubRel) -> DelegateResult {
        self.record("pubrel")
    }

    fn pubcomp(&self, _conn: &ConnectionHandle, _comp: &PubComp) -> DelegateResult {
        self.record("pubcomp")
    }

    fn on_disconnect(&self, _conn: &ConnectionHandle) -> DelegateResult {
        self.record("on_disconnect")
    }

    fn on_fault(&self, _conn: &ConnectionHandle, _fault: &SessionError) -> DelegateResult {
        self.record("on_fault")
    }
}

pub fn params(keepalive_secs: u16, coefficient: f64) -> ConnectParameters {
    ConnectParameters::new("test-client", keepalive_secs, coefficient).unwrap()
}

/// Spawns a session over an in-memory pipe and returns the broker end
pub fn start(params: ConnectParameters, delegate: Arc<Recorder>) -> (SessionHandle, Broker) {
    let (client, broker) = tokio::io::duplex(4096);
    let session = SessionHandle::spawn(client, params, delegate);
    (session, Framed::new(broker, MqttCodec::default()))
}

pub async fn send(broker: &mut Broker, packet: Packet) {
    broker.send(Outbound::Packet(packet)).await.unwrap();
}

pub async fn accept(broker: &mut Broker) {
    send(broker, Packet::ConnAck(ConnAck::new(ConnectReturnCode::Success, false))).await;
}

/// Next packet the client wrote, or `None` once the client closed
pub async fn next_packet(broker: &mut Broker) -> Option<Packet> {
    match broker.next().await {
        Some(Ok(packet)) => Some(packet),
        Some(Err(e)) => panic!("broker failed to decode client bytes: {}", e),
        None => None,
    }
}

/// Asserts that `start + expected <= now` within one timer tick
pub fn assert_elapsed(start: Instant, expected: Duration) {
    let elapsed = start.elapsed();
    assert!(
        elapsed >= expected && elapsed <= expected + Duration::from_millis(5),
        "expected {:?} to have passed, got {:?}",
        expected,
        elapsed
    );
}
