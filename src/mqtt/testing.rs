//! Delegate double shared by the unit tests

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use color_eyre::eyre::eyre;
use rumqttc::mqttbytes::v4::{ConnAck, PubAck, PubComp, PubRec, PubRel, Publish, SubAck, UnsubAck};

use super::connection::ConnectionHandle;
use super::delegate::{DelegateResult, MqttDelegate};
use super::error::SessionError;

#[derive(Default)]
pub(crate) struct RecordingDelegate {
    calls: Mutex<Vec<&'static str>>,
    failing: Mutex<HashSet<&'static str>>,
    panic_on_fault: AtomicBool,
}

impl RecordingDelegate {
    pub(crate) fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn fail_on(&self, callback: &'static str) {
        self.failing.lock().unwrap().insert(callback);
    }

    pub(crate) fn panic_on_fault(&self) {
        self.panic_on_fault.store(true, Ordering::SeqCst);
    }

    fn record(&self, callback: &'static str) -> DelegateResult {
        self.calls.lock().unwrap().push(callback);
        if self.failing.lock().unwrap().contains(callback) {
            return Err(eyre!("{} failed on purpose", callback));
        }
        Ok(())
    }
}

impl MqttDelegate for RecordingDelegate {
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
        self.record("on_fault")?;
        if self.panic_on_fault.load(Ordering::SeqCst) {
            panic!("on_fault panicked on purpose");
        }
        Ok(())
    }
}
