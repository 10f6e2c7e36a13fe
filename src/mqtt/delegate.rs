//! Application callbacks for a session
//!
//! The session layer only decides *which* callback runs and *when*; what a
//! callback does with a packet is up to the [`MqttDelegate`] implementation.
//! One delegate instance may be shared by any number of sessions, so all
//! callbacks take `&self` and receive the [`ConnectionHandle`] of the
//! connection they are called for.

use std::sync::atomic::{AtomicU16, Ordering};

use color_eyre::eyre::eyre;
use rumqttc::mqttbytes::v4::{
    ConnAck, Connect, ConnectReturnCode, Packet, PubAck, PubComp, PubRec, PubRel, Publish, SubAck,
    Subscribe, UnsubAck,
};
use rumqttc::mqttbytes::QoS;
use tracing::{debug, info, warn};

use super::config::ConnectParameters;
use super::connection::ConnectionHandle;
use super::error::SessionError;
use super::message_manager::{MqttMessage, MsgManager};

/// Result of a delegate callback. An error ends the session through the
/// fault path.
pub type DelegateResult = color_eyre::Result<()>;

/// Per-packet-kind application callbacks
pub trait MqttDelegate: Send + Sync + 'static {
    /// The transport is up. No CONNACK has been seen yet.
    fn on_connect(&self, conn: &ConnectionHandle) -> DelegateResult;

    /// Runs after keepalive timers are installed when the ack is accepted
    fn connack(&self, conn: &ConnectionHandle, ack: &ConnAck) -> DelegateResult;

    fn suback(&self, conn: &ConnectionHandle, ack: &SubAck) -> DelegateResult;

    fn unsuback(&self, conn: &ConnectionHandle, ack: &UnsubAck) -> DelegateResult;

    fn pingresp(&self, conn: &ConnectionHandle) -> DelegateResult;

    fn publish(&self, conn: &ConnectionHandle, publish: &Publish) -> DelegateResult;

    fn puback(&self, conn: &ConnectionHandle, ack: &PubAck) -> DelegateResult;

    fn pubrec(&self, conn: &ConnectionHandle, rec: &PubRec) -> DelegateResult;

    fn pubrel(&self, conn: &ConnectionHandle, rel: &PubRel) -> DelegateResult;

    fn pubcomp(&self, conn: &ConnectionHandle, comp: &PubComp) -> DelegateResult;

    /// Terminal notification for a connection that ended without a fault
    fn on_disconnect(&self, conn: &ConnectionHandle) -> DelegateResult;

    /// Terminal notification for a connection that ended with a fault.
    /// The connection is closed afterwards whatever this returns.
    fn on_fault(&self, conn: &ConnectionHandle, fault: &SessionError) -> DelegateResult;

    /// Called by the heartbeat on every tick while the connection is active
    fn send_pingreq(&self, conn: &ConnectionHandle) {
        conn.write(Packet::PingReq);
    }
}

/// Delegate that logs every packet, performs the protocol-level replies a
/// client owes the broker and forwards received messages to the application.
pub struct LoggingDelegate {
    params: ConnectParameters,
    subscriptions: Vec<String>,
    messages: MsgManager,
    next_pkid: AtomicU16,
}

impl LoggingDelegate {
    pub fn new(
        params: ConnectParameters,
        subscriptions: Vec<String>,
        messages: MsgManager,
    ) -> Self {
        Self {
            params,
            subscriptions,
            messages,
            next_pkid: AtomicU16::new(1),
        }
    }

    fn pkid(&self) -> u16 {
        loop {
            let pkid = self.next_pkid.fetch_add(1, Ordering::Relaxed);
            if pkid != 0 {
                return pkid;
            }
        }
    }
}

impl MqttDelegate for LoggingDelegate {
    fn on_connect(&self, conn: &ConnectionHandle) -> DelegateResult {
        let mut connect = Connect::new(self.params.client_id());
        connect.keep_alive = self.params.keepalive_secs();
        connect.clean_session = true;
        info!("client:{} sending CONNECT", conn.client_id());
        conn.write(Packet::Connect(connect));
        Ok(())
    }

    fn connack(&self, conn: &ConnectionHandle, ack: &ConnAck) -> DelegateResult {
        if ack.code != ConnectReturnCode::Success {
            return Err(eyre!("broker refused connection: {:?}", ack.code));
        }
        info!(
            "client:{} connected, session present: {}",
            conn.client_id(),
            ack.session_present
        );
        for topic in &self.subscriptions {
            let mut subscribe = Subscribe::new(topic.as_str(), QoS::AtLeastOnce);
            subscribe.pkid = self.pkid();
            debug!("client:{} subscribing to {}", conn.client_id(), topic);
            conn.write(Packet::Subscribe(subscribe));
        }
        Ok(())
    }

    fn suback(&self, conn: &ConnectionHandle, ack: &SubAck) -> DelegateResult {
        info!(
            "client:{} subscription {} acknowledged: {:?}",
            conn.client_id(),
            ack.pkid,
            ack.return_codes
        );
        Ok(())
    }

    fn unsuback(&self, conn: &ConnectionHandle, ack: &UnsubAck) -> DelegateResult {
        info!(
            "client:{} unsubscribe {} acknowledged",
            conn.client_id(),
            ack.pkid
        );
        Ok(())
    }

    fn pingresp(&self, conn: &ConnectionHandle) -> DelegateResult {
        debug!("client:{} heartbeat answered", conn.client_id());
        Ok(())
    }

    fn publish(&self, conn: &ConnectionHandle, publish: &Publish) -> DelegateResult {
        debug!(
            "client:{} message on {} ({} bytes)",
            conn.client_id(),
            publish.topic,
            publish.payload.len()
        );
        match publish.qos {
            QoS::AtMostOnce => {}
            QoS::AtLeastOnce => {
                conn.write(Packet::PubAck(PubAck::new(publish.pkid)));
            }
            QoS::ExactlyOnce => {
                conn.write(Packet::PubRec(PubRec::new(publish.pkid)));
            }
        }
        self.messages.forward(MqttMessage::from_publish(publish));
        Ok(())
    }

    fn puback(&self, conn: &ConnectionHandle, ack: &PubAck) -> DelegateResult {
        debug!("client:{} publish {} acknowledged", conn.client_id(), ack.pkid);
        Ok(())
    }

    fn pubrec(&self, conn: &ConnectionHandle, rec: &PubRec) -> DelegateResult {
        conn.write(Packet::PubRel(PubRel::new(rec.pkid)));
        Ok(())
    }

    fn pubrel(&self, conn: &ConnectionHandle, rel: &PubRel) -> DelegateResult {
        conn.write(Packet::PubComp(PubComp::new(rel.pkid)));
        Ok(())
    }

    fn pubcomp(&self, conn: &ConnectionHandle, comp: &PubComp) -> DelegateResult {
        debug!("client:{} publish {} completed", conn.client_id(), comp.pkid);
        Ok(())
    }

    fn on_disconnect(&self, conn: &ConnectionHandle) -> DelegateResult {
        info!("client:{} disconnected", conn.client_id());
        Ok(())
    }

    fn on_fault(&self, conn: &ConnectionHandle, fault: &SessionError) -> DelegateResult {
        warn!("client:{} session failed: {}", conn.client_id(), fault);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mqtt::codec::Outbound;
    use tokio::sync::mpsc;

    fn delegate(subscriptions: Vec<String>) -> (LoggingDelegate, mpsc::Receiver<MqttMessage>) {
        let params = ConnectParameters::new("c1", 30, 0.8).unwrap();
        let (tx, rx) = mpsc::channel(8);
        (
            LoggingDelegate::new(params, subscriptions, MsgManager::new(tx)),
            rx,
        )
    }

    #[test]
    fn sends_connect_with_keepalive() {
        let (delegate, _messages) = delegate(Vec::new());
        let (conn, mut out) = ConnectionHandle::new("c1");
        delegate.on_connect(&conn).unwrap();

        match out.try_recv().unwrap() {
            Outbound::Packet(Packet::Connect(connect)) => {
                assert_eq!(connect.client_id, "c1");
                assert_eq!(connect.keep_alive, 30);
            }
            other => panic!("unexpected write: {:?}", other),
        }
    }

    #[test]
    fn subscribes_after_accepted_connack() {
        let (delegate, _messages) = delegate(vec!["a/#".into(), "b".into()]);
        let (conn, mut out) = ConnectionHandle::new("c1");
        let ack = ConnAck::new(ConnectReturnCode::Success, false);
        delegate.connack(&conn, &ack).unwrap();

        let mut pkids = Vec::new();
        while let Ok(Outbound::Packet(Packet::Subscribe(subscribe))) = out.try_recv() {
            pkids.push(subscribe.pkid);
        }
        assert_eq!(pkids, vec![1, 2]);
    }

    #[test]
    fn refused_connack_is_an_error() {
        let (delegate, _messages) = delegate(vec!["a".into()]);
        let (conn, mut out) = ConnectionHandle::new("c1");
        let ack = ConnAck::new(ConnectReturnCode::NotAuthorized, false);
        assert!(delegate.connack(&conn, &ack).is_err());
        assert!(out.try_recv().is_err());
    }

    #[test]
    fn acknowledges_qos1_publish_and_forwards_it() {
        let (delegate, mut messages) = delegate(Vec::new());
        let (conn, mut out) = ConnectionHandle::new("c1");
        let mut publish = Publish::new("t", QoS::AtLeastOnce, "payload");
        publish.pkid = 7;
        delegate.publish(&conn, &publish).unwrap();

        assert_eq!(
            out.try_recv().unwrap(),
            Outbound::Packet(Packet::PubAck(PubAck::new(7)))
        );
        assert_eq!(messages.try_recv().unwrap().content(), "payload");
    }

    #[test]
    fn completes_qos2_handshake() {
        let (delegate, _messages) = delegate(Vec::new());
        let (conn, mut out) = ConnectionHandle::new("c1");
        delegate.pubrec(&conn, &PubRec::new(3)).unwrap();
        delegate.pubrel(&conn, &PubRel::new(4)).unwrap();

        assert_eq!(
            out.try_recv().unwrap(),
            Outbound::Packet(Packet::PubRel(PubRel::new(3)))
        );
        assert_eq!(
            out.try_recv().unwrap(),
            Outbound::Packet(Packet::PubComp(PubComp::new(4)))
        );
    }

    #[test]
    fn default_pingreq_writes_ping() {
        let (delegate, _messages) = delegate(Vec::new());
        let (conn, mut out) = ConnectionHandle::new("c1");
        delegate.send_pingreq(&conn);
        assert_eq!(out.try_recv().unwrap(), Outbound::Packet(Packet::PingReq));
    }
}
