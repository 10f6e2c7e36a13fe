//! Routes decoded inbound packets to delegate callbacks

use rumqttc::mqttbytes::v4::{ConnectReturnCode, Packet};
use tracing::{debug, warn};

use super::codec::packet_kind;
use super::connection::ConnectionHandle;
use super::delegate::{DelegateResult, MqttDelegate};
use super::error::SessionError;
use super::lifecycle::Lifecycle;

/// What the dispatcher did with a packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    /// Exactly one delegate callback ran
    Delivered(&'static str),
    /// The packet kind is not something a broker sends to a client
    Ignored(&'static str),
}

/// Hands one inbound packet to the matching delegate callback.
///
/// An accepted CONNACK first runs the lifecycle's accept handling so the
/// keepalive timers exist before the delegate sees the acknowledgment.
pub fn dispatch(
    lifecycle: &mut Lifecycle,
    delegate: &dyn MqttDelegate,
    conn: &ConnectionHandle,
    packet: &Packet,
) -> Result<Dispatched, SessionError> {
    let kind = packet_kind(packet);
    debug!(
        "client:{}, read mqtt {} packet: {:?}",
        conn.client_id(),
        kind,
        packet
    );

    let result = match packet {
        Packet::ConnAck(ack) => {
            if ack.code == ConnectReturnCode::Success {
                lifecycle.on_accepted();
            } else {
                warn!(
                    "client:{} connection refused by broker: {:?}",
                    conn.client_id(),
                    ack.code
                );
            }
            delegate.connack(conn, ack)
        }
        Packet::SubAck(ack) => delegate.suback(conn, ack),
        Packet::UnsubAck(ack) => delegate.unsuback(conn, ack),
        Packet::PingResp => delegate.pingresp(conn),
        Packet::Publish(publish) => delegate.publish(conn, publish),
        Packet::PubAck(ack) => delegate.puback(conn, ack),
        Packet::PubRec(rec) => delegate.pubrec(conn, rec),
        Packet::PubRel(rel) => delegate.pubrel(conn, rel),
        Packet::PubComp(comp) => delegate.pubcomp(conn, comp),
        Packet::Connect(_)
        | Packet::Subscribe(_)
        | Packet::Unsubscribe(_)
        | Packet::PingReq
        | Packet::Disconnect => {
            warn!(
                "client:{} received an unexpected {} packet, ignoring it",
                conn.client_id(),
                kind
            );
            return Ok(Dispatched::Ignored(kind));
        }
    };

    delegate_outcome(conn, kind, result).map(|()| Dispatched::Delivered(kind))
}

fn delegate_outcome(
    conn: &ConnectionHandle,
    callback: &'static str,
    result: DelegateResult,
) -> Result<(), SessionError> {
    result.map_err(|e| SessionError::Delegate {
        client_id: conn.client_id().to_string(),
        callback,
        message: format!("{:#}", e),
    })
}
