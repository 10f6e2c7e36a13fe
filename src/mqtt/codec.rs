//! Framing adapter between tokio-util and the rumqttc v4 packet codec

use bytes::{Bytes, BytesMut};
use rumqttc::mqttbytes::{
    self,
    v4::{self, Disconnect, Packet, PingReq, PingResp},
};
use tokio_util::codec::{Decoder, Encoder};

use super::error::CodecError;

/// Default upper bound for a single packet, matching rumqttc's own default
pub const DEFAULT_MAX_PACKET_SIZE: usize = 10 * 1024;

/// A value written to the transport.
///
/// Protocol packets are encoded by the codec; raw bytes are written as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Packet(Packet),
    Raw(Bytes),
}

impl From<Packet> for Outbound {
    fn from(packet: Packet) -> Self {
        Outbound::Packet(packet)
    }
}

/// Short protocol name of a packet, used in log lines
pub fn packet_kind(packet: &Packet) -> &'static str {
    match packet {
        Packet::Connect(_) => "CONNECT",
        Packet::ConnAck(_) => "CONNACK",
        Packet::Publish(_) => "PUBLISH",
        Packet::PubAck(_) => "PUBACK",
        Packet::PubRec(_) => "PUBREC",
        Packet::PubRel(_) => "PUBREL",
        Packet::PubComp(_) => "PUBCOMP",
        Packet::Subscribe(_) => "SUBSCRIBE",
        Packet::SubAck(_) => "SUBACK",
        Packet::Unsubscribe(_) => "UNSUBSCRIBE",
        Packet::UnsubAck(_) => "UNSUBACK",
        Packet::PingReq => "PINGREQ",
        Packet::PingResp => "PINGRESP",
        Packet::Disconnect => "DISCONNECT",
    }
}

#[derive(Debug, Clone)]
pub struct MqttCodec {
    max_packet_size: usize,
}

impl MqttCodec {
    pub fn new(max_packet_size: usize) -> Self {
        Self { max_packet_size }
    }
}

impl Default for MqttCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PACKET_SIZE)
    }
}

impl Decoder for MqttCodec {
    type Item = Packet;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Packet>, CodecError> {
        match v4::read(src, self.max_packet_size) {
            Ok(packet) => Ok(Some(packet)),
            Err(mqttbytes::Error::InsufficientBytes(required)) => {
                src.reserve(required);
                Ok(None)
            }
            Err(e) => Err(CodecError::Decode(e)),
        }
    }
}

impl MqttCodec {
    /// Appends the wire form of `packet` to `dst`, leaving `dst` untouched
    /// when the packet cannot be written or exceeds the size limit
    fn write_packet(&self, packet: &Packet, dst: &mut BytesMut) -> Result<(), CodecError> {
        let start = dst.len();
        let written = match packet {
            Packet::Connect(connect) => connect.write(dst),
            Packet::ConnAck(ack) => ack.write(dst),
            Packet::Publish(publish) => publish.write(dst),
            Packet::PubAck(ack) => ack.write(dst),
            Packet::PubRec(rec) => rec.write(dst),
            Packet::PubRel(rel) => rel.write(dst),
            Packet::PubComp(comp) => comp.write(dst),
            Packet::Subscribe(subscribe) => subscribe.write(dst),
            Packet::SubAck(ack) => ack.write(dst),
            Packet::Unsubscribe(unsubscribe) => unsubscribe.write(dst),
            Packet::UnsubAck(ack) => ack.write(dst),
            Packet::PingReq => PingReq.write(dst),
            Packet::PingResp => PingResp.write(dst),
            Packet::Disconnect => Disconnect.write(dst),
        };

        if let Err(e) = written {
            dst.truncate(start);
            return Err(CodecError::Encode(e));
        }

        // the length reported by `write` is not reliable for every packet kind
        let size = dst.len() - start;
        if size > self.max_packet_size {
            dst.truncate(start);
            return Err(CodecError::OversizedPacket {
                kind: packet_kind(packet),
                size,
                max: self.max_packet_size,
            });
        }
        Ok(())
    }
}

impl Encoder<Outbound> for MqttCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Outbound, dst: &mut BytesMut) -> Result<(), CodecError> {
        match item {
            Outbound::Packet(packet) => self.write_packet(&packet, dst),
            Outbound::Raw(bytes) => {
                dst.extend_from_slice(&bytes);
                Ok(())
            }
        }
    }
}
