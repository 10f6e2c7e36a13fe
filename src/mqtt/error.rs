//! Error types for the MQTT session layer

use rumqttc::mqttbytes;

/// Faults that end a session.
///
/// Every variant carries the client identifier of the connection it happened
/// on, so a single log line or delegate callback is enough to locate it.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The codec could not parse the inbound byte stream
    #[error("client {client_id}: failed to decode inbound packet: {source}")]
    Decode {
        client_id: String,
        #[source]
        source: mqttbytes::Error,
    },

    /// Reading from or writing to the transport failed
    #[error("client {client_id}: transport error: {source}")]
    Io {
        client_id: String,
        #[source]
        source: std::io::Error,
    },

    /// An outbound packet could not be encoded
    #[error("client {client_id}: failed to encode outbound packet: {source}")]
    Encode {
        client_id: String,
        #[source]
        source: CodecError,
    },

    /// A delegate callback reported a failure
    #[error("client {client_id}: delegate failed in {callback}: {message}")]
    Delegate {
        client_id: String,
        callback: &'static str,
        message: String,
    },

    /// The session task itself died, e.g. a delegate callback panicked
    #[error("client {client_id}: session task failed: {message}")]
    Task { client_id: String, message: String },
}

impl SessionError {
    pub fn client_id(&self) -> &str {
        match self {
            SessionError::Decode { client_id, .. }
            | SessionError::Io { client_id, .. }
            | SessionError::Encode { client_id, .. }
            | SessionError::Delegate { client_id, .. }
            | SessionError::Task { client_id, .. } => client_id,
        }
    }

    /// Wraps a codec failure with the client it occurred on
    pub fn from_codec(client_id: &str, err: CodecError) -> Self {
        match err {
            CodecError::Decode(source) => SessionError::Decode {
                client_id: client_id.to_string(),
                source,
            },
            CodecError::Io(source) => SessionError::Io {
                client_id: client_id.to_string(),
                source,
            },
            source @ (CodecError::Encode(_) | CodecError::OversizedPacket { .. }) => {
                SessionError::Encode {
                    client_id: client_id.to_string(),
                    source,
                }
            }
        }
    }
}

/// Errors raised by [`super::codec::MqttCodec`]
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed packet: {0}")]
    Decode(#[from] mqttbytes::Error),

    #[error("cannot encode packet: {0}")]
    Encode(#[source] mqttbytes::Error),

    #[error("{kind} packet of {size} bytes exceeds the {max} byte limit")]
    OversizedPacket {
        kind: &'static str,
        size: usize,
        max: usize,
    },
}

/// Rejected connect parameters
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("client identifier must not be empty")]
    EmptyClientId,

    #[error("keepalive must be at least one second")]
    ZeroKeepalive,

    #[error("keepalive coefficient must be a positive finite number, got {0}")]
    InvalidCoefficient(f64),
}
