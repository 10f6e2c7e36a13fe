use chrono::NaiveDateTime;
use rumqttc::mqttbytes::v4::Publish;
use std::fmt;
use tokio::sync::mpsc;
use tracing::warn;

/// A received application message, detached from the protocol packet
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MqttMessage {
    topic: String,
    content: String,
    timestamp: NaiveDateTime,
}

impl fmt::Display for MqttMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let preview: String = self.content.chars().take(10).collect();
        write!(f, "{} - {}", self.timestamp, preview)
    }
}

impl MqttMessage {
    pub fn from_topic(topic: String, content: String) -> Self {
        MqttMessage {
            topic,
            content,
            timestamp: chrono::Local::now().naive_local(),
        }
    }

    pub fn from_publish(publish: &Publish) -> Self {
        Self::from_topic(
            publish.topic.clone(),
            String::from_utf8_lossy(&publish.payload).into_owned(),
        )
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn render(&self) -> String {
        format!("{}: {}\n{}", self.timestamp, self.topic, self.content)
    }
}

/// Forwards received messages to the application without blocking the session
#[derive(Debug, Clone)]
pub struct MsgManager {
    received_msg: mpsc::Sender<MqttMessage>,
}

impl MsgManager {
    pub fn new(received_msg: mpsc::Sender<MqttMessage>) -> Self {
        Self { received_msg }
    }

    /// Returns false if the message had to be dropped
    pub fn forward(&self, msg: MqttMessage) -> bool {
        match self.received_msg.try_send(msg) {
            Ok(()) => true,
            Err(e) => {
                warn!("Dropping received message: {}", e);
                false
            }
        }
    }
}
