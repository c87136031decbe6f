//! Common types for the MQTT connection.

use crate::error::Result;
use bytes::Bytes;

/// MQTT Quality of Service level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum QoS {
    /// At most once delivery.
    #[default]
    AtMostOnce = 0,
    /// At least once delivery.
    AtLeastOnce = 1,
    /// Exactly once delivery.
    ExactlyOnce = 2,
}

impl From<QoS> for rumqttc::QoS {
    fn from(qos: QoS) -> Self {
        match qos {
            QoS::AtMostOnce => rumqttc::QoS::AtMostOnce,
            QoS::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
            QoS::ExactlyOnce => rumqttc::QoS::ExactlyOnce,
        }
    }
}

impl From<rumqttc::QoS> for QoS {
    fn from(qos: rumqttc::QoS) -> Self {
        match qos {
            rumqttc::QoS::AtMostOnce => QoS::AtMostOnce,
            rumqttc::QoS::AtLeastOnce => QoS::AtLeastOnce,
            rumqttc::QoS::ExactlyOnce => QoS::ExactlyOnce,
        }
    }
}

/// Connection lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnEvent {
    /// Broker acknowledged the connection (initial connect or reconnect).
    Connected,
    /// Connection to the broker was lost; the event loop keeps retrying.
    Disconnected,
}

/// Message received on a subscription.
#[derive(Debug, Clone)]
pub struct Message {
    /// Topic the message was published to.
    pub topic: String,
    /// Raw payload.
    pub payload: Bytes,
    /// QoS level.
    pub qos: QoS,
    /// Retain flag.
    pub retain: bool,
}

impl Message {
    /// Create a new QoS 0 message.
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            qos: QoS::AtMostOnce,
            retain: false,
        }
    }

    /// Get the payload as a string (if valid UTF-8).
    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }
}

/// Receives every message delivered on the connection.
///
/// Called from the connection's event loop, so implementations must not block.
pub trait Handler: Send + Sync {
    /// Handle an incoming message.
    fn handle_message(&self, msg: &Message) -> Result<()>;
}

impl<F> Handler for F
where
    F: Fn(&Message) -> Result<()> + Send + Sync,
{
    fn handle_message(&self, msg: &Message) -> Result<()> {
        self(msg)
    }
}
