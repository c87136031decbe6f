//! Decoder binding: turns raw frames of one device into fragments.
//!
//! A [`DeviceBinding`] owns the device's [`Decoder`] and forwards every
//! decoded fragment, in frame order, to the [`FragmentSink`] it was created
//! with.

use crate::error::Result;
use crate::fragment::Fragment;
use crate::registry::DeviceIdentity;
use crate::types::{Category, DeviceKey};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Decodes raw `(topic, payload)` frames into typed fragments.
///
/// A frame may yield zero or more fragments.
pub trait Decoder: Send + Sync {
    fn decode(&self, topic: &str, payload: &[u8]) -> Result<Vec<Fragment>>;
}

/// Receives fragments emitted by device bindings.
pub trait FragmentSink: Send + Sync {
    /// Consumes one fragment for the given device. Must not fail upward.
    fn accept(&self, key: &DeviceKey, fragment: Fragment);
}

/// Decodes JSON object payloads.
///
/// The category is the last topic segment (`ind/<key>/status`); frames on
/// other topics produce no fragments.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDecoder;

impl Decoder for JsonDecoder {
    fn decode(&self, topic: &str, payload: &[u8]) -> Result<Vec<Fragment>> {
        let Some(category) = topic
            .rsplit('/')
            .next()
            .and_then(|segment| segment.parse::<Category>().ok())
        else {
            return Ok(Vec::new());
        };

        let value: Value = serde_json::from_slice(payload)?;
        Ok(vec![Fragment::from_value(category, value)?])
    }
}

/// One device's decoder, bound to the sink that stores its fragments.
pub struct DeviceBinding {
    key: DeviceKey,
    identity: DeviceIdentity,
    decoder: Box<dyn Decoder>,
    sink: Arc<dyn FragmentSink>,
}

impl DeviceBinding {
    pub fn new(
        identity: DeviceIdentity,
        decoder: Box<dyn Decoder>,
        sink: Arc<dyn FragmentSink>,
    ) -> Self {
        Self {
            key: identity.key(),
            identity,
            decoder,
            sink,
        }
    }

    pub fn key(&self) -> &DeviceKey {
        &self.key
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    /// Decodes a frame and emits its fragments. Malformed frames are dropped.
    pub fn handle(&self, topic: &str, payload: &[u8]) {
        match self.decoder.decode(topic, payload) {
            Ok(fragments) => {
                for fragment in fragments {
                    self.sink.accept(&self.key, fragment);
                }
            }
            Err(e) => {
                debug!(device = %self.key, topic, "dropping undecodable frame: {}", e);
            }
        }
    }
}

impl fmt::Debug for DeviceBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceBinding")
            .field("key", &self.key)
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}
