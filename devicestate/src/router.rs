//! Ingestion router: dispatches transport frames to device bindings.

use crate::decoder::{Decoder, DeviceBinding, FragmentSink, JsonDecoder};
use crate::registry::{DeviceIdentity, Registry};
use crate::types::DeviceKey;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

/// Extracts the device key, the second `/`-separated topic segment.
///
/// `ind/351234/status` yields `351234`.
pub fn device_key_from_topic(topic: &str) -> Option<&str> {
    let mut segments = topic.split('/');
    segments.next()?;
    segments.next().filter(|key| !key.is_empty())
}

/// Routes `(topic, payload)` frames to the binding of the addressed device.
#[derive(Debug)]
pub struct Router {
    bindings: HashMap<DeviceKey, DeviceBinding>,
}

impl Router {
    /// Creates one binding per registry entry, each decoding with the
    /// decoder returned by `decoder_for` and emitting into `sink`.
    pub fn new<F>(registry: &Registry, sink: Arc<dyn FragmentSink>, decoder_for: F) -> Self
    where
        F: Fn(&DeviceIdentity) -> Box<dyn Decoder>,
    {
        let bindings = registry
            .iter()
            .map(|(key, identity)| {
                let binding =
                    DeviceBinding::new(identity.clone(), decoder_for(identity), sink.clone());
                (key.clone(), binding)
            })
            .collect();

        Self { bindings }
    }

    /// Creates bindings that decode JSON payloads.
    pub fn with_json_decoder(registry: &Registry, sink: Arc<dyn FragmentSink>) -> Self {
        Self::new(registry, sink, |_| Box::new(JsonDecoder))
    }

    /// Forwards a frame to its device's binding.
    ///
    /// Frames without a device segment or for devices outside the registry
    /// are dropped silently.
    pub fn route(&self, topic: &str, payload: &[u8]) {
        let Some(key) = device_key_from_topic(topic) else {
            trace!(topic, "dropping frame without device key");
            return;
        };

        match self.bindings.get(key) {
            Some(binding) => binding.handle(topic, payload),
            None => trace!(topic, "dropping frame for unregistered device"),
        }
    }

    pub fn binding(&self, key: &str) -> Option<&DeviceBinding> {
        self.bindings.get(key)
    }

    /// Number of bound devices.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
