//! Device state aggregation and distribution.
//!
//! Devices publish partial state fragments (status, login, gps). This crate
//! keeps, per device and category, the merged last-known record and pushes
//! every change to live observers:
//!
//! - [`Registry`]: fixed device roster, key → identity
//! - [`Router`]: routes `(topic, payload)` frames to per-device [`DeviceBinding`]s
//! - [`Decoder`] / [`JsonDecoder`]: frame → [`Fragment`]s
//! - [`StateCache`]: merge policy and per-category stores
//! - [`Distributor`]: per-category broadcast of [`Update`]s
//! - [`StateQuery`]: snapshot queries
//!
//! # Example
//!
//! ```rust
//! use velocast_devicestate::{Category, DeviceIdentity, Pipeline, Registry};
//!
//! let registry = Registry::from_identities([DeviceIdentity::new("123", "V1")]);
//! let pipeline = Pipeline::with_json_decoder(registry);
//!
//! pipeline.router.route("ind/123/status", br#"{"battery": 80}"#);
//!
//! let record = pipeline.query.by_logical_id(Category::Status, "V1").unwrap();
//! assert_eq!(record.fields["battery"], 80);
//! ```

mod cache;
mod decoder;
mod distributor;
mod error;
mod fragment;
mod query;
mod record;
mod registry;
mod router;
#[cfg(test)]
mod tests;
mod types;

pub use cache::StateCache;
pub use decoder::{Decoder, DeviceBinding, FragmentSink, JsonDecoder};
pub use distributor::{Distributor, Update};
pub use error::{Error, Result};
pub use fragment::Fragment;
pub use query::{CombinedRecord, StateQuery};
pub use record::{MergedRecord, UNKNOWN_IDENTITY};
pub use registry::{DeviceIdentity, Registry};
pub use router::{Router, device_key_from_topic};
pub use types::{Category, DeviceKey, LogicalId};

use std::sync::Arc;

/// The wired ingestion pipeline: router → bindings → cache → distributor,
/// plus the query surface over the same cache.
#[derive(Debug, Clone)]
pub struct Pipeline {
    pub registry: Arc<Registry>,
    pub distributor: Arc<Distributor>,
    pub cache: Arc<StateCache>,
    pub router: Arc<Router>,
    pub query: StateQuery,
}

impl Pipeline {
    /// Wires the pipeline with a decoder chosen per device.
    pub fn new<F>(registry: Registry, decoder_for: F) -> Self
    where
        F: Fn(&DeviceIdentity) -> Box<dyn Decoder>,
    {
        let registry = Arc::new(registry);
        let distributor = Arc::new(Distributor::new());
        let cache = Arc::new(StateCache::new(registry.clone(), distributor.clone()));
        let router = Arc::new(Router::new(&registry, cache.clone(), decoder_for));
        let query = StateQuery::new(cache.clone());

        Self {
            registry,
            distributor,
            cache,
            router,
            query,
        }
    }

    /// Wires the pipeline with [`JsonDecoder`] for every device.
    pub fn with_json_decoder(registry: Registry) -> Self {
        Self::new(registry, |_| Box::new(JsonDecoder))
    }
}
