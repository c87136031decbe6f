//! In-memory state cache and merge policy.
//!
//! Three independent stores (status, login, gps) map a device key to its
//! merged record. Entries are created on a device's first fragment of a
//! category and live for the lifetime of the cache.

use crate::decoder::FragmentSink;
use crate::distributor::Distributor;
use crate::error::{Error, Result};
use crate::fragment::Fragment;
use crate::record::MergedRecord;
use crate::registry::Registry;
use crate::types::{Category, DeviceKey};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

type Store = RwLock<BTreeMap<DeviceKey, MergedRecord>>;

/// Per-category merged device state.
#[derive(Debug)]
pub struct StateCache {
    registry: Arc<Registry>,
    distributor: Arc<Distributor>,
    stores: [Store; 3],
}

impl StateCache {
    pub fn new(registry: Arc<Registry>, distributor: Arc<Distributor>) -> Self {
        Self {
            registry,
            distributor,
            stores: Category::ALL.map(|_| RwLock::new(BTreeMap::new())),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn distributor(&self) -> &Arc<Distributor> {
        &self.distributor
    }

    fn store(&self, category: Category) -> &Store {
        &self.stores[category.index()]
    }

    /// Merges a fragment into the device's record for the fragment's category
    /// and publishes the result.
    ///
    /// The store's write lock is held across read, update, store and publish,
    /// so merges of the same `(key, category)` never interleave and observers
    /// see updates in merge order.
    pub fn merge(&self, key: &DeviceKey, fragment: &Fragment) -> Result<MergedRecord> {
        let identity = self
            .registry
            .get(key.as_str())
            .ok_or_else(|| Error::UnknownDevice(key.clone()))?;

        let category = fragment.category;
        let mut store = self.store(category).write();
        let record = store
            .entry(key.clone())
            .or_insert_with(|| MergedRecord::seeded(identity));
        let written = record.apply(fragment);
        let updated = record.clone();

        let observers = self.distributor.publish(category, updated.clone());
        debug!(
            device = %key,
            %category,
            written,
            observers,
            "merged fragment"
        );

        Ok(updated)
    }

    /// Copy of one device's record.
    pub fn get(&self, category: Category, key: &str) -> Option<MergedRecord> {
        self.store(category).read().get(key).cloned()
    }

    /// Copy of every record in a category.
    pub fn snapshot(&self, category: Category) -> BTreeMap<DeviceKey, MergedRecord> {
        self.store(category).read().clone()
    }

    /// Copy of the first record, in key order, matching the predicate.
    pub fn find<P>(&self, category: Category, predicate: P) -> Option<MergedRecord>
    where
        P: Fn(&MergedRecord) -> bool,
    {
        self.store(category)
            .read()
            .values()
            .find(|record| predicate(record))
            .cloned()
    }

    /// Number of devices with a record in the category.
    pub fn len(&self, category: Category) -> usize {
        self.store(category).read().len()
    }

    pub fn is_empty(&self) -> bool {
        Category::ALL.iter().all(|c| self.store(*c).read().is_empty())
    }
}

impl FragmentSink for StateCache {
    fn accept(&self, key: &DeviceKey, fragment: Fragment) {
        if let Err(e) = self.merge(key, &fragment) {
            warn!(
                device = %key,
                category = %fragment.category,
                "discarding fragment: {}",
                e
            );
        }
    }
}
