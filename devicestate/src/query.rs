//! Read-only queries over the state cache.
//!
//! Every result is an owned copy; later merges never change it.

use crate::cache::StateCache;
use crate::record::MergedRecord;
use crate::types::{Category, DeviceKey};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// All three categories of one device. Missing categories are `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CombinedRecord {
    pub status: Option<MergedRecord>,
    pub login: Option<MergedRecord>,
    pub gps: Option<MergedRecord>,
}

impl CombinedRecord {
    pub fn get(&self, category: Category) -> Option<&MergedRecord> {
        match category {
            Category::Status => self.status.as_ref(),
            Category::Login => self.login.as_ref(),
            Category::Gps => self.gps.as_ref(),
        }
    }

    /// True when the device has no record in any category.
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.login.is_none() && self.gps.is_none()
    }
}

/// Query surface over a shared [`StateCache`].
#[derive(Debug, Clone)]
pub struct StateQuery {
    cache: Arc<StateCache>,
}

impl StateQuery {
    pub fn new(cache: Arc<StateCache>) -> Self {
        Self { cache }
    }

    /// Snapshot of every record in a category.
    pub fn all_of(&self, category: Category) -> BTreeMap<DeviceKey, MergedRecord> {
        self.cache.snapshot(category)
    }

    /// Record whose logical id matches; the first in key order wins.
    pub fn by_logical_id(&self, category: Category, logical_id: &str) -> Option<MergedRecord> {
        self.cache
            .find(category, |record| record.logical_id == logical_id)
    }

    /// Records of all categories for one logical id.
    pub fn combined_by_logical_id(&self, logical_id: &str) -> CombinedRecord {
        CombinedRecord {
            status: self.by_logical_id(Category::Status, logical_id),
            login: self.by_logical_id(Category::Login, logical_id),
            gps: self.by_logical_id(Category::Gps, logical_id),
        }
    }
}
