//! Merged per-category device records.

use crate::fragment::Fragment;
use crate::registry::DeviceIdentity;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Identity placeholder used when neither the roster nor any fragment supplied one.
pub const UNKNOWN_IDENTITY: &str = "Unknown";

/// Cumulative last-known state of one device in one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedRecord {
    pub hardware_id: String,
    pub logical_id: String,
    /// Most recent non-null value of every field ever reported.
    pub fields: Map<String, Value>,
}

impl MergedRecord {
    /// Empty record carrying the registry identity.
    pub fn seeded(identity: &DeviceIdentity) -> Self {
        Self {
            hardware_id: or_unknown(&identity.hardware_id),
            logical_id: or_unknown(&identity.logical_id),
            fields: Map::new(),
        }
    }

    /// Folds a fragment into the record.
    ///
    /// Non-null values overwrite, nulls are no-ops. Identity is replaced only
    /// by a non-empty value from the fragment. Returns the number of fields
    /// written.
    pub fn apply(&mut self, fragment: &Fragment) -> usize {
        let mut written = 0;
        for (name, value) in &fragment.fields {
            if value.is_null() {
                continue;
            }
            self.fields.insert(name.clone(), value.clone());
            written += 1;
        }

        if let Some(id) = non_empty(fragment.hardware_id.as_deref()) {
            self.hardware_id = id.to_string();
        }
        if let Some(id) = non_empty(fragment.logical_id.as_deref()) {
            self.logical_id = id.to_string();
        }

        written
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}

fn non_empty(id: Option<&str>) -> Option<&str> {
    id.filter(|s| !s.is_empty())
}

fn or_unknown(id: &str) -> String {
    if id.is_empty() {
        UNKNOWN_IDENTITY.to_string()
    } else {
        id.to_string()
    }
}
