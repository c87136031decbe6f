//! Device identity registry.
//!
//! Populated once at startup from the roster and read-only afterwards.

use crate::types::{DeviceKey, LogicalId};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use tracing::warn;

/// Static identifiers of one device.
///
/// Deserializes from either `{hardwareId, logicalId}` or the roster's
/// `{imei, veloId}` column names. Ids may be strings or integers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceIdentity {
    /// Hardware id (IMEI).
    #[serde(alias = "imei", deserialize_with = "string_or_integer")]
    pub hardware_id: String,
    /// Logical id shown to clients.
    #[serde(alias = "veloId", deserialize_with = "string_or_integer")]
    pub logical_id: String,
}

impl DeviceIdentity {
    pub fn new(hardware_id: impl Into<String>, logical_id: impl Into<String>) -> Self {
        Self {
            hardware_id: hardware_id.into(),
            logical_id: logical_id.into(),
        }
    }

    /// The cache key for this device.
    pub fn key(&self) -> DeviceKey {
        DeviceKey::new(self.hardware_id.trim())
    }

    pub fn logical_id(&self) -> LogicalId {
        LogicalId::new(self.logical_id.as_str())
    }
}

fn string_or_integer<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Unsigned(u64),
        Signed(i64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Unsigned(n) => n.to_string(),
        Id::Signed(n) => n.to_string(),
    })
}

/// Fixed mapping from device key to identity.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    devices: HashMap<DeviceKey, DeviceIdentity>,
}

impl Registry {
    /// Builds the registry from roster rows.
    ///
    /// Ids are trimmed. Rows with an empty hardware id are skipped. When two
    /// rows share a key the first one wins.
    pub fn from_identities<I>(identities: I) -> Self
    where
        I: IntoIterator<Item = DeviceIdentity>,
    {
        let mut devices = HashMap::new();
        for mut identity in identities {
            identity.hardware_id = identity.hardware_id.trim().to_string();
            identity.logical_id = identity.logical_id.trim().to_string();
            let key = identity.key();
            if key.as_str().is_empty() {
                warn!("skipping roster row without hardware id: {:?}", identity);
                continue;
            }
            if devices.contains_key(&key) {
                warn!("duplicate roster row for device {}, keeping the first", key);
                continue;
            }
            devices.insert(key, identity);
        }
        Self { devices }
    }

    pub fn get(&self, key: &str) -> Option<&DeviceIdentity> {
        self.devices.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.devices.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DeviceKey, &DeviceIdentity)> {
        self.devices.iter()
    }
}
