//! Partial state fragments produced by decoders.

use crate::error::{Error, Result};
use crate::types::Category;
use serde_json::{Map, Value};

const HARDWARE_ID_KEYS: [&str; 2] = ["hardwareId", "imei"];
const LOGICAL_ID_KEYS: [&str; 2] = ["logicalId", "veloId"];

/// A category-tagged, partially populated set of fields decoded from one frame.
///
/// A field that is absent or `null` was not reported by this frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub category: Category,
    /// Hardware id reported by the device, if any.
    pub hardware_id: Option<String>,
    /// Logical id reported by the device, if any.
    pub logical_id: Option<String>,
    pub fields: Map<String, Value>,
}

impl Fragment {
    /// Creates an empty fragment.
    pub fn new(category: Category) -> Self {
        Self {
            category,
            hardware_id: None,
            logical_id: None,
            fields: Map::new(),
        }
    }

    /// Adds a field. `Value::Null` marks the field as not reported.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn with_hardware_id(mut self, id: impl Into<String>) -> Self {
        self.hardware_id = Some(id.into());
        self
    }

    pub fn with_logical_id(mut self, id: impl Into<String>) -> Self {
        self.logical_id = Some(id.into());
        self
    }

    /// Builds a fragment from a decoded JSON object.
    ///
    /// The first non-empty string or numeric `hardwareId`/`imei` and
    /// `logicalId`/`veloId` members become the fragment identity and are not
    /// stored as fields.
    pub fn from_value(category: Category, value: Value) -> Result<Self> {
        let Value::Object(mut fields) = value else {
            return Err(Error::NotAnObject);
        };

        let hardware_id = take_identity(&mut fields, &HARDWARE_ID_KEYS);
        let logical_id = take_identity(&mut fields, &LOGICAL_ID_KEYS);

        Ok(Self {
            category,
            hardware_id,
            logical_id,
            fields,
        })
    }

    /// Number of fields carrying a value.
    pub fn reported_fields(&self) -> usize {
        self.fields.values().filter(|v| !v.is_null()).count()
    }
}

/// Lifts the first usable id among `keys` out of `fields`. Values that are
/// not lifted stay in `fields` as ordinary data.
fn take_identity(fields: &mut Map<String, Value>, keys: &[&str]) -> Option<String> {
    let mut found = None;
    for key in keys {
        let Some(value) = fields.remove(*key) else {
            continue;
        };
        let id = match &value {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
        .filter(|id| !id.is_empty());

        match id {
            Some(id) if found.is_none() => found = Some(id),
            _ => {
                fields.insert((*key).to_string(), value);
            }
        }
    }
    found
}
