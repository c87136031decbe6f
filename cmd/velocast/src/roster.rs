//! Device roster loading.

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use velocast_devicestate::DeviceIdentity;

/// Supplies the device list once at startup.
pub trait RosterSource {
    fn load(&self) -> anyhow::Result<Vec<DeviceIdentity>>;
}

/// Roster read from a YAML (or JSON) file.
///
/// Accepts either a top-level list of rows or a `devices:` list. IMEIs
/// may be quoted or bare numbers:
///
/// ```yaml
/// devices:
///   - imei: 351234567890123
///     veloId: "V1"
/// ```
#[derive(Debug, Clone)]
pub struct FileRoster {
    path: PathBuf,
}

impl FileRoster {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl RosterSource for FileRoster {
    fn load(&self) -> anyhow::Result<Vec<DeviceIdentity>> {
        if self.path.as_os_str().is_empty() {
            bail!("no roster file configured");
        }

        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("reading roster {}", self.path.display()))?;
        let doc: serde_yaml::Value = serde_yaml::from_str(&content)
            .with_context(|| format!("parsing roster {}", self.path.display()))?;

        let rows = doc.get("devices").cloned().unwrap_or(doc);
        let devices: Vec<DeviceIdentity> = serde_yaml::from_value(rows)
            .with_context(|| format!("invalid device rows in {}", self.path.display()))?;
        Ok(devices)
    }
}
