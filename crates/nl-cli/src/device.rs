//! Device identity management.
//!
//! Each device gets a persistent id stored in `device.json`. Pairing replaces
//! it with the server-issued id and records the bearer token next to it.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use nl_core::DeviceId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Device identity stored in `device.json`.
#[derive(Clone, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub device_id: DeviceId,
    /// Human-friendly label (e.g., "kitchen-tablet").
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl fmt::Debug for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceIdentity")
            .field("device_id", &self.device_id)
            .field("label", &self.label)
            .field("server_url", &self.server_url)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Returns the path to device.json in the XDG data directory.
pub fn device_json_path() -> Result<PathBuf> {
    let data_dir = crate::config::dirs_data_path().context("could not determine data directory")?;
    Ok(data_dir.join("device.json"))
}

/// Loads device identity from a specific path.
///
/// Returns `None` if the file doesn't exist.
pub fn load_from(path: &Path) -> Result<Option<DeviceIdentity>> {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            let identity: DeviceIdentity =
                serde_json::from_str(&content).context("failed to parse device.json")?;
            Ok(Some(identity))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).context("failed to read device.json"),
    }
}

/// Loads device identity, failing with a helpful message if not found.
pub fn require_device_identity() -> Result<DeviceIdentity> {
    load_from(&device_json_path()?)?.context("No device identity found. Run 'nl init' first.")
}

/// Initializes device identity.
///
/// If device.json already exists, returns the existing identity
/// (updating the label if a new one is provided).
pub fn init_device(label: Option<&str>) -> Result<DeviceIdentity> {
    init_device_at(&device_json_path()?, label)
}

pub(crate) fn init_device_at(path: &Path, label: Option<&str>) -> Result<DeviceIdentity> {
    let default_label = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());

    let identity = if let Some(mut existing) = load_from(path)? {
        if let Some(new_label) = label {
            existing.label = new_label.to_string();
            save_to(path, &existing)?;
        }
        existing
    } else {
        let identity = DeviceIdentity {
            device_id: DeviceId::new(Uuid::new_v4().to_string())?,
            label: label.unwrap_or(&default_label).to_string(),
            server_url: None,
            token: None,
        };
        save_to(path, &identity)?;
        identity
    };

    Ok(identity)
}

/// Writes device identity to a specific path.
pub fn save_to(path: &Path, identity: &DeviceIdentity) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).context("failed to create data directory")?;
    }
    let json = serde_json::to_string_pretty(identity).context("failed to serialize identity")?;
    std::fs::write(path, json).context("failed to write device.json")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_creates_new_identity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device.json");

        let identity = init_device_at(&path, Some("nursery-phone")).unwrap();
        assert_eq!(identity.label, "nursery-phone");
        Uuid::parse_str(identity.device_id.as_str()).unwrap();
        assert!(identity.token.is_none());
    }

    #[test]
    fn test_init_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device.json");

        let first = init_device_at(&path, Some("phone")).unwrap();
        let second = init_device_at(&path, None).unwrap();
        assert_eq!(first.device_id, second.device_id);
        assert_eq!(first.label, second.label);
    }

    #[test]
    fn test_init_updates_label() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device.json");

        let first = init_device_at(&path, Some("old-name")).unwrap();
        let second = init_device_at(&path, Some("new-name")).unwrap();
        assert_eq!(first.device_id, second.device_id);
        assert_eq!(second.label, "new-name");
    }

    #[test]
    fn test_load_missing_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_from(&dir.path().join("device.json")).unwrap().is_none());
    }

    #[test]
    fn test_debug_redacts_token() {
        let identity = DeviceIdentity {
            device_id: DeviceId::new("d").unwrap(),
            label: "phone".to_string(),
            server_url: Some("http://nas:8000".to_string()),
            token: Some("secret-token".to_string()),
        };
        assert!(!format!("{identity:?}").contains("secret-token"));
    }
}
