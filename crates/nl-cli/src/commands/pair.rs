//! Pairing with a sync server.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use nl_core::wire::{PairRequest, PairResponse};
use nl_db::Database;
use nl_sync::HttpTransport;

use crate::Config;
use crate::device::{self, DeviceIdentity};

pub fn run<W: Write>(
    writer: &mut W,
    db: &mut Database,
    config: &Config,
    server: &str,
    code: &str,
    name: Option<&str>,
) -> Result<()> {
    let identity = device::require_device_identity()?;
    let transport = HttpTransport::new(server, None, config.request_timeout())
        .context("failed to build HTTP client")?;
    let request = PairRequest {
        pairing_code: code.trim().to_string(),
        device_id: identity.device_id.clone(),
        name: Some(name.unwrap_or(&identity.label).to_string()),
    };

    let runtime = tokio::runtime::Runtime::new().context("failed to initialize tokio runtime")?;
    let response = runtime
        .block_on(async {
            transport.healthz().await?;
            transport.pair(&request).await
        })
        .with_context(|| format!("failed to pair with {}", transport.base_url()))?;

    let identity = complete_pairing(
        db,
        &device::device_json_path()?,
        identity,
        transport.base_url(),
        response,
    )?;
    writeln!(
        writer,
        "Paired with {} as {}",
        transport.base_url(),
        identity.device_id
    )?;
    Ok(())
}

/// Adopts the server-issued device id and token, saves them to `path` and
/// marks the store paired.
pub(crate) fn complete_pairing(
    db: &mut Database,
    path: &Path,
    mut identity: DeviceIdentity,
    base_url: &str,
    response: PairResponse,
) -> Result<DeviceIdentity> {
    identity.device_id = response.device_id;
    identity.server_url = Some(base_url.to_string());
    identity.token = Some(response.token);
    device::save_to(path, &identity)?;
    db.mark_paired(&identity.device_id)?;
    Ok(identity)
}

#[cfg(test)]
mod tests {
    use nl_core::DeviceId;

    use super::*;

    #[test]
    fn pairing_saves_credentials_and_marks_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device.json");
        let identity = device::init_device_at(&path, Some("phone")).unwrap();
        let mut db = Database::open_in_memory().unwrap();
        db.ensure_sync_state(&identity.device_id).unwrap();

        let response = PairResponse {
            device_id: DeviceId::new("server-issued").unwrap(),
            token: "secret".to_string(),
        };
        complete_pairing(&mut db, &path, identity, "http://nas:8000", response).unwrap();

        let saved = device::load_from(&path).unwrap().unwrap();
        assert_eq!(saved.device_id.as_str(), "server-issued");
        assert_eq!(saved.server_url.as_deref(), Some("http://nas:8000"));
        assert_eq!(saved.token.as_deref(), Some("secret"));
        assert_eq!(saved.label, "phone");

        let state = db.sync_state().unwrap();
        assert!(state.paired);
        assert_eq!(state.device_id, Some(saved.device_id));
    }
}
