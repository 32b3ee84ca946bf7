//! One-shot sync command.

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use nl_db::Database;
use nl_sync::{CycleOutcome, HttpTransport, SyncEngine};
use tokio::sync::Mutex;

use crate::Config;
use crate::device::DeviceIdentity;

/// Builds the transport from config, falling back to the paired identity.
pub fn transport_for(config: &Config, identity: &DeviceIdentity) -> Result<HttpTransport> {
    let server = config
        .server_url
        .as_deref()
        .or(identity.server_url.as_deref())
        .context("No sync server configured. Run 'nl pair' first.")?;
    let token = config.token.clone().or_else(|| identity.token.clone());
    HttpTransport::new(server, token, config.request_timeout())
        .context("failed to build HTTP client")
}

pub fn run<W: Write>(writer: &mut W, db: Database, transport: HttpTransport) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new().context("failed to initialize tokio runtime")?;
    let engine = SyncEngine::new(Arc::new(Mutex::new(db)), transport);
    let outcome = runtime.block_on(engine.run_cycle());
    report(writer, &outcome)
}

/// Writes a cycle outcome; failed cycles become errors.
pub fn report<W: Write>(writer: &mut W, outcome: &CycleOutcome) -> Result<()> {
    match outcome {
        CycleOutcome::Completed(report) => {
            writeln!(
                writer,
                "Pushed {} ({} acknowledged, {} replaced by the server copy), pulled {}",
                report.pushed, report.acknowledged, report.adopted, report.pulled
            )?;
            writeln!(writer, "Server clock: {}", report.server_clock)?;
        }
        CycleOutcome::Skipped => writeln!(writer, "Another sync is already running.")?,
        CycleOutcome::Failed { stage, message } => {
            anyhow::bail!("Sync failed during {stage}: {message}")
        }
    }
    Ok(())
}
