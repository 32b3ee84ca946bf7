//! Foreground supervisor for the background workers.
//!
//! Keeps the active timer refreshed (restarting the refresher whenever a new
//! session appears) and, when a server is configured, runs the periodic sync
//! scheduler. Ctrl-C stops both between store writes.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use nl_core::{Clock, SystemClock};
use nl_db::Database;
use nl_sync::{HttpTransport, RefresherExit, SyncEngine, SyncScheduler, TimerRefresher};
use tokio::sync::{Mutex, watch};

use crate::Config;

pub fn run<W: Write>(
    writer: &mut W,
    db: Database,
    config: &Config,
    transport: Option<HttpTransport>,
) -> Result<()> {
    match &transport {
        Some(transport) => writeln!(
            writer,
            "Watching timer and syncing with {} every {}s. Press Ctrl-C to stop.",
            transport.base_url(),
            config.sync_interval_secs
        )?,
        None => writeln!(writer, "Watching timer. Press Ctrl-C to stop.")?,
    }
    writer.flush()?;

    let runtime = tokio::runtime::Runtime::new().context("failed to initialize tokio runtime")?;
    runtime.block_on(supervise(
        Arc::new(Mutex::new(db)),
        transport,
        config.sync_interval(),
        config.timer_tick(),
    ))?;

    writeln!(writer, "Stopped.")?;
    Ok(())
}

async fn supervise(
    db: Arc<Mutex<Database>>,
    transport: Option<HttpTransport>,
    sync_interval: Duration,
    tick: Duration,
) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let scheduler = transport.map(|transport| {
        let engine = Arc::new(SyncEngine::new(db.clone(), transport));
        SyncScheduler::spawn(engine, sync_interval, shutdown_rx.clone())
    });

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        let mut refresher =
            TimerRefresher::spawn(db.clone(), clock.clone(), tick, shutdown_rx.clone());
        tokio::select! {
            signal = &mut ctrl_c => {
                signal.context("failed to listen for Ctrl-C")?;
                shutdown_tx.send_replace(true);
                if let Err(err) = refresher.await {
                    tracing::warn!(error = %err, "timer refresher task failed");
                }
                break;
            }
            exit = &mut refresher => {
                if exit.context("timer refresher task failed")? == RefresherExit::Shutdown {
                    break;
                }
            }
        }

        tracing::debug!("no timer running, waiting for a new session");
        tokio::select! {
            signal = &mut ctrl_c => {
                signal.context("failed to listen for Ctrl-C")?;
                break;
            }
            waited = wait_for_session(&db, tick) => waited?,
        }
    }

    shutdown_tx.send_replace(true);
    if let Some(scheduler) = scheduler {
        scheduler.join().await;
    }
    Ok(())
}

/// Polls the store until a session is running.
async fn wait_for_session(db: &Mutex<Database>, poll: Duration) -> Result<()> {
    loop {
        tokio::time::sleep(poll).await;
        if db.lock().await.active_timer()?.is_some() {
            tracing::debug!("timer session detected");
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use nl_core::EventType;

    use super::*;

    #[tokio::test]
    async fn wait_for_session_returns_once_a_timer_starts() {
        let db = Arc::new(Mutex::new(Database::open_in_memory().unwrap()));
        let waiter = tokio::spawn({
            let db = db.clone();
            async move { wait_for_session(&db, Duration::from_millis(5)).await }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        db.lock()
            .await
            .begin_timer(EventType::Sleep, 0, None, None)
            .unwrap();
        tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}
