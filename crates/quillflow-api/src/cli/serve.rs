//! `serve` and `tick`: the REST server and the external scheduler that
//! drives `process_due`.

use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use console::style;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use tracing::field::display;
use uuid::Uuid;

use quillflow_core::workflow::DueReport;
use quillflow_observe::workflow_attrs::{DUE_ENVELOPES, OP_PROCESS_DUE, OPERATION};

use crate::http;
use crate::state::AppState;

/// Run one scheduler pass.
pub async fn tick(state: &AppState, json: bool) -> Result<()> {
    let report = run_pass(state).await?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "envelopes": report.envelopes,
                "sent": report.sent,
                "notified": report.notified,
                "failed": report.failed,
            })
        );
    } else {
        println!(
            "  {} {} due envelope{}: {} sent, {} notified, {} failed",
            style("✓").green().bold(),
            report.envelopes,
            if report.envelopes == 1 { "" } else { "s" },
            report.sent,
            report.notified,
            report.failed
        );
    }
    Ok(())
}

async fn run_pass(state: &AppState) -> Result<DueReport> {
    let span = tracing::info_span!(
        "scheduler",
        { OPERATION } = OP_PROCESS_DUE,
        { DUE_ENVELOPES } = tracing::field::Empty,
    );
    let report = state
        .coordinator
        .process_due(Utc::now())
        .instrument(span.clone())
        .await?;
    span.record(DUE_ENVELOPES, display(report.envelopes));
    Ok(report)
}

/// Call `process_due` every `interval` until `cancel` fires.
pub fn spawn_scheduler(
    state: AppState,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = run_pass(&state).await {
                        tracing::warn!(error = %e, "Scheduler pass failed");
                    }
                }
            }
        }
        tracing::debug!("Scheduler stopped");
    })
}

/// Start the REST server, optionally with the scheduler loop.
pub async fn serve(
    state: AppState,
    account_id: Uuid,
    host: Option<String>,
    port: Option<u16>,
    scheduler: bool,
) -> Result<()> {
    // Bootstrap a key on first run so the API is usable at all.
    if let Some(api_key) = http::extractors::auth::ensure_api_key(&state, account_id).await? {
        println!();
        println!(
            "  {} API key generated (save this -- it won't be shown again):",
            style("🔑").bold()
        );
        println!();
        println!("  {}", style(&api_key).yellow().bold());
        println!();
    }

    let host = host.unwrap_or_else(|| state.config.server.host.clone());
    let port = port.unwrap_or(state.config.server.port);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    let audit = state.spawn_audit_logger();
    let cancel = CancellationToken::new();
    let scheduler_task = if scheduler {
        let interval = Duration::from_secs(state.config.scheduler.interval_secs.max(1));
        Some(spawn_scheduler(state.clone(), interval, cancel.clone()))
    } else {
        None
    };

    println!(
        "  {} QuillFlow API listening on {}",
        style("⚡").bold(),
        style(format!("http://{addr}")).cyan()
    );
    if scheduler {
        println!(
            "  {} scheduler every {}s",
            style("⏱").bold(),
            state.config.scheduler.interval_secs.max(1)
        );
    }
    println!(
        "  {} data in {}",
        style("🗄").bold(),
        style(state.data_dir.display()).dim()
    );
    println!("  {}", style("Press Ctrl+C to stop").dim());

    let router = http::router::build_router(state);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cancel.cancel();
    if let Some(task) = scheduler_task {
        let _ = task.await;
    }
    audit.abort();

    println!("\n  Server stopped.");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quillflow_infra::sqlite::pool::{DatabasePool, database_url};
    use quillflow_types::config::GlobalConfig;

    async fn state() -> (AppState, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let pool = DatabasePool::new(&database_url(dir.path())).await.unwrap();
        let state =
            AppState::from_parts(pool, GlobalConfig::default(), dir.path().to_path_buf()).unwrap();
        (state, dir)
    }

    #[tokio::test]
    async fn test_pass_on_empty_database() {
        let (state, _dir) = state().await;
        let report = run_pass(&state).await.unwrap();
        assert_eq!(report, DueReport::default());
    }

    #[tokio::test]
    async fn test_scheduler_stops_on_cancel() {
        let (state, _dir) = state().await;
        let cancel = CancellationToken::new();
        let task = spawn_scheduler(state, Duration::from_millis(10), cancel.clone());
        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_bootstrap_key_is_created_once() {
        let (state, _dir) = state().await;
        let account = Uuid::now_v7();
        let first = http::extractors::auth::ensure_api_key(&state, account)
            .await
            .unwrap();
        assert!(first.is_some());
        let ctx = state.api_keys.resolve(&first.unwrap()).await.unwrap().unwrap();
        assert_eq!(ctx.account_id, account);

        let second = http::extractors::auth::ensure_api_key(&state, account)
            .await
            .unwrap();
        assert!(second.is_none());
    }
}
