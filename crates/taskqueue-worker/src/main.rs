use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use taskqueue::{ManagerConfig, TaskManager};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod handlers;
mod input;

use input::SubmitLine;

/// Longest wait for queued work after stdin closes
const DRAIN_TIMEOUT: Duration = Duration::from_secs(60);
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "taskqueue=info,taskqueue_worker=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("taskqueue-worker starting...");

    let config = ManagerConfig::from_env()?;
    tracing::info!(
        max_workers = config.max_workers,
        workers_per_type = config.workers_per_type(),
        blocking_pool = ?config.blocking_pool,
        "Manager configured"
    );

    let manager = Arc::new(TaskManager::new(config));
    handlers::register_demo_handlers(&manager);
    manager.start().await;

    tracing::info!("Reading tasks from stdin, one JSON object per line");

    tokio::select! {
        result = submit_from_stdin(&manager) => {
            result?;
            tracing::info!("Input closed, draining queues...");
            tokio::select! {
                _ = drain(&manager) => {}
                signal = tokio::signal::ctrl_c() => {
                    signal?;
                    tracing::info!("Interrupted while draining");
                }
            }
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!("Received shutdown signal");
        }
    }

    manager.stop().await;

    let stats = manager.get_stats();
    println!("{}", serde_json::to_string_pretty(&stats)?);

    tracing::info!("Worker shutdown complete");
    Ok(())
}

/// Submit every line from stdin until EOF
///
/// Bad lines and rejected submissions are logged and skipped.
async fn submit_from_stdin(manager: &TaskManager) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let request = match SubmitLine::parse(&line) {
            Ok(Some(request)) => request,
            Ok(None) => continue,
            Err(e) => {
                tracing::warn!("Skipping malformed input line: {}", e);
                continue;
            }
        };

        let options = request.options();
        match manager.submit_with(&request.task_type, request.payload, options) {
            Ok(task_id) => tracing::info!(%task_id, task_type = %request.task_type, "Submitted"),
            Err(e) => tracing::warn!(task_type = %request.task_type, "Submission rejected: {}", e),
        }
    }

    Ok(())
}

/// Wait until no task is pending, processing or retrying, or the timeout hits
async fn drain(manager: &TaskManager) {
    let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
        while manager.get_stats().outstanding() > 0 {
            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
        }
    })
    .await;

    if drained.is_err() {
        tracing::warn!(
            outstanding = manager.get_stats().outstanding(),
            timeout_secs = DRAIN_TIMEOUT.as_secs(),
            "Drain timed out, stopping with work still queued"
        );
    }
}
