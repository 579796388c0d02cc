//! Single-task execution: status transitions, handler dispatch, retries

use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::engine::state::SharedState;
use crate::queue::TaskQueue;
use crate::task::{FailureOutcome, Handler, HandlerError, HandlerResult};

/// Run one dequeued task through a full attempt
///
/// Handler errors are recorded on the task record and never returned.
pub(crate) async fn process_task(
    state: &SharedState,
    queue: &TaskQueue,
    task_id: String,
    shutdown_rx: &mut watch::Receiver<bool>,
) {
    let (task_type, payload) = {
        let mut table = state.table.write();
        let Some(record) = table.tasks.get_mut(&task_id) else {
            error!(%task_id, "Dequeued task is missing from the task table");
            return;
        };
        if record.is_terminal() {
            warn!(%task_id, status = %record.status, "Dequeued task is already terminal, skipping");
            return;
        }
        record.mark_processing();
        (record.task_type.clone(), record.payload.clone())
    };

    let handler = state.registry.read().get(&task_type);
    let started = Instant::now();

    let result = match handler {
        Some(handler) => {
            debug!(%task_id, %task_type, mode = ?handler.mode(), "Executing task");
            run_handler(state, &task_type, handler, payload).await
        }
        None => {
            error!(%task_id, %task_type, "No handler registered for dequeued task");
            Err(HandlerError::permanent(format!(
                "no handler registered for task type: {task_type}"
            )))
        }
    };
    let elapsed = started.elapsed();

    let retry = {
        let mut table = state.table.write();
        let table = &mut *table;
        let Some(record) = table.tasks.get_mut(&task_id) else {
            error!(%task_id, "Task disappeared from the task table while running");
            return;
        };

        match result {
            Ok(output) => {
                record.mark_completed(output);
                table.metrics.record_success(elapsed);
                info!(%task_id, %task_type, elapsed_ms = elapsed.as_millis() as u64, "Task completed");
                None
            }
            Err(err) => match record.record_failure(err.message(), err.is_retryable()) {
                FailureOutcome::WillRetry { retry_count } => {
                    table.metrics.record_retry();
                    let delay = state.config.backoff.delay_for_retry(retry_count);
                    warn!(
                        %task_id,
                        %task_type,
                        retry_count,
                        max_retries = record.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "Task failed, scheduling retry: {}",
                        err
                    );
                    Some(delay)
                }
                FailureOutcome::Failed => {
                    table.metrics.record_failure();
                    error!(
                        %task_id,
                        %task_type,
                        retry_count = record.retry_count,
                        permanent = !err.is_retryable(),
                        "Task failed: {}",
                        err
                    );
                    None
                }
            },
        }
    };

    if let Some(delay) = retry {
        wait_backoff(delay, shutdown_rx).await;
        queue.push(task_id);
    }
}

/// Sleep out a retry backoff, cut short by shutdown
async fn wait_backoff(delay: Duration, shutdown_rx: &mut watch::Receiver<bool>) {
    if *shutdown_rx.borrow() {
        return;
    }

    tokio::select! {
        _ = tokio::time::sleep(delay) => {}
        _ = shutdown_rx.changed() => {
            debug!("Backoff interrupted by shutdown, re-queueing now");
        }
    }
}

/// Invoke a handler in its execution mode, applying the optional deadline
///
/// Async handlers run in their own tokio task so a panic is caught and a
/// timed-out handler can be aborted. Blocking handlers cannot be aborted; on
/// timeout they keep their pool slot until they return.
async fn run_handler(
    state: &SharedState,
    task_type: &str,
    handler: Handler,
    payload: serde_json::Value,
) -> HandlerResult {
    let timeout = state.config.handler_timeout;

    match handler {
        Handler::Async(handler) => {
            let mut join = tokio::spawn(async move { handler.execute(payload).await });
            let joined = match timeout {
                Some(limit) => match tokio::time::timeout(limit, &mut join).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        join.abort();
                        return Err(timed_out(limit));
                    }
                },
                None => join.await,
            };

            joined.unwrap_or_else(|e| {
                Err(HandlerError::retryable(format!("handler did not complete: {e}")))
            })
        }
        Handler::Blocking(handler) => {
            let run = state.blocking.run(task_type, handler, payload);
            match timeout {
                Some(limit) => tokio::time::timeout(limit, run)
                    .await
                    .unwrap_or_else(|_| Err(timed_out(limit))),
                None => run.await,
            }
        }
    }
}

fn timed_out(limit: Duration) -> HandlerError {
    HandlerError::retryable(format!("handler timed out after {limit:?}"))
}
