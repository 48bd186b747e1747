//! Change feed watcher.
//!
//! Polls the feed and hands each event to the translator. An empty poll
//! waits [`IDLE_BACKOFF`], a feed error waits [`ERROR_BACKOFF`]; neither
//! ends the loop. A failed event is logged and its worker's PC is set
//! `stopped`. Cancellation closes the feed and returns.

use std::sync::Arc;
use std::time::Duration;

use tenmin_core::status::PcState;
use tenmin_events::{ChangeFeed, RowEvent};
use tokio::task::JoinHandle;

use crate::context::Orchestrator;
use crate::translator::{self, Translation};

pub const IDLE_BACKOFF: Duration = Duration::from_secs(1);
pub const ERROR_BACKOFF: Duration = Duration::from_secs(3);

/// Run until the orchestrator's token is cancelled.
pub async fn run(ctx: &Arc<Orchestrator>, feed: &mut dyn ChangeFeed) {
    let cancel = ctx.cancel_token();
    tracing::info!(server_id = ctx.server_id, "Change feed watcher started");

    loop {
        let backoff = tokio::select! {
            _ = cancel.cancelled() => break,
            polled = feed.poll() => match polled {
                Ok(Some(event)) => {
                    handle_event(ctx, &event).await;
                    None
                }
                Ok(None) => Some(IDLE_BACKOFF),
                Err(e) => {
                    tracing::warn!(error = %e, "Change feed poll failed, retrying");
                    Some(ERROR_BACKOFF)
                }
            },
        };

        if let Some(backoff) = backoff {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(backoff) => {}
            }
        }
    }

    tracing::info!("Change feed watcher shutting down");
    if let Err(e) = feed.close().await {
        tracing::warn!(error = %e, "Failed to close change feed");
    }
}

/// Translate one event. Failures stay inside this event.
pub async fn handle_event(ctx: &Arc<Orchestrator>, event: &RowEvent) {
    match translator::translate(ctx, event).await {
        Ok(Translation::Ignored(skip)) => {
            tracing::trace!(table = %event.table, ?skip, "Event ignored");
        }
        Ok(outcome) => {
            tracing::debug!(table = %event.table, ?outcome, "Event handled");
        }
        Err(e) => {
            let worker_id = translator::worker_of(event);
            tracing::error!(
                table = %event.table,
                worker_id = worker_id.as_deref().unwrap_or("-"),
                error = %e,
                "Failed to handle change event",
            );
            if let Some(worker_id) = worker_id {
                ctx.mark_pc_quietly(&worker_id, PcState::Stopped).await;
            }
        }
    }
}

/// Wait up to `timeout` for a spawned watcher to finish. Returns `false`
/// and logs when it panicked or is still running.
pub async fn join(handle: JoinHandle<()>, timeout: Duration) -> bool {
    match tokio::time::timeout(timeout, handle).await {
        Ok(Ok(())) => {
            tracing::info!("Change feed watcher stopped");
            true
        }
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Change feed watcher task failed");
            false
        }
        Err(_) => {
            tracing::warn!(
                timeout_secs = timeout.as_secs(),
                "Change feed watcher still running after shutdown timeout",
            );
            false
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn join_reports_finished_watcher() {
        let handle = tokio::spawn(async {});
        assert!(join(handle, Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn join_reports_panicked_watcher() {
        let handle = tokio::spawn(async { panic!("feed decoder blew up") });
        assert!(!join(handle, Duration::from_secs(1)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn join_gives_up_on_stuck_watcher() {
        let handle = tokio::spawn(std::future::pending::<()>());
        assert!(!join(handle, Duration::from_secs(5)).await);
    }
}
