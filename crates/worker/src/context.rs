//! The orchestrator context shared by every component.
//!
//! Everything that used to be process-global (claimed workers, the pending
//! queue, running tasks) is owned here and reached through an
//! `Arc<Orchestrator>`. Job runs and hold timers are spawned on the
//! [`TaskTracker`] so shutdown can cancel and await them.

use std::sync::Arc;
use std::time::Duration;

use tenmin_core::error::JobError;
use tenmin_core::types::ServerId;
use tenmin_db::Store;
use tenmin_events::Notifier;
use tenmin_pipeline::ScreenDriver;
use tenmin_vision::{RemoteSession, TemplateStore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::JobConfig;
use crate::queue::PendingQueue;
use crate::registry::WorkerRegistry;
use crate::slot::SessionSlot;

/// External collaborators the orchestrator drives.
pub struct Collaborators {
    pub store: Arc<dyn Store>,
    pub notifier: Arc<dyn Notifier>,
    pub driver: ScreenDriver,
    pub session: Arc<dyn RemoteSession>,
    pub templates: Arc<TemplateStore>,
}

pub struct Orchestrator {
    /// Scopes every RemotePC and TimerRecord row this process owns.
    pub server_id: ServerId,
    pub config: JobConfig,
    pub store: Arc<dyn Store>,
    pub notifier: Arc<dyn Notifier>,
    pub driver: ScreenDriver,
    pub session: Arc<dyn RemoteSession>,
    pub templates: Arc<TemplateStore>,
    pub registry: WorkerRegistry,
    pub queue: PendingQueue,
    pub slot: SessionSlot,
    pub(crate) tracker: TaskTracker,
    pub(crate) cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(server_id: ServerId, config: JobConfig, collaborators: Collaborators) -> Arc<Self> {
        let Collaborators {
            store,
            notifier,
            driver,
            session,
            templates,
        } = collaborators;

        Arc::new(Self {
            server_id,
            config,
            store,
            notifier,
            driver,
            session,
            templates,
            registry: WorkerRegistry::new(),
            queue: PendingQueue::new(),
            slot: SessionSlot::new(),
            tracker: TaskTracker::new(),
            cancel: CancellationToken::new(),
        })
    }

    /// Token cancelled when shutdown begins.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Number of job and hold tasks still running.
    pub fn running_tasks(&self) -> usize {
        self.tracker.len()
    }

    /// Sleep for `duration` unless shutdown starts first.
    pub(crate) async fn pause(&self, duration: Duration) -> Result<(), JobError> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(JobError::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }

    /// Cancel every loop, refuse new work and wait for tracked tasks.
    pub async fn shutdown(&self) {
        tracing::info!(
            running = self.tracker.len(),
            queued = self.queue.len(),
            "Orchestrator shutting down",
        );
        self.cancel.cancel();
        self.slot.close();
        self.tracker.close();
        self.tracker.wait().await;
        tracing::info!("All job tasks finished");
    }

    /// Like [`shutdown`](Self::shutdown) but gives up waiting after `timeout`.
    pub async fn shutdown_timeout(&self, timeout: Duration) -> bool {
        match tokio::time::timeout(timeout, self.shutdown()).await {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!(
                    running = self.tracker.len(),
                    timeout_secs = timeout.as_secs(),
                    "Job tasks still running after shutdown timeout",
                );
                false
            }
        }
    }
}
