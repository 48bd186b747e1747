//! Server registration and cleanup.
//!
//! At startup a previous run's identity file means that run did not stop
//! cleanly: its RemotePC rows are removed and the API is told it went away.
//! A fresh id is then generated, advertised with one unclaimed RemotePC row
//! and announced with "login". Orderly shutdown undoes the same steps.

use std::sync::Arc;

use tenmin_core::identity::{IdentityError, ServerIdentity};
use tenmin_core::types::ServerId;
use tenmin_db::{Store, StoreError};
use tenmin_events::Notifier;

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

pub struct ServerLifecycle {
    identity: ServerIdentity,
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    service: String,
}

impl ServerLifecycle {
    pub fn new(
        identity: ServerIdentity,
        store: Arc<dyn Store>,
        notifier: Arc<dyn Notifier>,
        service: impl Into<String>,
    ) -> Self {
        Self {
            identity,
            store,
            notifier,
            service: service.into(),
        }
    }

    /// Clean up after a run that left its identity file behind. Returns
    /// the stale id, if there was one.
    pub async fn cleanup_stale(&self) -> Result<Option<ServerId>, LifecycleError> {
        let Some(stale) = self.identity.read().await? else {
            return Ok(None);
        };
        tracing::warn!(server_id = stale, "Previous run did not shut down cleanly, cleaning up");
        self.retire(stale).await?;
        Ok(Some(stale))
    }

    /// Generate and advertise this process's server id.
    pub async fn start(&self) -> Result<ServerId, LifecycleError> {
        let server_id = self.identity.generate().await?;
        self.store.register_server(server_id, &self.service).await?;
        if !self.notifier.login(server_id).await {
            tracing::warn!(server_id, "Login notification not delivered");
        }
        tracing::info!(server_id, service = %self.service, "Server registered");
        Ok(server_id)
    }

    /// Withdraw `server_id` and forget it.
    pub async fn stop(&self, server_id: ServerId) -> Result<(), LifecycleError> {
        self.retire(server_id).await?;
        tracing::info!(server_id, "Server withdrawn");
        Ok(())
    }

    async fn retire(&self, server_id: ServerId) -> Result<(), LifecycleError> {
        let removed = self.store.remove_server(server_id).await?;
        if !self.notifier.disconnect(server_id).await {
            tracing::warn!(server_id, "Disconnect notification not delivered");
        }
        self.identity.delete().await?;
        tracing::debug!(server_id, removed, "RemotePC rows removed");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use tenmin_core::status::PcState;
    use tenmin_db::memory::MemoryStore;
    use tenmin_events::testing::{Notification, RecordingNotifier};

    use super::*;

    struct Fixture {
        _dir: tempfile::TempDir,
        identity: ServerIdentity,
        store: Arc<MemoryStore>,
        notifier: Arc<RecordingNotifier>,
        lifecycle: ServerLifecycle,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let identity = ServerIdentity::new(dir.path().join("server_id.txt"));
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let lifecycle = ServerLifecycle::new(identity.clone(), store.clone(), notifier.clone(), "10min");
        Fixture {
            _dir: dir,
            identity,
            store,
            notifier,
            lifecycle,
        }
    }

    #[tokio::test]
    async fn start_registers_and_announces() {
        let f = fixture();

        let server_id = f.lifecycle.start().await.unwrap();

        assert_eq!(f.identity.read().await.unwrap(), Some(server_id));
        let pcs = f.store.remote_pcs().await;
        assert_eq!(pcs.len(), 1);
        assert_eq!(pcs[0].server_id, server_id);
        assert_eq!(pcs[0].worker_id, None);
        assert_eq!(f.notifier.calls(), vec![Notification::Login(server_id)]);
    }

    #[tokio::test]
    async fn stale_identity_is_cleaned_up() {
        let f = fixture();
        tokio::fs::write(f.identity.path(), "4242").await.unwrap();
        f.store.add_remote_pc(4242, Some("w-1"), PcState::Working).await;
        f.store.add_remote_pc(7, Some("w-2"), PcState::Idle).await;

        let stale = f.lifecycle.cleanup_stale().await.unwrap();

        assert_eq!(stale, Some(4242));
        assert_eq!(f.identity.read().await.unwrap(), None);
        let pcs = f.store.remote_pcs().await;
        assert_eq!(pcs.len(), 1);
        assert_eq!(pcs[0].server_id, 7);
        assert_eq!(f.notifier.calls(), vec![Notification::Disconnect(4242)]);
    }

    #[tokio::test]
    async fn no_identity_means_nothing_to_clean() {
        let f = fixture();

        assert_eq!(f.lifecycle.cleanup_stale().await.unwrap(), None);
        assert!(f.notifier.calls().is_empty());
    }

    #[tokio::test]
    async fn stop_withdraws_server() {
        let f = fixture();
        let server_id = f.lifecycle.start().await.unwrap();

        f.lifecycle.stop(server_id).await.unwrap();

        assert!(f.store.remote_pcs().await.is_empty());
        assert_eq!(f.identity.read().await.unwrap(), None);
        assert_eq!(
            f.notifier.calls(),
            vec![Notification::Login(server_id), Notification::Disconnect(server_id)],
        );
    }

    #[tokio::test]
    async fn store_failure_keeps_identity_file() {
        let f = fixture();
        tokio::fs::write(f.identity.path(), "99").await.unwrap();
        f.store.set_failing(true).await;

        let err = f.lifecycle.cleanup_stale().await.unwrap_err();

        assert_matches!(err, LifecycleError::Store(_));
        assert_eq!(f.identity.read().await.unwrap(), Some(99));
    }
}
