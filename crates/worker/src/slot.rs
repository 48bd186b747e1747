//! The single active remote-control session.
//!
//! Input injection drives one focused remote session for the whole
//! process, so only one job may drive a screen at a time. The slot is a
//! one-permit semaphore: new requests and teardown admission use
//! [`SessionSlot::try_acquire`], queue drains wait with
//! [`SessionSlot::acquire`]. Dropping the permit releases the slot.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Clone)]
pub struct SessionSlot {
    semaphore: Arc<Semaphore>,
}

/// Proof of holding the session. Released on drop.
#[derive(Debug)]
pub struct SessionPermit {
    _permit: OwnedSemaphorePermit,
}

impl Default for SessionSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionSlot {
    pub fn new() -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(1)),
        }
    }

    /// Take the session if it is free.
    pub fn try_acquire(&self) -> Option<SessionPermit> {
        self.semaphore
            .clone()
            .try_acquire_owned()
            .ok()
            .map(|permit| SessionPermit { _permit: permit })
    }

    /// Wait for the session. `None` once the slot is closed for shutdown.
    pub async fn acquire(&self) -> Option<SessionPermit> {
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .ok()
            .map(|permit| SessionPermit { _permit: permit })
    }

    pub fn is_busy(&self) -> bool {
        self.semaphore.available_permits() == 0
    }

    /// Wake every waiter with `None`; later acquires fail at once.
    pub fn close(&self) {
        self.semaphore.close();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn second_try_acquire_is_refused() {
        let slot = SessionSlot::new();
        let permit = slot.try_acquire().unwrap();
        assert!(slot.is_busy());
        assert!(slot.try_acquire().is_none());

        drop(permit);
        assert!(!slot.is_busy());
        assert!(slot.try_acquire().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_waits_for_release() {
        let slot = SessionSlot::new();
        let permit = slot.try_acquire().unwrap();

        let waiter = tokio::spawn({
            let slot = slot.clone();
            async move { slot.acquire().await.is_some() }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        drop(permit);
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn close_wakes_waiters() {
        let slot = SessionSlot::new();
        let _permit = slot.try_acquire().unwrap();
        slot.close();
        assert!(slot.acquire().await.is_none());
    }
}
