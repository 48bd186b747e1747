//! Admission-deferred job requests.
//!
//! Whether a request starts at once or waits is decided under the queue
//! lock, together with whether a drainer is already running. A request
//! only starts directly when nothing is queued, no drain is in progress
//! and the session slot is free; otherwise it joins the back of the queue
//! and at most one drainer hands queued requests the session in order.

use std::collections::VecDeque;
use std::sync::Mutex;

use tenmin_core::status::RequestKind;
use tenmin_core::types::{JobId, WorkerId};
use tenmin_db::models::job_request::JobRequest;

use crate::slot::{SessionPermit, SessionSlot};

/// The parts of a job row a connect or OTP run needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobTicket {
    pub job_id: JobId,
    pub worker_id: WorkerId,
    pub secret: String,
    pub requires_otp: bool,
}

impl JobTicket {
    /// `None` when the row has no worker.
    pub fn from_row(row: &JobRequest) -> Option<Self> {
        Some(Self {
            job_id: row.id,
            worker_id: row.worker_id.clone()?,
            secret: row.secret.clone(),
            requires_otp: row.requires_otp(),
        })
    }
}

/// A request held until the session slot frees up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    pub kind: RequestKind,
    pub ticket: JobTicket,
}

impl PendingRequest {
    pub fn new(kind: RequestKind, ticket: JobTicket) -> Self {
        Self { kind, ticket }
    }
}

/// Result of [`PendingQueue::offer`].
#[derive(Debug)]
pub enum Offer {
    /// The session was free and nothing was waiting: run now.
    Start(PendingRequest, SessionPermit),
    /// Queued. `start_drain` is set when no drainer is running and the
    /// caller must start one.
    Queued { start_drain: bool },
}

#[derive(Default)]
struct QueueState {
    requests: VecDeque<PendingRequest>,
    draining: bool,
}

/// Process-wide FIFO of [`PendingRequest`]s.
#[derive(Default)]
pub struct PendingQueue {
    inner: Mutex<QueueState>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start `request` on a free `slot` or queue it behind earlier ones.
    pub fn offer(&self, request: PendingRequest, slot: &SessionSlot) -> Offer {
        self.with(|s| {
            if s.requests.is_empty() && !s.draining {
                if let Some(permit) = slot.try_acquire() {
                    return Offer::Start(request, permit);
                }
            }
            log_queued(&request);
            s.requests.push_back(request);
            let start_drain = !s.draining;
            s.draining = true;
            Offer::Queued { start_drain }
        })
    }

    /// Next request for the running drainer. `None` ends the drain, and
    /// the next queued request starts a new one.
    pub fn next_for_drain(&self) -> Option<PendingRequest> {
        self.with(|s| {
            let next = s.requests.pop_front();
            if next.is_none() {
                s.draining = false;
            }
            next
        })
    }

    /// The drainer gave up (shutdown). Queued requests stay in place.
    pub fn end_drain(&self) {
        self.with(|s| s.draining = false);
    }

    pub fn is_draining(&self) -> bool {
        self.with(|s| s.draining)
    }

    pub fn push(&self, request: PendingRequest) {
        log_queued(&request);
        self.with(|s| s.requests.push_back(request));
    }

    pub fn pop(&self) -> Option<PendingRequest> {
        self.with(|s| s.requests.pop_front())
    }

    pub fn len(&self) -> usize {
        self.with(|s| s.requests.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Job ids in queue order.
    pub fn job_ids(&self) -> Vec<JobId> {
        self.with(|s| s.requests.iter().map(|r| r.ticket.job_id).collect())
    }

    fn with<T>(&self, f: impl FnOnce(&mut QueueState) -> T) -> T {
        match self.inner.lock() {
            Ok(mut s) => f(&mut s),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}

fn log_queued(request: &PendingRequest) {
    tracing::info!(
        job_id = request.ticket.job_id,
        worker_id = %request.ticket.worker_id,
        kind = %request.kind,
        "Request queued until the session frees up",
    );
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn request(job_id: JobId) -> PendingRequest {
        PendingRequest::new(
            RequestKind::Connect,
            JobTicket {
                job_id,
                worker_id: format!("w{job_id}"),
                secret: "1234".into(),
                requires_otp: false,
            },
        )
    }

    #[test]
    fn pops_in_fifo_order() {
        let queue = PendingQueue::new();
        queue.push(request(2));
        queue.push(request(1));
        assert_eq!(queue.job_ids(), vec![2, 1]);
        assert_eq!(queue.pop().map(|r| r.ticket.job_id), Some(2));
        assert_eq!(queue.pop().map(|r| r.ticket.job_id), Some(1));
        assert!(queue.pop().is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn free_slot_starts_only_with_empty_queue() {
        let queue = PendingQueue::new();
        let slot = SessionSlot::new();

        let first = queue.offer(request(1), &slot);
        assert_matches!(first, Offer::Start(ref r, _) if r.ticket.job_id == 1);
        assert_matches!(queue.offer(request(2), &slot), Offer::Queued { start_drain: true });
        assert_matches!(queue.offer(request(3), &slot), Offer::Queued { start_drain: false });

        // The session frees up before the drainer got going: a newcomer
        // still queues behind 2 and 3.
        drop(first);
        assert!(!slot.is_busy());
        assert_matches!(queue.offer(request(4), &slot), Offer::Queued { start_drain: false });
        assert_eq!(queue.job_ids(), vec![2, 3, 4]);
    }

    #[test]
    fn request_after_final_pop_starts_a_new_drain() {
        let queue = PendingQueue::new();
        let slot = SessionSlot::new();
        let _busy = slot.try_acquire().unwrap();

        assert_matches!(queue.offer(request(1), &slot), Offer::Queued { start_drain: true });
        assert_eq!(queue.next_for_drain().map(|r| r.ticket.job_id), Some(1));
        assert!(queue.is_draining());
        assert!(queue.next_for_drain().is_none());
        assert!(!queue.is_draining());

        assert_matches!(queue.offer(request(2), &slot), Offer::Queued { start_drain: true });
    }

    #[test]
    fn ticket_needs_worker() {
        let row = JobRequest {
            id: 9,
            service: "10min".into(),
            secret: "42".into(),
            worker_id: None,
            coupon_count: 0,
            otp: 1,
            state: 2,
            otp_pass: 0,
        };
        assert!(JobTicket::from_row(&row).is_none());

        let row = JobRequest {
            worker_id: Some("w9".into()),
            ..row
        };
        let ticket = JobTicket::from_row(&row).unwrap();
        assert!(ticket.requires_otp);
        assert_eq!(ticket.worker_id, "w9");
    }
}
