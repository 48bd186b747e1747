//! Timer and waiting-queue service.
//!
//! A job that reached the hold point has a WAITING timer record. Its hold
//! task sleeps for the hold duration and then keeps offering every pending
//! record of this server to [`Orchestrator::check_timer`] until its own
//! record is TERMINATED. Each check first sweeps WAITING records whose hold
//! elapsed to TIMEOUT, then admits a teardown only when:
//!
//! - the record is TIMEOUT,
//! - no PC on the server is `working` and the session slot is free,
//! - it is the earliest-started TIMEOUT record of the server.

use std::sync::Arc;

use chrono::Utc;
use tenmin_core::error::JobError;
use tenmin_core::hold::{self, Admission};
use tenmin_core::status::{PcState, TimerState};
use tenmin_core::types::{JobId, PcNumber};
use tenmin_pipeline::handlers::HandlerContext;
use tenmin_pipeline::ScreenFsm;
use tenmin_vision::TemplateKey;

use crate::context::Orchestrator;
use crate::queue::JobTicket;

/// Missing records keep their own kind; everything else is a check-timer error.
fn timer_error(err: JobError) -> JobError {
    match err {
        JobError::CantFindTimerData { .. } => err,
        other => JobError::check_timer(other),
    }
}

/// Where a held job's teardown stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldProgress {
    Pending,
    Terminated,
    /// Teardown started but the PC was stopped by a reported failure.
    Failed,
}

impl Orchestrator {
    /// Promote WAITING records whose hold elapsed to TIMEOUT.
    pub async fn sweep(&self) -> Result<usize, JobError> {
        let now = Utc::now();
        let waiting = self
            .store
            .timers_in_states(None, &[TimerState::Waiting])
            .await
            .map_err(JobError::controller)?;

        let mut promoted = 0;
        for record in waiting {
            if !self.config.hold.is_expired_at(record.start_time, now) {
                continue;
            }
            self.store
                .set_timer_state(record.job_id, record.server_id, TimerState::Timeout, None)
                .await
                .map_err(JobError::controller)?;
            tracing::info!(job_id = record.job_id, server_id = record.server_id, "Hold elapsed");
            promoted += 1;
        }
        Ok(promoted)
    }

    /// Tear down `job_id` if it is its turn. Returns whether it ran.
    pub async fn check_timer(&self, job_id: JobId) -> Result<bool, JobError> {
        self.try_teardown(job_id).await.map_err(timer_error)
    }

    async fn try_teardown(&self, job_id: JobId) -> Result<bool, JobError> {
        self.sweep().await?;

        let record = self
            .store
            .find_timer(job_id, self.server_id)
            .await
            .map_err(JobError::controller)?
            .ok_or(JobError::CantFindTimerData { job_id })?;
        let state = record.timer_state().map_err(JobError::controller)?;

        let working = self
            .store
            .working_count(self.server_id)
            .await
            .map_err(JobError::controller)?;
        let head = self
            .store
            .timers_in_states(Some(self.server_id), &[TimerState::Timeout])
            .await
            .map_err(JobError::controller)?
            .first()
            .map(|r| r.job_id);

        match hold::admit(job_id, state, working, head) {
            Admission::Admit => {}
            refused => {
                tracing::debug!(job_id, ?refused, "Teardown not admitted yet");
                return Ok(false);
            }
        }

        let Some(_permit) = self.slot.try_acquire() else {
            tracing::debug!(job_id, "Session busy, teardown deferred");
            return Ok(false);
        };

        let worker_id = self
            .store
            .find_job(job_id)
            .await
            .map_err(JobError::controller)?
            .and_then(|job| job.worker_id)
            .ok_or_else(|| JobError::controller(format!("job {job_id} has no worker")))?;

        let claimed = self
            .store
            .claim_teardown(job_id, self.server_id, &worker_id)
            .await
            .map_err(JobError::controller)?;
        if !claimed {
            tracing::debug!(job_id, "Teardown claim lost");
            return Ok(false);
        }

        self.notifier.start(job_id).await;
        tracing::info!(job_id, worker_id = %worker_id, pc_number = record.pc_number, "Tearing down session");

        self.teardown(record.pc_number).await?;

        self.store
            .finish_teardown(job_id, self.server_id, &worker_id, Utc::now())
            .await
            .map_err(JobError::controller)?;
        self.notifier.success(job_id).await;
        tracing::info!(job_id, worker_id = %worker_id, "Session torn down");
        Ok(true)
    }

    /// Reconnect, close the client and disconnect. The exit screens and
    /// the process kill are fallbacks for each other; neither failing
    /// stops the teardown.
    async fn teardown(&self, pc_number: PcNumber) -> Result<(), JobError> {
        self.session.start_session(pc_number).await?;

        match self.templates.load_set(&TemplateKey::EXIT).await {
            Ok(templates) => {
                let cx = HandlerContext {
                    driver: &self.driver,
                    templates: &templates,
                    secret: "",
                };
                match ScreenFsm::exit(cx, &self.config.fsm).run(&self.cancel).await {
                    Ok(_) => tracing::debug!(pc_number, "Left the team"),
                    Err(JobError::Cancelled) => return Err(JobError::Cancelled),
                    Err(e) => tracing::warn!(pc_number, error = %e, "Exit screens not completed, killing client"),
                }
            }
            Err(e) => tracing::warn!(error = %e, "Exit templates unavailable, killing client"),
        }

        if let Err(e) = self.session.kill_remote_client().await {
            tracing::warn!(pc_number, error = %e, "Client kill sequence failed");
        }
        self.session.exit_session().await
    }

    /// Offer every pending record of this server to [`check_timer`](Self::check_timer),
    /// oldest first. Failures are reported against the record's own job.
    pub async fn process_waiting_tasks(&self) -> Result<usize, JobError> {
        let pending = self
            .store
            .timers_in_states(Some(self.server_id), &TimerState::PENDING_TEARDOWN)
            .await
            .map_err(|e| timer_error(JobError::controller(e)))?;
        tracing::debug!(count = pending.len(), "Processing waiting tasks");

        let mut finished = 0;
        for record in pending {
            if self.cancel.is_cancelled() {
                return Err(JobError::Cancelled);
            }
            match self.check_timer(record.job_id).await {
                Ok(true) => finished += 1,
                Ok(false) => {}
                Err(JobError::Cancelled) => return Err(JobError::Cancelled),
                Err(err) => self.report_timer_failure(record.job_id, &err).await,
            }
        }
        Ok(finished)
    }

    async fn report_timer_failure(&self, job_id: JobId, err: &JobError) {
        match self.store.find_job(job_id).await {
            Ok(Some(job)) => match job.worker_id {
                Some(worker_id) => self.fail_job(job_id, &worker_id, err).await,
                None => tracing::error!(job_id, error = %err, "Teardown failed for a job without worker"),
            },
            Ok(None) => tracing::error!(job_id, error = %err, "Teardown failed for a missing job"),
            Err(e) => tracing::error!(job_id, error = %err, lookup_error = %e, "Teardown failed, job lookup failed too"),
        }
    }

    /// Read where `ticket`'s teardown stands.
    pub async fn hold_progress(&self, ticket: &JobTicket) -> Result<HoldProgress, JobError> {
        let record = self
            .store
            .find_timer(ticket.job_id, self.server_id)
            .await
            .map_err(JobError::controller)?
            .ok_or(JobError::CantFindTimerData { job_id: ticket.job_id })?;

        match record.timer_state().map_err(JobError::controller)? {
            TimerState::Terminated => Ok(HoldProgress::Terminated),
            TimerState::Working => {
                let pc = self
                    .store
                    .find_remote_pc(self.server_id, &ticket.worker_id)
                    .await
                    .map_err(JobError::controller)?;
                let stopped = pc.and_then(|pc| pc.pc_state().ok()) == Some(PcState::Stopped);
                Ok(if stopped { HoldProgress::Failed } else { HoldProgress::Pending })
            }
            TimerState::Ready | TimerState::Waiting | TimerState::Timeout => Ok(HoldProgress::Pending),
        }
    }

    /// Spawn the wait-then-finish task for a job at its hold point.
    pub(crate) fn spawn_hold(self: &Arc<Self>, ticket: JobTicket) {
        let this = Arc::clone(self);
        self.tracker.spawn(async move {
            let result = this.wait_then_finish(&ticket).await;
            if let Err(err) = this.settle(&ticket, result).await {
                tracing::error!(job_id = ticket.job_id, error = %err, "Hold task failed");
                this.mark_pc_quietly(&ticket.worker_id, PcState::Stopped).await;
            }
        });
    }

    async fn wait_then_finish(&self, ticket: &JobTicket) -> Result<(), JobError> {
        self.pause(self.config.hold.hold).await?;

        loop {
            self.process_waiting_tasks().await?;
            match self.hold_progress(ticket).await.map_err(timer_error)? {
                HoldProgress::Terminated => {
                    tracing::info!(job_id = ticket.job_id, "Hold finished");
                    return Ok(());
                }
                HoldProgress::Failed => {
                    tracing::warn!(job_id = ticket.job_id, "Teardown failed, hold task ends");
                    return Ok(());
                }
                HoldProgress::Pending => {}
            }
            self.pause(self.config.timer_poll).await?;
        }
    }
}
