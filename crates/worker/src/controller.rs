//! Job controller.
//!
//! Two entry points, run with the session slot held:
//!
//! - `otp_check`: mark the PC working, notify "start", wait the OTP grace
//!   period, run the OTP loop, then fall through to `ten_min_start`;
//! - `ten_min_start`: mark the PC working and notify "start" unless OTP
//!   already did, wait the connect grace period, drive the connect screens
//!   and stop at the hold point.
//!
//! At the hold point the session is disengaged, the PC is set `waiting`, a
//! WAITING timer record is written, "waiting" is notified, the slot is
//! released and a hold task is spawned to tear the session down later.
//!
//! Requests that find the session busy are queued; a single drain task
//! hands the session to them in FIFO order as each job releases it.

use std::backtrace::Backtrace;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tenmin_core::error::{ErrorKind, JobError};
use tenmin_core::status::{PcState, RequestKind};
use tenmin_core::types::{JobId, PcNumber};
use tenmin_db::Store;
use tenmin_events::Notifier;
use tenmin_pipeline::handlers::HandlerContext;
use tenmin_pipeline::{OtpLoop, OtpRelay, ScreenFsm};
use tenmin_vision::TemplateKey;

use crate::context::Orchestrator;
use crate::queue::{JobTicket, Offer, PendingRequest};
use crate::slot::SessionPermit;

/// What happened to a request handed to [`Orchestrator::submit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    Started,
    Queued,
}

/// Per-run state threaded through both entry points.
struct JobRun {
    ticket: JobTicket,
    pc_number: Option<PcNumber>,
    engaged: bool,
    permit: Option<SessionPermit>,
}

impl Orchestrator {
    /// Start `request` now if the session is free and nothing is queued,
    /// otherwise queue it behind the requests already waiting.
    pub fn submit(self: &Arc<Self>, request: PendingRequest) -> Submission {
        match self.queue.offer(request, &self.slot) {
            Offer::Start(request, permit) => {
                let this = Arc::clone(self);
                self.tracker.spawn(async move {
                    this.run_request(request, permit).await;
                });
                Submission::Started
            }
            Offer::Queued { start_drain } => {
                if start_drain {
                    let this = Arc::clone(self);
                    self.tracker.spawn(async move {
                        this.drain().await;
                    });
                }
                Submission::Queued
            }
        }
    }

    /// Hand the session to queued requests one at a time, in FIFO order.
    /// Only one drain runs at a time; it ends when the queue is empty.
    async fn drain(self: &Arc<Self>) {
        loop {
            let permit = tokio::select! {
                _ = self.cancel.cancelled() => None,
                permit = self.slot.acquire() => permit,
            };
            let Some(permit) = permit else {
                self.queue.end_drain();
                tracing::warn!(
                    remaining = self.queue.len(),
                    "Shutting down, leaving queued requests",
                );
                return;
            };
            let Some(request) = self.queue.next_for_drain() else {
                return;
            };

            tracing::info!(
                job_id = request.ticket.job_id,
                worker_id = %request.ticket.worker_id,
                "Starting queued request",
            );
            self.run_request(request, permit).await;
        }
    }

    /// Run one request to completion and apply the failure policy.
    pub(crate) async fn run_request(self: &Arc<Self>, request: PendingRequest, permit: SessionPermit) {
        let ticket = request.ticket.clone();
        let result = self.run_job(request, permit).await;

        if let Err(err) = self.settle(&ticket, result).await {
            let backtrace = Backtrace::force_capture();
            tracing::error!(
                job_id = ticket.job_id,
                worker_id = %ticket.worker_id,
                kind = %err.kind(),
                error = %err,
                %backtrace,
                "Job aborted by unclassified error",
            );
            self.mark_pc_quietly(&ticket.worker_id, PcState::Stopped).await;
        }
    }

    async fn run_job(self: &Arc<Self>, request: PendingRequest, permit: SessionPermit) -> Result<(), JobError> {
        let PendingRequest { kind, ticket } = request;
        let mut run = JobRun {
            ticket,
            pc_number: None,
            engaged: false,
            permit: Some(permit),
        };

        let result = match kind {
            RequestKind::OtpCheck => match self.otp_check(&mut run).await {
                Ok(()) => self.ten_min_start(&mut run, true).await,
                Err(e) => Err(e),
            },
            RequestKind::Connect => self.ten_min_start(&mut run, false).await,
        };

        if result.is_err() && run.engaged {
            if let Err(e) = self.session.exit_session().await {
                tracing::warn!(job_id = run.ticket.job_id, error = %e, "Could not close remote session after failure");
            }
        }
        result
    }

    async fn otp_check(&self, run: &mut JobRun) -> Result<(), JobError> {
        let job_id = run.ticket.job_id;
        self.begin(&run.ticket).await?;
        self.pause(self.config.otp_grace).await?;
        self.prepare(run).await?;

        let templates = self.templates.load_set(&TemplateKey::OTP).await?;
        let relay = StoreRelay {
            store: self.store.as_ref(),
            notifier: self.notifier.as_ref(),
            job_id,
        };
        let code = OtpLoop::new(&self.driver, &templates, &relay, &self.config.otp)
            .run(&self.cancel)
            .await?;

        tracing::info!(job_id, code = ?code, "OTP passed, connecting");
        Ok(())
    }

    async fn ten_min_start(self: &Arc<Self>, run: &mut JobRun, after_otp: bool) -> Result<(), JobError> {
        if !after_otp {
            self.begin(&run.ticket).await?;
        }
        self.pause(self.config.connect_grace).await?;
        self.prepare(run).await?;

        let mut keys = TemplateKey::CONNECT.to_vec();
        if self.config.fsm.optional_screens {
            keys.extend(TemplateKey::OPTIONAL);
        }
        let mut templates = self.templates.load_set(&keys).await?;
        templates.extend(self.templates.load_digits(&run.ticket.secret).await?);

        let cx = HandlerContext {
            driver: &self.driver,
            templates: &templates,
            secret: &run.ticket.secret,
        };
        ScreenFsm::connect(cx, &self.config.fsm).run(&self.cancel).await?;

        self.hold(run).await
    }

    /// Mark the PC working and tell the API the job started.
    async fn begin(&self, ticket: &JobTicket) -> Result<(), JobError> {
        self.set_pc(&ticket.worker_id, PcState::Working).await?;
        self.notifier.start(ticket.job_id).await;
        tracing::info!(job_id = ticket.job_id, worker_id = %ticket.worker_id, "Job started");
        Ok(())
    }

    /// Validate the worker and open its remote session. Runs once per job.
    async fn prepare(&self, run: &mut JobRun) -> Result<(), JobError> {
        if run.pc_number.is_some() {
            return Ok(());
        }
        let worker_id = run.ticket.worker_id.as_str();

        self.store
            .find_remote_pc(self.server_id, worker_id)
            .await
            .map_err(JobError::controller)?
            .ok_or_else(|| JobError::NoWorker {
                worker_id: worker_id.to_string(),
            })?;

        let pc_number = self
            .store
            .pc_number(worker_id)
            .await
            .map_err(JobError::controller)?
            .ok_or_else(|| JobError::CantFindPcNumber {
                worker_id: worker_id.to_string(),
            })?;
        run.pc_number = Some(pc_number);

        if self.config.engage_session {
            self.session.start_session(pc_number).await?;
            run.engaged = true;
        }
        tracing::debug!(job_id = run.ticket.job_id, worker_id, pc_number, "Worker validated");
        Ok(())
    }

    /// Park the job until its hold elapses and free the session.
    async fn hold(self: &Arc<Self>, run: &mut JobRun) -> Result<(), JobError> {
        let JobTicket { job_id, worker_id, .. } = &run.ticket;
        let pc_number = run
            .pc_number
            .ok_or_else(|| JobError::controller("hold reached without a PC number"))?;

        if run.engaged {
            self.session.exit_session().await?;
            run.engaged = false;
        }
        self.set_pc(worker_id, PcState::Waiting).await?;
        self.store
            .insert_timer(*job_id, self.server_id, pc_number, Utc::now())
            .await
            .map_err(JobError::controller)?;
        self.notifier.waiting(*job_id).await;

        drop(run.permit.take());
        tracing::info!(
            job_id,
            worker_id = %worker_id,
            hold_secs = self.config.hold.hold.as_secs(),
            "Connected, holding session",
        );

        self.spawn_hold(run.ticket.clone());
        Ok(())
    }

    async fn set_pc(&self, worker_id: &str, state: PcState) -> Result<(), JobError> {
        let updated = self
            .store
            .set_pc_state(self.server_id, worker_id, state)
            .await
            .map_err(JobError::controller)?;
        if !updated {
            tracing::warn!(worker_id, state = %state, "No RemotePC row to update");
        }
        Ok(())
    }

    /// Best-effort state change used on failure paths.
    pub(crate) async fn mark_pc_quietly(&self, worker_id: &str, state: PcState) {
        if let Err(e) = self.store.set_pc_state(self.server_id, worker_id, state).await {
            tracing::error!(worker_id, state = %state, error = %e, "Failed to update RemotePC state");
        }
    }

    /// Apply the failure policy. Classified errors are handled here;
    /// unclassified ones are handed back.
    pub(crate) async fn settle(&self, ticket: &JobTicket, result: Result<(), JobError>) -> Result<(), JobError> {
        let Err(err) = result else {
            return Ok(());
        };

        match err.kind() {
            ErrorKind::Cancelled => {
                tracing::info!(job_id = ticket.job_id, worker_id = %ticket.worker_id, "Job cancelled");
                Ok(())
            }
            ErrorKind::Controller => Err(err),
            ErrorKind::NoWorker
            | ErrorKind::CantFindPcNumber
            | ErrorKind::CantFindRemoteProgram
            | ErrorKind::TemplateEmpty
            | ErrorKind::NoDetection
            | ErrorKind::WrongPassword
            | ErrorKind::DuplicateLogin
            | ErrorKind::OtpTimeout
            | ErrorKind::OtpOverDetectionLimit
            | ErrorKind::Otp
            | ErrorKind::CantFindTimerData
            | ErrorKind::CheckTimer => {
                self.fail_job(ticket.job_id, &ticket.worker_id, &err).await;
                Ok(())
            }
        }
    }

    /// Stop the PC, notify the classified error and log it.
    pub(crate) async fn fail_job(&self, job_id: JobId, worker_id: &str, err: &JobError) {
        let kind = err.kind();
        let category = kind.category();
        let detail = err.detail();

        self.mark_pc_quietly(worker_id, PcState::Stopped).await;
        self.notifier.error(job_id, category, &detail).await;

        let backtrace = Backtrace::force_capture();
        tracing::error!(
            job_id,
            worker_id,
            kind = %kind,
            category,
            detail = %detail,
            error = %err,
            %backtrace,
            "Job failed",
        );
    }
}

/// OTP state kept on the job row, codes relayed through the API.
struct StoreRelay<'a> {
    store: &'a dyn Store,
    notifier: &'a dyn Notifier,
    job_id: JobId,
}

#[async_trait]
impl OtpRelay for StoreRelay<'_> {
    async fn passed(&self) -> Result<bool, JobError> {
        self.store
            .otp_pass(self.job_id)
            .await
            .map_err(JobError::controller)?
            .ok_or_else(|| JobError::controller(format!("job {} disappeared", self.job_id)))
    }

    async fn mark_passed(&self) -> Result<(), JobError> {
        self.store
            .set_otp_pass(self.job_id, true)
            .await
            .map_err(JobError::controller)
    }

    async fn send_code(&self, code: &str) -> bool {
        self.notifier.otp(self.job_id, code).await
    }
}
