//! Turns change-feed rows into registry updates and job requests.
//!
//! Presence updates (`remote_pcs`) claim a worker for this server. Job
//! updates (`job_requests`) for a claimed worker whose PC is idle become a
//! connect or OTP request, started at once when the session slot is free
//! and queued otherwise.

use std::sync::Arc;

use tenmin_core::status::{PcState, RequestKind};
use tenmin_core::types::WorkerId;
use tenmin_db::models::job_request::JOB_STATE_READY;
use tenmin_db::StoreError;
use tenmin_events::schema::{JOB_REQUESTS_V1, REMOTE_PCS_V1};
use tenmin_events::{Row, RowEvent, SchemaDriftError};

use crate::context::Orchestrator;
use crate::controller::Submission;
use crate::queue::{JobTicket, PendingRequest};

#[derive(Debug, thiserror::Error)]
pub enum TranslateError {
    #[error(transparent)]
    Schema(#[from] SchemaDriftError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("{table}.{column} is null")]
    MissingValue {
        table: &'static str,
        column: &'static str,
    },

    #[error("no translator for table {0}")]
    UnknownTable(String),
}

/// What an event did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Translation {
    Ignored(Skip),
    Registered(WorkerId),
    Started(PendingRequest),
    Queued(PendingRequest),
}

/// Why an event was ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Skip {
    OtherServer,
    NoWorker,
    StateChanged,
    AlreadyRegistered,
    UnknownWorker,
    OtpPassOnly,
    OtherService,
    NotReady,
    NoRemotePc,
    PcNotIdle,
}

pub async fn translate(ctx: &Arc<Orchestrator>, event: &RowEvent) -> Result<Translation, TranslateError> {
    match event.table.as_str() {
        t if t == REMOTE_PCS_V1.table => presence(ctx, event).await,
        t if t == JOB_REQUESTS_V1.table => job(ctx, event).await,
        other => Err(TranslateError::UnknownTable(other.to_string())),
    }
}

/// Worker id carried by an event, read without schema checks. Used to
/// blame a worker when translating the event failed.
pub fn worker_of(event: &RowEvent) -> Option<String> {
    let position = event.columns.iter().position(|c| c == "worker_id").or_else(|| {
        let schema = [REMOTE_PCS_V1, JOB_REQUESTS_V1]
            .into_iter()
            .find(|s| s.table == event.table)?;
        schema.columns.iter().position(|c| *c == "worker_id")
    })?;
    event
        .after
        .get(position)
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

async fn presence(ctx: &Orchestrator, event: &RowEvent) -> Result<Translation, TranslateError> {
    let row = REMOTE_PCS_V1.decode(event)?;

    if row.after.i64("server_id")? != Some(ctx.server_id) {
        return Ok(Translation::Ignored(Skip::OtherServer));
    }
    let Some(worker_id) = row.after.string("worker_id")? else {
        return Ok(Translation::Ignored(Skip::NoWorker));
    };

    if let Some(previous) = row.before.string("worker_id")? {
        if previous != worker_id && ctx.registry.unregister(&previous) {
            tracing::info!(previous = %previous, worker_id = %worker_id, "PC reassigned, previous worker released");
        }
    }

    if row.column_changed("state") {
        tracing::debug!(worker_id = %worker_id, "State changed with presence ping, not a claim");
        return Ok(Translation::Ignored(Skip::StateChanged));
    }
    if !ctx.registry.register(&worker_id) {
        return Ok(Translation::Ignored(Skip::AlreadyRegistered));
    }

    ctx.store.set_pc_state(ctx.server_id, &worker_id, PcState::Idle).await?;
    tracing::info!(worker_id = %worker_id, server_id = ctx.server_id, "Worker claimed a PC");
    Ok(Translation::Registered(worker_id))
}

async fn job(ctx: &Arc<Orchestrator>, event: &RowEvent) -> Result<Translation, TranslateError> {
    let row = JOB_REQUESTS_V1.decode(event)?;

    let Some(worker_id) = row.after.string("worker_id")? else {
        return Ok(Translation::Ignored(Skip::NoWorker));
    };
    if !ctx.registry.contains(&worker_id) {
        return Ok(Translation::Ignored(Skip::UnknownWorker));
    }
    if row.changed_columns() == ["otp_pass"] {
        return Ok(Translation::Ignored(Skip::OtpPassOnly));
    }

    if row.after.string("service")?.as_deref() != Some(ctx.config.target_service.as_str()) {
        return Ok(Translation::Ignored(Skip::OtherService));
    }
    let Some(kind) = request_kind(&row.after)? else {
        return Ok(Translation::Ignored(Skip::NotReady));
    };

    let Some(pc) = ctx.store.find_remote_pc(ctx.server_id, &worker_id).await? else {
        tracing::warn!(worker_id = %worker_id, "Job for a worker with no PC on this server");
        return Ok(Translation::Ignored(Skip::NoRemotePc));
    };
    if pc.pc_state().ok() != Some(PcState::Idle) {
        tracing::debug!(worker_id = %worker_id, state = %pc.state, "PC not idle, job not started");
        return Ok(Translation::Ignored(Skip::PcNotIdle));
    }

    let ticket = JobTicket {
        job_id: required(&row.after, "id")?,
        worker_id,
        secret: row.after.string("secret")?.unwrap_or_default(),
        requires_otp: kind == RequestKind::OtpCheck,
    };
    let request = PendingRequest::new(kind, ticket);
    tracing::info!(job_id = request.ticket.job_id, worker_id = %request.ticket.worker_id, kind = %kind, "Job ready");

    Ok(match ctx.submit(request.clone()) {
        Submission::Started => Translation::Started(request),
        Submission::Queued => Translation::Queued(request),
    })
}

/// Which flow a paid job row asks for, if any.
fn request_kind(row: &Row) -> Result<Option<RequestKind>, TranslateError> {
    let otp = required(row, "otp")?;
    let otp_pass = required(row, "otp_pass")?;
    let coupons = required(row, "coupon_count")?;
    let state = required(row, "state")?;

    if coupons != 0 || state != i64::from(JOB_STATE_READY) {
        return Ok(None);
    }
    Ok(match (otp, otp_pass) {
        (0, _) => Some(RequestKind::Connect),
        (1, 0) => Some(RequestKind::OtpCheck),
        _ => None,
    })
}

fn required(row: &Row, column: &'static str) -> Result<i64, TranslateError> {
    row.i64(column)?.ok_or(TranslateError::MissingValue {
        table: JOB_REQUESTS_V1.table,
        column,
    })
}
