//! Event translation against an in-memory store.
//!
//! Verifies:
//! - presence pings for other servers change nothing
//! - duplicate claims register a worker once
//! - a state edit riding on a ping is not a claim
//! - job rows start connect or OTP runs only when paid and eligible
//! - the OTP pass flag flipping on its own never starts a run

mod common;

use assert_matches::assert_matches;
use tenmin_core::status::{PcState, RequestKind};
use tenmin_db::models::job_request::JobRequest;
use tenmin_worker::translator::{self, Skip, Translation};

use common::*;

// ---------------------------------------------------------------------------
// Presence
// ---------------------------------------------------------------------------

#[tokio::test]
async fn presence_for_other_server_is_ignored() {
    let h = harness();
    h.store.add_remote_pc(SERVER, Some("w1"), PcState::None).await;

    let outcome = translator::translate(&h.ctx, &claim_event(SERVER + 1, "w1")).await.unwrap();

    assert_eq!(outcome, Translation::Ignored(Skip::OtherServer));
    assert!(h.ctx.registry.is_empty());
    assert_eq!(h.store.pc_state(SERVER, "w1").await, Some(PcState::None));
}

#[tokio::test]
async fn claim_registers_worker_once() {
    let h = harness();
    h.store.add_remote_pc(SERVER, Some("w1"), PcState::None).await;

    let first = translator::translate(&h.ctx, &claim_event(SERVER, "w1")).await.unwrap();
    let second = translator::translate(&h.ctx, &claim_event(SERVER, "w1")).await.unwrap();

    assert_eq!(first, Translation::Registered("w1".into()));
    assert_eq!(second, Translation::Ignored(Skip::AlreadyRegistered));
    assert_eq!(h.ctx.registry.len(), 1);
    assert_eq!(h.store.pc_state(SERVER, "w1").await, Some(PcState::Idle));
}

#[tokio::test]
async fn state_edit_with_ping_is_not_a_claim() {
    let h = harness();
    h.store.add_remote_pc(SERVER, Some("w1"), PcState::None).await;

    let outcome = translator::translate(&h.ctx, &presence_event(SERVER, "w1", "none", "stopped"))
        .await
        .unwrap();

    assert_eq!(outcome, Translation::Ignored(Skip::StateChanged));
    assert!(!h.ctx.registry.contains("w1"));
}

#[tokio::test]
async fn reassigned_pc_releases_previous_worker() {
    let h = harness();
    h.store.add_remote_pc(SERVER, Some("w2"), PcState::None).await;
    h.ctx.registry.register("w1");

    let mut event = presence_event(SERVER, "w2", "none", "none");
    event.before[3] = serde_json::json!("w1");

    let outcome = translator::translate(&h.ctx, &event).await.unwrap();

    assert_eq!(outcome, Translation::Registered("w2".into()));
    assert!(!h.ctx.registry.contains("w1"));
    assert!(h.ctx.registry.contains("w2"));
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

#[tokio::test]
async fn otp_pass_flag_alone_never_starts_a_run() {
    let h = harness();
    h.idle_worker("w1", 1).await;
    let job = job_row(1, "w1", 1);

    let outcome = translator::translate(&h.ctx, &otp_pass_event(&job)).await.unwrap();

    assert_eq!(outcome, Translation::Ignored(Skip::OtpPassOnly));
    assert_eq!(h.ctx.running_tasks(), 0);
    assert!(h.ctx.queue.is_empty());
    assert!(h.notifications().is_empty());
}

#[tokio::test]
async fn job_for_unregistered_worker_is_ignored() {
    let h = harness();
    h.store.add_remote_pc(SERVER, Some("w1"), PcState::Idle).await;

    let outcome = translator::translate(&h.ctx, &paid_event(&job_row(1, "w1", 0))).await.unwrap();

    assert_eq!(outcome, Translation::Ignored(Skip::UnknownWorker));
}

#[tokio::test]
async fn job_for_other_service_is_ignored() {
    let h = harness();
    h.idle_worker("w1", 1).await;
    let job = JobRequest {
        service: "30min".into(),
        ..job_row(1, "w1", 0)
    };

    let outcome = translator::translate(&h.ctx, &paid_event(&job)).await.unwrap();

    assert_eq!(outcome, Translation::Ignored(Skip::OtherService));
}

#[tokio::test]
async fn coupon_or_unpaid_job_is_not_ready() {
    let h = harness();
    h.idle_worker("w1", 1).await;
    let with_coupon = JobRequest {
        coupon_count: 1,
        ..job_row(1, "w1", 0)
    };
    let already_passed = JobRequest {
        otp_pass: 1,
        ..job_row(2, "w1", 1)
    };

    assert_eq!(
        translator::translate(&h.ctx, &paid_event(&with_coupon)).await.unwrap(),
        Translation::Ignored(Skip::NotReady),
    );
    assert_eq!(
        translator::translate(&h.ctx, &paid_event(&already_passed)).await.unwrap(),
        Translation::Ignored(Skip::NotReady),
    );
}

#[tokio::test]
async fn busy_pc_does_not_start_job() {
    let h = harness();
    h.store.add_remote_pc(SERVER, Some("w1"), PcState::Waiting).await;
    h.ctx.registry.register("w1");

    let outcome = translator::translate(&h.ctx, &paid_event(&job_row(1, "w1", 0))).await.unwrap();

    assert_eq!(outcome, Translation::Ignored(Skip::PcNotIdle));
}

#[tokio::test(start_paused = true)]
async fn paid_jobs_pick_connect_or_otp() {
    let h = harness();
    h.idle_worker("w1", 1).await;
    h.idle_worker("w2", 2).await;

    let connect = translator::translate(&h.ctx, &paid_event(&job_row(1, "w1", 0))).await.unwrap();
    let otp = translator::translate(&h.ctx, &paid_event(&job_row(2, "w2", 1))).await.unwrap();

    assert_matches!(connect, Translation::Started(r) if r.kind == RequestKind::Connect && r.ticket.job_id == 1);
    assert_matches!(otp, Translation::Queued(r) if r.kind == RequestKind::OtpCheck && r.ticket.requires_otp);
    assert_eq!(h.ctx.queue.job_ids(), vec![2]);

    h.ctx.shutdown().await;
}

#[tokio::test]
async fn schema_drift_is_an_error() {
    let h = harness();
    h.idle_worker("w1", 1).await;
    let mut event = paid_event(&job_row(1, "w1", 0));
    event.after.pop();

    let err = translator::translate(&h.ctx, &event).await.unwrap_err();

    assert_matches!(err, translator::TranslateError::Schema(_));
    assert_eq!(translator::worker_of(&event).as_deref(), Some("w1"));
}
