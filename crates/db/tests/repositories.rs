//! Integration tests for the repository layer against a real database.
//!
//! Ignored by default; run with `DATABASE_URL` set and `--ignored`.
//! Verifies:
//! - RemotePC state transitions and the working count
//! - FIFO ordering of timer listings
//! - The teardown claim refuses busy servers and only moves `TIMEOUT`
//! - The row-change trigger publishes named columns

use chrono::{Duration, Utc};
use sqlx::postgres::PgListener;
use sqlx::PgPool;
use tenmin_core::status::{PcState, TimerState};
use tenmin_db::repositories::{RemotePcRepo, TimerRecordRepo, WorkerPcRepo};

const SERVER: i64 = 4242;

async fn claim_row(pool: &PgPool, worker_id: &str, state: PcState) {
    let row = RemotePcRepo::insert_server(pool, SERVER, "10min").await.unwrap();
    sqlx::query("UPDATE remote_pcs SET worker_id = $2, state = $3 WHERE id = $1")
        .bind(row.id)
        .bind(worker_id)
        .bind(state.as_str())
        .execute(pool)
        .await
        .unwrap();
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore]
async fn test_working_count_tracks_state(pool: PgPool) {
    claim_row(&pool, "w1", PcState::Idle).await;
    claim_row(&pool, "w2", PcState::Idle).await;
    assert_eq!(RemotePcRepo::working_count(&pool, SERVER).await.unwrap(), 0);

    assert!(RemotePcRepo::set_state(&pool, SERVER, "w1", PcState::Working).await.unwrap());
    assert_eq!(RemotePcRepo::working_count(&pool, SERVER).await.unwrap(), 1);

    assert!(!RemotePcRepo::set_state(&pool, SERVER, "ghost", PcState::Working).await.unwrap());
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore]
async fn test_pc_number_lookup(pool: PgPool) {
    assert_eq!(WorkerPcRepo::pc_number(&pool, "w1").await.unwrap(), None);
    WorkerPcRepo::upsert(&pool, "w1", 3).await.unwrap();
    WorkerPcRepo::upsert(&pool, "w1", 4).await.unwrap();
    assert_eq!(WorkerPcRepo::pc_number(&pool, "w1").await.unwrap(), Some(4));
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore]
async fn test_timer_listing_is_fifo(pool: PgPool) {
    let now = Utc::now();
    TimerRecordRepo::insert_waiting(&pool, 2, SERVER, 1, now).await.unwrap();
    TimerRecordRepo::insert_waiting(&pool, 1, SERVER, 2, now - Duration::seconds(10))
        .await
        .unwrap();

    let listed = TimerRecordRepo::list_in_states(&pool, Some(SERVER), &TimerState::PENDING_TEARDOWN)
        .await
        .unwrap();
    let ids: Vec<i64> = listed.iter().map(|t| t.job_id).collect();
    assert_eq!(ids, vec![1, 2]);
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore]
async fn test_claim_teardown_requires_timeout_and_free_server(pool: PgPool) {
    claim_row(&pool, "w1", PcState::Waiting).await;
    claim_row(&pool, "w2", PcState::Working).await;
    TimerRecordRepo::insert_waiting(&pool, 1, SERVER, 1, Utc::now()).await.unwrap();

    // Still WAITING.
    assert!(!TimerRecordRepo::claim_teardown(&pool, 1, SERVER, "w1").await.unwrap());

    TimerRecordRepo::set_state(&pool, 1, SERVER, TimerState::Timeout, None)
        .await
        .unwrap();
    // Sibling working.
    assert!(!TimerRecordRepo::claim_teardown(&pool, 1, SERVER, "w1").await.unwrap());

    RemotePcRepo::set_state(&pool, SERVER, "w2", PcState::Idle).await.unwrap();
    assert!(TimerRecordRepo::claim_teardown(&pool, 1, SERVER, "w1").await.unwrap());

    TimerRecordRepo::finish_teardown(&pool, 1, SERVER, "w1", Utc::now())
        .await
        .unwrap();
    let record = TimerRecordRepo::find(&pool, 1, SERVER).await.unwrap().unwrap();
    assert_eq!(record.timer_state().unwrap(), TimerState::Terminated);
    assert!(record.end_time.is_some());
    let pc = RemotePcRepo::find(&pool, SERVER, "w1").await.unwrap().unwrap();
    assert_eq!(pc.pc_state().unwrap(), PcState::Idle);
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore]
async fn test_trigger_publishes_named_columns(pool: PgPool) {
    let mut listener = PgListener::connect_with(&pool).await.unwrap();
    listener.listen("row_changes").await.unwrap();

    claim_row(&pool, "w1", PcState::Idle).await;
    let notification = listener.recv().await.unwrap();
    let payload: serde_json::Value = serde_json::from_str(notification.payload()).unwrap();

    assert_eq!(payload["table"], "remote_pcs");
    assert_eq!(payload["op"], "UPDATE");
    assert_eq!(payload["columns"][3], "worker_id");
    assert_eq!(payload["after"][3], "w1");
}
