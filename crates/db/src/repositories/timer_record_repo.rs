//! Repository for the `timer_records` table.
//!
//! Records are keyed by `(job_id, server_id)`. Listing queries always order
//! by `start_time` (then `job_id`) so callers get FIFO order for free.

use sqlx::{PgConnection, PgPool};
use tenmin_core::status::{PcState, TimerState};
use tenmin_core::types::{JobId, PcNumber, ServerId, Timestamp};

use crate::models::timer_record::TimerRecord;

/// Column list for `timer_records` queries.
const COLUMNS: &str = "job_id, server_id, pc_number, state, start_time, end_time";

pub struct TimerRecordRepo;

impl TimerRecordRepo {
    // ── Mutations ────────────────────────────────────────────────────────

    /// Record a job reaching the hold point (state `WAITING`).
    ///
    /// A re-run of the same job on the same server replaces the old record.
    pub async fn insert_waiting(
        pool: &PgPool,
        job_id: JobId,
        server_id: ServerId,
        pc_number: PcNumber,
        start_time: Timestamp,
    ) -> Result<TimerRecord, sqlx::Error> {
        let query = format!(
            "INSERT INTO timer_records (job_id, server_id, pc_number, state, start_time) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (job_id, server_id) DO UPDATE SET \
                pc_number = EXCLUDED.pc_number, \
                state = EXCLUDED.state, \
                start_time = EXCLUDED.start_time, \
                end_time = NULL \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, TimerRecord>(&query)
            .bind(job_id)
            .bind(server_id)
            .bind(pc_number)
            .bind(TimerState::Waiting.as_str())
            .bind(start_time)
            .fetch_one(pool)
            .await
    }

    /// Set a record's state. `end_time` is stored only for `TERMINATED`.
    pub async fn set_state(
        pool: &PgPool,
        job_id: JobId,
        server_id: ServerId,
        state: TimerState,
        end_time: Option<Timestamp>,
    ) -> Result<bool, sqlx::Error> {
        let end_time = end_time.filter(|_| state == TimerState::Terminated);
        let result = sqlx::query(
            "UPDATE timer_records SET state = $3, end_time = $4 \
             WHERE job_id = $1 AND server_id = $2",
        )
        .bind(job_id)
        .bind(server_id)
        .bind(state.as_str())
        .bind(end_time)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    // ── Queries ──────────────────────────────────────────────────────────

    pub async fn find(
        pool: &PgPool,
        job_id: JobId,
        server_id: ServerId,
    ) -> Result<Option<TimerRecord>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM timer_records WHERE job_id = $1 AND server_id = $2"
        );
        sqlx::query_as::<_, TimerRecord>(&query)
            .bind(job_id)
            .bind(server_id)
            .fetch_optional(pool)
            .await
    }

    /// List records in any of `states`, oldest start first.
    ///
    /// `server_id = None` lists across all servers.
    pub async fn list_in_states(
        pool: &PgPool,
        server_id: Option<ServerId>,
        states: &[TimerState],
    ) -> Result<Vec<TimerRecord>, sqlx::Error> {
        let codes: Vec<&str> = states.iter().map(|s| s.as_str()).collect();
        let query = format!(
            "SELECT {COLUMNS} FROM timer_records \
             WHERE state = ANY($1) AND ($2::BIGINT IS NULL OR server_id = $2) \
             ORDER BY start_time ASC, job_id ASC"
        );
        sqlx::query_as::<_, TimerRecord>(&query)
            .bind(&codes)
            .bind(server_id)
            .fetch_all(pool)
            .await
    }

    // ── Teardown transactions ────────────────────────────────────────────

    /// Atomically claim the session for a teardown.
    ///
    /// Locks the server's PC rows, then moves the record `TIMEOUT` to
    /// `WORKING` and the worker's PC to `working`, but only if the record
    /// is still `TIMEOUT` and no PC on the server is working. Returns
    /// `false` without changes otherwise.
    pub async fn claim_teardown(
        pool: &PgPool,
        job_id: JobId,
        server_id: ServerId,
        worker_id: &str,
    ) -> Result<bool, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let states: Vec<String> =
            sqlx::query_scalar("SELECT state FROM remote_pcs WHERE server_id = $1 FOR UPDATE")
                .bind(server_id)
                .fetch_all(&mut *tx)
                .await?;
        if states.iter().any(|s| s == PcState::Working.as_str()) {
            tx.rollback().await?;
            return Ok(false);
        }

        let moved = Self::transition(
            &mut tx,
            job_id,
            server_id,
            TimerState::Timeout,
            TimerState::Working,
        )
        .await?;
        if !moved {
            tx.rollback().await?;
            return Ok(false);
        }

        set_pc_state(&mut tx, server_id, worker_id, PcState::Working).await?;
        tx.commit().await?;
        Ok(true)
    }

    /// Atomically close a teardown: PC back to `idle`, record `TERMINATED`
    /// with its end time.
    pub async fn finish_teardown(
        pool: &PgPool,
        job_id: JobId,
        server_id: ServerId,
        worker_id: &str,
        end_time: Timestamp,
    ) -> Result<(), sqlx::Error> {
        let mut tx = pool.begin().await?;
        set_pc_state(&mut tx, server_id, worker_id, PcState::Idle).await?;
        sqlx::query(
            "UPDATE timer_records SET state = $3, end_time = $4 \
             WHERE job_id = $1 AND server_id = $2",
        )
        .bind(job_id)
        .bind(server_id)
        .bind(TimerState::Terminated.as_str())
        .bind(end_time)
        .execute(&mut *tx)
        .await?;
        tx.commit().await
    }

    async fn transition(
        conn: &mut PgConnection,
        job_id: JobId,
        server_id: ServerId,
        from: TimerState,
        to: TimerState,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE timer_records SET state = $4 \
             WHERE job_id = $1 AND server_id = $2 AND state = $3",
        )
        .bind(job_id)
        .bind(server_id)
        .bind(from.as_str())
        .bind(to.as_str())
        .execute(conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

async fn set_pc_state(
    conn: &mut PgConnection,
    server_id: ServerId,
    worker_id: &str,
    state: PcState,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE remote_pcs SET state = $3 WHERE server_id = $1 AND worker_id = $2")
        .bind(server_id)
        .bind(worker_id)
        .bind(state.as_str())
        .execute(conn)
        .await?;
    Ok(())
}
