//! Repository for the `remote_pcs` table.

use sqlx::PgPool;
use tenmin_core::status::PcState;
use tenmin_core::types::ServerId;

use crate::models::remote_pc::RemotePc;

/// Column list for `remote_pcs` queries.
const COLUMNS: &str = "id, server_id, service, worker_id, state, server_online_time";

pub struct RemotePcRepo;

impl RemotePcRepo {
    // ── Server lifecycle ─────────────────────────────────────────────────

    /// Insert the unclaimed row a server advertises at startup.
    pub async fn insert_server(
        pool: &PgPool,
        server_id: ServerId,
        service: &str,
    ) -> Result<RemotePc, sqlx::Error> {
        let query = format!(
            "INSERT INTO remote_pcs (server_id, service, state) \
             VALUES ($1, $2, $3) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, RemotePc>(&query)
            .bind(server_id)
            .bind(service)
            .bind(PcState::None.as_str())
            .fetch_one(pool)
            .await
    }

    /// Delete every row owned by a server. Returns the number removed.
    pub async fn delete_by_server(pool: &PgPool, server_id: ServerId) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM remote_pcs WHERE server_id = $1")
            .bind(server_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    // ── Queries ──────────────────────────────────────────────────────────

    pub async fn find(
        pool: &PgPool,
        server_id: ServerId,
        worker_id: &str,
    ) -> Result<Option<RemotePc>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM remote_pcs WHERE server_id = $1 AND worker_id = $2 \
             ORDER BY id ASC LIMIT 1"
        );
        sqlx::query_as::<_, RemotePc>(&query)
            .bind(server_id)
            .bind(worker_id)
            .fetch_optional(pool)
            .await
    }

    /// Count rows of a server currently in `working`.
    pub async fn working_count(pool: &PgPool, server_id: ServerId) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM remote_pcs WHERE server_id = $1 AND state = $2",
        )
        .bind(server_id)
        .bind(PcState::Working.as_str())
        .fetch_one(pool)
        .await
    }

    // ── Mutations ────────────────────────────────────────────────────────

    /// Set the task state of a worker's row. Returns `false` if no row matched.
    pub async fn set_state(
        pool: &PgPool,
        server_id: ServerId,
        worker_id: &str,
        state: PcState,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE remote_pcs SET state = $3 WHERE server_id = $1 AND worker_id = $2",
        )
        .bind(server_id)
        .bind(worker_id)
        .bind(state.as_str())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
