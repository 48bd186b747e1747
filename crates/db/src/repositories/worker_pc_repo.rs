//! Repository for the `worker_pcs` table.

use sqlx::PgPool;
use tenmin_core::types::PcNumber;

pub struct WorkerPcRepo;

impl WorkerPcRepo {
    /// Resolve the remote-control PC slot assigned to a worker.
    pub async fn pc_number(pool: &PgPool, worker_id: &str) -> Result<Option<PcNumber>, sqlx::Error> {
        sqlx::query_scalar::<_, PcNumber>("SELECT pc_number FROM worker_pcs WHERE worker_id = $1")
            .bind(worker_id)
            .fetch_optional(pool)
            .await
    }

    /// Assign or reassign a worker's PC slot.
    pub async fn upsert(pool: &PgPool, worker_id: &str, pc_number: PcNumber) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO worker_pcs (worker_id, pc_number) VALUES ($1, $2) \
             ON CONFLICT (worker_id) DO UPDATE SET pc_number = EXCLUDED.pc_number",
        )
        .bind(worker_id)
        .bind(pc_number)
        .execute(pool)
        .await?;
        Ok(())
    }
}
