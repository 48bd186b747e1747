//! Repository for the `job_requests` table.
//!
//! Job rows belong to the upstream ordering system; the only write this
//! worker performs is the `otp_pass` toggle.

use sqlx::PgPool;
use tenmin_core::types::JobId;

use crate::models::job_request::JobRequest;

/// Column list for `job_requests` queries.
const COLUMNS: &str = "id, service, secret, worker_id, coupon_count, otp, state, otp_pass";

pub struct JobRequestRepo;

impl JobRequestRepo {
    pub async fn find_by_id(pool: &PgPool, id: JobId) -> Result<Option<JobRequest>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM job_requests WHERE id = $1");
        sqlx::query_as::<_, JobRequest>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Read only the `otp_pass` flag. `None` when the job row is gone.
    pub async fn otp_pass(pool: &PgPool, id: JobId) -> Result<Option<bool>, sqlx::Error> {
        let flag = sqlx::query_scalar::<_, i32>("SELECT otp_pass FROM job_requests WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(flag.map(|v| v != 0))
    }

    pub async fn set_otp_pass(pool: &PgPool, id: JobId, passed: bool) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE job_requests SET otp_pass = $2 WHERE id = $1")
            .bind(id)
            .bind(i32::from(passed))
            .execute(pool)
            .await?;
        Ok(())
    }
}
