//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument.

pub mod job_request_repo;
pub mod remote_pc_repo;
pub mod timer_record_repo;
pub mod worker_pc_repo;

pub use job_request_repo::JobRequestRepo;
pub use remote_pc_repo::RemotePcRepo;
pub use timer_record_repo::TimerRecordRepo;
pub use worker_pc_repo::WorkerPcRepo;
