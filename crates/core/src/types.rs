/// Job request primary keys (`job_requests.id`).
pub type JobId = i64;

/// Process-wide server identity, scoping every row this process owns.
pub type ServerId = i64;

/// Worker ids are free-form operator strings.
pub type WorkerId = String;

/// PC slot number inside the remote-control program (1-based).
pub type PcNumber = i32;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
