pub mod job_request;
pub mod remote_pc;
pub mod timer_record;
