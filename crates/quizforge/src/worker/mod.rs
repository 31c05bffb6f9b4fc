pub mod job;
pub mod trigger;

pub use job::{Job, JobFailure, JobResult, JobStatus};
pub use trigger::{JobTrigger, TriggerError};
