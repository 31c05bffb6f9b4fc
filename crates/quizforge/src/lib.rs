pub mod config;
pub mod db;
pub mod error;
pub mod pipeline;
pub mod question_sets;
pub mod sanitize;
pub mod storage;
pub mod worker;

pub use config::{load_config, Config};
pub use db::Database;
pub use error::{ConfigError, QuizforgeError, Result, StorageError};
pub use pipeline::{
    ExtractedQuestion, JobProgressEvent, Pipeline, PipelineConfig, PipelineContext, PipelineError,
    ProgressReporter,
};
pub use question_sets::{QuestionSetError, QuestionSets};
pub use storage::{FsObjectStore, ObjectStore};
pub use worker::{Job, JobFailure, JobResult, JobStatus, JobTrigger, TriggerError};
