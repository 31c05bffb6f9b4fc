pub mod artifacts;
pub mod chunker;
pub mod classifier;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod ingest;
pub mod progress;
pub mod questions;
pub mod runner;

pub use artifacts::{ArtifactKind, ArtifactScope};
pub use classifier::{classify, StageFailure, StageFailureKind};
pub use config::PipelineConfig;
pub use context::PipelineContext;
pub use error::PipelineError;
pub use executor::{
    ExecutorError, ProcessExecutor, Stage, StageExecutor, StageInvocation, StageOutcome,
};
pub use ingest::IngestError;
pub use progress::{BroadcastProgress, JobPhase, JobProgressEvent, NoopProgress, ProgressReporter};
pub use questions::ExtractedQuestion;
pub use runner::Pipeline;
