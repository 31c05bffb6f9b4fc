use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::stream::{self, StreamExt, TryStreamExt};
use futures_util::FutureExt;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::Config;
use crate::db::{job_repo, Database};
use crate::sanitize;
use crate::storage::ObjectStore;
use crate::worker::job::{Job, JobResult, JobStatus};
use crate::worker::TriggerError;

use super::artifacts::{ArtifactKind, ArtifactScope};
use super::chunker;
use super::classifier::{self, StageFailure};
use super::config::PipelineConfig;
use super::context::{ChunkArtifacts, PipelineContext};
use super::error::PipelineError;
use super::executor::{ProcessExecutor, Stage, StageExecutor, StageInvocation, StageOutcome};
use super::ingest;
use super::progress::{JobPhase, JobProgressEvent, ProgressReporter};
use super::questions::{self, ExtractedQuestion};

pub struct Pipeline {
    config: Arc<PipelineConfig>,
    db: Database,
    store: Arc<dyn ObjectStore>,
    executor: Arc<dyn StageExecutor>,
}

impl Pipeline {
    /// Production constructor: stages run as child processes.
    pub fn from_config(config: &Config, db: Database, store: Arc<dyn ObjectStore>) -> Self {
        Self::new(
            Arc::new(PipelineConfig::from_config(config)),
            db,
            store,
            Arc::new(ProcessExecutor),
        )
    }

    /// Constructor with an injected executor.
    pub fn new(
        config: Arc<PipelineConfig>,
        db: Database,
        store: Arc<dyn ObjectStore>,
        executor: Arc<dyn StageExecutor>,
    ) -> Self {
        Self {
            config,
            db,
            store,
            executor,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Runs one job end to end.
    ///
    /// The job must be `uploaded`; it is claimed with a compare-and-set into
    /// `processing`, so a concurrent second call gets `Conflict`. Every run
    /// that claims the job ends with exactly one terminal transition, after
    /// its artifacts are released. Stage failures are reported in the
    /// returned `JobResult`, not as `Err`.
    pub async fn run(
        &self,
        job_id: &str,
        progress: &dyn ProgressReporter,
    ) -> Result<JobResult, TriggerError> {
        let job = self.claim(job_id).await?;

        let span = info_span!("pipeline",
            job_id = %job.id,
            filename = %sanitize::redact_key(&job.file_name),
        );
        self.run_claimed(job, progress).instrument(span).await
    }

    async fn claim(&self, job_id: &str) -> Result<Job, TriggerError> {
        let id = job_id.to_string();
        let claimed = self
            .db
            .blocking(move |db| {
                let job = match job_repo::find_by_id(db, &id)? {
                    Some(job) => job,
                    None => return Ok(None),
                };
                if job_repo::transition(
                    db,
                    &job.id,
                    JobStatus::Uploaded,
                    JobStatus::Processing,
                    None,
                )? {
                    return Ok(Some(Ok(Job {
                        status: JobStatus::Processing,
                        ..job
                    })));
                }
                let status = job_repo::find_by_id(db, &id)?
                    .map(|j| j.status)
                    .unwrap_or(job.status);
                Ok(Some(Err(status)))
            })
            .await?;

        match claimed {
            Some(Ok(job)) => Ok(job),
            Some(Err(status)) => Err(TriggerError::Conflict {
                job_id: job_id.to_string(),
                status,
            }),
            None => Err(TriggerError::NotFound(job_id.to_string())),
        }
    }

    async fn run_claimed(
        &self,
        job: Job,
        progress: &dyn ProgressReporter,
    ) -> Result<JobResult, TriggerError> {
        info!("Pipeline started");

        let scope =
            ArtifactScope::create_async(self.config.work_directory.clone(), job.id.clone()).await;
        let outcome = match scope {
            Ok(scope) => {
                let mut ctx = PipelineContext::new(job.clone(), scope);
                let stages = AssertUnwindSafe(self.run_stages(&mut ctx, progress))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| {
                        Err(PipelineError::Internal(format!(
                            "pipeline panicked: {}",
                            panic_message(panic.as_ref())
                        )))
                    });

                let PipelineContext {
                    artifacts,
                    question_set,
                    ..
                } = ctx;
                async {
                    progress.report(JobProgressEvent::new(
                        &job.id,
                        JobPhase::CleaningUp,
                        "Removing temporary files...",
                    ));
                    let removed = artifacts.release_async().await;
                    debug!(removed, "Artifacts released");
                }
                .instrument(info_span!("cleanup"))
                .await;

                stages.and_then(|()| {
                    question_set
                        .ok_or_else(|| PipelineError::Internal("no question set persisted".into()))
                })
            }
            Err(e) => Err(PipelineError::artifact(&self.config.work_directory, e)),
        };

        let (next, failure) = match &outcome {
            Ok(_) => (JobStatus::Processed, None),
            Err(e) => (JobStatus::Failed, Some(e.to_failure())),
        };

        // The run's outcome stands even when it cannot be recorded.
        let id = job.id.clone();
        let recorded = failure.clone();
        let terminal = self
            .db
            .blocking(move |db| {
                if job_repo::transition(
                    db,
                    &id,
                    JobStatus::Processing,
                    next,
                    recorded.as_ref(),
                )? {
                    return Ok(None);
                }
                Ok(Some(job_repo::find_by_id(db, &id)?.map(|j| j.status)))
            })
            .await;
        match terminal {
            Ok(None) => {}
            Ok(Some(observed)) => error!(
                expected = %JobStatus::Processing,
                observed = ?observed,
                "Terminal transition did not apply"
            ),
            Err(e) => error!(error = %e, status = %next, "Failed to record terminal status"),
        }

        match (outcome, failure) {
            (Ok(set), _) => {
                info!(
                    question_set_id = %set.id,
                    questions = set.question_count,
                    "Pipeline completed"
                );
                progress.report(JobProgressEvent::new(
                    &job.id,
                    JobPhase::Completed,
                    format!("Extracted {} questions", set.question_count),
                ));
                Ok(JobResult::success(&job, set.id, set.question_count as usize))
            }
            (Err(e), failure) => {
                warn!(kind = e.kind(), error = %e, "Pipeline failed");
                let failure = failure.unwrap_or_else(|| e.to_failure());
                progress.report(JobProgressEvent::new(
                    &job.id,
                    JobPhase::Failed,
                    failure.message.clone(),
                ));
                Ok(JobResult::failure(&job, failure))
            }
        }
    }

    async fn run_stages(
        &self,
        ctx: &mut PipelineContext,
        progress: &dyn ProgressReporter,
    ) -> Result<(), PipelineError> {
        let job_id = ctx.job.id.clone();

        progress.report(JobProgressEvent::new(
            &job_id,
            JobPhase::Fetching,
            "Downloading PDF...",
        ));
        self.step_fetch(ctx).instrument(info_span!("fetch")).await?;

        progress.report(JobProgressEvent::new(
            &job_id,
            JobPhase::ExtractingText,
            "Extracting text from PDF...",
        ));
        self.step_extract_text(ctx)
            .instrument(info_span!("extract_text"))
            .await?;

        progress.report(JobProgressEvent::new(
            &job_id,
            JobPhase::Chunking,
            "Splitting text into chunks...",
        ));
        self.step_chunk(ctx).instrument(info_span!("chunk")).await?;

        progress.report(JobProgressEvent::new(
            &job_id,
            JobPhase::ExtractingQuestions,
            format!("Extracting questions from {} chunks...", ctx.chunks.len()),
        ));
        self.step_extract_questions(ctx)
            .instrument(info_span!("extract_questions"))
            .await?;

        progress.report(JobProgressEvent::new(
            &job_id,
            JobPhase::Persisting,
            format!("Saving {} questions...", ctx.questions.len()),
        ));
        self.step_persist(ctx).instrument(info_span!("persist")).await
    }

    async fn step_fetch(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let bytes = self
            .store
            .fetch(&ctx.job.storage_path)
            .await
            .map_err(PipelineError::Fetch)?;

        let path = ctx.artifacts.allocate(ArtifactKind::InputPdf);
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| PipelineError::artifact(&path, e))?;

        debug!(bytes = bytes.len(), "Source PDF fetched");
        ctx.input_pdf = Some(path);
        Ok(())
    }

    async fn step_extract_text(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let input = ctx
            .input_pdf
            .clone()
            .ok_or_else(|| PipelineError::Internal("input PDF missing after fetch".into()))?;
        let output = ctx.artifacts.allocate(ArtifactKind::ExtractedText);

        let invocation =
            StageInvocation::new(Stage::ExtractText, &self.config.text_extractor, &input, &output);
        let outcome = self
            .executor
            .execute(&invocation)
            .await
            .map_err(|e| PipelineError::Stage(e.to_failure()))?;

        if !outcome.succeeded() {
            let failure = match outcome.exit_code {
                Some(code) => {
                    classifier::classify(code).unwrap_or_else(|| StageFailure::unclassified(code))
                }
                None => StageFailure::terminated_by_signal(&invocation.program),
            };
            return Err(PipelineError::Stage(failure));
        }

        let bytes = match tokio::fs::read(&output).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PipelineError::EmptyExtraction);
            }
            Err(e) => return Err(PipelineError::artifact(&output, e)),
        };

        let text = String::from_utf8_lossy(&bytes).into_owned();
        if text.trim().is_empty() {
            return Err(PipelineError::EmptyExtraction);
        }

        debug!(chars = text.chars().count(), "Text extracted");
        ctx.text = Some(text);
        Ok(())
    }

    async fn step_chunk(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let text = ctx
            .text
            .take()
            .ok_or_else(|| PipelineError::Internal("text missing after extraction".into()))?;

        let pieces = chunker::chunk(&text, self.config.chunk_size);
        let mut chunks = Vec::with_capacity(pieces.len());
        for (index, piece) in pieces.into_iter().enumerate() {
            let input = ctx.artifacts.allocate_chunk(ArtifactKind::TextChunk, index);
            let output = ctx
                .artifacts
                .allocate_chunk(ArtifactKind::ExtractedQuestions, index);
            tokio::fs::write(&input, piece)
                .await
                .map_err(|e| PipelineError::artifact(&input, e))?;
            chunks.push(ChunkArtifacts {
                index,
                input,
                output,
            });
        }

        debug!(
            chunks = chunks.len(),
            chunk_size = self.config.chunk_size,
            "Text chunked"
        );
        ctx.chunks = chunks;
        ctx.text = Some(text);
        Ok(())
    }

    async fn step_extract_questions(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        // `buffered` keeps results in chunk order whatever the completion order.
        let per_chunk: Vec<Vec<ExtractedQuestion>> = stream::iter(ctx.chunks.clone())
            .map(|chunk| async move { self.extract_chunk(&chunk).await })
            .buffered(self.config.chunk_concurrency)
            .try_collect()
            .await?;

        let merged: Vec<ExtractedQuestion> = per_chunk.into_iter().flatten().collect();
        let valid = questions::validate(merged);
        if valid.is_empty() {
            return Err(PipelineError::NoQuestions);
        }

        debug!(questions = valid.len(), "Questions merged");
        ctx.questions = valid;
        Ok(())
    }

    async fn extract_chunk(
        &self,
        chunk: &ChunkArtifacts,
    ) -> Result<Vec<ExtractedQuestion>, PipelineError> {
        let invocation = StageInvocation::new(
            Stage::ExtractQuestions,
            &self.config.question_extractor,
            &chunk.input,
            &chunk.output,
        );
        let outcome: StageOutcome = self
            .executor
            .execute(&invocation)
            .await
            .map_err(|e| PipelineError::Stage(e.to_failure()))?;

        if !outcome.succeeded() {
            let failure = match outcome.exit_code {
                Some(code) => StageFailure::unclassified(code),
                None => StageFailure::terminated_by_signal(&invocation.program),
            };
            return Err(PipelineError::Stage(failure));
        }

        match tokio::fs::read(&chunk.output).await {
            Ok(bytes) => Ok(questions::parse_chunk_output_lenient(
                chunk.index,
                &String::from_utf8_lossy(&bytes),
            )),
            Err(e) => {
                warn!(chunk = chunk.index, error = %e, "Chunk produced no output file");
                Ok(Vec::new())
            }
        }
    }

    async fn step_persist(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let db = self.db.clone();
        let job = ctx.job.clone();
        let questions = std::mem::take(&mut ctx.questions);

        let set = tokio::task::spawn_blocking(move || ingest::persist(&db, &job, &questions))
            .await
            .map_err(|e| PipelineError::Internal(format!("persist task failed: {}", e)))?
            .map_err(PipelineError::Persist)?;

        ctx.question_set = Some(set);
        Ok(())
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExecutorConfig;
    use crate::db::question_repo;
    use crate::pipeline::classifier::StageFailureKind;
    use crate::pipeline::executor::ExecutorError;
    use crate::pipeline::progress::{BroadcastProgress, NoopProgress};
    use crate::storage::FsObjectStore;
    use async_trait::async_trait;
    use std::path::Path;
    use tempfile::TempDir;

    type Behaviour = Box<dyn Fn(&StageInvocation) -> Result<StageOutcome, ExecutorError> + Send + Sync>;

    /// In-process executor: each stage is a closure that writes the output file.
    struct FakeExecutor {
        text: Behaviour,
        questions: Behaviour,
    }

    #[async_trait]
    impl StageExecutor for FakeExecutor {
        async fn execute(&self, invocation: &StageInvocation) -> Result<StageOutcome, ExecutorError> {
            match invocation.stage {
                Stage::ExtractText => (self.text)(invocation),
                Stage::ExtractQuestions => (self.questions)(invocation),
            }
        }
    }

    fn exit(code: i32) -> StageOutcome {
        StageOutcome {
            exit_code: Some(code),
            ..Default::default()
        }
    }

    fn behaviour<F>(f: F) -> Behaviour
    where
        F: Fn(&StageInvocation) -> Result<StageOutcome, ExecutorError> + Send + Sync + 'static,
    {
        Box::new(f)
    }

    fn writes(content: &'static str) -> Behaviour {
        behaviour(move |inv| {
            std::fs::write(&inv.output, content).unwrap();
            Ok(StageOutcome {
                exit_code: Some(0),
                artifact: Some(inv.output.clone()),
                ..Default::default()
            })
        })
    }

    fn exits(code: i32) -> Behaviour {
        behaviour(move |_| Ok(exit(code)))
    }

    struct Harness {
        _tmp: TempDir,
        work: std::path::PathBuf,
        pipeline: Pipeline,
    }

    async fn harness(executor: FakeExecutor, chunk_size: usize) -> (Harness, Job) {
        let tmp = TempDir::new().unwrap();
        let work = tmp.path().join("work");
        let store = FsObjectStore::new(tmp.path().join("objects"));
        store.store("alice/1_exam.pdf", b"%PDF-1.4 fake").await.unwrap();

        let config = PipelineConfig {
            work_directory: work.clone(),
            text_extractor: ExecutorConfig::new("text"),
            question_extractor: ExecutorConfig::new("questions"),
            chunk_size,
            chunk_concurrency: 2,
        };
        let db = Database::open_in_memory().unwrap();
        let job = Job::new("alice", "exam.pdf", "alice/1_exam.pdf");
        job_repo::insert(&db, &job).unwrap();

        let pipeline = Pipeline::new(Arc::new(config), db, Arc::new(store), Arc::new(executor));
        (
            Harness {
                _tmp: tmp,
                work,
                pipeline,
            },
            job,
        )
    }

    fn work_is_empty(work: &Path) -> bool {
        !work.exists() || std::fs::read_dir(work).unwrap().next().is_none()
    }

    #[tokio::test]
    async fn test_happy_path() {
        let executor = FakeExecutor {
            text: writes("Q: 2+2? A)3 B)4"),
            questions: writes(r#"[{"question":"2+2?","options":["3","4"],"answer":"4"}]"#),
        };
        let (h, job) = harness(executor, 5360).await;

        let result = h.pipeline.run(&job.id, &NoopProgress).await.unwrap();
        assert!(result.is_success());
        assert_eq!(result.question_count, 1);

        let stored = job_repo::find_by_id(h.pipeline.database(), &job.id)
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, JobStatus::Processed);
        assert!(stored.completed_at.is_some());

        let set_id = result.question_set_id.unwrap();
        let questions = question_repo::questions_for_set(h.pipeline.database(), &set_id).unwrap();
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].options, vec!["3", "4"]);
        assert_eq!(questions[0].answer, "4");
        assert!(work_is_empty(&h.work));
    }

    #[tokio::test]
    async fn test_chunk_order_is_preserved() {
        // Each chunk's extractor echoes the chunk text back as a question.
        let questions = behaviour(|inv| {
            let text = std::fs::read_to_string(&inv.input).unwrap();
            let json = serde_json::json!([{ "question": text, "options": ["x"] }]);
            std::fs::write(&inv.output, json.to_string()).unwrap();
            Ok(exit(0))
        });
        let executor = FakeExecutor {
            text: writes("aaabbbcccd"),
            questions,
        };
        let (h, job) = harness(executor, 3).await;

        let result = h.pipeline.run(&job.id, &NoopProgress).await.unwrap();
        let set_id = result.question_set_id.unwrap();
        let texts: Vec<_> = question_repo::questions_for_set(h.pipeline.database(), &set_id)
            .unwrap()
            .into_iter()
            .map(|q| q.question_text)
            .collect();
        assert_eq!(texts, vec!["aaa", "bbb", "ccc", "d"]);
    }

    #[tokio::test]
    async fn test_classified_text_failure() {
        let executor = FakeExecutor {
            text: exits(5),
            questions: writes("[]"),
        };
        let (h, job) = harness(executor, 5360).await;

        let result = h.pipeline.run(&job.id, &NoopProgress).await.unwrap();
        let failure = result.failure.unwrap();
        assert_eq!(failure.kind, "OcrEngineMissing");
        assert_eq!(failure.message, "OCR engine not installed");

        let stored = job_repo::find_by_id(h.pipeline.database(), &job.id)
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(stored.failure.unwrap().kind, "OcrEngineMissing");
        assert!(question_repo::list_sets_for_user(h.pipeline.database(), "alice")
            .unwrap()
            .is_empty());
        assert!(work_is_empty(&h.work));
    }

    #[tokio::test]
    async fn test_whitespace_text_is_empty_extraction() {
        let executor = FakeExecutor {
            text: writes("  \n\t "),
            questions: writes("[]"),
        };
        let (h, job) = harness(executor, 5360).await;

        let result = h.pipeline.run(&job.id, &NoopProgress).await.unwrap();
        assert_eq!(result.failure.unwrap().kind, "EmptyExtractionError");
    }

    #[tokio::test]
    async fn test_missing_text_file_is_empty_extraction() {
        let executor = FakeExecutor {
            text: exits(0),
            questions: writes("[]"),
        };
        let (h, job) = harness(executor, 5360).await;

        let result = h.pipeline.run(&job.id, &NoopProgress).await.unwrap();
        assert_eq!(result.failure.unwrap().kind, "EmptyExtractionError");
    }

    #[tokio::test]
    async fn test_question_stage_nonzero_is_unclassified() {
        let executor = FakeExecutor {
            text: writes("some text"),
            questions: exits(9),
        };
        let (h, job) = harness(executor, 5360).await;

        let result = h.pipeline.run(&job.id, &NoopProgress).await.unwrap();
        let failure = result.failure.unwrap();
        assert_eq!(failure.kind, "UnclassifiedExecutorFailure");
        assert_eq!(failure.message, "Executor exited with code 9");
    }

    #[tokio::test]
    async fn test_all_chunks_malformed_is_no_questions() {
        let executor = FakeExecutor {
            text: writes("some text"),
            questions: writes("I could not find any questions, sorry."),
        };
        let (h, job) = harness(executor, 5360).await;

        let result = h.pipeline.run(&job.id, &NoopProgress).await.unwrap();
        assert_eq!(result.failure.unwrap().kind, "NoQuestionsError");
    }

    #[tokio::test]
    async fn test_timeout_failure_kind() {
        let executor = FakeExecutor {
            text: behaviour(|inv| {
                Err(ExecutorError::TimedOut {
                    program: inv.program.clone(),
                    timeout: inv.timeout,
                })
            }),
            questions: writes("[]"),
        };
        let (h, job) = harness(executor, 5360).await;

        let result = h.pipeline.run(&job.id, &NoopProgress).await.unwrap();
        assert_eq!(
            result.failure.unwrap().kind,
            StageFailureKind::TimedOut.as_str()
        );
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let executor = FakeExecutor {
            text: writes("some text"),
            questions: behaviour(|_| panic!("extractor exploded")),
        };
        let (h, job) = harness(executor, 5360).await;

        let result = h.pipeline.run(&job.id, &NoopProgress).await.unwrap();
        let failure = result.failure.unwrap();
        assert_eq!(failure.kind, "Internal");
        assert!(failure.details.contains("extractor exploded"));

        let stored = job_repo::find_by_id(h.pipeline.database(), &job.id)
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert!(work_is_empty(&h.work));
    }

    #[tokio::test]
    async fn test_missing_source_is_fetch_error() {
        let executor = FakeExecutor {
            text: writes("x"),
            questions: writes("[]"),
        };
        let (h, _) = harness(executor, 5360).await;
        let orphan = Job::new("alice", "gone.pdf", "alice/gone.pdf");
        job_repo::insert(h.pipeline.database(), &orphan).unwrap();

        let result = h.pipeline.run(&orphan.id, &NoopProgress).await.unwrap();
        assert_eq!(result.failure.unwrap().kind, "FetchError");
    }

    #[tokio::test]
    async fn test_second_run_conflicts() {
        let executor = FakeExecutor {
            text: writes("Q"),
            questions: writes(r#"[{"question":"Q","options":["a"]}]"#),
        };
        let (h, job) = harness(executor, 5360).await;

        h.pipeline.run(&job.id, &NoopProgress).await.unwrap();
        let second = h.pipeline.run(&job.id, &NoopProgress).await;
        assert!(matches!(
            second,
            Err(TriggerError::Conflict {
                status: JobStatus::Processed,
                ..
            })
        ));
        assert_eq!(
            question_repo::list_sets_for_user(h.pipeline.database(), "alice")
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let executor = FakeExecutor {
            text: writes("x"),
            questions: writes("[]"),
        };
        let (h, _) = harness(executor, 5360).await;
        let result = h.pipeline.run("missing", &NoopProgress).await;
        assert!(matches!(result, Err(TriggerError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_progress_phases() {
        let executor = FakeExecutor {
            text: writes("Q"),
            questions: writes(r#"[{"question":"Q","options":["a"]}]"#),
        };
        let (h, job) = harness(executor, 5360).await;
        let progress = BroadcastProgress::new(64);
        let mut rx = progress.subscribe();

        h.pipeline.run(&job.id, &progress).await.unwrap();

        let mut phases = Vec::new();
        while let Ok(event) = rx.try_recv() {
            phases.push(event.phase);
        }
        assert_eq!(
            phases,
            vec![
                JobPhase::Fetching,
                JobPhase::ExtractingText,
                JobPhase::Chunking,
                JobPhase::ExtractingQuestions,
                JobPhase::Persisting,
                JobPhase::CleaningUp,
                JobPhase::Completed,
            ]
        );
    }

    fn assert_send<T: Send>(_: &T) {}

    #[tokio::test]
    async fn test_run_future_is_send() {
        let executor = FakeExecutor {
            text: writes("aaabbb"),
            questions: writes(r#"[{"question":"Q","options":["a"]}]"#),
        };
        let (h, job) = harness(executor, 3).await;

        let Harness {
            _tmp: tmp,
            pipeline,
            ..
        } = h;
        let pipeline = Arc::new(pipeline);

        let run = {
            let pipeline = Arc::clone(&pipeline);
            async move { pipeline.run(&job.id, &NoopProgress).await }
        };
        assert_send(&run);
        let result = tokio::spawn(run).await.unwrap().unwrap();
        assert!(result.is_success(), "{:?}", result.failure);
        assert_eq!(result.question_count, 2);
        drop(tmp);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_waiting_for_database_does_not_stall_runtime() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::time::Duration;

        let executor = FakeExecutor {
            text: writes("Q"),
            questions: writes(r#"[{"question":"Q","options":["a"]}]"#),
        };
        let (h, job) = harness(executor, 5360).await;

        let (locked_tx, locked_rx) = std::sync::mpsc::channel();
        let db = h.pipeline.database().clone();
        let holder = std::thread::spawn(move || {
            db.with_conn(|_| {
                locked_tx.send(()).unwrap();
                std::thread::sleep(Duration::from_millis(300));
                Ok(())
            })
            .unwrap();
        });
        locked_rx.recv().unwrap();

        let ticks = Arc::new(AtomicUsize::new(0));
        let ticker = tokio::spawn({
            let ticks = Arc::clone(&ticks);
            async move {
                loop {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    ticks.fetch_add(1, Ordering::SeqCst);
                }
            }
        });

        let result = h.pipeline.run(&job.id, &NoopProgress).await.unwrap();
        ticker.abort();
        holder.join().unwrap();

        assert!(result.is_success(), "{:?}", result.failure);
        assert!(ticks.load(Ordering::SeqCst) >= 5);
    }

    #[tokio::test]
    async fn test_unrecorded_terminal_status_keeps_result() {
        let executor = FakeExecutor {
            text: writes("Q"),
            questions: writes(r#"[{"question":"Q","options":["a"]}]"#),
        };
        let (h, job) = harness(executor, 5360).await;
        h.pipeline
            .database()
            .with_conn(|conn| {
                Ok(conn.execute_batch(
                    "CREATE TRIGGER hold_status BEFORE UPDATE OF status ON jobs
                     WHEN NEW.status IN ('processed', 'failed')
                     BEGIN SELECT RAISE(ABORT, 'held'); END;",
                )?)
            })
            .unwrap();

        let result = h.pipeline.run(&job.id, &NoopProgress).await.unwrap();
        assert!(result.is_success(), "{:?}", result.failure);
        assert_eq!(result.question_count, 1);

        let stored = job_repo::find_by_id(h.pipeline.database(), &job.id)
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, JobStatus::Processing);
        assert!(work_is_empty(&h.work));
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn Any + Send> = Box::new("static str");
        assert_eq!(panic_message(boxed.as_ref()), "static str");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");
        let boxed: Box<dyn Any + Send> = Box::new(42u32);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }
}
