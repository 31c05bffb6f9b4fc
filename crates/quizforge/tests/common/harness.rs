//! Isolated environment for driving the pipeline end to end.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;

use quizforge::config::Config;
use quizforge::db::{job_repo, Database};
use quizforge::{FsObjectStore, Job, JobTrigger, ObjectStore, QuestionSets};

use super::builders::ConfigBuilder;

/// Smallest byte string the upload check accepts as a PDF.
pub const PDF_BYTES: &[u8] = b"%PDF-1.4\n%fake\n";

pub struct TestHarness {
    temp_dir: TempDir,
    pub config: Config,
    pub db: Database,
    pub trigger: JobTrigger,
    pub sets: QuestionSets,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(ConfigBuilder::new())
    }

    pub fn with_config(builder: ConfigBuilder) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config = builder.build(temp_dir.path());
        std::fs::create_dir_all(&config.storage_directory).expect("Failed to create storage dir");

        let db = Database::open(&config.database_path).expect("Failed to open database");
        let store: Arc<dyn ObjectStore> = Arc::new(FsObjectStore::new(&config.storage_directory));
        let trigger = JobTrigger::from_config(&config, db.clone(), store);
        let sets = QuestionSets::new(db.clone());

        Self {
            temp_dir,
            config,
            db,
            trigger,
            sets,
        }
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    pub async fn upload(&self, user: &str, file_name: &str) -> Job {
        self.trigger
            .upload(user, file_name, PDF_BYTES)
            .await
            .expect("upload failed")
    }

    pub fn job(&self, id: &str) -> Job {
        job_repo::find_by_id(&self.db, id)
            .expect("query failed")
            .expect("job missing")
    }

    /// True when no per-run artifact directory is left behind.
    pub fn work_is_empty(&self) -> bool {
        match std::fs::read_dir(&self.config.work_directory) {
            Ok(mut entries) => entries.next().is_none(),
            Err(_) => true,
        }
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
