use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    pub storage_directory: PathBuf,
    #[serde(default = "default_work_directory")]
    pub work_directory: PathBuf,
    pub text_extractor: ExecutorConfig,
    pub question_extractor: ExecutorConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default = "default_chunk_concurrency")]
    pub chunk_concurrency: usize,
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
    #[serde(default)]
    pub upload: UploadConfig,
}

fn default_database_path() -> PathBuf {
    crate::db::default_database_path().unwrap_or_else(|| PathBuf::from("quizforge.db"))
}

fn default_work_directory() -> PathBuf {
    std::env::temp_dir().join("quizforge")
}

fn default_chunk_concurrency() -> usize {
    1
}

fn default_max_concurrent_jobs() -> usize {
    num_cpus::get()
}

/// How to launch one external extraction program.
///
/// The stage arguments (input path, output path) are appended after `args`,
/// so `{"program": "python", "args": ["scripts/main.py"]}` runs
/// `python scripts/main.py <input> <output>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment variables; the parent environment is inherited.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub working_directory: Option<PathBuf>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    300
}

impl ExecutorConfig {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            working_directory: None,
            timeout_secs: default_timeout_secs(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    #[serde(default = "default_base_size")]
    pub base_size: usize,
    #[serde(default = "default_scale_ratio")]
    pub scale_ratio: f64,
}

fn default_base_size() -> usize {
    8000
}

fn default_scale_ratio() -> f64 {
    0.67
}

impl ChunkingConfig {
    /// Effective chunk size in characters: the base size scaled down so a
    /// chunk plus the extractor's prompt stays under its input limit.
    pub fn chunk_size(&self) -> usize {
        ((self.base_size as f64 * self.scale_ratio).floor() as usize).max(1)
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            base_size: default_base_size(),
            scale_ratio: default_scale_ratio(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

fn default_max_file_size() -> u64 {
    // 50 MiB
    52_428_800
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
        }
    }
}
