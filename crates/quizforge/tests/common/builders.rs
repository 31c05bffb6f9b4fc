//! Builders for test configurations.
//!
//! Extractors are `/bin/sh -c <script> <stage>`, so inside a script `$1` is
//! the stage input path and `$2` the path it must write.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::Path;

use quizforge::config::{ChunkingConfig, Config, ExecutorConfig, UploadConfig};

/// A text extractor that writes `text` verbatim.
pub fn write_text(text: &str) -> String {
    format!("printf '%s' '{}' > \"$2\"", text)
}

/// A question extractor that turns each chunk into one question whose text
/// is the chunk itself.
pub const ECHO_CHUNK_AS_QUESTION: &str = r#"q=$(cat "$1"); printf '[{"question":"%s","options":["a","b"],"answer":"a"}]' "$q" > "$2""#;

/// Builder for `Config` instances rooted in a test directory.
pub struct ConfigBuilder {
    text_script: String,
    question_script: String,
    text_env: BTreeMap<String, String>,
    timeout_secs: u64,
    chunking: ChunkingConfig,
    chunk_concurrency: usize,
    max_concurrent_jobs: usize,
    max_file_size: u64,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            text_script: write_text("Q: 2+2? A)3 B)4"),
            question_script: r#"printf '%s' '[{"question":"2+2?","options":["3","4"],"answer":"4"}]' > "$2""#
                .to_string(),
            text_env: BTreeMap::new(),
            timeout_secs: 30,
            chunking: ChunkingConfig::default(),
            chunk_concurrency: 1,
            max_concurrent_jobs: 2,
            max_file_size: UploadConfig::default().max_file_size,
        }
    }

    pub fn text_script(mut self, script: impl Into<String>) -> Self {
        self.text_script = script.into();
        self
    }

    pub fn question_script(mut self, script: impl Into<String>) -> Self {
        self.question_script = script.into();
        self
    }

    /// Adds an environment variable visible to the text extractor.
    pub fn text_env(mut self, key: &str, value: impl Into<String>) -> Self {
        self.text_env.insert(key.to_string(), value.into());
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Sets the effective chunk size in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunking = ChunkingConfig {
            base_size: size,
            scale_ratio: 1.0,
        };
        self
    }

    pub fn chunk_concurrency(mut self, n: usize) -> Self {
        self.chunk_concurrency = n;
        self
    }

    pub fn max_concurrent_jobs(mut self, n: usize) -> Self {
        self.max_concurrent_jobs = n;
        self
    }

    pub fn max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    pub fn build(self, root: &Path) -> Config {
        let mut text_extractor = shell(&self.text_script, "extract_text", self.timeout_secs);
        text_extractor.env = self.text_env;

        Config {
            version: "1.0".to_string(),
            database_path: root.join("quizforge.db"),
            storage_directory: root.join("storage"),
            work_directory: root.join("work"),
            text_extractor,
            question_extractor: shell(&self.question_script, "extract_questions", self.timeout_secs),
            chunking: self.chunking,
            chunk_concurrency: self.chunk_concurrency,
            max_concurrent_jobs: self.max_concurrent_jobs,
            upload: UploadConfig {
                max_file_size: self.max_file_size,
            },
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn shell(script: &str, stage: &str, timeout_secs: u64) -> ExecutorConfig {
    let mut executor = ExecutorConfig::new("/bin/sh");
    executor.args = vec!["-c".to_string(), script.to_string(), stage.to_string()];
    executor.timeout_secs = timeout_secs;
    executor
}
