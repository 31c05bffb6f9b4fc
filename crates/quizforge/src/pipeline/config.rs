use std::path::PathBuf;

use crate::config::{Config, ExecutorConfig};

/// Runtime view of the configuration that a pipeline run needs.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub work_directory: PathBuf,
    pub text_extractor: ExecutorConfig,
    pub question_extractor: ExecutorConfig,
    /// Effective chunk size in characters.
    pub chunk_size: usize,
    pub chunk_concurrency: usize,
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            work_directory: config.work_directory.clone(),
            text_extractor: config.text_extractor.clone(),
            question_extractor: config.question_extractor.clone(),
            chunk_size: config.chunking.chunk_size(),
            chunk_concurrency: config.chunk_concurrency.max(1),
        }
    }
}
