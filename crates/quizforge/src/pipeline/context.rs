use std::path::PathBuf;

use crate::db::question_repo::QuestionSet;
use crate::worker::job::Job;

use super::artifacts::ArtifactScope;
use super::questions::ExtractedQuestion;

/// Input and output paths of one question-extraction call.
#[derive(Debug, Clone)]
pub struct ChunkArtifacts {
    pub index: usize,
    pub input: PathBuf,
    pub output: PathBuf,
}

pub struct PipelineContext {
    // Input
    pub job: Job,
    pub artifacts: ArtifactScope,

    // Fetch result
    pub input_pdf: Option<PathBuf>,

    // Text extraction result
    pub text: Option<String>,

    // Chunk step result, in chunk order
    pub chunks: Vec<ChunkArtifacts>,

    // Merged and validated questions
    pub questions: Vec<ExtractedQuestion>,

    // Persist result
    pub question_set: Option<QuestionSet>,
}

impl PipelineContext {
    pub fn new(job: Job, artifacts: ArtifactScope) -> Self {
        Self {
            job,
            artifacts,
            input_pdf: None,
            text: None,
            chunks: Vec::new(),
            questions: Vec::new(),
            question_set: None,
        }
    }
}
