use std::path::{Path, PathBuf};

use crate::sanitize;

/// Kinds of temporary files a pipeline run produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    InputPdf,
    ExtractedText,
    TextChunk,
    ExtractedQuestions,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::InputPdf => "input-pdf",
            ArtifactKind::ExtractedText => "extracted-text",
            ArtifactKind::TextChunk => "text-chunk",
            ArtifactKind::ExtractedQuestions => "extracted-questions",
        }
    }

    fn extension(&self) -> &'static str {
        match self {
            ArtifactKind::InputPdf => "pdf",
            ArtifactKind::ExtractedText | ArtifactKind::TextChunk => "txt",
            ArtifactKind::ExtractedQuestions => "json",
        }
    }
}

/// Owns every temporary file of one pipeline run.
///
/// All paths live in a run directory `<work_dir>/<job id>-<run id>/`, so two
/// runs never share a path. `release_all` removes the files and the
/// directory; dropping an unreleased scope does the same.
#[derive(Debug)]
pub struct ArtifactScope {
    dir: PathBuf,
    allocated: Vec<PathBuf>,
    released: bool,
}

impl ArtifactScope {
    /// Creates the run directory.
    pub fn create(work_directory: &Path, job_id: &str) -> std::io::Result<Self> {
        let run_id = uuid::Uuid::new_v4();
        let dir = work_directory.join(format!("{}-{}", job_id, run_id));
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            allocated: Vec::new(),
            released: false,
        })
    }

    /// `create` on the blocking pool.
    pub async fn create_async(work_directory: PathBuf, job_id: String) -> std::io::Result<Self> {
        tokio::task::spawn_blocking(move || Self::create(&work_directory, &job_id))
            .await
            .map_err(std::io::Error::other)?
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Paths handed out so far, in allocation order.
    pub fn allocated(&self) -> &[PathBuf] {
        &self.allocated
    }

    /// Path for the single artifact of `kind`. Repeated calls return the
    /// same path.
    pub fn allocate(&mut self, kind: ArtifactKind) -> PathBuf {
        let path = self.dir.join(format!("{}.{}", kind.as_str(), kind.extension()));
        self.track(path)
    }

    /// Path for the artifact of `kind` belonging to chunk `index`.
    pub fn allocate_chunk(&mut self, kind: ArtifactKind, index: usize) -> PathBuf {
        let path = self
            .dir
            .join(format!("{}-{:04}.{}", kind.as_str(), index, kind.extension()));
        self.track(path)
    }

    fn track(&mut self, path: PathBuf) -> PathBuf {
        if !self.allocated.contains(&path) {
            self.allocated.push(path.clone());
        }
        path
    }

    /// Deletes every allocated file and the run directory.
    ///
    /// Missing files are fine; other errors are logged and skipped. Returns
    /// the number of files actually removed.
    pub fn release_all(&mut self) -> usize {
        if self.released {
            return 0;
        }
        self.released = true;

        let mut removed = 0;
        for path in self.allocated.drain(..) {
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    log::warn!(
                        "Failed to remove artifact {}: {}",
                        sanitize::redact_path(&path),
                        e
                    );
                }
            }
        }

        // Executors may leave extra files next to their outputs.
        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                log::warn!(
                    "Failed to remove artifact directory {}: {}",
                    sanitize::redact_path(&self.dir),
                    e
                );
            }
        }

        removed
    }
}

impl ArtifactScope {
    /// `release_all` on the blocking pool.
    pub async fn release_async(mut self) -> usize {
        let dir = self.dir.clone();
        match tokio::task::spawn_blocking(move || self.release_all()).await {
            Ok(removed) => removed,
            Err(e) => {
                log::warn!(
                    "Artifact cleanup of {} did not finish: {}",
                    sanitize::redact_path(&dir),
                    e
                );
                0
            }
        }
    }
}

impl Drop for ArtifactScope {
    fn drop(&mut self) {
        if !self.released {
            log::debug!(
                "Releasing artifacts of {} on drop",
                sanitize::redact_path(&self.dir)
            );
            self.release_all();
        }
    }
}
