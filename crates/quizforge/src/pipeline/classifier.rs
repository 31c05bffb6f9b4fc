//! Exit code classification for the text-extraction executable.
//!
//! The code table is a compatibility contract with the external executor:
//! the codes, kinds and messages below must not change.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

/// Typed reason a stage invocation did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StageFailureKind {
    OcrFailed,
    OcrQualityInsufficient,
    OcrEngineMissing,
    TextExtractionFailed,
    SourceFileNotFound,
    OutputSaveFailed,
    ExternalApiError,
    NoTextExtracted,
    UnclassifiedExecutorFailure,
    TimedOut,
    LaunchFailed,
}

impl StageFailureKind {
    /// Stable label stored as the job's `error_kind`.
    pub fn as_str(&self) -> &'static str {
        match self {
            StageFailureKind::OcrFailed => "OcrFailed",
            StageFailureKind::OcrQualityInsufficient => "OcrQualityInsufficient",
            StageFailureKind::OcrEngineMissing => "OcrEngineMissing",
            StageFailureKind::TextExtractionFailed => "TextExtractionFailed",
            StageFailureKind::SourceFileNotFound => "SourceFileNotFound",
            StageFailureKind::OutputSaveFailed => "OutputSaveFailed",
            StageFailureKind::ExternalApiError => "ExternalApiError",
            StageFailureKind::NoTextExtracted => "NoTextExtracted",
            StageFailureKind::UnclassifiedExecutorFailure => "UnclassifiedExecutorFailure",
            StageFailureKind::TimedOut => "TimedOut",
            StageFailureKind::LaunchFailed => "LaunchFailed",
        }
    }
}

impl fmt::Display for StageFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified stage failure: kind plus the user-facing message and details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageFailure {
    pub kind: StageFailureKind,
    pub message: String,
    pub details: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

impl StageFailure {
    fn new(
        kind: StageFailureKind,
        message: impl Into<String>,
        details: impl Into<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            details: details.into(),
            exit_code,
        }
    }

    /// Non-zero exit that has no entry in the table.
    pub fn unclassified(code: i32) -> Self {
        Self::new(
            StageFailureKind::UnclassifiedExecutorFailure,
            format!("Executor exited with code {}", code),
            format!("The external executor exited with code {}.", code),
            Some(code),
        )
    }

    /// Process ended without an exit code (killed by a signal).
    pub fn terminated_by_signal(program: &str) -> Self {
        Self::new(
            StageFailureKind::UnclassifiedExecutorFailure,
            "Executor terminated by signal",
            format!("'{}' was terminated by a signal before exiting.", program),
            None,
        )
    }

    pub fn timed_out(program: &str, timeout: Duration) -> Self {
        Self::new(
            StageFailureKind::TimedOut,
            "Executor timed out",
            format!(
                "'{}' did not finish within {} seconds and was terminated.",
                program,
                timeout.as_secs()
            ),
            None,
        )
    }

    pub fn launch_failed(program: &str, reason: &str) -> Self {
        Self::new(
            StageFailureKind::LaunchFailed,
            "Executor could not be started",
            format!("Failed to start '{}': {}", program, reason),
            None,
        )
    }
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Maps a text-extraction exit code to its failure. `0` is success.
pub fn classify(code: i32) -> Option<StageFailure> {
    use StageFailureKind::*;

    let (kind, message, details) = match code {
        0 => return None,
        3 => (
            OcrFailed,
            "OCR processing failed",
            "The PDF requires OCR but the OCR process failed. Please try a higher quality scan.",
        ),
        4 => (
            OcrQualityInsufficient,
            "OCR output too short/unclear",
            "OCR extracted text is too short or unclear. Please try a higher quality scan.",
        ),
        5 => (
            OcrEngineMissing,
            "OCR engine not installed",
            "OCR is required but no OCR engine is installed. Please install Tesseract OCR.",
        ),
        6 => (
            TextExtractionFailed,
            "Could not extract meaningful text",
            "Could not extract meaningful text from the PDF. The PDF may be empty or scanned as images.",
        ),
        7 => (
            SourceFileNotFound,
            "PDF file could not be located",
            "The PDF file could not be located.",
        ),
        8 => (
            OutputSaveFailed,
            "Failed to save extracted text",
            "Failed to save extracted text to file.",
        ),
        9 => (
            ExternalApiError,
            "Question-extraction API call failed",
            "Failed to call the question-extraction API.",
        ),
        10 => (
            NoTextExtracted,
            "No text extracted from PDF",
            "No text was extracted from the PDF file.",
        ),
        other => return Some(StageFailure::unclassified(other)),
    };

    Some(StageFailure::new(kind, message, details, Some(code)))
}
