use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

use super::classifier::StageFailure;
use crate::config::ExecutorConfig;
use crate::sanitize;

/// The two externally delegated pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ExtractText,
    ExtractQuestions,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::ExtractText => "extract_text",
            Stage::ExtractQuestions => "extract_questions",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One call of an external program: `program args... input output`.
#[derive(Debug, Clone)]
pub struct StageInvocation {
    pub stage: Stage,
    pub program: String,
    /// Leading arguments from configuration, placed before the paths.
    pub args: Vec<String>,
    pub input: PathBuf,
    /// The artifact the program must produce.
    pub output: PathBuf,
    pub env: BTreeMap<String, String>,
    pub working_directory: Option<PathBuf>,
    pub timeout: Duration,
}

impl StageInvocation {
    pub fn new(stage: Stage, config: &ExecutorConfig, input: &Path, output: &Path) -> Self {
        Self {
            stage,
            program: config.program.clone(),
            args: config.args.clone(),
            input: input.to_path_buf(),
            output: output.to_path_buf(),
            env: config.env.clone(),
            working_directory: config.working_directory.clone(),
            timeout: config.timeout(),
        }
    }
}

/// Captured result of a finished invocation.
#[derive(Debug, Clone, Default)]
pub struct StageOutcome {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    /// Set when the program exited with 0 and the output file exists.
    pub artifact: Option<PathBuf>,
}

impl StageOutcome {
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed waiting for '{program}': {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' timed out after {timeout:?}")]
    TimedOut { program: String, timeout: Duration },
}

impl ExecutorError {
    pub fn to_failure(&self) -> StageFailure {
        match self {
            ExecutorError::Spawn { program, source } | ExecutorError::Wait { program, source } => {
                StageFailure::launch_failed(program, &source.to_string())
            }
            ExecutorError::TimedOut { program, timeout } => StageFailure::timed_out(program, *timeout),
        }
    }
}

/// Runs one stage invocation to completion.
#[async_trait]
pub trait StageExecutor: Send + Sync {
    async fn execute(&self, invocation: &StageInvocation) -> Result<StageOutcome, ExecutorError>;
}

/// Executes stages as child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessExecutor;

#[async_trait]
impl StageExecutor for ProcessExecutor {
    async fn execute(&self, invocation: &StageInvocation) -> Result<StageOutcome, ExecutorError> {
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .arg(&invocation.input)
            .arg(&invocation.output)
            .envs(&invocation.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &invocation.working_directory {
            cmd.current_dir(dir);
        }

        debug!(
            stage = %invocation.stage,
            program = %invocation.program,
            input = %sanitize::redact_path(&invocation.input),
            "Starting executor"
        );

        let child = cmd.spawn().map_err(|e| ExecutorError::Spawn {
            program: invocation.program.clone(),
            source: e,
        })?;

        // Dropping the wait future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(invocation.timeout, child.wait_with_output()).await
        {
            Ok(result) => result.map_err(|e| ExecutorError::Wait {
                program: invocation.program.clone(),
                source: e,
            })?,
            Err(_) => {
                return Err(ExecutorError::TimedOut {
                    program: invocation.program.clone(),
                    timeout: invocation.timeout,
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let exit_code = output.status.code();

        debug!(
            stage = %invocation.stage,
            exit_code = ?exit_code,
            stdout = %sanitize::truncate_output(&stdout),
            stderr = %sanitize::truncate_output(&stderr),
            "Executor finished"
        );

        let artifact = (exit_code == Some(0) && invocation.output.exists())
            .then(|| invocation.output.clone());

        Ok(StageOutcome {
            exit_code,
            stdout,
            stderr,
            artifact,
        })
    }
}
