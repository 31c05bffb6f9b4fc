//! `quizforge` command line: uploads PDFs, runs ingestion jobs and queries
//! the resulting question sets. Every command prints JSON on stdout; logs go
//! to stderr.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use quizforge::{
    load_config, Config, Database, ExtractedQuestion, FsObjectStore, JobResult, JobTrigger,
    ObjectStore, QuestionSets,
};
use serde::Serialize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(
    name = "quizforge",
    version,
    about = "Turn uploaded PDFs into stored quiz question sets"
)]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(long, env = "QUIZFORGE_CONFIG", default_value = "quizforge.json")]
    config: PathBuf,

    /// Log filter directive (e.g. `debug`, `quizforge=trace`). Overrides RUST_LOG.
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Store a PDF and record an upload job.
    Upload {
        #[arg(long)]
        user: String,
        #[arg(long)]
        file: PathBuf,
        /// Start processing right away and wait for the result.
        #[arg(long)]
        wait: bool,
    },
    /// Run the pipeline for an uploaded job.
    Process {
        #[arg(long)]
        user: String,
        #[arg(long)]
        job: String,
    },
    /// Start a new attempt for a failed job.
    Retry {
        #[arg(long)]
        user: String,
        #[arg(long)]
        job: String,
    },
    /// List a user's jobs, newest first.
    Jobs {
        #[arg(long)]
        user: String,
    },
    /// List a user's question sets.
    Sets {
        #[arg(long)]
        user: String,
    },
    /// Show the questions of a set, or of the set produced by a job.
    Questions {
        #[arg(long)]
        user: String,
        #[arg(long, conflicts_with = "job", required_unless_present = "job")]
        set: Option<String>,
        #[arg(long)]
        job: Option<String>,
    },
    /// Delete a question set and its questions.
    DeleteSet {
        #[arg(long)]
        user: String,
        #[arg(long)]
        set: String,
    },
    /// Create a question set from a JSON array of questions.
    Import {
        #[arg(long)]
        user: String,
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        name: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref(), cli.log_json)?;

    let config = load_config(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;
    let app = App::open(&config)?;

    match cli.command {
        Command::Upload { user, file, wait } => {
            let bytes = tokio::fs::read(&file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;
            let name = file_name(&file)?;
            if wait {
                let (job, handle) = app.trigger.upload_and_process(&user, name, &bytes).await?;
                tracing::info!(job_id = %job.id, "Waiting for background run");
                let result = handle.await.context("background run panicked")??;
                print_result(&result)?;
            } else {
                let job = app.trigger.upload(&user, name, &bytes).await?;
                print_json(&job)?;
            }
        }
        Command::Process { user, job } => {
            let result = app.trigger.process(&user, &job).await?;
            print_result(&result)?;
        }
        Command::Retry { user, job } => {
            let result = app.trigger.retry(&user, &job).await?;
            print_result(&result)?;
        }
        Command::Jobs { user } => print_json(&app.trigger.jobs(&user).await?)?,
        Command::Sets { user } => print_json(&app.sets.list(&user)?)?,
        Command::Questions { user, set, job } => match (set, job) {
            (Some(set), _) => print_json(&app.sets.questions(&user, &set)?)?,
            (None, Some(job)) => {
                let (set, questions) = app.sets.questions_for_job(&user, &job)?;
                print_json(&serde_json::json!({
                    "questionSet": set,
                    "questions": questions,
                }))?;
            }
            (None, None) => anyhow::bail!("either --set or --job is required"),
        },
        Command::DeleteSet { user, set } => {
            app.sets.delete(&user, &set)?;
            print_json(&serde_json::json!({ "deleted": set }))?;
        }
        Command::Import { user, file, name } => {
            let content = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;
            let questions: Vec<ExtractedQuestion> = serde_json::from_str(&content)
                .with_context(|| format!("parsing questions from {}", file.display()))?;
            print_json(&app.sets.import(&user, name.as_deref(), &questions)?)?;
        }
    }

    Ok(())
}

struct App {
    trigger: JobTrigger,
    sets: QuestionSets,
}

impl App {
    fn open(config: &Config) -> Result<Self> {
        let db = Database::open(&config.database_path).with_context(|| {
            format!("opening database at {}", config.database_path.display())
        })?;
        let store: Arc<dyn ObjectStore> = Arc::new(FsObjectStore::new(&config.storage_directory));

        Ok(Self {
            trigger: JobTrigger::from_config(config, db.clone(), store),
            sets: QuestionSets::new(db),
        })
    }
}

/// `log` records from the database layer are bridged into tracing before the
/// subscriber is installed, so the subscriber must not install its own bridge.
fn init_logging(level: Option<&str>, json: bool) -> Result<()> {
    tracing_log::LogTracer::init().context("installing log bridge")?;

    let filter = match level {
        Some(directive) => EnvFilter::try_new(directive)
            .with_context(|| format!("invalid log level '{}'", directive))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    let json_layer = json.then(|| fmt::layer().json().with_writer(io::stderr));
    let text_layer = (!json).then(|| fmt::layer().with_target(false).with_writer(io::stderr));

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer);
    tracing::subscriber::set_global_default(subscriber).context("installing subscriber")?;
    Ok(())
}

fn file_name(path: &Path) -> Result<&str> {
    path.file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("{} has no usable file name", path.display()))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Prints a run result; a failed run exits with status 2.
fn print_result(result: &JobResult) -> Result<()> {
    print_json(result)?;
    if !result.is_success() {
        std::process::exit(2);
    }
    Ok(())
}
