use std::error::Error;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while driving a pipeline or advancing a single stage.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("receiver '{stage}' attempted to introduce a different file than it was given")]
    ReceiverBecameGenerator { stage: String },
    #[error("invalid glob pattern '{pattern}': {message}")]
    Glob { pattern: String, message: String },
    #[error("failed reading '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed writing '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed preparing destination '{}': {source}", path.display())]
    Destination {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot write to '{}', path is a directory", path.display())]
    DestinationIsDirectory { path: PathBuf },
    #[error("cannot write to '{}', path exists and overwrite is disabled", path.display())]
    DestinationExists { path: PathBuf },
    #[error("source worker failure: {0}")]
    Worker(String),
    #[error("stage '{stage}' failed: {message}")]
    Stage { stage: String, message: String },
}

impl PipelineError {
    pub fn stage(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Stage {
            stage: stage.into(),
            message: message.into(),
        }
    }
}

/// Whatever a fallible task handler fails with.
pub type HandlerError = Box<dyn Error + Send + Sync>;

/// Errors raised by the task runner.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("task '{0}' already exists")]
    DuplicateTask(String),
    #[error("task '{0}' does not exist")]
    UnknownTask(String),
    #[error("dependency cycle detected: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),
    #[error("task '{task}' failed: {source}")]
    Handler {
        task: String,
        #[source]
        source: HandlerError,
    },
    #[error("task '{task}' pipeline failed: {source}")]
    Pipeline {
        task: String,
        #[source]
        source: PipelineError,
    },
}
