use std::any::Any;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::stage::RunState;

/// The scratch directory for a run could not be created.
#[derive(Debug, Error)]
#[error("failed to create workspace under {root}: {source}")]
pub struct WorkspaceError {
    pub root: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// A declared stage failure that ended the run early.
#[derive(Debug, Clone, Error, Serialize)]
#[error("{stage} failed: {message}")]
pub struct StageFailure {
    pub stage: RunState,
    pub message: String,
}

/// Failure confined to a single candidate file.
#[derive(Debug, Error)]
pub enum PerFileError {
    #[error("could not read file: {0}")]
    Read(#[from] std::io::Error),
    #[error("analysis failed: {0}")]
    Analysis(String),
}

/// Anything a stage raised that is not a declared [`StageFailure`].
#[derive(Debug, Error)]
pub enum UnhandledFault {
    #[error("{0:#}")]
    Error(#[from] anyhow::Error),
    #[error("panic: {0}")]
    Panic(String),
}

impl UnhandledFault {
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        Self::Panic(message)
    }
}
