use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::{Failure, FailureKind};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("cannot launch {program:?}: {reason}")]
    Launch { program: PathBuf, reason: String },
    #[error("{}", describe_exit(*status, output))]
    Process { status: Option<i32>, output: String },
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("network error: {0}")]
    Network(String),
    #[error("{0}")]
    Parse(String),
    #[error("cancelled")]
    Cancelled,
}

impl EngineError {
    pub fn kind(&self) -> FailureKind {
        match self {
            EngineError::Launch { .. } => FailureKind::Launch,
            EngineError::Process { status, .. } => FailureKind::Process { status: *status },
            EngineError::Io(_) | EngineError::Archive(_) => FailureKind::Io,
            EngineError::Network(_) => FailureKind::Network,
            EngineError::Parse(_) => FailureKind::Parse,
            EngineError::Cancelled => FailureKind::Cancelled,
        }
    }
}

impl From<EngineError> for Failure {
    fn from(err: EngineError) -> Self {
        Failure::new(err.kind(), err.to_string())
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return EngineError::Network(format!("timeout: {err}"));
        }
        EngineError::Network(err.to_string())
    }
}

fn describe_exit(status: Option<i32>, output: &str) -> String {
    let status = match status {
        Some(code) => format!("status {code}"),
        None => "a signal".to_string(),
    };
    let output = output.trim();
    if output.is_empty() {
        format!("process exited with {status}")
    } else {
        format!("process exited with {status}: {output}")
    }
}
