use std::fmt;
use std::path::PathBuf;

pub type JobId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamKind::Stdout => write!(f, "stdout"),
            StreamKind::Stderr => write!(f, "stderr"),
        }
    }
}

/// Non-terminal relay states, in the order they are reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayStage {
    Running,
    StreamsClosed,
    ProcessExited { status: Option<i32> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    Stage(RelayStage),
    Line { stream: StreamKind, line: String },
    CodeCaptured(String),
}

/// Terminal relay state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    Completed { code: String },
    Failed(Failure),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InstallProgress {
    pub received: u64,
    pub total: Option<u64>,
    /// `None` while the total size is unknown.
    pub percent: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveReport {
    pub path: PathBuf,
    /// Entry names in the order they were written.
    pub entries: Vec<String>,
    pub skipped: Vec<SkippedEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    ApiKeyConfigured(Result<(), Failure>),
    VersionReported(Result<String, Failure>),
    InstallProgress(InstallProgress),
    InstallFinished(Result<PathBuf, Failure>),
    ArchiveBuilt {
        folder: PathBuf,
        result: Result<ArchiveReport, Failure>,
    },
    Relay {
        job_id: JobId,
        event: RelayEvent,
    },
    SendFinished {
        job_id: JobId,
        outcome: RelayOutcome,
    },
    ReceiveFinished(Result<(), Failure>),
}

/// Cloneable error summary carried in events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

impl Failure {
    pub(crate) fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Launch,
    Process { status: Option<i32> },
    Io,
    Network,
    Parse,
    Cancelled,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Launch => write!(f, "launch error"),
            FailureKind::Process { status: Some(code) } => write!(f, "exit status {code}"),
            FailureKind::Process { status: None } => write!(f, "terminated by signal"),
            FailureKind::Io => write!(f, "io error"),
            FailureKind::Network => write!(f, "network error"),
            FailureKind::Parse => write!(f, "parse error"),
            FailureKind::Cancelled => write!(f, "cancelled"),
        }
    }
}
