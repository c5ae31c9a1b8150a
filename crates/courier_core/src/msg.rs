use std::path::PathBuf;

use crate::{Failure, JobId};

#[derive(Debug, Clone, PartialEq)]
pub enum Msg {
    /// User edited the API key entry.
    ApiKeyChanged(String),
    /// User clicked Save in the settings panel.
    SaveApiKeyClicked,
    /// Tool finished `config --apiKey`.
    ApiKeySaved(Result<(), Failure>),
    /// User clicked Version.
    VersionClicked,
    /// Tool finished `version`.
    VersionReported(Result<String, Failure>),
    /// User clicked Install.
    InstallClicked,
    /// Periodic download progress; `None` when the size is unknown.
    InstallProgress { percent: Option<f64> },
    /// Download and rename finished.
    InstallFinished(Result<PathBuf, Failure>),
    /// User edited the data path entry.
    DataPathChanged(String),
    /// User picked a single file.
    FilePicked(PathBuf),
    /// User picked a folder; it gets archived before sending.
    FolderPicked(PathBuf),
    /// Folder archive finished.
    ArchiveBuilt {
        folder: PathBuf,
        result: Result<ArchiveSummary, Failure>,
    },
    /// User clicked Send.
    SendClicked,
    /// A line of output from the running send.
    SendOutput { job_id: JobId, line: String },
    /// The relay captured the receive code.
    ReceiveCodeCaptured { job_id: JobId, code: String },
    /// The relay reached a terminal state.
    SendFinished {
        job_id: JobId,
        result: Result<String, Failure>,
    },
    /// User closed the send window.
    SendWindowClosed,
    /// User clicked "Copy to Clipboard" in the send window.
    CopyReceiveCodeClicked,
    /// User confirmed the receive prompt.
    ReceiveRequested { dest_dir: PathBuf, code: String },
    /// Tool finished `receive`.
    ReceiveFinished(Result<(), Failure>),
    /// User acknowledged the front dialog.
    DialogDismissed,
    /// User asked to quit.
    QuitRequested,
}

/// What the archive builder produced for a picked folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub path: PathBuf,
    pub entries: usize,
    pub skipped: Vec<String>,
}
