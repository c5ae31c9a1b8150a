use std::collections::VecDeque;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::view_model::{
    AppViewModel, ControlState, Dialog, DialogKind, InstallView, SendWindowView,
    OUTPUT_TAIL_LIMIT,
};

pub type JobId = u64;

/// Failure categories surfaced to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Launch,
    Process,
    Io,
    Network,
    Parse,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

impl Failure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum InstallState {
    #[default]
    Missing,
    Installing {
        percent: Option<f64>,
    },
    Installed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendStatus {
    /// Waiting for the tool to print the receive code.
    Running,
    /// Code captured; the tool waits for the peer.
    CodeReady,
    Completed,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
enum ArchiveFlow {
    #[default]
    Idle,
    Building {
        folder: PathBuf,
    },
    /// Archive built and shown in the data path, not yet handed to a send.
    Ready {
        path: PathBuf,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SendSession {
    job_id: JobId,
    path: PathBuf,
    receive_code: Option<String>,
    status: SendStatus,
    output: VecDeque<String>,
    output_total: usize,
    /// Archive owned by this send; deleted when the window closes.
    archive: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AppState {
    api_key: String,
    data_path: String,
    install: InstallState,
    archive: ArchiveFlow,
    send: Option<SendSession>,
    receive_in_flight: bool,
    dialogs: VecDeque<Dialog>,
    next_job_id: JobId,
    quitting: bool,
    dirty: bool,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Initial state after the startup existence check for the tool.
    pub fn with_tool_installed(installed: bool) -> Self {
        let mut state = Self::new();
        if installed {
            state.install = InstallState::Installed;
        }
        state
    }

    pub fn view(&self) -> AppViewModel {
        let install = match &self.install {
            InstallState::Missing | InstallState::Failed => InstallView {
                button: ControlState::Enabled,
                progress: None,
            },
            InstallState::Installing { percent } => InstallView {
                button: ControlState::Disabled,
                progress: Some(*percent),
            },
            InstallState::Installed => InstallView {
                button: ControlState::Hidden,
                progress: None,
            },
        };

        let send_window = self.send.as_ref().map(|session| SendWindowView {
            job_id: session.job_id,
            path: session.path.clone(),
            receive_code: session.receive_code.clone(),
            status: session.status.clone(),
            output_tail: session.output.iter().cloned().collect(),
            output_total: session.output_total,
            copy: if session.receive_code.is_some() {
                ControlState::Enabled
            } else {
                ControlState::Disabled
            },
        });

        AppViewModel {
            api_key: self.api_key.clone(),
            data_path: self.data_path.clone(),
            install,
            archive_building: matches!(self.archive, ArchiveFlow::Building { .. }),
            send_button: if self.send.is_some() {
                ControlState::Disabled
            } else {
                ControlState::Enabled
            },
            receive_button: if self.receive_in_flight {
                ControlState::Disabled
            } else {
                ControlState::Enabled
            },
            send_window,
            dialog: self.dialogs.front().cloned(),
            pending_dialogs: self.dialogs.len(),
            quitting: self.quitting,
            dirty: self.dirty,
        }
    }

    /// Returns whether anything changed since the last call and clears the flag.
    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn is_quitting(&self) -> bool {
        self.quitting
    }

    pub(crate) fn set_quitting(&mut self) {
        self.quitting = true;
        self.mark_dirty();
    }

    // Settings panel.

    pub(crate) fn api_key(&self) -> &str {
        &self.api_key
    }

    pub(crate) fn set_api_key(&mut self, key: String) {
        if self.api_key != key {
            self.api_key = key;
            self.mark_dirty();
        }
    }

    pub(crate) fn install_state(&self) -> &InstallState {
        &self.install
    }

    pub(crate) fn begin_install(&mut self) {
        self.install = InstallState::Installing { percent: None };
        self.mark_dirty();
    }

    pub(crate) fn apply_install_progress(&mut self, percent: Option<f64>) {
        let InstallState::Installing { percent: current } = &mut self.install else {
            return;
        };
        let next = match (*current, percent) {
            (Some(prev), Some(next)) => Some(prev.max(next)),
            // Indeterminate progress keeps the last known value.
            (Some(prev), None) => Some(prev),
            (None, next) => next,
        };
        if next != *current {
            *current = next;
            self.mark_dirty();
        }
    }

    pub(crate) fn finish_install(&mut self, ok: bool) {
        self.install = if ok {
            InstallState::Installed
        } else {
            InstallState::Failed
        };
        self.mark_dirty();
    }

    // Transfer panel.

    pub(crate) fn data_path(&self) -> &str {
        &self.data_path
    }

    pub(crate) fn set_data_path(&mut self, path: String) {
        if self.data_path != path {
            self.data_path = path;
            self.mark_dirty();
        }
    }

    pub(crate) fn begin_archive(&mut self, folder: PathBuf) {
        self.archive = ArchiveFlow::Building { folder };
        self.mark_dirty();
    }

    pub(crate) fn is_building_archive_for(&self, folder: &Path) -> bool {
        matches!(&self.archive, ArchiveFlow::Building { folder: current } if current == folder)
    }

    pub(crate) fn archive_ready(&mut self, path: PathBuf) {
        self.archive = ArchiveFlow::Ready { path };
        self.mark_dirty();
    }

    pub(crate) fn archive_failed(&mut self) {
        self.archive = ArchiveFlow::Idle;
        self.mark_dirty();
    }

    /// Drops the ready archive that no send has claimed, returning its path.
    pub(crate) fn take_unclaimed_archive(&mut self) -> Option<PathBuf> {
        match std::mem::take(&mut self.archive) {
            ArchiveFlow::Ready { path } => Some(path),
            other => {
                self.archive = other;
                None
            }
        }
    }

    /// Hands the ready archive to a send when the send uses that path.
    fn claim_archive_for(&mut self, path: &Path) -> Option<PathBuf> {
        let claimable = matches!(&self.archive, ArchiveFlow::Ready { path: ready } if ready == path);
        if claimable {
            self.take_unclaimed_archive()
        } else {
            None
        }
    }

    // Send window.

    pub(crate) fn send_open(&self) -> bool {
        self.send.is_some()
    }

    pub(crate) fn open_send(&mut self, path: PathBuf) -> JobId {
        self.next_job_id += 1;
        let job_id = self.next_job_id;
        let archive = self.claim_archive_for(&path);
        self.send = Some(SendSession {
            job_id,
            path,
            receive_code: None,
            status: SendStatus::Running,
            output: VecDeque::new(),
            output_total: 0,
            archive,
        });
        self.mark_dirty();
        job_id
    }

    fn session_mut(&mut self, job_id: JobId) -> Option<&mut SendSession> {
        self.send
            .as_mut()
            .filter(|session| session.job_id == job_id)
    }

    pub(crate) fn push_send_output(&mut self, job_id: JobId, line: String) {
        let Some(session) = self.session_mut(job_id) else {
            return;
        };
        if session.output.len() == OUTPUT_TAIL_LIMIT {
            session.output.pop_front();
        }
        session.output.push_back(line);
        session.output_total += 1;
        self.mark_dirty();
    }

    /// Stores the first code for the job; returns false when ignored.
    pub(crate) fn capture_receive_code(&mut self, job_id: JobId, code: String) -> bool {
        let Some(session) = self.session_mut(job_id) else {
            return false;
        };
        if session.receive_code.is_some() {
            return false;
        }
        session.receive_code = Some(code);
        if session.status == SendStatus::Running {
            session.status = SendStatus::CodeReady;
        }
        self.mark_dirty();
        true
    }

    /// Applies the relay outcome; returns false when the job is not the open one.
    pub(crate) fn finish_send(&mut self, job_id: JobId, result: &Result<String, Failure>) -> bool {
        let Some(session) = self.session_mut(job_id) else {
            return false;
        };
        match result {
            Ok(code) => {
                if session.receive_code.is_none() {
                    session.receive_code = Some(code.clone());
                }
                session.status = SendStatus::Completed;
            }
            Err(failure) => {
                session.status = SendStatus::Failed(failure.message.clone());
            }
        }
        self.mark_dirty();
        true
    }

    pub(crate) fn send_is_running(&self) -> bool {
        matches!(
            self.send.as_ref().map(|session| &session.status),
            Some(SendStatus::Running | SendStatus::CodeReady)
        )
    }

    pub(crate) fn receive_code(&self) -> Option<&str> {
        self.send
            .as_ref()
            .and_then(|session| session.receive_code.as_deref())
    }

    /// Closes the send window, returning the job id and any archive it owned.
    pub(crate) fn close_send(&mut self) -> Option<(JobId, Option<PathBuf>)> {
        let session = self.send.take()?;
        self.mark_dirty();
        Some((session.job_id, session.archive))
    }

    // Receive flow.

    pub(crate) fn receive_in_flight(&self) -> bool {
        self.receive_in_flight
    }

    pub(crate) fn set_receive_in_flight(&mut self, in_flight: bool) {
        if self.receive_in_flight != in_flight {
            self.receive_in_flight = in_flight;
            self.mark_dirty();
        }
    }

    // Dialogs.

    pub(crate) fn show_info(&mut self, title: impl Into<String>, body: impl Into<String>) {
        self.push_dialog(DialogKind::Info, title.into(), body.into());
    }

    pub(crate) fn show_error(&mut self, body: impl Into<String>) {
        self.push_dialog(DialogKind::Error, "Error".to_string(), body.into());
    }

    fn push_dialog(&mut self, kind: DialogKind, title: String, body: String) {
        self.dialogs.push_back(Dialog { kind, title, body });
        self.mark_dirty();
    }

    pub(crate) fn dismiss_dialog(&mut self) {
        if self.dialogs.pop_front().is_some() {
            self.mark_dirty();
        }
    }
}
