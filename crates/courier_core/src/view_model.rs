use std::path::PathBuf;

use crate::{JobId, SendStatus};

/// Lines of send output kept for display.
pub const OUTPUT_TAIL_LIMIT: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControlState {
    #[default]
    Enabled,
    Disabled,
    Hidden,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogKind {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dialog {
    pub kind: DialogKind,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct InstallView {
    pub button: ControlState,
    /// `Some` while installing; the inner value is `None` when indeterminate.
    pub progress: Option<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AppViewModel {
    pub api_key: String,
    pub data_path: String,
    pub install: InstallView,
    pub archive_building: bool,
    pub send_button: ControlState,
    pub receive_button: ControlState,
    pub send_window: Option<SendWindowView>,
    pub dialog: Option<Dialog>,
    pub pending_dialogs: usize,
    pub quitting: bool,
    pub dirty: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendWindowView {
    pub job_id: JobId,
    pub path: PathBuf,
    pub receive_code: Option<String>,
    pub status: SendStatus,
    pub output_tail: Vec<String>,
    /// Total lines seen, including those dropped from the tail.
    pub output_total: usize,
    pub copy: ControlState,
}
