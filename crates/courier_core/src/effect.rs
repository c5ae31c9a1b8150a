use std::path::PathBuf;

/// Side effects requested by `update`; executed by the platform layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    ConfigureApiKey { api_key: String },
    QueryVersion,
    StartInstall,
    BuildArchive { folder: PathBuf },
    StartSend { job_id: crate::JobId, path: PathBuf },
    KillSend { job_id: crate::JobId },
    DiscardArchive { path: PathBuf },
    StartReceive { code: String, dest_dir: PathBuf },
    CopyToClipboard { text: String },
    Notify { title: String, body: String },
    Exit,
}
