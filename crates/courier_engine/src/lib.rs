//! Courier engine: process invocation, output relay, install and archiving.
mod archive;
mod config;
mod engine;
mod error;
mod install;
mod process;
mod relay;
mod sink;
mod tool;
mod types;

pub use archive::{build_archive, discard_archive};
pub use config::EngineConfig;
pub use engine::EngineHandle;
pub use error::EngineError;
pub use install::{
    default_artifact_url, default_executable_name, is_tool_installed, InstallSettings, Installer,
    DEFAULT_RELEASE,
};
pub use process::{check_exit, CapturedOutput, ProcessControl, ProcessRunner, RunningProcess};
pub use relay::{find_receive_code, OutputRelay, ReceiveCodeCell, RECEIVE_CODE_PATTERN};
pub use sink::{ChannelEventSink, EventSink};
pub use tool::TransferTool;
pub use types::{
    ArchiveReport, EngineEvent, Failure, FailureKind, InstallProgress, JobId, RelayEvent,
    RelayOutcome, RelayStage, SkippedEntry, StreamKind,
};
