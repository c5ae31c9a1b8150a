use std::path::PathBuf;

use clap::Parser;

use super::settings::LogTarget;

/// Desktop shell around the runpodctl transfer tool.
#[derive(Parser, Debug, Clone)]
#[command(name = "courier", version)]
pub struct Cli {
    /// Settings file to read.
    #[arg(long, value_name = "PATH")]
    pub settings: Option<PathBuf>,
    /// Directory holding the runpodctl executable.
    #[arg(long, value_name = "DIR")]
    pub tool_dir: Option<PathBuf>,
    /// Where log records go.
    #[arg(long, value_enum)]
    pub log: Option<LogTarget>,
    /// Persist the effective settings before starting.
    #[arg(long, default_value_t = false)]
    pub write_settings: bool,
}
