use std::path::Path;

use engine_logging::engine_info;

use crate::process::{ProcessRunner, RunningProcess};
use crate::EngineError;

/// Typed wrapper over the `runpodctl` command surface.
#[derive(Debug, Clone)]
pub struct TransferTool {
    runner: ProcessRunner,
}

impl TransferTool {
    pub fn new(runner: ProcessRunner) -> Self {
        Self { runner }
    }

    pub fn runner(&self) -> &ProcessRunner {
        &self.runner
    }

    /// `config --apiKey=<key>`
    pub async fn configure_api_key(&self, api_key: &str) -> Result<(), EngineError> {
        let arg = format!("--apiKey={api_key}");
        self.runner.run_captured(["config", arg.as_str()], None).await?;
        engine_info!("api key configured");
        Ok(())
    }

    /// `version`, trimmed.
    pub async fn version(&self) -> Result<String, EngineError> {
        let output = self.runner.run_captured(["version"], None).await?;
        let version = output.stdout.trim();
        if version.is_empty() {
            return Err(EngineError::Parse("version output was empty".to_string()));
        }
        Ok(version.to_string())
    }

    /// Spawns `send <path>`; the caller relays its output.
    pub fn start_send(&self, path: &Path) -> Result<RunningProcess, EngineError> {
        engine_info!("sending {:?}", path);
        self.runner
            .spawn([std::ffi::OsStr::new("send"), path.as_os_str()], None)
    }

    /// `receive <code>` with the child running inside `dest_dir`.
    pub async fn receive(&self, code: &str, dest_dir: &Path) -> Result<(), EngineError> {
        if !dest_dir.is_dir() {
            return Err(EngineError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("destination is not a directory: {}", dest_dir.display()),
            )));
        }
        engine_info!("receiving into {:?}", dest_dir);
        self.runner
            .run_captured(["receive", code], Some(dest_dir))
            .await?;
        Ok(())
    }
}
