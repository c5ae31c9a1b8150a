use std::path::PathBuf;

use crate::install::{default_executable_name, InstallSettings};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory holding the tool; also where the installer puts it.
    pub tool_dir: PathBuf,
    pub executable_name: String,
    /// Where folder archives are written before sending.
    pub staging_dir: PathBuf,
    pub install: InstallSettings,
}

impl EngineConfig {
    /// Defaults rooted at `tool_dir`, which should be absolute so the tool is
    /// still found when a child runs in another working directory.
    pub fn default_in(tool_dir: PathBuf) -> Self {
        let install = InstallSettings {
            install_dir: tool_dir.clone(),
            ..InstallSettings::default()
        };
        Self {
            staging_dir: tool_dir.clone(),
            executable_name: default_executable_name().to_string(),
            tool_dir,
            install,
        }
    }

    pub fn tool_path(&self) -> PathBuf {
        self.tool_dir.join(&self.executable_name)
    }
}
