use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::Context;
use courier_engine::EngineConfig;
use engine_logging::{engine_info, engine_warn, LogDestination};
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

pub const SETTINGS_FILENAME: &str = "courier.ron";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogTarget {
    #[default]
    File,
    Terminal,
    Both,
}

impl From<LogTarget> for LogDestination {
    fn from(target: LogTarget) -> Self {
        match target {
            LogTarget::File => LogDestination::File,
            LogTarget::Terminal => LogDestination::Terminal,
            LogTarget::Both => LogDestination::Both,
        }
    }
}

/// Contents of `courier.ron`. Every field is optional in the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Defaults to the working directory.
    pub tool_dir: Option<PathBuf>,
    /// Defaults to the tool directory.
    pub staging_dir: Option<PathBuf>,
    /// Overrides the release artifact for the host platform.
    pub download_url: Option<String>,
    pub log_destination: LogTarget,
    pub log_level: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            tool_dir: None,
            staging_dir: None,
            download_url: None,
            log_destination: LogTarget::File,
            log_level: "info".to_string(),
        }
    }
}

impl AppSettings {
    pub fn with_overrides(mut self, tool_dir: Option<PathBuf>, log: Option<LogTarget>) -> Self {
        if tool_dir.is_some() {
            self.tool_dir = tool_dir;
        }
        if let Some(log) = log {
            self.log_destination = log;
        }
        self
    }

    pub fn level_filter(&self) -> LevelFilter {
        LevelFilter::from_str(self.log_level.trim()).unwrap_or(LevelFilter::Info)
    }

    /// Resolves relative directories against `base` so the tool path stays
    /// valid when a child runs in another working directory.
    pub fn engine_config(&self, base: &Path) -> EngineConfig {
        let tool_dir = match &self.tool_dir {
            Some(dir) => base.join(dir),
            None => base.to_path_buf(),
        };
        let mut config = EngineConfig::default_in(tool_dir);
        if let Some(staging_dir) = &self.staging_dir {
            config.staging_dir = base.join(staging_dir);
        }
        if let Some(url) = &self.download_url {
            config.install.url = url.clone();
        }
        config
    }
}

/// Reads settings from `path`. A missing file gives the defaults.
pub fn load(path: &Path) -> anyhow::Result<AppSettings> {
    let content = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok(AppSettings::default());
        }
        Err(err) => return Err(err).with_context(|| format!("reading {}", path.display())),
    };
    let settings = ron::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
    Ok(settings)
}

/// Writes settings next to `path` and renames over it.
pub fn save(path: &Path, settings: &AppSettings) -> anyhow::Result<()> {
    let pretty = ron::ser::PrettyConfig::new();
    let content =
        ron::ser::to_string_pretty(settings, pretty).context("serializing settings")?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;

    let mut tmp = NamedTempFile::new_in(&dir)?;
    tmp.write_all(content.as_bytes())?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .map_err(|err| err.error)
        .with_context(|| format!("writing {}", path.display()))?;

    engine_info!("saved settings to {:?}", path);
    Ok(())
}

/// Loads settings, falling back to the defaults when the file is unusable.
/// The problem is returned so it can be logged once logging is up.
pub fn load_or_default(path: &Path) -> (AppSettings, Option<anyhow::Error>) {
    match load(path) {
        Ok(settings) => (settings, None),
        Err(err) => (AppSettings::default(), Some(err)),
    }
}

pub fn warn_unusable(path: &Path, err: &anyhow::Error) {
    engine_warn!("ignoring settings file {:?}: {:#}", path, err);
}
