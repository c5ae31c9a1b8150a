use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use engine_logging::{engine_debug, engine_info, engine_warn};
use futures_util::StreamExt;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tokio::time::MissedTickBehavior;

use crate::{EngineError, EngineEvent, EventSink, InstallProgress};

/// Release the installer fetches by default.
pub const DEFAULT_RELEASE: &str = "v1.9.0";

/// In-flight progress stays below this until the download completes.
const MAX_IN_FLIGHT_PERCENT: f64 = 99.9;

#[derive(Debug, Clone)]
pub struct InstallSettings {
    pub url: String,
    pub install_dir: PathBuf,
    pub executable_name: String,
    pub poll_interval: Duration,
    pub connect_timeout: Duration,
    /// Whole-request limit; `None` lets large artifacts take as long as needed.
    pub request_timeout: Option<Duration>,
}

impl Default for InstallSettings {
    fn default() -> Self {
        Self {
            url: default_artifact_url(),
            install_dir: PathBuf::from("."),
            executable_name: default_executable_name().to_string(),
            poll_interval: Duration::from_millis(500),
            connect_timeout: Duration::from_secs(10),
            request_timeout: None,
        }
    }
}

pub fn default_executable_name() -> &'static str {
    if cfg!(windows) {
        "runpodctl.exe"
    } else {
        "runpodctl"
    }
}

/// Release artifact for the host platform.
pub fn default_artifact_url() -> String {
    let os = if cfg!(windows) {
        "win"
    } else if cfg!(target_os = "macos") {
        "darwin"
    } else {
        "linux"
    };
    let arch = if cfg!(target_arch = "aarch64") {
        "arm"
    } else {
        "amd"
    };
    format!("https://github.com/runpod/runpodctl/releases/download/{DEFAULT_RELEASE}/runpodctl-{os}-{arch}")
}

/// Existence check only; the installed version is not inspected.
pub fn is_tool_installed(path: &Path) -> bool {
    match path.try_exists() {
        Ok(exists) => exists,
        Err(err) => {
            engine_warn!("error checking {:?}: {}", path, err);
            false
        }
    }
}

/// Byte counters shared between the download task and the poll loop.
#[derive(Debug, Default)]
struct DownloadCounters {
    received: AtomicU64,
    total: AtomicU64,
    total_known: AtomicBool,
}

impl DownloadCounters {
    fn set_total(&self, total: Option<u64>) {
        if let Some(total) = total {
            self.total.store(total, Ordering::Relaxed);
            self.total_known.store(true, Ordering::Release);
        }
    }

    fn add(&self, bytes: u64) {
        self.received.fetch_add(bytes, Ordering::Relaxed);
    }

    fn snapshot(&self) -> (u64, Option<u64>) {
        let total = self
            .total_known
            .load(Ordering::Acquire)
            .then(|| self.total.load(Ordering::Relaxed));
        (self.received.load(Ordering::Relaxed), total)
    }
}

/// Turns raw counters into monotonic progress readings.
#[derive(Debug, Default)]
pub(crate) struct ProgressGauge {
    last_percent: Option<f64>,
}

impl ProgressGauge {
    /// Reading while the download is in flight; never reaches 100.
    pub(crate) fn observe(&mut self, received: u64, total: Option<u64>) -> InstallProgress {
        let percent = total.filter(|total| *total > 0).map(|total| {
            let raw = received as f64 / total as f64 * 100.0;
            let capped = raw.min(MAX_IN_FLIGHT_PERCENT);
            self.last_percent.map_or(capped, |last| last.max(capped))
        });
        if percent.is_some() {
            self.last_percent = percent;
        }
        InstallProgress {
            received,
            total,
            percent: percent.or(self.last_percent),
        }
    }

    /// Reading once the completion signal fired.
    pub(crate) fn complete(&mut self, received: u64) -> InstallProgress {
        self.last_percent = Some(100.0);
        InstallProgress {
            received,
            total: Some(received),
            percent: Some(100.0),
        }
    }
}

/// Downloads the tool and renames it into place.
#[derive(Debug, Clone)]
pub struct Installer {
    settings: InstallSettings,
}

impl Installer {
    pub fn new(settings: InstallSettings) -> Self {
        Self { settings }
    }

    pub fn target_path(&self) -> PathBuf {
        self.settings
            .install_dir
            .join(&self.settings.executable_name)
    }

    /// Runs the download, emitting `InstallProgress` every poll interval, then
    /// persists the artifact under the executable name.
    pub async fn install(&self, sink: &dyn EventSink) -> Result<PathBuf, EngineError> {
        let client = self.build_client()?;
        tokio::fs::create_dir_all(&self.settings.install_dir).await?;
        let tmp = NamedTempFile::new_in(&self.settings.install_dir)?;
        let file = tokio::fs::File::from_std(tmp.reopen()?);
        let counters = Arc::new(DownloadCounters::default());

        engine_info!("downloading {}", self.settings.url);
        let mut download = tokio::spawn(download_to(
            client,
            self.settings.url.clone(),
            file,
            counters.clone(),
        ));

        let mut gauge = ProgressGauge::default();
        let mut ticker = tokio::time::interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let joined = loop {
            tokio::select! {
                // Completion is checked first so a finished transfer is never polled again.
                biased;
                joined = &mut download => break joined,
                _ = ticker.tick() => {
                    let (received, total) = counters.snapshot();
                    let progress = gauge.observe(received, total);
                    engine_debug!("install progress {:?}", progress);
                    sink.emit(EngineEvent::InstallProgress(progress));
                }
            }
        };

        let received = match joined {
            Ok(result) => result?,
            Err(err) => {
                return Err(EngineError::Io(std::io::Error::other(format!(
                    "download task failed: {err}"
                ))))
            }
        };
        sink.emit(EngineEvent::InstallProgress(gauge.complete(received)));

        let target = self.target_path();
        if target.exists() {
            tokio::fs::remove_file(&target).await?;
        }
        tmp.persist(&target).map_err(|err| EngineError::Io(err.error))?;
        make_executable(&target)?;

        engine_info!("installed {:?} ({} bytes)", target, received);
        Ok(target)
    }

    fn build_client(&self) -> Result<reqwest::Client, EngineError> {
        let mut builder = reqwest::Client::builder().connect_timeout(self.settings.connect_timeout);
        if let Some(timeout) = self.settings.request_timeout {
            builder = builder.timeout(timeout);
        }
        Ok(builder.build()?)
    }
}

async fn download_to(
    client: reqwest::Client,
    url: String,
    mut file: tokio::fs::File,
    counters: Arc<DownloadCounters>,
) -> Result<u64, EngineError> {
    let response = client.get(&url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(EngineError::Network(format!("http status {status}")));
    }
    counters.set_total(response.content_length());

    let mut received = 0u64;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        received += chunk.len() as u64;
        counters.add(chunk.len() as u64);
    }
    file.flush().await?;
    file.sync_all().await?;
    Ok(received)
}

fn make_executable(path: &Path) -> Result<(), EngineError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut permissions = std::fs::metadata(path)?.permissions();
        permissions.set_mode(permissions.mode() | 0o755);
        std::fs::set_permissions(path, permissions)?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}
