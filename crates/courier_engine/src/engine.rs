use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use engine_logging::{engine_debug, engine_info, engine_warn};
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::archive::{build_archive, discard_archive};
use crate::install::{InstallSettings, Installer};
use crate::process::ProcessRunner;
use crate::relay::OutputRelay;
use crate::tool::TransferTool;
use crate::{EngineConfig, EngineError, EngineEvent, EventSink, Failure, JobId, RelayOutcome};

/// How long shutdown lets in-flight tasks finish before dropping them.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

enum EngineCommand {
    ConfigureApiKey { api_key: String },
    QueryVersion,
    Install,
    BuildArchive { folder: PathBuf },
    StartSend { job_id: JobId, path: PathBuf },
    CancelSend { job_id: JobId },
    Receive { code: String, dest_dir: PathBuf },
    DiscardArchive { path: PathBuf },
    Shutdown { done: mpsc::Sender<()> },
}

/// Front door to the worker thread. Every command runs as its own task and
/// reports back through the event sink.
#[derive(Clone)]
pub struct EngineHandle {
    cmd_tx: mpsc::Sender<EngineCommand>,
}

struct EngineContext {
    tool: TransferTool,
    installer: Installer,
    staging_dir: PathBuf,
    sink: Arc<dyn EventSink>,
    /// Archives built and not yet discarded; whatever is left at shutdown
    /// is deleted.
    archives: Mutex<HashSet<PathBuf>>,
}

impl EngineContext {
    fn remember_archive(&self, path: PathBuf) {
        self.archives
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path);
    }

    fn forget_archive(&self, path: &Path) {
        self.archives
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(path);
    }

    fn discard_leftover_archives(&self) {
        let leftovers: Vec<PathBuf> = self
            .archives
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .collect();
        for path in leftovers {
            if let Err(err) = discard_archive(&path) {
                engine_warn!("failed to discard archive {:?}: {}", path, err);
            }
        }
    }
}

impl EngineHandle {
    pub fn spawn(config: EngineConfig, sink: Arc<dyn EventSink>) -> Result<Self, EngineError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("courier-worker")
            .build()?;

        let installer = Installer::new(InstallSettings {
            install_dir: config.tool_dir.clone(),
            executable_name: config.executable_name.clone(),
            ..config.install.clone()
        });
        let context = Arc::new(EngineContext {
            tool: TransferTool::new(ProcessRunner::new(config.tool_path())),
            installer,
            staging_dir: config.staging_dir.clone(),
            sink,
            archives: Mutex::new(HashSet::new()),
        });

        let (cmd_tx, cmd_rx) = mpsc::channel();
        thread::Builder::new()
            .name("courier-engine".to_string())
            .spawn(move || run_commands(runtime, context, cmd_rx))?;

        Ok(Self { cmd_tx })
    }

    pub fn configure_api_key(&self, api_key: impl Into<String>) {
        self.send(EngineCommand::ConfigureApiKey {
            api_key: api_key.into(),
        });
    }

    pub fn query_version(&self) {
        self.send(EngineCommand::QueryVersion);
    }

    pub fn install(&self) {
        self.send(EngineCommand::Install);
    }

    pub fn build_archive(&self, folder: PathBuf) {
        self.send(EngineCommand::BuildArchive { folder });
    }

    pub fn start_send(&self, job_id: JobId, path: PathBuf) {
        self.send(EngineCommand::StartSend { job_id, path });
    }

    /// Kills the send's process. Unknown or finished jobs are ignored.
    pub fn cancel_send(&self, job_id: JobId) {
        self.send(EngineCommand::CancelSend { job_id });
    }

    pub fn receive(&self, code: impl Into<String>, dest_dir: PathBuf) {
        self.send(EngineCommand::Receive {
            code: code.into(),
            dest_dir,
        });
    }

    pub fn discard_archive(&self, path: PathBuf) {
        self.send(EngineCommand::DiscardArchive { path });
    }

    /// Cancels running sends and waits for in-flight tasks to wind down.
    /// Children still running after the grace period are killed on drop.
    pub fn shutdown(&self) {
        let (done_tx, done_rx) = mpsc::channel();
        self.send(EngineCommand::Shutdown { done: done_tx });
        if done_rx.recv_timeout(SHUTDOWN_GRACE * 2).is_err() {
            engine_warn!("engine worker did not confirm shutdown");
        }
    }

    fn send(&self, command: EngineCommand) {
        if self.cmd_tx.send(command).is_err() {
            engine_warn!("engine worker is gone; command dropped");
        }
    }
}

fn run_commands(
    runtime: Runtime,
    context: Arc<EngineContext>,
    cmd_rx: mpsc::Receiver<EngineCommand>,
) {
    let tracker = TaskTracker::new();
    let mut sends: HashMap<JobId, CancellationToken> = HashMap::new();
    let mut shutdown_ack = None;

    while let Ok(command) = cmd_rx.recv() {
        // Finished sends cancel their own token on exit.
        sends.retain(|_, token| !token.is_cancelled());

        match command {
            EngineCommand::StartSend { job_id, path } => {
                let token = CancellationToken::new();
                sends.insert(job_id, token.clone());
                tracker.spawn_on(run_send(context.clone(), job_id, path, token), runtime.handle());
            }
            EngineCommand::CancelSend { job_id } => match sends.remove(&job_id) {
                Some(token) => token.cancel(),
                None => engine_debug!("cancel for inactive job {}", job_id),
            },
            EngineCommand::Shutdown { done } => {
                shutdown_ack = Some(done);
                break;
            }
            other => {
                let context = context.clone();
                tracker.spawn_on(
                    async move { handle_command(&context, other).await },
                    runtime.handle(),
                );
            }
        }
    }

    engine_info!("engine shutting down; cancelling {} sends", sends.len());
    for token in sends.values() {
        token.cancel();
    }
    tracker.close();
    let drained = runtime.block_on(async {
        tokio::time::timeout(SHUTDOWN_GRACE, tracker.wait())
            .await
            .is_ok()
    });
    if !drained {
        engine_warn!("{} engine tasks still running at shutdown", tracker.len());
    }
    runtime.shutdown_timeout(Duration::from_secs(2));
    context.discard_leftover_archives();
    if let Some(done) = shutdown_ack {
        let _ = done.send(());
    }
}

async fn handle_command(context: &EngineContext, command: EngineCommand) {
    let sink = context.sink.as_ref();
    match command {
        EngineCommand::ConfigureApiKey { api_key } => {
            let result = context.tool.configure_api_key(&api_key).await;
            sink.emit(EngineEvent::ApiKeyConfigured(result.map_err(Failure::from)));
        }
        EngineCommand::QueryVersion => {
            let result = context.tool.version().await;
            sink.emit(EngineEvent::VersionReported(result.map_err(Failure::from)));
        }
        EngineCommand::Install => {
            let result = context.installer.install(sink).await;
            if let Err(err) = &result {
                engine_warn!("install failed: {}", err);
            }
            sink.emit(EngineEvent::InstallFinished(result.map_err(Failure::from)));
        }
        EngineCommand::BuildArchive { folder } => {
            let root = folder.clone();
            let staging_dir = context.staging_dir.clone();
            let result = tokio::task::spawn_blocking(move || build_archive(&root, &staging_dir))
                .await
                .unwrap_or_else(|err| Err(join_error(err)));
            if let Ok(report) = &result {
                context.remember_archive(report.path.clone());
            }
            sink.emit(EngineEvent::ArchiveBuilt {
                folder,
                result: result.map_err(Failure::from),
            });
        }
        EngineCommand::Receive { code, dest_dir } => {
            let result = context.tool.receive(&code, &dest_dir).await;
            sink.emit(EngineEvent::ReceiveFinished(result.map_err(Failure::from)));
        }
        EngineCommand::DiscardArchive { path } => {
            context.forget_archive(&path);
            let result = tokio::task::spawn_blocking(move || discard_archive(&path))
                .await
                .unwrap_or_else(|err| Err(join_error(err)));
            if let Err(err) = result {
                engine_warn!("failed to discard archive: {}", err);
            }
        }
        EngineCommand::StartSend { .. }
        | EngineCommand::CancelSend { .. }
        | EngineCommand::Shutdown { .. } => {}
    }
}

async fn run_send(
    context: Arc<EngineContext>,
    job_id: JobId,
    path: PathBuf,
    cancel: CancellationToken,
) {
    let _finished = cancel.clone().drop_guard();
    let outcome = match context.tool.start_send(&path) {
        Ok(process) => {
            OutputRelay::new(job_id)
                .run(process, cancel, context.sink.as_ref())
                .await
        }
        Err(err) => {
            engine_warn!("job {} failed to start: {}", job_id, err);
            RelayOutcome::Failed(err.into())
        }
    };
    context
        .sink
        .emit(EngineEvent::SendFinished { job_id, outcome });
}

fn join_error(err: tokio::task::JoinError) -> EngineError {
    EngineError::Io(std::io::Error::other(format!("worker task failed: {err}")))
}
