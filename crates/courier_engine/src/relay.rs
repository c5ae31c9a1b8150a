use std::collections::VecDeque;
use std::process::ExitStatus;
use std::sync::{Arc, LazyLock, Mutex, OnceLock};

use engine_logging::{engine_debug, engine_error, engine_info, engine_warn};
use regex::Regex;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::sync::CancellationToken;

use crate::process::{ProcessControl, RunningProcess};
use crate::{
    EngineError, EngineEvent, EventSink, JobId, RelayEvent, RelayOutcome, RelayStage, StreamKind,
};

/// The tool prints this on stderr once the transfer room is open.
pub const RECEIVE_CODE_PATTERN: &str = r"runpodctl receive [A-Za-z0-9-]+";

const TRANSCRIPT_LIMIT: usize = 500;
const MAX_CONSECUTIVE_READ_ERRORS: u32 = 8;

static RECEIVE_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(RECEIVE_CODE_PATTERN).expect("receive code pattern compiles"));

/// Returns the first receive command found in `line`.
pub fn find_receive_code(line: &str) -> Option<&str> {
    RECEIVE_CODE.find(line).map(|found| found.as_str())
}

/// Write-once, multi-reader holder for the captured receive code.
#[derive(Debug, Clone, Default)]
pub struct ReceiveCodeCell {
    inner: Arc<OnceLock<String>>,
}

impl ReceiveCodeCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the code if none is set yet. Returns whether this call stored it.
    pub fn publish(&self, code: &str) -> bool {
        self.inner.set(code.to_string()).is_ok()
    }

    pub fn get(&self) -> Option<String> {
        self.inner.get().cloned()
    }
}

/// Drains a send process's output and extracts the receive code.
pub struct OutputRelay {
    job_id: JobId,
    cell: ReceiveCodeCell,
}

impl OutputRelay {
    pub fn new(job_id: JobId) -> Self {
        Self {
            job_id,
            cell: ReceiveCodeCell::new(),
        }
    }

    pub fn receive_code(&self) -> ReceiveCodeCell {
        self.cell.clone()
    }

    /// Runs until both streams close and the process exits.
    ///
    /// Cancelling `cancel` kills the child; draining continues until the
    /// pipes close so the final outcome is still reported.
    pub async fn run(
        self,
        process: RunningProcess,
        cancel: CancellationToken,
        sink: &dyn EventSink,
    ) -> RelayOutcome {
        let RunningProcess {
            stdout,
            stderr,
            mut control,
        } = process;
        let transcript = Mutex::new(VecDeque::new());
        let mut cancelled = false;

        self.emit(sink, RelayEvent::Stage(RelayStage::Running));
        {
            let drain = async {
                tokio::join!(
                    self.drain(stdout, StreamKind::Stdout, &transcript, sink),
                    self.drain(stderr, StreamKind::Stderr, &transcript, sink),
                )
            };
            tokio::pin!(drain);
            loop {
                tokio::select! {
                    _ = &mut drain => break,
                    _ = cancel.cancelled(), if !cancelled => {
                        cancelled = true;
                        self.kill(&mut control).await;
                    }
                }
            }
        }
        self.emit(sink, RelayEvent::Stage(RelayStage::StreamsClosed));

        // Streams can close before the process exits; keep honouring cancel.
        let waited = if cancelled {
            Some(control.wait().await)
        } else {
            tokio::select! {
                result = control.wait() => Some(result),
                _ = cancel.cancelled() => None,
            }
        };
        let status = match waited {
            Some(result) => result,
            None => {
                cancelled = true;
                self.kill(&mut control).await;
                control.wait().await
            }
        };
        let status = match status {
            Ok(status) => Some(status),
            Err(err) => {
                engine_error!("job {} could not wait for process: {}", self.job_id, err);
                None
            }
        };
        self.emit(
            sink,
            RelayEvent::Stage(RelayStage::ProcessExited {
                status: status.and_then(|status| status.code()),
            }),
        );

        let transcript = transcript
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let outcome = self.resolve(status, cancelled, transcript);
        match &outcome {
            RelayOutcome::Completed { code } => {
                engine_info!("job {} completed: {}", self.job_id, code)
            }
            RelayOutcome::Failed(failure) => {
                engine_warn!("job {} failed: {}", self.job_id, failure.message)
            }
        }
        outcome
    }

    async fn drain<R>(
        &self,
        mut reader: R,
        stream: StreamKind,
        transcript: &Mutex<VecDeque<String>>,
        sink: &dyn EventSink,
    ) where
        R: AsyncBufRead + Unpin,
    {
        let mut buf = Vec::new();
        let mut consecutive_errors = 0;
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    consecutive_errors = 0;
                    let line = String::from_utf8_lossy(&buf)
                        .trim_end_matches(['\r', '\n'])
                        .to_string();
                    self.handle_line(stream, line, transcript, sink);
                }
                Err(err) => {
                    consecutive_errors += 1;
                    engine_warn!("job {} error reading {}: {}", self.job_id, stream, err);
                    if consecutive_errors >= MAX_CONSECUTIVE_READ_ERRORS {
                        engine_error!(
                            "job {} giving up on {} after {} read errors",
                            self.job_id,
                            stream,
                            consecutive_errors
                        );
                        break;
                    }
                }
            }
        }
        engine_debug!("job {} {} closed", self.job_id, stream);
    }

    fn handle_line(
        &self,
        stream: StreamKind,
        line: String,
        transcript: &Mutex<VecDeque<String>>,
        sink: &dyn EventSink,
    ) {
        engine_info!("job {} {}: {}", self.job_id, stream, line);

        if let Ok(mut lines) = transcript.lock() {
            if lines.len() == TRANSCRIPT_LIMIT {
                lines.pop_front();
            }
            lines.push_back(line.clone());
        }

        let captured = match stream {
            StreamKind::Stderr => find_receive_code(&line)
                .filter(|code| self.cell.publish(code))
                .map(ToOwned::to_owned),
            StreamKind::Stdout => None,
        };

        self.emit(sink, RelayEvent::Line { stream, line });
        if let Some(code) = captured {
            engine_info!("job {} captured receive code", self.job_id);
            self.emit(sink, RelayEvent::CodeCaptured(code));
        }
    }

    async fn kill(&self, control: &mut ProcessControl) {
        engine_info!("job {} cancelled; killing pid={:?}", self.job_id, control.id());
        if let Err(err) = control.kill().await {
            engine_warn!("job {} kill failed: {}", self.job_id, err);
        }
    }

    fn resolve(
        &self,
        status: Option<ExitStatus>,
        cancelled: bool,
        transcript: VecDeque<String>,
    ) -> RelayOutcome {
        if let Some(code) = self.cell.get() {
            if let Some(status) = status.filter(|status| !status.success()) {
                engine_warn!(
                    "job {} exited with {} after printing its receive code",
                    self.job_id,
                    status
                );
            }
            return RelayOutcome::Completed { code };
        }

        let err = if cancelled {
            EngineError::Cancelled
        } else {
            match status {
                Some(status) if !status.success() => EngineError::Process {
                    status: status.code(),
                    output: Vec::from(transcript).join("\n"),
                },
                Some(_) => EngineError::Parse("no receive code found in output".to_string()),
                None => EngineError::Parse("process exit status unavailable".to_string()),
            }
        };
        RelayOutcome::Failed(err.into())
    }

    fn emit(&self, sink: &dyn EventSink, event: RelayEvent) {
        sink.emit(EngineEvent::Relay {
            job_id: self.job_id,
            event,
        });
    }
}
