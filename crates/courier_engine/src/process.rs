use std::ffi::{OsStr, OsString};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use engine_logging::{engine_debug, engine_warn};
use tokio::io::BufReader;
use tokio::process::{Child, ChildStderr, ChildStdout, Command};

use crate::EngineError;

/// Launches the external executable with piped output.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    program: PathBuf,
    leading_args: Vec<OsString>,
}

/// A started child: line readers for both streams plus its control handle.
pub struct RunningProcess {
    pub stdout: BufReader<ChildStdout>,
    pub stderr: BufReader<ChildStderr>,
    pub control: ProcessControl,
}

/// Output of a process that ran to completion.
#[derive(Debug, Clone)]
pub struct CapturedOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CapturedOutput {
    /// Stdout followed by stderr, as shown in error dialogs.
    pub fn combined(&self) -> String {
        let mut combined = self.stdout.clone();
        if !combined.is_empty() && !combined.ends_with('\n') && !self.stderr.is_empty() {
            combined.push('\n');
        }
        combined.push_str(&self.stderr);
        combined
    }
}

impl ProcessRunner {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
        }
    }

    /// Arguments placed before every invocation's own arguments.
    pub fn with_leading_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.leading_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Starts the child with piped stdout/stderr. Must run inside a tokio runtime.
    pub fn spawn<I, S>(&self, args: I, cwd: Option<&Path>) -> Result<RunningProcess, EngineError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut command = self.command(args, cwd)?;
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|err| self.launch_error(&err))?;
        engine_debug!("spawned {:?} pid={:?}", self.program, child.id());

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return Err(EngineError::Launch {
                program: self.program.clone(),
                reason: "child output pipes unavailable".to_string(),
            });
        };

        Ok(RunningProcess {
            stdout: BufReader::new(stdout),
            stderr: BufReader::new(stderr),
            control: ProcessControl {
                child,
                exit: None,
            },
        })
    }

    /// Runs to completion and captures both streams. A non-zero exit is a
    /// `Process` error carrying the combined output.
    pub async fn run_captured<I, S>(
        &self,
        args: I,
        cwd: Option<&Path>,
    ) -> Result<CapturedOutput, EngineError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut command = self.command(args, cwd)?;
        command.stdin(Stdio::null()).kill_on_drop(true);

        let output = command
            .output()
            .await
            .map_err(|err| self.launch_error(&err))?;
        let captured = CapturedOutput {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        check_exit(captured.status, captured.combined())?;
        Ok(captured)
    }

    fn command<I, S>(&self, args: I, cwd: Option<&Path>) -> Result<Command, EngineError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.check_launchable()?;
        let mut command = Command::new(&self.program);
        command.args(&self.leading_args).args(args);
        if let Some(dir) = cwd {
            command.current_dir(dir);
        }
        Ok(command)
    }

    /// Paths (not bare names resolved through PATH) must exist and be executable.
    fn check_launchable(&self) -> Result<(), EngineError> {
        if self.program.components().count() <= 1 && !self.program.is_absolute() {
            return Ok(());
        }
        let metadata = std::fs::metadata(&self.program).map_err(|err| self.launch_error(&err))?;
        if !metadata.is_file() {
            return Err(EngineError::Launch {
                program: self.program.clone(),
                reason: "not a regular file".to_string(),
            });
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if metadata.permissions().mode() & 0o111 == 0 {
                return Err(EngineError::Launch {
                    program: self.program.clone(),
                    reason: "file is not executable".to_string(),
                });
            }
        }
        Ok(())
    }

    fn launch_error(&self, err: &io::Error) -> EngineError {
        let reason = match err.kind() {
            io::ErrorKind::NotFound => "executable not found".to_string(),
            io::ErrorKind::PermissionDenied => "permission denied".to_string(),
            _ => err.to_string(),
        };
        EngineError::Launch {
            program: self.program.clone(),
            reason,
        }
    }
}

/// Wait/kill handle for a spawned child.
pub struct ProcessControl {
    child: Child,
    exit: Option<ExitStatus>,
}

impl ProcessControl {
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Waits for exit. The status is cached, so calling again is fine.
    pub async fn wait(&mut self) -> Result<ExitStatus, EngineError> {
        if let Some(status) = self.exit {
            return Ok(status);
        }
        let status = self.child.wait().await?;
        self.exit = Some(status);
        Ok(status)
    }

    /// Kills the child. Killing a process that already exited is a no-op.
    pub async fn kill(&mut self) -> Result<(), EngineError> {
        if self.exit.is_some() {
            return Ok(());
        }
        if let Ok(Some(status)) = self.child.try_wait() {
            self.exit = Some(status);
            return Ok(());
        }
        match self.child.kill().await {
            Ok(()) => {}
            // Raced with a natural exit.
            Err(err) if err.kind() == io::ErrorKind::InvalidInput => {}
            Err(err) => {
                engine_warn!("failed to kill pid={:?}: {}", self.child.id(), err);
                return Err(err.into());
            }
        }
        if let Ok(Some(status)) = self.child.try_wait() {
            self.exit = Some(status);
        }
        Ok(())
    }
}

/// Turns a non-zero exit status into a `Process` error carrying `output`.
pub fn check_exit(status: ExitStatus, output: String) -> Result<(), EngineError> {
    if status.success() {
        Ok(())
    } else {
        Err(EngineError::Process {
            status: status.code(),
            output,
        })
    }
}
