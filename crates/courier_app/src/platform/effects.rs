use std::sync::{mpsc, Arc};

use anyhow::Context;
use courier_core::{ArchiveSummary, Effect, Failure, FailureKind, Msg};
use courier_engine::{
    ArchiveReport, EngineConfig, EngineEvent, EngineHandle, EventSink, RelayEvent, RelayOutcome,
};
use eframe::egui;
use engine_logging::{engine_debug, engine_info};

/// Effects the window carries out itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEffect {
    CopyToClipboard(String),
    Notify { title: String, body: String },
    Exit,
}

/// Runs effects against the engine; engine events come back as `Msg`.
pub struct EffectRunner {
    engine: EngineHandle,
}

impl EffectRunner {
    pub fn new(
        config: EngineConfig,
        msg_tx: mpsc::Sender<Msg>,
        ctx: egui::Context,
    ) -> anyhow::Result<Self> {
        let engine = EngineHandle::spawn(config, Arc::new(MsgSink { msg_tx, ctx }))
            .context("starting engine worker")?;
        Ok(Self { engine })
    }

    /// Stops the engine after the exit effects were queued.
    pub fn shutdown(&self) {
        self.engine.shutdown();
    }

    /// Hands engine work to the worker and returns what is left for the window.
    pub fn run(&self, effects: Vec<Effect>) -> Vec<UiEffect> {
        let mut left = Vec::new();
        for effect in effects {
            engine_debug!("effect {:?}", effect);
            match route(effect) {
                Ok(ui) => left.push(ui),
                Err(effect) => self.forward(effect),
            }
        }
        left
    }

    fn forward(&self, effect: Effect) {
        match effect {
            Effect::ConfigureApiKey { api_key } => self.engine.configure_api_key(api_key),
            Effect::QueryVersion => self.engine.query_version(),
            Effect::StartInstall => self.engine.install(),
            Effect::BuildArchive { folder } => self.engine.build_archive(folder),
            Effect::StartSend { job_id, path } => {
                engine_info!("StartSend job_id={} path={:?}", job_id, path);
                self.engine.start_send(job_id, path);
            }
            Effect::KillSend { job_id } => self.engine.cancel_send(job_id),
            Effect::DiscardArchive { path } => self.engine.discard_archive(path),
            Effect::StartReceive { code, dest_dir } => self.engine.receive(code, dest_dir),
            Effect::CopyToClipboard { .. } | Effect::Notify { .. } | Effect::Exit => {}
        }
    }
}

/// Splits window effects from engine effects.
pub(crate) fn route(effect: Effect) -> Result<UiEffect, Effect> {
    match effect {
        Effect::CopyToClipboard { text } => Ok(UiEffect::CopyToClipboard(text)),
        Effect::Notify { title, body } => Ok(UiEffect::Notify { title, body }),
        Effect::Exit => Ok(UiEffect::Exit),
        other => Err(other),
    }
}

/// Forwards engine events into the UI message channel and wakes the window.
struct MsgSink {
    msg_tx: mpsc::Sender<Msg>,
    ctx: egui::Context,
}

impl EventSink for MsgSink {
    fn emit(&self, event: EngineEvent) {
        if let Some(msg) = translate(event) {
            // The receiver is gone once the app is exiting.
            if self.msg_tx.send(msg).is_ok() {
                self.ctx.request_repaint();
            }
        }
    }
}

pub(crate) fn translate(event: EngineEvent) -> Option<Msg> {
    let msg = match event {
        EngineEvent::ApiKeyConfigured(result) => Msg::ApiKeySaved(result.map_err(to_failure)),
        EngineEvent::VersionReported(result) => Msg::VersionReported(result.map_err(to_failure)),
        EngineEvent::InstallProgress(progress) => Msg::InstallProgress {
            percent: progress.percent,
        },
        EngineEvent::InstallFinished(result) => Msg::InstallFinished(result.map_err(to_failure)),
        EngineEvent::ArchiveBuilt { folder, result } => Msg::ArchiveBuilt {
            folder,
            result: result.map(summarize).map_err(to_failure),
        },
        EngineEvent::Relay { job_id, event } => match event {
            RelayEvent::Line { line, .. } => Msg::SendOutput { job_id, line },
            RelayEvent::CodeCaptured(code) => Msg::ReceiveCodeCaptured { job_id, code },
            RelayEvent::Stage(stage) => {
                engine_debug!("job {} stage {:?}", job_id, stage);
                return None;
            }
        },
        EngineEvent::SendFinished { job_id, outcome } => Msg::SendFinished {
            job_id,
            result: match outcome {
                RelayOutcome::Completed { code } => Ok(code),
                RelayOutcome::Failed(failure) => Err(to_failure(failure)),
            },
        },
        EngineEvent::ReceiveFinished(result) => Msg::ReceiveFinished(result.map_err(to_failure)),
    };
    Some(msg)
}

fn to_failure(failure: courier_engine::Failure) -> Failure {
    let kind = match failure.kind {
        courier_engine::FailureKind::Launch => FailureKind::Launch,
        courier_engine::FailureKind::Process { .. } => FailureKind::Process,
        courier_engine::FailureKind::Io => FailureKind::Io,
        courier_engine::FailureKind::Network => FailureKind::Network,
        courier_engine::FailureKind::Parse => FailureKind::Parse,
        courier_engine::FailureKind::Cancelled => FailureKind::Cancelled,
    };
    Failure::new(kind, failure.message)
}

fn summarize(report: ArchiveReport) -> ArchiveSummary {
    ArchiveSummary {
        entries: report.entries.len(),
        skipped: report
            .skipped
            .into_iter()
            .map(|entry| format!("{}: {}", entry.path.display(), entry.reason))
            .collect(),
        path: report.path,
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use courier_engine::{InstallProgress, SkippedEntry, StreamKind};
    use pretty_assertions::assert_eq;

    use super::*;

    fn engine_failure(kind: courier_engine::FailureKind, message: &str) -> courier_engine::Failure {
        courier_engine::Failure {
            kind,
            message: message.to_string(),
        }
    }

    #[test]
    fn relay_lines_and_codes_become_send_messages() {
        assert_eq!(
            translate(EngineEvent::Relay {
                job_id: 4,
                event: RelayEvent::Line {
                    stream: StreamKind::Stderr,
                    line: "Code is: abcd".to_string(),
                },
            }),
            Some(Msg::SendOutput {
                job_id: 4,
                line: "Code is: abcd".to_string()
            })
        );
        assert_eq!(
            translate(EngineEvent::Relay {
                job_id: 4,
                event: RelayEvent::CodeCaptured("runpodctl receive abcd".to_string()),
            }),
            Some(Msg::ReceiveCodeCaptured {
                job_id: 4,
                code: "runpodctl receive abcd".to_string()
            })
        );
        assert_eq!(
            translate(EngineEvent::Relay {
                job_id: 4,
                event: RelayEvent::Stage(courier_engine::RelayStage::StreamsClosed),
            }),
            None
        );
    }

    #[test]
    fn send_outcomes_map_to_results() {
        assert_eq!(
            translate(EngineEvent::SendFinished {
                job_id: 1,
                outcome: RelayOutcome::Completed {
                    code: "runpodctl receive x-1".to_string()
                },
            }),
            Some(Msg::SendFinished {
                job_id: 1,
                result: Ok("runpodctl receive x-1".to_string())
            })
        );
        assert_eq!(
            translate(EngineEvent::SendFinished {
                job_id: 1,
                outcome: RelayOutcome::Failed(engine_failure(
                    courier_engine::FailureKind::Process { status: Some(2) },
                    "process exited with status 2",
                )),
            }),
            Some(Msg::SendFinished {
                job_id: 1,
                result: Err(Failure::new(
                    FailureKind::Process,
                    "process exited with status 2"
                ))
            })
        );
    }

    #[test]
    fn archive_report_is_summarized() {
        let msg = translate(EngineEvent::ArchiveBuilt {
            folder: PathBuf::from("/data/set"),
            result: Ok(ArchiveReport {
                path: PathBuf::from("/stage/set.zip"),
                entries: vec!["a.txt".to_string(), "sub/b.txt".to_string()],
                skipped: vec![SkippedEntry {
                    path: PathBuf::from("/data/set/locked"),
                    reason: "permission denied".to_string(),
                }],
            }),
        });
        assert_eq!(
            msg,
            Some(Msg::ArchiveBuilt {
                folder: PathBuf::from("/data/set"),
                result: Ok(ArchiveSummary {
                    path: PathBuf::from("/stage/set.zip"),
                    entries: 2,
                    skipped: vec!["/data/set/locked: permission denied".to_string()],
                }),
            })
        );
    }

    #[test]
    fn install_progress_keeps_percent() {
        let msg = translate(EngineEvent::InstallProgress(InstallProgress {
            received: 10,
            total: None,
            percent: None,
        }));
        assert_eq!(msg, Some(Msg::InstallProgress { percent: None }));
    }

    #[test]
    fn window_effects_stay_with_the_window() {
        assert_eq!(
            route(Effect::CopyToClipboard {
                text: "runpodctl receive abcd".to_string()
            }),
            Ok(UiEffect::CopyToClipboard("runpodctl receive abcd".to_string()))
        );
        assert_eq!(
            route(Effect::Notify {
                title: "Done".to_string(),
                body: "sent".to_string()
            }),
            Ok(UiEffect::Notify {
                title: "Done".to_string(),
                body: "sent".to_string()
            })
        );
        assert_eq!(route(Effect::Exit), Ok(UiEffect::Exit));
    }

    #[test]
    fn engine_effects_go_to_the_worker() {
        let discard = Effect::DiscardArchive {
            path: PathBuf::from("/stage/set-1.zip"),
        };
        assert_eq!(route(discard.clone()), Err(discard));
        assert_eq!(route(Effect::QueryVersion), Err(Effect::QueryVersion));
    }
}
