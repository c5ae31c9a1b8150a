use std::path::PathBuf;

use crate::{AppState, Effect, FailureKind, InstallState, Msg};

/// Pure update function: applies a message to state and returns any effects.
pub fn update(mut state: AppState, msg: Msg) -> (AppState, Vec<Effect>) {
    if state.is_quitting() {
        // A build that finishes after quit still leaves a file behind.
        let effects = match msg {
            Msg::ArchiveBuilt {
                result: Ok(summary),
                ..
            } => vec![Effect::DiscardArchive { path: summary.path }],
            _ => Vec::new(),
        };
        return (state, effects);
    }

    let effects = match msg {
        Msg::ApiKeyChanged(text) => {
            state.set_api_key(text);
            Vec::new()
        }
        Msg::SaveApiKeyClicked => {
            let api_key = state.api_key().trim().to_string();
            if api_key.is_empty() {
                state.show_error("please enter an API key");
                Vec::new()
            } else {
                vec![Effect::ConfigureApiKey { api_key }]
            }
        }
        Msg::ApiKeySaved(result) => {
            match result {
                Ok(()) => state.show_info("Success", "API key configured successfully"),
                Err(failure) => state.show_error(failure.message),
            }
            Vec::new()
        }
        Msg::VersionClicked => vec![Effect::QueryVersion],
        Msg::VersionReported(result) => {
            match result {
                Ok(version) => state.show_info("Version", version),
                Err(failure) => state.show_error(failure.message),
            }
            Vec::new()
        }
        Msg::InstallClicked => match state.install_state() {
            InstallState::Missing | InstallState::Failed => {
                state.begin_install();
                vec![Effect::StartInstall]
            }
            InstallState::Installing { .. } | InstallState::Installed => Vec::new(),
        },
        Msg::InstallProgress { percent } => {
            state.apply_install_progress(percent);
            Vec::new()
        }
        Msg::InstallFinished(result) => {
            if !matches!(state.install_state(), InstallState::Installing { .. }) {
                return (state, Vec::new());
            }
            match result {
                Ok(_) => {
                    state.finish_install(true);
                    state.show_info("Success", "runpodctl installed successfully");
                }
                Err(failure) => {
                    // The install control comes back so the user can retry.
                    state.finish_install(false);
                    state.show_error(format!("install failed: {}", failure.message));
                }
            }
            Vec::new()
        }
        Msg::DataPathChanged(text) => {
            let mut effects = Vec::new();
            if text != state.data_path() {
                effects.extend(discard_unclaimed_archive(&mut state));
            }
            state.set_data_path(text);
            effects
        }
        Msg::FilePicked(path) => {
            let effects = discard_unclaimed_archive(&mut state);
            state.set_data_path(path.display().to_string());
            effects
        }
        Msg::FolderPicked(folder) => {
            let mut effects = discard_unclaimed_archive(&mut state);
            state.begin_archive(folder.clone());
            effects.push(Effect::BuildArchive { folder });
            effects
        }
        Msg::ArchiveBuilt { folder, result } => {
            if !state.is_building_archive_for(&folder) {
                // A newer pick superseded this build.
                return match result {
                    Ok(summary) => (state, vec![Effect::DiscardArchive { path: summary.path }]),
                    Err(_) => (state, Vec::new()),
                };
            }
            match result {
                Ok(summary) => {
                    state.set_data_path(summary.path.display().to_string());
                    state.archive_ready(summary.path);
                    if summary.skipped.is_empty() {
                        Vec::new()
                    } else {
                        vec![Effect::Notify {
                            title: "Archive".to_string(),
                            body: format!(
                                "{} files archived, {} unreadable entries skipped",
                                summary.entries,
                                summary.skipped.len()
                            ),
                        }]
                    }
                }
                Err(failure) => {
                    state.archive_failed();
                    state.show_error(failure.message);
                    Vec::new()
                }
            }
        }
        Msg::SendClicked => {
            let path = state.data_path().trim().to_string();
            if path.is_empty() {
                state.show_error("please select a file or folder to send");
                Vec::new()
            } else if state.send_open() {
                state.show_error("a send is already in progress; close its window first");
                Vec::new()
            } else {
                let path = PathBuf::from(path);
                let job_id = state.open_send(path.clone());
                vec![Effect::StartSend { job_id, path }]
            }
        }
        Msg::SendOutput { job_id, line } => {
            state.push_send_output(job_id, line);
            Vec::new()
        }
        Msg::ReceiveCodeCaptured { job_id, code } => {
            state.capture_receive_code(job_id, code);
            Vec::new()
        }
        Msg::SendFinished { job_id, result } => {
            if !state.finish_send(job_id, &result) {
                return (state, Vec::new());
            }
            match result {
                Ok(code) => vec![Effect::Notify {
                    title: "Done".to_string(),
                    body: code,
                }],
                Err(failure) if failure.kind == FailureKind::Cancelled => Vec::new(),
                Err(failure) => {
                    state.show_error(failure.message);
                    Vec::new()
                }
            }
        }
        Msg::SendWindowClosed => close_send_window(&mut state),
        Msg::CopyReceiveCodeClicked => match state.receive_code() {
            Some(code) => vec![Effect::CopyToClipboard {
                text: code.to_string(),
            }],
            None => Vec::new(),
        },
        Msg::ReceiveRequested { dest_dir, code } => {
            let code = code.trim().to_string();
            if code.is_empty() || state.receive_in_flight() {
                Vec::new()
            } else {
                state.set_receive_in_flight(true);
                vec![Effect::StartReceive { code, dest_dir }]
            }
        }
        Msg::ReceiveFinished(result) => {
            state.set_receive_in_flight(false);
            match result {
                Ok(()) => state.show_info("Success", "Data received successfully."),
                Err(failure) => state.show_error(failure.message),
            }
            Vec::new()
        }
        Msg::DialogDismissed => {
            state.dismiss_dialog();
            Vec::new()
        }
        Msg::QuitRequested => {
            let mut effects = close_send_window(&mut state);
            effects.extend(discard_unclaimed_archive(&mut state));
            state.set_quitting();
            effects.push(Effect::Exit);
            effects
        }
    };

    (state, effects)
}

fn discard_unclaimed_archive(state: &mut AppState) -> Vec<Effect> {
    state
        .take_unclaimed_archive()
        .map(|path| Effect::DiscardArchive { path })
        .into_iter()
        .collect()
}

fn close_send_window(state: &mut AppState) -> Vec<Effect> {
    let running = state.send_is_running();
    let Some((job_id, archive)) = state.close_send() else {
        return Vec::new();
    };
    let mut effects = Vec::new();
    if running {
        effects.push(Effect::KillSend { job_id });
    }
    if let Some(path) = archive {
        effects.push(Effect::DiscardArchive { path });
    }
    effects
}
