use std::path::{Path, PathBuf};

use courier_core::{
    AppViewModel, ControlState, Dialog, DialogKind, InstallView, Msg, SendStatus, SendWindowView,
};
use eframe::egui::{self, RichText};

use super::constants::{
    DIALOG_ID, KEY_ENTRY_WIDTH, PATH_ENTRY_WIDTH, RECEIVE_PROMPT_ID, SEND_WINDOW_ID,
    SEND_WINDOW_SIZE,
};

/// The receive prompt between picking a destination and entering the code.
/// Lives in the window only; the core sees one `ReceiveRequested`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivePrompt {
    pub dest_dir: PathBuf,
    pub code: String,
}

// Every draw function only reads the view model; user input becomes `Msg`s
// pushed to `outbox`.

pub fn settings_panel(ui: &mut egui::Ui, view: &AppViewModel, outbox: &mut Vec<Msg>) {
    ui.heading("Settings");
    ui.horizontal(|ui| {
        ui.label("API key");
        let mut api_key = view.api_key.clone();
        let entry = egui::TextEdit::singleline(&mut api_key)
            .password(true)
            .desired_width(KEY_ENTRY_WIDTH);
        if ui.add(entry).changed() {
            outbox.push(Msg::ApiKeyChanged(api_key));
        }
        if ui.button("Save API Key").clicked() {
            outbox.push(Msg::SaveApiKeyClicked);
        }
    });
    ui.horizontal(|ui| {
        if ui.button("Version").clicked() {
            outbox.push(Msg::VersionClicked);
        }
        if view.install.button != ControlState::Hidden {
            let enabled = view.install.button == ControlState::Enabled;
            if ui
                .add_enabled(enabled, egui::Button::new("Install runpodctl"))
                .clicked()
            {
                outbox.push(Msg::InstallClicked);
            }
        }
        ui.label(RichText::new(install_status(&view.install)).weak());
    });
    if let Some(percent) = view.install.progress {
        let bar = match percent {
            Some(percent) => egui::ProgressBar::new(progress_fraction(percent)).show_percentage(),
            None => egui::ProgressBar::new(0.0)
                .animate(true)
                .text("downloading..."),
        };
        ui.add(bar);
    }
}

pub fn transfer_panel(
    ui: &mut egui::Ui,
    view: &AppViewModel,
    prompt: &mut Option<ReceivePrompt>,
    outbox: &mut Vec<Msg>,
) {
    ui.heading("Transfer");
    ui.horizontal(|ui| {
        ui.label("Data path");
        let mut data_path = view.data_path.clone();
        let entry = egui::TextEdit::singleline(&mut data_path)
            .hint_text("file or folder to send")
            .desired_width(PATH_ENTRY_WIDTH);
        if ui.add(entry).changed() {
            outbox.push(Msg::DataPathChanged(data_path));
        }
        if view.archive_building {
            ui.spinner();
            ui.label(RichText::new("archiving...").weak());
        }
    });
    ui.horizontal(|ui| {
        if ui.button("Select File").clicked() {
            if let Some(path) = rfd::FileDialog::new().pick_file() {
                outbox.push(Msg::FilePicked(path));
            }
        }
        if ui.button("Select Folder").clicked() {
            if let Some(folder) = rfd::FileDialog::new().pick_folder() {
                outbox.push(Msg::FolderPicked(folder));
            }
        }
        let send_enabled = view.send_button == ControlState::Enabled;
        if ui
            .add_enabled(send_enabled, egui::Button::new("Send"))
            .clicked()
        {
            outbox.push(Msg::SendClicked);
        }

        let receiving = view.receive_button != ControlState::Enabled;
        if ui
            .add_enabled(!receiving && prompt.is_none(), egui::Button::new("Receive"))
            .clicked()
        {
            if let Some(dest_dir) = rfd::FileDialog::new()
                .set_title("Receive into")
                .pick_folder()
            {
                *prompt = Some(ReceivePrompt {
                    dest_dir,
                    code: String::new(),
                });
            }
        }
        if receiving {
            ui.spinner();
            ui.label(RichText::new("receiving...").weak());
        }
    });
}

pub fn send_window(ctx: &egui::Context, window: &SendWindowView, outbox: &mut Vec<Msg>) {
    let mut open = true;
    egui::Window::new(send_window_title(&window.path))
        .id(egui::Id::new(SEND_WINDOW_ID).with(window.job_id))
        .open(&mut open)
        .collapsible(false)
        .resizable(true)
        .default_size(SEND_WINDOW_SIZE)
        .show(ctx, |ui| {
            ui.label(status_text(window));
            ui.horizontal(|ui| {
                let code = window
                    .receive_code
                    .as_deref()
                    .unwrap_or("waiting for receive code...");
                ui.add(egui::Label::new(RichText::new(code).monospace().strong()).selectable(true));
                let copy_enabled = window.copy == ControlState::Enabled;
                if ui
                    .add_enabled(copy_enabled, egui::Button::new("Copy to Clipboard"))
                    .clicked()
                {
                    outbox.push(Msg::CopyReceiveCodeClicked);
                }
            });
            ui.separator();
            if let Some(note) = dropped_lines_note(window) {
                ui.label(RichText::new(note).weak());
            }
            egui::ScrollArea::vertical()
                .stick_to_bottom(true)
                .auto_shrink([false, false])
                .show(ui, |ui| {
                    for line in &window.output_tail {
                        ui.label(RichText::new(line).monospace());
                    }
                });
        });
    if !open {
        outbox.push(Msg::SendWindowClosed);
    }
}

pub fn receive_prompt(
    ctx: &egui::Context,
    prompt: &mut Option<ReceivePrompt>,
    outbox: &mut Vec<Msg>,
) {
    let Some(current) = prompt.as_mut() else {
        return;
    };
    let mut open = true;
    let mut confirmed = None;
    egui::Window::new("Receive")
        .id(egui::Id::new(RECEIVE_PROMPT_ID))
        .open(&mut open)
        .collapsible(false)
        .resizable(false)
        .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
        .show(ctx, |ui| {
            ui.label(format!("Into {}", current.dest_dir.display()));
            let entry = egui::TextEdit::singleline(&mut current.code)
                .hint_text("receive code")
                .desired_width(PATH_ENTRY_WIDTH);
            let response = ui.add(entry);
            let entered = response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
            ui.horizontal(|ui| {
                if ui.button("Receive").clicked() || entered {
                    confirmed = Some(true);
                }
                if ui.button("Cancel").clicked() {
                    confirmed = Some(false);
                }
            });
        });
    if !open {
        confirmed = Some(false);
    }

    match confirmed {
        Some(true) => {
            if let Some(done) = prompt.take() {
                outbox.push(Msg::ReceiveRequested {
                    code: receive_code_from(&done.code),
                    dest_dir: done.dest_dir,
                });
            }
        }
        Some(false) => *prompt = None,
        None => {}
    }
}

pub fn dialog_window(ctx: &egui::Context, dialog: &Dialog, pending: usize, outbox: &mut Vec<Msg>) {
    egui::Window::new(dialog.title.as_str())
        .id(egui::Id::new(DIALOG_ID))
        .collapsible(false)
        .resizable(false)
        .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
        .show(ctx, |ui| {
            let body = RichText::new(&dialog.body);
            let body = match dialog.kind {
                DialogKind::Error => body.color(ui.visuals().error_fg_color),
                DialogKind::Info => body,
            };
            ui.label(body);
            if let Some(note) = queued_note(pending) {
                ui.label(RichText::new(note).weak());
            }
            ui.vertical_centered(|ui| {
                if ui.button("OK").clicked() {
                    outbox.push(Msg::DialogDismissed);
                }
            });
        });
}

fn install_status(install: &InstallView) -> &'static str {
    match (install.button, install.progress) {
        (_, Some(_)) => "installing runpodctl",
        (ControlState::Hidden, None) => "runpodctl installed",
        (_, None) => "runpodctl not found",
    }
}

fn progress_fraction(percent: f64) -> f32 {
    (percent.clamp(0.0, 100.0) / 100.0) as f32
}

fn send_window_title(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    format!("Sending {name}")
}

fn status_text(window: &SendWindowView) -> String {
    match &window.status {
        SendStatus::Running => "Waiting for receive code".to_string(),
        SendStatus::CodeReady => "Waiting for the receiver".to_string(),
        SendStatus::Completed => "Done".to_string(),
        SendStatus::Failed(reason) => format!("Failed: {reason}"),
    }
}

fn dropped_lines_note(window: &SendWindowView) -> Option<String> {
    let dropped = window.output_total.saturating_sub(window.output_tail.len());
    (dropped > 0).then(|| format!("{dropped} earlier lines not shown"))
}

fn queued_note(pending: usize) -> Option<String> {
    (pending > 1).then(|| format!("{} more after this", pending - 1))
}

/// Accepts either the bare code or the whole `runpodctl receive <code>` line.
fn receive_code_from(input: &str) -> String {
    let trimmed = input.trim();
    let mut words = trimmed.split_whitespace();
    match (words.next(), words.next(), words.next(), words.next()) {
        (Some("runpodctl"), Some("receive"), Some(code), None) => code.to_string(),
        _ => trimmed.to_string(),
    }
}
