use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;

use anyhow::Context;
use courier_core::{update, AppState, Msg};
use courier_engine::{is_tool_installed, EngineConfig};
use eframe::egui;
use engine_logging::{engine_debug, engine_info};

use super::cli::Cli;
use super::effects::{EffectRunner, UiEffect};
use super::logging;
use super::settings::{self, SETTINGS_FILENAME};
use super::ui::constants::{MAX_TOASTS, MIN_WINDOW_SIZE, TOAST_SECONDS, WINDOW_SIZE, WINDOW_TITLE};
use super::ui::render::{self, ReceivePrompt};
use super::ui::toasts::Toasts;

pub fn run_app(cli: Cli) -> anyhow::Result<()> {
    let settings_path = cli
        .settings
        .clone()
        .unwrap_or_else(|| PathBuf::from(SETTINGS_FILENAME));
    let (loaded, problem) = settings::load_or_default(&settings_path);
    let settings = loaded.with_overrides(cli.tool_dir.clone(), cli.log);

    logging::initialize(&settings);
    if let Some(err) = &problem {
        settings::warn_unusable(&settings_path, err);
    }
    if cli.write_settings {
        settings::save(&settings_path, &settings)?;
    }

    let cwd = std::env::current_dir().context("reading working directory")?;
    let config = settings.engine_config(&cwd);
    let tool_path = config.tool_path();
    let installed = is_tool_installed(&tool_path);
    engine_info!("tool {:?} installed={}", tool_path, installed);

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size(WINDOW_SIZE)
            .with_min_inner_size(MIN_WINDOW_SIZE)
            .with_title(WINDOW_TITLE),
        ..Default::default()
    };
    eframe::run_native(
        WINDOW_TITLE,
        options,
        Box::new(move |cc| {
            let app = CourierApp::new(cc, config, installed)?;
            Ok(Box::new(app))
        }),
    )
    .map_err(|err| anyhow::anyhow!("window failed: {err}"))?;

    engine_info!("exiting");
    Ok(())
}

/// Owns the state between frames and everything the core does not model.
struct CourierApp {
    state: AppState,
    effects: EffectRunner,
    msg_rx: mpsc::Receiver<Msg>,
    receive_prompt: Option<ReceivePrompt>,
    toasts: Toasts,
    closing: bool,
}

impl CourierApp {
    fn new(
        cc: &eframe::CreationContext<'_>,
        config: EngineConfig,
        installed: bool,
    ) -> anyhow::Result<Self> {
        let (msg_tx, msg_rx) = mpsc::channel::<Msg>();
        let effects = EffectRunner::new(config, msg_tx, cc.egui_ctx.clone())?;
        Ok(Self {
            state: AppState::with_tool_installed(installed),
            effects,
            msg_rx,
            receive_prompt: None,
            toasts: Toasts::new(TOAST_SECONDS, MAX_TOASTS),
            closing: false,
        })
    }

    fn dispatch(&mut self, ctx: &egui::Context, msg: Msg) {
        let state = std::mem::take(&mut self.state);
        let (state, effects) = update(state, msg);
        self.state = state;

        for effect in self.effects.run(effects) {
            match effect {
                UiEffect::CopyToClipboard(text) => ctx.copy_text(text),
                UiEffect::Notify { title, body } => {
                    let now = ctx.input(|i| i.time);
                    self.toasts.push(title, body, now);
                }
                UiEffect::Exit => self.close(ctx),
            }
        }
        if self.state.consume_dirty() {
            ctx.request_repaint();
        }
    }

    fn close(&mut self, ctx: &egui::Context) {
        if self.closing {
            return;
        }
        self.closing = true;
        // Kill effects are already queued; late archive reports are handled
        // by the engine itself.
        self.effects.shutdown();
        ctx.send_viewport_cmd(egui::ViewportCommand::Close);
    }
}

impl eframe::App for CourierApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        while let Ok(msg) = self.msg_rx.try_recv() {
            self.dispatch(ctx, msg);
        }

        if ctx.input(|i| i.viewport().close_requested()) && !self.closing {
            engine_debug!("close requested");
            ctx.send_viewport_cmd(egui::ViewportCommand::CancelClose);
            self.dispatch(ctx, Msg::QuitRequested);
        }
        if self.closing {
            return;
        }

        let view = self.state.view();
        let mut outbox = Vec::new();
        egui::CentralPanel::default().show(ctx, |ui| {
            // Dialogs are modal.
            ui.add_enabled_ui(view.dialog.is_none(), |ui| {
                render::settings_panel(ui, &view, &mut outbox);
                ui.separator();
                render::transfer_panel(ui, &view, &mut self.receive_prompt, &mut outbox);
            });
        });
        if let Some(window) = &view.send_window {
            render::send_window(ctx, window, &mut outbox);
        }
        if view.dialog.is_none() {
            render::receive_prompt(ctx, &mut self.receive_prompt, &mut outbox);
        }
        if let Some(dialog) = &view.dialog {
            render::dialog_window(ctx, dialog, view.pending_dialogs, &mut outbox);
        }

        self.toasts.expire(ctx.input(|i| i.time));
        self.toasts.show(ctx);
        if !self.toasts.is_empty() {
            ctx.request_repaint_after(Duration::from_millis(250));
        }

        for msg in outbox {
            self.dispatch(ctx, msg);
        }
    }
}
