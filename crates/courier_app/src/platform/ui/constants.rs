pub const WINDOW_TITLE: &str = "Courier";
pub const WINDOW_SIZE: [f32; 2] = [640.0, 440.0];
pub const MIN_WINDOW_SIZE: [f32; 2] = [480.0, 320.0];

pub const SEND_WINDOW_ID: &str = "send_window";
pub const SEND_WINDOW_SIZE: [f32; 2] = [520.0, 360.0];
pub const DIALOG_ID: &str = "dialog";
pub const RECEIVE_PROMPT_ID: &str = "receive_prompt";
pub const TOAST_AREA_ID: &str = "toasts";

pub const PATH_ENTRY_WIDTH: f32 = 340.0;
pub const KEY_ENTRY_WIDTH: f32 = 280.0;

/// Seconds a notification stays on screen.
pub const TOAST_SECONDS: f64 = 4.0;
pub const MAX_TOASTS: usize = 4;
