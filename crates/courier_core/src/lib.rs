//! Courier core: pure state machine and view-model helpers.
mod effect;
mod msg;
mod state;
mod update;
mod view_model;

pub use effect::Effect;
pub use msg::{ArchiveSummary, Msg};
pub use state::{AppState, Failure, FailureKind, InstallState, JobId, SendStatus};
pub use update::update;
pub use view_model::{
    AppViewModel, ControlState, Dialog, DialogKind, InstallView, SendWindowView,
    OUTPUT_TAIL_LIMIT,
};
