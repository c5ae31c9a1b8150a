//! Logger setup for the courier binary.
//!
//! Records go to `./courier.log` by default, since a windowed build has no
//! console; `--log terminal` or `--log both` sends them to stderr as well.

use std::path::Path;

use super::settings::AppSettings;

const LOG_FILENAME: &str = "./courier.log";

pub fn initialize(settings: &AppSettings) {
    engine_logging::initialize(
        settings.log_destination.into(),
        settings.level_filter(),
        Path::new(LOG_FILENAME),
    );
}
