#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use courier_engine::{EngineEvent, EventSink, ProcessRunner, RelayEvent};

#[derive(Default, Clone)]
pub struct TestSink {
    events: Arc<Mutex<Vec<EngineEvent>>>,
}

impl TestSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<EngineEvent> {
        self.events.lock().unwrap().drain(..).collect()
    }

    /// Relay events only, in emission order.
    pub fn relay_events(&self) -> Vec<RelayEvent> {
        self.take()
            .into_iter()
            .filter_map(|event| match event {
                EngineEvent::Relay { event, .. } => Some(event),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for TestSink {
    fn emit(&self, event: EngineEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Runs `script` through `sh -c`, with `$0` set to `runpodctl` and the
/// invocation's arguments as `$1..`.
pub fn sh_runner(script: &str) -> ProcessRunner {
    ProcessRunner::new("/bin/sh").with_leading_args(["-c", script, "runpodctl"])
}

pub fn init_logging() {
    engine_logging::initialize_for_tests();
}
