#![cfg(unix)]

mod support;

use std::time::Duration;

use courier_engine::{
    FailureKind, OutputRelay, RelayEvent, RelayOutcome, RelayStage, StreamKind,
};
use pretty_assertions::assert_eq;
use support::{sh_runner, TestSink};
use tokio_util::sync::CancellationToken;

async fn relay(script: &str, sink: &TestSink) -> RelayOutcome {
    support::init_logging();
    let process = sh_runner(script)
        .spawn(["send", "payload.bin"], None)
        .expect("spawn");
    OutputRelay::new(7)
        .run(process, CancellationToken::new(), sink)
        .await
}

fn captured_codes(events: &[RelayEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            RelayEvent::CodeCaptured(code) => Some(code.clone()),
            _ => None,
        })
        .collect()
}

fn stages(events: &[RelayEvent]) -> Vec<RelayStage> {
    events
        .iter()
        .filter_map(|event| match event {
            RelayEvent::Stage(stage) => Some(*stage),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn first_stderr_code_wins() {
    let sink = TestSink::new();
    let outcome = relay(
        "echo \"Sending '$2'\"; \
         echo 'Code is: 8338-galileo' >&2; \
         echo 'runpodctl receive 8338-galileo-collect' >&2; \
         echo 'runpodctl receive other-code' >&2",
        &sink,
    )
    .await;

    assert_eq!(
        outcome,
        RelayOutcome::Completed {
            code: "runpodctl receive 8338-galileo-collect".to_string()
        }
    );
    let events = sink.relay_events();
    assert_eq!(
        captured_codes(&events),
        vec!["runpodctl receive 8338-galileo-collect".to_string()]
    );
}

#[tokio::test]
async fn every_line_is_relayed_in_stream_order() {
    let sink = TestSink::new();
    relay(
        "echo out-1; echo err-1 >&2; echo out-2; printf 'err-2\\r\\n' >&2",
        &sink,
    )
    .await;

    let events = sink.relay_events();
    let lines = |wanted: StreamKind| {
        events
            .iter()
            .filter_map(|event| match event {
                RelayEvent::Line { stream, line } if *stream == wanted => Some(line.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
    };
    assert_eq!(lines(StreamKind::Stdout), vec!["out-1", "out-2"]);
    assert_eq!(lines(StreamKind::Stderr), vec!["err-1", "err-2"]);
}

#[tokio::test]
async fn stages_progress_in_order() {
    let sink = TestSink::new();
    relay("echo hello", &sink).await;

    let events = sink.relay_events();
    assert_eq!(events.first(), Some(&RelayEvent::Stage(RelayStage::Running)));
    assert_eq!(
        stages(&events),
        vec![
            RelayStage::Running,
            RelayStage::StreamsClosed,
            RelayStage::ProcessExited { status: Some(0) },
        ]
    );
}

#[tokio::test]
async fn code_on_stdout_is_not_captured() {
    let sink = TestSink::new();
    let outcome = relay("echo 'runpodctl receive on-stdout'", &sink).await;

    match outcome {
        RelayOutcome::Failed(failure) => {
            assert_eq!(failure.kind, FailureKind::Parse);
            assert_eq!(failure.message, "no receive code found in output");
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert!(captured_codes(&sink.relay_events()).is_empty());
}

#[tokio::test]
async fn silent_process_resolves_without_hanging() {
    let sink = TestSink::new();
    let outcome = tokio::time::timeout(Duration::from_secs(10), relay("exit 0", &sink))
        .await
        .expect("relay finishes");
    assert!(matches!(
        outcome,
        RelayOutcome::Failed(ref failure) if failure.kind == FailureKind::Parse
    ));
}

#[tokio::test]
async fn non_zero_exit_without_code_reports_transcript() {
    let sink = TestSink::new();
    let outcome = relay("echo 'file not found: payload.bin' >&2; exit 2", &sink).await;

    match outcome {
        RelayOutcome::Failed(failure) => {
            assert_eq!(failure.kind, FailureKind::Process { status: Some(2) });
            assert!(failure.message.contains("file not found: payload.bin"));
        }
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[tokio::test]
async fn captured_code_survives_non_zero_exit() {
    let sink = TestSink::new();
    let outcome = relay("echo 'runpodctl receive abcd-1234' >&2; exit 1", &sink).await;

    assert_eq!(
        outcome,
        RelayOutcome::Completed {
            code: "runpodctl receive abcd-1234".to_string()
        }
    );
    assert!(stages(&sink.relay_events())
        .contains(&RelayStage::ProcessExited { status: Some(1) }));
}

#[tokio::test]
async fn cancel_kills_process_and_reports_cancelled() {
    support::init_logging();
    let sink = TestSink::new();
    let process = sh_runner("echo waiting >&2; exec sleep 30")
        .spawn(["send", "payload.bin"], None)
        .expect("spawn");
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let outcome = tokio::time::timeout(
        Duration::from_secs(10),
        OutputRelay::new(3).run(process, cancel, &sink),
    )
    .await
    .expect("cancelled relay finishes");

    match outcome {
        RelayOutcome::Failed(failure) => assert_eq!(failure.kind, FailureKind::Cancelled),
        other => panic!("unexpected outcome {other:?}"),
    }
    assert!(stages(&sink.relay_events())
        .contains(&RelayStage::ProcessExited { status: None }));
}

#[tokio::test]
async fn cancel_after_code_still_completes() {
    support::init_logging();
    let sink = TestSink::new();
    let process = sh_runner("echo 'runpodctl receive keep-me' >&2; exec sleep 30")
        .spawn(["send", "payload.bin"], None)
        .expect("spawn");
    let relay = OutputRelay::new(4);
    let code = relay.receive_code();
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    let watcher = code.clone();
    tokio::spawn(async move {
        while watcher.get().is_none() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        trigger.cancel();
    });

    let outcome = tokio::time::timeout(Duration::from_secs(10), relay.run(process, cancel, &sink))
        .await
        .expect("relay finishes");
    assert_eq!(
        outcome,
        RelayOutcome::Completed {
            code: "runpodctl receive keep-me".to_string()
        }
    );
    assert_eq!(code.get().as_deref(), Some("runpodctl receive keep-me"));
}
