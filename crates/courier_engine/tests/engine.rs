#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::time::{Duration, Instant};

use courier_engine::{
    ChannelEventSink, EngineConfig, EngineEvent, EngineHandle, FailureKind, RelayOutcome,
};
use pretty_assertions::assert_eq;

const FAKE_TOOL: &str = r#"#!/bin/sh
case "$1" in
  version) echo "runpodctl v1.9.0-test" ;;
  config) [ "$2" = "--apiKey=secret" ] || exit 4 ;;
  send)
    case "$2" in
      */slow.bin) echo "waiting" >&2; exec sleep 30 ;;
    esac
    echo "Sending '$2'"
    echo "Code is: 8338-galileo-collect" >&2
    echo "runpodctl receive 8338-galileo-collect" >&2
    ;;
  receive)
    if [ "$2" = "good-code" ]; then
      echo payload > received.txt
    else
      echo "room not found" >&2
      exit 1
    fi
    ;;
  *) exit 2 ;;
esac
"#;

fn next_event<F>(rx: &Receiver<EngineEvent>, mut wanted: F) -> EngineEvent
where
    F: FnMut(&EngineEvent) -> bool,
{
    let deadline = Instant::now() + Duration::from_secs(15);
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let event = rx.recv_timeout(remaining).expect("engine event before deadline");
        if wanted(&event) {
            return event;
        }
    }
}

fn install_fake_tool(dir: &Path) {
    let path = dir.join("runpodctl");
    fs::write(&path, FAKE_TOOL).unwrap();
    let mut permissions = fs::metadata(&path).unwrap().permissions();
    permissions.set_mode(0o755);
    fs::set_permissions(&path, permissions).unwrap();
}

// One test drives the whole worker so the fake tool is written before any
// process in this binary is spawned.
#[test]
fn engine_drives_the_tool_end_to_end() {
    engine_logging::initialize_for_tests();
    let temp = tempfile::tempdir().unwrap();
    let tool_dir = temp.path().join("bin");
    fs::create_dir_all(&tool_dir).unwrap();
    install_fake_tool(&tool_dir);

    let mut config = EngineConfig::default_in(tool_dir.clone());
    config.executable_name = "runpodctl".to_string();
    config.staging_dir = temp.path().join("staging");

    let (tx, rx) = mpsc::channel();
    let engine = EngineHandle::spawn(config, Arc::new(ChannelEventSink::new(tx))).unwrap();

    engine.query_version();
    let event = next_event(&rx, |event| matches!(event, EngineEvent::VersionReported(_)));
    assert_eq!(
        event,
        EngineEvent::VersionReported(Ok("runpodctl v1.9.0-test".to_string()))
    );

    engine.configure_api_key("secret");
    let event = next_event(&rx, |event| matches!(event, EngineEvent::ApiKeyConfigured(_)));
    assert_eq!(event, EngineEvent::ApiKeyConfigured(Ok(())));

    let folder = temp.path().join("dataset");
    fs::create_dir_all(folder.join("nested")).unwrap();
    fs::write(folder.join("a.txt"), "a").unwrap();
    fs::write(folder.join("nested").join("b.txt"), "b").unwrap();
    engine.build_archive(folder.clone());
    let archive = match next_event(&rx, |event| matches!(event, EngineEvent::ArchiveBuilt { .. })) {
        EngineEvent::ArchiveBuilt { folder: built, result } => {
            assert_eq!(built, folder);
            let report = result.expect("archive built");
            assert_eq!(report.entries, vec!["a.txt", "nested/b.txt"]);
            report.path
        }
        other => panic!("unexpected event {other:?}"),
    };

    engine.start_send(1, archive.clone());
    let event = next_event(&rx, |event| matches!(event, EngineEvent::SendFinished { .. }));
    assert_eq!(
        event,
        EngineEvent::SendFinished {
            job_id: 1,
            outcome: RelayOutcome::Completed {
                code: "runpodctl receive 8338-galileo-collect".to_string()
            },
        }
    );

    engine.start_send(2, temp.path().join("slow.bin"));
    engine.cancel_send(2);
    match next_event(&rx, |event| matches!(event, EngineEvent::SendFinished { .. })) {
        EngineEvent::SendFinished {
            job_id: 2,
            outcome: RelayOutcome::Failed(failure),
        } => assert_eq!(failure.kind, FailureKind::Cancelled),
        other => panic!("unexpected event {other:?}"),
    }

    let dest = temp.path().join("inbox");
    fs::create_dir_all(&dest).unwrap();
    engine.receive("good-code", dest.clone());
    let event = next_event(&rx, |event| matches!(event, EngineEvent::ReceiveFinished(_)));
    assert_eq!(event, EngineEvent::ReceiveFinished(Ok(())));
    assert!(dest.join("received.txt").exists());

    engine.receive("bad-code", dest.clone());
    match next_event(&rx, |event| matches!(event, EngineEvent::ReceiveFinished(_))) {
        EngineEvent::ReceiveFinished(Err(failure)) => {
            assert_eq!(failure.kind, FailureKind::Process { status: Some(1) });
            assert!(failure.message.contains("room not found"));
        }
        other => panic!("unexpected event {other:?}"),
    }

    engine.discard_archive(archive.clone());
    let deadline = Instant::now() + Duration::from_secs(5);
    while archive.exists() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(20));
    }
    assert!(!archive.exists());

    // Same-named folders get separate archives.
    let mut leftovers = Vec::new();
    for parent in ["left", "right"] {
        let folder = temp.path().join(parent).join("dataset");
        fs::create_dir_all(&folder).unwrap();
        fs::write(folder.join("c.txt"), parent).unwrap();
        engine.build_archive(folder);
        match next_event(&rx, |event| matches!(event, EngineEvent::ArchiveBuilt { .. })) {
            EngineEvent::ArchiveBuilt {
                result: Ok(report), ..
            } => leftovers.push(report.path),
            other => panic!("unexpected event {other:?}"),
        }
    }
    assert_ne!(leftovers[0], leftovers[1]);
    assert!(leftovers.iter().all(|path| path.exists()));

    // Shutdown cancels a send that is still waiting for its peer and deletes
    // archives nobody discarded, including one still being built.
    engine.start_send(3, temp.path().join("slow.bin"));
    engine.build_archive(folder.clone());
    engine.shutdown();
    assert!(leftovers.iter().all(|path| !path.exists()));
    let zips = fs::read_dir(temp.path().join("staging"))
        .unwrap()
        .filter(|entry| {
            entry
                .as_ref()
                .unwrap()
                .path()
                .extension()
                .is_some_and(|ext| ext == "zip")
        })
        .count();
    assert_eq!(zips, 0);
    match next_event(&rx, |event| matches!(event, EngineEvent::SendFinished { .. })) {
        EngineEvent::SendFinished {
            job_id: 3,
            outcome: RelayOutcome::Failed(failure),
        } => assert_eq!(failure.kind, FailureKind::Cancelled),
        other => panic!("unexpected event {other:?}"),
    }
}
