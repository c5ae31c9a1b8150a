#![cfg(unix)]

mod support;

use std::fs;

use courier_engine::{
    EngineError, FailureKind, OutputRelay, RelayOutcome, TransferTool,
};
use support::{sh_runner, TestSink};
use tokio_util::sync::CancellationToken;

fn tool(script: &str) -> TransferTool {
    TransferTool::new(sh_runner(script))
}

#[tokio::test]
async fn version_is_trimmed() {
    let version = tool("[ \"$1\" = version ] || exit 9; echo '  runpodctl v1.9.0  '")
        .version()
        .await
        .unwrap();
    assert_eq!(version, "runpodctl v1.9.0");
}

#[tokio::test]
async fn empty_version_is_parse_error() {
    let err = tool("echo '   '").version().await.unwrap_err();
    assert!(matches!(err, EngineError::Parse(_)));
}

#[tokio::test]
async fn api_key_is_passed_as_flag() {
    let configured = tool("[ \"$1\" = config ] && [ \"$2\" = --apiKey=secret-key ] || exit 9");
    configured.configure_api_key("secret-key").await.unwrap();

    let err = configured.configure_api_key("other").await.unwrap_err();
    assert_eq!(err.kind(), FailureKind::Process { status: Some(9) });
}

#[tokio::test]
async fn send_relay_extracts_receive_code() {
    support::init_logging();
    let tool = tool(
        "[ \"$1\" = send ] || exit 9; \
         echo \"Sending '$2' (1.2 KB)\"; \
         echo 'Code is: abcd-1234-efgh' >&2; \
         echo 'On the other computer run' >&2; \
         echo 'runpodctl receive abcd-1234-efgh' >&2",
    );
    let process = tool.start_send(std::path::Path::new("/data/report.csv")).unwrap();
    let sink = TestSink::new();

    let outcome = OutputRelay::new(1)
        .run(process, CancellationToken::new(), &sink)
        .await;
    assert_eq!(
        outcome,
        RelayOutcome::Completed {
            code: "runpodctl receive abcd-1234-efgh".to_string()
        }
    );
}

#[tokio::test]
async fn receive_runs_inside_destination() {
    let dest = tempfile::tempdir().unwrap();
    tool("[ \"$1\" = receive ] && [ \"$2\" = good-code ] || exit 9; echo payload > received.txt")
        .receive("good-code", dest.path())
        .await
        .unwrap();

    assert_eq!(
        fs::read_to_string(dest.path().join("received.txt")).unwrap(),
        "payload\n"
    );
}

#[tokio::test]
async fn rejected_code_reports_tool_output() {
    let dest = tempfile::tempdir().unwrap();
    let err = tool("echo 'Receiving...'; echo 'room not found' >&2; exit 1")
        .receive("not-a-code", dest.path())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), FailureKind::Process { status: Some(1) });
    let message = err.to_string();
    assert!(message.contains("Receiving..."));
    assert!(message.contains("room not found"));
}

#[tokio::test]
async fn receive_into_missing_directory_is_io_error() {
    let temp = tempfile::tempdir().unwrap();
    let err = tool("exit 0")
        .receive("code", &temp.path().join("missing"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::Io);
    assert!(err.to_string().contains("destination is not a directory"));
}
