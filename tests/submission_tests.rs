mod common;

use std::sync::{Arc, Mutex};

use common::{client_for, files_in, MockReply, MockService, RecordingNotifier};
use transform_client::client::request::validate;
use transform_client::client::response::RoundtripReport;
use transform_client::client::{ClientMetrics, Phase, Session, SubmitOutcome};
use transform_client::common::config::ServiceConfig;
use transform_client::common::error::ValidationError;
use transform_client::{Operation, SelectedFile, SubmitInput};

const ARTIFACT: &[u8] = b"\x8f\x01salt-nonce-ciphertext\x00\xff";

fn photo() -> SelectedFile {
    SelectedFile::new("photo.jpg", b"\xff\xd8\xff\xe0 jpeg bytes".to_vec())
}

fn input(operation: Operation) -> SubmitInput {
    SubmitInput::new(Some(photo()), "correct-horse", operation)
}

#[tokio::test]
async fn test_forward_round_trip_saves_artifact() {
    let service = MockService::start(MockReply::artifact(ARTIFACT, Some("photo.jpg.enc"))).await;
    let dir = tempfile::tempdir().unwrap();
    let notifier = Arc::new(RecordingNotifier::default());
    let client = client_for(service.service_config(10), dir.path(), Arc::clone(&notifier));
    let session = Session::new();

    let outcome = client.submit(&session, input(Operation::Forward)).await;

    let SubmitOutcome::Done(delivered) = &outcome else {
        panic!("expected Done, got {:?}", outcome);
    };
    assert_eq!(delivered.path, dir.path().join("photo.jpg.enc"));
    assert_eq!(std::fs::read(&delivered.path).unwrap(), ARTIFACT);
    assert_eq!(files_in(dir.path()), vec!["photo.jpg.enc"]);

    assert_eq!(session.phase(), Phase::Done);
    assert_eq!(session.status_text(), "Done");
    assert!(!session.is_busy());
    assert!(notifier.alerts().is_empty());
    assert_eq!(client.deliverer().registry().live(), 0);

    let upload = service.last_upload().unwrap();
    assert_eq!(upload.path, "/encrypt");
    assert_eq!(upload.field, "file");
    assert_eq!(upload.file_name.as_deref(), Some("photo.jpg"));
    assert_eq!(upload.bytes, photo().bytes.to_vec());
    assert_eq!(upload.password, "correct-horse");
}

#[tokio::test]
async fn test_large_upload_arrives_intact() {
    let service = MockService::start(MockReply::artifact(ARTIFACT, Some("scan.tiff.enc"))).await;
    let dir = tempfile::tempdir().unwrap();
    let notifier = Arc::new(RecordingNotifier::default());
    let client = client_for(service.service_config(10), dir.path(), Arc::clone(&notifier));
    let session = Session::new();

    let content: Vec<u8> = (0..512 * 1024).map(|i| (i % 251) as u8).collect();
    let file = SelectedFile::new("scan.tiff", content.clone());
    let outcome = client
        .submit(&session, SubmitInput::new(Some(file), "correct-horse", Operation::Forward))
        .await;

    assert!(matches!(outcome, SubmitOutcome::Done(_)), "got {:?}", outcome);
    let upload = service.last_upload().unwrap();
    assert_eq!(upload.file_name.as_deref(), Some("scan.tiff"));
    assert_eq!(upload.bytes.len(), content.len());
    assert_eq!(upload.bytes, content);
}

#[tokio::test]
async fn test_reverse_rejection_reports_detail() {
    let service = MockService::start(MockReply::error(400, br#"{"detail":"wrong password"}"#)).await;
    let dir = tempfile::tempdir().unwrap();
    let notifier = Arc::new(RecordingNotifier::default());
    let client = client_for(service.service_config(10), dir.path(), Arc::clone(&notifier));
    let session = Session::new();

    let outcome = client.submit(&session, input(Operation::Reverse)).await;

    assert_eq!(
        outcome,
        SubmitOutcome::Rejected {
            message: "wrong password".to_string()
        }
    );
    assert_eq!(session.phase(), Phase::Error);
    assert_eq!(session.status_text(), "wrong password");
    assert_eq!(notifier.alerts(), vec!["Error: wrong password"]);
    assert!(files_in(dir.path()).is_empty());
    assert_eq!(service.last_upload().unwrap().path, "/decrypt");
}

#[tokio::test]
async fn test_unparsable_failure_body_uses_status_description() {
    let service = MockService::start(MockReply::error(502, &[0xff, 0xfe, 0x81])).await;
    let dir = tempfile::tempdir().unwrap();
    let client = client_for(service.service_config(10), dir.path(), Arc::default());
    let session = Session::new();

    let outcome = client.submit(&session, input(Operation::Forward)).await;

    assert_eq!(
        outcome,
        SubmitOutcome::Rejected {
            message: "Bad Gateway".to_string()
        }
    );
    assert_eq!(session.status_text(), "Bad Gateway");
}

#[tokio::test]
async fn test_plain_text_failure_body() {
    let service = MockService::start(MockReply::error(500, b"Internal Server Error")).await;
    let dir = tempfile::tempdir().unwrap();
    let client = client_for(service.service_config(10), dir.path(), Arc::default());
    let session = Session::new();

    let outcome = client.submit(&session, input(Operation::Forward)).await;

    assert_eq!(
        outcome,
        SubmitOutcome::Rejected {
            message: "Internal Server Error".to_string()
        }
    );
    assert_eq!(session.phase(), Phase::Error);
}

#[tokio::test]
async fn test_missing_disposition_saves_as_output() {
    let service = MockService::start(MockReply::artifact(ARTIFACT, None)).await;
    let dir = tempfile::tempdir().unwrap();
    let client = client_for(service.service_config(10), dir.path(), Arc::default());
    let session = Session::new();

    client.submit(&session, input(Operation::Forward)).await;
    client.submit(&session, input(Operation::Forward)).await;

    assert_eq!(files_in(dir.path()), vec!["output", "output (1)"]);
    assert_eq!(std::fs::read(dir.path().join("output")).unwrap(), ARTIFACT);
}

#[tokio::test]
async fn test_validation_gate_sends_nothing() {
    let service = MockService::start(MockReply::artifact(ARTIFACT, None)).await;
    let dir = tempfile::tempdir().unwrap();
    let notifier = Arc::new(RecordingNotifier::default());
    let client = client_for(service.service_config(10), dir.path(), Arc::clone(&notifier));
    let session = Session::new();

    let no_file = client
        .submit(&session, SubmitInput::new(None, "correct-horse", Operation::Forward))
        .await;
    assert_eq!(no_file, SubmitOutcome::Invalid(ValidationError::MissingFile));

    let no_password = client
        .submit(&session, SubmitInput::new(Some(photo()), "", Operation::Forward))
        .await;
    assert_eq!(no_password, SubmitOutcome::Invalid(ValidationError::MissingPassword));

    assert_eq!(service.hits(), 0);
    assert_eq!(session.phase(), Phase::Idle);
    assert_eq!(session.status_text(), "Enter password");
    assert_eq!(notifier.alerts(), vec!["Choose a file", "Enter password"]);
}

#[tokio::test]
async fn test_single_flight_rejects_second_submission() {
    let service = MockService::start_gated(MockReply::artifact(ARTIFACT, Some("photo.jpg.enc"))).await;
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(client_for(service.service_config(10), dir.path(), Arc::default()));
    let session = Arc::new(Session::new());

    let first = {
        let client = Arc::clone(&client);
        let session = Arc::clone(&session);
        tokio::spawn(async move { client.submit(&session, input(Operation::Forward)).await })
    };

    service.wait_for_hits(1).await;
    assert_eq!(session.phase(), Phase::Uploading);
    assert_eq!(session.action_label(Operation::Forward), "Working...");

    let second = client.submit(&session, input(Operation::Forward)).await;
    assert_eq!(second, SubmitOutcome::Busy);
    assert_eq!(service.hits(), 1);
    assert_eq!(session.phase(), Phase::Uploading);
    assert_eq!(session.status_text(), "Uploading...");

    service.release();
    let first = first.await.unwrap();
    assert_eq!(first.phase(), Some(Phase::Done));
    assert_eq!(service.hits(), 1);

    // Guard is free again: the next call reaches the service.
    service.release();
    let third = client.submit(&session, input(Operation::Forward)).await;
    assert_eq!(third.phase(), Some(Phase::Done));
    assert_eq!(service.hits(), 2);
}

#[tokio::test]
async fn test_guard_released_after_every_outcome() {
    let service = MockService::start(MockReply::artifact(ARTIFACT, Some("a.enc"))).await;
    let dir = tempfile::tempdir().unwrap();
    let client = client_for(service.service_config(10), dir.path(), Arc::default());
    let session = Session::new();

    let done = client.submit(&session, input(Operation::Forward)).await;
    assert_eq!(done.phase(), Some(Phase::Done));
    assert_eq!(service.hits(), 1);

    service.set_reply(MockReply::error(400, br#"{"detail":"bad password"}"#));
    let rejected = client.submit(&session, input(Operation::Reverse)).await;
    assert_eq!(rejected.phase(), Some(Phase::Error));
    assert_eq!(service.hits(), 2);

    // Nothing listens on the unreachable client's port.
    let unreachable = client_for(
        ServiceConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            request_timeout_secs: 5,
            ..ServiceConfig::default()
        },
        dir.path(),
        Arc::default(),
    );
    let failed = unreachable.submit(&session, input(Operation::Forward)).await;
    assert_eq!(failed.phase(), Some(Phase::Failed));
    assert!(!session.is_busy());

    service.set_reply(MockReply::artifact(ARTIFACT, Some("b.enc")));
    let again = client.submit(&session, input(Operation::Forward)).await;
    assert_eq!(again.phase(), Some(Phase::Done));
    assert_eq!(service.hits(), 3);
}

#[tokio::test]
async fn test_hung_service_times_out() {
    let service = MockService::start_gated(MockReply::artifact(ARTIFACT, None)).await;
    let dir = tempfile::tempdir().unwrap();
    let notifier = Arc::new(RecordingNotifier::default());
    let client = client_for(service.service_config(1), dir.path(), Arc::clone(&notifier));
    let session = Session::new();

    let outcome = client.submit(&session, input(Operation::Forward)).await;

    assert_eq!(
        outcome,
        SubmitOutcome::Failed {
            reason: "request timed out after 1s".to_string()
        }
    );
    assert_eq!(session.phase(), Phase::Failed);
    assert_eq!(session.status_text(), "Upload failed: request timed out after 1s");
    assert_eq!(notifier.alerts(), vec!["Upload failed: request timed out after 1s"]);
    assert!(!session.is_busy());
    assert!(files_in(dir.path()).is_empty());
}

#[tokio::test]
async fn test_cancelled_submission_releases_guard() {
    let service = MockService::start_gated(MockReply::artifact(ARTIFACT, None)).await;
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(client_for(service.service_config(30), dir.path(), Arc::default()));
    let session = Arc::new(Session::new());

    let task = {
        let client = Arc::clone(&client);
        let session = Arc::clone(&session);
        tokio::spawn(async move { client.submit(&session, input(Operation::Forward)).await })
    };

    service.wait_for_hits(1).await;
    assert!(session.is_busy());

    task.abort();
    assert!(task.await.unwrap_err().is_cancelled());

    assert!(!session.is_busy());
    assert_eq!(session.phase(), Phase::Failed);
    assert_eq!(session.status_text(), "Upload failed: submission aborted");
}

#[tokio::test]
async fn test_roundtrip_check() {
    let service = MockService::start(MockReply {
        status: 200,
        headers: vec![("content-type".to_string(), "application/json".to_string())],
        body: br#"{"ok":true}"#.to_vec(),
    })
    .await;
    let dir = tempfile::tempdir().unwrap();
    let client = client_for(service.service_config(10), dir.path(), Arc::default());

    let request = validate(input(Operation::Forward)).unwrap();
    let report = client.check_roundtrip(&request).await.unwrap();

    assert_eq!(report, RoundtripReport::Verified);
    let upload = service.last_upload().unwrap();
    assert_eq!(upload.path, "/roundtrip");
    assert_eq!(upload.field, "content");
    assert_eq!(upload.password, "correct-horse");

    service.set_reply(MockReply::error(400, br#"{"detail":"Roundtrip mismatch"}"#));
    let report = client.check_roundtrip(&request).await.unwrap();
    assert_eq!(
        report,
        RoundtripReport::Rejected {
            message: "Roundtrip mismatch".to_string()
        }
    );
}

#[tokio::test]
async fn test_metrics_cover_each_outcome() {
    let service = MockService::start(MockReply::artifact(ARTIFACT, Some("photo.jpg.enc"))).await;
    let dir = tempfile::tempdir().unwrap();
    let metrics = Arc::new(Mutex::new(ClientMetrics::new("test".to_string())));
    let client = client_for(service.service_config(10), dir.path(), Arc::default())
        .with_metrics(Arc::clone(&metrics));
    let session = Session::new();

    client.submit(&session, input(Operation::Forward)).await;
    service.set_reply(MockReply::error(400, br#"{"detail":"wrong password"}"#));
    client.submit(&session, input(Operation::Reverse)).await;

    let stats = metrics.lock().unwrap().aggregate();
    assert_eq!(stats.total_submissions, 2);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.rejected, 1);
    assert_eq!(stats.bytes_received, ARTIFACT.len());
    assert_eq!(stats.failure_reasons.get("wrong password"), Some(&1));
}
