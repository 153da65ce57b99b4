//! Session lifecycle through the engine.

mod common;

use std::sync::Arc;

use common::{MessageBuilder, ServerEvent, TestHarness};
use mailfetch::render::PdfRenderer;
use mailfetch::{EmailError, KeywordFilter, MailConfig, MailEngine, SearchRequest};

fn request() -> SearchRequest {
    SearchRequest::new("INBOX", "ALL", KeywordFilter::parse("invoice"))
}

#[tokio::test]
async fn test_no_connection_until_first_command() {
    let harness = TestHarness::new();
    let engine = harness.engine();

    assert_eq!(harness.server.connect_count(), 0);
    engine.search(&request()).await.unwrap();
    assert_eq!(harness.server.connect_count(), 1);
    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_session_reused_across_commands() {
    let harness = TestHarness::new();
    let id = harness
        .server
        .deliver("INBOX", MessageBuilder::new().subject("invoice").build());
    let engine = harness.engine();

    engine.connect().await.unwrap();
    engine.search(&request()).await.unwrap();
    engine.get_attachments(&id, "INBOX").await.unwrap();
    engine.search(&request()).await.unwrap();

    assert_eq!(harness.server.connect_count(), 1);
    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_closes_then_logs_out() {
    let harness = TestHarness::new();
    let engine = harness.engine();

    engine.search(&request()).await.unwrap();
    engine.shutdown().await.unwrap();

    let events = harness.server.events();
    assert_eq!(
        &events[events.len() - 2..],
        &[ServerEvent::Close, ServerEvent::Logout]
    );
}

#[tokio::test]
async fn test_commands_after_shutdown_fail() {
    let harness = TestHarness::new();
    let engine = harness.engine();
    engine.connect().await.unwrap();
    engine.shutdown().await.unwrap();

    let err = engine.search(&request()).await.unwrap_err();
    assert!(matches!(err, EmailError::SessionClosed));

    let err = engine.get_attachments("1", "INBOX").await.unwrap_err();
    assert!(matches!(err, EmailError::SessionClosed));

    assert_eq!(harness.server.connect_count(), 1);
}

#[tokio::test]
async fn test_second_shutdown_fails() {
    let harness = TestHarness::new();
    let engine = harness.engine();

    engine.shutdown().await.unwrap();
    let err = engine.shutdown().await.unwrap_err();

    assert!(matches!(err, EmailError::SessionClosed));
    assert!(!harness
        .server
        .events()
        .contains(&ServerEvent::Logout));
}

#[tokio::test]
async fn test_rejected_login_is_not_retried() {
    let harness = TestHarness::new();
    harness.server.reject_logins();
    let engine = harness.engine();

    let err = engine.search(&request()).await.unwrap_err();

    assert!(matches!(err, EmailError::Authentication(_)));
    assert_eq!(harness.server.connect_count(), 1);
    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_concurrent_commands_share_one_session() {
    let harness = TestHarness::new();
    for n in 0..3 {
        harness.server.deliver(
            "INBOX",
            MessageBuilder::new().subject(&format!("invoice {}", n)).build(),
        );
    }
    let engine = Arc::new(harness.engine());

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.search(&request()).await })
        })
        .collect();
    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap().len(), 3);
    }

    assert_eq!(harness.server.connect_count(), 1);
    engine.shutdown().await.unwrap();
}

#[test]
fn test_empty_credentials_rejected_at_construction() {
    let harness = TestHarness::new();
    let renderer = Arc::clone(&harness.renderer) as Arc<dyn PdfRenderer>;

    for config in [
        MailConfig::new("imap.example.com", 993, "", "pw"),
        MailConfig::new("imap.example.com", 993, "me@example.com", ""),
    ] {
        let result =
            MailEngine::with_backends(&config, Arc::new(harness.server.clone()), renderer.clone());
        assert!(matches!(result, Err(EmailError::Configuration(_))));
    }
    assert_eq!(harness.server.connect_count(), 0);
}
