//! Newsletter jobs running through the runner against a mocked Postmark API

mod common;

use canvas_jobs::{
    confirmation_email_message, welcome_email_message, EmailAddress, EmailerConfig,
    PostmarkEmailer, Runner,
};
use common::{prometheus_metrics, wait_until, RecordingQueue};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn emailer_for(server: &MockServer) -> Arc<PostmarkEmailer> {
    Arc::new(
        PostmarkEmailer::new(EmailerConfig {
            base_url: "https://canvas.example.com".to_string(),
            api_url: server.uri(),
            token: "server-token".to_string(),
            ..Default::default()
        })
        .unwrap(),
    )
}

#[tokio::test]
async fn test_signup_emails_are_sent_and_acknowledged() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/email"))
        .and(body_partial_json(serde_json::json!({ "MessageStream": "outbound" })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/email"))
        .and(body_partial_json(serde_json::json!({ "MessageStream": "broadcast" })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let queue = Arc::new(RecordingQueue::new());
    let email = EmailAddress::new("me@example.com");
    queue.push(confirmation_email_message(&email, "abc")).await;
    queue.push(welcome_email_message(&email)).await;
    let (metrics, _) = prometheus_metrics();

    let shutdown = CancellationToken::new();
    let runner = Runner::new(queue.clone())
        .with_metrics(metrics.clone())
        .with_emailer(emailer_for(&server));
    let handle = tokio::spawn(runner.start(shutdown.clone()));

    let acknowledged = wait_until(Duration::from_secs(5), || queue.deleted().len() == 2).await;
    shutdown.cancel();
    handle.await.unwrap();

    assert!(acknowledged, "both messages should be deleted");
    assert_eq!(metrics.job_count("confirmation_email", true), 1);
    assert_eq!(metrics.job_count("welcome_email", true), 1);
    server.verify().await;
}

#[tokio::test]
async fn test_rejected_email_leaves_message_on_queue() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/email"))
        .respond_with(ResponseTemplate::new(422).set_body_string("Invalid 'To' address"))
        .mount(&server)
        .await;

    let queue = Arc::new(RecordingQueue::new());
    queue
        .push(welcome_email_message(&EmailAddress::new("me@example.com")))
        .await;
    let (metrics, _) = prometheus_metrics();

    let shutdown = CancellationToken::new();
    let runner = Runner::new(queue.clone())
        .with_metrics(metrics.clone())
        .with_emailer(emailer_for(&server));
    let handle = tokio::spawn(runner.start(shutdown.clone()));

    let failed = wait_until(Duration::from_secs(5), || {
        metrics.job_count("welcome_email", false) == 1
    })
    .await;
    shutdown.cancel();
    handle.await.unwrap();

    assert!(failed, "the welcome job should fail");
    assert!(queue.deleted().is_empty());
    assert_eq!(queue.in_flight(), 1);
}
