//! Tests for the job registry.

use super::*;
use std::sync::atomic::{AtomicU32, Ordering};

struct CountingJob {
    runs: Arc<AtomicU32>,
}

#[async_trait]
impl JobHandler for CountingJob {
    async fn run(&self, _context: JobContext, _message: JobMessage) -> Result<(), JobError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn context(name: &str) -> JobContext {
    JobContext::new(CancellationToken::new(), name, 1)
}

#[tokio::test]
async fn test_register_and_run_struct_handler() {
    let runs = Arc::new(AtomicU32::new(0));
    let mut registry = JobRegistry::new();
    registry.register("count", CountingJob { runs: runs.clone() });

    let handler = registry.get("count").expect("handler should be registered");
    handler
        .run(context("count"), JobMessage::for_job("count"))
        .await
        .unwrap();

    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_closure_handler() {
    let mut registry = JobRegistry::new();
    registry.register("echo", |context: JobContext, message: JobMessage| async move {
        assert_eq!(context.job_name(), "echo");
        match message.get("foo") {
            Some("bar") => Ok(()),
            _ => Err(JobError::failed("foo was not bar")),
        }
    });

    let handler = registry.get("echo").unwrap();
    let ok = handler
        .run(context("echo"), JobMessage::for_job("echo").with_field("foo", "bar"))
        .await;
    let failed = handler
        .run(context("echo"), JobMessage::for_job("echo"))
        .await;

    assert!(ok.is_ok());
    assert!(matches!(failed, Err(JobError::Failed { .. })));
}

#[test]
fn test_missing_name_is_not_an_error() {
    let registry = JobRegistry::new();
    assert!(registry.get("nope").is_none());
    assert!(!registry.contains("nope"));
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_register_overwrites() {
    let first = Arc::new(AtomicU32::new(0));
    let second = Arc::new(AtomicU32::new(0));
    let mut registry = JobRegistry::new();

    registry.register("job", CountingJob { runs: first.clone() });
    registry.register("job", CountingJob { runs: second.clone() });
    assert_eq!(registry.len(), 1);

    registry
        .get("job")
        .unwrap()
        .run(context("job"), JobMessage::for_job("job"))
        .await
        .unwrap();

    assert_eq!(first.load(Ordering::SeqCst), 0);
    assert_eq!(second.load(Ordering::SeqCst), 1);
}

#[test]
fn test_names_are_sorted() {
    let mut registry = JobRegistry::new();
    for name in ["welcome_email", "confirmation_email", "cleanup"] {
        registry.register(name, |_: JobContext, _: JobMessage| async {
            Ok::<(), JobError>(())
        });
    }

    assert_eq!(
        registry.names(),
        vec!["cleanup", "confirmation_email", "welcome_email"]
    );
}

#[tokio::test]
async fn test_register_missing_keeps_existing_handlers() {
    let mine = Arc::new(AtomicU32::new(0));
    let builtin = Arc::new(AtomicU32::new(0));

    let mut registry = JobRegistry::new();
    registry.register("welcome_email", CountingJob { runs: mine.clone() });

    let mut builtins = JobRegistry::new();
    builtins.register("welcome_email", CountingJob { runs: builtin.clone() });
    builtins.register("confirmation_email", CountingJob { runs: builtin.clone() });

    registry.register_missing(builtins);
    assert_eq!(registry.names(), vec!["confirmation_email", "welcome_email"]);

    registry
        .get("welcome_email")
        .unwrap()
        .run(context("welcome_email"), JobMessage::new())
        .await
        .unwrap();
    assert_eq!(mine.load(Ordering::SeqCst), 1);
    assert_eq!(builtin.load(Ordering::SeqCst), 0);
}

#[test]
fn test_context_exposes_shutdown() {
    let token = CancellationToken::new();
    let context = JobContext::new(token.clone(), "job", 3);

    assert_eq!(context.delivery_count(), 3);
    assert!(!context.is_shutting_down());

    context.shutdown_token().cancel();
    assert!(token.is_cancelled());
    assert!(context.is_shutting_down());
}
