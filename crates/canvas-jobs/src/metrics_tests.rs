//! Tests for Prometheus job metrics.

use super::*;

#[test]
fn test_record_job_counts_by_name_and_outcome() {
    let registry = Registry::new();
    let metrics = PrometheusJobMetrics::new(&registry).unwrap();

    metrics.record_job("welcome_email", true, Duration::from_millis(250));
    metrics.record_job("welcome_email", true, Duration::from_millis(750));
    metrics.record_job("welcome_email", false, Duration::from_secs(2));

    assert_eq!(metrics.job_count("welcome_email", true), 2);
    assert_eq!(metrics.job_count("welcome_email", false), 1);
    assert_eq!(metrics.job_count("confirmation_email", true), 0);
    assert!((metrics.job_duration_seconds("welcome_email", true) - 1.0).abs() < 1e-9);
    assert!((metrics.job_duration_seconds("welcome_email", false) - 2.0).abs() < 1e-9);
}

#[test]
fn test_record_receive() {
    let registry = Registry::new();
    let metrics = PrometheusJobMetrics::new(&registry).unwrap();

    metrics.record_receive(true);
    metrics.record_receive(false);
    metrics.record_receive(false);

    assert_eq!(metrics.receive_count(true), 1);
    assert_eq!(metrics.receive_count(false), 2);
}

#[test]
fn test_duplicate_registration_fails() {
    let registry = Registry::new();
    PrometheusJobMetrics::new(&registry).unwrap();

    assert!(PrometheusJobMetrics::new(&registry).is_err());
}

#[test]
fn test_encode_text_contains_labelled_series() {
    let registry = Registry::new();
    let metrics = PrometheusJobMetrics::new(&registry).unwrap();
    metrics.record_job("test", true, Duration::from_secs(1));
    metrics.record_receive(true);

    let text = encode_text(&registry).unwrap();

    assert!(text.contains("# TYPE app_jobs_total counter"));
    assert!(text.contains(r#"app_jobs_total{name="test",success="true"} 1"#));
    assert!(text.contains(r#"app_job_duration_seconds_total{name="test",success="true"} 1"#));
    assert!(text.contains(r#"app_job_runner_receives_total{success="true"} 1"#));
}
