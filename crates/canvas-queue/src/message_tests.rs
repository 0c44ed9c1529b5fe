//! Tests for message types.

use super::*;

mod queue_name_tests {
    use super::*;

    #[test]
    fn test_valid_queue_names() {
        assert!(QueueName::new("jobs").is_ok());
        assert!(QueueName::new("canvas-jobs_2").is_ok());
        assert!(QueueName::new("a").is_ok());
        assert!(QueueName::new("ordered.fifo").is_ok());
        assert!(QueueName::new("a".repeat(80)).is_ok());
    }

    #[test]
    fn test_invalid_queue_names() {
        assert!(QueueName::new("").is_err());
        assert!(QueueName::new(".fifo").is_err());
        assert!(QueueName::new("a".repeat(81)).is_err());
        assert!(QueueName::new("special@chars").is_err());
        assert!(QueueName::new("with space").is_err());
        assert!(QueueName::new("dots.in.name").is_err());
    }

    #[test]
    fn test_fifo_detection() {
        assert!(QueueName::new("ordered.fifo").unwrap().is_fifo());
        assert!(!QueueName::new("jobs").unwrap().is_fifo());
    }

    #[test]
    fn test_parse_and_display() {
        let name: QueueName = "jobs".parse().unwrap();
        assert_eq!(name.to_string(), "jobs");
        assert_eq!(name.as_str(), "jobs");
    }
}

mod job_message_tests {
    use super::*;

    #[test]
    fn test_for_job_sets_job_name() {
        let message = JobMessage::for_job("welcome_email").with_field("email", "me@example.com");

        assert_eq!(message.job_name(), Some("welcome_email"));
        assert_eq!(message.get("email"), Some("me@example.com"));
        assert_eq!(message.len(), 2);
    }

    #[test]
    fn test_message_without_job_key() {
        let message = JobMessage::new().with_field("email", "me@example.com");

        assert_eq!(message.job_name(), None);
        assert!(!message.is_empty());
    }

    #[test]
    fn test_insert_overwrites() {
        let mut message = JobMessage::for_job("a");
        let previous = message.insert(JOB_NAME_KEY, "b");

        assert_eq!(previous, Some("a".to_string()));
        assert_eq!(message.job_name(), Some("b"));
    }

    #[test]
    fn test_json_body_is_flat_object() {
        let message = JobMessage::for_job("test").with_field("foo", "bar");
        let json = message.to_json().unwrap();

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["job"], "test");
        assert_eq!(value["foo"], "bar");

        assert_eq!(JobMessage::from_json(&json).unwrap(), message);
    }

    #[test]
    fn test_from_json_rejects_non_string_values() {
        let result = JobMessage::from_json(r#"{"job":"test","count":3}"#);
        assert!(matches!(
            result,
            Err(SerializationError::InvalidBody { .. })
        ));

        assert!(JobMessage::from_json("not json").is_err());
    }

    #[test]
    fn test_collect_from_pairs() {
        let message: JobMessage = vec![("job", "test"), ("foo", "bar")].into_iter().collect();
        assert_eq!(message.job_name(), Some("test"));

        let mut pairs: Vec<_> = message.iter().collect();
        pairs.sort();
        assert_eq!(pairs, vec![("foo", "bar"), ("job", "test")]);
    }
}

mod receipt_handle_tests {
    use super::*;

    #[test]
    fn test_receipt_handle_expiry() {
        let receipt = ReceiptHandle::new("receipt-1", Timestamp::after(Duration::from_secs(300)));

        assert_eq!(receipt.handle(), "receipt-1");
        assert!(!receipt.is_expired());
        assert!(receipt.time_until_expiry() > Duration::from_secs(240));
    }

    #[test]
    fn test_expired_receipt_handle() {
        let past = Timestamp::from_datetime(Utc::now() - chrono::Duration::seconds(10));
        let receipt = ReceiptHandle::new("receipt-1", past);

        assert!(receipt.is_expired());
        assert_eq!(receipt.time_until_expiry(), Duration::ZERO);
    }
}

#[test]
fn test_message_id_generation() {
    let id1 = MessageId::new();
    let id2 = MessageId::new();
    assert_ne!(id1, id2);
    assert!(!id1.as_str().is_empty());
    assert!("".parse::<MessageId>().is_err());
}
