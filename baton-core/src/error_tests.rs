/*!
Tests for error handling and error types.
*/

#[cfg(test)]
mod tests {
    use crate::error::BatonError;
    use std::io;

    #[test]
    fn test_baton_error_display() {
        let error = BatonError::validation("test validation error");
        assert_eq!(error.to_string(), "Validation error: test validation error");

        let error = BatonError::storage("disk full");
        assert_eq!(error.to_string(), "Storage error: disk full");

        let error = BatonError::StorageUnwritable("/var/run/state".to_string());
        assert_eq!(
            error.to_string(),
            "Storage is not writable, can't save data: /var/run/state"
        );
    }

    #[test]
    fn test_restart_capability_error_mentions_both_answers() {
        let error = BatonError::RestartCapabilityUnavailable {
            expected: "baton_check_exec_ok".to_string(),
            actual: "command not found".to_string(),
        };

        let message = error.to_string();
        assert!(message.contains("baton_check_exec_ok"));
        assert!(message.contains("command not found"));
    }

    #[test]
    fn test_baton_error_from_io_error() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "File not found");
        let baton_error = BatonError::from(io_error);

        match baton_error {
            BatonError::Io(ref io_err) => assert_eq!(io_err.kind(), io::ErrorKind::NotFound),
            _ => panic!("Expected Io error variant"),
        }
    }

    #[test]
    fn test_baton_error_from_json_error() {
        let json_error = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let baton_error = BatonError::from(json_error);

        assert!(matches!(baton_error, BatonError::Json(_)));
    }

    #[test]
    fn test_integrity_check_failed_error() {
        let error = BatonError::IntegrityCheckFailed {
            expected: "abc123".to_string(),
            actual: "def456".to_string(),
        };

        assert!(error.to_string().contains("abc123"));
        assert!(error.to_string().contains("def456"));
    }

    #[test]
    fn test_startup_failures_are_classified() {
        assert!(BatonError::session("no session").is_startup_failure());
        assert!(BatonError::BudgetConfigUnavailable("x".into()).is_startup_failure());
        assert!(BatonError::StorageUnwritable("x".into()).is_startup_failure());
        assert!(BatonError::RestartCapabilityUnavailable {
            expected: "a".into(),
            actual: "b".into(),
        }
        .is_startup_failure());

        assert!(!BatonError::restart("spawn failed").is_startup_failure());
        assert!(!BatonError::invalid_format("bad").is_startup_failure());
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<BatonError>();
        assert_sync::<BatonError>();
    }
}
