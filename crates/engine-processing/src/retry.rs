use engine_core::{error::SinkError, retry::RetryDisposition};
use model::execution::failure::{Failure, FailureKind};

pub fn classify_sink_error(err: &SinkError) -> RetryDisposition {
    match err {
        SinkError::Io(_) | SinkError::Timeout(_) | SinkError::Unavailable(_) => {
            RetryDisposition::Retry
        }
        SinkError::InvalidDestination(_) => RetryDisposition::Stop,
        SinkError::PermissionDenied(_) => RetryDisposition::Stop,
        SinkError::QuotaExceeded(_) => RetryDisposition::Stop,
    }
}

pub fn classify_failure(failure: &Failure) -> RetryDisposition {
    if failure.is_retryable() {
        RetryDisposition::Retry
    } else {
        RetryDisposition::Stop
    }
}

/// Write-stage failure carrying the sink error's disposition.
pub fn sink_failure(err: &SinkError, location: &str) -> Failure {
    let retryable = classify_sink_error(err) == RetryDisposition::Retry;
    Failure::new(
        FailureKind::WriteError { retryable },
        format!("{location}: {err}"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn transient_storage_errors_are_retried() {
        let retried = [
            SinkError::Io(std::io::Error::other("reset")),
            SinkError::Timeout(Duration::from_secs(1)),
            SinkError::Unavailable("503".into()),
        ];
        for err in &retried {
            assert_eq!(classify_sink_error(err), RetryDisposition::Retry, "{err}");
        }

        let stopped = [
            SinkError::InvalidDestination("..".into()),
            SinkError::PermissionDenied("/ro".into()),
            SinkError::QuotaExceeded("/full".into()),
        ];
        for err in &stopped {
            assert_eq!(classify_sink_error(err), RetryDisposition::Stop, "{err}");
        }
    }

    #[test]
    fn sink_failures_keep_the_location() {
        let failure = sink_failure(&SinkError::Timeout(Duration::from_millis(50)), "a/part-1-000000.jsonl");
        assert_eq!(failure.kind, FailureKind::WriteError { retryable: true });
        assert!(failure.message.starts_with("a/part-1-000000.jsonl"));
    }
}
