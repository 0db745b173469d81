use std::sync::Arc;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::error;

/// One-shot pipeline halt. The first reason wins; tripping also cancels the
/// pipeline token so workers stop pulling.
#[derive(Debug, Clone)]
pub struct FatalLatch {
    reason: Arc<OnceCell<String>>,
    cancel: CancellationToken,
}

impl FatalLatch {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            reason: Arc::new(OnceCell::new()),
            cancel,
        }
    }

    pub fn trip(&self, reason: impl Into<String>) {
        let reason = reason.into();
        if self.reason.set(reason.clone()).is_ok() {
            error!(reason = %reason, "Pipeline fatal, halting ingestion");
        }
        self.cancel.cancel();
    }

    pub fn is_tripped(&self) -> bool {
        self.reason.initialized()
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.get().map(String::as_str)
    }
}
