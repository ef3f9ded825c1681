use tracing::info;

/// Fire-and-forget progress notifications (retry countdowns) for the caller
pub trait StatusSink: Send + Sync {
    fn notify(&self, message: &str);
}

/// HTTP callers have no status channel; messages are logged only
#[derive(Debug, Clone, Copy, Default)]
pub struct LogStatusSink;

impl StatusSink for LogStatusSink {
    fn notify(&self, message: &str) {
        info!(status = %message, "Status update");
    }
}

impl<F> StatusSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn notify(&self, message: &str) {
        self(message)
    }
}
