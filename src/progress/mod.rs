pub mod bar;

pub use bar::BarProgress;

/// Progress sink shared by the scanning and copying sides of a sync.
pub trait Progress: Send + Sync {
    /// `current` of `total` bytes done; `total` grows while scanning runs.
    fn report(&self, current: u64, total: u64, message: &str);

    fn finish(&self) {}
}

pub struct NoProgress;

impl Progress for NoProgress {
    fn report(&self, _current: u64, _total: u64, _message: &str) {}
}

/// Emits progress as trace events, for runs without a terminal.
pub struct LogProgress;

impl Progress for LogProgress {
    fn report(&self, current: u64, total: u64, message: &str) {
        tracing::trace!(current, total, "{}", message);
    }
}
