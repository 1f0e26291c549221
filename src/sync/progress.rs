//! Progress reporting side channel for pushes.

/// Receives human-readable progress lines. Fire-and-forget: implementations
/// must not fail and the engine never waits on them.
pub trait ProgressSink: Send + Sync {
    fn report(&self, message: &str);

    /// Called exactly once when the operation ends, on success and on error.
    fn finish(&self) {}
}

/// No-op progress sink
pub struct NoOpProgress;

impl ProgressSink for NoOpProgress {
    fn report(&self, _message: &str) {}
}

/// Progress sink writing to stderr, like `git push` does.
pub struct StderrProgress;

impl ProgressSink for StderrProgress {
    fn report(&self, message: &str) {
        eprintln!("{}", message);
    }
}

/// Optional sink that calls `finish` when dropped, so an in-flight indicator
/// stops on every exit path.
pub(crate) struct Progress<'a> {
    sink: Option<&'a dyn ProgressSink>,
}

impl<'a> Progress<'a> {
    pub fn new(sink: Option<&'a dyn ProgressSink>) -> Self {
        Self { sink }
    }

    pub fn report(&self, message: impl AsRef<str>) {
        if let Some(sink) = self.sink {
            sink.report(message.as_ref());
        }
    }

    /// `Writing objects:  50% (1/2)` style line.
    pub fn report_ratio(&self, label: &str, done: usize, total: usize) {
        if self.sink.is_none() {
            return;
        }
        let percent = if total == 0 { 100 } else { done * 100 / total };
        let suffix = if done == total { ", done." } else { "" };
        self.report(format!(
            "{}: {:>3}% ({}/{}){}",
            label, percent, done, total, suffix
        ));
    }
}

impl Drop for Progress<'_> {
    fn drop(&mut self) {
        if let Some(sink) = self.sink {
            sink.finish();
        }
    }
}
