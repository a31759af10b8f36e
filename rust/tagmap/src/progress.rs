//! Progress reporting and cooperative cancellation.
//!
//! Long running passes (probability estimation, tag mapping) report through
//! a shared handler and poll its cancellation flag at natural iteration
//! boundaries. Workers never get killed; once the flag is set, no new work
//! starts and running units finish their current match.

use indicatif::{
    ProgressBar,
    ProgressStyle,
};
use std::sync::atomic::{
    AtomicBool,
    AtomicU64,
    Ordering,
};
use std::sync::Mutex;
use tracing::info;

pub trait ProgressHandler: Send + Sync {
    fn set_max(&self, max: u64);
    fn increment(&self);
    fn append_report(&self, report: &str);
    fn is_canceled(&self) -> bool;
    fn cancel(&self);
}

/// Counter-only handler for tests and headless runs.
#[derive(Default)]
pub struct SilentProgress {
    max: AtomicU64,
    count: AtomicU64,
    canceled: AtomicBool,
    reports: Mutex<Vec<String>>,
}

impl SilentProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn progress(&self) -> (u64, u64) {
        (self.count.load(Ordering::Relaxed), self.max.load(Ordering::Relaxed))
    }

    pub fn reports(&self) -> Vec<String> {
        self.reports.lock().unwrap().clone()
    }
}

impl ProgressHandler for SilentProgress {
    fn set_max(&self, max: u64) {
        self.max.store(max, Ordering::Relaxed);
    }

    fn increment(&self) {
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    fn append_report(&self, report: &str) {
        self.reports.lock().unwrap().push(report.to_string());
    }

    fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Relaxed)
    }

    fn cancel(&self) {
        self.canceled.store(true, Ordering::Relaxed);
    }
}

/// Terminal progress bar handler.
pub struct ProgressReporter {
    bar: ProgressBar,
    canceled: AtomicBool,
}

impl ProgressReporter {
    pub fn new() -> Self {
        let bar = ProgressBar::no_length();
        bar.set_style(
            ProgressStyle::with_template("{msg} [{bar:40}] {pos}/{len}")
                .expect("static template is valid")
                .progress_chars("=> "),
        );
        Self {
            bar,
            canceled: AtomicBool::new(false),
        }
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressHandler for ProgressReporter {
    fn set_max(&self, max: u64) {
        self.bar.set_length(max);
        self.bar.set_position(0);
    }

    fn increment(&self) {
        self.bar.inc(1);
    }

    fn append_report(&self, report: &str) {
        info!("{}", report);
        self.bar.println(report);
    }

    fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Relaxed)
    }

    fn cancel(&self) {
        self.canceled.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silent_progress_counts() {
        let progress = SilentProgress::new();
        progress.set_max(3);
        progress.increment();
        progress.increment();
        assert_eq!(progress.progress(), (2, 3));
        progress.append_report("halfway");
        assert_eq!(progress.reports(), vec!["halfway".to_string()]);
    }

    #[test]
    fn test_cancellation_flag() {
        let progress = SilentProgress::new();
        assert!(!progress.is_canceled());
        progress.cancel();
        assert!(progress.is_canceled());
        // Canceling twice is fine.
        progress.cancel();
        assert!(progress.is_canceled());
    }
}
