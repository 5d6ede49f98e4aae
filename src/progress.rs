//! Progress bar and logging utilities.
//!
//! Hashing and tag reading walk a directory one file at a time; these helpers
//! show that as a bar, or as periodic log lines in log-only mode where bars
//! are hidden for tail-friendly output.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Global flag for log-only mode (set from args in main)
pub static LOG_ONLY: AtomicBool = AtomicBool::new(false);

/// Set log-only mode globally
pub fn set_log_only(value: bool) {
    LOG_ONLY.store(value, Ordering::Relaxed);
}

/// Check if log-only mode is enabled
pub fn is_log_only() -> bool {
    LOG_ONLY.load(Ordering::Relaxed)
}

/// Format duration in human-readable format
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 60.0 {
        format!("{:.3}s", secs)
    } else {
        format!("{:.1}m", secs / 60.0)
    }
}

/// Create a per-file progress bar. Hidden in log-only mode and when there is
/// nothing to do.
pub fn create_progress_bar(len: u64, phase: &str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    if is_log_only() || len == 0 {
        pb.set_draw_target(ProgressDrawTarget::hidden());
    } else {
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{prefix} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {wide_msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
    }
    pb.set_prefix(phase.to_string());
    pb
}

/// Log one ordered progress line per file in log-only mode.
pub fn log_file_progress(phase: &str, current: u64, total: u64, file_name: &str) {
    if is_log_only() {
        log::info!("[{}] ({}/{}) {}", phase, current, total, file_name);
    }
}
