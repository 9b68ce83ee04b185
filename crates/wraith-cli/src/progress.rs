//! Transfer progress display, driven by `wraith_core::engine::TransferProgress`
//! reports from the sender/receiver engines.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use wraith_core::engine::TransferProgress as EngineProgress;

/// Wraps an `indicatif` progress bar, updated from the engine's throttled
/// progress reports.
pub struct TransferProgress {
    bar: ProgressBar,
}

impl TransferProgress {
    /// Create a new progress bar for a transfer of `total_bytes`.
    #[must_use]
    pub fn new(total_bytes: u64, label: &str) -> Self {
        let bar = ProgressBar::new(total_bytes);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})")
                .expect("progress bar template is valid")
                .progress_chars("#>-"),
        );
        bar.set_message(format!("Transferring: {label}"));
        Self { bar }
    }

    /// Apply one engine progress report to the bar.
    pub fn apply(&self, report: &EngineProgress) {
        self.bar.set_position(report.bytes_transferred);
        let eta = report
            .eta
            .map(format_duration)
            .unwrap_or_else(|| "unknown".to_string());
        self.bar.set_message(format!(
            "{} ({} avg, ETA {})",
            format_bytes(report.bytes_transferred),
            format_speed(report.ewma_bps),
            eta
        ));
    }

    /// Finish with a success message.
    pub fn finish(&self) {
        self.bar.finish_with_message("transfer complete");
    }

    /// Abandon the bar, e.g. on a fatal transfer error.
    pub fn abandon(&self, reason: &str) {
        self.bar.abandon_with_message(reason.to_string());
    }
}

/// Format a byte count in human-readable units.
///
/// # Example
///
/// ```
/// use wraith_cli::progress::format_bytes;
///
/// assert_eq!(format_bytes(1024), "1.00 KB");
/// assert_eq!(format_bytes(1024 * 1024), "1.00 MB");
/// ```
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;
    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }
    format!("{size:.2} {}", UNITS[unit_idx])
}

/// Format a throughput in bytes/second.
///
/// # Example
///
/// ```
/// use wraith_cli::progress::format_speed;
///
/// assert_eq!(format_speed(1024.0), "1.00 KB/s");
/// ```
#[must_use]
pub fn format_speed(bytes_per_sec: f64) -> String {
    format!("{}/s", format_bytes(bytes_per_sec as u64))
}

/// Format a duration as `1h 1m` / `1m 30s` / `30s`.
///
/// # Example
///
/// ```
/// use wraith_cli::progress::format_duration;
/// use std::time::Duration;
///
/// assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
/// ```
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_format_across_units() {
        assert_eq!(format_bytes(0), "0.00 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1024 * 1024 * 1024), "1.00 GB");
    }

    #[test]
    fn duration_format_across_ranges() {
        assert_eq!(format_duration(Duration::from_secs(30)), "30s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
        assert_eq!(format_duration(Duration::from_secs(3661)), "1h 1m");
    }

    #[test]
    fn apply_updates_position_and_message() {
        let progress = TransferProgress::new(1000, "demo");
        progress.apply(&EngineProgress {
            bytes_total: 1000,
            bytes_transferred: 500,
            instantaneous_bps: 1024.0,
            ewma_bps: 900.0,
            eta: Some(Duration::from_secs(5)),
        });
        assert_eq!(progress.bar.position(), 500);
        progress.finish();
    }
}
