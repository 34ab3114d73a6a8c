// ─── Download Progress ───
// The only state shared by concurrent download workers.

use std::sync::atomic::{AtomicU64, Ordering};

/// Per-file callbacks a download reports through.
pub trait DownloadListener: Send + Sync {
    /// Bytes written for the current file. Negative values roll back bytes
    /// from a failed attempt.
    fn on_bytes(&self, delta: i64);

    fn on_file_downloaded(&self);
}

/// Byte and file counters for one download operation.
#[derive(Debug, Default)]
pub struct DownloadCounters {
    downloaded_size: AtomicU64,
    downloaded_files: AtomicU64,
    total_size: AtomicU64,
    total_files: AtomicU64,
}

impl DownloadCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for one more planned file.
    pub fn schedule(&self, size: u64) {
        self.total_files.fetch_add(1, Ordering::Relaxed);
        self.total_size.fetch_add(size, Ordering::Relaxed);
    }

    /// Restart counting for a retry pass over `files` files of `bytes` total.
    pub fn reset_for_retry(&self, files: u64, bytes: u64) {
        self.downloaded_files.store(0, Ordering::Relaxed);
        self.downloaded_size.store(0, Ordering::Relaxed);
        self.total_files.store(files, Ordering::Relaxed);
        self.total_size.store(bytes, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            downloaded_size: self.downloaded_size.load(Ordering::Relaxed),
            total_size: self.total_size.load(Ordering::Relaxed),
            downloaded_files: self.downloaded_files.load(Ordering::Relaxed),
            total_files: self.total_files.load(Ordering::Relaxed),
        }
    }
}

impl DownloadListener for DownloadCounters {
    fn on_bytes(&self, delta: i64) {
        if delta >= 0 {
            self.downloaded_size
                .fetch_add(delta.unsigned_abs(), Ordering::Relaxed);
        } else {
            let rollback = delta.unsigned_abs();
            // fetch_update only fails when the closure returns None.
            let _ = self
                .downloaded_size
                .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                    Some(current.saturating_sub(rollback))
                });
        }
    }

    fn on_file_downloaded(&self) {
        self.downloaded_files.fetch_add(1, Ordering::Relaxed);
    }
}

/// Point-in-time view of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub downloaded_size: u64,
    pub total_size: u64,
    pub downloaded_files: u64,
    pub total_files: u64,
}

impl ProgressSnapshot {
    /// Totals may still be growing while planning runs; never report a
    /// denominator smaller than the numerator.
    pub fn effective_total_size(&self) -> u64 {
        self.total_size.max(self.downloaded_size)
    }

    pub fn fraction(&self) -> f32 {
        let total = self.effective_total_size();
        if total == 0 {
            return 0.0;
        }
        (self.downloaded_size as f64 / total as f64).clamp(0.0, 1.0) as f32
    }

    /// Message arguments: file counts, then formatted sizes.
    pub fn message_args(&self) -> Vec<String> {
        vec![
            self.downloaded_files.to_string(),
            self.total_files.to_string(),
            format_file_size(self.downloaded_size),
            format_file_size(self.effective_total_size()),
        ]
    }
}

pub fn format_file_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denominator_never_drops_below_numerator() {
        let counters = DownloadCounters::new();
        counters.schedule(100);
        counters.on_bytes(150);

        let snap = counters.snapshot();
        assert_eq!(snap.effective_total_size(), 150);
        assert_eq!(snap.fraction(), 1.0);
        assert_eq!(DownloadCounters::new().snapshot().fraction(), 0.0);
    }

    #[test]
    fn rollback_saturates_at_zero() {
        let counters = DownloadCounters::new();
        counters.on_bytes(10);
        counters.on_bytes(-4);
        assert_eq!(counters.snapshot().downloaded_size, 6);
        counters.on_bytes(-100);
        assert_eq!(counters.snapshot().downloaded_size, 0);
    }

    #[test]
    fn retry_reset_counts_only_the_failed_subset() {
        let counters = DownloadCounters::new();
        for _ in 0..3 {
            counters.schedule(10);
        }
        counters.on_bytes(20);
        counters.on_file_downloaded();
        counters.on_file_downloaded();

        counters.reset_for_retry(1, 10);
        assert_eq!(
            counters.snapshot(),
            ProgressSnapshot {
                downloaded_size: 0,
                total_size: 10,
                downloaded_files: 0,
                total_files: 1,
            }
        );
    }

    #[test]
    fn sizes_are_human_readable() {
        assert_eq!(format_file_size(512), "512 B");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(5 * 1024 * 1024), "5.0 MB");

        let snap = ProgressSnapshot {
            downloaded_size: 1024,
            total_size: 2048,
            downloaded_files: 1,
            total_files: 2,
        };
        assert_eq!(snap.message_args(), vec!["1", "2", "1.0 KB", "2.0 KB"]);
    }
}
