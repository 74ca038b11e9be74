//! Prefetch statistics types.

use std::time::{Duration, Instant};

/// Statistics for a single downloaded file.
#[derive(Debug, Clone, Copy)]
pub struct FileStats {
    /// Size of the file in bytes.
    pub size: u64,
    /// Time taken to fetch and write the file.
    pub elapsed: Duration,
}

/// Statistics for an entire prefetch session.
#[derive(Debug, Clone)]
pub struct SessionStats {
    /// Whether the country list file was written.
    pub list_written: bool,
    /// Number of countries in the fetched list.
    pub countries: usize,
    /// Number of files successfully downloaded.
    pub files_downloaded: usize,
    /// Number of files skipped (already existed).
    pub files_skipped: usize,
    /// Number of files that failed to download.
    pub files_failed: usize,
    /// Total bytes downloaded.
    pub total_bytes: u64,
    /// Total elapsed time for the session.
    pub elapsed: Duration,
    /// Slowest single file.
    pub slowest_file: Option<Duration>,
}

impl Default for SessionStats {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStats {
    /// Creates a new empty session stats.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            list_written: false,
            countries: 0,
            files_downloaded: 0,
            files_skipped: 0,
            files_failed: 0,
            total_bytes: 0,
            elapsed: Duration::ZERO,
            slowest_file: None,
        }
    }

    /// Returns the average download speed in bytes per second.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn average_speed(&self) -> u64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            (self.total_bytes as f64 / secs) as u64
        } else {
            0
        }
    }

    /// Returns true if every attempted file succeeded.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.files_failed == 0
    }
}

/// Builder for constructing [`SessionStats`] incrementally.
pub struct SessionStatsBuilder {
    start_time: Instant,
    stats: SessionStats,
}

impl Default for SessionStatsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStatsBuilder {
    /// Creates a new session stats builder, starting the clock.
    #[must_use]
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            stats: SessionStats::new(),
        }
    }

    /// Records the fetched country list.
    pub const fn set_countries(&mut self, count: usize, written: bool) {
        self.stats.countries = count;
        self.stats.list_written = written;
    }

    /// Sets the number of skipped files.
    pub const fn set_skipped(&mut self, count: usize) {
        self.stats.files_skipped = count;
    }

    /// Adds a successfully downloaded file.
    pub fn add_download(&mut self, file_stats: &FileStats) {
        self.stats.files_downloaded += 1;
        self.stats.total_bytes += file_stats.size;
        self.stats.slowest_file = Some(
            self.stats
                .slowest_file
                .map_or(file_stats.elapsed, |d| d.max(file_stats.elapsed)),
        );
    }

    /// Records a failed file.
    pub const fn add_failure(&mut self) {
        self.stats.files_failed += 1;
    }

    /// Builds the final session stats.
    #[must_use]
    pub fn build(mut self) -> SessionStats {
        self.stats.elapsed = self.start_time.elapsed();
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_stats_builder_counts() {
        let mut builder = SessionStatsBuilder::new();
        builder.set_countries(250, true);
        builder.set_skipped(3);
        builder.add_download(&FileStats {
            size: 1000,
            elapsed: Duration::from_millis(20),
        });
        builder.add_download(&FileStats {
            size: 500,
            elapsed: Duration::from_millis(90),
        });
        builder.add_failure();

        let stats = builder.build();
        assert!(stats.list_written);
        assert_eq!(stats.countries, 250);
        assert_eq!(stats.files_downloaded, 2);
        assert_eq!(stats.files_skipped, 3);
        assert_eq!(stats.files_failed, 1);
        assert_eq!(stats.total_bytes, 1500);
        assert_eq!(stats.slowest_file, Some(Duration::from_millis(90)));
        assert!(!stats.is_clean());
    }

    #[test]
    fn average_speed_zero_elapsed() {
        let stats = SessionStats {
            total_bytes: 1000,
            ..SessionStats::new()
        };
        assert_eq!(stats.average_speed(), 0);
    }

    #[test]
    fn average_speed_calculation() {
        let stats = SessionStats {
            total_bytes: 10_000,
            elapsed: Duration::from_secs(2),
            ..SessionStats::new()
        };
        assert_eq!(stats.average_speed(), 5_000);
        assert!(stats.is_clean());
    }
}
