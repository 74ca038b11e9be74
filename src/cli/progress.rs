//! Progress bar and summary reporting for the prefetch command.

use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::{FileStats, PrefetchProgress, SessionStats};

const SEPARATOR: &str = "────────────────────────────────────────────────────────────";

/// Formats a byte count as B, KB or MB.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}

/// Formats a duration as "850ms", "5.2s" or "1m 05s".
#[must_use]
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs >= 60 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else if secs >= 1 {
        format!("{}.{}s", secs, d.subsec_millis() / 100)
    } else {
        format!("{}ms", d.subsec_millis())
    }
}

/// Style for the bar counting downloaded flags.
fn flags_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{spinner:.cyan} Flags [{bar:40.cyan/blue}] {pos}/{len} ({per_sec}) {msg}",
    )
    .expect("progress template is valid")
    .progress_chars("━━╌")
}

/// Indicatif-backed [`PrefetchProgress`].
pub struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    /// Creates a hidden bar; it is shown once downloads start.
    #[must_use]
    pub fn new() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    /// Clears the bar from the terminal.
    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl Default for CliProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl PrefetchProgress for CliProgress {
    fn on_list_fetched(&self, count: usize) {
        println!("Fetched {count} countries.");
    }

    fn on_list_written(&self, path: &str) {
        println!("Wrote {path}");
    }

    fn on_downloads_start(&self, pending: usize, skipped: usize) {
        if skipped > 0 {
            println!("{skipped} flag(s) already present, skipping.");
        }
        if pending == 0 {
            return;
        }
        println!("Downloading {pending} flag(s)...");
        self.bar.set_draw_target(ProgressDrawTarget::stderr());
        self.bar.set_length(pending as u64);
        self.bar.set_style(flags_style());
        self.bar.enable_steady_tick(Duration::from_millis(120));
    }

    fn on_file_complete(&self, name: &str, _stats: &FileStats) {
        self.bar.set_message(name.to_string());
        self.bar.inc(1);
    }

    fn on_error(&self, name: &str, error: &str) {
        self.bar
            .println(format!("  {} {name}: {error}", style("✗").red()));
        self.bar.inc(1);
    }
}

/// Prints a summary of prefetch statistics.
pub fn print_summary(stats: &SessionStats) {
    println!("\n{SEPARATOR}");
    println!("Prefetch Summary");
    println!("{SEPARATOR}");
    println!("  Countries:         {}", stats.countries);
    if stats.list_written {
        println!("  Country list:      written");
    }
    if stats.files_downloaded > 0 {
        println!("  Flags downloaded:  {}", stats.files_downloaded);
        println!("  Total size:        {}", format_bytes(stats.total_bytes));
        println!("  Total time:        {}", format_duration(stats.elapsed));
        println!(
            "  Average speed:     {}/s",
            format_bytes(stats.average_speed())
        );
        if let Some(slowest) = stats.slowest_file {
            println!("  Slowest flag:      {}", format_duration(slowest));
        }
    }
    if stats.files_skipped > 0 {
        println!("  Flags skipped:     {}", stats.files_skipped);
    }
    if stats.files_failed > 0 {
        println!(
            "  Flags failed:      {}",
            style(stats.files_failed).red().bold()
        );
    }
    println!("{SEPARATOR}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_bytes_units() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(500), "500 B");
        assert_eq!(format_bytes(1024), "1.0 KB");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(1_048_576), "1.00 MB");
    }

    #[test]
    fn format_duration_units() {
        assert_eq!(format_duration(Duration::from_millis(850)), "850ms");
        assert_eq!(format_duration(Duration::from_millis(5_250)), "5.2s");
        assert_eq!(format_duration(Duration::from_secs(65)), "1m 05s");
    }

    #[test]
    fn progress_callbacks_do_not_panic_when_hidden() {
        let progress = CliProgress::new();
        progress.on_file_complete(
            "fr.svg",
            &FileStats {
                size: 10,
                elapsed: Duration::ZERO,
            },
        );
        progress.on_error("de.svg", "HTTP 404");
        progress.finish();
    }
}
