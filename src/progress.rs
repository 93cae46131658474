//! Live progress line for transfer bodies

use indicatif::{HumanBytes, HumanDuration, ProgressBar, ProgressStyle};
use std::time::Duration;

/// Byte-granular progress bar shown while a frame body is on the wire.
/// Hidden automatically when stderr is not a terminal.
pub struct TransferProgress {
    bar: ProgressBar,
    label: String,
    chunk: std::cell::Cell<usize>,
}

impl TransferProgress {
    pub fn new(total_bytes: u64, label: &str) -> Self {
        let bar = ProgressBar::new(total_bytes);
        bar.set_style(
            ProgressStyle::with_template(
                "{msg} [{bar:30.green}] {bytes}/{total_bytes} {bytes_per_sec} eta {eta}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
        );
        bar.set_message(label.to_string());
        bar.enable_steady_tick(Duration::from_millis(250));
        Self {
            bar,
            label: label.to_string(),
            chunk: std::cell::Cell::new(0),
        }
    }

    pub fn inc(&self, bytes: u64) {
        self.bar.inc(bytes);
    }

    /// Note the chunk size currently in use next to the label.
    pub fn set_chunk(&self, chunk: usize) {
        if self.chunk.replace(chunk) != chunk {
            self.bar
                .set_message(format!("{} (chunk {})", self.label, HumanBytes(chunk as u64)));
        }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl Drop for TransferProgress {
    fn drop(&mut self) {
        self.bar.finish_and_clear();
    }
}

/// Human-readable byte count for summary lines.
pub fn human_bytes(bytes: u64) -> String {
    HumanBytes(bytes).to_string()
}

/// Human-readable duration for summary lines.
pub fn human_duration(d: Duration) -> String {
    HumanDuration(d).to_string()
}

/// Average throughput formatted for summary lines.
pub fn human_speed(bytes: u64, d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs > 0.0 {
        format!("{}/s", HumanBytes((bytes as f64 / secs) as u64))
    } else {
        format!("{}/s", HumanBytes(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_formatting() {
        assert_eq!(human_bytes(0), "0 B");
        assert!(human_bytes(2 * 1024 * 1024).contains("MiB"));
        assert!(human_speed(10 * 1024 * 1024, Duration::from_secs(2)).ends_with("/s"));
        assert!(human_speed(100, Duration::from_secs(0)).ends_with("/s"));
    }
}
