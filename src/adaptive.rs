//! Adaptive chunk sizing
//!
//! Chooses a transfer granularity from observed throughput: per-chunk speed
//! samples feed a small rolling window, and every adjustment interval the
//! window average is mapped through a tier table onto the next chunk size.
//! No out-of-band signaling is involved; both peers retune independently.

use std::time::{Duration, Instant};

/// Tuning constants for the chunk controller.
pub mod constants {
    use std::time::Duration;

    /// Smallest chunk ever used (8 KiB).
    pub const MIN_CHUNK_SIZE: usize = 8 * 1024;

    /// Largest chunk ever used (2 MiB).
    pub const MAX_CHUNK_SIZE: usize = 2 * 1024 * 1024;

    /// Chunk size every transfer starts from (64 KiB).
    pub const INITIAL_CHUNK_SIZE: usize = 64 * 1024;

    /// Rolling window length, in samples.
    pub const SPEED_SAMPLES: usize = 5;

    /// Minimum time between chunk-size recomputations.
    pub const ADJUSTMENT_INTERVAL: Duration = Duration::from_secs(2);
}

use constants::*;

const MB: f64 = 1024.0 * 1024.0;

/// Map an average throughput (bytes/second) onto a chunk size.
///
/// Boundaries are inclusive below and exclusive above, so a link measured at
/// exactly 10 MB/s lands in the 256 KiB tier.
fn chunk_size_for_speed(avg_speed: f64) -> usize {
    if avg_speed < 1.0 * MB {
        MIN_CHUNK_SIZE
    } else if avg_speed < 10.0 * MB {
        64 * 1024
    } else if avg_speed < 50.0 * MB {
        256 * 1024
    } else if avg_speed < 100.0 * MB {
        1024 * 1024
    } else {
        MAX_CHUNK_SIZE
    }
}

/// Per-transfer chunk controller. Created when a transfer starts, fed after
/// every courier call, dropped when the transfer ends. One instance spans a
/// whole directory tree so the rate estimate converges across small entries.
#[derive(Debug)]
pub struct AdaptiveState {
    current_chunk_size: usize,
    last_adjustment: Instant,
    transfer_start: Instant,
    speed_samples: [f64; SPEED_SAMPLES],
    sample_index: usize,
    sample_count: usize,
    interval_bytes: u64,
    bytes_done: u64,
    total_bytes: u64,
}

impl AdaptiveState {
    /// Fresh state for a transfer expected to carry `total_bytes`.
    pub fn new(total_bytes: u64) -> Self {
        let now = Instant::now();
        AdaptiveState {
            current_chunk_size: INITIAL_CHUNK_SIZE,
            last_adjustment: now,
            transfer_start: now,
            speed_samples: [0.0; SPEED_SAMPLES],
            sample_index: 0,
            sample_count: 0,
            interval_bytes: 0,
            bytes_done: 0,
            total_bytes,
        }
    }

    /// Current chunk size, clamped into `[MIN, MAX]`.
    pub fn chunk_size(&mut self) -> usize {
        self.current_chunk_size = self.current_chunk_size.clamp(MIN_CHUNK_SIZE, MAX_CHUNK_SIZE);
        self.current_chunk_size
    }

    /// Record a completed chunk and, once the adjustment interval has
    /// elapsed, recompute the chunk size from the window average.
    pub fn update(&mut self, bytes: usize, elapsed_secs: f64) {
        self.update_at(bytes, elapsed_secs, Instant::now());
    }

    /// Clock-injected body of [`update`]; `now` never moves the adjustment
    /// stamp backward because `Instant` is monotonic.
    pub fn update_at(&mut self, bytes: usize, elapsed_secs: f64, now: Instant) {
        if elapsed_secs <= 0.0 {
            return;
        }

        let speed = bytes as f64 / elapsed_secs;
        self.speed_samples[self.sample_index] = speed;
        self.sample_index = (self.sample_index + 1) % SPEED_SAMPLES;
        if self.sample_count < SPEED_SAMPLES {
            self.sample_count += 1;
        }

        self.interval_bytes += bytes as u64;
        self.bytes_done += bytes as u64;

        if now.duration_since(self.last_adjustment) >= ADJUSTMENT_INTERVAL {
            self.current_chunk_size = chunk_size_for_speed(self.average_speed());
            self.last_adjustment = now;
            self.interval_bytes = 0;
        }
    }

    /// Mean over the populated window slots; 0 when no sample has landed yet.
    pub fn average_speed(&self) -> f64 {
        if self.sample_count == 0 {
            return 0.0;
        }
        let sum: f64 = self.speed_samples[..self.sample_count].iter().sum();
        sum / self.sample_count as f64
    }

    /// Clear the window and counters but keep the learned chunk size.
    pub fn reset(&mut self) {
        let chunk = self.current_chunk_size;
        *self = AdaptiveState::new(self.total_bytes);
        self.current_chunk_size = chunk;
    }

    pub fn bytes_done(&self) -> u64 {
        self.bytes_done
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn elapsed(&self) -> Duration {
        self.transfer_start.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn past_interval(state: &AdaptiveState) -> Instant {
        state.last_adjustment + ADJUSTMENT_INTERVAL
    }

    #[test]
    fn starts_at_initial_chunk_size() {
        let mut state = AdaptiveState::new(1 << 20);
        assert_eq!(state.chunk_size(), INITIAL_CHUNK_SIZE);
        assert_eq!(state.average_speed(), 0.0);
        assert_eq!(state.bytes_done(), 0);
    }

    #[test]
    fn tier_table_matches_speeds() {
        assert_eq!(chunk_size_for_speed(500.0 * 1024.0), MIN_CHUNK_SIZE);
        assert_eq!(chunk_size_for_speed(5.0 * 1024.0 * 1024.0), 64 * 1024);
        assert_eq!(chunk_size_for_speed(20.0 * 1024.0 * 1024.0), 256 * 1024);
        assert_eq!(chunk_size_for_speed(80.0 * 1024.0 * 1024.0), 1024 * 1024);
        assert_eq!(chunk_size_for_speed(200.0 * 1024.0 * 1024.0), MAX_CHUNK_SIZE);
    }

    #[test]
    fn tier_boundaries_are_inclusive_below() {
        assert_eq!(chunk_size_for_speed(1.0 * 1024.0 * 1024.0), 64 * 1024);
        assert_eq!(chunk_size_for_speed(10.0 * 1024.0 * 1024.0), 256 * 1024);
        assert_eq!(chunk_size_for_speed(50.0 * 1024.0 * 1024.0), 1024 * 1024);
        assert_eq!(chunk_size_for_speed(100.0 * 1024.0 * 1024.0), MAX_CHUNK_SIZE);
    }

    #[test]
    fn slow_link_steps_down_to_min() {
        // ~500 KB/s sustained across the adjustment interval
        let mut state = AdaptiveState::new(10 << 20);
        for _ in 0..SPEED_SAMPLES {
            state.update(512 * 1024, 1.0);
        }
        state.update_at(512 * 1024, 1.0, past_interval(&state));
        assert_eq!(state.chunk_size(), MIN_CHUNK_SIZE);
    }

    #[test]
    fn fast_link_steps_up_to_max() {
        // ~200 MB/s sustained across the adjustment interval
        let mut state = AdaptiveState::new(10 << 30);
        for _ in 0..SPEED_SAMPLES {
            state.update(200 * 1024 * 1024, 1.0);
        }
        state.update_at(200 * 1024 * 1024, 1.0, past_interval(&state));
        assert_eq!(state.chunk_size(), MAX_CHUNK_SIZE);
    }

    #[test]
    fn sustained_rate_is_stable_after_adjustment() {
        let mut state = AdaptiveState::new(10 << 30);
        state.update_at(20 * 1024 * 1024, 1.0, past_interval(&state));
        assert_eq!(state.chunk_size(), 256 * 1024);

        // Same rate across further intervals leaves the size unchanged
        for _ in 0..3 {
            state.update_at(20 * 1024 * 1024, 1.0, past_interval(&state));
            assert_eq!(state.chunk_size(), 256 * 1024);
        }
    }

    #[test]
    fn adjustment_with_no_samples_selects_min() {
        let mut state = AdaptiveState::new(1 << 20);
        // Non-positive elapsed times are discarded, so the window stays empty
        state.update_at(4096, 0.0, past_interval(&state));
        state.update_at(4096, -1.0, past_interval(&state));
        assert_eq!(state.average_speed(), 0.0);

        state.update_at(64 * 1024, 1.0, past_interval(&state));
        // That single sample at 64 KB/s averages below 1 MB/s
        assert_eq!(state.chunk_size(), MIN_CHUNK_SIZE);
    }

    #[test]
    fn window_overwrites_oldest_sample() {
        let mut state = AdaptiveState::new(1 << 30);
        for _ in 0..SPEED_SAMPLES {
            state.update(1024, 1.0); // 1 KB/s
        }
        assert_eq!(state.average_speed(), 1024.0);

        // A full second round replaces every slot
        for _ in 0..SPEED_SAMPLES {
            state.update(2048, 1.0);
        }
        assert_eq!(state.average_speed(), 2048.0);
    }

    #[test]
    fn partial_window_averages_only_filled_slots() {
        let mut state = AdaptiveState::new(1 << 30);
        state.update(3000, 1.0);
        state.update(1000, 1.0);
        assert_eq!(state.average_speed(), 2000.0);
    }

    #[test]
    fn chunk_size_always_clamped() {
        let mut state = AdaptiveState::new(u64::MAX);
        for i in 0..200usize {
            let bytes = (i * 7919) % (4 << 20);
            let elapsed = if i % 5 == 0 { 0.0 } else { 0.25 };
            state.update_at(bytes, elapsed, past_interval(&state));
            let chunk = state.chunk_size();
            assert!((MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE).contains(&chunk));
        }
    }

    #[test]
    fn reset_preserves_chunk_size_and_clears_window() {
        let mut state = AdaptiveState::new(1 << 30);
        state.update_at(200 * 1024 * 1024, 1.0, past_interval(&state));
        assert_eq!(state.chunk_size(), MAX_CHUNK_SIZE);

        state.reset();
        assert_eq!(state.chunk_size(), MAX_CHUNK_SIZE);
        assert_eq!(state.average_speed(), 0.0);
        assert_eq!(state.bytes_done(), 0);
    }

    #[test]
    fn counters_accumulate() {
        let mut state = AdaptiveState::new(300);
        state.update(100, 1.0);
        state.update(200, 1.0);
        assert_eq!(state.bytes_done(), 300);
        assert_eq!(state.total_bytes(), 300);
    }
}
