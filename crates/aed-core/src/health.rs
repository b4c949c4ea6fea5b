//! Spike-mode health logging: per-interval summary lines plus spike-outage
//! detection.

use std::time::{Duration, Instant};

const OUTAGE_THRESHOLD: Duration = Duration::from_secs(60);

/// Wilson-Hilferty approximation of the median of a chi-squared distribution
/// with `df` degrees of freedom, used to normalize the byte-histogram
/// chi-squared statistic against its expected value under a fair die.
fn chi_squared_median(df: f64) -> f64 {
    df * (1.0 - 2.0 / (9.0 * df)).powi(3)
}

/// Accumulates the running statistics needed between two health-log lines,
/// and separately tracks the 60-second spike outage.
pub struct SpikeHealthAccumulator {
    log_interval: Duration,
    window_start: Instant,
    sample_rate: u32,

    spike_counts: Vec<u64>,
    isi_samples: Vec<f64>,

    retained_ones: u64,
    retained_bits_total: u64,

    byte_sum: u64,
    byte_count: u64,
    histogram: [u64; 256],
    zero_bytes: u64,
    ff_bytes: u64,

    // cumulative, for the Poisson baseline rate
    total_spikes: u64,
    run_started: Instant,

    last_spike_at: Option<Instant>,
    in_outage: bool,
    outage_started_at: Option<Instant>,
}

impl SpikeHealthAccumulator {
    pub fn new(n_channels: usize, sample_rate: u32, log_interval_seconds: f64) -> Self {
        let now = Instant::now();
        SpikeHealthAccumulator {
            log_interval: Duration::from_secs_f64(log_interval_seconds.max(0.0)),
            window_start: now,
            sample_rate,
            spike_counts: vec![0; n_channels],
            isi_samples: Vec::new(),
            retained_ones: 0,
            retained_bits_total: 0,
            byte_sum: 0,
            byte_count: 0,
            histogram: [0u64; 256],
            zero_bytes: 0,
            ff_bytes: 0,
            total_spikes: 0,
            run_started: now,
            last_spike_at: None,
            in_outage: false,
            outage_started_at: None,
        }
    }

    /// Record a qualifying spike on `channel`, observed `first_order_delta`
    /// samples after the previous one on that channel. Returns a recovery
    /// log line if this spike ends an active outage.
    pub fn record_spike(
        &mut self,
        channel: usize,
        first_order_delta: u64,
        now: Instant,
    ) -> Option<String> {
        if channel < self.spike_counts.len() {
            self.spike_counts[channel] += 1;
        }
        self.total_spikes += 1;
        if first_order_delta > 0 {
            self.isi_samples
                .push(first_order_delta as f64 / self.sample_rate as f64);
        }
        self.last_spike_at = Some(now);

        if self.in_outage {
            self.in_outage = false;
            let started = self.outage_started_at.take().unwrap_or(now);
            let elapsed = now.duration_since(started);
            return Some(format!(
                "spike outage recovered after {:.1}s",
                elapsed.as_secs_f64()
            ));
        }
        None
    }

    /// Record the `n_bits` retained (pre-whitening) bits of `bits_value`,
    /// feeding the running popcount-percentage binomial z-score.
    pub fn record_retained_bits(&mut self, bits_value: i64, n_bits: u32) {
        let mask: i64 = if n_bits >= 64 { -1 } else { (1i64 << n_bits) - 1 };
        self.retained_ones += (bits_value & mask).count_ones() as u64;
        self.retained_bits_total += n_bits as u64;
    }

    /// Record one emitted (post-whitening) byte, feeding the byte-sum,
    /// chi-squared, and all-zero/all-ff counters.
    pub fn record_emitted_byte(&mut self, byte: u8) {
        self.byte_sum += byte as u64;
        self.byte_count += 1;
        self.histogram[byte as usize] += 1;
        if byte == 0x00 {
            self.zero_bytes += 1;
        } else if byte == 0xFF {
            self.ff_bytes += 1;
        }
    }

    /// Check for a new 60-second spike outage. Call this frequently (e.g.
    /// once per incoming audio frame), independent of the log interval.
    pub fn check_outage(&mut self, now: Instant) -> Option<String> {
        if self.in_outage {
            return None;
        }
        let since_last = match self.last_spike_at {
            Some(last) => now.duration_since(last),
            None => now.duration_since(self.run_started),
        };
        if since_last >= OUTAGE_THRESHOLD {
            self.in_outage = true;
            self.outage_started_at = Some(now);
            return Some("no spikes observed for 60s, entering outage".to_string());
        }
        None
    }

    /// If `log_interval` has elapsed since the last summary, compute and
    /// reset the running statistics, returning the formatted log line.
    pub fn maybe_log(&mut self, now: Instant) -> Option<String> {
        if self.log_interval.is_zero() || now.duration_since(self.window_start) < self.log_interval
        {
            return None;
        }

        let elapsed = now.duration_since(self.window_start).as_secs_f64().max(1e-9);
        let window_spikes: u64 = self.spike_counts.iter().sum();

        let overall_elapsed = now.duration_since(self.run_started).as_secs_f64().max(1e-9);
        let overall_rate = self.total_spikes as f64 / overall_elapsed;
        let expected = (overall_rate * elapsed).max(1e-9);
        let poisson_z = (window_spikes as f64 - expected) / expected.sqrt();

        let retained_pct = if self.retained_bits_total > 0 {
            100.0 * self.retained_ones as f64 / self.retained_bits_total as f64
        } else {
            0.0
        };
        let binomial_z = if self.retained_bits_total > 0 {
            let n = self.retained_bits_total as f64;
            (self.retained_ones as f64 - n * 0.5) / (n * 0.25).sqrt()
        } else {
            0.0
        };

        let byte_mean = if self.byte_count > 0 {
            self.byte_sum as f64 / self.byte_count as f64
        } else {
            0.0
        };
        let irwin_hall_z = if self.byte_count > 0 {
            let n = self.byte_count as f64;
            // Discrete uniform over 0..=255: mean 127.5, variance (256^2 - 1) / 12.
            let variance_per_sample = (256.0 * 256.0 - 1.0) / 12.0;
            (self.byte_sum as f64 - n * 127.5) / (n * variance_per_sample).sqrt()
        } else {
            0.0
        };

        let chi_sq = if self.byte_count >= 256 {
            let expected_per_bin = self.byte_count as f64 / 256.0;
            let x: f64 = self
                .histogram
                .iter()
                .map(|&c| {
                    let diff = c as f64 - expected_per_bin;
                    diff * diff / expected_per_bin
                })
                .sum();
            x / chi_squared_median(255.0)
        } else {
            0.0
        };

        let avg_rate = window_spikes as f64 / elapsed;

        let burstiness = if self.isi_samples.len() >= 2 {
            let mean_isi: f64 = self.isi_samples.iter().sum::<f64>() / self.isi_samples.len() as f64;
            let mean_inv_isi: f64 = self
                .isi_samples
                .iter()
                .map(|&isi| 1.0 / isi.max(1e-12))
                .sum::<f64>()
                / self.isi_samples.len() as f64;
            mean_inv_isi * mean_isi - 1.0
        } else {
            0.0
        };

        let per_channel = self
            .spike_counts
            .iter()
            .enumerate()
            .map(|(i, &c)| format!("ch{i}={c}"))
            .collect::<Vec<_>>()
            .join(" ");

        let line = format!(
            "spike health: {per_channel} poisson_z={poisson_z:.3} \
             retained_ones_pct={retained_pct:.2} binomial_z={binomial_z:.3} \
             byte_mean={byte_mean:.2} irwin_hall_z={irwin_hall_z:.3} \
             chi2_norm={chi_sq:.3} zero_bytes={} ff_bytes={} \
             rate_hz={avg_rate:.4} burstiness={burstiness:.3}",
            self.zero_bytes, self.ff_bytes,
        );

        self.window_start = now;
        self.spike_counts.iter_mut().for_each(|c| *c = 0);
        self.isi_samples.clear();
        self.retained_ones = 0;
        self.retained_bits_total = 0;
        self.byte_sum = 0;
        self.byte_count = 0;
        self.histogram = [0u64; 256];
        self.zero_bytes = 0;
        self.ff_bytes = 0;

        Some(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_spike_increments_per_channel_count() {
        let mut health = SpikeHealthAccumulator::new(2, 11025, 3600.0);
        let now = Instant::now();
        health.record_spike(0, 1000, now);
        health.record_spike(1, 1000, now);
        assert_eq!(health.spike_counts, vec![1, 1]);
    }

    #[test]
    fn retained_bits_percentage_tracks_popcount() {
        let mut health = SpikeHealthAccumulator::new(1, 11025, 3600.0);
        health.record_retained_bits(0b1010, 4); // two of four bits set
        health.record_retained_bits(0b1111, 4); // four of four bits set
        assert_eq!(health.retained_ones, 6);
        assert_eq!(health.retained_bits_total, 8);
    }

    #[test]
    fn emitted_byte_tracks_zero_and_ff_counts() {
        let mut health = SpikeHealthAccumulator::new(1, 11025, 3600.0);
        health.record_emitted_byte(0x00);
        health.record_emitted_byte(0xFF);
        health.record_emitted_byte(0x42);
        assert_eq!(health.zero_bytes, 1);
        assert_eq!(health.ff_bytes, 1);
        assert_eq!(health.byte_count, 3);
        assert_eq!(health.byte_sum, 0x00 + 0xFF + 0x42);
    }

    #[test]
    fn outage_detected_after_threshold_and_cleared_on_next_spike() {
        let mut health = SpikeHealthAccumulator::new(1, 11025, 3600.0);
        let t0 = Instant::now();
        assert!(health.check_outage(t0).is_none());

        let t1 = t0 + Duration::from_secs(61);
        // No spike recorded since run start; outage should now fire.
        let outage = health.check_outage(t1);
        assert!(outage.is_some());

        let recovery = health.record_spike(0, 500, t1 + Duration::from_secs(5));
        assert!(recovery.is_some());
        assert!(recovery.unwrap().contains("recovered"));
    }

    #[test]
    fn maybe_log_is_none_before_interval_elapses() {
        let mut health = SpikeHealthAccumulator::new(1, 11025, 60.0);
        let now = Instant::now();
        assert!(health.maybe_log(now).is_none());
    }

    #[test]
    fn maybe_log_fires_after_interval_and_resets_counters() {
        let mut health = SpikeHealthAccumulator::new(1, 11025, 1.0);
        let t0 = Instant::now();
        health.record_spike(0, 1000, t0);
        health.record_emitted_byte(0xAA);

        let t1 = t0 + Duration::from_secs(2);
        let line = health.maybe_log(t1);
        assert!(line.is_some());
        assert!(line.unwrap().contains("spike health"));
        assert_eq!(health.byte_count, 0);
        assert_eq!(health.spike_counts[0], 0);
    }

    #[test]
    fn chi_squared_median_matches_known_approximation_at_255_df() {
        let median = chi_squared_median(255.0);
        // Wilson-Hilferty median for 255 d.f. is close to 254.3.
        assert!((median - 254.3).abs() < 1.0, "median={median}");
    }
}
