//! Spike detector: positive-going threshold-crossing detection and
//! variable-width bit-field derivation.

/// Bits most-significant discarded from the threshold's bit width when
/// computing `retained_bits_in_onset_sample`.
const ONSET_SAMPLE_DISCARD_MSBS: u32 = 11;

/// A qualified spike event's bit contribution, ready for the whitener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpikeEvent {
    pub bits_value: i64,
    pub n_bits: u32,
    pub first_order_delta: u64,
}

/// Per-channel running state for the spike detector.
pub struct SpikeChannelState {
    last_spike_sample_index: u64,
    last_interval: u64,
    prev_sample: i32,
    prev_spike_prev_sample: i32,
}

impl SpikeChannelState {
    pub fn new() -> Self {
        SpikeChannelState {
            last_spike_sample_index: 0,
            last_interval: 0,
            prev_sample: 0,
            prev_spike_prev_sample: 0,
        }
    }

    /// Convert a configured threshold percentage into the integer sample
    /// domain value used for crossing comparisons.
    pub fn threshold_int(threshold_pct: f64) -> i32 {
        let magnitude = ((threshold_pct.abs() / 100.0) * 32767.0) as i32;
        if threshold_pct < 0.0 {
            -magnitude
        } else {
            magnitude
        }
    }

    /// Number of low bits of the onset sample retained as phase entropy,
    /// a function only of the threshold magnitude, computed once at
    /// configuration time.
    pub fn retained_bits_in_onset_sample(threshold_int: i32) -> u32 {
        let bits = i32::BITS - threshold_int.leading_zeros() + 1;
        bits.saturating_sub(ONSET_SAMPLE_DISCARD_MSBS)
    }

    /// Feed one decoded sample for this channel at absolute `sample_index`.
    /// Returns `Some(event)` if this sample qualifies as a spike onset.
    pub fn feed(
        &mut self,
        sample_index: u64,
        word: i32,
        threshold_int: i32,
        edge_min_delta_int: i32,
        min_interval_samples: u64,
        retained_bits: u32,
    ) -> Option<SpikeEvent> {
        let qualifies = word > threshold_int
            && self.prev_sample < threshold_int
            && word - self.prev_sample > edge_min_delta_int
            && sample_index - self.last_spike_sample_index >= min_interval_samples;

        let event = if qualifies {
            let first_order_delta = sample_index - self.last_spike_sample_index;

            let clz_first = first_order_delta.max(1).leading_zeros();
            let n_sample_bits = if self.last_interval != 0 {
                let clz_last = self.last_interval.leading_zeros();
                64 - clz_first.min(clz_last)
            } else {
                64 - clz_first
            };
            let n_interval_bits = (n_sample_bits as i64 - 4).max(1) as u32;

            let second_order_delta = first_order_delta as i64 - self.last_interval as i64;
            let phase_delta = (self.prev_sample - self.prev_spike_prev_sample) as i64;

            let mask = (1i64 << retained_bits) - 1;
            let bits_value = (second_order_delta << retained_bits) | (phase_delta & mask);
            let n_bits_total = n_interval_bits + retained_bits;

            self.last_interval = first_order_delta;
            self.prev_spike_prev_sample = self.prev_sample;
            self.last_spike_sample_index = sample_index;

            Some(SpikeEvent {
                bits_value,
                n_bits: n_bits_total,
                first_order_delta,
            })
        } else {
            None
        };

        self.prev_sample = word;
        event
    }
}

impl Default for SpikeChannelState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // --- threshold / retained-bits computation ---

    #[test]
    fn threshold_int_50_percent() {
        assert_eq!(SpikeChannelState::threshold_int(50.0), 16383);
    }

    #[test]
    fn threshold_int_negative_inverts() {
        assert_eq!(SpikeChannelState::threshold_int(-50.0), -16383);
    }

    #[test]
    fn retained_bits_matches_reference_constant_for_default_threshold() {
        let threshold_int = SpikeChannelState::threshold_int(50.0);
        // 32 - clz(16383) + 1 - 11 == 32 - 18 + 1 - 11 == 4
        assert_eq!(SpikeChannelState::retained_bits_in_onset_sample(threshold_int), 4);
    }

    // --- boundary behavior: minimum-interval rejection ---

    #[test]
    fn rejects_sample_at_min_interval_minus_one() {
        let threshold_int = SpikeChannelState::threshold_int(50.0);
        let retained = SpikeChannelState::retained_bits_in_onset_sample(threshold_int);
        let mut ch = SpikeChannelState::new();

        // Prime a first spike at sample 200 (>= min_interval_samples from
        // the zero-initialized last_spike_sample_index).
        ch.feed(200, threshold_int + 1000, threshold_int, 20, 100, retained)
            .expect("primer spike must qualify");
        // Drive prev_sample back below threshold so the next crossing can
        // qualify on the edge/threshold conditions.
        ch.feed(201, 0, threshold_int, 20, 100, retained);

        // sample_index - last_spike_sample_index == min_interval - 1 == 99
        let idx = 200 + 99;
        let event = ch.feed(idx, threshold_int + 1000, threshold_int, 20, 100, retained);
        assert!(event.is_none());
    }

    #[test]
    fn accepts_sample_at_exactly_min_interval() {
        let threshold_int = SpikeChannelState::threshold_int(50.0);
        let retained = SpikeChannelState::retained_bits_in_onset_sample(threshold_int);
        let mut ch = SpikeChannelState::new();

        ch.feed(200, threshold_int + 1000, threshold_int, 20, 100, retained)
            .expect("primer spike must qualify");
        ch.feed(201, 0, threshold_int, 20, 100, retained);

        let idx = 300;
        let event = ch.feed(idx, threshold_int + 1000, threshold_int, 20, 100, retained);
        assert!(event.is_some());
    }

    // --- S5: spike interval scenario ---

    #[test]
    fn s5_first_and_second_order_deltas() {
        let threshold_int = SpikeChannelState::threshold_int(50.0); // 16383
        let retained = SpikeChannelState::retained_bits_in_onset_sample(threshold_int);
        let mut ch = SpikeChannelState::new();

        ch.last_spike_sample_index = 0;
        ch.last_interval = 900;
        ch.prev_sample = 0;

        let event = ch
            .feed(1000, 20000, threshold_int, 20, 100, retained)
            .expect("qualifying sample must produce an event");

        assert_eq!(ch.last_interval, 1000); // first_order_delta just computed
        // second_order_delta = 1000 - 900 = 100, embedded in the high bits.
        assert_eq!(event.bits_value >> retained, 100);
    }

    #[test]
    fn unqualified_sample_still_updates_prev_sample() {
        let threshold_int = SpikeChannelState::threshold_int(50.0);
        let retained = SpikeChannelState::retained_bits_in_onset_sample(threshold_int);
        let mut ch = SpikeChannelState::new();
        ch.feed(0, -5000, threshold_int, 20, 100, retained);
        assert_eq!(ch.prev_sample, -5000);
    }
}
