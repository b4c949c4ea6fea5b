//! Configuration record.

/// Immutable daemon configuration, built once by `aed-cli` from parsed
/// arguments (or by a test harness) and passed by value into [`crate::Harvester`].
#[derive(Debug, Clone)]
pub struct Configuration {
    pub device: String,
    pub sample_rate: u32,
    pub do_not_fork: bool,
    pub skip_health_check: bool,
    pub output_file: Option<String>,
    pub verbose: u8,

    pub spike_mode: bool,
    pub spike_threshold_percent: f64,
    pub spike_edge_min_delta_percent: f64,
    pub spike_channel_mask: u8,
    pub spike_minimum_interval_frames: u64,
    pub spike_test_mode: bool,
    pub spike_log_path: Option<String>,
    pub spike_log_interval_seconds: f64,
}

impl Configuration {
    /// Defaults matching `audio-entropyd`'s long-standing command-line
    /// defaults: 11025 Hz, `hw:0`, a 50% spike threshold, and so on.
    pub fn defaults() -> Self {
        Configuration {
            device: "hw:0".to_string(),
            sample_rate: 11025,
            do_not_fork: false,
            skip_health_check: false,
            output_file: None,
            verbose: 0,
            spike_mode: false,
            spike_threshold_percent: 50.0,
            spike_edge_min_delta_percent: 20.0,
            spike_channel_mask: 0x3,
            spike_minimum_interval_frames: 100,
            spike_test_mode: false,
            spike_log_path: None,
            spike_log_interval_seconds: 3600.0,
        }
    }

    /// Validate the enumerated option ranges. Returns the first violation
    /// found, formatted for `AedError::ConfigInvalid`.
    pub fn validate(&self) -> Result<(), String> {
        if !(-100.0..=100.0).contains(&self.spike_threshold_percent) {
            return Err(format!(
                "spike-threshold-percent must be within [-100, 100], got {}",
                self.spike_threshold_percent
            ));
        }
        if !(0.0..=100.0).contains(&self.spike_edge_min_delta_percent) {
            return Err(format!(
                "spike-edge-min-delta-percent must be within [0, 100], got {}",
                self.spike_edge_min_delta_percent
            ));
        }
        if !matches!(self.spike_channel_mask, 1 | 2 | 3) {
            return Err(format!(
                "spike-channel-mask must be one of {{1, 2, 3}}, got {}",
                self.spike_channel_mask
            ));
        }
        if self.spike_log_interval_seconds < 0.0 {
            return Err("spike-log-interval-seconds must be >= 0".to_string());
        }
        Ok(())
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        assert!(Configuration::defaults().validate().is_ok());
    }

    #[test]
    fn rejects_threshold_out_of_range() {
        let mut cfg = Configuration::defaults();
        cfg.spike_threshold_percent = 150.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_bad_channel_mask() {
        let mut cfg = Configuration::defaults();
        cfg.spike_channel_mask = 0;
        assert!(cfg.validate().is_err());
        cfg.spike_channel_mask = 4;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_negative_log_interval() {
        let mut cfg = Configuration::defaults();
        cfg.spike_log_interval_seconds = -1.0;
        assert!(cfg.validate().is_err());
    }
}
