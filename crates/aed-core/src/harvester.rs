//! Entropy-credit control loop : mode arbitration between
//! broadband and spike harvesting, plus the outer credit loop that drives
//! both against the kernel-pool client.

use std::io::Write;
use std::time::Instant;

use crate::audio::{decode_frame, AudioSource};
use crate::bitcount::entropy_bits;
use crate::cipher::BlockCipher;
use crate::config::Configuration;
use crate::error::AedError;
use crate::extractor::{ErrorState, ExtractorState};
use crate::fips::SlidingWindow;
use crate::health::SpikeHealthAccumulator;
use crate::sink::KernelEntropySink;
use crate::spike::{SpikeAccumulator, SpikeChannelState};

/// Number of stereo frames read per `read_interleaved` call. One frame is
/// 4 bytes (two 16-bit samples); a broadband group needs 4 frames.
const FRAMES_PER_READ: usize = 256;

/// Owns every piece of mutable state the control loop touches: the FIPS
/// monitor, Von Neumann extractor, flush state machine, spike detector
/// channels, spike whitener, audio source, cipher context, and kernel sink.
/// Centralizing these here avoids process-wide globals without introducing
/// any concurrency — the whole loop is single-threaded and synchronous.
pub struct Harvester<A, S, C> {
    config: Configuration,
    audio: A,
    sink: S,
    cipher: C,

    window: SlidingWindow,
    extractor: ExtractorState,
    error_state: ErrorState,
    output: Vec<u8>,

    channels: Vec<SpikeChannelState>,
    accumulator: SpikeAccumulator,
    health: SpikeHealthAccumulator,
    sample_index: u64,

    shutdown_requested: bool,
}

impl<A: AudioSource, S: KernelEntropySink, C: BlockCipher> Harvester<A, S, C> {
    pub fn new(config: Configuration, audio: A, sink: S, cipher: C) -> Self {
        let enabled_channels = match config.spike_channel_mask {
            1 | 2 => 1,
            _ => 2,
        };
        let health = SpikeHealthAccumulator::new(
            enabled_channels,
            config.sample_rate,
            config.spike_log_interval_seconds,
        );
        let accumulator = SpikeAccumulator::new(config.output_file.clone());

        Harvester {
            audio,
            sink,
            cipher,
            window: SlidingWindow::new(),
            extractor: ExtractorState::new(),
            error_state: ErrorState::new(),
            output: Vec::new(),
            channels: (0..enabled_channels).map(|_| SpikeChannelState::new()).collect(),
            accumulator,
            health,
            sample_index: 0,
            config,
            shutdown_requested: false,
        }
    }

    /// Consulted at the loop's natural suspension points.
    pub fn request_shutdown(&mut self) {
        self.shutdown_requested = true;
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown_requested
    }

    fn should_continue(&self, external_stop: &dyn Fn() -> bool) -> bool {
        !self.shutdown_requested && !external_stop()
    }

    /// Dispatch to the configured harvesting mode. Equivalent to
    /// `run_polling(|| false)`, i.e. shutdown is only ever internal
    /// (`request_shutdown`) — used by tests that don't have a signal source.
    pub fn run(&mut self) -> Result<(), AedError> {
        self.run_polling(&|| false)
    }

    /// Dispatch to the configured harvesting mode, additionally polling
    /// `external_stop` at the loop's suspension points. `aed-cli` passes a
    /// closure over its process-global signal flag here, since the control
    /// loop itself never touches signal-handling state directly.
    pub fn run_polling(&mut self, external_stop: &dyn Fn() -> bool) -> Result<(), AedError> {
        if self.config.spike_mode {
            self.run_spike(external_stop)
        } else {
            self.run_broadband(external_stop)
        }
    }

    // --- broadband mode ---

    fn run_broadband(&mut self, external_stop: &dyn Fn() -> bool) -> Result<(), AedError> {
        let pool_max = self.sink.pool_max_bits();
        let writing_to_file = self.config.output_file.is_some();

        // Pre-fetch one batch before entering the loop to minimize latency
        // on the first low-water signal.
        self.fill_output_once()?;

        while self.should_continue(external_stop) {
            if !writing_to_file {
                self.sink.wait_until_low()?;
            }
            let before = self.sink.query_bits_available().unwrap_or(None);

            let mut credited: u32 = 0;
            while pool_max.map_or(true, |max| credited < max) && self.should_continue(external_stop) {
                if self.output.is_empty() {
                    let got = self.fill_output_once()?;
                    if got == 0 && !self.should_continue(external_stop) {
                        break;
                    }
                    if self.output.is_empty() {
                        continue;
                    }
                }

                let block = std::mem::take(&mut self.output);
                let declared_bits = entropy_bits(&block).floor() as u32;
                if declared_bits >= 1 {
                    self.sink.credit(&block, declared_bits)?;
                    credited += declared_bits;
                }

                if pool_max.is_none() {
                    // A plain file sink never terminates a round; yield back
                    // to the outer loop so shutdown is still observed.
                    break;
                }
            }

            let after = self.sink.query_bits_available().unwrap_or(None);
            log::info!(
                "credit round: {credited} bits submitted (pool {before:?} -> {after:?})"
            );
        }
        Ok(())
    }

    /// Read one batch of audio frames and run the Von Neumann extractor
    /// over every complete group of four stereo samples, feeding completed
    /// bytes through the FIPS monitor / flush machine into `self.output`.
    /// Returns the number of raw audio frames consumed.
    fn fill_output_once(&mut self) -> Result<usize, AedError> {
        let mut buf = vec![0u8; FRAMES_PER_READ * 4];
        let n_bytes = self.read_with_recovery(&mut buf)?;
        let n_frames = n_bytes / 4;
        let format = self.audio.accepted_format();

        let mut groups = n_frames / 4;
        let mut i = 0;
        while groups > 0 {
            let f1: [u8; 4] = buf[i * 4..i * 4 + 4].try_into().unwrap();
            let f2: [u8; 4] = buf[(i + 1) * 4..(i + 1) * 4 + 4].try_into().unwrap();
            let f3: [u8; 4] = buf[(i + 2) * 4..(i + 2) * 4 + 4].try_into().unwrap();
            let f4: [u8; 4] = buf[(i + 3) * 4..(i + 3) * 4 + 4].try_into().unwrap();
            let (w1, w2) = decode_frame(&f1, format);
            let (w3, w4) = decode_frame(&f2, format);
            let (w1b, w2b) = decode_frame(&f3, format);
            let (w3b, w4b) = decode_frame(&f4, format);
            // feed_group consumes one group of four samples per call; two
            // stereo frame-pairs (f1/f2 and f3/f4) each supply one pair.
            if let Some(byte) = self.extractor.feed_group(w1, w2, w3, w4) {
                self.error_state.observe(
                    byte,
                    &mut self.window,
                    &mut self.output,
                    !self.config.skip_health_check,
                );
            }
            if let Some(byte) = self.extractor.feed_group(w1b, w2b, w3b, w4b) {
                self.error_state.observe(
                    byte,
                    &mut self.window,
                    &mut self.output,
                    !self.config.skip_health_check,
                );
            }
            i += 4;
            groups -= 1;
        }

        Ok(n_frames)
    }

    fn read_with_recovery(&mut self, buf: &mut [u8]) -> Result<usize, AedError> {
        match self.audio.read_interleaved(buf) {
            Ok(n) => Ok(n),
            Err(_) => {
                log::warn!("audio capture read error, retrying once");
                self.audio.read_interleaved(buf)
            }
        }
    }

    // --- spike mode  ---

    fn run_spike(&mut self, external_stop: &dyn Fn() -> bool) -> Result<(), AedError> {
        let threshold_int = SpikeChannelState::threshold_int(self.config.spike_threshold_percent);
        let edge_min_delta_int =
            ((self.config.spike_edge_min_delta_percent / 100.0) * 32767.0).round() as i32;
        let retained_bits = SpikeChannelState::retained_bits_in_onset_sample(threshold_int);
        let min_interval = self.config.spike_minimum_interval_frames;
        let mask = self.config.spike_channel_mask;

        let mut buf = [0u8; FRAMES_PER_READ * 4];
        while self.should_continue(external_stop) {
            let n_bytes = self.read_with_recovery(&mut buf)?;
            let n_frames = n_bytes / 4;
            let format = self.audio.accepted_format();

            for frame in 0..n_frames {
                let bytes: [u8; 4] = buf[frame * 4..frame * 4 + 4].try_into().unwrap();
                let (left, right) = decode_frame(&bytes, format);
                let samples = [left, right];

                let now = Instant::now();
                if let Some(line) = self.health.check_outage(now) {
                    log::warn!("{line}");
                }

                let mut slot = 0usize;
                for ch in 0..2 {
                    if mask & (1 << ch) == 0 {
                        continue;
                    }
                    let word = if self.config.spike_threshold_percent < 0.0 {
                        -samples[ch]
                    } else {
                        samples[ch]
                    };
                    if let Some(event) = self.channels[slot].feed(
                        self.sample_index,
                        word,
                        threshold_int,
                        edge_min_delta_int,
                        min_interval,
                        retained_bits,
                    ) {
                        if let Some(line) =
                            self.health.record_spike(slot, event.first_order_delta, now)
                        {
                            log::info!("{line}");
                        }
                        self.health.record_retained_bits(event.bits_value, event.n_bits);

                        if self.config.spike_test_mode {
                            println!(
                                "spike ch{slot} idx={} bits=0x{:x} n_bits={}",
                                self.sample_index, event.bits_value, event.n_bits
                            );
                        } else {
                            let before = self.accumulator.last_ciphertext();
                            self.accumulator.accept(
                                event.bits_value,
                                event.n_bits,
                                &mut self.cipher,
                                &mut self.sink,
                            )?;
                            let after = self.accumulator.last_ciphertext();
                            if after.is_some() && after != before {
                                for byte in after.unwrap() {
                                    self.health.record_emitted_byte(byte);
                                }
                            }
                        }
                    }
                    slot += 1;
                }

                if let Some(line) = self.health.maybe_log(now) {
                    log::info!("{line}");
                    self.write_spike_log(&line);
                }

                self.sample_index += 1;
            }
        }
        Ok(())
    }

    /// Append one line to the configured spike log, reopening the path on
    /// every write rather than holding a file descriptor that an external
    /// `logrotate`-style tool could rename out from under us.
    fn write_spike_log(&self, line: &str) {
        let Some(path) = &self.config.spike_log_path else {
            return;
        };
        let opened = std::fs::OpenOptions::new().create(true).append(true).open(path);
        let result = match opened {
            Ok(mut f) => writeln!(f, "{line}"),
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            log::warn!("failed to write spike log \"{path}\": {e}");
        }
    }
}
