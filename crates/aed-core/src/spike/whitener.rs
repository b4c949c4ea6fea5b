//! Spike whitener: 128-bit accumulator with block-cipher CBC feedback.

use std::fs::{File, OpenOptions};
use std::io::Write;

use crate::cipher::BlockCipher;
use crate::error::AedError;
use crate::sink::KernelEntropySink;

/// Lifecycle stage of the accumulator's cipher bootstrap.
enum Stage {
    AwaitingKey,
    AwaitingFeedback,
    Running { last_emitted_block: u128 },
}

/// 128-bit accumulator feeding a keyed block-cipher CBC whitener.
pub struct SpikeAccumulator {
    bits: u128,
    filled: u32,
    stage: Stage,
    raw_out_path: Option<String>,
    raw_out_file: Option<File>,
    raw_out_written: u64,
    last_ciphertext: Option<[u8; 16]>,
}

impl SpikeAccumulator {
    pub fn new(raw_out_path: Option<String>) -> Self {
        SpikeAccumulator {
            bits: 0,
            filled: 0,
            stage: Stage::AwaitingKey,
            raw_out_path,
            raw_out_file: None,
            raw_out_written: 0,
            last_ciphertext: None,
        }
    }

    /// The most recent whitened 128-bit ciphertext block credited to the
    /// sink, if any has been emitted yet. Used by the control loop to feed
    /// emitted bytes into the spike health-log accumulator.
    pub fn last_ciphertext(&self) -> Option<[u8; 16]> {
        self.last_ciphertext
    }

    /// Accept `n_bits` of `bits_value` (its low `n_bits` bits), packing them
    /// into the accumulator and, once 128 bits have been collected, running
    /// the key/IV bootstrap or the CBC whitening step.
    pub fn accept(
        &mut self,
        bits_value: i64,
        n_bits: u32,
        cipher: &mut dyn BlockCipher,
        sink: &mut dyn KernelEntropySink,
    ) -> Result<(), AedError> {
        let mut value = bits_value;
        let mut effective_bits = n_bits;

        if self.filled + n_bits > 128 {
            let overflow = self.filled + n_bits - 128;
            value >>= overflow;
            effective_bits = n_bits - overflow;
        }

        let mask: u128 = if effective_bits >= 128 {
            u128::MAX
        } else {
            (1u128 << effective_bits) - 1
        };
        let masked_value = (value as u128) & mask;
        self.bits = if effective_bits >= 128 {
            masked_value
        } else {
            (self.bits << effective_bits) | masked_value
        };
        self.filled += effective_bits;

        if self.filled == 128 {
            self.flush_block(cipher, sink)?;
            let overflow = n_bits - effective_bits;
            if overflow > 0 {
                let overflow_mask: u128 = (1u128 << overflow) - 1;
                self.bits = (bits_value as u128) & overflow_mask;
            } else {
                self.bits = 0;
            }
            self.filled = overflow;
        }

        Ok(())
    }

    fn flush_block(
        &mut self,
        cipher: &mut dyn BlockCipher,
        sink: &mut dyn KernelEntropySink,
    ) -> Result<(), AedError> {
        match self.stage {
            Stage::AwaitingKey => {
                let key = self.bits.to_be_bytes();
                cipher.set_key(&key);
                self.stage = Stage::AwaitingFeedback;
            }
            Stage::AwaitingFeedback => {
                self.stage = Stage::Running {
                    last_emitted_block: self.bits,
                };
            }
            Stage::Running { last_emitted_block } => {
                self.maybe_write_raw(self.bits)?;

                let mut block = (self.bits ^ last_emitted_block).to_be_bytes();
                cipher.encrypt(&mut block);
                sink.credit(&block, 128)?;
                // Kernels have been observed not to fully honor the
                // declared credit; compensate explicitly.
                sink.add_to_entropy_count(128)?;
                self.last_ciphertext = Some(block);

                self.stage = Stage::Running {
                    last_emitted_block: self.bits,
                };
            }
        }
        Ok(())
    }

    /// Reopen the raw-output file if it's never been opened, or if a `stat`
    /// shows it was truncated or rotated out from under us (its size no
    /// longer covers what we've written through this handle) — mirrors the
    /// original's `maybe_reopen_raw_out_file`, which checks `stat(file,&st)`
    /// against `ftell(raw_out_file)` before every write.
    fn maybe_reopen_raw_out_file(&mut self, path: &str) {
        let needs_reopen = match std::fs::metadata(path) {
            Ok(meta) => self.raw_out_written > meta.len(),
            Err(_) => true,
        };
        if self.raw_out_file.is_none() || needs_reopen {
            self.raw_out_file = None;
            match OpenOptions::new().create(true).append(true).open(path) {
                Ok(file) => {
                    self.raw_out_file = Some(file);
                    self.raw_out_written = 0;
                }
                Err(e) => log::warn!("failed to reopen raw-output file \"{path}\": {e}"),
            }
        }
    }

    fn maybe_write_raw(&mut self, pre_encryption_block: u128) -> Result<(), AedError> {
        let Some(path) = self.raw_out_path.clone() else {
            return Ok(());
        };
        self.maybe_reopen_raw_out_file(&path);
        if let Some(file) = &mut self.raw_out_file {
            match file.write_all(&pre_encryption_block.to_be_bytes()) {
                Ok(()) => self.raw_out_written += 16,
                Err(_) => self.raw_out_file = None,
            }
        }
        Ok(())
    }
}
