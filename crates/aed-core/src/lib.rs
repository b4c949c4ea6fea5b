//! # aed-core
//!
//! Entropy-harvesting core for `audio-entropyd`: a long-running daemon that
//! extracts unbiased bits from a stereo audio capture device and credits
//! the kernel random pool.
//!
//! Two independent strategies are implemented:
//!
//! - **Broadband** ([`extractor`]): a Von Neumann-style debiaser over pairs
//!   of stereo samples, continuously validated by a streaming FIPS 140-2
//!   monitor ([`fips`]) and an error-state flush machine.
//! - **Spike** ([`spike`]): inter-pulse interval timing (e.g. from a Geiger
//!   counter on the audio input), whitened through a keyed block-cipher CBC
//!   accumulator before being credited.
//!
//! [`harvester::Harvester`] owns both pipelines and the kernel-pool client,
//! arbitrating between modes per [`config::Configuration`]. Everything here
//! is single-threaded and synchronous; the only suspension points are the
//! kernel low-water wait, the blocking audio read, and file I/O.

pub mod audio;
pub mod bitcount;
pub mod cipher;
pub mod config;
pub mod error;
pub mod extractor;
pub mod fips;
pub mod harvester;
pub mod health;
pub mod sink;
pub mod spike;

pub use audio::{AudioSource, CpalAudioSource, SampleFormat};
pub use cipher::{Aes128Cipher, BlockCipher};
pub use config::Configuration;
pub use error::AedError;
pub use extractor::{ErrorState, ExtractorState};
pub use fips::{SlidingWindow, TestOutcome};
pub use harvester::Harvester;
pub use health::SpikeHealthAccumulator;
pub use sink::{FileSink, KernelEntropySink, LinuxKernelSink};
pub use spike::{SpikeAccumulator, SpikeChannelState, SpikeEvent};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
