//! CLI for `audio-entropyd`: argument parsing, daemon lifecycle wiring, and
//! the `self-test` diagnostic subcommand.

mod commands;
mod daemon;
mod signals;

use std::process::ExitCode;

use aed_core::{
    AedError, Aes128Cipher, Configuration, CpalAudioSource, FileSink, Harvester,
    KernelEntropySink, LinuxKernelSink,
};
use clap::{Parser, Subcommand};

const RANDOM_DEVICE: &str = "/dev/random";

/// Harvests entropy from a stereo audio capture device and credits the
/// kernel random pool, via broadband Von Neumann debiasing or spike-mode
/// interval whitening.
#[derive(Parser)]
#[command(name = "audio-entropyd")]
#[command(version = aed_core::VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// ALSA capture device identifier
    #[arg(short = 'd', long, default_value = "hw:0")]
    device: String,

    /// Sample rate in Hz
    #[arg(short = 'N', long = "sample-rate", default_value_t = 11025)]
    sample_rate: u32,

    /// Run in the foreground instead of forking into the background
    #[arg(short = 'n', long = "do-not-fork")]
    do_not_fork: bool,

    /// Skip the FIPS 140-2 health check and emit broadband bits unconditionally
    #[arg(short = 's', long = "skip-health-check")]
    skip_health_check: bool,

    /// Write raw output to this file instead of crediting the kernel pool
    #[arg(short = 'f', long = "output-file")]
    output_file: Option<String>,

    /// Increase logging verbosity (repeatable)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Harvest via spike (Geiger-counter interval) mode instead of broadband
    #[arg(short = 'k', long = "spike-mode")]
    spike_mode: bool,

    /// Spike onset threshold, signed percent of full scale
    #[arg(short = 't', long = "spike-threshold-percent", default_value_t = 50.0)]
    spike_threshold_percent: f64,

    /// Minimum rising-edge delta to qualify a spike onset, percent of full scale
    #[arg(short = 'T', long = "spike-edge-min-delta-percent", default_value_t = 20.0)]
    spike_edge_min_delta_percent: f64,

    /// Which stereo channels to run spike detection on: 1=left, 2=right, 3=both
    #[arg(short = 'c', long = "spike-channel-mask", default_value_t = 3)]
    spike_channel_mask: u8,

    /// Minimum samples between accepted spikes on the same channel
    #[arg(short = 'i', long = "spike-minimum-interval-frames", default_value_t = 100)]
    spike_minimum_interval_frames: u64,

    /// Print spike events to stdout instead of crediting the kernel pool
    #[arg(long = "spike-test-mode")]
    spike_test_mode: bool,

    /// Append spike-mode health-log lines to this file
    #[arg(long = "spike-log")]
    spike_log_path: Option<String>,

    /// Spike-mode health-log interval, in seconds
    #[arg(long = "spike-log-interval-seconds", default_value_t = 3600.0)]
    spike_log_interval_seconds: f64,

    /// PID file path
    #[arg(long = "pid-file", default_value = daemon::DEFAULT_PID_FILE)]
    pid_file: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the offline statistical battery against a captured raw-output file
    SelfTest {
        /// Path to a file of raw bytes captured via --output-file
        path: String,

        /// Write per-test results to this path in addition to stdout
        #[arg(long)]
        output: Option<String>,
    },
}

fn verbosity_level(verbose: i32) -> log::LevelFilter {
    match verbose.max(0) {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    }
}

/// `env_logger`'s own filter is left at its most permissive so that the
/// `log::set_max_level` calls `apply_verbosity_delta` makes in response to
/// SIGUSR1/SIGUSR2 can freely raise the active level later; env_logger never
/// narrows a record past what its own filter already passed.
fn init_logging(verbose: u8) {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Trace)
        .init();
    log::set_max_level(verbosity_level(verbose as i32));
}

/// Apply any SIGUSR1/SIGUSR2 verbosity change accumulated since the last
/// call, adjusting the live logging level without restarting the process.
fn apply_verbosity_delta(verbosity: &std::cell::Cell<i32>) {
    let delta = signals::take_verbosity_delta();
    if delta == 0 {
        return;
    }
    let next = verbosity.get() + delta as i32;
    verbosity.set(next);
    log::set_max_level(verbosity_level(next));
}

fn build_configuration(cli: &Cli) -> Configuration {
    Configuration {
        device: cli.device.clone(),
        sample_rate: cli.sample_rate,
        do_not_fork: cli.do_not_fork,
        skip_health_check: cli.skip_health_check,
        output_file: cli.output_file.clone(),
        verbose: cli.verbose,
        spike_mode: cli.spike_mode,
        spike_threshold_percent: cli.spike_threshold_percent,
        spike_edge_min_delta_percent: cli.spike_edge_min_delta_percent,
        spike_channel_mask: cli.spike_channel_mask,
        spike_minimum_interval_frames: cli.spike_minimum_interval_frames,
        spike_test_mode: cli.spike_test_mode,
        spike_log_path: cli.spike_log_path.clone(),
        spike_log_interval_seconds: cli.spike_log_interval_seconds,
    }
}

fn run_daemon(cli: &Cli) -> Result<(), AedError> {
    let config = build_configuration(cli);
    config.validate().map_err(AedError::ConfigInvalid)?;

    daemon::daemonize(config.do_not_fork);
    signals::install();

    if let Err(e) = daemon::write_pid_file(&cli.pid_file) {
        log::warn!("{e}");
    }
    daemon::lock_memory();
    daemon::raise_scheduling_priority();

    let result = run_harvester(config);

    daemon::remove_pid_file(&cli.pid_file);
    result
}

/// Builds the concrete collaborators and runs the control loop to
/// completion or fatal error. Split out from [`run_daemon`] so the PID file
/// is removed on every exit path, not just the happy one.
fn run_harvester(config: Configuration) -> Result<(), AedError> {
    let audio = CpalAudioSource::open(&config.device, config.sample_rate)?;
    let cipher = Aes128Cipher::new();

    // In spike mode, `output_file` is the whitener's pre-encryption raw tap
    // (wired into the accumulator, not the sink) and credit always flows to
    // the kernel. In broadband mode, `output_file` replaces the kernel sink
    // outright.
    if !config.spike_mode {
        if let Some(path) = &config.output_file {
            let sink = FileSink::open(path)?;
            return drive(config, audio, sink, cipher);
        }
    }
    let sink = LinuxKernelSink::open(RANDOM_DEVICE)?;
    drive(config, audio, sink, cipher)
}

fn drive<S: KernelEntropySink>(
    config: Configuration,
    audio: CpalAudioSource,
    sink: S,
    cipher: Aes128Cipher,
) -> Result<(), AedError> {
    let verbosity = std::cell::Cell::new(config.verbose as i32);
    let mut harvester = Harvester::new(config, audio, sink, cipher);
    let poll = || {
        apply_verbosity_delta(&verbosity);
        signals::shutdown_requested()
    };
    harvester.run_polling(&poll)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match &cli.command {
        Some(Commands::SelfTest { path, output }) => {
            commands::self_test::run(path, output.as_deref())
        }
        None => match run_daemon(&cli) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                log::error!("CRIT: {e}, exiting");
                ExitCode::FAILURE
            }
        },
    }
}
