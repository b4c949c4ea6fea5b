//! Error kinds.

use thiserror::Error;

/// The daemon's error kinds, each with its own recovery policy:
/// `CaptureRead` is retried once via the adapter's recovery call before
/// becoming fatal; `HealthFail` is absorbed by the flush state machine and
/// never propagates as fatal; `SinkIo` is fatal against the kernel sink but
/// logged-and-dropped against a file sink; `ConfigInvalid` aborts at
/// startup.
#[derive(Debug, Error)]
pub enum AedError {
    #[error("audio capture read error: {0}")]
    CaptureRead(#[source] std::io::Error),

    #[error("audio capture configuration error: {0}")]
    CaptureConfig(String),

    #[error("kernel/file sink I/O error: {0}")]
    SinkIo(#[source] std::io::Error),

    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("RNG health check failed")]
    HealthFail,

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages_name_the_kind() {
        let err = AedError::ConfigInvalid("spike-threshold-percent out of range".into());
        assert!(err.to_string().contains("invalid configuration"));
    }

    #[test]
    fn capture_read_wraps_an_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::Other, "device vanished");
        let err = AedError::CaptureRead(io_err);
        assert!(err.to_string().contains("capture read error"));
    }
}
