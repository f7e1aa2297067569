use thiserror::Error;

/// Status taxonomy shared by every device in the pipeline.
///
/// `Ok(())` is the "ok" status; everything recoverable is one of these
/// variants. Caller misuse (double `open`, I/O before `open`) is a
/// programming error and panics instead of returning a status.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// Unsupported or mismatched device configuration, detected before any
    /// backend resource is created. Open fails immediately, nothing to
    /// clean up.
    #[error("bad device configuration: {0}")]
    BadConfig(String),

    /// Failure talking to the audio device: connection or stream reported a
    /// failed state, or a playback request stalled past the configured
    /// timeout.
    #[error("audio device failure: {0}")]
    Device(String),

    /// Failure working with a file sink.
    #[error("file failure: {0}")]
    File(String),

    /// The stream is fully read or written; no more data, ever.
    #[error("end of stream")]
    End,

    /// Transient would-block condition; the caller may retry.
    /// The driver itself never retries.
    #[error("temporary failure, retry later")]
    Retry,
}
