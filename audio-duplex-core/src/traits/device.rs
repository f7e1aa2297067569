use std::time::{Duration, Instant};

use crate::models::error::DeviceError;
use crate::models::frame::Frame;
use crate::models::sample_spec::SampleSpec;
use crate::models::state::DeviceState;

/// Whether a device plays back (`Sink`) or captures (`Source`) audio.
///
/// Fixed at construction; exactly one role is active per instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceType {
    Sink,
    Source,
}

/// Capability interface exposed to the pipeline.
///
/// Synchronous; safe to call from one thread at a time per instance
/// (encoded by the `&mut self` receivers). A device implements both the
/// sink and source capabilities and returns itself from the accessor
/// matching its role, `None` from the other.
pub trait Device: Send {
    /// The device's role, immutable after construction.
    fn device_type(&self) -> DeviceType;

    /// Current caller-visible state.
    fn state(&self) -> DeviceState;

    /// Pause I/O, best-effort. May be a no-op for backends whose live
    /// streams cannot be corked without data loss.
    fn pause(&mut self);

    /// Resume paused I/O. After a fatal stream failure, attempts a
    /// `restart()`.
    fn resume(&mut self) -> Result<(), DeviceError>;

    /// Rebuild the stream (not the connection) from scratch.
    fn restart(&mut self) -> Result<(), DeviceError>;

    /// Negotiated sample specification.
    ///
    /// # Panics
    ///
    /// Panics if the device was never opened; that is caller misuse.
    fn sample_spec(&self) -> SampleSpec;

    /// Currently buffered latency, or `None` when the backend cannot
    /// report one right now. Absence is "unknown", not an error.
    fn latency(&self) -> Option<Duration>;

    /// Whether the device supports latency reports at all.
    fn has_latency(&self) -> bool;

    /// Whether the device runs on its own hardware clock.
    fn has_clock(&self) -> bool;

    /// Adjust the device clock to match the consumer clock. No-op for
    /// devices without an adjustable clock.
    fn reclock(&mut self, timestamp: Instant);

    /// The sink capability, if this device plays back.
    fn as_sink(&mut self) -> Option<&mut dyn Sink>;

    /// The source capability, if this device captures.
    fn as_source(&mut self) -> Option<&mut dyn Source>;
}

/// Playback capability: accepts frames.
pub trait Sink: Device {
    /// Write one frame, blocking until the backend accepted all of it.
    ///
    /// Never silently drops a partial write: either the whole frame is
    /// accepted or a device error is returned.
    fn write(&mut self, frame: &Frame) -> Result<(), DeviceError>;
}

/// Capture capability: produces frames.
pub trait Source: Device {
    /// Read one frame, blocking until it is filled. If the device stalls
    /// past the configured timeout, the remainder is filled with silence
    /// and the call still succeeds.
    fn read(&mut self, frame: &mut Frame) -> Result<(), DeviceError>;
}
