//! Abstraction over the native audio service.
//!
//! The driver consumes four backend facilities: a context/connection API,
//! a device-metadata query API, a duplex stream API with buffer-attribute
//! negotiation, and asynchronous event delivery. Everything asynchronous
//! is reported through a registered [`EventSink`]; the device installs a
//! sink that marshals each event onto its event loop, so every backend
//! callback executes on the loop thread with the loop's lock held.
//!
//! Backends must deliver events from their own threads, never from inside
//! a trait-method call: the caller invokes those methods while holding
//! the loop lock, and a synchronous event post would deadlock.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use audio_duplex_core::{DeviceType, SampleSpec};

/// Failure reported synchronously by a backend call.
///
/// Asynchronous failures arrive as [`ContextState::Failed`] or
/// [`StreamState::Failed`] events instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("backend rejected parameters: {0}")]
    InvalidParams(String),

    #[error("backend i/o failure: {0}")]
    Io(String),
}

/// Connection ("context") lifecycle as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Connecting,
    Ready,
    Failed,
    Terminated,
}

/// Stream lifecycle as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Creating,
    Ready,
    Failed,
    Terminated,
}

/// Sample encoding a device reports as its native format.
///
/// The driver streams raw f32 over any linear PCM format (the server
/// converts); companded formats are rejected during discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NativeFormat {
    F32,
    S16,
    S24,
    S32,
    ULaw,
    ALaw,
}

impl NativeFormat {
    /// Whether the driver can open a raw float stream against a device
    /// with this native format.
    pub fn is_linear_pcm(&self) -> bool {
        matches!(self, Self::F32 | Self::S16 | Self::S24 | Self::S32)
    }
}

/// One device-enumeration record delivered during discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub name: String,
    pub rate: u32,
    pub channels: u16,
    pub format: NativeFormat,
}

/// Stream buffering attributes, in interleaved-sample units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferAttrs {
    /// Hard cap on the server-side buffer; `None` lets the server choose.
    pub max_samples: Option<usize>,
    /// Amount of audio the server should keep buffered (the target
    /// latency, converted).
    pub target_samples: usize,
    /// Preferred capture fragment size.
    pub fragment_samples: usize,
}

/// Asynchronous notification from the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEvent {
    /// Connection state changed.
    Context(ContextState),
    /// One enumeration record; may repeat before `DeviceInfoEnd`.
    DeviceInfo(DeviceInfo),
    /// End of the enumeration list.
    DeviceInfoEnd,
    /// Stream state changed.
    Stream(StreamState),
    /// Playback capacity became available, or a capture fragment became
    /// readable.
    StreamRequest { samples: usize },
}

/// Registered event dispatcher; the closure-captured equivalent of a C
/// callback-plus-userdata pair.
pub type EventSink = Arc<dyn Fn(BackendEvent) + Send + Sync>;

/// Entry point to one native audio service.
pub trait SoundBackend: Send + Sync {
    /// Backend name, for the registry and logs.
    fn name(&self) -> &str;

    /// Create the logical connection. State progress arrives as
    /// [`BackendEvent::Context`] events through `events`.
    fn connect(&self, events: EventSink) -> Result<Box<dyn ContextLink>, BackendError>;
}

/// An established (or establishing) connection to the audio service.
pub trait ContextLink: Send {
    /// Start one asynchronous metadata query for the named device (or
    /// the default device of that role). Records arrive as
    /// [`BackendEvent::DeviceInfo`] events, closed by
    /// [`BackendEvent::DeviceInfoEnd`].
    fn query_device(
        &mut self,
        device_type: DeviceType,
        name: Option<&str>,
    ) -> Result<Box<dyn InfoOp>, BackendError>;

    /// Create a duplex stream against the connection. Readiness arrives
    /// as [`BackendEvent::Stream`] events.
    fn open_stream(
        &mut self,
        device_type: DeviceType,
        name: Option<&str>,
        spec: &SampleSpec,
        attrs: &BufferAttrs,
    ) -> Result<Box<dyn StreamLink>, BackendError>;

    /// Tear the connection down. Safe to call on a connection that never
    /// reached ready, and safe to call repeatedly.
    fn disconnect(&mut self);
}

/// Handle to a pending device-metadata query.
pub trait InfoOp: Send {
    /// Abort the query; late records are dropped. Idempotent.
    fn cancel(&mut self);
}

/// One direction of audio data flow, bound to a context.
///
/// All methods are invoked by the caller's thread while it holds the
/// device's loop lock, so implementations need no locking of their own
/// beyond their internal sharing with the backend's service thread.
pub trait StreamLink: Send {
    /// Interleaved samples the playback buffer can accept right now.
    fn writable_samples(&mut self) -> usize;

    /// Push samples into the playback buffer. Callers never pass more
    /// than `writable_samples()` reported.
    fn write(&mut self, samples: &[f32]) -> Result<(), BackendError>;

    /// Take the next capture fragment, or `None` if nothing is buffered.
    fn pop_fragment(&mut self) -> Option<Vec<f32>>;

    /// Currently buffered latency, if the backend can report one.
    fn latency(&mut self) -> Option<Duration>;

    /// Cork or uncork the stream, best-effort.
    fn set_corked(&mut self, corked: bool);

    /// Tear the stream down. Safe to call repeatedly.
    fn disconnect(&mut self);
}
