//! # audio-duplex-core
//!
//! Backend-agnostic core for blocking, frame-based duplex audio I/O.
//!
//! Defines the data model and capability traits shared by every device in
//! the pipeline, plus the simple synchronous file-backed WAV sink. Backend
//! drivers (see `audio-duplex-driver`) implement the same traits on top of
//! an asynchronous native audio service.
//!
//! ## Architecture
//!
//! ```text
//! audio-duplex-core (this crate)
//! ├── models/       ← DeviceError, DeviceState, DeviceConfig, SampleSpec, Frame
//! ├── traits/       ← Device, Sink, Source capability interfaces
//! ├── processing/   ← PCM encoding, rate-limited reporting
//! └── storage/      ← WavSink (linear buffered file writer)
//! ```

pub mod models;
pub mod processing;
pub mod storage;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use models::config::DeviceConfig;
pub use models::error::DeviceError;
pub use models::frame::Frame;
pub use models::sample_spec::{SampleFormat, SampleSpec};
pub use models::state::DeviceState;
pub use processing::rate_limiter::RateLimiter;
pub use storage::wav_sink::WavSink;
pub use traits::device::{Device, DeviceType, Sink, Source};
