//! # audio-duplex-driver
//!
//! Blocking, frame-based duplex I/O on top of an asynchronous,
//! callback-driven audio backend.
//!
//! Provides:
//! - `DuplexDevice` — one playback sink or capture source bridging the
//!   blocking `read`/`write` contract onto backend callbacks
//! - `EventLoop` — the dedicated loop thread with the lock/wait/signal
//!   and one-shot timer primitives the bridge relies on
//! - `SoundBackend` and friends — the abstraction a native backend
//!   implements
//! - `SimBackend` — an in-process simulated server for tests and demos
//! - `BackendRegistry` — process-wide backend registration
//!
//! ## Usage
//! ```no_run
//! use std::sync::Arc;
//!
//! use audio_duplex_core::{Device, DeviceConfig, DeviceType, Frame, Sink};
//! use audio_duplex_driver::{DuplexDevice, SimBackend, SimDevice};
//!
//! let backend = Arc::new(SimBackend::new());
//! backend.add_device(SimDevice::new("speakers", 48000, 2));
//!
//! let mut device =
//!     DuplexDevice::new(backend, DeviceConfig::default(), DeviceType::Sink).unwrap();
//! device.open(Some("speakers")).unwrap();
//!
//! let frame = Frame::new(device.sample_spec().samples_from_duration(
//!     DeviceConfig::default().frame_length,
//! ));
//! device.write(&frame).unwrap();
//! ```

pub mod backend;
pub mod device;
pub mod mainloop;
pub mod registry;
pub mod sim;

pub use backend::{
    BackendError, BackendEvent, BufferAttrs, ContextLink, ContextState, DeviceInfo, EventSink,
    InfoOp, NativeFormat, SoundBackend, StreamLink, StreamState,
};
pub use device::DuplexDevice;
pub use mainloop::{EventLoop, LoopGuard, LoopHandle, TimerId};
pub use registry::BackendRegistry;
pub use sim::{SimBackend, SimDevice};
