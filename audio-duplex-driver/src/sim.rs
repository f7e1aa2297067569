//! In-process simulated sound server.
//!
//! Implements [`SoundBackend`] without touching real hardware: a service
//! thread per connection answers protocol steps asynchronously (connect
//! becomes context-ready, a device query becomes info records plus
//! end-of-list, stream creation becomes stream-ready) and optionally
//! services the data plane. Tests drive the rest deterministically
//! through control methods: delivering capture fragments, draining or
//! withholding playback capacity, and injecting connection or stream
//! failures.
//!
//! Lock discipline: events are always posted after every sim lock is
//! released, so a post can never deadlock against a caller that holds
//! the device's loop lock while calling into the sim.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use audio_duplex_core::{DeviceType, SampleSpec};

use crate::backend::{
    BackendError, BackendEvent, BufferAttrs, ContextLink, ContextState, DeviceInfo, EventSink,
    InfoOp, NativeFormat, SoundBackend, StreamLink, StreamState,
};

/// Service-thread tick.
const TICK: Duration = Duration::from_millis(1);

/// One device the simulated server advertises.
#[derive(Debug, Clone)]
pub struct SimDevice {
    pub name: String,
    pub rate: u32,
    pub channels: u16,
    pub format: NativeFormat,
}

impl SimDevice {
    pub fn new(name: impl Into<String>, rate: u32, channels: u16) -> Self {
        Self {
            name: name.into(),
            rate,
            channels,
            format: NativeFormat::F32,
        }
    }

    pub fn with_format(mut self, format: NativeFormat) -> Self {
        self.format = format;
        self
    }

    fn info(&self) -> DeviceInfo {
        DeviceInfo {
            name: self.name.clone(),
            rate: self.rate,
            channels: self.channels,
            format: self.format,
        }
    }
}

/// Backend-wide settings and registries.
struct SimState {
    devices: Vec<SimDevice>,
    refuse_connections: bool,
    fail_next_stream: bool,
    auto_drain: bool,
    auto_capture: Option<usize>,
    contexts: Vec<Arc<CtxShared>>,
}

struct SimShared {
    state: Mutex<SimState>,
    /// Every sample accepted by any playback stream, for inspection.
    /// Dedicated lock, never held together with another sim lock.
    playback_log: Arc<Mutex<Vec<f32>>>,
}

/// Simulated sound server.
///
/// Control methods take `&self`, so tests keep an `Arc<SimBackend>`
/// clone next to the `Arc<dyn SoundBackend>` handed to the device.
pub struct SimBackend {
    shared: Arc<SimShared>,
}

impl SimBackend {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(SimShared {
                state: Mutex::new(SimState {
                    devices: Vec::new(),
                    refuse_connections: false,
                    fail_next_stream: false,
                    auto_drain: true,
                    auto_capture: None,
                    contexts: Vec::new(),
                }),
                playback_log: Arc::new(Mutex::new(Vec::new())),
            }),
        }
    }

    /// Advertise a device.
    pub fn add_device(&self, device: SimDevice) {
        self.shared.state.lock().devices.push(device);
    }

    /// Make future connection attempts report a failed context.
    pub fn refuse_connections(&self, refuse: bool) {
        self.shared.state.lock().refuse_connections = refuse;
    }

    /// Make the next stream creation report a failed stream.
    pub fn fail_next_stream(&self) {
        self.shared.state.lock().fail_next_stream = true;
    }

    /// Whether the server consumes playback data each tick (default) or
    /// leaves the buffer to fill up (stall simulation).
    pub fn set_auto_drain(&self, enabled: bool) {
        self.shared.state.lock().auto_drain = enabled;
    }

    /// Deliver a silent capture fragment of `samples` each tick, or stop
    /// automatic delivery with `None` (default).
    pub fn set_auto_capture(&self, samples: Option<usize>) {
        self.shared.state.lock().auto_capture = samples;
    }

    /// Push one capture fragment to the current capture stream.
    pub fn deliver_capture(&self, samples: Vec<f32>) {
        let delivered = samples.len();
        let target = self.active_stream(DeviceType::Source);
        if let Some((stream, events)) = target {
            stream.inner.lock().fragments.push_back(samples);
            events(BackendEvent::StreamRequest { samples: delivered });
        }
    }

    /// Free up to `samples` of playback capacity.
    pub fn drain_playback(&self, samples: usize) {
        let target = self.active_stream(DeviceType::Sink);
        if let Some((stream, events)) = target {
            let freed = {
                let mut inner = stream.inner.lock();
                let freed = inner.buffered.min(samples);
                inner.buffered -= freed;
                freed
            };
            if freed > 0 {
                events(BackendEvent::StreamRequest { samples: freed });
            }
        }
    }

    /// Report the current stream as failed.
    pub fn fail_stream(&self) {
        if let Some((stream, events)) = self.latest_stream() {
            stream.inner.lock().alive = false;
            events(BackendEvent::Stream(StreamState::Failed));
        }
    }

    /// Report the current connection as failed.
    pub fn fail_context(&self) {
        let events = {
            let state = self.shared.state.lock();
            state.contexts.last().map(|c| Arc::clone(&c.events))
        };
        if let Some(events) = events {
            events(BackendEvent::Context(ContextState::Failed));
        }
    }

    /// Every sample accepted by playback streams so far.
    pub fn written_samples(&self) -> Vec<f32> {
        self.shared.playback_log.lock().clone()
    }

    /// Latest live stream of the given role, with its event sink.
    fn active_stream(&self, device_type: DeviceType) -> Option<(Arc<StreamShared>, EventSink)> {
        let state = self.shared.state.lock();
        for ctx in state.contexts.iter().rev() {
            let inner = ctx.inner.lock();
            for stream in inner.streams.iter().rev() {
                let s = stream.inner.lock();
                if s.alive && s.device_type == device_type {
                    return Some((Arc::clone(stream), Arc::clone(&ctx.events)));
                }
            }
        }
        None
    }

    fn latest_stream(&self) -> Option<(Arc<StreamShared>, EventSink)> {
        let state = self.shared.state.lock();
        for ctx in state.contexts.iter().rev() {
            let inner = ctx.inner.lock();
            if let Some(stream) = inner.streams.last() {
                return Some((Arc::clone(stream), Arc::clone(&ctx.events)));
            }
        }
        None
    }
}

impl Default for SimBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SoundBackend for SimBackend {
    fn name(&self) -> &str {
        "sim"
    }

    fn connect(&self, events: EventSink) -> Result<Box<dyn ContextLink>, BackendError> {
        let ctx = Arc::new(CtxShared {
            events,
            inner: Mutex::new(CtxInner {
                alive: true,
                announced: false,
                queries: VecDeque::new(),
                streams: Vec::new(),
            }),
        });

        self.shared.state.lock().contexts.push(Arc::clone(&ctx));

        // Per-connection service thread; exits once the context is torn
        // down. Not joined: teardown runs under the device's loop lock,
        // and the loop handle goes weak once the device is gone anyway.
        let shared = Arc::clone(&self.shared);
        let thread_ctx = Arc::clone(&ctx);
        thread::Builder::new()
            .name("sim-backend-service".into())
            .spawn(move || service_loop(&shared, &thread_ctx))
            .map_err(|e| BackendError::Unavailable(format!("can't start service thread: {}", e)))?;

        Ok(Box::new(SimContext {
            ctx,
            playback_log: Arc::clone(&self.shared.playback_log),
        }))
    }
}

/// One pending device-info query.
struct QueryJob {
    name: Option<String>,
    cancelled: Arc<AtomicBool>,
}

struct CtxInner {
    alive: bool,
    announced: bool,
    queries: VecDeque<QueryJob>,
    streams: Vec<Arc<StreamShared>>,
}

struct CtxShared {
    events: EventSink,
    inner: Mutex<CtxInner>,
}

struct SimContext {
    ctx: Arc<CtxShared>,
    playback_log: Arc<Mutex<Vec<f32>>>,
}

impl ContextLink for SimContext {
    fn query_device(
        &mut self,
        _device_type: DeviceType,
        name: Option<&str>,
    ) -> Result<Box<dyn InfoOp>, BackendError> {
        // Sim devices serve both roles, so the role does not narrow the
        // lookup.
        let cancelled = Arc::new(AtomicBool::new(false));
        self.ctx.inner.lock().queries.push_back(QueryJob {
            name: name.map(str::to_owned),
            cancelled: Arc::clone(&cancelled),
        });
        Ok(Box::new(SimInfoOp { cancelled }))
    }

    fn open_stream(
        &mut self,
        device_type: DeviceType,
        _name: Option<&str>,
        spec: &SampleSpec,
        attrs: &BufferAttrs,
    ) -> Result<Box<dyn StreamLink>, BackendError> {
        let mut inner = self.ctx.inner.lock();
        if !inner.alive {
            return Err(BackendError::Io("context is closed".into()));
        }

        let stream = Arc::new(StreamShared {
            inner: Mutex::new(StreamInner {
                device_type,
                spec: *spec,
                capacity: attrs.target_samples,
                buffered: 0,
                fragments: VecDeque::new(),
                alive: true,
                announced: false,
                corked: false,
            }),
        });
        inner.streams.push(Arc::clone(&stream));
        drop(inner);

        Ok(Box::new(SimStream {
            stream,
            log: Arc::clone(&self.playback_log),
        }))
    }

    fn disconnect(&mut self) {
        self.ctx.inner.lock().alive = false;
    }
}

struct SimInfoOp {
    cancelled: Arc<AtomicBool>,
}

impl InfoOp for SimInfoOp {
    fn cancel(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

struct StreamInner {
    device_type: DeviceType,
    spec: SampleSpec,
    /// Playback buffer capacity in interleaved samples (the negotiated
    /// target length).
    capacity: usize,
    /// Samples accepted but not yet consumed by the "hardware".
    buffered: usize,
    /// Capture fragments awaiting the device.
    fragments: VecDeque<Vec<f32>>,
    alive: bool,
    announced: bool,
    corked: bool,
}

struct StreamShared {
    inner: Mutex<StreamInner>,
}

struct SimStream {
    stream: Arc<StreamShared>,
    log: Arc<Mutex<Vec<f32>>>,
}

impl StreamLink for SimStream {
    fn writable_samples(&mut self) -> usize {
        let inner = self.stream.inner.lock();
        if inner.device_type != DeviceType::Sink || !inner.alive {
            return 0;
        }
        inner.capacity.saturating_sub(inner.buffered)
    }

    fn write(&mut self, samples: &[f32]) -> Result<(), BackendError> {
        {
            let mut inner = self.stream.inner.lock();
            if !inner.alive {
                return Err(BackendError::Io("stream is closed".into()));
            }
            inner.buffered += samples.len();
        }
        self.log.lock().extend_from_slice(samples);
        Ok(())
    }

    fn pop_fragment(&mut self) -> Option<Vec<f32>> {
        self.stream.inner.lock().fragments.pop_front()
    }

    fn latency(&mut self) -> Option<Duration> {
        let inner = self.stream.inner.lock();
        if !inner.alive {
            return None;
        }
        let queued = match inner.device_type {
            DeviceType::Sink => inner.buffered,
            DeviceType::Source => inner.fragments.iter().map(Vec::len).sum(),
        };
        Some(inner.spec.duration_from_samples(queued))
    }

    fn set_corked(&mut self, corked: bool) {
        self.stream.inner.lock().corked = corked;
    }

    fn disconnect(&mut self) {
        self.stream.inner.lock().alive = false;
    }
}

/// Answers protocol steps and services the data plane until the context
/// dies. Every event post happens with all sim locks released.
fn service_loop(shared: &SimShared, ctx: &CtxShared) {
    loop {
        thread::sleep(TICK);

        let mut pending: Vec<BackendEvent> = Vec::new();

        {
            let mut state = shared.state.lock();
            let mut inner = ctx.inner.lock();

            if !inner.alive {
                break;
            }

            if !inner.announced {
                inner.announced = true;
                if state.refuse_connections {
                    pending.push(BackendEvent::Context(ContextState::Failed));
                } else {
                    pending.push(BackendEvent::Context(ContextState::Ready));
                }
            }

            while let Some(query) = inner.queries.pop_front() {
                if query.cancelled.load(Ordering::SeqCst) {
                    continue;
                }
                let record = state
                    .devices
                    .iter()
                    .find(|d| match query.name.as_deref() {
                        Some(name) => d.name == name,
                        None => true,
                    })
                    .map(SimDevice::info);
                if let Some(record) = record {
                    pending.push(BackendEvent::DeviceInfo(record));
                }
                pending.push(BackendEvent::DeviceInfoEnd);
            }

            inner.streams.retain(|stream| stream.inner.lock().alive);

            for stream in &inner.streams {
                let mut s = stream.inner.lock();

                if !s.announced {
                    s.announced = true;
                    if state.fail_next_stream {
                        state.fail_next_stream = false;
                        s.alive = false;
                        pending.push(BackendEvent::Stream(StreamState::Failed));
                        continue;
                    }
                    pending.push(BackendEvent::Stream(StreamState::Ready));
                }

                if s.corked {
                    continue;
                }

                match s.device_type {
                    DeviceType::Sink => {
                        if state.auto_drain && s.buffered > 0 {
                            let freed = s.buffered;
                            s.buffered = 0;
                            pending.push(BackendEvent::StreamRequest { samples: freed });
                        }
                    }
                    DeviceType::Source => {
                        if let Some(samples) = state.auto_capture {
                            s.fragments.push_back(vec![0.0; samples]);
                            pending.push(BackendEvent::StreamRequest { samples });
                        }
                    }
                }
            }
        }

        for event in pending {
            (ctx.events)(event);
        }
    }
}
