//! Blocking duplex device driver on top of an asynchronous backend.
//!
//! One [`DuplexDevice`] is either a playback sink or a capture source,
//! chosen at construction. It owns a private [`EventLoop`] thread; every
//! backend callback is marshalled onto that thread, and every blocking
//! public call is "signal work, wait on the loop's condvar, re-check
//! state" under the loop's lock. Two threads total: the caller's and the
//! loop's.
//!
//! Data flow, playback:
//! ```text
//! write(frame) ─→ [loop lock] ─→ StreamLink::write ≤ writable_samples
//!                     ↑  wait on capacity / underrun timer
//!        StreamRequest events (loop thread)
//! ```
//!
//! Data flow, capture:
//! ```text
//! read(frame) ←─ pending fragment (cursor preserved across calls)
//!                     ↑  wait on delivery / underrun timer → silence
//!        StreamRequest events (loop thread)
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use audio_duplex_core::{
    Device, DeviceConfig, DeviceError, DeviceState, DeviceType, Frame, RateLimiter, SampleFormat,
    SampleSpec, Sink, Source,
};

use crate::backend::{
    BackendEvent, BufferAttrs, ContextLink, ContextState, DeviceInfo, EventSink, InfoOp,
    SoundBackend, StreamLink, StreamState,
};
use crate::mainloop::{EventLoop, LoopGuard, TimerId};

/// How often the opportunistic latency report may log.
const LATENCY_REPORT_PERIOD: Duration = Duration::from_secs(5);

/// Connection state, owned by the connection manager. Driven only by
/// backend context events or explicit close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnState {
    Unopened,
    Connecting,
    Ready,
    Failed,
    Closed,
}

/// Stream state, owned by the stream lifecycle. Only reachable once the
/// connection is ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamPhase {
    None,
    Creating,
    Ready,
    Failed,
    Terminated,
}

/// Everything mutable, living inside the event loop's lock so callers
/// and backend callbacks are serialized by the same mutex.
struct DeviceCore {
    device_type: DeviceType,
    config: DeviceConfig,
    device_name: Option<String>,

    conn: ConnState,
    phase: StreamPhase,
    paused: bool,

    context: Option<Box<dyn ContextLink>>,
    stream: Option<Box<dyn StreamLink>>,

    info_op: Option<Box<dyn InfoOp>>,
    device_info: Option<DeviceInfo>,
    info_eol: bool,

    sample_spec: Option<SampleSpec>,

    // ns durations from `config` mirrored as sample counts against the
    // negotiated spec; always recomputed together in load_device_params.
    frame_len_samples: usize,
    target_latency_samples: usize,
    timeout_samples: usize,

    // Pending capture fragment: most recent chunk delivered by the
    // backend, with a consumption cursor surviving across read calls.
    frag: Vec<f32>,
    frag_pos: usize,
    frag_ready: bool,

    // At most one underrun timer pending per device.
    timer: Option<TimerId>,
    timer_deadline: Option<Instant>,
    timer_fired: bool,

    opened: bool,
    open_done: bool,

    latency_limiter: RateLimiter,
}

impl DeviceCore {
    fn new(device_type: DeviceType, config: DeviceConfig) -> Self {
        Self {
            device_type,
            config,
            device_name: None,
            conn: ConnState::Unopened,
            phase: StreamPhase::None,
            paused: false,
            context: None,
            stream: None,
            info_op: None,
            device_info: None,
            info_eol: false,
            sample_spec: None,
            frame_len_samples: 0,
            target_latency_samples: 0,
            timeout_samples: 0,
            frag: Vec::new(),
            frag_pos: 0,
            frag_ready: false,
            timer: None,
            timer_deadline: None,
            timer_fired: false,
            opened: false,
            open_done: false,
            latency_limiter: RateLimiter::new(LATENCY_REPORT_PERIOD),
        }
    }

    /// Backend callback dispatch. Runs on the loop thread with the lock
    /// held; the loop signals blocked callers afterwards.
    fn handle_event(&mut self, event: BackendEvent) {
        match event {
            BackendEvent::Context(state) => self.handle_context_state(state),
            BackendEvent::DeviceInfo(info) => {
                // Enumeration may deliver several records; only the first
                // is retained, and none after the query was cancelled.
                if self.info_op.is_some() && self.device_info.is_none() {
                    self.device_info = Some(info);
                }
            }
            BackendEvent::DeviceInfoEnd => {
                if self.info_op.is_some() {
                    self.info_eol = true;
                }
            }
            BackendEvent::Stream(state) => self.handle_stream_state(state),
            BackendEvent::StreamRequest { samples } => {
                // Nothing to record: waiters re-check writable capacity
                // or the fragment queue once the loop signals them.
                log::trace!("duplex device: stream request: samples={}", samples);
            }
        }
    }

    fn handle_context_state(&mut self, state: ContextState) {
        match state {
            ContextState::Connecting => {}
            ContextState::Ready => {
                if self.conn == ConnState::Connecting {
                    log::debug!("duplex device: connection ready");
                    self.conn = ConnState::Ready;
                }
            }
            ContextState::Failed | ContextState::Terminated => {
                if matches!(self.conn, ConnState::Connecting | ConnState::Ready) {
                    log::error!("duplex device: connection failed: state={:?}", state);
                    self.conn = ConnState::Failed;
                }
            }
        }
    }

    fn handle_stream_state(&mut self, state: StreamState) {
        match state {
            StreamState::Creating => {}
            StreamState::Ready => {
                if self.phase == StreamPhase::Creating {
                    log::debug!("duplex device: stream ready");
                    self.phase = StreamPhase::Ready;
                }
            }
            StreamState::Failed => {
                if matches!(self.phase, StreamPhase::Creating | StreamPhase::Ready) {
                    log::error!("duplex device: stream failed");
                    self.phase = StreamPhase::Failed;
                }
            }
            StreamState::Terminated => {
                if self.phase == StreamPhase::Ready {
                    log::debug!("duplex device: stream terminated by backend");
                    self.phase = StreamPhase::Terminated;
                }
            }
        }
    }
}

/// One frame request, either direction.
enum FrameIo<'a> {
    Playback(&'a Frame),
    Capture(&'a mut Frame),
}

/// Duplex audio device: sink or source depending on the constructor
/// parameter. Implements both capability traits and returns itself for
/// the active one.
pub struct DuplexDevice {
    device_type: DeviceType,
    backend: Arc<dyn SoundBackend>,
    event_loop: EventLoop<DeviceCore>,
}

impl DuplexDevice {
    /// Construct an unopened device. The role is immutable afterwards;
    /// configuration is validated here, once.
    pub fn new(
        backend: Arc<dyn SoundBackend>,
        config: DeviceConfig,
        device_type: DeviceType,
    ) -> Result<Self, DeviceError> {
        config.validate().map_err(DeviceError::BadConfig)?;

        let thread_name = match device_type {
            DeviceType::Sink => "duplex-sink-loop",
            DeviceType::Source => "duplex-source-loop",
        };

        Ok(Self {
            device_type,
            backend,
            event_loop: EventLoop::new(thread_name, DeviceCore::new(device_type, config)),
        })
    }

    /// Open the device: connect, discover native parameters, create the
    /// stream. Blocks until every asynchronous step reported ready or
    /// failed.
    ///
    /// # Panics
    ///
    /// Panics when called twice; that is caller misuse.
    pub fn open(&mut self, device: Option<&str>) -> Result<(), DeviceError> {
        log::debug!(
            "duplex device: opening: type={:?} device={:?} backend={}",
            self.device_type,
            device,
            self.backend.name()
        );

        self.event_loop.start()?;

        let mut guard = self.event_loop.lock();
        if guard.open_done {
            panic!("duplex device: open() called twice");
        }
        guard.open_done = true;
        guard.device_name = device.map(str::to_owned);

        let result = self.open_locked(&mut guard);
        match &result {
            Ok(()) => {
                guard.opened = true;
                log::debug!(
                    "duplex device: opened: spec={}",
                    guard.sample_spec.expect("spec negotiated")
                );
            }
            Err(e) => {
                log::error!("duplex device: open failed: {}", e);
                Self::close_locked(&mut guard);
            }
        }
        result
    }

    fn open_locked(&self, guard: &mut LoopGuard<'_, DeviceCore>) -> Result<(), DeviceError> {
        self.open_context(guard)?;
        self.run_discovery(guard)?;
        Self::open_stream_locked(guard)?;
        Ok(())
    }

    // --- Connection manager ---

    /// Create the logical connection and block until the backend reports
    /// ready or failed.
    fn open_context(&self, guard: &mut LoopGuard<'_, DeviceCore>) -> Result<(), DeviceError> {
        let context = self
            .backend
            .connect(self.event_sink())
            .map_err(|e| DeviceError::Device(format!("can't connect to backend: {}", e)))?;
        guard.context = Some(context);
        guard.conn = ConnState::Connecting;

        loop {
            match guard.conn {
                ConnState::Ready => return Ok(()),
                ConnState::Failed | ConnState::Closed => {
                    return Err(DeviceError::Device("backend connection failed".into()));
                }
                _ => guard.wait(),
            }
        }
    }

    /// The dispatcher handed to the backend: posts every callback onto
    /// the event loop, where it runs under the loop's lock.
    fn event_sink(&self) -> EventSink {
        let handle = self.event_loop.handle();
        Arc::new(move |event| {
            handle.post(move |core: &mut DeviceCore| core.handle_event(event));
        })
    }

    // --- Device discovery ---

    /// Issue one asynchronous metadata query and block until a record or
    /// end-of-list arrives, then negotiate the sample spec from it.
    fn run_discovery(&self, guard: &mut LoopGuard<'_, DeviceCore>) -> Result<(), DeviceError> {
        guard.device_info = None;
        guard.info_eol = false;

        let name = guard.device_name.clone();
        let op = guard
            .context
            .as_mut()
            .expect("context exists during discovery")
            .query_device(self.device_type, name.as_deref())
            .map_err(|e| DeviceError::Device(format!("can't query device info: {}", e)))?;
        guard.info_op = Some(op);

        let result = loop {
            if guard.conn != ConnState::Ready {
                break Err(DeviceError::Device(
                    "connection lost during discovery".into(),
                ));
            }
            if guard.device_info.is_some() {
                break Ok(());
            }
            if guard.info_eol {
                break Err(DeviceError::Device(format!(
                    "no such device: {:?}",
                    name.as_deref().unwrap_or("(default)")
                )));
            }
            guard.wait();
        };

        // Abort remaining enumeration whether we succeeded or the open
        // is being interrupted.
        Self::cancel_device_info(guard);
        result?;

        let info = guard.device_info.clone().expect("record retained above");
        Self::load_device_params(guard, &info)
    }

    fn cancel_device_info(guard: &mut LoopGuard<'_, DeviceCore>) {
        if let Some(mut op) = guard.info_op.take() {
            op.cancel();
        }
    }

    /// Adopt the discovered native parameters. Fails cleanly (no panic,
    /// no partial state) on formats the driver does not support.
    fn load_device_params(
        guard: &mut LoopGuard<'_, DeviceCore>,
        info: &DeviceInfo,
    ) -> Result<(), DeviceError> {
        if !info.format.is_linear_pcm() {
            return Err(DeviceError::BadConfig(format!(
                "device {} reports unsupported native format {:?}",
                info.name, info.format
            )));
        }

        // Native rate and channel layout, driver's raw float stream format.
        let spec = SampleSpec::new(info.rate, info.channels, SampleFormat::F32);
        spec.validate().map_err(DeviceError::BadConfig)?;

        let config = guard.config;
        let frame_len_samples = spec.samples_from_duration(config.frame_length);
        let target_latency_samples = spec.samples_from_duration(config.target_latency);
        let timeout_samples = spec.samples_from_duration(config.timeout);

        if frame_len_samples == 0 {
            return Err(DeviceError::BadConfig(
                "frame length is shorter than one frame at the device rate".into(),
            ));
        }
        if target_latency_samples == 0 {
            return Err(DeviceError::BadConfig(
                "target latency is shorter than one frame at the device rate".into(),
            ));
        }

        // The ns values and their sample-count mirrors change together.
        guard.sample_spec = Some(spec);
        guard.frame_len_samples = frame_len_samples;
        guard.target_latency_samples = target_latency_samples;
        guard.timeout_samples = timeout_samples;

        log::debug!(
            "duplex device: discovered: name={} spec={} frame={} target={} timeout={}",
            info.name,
            spec,
            guard.frame_len_samples,
            guard.target_latency_samples,
            guard.timeout_samples
        );
        Ok(())
    }

    // --- Stream lifecycle ---

    /// Buffering attributes derived from the target latency and the
    /// negotiated spec.
    fn stream_attrs(core: &DeviceCore) -> BufferAttrs {
        BufferAttrs {
            max_samples: None,
            target_samples: core.target_latency_samples,
            fragment_samples: core.frame_len_samples,
        }
    }

    /// Create the stream and block until it reports ready or failed,
    /// mirroring the connection manager's blocking pattern.
    fn open_stream_locked(guard: &mut LoopGuard<'_, DeviceCore>) -> Result<(), DeviceError> {
        let spec = guard.sample_spec.expect("spec negotiated before stream");
        let attrs = Self::stream_attrs(guard);
        let name = guard.device_name.clone();
        let device_type = guard.device_type;

        let stream = guard
            .context
            .as_mut()
            .expect("context exists during stream open")
            .open_stream(device_type, name.as_deref(), &spec, &attrs)
            .map_err(|e| DeviceError::Device(format!("can't create stream: {}", e)))?;
        guard.stream = Some(stream);
        guard.phase = StreamPhase::Creating;

        loop {
            if guard.conn != ConnState::Ready {
                return Err(DeviceError::Device(
                    "connection lost during stream open".into(),
                ));
            }
            match guard.phase {
                StreamPhase::Ready => break,
                StreamPhase::Failed | StreamPhase::Terminated => {
                    return Err(DeviceError::Device("stream failed to start".into()));
                }
                _ => guard.wait(),
            }
        }

        guard.frag.clear();
        guard.frag_pos = 0;
        guard.frag_ready = false;
        guard.paused = false;
        Ok(())
    }

    fn close_stream_locked(guard: &mut LoopGuard<'_, DeviceCore>) {
        Self::stop_timer(guard);
        if let Some(mut stream) = guard.stream.take() {
            stream.disconnect();
        }
        if guard.phase != StreamPhase::None {
            guard.phase = StreamPhase::Terminated;
        }
        guard.frag.clear();
        guard.frag_pos = 0;
        guard.frag_ready = false;
    }

    fn close_context_locked(guard: &mut LoopGuard<'_, DeviceCore>) {
        if let Some(mut context) = guard.context.take() {
            context.disconnect();
        }
        guard.conn = ConnState::Closed;
    }

    /// Unconditional teardown: timer, pending query, stream, context.
    /// Safe on objects that never reached ready, safe to repeat.
    fn close_locked(guard: &mut LoopGuard<'_, DeviceCore>) {
        Self::stop_timer(guard);
        Self::cancel_device_info(guard);
        Self::close_stream_locked(guard);
        Self::close_context_locked(guard);
        guard.opened = false;
    }

    // --- Underrun timer ---

    /// Arm the one-shot underrun timer. Exactly one may be pending;
    /// rearming cancels the prior one first.
    fn start_timer(guard: &mut LoopGuard<'_, DeviceCore>, timeout: Duration) {
        Self::stop_timer(guard);
        guard.timer_deadline = Some(Instant::now() + timeout);
        let id = guard.arm_timer(timeout, |core| {
            core.timer = None;
            // An early wakeup does not count as an expiry; the waiter
            // will rearm.
            if core.timer_deadline.take().is_some_and(|d| Instant::now() >= d) {
                core.timer_fired = true;
            }
        });
        guard.timer = Some(id);
    }

    /// Disarm; immediate and idempotent, safe when nothing is pending.
    fn stop_timer(guard: &mut LoopGuard<'_, DeviceCore>) {
        if let Some(id) = guard.timer.take() {
            guard.cancel_timer(id);
        }
        guard.timer_deadline = None;
        guard.timer_fired = false;
    }

    // --- Data bridge ---

    /// Precondition for `read`/`write`: open must have succeeded
    /// (misuse panics), connection and stream must be healthy
    /// (device error otherwise).
    fn check_io_ready(guard: &LoopGuard<'_, DeviceCore>) -> Result<(), DeviceError> {
        if !guard.opened {
            panic!("duplex device: i/o before successful open()");
        }
        if guard.conn != ConnState::Ready {
            return Err(DeviceError::Device("backend connection lost".into()));
        }
        match guard.phase {
            StreamPhase::Ready => Ok(()),
            _ => Err(DeviceError::Device("stream terminated".into())),
        }
    }

    /// The single synchronous entry point behind both `read` and
    /// `write`: acquire the loop's lock, run the direction-specific
    /// bridge, disarm the timer, report latency.
    fn request_frame(&mut self, io: FrameIo<'_>) -> Result<(), DeviceError> {
        let mut guard = self.event_loop.lock();
        Self::check_io_ready(&guard)?;

        match io {
            FrameIo::Playback(frame) => Self::write_stream(&mut guard, frame.samples())?,
            FrameIo::Capture(frame) => Self::read_stream(&mut guard, frame.samples_mut())?,
        }

        Self::stop_timer(&mut guard);
        Self::report_latency(&mut guard);
        Ok(())
    }

    /// Push caller samples into the backend stream, bounded by reported
    /// capacity, waiting for capacity when the buffer is full.
    fn write_stream(
        guard: &mut LoopGuard<'_, DeviceCore>,
        samples: &[f32],
    ) -> Result<(), DeviceError> {
        let mut pos = 0;
        while pos < samples.len() {
            let avail = Self::wait_writable(guard)?;
            let chunk = avail.min(samples.len() - pos);
            guard
                .stream
                .as_mut()
                .expect("stream exists while ready")
                .write(&samples[pos..pos + chunk])
                .map_err(|e| DeviceError::Device(format!("can't write to stream: {}", e)))?;
            pos += chunk;
        }
        Ok(())
    }

    /// Block until the playback buffer reports capacity, or fail with a
    /// device error once the underrun timer fires: a stalled backend
    /// must not hold the caller forever, and a short write is never
    /// silently dropped — bytes already accepted stay accepted.
    fn wait_writable(guard: &mut LoopGuard<'_, DeviceCore>) -> Result<usize, DeviceError> {
        loop {
            if guard.conn != ConnState::Ready || guard.phase != StreamPhase::Ready {
                Self::stop_timer(guard);
                return Err(DeviceError::Device("stream lost while writing".into()));
            }

            let avail = guard
                .stream
                .as_mut()
                .expect("stream exists while ready")
                .writable_samples();
            if avail > 0 {
                Self::stop_timer(guard);
                return Ok(avail);
            }

            if guard.timer_fired {
                Self::stop_timer(guard);
                log::error!("duplex device: timed out waiting for playback capacity");
                return Err(DeviceError::Device(
                    "timed out waiting for playback capacity".into(),
                ));
            }
            if guard.timer.is_none() {
                let timeout = guard.config.timeout;
                Self::start_timer(guard, timeout);
            }
            guard.wait();
        }
    }

    /// Drain the pending fragment into the caller's frame, pulling the
    /// next fragment or waiting when it runs dry. A timer expiry fills
    /// the remainder with silence instead of failing.
    fn read_stream(
        guard: &mut LoopGuard<'_, DeviceCore>,
        out: &mut [f32],
    ) -> Result<(), DeviceError> {
        let mut pos = 0;
        while pos < out.len() {
            if !guard.frag_ready {
                let next = guard
                    .stream
                    .as_mut()
                    .expect("stream exists while ready")
                    .pop_fragment();
                match next {
                    Some(data) => {
                        Self::stop_timer(guard);
                        guard.frag = data;
                        guard.frag_pos = 0;
                        guard.frag_ready = true;
                    }
                    None => {
                        if guard.conn != ConnState::Ready || guard.phase != StreamPhase::Ready {
                            Self::stop_timer(guard);
                            return Err(DeviceError::Device("stream lost while reading".into()));
                        }
                        if guard.timer_fired {
                            // Device went silent: satisfy the request with
                            // silence instead of blocking forever. Not an
                            // error, cadence is preserved downstream.
                            out[pos..].fill(0.0);
                            log::debug!(
                                "duplex device: capture timeout, inserting {} samples of silence",
                                out.len() - pos
                            );
                            break;
                        }
                        if guard.timer.is_none() {
                            let timeout = guard.config.timeout;
                            Self::start_timer(guard, timeout);
                        }
                        guard.wait();
                        continue;
                    }
                }
            }

            let take = (guard.frag.len() - guard.frag_pos).min(out.len() - pos);
            out[pos..pos + take]
                .copy_from_slice(&guard.frag[guard.frag_pos..guard.frag_pos + take]);
            pos += take;
            guard.frag_pos += take;

            if guard.frag_pos == guard.frag.len() {
                // Fully consumed; the cursor of a partial fragment
                // survives until then.
                guard.frag.clear();
                guard.frag_pos = 0;
                guard.frag_ready = false;
            }
        }
        Ok(())
    }

    // --- Latency monitor ---

    /// Opportunistic, rate-limited latency report. Absence of a figure
    /// is "unknown", never an error.
    fn report_latency(guard: &mut LoopGuard<'_, DeviceCore>) {
        if !guard.latency_limiter.allow() {
            return;
        }
        let target = guard.config.target_latency;
        if let Some(latency) = guard.stream.as_mut().and_then(|s| s.latency()) {
            log::debug!(
                "duplex device: latency={:?} target={:?}",
                latency,
                target
            );
        }
    }
}

impl Device for DuplexDevice {
    fn device_type(&self) -> DeviceType {
        self.device_type
    }

    fn state(&self) -> DeviceState {
        let guard = self.event_loop.lock();

        if !guard.open_done {
            return DeviceState::Idle;
        }
        match guard.conn {
            ConnState::Unopened | ConnState::Connecting => return DeviceState::Opening,
            ConnState::Failed => return DeviceState::Broken,
            ConnState::Closed => return DeviceState::Closed,
            ConnState::Ready => {}
        }
        match guard.phase {
            StreamPhase::None | StreamPhase::Creating => DeviceState::Opening,
            StreamPhase::Failed | StreamPhase::Terminated => DeviceState::Broken,
            StreamPhase::Ready => {
                if guard.paused {
                    DeviceState::Paused
                } else {
                    DeviceState::Active
                }
            }
        }
    }

    fn pause(&mut self) {
        let mut guard = self.event_loop.lock();
        if !guard.opened {
            panic!("duplex device: pause() before successful open()");
        }
        if guard.phase == StreamPhase::Ready {
            if let Some(stream) = guard.stream.as_mut() {
                stream.set_corked(true);
            }
        }
        guard.paused = true;
    }

    fn resume(&mut self) -> Result<(), DeviceError> {
        {
            let mut guard = self.event_loop.lock();
            if !guard.opened {
                panic!("duplex device: resume() before successful open()");
            }
            if guard.conn == ConnState::Ready && guard.phase == StreamPhase::Ready {
                if let Some(stream) = guard.stream.as_mut() {
                    stream.set_corked(false);
                }
                guard.paused = false;
                return Ok(());
            }
        }
        // The stream failed underneath us; resuming means restarting.
        self.restart()
    }

    fn restart(&mut self) -> Result<(), DeviceError> {
        let mut guard = self.event_loop.lock();
        if !guard.opened {
            panic!("duplex device: restart() before successful open()");
        }

        log::debug!("duplex device: restarting stream");
        Self::close_stream_locked(&mut guard);

        // The connection survives stream cycles; only the stream is
        // rebuilt. A dead connection is not recoverable here.
        if guard.conn != ConnState::Ready {
            return Err(DeviceError::Device(
                "can't restart: backend connection lost".into(),
            ));
        }

        // Device parameters may have changed while we were away.
        self.run_discovery(&mut guard)?;
        Self::open_stream_locked(&mut guard)?;
        Ok(())
    }

    fn sample_spec(&self) -> SampleSpec {
        let guard = self.event_loop.lock();
        if !guard.opened {
            panic!("duplex device: sample_spec() before successful open()");
        }
        guard.sample_spec.expect("spec negotiated during open")
    }

    fn latency(&self) -> Option<Duration> {
        let mut guard = self.event_loop.lock();
        if !guard.opened {
            panic!("duplex device: latency() before successful open()");
        }
        guard.stream.as_mut().and_then(|s| s.latency())
    }

    fn has_latency(&self) -> bool {
        true
    }

    fn has_clock(&self) -> bool {
        true
    }

    fn reclock(&mut self, _timestamp: Instant) {
        // The backend stream runs on the device clock; nothing to adjust.
    }

    fn as_sink(&mut self) -> Option<&mut dyn Sink> {
        match self.device_type {
            DeviceType::Sink => Some(self),
            DeviceType::Source => None,
        }
    }

    fn as_source(&mut self) -> Option<&mut dyn Source> {
        match self.device_type {
            DeviceType::Source => Some(self),
            DeviceType::Sink => None,
        }
    }
}

impl Sink for DuplexDevice {
    fn write(&mut self, frame: &Frame) -> Result<(), DeviceError> {
        if self.device_type != DeviceType::Sink {
            panic!("duplex device: write() called on capture device");
        }
        self.request_frame(FrameIo::Playback(frame))
    }
}

impl Source for DuplexDevice {
    fn read(&mut self, frame: &mut Frame) -> Result<(), DeviceError> {
        if self.device_type != DeviceType::Source {
            panic!("duplex device: read() called on playback device");
        }
        self.request_frame(FrameIo::Capture(frame))
    }
}

impl Drop for DuplexDevice {
    fn drop(&mut self) {
        // Drain teardown synchronously under the lock, then join the
        // loop thread: no callback can observe a half-destroyed device.
        {
            let mut guard = self.event_loop.lock();
            Self::close_locked(&mut guard);
        }
        self.event_loop.stop();
    }
}
