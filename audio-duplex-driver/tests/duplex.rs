//! End-to-end tests of the blocking duplex API against the simulated
//! backend.

use std::sync::Arc;
use std::time::{Duration, Instant};

use audio_duplex_core::{
    Device, DeviceConfig, DeviceError, DeviceState, DeviceType, Frame, SampleFormat, Sink, Source,
};
use audio_duplex_driver::{BackendRegistry, DuplexDevice, NativeFormat, SimBackend, SimDevice};

const DEVICE_NAME: &str = "sim-device";

fn test_config() -> DeviceConfig {
    DeviceConfig {
        target_latency: Duration::from_millis(40),
        frame_length: Duration::from_millis(10),
        timeout: Duration::from_millis(60),
    }
}

fn backend_with_device() -> Arc<SimBackend> {
    let backend = Arc::new(SimBackend::new());
    backend.add_device(SimDevice::new(DEVICE_NAME, 48000, 2));
    backend
}

fn open_device(backend: &Arc<SimBackend>, device_type: DeviceType) -> DuplexDevice {
    let mut device =
        DuplexDevice::new(backend.clone(), test_config(), device_type).unwrap();
    device.open(Some(DEVICE_NAME)).unwrap();
    device
}

/// One frame's worth of interleaved samples at the test spec:
/// 10ms x 48000Hz x 2ch.
const FRAME_SAMPLES: usize = 960;

fn wait_for_state(device: &DuplexDevice, state: DeviceState) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while device.state() != state {
        assert!(
            Instant::now() < deadline,
            "device never reached {:?}, still {:?}",
            state,
            device.state()
        );
        std::thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn negotiated_spec_matches_backend() {
    let backend = backend_with_device();
    let device = open_device(&backend, DeviceType::Sink);

    let spec = device.sample_spec();
    assert_eq!(spec.rate, 48000);
    assert_eq!(spec.channels, 2);
    assert_eq!(spec.format, SampleFormat::F32);

    // Stable across calls.
    assert_eq!(device.sample_spec(), spec);
    assert_eq!(device.state(), DeviceState::Active);
}

#[test]
fn default_device_is_used_without_name() {
    let backend = backend_with_device();
    let mut device =
        DuplexDevice::new(backend.clone(), test_config(), DeviceType::Sink).unwrap();
    device.open(None).unwrap();
    assert_eq!(device.sample_spec().rate, 48000);
}

#[test]
#[should_panic(expected = "open() called twice")]
fn open_twice_panics() {
    let backend = backend_with_device();
    let mut device = open_device(&backend, DeviceType::Sink);
    let _ = device.open(Some(DEVICE_NAME));
}

#[test]
#[should_panic(expected = "before successful open")]
fn write_before_open_panics() {
    let backend = backend_with_device();
    let mut device =
        DuplexDevice::new(backend.clone(), test_config(), DeviceType::Sink).unwrap();
    let _ = device.write(&Frame::new(FRAME_SAMPLES));
}

#[test]
#[should_panic(expected = "read() called on playback device")]
fn read_on_sink_panics() {
    let backend = backend_with_device();
    let mut device = open_device(&backend, DeviceType::Sink);
    let _ = device.read(&mut Frame::new(FRAME_SAMPLES));
}

#[test]
fn dual_role_capabilities() {
    let backend = backend_with_device();

    let mut sink = open_device(&backend, DeviceType::Sink);
    assert_eq!(sink.device_type(), DeviceType::Sink);
    assert!(sink.as_sink().is_some());
    assert!(sink.as_source().is_none());
    assert!(sink.has_latency());
    assert!(sink.has_clock());

    let mut source = open_device(&backend, DeviceType::Source);
    assert_eq!(source.device_type(), DeviceType::Source);
    assert!(source.as_sink().is_none());
    assert!(source.as_source().is_some());
}

#[test]
fn capture_timeout_yields_silence() {
    let backend = backend_with_device();
    let mut device = open_device(&backend, DeviceType::Source);

    // Nothing is delivered; the underrun timer must satisfy the read.
    let mut frame = Frame::from_samples(vec![0.5; FRAME_SAMPLES]);
    let started = Instant::now();
    device.read(&mut frame).unwrap();

    assert!(started.elapsed() >= Duration::from_millis(60));
    assert_eq!(frame.num_samples(), FRAME_SAMPLES);
    assert!(frame.is_silence());
}

#[test]
fn capture_drains_delivered_fragments() {
    let backend = backend_with_device();
    let mut device = open_device(&backend, DeviceType::Source);

    let ramp: Vec<f32> = (0..FRAME_SAMPLES).map(|i| i as f32).collect();
    backend.deliver_capture(ramp.clone());

    let mut frame = Frame::new(FRAME_SAMPLES);
    device.read(&mut frame).unwrap();
    assert_eq!(frame.samples(), ramp.as_slice());
}

#[test]
fn fragment_larger_than_frame_is_drained_without_loss() {
    let backend = backend_with_device();
    let mut device = open_device(&backend, DeviceType::Source);

    // 2.5 frames worth of distinguishable samples.
    let total = FRAME_SAMPLES * 5 / 2;
    let ramp: Vec<f32> = (0..total).map(|i| i as f32).collect();
    backend.deliver_capture(ramp.clone());

    let mut first = Frame::new(FRAME_SAMPLES);
    device.read(&mut first).unwrap();
    assert_eq!(first.samples(), &ramp[..FRAME_SAMPLES]);

    let mut second = Frame::new(FRAME_SAMPLES);
    device.read(&mut second).unwrap();
    assert_eq!(second.samples(), &ramp[FRAME_SAMPLES..FRAME_SAMPLES * 2]);

    // Third read consumes the remaining half fragment; the rest of the
    // frame is silence filled once the timer fires.
    let mut third = Frame::new(FRAME_SAMPLES);
    device.read(&mut third).unwrap();
    let tail = &ramp[FRAME_SAMPLES * 2..];
    assert_eq!(&third.samples()[..tail.len()], tail);
    assert!(third.samples()[tail.len()..].iter().all(|s| *s == 0.0));
}

#[test]
fn capture_keeps_cadence_with_auto_delivery() {
    let backend = backend_with_device();
    backend.set_auto_capture(Some(FRAME_SAMPLES));
    let mut device = open_device(&backend, DeviceType::Source);

    let mut frame = Frame::new(FRAME_SAMPLES);
    for _ in 0..5 {
        device.read(&mut frame).unwrap();
    }
}

#[test]
fn playback_accepts_frames_and_reports_latency() {
    let backend = backend_with_device();
    let mut device = open_device(&backend, DeviceType::Sink);

    // The scenario from the design notes: 10ms frames, 48kHz stereo,
    // 10 frames of silence.
    let frame = Frame::new(FRAME_SAMPLES);
    for _ in 0..10 {
        device.write(&frame).unwrap();
    }

    assert_eq!(backend.written_samples().len(), FRAME_SAMPLES * 10);

    // Whatever is still buffered must stay within the target latency.
    let latency = device.latency().expect("sim reports latency");
    assert!(latency <= Duration::from_millis(40), "latency={:?}", latency);
}

#[test]
fn playback_stall_is_a_device_error() {
    let backend = backend_with_device();
    backend.set_auto_drain(false);
    let mut device = open_device(&backend, DeviceType::Sink);

    // Target latency is 40ms: four 10ms frames fill the buffer.
    let frame = Frame::from_samples(vec![0.25; FRAME_SAMPLES]);
    for _ in 0..4 {
        device.write(&frame).unwrap();
    }

    // Nothing drains; the fifth write must time out with a device
    // error instead of blocking forever or shortening silently.
    let started = Instant::now();
    let result = device.write(&frame);
    assert!(matches!(result, Err(DeviceError::Device(_))));
    assert!(started.elapsed() >= Duration::from_millis(60));

    // Samples accepted before the stall are not re-sent or dropped.
    assert_eq!(backend.written_samples().len(), FRAME_SAMPLES * 4);
}

#[test]
fn stream_failure_breaks_device_and_restart_recovers() {
    let backend = backend_with_device();
    let mut device = open_device(&backend, DeviceType::Sink);
    let spec = device.sample_spec();

    backend.fail_stream();
    wait_for_state(&device, DeviceState::Broken);

    // I/O on a broken device is an error, not a panic.
    let result = device.write(&Frame::new(FRAME_SAMPLES));
    assert!(matches!(result, Err(DeviceError::Device(_))));

    // Restart rebuilds the stream on the surviving connection and
    // preserves the negotiated spec.
    device.restart().unwrap();
    assert_eq!(device.state(), DeviceState::Active);
    assert_eq!(device.sample_spec(), spec);

    device.write(&Frame::new(FRAME_SAMPLES)).unwrap();
}

#[test]
fn resume_after_failure_restarts() {
    let backend = backend_with_device();
    let mut device = open_device(&backend, DeviceType::Sink);

    backend.fail_stream();
    wait_for_state(&device, DeviceState::Broken);

    device.resume().unwrap();
    assert_eq!(device.state(), DeviceState::Active);
}

#[test]
fn pause_and_resume_round_trip() {
    let backend = backend_with_device();
    let mut device = open_device(&backend, DeviceType::Sink);

    device.pause();
    assert_eq!(device.state(), DeviceState::Paused);

    device.resume().unwrap();
    assert_eq!(device.state(), DeviceState::Active);
}

#[test]
fn unsupported_native_format_fails_open() {
    let backend = Arc::new(SimBackend::new());
    backend.add_device(SimDevice::new(DEVICE_NAME, 8000, 1).with_format(NativeFormat::ULaw));

    let mut device =
        DuplexDevice::new(backend.clone(), test_config(), DeviceType::Sink).unwrap();
    let result = device.open(Some(DEVICE_NAME));

    assert!(matches!(result, Err(DeviceError::BadConfig(_))));
    assert_eq!(device.state(), DeviceState::Closed);
}

#[test]
fn unknown_device_fails_open() {
    let backend = backend_with_device();
    let mut device =
        DuplexDevice::new(backend.clone(), test_config(), DeviceType::Sink).unwrap();

    let result = device.open(Some("no-such-device"));
    assert!(matches!(result, Err(DeviceError::Device(_))));
}

#[test]
fn refused_connection_fails_open() {
    let backend = backend_with_device();
    backend.refuse_connections(true);

    let mut device =
        DuplexDevice::new(backend.clone(), test_config(), DeviceType::Sink).unwrap();
    let result = device.open(Some(DEVICE_NAME));
    assert!(matches!(result, Err(DeviceError::Device(_))));
}

#[test]
fn invalid_config_rejected_at_construction() {
    let backend = backend_with_device();
    let config = DeviceConfig {
        frame_length: Duration::ZERO,
        ..test_config()
    };

    let result = DuplexDevice::new(backend.clone(), config, DeviceType::Sink);
    assert!(matches!(result, Err(DeviceError::BadConfig(_))));
}

#[test]
fn registry_opens_devices_by_backend_name() {
    let registry = BackendRegistry::new();
    let backend = backend_with_device();
    registry.register(backend.clone());

    assert!(registry.lookup("sim").is_some());
    assert!(registry.lookup("missing").is_none());

    let device = registry
        .open_device(Some("sim"), DeviceType::Sink, test_config(), None)
        .unwrap();
    assert_eq!(device.state(), DeviceState::Active);

    let err = registry.open_device(Some("missing"), DeviceType::Sink, test_config(), None);
    assert!(matches!(err, Err(DeviceError::BadConfig(_))));
}

#[test]
fn state_is_idle_before_open() {
    let backend = backend_with_device();
    let device =
        DuplexDevice::new(backend.clone(), test_config(), DeviceType::Sink).unwrap();
    assert_eq!(device.state(), DeviceState::Idle);
}
