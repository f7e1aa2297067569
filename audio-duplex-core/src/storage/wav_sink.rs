use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::models::error::DeviceError;
use crate::models::frame::Frame;
use crate::models::sample_spec::{SampleFormat, SampleSpec};
use crate::models::state::DeviceState;
use crate::processing::pcm;
use crate::processing::rate_limiter::RateLimiter;
use crate::traits::device::{Device, DeviceType, Sink, Source};

/// How often recurring clipping is reported.
const CLIP_REPORT_PERIOD: Duration = Duration::from_secs(5);

const RIFF_HEADER_SIZE: u64 = 44;

const WAV_FORMAT_PCM: u16 = 1;
const WAV_FORMAT_IEEE_FLOAT: u16 = 3;

/// Simple synchronous file-backed sink.
///
/// A linear buffered WAV writer with no concurrency: frames are encoded
/// and appended on the caller's thread, and the RIFF size fields are
/// patched when the sink is closed (or dropped).
///
/// Samples are stored as little-endian s16 PCM or IEEE-float f32,
/// depending on the sample spec. Float input outside [-1.0, 1.0] is
/// clamped on the s16 path; clipping is counted and reported through a
/// rate limiter, never treated as an error.
pub struct WavSink {
    path: PathBuf,
    spec: SampleSpec,
    writer: Option<BufWriter<File>>,
    data_bytes: u64,
    clipped_total: u64,
    clip_limiter: RateLimiter,
    encode_buf: Vec<u8>,
    state: DeviceState,
}

impl WavSink {
    /// Create the output file and write the initial 44-byte RIFF header.
    pub fn create(path: impl Into<PathBuf>, spec: SampleSpec) -> Result<Self, DeviceError> {
        let path = path.into();

        spec.validate().map_err(DeviceError::BadConfig)?;

        let file = File::create(&path)
            .map_err(|e| DeviceError::File(format!("can't create {}: {}", path.display(), e)))?;
        let mut writer = BufWriter::new(file);

        let header = riff_header(&spec, 0);
        writer
            .write_all(&header)
            .map_err(|e| DeviceError::File(format!("can't write header: {}", e)))?;

        log::debug!("wav sink: opened: path={} spec={}", path.display(), spec);

        Ok(Self {
            path,
            spec,
            writer: Some(writer),
            data_bytes: 0,
            clipped_total: 0,
            clip_limiter: RateLimiter::new(CLIP_REPORT_PERIOD),
            encode_buf: Vec::new(),
            state: DeviceState::Active,
        })
    }

    /// Finalize the file: flush buffered samples and patch the RIFF size
    /// fields. Safe to call once; `Drop` calls it if the caller didn't.
    pub fn close(&mut self) -> Result<(), DeviceError> {
        let Some(mut writer) = self.writer.take() else {
            return Ok(());
        };
        self.state = DeviceState::Closed;

        writer
            .flush()
            .map_err(|e| DeviceError::File(format!("can't flush: {}", e)))?;

        let file = writer.get_mut();
        patch_riff_sizes(file, self.data_bytes)
            .map_err(|e| DeviceError::File(format!("can't finalize header: {}", e)))?;
        file.flush()
            .map_err(|e| DeviceError::File(format!("can't flush: {}", e)))?;

        log::debug!(
            "wav sink: closed: path={} data_bytes={} clipped_samples={}",
            self.path.display(),
            self.data_bytes,
            self.clipped_total
        );
        Ok(())
    }

    /// Output file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Total samples clamped during s16 conversion so far.
    pub fn clipped_samples(&self) -> u64 {
        self.clipped_total
    }
}

impl Device for WavSink {
    fn device_type(&self) -> DeviceType {
        DeviceType::Sink
    }

    fn state(&self) -> DeviceState {
        self.state
    }

    fn pause(&mut self) {
        // nothing to cork in a file
    }

    fn resume(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }

    fn restart(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }

    fn sample_spec(&self) -> SampleSpec {
        self.spec
    }

    fn latency(&self) -> Option<Duration> {
        None
    }

    fn has_latency(&self) -> bool {
        false
    }

    fn has_clock(&self) -> bool {
        false
    }

    fn reclock(&mut self, _timestamp: Instant) {}

    fn as_sink(&mut self) -> Option<&mut dyn Sink> {
        Some(self)
    }

    fn as_source(&mut self) -> Option<&mut dyn Source> {
        None
    }
}

impl Sink for WavSink {
    fn write(&mut self, frame: &Frame) -> Result<(), DeviceError> {
        let writer = match self.writer.as_mut() {
            Some(w) => w,
            None => panic!("wav sink: write() called on closed sink"),
        };

        self.encode_buf.clear();
        match self.spec.format {
            SampleFormat::S16 => {
                let clipped = pcm::encode_i16_le(frame.samples(), &mut self.encode_buf);
                if clipped > 0 {
                    self.clipped_total += clipped as u64;
                    if self.clip_limiter.allow() {
                        log::warn!(
                            "wav sink: clipping input samples: frame={} total={}",
                            clipped,
                            self.clipped_total
                        );
                    }
                }
            }
            SampleFormat::F32 => {
                pcm::encode_f32_le(frame.samples(), &mut self.encode_buf);
            }
        }

        writer
            .write_all(&self.encode_buf)
            .map_err(|e| DeviceError::File(format!("can't write samples: {}", e)))?;
        self.data_bytes += self.encode_buf.len() as u64;
        Ok(())
    }
}

impl Drop for WavSink {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::error!("wav sink: close failed in drop: {}", e);
        }
    }
}

/// Build the 44-byte RIFF header for the given spec and data size.
fn riff_header(spec: &SampleSpec, data_bytes: u32) -> [u8; RIFF_HEADER_SIZE as usize] {
    let (format_code, bit_depth) = match spec.format {
        SampleFormat::S16 => (WAV_FORMAT_PCM, 16u16),
        SampleFormat::F32 => (WAV_FORMAT_IEEE_FLOAT, 32u16),
    };
    let block_align = spec.channels * bit_depth / 8;
    let byte_rate = spec.rate * u32::from(block_align);

    let mut header = [0u8; RIFF_HEADER_SIZE as usize];
    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&(36 + data_bytes).to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");
    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    header[20..22].copy_from_slice(&format_code.to_le_bytes());
    header[22..24].copy_from_slice(&spec.channels.to_le_bytes());
    header[24..28].copy_from_slice(&spec.rate.to_le_bytes());
    header[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    header[32..34].copy_from_slice(&block_align.to_le_bytes());
    header[34..36].copy_from_slice(&bit_depth.to_le_bytes());
    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&data_bytes.to_le_bytes());
    header
}

/// Patch the RIFF chunk size (offset 4) and data size (offset 40) after
/// the data length is known.
fn patch_riff_sizes(file: &mut File, data_bytes: u64) -> std::io::Result<()> {
    file.seek(SeekFrom::Start(4))?;
    file.write_all(&((RIFF_HEADER_SIZE + data_bytes - 8) as u32).to_le_bytes())?;
    file.seek(SeekFrom::Start(40))?;
    file.write_all(&(data_bytes as u32).to_le_bytes())?;
    file.seek(SeekFrom::End(0))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("duplex_wav_sink_{}_{}", std::process::id(), name))
    }

    fn stereo_s16() -> SampleSpec {
        SampleSpec::new(48000, 2, SampleFormat::S16)
    }

    #[test]
    fn writes_pcm_file_with_patched_sizes() {
        let path = temp_path("pcm.wav");
        let mut sink = WavSink::create(&path, stereo_s16()).unwrap();

        // 4 stereo frames
        let frame = Frame::from_samples(vec![0.0; 8]);
        sink.write(&frame).unwrap();
        sink.close().unwrap();

        let data = fs::read(&path).unwrap();
        assert_eq!(data.len(), 44 + 16);

        assert_eq!(&data[0..4], b"RIFF");
        assert_eq!(&data[8..12], b"WAVE");
        assert_eq!(u16::from_le_bytes([data[20], data[21]]), WAV_FORMAT_PCM);
        assert_eq!(u16::from_le_bytes([data[22], data[23]]), 2);
        assert_eq!(
            u32::from_le_bytes([data[24], data[25], data[26], data[27]]),
            48000
        );
        // byte rate = 48000 * 2ch * 2 bytes
        assert_eq!(
            u32::from_le_bytes([data[28], data[29], data[30], data[31]]),
            192000
        );
        assert_eq!(
            u32::from_le_bytes([data[40], data[41], data[42], data[43]]),
            16
        );
        assert_eq!(
            u32::from_le_bytes([data[4], data[5], data[6], data[7]]),
            36 + 16
        );

        fs::remove_file(&path).ok();
    }

    #[test]
    fn float_spec_writes_ieee_float() {
        let path = temp_path("float.wav");
        let spec = SampleSpec::new(44100, 1, SampleFormat::F32);
        let mut sink = WavSink::create(&path, spec).unwrap();

        sink.write(&Frame::from_samples(vec![0.25, -0.75])).unwrap();
        sink.close().unwrap();

        let data = fs::read(&path).unwrap();
        assert_eq!(
            u16::from_le_bytes([data[20], data[21]]),
            WAV_FORMAT_IEEE_FLOAT
        );
        assert_eq!(u16::from_le_bytes([data[34], data[35]]), 32);
        assert_eq!(
            f32::from_le_bytes([data[44], data[45], data[46], data[47]]),
            0.25
        );

        fs::remove_file(&path).ok();
    }

    #[test]
    fn counts_clipped_samples() {
        let path = temp_path("clip.wav");
        let mut sink = WavSink::create(&path, stereo_s16()).unwrap();

        sink.write(&Frame::from_samples(vec![1.5, -2.0, 0.5, 0.0]))
            .unwrap();
        assert_eq!(sink.clipped_samples(), 2);

        sink.close().unwrap();
        fs::remove_file(&path).ok();
    }

    #[test]
    fn drop_finalizes_header() {
        let path = temp_path("drop.wav");
        {
            let mut sink = WavSink::create(&path, stereo_s16()).unwrap();
            sink.write(&Frame::from_samples(vec![0.0; 4])).unwrap();
        }

        let data = fs::read(&path).unwrap();
        assert_eq!(
            u32::from_le_bytes([data[40], data[41], data[42], data[43]]),
            8
        );

        fs::remove_file(&path).ok();
    }

    #[test]
    fn rejects_invalid_spec() {
        let path = temp_path("bad.wav");
        let result = WavSink::create(&path, SampleSpec::new(0, 2, SampleFormat::S16));
        assert!(matches!(result, Err(DeviceError::BadConfig(_))));
    }

    #[test]
    #[should_panic(expected = "closed sink")]
    fn write_after_close_panics() {
        let path = temp_path("closed.wav");
        let mut sink = WavSink::create(&path, stereo_s16()).unwrap();
        sink.close().unwrap();

        let _ = sink.write(&Frame::new(4));
    }

    #[test]
    fn capability_surface() {
        let path = temp_path("caps.wav");
        let mut sink = WavSink::create(&path, stereo_s16()).unwrap();

        assert_eq!(sink.device_type(), DeviceType::Sink);
        assert_eq!(sink.state(), DeviceState::Active);
        assert!(!sink.has_latency());
        assert!(sink.latency().is_none());
        assert!(!sink.has_clock());
        assert!(sink.as_sink().is_some());
        assert!(sink.as_source().is_none());

        sink.close().unwrap();
        assert_eq!(sink.state(), DeviceState::Closed);
        fs::remove_file(sink.path().to_path_buf()).ok();
    }
}
