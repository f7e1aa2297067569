use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Encoding of a single sample.
///
/// `F32` is the driver's native raw format: interleaved 32-bit floats in
/// [-1.0, 1.0]. `S16` exists for file sinks that store fixed-point PCM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    F32,
    S16,
}

impl SampleFormat {
    /// Bytes per sample on the wire or on disk.
    pub fn sample_size(&self) -> usize {
        match self {
            Self::F32 => 4,
            Self::S16 => 2,
        }
    }
}

/// Sample rate, channel count, and sample format of a stream.
///
/// Negotiated during device discovery from backend-reported native
/// parameters. Once a device opens, its spec is read-only and shared
/// between the frame contract and the backend stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleSpec {
    /// Samples per second, per channel.
    pub rate: u32,
    /// Number of interleaved channels.
    pub channels: u16,
    /// Sample encoding.
    pub format: SampleFormat,
}

impl SampleSpec {
    pub fn new(rate: u32, channels: u16, format: SampleFormat) -> Self {
        Self {
            rate,
            channels,
            format,
        }
    }

    /// Whether samples are the driver's native raw floating-point format.
    pub fn is_raw(&self) -> bool {
        self.format == SampleFormat::F32
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.rate == 0 {
            return Err("sample rate must be non-zero".into());
        }
        if self.channels == 0 {
            return Err("channel count must be non-zero".into());
        }
        Ok(())
    }

    /// Number of per-channel frames covering `duration`, rounded down.
    pub fn frames_from_duration(&self, duration: Duration) -> usize {
        (duration.as_nanos() * u128::from(self.rate) / 1_000_000_000) as usize
    }

    /// Number of interleaved samples (frames x channels) covering `duration`.
    pub fn samples_from_duration(&self, duration: Duration) -> usize {
        self.frames_from_duration(duration) * usize::from(self.channels)
    }

    /// Duration covered by `samples` interleaved samples.
    pub fn duration_from_samples(&self, samples: usize) -> Duration {
        if self.rate == 0 || self.channels == 0 {
            return Duration::ZERO;
        }
        let frames = samples / usize::from(self.channels);
        let nanos = frames as u128 * 1_000_000_000 / u128::from(self.rate);
        Duration::from_nanos(nanos as u64)
    }
}

impl fmt::Display for SampleSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}Hz/{}ch/{}",
            self.rate,
            self.channels,
            match self.format {
                SampleFormat::F32 => "f32",
                SampleFormat::S16 => "s16",
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_zero_fields() {
        assert!(SampleSpec::new(0, 2, SampleFormat::F32).validate().is_err());
        assert!(SampleSpec::new(48000, 0, SampleFormat::F32)
            .validate()
            .is_err());
        assert!(SampleSpec::new(48000, 2, SampleFormat::F32)
            .validate()
            .is_ok());
    }

    #[test]
    fn duration_to_samples_stereo() {
        let spec = SampleSpec::new(48000, 2, SampleFormat::F32);

        // 10ms at 48kHz = 480 frames = 960 interleaved samples
        assert_eq!(spec.frames_from_duration(Duration::from_millis(10)), 480);
        assert_eq!(spec.samples_from_duration(Duration::from_millis(10)), 960);
    }

    #[test]
    fn samples_to_duration_round_trip() {
        let spec = SampleSpec::new(44100, 2, SampleFormat::S16);

        let samples = spec.samples_from_duration(Duration::from_millis(20));
        let back = spec.duration_from_samples(samples);

        // Rounding down loses less than one frame
        let diff = Duration::from_millis(20)
            .checked_sub(back)
            .unwrap_or_default();
        assert!(diff < Duration::from_micros(30));
    }

    #[test]
    fn zero_duration_is_zero_samples() {
        let spec = SampleSpec::new(48000, 2, SampleFormat::F32);
        assert_eq!(spec.samples_from_duration(Duration::ZERO), 0);
        assert_eq!(spec.duration_from_samples(0), Duration::ZERO);
    }
}
