/// Fixed-size unit of audio data exchanged with a device.
///
/// Holds interleaved f32 samples. The buffer length is fixed at
/// construction: one frame per `read`/`write` call, sized by the device's
/// frame length and sample spec.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    samples: Vec<f32>,
}

impl Frame {
    /// Allocate a silent frame of `num_samples` interleaved samples.
    pub fn new(num_samples: usize) -> Self {
        Self {
            samples: vec![0.0; num_samples],
        }
    }

    /// Build a frame from existing samples.
    pub fn from_samples(samples: Vec<f32>) -> Self {
        Self { samples }
    }

    /// Number of interleaved samples in the frame.
    pub fn num_samples(&self) -> usize {
        self.samples.len()
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn samples_mut(&mut self) -> &mut [f32] {
        &mut self.samples
    }

    /// Zero every sample.
    pub fn fill_silence(&mut self) {
        self.samples.fill(0.0);
    }

    /// Whether every sample is exactly zero.
    pub fn is_silence(&self) -> bool {
        self.samples.iter().all(|s| *s == 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_frame_is_silent() {
        let frame = Frame::new(960);
        assert_eq!(frame.num_samples(), 960);
        assert!(frame.is_silence());
    }

    #[test]
    fn fill_silence_resets_samples() {
        let mut frame = Frame::from_samples(vec![0.5, -0.25, 1.0]);
        assert!(!frame.is_silence());

        frame.fill_silence();
        assert!(frame.is_silence());
        assert_eq!(frame.num_samples(), 3);
    }
}
