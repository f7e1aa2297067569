use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timing configuration consumed at device construction.
///
/// All durations are validated once, at open time, not per call. Each
/// duration is later mirrored as a derived sample count against the
/// negotiated sample spec; the pair is always recomputed together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Amount of audio the backend should keep buffered.
    pub target_latency: Duration,

    /// Duration of one frame exchanged per `read`/`write` call.
    pub frame_length: Duration,

    /// How long a blocking request may wait for the backend before the
    /// underrun timer fires.
    pub timeout: Duration,
}

impl DeviceConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.frame_length.is_zero() {
            return Err("frame length must be non-zero".into());
        }
        if self.target_latency.is_zero() {
            return Err("target latency must be non-zero".into());
        }
        if self.timeout.is_zero() {
            return Err("timeout must be non-zero".into());
        }
        if self.timeout < self.frame_length {
            return Err("timeout must not be shorter than one frame".into());
        }
        Ok(())
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            target_latency: Duration::from_millis(40),
            frame_length: Duration::from_millis(10),
            timeout: Duration::from_millis(80),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(DeviceConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_durations_rejected() {
        let mut config = DeviceConfig::default();
        config.frame_length = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = DeviceConfig::default();
        config.target_latency = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = DeviceConfig::default();
        config.timeout = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn timeout_shorter_than_frame_rejected() {
        let config = DeviceConfig {
            frame_length: Duration::from_millis(20),
            timeout: Duration::from_millis(10),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
