//! Configuration types for the relay

use serde::{Deserialize, Serialize};

use super::controller::SegmentMode;
use super::errors::{RelayError, RelayResult};
use crate::core::tts::{SampleRate, VoiceParams};

/// Settings a [`TtsRelay`](super::TtsRelay) is started with.
///
/// The sample rate is kept as a raw number so that an unsupported value is
/// reported when the relay starts rather than when the config is parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TtsRelayConfig {
    pub voice: String,
    pub model: String,
    /// Output sample rate in Hz
    pub sample_rate: u32,
    /// Output encoding requested from the backend
    pub format: String,
    pub volume: Option<u8>,
    pub speech_rate: Option<f32>,
    pub pitch: Option<f32>,
    pub segment_mode: SegmentMode,
}

impl Default for TtsRelayConfig {
    fn default() -> Self {
        let params = VoiceParams::default();
        Self {
            voice: params.voice,
            model: params.model,
            sample_rate: params.sample_rate.hz(),
            format: params.format,
            volume: None,
            speech_rate: None,
            pitch: None,
            segment_mode: SegmentMode::default(),
        }
    }
}

impl TtsRelayConfig {
    /// Validate the settings and build the parameters sessions are opened with.
    pub fn voice_params(&self) -> RelayResult<VoiceParams> {
        let sample_rate = SampleRate::try_from(self.sample_rate)?;
        if self.voice.trim().is_empty() {
            return Err(RelayError::Configuration("voice must not be empty".to_string()));
        }
        if self.model.trim().is_empty() {
            return Err(RelayError::Configuration("model must not be empty".to_string()));
        }
        Ok(VoiceParams {
            voice: self.voice.clone(),
            model: self.model.clone(),
            sample_rate,
            format: self.format.clone(),
            volume: self.volume,
            speech_rate: self.speech_rate,
            pitch: self.pitch,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_builds_default_params() {
        let params = TtsRelayConfig::default().voice_params().unwrap();
        assert_eq!(params, VoiceParams::default());
    }

    #[test]
    fn unsupported_sample_rate_is_rejected() {
        let config = TtsRelayConfig {
            sample_rate: 11025,
            ..Default::default()
        };
        assert!(matches!(
            config.voice_params(),
            Err(RelayError::InvalidSampleRate(_))
        ));
    }

    #[test]
    fn blank_voice_is_rejected() {
        let config = TtsRelayConfig {
            voice: "  ".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.voice_params(),
            Err(RelayError::Configuration(_))
        ));
    }
}
