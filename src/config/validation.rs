use crate::core::tts::SampleRate;

use super::{BackendKind, RelayConfig};

/// Validate the merged relay configuration
///
/// Checks that:
/// - the sample rate is one the backends can produce
/// - an API key is present when the CosyVoice backend is selected
/// - voice and model are non-empty
/// - volume, speech rate and pitch are within the ranges the service accepts
/// - the connect timeout is non-zero
pub fn validate(config: &RelayConfig) -> Result<(), Box<dyn std::error::Error>> {
    validate_sample_rate(config.sample_rate)?;
    validate_credentials(config.backend, &config.api_key)?;

    if config.voice.trim().is_empty() {
        return Err("TTS_VOICE cannot be empty".into());
    }
    if config.model.trim().is_empty() {
        return Err("TTS_MODEL cannot be empty".into());
    }

    if let Some(volume) = config.volume
        && volume > 100
    {
        return Err(format!("TTS_VOLUME must be between 0 and 100, got {volume}").into());
    }
    validate_multiplier("TTS_SPEECH_RATE", config.speech_rate)?;
    validate_multiplier("TTS_PITCH", config.pitch)?;

    if config.connect_timeout_seconds == 0 {
        return Err("TTS_CONNECT_TIMEOUT_SECONDS must be greater than zero".into());
    }

    Ok(())
}

/// Validate that the sample rate is one of the supported PCM rates
pub fn validate_sample_rate(sample_rate: u32) -> Result<(), Box<dyn std::error::Error>> {
    SampleRate::try_from(sample_rate)?;
    Ok(())
}

/// Validate that the selected backend has the credentials it needs
pub fn validate_credentials(
    backend: BackendKind,
    api_key: &Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    match backend {
        BackendKind::CosyVoice if api_key.as_deref().is_none_or(|key| key.trim().is_empty()) => {
            Err("DASHSCOPE_API_KEY is required when TTS_BACKEND=cosyvoice".into())
        }
        _ => Ok(()),
    }
}

fn validate_multiplier(name: &str, value: Option<f32>) -> Result<(), Box<dyn std::error::Error>> {
    match value {
        Some(value) if !(0.5..=2.0).contains(&value) => {
            Err(format!("{name} must be between 0.5 and 2.0, got {value}").into())
        }
        _ => Ok(()),
    }
}
