use super::RelayConfig;
use super::merge::merge_config;
use super::validation::validate;

impl RelayConfig {
    /// Load configuration from environment variables
    ///
    /// Reads configuration from environment variables, with sensible defaults.
    /// Also loads from .env file if present using dotenvy.
    ///
    /// Recognized variables: `DASHSCOPE_API_KEY`, `TTS_BACKEND`, `TTS_URL`,
    /// `TTS_VOICE`, `TTS_MODEL`, `TTS_SAMPLE_RATE`, `TTS_FORMAT`,
    /// `TTS_VOLUME`, `TTS_SPEECH_RATE`, `TTS_PITCH`, `TTS_SEGMENT_MODE`,
    /// `TTS_CONNECT_TIMEOUT_SECONDS` and `TTS_REQUEST_TIMEOUT_SECONDS`.
    ///
    /// # Errors
    /// Returns an error if:
    /// - Environment variables are malformed
    /// - Configuration validation fails
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let config = merge_config(None)?;
        validate(&config)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendKind;
    use crate::config::tests::cleanup_env_vars;
    use crate::core::relay::SegmentMode;
    use serial_test::serial;
    use std::env;

    #[test]
    #[serial]
    fn test_from_env_requires_api_key_for_cosyvoice() {
        cleanup_env_vars();

        let result = RelayConfig::from_env();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("DASHSCOPE_API_KEY"));

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_env_defaults_with_api_key() {
        cleanup_env_vars();
        unsafe {
            env::set_var("DASHSCOPE_API_KEY", "sk-env");
        }

        let config = RelayConfig::from_env().expect("Should load config");
        assert_eq!(config.backend, BackendKind::CosyVoice);
        assert_eq!(config.api_key.as_deref(), Some("sk-env"));
        assert_eq!(config.voice, "longxiaochun");
        assert_eq!(config.model, "cosyvoice-v1");
        assert_eq!(config.sample_rate, 16000);
        assert_eq!(config.segment_mode, SegmentMode::PerItem);
        assert_eq!(config.connect_timeout_seconds, 10);
        assert!(config.request_timeout_seconds.is_none());

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_env_custom_values() {
        cleanup_env_vars();
        unsafe {
            env::set_var("TTS_BACKEND", "stub");
            env::set_var("TTS_VOICE", "longwan");
            env::set_var("TTS_SAMPLE_RATE", "24000");
            env::set_var("TTS_VOLUME", "65");
            env::set_var("TTS_SEGMENT_MODE", "accumulate");
        }

        let config = RelayConfig::from_env().expect("Should load config");
        assert_eq!(config.backend, BackendKind::Stub);
        assert_eq!(config.voice, "longwan");
        assert_eq!(config.sample_rate, 24000);
        assert_eq!(config.volume, Some(65));
        assert_eq!(config.segment_mode, SegmentMode::Accumulate);

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_unsupported_sample_rate() {
        cleanup_env_vars();
        unsafe {
            env::set_var("TTS_BACKEND", "stub");
            env::set_var("TTS_SAMPLE_RATE", "44000");
        }

        let result = RelayConfig::from_env();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("44000"));

        cleanup_env_vars();
    }
}
