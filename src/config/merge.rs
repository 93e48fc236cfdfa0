use super::RelayConfig;
use super::utils::{env_string, parse_env};
use super::yaml::YamlConfig;
use crate::core::relay::SegmentMode;

/// Merge YAML configuration with environment variables
///
/// Priority order (highest to lowest):
/// 1. Environment variables
/// 2. YAML configuration values
/// 3. Default values
///
/// # Returns
/// * `Result<RelayConfig, Box<dyn std::error::Error>>` - The merged configuration or an error
pub fn merge_config(
    yaml_config: Option<YamlConfig>,
) -> Result<RelayConfig, Box<dyn std::error::Error>> {
    let yaml = yaml_config.unwrap_or_default();
    let defaults = RelayConfig::default();

    let backend_yaml = yaml.backend.unwrap_or_default();
    let voice_yaml = yaml.voice.unwrap_or_default();
    let relay_yaml = yaml.relay.unwrap_or_default();

    // Helper macro for string values: ENV > YAML > Default
    macro_rules! get_value {
        ($env_var:expr, $yaml_value:expr, $default:expr) => {
            env_string($env_var)
                .or($yaml_value)
                .unwrap_or($default)
        };
    }

    // Helper macro for parsed values: ENV > YAML
    macro_rules! get_parsed {
        ($env_var:expr, $yaml_value:expr) => {
            parse_env($env_var)?.or($yaml_value)
        };
    }

    // Backend configuration
    let backend = get_parsed!("TTS_BACKEND", backend_yaml.kind).unwrap_or(defaults.backend);
    let api_key = env_string("DASHSCOPE_API_KEY").or(backend_yaml.api_key);
    let url = get_value!("TTS_URL", backend_yaml.url, defaults.url);
    let connect_timeout_seconds = get_parsed!(
        "TTS_CONNECT_TIMEOUT_SECONDS",
        backend_yaml.connect_timeout_seconds
    )
    .unwrap_or(defaults.connect_timeout_seconds);
    let request_timeout_seconds = get_parsed!(
        "TTS_REQUEST_TIMEOUT_SECONDS",
        backend_yaml.request_timeout_seconds
    );

    // Voice configuration
    let voice = get_value!("TTS_VOICE", voice_yaml.name, defaults.voice);
    let model = get_value!("TTS_MODEL", voice_yaml.model, defaults.model);
    let sample_rate =
        get_parsed!("TTS_SAMPLE_RATE", voice_yaml.sample_rate).unwrap_or(defaults.sample_rate);
    let format = get_value!("TTS_FORMAT", voice_yaml.format, defaults.format);
    let volume = get_parsed!("TTS_VOLUME", voice_yaml.volume);
    let speech_rate = get_parsed!("TTS_SPEECH_RATE", voice_yaml.speech_rate);
    let pitch = get_parsed!("TTS_PITCH", voice_yaml.pitch);

    // Relay behavior
    let segment_mode: SegmentMode =
        get_parsed!("TTS_SEGMENT_MODE", relay_yaml.segment_mode).unwrap_or(defaults.segment_mode);

    Ok(RelayConfig {
        backend,
        api_key,
        url,
        voice,
        model,
        sample_rate,
        format,
        volume,
        speech_rate,
        pitch,
        segment_mode,
        connect_timeout_seconds,
        request_timeout_seconds,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendKind;
    use crate::config::tests::cleanup_env_vars;
    use crate::config::yaml::{BackendYaml, VoiceYaml};
    use serial_test::serial;
    use std::env;

    #[test]
    #[serial]
    fn test_merge_defaults_only() {
        cleanup_env_vars();

        let config = merge_config(None).unwrap();
        assert_eq!(config, RelayConfig::default());
    }

    #[test]
    #[serial]
    fn test_merge_yaml_over_defaults() {
        cleanup_env_vars();

        let yaml = YamlConfig {
            backend: Some(BackendYaml {
                kind: Some(BackendKind::Stub),
                ..Default::default()
            }),
            voice: Some(VoiceYaml {
                name: Some("longwan".to_string()),
                pitch: Some(1.1),
                ..Default::default()
            }),
            relay: None,
        };

        let config = merge_config(Some(yaml)).unwrap();
        assert_eq!(config.backend, BackendKind::Stub);
        assert_eq!(config.voice, "longwan");
        assert_eq!(config.pitch, Some(1.1));
        assert_eq!(config.model, "cosyvoice-v1");
        assert_eq!(config.segment_mode, SegmentMode::PerItem);
    }

    #[test]
    #[serial]
    fn test_merge_env_over_yaml() {
        cleanup_env_vars();
        unsafe {
            env::set_var("TTS_VOICE", "longcheng");
            env::set_var("TTS_SEGMENT_MODE", "accumulate");
            env::set_var("TTS_REQUEST_TIMEOUT_SECONDS", "15");
        }

        let yaml = YamlConfig {
            voice: Some(VoiceYaml {
                name: Some("longwan".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let config = merge_config(Some(yaml)).unwrap();
        assert_eq!(config.voice, "longcheng");
        assert_eq!(config.segment_mode, SegmentMode::Accumulate);
        assert_eq!(config.request_timeout_seconds, Some(15));

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_merge_invalid_env_value() {
        cleanup_env_vars();
        unsafe {
            env::set_var("TTS_SAMPLE_RATE", "fast");
        }

        let result = merge_config(None);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("TTS_SAMPLE_RATE"));

        cleanup_env_vars();
    }
}
