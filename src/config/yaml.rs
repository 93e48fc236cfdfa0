use serde::Deserialize;
use std::path::PathBuf;

use super::BackendKind;
use crate::core::relay::SegmentMode;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Environment
/// variables can override any values specified here.
///
/// # Example YAML structure
/// ```yaml
/// backend:
///   kind: "cosyvoice"            # or "stub"
///   api_key: "sk-..."
///   url: "wss://dashscope.aliyuncs.com/api-ws/v1/inference/"
///   connect_timeout_seconds: 10
///   request_timeout_seconds: 30
///
/// voice:
///   name: "longxiaochun"
///   model: "cosyvoice-v1"
///   sample_rate: 16000
///   format: "pcm"
///   volume: 50
///   speech_rate: 1.0
///   pitch: 1.0
///
/// relay:
///   segment_mode: "per_item"     # or "accumulate"
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub backend: Option<BackendYaml>,
    pub voice: Option<VoiceYaml>,
    pub relay: Option<RelayYaml>,
}

/// Backend selection and connection settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct BackendYaml {
    pub kind: Option<BackendKind>,
    pub api_key: Option<String>,
    pub url: Option<String>,
    pub connect_timeout_seconds: Option<u64>,
    pub request_timeout_seconds: Option<u64>,
}

/// Voice settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct VoiceYaml {
    pub name: Option<String>,
    pub model: Option<String>,
    pub sample_rate: Option<u32>,
    pub format: Option<String>,
    pub volume: Option<u8>,
    pub speech_rate: Option<f32>,
    pub pitch: Option<f32>,
}

/// Relay behavior from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RelayYaml {
    pub segment_mode: Option<SegmentMode>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if:
    /// - The file cannot be read
    /// - The YAML is malformed
    /// - Fields have invalid types
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse YAML config: {e}"))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_yaml_config_full() {
        let yaml = r#"
backend:
  kind: "stub"
  api_key: "sk-yaml"
  url: "ws://127.0.0.1:9000/"
  connect_timeout_seconds: 4
  request_timeout_seconds: 12

voice:
  name: "longwan"
  model: "cosyvoice-v2"
  sample_rate: 24000
  format: "pcm"
  volume: 40
  speech_rate: 1.2
  pitch: 0.9

relay:
  segment_mode: "accumulate"
"#;

        let config: YamlConfig = serde_yaml::from_str(yaml).unwrap();

        let backend = config.backend.unwrap();
        assert_eq!(backend.kind, Some(BackendKind::Stub));
        assert_eq!(backend.api_key.as_deref(), Some("sk-yaml"));
        assert_eq!(backend.connect_timeout_seconds, Some(4));
        assert_eq!(backend.request_timeout_seconds, Some(12));

        let voice = config.voice.unwrap();
        assert_eq!(voice.name.as_deref(), Some("longwan"));
        assert_eq!(voice.model.as_deref(), Some("cosyvoice-v2"));
        assert_eq!(voice.sample_rate, Some(24000));
        assert_eq!(voice.volume, Some(40));
        assert_eq!(voice.speech_rate, Some(1.2));
        assert_eq!(voice.pitch, Some(0.9));

        assert_eq!(
            config.relay.unwrap().segment_mode,
            Some(SegmentMode::Accumulate)
        );
    }

    #[test]
    fn test_yaml_config_partial() {
        let config: YamlConfig = serde_yaml::from_str("voice:\n  name: longxiaochun\n").unwrap();

        assert!(config.backend.is_none());
        assert!(config.relay.is_none());
        assert_eq!(
            config.voice.unwrap().name.as_deref(),
            Some("longxiaochun")
        );
    }

    #[test]
    fn test_yaml_config_empty() {
        let config: YamlConfig = serde_yaml::from_str("").unwrap_or_default();
        assert!(config.backend.is_none());
        assert!(config.voice.is_none());
    }

    #[test]
    fn test_yaml_config_rejects_unknown_segment_mode() {
        let result = serde_yaml::from_str::<YamlConfig>("relay:\n  segment_mode: sometimes\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_yaml_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("relay.yaml");
        fs::write(&path, "backend:\n  kind: cosyvoice\n").unwrap();

        let config = YamlConfig::from_file(&path).unwrap();
        assert_eq!(config.backend.unwrap().kind, Some(BackendKind::CosyVoice));
    }

    #[test]
    fn test_yaml_from_file_invalid_yaml() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("relay.yaml");
        fs::write(&path, "voice: [unclosed").unwrap();

        let result = YamlConfig::from_file(&path);
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to parse YAML config")
        );
    }
}
