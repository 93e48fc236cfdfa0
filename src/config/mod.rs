//! Configuration module for the relay
//!
//! This module handles relay configuration from two sources: YAML files and
//! environment variables. Environment variables always override YAML values.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Merging YAML and environment configurations
//! - `validation`: Configuration validation logic
//! - `utils`: Utility functions for configuration parsing
//!
//! # Example
//! ```rust,no_run
//! use cosy_relay::config::RelayConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = RelayConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config_path = PathBuf::from("relay.yaml");
//! let config = RelayConfig::from_file(&config_path)?;
//!
//! println!("Synthesizing with voice {}", config.voice);
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::core::relay::{SegmentMode, TtsRelayConfig};
use crate::core::tts::{COSYVOICE_WS_URL, CosyVoiceConfig, VoiceParams};

mod env;
mod merge;
mod utils;
mod validation;
mod yaml;

/// Which synthesis backend the relay drives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// CosyVoice over the DashScope WebSocket API
    #[default]
    CosyVoice,
    /// In-process silence generator, for offline runs
    Stub,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::CosyVoice => write!(f, "cosyvoice"),
            BackendKind::Stub => write!(f, "stub"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cosyvoice" | "cosy" | "dashscope" => Ok(BackendKind::CosyVoice),
            "stub" => Ok(BackendKind::Stub),
            other => Err(format!(
                "Unsupported backend '{other}'; expected 'cosyvoice' or 'stub'"
            )),
        }
    }
}

/// Relay configuration
///
/// Contains everything needed to run the relay:
/// - Backend selection and credentials
/// - Voice, model and output format
/// - Segment handling
/// - Network timeouts
#[derive(Clone, PartialEq)]
pub struct RelayConfig {
    // Backend settings
    pub backend: BackendKind,
    pub api_key: Option<String>,
    pub url: String,

    // Voice settings
    pub voice: String,
    pub model: String,
    pub sample_rate: u32,
    pub format: String,
    pub volume: Option<u8>,
    pub speech_rate: Option<f32>,
    pub pitch: Option<f32>,

    // Relay behavior
    pub segment_mode: SegmentMode,

    // Timeouts
    pub connect_timeout_seconds: u64,
    pub request_timeout_seconds: Option<u64>,
}

impl fmt::Debug for RelayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayConfig")
            .field("backend", &self.backend)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("url", &self.url)
            .field("voice", &self.voice)
            .field("model", &self.model)
            .field("sample_rate", &self.sample_rate)
            .field("format", &self.format)
            .field("volume", &self.volume)
            .field("speech_rate", &self.speech_rate)
            .field("pitch", &self.pitch)
            .field("segment_mode", &self.segment_mode)
            .field("connect_timeout_seconds", &self.connect_timeout_seconds)
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .finish()
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        let params = VoiceParams::default();
        Self {
            backend: BackendKind::default(),
            api_key: None,
            url: COSYVOICE_WS_URL.to_string(),
            voice: params.voice,
            model: params.model,
            sample_rate: params.sample_rate.hz(),
            format: params.format,
            volume: None,
            speech_rate: None,
            pitch: None,
            segment_mode: SegmentMode::default(),
            connect_timeout_seconds: 10,
            request_timeout_seconds: None,
        }
    }
}

impl RelayConfig {
    /// Load configuration from a YAML file with environment variable overrides
    ///
    /// Priority order (highest to lowest):
    /// 1. Environment variables
    /// 2. YAML file values
    /// 3. Default values
    ///
    /// After loading and merging, performs validation on the final configuration.
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        // The .env file is not consulted here: the YAML file is the source of
        // truth and only real environment variables override it.
        let yaml_config = yaml::YamlConfig::from_file(path)?;
        let config = merge::merge_config(Some(yaml_config))?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Settings the relay facade is started with.
    pub fn relay_config(&self) -> TtsRelayConfig {
        TtsRelayConfig {
            voice: self.voice.clone(),
            model: self.model.clone(),
            sample_rate: self.sample_rate,
            format: self.format.clone(),
            volume: self.volume,
            speech_rate: self.speech_rate,
            pitch: self.pitch,
            segment_mode: self.segment_mode,
        }
    }

    /// Connection settings for the CosyVoice backend.
    ///
    /// # Errors
    /// Returns an error when no API key is configured.
    pub fn cosyvoice_config(&self) -> Result<CosyVoiceConfig, String> {
        let api_key = self
            .api_key
            .clone()
            .ok_or_else(|| "DASHSCOPE_API_KEY is required for the cosyvoice backend".to_string())?;
        Ok(CosyVoiceConfig::new(api_key)
            .with_url(self.url.clone())
            .with_connect_timeout(Duration::from_secs(self.connect_timeout_seconds))
            .with_request_timeout(self.request_timeout_seconds.map(Duration::from_secs)))
    }
}
