//! Configuration types for the CosyVoice (DashScope) streaming synthesis API.
//!
//! The service is reached over a single WebSocket endpoint that multiplexes
//! tasks by `task_id`. Authentication is a bearer API key sent in the
//! `Authorization` header of the upgrade request.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use cosy_relay::core::tts::cosyvoice::CosyVoiceConfig;
//!
//! let config = CosyVoiceConfig::new("sk-example")
//!     .with_request_timeout(Some(Duration::from_secs(30)));
//! assert!(config.validate().is_ok());
//! ```

use std::time::Duration;

use url::Url;

use crate::core::tts::base::SynthesisError;

/// DashScope inference WebSocket endpoint.
pub const COSYVOICE_WS_URL: &str = "wss://dashscope.aliyuncs.com/api-ws/v1/inference/";

/// Default time allowed for connecting and receiving `task-started`.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection settings for [`CosyVoiceBackend`](super::CosyVoiceBackend).
#[derive(Clone)]
pub struct CosyVoiceConfig {
    /// DashScope API key
    pub api_key: String,
    /// WebSocket endpoint
    pub url: String,
    /// Bound on connect + `task-started`
    pub connect_timeout: Duration,
    /// Bound on waiting for `task-finished` after `finish-task`; `None` waits
    /// until the service finishes, fails or closes the connection.
    pub request_timeout: Option<Duration>,
}

impl std::fmt::Debug for CosyVoiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CosyVoiceConfig")
            .field("api_key", &"<redacted>")
            .field("url", &self.url)
            .field("connect_timeout", &self.connect_timeout)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl CosyVoiceConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            url: COSYVOICE_WS_URL.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Check the settings before any connection is attempted.
    pub fn validate(&self) -> Result<(), SynthesisError> {
        if self.api_key.trim().is_empty() {
            return Err(SynthesisError::InvalidConfiguration(
                "CosyVoice requires an API key".to_string(),
            ));
        }
        self.endpoint()?;
        if self.connect_timeout.is_zero() {
            return Err(SynthesisError::InvalidConfiguration(
                "connect timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Parsed endpoint; only `ws` and `wss` schemes are accepted.
    pub fn endpoint(&self) -> Result<Url, SynthesisError> {
        let url = Url::parse(&self.url).map_err(|e| {
            SynthesisError::InvalidConfiguration(format!("Invalid CosyVoice URL '{}': {e}", self.url))
        })?;
        match url.scheme() {
            "ws" | "wss" => Ok(url),
            other => Err(SynthesisError::InvalidConfiguration(format!(
                "CosyVoice URL must use ws or wss, got '{other}'"
            ))),
        }
    }

    pub(crate) fn authorization(&self) -> String {
        format!("bearer {}", self.api_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_dashscope() {
        let config = CosyVoiceConfig::new("key");
        assert_eq!(config.url, COSYVOICE_WS_URL);
        assert_eq!(config.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
        assert!(config.request_timeout.is_none());
        assert_eq!(config.authorization(), "bearer key");
    }

    #[test]
    fn missing_api_key_is_rejected() {
        let config = CosyVoiceConfig::new(" ");
        assert!(matches!(
            config.validate(),
            Err(SynthesisError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn non_websocket_url_is_rejected() {
        let config = CosyVoiceConfig::new("key").with_url("https://example.com/");
        assert!(config.validate().is_err());

        let config = CosyVoiceConfig::new("key").with_url("ws://127.0.0.1:9000/");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn debug_output_hides_the_key() {
        let rendered = format!("{:?}", CosyVoiceConfig::new("sk-secret"));
        assert!(!rendered.contains("sk-secret"));
    }
}
