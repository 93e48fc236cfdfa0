//! # Synthesis Backend Abstraction
//!
//! This module defines the small capability interface every speech-synthesis
//! backend implements so that a single session controller can drive any of
//! them:
//!
//! - [`SynthesisBackend::open`] establishes a connection and registers a
//!   [`SynthesisCallback`] that receives audio on a task owned by the backend.
//! - [`SynthesisConnection::feed`] streams a text chunk into the open session.
//! - [`SynthesisConnection::complete_segment`] signals end of input and waits
//!   for the remaining audio.
//! - [`SynthesisConnection::cancel`] aborts the session.
//!
//! ## Usage Example
//!
//! ```rust,ignore
//! use cosy_relay::core::tts::{SynthesisBackend, SynthesisConnection, VoiceParams};
//!
//! async fn speak_once<B: SynthesisBackend>(
//!     backend: &B,
//!     params: &VoiceParams,
//!     callback: std::sync::Arc<dyn cosy_relay::core::tts::SynthesisCallback>,
//! ) -> cosy_relay::core::tts::SynthesisResult<()> {
//!     let mut connection = backend.open(params, callback).await?;
//!     connection.feed("Hello there.").await?;
//!     connection.complete_segment().await
//! }
//! ```

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Sample rates the backends can produce for 16-bit mono PCM.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum SampleRate {
    Hz8000,
    #[default]
    Hz16000,
    Hz22050,
    Hz24000,
    Hz44100,
    Hz48000,
}

impl SampleRate {
    /// Every supported rate, in ascending order.
    pub const ALL: [SampleRate; 6] = [
        SampleRate::Hz8000,
        SampleRate::Hz16000,
        SampleRate::Hz22050,
        SampleRate::Hz24000,
        SampleRate::Hz44100,
        SampleRate::Hz48000,
    ];

    pub const fn hz(self) -> u32 {
        match self {
            SampleRate::Hz8000 => 8000,
            SampleRate::Hz16000 => 16000,
            SampleRate::Hz22050 => 22050,
            SampleRate::Hz24000 => 24000,
            SampleRate::Hz44100 => 44100,
            SampleRate::Hz48000 => 48000,
        }
    }
}

impl fmt::Display for SampleRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}Hz", self.hz())
    }
}

/// Error returned when a sample rate outside [`SampleRate::ALL`] is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Unsupported sample rate {0}; expected one of 8000, 16000, 22050, 24000, 44100, 48000")]
pub struct UnsupportedSampleRate(pub u32);

impl TryFrom<u32> for SampleRate {
    type Error = UnsupportedSampleRate;

    fn try_from(hz: u32) -> Result<Self, Self::Error> {
        SampleRate::ALL
            .into_iter()
            .find(|rate| rate.hz() == hz)
            .ok_or(UnsupportedSampleRate(hz))
    }
}

impl From<SampleRate> for u32 {
    fn from(rate: SampleRate) -> Self {
        rate.hz()
    }
}

/// Voice, model and output format used when a session is opened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceParams {
    /// Voice identifier (e.g. `longxiaochun`)
    pub voice: String,
    /// Model identifier (e.g. `cosyvoice-v1`)
    pub model: String,
    /// Output sample rate
    pub sample_rate: SampleRate,
    /// Output encoding requested from the backend
    pub format: String,
    /// Volume, 0 to 100
    pub volume: Option<u8>,
    /// Speech rate multiplier, 0.5 to 2.0
    pub speech_rate: Option<f32>,
    /// Pitch multiplier, 0.5 to 2.0
    pub pitch: Option<f32>,
}

impl Default for VoiceParams {
    fn default() -> Self {
        Self {
            voice: "longxiaochun".to_string(),
            model: "cosyvoice-v1".to_string(),
            sample_rate: SampleRate::default(),
            format: "pcm".to_string(),
            volume: None,
            speech_rate: None,
            pitch: None,
        }
    }
}

/// Synthesis-specific error types
#[derive(Debug, Clone, thiserror::Error)]
pub enum SynthesisError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Session not ready: {0}")]
    NotReady(String),

    #[error("Session closed: {0}")]
    Closed(String),

    #[error("Task failed ({code}): {message}")]
    TaskFailed { code: String, message: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Timeout error: {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for synthesis operations
pub type SynthesisResult<T> = Result<T, SynthesisError>;

/// Notifications delivered by a backend while a session is open.
///
/// Backends invoke these from their own reader task. Implementations must not
/// block and must not call back into the controller.
pub trait SynthesisCallback: Send + Sync {
    /// A chunk of raw audio bytes arrived.
    fn on_audio(&self, data: Bytes);

    /// The remote side reported an error for the current task.
    fn on_error(&self, error: SynthesisError);

    /// The remote side finished synthesizing everything it was given.
    fn on_complete(&self);

    /// The connection was closed, by either side.
    fn on_close(&self);
}

/// One open synthesis connection.
#[async_trait]
pub trait SynthesisConnection: Send + 'static {
    /// Stream a text chunk into the session. Empty text is a no-op.
    async fn feed(&mut self, text: &str) -> SynthesisResult<()>;

    /// Signal end of input and wait until the remaining audio is delivered.
    async fn complete_segment(&mut self) -> SynthesisResult<()>;

    /// Abort the session. Best effort.
    async fn cancel(&mut self) -> SynthesisResult<()>;
}

/// Factory for synthesis connections.
#[async_trait]
pub trait SynthesisBackend: Send + Sync + 'static {
    type Connection: SynthesisConnection;

    /// Short backend name used in logs.
    fn name(&self) -> &'static str;

    /// Open a connection for `params`, delivering audio to `callback`.
    async fn open(
        &self,
        params: &VoiceParams,
        callback: Arc<dyn SynthesisCallback>,
    ) -> SynthesisResult<Self::Connection>;
}
