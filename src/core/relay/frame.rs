//! Audio frames and the outbound sinks that receive them.

use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::core::tts::SampleRate;

/// Bytes per sample for the 16-bit PCM the relay produces.
pub const PCM16_BYTES_PER_SAMPLE: usize = 2;

/// Layout of samples inside a frame payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    Interleaved,
    NonInterleaved,
}

/// Errors raised while building an [`AudioFrame`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("Audio payload is empty")]
    EmptyPayload,

    #[error("Audio payload of {len} bytes is not a whole number of {bytes_per_sample}-byte samples")]
    MisalignedPayload { len: usize, bytes_per_sample: usize },
}

/// One chunk of synthesized audio, ready for playback or forwarding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    sample_rate: SampleRate,
    bytes_per_sample: usize,
    channels: u16,
    data_format: SampleFormat,
    samples_per_channel: usize,
    payload: Bytes,
}

impl AudioFrame {
    /// Wrap a mono 16-bit interleaved PCM chunk.
    pub fn pcm16_mono(sample_rate: SampleRate, payload: Bytes) -> Result<Self, FrameError> {
        if payload.is_empty() {
            return Err(FrameError::EmptyPayload);
        }
        if payload.len() % PCM16_BYTES_PER_SAMPLE != 0 {
            return Err(FrameError::MisalignedPayload {
                len: payload.len(),
                bytes_per_sample: PCM16_BYTES_PER_SAMPLE,
            });
        }

        Ok(Self {
            sample_rate,
            bytes_per_sample: PCM16_BYTES_PER_SAMPLE,
            channels: 1,
            data_format: SampleFormat::Interleaved,
            samples_per_channel: payload.len() / PCM16_BYTES_PER_SAMPLE,
            payload,
        })
    }

    pub fn sample_rate(&self) -> SampleRate {
        self.sample_rate
    }

    pub fn bytes_per_sample(&self) -> usize {
        self.bytes_per_sample
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn data_format(&self) -> SampleFormat {
        self.data_format
    }

    pub fn samples_per_channel(&self) -> usize {
        self.samples_per_channel
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Consume the frame and return its payload.
    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// Playback duration of this frame.
    pub fn duration(&self) -> Duration {
        let hz = u64::from(self.sample_rate.hz());
        Duration::from_micros(self.samples_per_channel as u64 * 1_000_000 / hz)
    }
}

/// Errors raised by outbound sinks.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    #[error("Sink is closed")]
    Closed,
}

/// Receives finished audio frames.
///
/// Called from backend reader tasks, never from the controller, so
/// implementations must be cheap and must not block.
pub trait FrameSink: Send + Sync {
    fn send_frame(&self, frame: AudioFrame) -> Result<(), SinkError>;
}

/// Receives outbound control commands (for example a downstream `flush`).
pub trait CommandSink: Send + Sync {
    fn send_command(&self, name: &str) -> Result<(), SinkError>;
}

/// Everything the relay emits towards the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundEvent {
    Frame(AudioFrame),
    Command(String),
}

/// Sink that forwards frames and commands into a tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<OutboundEvent>,
}

impl ChannelSink {
    /// Create a sink together with the receiving end of its channel.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<OutboundEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl FrameSink for ChannelSink {
    fn send_frame(&self, frame: AudioFrame) -> Result<(), SinkError> {
        self.sender
            .send(OutboundEvent::Frame(frame))
            .map_err(|_| SinkError::Closed)
    }
}

impl CommandSink for ChannelSink {
    fn send_command(&self, name: &str) -> Result<(), SinkError> {
        self.sender
            .send(OutboundEvent::Command(name.to_string()))
            .map_err(|_| SinkError::Closed)
    }
}
