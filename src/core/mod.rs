pub mod relay;
pub mod tts;

// Re-export commonly used types for convenience
pub use relay::{
    AudioFrame, ChannelSink, CommandResult, CommandSink, FrameSink, OutboundEvent, RelayError,
    RelayResult, RelayStatsSnapshot, SegmentMode, TtsRelay, TtsRelayConfig,
};
pub use tts::{
    CosyVoiceBackend, CosyVoiceConfig, SampleRate, StubBackend, SynthesisBackend,
    SynthesisCallback, SynthesisConnection, SynthesisError, SynthesisResult, VoiceParams,
};
