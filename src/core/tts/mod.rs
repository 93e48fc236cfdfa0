mod base;
pub mod cosyvoice;
pub mod stub;

pub use base::{
    SampleRate, SynthesisBackend, SynthesisCallback, SynthesisConnection, SynthesisError,
    SynthesisResult, UnsupportedSampleRate, VoiceParams,
};
pub use cosyvoice::{COSYVOICE_WS_URL, CosyVoiceBackend, CosyVoiceConfig, CosyVoiceConnection};
pub use stub::{StubBackend, StubConfig, StubConnection, StubEvent};
