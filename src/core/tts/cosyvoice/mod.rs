//! CosyVoice text-to-speech over the DashScope WebSocket API.
//!
//! # Architecture
//!
//! ```text
//! CosyVoiceBackend::open ──► connect + run-task ──► wait task-started
//!                                   │
//!                                   └── reader task ──► SynthesisCallback
//!                                         (binary audio, task events)
//! CosyVoiceConnection::feed            ──► continue-task
//! CosyVoiceConnection::complete_segment ──► finish-task, wait task-finished
//! CosyVoiceConnection::cancel          ──► close socket, stop reader
//! ```
//!
//! Each connection carries exactly one task; a new segment opens a new
//! connection.

mod config;
mod messages;
mod provider;

pub use config::{COSYVOICE_WS_URL, CosyVoiceConfig, DEFAULT_CONNECT_TIMEOUT};
pub use messages::{
    ClientAction, ClientMessage, ServerEvent, ServerMessage, SynthesisParameters,
};
pub use provider::{CosyVoiceBackend, CosyVoiceConnection};
