//! # Relay
//!
//! Turns a stream of text into a stream of audio frames through a synthesis
//! backend, one session at a time, and lets a flush interrupt everything in
//! flight.
//!
//! - [`TtsRelay`] is the host-facing facade: data, commands, start and stop.
//! - [`SessionController`] is the single worker that owns the session.
//! - [`StalenessGate`] decides which inputs and audio a flush made obsolete.
//! - [`SessionListener`] forwards fresh audio to the [`FrameSink`].

pub mod config;
pub mod controller;
pub mod errors;
pub mod frame;
pub mod manager;
pub mod queue;
pub mod session;
pub mod staleness;
pub mod stats;

pub use config::TtsRelayConfig;
pub use controller::{SegmentMode, SessionController};
pub use errors::{RelayError, RelayResult};
pub use frame::{
    AudioFrame, ChannelSink, CommandSink, FrameError, FrameSink, OutboundEvent, SampleFormat,
    SinkError,
};
pub use manager::{CommandResult, CommandStatus, FLUSH_COMMAND, TtsRelay};
pub use queue::{InputQueue, PendingInput, QueueItem};
pub use session::{SessionContext, SessionListener, SynthesisSession};
pub use staleness::{StalenessGate, Timestamp};
pub use stats::{RelayStats, RelayStatsSnapshot};
