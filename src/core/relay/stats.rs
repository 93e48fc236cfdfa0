//! Counters describing what the relay did with its inputs and audio.

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters, shared between the relay facade, the controller and every
/// session listener.
#[derive(Debug, Default)]
pub struct RelayStats {
    inputs_received: AtomicU64,
    inputs_dropped: AtomicU64,
    inputs_flushed: AtomicU64,
    sessions_opened: AtomicU64,
    segments_completed: AtomicU64,
    sessions_cancelled: AtomicU64,
    sessions_closed_remotely: AtomicU64,
    iteration_errors: AtomicU64,
    frames_emitted: AtomicU64,
    frames_dropped: AtomicU64,
}

/// Point-in-time copy of [`RelayStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStatsSnapshot {
    pub inputs_received: u64,
    /// Inputs dequeued after a flush made them stale
    pub inputs_dropped: u64,
    /// Inputs discarded from the queue by a flush or stop
    pub inputs_flushed: u64,
    pub sessions_opened: u64,
    pub segments_completed: u64,
    pub sessions_cancelled: u64,
    pub sessions_closed_remotely: u64,
    pub iteration_errors: u64,
    pub frames_emitted: u64,
    /// Audio chunks discarded because their session was stale
    pub frames_dropped: u64,
}

macro_rules! counter {
    ($record:ident, $field:ident) => {
        pub(crate) fn $record(&self) {
            self.$field.fetch_add(1, Ordering::Relaxed);
        }
    };
}

impl RelayStats {
    pub fn new() -> Self {
        Self::default()
    }

    counter!(record_input, inputs_received);
    counter!(record_dropped_input, inputs_dropped);
    counter!(record_session_opened, sessions_opened);
    counter!(record_segment_completed, segments_completed);
    counter!(record_session_cancelled, sessions_cancelled);
    counter!(record_remote_close, sessions_closed_remotely);
    counter!(record_iteration_error, iteration_errors);
    counter!(record_frame_emitted, frames_emitted);
    counter!(record_frame_dropped, frames_dropped);

    pub(crate) fn record_flushed_inputs(&self, count: usize) {
        self.inputs_flushed
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RelayStatsSnapshot {
        RelayStatsSnapshot {
            inputs_received: self.inputs_received.load(Ordering::Relaxed),
            inputs_dropped: self.inputs_dropped.load(Ordering::Relaxed),
            inputs_flushed: self.inputs_flushed.load(Ordering::Relaxed),
            sessions_opened: self.sessions_opened.load(Ordering::Relaxed),
            segments_completed: self.segments_completed.load(Ordering::Relaxed),
            sessions_cancelled: self.sessions_cancelled.load(Ordering::Relaxed),
            sessions_closed_remotely: self.sessions_closed_remotely.load(Ordering::Relaxed),
            iteration_errors: self.iteration_errors.load(Ordering::Relaxed),
            frames_emitted: self.frames_emitted.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
        }
    }
}
