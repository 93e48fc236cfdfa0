//! # Staleness Gate
//!
//! Timestamp-based invalidation of in-flight synthesis work.
//!
//! A flush does not cancel anything directly. It moves a single "outdated
//! before" marker forward, and every party that holds a timestamp (queued
//! input, an open session, the audio listener) asks the gate whether its
//! timestamp is still relevant.

use std::fmt;
use std::sync::Arc;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Process-wide origin for [`Timestamp`].
fn clock_origin() -> Instant {
    static ORIGIN: OnceLock<Instant> = OnceLock::new();
    *ORIGIN.get_or_init(Instant::now)
}

/// A point on the process-wide monotonic clock, in nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Read the monotonic clock.
    pub fn now() -> Self {
        let elapsed = clock_origin().elapsed();
        Self(u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX))
    }

    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    /// Time elapsed from `earlier` to `self`, saturating at zero.
    pub fn saturating_duration_since(self, earlier: Timestamp) -> Duration {
        Duration::from_nanos(self.0.saturating_sub(earlier.0))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let micros = self.0 / 1_000;
        write!(f, "{}.{:06}s", micros / 1_000_000, micros % 1_000_000)
    }
}

/// Shared "outdated before" marker.
///
/// Cloning the gate shares the marker, so the controller, the relay facade
/// and every session listener observe the same cutoff.
#[derive(Debug, Clone)]
pub struct StalenessGate {
    outdated_before: Arc<AtomicU64>,
}

impl StalenessGate {
    /// Create a gate whose marker is set to `marker`.
    pub fn new(marker: Timestamp) -> Self {
        Self {
            outdated_before: Arc::new(AtomicU64::new(marker.as_nanos())),
        }
    }

    /// Create a gate whose marker is the current instant.
    pub fn starting_now() -> Self {
        Self::new(Timestamp::now())
    }

    /// Move the marker forward to `ts`.
    ///
    /// The marker never moves backwards; an earlier `ts` is ignored.
    /// Returns `true` when the marker advanced.
    pub fn mark_outdated_before(&self, ts: Timestamp) -> bool {
        let previous = self
            .outdated_before
            .fetch_max(ts.as_nanos(), Ordering::AcqRel);
        let advanced = ts.as_nanos() > previous;
        if advanced {
            tracing::debug!("Staleness marker advanced to {}", ts);
        } else {
            tracing::debug!(
                "Ignoring staleness marker {} (current marker is {})",
                ts,
                Timestamp::from_nanos(previous)
            );
        }
        advanced
    }

    /// Current marker value.
    pub fn marker(&self) -> Timestamp {
        Timestamp::from_nanos(self.outdated_before.load(Ordering::Acquire))
    }

    /// `true` when `ts` is not after the current marker.
    pub fn is_stale(&self, ts: Timestamp) -> bool {
        ts.as_nanos() <= self.outdated_before.load(Ordering::Acquire)
    }
}

impl Default for StalenessGate {
    fn default() -> Self {
        Self::starting_now()
    }
}
