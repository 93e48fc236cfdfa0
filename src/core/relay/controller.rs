//! The synthesis worker.
//!
//! A single long-lived task pops inputs from the [`InputQueue`] and drives at
//! most one [`SynthesisSession`] at a time. Staleness is only observed here
//! between items; chunk-level staleness is enforced by the session listener.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::queue::{InputQueue, PendingInput, QueueItem};
use super::session::{SessionContext, SynthesisSession};
use crate::core::tts::{SynthesisBackend, SynthesisResult, VoiceParams};

/// When the worker completes a segment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentMode {
    /// Every input is its own segment.
    #[default]
    PerItem,
    /// Inputs feed the same session until one arrives with `end_of_segment`.
    Accumulate,
}

impl fmt::Display for SegmentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SegmentMode::PerItem => write!(f, "per_item"),
            SegmentMode::Accumulate => write!(f, "accumulate"),
        }
    }
}

impl FromStr for SegmentMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "per_item" | "item" => Ok(SegmentMode::PerItem),
            "accumulate" => Ok(SegmentMode::Accumulate),
            other => Err(format!(
                "Unknown segment mode '{other}'; expected 'per_item' or 'accumulate'"
            )),
        }
    }
}

/// Serializes synthesis work onto one task and one session at a time.
pub struct SessionController<B: SynthesisBackend> {
    backend: Arc<B>,
    queue: InputQueue,
    ctx: SessionContext,
    params: Arc<RwLock<VoiceParams>>,
    mode: SegmentMode,
}

impl<B: SynthesisBackend> SessionController<B> {
    pub fn new(
        backend: Arc<B>,
        queue: InputQueue,
        ctx: SessionContext,
        params: Arc<RwLock<VoiceParams>>,
        mode: SegmentMode,
    ) -> Self {
        Self {
            backend,
            queue,
            ctx,
            params,
            mode,
        }
    }

    /// Run the worker on a new tokio task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Process queue items until a shutdown sentinel is popped.
    pub async fn run(self) {
        info!(
            backend = self.backend.name(),
            mode = %self.mode,
            "Synthesis worker started"
        );

        let mut active: Option<SynthesisSession<B::Connection>> = None;
        loop {
            let input = match self.queue.pop().await {
                QueueItem::Shutdown => {
                    info!("Synthesis worker received shutdown");
                    break;
                }
                QueueItem::Input(input) => input,
            };

            if let Err(e) = self.process(input, &mut active).await {
                self.ctx.stats.record_iteration_error();
                error!("Failed to synthesize input: {}", e);
            }
        }

        if let Some(session) = active.take() {
            info!(session_id = session.id(), "Cancelling session left open at shutdown");
            session.cancel(&self.ctx).await;
        }
        info!("Synthesis worker stopped");
    }

    async fn process(
        &self,
        input: PendingInput,
        active: &mut Option<SynthesisSession<B::Connection>>,
    ) -> SynthesisResult<()> {
        if let Some(session) = active.take_if(|session| session.is_closed()) {
            debug!(session_id = session.id(), "Session closed by remote, discarding");
            self.ctx.stats.record_remote_close();
        }

        if let Some(session) = active.take_if(|session| session.is_stale()) {
            info!(session_id = session.id(), "Interrupting outdated session");
            session.cancel(&self.ctx).await;
        }

        if self.ctx.gate.is_stale(input.enqueued_at) {
            info!(enqueued_at = %input.enqueued_at, "Dropping outdated input");
            self.ctx.stats.record_dropped_input();
            return Ok(());
        }

        if active.is_none() {
            let params = self.params.read().clone();
            let session = SynthesisSession::open(self.backend.as_ref(), &params, &self.ctx).await?;
            // A flush may have landed while the connection was being set up.
            if self.ctx.gate.is_stale(input.enqueued_at) {
                info!(
                    session_id = session.id(),
                    enqueued_at = %input.enqueued_at,
                    "Input outdated while opening session, dropping"
                );
                self.ctx.stats.record_dropped_input();
                session.cancel(&self.ctx).await;
                return Ok(());
            }
            *active = Some(session);
        }
        let Some(session) = active.as_mut() else {
            return Ok(());
        };

        session.set_input_timestamp(input.enqueued_at);
        debug!(
            session_id = session.id(),
            enqueued_at = %input.enqueued_at,
            end_of_segment = input.end_of_segment,
            "Synthesizing input"
        );

        if let Err(e) = session.feed(&input.text).await {
            if let Some(session) = active.take() {
                session.cancel(&self.ctx).await;
            }
            return Err(e);
        }

        let finish = match self.mode {
            SegmentMode::PerItem => true,
            SegmentMode::Accumulate => input.end_of_segment,
        };
        if finish && let Some(session) = active.take() {
            session.complete_segment(&self.ctx).await;
        }
        Ok(())
    }
}
