//! Host-facing relay facade

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::config::TtsRelayConfig;
use super::controller::{SegmentMode, SessionController};
use super::errors::{RelayError, RelayResult};
use super::frame::{CommandSink, FrameSink};
use super::queue::{InputQueue, PendingInput, QueueItem};
use super::session::SessionContext;
use super::staleness::{StalenessGate, Timestamp};
use super::stats::{RelayStats, RelayStatsSnapshot};
use crate::core::tts::{SynthesisBackend, VoiceParams};

/// Name of the command that interrupts everything in flight.
pub const FLUSH_COMMAND: &str = "flush";

/// Outcome of a control command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    Ok,
    Error,
}

/// Acknowledgement returned by [`TtsRelay::on_cmd`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub status: CommandStatus,
    pub detail: String,
}

impl CommandResult {
    pub fn ok(detail: impl Into<String>) -> Self {
        Self {
            status: CommandStatus::Ok,
            detail: detail.into(),
        }
    }

    pub fn error(detail: impl Into<String>) -> Self {
        Self {
            status: CommandStatus::Error,
            detail: detail.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == CommandStatus::Ok
    }
}

/// Streaming text-to-speech relay.
///
/// Text arrives through [`on_data`](Self::on_data) from any task, is
/// synthesized in arrival order by a single worker, and leaves as audio
/// frames on the [`FrameSink`]. A [`flush`](Self::flush) makes everything
/// received so far obsolete: queued text is discarded and audio still
/// arriving for it is dropped.
///
/// # Example
/// ```rust,no_run
/// use std::sync::Arc;
/// use cosy_relay::core::relay::{ChannelSink, TtsRelay, TtsRelayConfig};
/// use cosy_relay::core::tts::stub::StubBackend;
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let (sink, mut frames) = ChannelSink::channel();
/// let sink = Arc::new(sink);
/// let relay = TtsRelay::start(
///     TtsRelayConfig::default(),
///     StubBackend::default(),
///     sink.clone(),
///     sink,
/// )?;
///
/// relay.on_data("Hello there.", true);
/// relay.stop().await?;
/// while let Ok(event) = frames.try_recv() {
///     println!("{event:?}");
/// }
/// # Ok(())
/// # }
/// ```
pub struct TtsRelay<B: SynthesisBackend> {
    backend: Arc<B>,
    queue: InputQueue,
    gate: StalenessGate,
    stats: Arc<RelayStats>,
    params: Arc<RwLock<VoiceParams>>,
    command_sink: Arc<dyn CommandSink>,
    segment_mode: SegmentMode,
    stopped: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<B: SynthesisBackend> TtsRelay<B> {
    /// Validate `config` and spawn the synthesis worker.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        config: TtsRelayConfig,
        backend: B,
        frame_sink: Arc<dyn FrameSink>,
        command_sink: Arc<dyn CommandSink>,
    ) -> RelayResult<Self> {
        let params = config.voice_params()?;
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(RelayError::Configuration(
                "relay must be started inside a tokio runtime".to_string(),
            ));
        }

        let backend = Arc::new(backend);
        let queue = InputQueue::new();
        let gate = StalenessGate::starting_now();
        let stats = Arc::new(RelayStats::new());
        let params = Arc::new(RwLock::new(params));

        info!(
            backend = backend.name(),
            voice = %config.voice,
            model = %config.model,
            sample_rate = config.sample_rate,
            segment_mode = %config.segment_mode,
            "Starting TTS relay"
        );

        let controller = SessionController::new(
            backend.clone(),
            queue.clone(),
            SessionContext {
                gate: gate.clone(),
                sink: frame_sink,
                stats: stats.clone(),
            },
            params.clone(),
            config.segment_mode,
        );
        let worker = controller.spawn();

        Ok(Self {
            backend,
            queue,
            gate,
            stats,
            params,
            command_sink,
            segment_mode: config.segment_mode,
            stopped: AtomicBool::new(false),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Queue `text` for synthesis. Ignored once the relay is stopped.
    pub fn on_data(&self, text: impl Into<String>, end_of_segment: bool) {
        let input = PendingInput::now(text, end_of_segment);
        if self.is_stopped() {
            warn!(
                "Ignoring {} chars of text received after stop",
                input.text.chars().count()
            );
            return;
        }
        debug!(
            enqueued_at = %input.enqueued_at,
            end_of_segment,
            "Queued {} chars",
            input.text.chars().count()
        );
        self.stats.record_input();
        self.queue.push(QueueItem::Input(input));
    }

    /// Handle a control command. Every command is acknowledged as success.
    pub fn on_cmd(&self, name: &str) -> CommandResult {
        info!("on_cmd name {}", name);
        if name == FLUSH_COMMAND {
            self.flush();
            if let Err(e) = self.command_sink.send_command(FLUSH_COMMAND) {
                warn!("Failed to forward flush downstream: {}", e);
            }
        } else {
            info!("Unknown cmd {}", name);
        }
        CommandResult::ok("success")
    }

    /// Make every input received so far obsolete and discard queued text.
    ///
    /// Returns the number of queued inputs discarded.
    pub fn flush(&self) -> usize {
        self.gate.mark_outdated_before(Timestamp::now());
        let drained = self.queue.drain();
        self.stats.record_flushed_inputs(drained);
        info!(drained, "Flushed relay");
        drained
    }

    /// Flush, stop the worker and wait for it to exit. Safe to call twice.
    pub async fn stop(&self) -> RelayResult<()> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            debug!("Relay already stopped");
            return Ok(());
        }

        info!("Stopping TTS relay");
        self.flush();
        self.join_worker().await
    }

    /// Stop accepting text, let the worker synthesize everything already
    /// queued, then wait for it to exit.
    ///
    /// A segment still open in [`SegmentMode::Accumulate`] when the queue runs
    /// dry is cancelled. Calling this after [`stop`](Self::stop) is a no-op.
    pub async fn finish(&self) -> RelayResult<()> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            debug!("Relay already stopped");
            return Ok(());
        }

        info!(pending = self.queue.len(), "Finishing TTS relay");
        self.join_worker().await
    }

    async fn join_worker(&self) -> RelayResult<()> {
        self.queue.push(QueueItem::Shutdown);

        let worker = self.worker.lock().take();
        let joined = match worker {
            Some(worker) => worker
                .await
                .map_err(|e| RelayError::WorkerJoin(e.to_string())),
            None => Ok(()),
        };

        let leftover = self.queue.drain();
        if leftover > 0 {
            self.stats.record_flushed_inputs(leftover);
            debug!(leftover, "Discarded inputs queued during shutdown");
        }
        info!("TTS relay stopped");
        joined
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Replace the voice parameters used for sessions opened from now on.
    pub fn update_voice_params(&self, params: VoiceParams) {
        info!(voice = %params.voice, model = %params.model, "Updating voice parameters");
        *self.params.write() = params;
    }

    pub fn voice_params(&self) -> VoiceParams {
        self.params.read().clone()
    }

    pub fn segment_mode(&self) -> SegmentMode {
        self.segment_mode
    }

    pub fn stats(&self) -> RelayStatsSnapshot {
        self.stats.snapshot()
    }

    /// Inputs waiting for the worker.
    pub fn pending_inputs(&self) -> usize {
        self.queue.len()
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }
}

impl<B: SynthesisBackend> Drop for TtsRelay<B> {
    fn drop(&mut self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            // Let the worker cancel its session and exit on its own.
            self.gate.mark_outdated_before(Timestamp::now());
            self.queue.drain();
            self.queue.push(QueueItem::Shutdown);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::relay::frame::{ChannelSink, OutboundEvent};
    use crate::core::tts::stub::StubBackend;

    fn relay(backend: StubBackend) -> (TtsRelay<StubBackend>, tokio::sync::mpsc::UnboundedReceiver<OutboundEvent>) {
        let (sink, receiver) = ChannelSink::channel();
        let sink = Arc::new(sink);
        let relay = TtsRelay::start(TtsRelayConfig::default(), backend, sink.clone(), sink)
            .expect("relay starts");
        (relay, receiver)
    }

    #[tokio::test]
    async fn invalid_sample_rate_is_fatal_at_start() {
        let (sink, _receiver) = ChannelSink::channel();
        let sink = Arc::new(sink);
        let config = TtsRelayConfig {
            sample_rate: 12345,
            ..Default::default()
        };
        let backend = StubBackend::default();

        let result = TtsRelay::start(config, backend.clone(), sink.clone(), sink);
        assert!(matches!(result, Err(RelayError::InvalidSampleRate(_))));
        assert_eq!(backend.sessions_opened(), 0);
    }

    #[tokio::test]
    async fn unknown_command_is_acknowledged() {
        let (relay, mut receiver) = relay(StubBackend::default());

        let result = relay.on_cmd("rewind");
        assert_eq!(result, CommandResult::ok("success"));
        assert!(receiver.try_recv().is_err());

        relay.stop().await.unwrap();
    }

    #[tokio::test]
    async fn flush_command_is_forwarded_downstream() {
        let (relay, mut receiver) = relay(StubBackend::default());

        assert!(relay.on_cmd("flush").is_ok());
        assert_eq!(
            receiver.recv().await,
            Some(OutboundEvent::Command("flush".to_string()))
        );

        relay.stop().await.unwrap();
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_ignores_later_data() {
        let backend = StubBackend::default();
        let (relay, _receiver) = relay(backend.clone());

        relay.stop().await.unwrap();
        relay.stop().await.unwrap();
        relay.on_data("too late", true);

        assert!(relay.is_stopped());
        assert_eq!(relay.pending_inputs(), 0);
        assert_eq!(relay.stats().inputs_received, 0);
        assert_eq!(backend.sessions_opened(), 0);
    }

    #[tokio::test]
    async fn finish_synthesizes_queued_text_before_exiting() {
        let backend = StubBackend::default();
        let (relay, mut receiver) = relay(backend.clone());

        relay.on_data("one", true);
        relay.on_data("two", true);
        relay.finish().await.unwrap();
        relay.on_data("three", true);

        assert_eq!(backend.fed_texts(), vec!["one", "two"]);
        let stats = relay.stats();
        assert_eq!(stats.segments_completed, 2);
        assert_eq!(stats.inputs_flushed, 0);

        let mut frames = 0;
        while let Ok(event) = receiver.try_recv() {
            assert!(matches!(event, OutboundEvent::Frame(_)));
            frames += 1;
        }
        assert_eq!(frames, 4);
    }

    #[tokio::test]
    async fn updated_voice_applies_to_next_session() {
        let backend = StubBackend::default();
        let (relay, _receiver) = relay(backend.clone());

        relay.update_voice_params(VoiceParams {
            voice: "longwan".to_string(),
            ..relay.voice_params()
        });
        relay.on_data("hi", true);
        while backend.sessions_opened() == 0 {
            tokio::task::yield_now().await;
        }
        relay.stop().await.unwrap();

        assert!(backend.events().contains(&crate::core::tts::stub::StubEvent::Opened {
            session: 1,
            voice: "longwan".to_string()
        }));
    }
}
