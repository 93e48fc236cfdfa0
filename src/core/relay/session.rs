//! Synthesis session: one backend connection plus the listener that turns its
//! audio into frames.
//!
//! The listener runs on the backend's reader task. It never touches
//! controller state; it only consults the shared [`StalenessGate`] and pushes
//! frames into the [`FrameSink`].

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::frame::{AudioFrame, FrameSink, PCM16_BYTES_PER_SAMPLE};
use super::staleness::{StalenessGate, Timestamp};
use super::stats::RelayStats;
use crate::core::tts::{
    SampleRate, SynthesisBackend, SynthesisCallback, SynthesisConnection, SynthesisError,
    SynthesisResult, VoiceParams,
};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Shared collaborators every session needs.
#[derive(Clone)]
pub struct SessionContext {
    pub gate: StalenessGate,
    pub sink: Arc<dyn FrameSink>,
    pub stats: Arc<RelayStats>,
}

/// Callback registered with the backend for one session.
pub struct SessionListener {
    session_id: u64,
    gate: StalenessGate,
    sink: Arc<dyn FrameSink>,
    stats: Arc<RelayStats>,
    sample_rate: SampleRate,
    opened_at: Timestamp,
    /// Timestamp of the input currently being synthesized
    input_ts: AtomicU64,
    ttfb: OnceLock<Duration>,
    /// Trailing byte of a chunk that ended mid-sample
    carry: Mutex<Option<u8>>,
    closed: AtomicBool,
    frames_emitted: AtomicU64,
    frames_dropped: AtomicU64,
}

impl SessionListener {
    fn new(session_id: u64, sample_rate: SampleRate, ctx: &SessionContext) -> Self {
        let opened_at = Timestamp::now();
        Self {
            session_id,
            gate: ctx.gate.clone(),
            sink: ctx.sink.clone(),
            stats: ctx.stats.clone(),
            sample_rate,
            opened_at,
            input_ts: AtomicU64::new(opened_at.as_nanos()),
            ttfb: OnceLock::new(),
            carry: Mutex::new(None),
            closed: AtomicBool::new(false),
            frames_emitted: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
        }
    }

    pub fn input_timestamp(&self) -> Timestamp {
        Timestamp::from_nanos(self.input_ts.load(Ordering::Acquire))
    }

    fn set_input_timestamp(&self, ts: Timestamp) {
        self.input_ts.store(ts.as_nanos(), Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn is_stale(&self) -> bool {
        self.gate.is_stale(self.input_timestamp())
    }

    pub fn ttfb(&self) -> Option<Duration> {
        self.ttfb.get().copied()
    }

    pub fn frames_emitted(&self) -> u64 {
        self.frames_emitted.load(Ordering::Relaxed)
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped.load(Ordering::Relaxed)
    }

    /// Join `data` with any byte left over from the previous chunk and hold
    /// back a new trailing half sample, so every payload is whole samples.
    fn align(&self, data: Bytes) -> Bytes {
        let mut carry = self.carry.lock();
        if carry.is_none() && data.len() % PCM16_BYTES_PER_SAMPLE == 0 {
            return data;
        }

        let mut buf = BytesMut::with_capacity(data.len() + 1);
        if let Some(byte) = carry.take() {
            buf.extend_from_slice(&[byte]);
        }
        buf.extend_from_slice(&data);
        if buf.len() % PCM16_BYTES_PER_SAMPLE != 0 {
            *carry = buf.last().copied();
            buf.truncate(buf.len() - 1);
        }
        buf.freeze()
    }

    fn record_first_byte(&self) {
        if self.ttfb.get().is_some() {
            return;
        }
        let ttfb = Timestamp::now().saturating_duration_since(self.opened_at);
        if self.ttfb.set(ttfb).is_ok() {
            info!(
                session_id = self.session_id,
                "TTS TTFB {}ms",
                ttfb.as_millis()
            );
        }
    }
}

impl SynthesisCallback for SessionListener {
    fn on_audio(&self, data: Bytes) {
        if data.is_empty() {
            return;
        }
        if self.is_stale() {
            self.carry.lock().take();
            self.frames_dropped.fetch_add(1, Ordering::Relaxed);
            self.stats.record_frame_dropped();
            debug!(
                session_id = self.session_id,
                "Dropping {} bytes of outdated audio",
                data.len()
            );
            return;
        }

        self.record_first_byte();

        let payload = self.align(data);
        if payload.is_empty() {
            return;
        }
        let frame = match AudioFrame::pcm16_mono(self.sample_rate, payload) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(session_id = self.session_id, "Failed to build audio frame: {}", e);
                return;
            }
        };

        match self.sink.send_frame(frame) {
            Ok(()) => {
                self.frames_emitted.fetch_add(1, Ordering::Relaxed);
                self.stats.record_frame_emitted();
            }
            Err(e) => {
                warn!(session_id = self.session_id, "Failed to emit audio frame: {}", e);
            }
        }
    }

    fn on_error(&self, error: SynthesisError) {
        warn!(session_id = self.session_id, "Speech synthesis task failed: {}", error);
    }

    fn on_complete(&self) {
        info!(session_id = self.session_id, "Speech synthesis task complete");
    }

    fn on_close(&self) {
        debug!(session_id = self.session_id, "Synthesis connection closed");
        self.closed.store(true, Ordering::Release);
    }
}

/// An open synthesis session owned by the controller.
pub struct SynthesisSession<C: SynthesisConnection> {
    id: u64,
    connection: C,
    listener: Arc<SessionListener>,
}

impl<C: SynthesisConnection> SynthesisSession<C> {
    /// Open a connection on `backend` and register a fresh listener.
    pub async fn open<B>(backend: &B, params: &VoiceParams, ctx: &SessionContext) -> SynthesisResult<Self>
    where
        B: SynthesisBackend<Connection = C>,
    {
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        let listener = Arc::new(SessionListener::new(id, params.sample_rate, ctx));

        info!(
            session_id = id,
            backend = backend.name(),
            voice = %params.voice,
            model = %params.model,
            sample_rate = %params.sample_rate,
            "Opening synthesis session"
        );
        let connection = backend.open(params, listener.clone()).await?;
        ctx.stats.record_session_opened();

        Ok(Self {
            id,
            connection,
            listener,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn listener(&self) -> &Arc<SessionListener> {
        &self.listener
    }

    pub fn input_timestamp(&self) -> Timestamp {
        self.listener.input_timestamp()
    }

    /// Attribute the session to the input stamped `ts`.
    pub fn set_input_timestamp(&self, ts: Timestamp) {
        self.listener.set_input_timestamp(ts);
    }

    /// `true` once the remote side closed the connection.
    pub fn is_closed(&self) -> bool {
        self.listener.is_closed()
    }

    /// `true` when a flush has outdated the input this session is working on.
    pub fn is_stale(&self) -> bool {
        self.listener.is_stale()
    }

    pub fn ttfb(&self) -> Option<Duration> {
        self.listener.ttfb()
    }

    /// Send `text` to the backend. Empty text is not sent.
    pub async fn feed(&mut self, text: &str) -> SynthesisResult<()> {
        if text.is_empty() {
            return Ok(());
        }
        debug!(session_id = self.id, "Feeding {} chars", text.chars().count());
        self.connection.feed(text).await
    }

    /// Finish the current segment and release the session.
    ///
    /// Failures are logged, never returned: the segment boundary is crossed
    /// either way.
    pub async fn complete_segment(mut self, ctx: &SessionContext) {
        match self.connection.complete_segment().await {
            Ok(()) => {
                ctx.stats.record_segment_completed();
                debug!(
                    session_id = self.id,
                    frames = self.listener.frames_emitted(),
                    dropped = self.listener.frames_dropped(),
                    "Segment complete"
                );
            }
            Err(e) => warn!(session_id = self.id, "Failed to complete segment: {}", e),
        }
    }

    /// Abort the session. Failures are logged, never returned.
    pub async fn cancel(mut self, ctx: &SessionContext) {
        ctx.stats.record_session_cancelled();
        match self.connection.cancel().await {
            Ok(()) => info!(session_id = self.id, "Synthesis session cancelled"),
            Err(e) => warn!(session_id = self.id, "Failed to cancel synthesis session: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::relay::frame::{ChannelSink, OutboundEvent};

    fn context(gate: StalenessGate) -> (SessionContext, tokio::sync::mpsc::UnboundedReceiver<OutboundEvent>) {
        let (sink, receiver) = ChannelSink::channel();
        (
            SessionContext {
                gate,
                sink: Arc::new(sink),
                stats: Arc::new(RelayStats::new()),
            },
            receiver,
        )
    }

    #[test]
    fn fresh_audio_is_forwarded_and_ttfb_recorded_once() {
        let gate = StalenessGate::new(Timestamp::from_nanos(0));
        let (ctx, mut receiver) = context(gate);
        let listener = SessionListener::new(1, SampleRate::Hz16000, &ctx);
        listener.set_input_timestamp(Timestamp::from_nanos(1_000));

        listener.on_audio(Bytes::from_static(&[0, 1, 2, 3]));
        let first = listener.ttfb().expect("ttfb recorded");
        listener.on_audio(Bytes::from_static(&[4, 5]));

        assert_eq!(listener.ttfb(), Some(first));
        assert_eq!(listener.frames_emitted(), 2);
        assert!(matches!(receiver.try_recv(), Ok(OutboundEvent::Frame(_))));
        assert!(matches!(receiver.try_recv(), Ok(OutboundEvent::Frame(_))));
        assert_eq!(ctx.stats.snapshot().frames_emitted, 2);
    }

    #[test]
    fn stale_audio_is_dropped_without_ttfb() {
        let gate = StalenessGate::new(Timestamp::from_nanos(0));
        let (ctx, mut receiver) = context(gate.clone());
        let listener = SessionListener::new(2, SampleRate::Hz24000, &ctx);
        listener.set_input_timestamp(Timestamp::from_nanos(10));

        gate.mark_outdated_before(Timestamp::from_nanos(20));
        listener.on_audio(Bytes::from_static(&[0, 0]));

        assert!(listener.ttfb().is_none());
        assert_eq!(listener.frames_dropped(), 1);
        assert!(receiver.try_recv().is_err());
        assert_eq!(ctx.stats.snapshot().frames_dropped, 1);
    }

    #[test]
    fn chunks_split_mid_sample_are_realigned() {
        let gate = StalenessGate::new(Timestamp::from_nanos(0));
        let (ctx, mut receiver) = context(gate);
        let listener = SessionListener::new(3, SampleRate::Hz8000, &ctx);
        listener.set_input_timestamp(Timestamp::from_nanos(1_000));

        listener.on_audio(Bytes::from_static(&[1, 2, 3]));
        listener.on_audio(Bytes::new());
        listener.on_audio(Bytes::from_static(&[4]));
        listener.on_audio(Bytes::from_static(&[5, 6]));

        let payloads: Vec<Vec<u8>> = std::iter::from_fn(|| match receiver.try_recv() {
            Ok(OutboundEvent::Frame(frame)) => Some(frame.payload().to_vec()),
            _ => None,
        })
        .collect();
        assert_eq!(payloads, vec![vec![1, 2], vec![3, 4], vec![5, 6]]);
        assert_eq!(listener.frames_emitted(), 3);

        // A lone byte is held until the next chunk completes it.
        listener.on_audio(Bytes::from_static(&[7]));
        assert!(receiver.try_recv().is_err());
        listener.on_audio(Bytes::from_static(&[8, 9, 10]));
        match receiver.try_recv() {
            Ok(OutboundEvent::Frame(frame)) => assert_eq!(frame.payload().as_ref(), &[7, 8, 9, 10]),
            other => panic!("expected a frame, got {other:?}"),
        }
    }

    #[test]
    fn stale_audio_discards_a_pending_half_sample() {
        let gate = StalenessGate::new(Timestamp::from_nanos(0));
        let (ctx, mut receiver) = context(gate.clone());
        let listener = SessionListener::new(5, SampleRate::Hz16000, &ctx);
        listener.set_input_timestamp(Timestamp::from_nanos(10));

        listener.on_audio(Bytes::from_static(&[1, 2, 3]));
        gate.mark_outdated_before(Timestamp::from_nanos(20));
        listener.on_audio(Bytes::from_static(&[4]));
        listener.set_input_timestamp(Timestamp::from_nanos(30));
        listener.on_audio(Bytes::from_static(&[5, 6]));

        let payloads: Vec<Vec<u8>> = std::iter::from_fn(|| match receiver.try_recv() {
            Ok(OutboundEvent::Frame(frame)) => Some(frame.payload().to_vec()),
            _ => None,
        })
        .collect();
        assert_eq!(payloads, vec![vec![1, 2], vec![5, 6]]);
    }

    #[test]
    fn close_sets_the_closed_flag() {
        let (ctx, _receiver) = context(StalenessGate::new(Timestamp::from_nanos(0)));
        let listener = SessionListener::new(4, SampleRate::Hz16000, &ctx);
        assert!(!listener.is_closed());
        listener.on_close();
        assert!(listener.is_closed());
    }
}
