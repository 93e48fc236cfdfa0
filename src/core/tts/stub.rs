//! Stub synthesis backend.
//!
//! Produces silent PCM in-process instead of talking to a remote service. It
//! records every call it receives so callers can inspect session lifecycles,
//! and it can be told to fail, to hold opens or segment completion, or to
//! close a session from the "remote" side.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::debug;

use super::base::{
    SynthesisBackend, SynthesisCallback, SynthesisConnection, SynthesisError, SynthesisResult,
    VoiceParams,
};

/// Audio produced for every fed text chunk.
#[derive(Debug, Clone)]
pub struct StubConfig {
    /// Bytes per emitted chunk (kept even for 16-bit PCM)
    pub chunk_bytes: usize,
    /// Chunks emitted after each `feed`
    pub chunks_per_text: usize,
    /// Delay between emitted chunks
    pub chunk_interval: Duration,
}

impl Default for StubConfig {
    fn default() -> Self {
        Self {
            chunk_bytes: 320,
            chunks_per_text: 2,
            chunk_interval: Duration::from_millis(1),
        }
    }
}

/// A call observed by the stub backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StubEvent {
    Opened { session: usize, voice: String },
    Fed { session: usize, text: String },
    Completed { session: usize },
    Cancelled { session: usize },
}

#[derive(Default)]
struct StubState {
    events: Mutex<Vec<StubEvent>>,
    next_session: AtomicUsize,
    open_attempts: AtomicUsize,
    open_now: AtomicUsize,
    max_open: AtomicUsize,
    fail_open: AtomicBool,
    fail_feed: AtomicBool,
    fail_complete: AtomicBool,
    hold: Mutex<Option<Arc<Semaphore>>>,
    hold_open: Mutex<Option<Arc<Semaphore>>>,
    current: Mutex<Option<(usize, Arc<dyn SynthesisCallback>)>>,
}

impl StubState {
    fn record(&self, event: StubEvent) {
        debug!("Stub backend event: {:?}", event);
        self.events.lock().push(event);
    }
}

/// In-process backend emitting silence.
#[derive(Clone, Default)]
pub struct StubBackend {
    config: StubConfig,
    state: Arc<StubState>,
}

impl StubBackend {
    pub fn new(config: StubConfig) -> Self {
        Self {
            config,
            state: Arc::new(StubState::default()),
        }
    }

    /// Every call observed so far, in order.
    pub fn events(&self) -> Vec<StubEvent> {
        self.state.events.lock().clone()
    }

    /// Texts fed so far, in order.
    pub fn fed_texts(&self) -> Vec<String> {
        self.state
            .events
            .lock()
            .iter()
            .filter_map(|event| match event {
                StubEvent::Fed { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    /// Calls to `open` that got past the failure check, including ones still
    /// waiting on [`hold_opens`](Self::hold_opens).
    pub fn open_attempts(&self) -> usize {
        self.state.open_attempts.load(Ordering::SeqCst)
    }

    pub fn sessions_opened(&self) -> usize {
        self.state.next_session.load(Ordering::SeqCst)
    }

    /// Connections currently alive.
    pub fn open_sessions(&self) -> usize {
        self.state.open_now.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously alive connections.
    pub fn max_concurrent_sessions(&self) -> usize {
        self.state.max_open.load(Ordering::SeqCst)
    }

    pub fn fail_open(&self, fail: bool) {
        self.state.fail_open.store(fail, Ordering::SeqCst);
    }

    pub fn fail_feed(&self, fail: bool) {
        self.state.fail_feed.store(fail, Ordering::SeqCst);
    }

    pub fn fail_complete(&self, fail: bool) {
        self.state.fail_complete.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `open` wait for
    /// [`release_opens`](Self::release_opens).
    pub fn hold_opens(&self) {
        *self.state.hold_open.lock() = Some(Arc::new(Semaphore::new(0)));
    }

    /// Let `count` held opens proceed.
    pub fn release_opens(&self, count: usize) {
        if let Some(hold) = self.state.hold_open.lock().as_ref() {
            hold.add_permits(count);
        }
    }

    /// Make every subsequent `complete_segment` wait for
    /// [`release_completions`](Self::release_completions).
    pub fn hold_completions(&self) {
        *self.state.hold.lock() = Some(Arc::new(Semaphore::new(0)));
    }

    /// Let `count` held completions proceed.
    pub fn release_completions(&self, count: usize) {
        if let Some(hold) = self.state.hold.lock().as_ref() {
            hold.add_permits(count);
        }
    }

    /// Deliver `data` to the most recently opened session's callback.
    ///
    /// Returns `false` when no session has been opened yet.
    pub fn emit_audio(&self, data: Bytes) -> bool {
        let current = self.state.current.lock().clone();
        match current {
            Some((_, callback)) => {
                callback.on_audio(data);
                true
            }
            None => false,
        }
    }

    /// Close the most recently opened session from the remote side.
    pub fn close_remotely(&self) -> bool {
        let current = self.state.current.lock().clone();
        match current {
            Some((_, callback)) => {
                callback.on_close();
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl SynthesisBackend for StubBackend {
    type Connection = StubConnection;

    fn name(&self) -> &'static str {
        "stub"
    }

    async fn open(
        &self,
        params: &VoiceParams,
        callback: Arc<dyn SynthesisCallback>,
    ) -> SynthesisResult<StubConnection> {
        if self.state.fail_open.load(Ordering::SeqCst) {
            return Err(SynthesisError::ConnectionFailed(
                "stub backend refused the connection".to_string(),
            ));
        }

        self.state.open_attempts.fetch_add(1, Ordering::SeqCst);
        let hold = self.state.hold_open.lock().clone();
        if let Some(hold) = hold {
            let permit = hold
                .acquire()
                .await
                .map_err(|e| SynthesisError::Internal(e.to_string()))?;
            permit.forget();
        }

        let session = self.state.next_session.fetch_add(1, Ordering::SeqCst) + 1;
        let open_now = self.state.open_now.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.max_open.fetch_max(open_now, Ordering::SeqCst);
        *self.state.current.lock() = Some((session, callback.clone()));
        self.state.record(StubEvent::Opened {
            session,
            voice: params.voice.clone(),
        });

        Ok(StubConnection {
            session,
            config: self.config.clone(),
            state: self.state.clone(),
            callback,
            emitters: Vec::new(),
        })
    }
}

/// Connection handed out by [`StubBackend`].
pub struct StubConnection {
    session: usize,
    config: StubConfig,
    state: Arc<StubState>,
    callback: Arc<dyn SynthesisCallback>,
    emitters: Vec<JoinHandle<()>>,
}

impl StubConnection {
    fn stop_emitters(&mut self) {
        for emitter in self.emitters.drain(..) {
            emitter.abort();
        }
    }
}

#[async_trait]
impl SynthesisConnection for StubConnection {
    async fn feed(&mut self, text: &str) -> SynthesisResult<()> {
        if self.state.fail_feed.load(Ordering::SeqCst) {
            return Err(SynthesisError::Protocol("stub backend rejected text".to_string()));
        }
        self.state.record(StubEvent::Fed {
            session: self.session,
            text: text.to_string(),
        });

        let callback = self.callback.clone();
        let config = self.config.clone();
        self.emitters.push(tokio::spawn(async move {
            for _ in 0..config.chunks_per_text {
                tokio::time::sleep(config.chunk_interval).await;
                callback.on_audio(Bytes::from(vec![0u8; config.chunk_bytes]));
            }
        }));
        Ok(())
    }

    async fn complete_segment(&mut self) -> SynthesisResult<()> {
        let hold = self.state.hold.lock().clone();
        if let Some(hold) = hold {
            let permit = hold
                .acquire()
                .await
                .map_err(|e| SynthesisError::Internal(e.to_string()))?;
            permit.forget();
        }

        for emitter in self.emitters.drain(..) {
            let _ = emitter.await;
        }

        if self.state.fail_complete.load(Ordering::SeqCst) {
            return Err(SynthesisError::TaskFailed {
                code: "StubFailure".to_string(),
                message: "stub backend failed to finish".to_string(),
            });
        }

        self.callback.on_complete();
        self.callback.on_close();
        self.state.record(StubEvent::Completed {
            session: self.session,
        });
        Ok(())
    }

    async fn cancel(&mut self) -> SynthesisResult<()> {
        self.stop_emitters();
        self.callback.on_close();
        self.state.record(StubEvent::Cancelled {
            session: self.session,
        });
        Ok(())
    }
}

impl Drop for StubConnection {
    fn drop(&mut self) {
        self.stop_emitters();
        self.state.open_now.fetch_sub(1, Ordering::SeqCst);
    }
}
