use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{
        handshake::client::generate_key,
        http::Request,
        http::header::{AUTHORIZATION, USER_AGENT},
        protocol::Message,
    },
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::config::CosyVoiceConfig;
use super::messages::{ClientMessage, ServerEvent, ServerMessage};
use crate::core::tts::base::{
    SynthesisBackend, SynthesisCallback, SynthesisConnection, SynthesisError, SynthesisResult,
    VoiceParams,
};

type WebSocketConnection = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WebSocketWriter = SplitSink<WebSocketConnection, Message>;
type WebSocketReader = SplitStream<WebSocketConnection>;

/// Time allowed for a graceful close before the reader task is aborted.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Lifecycle of the single task carried by a connection.
#[derive(Debug, Clone)]
enum TaskPhase {
    Starting,
    Started,
    Finished,
    Failed(SynthesisError),
    Closed,
}

impl TaskPhase {
    fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskPhase::Finished | TaskPhase::Failed(_) | TaskPhase::Closed
        )
    }
}

/// CosyVoice streaming synthesis over the DashScope WebSocket API.
#[derive(Debug, Clone)]
pub struct CosyVoiceBackend {
    config: CosyVoiceConfig,
}

impl CosyVoiceBackend {
    pub fn new(config: CosyVoiceConfig) -> SynthesisResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &CosyVoiceConfig {
        &self.config
    }

    fn build_request(&self) -> SynthesisResult<Request<()>> {
        let url = self.config.endpoint()?;
        let host = match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => {
                return Err(SynthesisError::InvalidConfiguration(format!(
                    "CosyVoice URL '{url}' has no host"
                )));
            }
        };

        Request::builder()
            .method("GET")
            .uri(url.as_str())
            .header("Host", host)
            .header("Upgrade", "websocket")
            .header("Connection", "upgrade")
            .header("Sec-WebSocket-Key", generate_key())
            .header("Sec-WebSocket-Version", "13")
            .header(AUTHORIZATION, self.config.authorization())
            .header(USER_AGENT, "cosy-relay/0.1")
            .header("X-DashScope-DataInspection", "enable")
            .body(())
            .map_err(|e| SynthesisError::ConnectionFailed(format!("Failed to create request: {e}")))
    }
}

#[async_trait]
impl SynthesisBackend for CosyVoiceBackend {
    type Connection = CosyVoiceConnection;

    fn name(&self) -> &'static str {
        "cosyvoice"
    }

    async fn open(
        &self,
        params: &VoiceParams,
        callback: Arc<dyn SynthesisCallback>,
    ) -> SynthesisResult<CosyVoiceConnection> {
        let request = self.build_request()?;
        let connect_timeout = self.config.connect_timeout;

        let (ws_stream, response) = timeout(connect_timeout, connect_async(request))
            .await
            .map_err(|_| {
                SynthesisError::Timeout(format!(
                    "Connecting to CosyVoice took longer than {connect_timeout:?}"
                ))
            })?
            .map_err(|e| {
                SynthesisError::ConnectionFailed(format!("WebSocket connection failed: {e}"))
            })?;
        debug!(
            "CosyVoice WebSocket established, response status: {:?}",
            response.status()
        );

        let (writer, reader) = ws_stream.split();
        let task_id = Uuid::new_v4().simple().to_string();
        let (phase_tx, phase_rx) = watch::channel(TaskPhase::Starting);
        let reader = tokio::spawn(read_events(reader, task_id.clone(), phase_tx, callback));

        let mut connection = CosyVoiceConnection {
            task_id,
            writer,
            phase: phase_rx,
            reader: Some(reader),
            request_timeout: self.config.request_timeout,
        };

        connection
            .send(ClientMessage::run_task(&connection.task_id, params))
            .await?;
        match connection
            .wait_for_phase(Some(connect_timeout), |phase| {
                !matches!(phase, TaskPhase::Starting)
            })
            .await?
        {
            TaskPhase::Started => {
                info!(
                    task_id = %connection.task_id,
                    voice = %params.voice,
                    model = %params.model,
                    "CosyVoice task started"
                );
                Ok(connection)
            }
            TaskPhase::Failed(e) => Err(e),
            _ => Err(SynthesisError::Closed(
                "connection closed before the task started".to_string(),
            )),
        }
    }
}

/// One DashScope task on its own WebSocket.
pub struct CosyVoiceConnection {
    task_id: String,
    writer: WebSocketWriter,
    phase: watch::Receiver<TaskPhase>,
    reader: Option<JoinHandle<()>>,
    request_timeout: Option<Duration>,
}

impl CosyVoiceConnection {
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    async fn send(&mut self, message: ClientMessage) -> SynthesisResult<()> {
        let json = message.to_json()?;
        debug!(task_id = %self.task_id, action = ?message.action(), "Sending CosyVoice action");
        self.writer
            .send(Message::Text(json.into()))
            .await
            .map_err(|e| {
                SynthesisError::ConnectionFailed(format!(
                    "Failed to send {:?}: {e}",
                    message.action()
                ))
            })
    }

    async fn wait_for_phase(
        &mut self,
        limit: Option<Duration>,
        done: impl FnMut(&TaskPhase) -> bool,
    ) -> SynthesisResult<TaskPhase> {
        let waited = match limit {
            Some(limit) => timeout(limit, self.phase.wait_for(done))
                .await
                .map_err(|_| {
                    SynthesisError::Timeout(format!(
                        "CosyVoice task {} did not respond within {limit:?}",
                        self.task_id
                    ))
                })?
                .map(|phase| phase.clone()),
            None => self.phase.wait_for(done).await.map(|phase| phase.clone()),
        };
        waited.map_err(|_| SynthesisError::Closed("event reader stopped".to_string()))
    }

    /// Close the socket, giving the reader a moment to observe the close.
    async fn close(&mut self, grace: Duration) {
        if let Err(e) = timeout(grace, self.writer.close()).await.unwrap_or(Ok(())) {
            debug!(task_id = %self.task_id, "WebSocket close failed: {}", e);
        }
        if let Some(mut reader) = self.reader.take()
            && timeout(grace, &mut reader).await.is_err()
        {
            reader.abort();
        }
    }
}

#[async_trait]
impl SynthesisConnection for CosyVoiceConnection {
    async fn feed(&mut self, text: &str) -> SynthesisResult<()> {
        if text.is_empty() {
            return Ok(());
        }
        let phase = self.phase.borrow().clone();
        match phase {
            TaskPhase::Started => {}
            TaskPhase::Failed(e) => return Err(e),
            TaskPhase::Starting => {
                return Err(SynthesisError::NotReady(
                    "task has not started yet".to_string(),
                ));
            }
            TaskPhase::Finished | TaskPhase::Closed => {
                return Err(SynthesisError::Closed(format!(
                    "task {} is no longer accepting text",
                    self.task_id
                )));
            }
        }
        self.send(ClientMessage::continue_task(&self.task_id, text))
            .await
    }

    async fn complete_segment(&mut self) -> SynthesisResult<()> {
        self.send(ClientMessage::finish_task(&self.task_id)).await?;

        let outcome = match self
            .wait_for_phase(self.request_timeout, TaskPhase::is_terminal)
            .await
        {
            Ok(TaskPhase::Finished) => Ok(()),
            Ok(TaskPhase::Failed(e)) => Err(e),
            Ok(_) => Err(SynthesisError::Closed(
                "connection closed before the task finished".to_string(),
            )),
            Err(e) => Err(e),
        };
        self.close(CLOSE_GRACE).await;
        outcome
    }

    async fn cancel(&mut self) -> SynthesisResult<()> {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        if let Err(e) = timeout(CLOSE_GRACE, self.writer.close())
            .await
            .unwrap_or(Ok(()))
        {
            debug!(task_id = %self.task_id, "WebSocket close failed: {}", e);
        }
        Ok(())
    }
}

impl Drop for CosyVoiceConnection {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

/// Reader task: forwards audio and task events to the callback until the
/// socket closes.
async fn read_events(
    mut stream: WebSocketReader,
    task_id: String,
    phase: watch::Sender<TaskPhase>,
    callback: Arc<dyn SynthesisCallback>,
) {
    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Binary(data)) => callback.on_audio(data),
            Ok(Message::Text(text)) => match ServerMessage::parse(&text) {
                Ok(message) => {
                    if let Some(id) = &message.task_id
                        && id != &task_id
                    {
                        debug!(task_id = %task_id, "Ignoring event for task {}", id);
                        continue;
                    }
                    match message.event {
                        ServerEvent::TaskStarted => {
                            phase.send_replace(TaskPhase::Started);
                        }
                        ServerEvent::ResultGenerated => {
                            debug!(task_id = %task_id, "CosyVoice result generated");
                        }
                        ServerEvent::TaskFinished => {
                            callback.on_complete();
                            phase.send_replace(TaskPhase::Finished);
                        }
                        ServerEvent::TaskFailed { code, message } => {
                            let error = SynthesisError::TaskFailed { code, message };
                            warn!(task_id = %task_id, "{}", error);
                            callback.on_error(error.clone());
                            phase.send_replace(TaskPhase::Failed(error));
                        }
                        ServerEvent::Unknown(event) => {
                            debug!(task_id = %task_id, "Unhandled CosyVoice event: {}", event);
                        }
                    }
                }
                Err(e) => warn!(task_id = %task_id, "Failed to parse CosyVoice message: {} - raw: {}", e, text),
            },
            Ok(Message::Close(frame)) => {
                debug!(task_id = %task_id, "CosyVoice closed the connection: {:?}", frame);
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(task_id = %task_id, "CosyVoice WebSocket error: {}", e);
                break;
            }
        }
    }

    phase.send_if_modified(|current| {
        if current.is_terminal() {
            false
        } else {
            *current = TaskPhase::Closed;
            true
        }
    });
    callback.on_close();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_carries_bearer_authorization() {
        let backend = CosyVoiceBackend::new(
            CosyVoiceConfig::new("sk-test").with_url("ws://127.0.0.1:9001/api-ws/v1/inference/"),
        )
        .unwrap();

        let request = backend.build_request().unwrap();
        assert_eq!(
            request.headers().get(AUTHORIZATION).unwrap(),
            "bearer sk-test"
        );
        assert_eq!(request.headers().get("Host").unwrap(), "127.0.0.1:9001");
        assert_eq!(request.uri().path(), "/api-ws/v1/inference/");
    }

    #[test]
    fn backend_rejects_invalid_config() {
        assert!(CosyVoiceBackend::new(CosyVoiceConfig::new("")).is_err());
    }

    #[test]
    fn terminal_phases() {
        assert!(!TaskPhase::Starting.is_terminal());
        assert!(!TaskPhase::Started.is_terminal());
        assert!(TaskPhase::Finished.is_terminal());
        assert!(TaskPhase::Closed.is_terminal());
        assert!(TaskPhase::Failed(SynthesisError::Internal("x".to_string())).is_terminal());
    }
}
