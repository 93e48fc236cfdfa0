//! WebSocket message types for the DashScope duplex inference protocol.
//!
//! - **Outgoing** (text frames): `run-task`, `continue-task` and
//!   `finish-task` actions, all sharing a `{action, task_id, streaming}`
//!   header.
//! - **Incoming** (text frames): events named in `header.event`.
//! - **Incoming** (binary frames): raw synthesized audio, not wrapped.

use serde::{Deserialize, Serialize};

use crate::core::tts::base::{SynthesisError, VoiceParams};

// =============================================================================
// Outgoing Messages (Client to Server)
// =============================================================================

/// Client action carried in the message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClientAction {
    RunTask,
    ContinueTask,
    FinishTask,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClientHeader {
    pub action: ClientAction,
    pub task_id: String,
    pub streaming: &'static str,
}

/// Synthesis parameters sent with `run-task`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SynthesisParameters {
    pub text_type: &'static str,
    pub voice: String,
    pub format: String,
    pub sample_rate: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pitch: Option<f32>,
}

impl From<&VoiceParams> for SynthesisParameters {
    fn from(params: &VoiceParams) -> Self {
        Self {
            text_type: "PlainText",
            voice: params.voice.clone(),
            format: params.format.clone(),
            sample_rate: params.sample_rate.hz(),
            volume: params.volume,
            rate: params.speech_rate,
            pitch: params.pitch,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClientPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_group: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<SynthesisParameters>,
    pub input: TaskInput,
}

/// A complete client message, serialized as one text frame.
///
/// ```rust
/// use cosy_relay::core::tts::cosyvoice::ClientMessage;
///
/// let json = ClientMessage::finish_task("task-1").to_json().unwrap();
/// assert!(json.contains("\"action\":\"finish-task\""));
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct ClientMessage {
    pub header: ClientHeader,
    pub payload: ClientPayload,
}

impl ClientMessage {
    fn new(action: ClientAction, task_id: &str, payload: ClientPayload) -> Self {
        Self {
            header: ClientHeader {
                action,
                task_id: task_id.to_string(),
                streaming: "duplex",
            },
            payload,
        }
    }

    pub fn run_task(task_id: &str, params: &VoiceParams) -> Self {
        Self::new(
            ClientAction::RunTask,
            task_id,
            ClientPayload {
                task_group: Some("audio"),
                task: Some("tts"),
                function: Some("SpeechSynthesizer"),
                model: Some(params.model.clone()),
                parameters: Some(SynthesisParameters::from(params)),
                input: TaskInput::default(),
            },
        )
    }

    pub fn continue_task(task_id: &str, text: &str) -> Self {
        Self::new(
            ClientAction::ContinueTask,
            task_id,
            ClientPayload {
                task_group: None,
                task: None,
                function: None,
                model: None,
                parameters: None,
                input: TaskInput {
                    text: Some(text.to_string()),
                },
            },
        )
    }

    pub fn finish_task(task_id: &str) -> Self {
        Self::new(
            ClientAction::FinishTask,
            task_id,
            ClientPayload {
                task_group: None,
                task: None,
                function: None,
                model: None,
                parameters: None,
                input: TaskInput::default(),
            },
        )
    }

    pub fn action(&self) -> ClientAction {
        self.header.action
    }

    pub fn to_json(&self) -> Result<String, SynthesisError> {
        serde_json::to_string(self)
            .map_err(|e| SynthesisError::Internal(format!("Failed to encode message: {e}")))
    }
}

// =============================================================================
// Incoming Messages (Server to Client)
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
struct RawHeader {
    #[serde(default)]
    task_id: Option<String>,
    event: String,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawServerMessage {
    header: RawHeader,
}

/// Event reported by the service in a text frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    TaskStarted,
    ResultGenerated,
    TaskFinished,
    TaskFailed { code: String, message: String },
    Unknown(String),
}

/// A parsed server text frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerMessage {
    pub task_id: Option<String>,
    pub event: ServerEvent,
}

impl ServerMessage {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let raw: RawServerMessage = serde_json::from_str(text)?;
        let event = match raw.header.event.as_str() {
            "task-started" => ServerEvent::TaskStarted,
            "result-generated" => ServerEvent::ResultGenerated,
            "task-finished" => ServerEvent::TaskFinished,
            "task-failed" => ServerEvent::TaskFailed {
                code: raw.header.error_code.unwrap_or_default(),
                message: raw.header.error_message.unwrap_or_default(),
            },
            other => ServerEvent::Unknown(other.to_string()),
        };
        Ok(Self {
            task_id: raw.header.task_id,
            event,
        })
    }
}
